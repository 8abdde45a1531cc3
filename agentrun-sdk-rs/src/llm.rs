pub mod registry;

pub use registry::{LlmFactory, LlmRegistry};

use crate::content::{Content, ROLE_USER};
use crate::error::Result;
use crate::tools::BaseTool;
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;

pub type LlmResponseStream = Pin<Box<dyn Stream<Item = Result<LlmResponse>> + Send>>;

/// A model client.
///
/// `generate_content` returns a lazy stream: one response when `stream` is
/// false, a run of partial chunks followed by the aggregate when it is true.
/// Transport failures surface as `Err` items and are not retried here.
pub trait BaseLlm: Send + Sync {
    fn model(&self) -> &str;

    fn generate_content(&self, request: LlmRequest, stream: bool) -> LlmResponseStream;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop_sequences: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDeclaration {
    pub name: String,
    pub description: String,
    /// JSON schema of the arguments.
    pub parameters: Value,
}

/// Everything the model client needs for one call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmRequest {
    pub model: String,
    pub contents: Vec<Content>,
    #[serde(default)]
    pub system_instructions: Vec<String>,
    #[serde(default)]
    pub tools: Vec<FunctionDeclaration>,
    #[serde(default)]
    pub config: GenerateContentConfig,
}

impl LlmRequest {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }

    pub fn append_instructions<I, S>(&mut self, instructions: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.system_instructions
            .extend(instructions.into_iter().map(Into::into));
    }

    /// Adds the declarations of every tool that exposes one.
    pub fn append_tools(&mut self, tools: &[Arc<dyn BaseTool>]) {
        self.tools
            .extend(tools.iter().filter_map(|t| t.declaration()));
    }

    /// Ensures the conversation ends with a user turn.
    ///
    /// Models reject requests that are empty or end on a model turn, so a
    /// nudge is appended in either case.
    pub fn maybe_append_user_content(&mut self) {
        if self.contents.is_empty() {
            self.contents.push(Content::user_text(
                "Handle the requests as specified in the System Instruction.",
            ));
        }

        if self
            .contents
            .last()
            .is_some_and(|c| c.role.as_deref() != Some(ROLE_USER))
        {
            self.contents.push(Content::user_text(
                "Continue processing previous requests as instructed. Exit or provide a summary if no more outputs are needed.",
            ));
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinishReason {
    Stop,
    MaxTokens,
    Safety,
    Recitation,
    MalformedFunctionCall,
    Other,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    #[serde(default)]
    pub prompt_token_count: u32,
    #[serde(default)]
    pub candidates_token_count: u32,
    #[serde(default)]
    pub total_token_count: u32,
}

/// One chunk (or the whole) of a model answer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Content>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grounding_metadata: Option<Value>,
    /// Set on chunks of an unfinished text stream.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turn_complete: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interrupted: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_metadata: Option<HashMap<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_metadata: Option<UsageMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
}

impl LlmResponse {
    pub fn from_content(content: Content) -> Self {
        Self {
            content: Some(content),
            ..Default::default()
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_code: Some(code.into()),
            error_message: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn is_error(&self) -> bool {
        self.error_code.is_some()
    }
}

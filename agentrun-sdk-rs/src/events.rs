mod actions;

pub use actions::EventActions;

use crate::content::{Content, FunctionCall, FunctionResponse};
use crate::llm::LlmResponse;
use chrono::Utc;
use rand::Rng;
use rand::distr::Alphanumeric;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

const EVENT_ID_LEN: usize = 8;

/// Author value reserved for the end-user's own input.
pub const USER_AUTHOR: &str = "user";

/// One entry of a session's append-only log.
///
/// An event is either a model response produced on behalf of an agent, a
/// callback's output, or a bare state change. The model payload (content,
/// streaming flags, usage, errors) is flattened into the event so that a
/// serialized event reads as a single record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    id: String,
    #[serde(default)]
    pub invocation_id: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub actions: EventActions,
    /// Ids of the function calls in this event that run as long-running tools.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub long_running_tool_ids: BTreeSet<String>,
    /// Dotted path of agent names, e.g. `root.planner.searcher`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    #[serde(flatten)]
    pub response: LlmResponse,
}

impl Default for Event {
    fn default() -> Self {
        Self {
            id: new_event_id(),
            invocation_id: String::new(),
            author: String::new(),
            actions: EventActions::default(),
            long_running_tool_ids: BTreeSet::new(),
            branch: None,
            timestamp: Utc::now().timestamp_millis(),
            response: LlmResponse::default(),
        }
    }
}

impl Event {
    /// Creates an event with a fresh id and the current timestamp.
    pub fn new(invocation_id: impl Into<String>, author: impl Into<String>) -> Self {
        Self {
            invocation_id: invocation_id.into(),
            author: author.into(),
            ..Default::default()
        }
    }

    /// Wraps a model response into an event authored by `author`.
    pub fn from_response(
        invocation_id: impl Into<String>,
        author: impl Into<String>,
        branch: Option<String>,
        response: LlmResponse,
    ) -> Self {
        Self {
            response,
            ..Self::new(invocation_id, author).with_branch(branch)
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_branch(mut self, branch: Option<String>) -> Self {
        self.branch = branch;
        self
    }

    pub fn with_content(mut self, content: Content) -> Self {
        self.response.content = Some(content);
        self
    }

    pub fn with_actions(mut self, actions: EventActions) -> Self {
        self.actions = actions;
        self
    }

    pub fn with_long_running_tool_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.long_running_tool_ids = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn content(&self) -> Option<&Content> {
        self.response.content.as_ref()
    }

    pub fn is_partial(&self) -> bool {
        self.response.partial == Some(true)
    }

    pub fn function_calls(&self) -> Vec<&FunctionCall> {
        self.content()
            .map(|c| c.parts.iter().filter_map(|p| p.function_call.as_ref()).collect())
            .unwrap_or_default()
    }

    pub fn function_responses(&self) -> Vec<&FunctionResponse> {
        self.content()
            .map(|c| {
                c.parts
                    .iter()
                    .filter_map(|p| p.function_response.as_ref())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn has_trailing_code_execution_result(&self) -> bool {
        self.content()
            .and_then(|c| c.parts.last())
            .is_some_and(|p| p.code_execution_result.is_some())
    }

    /// Whether this event is a terminal answer rather than an intermediate step.
    ///
    /// Skip-summarization and long-running tool calls make an event final
    /// outright. Otherwise any function call, function response, partial chunk
    /// or trailing code execution result disqualifies it.
    pub fn is_final_response(&self) -> bool {
        if self.actions.skip_summarization == Some(true) || !self.long_running_tool_ids.is_empty()
        {
            return true;
        }

        self.function_calls().is_empty()
            && self.function_responses().is_empty()
            && !self.is_partial()
            && !self.has_trailing_code_execution_result()
    }

    pub fn stringify_content(&self) -> String {
        self.content().map(Content::text).unwrap_or_default()
    }
}

/// Random 8-character alphanumeric event id.
pub fn new_event_id() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(EVENT_ID_LEN)
        .map(char::from)
        .collect()
}

use crate::context::{CallbackContext, InvocationContext};
use crate::error::{AgentError, Result};
use crate::events::EventActions;
use crate::llm::FunctionDeclaration;
use crate::services::SearchMemoryResponse;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

/// A function the model can call.
#[async_trait]
pub trait BaseTool: Send + Sync {
    fn name(&self) -> String;
    fn description(&self) -> String;
    /// JSON schema of the arguments.
    fn parameters(&self) -> Value;

    /// Long-running tools return immediately and report their result later.
    fn is_long_running(&self) -> bool {
        false
    }

    fn declaration(&self) -> Option<FunctionDeclaration> {
        Some(FunctionDeclaration {
            name: self.name(),
            description: self.description(),
            parameters: self.parameters(),
        })
    }

    async fn run(&self, args: Value, ctx: &mut ToolContext) -> Result<Value>;
}

type ToolFn = dyn Fn(Value, &mut ToolContext) -> Result<Value> + Send + Sync;

/// A tool backed by a plain closure.
pub struct FunctionTool {
    name: String,
    description: String,
    parameters: Value,
    long_running: bool,
    func: Arc<ToolFn>,
}

impl FunctionTool {
    pub fn new<F>(name: impl Into<String>, description: impl Into<String>, func: F) -> Self
    where
        F: Fn(Value, &mut ToolContext) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: serde_json::json!({"type": "object", "properties": {}}),
            long_running: false,
            func: Arc::new(func),
        }
    }

    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn long_running(mut self) -> Self {
        self.long_running = true;
        self
    }
}

#[async_trait]
impl BaseTool for FunctionTool {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn description(&self) -> String {
        self.description.clone()
    }

    fn parameters(&self) -> Value {
        self.parameters.clone()
    }

    fn is_long_running(&self) -> bool {
        self.long_running
    }

    async fn run(&self, args: Value, ctx: &mut ToolContext) -> Result<Value> {
        (self.func)(args, ctx)
    }
}

/// A request for the user to confirm a tool call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolConfirmation {
    /// Why the confirmation is needed.
    #[serde(default)]
    pub hint: String,
    pub confirmed: bool,
    /// Extra data the user has to supply to continue.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl ToolConfirmation {
    pub fn new(confirmed: bool, hint: impl Into<String>, payload: Option<Value>) -> Self {
        Self {
            hint: hint.into(),
            confirmed,
            payload,
        }
    }
}

/// The view of a run handed to a tool. Extends [`CallbackContext`] with the
/// id of the function call being served.
pub struct ToolContext {
    callback: CallbackContext,
    function_call_id: Option<String>,
    pub tool_confirmation: Option<ToolConfirmation>,
}

impl ToolContext {
    pub async fn new(
        invocation: &InvocationContext,
        actions: Option<EventActions>,
        function_call_id: Option<String>,
    ) -> Self {
        Self {
            callback: CallbackContext::new(invocation, actions).await,
            function_call_id,
            tool_confirmation: None,
        }
    }

    pub fn function_call_id(&self) -> Option<&str> {
        self.function_call_id.as_deref()
    }

    fn require_function_call_id(&self) -> Result<String> {
        self.function_call_id
            .clone()
            .ok_or(AgentError::MissingFunctionCallId)
    }

    /// Asks the client to obtain a credential for `auth_config`.
    pub fn request_credential(&mut self, auth_config: Value) -> Result<()> {
        let call_id = self.require_function_call_id()?;
        self.callback
            .actions_mut()
            .requested_auth_configs
            .insert(call_id, auth_config);
        Ok(())
    }

    /// The credential already obtained for `auth_config`, if any.
    pub async fn get_auth_response(&self, auth_config: &Value) -> Result<Option<Value>> {
        let service = self
            .callback
            .credential_service()
            .ok_or(AgentError::ServiceUnavailable("Credential"))?;
        service.load_credential(auth_config).await
    }

    /// Pauses the call until the user confirms it.
    pub fn request_confirmation(&mut self, hint: impl Into<String>, payload: Option<Value>) -> Result<()> {
        let call_id = self.require_function_call_id()?;
        self.callback
            .actions_mut()
            .requested_tool_confirmations
            .insert(call_id, ToolConfirmation::new(false, hint, payload));
        Ok(())
    }

    pub async fn list_artifacts(&self) -> Result<Vec<String>> {
        let service = self.callback.artifact_service()?;
        let invocation = self.callback.invocation_context();
        service
            .list_artifact_keys(
                invocation.app_name(),
                invocation.user_id(),
                invocation.session_id(),
            )
            .await
    }

    pub async fn search_memory(&self, query: &str) -> Result<SearchMemoryResponse> {
        let invocation = self.callback.invocation_context();
        let service = invocation
            .services()
            .memory_service
            .as_ref()
            .ok_or(AgentError::ServiceUnavailable("Memory"))?;
        service
            .search_memory(invocation.app_name(), invocation.user_id(), query)
            .await
    }

    pub fn into_actions(self) -> EventActions {
        self.callback.into_actions()
    }
}

impl Deref for ToolContext {
    type Target = CallbackContext;

    fn deref(&self) -> &Self::Target {
        &self.callback
    }
}

impl DerefMut for ToolContext {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.callback
    }
}

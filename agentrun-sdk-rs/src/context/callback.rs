use crate::content::{Content, Part};
use crate::context::InvocationContext;
use crate::error::{AgentError, Result};
use crate::events::EventActions;
use crate::services::{ArtifactKey, ArtifactService, CredentialService, PluginManager};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// The view of a run handed to agent callbacks.
///
/// State reads see the session state overlaid with every change made through
/// this context. Writes never touch the session directly: they accumulate in
/// [`EventActions`] and reach the session when the resulting event is
/// appended.
pub struct CallbackContext {
    invocation: InvocationContext,
    state: HashMap<String, Value>,
    actions: EventActions,
}

impl CallbackContext {
    pub async fn new(invocation: &InvocationContext, actions: Option<EventActions>) -> Self {
        let actions = actions.unwrap_or_default();
        let mut state = invocation.session().read().await.state.clone();
        state.extend(
            actions
                .state_delta
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );

        Self {
            invocation: invocation.clone(),
            state,
            actions,
        }
    }

    pub fn invocation_context(&self) -> &InvocationContext {
        &self.invocation
    }

    pub fn invocation_id(&self) -> &str {
        self.invocation.invocation_id()
    }

    pub fn agent_name(&self) -> &str {
        self.invocation.agent().name()
    }

    pub fn branch(&self) -> Option<&str> {
        self.invocation.branch()
    }

    pub fn user_content(&self) -> Option<&Content> {
        self.invocation.user_content()
    }

    pub fn state(&self) -> &HashMap<String, Value> {
        &self.state
    }

    pub fn get_state(&self, key: &str) -> Option<&Value> {
        self.state.get(key)
    }

    pub fn set_state(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        self.state.insert(key.clone(), value.clone());
        self.actions.state_delta.insert(key, value);
    }

    pub fn actions(&self) -> &EventActions {
        &self.actions
    }

    pub fn actions_mut(&mut self) -> &mut EventActions {
        &mut self.actions
    }

    pub fn into_actions(self) -> EventActions {
        self.actions
    }

    pub fn plugin_manager(&self) -> Option<&Arc<dyn PluginManager>> {
        self.invocation.services().plugin_manager.as_ref()
    }

    pub fn credential_service(&self) -> Option<&Arc<dyn CredentialService>> {
        self.invocation.services().credential_service.as_ref()
    }

    pub(crate) fn artifact_service(&self) -> Result<&Arc<dyn ArtifactService>> {
        self.invocation
            .services()
            .artifact_service
            .as_ref()
            .ok_or(AgentError::ServiceUnavailable("Artifact"))
    }

    fn artifact_key(&self, filename: &str) -> ArtifactKey {
        ArtifactKey {
            app_name: self.invocation.app_name().to_string(),
            user_id: self.invocation.user_id().to_string(),
            session_id: self.invocation.session_id().to_string(),
            filename: filename.to_string(),
        }
    }

    /// Loads an artifact of the current session; the latest version when
    /// `version` is `None`.
    pub async fn load_artifact(&self, filename: &str, version: Option<u32>) -> Result<Option<Part>> {
        let service = self.artifact_service()?;
        service
            .load_artifact(&self.artifact_key(filename), version)
            .await
    }

    /// Saves an artifact and records the new version in the artifact delta.
    pub async fn save_artifact(&mut self, filename: &str, artifact: Part) -> Result<u32> {
        let service = Arc::clone(self.artifact_service()?);
        let version = service
            .save_artifact(&self.artifact_key(filename), artifact)
            .await?;
        self.actions
            .artifact_delta
            .insert(filename.to_string(), version);
        Ok(version)
    }
}

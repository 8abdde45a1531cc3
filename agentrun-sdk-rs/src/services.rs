//! Contracts for the services the engine reaches through an invocation.
//!
//! The engine never implements these. It only hands the configured instances
//! to callbacks and tools, and reports [`AgentError::ServiceUnavailable`]
//! when one is requested but missing.
//!
//! [`AgentError::ServiceUnavailable`]: crate::error::AgentError::ServiceUnavailable

use crate::content::Part;
use crate::error::Result;
use crate::events::Event;
use crate::session::Session;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Debug;

/// Identifies one artifact file within a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactKey {
    pub app_name: String,
    pub user_id: String,
    pub session_id: String,
    pub filename: String,
}

#[async_trait]
pub trait ArtifactService: Send + Sync {
    /// Loads `version`, or the latest version when `None`.
    async fn load_artifact(&self, key: &ArtifactKey, version: Option<u32>) -> Result<Option<Part>>;

    /// Stores a new version and returns it. Versions increase per filename.
    async fn save_artifact(&self, key: &ArtifactKey, artifact: Part) -> Result<u32>;

    async fn list_artifact_keys(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
    ) -> Result<Vec<String>>;
}

#[async_trait]
pub trait SessionService: Send + Sync {
    async fn get_session(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
    ) -> Result<Option<Session>>;

    async fn append_event(&self, session: &mut Session, event: Event) -> Result<Event>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchMemoryResponse {
    #[serde(default)]
    pub memories: Vec<Value>,
}

#[async_trait]
pub trait MemoryService: Send + Sync {
    async fn search_memory(
        &self,
        app_name: &str,
        user_id: &str,
        query: &str,
    ) -> Result<SearchMemoryResponse>;
}

#[async_trait]
pub trait CredentialService: Send + Sync {
    /// Returns the credential stored for `auth_config`, if any.
    async fn load_credential(&self, auth_config: &Value) -> Result<Option<Value>>;
}

/// Opaque plugin registry. The engine only passes it along.
pub trait PluginManager: Debug + Send + Sync {}

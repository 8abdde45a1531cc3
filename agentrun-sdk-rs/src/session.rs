use crate::error::{AgentError, Result};
use crate::events::Event;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// State keys with this prefix live only for the current invocation and are
/// never written back into the session.
pub const TEMP_PREFIX: &str = "temp:";

/// Shared handle to a session. Contexts derived during one run all point at
/// the same session.
pub type SharedSession = Arc<RwLock<Session>>;

/// A conversation between a user and an agent tree: ordered events plus a
/// state mapping, identified by (app name, user id, session id).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub app_name: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub state: HashMap<String, Value>,
    #[serde(default)]
    pub events: Vec<Event>,
    #[serde(default)]
    pub last_update_time: i64,
}

impl Session {
    pub fn new(
        id: impl Into<String>,
        app_name: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            app_name: app_name.into(),
            user_id: user_id.into(),
            ..Default::default()
        }
    }

    pub fn with_state(mut self, state: HashMap<String, Value>) -> Self {
        self.state = state;
        self
    }

    pub fn into_shared(self) -> SharedSession {
        Arc::new(RwLock::new(self))
    }

    /// Appends a finished event to the log and applies its state delta.
    ///
    /// Partial streaming chunks are not persisted. Keys under [`TEMP_PREFIX`]
    /// are dropped from the persisted state.
    pub fn append_event(&mut self, event: Event) -> Result<()> {
        if event.invocation_id.is_empty() {
            return Err(AgentError::MissingInvocationId(self.id.clone()));
        }
        if event.is_partial() {
            return Ok(());
        }

        for (key, value) in &event.actions.state_delta {
            if key.starts_with(TEMP_PREFIX) {
                continue;
            }
            self.state.insert(key.clone(), value.clone());
        }
        self.last_update_time = event.timestamp;
        self.events.push(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::Content;
    use crate::events::EventActions;
    use serde_json::json;

    #[test]
    fn test_append_applies_state_delta() {
        let mut session = Session::new("s-1", "app", "u-1");
        let event = Event::new("e-1", "agent").with_actions(
            EventActions::default().with_state_delta([("count", json!(2)), ("temp:scratch", json!(1))]),
        );
        let timestamp = event.timestamp;

        session.append_event(event).unwrap();

        assert_eq!(session.events.len(), 1);
        assert_eq!(session.state.get("count"), Some(&json!(2)));
        assert!(!session.state.contains_key("temp:scratch"));
        assert_eq!(session.last_update_time, timestamp);
    }

    #[test]
    fn test_append_rejects_missing_invocation_id() {
        let mut session = Session::new("s-1", "app", "u-1");
        let err = session.append_event(Event::new("", "agent")).unwrap_err();
        assert!(matches!(err, AgentError::MissingInvocationId(id) if id == "s-1"));
        assert!(session.events.is_empty());
    }

    #[test]
    fn test_partial_events_are_not_persisted() {
        let mut session = Session::new("s-1", "app", "u-1");
        let mut event = Event::new("e-1", "agent").with_content(Content::model_text("par"));
        event.response.partial = Some(true);

        session.append_event(event).unwrap();
        assert!(session.events.is_empty());
    }
}

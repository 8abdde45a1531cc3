use crate::tools::ToolConfirmation;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Side effects attached to an event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventActions {
    /// If true, the model is not called to summarize a function response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_summarization: Option<bool>,

    #[serde(default)]
    pub state_delta: HashMap<String, Value>,

    /// Filename to the version that was saved.
    #[serde(default)]
    pub artifact_delta: HashMap<String, u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transfer_to_agent: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalate: Option<bool>,

    /// Auth configs requested by tools, keyed by function call id.
    #[serde(default)]
    pub requested_auth_configs: HashMap<String, Value>,

    /// Tool confirmations requested by tools, keyed by function call id.
    #[serde(default)]
    pub requested_tool_confirmations: HashMap<String, ToolConfirmation>,
}

impl EventActions {
    pub fn with_state_delta<I, K>(mut self, delta: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        self.state_delta
            .extend(delta.into_iter().map(|(k, v)| (k.into(), v)));
        self
    }

    pub fn is_empty(&self) -> bool {
        self == &EventActions::default()
    }

    /// Folds `base` and then every source, left to right, into a new bundle.
    ///
    /// Map fields take the union of keys with later sources winning. Optional
    /// scalars are overwritten only by a later source that has a value.
    pub fn merge<'a, I>(sources: I, base: Option<&EventActions>) -> EventActions
    where
        I: IntoIterator<Item = &'a EventActions>,
    {
        let mut merged = EventActions::default();
        if let Some(base) = base {
            merged.merge_from(base);
        }
        for source in sources {
            merged.merge_from(source);
        }
        merged
    }

    /// Applies `source` on top of `self` with the same rules as [`EventActions::merge`].
    pub fn merge_from(&mut self, source: &EventActions) {
        self.state_delta.extend(
            source
                .state_delta
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        self.artifact_delta.extend(
            source
                .artifact_delta
                .iter()
                .map(|(k, v)| (k.clone(), *v)),
        );
        self.requested_auth_configs.extend(
            source
                .requested_auth_configs
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        self.requested_tool_confirmations.extend(
            source
                .requested_tool_confirmations
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );

        if source.skip_summarization.is_some() {
            self.skip_summarization = source.skip_summarization;
        }
        if source.transfer_to_agent.is_some() {
            self.transfer_to_agent = source.transfer_to_agent.clone();
        }
        if source.escalate.is_some() {
            self.escalate = source.escalate;
        }
    }
}

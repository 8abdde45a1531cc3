use serde::{Deserialize, Deserializer, Serialize};
use std::env;
use std::str::FromStr;

pub const DEFAULT_MAX_LLM_CALLS: i64 = 500;

pub const MAX_LLM_CALLS_ENV: &str = "AGENTRUN_MAX_LLM_CALLS";
pub const STREAMING_MODE_ENV: &str = "AGENTRUN_STREAMING_MODE";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamingMode {
    #[default]
    None,
    /// Server-sent events: the model streams partial chunks.
    Sse,
    /// Bidirectional live streaming.
    Bidi,
}

impl FromStr for StreamingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "" => Ok(StreamingMode::None),
            "sse" => Ok(StreamingMode::Sse),
            "bidi" => Ok(StreamingMode::Bidi),
            other => Err(format!("unknown streaming mode '{}'", other)),
        }
    }
}

/// Runtime behaviour of one invocation. Built once before the run starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Upper bound on model calls per invocation. Zero or negative disables
    /// the check.
    #[serde(deserialize_with = "deserialize_max_llm_calls")]
    pub max_llm_calls: i64,
    pub streaming_mode: StreamingMode,
    pub response_modalities: Vec<String>,
    pub save_input_blobs_as_artifacts: bool,
    pub support_cfc: bool,
    pub enable_affective_dialog: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_llm_calls: DEFAULT_MAX_LLM_CALLS,
            streaming_mode: StreamingMode::None,
            response_modalities: Vec::new(),
            save_input_blobs_as_artifacts: false,
            support_cfc: false,
            enable_affective_dialog: false,
        }
    }
}

impl RunConfig {
    pub fn with_max_llm_calls(mut self, max_llm_calls: i64) -> Self {
        self.max_llm_calls = validate_max_llm_calls(max_llm_calls);
        self
    }

    pub fn with_streaming_mode(mut self, streaming_mode: StreamingMode) -> Self {
        self.streaming_mode = streaming_mode;
        self
    }

    pub fn enforces_llm_call_limit(&self) -> bool {
        self.max_llm_calls > 0
    }

    /// Reads overrides from the environment, falling back to defaults.
    ///
    /// `AGENTRUN_MAX_LLM_CALLS` takes an integer, `AGENTRUN_STREAMING_MODE`
    /// one of `none`, `sse`, `bidi`. Unparseable values are logged and ignored.
    pub fn from_env() -> Self {
        let mut config = RunConfig::default();

        if let Ok(raw) = env::var(MAX_LLM_CALLS_ENV) {
            match raw.trim().parse::<i64>() {
                Ok(value) => config = config.with_max_llm_calls(value),
                Err(e) => tracing::warn!("Ignoring {}={:?}: {}", MAX_LLM_CALLS_ENV, raw, e),
            }
        }

        if let Ok(raw) = env::var(STREAMING_MODE_ENV) {
            match raw.parse::<StreamingMode>() {
                Ok(mode) => config.streaming_mode = mode,
                Err(e) => tracing::warn!("Ignoring {}: {}", STREAMING_MODE_ENV, e),
            }
        }

        config
    }
}

fn validate_max_llm_calls(value: i64) -> i64 {
    if value <= 0 {
        tracing::warn!(
            "max_llm_calls is less than or equal to 0. This will result in no enforcement on total number of llm calls."
        );
    }
    value
}

fn deserialize_max_llm_calls<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(validate_max_llm_calls(i64::deserialize(deserializer)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RunConfig::default();
        assert_eq!(config.max_llm_calls, 500);
        assert_eq!(config.streaming_mode, StreamingMode::None);
        assert!(config.enforces_llm_call_limit());
    }

    #[test]
    fn test_non_positive_limit_is_kept_but_not_enforced() {
        let config = RunConfig::default().with_max_llm_calls(0);
        assert_eq!(config.max_llm_calls, 0);
        assert!(!config.enforces_llm_call_limit());
    }

    #[test]
    fn test_deserialize_fills_missing_fields() {
        let config: RunConfig =
            serde_json::from_str(r#"{"max_llm_calls": 3, "streaming_mode": "sse"}"#).unwrap();
        assert_eq!(config.max_llm_calls, 3);
        assert_eq!(config.streaming_mode, StreamingMode::Sse);
        assert!(!config.support_cfc);
    }

    #[test]
    fn test_deserialized_non_positive_limit_is_not_enforced() {
        let config: RunConfig = serde_json::from_str(r#"{"max_llm_calls": 0}"#).unwrap();
        assert_eq!(config.max_llm_calls, 0);
        assert!(!config.enforces_llm_call_limit());

        let config: RunConfig = serde_json::from_str(r#"{"max_llm_calls": -1}"#).unwrap();
        assert_eq!(config.max_llm_calls, -1);
    }

    #[test]
    fn test_streaming_mode_parse() {
        assert_eq!("BIDI".parse::<StreamingMode>(), Ok(StreamingMode::Bidi));
        assert_eq!("".parse::<StreamingMode>(), Ok(StreamingMode::None));
        assert!("websocket".parse::<StreamingMode>().is_err());
    }
}

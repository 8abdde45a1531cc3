use thiserror::Error;

pub type Result<T> = std::result::Result<T, AgentError>;

/// Errors raised while assembling an agent tree or driving a run.
///
/// Construction errors (`InvalidName`, `ReservedName`, `Topology`) abort tree
/// assembly. Everything else ends the event stream of the run that hit it.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Found invalid agent name: \"{0}\". Agent name must be a valid identifier.")]
    InvalidName(String),

    #[error("Agent name cannot be 'user'. 'user' is reserved for end-user's input.")]
    ReservedName,

    #[error(
        "Agent \"{child}\" already has a parent agent, current parent: \"{current_parent}\", trying to add: \"{new_parent}\""
    )]
    Topology {
        child: String,
        current_parent: String,
        new_parent: String,
    },

    #[error("Max number of llm calls limit of {limit} exceeded")]
    BudgetExceeded { limit: i64 },

    #[error("Model {0} not found.")]
    ModelNotFound(String),

    #[error("invalid model pattern \"{pattern}\": {source}")]
    InvalidModelPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("{0} service is not initialized.")]
    ServiceUnavailable(&'static str),

    #[error("event has no invocation id and cannot be appended to session {0}")]
    MissingInvocationId(String),

    #[error("function_call_id is not set.")]
    MissingFunctionCallId,

    #[error("Function {0} is not found in the tools of the agent.")]
    ToolNotFound(String),

    #[error("Agent {0} not found in the agent tree.")]
    AgentNotFound(String),

    #[error("model error {code}: {message}")]
    Model { code: String, message: String },

    #[error("tool {name} failed: {message}")]
    Tool { name: String, message: String },

    #[error("callback failed: {0}")]
    Callback(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AgentError {
    /// True for the errors that can only happen while building a tree.
    pub fn is_construction_error(&self) -> bool {
        matches!(
            self,
            AgentError::InvalidName(_) | AgentError::ReservedName | AgentError::Topology { .. }
        )
    }

    pub fn tool(name: impl Into<String>, message: impl Into<String>) -> Self {
        AgentError::Tool {
            name: name.into(),
            message: message.into(),
        }
    }
}

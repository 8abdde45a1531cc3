pub mod agent;
pub mod config;
pub mod content;
pub mod context;
pub mod error;
pub mod events;
pub mod llm;
pub mod logger;
pub mod services;
pub mod session;
pub mod tools;

#[cfg(test)]
mod test_support;

pub use agent::{Agent, AgentCallback, AgentConfig, AgentKind, EventStream, LlmAgentConfig, RunStep};
pub use context::{CallbackContext, InvocationContext};
pub use error::{AgentError, Result};
pub use events::{Event, EventActions};

mod callbacks;
mod llm_agent;
mod workflow;

pub use callbacks::AgentCallback;
pub use llm_agent::LlmAgentConfig;

use callbacks::CallbackPhase;

use crate::context::InvocationContext;
use crate::error::{AgentError, Result};
use crate::events::{Event, USER_AUTHOR};
use async_stream::try_stream;
use futures::{Stream, StreamExt};
use parking_lot::RwLock;
use regex::Regex;
use std::fmt;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// Ordered, lazily produced events of a run. Dropping the stream cancels the
/// run; an `Err` item is always the last item.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<Event>> + Send>>;

lazy_static::lazy_static! {
    static ref IDENTIFIER: Regex = Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").expect("identifier regex");
}

pub(crate) fn into_event_stream<S>(stream: S) -> EventStream
where
    S: Stream<Item = Result<Event>> + Send + 'static,
{
    Box::pin(stream)
}

/// A user supplied run step for [`AgentKind::Custom`].
pub trait RunStep: Send + Sync {
    fn run(&self, ctx: InvocationContext) -> EventStream;
}

/// What an agent does between its before and after callbacks.
#[derive(Clone, Default)]
pub enum AgentKind {
    /// Runs the sub-agents one after another.
    #[default]
    Sequential,
    /// Runs the sub-agents concurrently, each on its own branch.
    Parallel,
    /// Talks to a model, calling tools until it produces a final answer.
    Llm(LlmAgentConfig),
    /// Delegates to a user supplied [`RunStep`].
    Custom(Arc<dyn RunStep>),
}

impl AgentKind {
    pub fn label(&self) -> &'static str {
        match self {
            AgentKind::Sequential => "sequential",
            AgentKind::Parallel => "parallel",
            AgentKind::Llm(_) => "llm",
            AgentKind::Custom(_) => "custom",
        }
    }
}

pub struct AgentConfig {
    pub name: String,
    pub description: Option<String>,
    pub sub_agents: Vec<Arc<Agent>>,
    pub before_agent_callbacks: Vec<Arc<dyn AgentCallback>>,
    pub after_agent_callbacks: Vec<Arc<dyn AgentCallback>>,
    pub kind: AgentKind,
}

impl AgentConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            sub_agents: Vec::new(),
            before_agent_callbacks: Vec::new(),
            after_agent_callbacks: Vec::new(),
            kind: AgentKind::default(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_sub_agent(mut self, agent: Arc<Agent>) -> Self {
        self.sub_agents.push(agent);
        self
    }

    pub fn with_sub_agents(mut self, agents: impl IntoIterator<Item = Arc<Agent>>) -> Self {
        self.sub_agents.extend(agents);
        self
    }

    pub fn with_before_callback(mut self, callback: impl AgentCallback + 'static) -> Self {
        self.before_agent_callbacks.push(Arc::new(callback));
        self
    }

    pub fn with_after_callback(mut self, callback: impl AgentCallback + 'static) -> Self {
        self.after_agent_callbacks.push(Arc::new(callback));
        self
    }

    pub fn with_kind(mut self, kind: AgentKind) -> Self {
        self.kind = kind;
        self
    }
}

/// A node of the agent tree.
///
/// Children are owned; the parent and root links are weak and are written
/// only while the tree is being assembled.
pub struct Agent {
    name: String,
    description: Option<String>,
    adopted: AtomicBool,
    parent: RwLock<Weak<Agent>>,
    root: RwLock<Weak<Agent>>,
    sub_agents: Vec<Arc<Agent>>,
    before_agent_callbacks: Vec<Arc<dyn AgentCallback>>,
    after_agent_callbacks: Vec<Arc<dyn AgentCallback>>,
    kind: AgentKind,
}

impl Agent {
    /// Validates the name, adopts the sub-agents and stamps this agent as the
    /// root of its subtree. Nothing is wired if any check fails.
    pub fn new(config: AgentConfig) -> Result<Arc<Agent>> {
        let name = validate_agent_name(config.name)?;

        for (i, sub_agent) in config.sub_agents.iter().enumerate() {
            let duplicate = config.sub_agents[..i]
                .iter()
                .any(|other| Arc::ptr_eq(other, sub_agent));
            if duplicate || !sub_agent.claim_adoption() {
                release_adoptions(&config.sub_agents[..i]);
                let current_parent = if duplicate {
                    name.clone()
                } else {
                    sub_agent
                        .parent_agent()
                        .map(|p| p.name.clone())
                        .unwrap_or_default()
                };
                return Err(AgentError::Topology {
                    child: sub_agent.name.clone(),
                    current_parent,
                    new_parent: name,
                });
            }
        }

        let agent = Arc::new_cyclic(|this: &Weak<Agent>| {
            for sub_agent in &config.sub_agents {
                *sub_agent.parent.write() = this.clone();
                sub_agent.assign_root(this);
            }
            Agent {
                name,
                description: config.description,
                adopted: AtomicBool::new(false),
                parent: RwLock::new(Weak::new()),
                root: RwLock::new(Weak::new()),
                sub_agents: config.sub_agents,
                before_agent_callbacks: config.before_agent_callbacks,
                after_agent_callbacks: config.after_agent_callbacks,
                kind: config.kind,
            }
        });

        tracing::debug!(
            "Built {} agent {} with {} sub-agents",
            agent.kind.label(),
            agent.name,
            agent.sub_agents.len()
        );
        Ok(agent)
    }

    /// Reserves this agent for one parent. Fails if another parent got it
    /// first, even one still being built.
    fn claim_adoption(&self) -> bool {
        self.adopted
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn assign_root(&self, root: &Weak<Agent>) {
        *self.root.write() = root.clone();
        for sub_agent in &self.sub_agents {
            sub_agent.assign_root(root);
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn kind(&self) -> &AgentKind {
        &self.kind
    }

    pub fn sub_agents(&self) -> &[Arc<Agent>] {
        &self.sub_agents
    }

    pub fn parent_agent(&self) -> Option<Arc<Agent>> {
        self.parent.read().upgrade()
    }

    pub fn root_agent(self: &Arc<Self>) -> Arc<Agent> {
        self.root
            .read()
            .upgrade()
            .unwrap_or_else(|| Arc::clone(self))
    }

    /// Depth-first search starting at this agent.
    pub fn find_agent(self: &Arc<Self>, name: &str) -> Option<Arc<Agent>> {
        if self.name == name {
            return Some(Arc::clone(self));
        }
        self.find_sub_agent(name)
    }

    /// Like [`Agent::find_agent`] but only among descendants.
    pub fn find_sub_agent(&self, name: &str) -> Option<Arc<Agent>> {
        self.sub_agents
            .iter()
            .find_map(|sub_agent| sub_agent.find_agent(name))
    }

    /// Runs this agent within the invocation of `parent_context`.
    ///
    /// Order: before callbacks, the run step, after callbacks. Once the
    /// invocation has ended nothing further runs, including the after
    /// callbacks.
    pub fn run(self: &Arc<Self>, parent_context: &InvocationContext) -> EventStream {
        let agent = Arc::clone(self);
        let ctx = parent_context.for_agent(self);

        into_event_stream(try_stream! {
            if ctx.is_ended() {
                return;
            }
            tracing::debug!("Agent {} started (invocation {})", agent.name, ctx.invocation_id());

            let before = callbacks::run_callback_chain(
                &agent.before_agent_callbacks,
                &ctx,
                None,
                CallbackPhase::Before,
            )
            .await?;
            if let Some(event) = before {
                yield event;
            }
            if ctx.is_ended() {
                return;
            }

            let mut events = agent.run_step(&ctx);
            while let Some(event) = events.next().await {
                yield event?;
            }
            if ctx.is_ended() {
                return;
            }

            let after = callbacks::run_callback_chain(
                &agent.after_agent_callbacks,
                &ctx,
                None,
                CallbackPhase::After,
            )
            .await?;
            if let Some(event) = after {
                yield event;
            }
            tracing::debug!("Agent {} finished", agent.name);
        })
    }

    fn run_step(self: &Arc<Self>, ctx: &InvocationContext) -> EventStream {
        match &self.kind {
            AgentKind::Sequential => workflow::run_sequential(Arc::clone(self), ctx.clone()),
            AgentKind::Parallel => workflow::run_parallel(Arc::clone(self), ctx.clone()),
            AgentKind::Llm(config) => llm_agent::run(config.clone(), ctx.clone()),
            AgentKind::Custom(step) => step.run(ctx.clone()),
        }
    }
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("kind", &self.kind.label())
            .field(
                "sub_agents",
                &self.sub_agents.iter().map(|a| a.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

fn release_adoptions(claimed: &[Arc<Agent>]) {
    for sub_agent in claimed {
        sub_agent.adopted.store(false, Ordering::Release);
    }
}

fn validate_agent_name(name: String) -> Result<String> {
    if !IDENTIFIER.is_match(&name) {
        return Err(AgentError::InvalidName(name));
    }
    if name == USER_AUTHOR {
        return Err(AgentError::ReservedName);
    }
    Ok(name)
}

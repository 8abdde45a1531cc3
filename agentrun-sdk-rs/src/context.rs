mod callback;
mod cost;

pub use callback::CallbackContext;
pub use cost::InvocationCostManager;

use crate::agent::Agent;
use crate::config::RunConfig;
use crate::content::Content;
use crate::error::Result;
use crate::services::{
    ArtifactService, CredentialService, MemoryService, PluginManager, SessionService,
};
use crate::session::{Session, SharedSession};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

pub fn new_invocation_id() -> String {
    format!("e-{}", Uuid::new_v4())
}

/// Service handles reachable from callbacks and tools.
#[derive(Clone, Default)]
pub struct Services {
    pub artifact_service: Option<Arc<dyn ArtifactService>>,
    pub session_service: Option<Arc<dyn SessionService>>,
    pub memory_service: Option<Arc<dyn MemoryService>>,
    pub credential_service: Option<Arc<dyn CredentialService>>,
    pub plugin_manager: Option<Arc<dyn PluginManager>>,
}

/// Everything one run of the agent tree needs.
///
/// Created once per top-level invocation and derived for every agent the run
/// visits. Derived contexts share the session, the services and the
/// model-call counter; the target agent, the branch and the
/// end-of-invocation flag are their own.
#[derive(Clone)]
pub struct InvocationContext {
    invocation_id: String,
    agent: Arc<Agent>,
    session: SharedSession,
    app_name: String,
    user_id: String,
    session_id: String,
    branch: Option<String>,
    user_content: Option<Content>,
    run_config: Arc<RunConfig>,
    services: Services,
    end_invocation: Arc<AtomicBool>,
    cost_manager: Arc<InvocationCostManager>,
}

impl InvocationContext {
    pub fn new(agent: Arc<Agent>, session: Session) -> Self {
        Self {
            invocation_id: new_invocation_id(),
            agent,
            app_name: session.app_name.clone(),
            user_id: session.user_id.clone(),
            session_id: session.id.clone(),
            session: session.into_shared(),
            branch: None,
            user_content: None,
            run_config: Arc::new(RunConfig::default()),
            services: Services::default(),
            end_invocation: Arc::new(AtomicBool::new(false)),
            cost_manager: Arc::new(InvocationCostManager::new()),
        }
    }

    pub fn with_invocation_id(mut self, invocation_id: impl Into<String>) -> Self {
        self.invocation_id = invocation_id.into();
        self
    }

    pub fn with_run_config(mut self, run_config: RunConfig) -> Self {
        self.run_config = Arc::new(run_config);
        self
    }

    pub fn with_user_content(mut self, user_content: Content) -> Self {
        self.user_content = Some(user_content);
        self
    }

    pub fn with_branch(mut self, branch: Option<String>) -> Self {
        self.branch = branch;
        self
    }

    pub fn with_services(mut self, services: Services) -> Self {
        self.services = services;
        self
    }

    pub fn with_artifact_service(mut self, service: Arc<dyn ArtifactService>) -> Self {
        self.services.artifact_service = Some(service);
        self
    }

    pub fn with_session_service(mut self, service: Arc<dyn SessionService>) -> Self {
        self.services.session_service = Some(service);
        self
    }

    pub fn with_memory_service(mut self, service: Arc<dyn MemoryService>) -> Self {
        self.services.memory_service = Some(service);
        self
    }

    pub fn with_credential_service(mut self, service: Arc<dyn CredentialService>) -> Self {
        self.services.credential_service = Some(service);
        self
    }

    pub fn with_plugin_manager(mut self, plugin_manager: Arc<dyn PluginManager>) -> Self {
        self.services.plugin_manager = Some(plugin_manager);
        self
    }

    /// Context for `agent` within the same invocation.
    ///
    /// The agent already targeted by this context keeps its branch and its
    /// end-of-invocation flag. Any other agent gets the branch extended with
    /// its name and a flag of its own, seeded from this one, so ending the
    /// invocation there does not end it here.
    pub(crate) fn for_agent(&self, agent: &Arc<Agent>) -> Self {
        if Arc::ptr_eq(&self.agent, agent) {
            return self.clone();
        }

        Self {
            agent: Arc::clone(agent),
            branch: self
                .branch
                .as_ref()
                .map(|branch| format!("{}.{}", branch, agent.name())),
            end_invocation: Arc::new(AtomicBool::new(self.is_ended())),
            ..self.clone()
        }
    }

    pub fn invocation_id(&self) -> &str {
        &self.invocation_id
    }

    pub fn agent(&self) -> &Arc<Agent> {
        &self.agent
    }

    pub fn session(&self) -> &SharedSession {
        &self.session
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn branch(&self) -> Option<&str> {
        self.branch.as_deref()
    }

    pub fn user_content(&self) -> Option<&Content> {
        self.user_content.as_ref()
    }

    pub fn run_config(&self) -> &RunConfig {
        &self.run_config
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    /// Marks the invocation as finished for this agent and the run step it
    /// drives. There is no way back.
    pub fn end_invocation(&self) {
        self.end_invocation.store(true, Ordering::SeqCst);
    }

    pub fn is_ended(&self) -> bool {
        self.end_invocation.load(Ordering::SeqCst)
    }

    /// Called once per outbound model call. Fails when the run's budget is
    /// exhausted.
    pub fn increment_llm_call_count(&self) -> Result<u64> {
        self.cost_manager
            .increment_and_enforce_llm_calls_limit(&self.run_config)
    }

    pub fn llm_call_count(&self) -> u64 {
        self.cost_manager.llm_calls()
    }
}

impl fmt::Debug for InvocationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvocationContext")
            .field("invocation_id", &self.invocation_id)
            .field("agent", &self.agent.name())
            .field("session_id", &self.session_id)
            .field("branch", &self.branch)
            .field("end_invocation", &self.is_ended())
            .field("llm_calls", &self.llm_call_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{Agent, AgentConfig};
    use crate::error::AgentError;

    fn tree() -> (Arc<Agent>, Arc<Agent>) {
        let child = Agent::new(AgentConfig::new("child")).unwrap();
        let root = Agent::new(AgentConfig::new("root").with_sub_agent(Arc::clone(&child))).unwrap();
        (root, child)
    }

    #[test]
    fn test_new_context_defaults() {
        let (root, _) = tree();
        let ctx = InvocationContext::new(root, Session::new("s-1", "app", "u-1"));

        assert!(ctx.invocation_id().starts_with("e-"));
        assert_eq!(ctx.app_name(), "app");
        assert_eq!(ctx.user_id(), "u-1");
        assert_eq!(ctx.session_id(), "s-1");
        assert!(!ctx.is_ended());
        assert_eq!(ctx.run_config().max_llm_calls, 500);
    }

    #[test]
    fn test_derived_context_shares_counter() {
        let (root, child) = tree();
        let ctx = InvocationContext::new(root, Session::new("s-1", "app", "u-1"))
            .with_run_config(RunConfig::default().with_max_llm_calls(3));
        let derived = ctx.for_agent(&child);

        assert_eq!(derived.agent().name(), "child");
        assert_eq!(derived.invocation_id(), ctx.invocation_id());
        assert!(Arc::ptr_eq(derived.session(), ctx.session()));

        ctx.increment_llm_call_count().unwrap();
        derived.increment_llm_call_count().unwrap();
        ctx.increment_llm_call_count().unwrap();
        let err = derived.increment_llm_call_count().unwrap_err();
        assert!(matches!(err, AgentError::BudgetExceeded { limit: 3 }));
        assert_eq!(ctx.llm_call_count(), 4);
    }

    #[test]
    fn test_derived_context_owns_its_end_flag() {
        let (root, child) = tree();
        let ctx = InvocationContext::new(Arc::clone(&root), Session::new("s-1", "app", "u-1"));

        let derived = ctx.for_agent(&child);
        derived.end_invocation();
        assert!(derived.is_ended());
        assert!(!ctx.is_ended());

        let same_agent = ctx.for_agent(&root);
        same_agent.end_invocation();
        assert!(ctx.is_ended());

        let late = ctx.for_agent(&child);
        assert!(late.is_ended());
    }

    #[test]
    fn test_branch_extends_only_for_other_agents() {
        let (root, child) = tree();
        let ctx = InvocationContext::new(Arc::clone(&root), Session::new("s-1", "app", "u-1"));
        assert_eq!(ctx.for_agent(&child).branch(), None);

        let branched = ctx.with_branch(Some("root".into()));
        assert_eq!(branched.for_agent(&root).branch(), Some("root"));
        assert_eq!(branched.for_agent(&child).branch(), Some("root.child"));
    }
}

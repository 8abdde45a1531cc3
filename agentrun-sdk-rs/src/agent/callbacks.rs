use crate::content::Content;
use crate::context::{CallbackContext, InvocationContext};
use crate::error::Result;
use crate::events::{Event, EventActions};
use async_trait::async_trait;
use std::sync::Arc;

/// Hook run before or after an agent's run step. Returning content
/// short-circuits the rest of the chain.
#[async_trait]
pub trait AgentCallback: Send + Sync {
    async fn call(&self, ctx: &mut CallbackContext) -> Result<Option<Content>>;
}

#[async_trait]
impl<F> AgentCallback for F
where
    F: Fn(&mut CallbackContext) -> Result<Option<Content>> + Send + Sync,
{
    async fn call(&self, ctx: &mut CallbackContext) -> Result<Option<Content>> {
        self(ctx)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CallbackPhase {
    Before,
    After,
}

/// Runs `callbacks` in order against one shared [`CallbackContext`].
///
/// The first callback returning content wins and the rest are skipped; in
/// the before phase that also ends the invocation. Without content, pending
/// state changes still come back as an event so they reach the session.
pub(crate) async fn run_callback_chain(
    callbacks: &[Arc<dyn AgentCallback>],
    invocation: &InvocationContext,
    actions: Option<EventActions>,
    phase: CallbackPhase,
) -> Result<Option<Event>> {
    if callbacks.is_empty() {
        return Ok(None);
    }

    let mut ctx = CallbackContext::new(invocation, actions).await;
    for callback in callbacks {
        let Some(content) = callback.call(&mut ctx).await? else {
            continue;
        };
        if phase == CallbackPhase::Before {
            invocation.end_invocation();
        }
        tracing::debug!(
            "{:?} callback of {} short-circuited the chain",
            phase,
            invocation.agent().name()
        );
        return Ok(Some(
            chain_event(invocation, ctx.into_actions()).with_content(content),
        ));
    }

    if ctx.actions().state_delta.is_empty() {
        return Ok(None);
    }
    Ok(Some(chain_event(invocation, ctx.into_actions())))
}

fn chain_event(invocation: &InvocationContext, actions: EventActions) -> Event {
    Event::new(invocation.invocation_id(), invocation.agent().name())
        .with_branch(invocation.branch().map(str::to_owned))
        .with_actions(actions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{Agent, AgentConfig};
    use crate::error::AgentError;
    use crate::session::Session;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn invocation() -> InvocationContext {
        let agent = Agent::new(AgentConfig::new("host")).unwrap();
        InvocationContext::new(agent, Session::new("s-1", "app", "u-1"))
            .with_branch(Some("host".into()))
    }

    fn noop() -> Arc<dyn AgentCallback> {
        Arc::new(|_ctx: &mut CallbackContext| -> Result<Option<Content>> { Ok(None) })
    }

    #[tokio::test]
    async fn test_empty_chain_produces_nothing() {
        let ctx = invocation();
        let event = run_callback_chain(&[], &ctx, None, CallbackPhase::Before)
            .await
            .unwrap();
        assert!(event.is_none());
        assert!(!ctx.is_ended());
    }

    #[tokio::test]
    async fn test_silent_chain_produces_nothing() {
        let ctx = invocation();
        let event = run_callback_chain(&[noop(), noop()], &ctx, None, CallbackPhase::After)
            .await
            .unwrap();
        assert!(event.is_none());
    }

    #[tokio::test]
    async fn test_first_content_wins_and_keeps_earlier_state() {
        let ctx = invocation();
        let third_calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&third_calls);
        let callbacks: Vec<Arc<dyn AgentCallback>> = vec![
            Arc::new(|ctx: &mut CallbackContext| -> Result<Option<Content>> {
                ctx.set_state("seen", json!(1));
                Ok(None)
            }),
            Arc::new(|ctx: &mut CallbackContext| -> Result<Option<Content>> {
                let seen = ctx.get_state("seen").cloned().unwrap_or_default();
                Ok(Some(Content::model_text(format!("seen={seen}"))))
            }),
            Arc::new(move |_ctx: &mut CallbackContext| -> Result<Option<Content>> {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Some(Content::model_text("too late")))
            }),
        ];

        let event = run_callback_chain(&callbacks, &ctx, None, CallbackPhase::After)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(event.stringify_content(), "seen=1");
        assert_eq!(event.author, "host");
        assert_eq!(event.branch.as_deref(), Some("host"));
        assert_eq!(event.actions.state_delta["seen"], json!(1));
        assert_eq!(third_calls.load(Ordering::SeqCst), 0);
        assert!(!ctx.is_ended());
    }

    #[tokio::test]
    async fn test_before_phase_content_ends_invocation() {
        let ctx = invocation();
        let callbacks: Vec<Arc<dyn AgentCallback>> = vec![Arc::new(
            |_ctx: &mut CallbackContext| -> Result<Option<Content>> {
                Ok(Some(Content::model_text("stop")))
            },
        )];

        let event = run_callback_chain(&callbacks, &ctx, None, CallbackPhase::Before)
            .await
            .unwrap();

        assert!(event.is_some());
        assert!(ctx.is_ended());
    }

    #[tokio::test]
    async fn test_supplied_delta_is_visible_and_carried() {
        let ctx = invocation();
        let seed = EventActions::default().with_state_delta([("mode", json!("fast"))]);
        let callbacks: Vec<Arc<dyn AgentCallback>> = vec![Arc::new(
            |ctx: &mut CallbackContext| -> Result<Option<Content>> {
                assert_eq!(ctx.get_state("mode"), Some(&json!("fast")));
                Ok(None)
            },
        )];

        let event = run_callback_chain(&callbacks, &ctx, Some(seed), CallbackPhase::After)
            .await
            .unwrap()
            .unwrap();

        assert!(event.content().is_none());
        assert_eq!(event.actions.state_delta["mode"], json!("fast"));
    }

    #[tokio::test]
    async fn test_callback_error_propagates() {
        let ctx = invocation();
        let callbacks: Vec<Arc<dyn AgentCallback>> = vec![Arc::new(
            |_ctx: &mut CallbackContext| -> Result<Option<Content>> {
                Err(AgentError::Callback("boom".into()))
            },
        )];

        let err = run_callback_chain(&callbacks, &ctx, None, CallbackPhase::Before)
            .await
            .unwrap_err();

        assert!(matches!(err, AgentError::Callback(ref m) if m == "boom"));
        assert!(!ctx.is_ended());
    }
}

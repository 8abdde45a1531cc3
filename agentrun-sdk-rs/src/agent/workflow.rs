use super::{Agent, EventStream, into_event_stream};
use crate::context::InvocationContext;
use async_stream::try_stream;
use futures::StreamExt;
use futures::stream::select_all;
use std::sync::Arc;

/// Runs the sub-agents one after another, forwarding their events.
pub(crate) fn run_sequential(agent: Arc<Agent>, ctx: InvocationContext) -> EventStream {
    into_event_stream(try_stream! {
        for sub_agent in agent.sub_agents() {
            if ctx.is_ended() {
                tracing::debug!("Invocation ended before {} could run", sub_agent.name());
                break;
            }
            let mut events = sub_agent.run(&ctx);
            while let Some(event) = events.next().await {
                yield event?;
            }
        }
    })
}

/// Runs every sub-agent on its own branch and interleaves their events in
/// the order they become ready. All children are polled from the consumer's
/// task.
pub(crate) fn run_parallel(agent: Arc<Agent>, ctx: InvocationContext) -> EventStream {
    into_event_stream(try_stream! {
        if agent.sub_agents().is_empty() {
            return;
        }
        let branch = ctx
            .branch()
            .map(str::to_owned)
            .unwrap_or_else(|| agent.name().to_string());
        let branch_ctx = ctx.with_branch(Some(branch));

        let mut events = select_all(
            agent
                .sub_agents()
                .iter()
                .map(|sub_agent| sub_agent.run(&branch_ctx)),
        );
        while let Some(event) = events.next().await {
            yield event?;
        }
    })
}

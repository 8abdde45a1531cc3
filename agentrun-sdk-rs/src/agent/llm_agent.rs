use super::{EventStream, into_event_stream};
use crate::config::StreamingMode;
use crate::content::{Content, FunctionCall, FunctionResponse, Part, ROLE_MODEL, ROLE_USER};
use crate::context::InvocationContext;
use crate::error::{AgentError, Result};
use crate::events::{Event, EventActions, USER_AUTHOR};
use crate::llm::{BaseLlm, GenerateContentConfig, LlmRequest, LlmResponse};
use crate::tools::{BaseTool, ToolContext};
use async_stream::try_stream;
use futures::StreamExt;
use serde_json::{Value, json};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

const FUNCTION_CALL_ID_PREFIX: &str = "adk-";

/// Model, instruction and tools of an [`AgentKind::Llm`](super::AgentKind) agent.
#[derive(Clone)]
pub struct LlmAgentConfig {
    pub model: Arc<dyn BaseLlm>,
    pub instruction: Option<String>,
    pub tools: Vec<Arc<dyn BaseTool>>,
    pub generate_content_config: GenerateContentConfig,
}

impl LlmAgentConfig {
    pub fn new(model: Arc<dyn BaseLlm>) -> Self {
        Self {
            model,
            instruction: None,
            tools: Vec::new(),
            generate_content_config: GenerateContentConfig::default(),
        }
    }

    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = Some(instruction.into());
        self
    }

    pub fn with_tool(mut self, tool: impl BaseTool + 'static) -> Self {
        self.tools.push(Arc::new(tool));
        self
    }

    pub fn with_tools(mut self, tools: impl IntoIterator<Item = Arc<dyn BaseTool>>) -> Self {
        self.tools.extend(tools);
        self
    }

    pub fn with_generate_content_config(mut self, config: GenerateContentConfig) -> Self {
        self.generate_content_config = config;
        self
    }

    fn find_tool(&self, name: &str) -> Result<&Arc<dyn BaseTool>> {
        self.tools
            .iter()
            .find(|tool| tool.name() == name)
            .ok_or_else(|| AgentError::ToolNotFound(name.to_string()))
    }
}

/// The model loop: call the model, run the tools it asks for, feed the
/// results back, until it answers without calling anything.
pub(crate) fn run(config: LlmAgentConfig, ctx: InvocationContext) -> EventStream {
    into_event_stream(try_stream! {
        // Turns produced by this loop, in case the caller does not persist
        // events to the session while consuming the stream.
        let mut own_turns: Vec<Event> = Vec::new();
        let stream = ctx.run_config().streaming_mode == StreamingMode::Sse;

        loop {
            if ctx.is_ended() {
                break;
            }
            let request = build_request(&config, &ctx, &own_turns).await;
            let call_count = ctx.increment_llm_call_count()?;
            tracing::debug!(
                "{} calling model {} (call {} of this invocation)",
                ctx.agent().name(),
                config.model.model(),
                call_count
            );

            let mut responses = config.model.generate_content(request, stream);
            let mut final_event = None;
            while let Some(response) = responses.next().await {
                let event = model_event(&config, &ctx, response?);
                if !event.is_partial() {
                    final_event = Some(event.clone());
                }
                yield event;
            }

            let Some(model_turn) = final_event else {
                break;
            };
            if model_turn.response.is_error() {
                tracing::warn!(
                    "Model {} answered with error {}: {}",
                    config.model.model(),
                    model_turn.response.error_code.as_deref().unwrap_or_default(),
                    model_turn.response.error_message.as_deref().unwrap_or_default()
                );
                break;
            }
            let calls: Vec<FunctionCall> = model_turn.function_calls().into_iter().cloned().collect();
            if calls.is_empty() {
                break;
            }
            let long_running = !model_turn.long_running_tool_ids.is_empty();
            own_turns.push(model_turn);

            let response_event = call_tools(&config, &ctx, &calls).await?;
            let actions = response_event.actions.clone();
            own_turns.push(response_event.clone());
            yield response_event;

            if let Some(target) = actions.transfer_to_agent.as_deref() {
                let agent = ctx
                    .agent()
                    .root_agent()
                    .find_agent(target)
                    .ok_or_else(|| AgentError::AgentNotFound(target.to_string()))?;
                tracing::info!("Transferring from {} to {}", ctx.agent().name(), agent.name());
                let mut events = agent.run(&ctx);
                while let Some(event) = events.next().await {
                    yield event?;
                }
                break;
            }
            if long_running
                || actions.escalate == Some(true)
                || actions.skip_summarization == Some(true)
            {
                break;
            }
        }
    })
}

/// Wraps one model response, giving every function call an id and marking
/// calls to long-running tools.
fn model_event(
    config: &LlmAgentConfig,
    ctx: &InvocationContext,
    mut response: LlmResponse,
) -> Event {
    let mut long_running_ids = Vec::new();
    if let Some(content) = response.content.as_mut() {
        for call in content.parts.iter_mut().filter_map(|p| p.function_call.as_mut()) {
            let id = call
                .id
                .get_or_insert_with(|| format!("{}{}", FUNCTION_CALL_ID_PREFIX, Uuid::new_v4()))
                .clone();
            if config
                .tools
                .iter()
                .any(|tool| tool.name() == call.name && tool.is_long_running())
            {
                long_running_ids.push(id);
            }
        }
    }

    Event::from_response(
        ctx.invocation_id(),
        ctx.agent().name(),
        ctx.branch().map(str::to_owned),
        response,
    )
    .with_long_running_tool_ids(long_running_ids)
}

/// Runs the requested tools in order and folds their results into one
/// function-response event.
async fn call_tools(
    config: &LlmAgentConfig,
    ctx: &InvocationContext,
    calls: &[FunctionCall],
) -> Result<Event> {
    let mut parts = Vec::with_capacity(calls.len());
    let mut tool_actions = Vec::with_capacity(calls.len());

    for call in calls {
        let tool = config.find_tool(&call.name)?;
        tracing::debug!("Running tool {} ({:?})", call.name, call.id);
        let mut tool_ctx = ToolContext::new(ctx, None, call.id.clone()).await;
        let result = tool.run(call.args.clone(), &mut tool_ctx).await?;

        parts.push(Part::function_response(FunctionResponse {
            id: call.id.clone(),
            name: call.name.clone(),
            response: wrap_tool_result(result),
        }));
        tool_actions.push(tool_ctx.into_actions());
    }

    Ok(Event::new(ctx.invocation_id(), ctx.agent().name())
        .with_branch(ctx.branch().map(str::to_owned))
        .with_content(Content::new(ROLE_USER, parts))
        .with_actions(EventActions::merge(&tool_actions, None)))
}

fn wrap_tool_result(result: Value) -> Value {
    if result.is_object() {
        result
    } else {
        json!({ "result": result })
    }
}

async fn build_request(
    config: &LlmAgentConfig,
    ctx: &InvocationContext,
    own_turns: &[Event],
) -> LlmRequest {
    let mut request = LlmRequest::new(config.model.model());
    request.config = config.generate_content_config.clone();
    if let Some(instruction) = &config.instruction {
        request.append_instructions([instruction.clone()]);
    }
    request.append_tools(&config.tools);

    let own_ids: HashSet<&str> = own_turns.iter().map(Event::id).collect();
    let user_turn_recorded = {
        let session = ctx.session().read().await;
        request.contents.extend(
            session
                .events
                .iter()
                .filter(|event| !own_ids.contains(event.id()))
                .filter(|event| is_visible(event, ctx.branch()))
                .filter_map(|event| history_content(event, ctx.agent().name())),
        );
        session
            .events
            .iter()
            .any(|event| event.author == USER_AUTHOR && event.invocation_id == ctx.invocation_id())
    };

    // The user turn of this invocation goes in once, whoever persisted it.
    if let Some(user_content) = ctx.user_content().filter(|_| !user_turn_recorded) {
        request.contents.push(user_content.clone());
    }
    request.contents.extend(
        own_turns
            .iter()
            .filter_map(|event| history_content(event, ctx.agent().name())),
    );
    request.maybe_append_user_content();
    request
}

/// Events recorded on a branch are hidden from agents outside it. Branches
/// nest by dot separated segments, so `par.a` does not cover `par.ab`.
fn is_visible(event: &Event, branch: Option<&str>) -> bool {
    if event.is_partial() {
        return false;
    }
    match (event.branch.as_deref(), branch) {
        (Some(event_branch), Some(branch)) => branch
            .strip_prefix(event_branch)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('.')),
        _ => true,
    }
}

/// How a recorded event reads to the model of `agent_name`.
///
/// Own and user turns are replayed as they are; other agents' answers are
/// retold as user context so the model does not take them as its own.
fn history_content(event: &Event, agent_name: &str) -> Option<Content> {
    let content = event.content()?;
    if content.is_empty() {
        return None;
    }

    if event.author == USER_AUTHOR {
        return Some(Content {
            role: Some(ROLE_USER.to_string()),
            ..content.clone()
        });
    }
    if event.author == agent_name {
        let role = content.role.clone().unwrap_or_else(|| ROLE_MODEL.to_string());
        return Some(Content {
            role: Some(role),
            ..content.clone()
        });
    }

    let text = content.text();
    if text.is_empty() {
        return None;
    }
    Some(Content::user_text(format!(
        "For context: [{}] said: {}",
        event.author, text
    )))
}

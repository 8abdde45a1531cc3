use agentrun_sdk_rs::{
    Agent, AgentConfig, AgentKind, CallbackContext, InvocationContext, LlmAgentConfig, Result,
    config::RunConfig,
    content::{Content, FunctionCall, Part, ROLE_MODEL},
    llm::{BaseLlm, LlmFactory, LlmRegistry, LlmRequest, LlmResponse, LlmResponseStream},
    session::Session,
    tools::FunctionTool,
};
use futures::StreamExt;
use serde_json::json;
use std::sync::Arc;

/// Offline stand-in for a real model: asks for the clock tool once, then
/// echoes the last text it was given.
struct EchoLlm {
    model: String,
}

impl BaseLlm for EchoLlm {
    fn model(&self) -> &str {
        &self.model
    }

    fn generate_content(&self, request: LlmRequest, _stream: bool) -> LlmResponseStream {
        let answered_tool = request
            .contents
            .iter()
            .any(|c| c.parts.iter().any(|p| p.function_response.is_some()));
        let response = if answered_tool {
            let last = request
                .contents
                .iter()
                .rev()
                .map(Content::text)
                .find(|text| !text.is_empty())
                .unwrap_or_default();
            LlmResponse::from_content(Content::model_text(format!("[{}] echo: {}", self.model, last)))
        } else {
            LlmResponse::from_content(Content::new(
                ROLE_MODEL,
                vec![Part::function_call(FunctionCall::new("clock", json!({})))],
            ))
        };
        futures::stream::iter([Ok(response)]).boxed()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    agentrun_sdk_rs::logger::init_logging();

    // 1. Register model factories by name pattern
    let registry = LlmRegistry::new();
    let factory: LlmFactory = Arc::new(|model: &str| -> Arc<dyn BaseLlm> {
        Arc::new(EchoLlm {
            model: model.to_string(),
        })
    });
    registry.register(factory, ["echo-.*"])?;
    let model = registry.new_llm("echo-small")?;

    // 2. Build the tree: a greeter callback in front of a tool-using agent
    let clock = FunctionTool::new("clock", "Returns the current time", |_args, ctx| {
        ctx.set_state("asked_time", json!(true));
        Ok(json!(chrono::Utc::now().to_rfc3339()))
    });
    let assistant = Agent::new(
        AgentConfig::new("assistant")
            .with_description("Answers with the help of tools")
            .with_kind(AgentKind::Llm(
                LlmAgentConfig::new(model).with_instruction("Answer briefly.").with_tool(clock),
            )),
    )?;
    let root = Agent::new(
        AgentConfig::new("root")
            .with_before_callback(|ctx: &mut CallbackContext| -> Result<Option<Content>> {
                ctx.set_state("greeted", json!(true));
                Ok(None)
            })
            .with_sub_agent(assistant),
    )?;

    // 3. Run one invocation and print what happens
    let run_config = RunConfig::from_env();
    let ctx = InvocationContext::new(Arc::clone(&root), Session::new("demo-session", "demo", "demo-user"))
        .with_run_config(run_config)
        .with_user_content(Content::user_text("What time is it?"));

    let mut events = root.run(&ctx);
    while let Some(event) = events.next().await {
        let event = event?;
        println!(
            "[{}] final={} {}",
            event.author,
            event.is_final_response(),
            serde_json::to_string(&event.content()).unwrap_or_default()
        );
        ctx.session().write().await.append_event(event)?;
    }

    let session = ctx.session().read().await;
    println!("\nModel calls: {}", ctx.llm_call_count());
    println!("Session state: {:?}", session.state);
    Ok(())
}

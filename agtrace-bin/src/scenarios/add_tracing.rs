use agtrace_core::inference::{ChatCompletions, ScriptedClient};
use agtrace_core::model::ChatMessage;
use agtrace_core::telemetry::{keys, record_choice_event, record_message_event};
use async_trait::async_trait;
use serde_json::{Value, json};

use super::{Scenario, ScenarioCtx};

const PROMPT: &str = "Explain the benefits of continuous integration in 3 bullet points.";

const SUMMARY: &str = "- Integration problems surface within minutes of a push instead of at release time.
- Every change is built and tested the same way, so main stays releasable.
- Small, frequent merges keep reviews short and conflicts rare.";

pub struct AddTracing;

#[async_trait]
impl Scenario for AddTracing {
    fn id(&self) -> &'static str {
        "00_add_tracing"
    }

    fn about(&self) -> &'static str {
        "baseline: a single traced completion"
    }

    async fn run(&self, ctx: &ScenarioCtx) -> anyhow::Result<Value> {
        let client = ctx.client(ScriptedClient::new().reply(SUMMARY));
        ctx.tracer
            .in_span_async("scenario_00", |span| async move {
                ctx.tag(&span, "add_tracing");
                record_message_event(&span, keys::EVENT_USER_MESSAGE, "user", PROMPT);
                let req = ctx.request(vec![
                    ChatMessage::system("You are a helpful assistant."),
                    ChatMessage::user(PROMPT),
                ]);
                let text = client.complete(req).await?.text();
                record_choice_event(&span, &text);
                Ok::<_, anyhow::Error>(json!({ "summary": text.trim() }))
            })
            .await
    }
}

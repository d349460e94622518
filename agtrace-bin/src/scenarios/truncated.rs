use agtrace_core::inference::{ChatCompletions, ScriptedClient};
use agtrace_core::model::{ChatMessage, FinishReason};
use agtrace_core::telemetry::{keys, record_choice_event, record_message_event};
use anyhow::Context;
use async_trait::async_trait;
use serde_json::{Value, json};

use super::{Scenario, ScenarioCtx};

const QUERY: &str = "Summarize the benefits of CI/CD and trunk-based development.";

/// Output budget that cuts the scripted summary short.
const STARVED_BUDGET: u32 = 50;
const FULL_BUDGET: u32 = 800;

const LONG_SUMMARY: &str = "Continuous integration and continuous delivery shorten the path \
from a commit to production. Every change is built and tested automatically, so defects are \
found while the author still remembers the code, and the main branch stays in a releasable \
state. Trunk-based development complements this by keeping branches short lived: developers \
merge small changes into the trunk at least daily, which keeps merge conflicts small and \
reviews focused. Together they replace large, risky releases with a steady flow of small \
ones. Feature flags let unfinished work ship dark, rollbacks become routine, and lead time \
drops because nothing waits for a release train. Teams also get faster feedback from real \
users, clearer ownership of broken builds, and an audit trail of exactly what shipped when.";

pub struct TruncatedResponses;

#[async_trait]
impl Scenario for TruncatedResponses {
    fn id(&self) -> &'static str {
        "04_truncated_responses"
    }

    fn about(&self) -> &'static str {
        "asks for a long summary with an output budget that may be too small"
    }

    async fn run(&self, ctx: &ScenarioCtx) -> anyhow::Result<Value> {
        let budget = if ctx.inject_bugs { STARVED_BUDGET } else { FULL_BUDGET };
        let client = ctx.client(ScriptedClient::new().reply(LONG_SUMMARY));
        ctx.tracer
            .in_span_async("scenario_04", |span| async move {
                ctx.tag(&span, "truncated_responses");
                span.set_attribute("max_output_tokens", i64::from(budget));
                record_message_event(&span, keys::EVENT_USER_MESSAGE, "user", QUERY);

                let req = ctx
                    .request(vec![
                        ChatMessage::system("You write detailed summaries of 400-600 words."),
                        ChatMessage::user(QUERY),
                    ])
                    .max_tokens(budget);
                let resp = client.complete(req).await?;
                let choice = resp.first_choice().context("completion returned no choices")?;
                let text = choice.message.content.to_plain_text();
                record_choice_event(&span, &text);

                let truncated = choice.finish_reason == FinishReason::Length;
                span.set_attribute("finish_reason", choice.finish_reason.as_str());
                span.set_attribute("response_truncated", truncated);
                Ok::<_, anyhow::Error>(json!({
                    "finish_reason": choice.finish_reason.as_str(),
                    "truncated": truncated,
                    "text": text,
                }))
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenarios::testing::{Harness, SpanDataExt};
    use agtrace_core::telemetry::Value as AttrValue;

    #[tokio::test]
    async fn small_budget_truncates_and_is_flagged() {
        let h = Harness::new(false);
        let out = TruncatedResponses.run(&h.ctx("scenario04", true)).await.unwrap();
        assert_eq!(out["finish_reason"], "length");
        assert_eq!(out["text"].as_str().unwrap().split_whitespace().count(), 50);

        let root = h.span("scenario_04");
        assert_eq!(root.attribute("response_truncated"), Some(&AttrValue::Bool(true)));
        assert_eq!(root.attribute("max_output_tokens"), Some(&AttrValue::I64(50)));
        let chat = h.span("chat gpt-4o-mini");
        assert_eq!(
            chat.attribute(keys::GEN_AI_RESPONSE_FINISH_REASONS),
            Some(&AttrValue::from("length"))
        );
    }

    #[tokio::test]
    async fn full_budget_finishes_normally() {
        let h = Harness::new(false);
        let out = TruncatedResponses.run(&h.ctx("scenario04", false)).await.unwrap();
        assert_eq!(out["finish_reason"], "stop");
        assert_eq!(out["text"], LONG_SUMMARY);
        let root = h.span("scenario_04");
        assert_eq!(root.attribute("response_truncated"), Some(&AttrValue::Bool(false)));
    }
}

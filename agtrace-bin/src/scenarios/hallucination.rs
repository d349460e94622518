use std::convert::Infallible;

use agtrace_core::inference::{ChatCompletions, ScriptedClient};
use agtrace_core::model::ChatMessage;
use agtrace_core::telemetry::{keys, record_choice_event, record_message_event};
use async_trait::async_trait;
use serde_json::{Value, json};

use super::{Scenario, ScenarioCtx};

const KNOWLEDGE_BASE: &[(&str, &str)] = &[
    (
        "pto_policy",
        "Employees accrue 1.5 days PTO per month. Carryover up to 5 days.",
    ),
    (
        "expense_policy",
        "Travel meals capped at $60/day. Receipts required.",
    ),
];

const GROUNDED_ANSWER: &str =
    "Per the policy: \"Employees accrue 1.5 days PTO per month. Carryover up to 5 days.\"";

const HALLUCINATED_ANSWER: &str =
    "Employees get 25 days of PTO per year and unused days roll over without limit.";

fn lookup(topic: &str) -> &'static str {
    KNOWLEDGE_BASE
        .iter()
        .find(|(k, _)| *k == topic)
        .map(|(_, v)| *v)
        .unwrap_or_default()
}

pub struct SkipsRetrieval;

#[async_trait]
impl Scenario for SkipsRetrieval {
    fn id(&self) -> &'static str {
        "01_hallucination_skips_retrieval"
    }

    fn about(&self) -> &'static str {
        "answers a policy question, sometimes without retrieving the policy"
    }

    async fn run(&self, ctx: &ScenarioCtx) -> anyhow::Result<Value> {
        let use_kb = !ctx.inject_bugs || fastrand::bool();
        answer_question(ctx, "pto_policy", use_kb).await
    }
}

async fn answer_question(ctx: &ScenarioCtx, topic: &str, use_kb: bool) -> anyhow::Result<Value> {
    let scripted = if use_kb { GROUNDED_ANSWER } else { HALLUCINATED_ANSWER };
    let client = ctx.client(ScriptedClient::new().reply(scripted));

    ctx.tracer
        .in_span_async("scenario_01", |span| async move {
            ctx.tag(&span, "hallucination_skips_retrieval");
            span.set_attribute("retrieval.used", use_kb);
            if !use_kb {
                span.set_attribute("bug.skipped_retrieval", true);
            }

            let Ok(snippet) = ctx.tracer.in_span("retrieval", |step| {
                if !use_kb {
                    step.set_attribute("retrieval.skipped", true);
                    return Ok::<_, Infallible>("");
                }
                ctx.tracer.in_span("knowledge_base_lookup", |lookup_span| {
                    lookup_span.set_attribute("kb.topic", topic.to_string());
                    let hit = lookup(topic);
                    lookup_span.set_attribute("kb.hit", !hit.is_empty());
                    Ok(hit)
                })
            });

            let Ok(messages) = ctx.tracer.in_span("construct_prompt", |step| {
                let mut system = String::from(
                    "You are an internal policy assistant. Cite retrieved snippets verbatim.\n",
                );
                system.push_str(if use_kb {
                    "DO NOT use external knowledge.\n"
                } else {
                    "Be brief and helpful.\n"
                });
                let mut messages = vec![
                    ChatMessage::system(system),
                    ChatMessage::user(format!("What's our {}?", topic.replace('_', " "))),
                ];
                if !snippet.is_empty() {
                    messages.push(ChatMessage::assistant(format!("[retrieved]\n{snippet}")));
                }
                step.set_attribute("prompt.messages", messages.len() as i64);
                Ok::<_, Infallible>(messages)
            });
            if let Some(question) = messages.get(1) {
                record_message_event(
                    &span,
                    keys::EVENT_USER_MESSAGE,
                    "user",
                    &question.content.to_plain_text(),
                );
            }

            let answer = client.complete(ctx.request(messages)).await?.text();
            record_choice_event(&span, &answer);
            Ok::<_, anyhow::Error>(json!({
                "use_kb": use_kb,
                "kb_snippet": snippet,
                "answer": answer,
            }))
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenarios::testing::{Harness, SpanDataExt};
    use agtrace_core::telemetry::Value as AttrValue;

    #[tokio::test]
    async fn retrieval_feeds_the_prompt() {
        let h = Harness::new(false);
        let out = answer_question(&h.ctx("scenario01", true), "pto_policy", true)
            .await
            .unwrap();
        assert_eq!(out["kb_snippet"], lookup("pto_policy"));
        assert_eq!(out["answer"], GROUNDED_ANSWER);

        let root = h.span("scenario_01");
        let retrieval = h.span("retrieval");
        let kb = h.span("knowledge_base_lookup");
        assert_eq!(retrieval.parent_span_id, root.span_context.span_id());
        assert_eq!(kb.parent_span_id, retrieval.span_context.span_id());
        assert_eq!(kb.attribute("kb.hit"), Some(&AttrValue::Bool(true)));
        assert_eq!(root.attribute("bug.skipped_retrieval"), None);
    }

    #[tokio::test]
    async fn skipped_retrieval_is_visible_on_the_trace() {
        let h = Harness::new(false);
        let out = answer_question(&h.ctx("scenario01", true), "pto_policy", false)
            .await
            .unwrap();
        assert_eq!(out["kb_snippet"], "");
        assert_eq!(out["answer"], HALLUCINATED_ANSWER);

        let root = h.span("scenario_01");
        assert_eq!(root.attribute("retrieval.used"), Some(&AttrValue::Bool(false)));
        assert_eq!(root.attribute("bug.skipped_retrieval"), Some(&AttrValue::Bool(true)));
        assert!(h.finished().iter().all(|s| s.name != "knowledge_base_lookup"));
    }

    #[tokio::test]
    async fn without_bugs_retrieval_always_runs() {
        let h = Harness::new(false);
        for _ in 0..5 {
            let out = SkipsRetrieval.run(&h.ctx("scenario01", false)).await.unwrap();
            assert_eq!(out["use_kb"], true);
        }
    }
}

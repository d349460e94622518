use std::time::Duration;

use agtrace_core::inference::{ChatCompletions, ScriptedClient};
use agtrace_core::model::ChatMessage;
use agtrace_core::{CoreResult, TraceError};
use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::warn;

use super::{Scenario, ScenarioCtx};

const PARSE_TIMEOUT_MS: u32 = 100;
/// How long the simulated external parser takes.
const PARSE_WORK: Duration = Duration::from_millis(250);

pub struct ToolTimeoutSwallowed;

#[async_trait]
impl Scenario for ToolTimeoutSwallowed {
    fn id(&self) -> &'static str {
        "06_tool_timeout_swallowed"
    }

    fn about(&self) -> &'static str {
        "a document-parser tool times out and the agent carries on with partial data"
    }

    async fn run(&self, ctx: &ScenarioCtx) -> anyhow::Result<Value> {
        ctx.tracer
            .in_span_async("scenario_06", |span| async move {
                ctx.tag(&span, "tool_timeout_swallowed");
                let (sections, degraded) = match parse_doc(ctx, "dummy").await {
                    Ok(sections) => (sections, false),
                    Err(e) if ctx.inject_bugs => {
                        // swallowed: the only trace of the failure is this marker span
                        let marker = ctx.tracer.start_span("tool.doc_parser.error");
                        marker.set_attribute("error", e.to_string());
                        marker.end();
                        (vec!["A".to_string()], false)
                    }
                    Err(e) => {
                        warn!(error = %e, "doc parser failed; continuing with partial sections");
                        span.set_attribute("tool.degraded", true);
                        (vec!["A".to_string()], true)
                    }
                };

                let client = ctx.client(ScriptedClient::new().reply(format!(
                    "Section {}: nothing notable.",
                    sections.join(", ")
                )));
                let req = ctx.request(vec![
                    ChatMessage::system("Summarize each section found."),
                    ChatMessage::user(json!({ "sections": sections }).to_string()),
                ]);
                let summary = client.complete(req).await?.text();
                Ok::<_, anyhow::Error>(json!({
                    "summary": summary,
                    "sections": sections,
                    "degraded": degraded,
                }))
            })
            .await
    }
}

async fn parse_doc(ctx: &ScenarioCtx, doc: &str) -> CoreResult<Vec<String>> {
    let limit = Duration::from_millis(PARSE_TIMEOUT_MS.into());
    ctx.tracer
        .in_span_async("tool.doc_parser", |span| async move {
            span.set_attribute("timeout_ms", i64::from(PARSE_TIMEOUT_MS));
            span.set_attribute("doc.length", doc.len() as i64);
            tokio::time::timeout(limit, slow_parse())
                .await
                .map_err(|_| TraceError::Timeout(limit))
        })
        .await
}

async fn slow_parse() -> Vec<String> {
    tokio::time::sleep(PARSE_WORK).await;
    ["A", "B", "C"].map(String::from).to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenarios::testing::{Harness, SpanDataExt};
    use agtrace_core::telemetry::{Value as AttrValue, keys};

    #[tokio::test]
    async fn parser_span_records_the_timeout() {
        let h = Harness::new(false);
        ToolTimeoutSwallowed.run(&h.ctx("scenario06", true)).await.unwrap();
        let parser = h.span("tool.doc_parser");
        assert!(parser.has_error());
        assert_eq!(
            parser.attribute(keys::KEY_ERROR_TYPE),
            Some(&AttrValue::from(std::any::type_name::<TraceError>()))
        );
        assert_eq!(parser.parent_span_id, h.span("scenario_06").span_context.span_id());
    }

    #[tokio::test]
    async fn injected_bug_degrades_silently() {
        let h = Harness::new(false);
        let out = ToolTimeoutSwallowed.run(&h.ctx("scenario06", true)).await.unwrap();
        assert_eq!(out["sections"], json!(["A"]));
        assert_eq!(out["degraded"], false);
        let marker = h.span("tool.doc_parser.error");
        assert!(marker.attribute("error").unwrap().as_str().contains("timed out"));
        assert_eq!(h.span("scenario_06").attribute("tool.degraded"), None);
    }

    #[tokio::test]
    async fn fixed_path_reports_degradation() {
        let h = Harness::new(false);
        let out = ToolTimeoutSwallowed.run(&h.ctx("scenario06", false)).await.unwrap();
        assert_eq!(out["degraded"], true);
        assert_eq!(
            h.span("scenario_06").attribute("tool.degraded"),
            Some(&AttrValue::Bool(true))
        );
        assert!(h.finished().iter().all(|s| s.name != "tool.doc_parser.error"));
    }
}

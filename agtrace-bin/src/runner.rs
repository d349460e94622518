use std::fmt;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{debug, info_span};
use tracing_futures::Instrument;

use crate::scenarios::{Scenario, ScenarioCtx};

const PREVIEW_CHARS: usize = 200;

/// Scenarios matching `wanted` by id prefix, in catalog order, plus the
/// requested ids that matched nothing. An empty request selects everything.
pub fn select<'a>(catalog: &'a [Box<dyn Scenario>], wanted: &[String]) -> (Vec<&'a dyn Scenario>, Vec<String>) {
    if wanted.is_empty() {
        return (catalog.iter().map(|s| s.as_ref()).collect(), Vec::new());
    }
    let unknown = wanted
        .iter()
        .filter(|w| !catalog.iter().any(|s| s.id().starts_with(w.as_str())))
        .cloned()
        .collect();
    let selected = catalog
        .iter()
        .filter(|s| wanted.iter().any(|w| s.id().starts_with(w.as_str())))
        .map(|s| s.as_ref())
        .collect();
    (selected, unknown)
}

#[derive(Debug)]
pub enum Outcome {
    Pass(Value),
    Fail(anyhow::Error),
    Timeout(Duration),
}

#[derive(Debug)]
pub struct Report {
    pub id: &'static str,
    pub elapsed: Duration,
    pub outcome: Outcome,
}

impl Report {
    pub fn passed(&self) -> bool {
        matches!(self.outcome, Outcome::Pass(_))
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.elapsed.as_secs_f64();
        match &self.outcome {
            Outcome::Pass(out) => write!(f, "PASS    {} ({secs:.2}s)\n        {}", self.id, preview(out)),
            Outcome::Fail(e) => write!(f, "FAIL    {} ({secs:.2}s)\n        {e:#}", self.id),
            Outcome::Timeout(limit) => write!(f, "TIMEOUT {} (limit {}s)", self.id, limit.as_secs()),
        }
    }
}

fn preview(out: &Value) -> String {
    let text = match out {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() { format!("{head}...") } else { head }
}

/// Run one scenario under `limit`.
pub async fn run_one(scenario: &dyn Scenario, ctx: &ScenarioCtx, limit: Duration) -> Report {
    let started = Instant::now();
    let run = scenario
        .run(ctx)
        .instrument(info_span!("scenario", id = scenario.id(), bugs = ctx.inject_bugs));
    let outcome = match tokio::time::timeout(limit, run).await {
        Ok(Ok(out)) => Outcome::Pass(out),
        Ok(Err(e)) => Outcome::Fail(e),
        Err(_) => Outcome::Timeout(limit),
    };
    let elapsed = started.elapsed();
    debug!(id = scenario.id(), elapsed_ms = elapsed.as_millis() as u64, "scenario finished");
    Report {
        id: scenario.id(),
        elapsed,
        outcome,
    }
}

pub fn summary(reports: &[Report]) -> String {
    let count = |f: fn(&Outcome) -> bool| reports.iter().filter(|r| f(&r.outcome)).count();
    format!(
        "{} passed, {} failed, {} timed out",
        count(|o| matches!(o, Outcome::Pass(_))),
        count(|o| matches!(o, Outcome::Fail(_))),
        count(|o| matches!(o, Outcome::Timeout(_))),
    )
}

pub fn all_passed(reports: &[Report]) -> bool {
    reports.iter().all(Report::passed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenarios::catalog;
    use crate::scenarios::testing::{Harness, SpanDataExt};
    use agtrace_core::telemetry::{ERROR_TYPE_CANCELLED, Tracer, Value as AttrValue, keys};
    use async_trait::async_trait;
    use serde_json::json;

    struct Fixed(&'static str, Duration, bool);

    #[async_trait]
    impl Scenario for Fixed {
        fn id(&self) -> &'static str {
            self.0
        }
        fn about(&self) -> &'static str {
            "test"
        }
        async fn run(&self, _ctx: &ScenarioCtx) -> anyhow::Result<Value> {
            tokio::time::sleep(self.1).await;
            if self.2 {
                Ok(json!({ "ok": true }))
            } else {
                anyhow::bail!("scenario broke")
            }
        }
    }

    /// Opens a span and never finishes inside the runner's limit.
    struct Stalls;

    #[async_trait]
    impl Scenario for Stalls {
        fn id(&self) -> &'static str {
            "stalls"
        }
        fn about(&self) -> &'static str {
            "test"
        }
        async fn run(&self, ctx: &ScenarioCtx) -> anyhow::Result<Value> {
            ctx.tracer
                .in_span_async("slow_root", |_| async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok::<_, anyhow::Error>(json!({}))
                })
                .await
        }
    }

    fn ctx() -> ScenarioCtx {
        ScenarioCtx {
            tracer: Tracer::noop("runner-test"),
            model: "m".into(),
            endpoint: None,
            inject_bugs: false,
        }
    }

    fn ids(selected: &[&dyn Scenario]) -> Vec<&'static str> {
        selected.iter().map(|s| s.id()).collect()
    }

    #[test]
    fn empty_request_selects_everything() {
        let all = catalog();
        let (selected, unknown) = select(&all, &[]);
        assert_eq!(selected.len(), all.len());
        assert!(unknown.is_empty());
    }

    #[test]
    fn prefixes_select_in_catalog_order_and_unknowns_are_reported() {
        let all = catalog();
        let wanted = vec!["04".to_string(), "01".to_string(), "02".to_string(), "01_h".to_string()];
        let (selected, unknown) = select(&all, &wanted);
        assert_eq!(
            ids(&selected),
            vec!["01_hallucination_skips_retrieval", "04_truncated_responses"]
        );
        assert_eq!(unknown, vec!["02".to_string()]);
    }

    #[test]
    fn catalog_ids_are_unique_and_sorted() {
        let all = catalog();
        let ids: Vec<_> = all.iter().map(|s| s.id()).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(ids, sorted);
    }

    #[tokio::test]
    async fn outcomes_are_classified() {
        let limit = Duration::from_millis(200);
        let pass = run_one(&Fixed("p", Duration::ZERO, true), &ctx(), limit).await;
        let fail = run_one(&Fixed("f", Duration::ZERO, false), &ctx(), limit).await;
        let slow = run_one(&Fixed("s", Duration::from_secs(5), true), &ctx(), limit).await;

        assert!(matches!(pass.outcome, Outcome::Pass(_)));
        assert!(matches!(fail.outcome, Outcome::Fail(_)));
        assert!(matches!(slow.outcome, Outcome::Timeout(d) if d == limit));
        assert!(slow.elapsed < Duration::from_secs(5));

        assert!(pass.to_string().starts_with("PASS    p"));
        assert!(fail.to_string().contains("scenario broke"));
        assert!(slow.to_string().starts_with("TIMEOUT s"));

        let reports = [pass, fail, slow];
        assert_eq!(summary(&reports), "1 passed, 1 failed, 1 timed out");
        assert!(!all_passed(&reports));
        assert!(all_passed(&reports[..1]));
    }

    #[test]
    fn long_output_preview_is_cut() {
        let long = Value::String("x".repeat(500));
        let p = preview(&long);
        assert_eq!(p.chars().count(), PREVIEW_CHARS + 3);
        assert!(p.ends_with("..."));
        assert_eq!(preview(&json!({ "a": 1 })), r#"{"a":1}"#);
    }

    #[tokio::test]
    async fn timed_out_scenario_leaves_cancelled_span() {
        let h = Harness::new(false);
        let limit = Duration::from_millis(100);
        let report = run_one(&Stalls, &h.ctx("runner-test", true), limit).await;
        assert!(matches!(report.outcome, Outcome::Timeout(d) if d == limit));

        let root = h.span("slow_root");
        assert!(root.has_error());
        assert_eq!(root.attribute(keys::KEY_ERROR), Some(&AttrValue::Bool(true)));
        assert_eq!(
            root.attribute(keys::KEY_ERROR_TYPE),
            Some(&AttrValue::from(ERROR_TYPE_CANCELLED))
        );
    }
}

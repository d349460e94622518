use std::time::Duration;

use agtrace_core::inference::{ChatCompletions, InstrumentedClient, ScriptedClient};
use agtrace_core::model::ChatMessage;
use agtrace_core::telemetry::{keys, record_choice_event, record_message_event};
use async_trait::async_trait;
use futures_util::future::try_join_all;
use serde_json::{Value, json};

use super::{Scenario, ScenarioCtx};

const TASK: &str = "Compare two approaches to caching API responses.";

const PLAN: &str = "- in-process LRU cache per instance
- shared Redis cache with TTLs";

const FACTS: &[&str] = &[
    "An in-process LRU has no network hop but each instance warms its own copy.",
    "A shared Redis cache serves every instance and survives deploys, at the cost of a round trip.",
];

const SUMMARY: &str = "- Local LRU: fastest reads, no extra infrastructure.
- Local LRU: cold after every deploy, duplicated per instance.
- Redis: one warm cache shared by all instances.
- Redis: adds a network round trip and an operational dependency.
- Pick local for hot small keys, Redis for shared expensive results.";

/// Simulated I/O per research pass.
const PASS_IO: Duration = Duration::from_millis(150);

pub struct SlowMultiStep;

#[async_trait]
impl Scenario for SlowMultiStep {
    fn id(&self) -> &'static str {
        "03_slow_multi_step_reasoning"
    }

    fn about(&self) -> &'static str {
        "planner, researcher and summarizer agents; the researcher may repeat its work"
    }

    async fn run(&self, ctx: &ScenarioCtx) -> anyhow::Result<Value> {
        ctx.tracer
            .in_span_async("scenario_03", |span| async move {
                ctx.tag(&span, "slow_multi_step_reasoning");
                let plan = planner(ctx, TASK).await?;
                let passes = if ctx.inject_bugs { 2 } else { 1 };
                let facts = researcher(ctx, &plan, passes).await?;
                let summary = summarizer(ctx, &facts).await?;
                Ok::<_, anyhow::Error>(json!({
                    "plan": plan,
                    "facts": facts,
                    "summary": summary,
                    "research_passes": passes,
                }))
            })
            .await
    }
}

fn bullets(text: &str) -> Vec<&str> {
    text.lines()
        .filter_map(|l| l.trim().strip_prefix("- "))
        .filter(|l| !l.is_empty())
        .collect()
}

async fn planner(ctx: &ScenarioCtx, task: &str) -> anyhow::Result<String> {
    let client = ctx.client(ScriptedClient::new().reply(PLAN));
    ctx.tracer
        .in_span_async("agent.planner", |span| async move {
            span.set_attribute("task", task.to_string());
            record_message_event(&span, keys::EVENT_USER_MESSAGE, "user", task);
            let req = ctx.request(vec![
                ChatMessage::system("Planner. Output bullet plan only."),
                ChatMessage::user(task),
            ]);
            let plan = client.complete(req).await?.text();
            record_choice_event(&span, &plan);
            Ok::<_, anyhow::Error>(plan)
        })
        .await
}

async fn researcher(ctx: &ScenarioCtx, plan: &str, passes: u32) -> anyhow::Result<String> {
    let steps = bullets(plan);
    let mut script = ScriptedClient::new().latency(Duration::from_millis(20));
    for fact in FACTS.iter().cycle().take(steps.len() * passes as usize) {
        script = script.reply(*fact);
    }
    let client = ctx.client(script);

    ctx.tracer
        .in_span_async("agent.researcher", |span| async move {
            span.set_attribute("plan", plan.to_string());
            span.set_attribute("research.passes", i64::from(passes));
            if passes > 1 {
                span.set_attribute("bug.double_pass", true);
            }
            record_message_event(&span, keys::EVENT_USER_MESSAGE, "user", plan);

            let mut facts = Vec::new();
            for pass in 1..=passes {
                facts = research_pass(ctx, &client, &steps, pass).await?;
            }
            let facts = facts.join("\n");
            record_choice_event(&span, &facts);
            Ok::<_, anyhow::Error>(facts)
        })
        .await
}

/// One pass over the plan. Steps are researched concurrently.
async fn research_pass(
    ctx: &ScenarioCtx,
    client: &InstrumentedClient<ScriptedClient>,
    steps: &[&str],
    pass: u32,
) -> anyhow::Result<Vec<String>> {
    ctx.tracer
        .in_span_async(format!("research_pass_{pass}"), |span| async move {
            span.set_attribute("pass_number", i64::from(pass));
            tokio::time::sleep(PASS_IO).await;
            let lookups = steps.iter().map(|step| {
                ctx.tracer.in_span_async("research.fact", move |fact| async move {
                    fact.set_attribute("research.step", step.to_string());
                    let req = ctx.request(vec![
                        ChatMessage::system("Researcher. Extract key facts only."),
                        ChatMessage::user(*step),
                    ]);
                    Ok::<_, anyhow::Error>(client.complete(req).await?.text())
                })
            });
            try_join_all(lookups).await
        })
        .await
}

async fn summarizer(ctx: &ScenarioCtx, facts: &str) -> anyhow::Result<String> {
    let client = ctx.client(ScriptedClient::new().reply(SUMMARY));
    ctx.tracer
        .in_span_async("agent.summarizer", |span| async move {
            span.set_attribute("facts", facts.to_string());
            record_message_event(&span, keys::EVENT_USER_MESSAGE, "user", facts);
            let req = ctx.request(vec![
                ChatMessage::system("Summarizer. 5 concise bullets."),
                ChatMessage::user(facts),
            ]);
            let summary = client.complete(req).await?.text();
            record_choice_event(&span, &summary);
            Ok::<_, anyhow::Error>(summary)
        })
        .await
}

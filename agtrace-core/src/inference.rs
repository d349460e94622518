//! Chat-completion boundary.
//!
//! No network client lives here: [`ChatCompletions`] is the seam a real
//! client implements. [`ScriptedClient`] is a deterministic in-process
//! implementation and [`InstrumentedClient`] adds gen-ai client spans to any
//! implementation.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use opentelemetry::trace::FutureExt;

use crate::error::{CoreResult, TraceError};
use crate::model::{
    Choice, CompletionRequest, CompletionResponse, Content, FinishReason, ResponseMessage, ToolCall,
    Usage,
};
use crate::normalizer::normalize_request;
use crate::telemetry::{self, KeyValue, SpanGuard, SpanKind, Tracer, keys};

#[async_trait]
pub trait ChatCompletions: Send + Sync {
    /// Service name used in upstream errors.
    fn name(&self) -> &str;

    async fn complete(&self, req: CompletionRequest) -> CoreResult<CompletionResponse>;
}

#[async_trait]
impl<C: ChatCompletions + ?Sized> ChatCompletions for Arc<C> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn complete(&self, req: CompletionRequest) -> CoreResult<CompletionResponse> {
        (**self).complete(req).await
    }
}

/// One queued answer for [`ScriptedClient`].
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptedReply {
    Text(String),
    ToolCalls(Vec<ToolCall>),
    Fail(String),
}

/// Answers from a queue of scripted replies, then echoes the last user turn.
///
/// Token counts are whitespace-separated words. A text reply longer than
/// `max_tokens` is cut and reported with finish reason `length`.
#[derive(Debug, Default)]
pub struct ScriptedClient {
    replies: Mutex<VecDeque<ScriptedReply>>,
    latency: Option<Duration>,
    calls: AtomicUsize,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, text: impl Into<String>) -> Self {
        self.push(ScriptedReply::Text(text.into()))
    }

    pub fn tool_call(self, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        let id = format!("call_{}", self.queued() + 1);
        self.push(ScriptedReply::ToolCalls(vec![ToolCall {
            id,
            name: name.into(),
            arguments: arguments.into(),
        }]))
    }

    pub fn failure(self, message: impl Into<String>) -> Self {
        self.push(ScriptedReply::Fail(message.into()))
    }

    /// Delay every call by `latency`.
    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    fn push(self, reply: ScriptedReply) -> Self {
        self.replies.lock().unwrap_or_else(|e| e.into_inner()).push_back(reply);
        self
    }

    fn queued(&self) -> usize {
        self.replies.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn next_reply(&self) -> Option<ScriptedReply> {
        self.replies.lock().unwrap_or_else(|e| e.into_inner()).pop_front()
    }

    /// Number of `complete` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

fn word_count(s: &str) -> u32 {
    u32::try_from(s.split_whitespace().count()).unwrap_or(u32::MAX)
}

fn truncate_words(s: &str, max: u32) -> Option<String> {
    let words: Vec<&str> = s.split_whitespace().collect();
    if words.len() as u64 <= u64::from(max) {
        return None;
    }
    Some(words[..max as usize].join(" "))
}

#[async_trait]
impl ChatCompletions for ScriptedClient {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, req: CompletionRequest) -> CoreResult<CompletionResponse> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if let Some(d) = self.latency {
            tokio::time::sleep(d).await;
        }
        let req = normalize_request(req);
        let prompt_tokens = req
            .messages
            .iter()
            .map(|m| word_count(&m.content.to_plain_text()))
            .sum::<u32>();

        let reply = self.next_reply().unwrap_or_else(|| {
            ScriptedReply::Text(format!("echo: {}", req.last_user_text().unwrap_or_default()))
        });
        let (message, finish_reason) = match reply {
            ScriptedReply::Fail(message) => return Err(TraceError::upstream(self.name(), message)),
            ScriptedReply::ToolCalls(tool_calls) => (
                ResponseMessage {
                    content: Content::default(),
                    tool_calls,
                },
                FinishReason::ToolCalls,
            ),
            ScriptedReply::Text(text) => {
                let (text, reason) = match req.max_tokens.and_then(|max| truncate_words(&text, max)) {
                    Some(cut) => (cut, FinishReason::Length),
                    None => (text, FinishReason::Stop),
                };
                (
                    ResponseMessage {
                        content: Content::PlainText(text),
                        tool_calls: Vec::new(),
                    },
                    reason,
                )
            }
        };
        let completion_tokens = word_count(&message.content.to_plain_text());
        Ok(CompletionResponse {
            model: req.model,
            choices: vec![Choice {
                message,
                finish_reason,
            }],
            usage: Usage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
            },
        })
    }
}

/// Wraps a client with one `chat {model}` client span per call.
///
/// Spans are only produced once [`telemetry::GenAiInstrumentation`] has been
/// installed on the tracer's provider; otherwise calls pass straight through.
/// Message and choice bodies are attached only when the provider has
/// content recording enabled.
#[derive(Debug, Clone)]
pub struct InstrumentedClient<C> {
    inner: C,
    tracer: Tracer,
}

impl<C: ChatCompletions> InstrumentedClient<C> {
    pub fn new(inner: C, tracer: Tracer) -> Self {
        Self { inner, tracer }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }
}

#[async_trait]
impl<C: ChatCompletions> ChatCompletions for InstrumentedClient<C> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn complete(&self, req: CompletionRequest) -> CoreResult<CompletionResponse> {
        let record_content = match self.tracer.provider() {
            Some(p) if p.genai_instrumentation_enabled() => p.content_recording_enabled(),
            _ => return self.inner.complete(req).await,
        };

        let mut attrs = vec![
            KeyValue::new(keys::GEN_AI_OPERATION_NAME, "chat"),
            KeyValue::new(keys::GEN_AI_SYSTEM, keys::GEN_AI_SYSTEM_VALUE),
            KeyValue::new(keys::GEN_AI_REQUEST_MODEL, req.model.clone()),
        ];
        if let Some(max) = req.max_tokens {
            attrs.push(KeyValue::new(keys::GEN_AI_REQUEST_MAX_TOKENS, i64::from(max)));
        }
        let span = self
            .tracer
            .start_span_with(format!("chat {}", req.model), SpanKind::Client, attrs);

        if record_content {
            for m in &req.messages {
                telemetry::record_message_event(
                    &span,
                    telemetry::message_event_name(m.role),
                    m.role.as_str(),
                    &m.content.to_plain_text(),
                );
            }
        }

        // a caller dropping this future leaves the span marked cancelled
        let guard = SpanGuard::new(span.clone());
        let result = self.inner.complete(req).with_context(span.context().clone()).await;
        match &result {
            Ok(resp) => {
                span.set_attribute(keys::GEN_AI_RESPONSE_MODEL, resp.model.clone());
                let reasons = resp
                    .choices
                    .iter()
                    .map(|c| c.finish_reason.as_str())
                    .collect::<Vec<_>>()
                    .join(",");
                span.set_attribute(keys::GEN_AI_RESPONSE_FINISH_REASONS, reasons);
                span.set_attribute(keys::GEN_AI_USAGE_INPUT_TOKENS, i64::from(resp.usage.prompt_tokens));
                span.set_attribute(keys::GEN_AI_USAGE_OUTPUT_TOKENS, i64::from(resp.usage.completion_tokens));
                if record_content {
                    for choice in &resp.choices {
                        telemetry::record_choice_event(&span, &choice.message.content.to_plain_text());
                    }
                }
            }
            Err(e) => span.record_error_parts(e.kind(), &e.to_string()),
        }
        guard.finish();
        result
    }
}

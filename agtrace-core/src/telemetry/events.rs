//! Gen-AI event shaping.
//!
//! Both helpers are pure with respect to their inputs: they append exactly
//! one event to `span` and touch nothing else. Content must already be
//! plain text (see [`crate::model::Content::to_plain_text`]).

use opentelemetry::KeyValue;
use serde_json::json;

use crate::model::Role;
use crate::telemetry::keys;
use crate::telemetry::span::Span;

/// Append `event_name` carrying `{"role": role, "content": content}`.
pub fn record_message_event(span: &Span, event_name: &str, role: &str, content: &str) {
    let body = json!({ "role": role, "content": content });
    span.add_event(event_name.to_string(), event_attributes(body));
}

/// Append a `choice` event for the model's answer. Finish reason and index
/// are fixed at `stop` and 0.
pub fn record_choice_event(span: &Span, content: &str) {
    let body = json!({
        "message": { "content": content },
        "finish_reason": "stop",
        "index": 0,
    });
    span.add_event(keys::EVENT_CHOICE, event_attributes(body));
}

fn event_attributes(body: serde_json::Value) -> Vec<KeyValue> {
    vec![
        KeyValue::new(keys::GEN_AI_SYSTEM, keys::GEN_AI_SYSTEM_VALUE),
        KeyValue::new(keys::GEN_AI_EVENT_CONTENT, body.to_string()),
    ]
}

/// Conventional event name for a chat turn from `role`.
pub fn message_event_name(role: Role) -> &'static str {
    match role {
        Role::System => keys::EVENT_SYSTEM_MESSAGE,
        Role::User => keys::EVENT_USER_MESSAGE,
        Role::Assistant => keys::EVENT_ASSISTANT_MESSAGE,
        Role::Tool => keys::EVENT_TOOL_MESSAGE,
    }
}

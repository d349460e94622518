use unicode_normalization::UnicodeNormalization;

use crate::model::{ChatMessage, CompletionRequest, Content};

/// Unicode NFC normalization + BOM strip + CRLF -> LF + trim.
pub fn clean_text(s: &str) -> String {
    let mut t = s.nfc().collect::<String>();
    if t.starts_with('\u{FEFF}') {
        t.remove(0);
    }
    if t.contains("\r\n") {
        t = t.replace("\r\n", "\n");
    }
    t.trim().to_string()
}

/// Flatten every message body to cleaned plain text so downstream code
/// (event helpers, scripted replies) only sees one content shape.
pub fn normalize_request(mut req: CompletionRequest) -> CompletionRequest {
    for ChatMessage { content, .. } in &mut req.messages {
        *content = Content::PlainText(content.to_plain_text());
    }
    if req.max_tokens == Some(0) {
        req.max_tokens = None;
    }
    req
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ContentPart;

    #[test]
    fn unicode_nfc_and_crlf_normalization() {
        // "e" + combining acute accent should normalize to "é"
        assert_eq!(clean_text("e\u{301}"), "é");
        assert_eq!(clean_text("line1\r\nline2"), "line1\nline2");
        assert_eq!(clean_text("\u{FEFF}  hi "), "hi");
    }

    #[test]
    fn parts_are_flattened() {
        let req = CompletionRequest::new(
            "m",
            vec![ChatMessage {
                role: crate::model::Role::User,
                content: Content::Parts(vec![ContentPart::text("a"), ContentPart::text("b ")]),
            }],
        );
        let out = normalize_request(req);
        assert_eq!(out.messages[0].content, Content::PlainText("ab".into()));
    }

    #[test]
    fn zero_max_tokens_means_unset() {
        let out = normalize_request(CompletionRequest::new("m", vec![]).max_tokens(0));
        assert_eq!(out.max_tokens, None);
    }
}

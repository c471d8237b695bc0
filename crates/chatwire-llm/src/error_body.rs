//! Error message extraction for non-2xx gateway responses.
//!
//! Handles the envelope shapes gateways are known to send:
//! - Standard: `{"error": {"message": "..."}}`
//! - Bare:     `{"error": "..."}`
//! - Detail:   `{"detail": "..."}` or `{"message": "..."}`
//!
//! Anything else falls back to the raw body, then to the status line.

use serde_json::Value;

/// The most specific human-readable message obtainable from an error body.
pub fn extract_error_message(status: u16, body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        return format!("HTTP {status}");
    }

    if let Ok(json) = serde_json::from_str::<Value>(body) {
        if let Some(msg) = json["error"]["message"].as_str().filter(|m| !m.is_empty()) {
            return msg.to_string();
        }
        if let Some(msg) = json["error"].as_str().filter(|m| !m.is_empty()) {
            return msg.to_string();
        }
        if let Some(msg) = json["detail"]
            .as_str()
            .or_else(|| json["message"].as_str())
            .filter(|m| !m.is_empty())
        {
            return msg.to_string();
        }
    }

    body.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_error_message() {
        let body = r#"{"error":{"message":"Insufficient credits","code":402}}"#;
        assert_eq!(extract_error_message(402, body), "Insufficient credits");
    }

    #[test]
    fn bare_error_string() {
        assert_eq!(extract_error_message(400, r#"{"error":"model not allowed"}"#), "model not allowed");
    }

    #[test]
    fn detail_and_flat_message() {
        assert_eq!(extract_error_message(404, r#"{"detail":"Model not found"}"#), "Model not found");
        assert_eq!(extract_error_message(400, r#"{"message":"Invalid model"}"#), "Invalid model");
    }

    #[test]
    fn error_object_without_message_falls_back_to_body() {
        let body = r#"{"error":{"code":500}}"#;
        assert_eq!(extract_error_message(500, body), body);
    }

    #[test]
    fn non_json_body_is_returned_raw() {
        assert_eq!(extract_error_message(502, "Bad Gateway\n"), "Bad Gateway");
    }

    #[test]
    fn empty_body_uses_status() {
        assert_eq!(extract_error_message(503, ""), "HTTP 503");
        assert_eq!(extract_error_message(401, "   "), "HTTP 401");
    }
}

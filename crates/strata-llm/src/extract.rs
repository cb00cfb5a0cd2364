use std::sync::OnceLock;

use regex::Regex;
use serde::de::DeserializeOwned;

use strata_core::error::{Result, StrataError};

fn fenced_json_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").unwrap())
}

/// Locate the JSON object inside raw model output.
///
/// Models wrap their payload in markdown fences more often than not, with
/// or without a `json` label, and sometimes pad it with prose. Checks a
/// fenced block first, then falls back to the outermost brace pair.
pub fn extract_json(raw: &str) -> Option<&str> {
    if let Some(caps) = fenced_json_re().captures(raw) {
        return caps.get(1).map(|m| m.as_str());
    }

    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&raw[start..=end])
}

/// Extract and deserialize the JSON payload of a model reply.
pub fn parse_payload<T: DeserializeOwned>(raw: &str) -> Result<T> {
    let span = extract_json(raw)
        .ok_or_else(|| StrataError::ReasoningParse("no JSON object in reply".into()))?;
    serde_json::from_str(span).map_err(|e| StrataError::ReasoningParse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, serde::Deserialize)]
    struct Payload {
        risk_level: String,
    }

    #[test]
    fn test_extract_from_labeled_fence() {
        let raw = "Here is the analysis:\n```json\n{\"risk_level\": \"HIGH\"}\n```\nLet me know.";
        assert_eq!(extract_json(raw), Some("{\"risk_level\": \"HIGH\"}"));
    }

    #[test]
    fn test_extract_from_bare_fence() {
        let raw = "```\n{\"risk_level\": \"LOW\"}\n```";
        assert_eq!(extract_json(raw), Some("{\"risk_level\": \"LOW\"}"));
    }

    #[test]
    fn test_extract_without_fence_uses_brace_span() {
        let raw = "The result is {\"risk_level\": \"MEDIUM\"} as requested.";
        assert_eq!(extract_json(raw), Some("{\"risk_level\": \"MEDIUM\"}"));
    }

    #[test]
    fn test_extract_none_without_object() {
        assert_eq!(extract_json("no json here"), None);
        assert_eq!(extract_json("} backwards {"), None);
    }

    #[test]
    fn test_parse_payload_success() {
        let raw = "```json\n{\"risk_level\": \"CRITICAL\"}\n```";
        let payload: Payload = parse_payload(raw).unwrap();
        assert_eq!(payload.risk_level, "CRITICAL");
    }

    #[test]
    fn test_parse_payload_invalid_json_is_parse_error() {
        let raw = "```json\n{\"risk_level\": \n```";
        let err = parse_payload::<Payload>(raw).unwrap_err();
        assert!(matches!(err, StrataError::ReasoningParse(_)));
    }

    #[test]
    fn test_parse_payload_prose_only_is_parse_error() {
        let err = parse_payload::<Payload>("I cannot answer that.").unwrap_err();
        assert!(matches!(err, StrataError::ReasoningParse(_)));
    }

    #[test]
    fn test_fence_with_nested_braces() {
        let raw = "```json\n{\"impacts\": [{\"component\": \"kubelet\"}]}\n```";
        let span = extract_json(raw).unwrap();
        assert!(serde_json::from_str::<serde_json::Value>(span).is_ok());
    }
}

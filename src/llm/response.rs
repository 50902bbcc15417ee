//! Parse oracle output into a structured response
//!
//! The oracle is asked for JSON but frequently wraps it in prose. We cut the
//! outermost object out of the text before deserializing.

use crate::core::error::{PipelineError, Result};
use crate::core::types::clamp_unit;
use crate::task::types::{TaskParameters, TaskPriority};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// What the oracle claims the command means
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedResponse {
    /// Declared task type; may be a name no type definition knows
    #[serde(alias = "type")]
    pub task_type: String,
    #[serde(default, alias = "subtype")]
    pub sub_type: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parameters: TaskParameters,
    #[serde(default)]
    pub priority: TaskPriority,
    /// Oracle's self-reported confidence (0.0 - 1.0)
    #[serde(default = "default_confidence")]
    pub confidence: f64,
}

fn default_confidence() -> f64 {
    0.5
}

/// Parse an oracle response into a `ParsedResponse`
pub fn parse_response(response: &str) -> Result<ParsedResponse> {
    let json_str = extract_json(response)?;

    let mut parsed: ParsedResponse = serde_json::from_str(json_str)?;

    if parsed.task_type.trim().is_empty() {
        return Err(PipelineError::ResponseFormat(
            "response has an empty task_type".into(),
        ));
    }
    parsed.task_type = parsed.task_type.trim().to_lowercase();
    parsed.sub_type = parsed
        .sub_type
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty());
    parsed.confidence = clamp_unit(parsed.confidence);

    Ok(parsed)
}

/// Extract JSON object from oracle response (handles surrounding text)
pub fn extract_json(response: &str) -> Result<&str> {
    let start = response
        .find('{')
        .ok_or_else(|| PipelineError::ResponseFormat("No JSON found in response".into()))?;
    let end = response
        .rfind('}')
        .ok_or_else(|| PipelineError::ResponseFormat("No closing brace found in response".into()))?;
    if end < start {
        return Err(PipelineError::ResponseFormat(
            "Closing brace precedes opening brace".into(),
        ));
    }
    Ok(&response[start..=end])
}

fn coordinate_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(-?\d+(?:\.\d+)?)[\s,]+(-?\d+(?:\.\d+)?)[\s,]+(-?\d+(?:\.\d+)?)")
            .expect("coordinate pattern is a valid regex")
    })
}

/// Find an `x y z` triple in a command
pub fn extract_coordinates(command: &str) -> Option<serde_json::Value> {
    let caps = coordinate_regex().captures(command)?;
    let axis = |i: usize| -> Option<serde_json::Value> {
        let raw = caps.get(i)?.as_str();
        if let Ok(v) = raw.parse::<i64>() {
            return Some(serde_json::Value::from(v));
        }
        raw.parse::<f64>().ok().map(serde_json::Value::from)
    };
    Some(serde_json::json!({ "x": axis(1)?, "y": axis(2)?, "z": axis(3)? }))
}

/// Fill in parameters the oracle left out but the command states plainly
pub fn enrich_parameters(command: &str, parameters: &mut TaskParameters) {
    if !parameters.contains_key("coordinates") {
        if let Some(coords) = extract_coordinates(command) {
            parameters.insert("coordinates".into(), coords);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_simple() {
        let response = r#"{"task_type": "mining"}"#;
        assert_eq!(extract_json(response).unwrap(), response);
    }

    #[test]
    fn test_extract_json_with_surrounding_text() {
        let response = r#"Sure! Here you go:
{"task_type": "mining", "description": "mine iron", "confidence": 0.8}
Let me know if you need anything else."#;
        let json = extract_json(response).unwrap();
        assert!(json.starts_with('{'));
        assert!(json.ends_with('}'));
        assert!(json.contains("mining"));
    }

    #[test]
    fn test_extract_json_no_json() {
        assert!(matches!(
            extract_json("I don't understand that command"),
            Err(PipelineError::ResponseFormat(_))
        ));
    }

    #[test]
    fn test_parse_full_response() {
        let response = r#"{
            "task_type": "Navigation",
            "sub_type": "coordinates",
            "description": "walk to the given spot",
            "parameters": {"coordinates": {"x": 100, "y": 64, "z": -200}},
            "priority": "high",
            "confidence": 0.95
        }"#;
        let parsed = parse_response(response).unwrap();
        assert_eq!(parsed.task_type, "navigation");
        assert_eq!(parsed.sub_type.as_deref(), Some("coordinates"));
        assert_eq!(parsed.priority, TaskPriority::High);
        assert!((parsed.confidence - 0.95).abs() < 1e-9);
        assert!(parsed.parameters.contains_key("coordinates"));
    }

    #[test]
    fn test_parse_defaults_and_clamping() {
        let parsed = parse_response(r#"{"type": "mining", "confidence": 3.0}"#).unwrap();
        assert_eq!(parsed.priority, TaskPriority::Normal);
        assert_eq!(parsed.confidence, 1.0);
        assert!(parsed.parameters.is_empty());
    }

    #[test]
    fn test_parse_rejects_empty_type() {
        assert!(matches!(
            parse_response(r#"{"task_type": "  "}"#),
            Err(PipelineError::ResponseFormat(_))
        ));
    }

    #[test]
    fn test_parse_malformed_json_is_json_error() {
        assert!(matches!(
            parse_response(r#"{"task_type": mining}"#),
            Err(PipelineError::Json(_))
        ));
    }

    #[test]
    fn test_extract_coordinates() {
        let coords = extract_coordinates("go to 100 64 -200").unwrap();
        assert_eq!(coords["x"], 100);
        assert_eq!(coords["y"], 64);
        assert_eq!(coords["z"], -200);
        assert!(extract_coordinates("go to village").is_none());
    }

    #[test]
    fn test_enrich_keeps_oracle_coordinates() {
        let mut params = TaskParameters::new();
        params.insert("coordinates".into(), serde_json::json!({"x": 1, "y": 2, "z": 3}));
        enrich_parameters("go to 100 64 -200", &mut params);
        assert_eq!(params["coordinates"]["x"], 1);
    }
}

use super::{Action, Operation, ScrollDirection, operation_names};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::LazyLock;
use thiserror::Error;

/// Fenced code blocks, optionally tagged `json`
static FENCED_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(json)?\s*(.*?)\s*```").expect("fenced block pattern"));

/// Why a model response could not be turned into an [`Action`]
#[derive(Debug, Clone, Error, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "camelCase")]
pub enum ParseError {
    #[error("Response does not contain valid JSON.")]
    NoJson,

    #[error("Invalid response: Thought and Action are required (missing `{0}`)")]
    MissingField(String),

    #[error("Invalid action name `{name}`; expected one of {expected}")]
    UnknownAction { name: String, expected: String },

    #[error("Invalid arguments for `{action}`: {reason}")]
    InvalidArguments { action: String, reason: String },
}

/// JSON candidates inside markdown fences: blocks tagged `json` or starting with `{`
pub fn extract_json_blocks(input: &str) -> Vec<&str> {
    FENCED_BLOCK
        .captures_iter(input)
        .filter_map(|caps| {
            let body = caps.get(2)?.as_str();
            (caps.get(1).is_some() || body.starts_with('{')).then_some(body)
        })
        .collect()
}

fn outermost_braces(input: &str) -> Option<&str> {
    let start = input.find('{')?;
    let end = input.rfind('}')?;
    (start < end).then(|| &input[start..=end])
}

fn locate_json(raw: &str) -> Result<Value, ParseError> {
    if let Ok(value) = serde_json::from_str::<Value>(raw.trim()) {
        return Ok(value);
    }
    if let Some(value) = extract_json_blocks(raw).into_iter().find_map(|block| serde_json::from_str::<Value>(block).ok()) {
        return Ok(value);
    }
    outermost_braces(raw)
        .and_then(|slice| serde_json::from_str(slice).ok())
        .ok_or(ParseError::NoJson)
}

fn invalid(action: &str, reason: impl Into<String>) -> ParseError {
    ParseError::InvalidArguments { action: action.to_string(), reason: reason.into() }
}

fn string_arg(action: &str, args: Option<&Map<String, Value>>, key: &str) -> Result<String, ParseError> {
    let args = args.ok_or_else(|| invalid(action, "missing `args` object"))?;
    match args.get(key) {
        Some(Value::String(s)) => Ok(s.clone()),
        // Labels are sometimes sent as bare numbers
        Some(Value::Number(n)) if key == "label" => Ok(n.to_string()),
        Some(other) => Err(invalid(action, format!("`{}` must be a string, got {}", key, other))),
        None => Err(invalid(action, format!("missing `{}`", key))),
    }
}

fn parse_operation(value: &Value) -> Result<Operation, ParseError> {
    let object = value.as_object().ok_or_else(|| invalid("action", "action must be an object"))?;
    let name = match object.get("name") {
        Some(Value::String(name)) => name.as_str(),
        _ => return Err(ParseError::MissingField("action.name".to_string())),
    };

    let args = match object.get("args") {
        None | Some(Value::Null) => None,
        Some(Value::Object(map)) => Some(map),
        Some(_) => return Err(invalid(name, "`args` must be an object")),
    };

    let operation = match name {
        "click" => Operation::Click { label: string_arg(name, args, "label")? },
        "setValue" => Operation::SetValue { label: string_arg(name, args, "label")?, value: string_arg(name, args, "value")? },
        "setValueAndEnter" => Operation::SetValueAndEnter {
            label: string_arg(name, args, "label")?,
            value: string_arg(name, args, "value")?,
        },
        "scroll" => {
            let value = string_arg(name, args, "value")?;
            let direction: ScrollDirection = value.parse().map_err(|reason: String| invalid(name, reason))?;
            Operation::Scroll { value: direction }
        }
        "navigate" => Operation::Navigate { url: string_arg(name, args, "url")? },
        "wait" => Operation::Wait,
        "finish" => Operation::Finish,
        "fail" => Operation::Fail,
        other => {
            return Err(ParseError::UnknownAction { name: other.to_string(), expected: operation_names().join(", ") });
        }
    };
    Ok(operation)
}

/// Turn raw model text into an [`Action`].
///
/// Accepts bare JSON, JSON inside a markdown fence, or JSON surrounded by prose.
pub fn parse_response(raw: &str) -> Result<Action, ParseError> {
    let value = locate_json(raw)?;

    let thought = match value.get("thought") {
        Some(Value::String(thought)) => thought.clone(),
        Some(Value::Null) | None => return Err(ParseError::MissingField("thought".to_string())),
        Some(other) => other.to_string(),
    };
    let action = match value.get("action") {
        Some(Value::Null) | None => return Err(ParseError::MissingField("action".to_string())),
        Some(action) => action,
    };
    let operation = parse_operation(action)?;
    let speak = value.get("speak").and_then(Value::as_str).map(str::to_string);

    Ok(Action { thought, operation, speak })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_json() {
        let action = parse_response(r#"{"thought":"x","action":{"name":"finish"}}"#).unwrap();
        assert_eq!(action, Action::new("x", Operation::Finish));
    }

    #[test]
    fn test_parse_fenced_json() {
        let raw = "```json\n{\"thought\":\"x\",\"action\":{\"name\":\"finish\"}}\n```";
        assert_eq!(parse_response(raw).unwrap(), Action::new("x", Operation::Finish));
    }

    #[test]
    fn test_parse_untagged_fence_and_prose() {
        let fenced = "Here you go:\n```\n{\"thought\":\"t\",\"action\":{\"name\":\"wait\",\"args\":{}}}\n```";
        assert_eq!(parse_response(fenced).unwrap().operation, Operation::Wait);

        let prose = "Sure! {\"thought\":\"t\",\"action\":{\"name\":\"click\",\"args\":{\"label\":\"4\"}}} Done.";
        assert_eq!(parse_response(prose).unwrap().operation, Operation::Click { label: "4".into() });
    }

    #[test]
    fn test_malformed_fence_falls_through() {
        let later_fence = "```json\n{\"thought\": oops}\n```\nCorrected:\n```json\n{\"thought\":\"t\",\"action\":{\"name\":\"wait\"}}\n```";
        assert_eq!(parse_response(later_fence).unwrap().operation, Operation::Wait);

        let trailing_object = "```json\nnot json\n```\n{\"thought\":\"t\",\"action\":{\"name\":\"finish\"}}";
        assert_eq!(parse_response(trailing_object).unwrap().operation, Operation::Finish);
    }

    #[test]
    fn test_numeric_label_accepted() {
        let raw = r#"{"thought":"t","action":{"name":"setValue","args":{"label":7,"value":"rust"}}}"#;
        assert_eq!(
            parse_response(raw).unwrap().operation,
            Operation::SetValue { label: "7".into(), value: "rust".into() }
        );
    }

    #[test]
    fn test_speak_passes_through() {
        let raw = r#"{"thought":"t","action":{"name":"fail"},"speak":"I cannot log in"}"#;
        assert_eq!(parse_response(raw).unwrap().speak.as_deref(), Some("I cannot log in"));
    }

    #[test]
    fn test_no_json() {
        assert_eq!(parse_response("I think we should click the button").unwrap_err(), ParseError::NoJson);
        assert_eq!(parse_response("```json\n{not json}\n```").unwrap_err(), ParseError::NoJson);
    }

    #[test]
    fn test_missing_fields() {
        assert_eq!(
            parse_response(r#"{"action":{"name":"finish"}}"#).unwrap_err(),
            ParseError::MissingField("thought".into())
        );
        assert_eq!(parse_response(r#"{"thought":"t"}"#).unwrap_err(), ParseError::MissingField("action".into()));
    }

    #[test]
    fn test_unknown_action_name() {
        let err = parse_response(r#"{"thought":"t","action":{"name":"hover","args":{}}}"#).unwrap_err();
        match &err {
            ParseError::UnknownAction { name, expected } => {
                assert_eq!(name, "hover");
                assert!(expected.contains("setValueAndEnter"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(err.to_string().contains("Invalid action name `hover`"));
    }

    #[test]
    fn test_malformed_arguments() {
        let missing = parse_response(r#"{"thought":"t","action":{"name":"click","args":{}}}"#).unwrap_err();
        assert!(matches!(missing, ParseError::InvalidArguments { ref action, .. } if action == "click"));

        let scroll = parse_response(r#"{"thought":"t","action":{"name":"scroll","args":{"value":"left"}}}"#).unwrap_err();
        assert!(scroll.to_string().contains("up, down, top or bottom"));

        let no_args = parse_response(r#"{"thought":"t","action":{"name":"navigate"}}"#).unwrap_err();
        assert!(no_args.to_string().contains("missing `args` object"));
    }

    #[test]
    fn test_extract_json_blocks_filters_non_json_fences() {
        let input = "```rust\nfn main() {}\n```\n```json\n{\"a\":1}\n```";
        assert_eq!(extract_json_blocks(input), vec!["{\"a\":1}"]);
    }
}

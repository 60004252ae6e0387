//! # Tool Invocation Parsing
//!
//! Tool invocations arrive as text in the form
//!
//! ```text
//! Tool: <name>
//! Arguments: <json object>
//! ```
//!
//! optionally preceded by a banner line. Parsing is strict: the invocation
//! is only accepted once the arguments are a complete JSON object.
//!
//! Buffering asks a weaker question, [`is_settled_invocation`]: whether any
//! further fragment could still change the outcome. A payload that can no
//! longer become an invocation is settled too, so it is released in delivery
//! order and reported as unrecognized instead of waiting for stream end.

use serde_json::Value;

use convo_core::errors::StreamError;
use convo_core::messages::ToolInvocation;

const TOOL_PREFIX: &str = "Tool:";
const ARGUMENTS_PREFIX: &str = "Arguments:";

/// Parse `payload` into a [`ToolInvocation`] with the given correlation id.
pub fn parse_tool_invocation(id: &str, payload: &str) -> Result<ToolInvocation, StreamError> {
    let (name, arguments) = split_invocation(payload)?;
    Ok(ToolInvocation {
        id: id.to_owned(),
        name: name.to_owned(),
        arguments,
        raw_text: payload.to_owned(),
    })
}

/// Whether appending more text to `payload` can no longer change how it
/// parses.
///
/// True once the arguments are complete JSON of any type, and also once the
/// shape is definitively broken: an `Arguments:` line with no `Tool:` line
/// before it, an empty tool name on a finished line, arguments that cannot
/// open an object, or arguments with a syntax error before end of input.
pub fn is_settled_invocation(payload: &str) -> bool {
    let Some(tool_at) = find_line_start(payload, TOOL_PREFIX) else {
        return find_line_start(payload, ARGUMENTS_PREFIX).is_some();
    };
    let after_tool = &payload[tool_at + TOOL_PREFIX.len()..];
    let Some((name_line, rest)) = after_tool.split_once('\n') else {
        return false;
    };
    if name_line.trim().is_empty() {
        return true;
    }

    let Some(args_at) = find_line_start(rest, ARGUMENTS_PREFIX) else {
        return false;
    };
    let args_text = rest[args_at + ARGUMENTS_PREFIX.len()..].trim();
    if args_text.is_empty() {
        return false;
    }
    if !args_text.starts_with('{') {
        return true;
    }
    match serde_json::from_str::<Value>(args_text) {
        Ok(_) => true,
        Err(e) => !e.is_eof(),
    }
}

fn split_invocation(payload: &str) -> Result<(&str, Value), StreamError> {
    let tool_at = find_line_start(payload, TOOL_PREFIX)
        .ok_or_else(|| classification_error("missing Tool: line"))?;
    let after_tool = &payload[tool_at + TOOL_PREFIX.len()..];

    let (name_line, rest) = after_tool.split_once('\n').unwrap_or((after_tool, ""));
    let name = name_line.trim();
    if name.is_empty() {
        return Err(classification_error("empty tool name"));
    }

    let args_at = find_line_start(rest, ARGUMENTS_PREFIX)
        .ok_or_else(|| classification_error("missing Arguments: line"))?;
    let args_text = rest[args_at + ARGUMENTS_PREFIX.len()..].trim();

    match serde_json::from_str::<Value>(args_text) {
        Ok(value @ Value::Object(_)) => Ok((name, value)),
        Ok(_) => Err(classification_error("arguments are not a JSON object")),
        Err(e) => Err(classification_error(&format!("arguments: {e}"))),
    }
}

/// Byte offset of `prefix` when it opens a line (ignoring leading spaces).
fn find_line_start(text: &str, prefix: &str) -> Option<usize> {
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        let indent = line.len() - line.trim_start().len();
        if line[indent..].starts_with(prefix) {
            return Some(offset + indent);
        }
        offset += line.len();
    }
    None
}

fn classification_error(reason: &str) -> StreamError {
    StreamError::Classification {
        kind: "tool".to_owned(),
        reason: reason.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn parses_canonical_invocation() {
        let inv = parse_tool_invocation("t1", "Tool: kubectl\nArguments: {\"cmd\": \"get pods\"}").unwrap();
        assert_eq!(inv.id, "t1");
        assert_eq!(inv.name, "kubectl");
        assert_eq!(inv.arguments, json!({"cmd": "get pods"}));
    }

    #[test]
    fn banner_line_before_tool_line() {
        let inv = parse_tool_invocation("t", "Running a tool\nTool: search\nArguments: {}").unwrap();
        assert_eq!(inv.name, "search");
        assert_eq!(inv.arguments, json!({}));
    }

    #[test]
    fn multiline_arguments() {
        let payload = "Tool: apply\nArguments: {\n  \"a\": 1,\n  \"b\": [1, 2]\n}\n";
        let inv = parse_tool_invocation("t", payload).unwrap();
        assert_eq!(inv.arguments, json!({"a": 1, "b": [1, 2]}));
    }

    // ── settledness ──

    #[test]
    fn braces_inside_strings_do_not_fool_parser() {
        // ends with '}' but the object is not closed
        assert!(!is_settled_invocation("Tool: k\nArguments: {\"q\": \"}\""));
        assert!(is_settled_invocation("Tool: k\nArguments: {\"q\": \"}\"}"));
    }

    #[test]
    fn incomplete_fragments_are_not_settled() {
        assert!(!is_settled_invocation("Tool: k\nArgum"));
        assert!(!is_settled_invocation("Tool: k\nArguments: {\"a\":"));
        assert!(!is_settled_invocation("Tool: k\nArguments: "));
        assert!(!is_settled_invocation("Tool: kub"));
        // a banner may still be followed by the Tool: line
        assert!(!is_settled_invocation("Running kubectl get pods"));
    }

    #[test]
    fn broken_shapes_are_settled() {
        assert!(is_settled_invocation("Tool: k\nArguments: [1,2]"));
        assert!(is_settled_invocation("Tool: k\nArguments: [1,"));
        assert!(is_settled_invocation("Tool: k\nArguments: \"text\""));
        assert!(is_settled_invocation("Tool:   \nArguments: {}"));
        assert!(is_settled_invocation("Arguments: {}"));
        assert!(is_settled_invocation("Tool: k\nArguments: {\"a\": 1} trailing"));
    }

    #[test]
    fn settled_does_not_imply_valid() {
        let payload = "Tool: k\nArguments: [1,2]";
        assert!(is_settled_invocation(payload));
        assert!(parse_tool_invocation("t", payload).is_err());
    }

    #[test]
    fn errors_are_classification_errors() {
        assert_matches!(
            parse_tool_invocation("t", "no tool here"),
            Err(StreamError::Classification { reason, .. }) if reason.contains("Tool:")
        );
        assert_matches!(
            parse_tool_invocation("t", "Tool:   \nArguments: {}"),
            Err(StreamError::Classification { reason, .. }) if reason.contains("empty tool name")
        );
        assert_matches!(
            parse_tool_invocation("t", "Tool: k\nArguments: [1]"),
            Err(StreamError::Classification { reason, .. }) if reason.contains("not a JSON object")
        );
    }
}

//! Rebuilds a renderable thread from stored conversation rows.
//!
//! The backend persists a single assistant turn as several rows: the function
//! calls the model made, one `tool` row per result, and the natural-language
//! reply. [`reconstruct`] pairs calls with their results by call id and folds
//! the reply back onto the message that carried the calls.

use serde_json::{Map, Value};
use tracing::trace;

use crate::api::conversation::{MessageRole, StoredMessage};
use crate::core::message::{DisplayMessage, DisplayRole, MessagePart, ToolInvocation, ToolState};

/// One normalized entry of a row's `contentJson` side channel.
#[derive(Debug, Clone, PartialEq)]
pub enum StructuredContent {
    FunctionCall {
        call_id: Option<String>,
        name: Option<String>,
        arguments: Map<String, Value>,
    },
    FunctionResult {
        call_id: Option<String>,
        result: Option<Value>,
    },
    Unknown,
}

impl StructuredContent {
    fn from_entry(entry: &Value) -> Self {
        let Some(fields) = entry.as_object() else {
            return StructuredContent::Unknown;
        };
        match fields.get("$type").and_then(Value::as_str) {
            Some("functionCall") => StructuredContent::FunctionCall {
                call_id: either_string(fields, "CallId", "callId"),
                name: either_string(fields, "Name", "name"),
                arguments: match either_value(fields, "Arguments", "arguments") {
                    Some(Value::Object(arguments)) => arguments.clone(),
                    _ => Map::new(),
                },
            },
            Some("functionResult") => StructuredContent::FunctionResult {
                call_id: either_string(fields, "CallId", "callId"),
                result: either_value(fields, "Result", "result").cloned(),
            },
            _ => StructuredContent::Unknown,
        }
    }
}

fn either_value<'a>(fields: &'a Map<String, Value>, pascal: &str, camel: &str) -> Option<&'a Value> {
    [pascal, camel]
        .into_iter()
        .filter_map(|key| fields.get(key))
        .find(|value| !value.is_null())
}

fn either_string(fields: &Map<String, Value>, pascal: &str, camel: &str) -> Option<String> {
    [pascal, camel]
        .into_iter()
        .filter_map(|key| fields.get(key).and_then(Value::as_str))
        .find(|value| !value.is_empty())
        .map(str::to_string)
}

/// Normalizes a raw `contentJson` string.
///
/// Anything other than a non-empty JSON array yields no entries.
pub fn parse_content_json(raw: &str) -> Vec<StructuredContent> {
    let raw = raw.trim();
    if raw.is_empty() || raw == "{}" || raw == "[]" {
        return Vec::new();
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Array(entries)) => entries.iter().map(StructuredContent::from_entry).collect(),
        Ok(_) => Vec::new(),
        Err(err) => {
            trace!(error = %err, "ignoring unparseable contentJson");
            Vec::new()
        }
    }
}

fn non_blank(text: &str) -> Option<&str> {
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Converts sequence-ordered rows into display messages.
///
/// Stateless: the same input always produces the same output.
pub fn reconstruct(rows: &[StoredMessage]) -> Vec<DisplayMessage> {
    let normalized: Vec<Vec<StructuredContent>> = rows
        .iter()
        .map(|row| parse_content_json(&row.content_json))
        .collect();
    let mut thread: Vec<DisplayMessage> = Vec::new();

    for (index, row) in rows.iter().enumerate() {
        match row.role {
            MessageRole::User => {
                thread.push(DisplayMessage::text(
                    row.display_id(),
                    DisplayRole::User,
                    row.content.clone(),
                ));
            }
            MessageRole::Assistant => {
                let calls: Vec<&StructuredContent> = normalized[index]
                    .iter()
                    .filter(|entry| matches!(entry, StructuredContent::FunctionCall { .. }))
                    .collect();

                if calls.is_empty() {
                    if let Some(previous) = thread.last_mut().filter(|previous| {
                        previous.role == DisplayRole::Assistant && previous.has_tool_invocation()
                    }) {
                        if let Some(text) = non_blank(&row.content) {
                            previous.push_text(text);
                        }
                        previous.id = row.display_id().to_string();
                        continue;
                    }
                }

                let mut message = DisplayMessage::new(row.display_id(), DisplayRole::Assistant);
                for call in calls {
                    if let StructuredContent::FunctionCall {
                        call_id,
                        name,
                        arguments,
                    } = call
                    {
                        let call_id = call_id.clone().unwrap_or_else(|| format!("tc-{index}"));
                        let result = resolve_result(rows, &normalized, index, &call_id);
                        message.parts.push(MessagePart::ToolInvocation(ToolInvocation {
                            tool_name: name.clone().unwrap_or_else(|| "unknown".to_string()),
                            tool_call_id: call_id,
                            arguments: Value::Object(arguments.clone()),
                            result,
                            state: ToolState::Completed,
                        }));
                    }
                }
                if let Some(text) = non_blank(&row.content) {
                    message.push_text(text);
                }

                if !message.parts.is_empty() {
                    thread.push(message);
                }
            }
            MessageRole::Tool | MessageRole::Other => {}
        }
    }

    thread
}

/// Scans forward from `index` for the result of `call_id`, stopping at the next user row.
fn resolve_result(
    rows: &[StoredMessage],
    normalized: &[Vec<StructuredContent>],
    index: usize,
    call_id: &str,
) -> Option<Value> {
    for (offset, row) in rows.iter().enumerate().skip(index + 1) {
        match row.role {
            MessageRole::User => return None,
            MessageRole::Tool => {
                let entries = &normalized[offset];
                let matched = entries.iter().find_map(|entry| match entry {
                    StructuredContent::FunctionResult {
                        call_id: Some(id),
                        result,
                    } if id == call_id => Some(result),
                    _ => None,
                });
                if let Some(result) = matched {
                    return Some(
                        result
                            .clone()
                            .unwrap_or_else(|| Value::String(row.content.clone())),
                    );
                }
                if entries.is_empty() && !row.content.is_empty() {
                    return Some(Value::String(row.content.clone()));
                }
            }
            MessageRole::Assistant | MessageRole::Other => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(sequence: i64, role: MessageRole, content: &str, content_json: Value) -> StoredMessage {
        StoredMessage {
            id: format!("row-{sequence}"),
            sequence,
            message_id: format!("msg-{sequence}"),
            role,
            author_name: None,
            source: None,
            content: content.to_string(),
            content_json: match content_json {
                Value::Null => String::new(),
                other => other.to_string(),
            },
            created_at: None,
        }
    }

    fn call(id: &str, name: &str, arguments: Value) -> Value {
        json!({"$type": "functionCall", "CallId": id, "Name": name, "Arguments": arguments})
    }

    fn result(id: &str, value: Value) -> Value {
        json!({"$type": "functionResult", "CallId": id, "Result": value})
    }

    fn only_invocation(message: &DisplayMessage) -> &ToolInvocation {
        let invocations: Vec<_> = message.tool_invocations().collect();
        assert_eq!(invocations.len(), 1, "parts: {:?}", message.parts);
        invocations[0]
    }

    fn tool_round_trip() -> Vec<StoredMessage> {
        vec![
            row(1, MessageRole::User, "hi", Value::Null),
            row(
                2,
                MessageRole::Assistant,
                "",
                json!([call("A", "X", json!({"q": "life"}))]),
            ),
            row(3, MessageRole::Tool, "", json!([result("A", json!("42"))])),
            row(4, MessageRole::Assistant, "The answer is 42", Value::Null),
        ]
    }

    #[test]
    fn folds_tool_round_trip_into_one_assistant_message() {
        let thread = reconstruct(&tool_round_trip());

        assert_eq!(thread.len(), 2);
        assert_eq!(thread[0].role, DisplayRole::User);
        assert_eq!(thread[0].plain_text(), "hi");

        let reply = &thread[1];
        assert_eq!(reply.role, DisplayRole::Assistant);
        assert_eq!(reply.id, "msg-4");
        assert_eq!(reply.parts.len(), 2);
        match &reply.parts[0] {
            MessagePart::ToolInvocation(invocation) => {
                assert_eq!(invocation.tool_name, "X");
                assert_eq!(invocation.tool_call_id, "A");
                assert_eq!(invocation.arguments, json!({"q": "life"}));
                assert_eq!(invocation.result, Some(json!("42")));
                assert_eq!(invocation.state, ToolState::Completed);
            }
            other => panic!("expected tool invocation, got {other:?}"),
        }
        assert_eq!(
            reply.parts[1],
            MessagePart::Text {
                text: "The answer is 42".into()
            }
        );
    }

    #[test]
    fn unresolved_call_stops_at_next_user_row() {
        let rows = vec![
            row(1, MessageRole::Assistant, "", json!([call("B", "lookup", json!({}))])),
            row(2, MessageRole::User, "next", Value::Null),
            row(3, MessageRole::Tool, "", json!([result("B", json!("late"))])),
        ];
        let thread = reconstruct(&rows);

        assert_eq!(thread.len(), 2);
        assert_eq!(only_invocation(&thread[0]).result, None);
        assert_eq!(thread[1].role, DisplayRole::User);
    }

    #[test]
    fn reconstruction_is_idempotent() {
        let rows = tool_round_trip();
        assert_eq!(reconstruct(&rows), reconstruct(&rows));
    }

    #[test]
    fn tolerates_camel_case_fields() {
        let rows = vec![
            row(
                1,
                MessageRole::Assistant,
                "",
                json!([{"$type": "functionCall", "callId": "c1", "name": "search", "arguments": {"k": 1}}]),
            ),
            row(
                2,
                MessageRole::Tool,
                "",
                json!([{"$type": "functionResult", "callId": "c1", "result": {"hits": 3}}]),
            ),
        ];
        let thread = reconstruct(&rows);
        let invocation = only_invocation(&thread[0]);

        assert_eq!(invocation.tool_name, "search");
        assert_eq!(invocation.arguments, json!({"k": 1}));
        assert_eq!(invocation.result, Some(json!({"hits": 3})));
    }

    #[test]
    fn missing_call_fields_fall_back() {
        let rows = vec![row(
            1,
            MessageRole::Assistant,
            "Let me check.",
            json!([{"$type": "functionCall", "Arguments": "not an object"}]),
        )];
        let thread = reconstruct(&rows);
        let invocation = only_invocation(&thread[0]);

        assert_eq!(invocation.tool_call_id, "tc-0");
        assert_eq!(invocation.tool_name, "unknown");
        assert_eq!(invocation.arguments, json!({}));
        assert_eq!(thread[0].plain_text(), "Let me check.");
    }

    #[test]
    fn raw_tool_row_content_is_used_as_result() {
        let rows = vec![
            row(1, MessageRole::Assistant, "", json!([call("A", "X", json!({}))])),
            row(2, MessageRole::Tool, "   ", Value::Null),
            row(3, MessageRole::Tool, "first raw", Value::Null),
            row(4, MessageRole::Tool, "second raw", Value::Null),
        ];
        let thread = reconstruct(&rows);
        assert_eq!(only_invocation(&thread[0]).result, Some(json!("   ")));

        let rows = vec![
            row(1, MessageRole::Assistant, "", json!([call("A", "X", json!({}))])),
            row(2, MessageRole::Tool, "", Value::Null),
            row(3, MessageRole::Tool, "first raw", Value::Null),
            row(4, MessageRole::Tool, "second raw", Value::Null),
        ];
        let thread = reconstruct(&rows);
        assert_eq!(only_invocation(&thread[0]).result, Some(json!("first raw")));
    }

    #[test]
    fn unmatched_structured_tool_row_continues_scan() {
        let rows = vec![
            row(1, MessageRole::Assistant, "", json!([call("A", "X", json!({}))])),
            row(2, MessageRole::Tool, "ignored", json!([result("other", json!(1))])),
            row(3, MessageRole::Tool, "fallback", json!([result("A", Value::Null)])),
        ];
        let thread = reconstruct(&rows);
        assert_eq!(only_invocation(&thread[0]).result, Some(json!("fallback")));
    }

    #[test]
    fn multiple_calls_keep_call_order() {
        let rows = vec![
            row(
                1,
                MessageRole::Assistant,
                "",
                json!([
                    call("first", "weather", json!({"city": "Oslo"})),
                    {"$type": "text", "Text": "thinking"},
                    call("second", "time", json!({"tz": "CET"})),
                ]),
            ),
            row(
                2,
                MessageRole::Tool,
                "",
                json!([result("second", json!("12:00")), result("first", json!("rain"))]),
            ),
        ];
        let thread = reconstruct(&rows);
        let invocations: Vec<_> = thread[0].tool_invocations().collect();

        assert_eq!(invocations.len(), 2);
        assert_eq!(invocations[0].tool_call_id, "first");
        assert_eq!(invocations[0].result, Some(json!("rain")));
        assert_eq!(invocations[1].tool_call_id, "second");
        assert_eq!(invocations[1].result, Some(json!("12:00")));
    }

    #[test]
    fn blank_follow_up_still_takes_over_id() {
        let mut rows = tool_round_trip();
        rows[3].content = "  ".into();
        let thread = reconstruct(&rows);

        assert_eq!(thread.len(), 2);
        assert_eq!(thread[1].id, "msg-4");
        assert_eq!(thread[1].parts.len(), 1);
    }

    #[test]
    fn plain_assistant_rows_without_tools_stay_separate() {
        let rows = vec![
            row(1, MessageRole::User, "hello", Value::Null),
            row(2, MessageRole::Assistant, "Hi there.", Value::Null),
            row(3, MessageRole::Assistant, "Anything else?", json!({"not": "an array"})),
            row(4, MessageRole::Assistant, " \n", json!([])),
            row(5, MessageRole::Tool, "orphan", Value::Null),
        ];
        let thread = reconstruct(&rows);

        let texts: Vec<String> = thread.iter().map(DisplayMessage::plain_text).collect();
        assert_eq!(texts, vec!["hello", "Hi there.", "Anything else?"]);
        assert!(thread.iter().all(|message| !message.parts.is_empty()));
    }

    #[test]
    fn display_ids_fall_back_to_row_ids() {
        let mut rows = vec![row(1, MessageRole::User, "hi", Value::Null)];
        rows[0].message_id.clear();
        assert_eq!(reconstruct(&rows)[0].id, "row-1");
    }

    #[test]
    fn content_json_normalization_rejects_non_arrays() {
        assert!(parse_content_json("").is_empty());
        assert!(parse_content_json("{}").is_empty());
        assert!(parse_content_json("[]").is_empty());
        assert!(parse_content_json("{\"$type\":\"functionCall\"}").is_empty());
        assert!(parse_content_json("[not json").is_empty());
        assert_eq!(
            parse_content_json("[{\"$type\":\"reasoning\"}, 7]"),
            vec![StructuredContent::Unknown, StructuredContent::Unknown]
        );
    }
}

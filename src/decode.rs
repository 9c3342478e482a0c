use serde_json::{Map, Value};

use crate::events::{
    AgentEvent, BlockPhase, LifecyclePhase, Metadata, ResultItem, ToolInvocation, ToolPhase,
    ToolResult, ToolStatus,
};

/// Turns raw runtime payloads into typed events.
///
/// Stateless and total: a payload with unknown keys, mistyped values or no
/// recognized keys at all decodes to fewer (possibly zero) events, never an error.
/// Rules fire in a fixed order and several may fire for one payload:
///
/// 1. lifecycle markers (`init_event_loop`, `start`, `start_event_loop`)
/// 2. the nested `event` object, one event per sub-key
/// 3. tool results echoed in a user-role `message`
/// 4. `data` text
/// 5. `current_tool_use`
/// 6. terminal markers (`force_stop`, `complete`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decoder {
    stream_text: bool,
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder {
    pub fn new() -> Self {
        Self { stream_text: true }
    }

    /// Whether `event.contentBlockDelta.delta.text` yields a text delta.
    /// Turn this off for runtimes that also report every delta as a `data` payload,
    /// otherwise each chunk of text arrives twice.
    pub fn with_stream_text(mut self, enabled: bool) -> Self {
        self.stream_text = enabled;
        self
    }

    pub fn decode(&self, payload: &Value) -> Vec<AgentEvent> {
        let Some(obj) = payload.as_object() else {
            return Vec::new();
        };

        let mut events = Vec::new();
        lifecycle_markers(obj, &mut events);

        if let Some(event) = obj.get("event").and_then(Value::as_object) {
            self.stream_event(event, &mut events);
        }

        if let Some(message) = obj.get("message").and_then(Value::as_object) {
            tool_results(message, &mut events);
        }

        if let Some(data) = obj.get("data") {
            events.push(AgentEvent::TextDelta {
                content: text_of(data),
                is_final: flag(obj, "complete"),
            });
        }

        if let Some(tool) = current_tool_use(obj) {
            events.push(AgentEvent::ToolInvocation(tool));
        }

        terminal_markers(obj, &mut events);
        events
    }

    fn stream_event(&self, event: &Map<String, Value>, out: &mut Vec<AgentEvent>) {
        if event.contains_key("messageStart") {
            out.push(AgentEvent::lifecycle(LifecyclePhase::MessageStart));
        }

        if let Some(start) = event.get("contentBlockStart") {
            let tool_name = start["start"]["toolUse"]["name"]
                .as_str()
                .map(str::to_string);
            out.push(AgentEvent::ContentBlock {
                phase: BlockPhase::Start,
                index: block_index(start),
                tool_name,
            });
        }

        if self.stream_text {
            if let Some(text) = event
                .get("contentBlockDelta")
                .and_then(|d| d["delta"]["text"].as_str())
            {
                out.push(AgentEvent::text(text));
            }
        }

        if let Some(stop) = event.get("contentBlockStop") {
            out.push(AgentEvent::ContentBlock {
                phase: BlockPhase::Stop,
                index: block_index(stop),
                tool_name: None,
            });
        }

        if let Some(stop) = event.get("messageStop") {
            out.push(AgentEvent::Lifecycle {
                phase: LifecyclePhase::MessageStop,
                reason: stop["stopReason"].as_str().map(str::to_string),
            });
        }

        if let Some(meta) = event.get("metadata") {
            out.push(AgentEvent::Metadata(Metadata {
                input_tokens: meta["usage"]["inputTokens"].as_u64().unwrap_or(0),
                output_tokens: meta["usage"]["outputTokens"].as_u64().unwrap_or(0),
                latency_ms: meta["metrics"]["latencyMs"].as_u64().unwrap_or(0),
            }));
        }
    }
}

fn lifecycle_markers(obj: &Map<String, Value>, out: &mut Vec<AgentEvent>) {
    if obj.contains_key("init_event_loop") {
        out.push(AgentEvent::lifecycle(LifecyclePhase::Init));
    }
    if obj.get("start") == Some(&Value::Bool(true)) {
        out.push(AgentEvent::lifecycle(LifecyclePhase::Start));
    }
    if obj.contains_key("start_event_loop") {
        out.push(AgentEvent::lifecycle(LifecyclePhase::EventLoopStart));
    }
}

fn tool_results(message: &Map<String, Value>, out: &mut Vec<AgentEvent>) {
    if message.get("role").and_then(Value::as_str) != Some("user") {
        return;
    }
    let Some(content) = message.get("content").and_then(Value::as_array) else {
        return;
    };

    for item in content {
        let Some(result) = item.get("toolResult") else {
            continue;
        };
        let status = match result["status"].as_str() {
            Some("error") => ToolStatus::Error,
            _ => ToolStatus::Success,
        };
        let content = result["content"]
            .as_array()
            .map(|items| items.iter().filter_map(result_item).collect())
            .unwrap_or_default();

        out.push(AgentEvent::ToolResult(ToolResult {
            tool_call_id: result["toolUseId"].as_str().unwrap_or("").to_string(),
            status,
            content,
        }));
    }
}

fn result_item(item: &Value) -> Option<ResultItem> {
    if let Some(text) = item.get("text") {
        return Some(ResultItem::Text(text_of(text)));
    }
    item.get("json").map(|json| ResultItem::Json(json.clone()))
}

fn current_tool_use(obj: &Map<String, Value>) -> Option<ToolInvocation> {
    let tool = obj.get("current_tool_use")?.as_object()?;
    let name = tool.get("name")?.as_str().filter(|n| !n.is_empty())?;
    let input = match tool.get("input") {
        Some(Value::Null) | None => Value::Object(Map::new()),
        Some(v) => v.clone(),
    };

    let result = obj.get("tool_result").filter(|r| truthy(r)).cloned();
    let phase = if result.is_some() {
        ToolPhase::End
    } else {
        ToolPhase::Start
    };

    Some(ToolInvocation {
        phase,
        tool_name: name.to_string(),
        input,
        result,
    })
}

fn terminal_markers(obj: &Map<String, Value>, out: &mut Vec<AgentEvent>) {
    if flag(obj, "force_stop") {
        out.push(AgentEvent::Lifecycle {
            phase: LifecyclePhase::ForceStop,
            reason: obj
                .get("force_stop_reason")
                .map(text_of)
                .filter(|r| !r.is_empty()),
        });
    } else if flag(obj, "complete") {
        out.push(AgentEvent::lifecycle(LifecyclePhase::Complete));
    }
}

fn block_index(block: &Value) -> u64 {
    block["contentBlockIndex"].as_u64().unwrap_or(0)
}

fn flag(obj: &Map<String, Value>, key: &str) -> bool {
    obj.get(key).is_some_and(truthy)
}

/// Loose truthiness: null, false, 0, and empty strings/arrays/objects are false.
fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(payload: Value) -> Vec<AgentEvent> {
        Decoder::new().decode(&payload)
    }

    #[test]
    fn unknown_keys_decode_to_nothing() {
        assert!(decode(json!({"foo": 1, "bar": {"baz": true}})).is_empty());
        assert!(decode(json!({})).is_empty());
        assert!(decode(json!("just a string")).is_empty());
        assert!(decode(Value::Null).is_empty());
    }

    #[test]
    fn lifecycle_markers_in_order() {
        let events = decode(json!({
            "init_event_loop": true,
            "start": true,
            "start_event_loop": true,
        }));
        assert_eq!(
            events,
            vec![
                AgentEvent::lifecycle(LifecyclePhase::Init),
                AgentEvent::lifecycle(LifecyclePhase::Start),
                AgentEvent::lifecycle(LifecyclePhase::EventLoopStart),
            ]
        );
    }

    #[test]
    fn event_loop_markers_fire_on_key_alone() {
        assert_eq!(
            decode(json!({"init_event_loop": false})),
            vec![AgentEvent::lifecycle(LifecyclePhase::Init)]
        );
        assert_eq!(
            decode(json!({"start_event_loop": null})),
            vec![AgentEvent::lifecycle(LifecyclePhase::EventLoopStart)]
        );
    }

    #[test]
    fn event_loop_metrics_add_nothing() {
        let events = decode(json!({
            "data": "hi",
            "event_loop_metrics": {"cycle_count": 2, "accumulated_usage": {"totalTokens": 40}}
        }));
        assert_eq!(events, vec![AgentEvent::text("hi")]);
    }

    #[test]
    fn start_requires_literal_true() {
        assert!(decode(json!({"start": "yes"})).is_empty());
        assert!(decode(json!({"start": false})).is_empty());
    }

    #[test]
    fn content_block_delta_text_dispatches_once() {
        let events = decode(json!({
            "event": {"contentBlockDelta": {"delta": {"text": "X"}, "contentBlockIndex": 0}}
        }));
        assert_eq!(events, vec![AgentEvent::text("X")]);
    }

    #[test]
    fn stream_text_can_be_disabled() {
        let decoder = Decoder::new().with_stream_text(false);
        let events = decoder.decode(&json!({
            "event": {"contentBlockDelta": {"delta": {"text": "X"}}}
        }));
        assert!(events.is_empty());
    }

    #[test]
    fn tool_use_delta_is_not_text() {
        let events = decode(json!({
            "event": {"contentBlockDelta": {"delta": {"toolUse": {"input": "{\"a\""}}}}
        }));
        assert!(events.is_empty());
    }

    #[test]
    fn stream_event_sub_keys_each_fire() {
        let events = decode(json!({
            "event": {
                "messageStart": {"role": "assistant"},
                "contentBlockStart": {
                    "contentBlockIndex": 2,
                    "start": {"toolUse": {"name": "get_fund_info", "toolUseId": "t1"}}
                },
                "contentBlockStop": {"contentBlockIndex": 2},
                "messageStop": {"stopReason": "tool_use"},
                "metadata": {
                    "usage": {"inputTokens": 120, "outputTokens": 45},
                    "metrics": {"latencyMs": 830}
                }
            }
        }));

        assert_eq!(
            events,
            vec![
                AgentEvent::lifecycle(LifecyclePhase::MessageStart),
                AgentEvent::ContentBlock {
                    phase: BlockPhase::Start,
                    index: 2,
                    tool_name: Some("get_fund_info".into()),
                },
                AgentEvent::ContentBlock {
                    phase: BlockPhase::Stop,
                    index: 2,
                    tool_name: None,
                },
                AgentEvent::Lifecycle {
                    phase: LifecyclePhase::MessageStop,
                    reason: Some("tool_use".into()),
                },
                AgentEvent::Metadata(Metadata {
                    input_tokens: 120,
                    output_tokens: 45,
                    latency_ms: 830,
                }),
            ]
        );
    }

    #[test]
    fn tool_results_from_user_message() {
        let events = decode(json!({
            "message": {
                "role": "user",
                "content": [
                    {"toolResult": {
                        "toolUseId": "tooluse_1",
                        "status": "success",
                        "content": [{"text": "NAV 1.23"}, {"json": {"nav": 1.23}}, {"image": {}}]
                    }},
                    {"text": "not a tool result"},
                    {"toolResult": {"toolUseId": "tooluse_2", "status": "error", "content": []}}
                ]
            }
        }));

        assert_eq!(
            events,
            vec![
                AgentEvent::ToolResult(ToolResult {
                    tool_call_id: "tooluse_1".into(),
                    status: ToolStatus::Success,
                    content: vec![
                        ResultItem::Text("NAV 1.23".into()),
                        ResultItem::Json(json!({"nav": 1.23})),
                    ],
                }),
                AgentEvent::ToolResult(ToolResult {
                    tool_call_id: "tooluse_2".into(),
                    status: ToolStatus::Error,
                    content: vec![],
                }),
            ]
        );
    }

    #[test]
    fn assistant_message_is_not_a_tool_result() {
        let events = decode(json!({
            "message": {"role": "assistant", "content": [{"toolResult": {"toolUseId": "x"}}]}
        }));
        assert!(events.is_empty());
    }

    #[test]
    fn data_with_complete_is_final_and_terminal() {
        let events = decode(json!({"data": " world", "complete": true}));
        assert_eq!(
            events,
            vec![
                AgentEvent::TextDelta {
                    content: " world".into(),
                    is_final: true,
                },
                AgentEvent::lifecycle(LifecyclePhase::Complete),
            ]
        );
    }

    #[test]
    fn tool_start_without_result() {
        let events = decode(json!({
            "current_tool_use": {"name": "get_fund_info", "input": {"fundCode": "000001"}}
        }));
        assert_eq!(
            events,
            vec![AgentEvent::tool_start(
                "get_fund_info",
                json!({"fundCode": "000001"})
            )]
        );
    }

    #[test]
    fn tool_end_carries_result() {
        let events = decode(json!({
            "current_tool_use": {"name": "get_fund_info"},
            "tool_result": {"nav": 1.5}
        }));
        assert_eq!(
            events,
            vec![AgentEvent::ToolInvocation(ToolInvocation {
                phase: ToolPhase::End,
                tool_name: "get_fund_info".into(),
                input: json!({}),
                result: Some(json!({"nav": 1.5})),
            })]
        );
    }

    #[test]
    fn empty_tool_result_still_means_start() {
        let events = decode(json!({
            "current_tool_use": {"name": "lookup", "input": null},
            "tool_result": {}
        }));
        assert!(matches!(
            &events[0],
            AgentEvent::ToolInvocation(ToolInvocation { phase: ToolPhase::Start, input, .. })
                if input == &json!({})
        ));
    }

    #[test]
    fn nameless_tool_use_is_ignored() {
        assert!(decode(json!({"current_tool_use": {"name": ""}})).is_empty());
        assert!(decode(json!({"current_tool_use": {"input": {}}})).is_empty());
        assert!(decode(json!({"current_tool_use": "get_fund_info"})).is_empty());
    }

    #[test]
    fn force_stop_wins_over_complete() {
        let events = decode(json!({
            "force_stop": true,
            "force_stop_reason": "context overflow",
            "complete": true
        }));
        assert_eq!(
            events,
            vec![AgentEvent::Lifecycle {
                phase: LifecyclePhase::ForceStop,
                reason: Some("context overflow".into()),
            }]
        );
    }

    #[test]
    fn mistyped_values_are_tolerated() {
        let events = decode(json!({
            "event": {"metadata": {"usage": "lots"}, "contentBlockStart": 7},
            "message": {"role": "user", "content": "nope"},
            "data": 42
        }));
        assert_eq!(
            events,
            vec![
                AgentEvent::ContentBlock {
                    phase: BlockPhase::Start,
                    index: 0,
                    tool_name: None,
                },
                AgentEvent::Metadata(Metadata::default()),
                AgentEvent::text("42"),
            ]
        );
    }
}

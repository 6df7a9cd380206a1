//! Claude Messages API shapes.
//!
//! Request, response, and streaming-event types for the protocol the relay
//! speaks to its callers. Content is modeled as closed tagged unions; an
//! unknown block or event tag is a deserialization error, not a passthrough.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Request Types
// ============================================================================

/// Role of a chat message. The system prompt is carried separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One typed unit of message content.
///
/// Ordering within a message's content list is semantically significant and
/// is preserved through every transformation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Image {
        source: ImageSource,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        #[serde(default)]
        content: Value,
    },
}

/// Image payload descriptor: base64 data or a URL reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageSource {
    #[serde(rename = "type")]
    pub source_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Message content: either a plain string or an ordered block sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaudeMessage {
    pub role: Role,
    pub content: MessageContent,
}

/// System prompt: a plain string or a sequence of text blocks.
///
/// Blocks are deliberately loose here; entries with a missing or empty text
/// field are dropped during transformation rather than rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SystemPrompt {
    Text(String),
    Blocks(Vec<SystemBlock>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemBlock {
    #[serde(rename = "type")]
    pub block_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Tool declaration offered to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaudeTool {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub input_schema: Value,
}

/// Inbound messages request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaudeRequest {
    pub model: String,
    pub messages: Vec<ClaudeMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<SystemPrompt>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ClaudeTool>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<Value>,
}

// ============================================================================
// Response Types
// ============================================================================

/// Termination cause of a generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    ToolUse,
    StopSequence,
}

impl StopReason {
    /// Map an OpenAI-style finish reason onto the stop-reason vocabulary.
    ///
    /// The mapping is total: unrecognized reasons collapse to `EndTurn`.
    pub fn from_finish_reason(reason: &str) -> Self {
        match reason {
            "stop" => StopReason::EndTurn,
            "length" => StopReason::MaxTokens,
            "tool_calls" => StopReason::ToolUse,
            "content_filter" => StopReason::StopSequence,
            _ => StopReason::EndTurn,
        }
    }
}

impl Default for StopReason {
    fn default() -> Self {
        StopReason::EndTurn
    }
}

/// Token usage counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaudeUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
}

/// Outbound messages response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaudeResponse {
    pub id: String,
    #[serde(rename = "type")]
    pub response_type: String,
    pub role: String,
    pub model: String,
    pub content: Vec<ContentBlock>,
    pub stop_reason: StopReason,
    pub stop_sequence: Option<String>,
    pub usage: ClaudeUsage,
}

// ============================================================================
// Streaming Types
// ============================================================================

/// Claude-shaped SSE event.
///
/// A well-formed stream emits exactly one `MessageStart` first and exactly
/// one `MessageStop` last; `ContentBlockStart` for an index always precedes
/// any `ContentBlockDelta` for it, and `ContentBlockStop` precedes the
/// terminal `MessageDelta`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    MessageStart {
        message: StreamMessage,
    },
    ContentBlockStart {
        index: u32,
        content_block: ContentBlock,
    },
    ContentBlockDelta {
        index: u32,
        delta: ContentDelta,
    },
    ContentBlockStop {
        index: u32,
    },
    MessageDelta {
        delta: MessageDelta,
        usage: ClaudeUsage,
    },
    MessageStop,
}

impl StreamEvent {
    /// SSE event name, matching the payload's `type` tag.
    pub fn name(&self) -> &'static str {
        match self {
            StreamEvent::MessageStart { .. } => "message_start",
            StreamEvent::ContentBlockStart { .. } => "content_block_start",
            StreamEvent::ContentBlockDelta { .. } => "content_block_delta",
            StreamEvent::ContentBlockStop { .. } => "content_block_stop",
            StreamEvent::MessageDelta { .. } => "message_delta",
            StreamEvent::MessageStop => "message_stop",
        }
    }

    /// Render the event as one outbound SSE frame.
    pub fn to_sse(&self) -> crate::core::Result<String> {
        Ok(format!(
            "event: {}\ndata: {}\n\n",
            self.name(),
            serde_json::to_string(self)?
        ))
    }
}

/// Message envelope carried by `message_start`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamMessage {
    pub id: String,
    #[serde(rename = "type")]
    pub message_type: String,
    pub role: String,
    pub content: Vec<ContentBlock>,
    pub model: String,
    pub stop_reason: Option<StopReason>,
    pub stop_sequence: Option<String>,
    pub usage: ClaudeUsage,
}

/// Incremental content payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentDelta {
    TextDelta { text: String },
}

/// Payload of the terminal `message_delta` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageDelta {
    pub stop_reason: StopReason,
    pub stop_sequence: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_content_block_tagging() {
        let block: ContentBlock = serde_json::from_str(r#"{"type":"text","text":"hi"}"#).unwrap();
        assert_eq!(
            block,
            ContentBlock::Text {
                text: "hi".to_string()
            }
        );

        let json = serde_json::to_string(&ContentBlock::ToolUse {
            id: "toolu_1".to_string(),
            name: "search".to_string(),
            input: serde_json::json!({"q": "x"}),
        })
        .unwrap();
        assert!(json.contains(r#""type":"tool_use""#));
    }

    #[test]
    fn test_unknown_block_tag_rejected() {
        let result = serde_json::from_str::<ContentBlock>(r#"{"type":"hologram","data":"x"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_message_content_untagged() {
        let plain: MessageContent = serde_json::from_str(r#""hello""#).unwrap();
        assert_eq!(plain, MessageContent::Text("hello".to_string()));

        let blocks: MessageContent =
            serde_json::from_str(r#"[{"type":"text","text":"hello"}]"#).unwrap();
        assert!(matches!(blocks, MessageContent::Blocks(ref b) if b.len() == 1));
    }

    #[test]
    fn test_system_block_tolerates_missing_text() {
        let system: SystemPrompt =
            serde_json::from_str(r#"[{"type":"text"},{"type":"text","text":"rules"}]"#).unwrap();
        match system {
            SystemPrompt::Blocks(blocks) => {
                assert_eq!(blocks[0].text, None);
                assert_eq!(blocks[1].text.as_deref(), Some("rules"));
            }
            SystemPrompt::Text(_) => panic!("expected blocks"),
        }
    }

    #[test]
    fn test_finish_reason_mapping_is_total() {
        assert_eq!(StopReason::from_finish_reason("stop"), StopReason::EndTurn);
        assert_eq!(
            StopReason::from_finish_reason("length"),
            StopReason::MaxTokens
        );
        assert_eq!(
            StopReason::from_finish_reason("tool_calls"),
            StopReason::ToolUse
        );
        assert_eq!(
            StopReason::from_finish_reason("content_filter"),
            StopReason::StopSequence
        );
        // Everything else collapses to end_turn.
        assert_eq!(
            StopReason::from_finish_reason("eos_token"),
            StopReason::EndTurn
        );
        assert_eq!(StopReason::from_finish_reason(""), StopReason::EndTurn);
    }

    #[test]
    fn test_stream_event_sse_frame() {
        let frame = StreamEvent::MessageStop.to_sse().unwrap();
        assert_eq!(frame, "event: message_stop\ndata: {\"type\":\"message_stop\"}\n\n");
    }

    #[test]
    fn test_stream_event_names_match_tags() {
        let event = StreamEvent::ContentBlockDelta {
            index: 0,
            delta: ContentDelta::TextDelta {
                text: "Hi".to_string(),
            },
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"content_block_delta""#));
        assert!(json.contains(r#""type":"text_delta""#));
        assert_eq!(event.name(), "content_block_delta");
    }

    #[test]
    fn test_request_minimal() {
        let request: ClaudeRequest = serde_json::from_str(
            r#"{"model":"x","messages":[{"role":"user","content":"hi"}]}"#,
        )
        .unwrap();
        assert_eq!(request.model, "x");
        assert!(!request.stream);
        assert!(request.system.is_none());
    }
}

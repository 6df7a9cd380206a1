//! OpenAI-compatible chat-completion shapes and the Claude → OpenAI transformer.
//!
//! This is the translation target for third-party providers: requests are
//! mapped out of the Claude Messages shape, and synchronous replies are
//! mapped back into it. Streaming replies go through
//! [`super::stream::OpenAiToClaudeStream`].

use super::claude::{
    ClaudeMessage, ClaudeRequest, ClaudeResponse, ClaudeTool, ClaudeUsage, ContentBlock,
    MessageContent, Role, StopReason, SystemPrompt,
};
use super::{StreamTransform, Transformer};
use crate::core::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

// ============================================================================
// OpenAI Request Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpenAiRole {
    System,
    User,
    Assistant,
    Tool,
}

/// Message content: a plain string or a list of typed parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OpenAiContent {
    Text(String),
    Parts(Vec<OpenAiContentPart>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OpenAiContentPart {
    Text {
        text: String,
    },
    ImageUrl {
        image_url: OpenAiImageUrl,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        media_type: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenAiImageUrl {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenAiMessage {
    pub role: OpenAiRole,
    pub content: OpenAiContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<OpenAiToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl OpenAiMessage {
    fn text(role: OpenAiRole, text: impl Into<String>) -> Self {
        OpenAiMessage {
            role,
            content: OpenAiContent::Text(text.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenAiToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: String,
    pub function: OpenAiFunctionCall,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenAiFunctionCall {
    pub name: String,
    /// JSON-encoded arguments, kept as the raw string the wire carries.
    #[serde(default)]
    pub arguments: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenAiTool {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: OpenAiFunctionDef,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenAiFunctionDef {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiChatRequest {
    pub model: String,
    pub messages: Vec<OpenAiMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<OpenAiTool>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<Value>,
}

// ============================================================================
// OpenAI Response Types
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OpenAiResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub choices: Vec<OpenAiChoice>,
    #[serde(default)]
    pub usage: Option<OpenAiUsage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OpenAiChoice {
    #[serde(default)]
    pub message: Option<OpenAiResponseMessage>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OpenAiResponseMessage {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Vec<OpenAiToolCall>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct OpenAiUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
}

impl From<OpenAiUsage> for ClaudeUsage {
    fn from(usage: OpenAiUsage) -> Self {
        ClaudeUsage {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
        }
    }
}

/// One frame of an OpenAI-compatible chunked stream.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OpenAiStreamChunk {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub choices: Vec<OpenAiStreamChoice>,
    #[serde(default)]
    pub usage: Option<OpenAiUsage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OpenAiStreamChoice {
    #[serde(default)]
    pub delta: OpenAiStreamDelta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OpenAiStreamDelta {
    #[serde(default)]
    pub content: Option<String>,
}

// ============================================================================
// Claude -> OpenAI Transformer
// ============================================================================

/// Transformer between the Claude Messages shape and the OpenAI chat shape.
pub struct ClaudeToOpenAi;

impl ClaudeToOpenAi {
    pub fn new() -> Self {
        ClaudeToOpenAi
    }

    /// Build the outbound OpenAI-shaped request.
    ///
    /// Pure: the output is byte-for-byte reproducible for a given input.
    pub fn build_request(&self, request: &ClaudeRequest) -> Result<OpenAiChatRequest> {
        let mut messages = Vec::new();

        push_system_message(&mut messages, request.system.as_ref());
        for message in &request.messages {
            push_chat_message(&mut messages, message)?;
        }

        Ok(OpenAiChatRequest {
            model: request.model.clone(),
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            stream: request.stream,
            tools: request
                .tools
                .as_ref()
                .map(|tools| tools.iter().map(tool_to_openai).collect()),
            tool_choice: request.tool_choice.clone(),
        })
    }
}

impl Default for ClaudeToOpenAi {
    fn default() -> Self {
        Self::new()
    }
}

impl Transformer for ClaudeToOpenAi {
    fn name(&self) -> &'static str {
        "claude-to-openai"
    }

    fn transform_request(&self, request: &ClaudeRequest) -> Result<Value> {
        Ok(serde_json::to_value(self.build_request(request)?)?)
    }

    fn transform_response(&self, raw: Value) -> Result<ClaudeResponse> {
        let response: OpenAiResponse = serde_json::from_value(raw)?;

        let choice = response.choices.into_iter().next().ok_or_else(|| {
            AppError::Internal("invalid upstream response: no choices".to_string())
        })?;
        let message = choice.message.ok_or_else(|| {
            AppError::Internal("invalid upstream response: no message in choice".to_string())
        })?;

        let mut content = Vec::new();

        if let Some(text) = message.content.filter(|text| !text.is_empty()) {
            content.push(ContentBlock::Text { text });
        }

        for call in message.tool_calls {
            content.push(ContentBlock::ToolUse {
                id: call.id,
                name: call.function.name,
                input: parse_tool_arguments(&call.function.arguments),
            });
        }

        let stop_reason = choice
            .finish_reason
            .as_deref()
            .map(StopReason::from_finish_reason)
            .unwrap_or_default();

        Ok(ClaudeResponse {
            id: response.id,
            response_type: "message".to_string(),
            role: "assistant".to_string(),
            model: response.model,
            content,
            stop_reason,
            stop_sequence: None,
            usage: response.usage.map(ClaudeUsage::from).unwrap_or_default(),
        })
    }

    fn stream_transform(&self) -> Box<dyn StreamTransform> {
        Box::new(super::stream::OpenAiToClaudeStream::new())
    }
}

/// Emit the system message, if any.
///
/// A string prompt passes through as-is; a block sequence keeps only its
/// non-empty text blocks as ordered text parts. An empty prompt emits nothing.
fn push_system_message(messages: &mut Vec<OpenAiMessage>, system: Option<&SystemPrompt>) {
    match system {
        None => {}
        Some(SystemPrompt::Text(text)) => {
            if !text.is_empty() {
                messages.push(OpenAiMessage::text(OpenAiRole::System, text.clone()));
            }
        }
        Some(SystemPrompt::Blocks(blocks)) => {
            let parts: Vec<OpenAiContentPart> = blocks
                .iter()
                .filter_map(|block| match (block.block_type.as_str(), &block.text) {
                    ("text", Some(text)) if !text.is_empty() => Some(OpenAiContentPart::Text {
                        text: text.clone(),
                    }),
                    _ => None,
                })
                .collect();

            if !parts.is_empty() {
                messages.push(OpenAiMessage {
                    role: OpenAiRole::System,
                    content: OpenAiContent::Parts(parts),
                    tool_calls: None,
                    tool_call_id: None,
                });
            }
        }
    }
}

fn push_chat_message(messages: &mut Vec<OpenAiMessage>, message: &ClaudeMessage) -> Result<()> {
    match (&message.role, &message.content) {
        (Role::User, MessageContent::Text(text)) => {
            messages.push(OpenAiMessage::text(OpenAiRole::User, text.clone()));
        }
        (Role::Assistant, MessageContent::Text(text)) => {
            messages.push(OpenAiMessage::text(OpenAiRole::Assistant, text.clone()));
        }
        (Role::User, MessageContent::Blocks(blocks)) => push_user_blocks(messages, blocks)?,
        (Role::Assistant, MessageContent::Blocks(blocks)) => {
            push_assistant_blocks(messages, blocks)?
        }
    }
    Ok(())
}

/// Fan a user message's blocks out into OpenAI messages.
///
/// Each tool_result becomes its own `tool` role message; the remaining text
/// and image blocks are collected, in original order, into one user message.
fn push_user_blocks(messages: &mut Vec<OpenAiMessage>, blocks: &[ContentBlock]) -> Result<()> {
    for block in blocks {
        if let ContentBlock::ToolResult {
            tool_use_id,
            content,
        } = block
        {
            let content = match content {
                Value::String(text) => text.clone(),
                other => serde_json::to_string(other)?,
            };
            messages.push(OpenAiMessage {
                role: OpenAiRole::Tool,
                content: OpenAiContent::Text(content),
                tool_calls: None,
                tool_call_id: Some(tool_use_id.clone()),
            });
        }
    }

    let parts: Vec<OpenAiContentPart> = blocks
        .iter()
        .filter_map(|block| match block {
            ContentBlock::Text { text } if !text.is_empty() => Some(OpenAiContentPart::Text {
                text: text.clone(),
            }),
            ContentBlock::Image { source } => {
                let url = if source.source_type == "base64" {
                    source.data.clone().unwrap_or_default()
                } else {
                    source.url.clone().unwrap_or_default()
                };
                Some(OpenAiContentPart::ImageUrl {
                    image_url: OpenAiImageUrl { url },
                    media_type: source.media_type.clone(),
                })
            }
            _ => None,
        })
        .collect();

    if !parts.is_empty() {
        messages.push(OpenAiMessage {
            role: OpenAiRole::User,
            content: OpenAiContent::Parts(parts),
            tool_calls: None,
            tool_call_id: None,
        });
    }

    Ok(())
}

/// Collapse an assistant message's blocks into one OpenAI message.
///
/// Text blocks concatenate (newline-joined) into the content; tool_use
/// blocks become function-call entries on the same message. A message with
/// neither still emits an empty assistant entry.
fn push_assistant_blocks(messages: &mut Vec<OpenAiMessage>, blocks: &[ContentBlock]) -> Result<()> {
    let text = blocks
        .iter()
        .filter_map(|block| match block {
            ContentBlock::Text { text } if !text.is_empty() => Some(text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n");

    let mut tool_calls = Vec::new();
    for block in blocks {
        if let ContentBlock::ToolUse { id, name, input } = block {
            if id.is_empty() {
                continue;
            }
            let arguments = if input.is_null() {
                "{}".to_string()
            } else {
                serde_json::to_string(input)?
            };
            tool_calls.push(OpenAiToolCall {
                id: id.clone(),
                call_type: "function".to_string(),
                function: OpenAiFunctionCall {
                    name: name.clone(),
                    arguments,
                },
            });
        }
    }

    messages.push(OpenAiMessage {
        role: OpenAiRole::Assistant,
        content: OpenAiContent::Text(text),
        tool_calls: if tool_calls.is_empty() {
            None
        } else {
            Some(tool_calls)
        },
        tool_call_id: None,
    });

    Ok(())
}

fn tool_to_openai(tool: &ClaudeTool) -> OpenAiTool {
    OpenAiTool {
        tool_type: "function".to_string(),
        function: OpenAiFunctionDef {
            name: tool.name.clone(),
            description: tool.description.clone().unwrap_or_default(),
            parameters: tool.input_schema.clone(),
        },
    }
}

/// Parse a tool call's argument string.
///
/// Arguments are never dropped: unparseable input falls back to
/// `{"text": <raw>}`.
fn parse_tool_arguments(arguments: &str) -> Value {
    let raw = if arguments.is_empty() { "{}" } else { arguments };
    match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(err) => {
            tracing::warn!("failed to parse tool call arguments: {}", err);
            json!({ "text": arguments })
        }
    }
}

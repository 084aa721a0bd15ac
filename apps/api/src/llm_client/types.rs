//! Application-level request and response shapes shared by both call paths.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::llm_client::error::LlmError;

// ────────────────────────────────────────────────────────────────────────────
// Messages
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn with_blocks(role: Role, blocks: Vec<ContentBlock>) -> Self {
        Self {
            role,
            content: MessageContent::Blocks(blocks),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

/// One unit of multi-modal message content.
///
/// Goes through `serde_json::Value` in both directions so that block shapes we
/// don't model survive untouched in `Other`. Fields beside the ones we read
/// (`cache_control`, `citations`, ...) are carried in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub enum ContentBlock {
    Text {
        text: String,
        extra: Map<String, Value>,
    },
    Image {
        source: Option<ImageSource>,
        extra: Map<String, Value>,
    },
    Other(Value),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ImageSource {
    Base64 {
        media_type: String,
        data: String,
        extra: Map<String, Value>,
    },
    /// A source object whose `type` the provider does not accept.
    Unrecognized(Value),
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text {
            text: text.into(),
            extra: Map::new(),
        }
    }

    pub fn base64_image(media_type: impl Into<String>, data: impl Into<String>) -> Self {
        ContentBlock::Image {
            source: Some(ImageSource::Base64 {
                media_type: media_type.into(),
                data: data.into(),
                extra: Map::new(),
            }),
            extra: Map::new(),
        }
    }
}

/// Object fields other than `known`, or `None` for non-objects.
fn remaining_fields(value: &Value, known: &[&str]) -> Option<Map<String, Value>> {
    let mut fields = value.as_object()?.clone();
    for key in known {
        fields.remove(*key);
    }
    Some(fields)
}

impl From<Value> for ContentBlock {
    fn from(value: Value) -> Self {
        match value.get("type").and_then(Value::as_str) {
            Some("text") => match (
                value.get("text").and_then(Value::as_str),
                remaining_fields(&value, &["type", "text"]),
            ) {
                (Some(text), Some(extra)) => ContentBlock::Text {
                    text: text.to_string(),
                    extra,
                },
                _ => ContentBlock::Other(value),
            },
            Some("image") => match remaining_fields(&value, &["type", "source"]) {
                Some(extra) => ContentBlock::Image {
                    source: value.get("source").map(ImageSource::from_value),
                    extra,
                },
                None => ContentBlock::Other(value),
            },
            _ => ContentBlock::Other(value),
        }
    }
}

impl From<ContentBlock> for Value {
    fn from(block: ContentBlock) -> Self {
        match block {
            ContentBlock::Text { text, mut extra } => {
                extra.insert("type".to_string(), Value::from("text"));
                extra.insert("text".to_string(), Value::from(text));
                Value::Object(extra)
            }
            ContentBlock::Image { source, mut extra } => {
                extra.insert("type".to_string(), Value::from("image"));
                if let Some(source) = source {
                    extra.insert("source".to_string(), source.into_value());
                }
                Value::Object(extra)
            }
            ContentBlock::Other(value) => value,
        }
    }
}

impl ImageSource {
    fn from_value(value: &Value) -> Self {
        let field = |name: &str| value.get(name).and_then(Value::as_str);
        match (
            field("type"),
            field("media_type"),
            field("data"),
            remaining_fields(value, &["type", "media_type", "data"]),
        ) {
            (Some("base64"), Some(media_type), Some(data), Some(extra)) => ImageSource::Base64 {
                media_type: media_type.to_string(),
                data: data.to_string(),
                extra,
            },
            _ => ImageSource::Unrecognized(value.clone()),
        }
    }

    fn into_value(self) -> Value {
        match self {
            ImageSource::Base64 {
                media_type,
                data,
                mut extra,
            } => {
                extra.insert("type".to_string(), Value::from("base64"));
                extra.insert("media_type".to_string(), Value::from(media_type));
                extra.insert("data".to_string(), Value::from(data));
                Value::Object(extra)
            }
            ImageSource::Unrecognized(value) => value,
        }
    }
}

/// Input accepted by every completion entry point: a bare prompt or a full
/// message list.
#[derive(Debug, Clone, PartialEq)]
pub enum Prompt {
    Text(String),
    Messages(Vec<Message>),
}

impl Prompt {
    /// A bare prompt becomes a single user message.
    pub fn into_messages(self) -> Vec<Message> {
        match self {
            Prompt::Text(text) => vec![Message::user(text)],
            Prompt::Messages(messages) => messages,
        }
    }
}

impl From<&str> for Prompt {
    fn from(text: &str) -> Self {
        Prompt::Text(text.to_string())
    }
}

impl From<String> for Prompt {
    fn from(text: String) -> Self {
        Prompt::Text(text)
    }
}

impl From<Vec<Message>> for Prompt {
    fn from(messages: Vec<Message>) -> Self {
        Prompt::Messages(messages)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Options
// ────────────────────────────────────────────────────────────────────────────

/// Per-call tuning. Unset fields are left out of the outbound request so the
/// provider applies its own defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolSpec>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(alias = "inputSchema")]
    pub input_schema: Value,
}

// ────────────────────────────────────────────────────────────────────────────
// Results
// ────────────────────────────────────────────────────────────────────────────

/// The canonical completion shape returned by both paths.
///
/// Serialized camelCase; the snake_case provider spelling is accepted on input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionResult {
    pub id: String,
    #[serde(rename = "type")]
    pub result_type: String,
    pub role: String,
    pub content: Vec<ResultBlock>,
    pub model: String,
    #[serde(default, alias = "stop_reason")]
    pub stop_reason: Option<String>,
    #[serde(default, alias = "stop_sequence")]
    pub stop_sequence: Option<String>,
    pub usage: Usage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultBlock {
    #[serde(rename = "type")]
    pub block_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    #[serde(alias = "input_tokens")]
    pub input_tokens: u32,
    #[serde(alias = "output_tokens")]
    pub output_tokens: u32,
}

impl CompletionResult {
    /// Extracts the text content from the first text block.
    pub fn text(&self) -> Option<&str> {
        self.content
            .iter()
            .find(|b| b.block_type == "text")
            .and_then(|b| b.text.as_deref())
    }

    /// Deserializes the text response as JSON.
    /// The prompt must instruct the model to return valid JSON.
    pub fn parse_json<T: DeserializeOwned>(&self) -> Result<T, LlmError> {
        let text = self.text().ok_or(LlmError::EmptyContent)?;

        // Strip markdown code fences if the model wraps JSON in them
        let text = strip_json_fences(text);

        serde_json::from_str(text).map_err(LlmError::Parse)
    }
}

/// Strips ```json ... ``` or ``` ... ``` code fences from LLM output.
fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    let inner = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"));
    match inner {
        Some(stripped) => stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start()),
        None => text,
    }
}

//! Message normalization — converts application messages into the exact
//! content shape the Messages API accepts.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::llm_client::error::LlmError;
use crate::llm_client::types::{ContentBlock, ImageSource, Message, MessageContent, Role};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderMessage {
    pub role: Role,
    pub content: ProviderContent,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ProviderContent {
    Text(String),
    Blocks(Vec<ProviderBlock>),
}

/// Provider content block. `extra` carries fields such as `cache_control`
/// through untouched.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProviderBlock {
    Text {
        text: String,
        #[serde(flatten)]
        extra: Map<String, Value>,
    },
    Image {
        source: Base64Source,
        #[serde(flatten)]
        extra: Map<String, Value>,
    },
}

impl ProviderBlock {
    fn plain_text(text: String) -> Self {
        ProviderBlock::Text {
            text,
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Base64Source {
    #[serde(rename = "type")]
    pub source_type: &'static str,
    pub media_type: String,
    pub data: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Normalizes a message list, preserving message and block order one-to-one.
pub fn normalize_messages(messages: &[Message]) -> Result<Vec<ProviderMessage>, LlmError> {
    messages.iter().map(normalize_message).collect()
}

fn normalize_message(message: &Message) -> Result<ProviderMessage, LlmError> {
    let content = match &message.content {
        MessageContent::Text(text) => ProviderContent::Text(text.clone()),
        MessageContent::Blocks(blocks) => ProviderContent::Blocks(
            blocks
                .iter()
                .map(normalize_block)
                .collect::<Result<Vec<_>, _>>()?,
        ),
    };

    Ok(ProviderMessage {
        role: message.role,
        content,
    })
}

fn normalize_block(block: &ContentBlock) -> Result<ProviderBlock, LlmError> {
    match block {
        ContentBlock::Text { text, extra } => Ok(ProviderBlock::Text {
            text: text.clone(),
            extra: extra.clone(),
        }),
        ContentBlock::Image {
            source:
                Some(ImageSource::Base64 {
                    media_type,
                    data,
                    extra: source_extra,
                }),
            extra,
        } => Ok(ProviderBlock::Image {
            source: Base64Source {
                source_type: "base64",
                media_type: media_type.clone(),
                data: data.clone(),
                extra: source_extra.clone(),
            },
            extra: extra.clone(),
        }),
        ContentBlock::Image { .. } => Err(LlmError::UnsupportedImageSource),
        // Unknown blocks are flattened to text so nothing is lost.
        ContentBlock::Other(value) => Ok(ProviderBlock::plain_text(value.to_string())),
    }
}

//! Wire types for the Claude messages endpoint.
//!
//! Only the slice of the protocol the coordination runtime uses: text and
//! tool blocks, stop reasons, token counts. The system prompt carries the
//! rendered resume context; tool schemas come from the coordination tool set.

use serde::{Deserialize, Serialize};

/// One messages-endpoint call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRequest {
    pub model: String,

    /// Conversation so far, alternating user/assistant turns
    pub messages: Vec<Message>,

    /// Output token ceiling for this call
    pub max_tokens: u32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Tool schema offered to the model, absent for plain completions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Tool>>,
}

impl Default for MessageRequest {
    fn default() -> Self {
        Self {
            model: "claude-3-5-sonnet-20241022".to_string(),
            messages: Vec::new(),
            max_tokens: 4096,
            system: None,
            temperature: None,
            tools: None,
        }
    }
}

/// One conversation turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// "user" or "assistant"
    pub role: String,

    /// Plain text, or blocks once tools enter the conversation
    #[serde(with = "message_content")]
    pub content: MessageContent,
}

impl Message {
    pub fn user(content: impl Into<MessageContent>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<MessageContent>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Turn content. The endpoint accepts a bare string or a block array in the
/// same position, so both shapes get a variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl From<String> for MessageContent {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for MessageContent {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<Vec<ContentBlock>> for MessageContent {
    fn from(blocks: Vec<ContentBlock>) -> Self {
        Self::Blocks(blocks)
    }
}

/// Keeps the untagged string-or-blocks shape stable on the wire.
mod message_content {
    use super::MessageContent;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(content: &MessageContent, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match content {
            MessageContent::Text(s) => s.serialize(serializer),
            MessageContent::Blocks(blocks) => blocks.serialize(serializer),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<MessageContent, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Helper {
            Text(String),
            Blocks(Vec<super::ContentBlock>),
        }

        match Helper::deserialize(deserializer)? {
            Helper::Text(s) => Ok(MessageContent::Text(s)),
            Helper::Blocks(blocks) => Ok(MessageContent::Blocks(blocks)),
        }
    }
}

/// Typed block inside a turn. Tool results always travel in the user turn
/// that follows the assistant's tool_use blocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },
}

/// One advertised tool: a name the model can call, a description it reads,
/// and the JSON schema its input must satisfy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// Completed assistant turn as returned by the endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub id: String,

    /// Always "assistant"
    pub role: String,

    pub content: Vec<ContentBlock>,

    /// Model that actually served the call
    pub model: String,

    /// Drives the agentic loop's dispatch
    pub stop_reason: StopReason,

    pub usage: Usage,
}

impl MessageResponse {
    /// Text of the last text block in the response, if any.
    pub fn last_text(&self) -> Option<&str> {
        self.content.iter().rev().find_map(|block| match block {
            ContentBlock::Text { text } => Some(text.as_str()),
            _ => None,
        })
    }

    /// All tool_use blocks in response order.
    pub fn tool_uses(&self) -> impl Iterator<Item = (&str, &str, &serde_json::Value)> {
        self.content.iter().filter_map(|block| match block {
            ContentBlock::ToolUse { id, name, input } => {
                Some((id.as_str(), name.as_str(), input))
            }
            _ => None,
        })
    }
}

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Finished naturally
    EndTurn,
    /// Ran into the output ceiling; the text may be cut off
    MaxTokens,
    /// Hit a configured stop sequence
    StopSequence,
    /// Wants tool results before continuing
    ToolUse,
    /// Anything newer than this client; the loop exits defensively on it
    #[serde(other)]
    Other,
}

/// Token counts for one call, accumulated into the agent registry.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_request_serialization() {
        let request = MessageRequest {
            messages: vec![Message::user("Hello")],
            max_tokens: 100,
            temperature: Some(0.7),
            ..Default::default()
        };

        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("claude-3-5-sonnet-20241022"));
        assert!(json.contains("Hello"));
        assert!(json.contains("0.7"));
        // Unset optionals must not appear on the wire
        assert!(!json.contains("tools"));
    }

    #[test]
    fn test_content_block_tool_use_round_trip() {
        let json = r#"{"type":"tool_use","id":"tu_1","name":"checkInbox","input":{"limit":5}}"#;
        let block: ContentBlock = serde_json::from_str(json).unwrap();
        match &block {
            ContentBlock::ToolUse { id, name, input } => {
                assert_eq!(id, "tu_1");
                assert_eq!(name, "checkInbox");
                assert_eq!(input["limit"], 5);
            }
            _ => panic!("expected tool_use"),
        }
        let back = serde_json::to_string(&block).unwrap();
        assert!(back.contains(r#""type":"tool_use""#));
    }

    #[test]
    fn test_stop_reason_unknown_variant() {
        let response: StopReason = serde_json::from_str(r#""pause_turn""#).unwrap();
        assert_eq!(response, StopReason::Other);

        let end: StopReason = serde_json::from_str(r#""end_turn""#).unwrap();
        assert_eq!(end, StopReason::EndTurn);
    }

    #[test]
    fn test_response_helpers() {
        let response = MessageResponse {
            id: "msg_1".to_string(),
            role: "assistant".to_string(),
            content: vec![
                ContentBlock::Text {
                    text: "first".to_string(),
                },
                ContentBlock::ToolUse {
                    id: "tu_1".to_string(),
                    name: "sendMessage".to_string(),
                    input: serde_json::json!({}),
                },
                ContentBlock::Text {
                    text: "last".to_string(),
                },
            ],
            model: "m".to_string(),
            stop_reason: StopReason::ToolUse,
            usage: Usage::default(),
        };

        assert_eq!(response.last_text(), Some("last"));
        let uses: Vec<_> = response.tool_uses().collect();
        assert_eq!(uses.len(), 1);
        assert_eq!(uses[0].1, "sendMessage");
    }
}

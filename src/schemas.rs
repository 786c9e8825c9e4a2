// 聊天消息与接口数据结构，字段与远端 OpenAI 兼容返回保持一致。
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    User,
    Ai,
}

/// 会话内的单条消息，仅存活于内存，不承诺持久化。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub content: String,
    pub sender: Sender,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub is_streaming: bool,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self::build(content.into(), Sender::User, false)
    }

    pub fn ai(content: impl Into<String>) -> Self {
        Self::build(content.into(), Sender::Ai, false)
    }

    pub fn streaming_placeholder() -> Self {
        Self::build(String::new(), Sender::Ai, true)
    }

    fn build(content: String, sender: Sender, is_streaming: bool) -> Self {
        Self {
            id: uuid::Uuid::new_v4().simple().to_string(),
            content,
            sender,
            timestamp: Utc::now(),
            is_streaming,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// 发往远端接口的消息，三个后端共用同一形状。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(ChatRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(ChatRole::Assistant, content)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatChoice {
    #[serde(default)]
    pub index: u32,
    pub message: ChatMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    pub id: String,
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub model: String,
    pub choices: Vec<ChatChoice>,
    #[serde(default)]
    pub usage: Option<TokenUsage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompletionChoice {
    pub text: String,
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompletionResponse {
    pub id: String,
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub model: String,
    pub choices: Vec<CompletionChoice>,
    #[serde(default)]
    pub usage: Option<TokenUsage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub owned_by: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_response_tolerates_missing_optional_fields() {
        let raw = r#"{
            "id": "chatcmpl-1",
            "choices": [
                {"message": {"role": "assistant", "content": "你好"}}
            ]
        }"#;
        let parsed: ChatResponse = serde_json::from_str(raw).expect("parse chat response");
        assert_eq!(parsed.choices.len(), 1);
        assert_eq!(parsed.choices[0].message.content, "你好");
        assert!(parsed.usage.is_none());
    }

    #[test]
    fn chat_role_serializes_lowercase() {
        let message = ChatMessage::user("hi");
        let value = serde_json::to_value(&message).expect("serialize");
        assert_eq!(value["role"], "user");
    }

    #[test]
    fn message_defaults_not_streaming_on_load() {
        let raw = r#"{
            "id": "m1",
            "content": "hello",
            "sender": "ai",
            "timestamp": "2025-06-01T00:00:00Z"
        }"#;
        let parsed: Message = serde_json::from_str(raw).expect("parse message");
        assert!(!parsed.is_streaming);
        assert!(matches!(parsed.sender, Sender::Ai));
    }
}

// 会话状态：消息列表、流式消息生命周期与请求历史窗口。
use crate::schemas::{ChatMessage, ChatRole, Message, Sender};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const WELCOME_MESSAGE_ID: &str = "welcome";

pub const WELCOME_MESSAGE: &str = "你好！我是小包包 🎯\n\n\
我现在支持 **流式响应**，可以实时显示回复内容，让对话更加流畅自然！\n\n\
我可以为你提供：\n\n\
• **智能问答** - 实时回答各种问题\n\
• **合同审核** - 审查合同条款合规性\n\
• **旅游规划** - 规划专属出行路线\n\n\
现在开始对话体验吧！✨";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionTranscript {
    session_id: String,
    updated_at: DateTime<Utc>,
    messages: Vec<Message>,
}

#[derive(Debug, Clone)]
pub struct ChatSession {
    session_id: String,
    history_window: usize,
    messages: Vec<Message>,
}

impl ChatSession {
    pub fn new(session_id: impl Into<String>, history_window: usize) -> Self {
        let mut session = Self {
            session_id: session_id.into(),
            history_window,
            messages: Vec::new(),
        };
        session.push_welcome();
        session
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn push_user(&mut self, content: impl Into<String>) -> String {
        let message = Message::user(content);
        let id = message.id.clone();
        self.messages.push(message);
        id
    }

    /// 错误以 AI 消息的形式进入会话，保持界面统一。
    pub fn push_error(&mut self, text: impl Into<String>) -> String {
        let message = Message::ai(text);
        let id = message.id.clone();
        self.messages.push(message);
        id
    }

    /// 开始一条流式回复。同一时刻至多存在一条流式消息。
    pub fn begin_assistant(&mut self) -> String {
        self.finish_all_streaming();
        let message = Message::streaming_placeholder();
        let id = message.id.clone();
        self.messages.push(message);
        id
    }

    pub fn append_delta(&mut self, id: &str, chunk: &str) -> bool {
        match self.messages.iter_mut().find(|message| message.id == id) {
            Some(message) => {
                message.content.push_str(chunk);
                true
            }
            None => false,
        }
    }

    pub fn set_content(&mut self, id: &str, content: &str) {
        if let Some(message) = self.messages.iter_mut().find(|message| message.id == id) {
            message.content = content.to_string();
        }
    }

    pub fn finish(&mut self, id: &str) {
        if let Some(message) = self.messages.iter_mut().find(|message| message.id == id) {
            message.is_streaming = false;
        }
    }

    /// 停止按钮语义：所有流式消息保留内容并摘掉流式标记。
    pub fn finish_all_streaming(&mut self) {
        for message in &mut self.messages {
            message.is_streaming = false;
        }
    }

    pub fn streaming_id(&self) -> Option<&str> {
        self.messages
            .iter()
            .find(|message| message.is_streaming)
            .map(|message| message.id.as_str())
    }

    /// 清空会话，重新放入欢迎语，会话 ID 不变。
    pub fn clear(&mut self) {
        self.messages.clear();
        self.push_welcome();
    }

    /// 构造本轮请求：最近 N 条非欢迎历史映射成角色消息，再附上本轮输入。
    pub fn api_history(&self, pending: &str) -> Vec<ChatMessage> {
        let mut api_messages: Vec<ChatMessage> = self
            .messages
            .iter()
            .filter(|message| message.id != WELCOME_MESSAGE_ID)
            .filter(|message| !message.content.is_empty())
            .rev()
            .take(self.history_window)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .map(|message| {
                let role = match message.sender {
                    Sender::User => ChatRole::User,
                    Sender::Ai => ChatRole::Assistant,
                };
                ChatMessage::new(role, message.content.clone())
            })
            .collect();
        api_messages.push(ChatMessage::user(pending));
        api_messages
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let transcript = SessionTranscript {
            session_id: self.session_id.clone(),
            updated_at: Utc::now(),
            messages: self.messages.clone(),
        };
        let text = serde_json::to_string_pretty(&transcript)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, text).with_context(|| format!("写入会话文件失败: {}", path.display()))?;
        Ok(())
    }

    /// 缺失或损坏的会话文件都按“无历史”处理。
    pub fn load(path: &Path, history_window: usize) -> Option<Self> {
        let text = fs::read_to_string(path).ok()?;
        let transcript: SessionTranscript = serde_json::from_str(&text).ok()?;
        let mut session = Self {
            session_id: transcript.session_id,
            history_window,
            messages: transcript.messages,
        };
        session.finish_all_streaming();
        Some(session)
    }

    fn push_welcome(&mut self) {
        let mut welcome = Message::ai(WELCOME_MESSAGE);
        welcome.id = WELCOME_MESSAGE_ID.to_string();
        self.messages.push(welcome);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> ChatSession {
        ChatSession::new("s1", 4)
    }

    #[test]
    fn new_session_starts_with_welcome() {
        let session = session();
        assert_eq!(session.messages().len(), 1);
        assert_eq!(session.messages()[0].id, WELCOME_MESSAGE_ID);
    }

    #[test]
    fn at_most_one_streaming_message() {
        let mut session = session();
        session.push_user("第一问");
        let first = session.begin_assistant();
        session.append_delta(&first, "部分");
        let second = session.begin_assistant();
        let streaming: Vec<_> = session
            .messages()
            .iter()
            .filter(|message| message.is_streaming)
            .collect();
        assert_eq!(streaming.len(), 1);
        assert_eq!(streaming[0].id, second);
        assert_ne!(first, second);
    }

    #[test]
    fn abort_keeps_partial_content() {
        let mut session = session();
        session.push_user("问题");
        let id = session.begin_assistant();
        session.append_delta(&id, "已生成的一半");
        session.finish_all_streaming();
        let message = session
            .messages()
            .iter()
            .find(|message| message.id == id)
            .expect("message kept");
        assert!(!message.is_streaming);
        assert_eq!(message.content, "已生成的一半");
    }

    #[test]
    fn api_history_excludes_welcome_and_windows() {
        let mut session = session();
        for round in 0..5 {
            session.push_user(format!("问{round}"));
            let id = session.begin_assistant();
            session.append_delta(&id, &format!("答{round}"));
            session.finish(&id);
        }
        let api = session.api_history("新问题");
        // 窗口 4 条历史 + 本轮输入。
        assert_eq!(api.len(), 5);
        assert_eq!(api[0].content, "问3");
        assert_eq!(api.last().expect("pending").content, "新问题");
        assert!(api.iter().all(|message| message.content != WELCOME_MESSAGE));
    }

    #[test]
    fn api_history_skips_empty_streaming_placeholder() {
        let mut session = session();
        session.push_user("问");
        session.begin_assistant();
        let api = session.api_history("下一问");
        assert_eq!(api.len(), 2);
        assert_eq!(api[0].content, "问");
    }

    #[test]
    fn transcript_roundtrips_through_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("sessions/s1.json");
        let mut session = session();
        session.push_user("保存我");
        let id = session.begin_assistant();
        session.append_delta(&id, "回答");
        session.save(&path).expect("save transcript");

        let loaded = ChatSession::load(&path, 4).expect("load transcript");
        assert_eq!(loaded.session_id(), "s1");
        assert_eq!(loaded.messages().len(), 3);
        // 加载时清掉遗留的流式标记。
        assert!(loaded.streaming_id().is_none());
    }

    #[test]
    fn load_missing_file_returns_none() {
        assert!(ChatSession::load(Path::new("/nonexistent/transcript.json"), 4).is_none());
    }
}

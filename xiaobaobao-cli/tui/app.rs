use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::args::{ChatModeArg, GlobalArgs};
use crate::locale;
use crate::runtime::CliRuntime;
use crate::slash_command::{self, SlashCommand};
use xiaobaobao::config::APP_NAME;
use xiaobaobao::schemas::{Sender, TokenUsage};
use xiaobaobao::session::ChatSession;
use xiaobaobao::travel::TravelQuery;

const MAX_LOG_ENTRIES: usize = 1200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogKind {
    Info,
    User,
    Assistant,
    Error,
}

pub fn log_prefix(kind: LogKind) -> &'static str {
    match kind {
        LogKind::Info => "· ",
        LogKind::User => "你 > ",
        LogKind::Assistant => "包 > ",
        LogKind::Error => "!! ",
    }
}

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub kind: LogKind,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatMode {
    Chat,
    Contract,
    Travel,
}

impl ChatMode {
    fn as_str(self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Contract => "contract",
            Self::Travel => "travel",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "chat" => Some(Self::Chat),
            "contract" => Some(Self::Contract),
            "travel" => Some(Self::Travel),
            _ => None,
        }
    }
}

enum StreamMessage {
    Delta(String),
    Final {
        content: String,
        usage: Option<TokenUsage>,
        aborted: bool,
    },
    Info(String),
    Error(String),
    Done,
}

pub struct TuiApp {
    runtime: CliRuntime,
    language: String,
    session: ChatSession,
    mode: ChatMode,
    input: String,
    logs: Vec<LogEntry>,
    busy: bool,
    should_quit: bool,
    history: Vec<String>,
    history_cursor: Option<usize>,
    history_draft: String,
    active_assistant: Option<usize>,
    active_message_id: Option<String>,
    stream_rx: Option<UnboundedReceiver<StreamMessage>>,
    cancel: Option<CancellationToken>,
    last_usage: Option<String>,
    scroll_from_bottom: u16,
}

impl TuiApp {
    pub fn new(runtime: CliRuntime, global: &GlobalArgs) -> Result<Self> {
        let language = locale::resolve_cli_language(global);
        let session_id = runtime.resolve_session(global.session.as_deref());
        runtime.save_session(&session_id).ok();

        let history_window = runtime.config.session.history_window;
        let session = ChatSession::load(&runtime.transcript_file(&session_id), history_window)
            .unwrap_or_else(|| ChatSession::new(session_id, history_window));

        let mode = match global.mode {
            Some(ChatModeArg::Contract) => ChatMode::Contract,
            Some(ChatModeArg::Travel) => ChatMode::Travel,
            _ => ChatMode::Chat,
        };

        let mut app = Self {
            runtime,
            language,
            session,
            mode,
            input: String::new(),
            logs: Vec::new(),
            busy: false,
            should_quit: false,
            history: Vec::new(),
            history_cursor: None,
            history_draft: String::new(),
            active_assistant: None,
            active_message_id: None,
            stream_rx: None,
            cancel: None,
            last_usage: None,
            scroll_from_bottom: 0,
        };
        app.rebuild_logs_from_session();
        app.push_log(
            LogKind::Info,
            locale::tr(
                &app.language,
                "小包包 TUI 模式，输入 /help 查看命令。",
                "xiaobaobao tui mode. type /help for commands.",
            ),
        );
        Ok(app)
    }

    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    pub fn is_zh_language(&self) -> bool {
        locale::is_zh_language(&self.language)
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn logs(&self) -> &[LogEntry] {
        &self.logs
    }

    pub fn scroll_from_bottom(&self) -> u16 {
        self.scroll_from_bottom
    }

    pub fn status_line(&self) -> String {
        let busy = if self.busy { "working" } else { "idle" };
        let usage = self
            .last_usage
            .as_deref()
            .map(|value| format!(" usage:{value}"))
            .unwrap_or_default();
        format!(
            "{APP_NAME}  session:{}  mode:{}  model:{}  state:{busy}{usage}  (Ctrl+C exit)",
            short_session_id(self.session.session_id()),
            self.mode.as_str(),
            self.runtime.config.chat.model,
        )
    }

    pub fn popup_lines(&self) -> Vec<String> {
        let trimmed = self.input.trim_start();
        if !trimmed.starts_with('/') {
            return Vec::new();
        }
        let body = trimmed.trim_start_matches('/');
        if body.contains(char::is_whitespace) {
            return Vec::new();
        }
        slash_command::popup_lines(body, 7)
    }

    pub fn drain_stream_events(&mut self) {
        loop {
            let Some(receiver) = self.stream_rx.as_mut() else {
                break;
            };
            match receiver.try_recv() {
                Ok(message) => self.handle_stream_message(message),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.stream_rx = None;
                    self.finish_turn();
                    break;
                }
            }
        }
    }

    pub fn on_key(&mut self, key: KeyEvent) -> Result<()> {
        if key.modifiers.contains(KeyModifiers::CONTROL) {
            match key.code {
                KeyCode::Char('c') | KeyCode::Char('d') => {
                    self.should_quit = true;
                    return Ok(());
                }
                _ => {}
            }
        }

        match key.code {
            KeyCode::Esc => {
                if self.busy {
                    self.abort_stream();
                } else {
                    self.input.clear();
                    self.history_cursor = None;
                }
            }
            KeyCode::Enter => {
                let raw_line = std::mem::take(&mut self.input);
                self.history_cursor = None;
                let line = raw_line.trim().to_string();
                if !line.is_empty() {
                    self.submit_line(line)?;
                }
            }
            KeyCode::Backspace => {
                self.input.pop();
            }
            KeyCode::Tab => {
                self.apply_first_suggestion();
            }
            KeyCode::Up => self.history_up(),
            KeyCode::Down => self.history_down(),
            KeyCode::PageUp => {
                self.scroll_from_bottom = self.scroll_from_bottom.saturating_add(5);
            }
            KeyCode::PageDown => {
                self.scroll_from_bottom = self.scroll_from_bottom.saturating_sub(5);
            }
            KeyCode::Char(ch) => {
                if !key.modifiers.contains(KeyModifiers::CONTROL) {
                    self.input.push(ch);
                }
            }
            _ => {}
        }
        Ok(())
    }

    pub fn submit_line(&mut self, line: String) -> Result<()> {
        let cleaned = line.trim().to_string();
        if cleaned.is_empty() {
            return Ok(());
        }
        self.push_history(&cleaned);

        if cleaned.starts_with('/') {
            return self.handle_slash_command(&cleaned);
        }

        if self.busy {
            self.push_log(
                LogKind::Error,
                locale::tr(
                    &self.language,
                    "回复仍在生成中，请先等待完成或按 Esc 停止。",
                    "assistant is still running, wait or press Esc to stop.",
                ),
            );
            return Ok(());
        }

        self.last_usage = None;
        self.push_log(LogKind::User, cleaned.clone());

        // 历史窗口在加入本轮输入之前截取。
        let api_messages = self.session.api_history(&cleaned);
        self.session.push_user(cleaned.clone());
        let message_id = self.session.begin_assistant();
        self.logs.push(LogEntry {
            kind: LogKind::Assistant,
            text: String::new(),
        });
        self.active_assistant = Some(self.logs.len() - 1);
        self.active_message_id = Some(message_id);
        self.busy = true;
        self.scroll_from_bottom = 0;

        let (tx, rx) = mpsc::unbounded_channel::<StreamMessage>();
        self.stream_rx = Some(rx);

        match self.mode {
            ChatMode::Chat => self.spawn_chat_turn(api_messages, tx),
            ChatMode::Contract => self.spawn_contract_turn(cleaned, tx),
            ChatMode::Travel => self.spawn_travel_turn(cleaned, tx),
        }
        Ok(())
    }

    fn spawn_chat_turn(
        &mut self,
        messages: Vec<xiaobaobao::schemas::ChatMessage>,
        tx: UnboundedSender<StreamMessage>,
    ) {
        let client = self.runtime.streaming_client();
        let cancel = CancellationToken::new();
        self.cancel = Some(cancel.clone());
        tokio::spawn(async move {
            let delta_tx = tx.clone();
            let result = client
                .stream_chat(&messages, &cancel, |delta| {
                    let _ = delta_tx.send(StreamMessage::Delta(delta.to_string()));
                })
                .await;
            match result {
                Ok(reply) => {
                    let _ = tx.send(StreamMessage::Final {
                        content: reply.content,
                        usage: reply.usage,
                        aborted: reply.aborted,
                    });
                }
                Err(err) => {
                    let _ = tx.send(StreamMessage::Error(err.to_string()));
                }
            }
            let _ = tx.send(StreamMessage::Done);
        });
    }

    fn spawn_contract_turn(&mut self, contract: String, tx: UnboundedSender<StreamMessage>) {
        let client = self.runtime.contract_client();
        self.cancel = None;
        tokio::spawn(async move {
            let delta_tx = tx.clone();
            let result = client
                .review_stream(&contract, None, |chunk| {
                    let _ = delta_tx.send(StreamMessage::Delta(chunk.to_string()));
                })
                .await;
            match result {
                Ok(full) => {
                    let _ = tx.send(StreamMessage::Final {
                        content: full,
                        usage: None,
                        aborted: false,
                    });
                }
                Err(err) => {
                    let _ = tx.send(StreamMessage::Error(err.to_string()));
                }
            }
            let _ = tx.send(StreamMessage::Done);
        });
    }

    fn spawn_travel_turn(&mut self, question: String, tx: UnboundedSender<StreamMessage>) {
        let planner = self.runtime.travel_planner();
        self.cancel = None;
        tokio::spawn(async move {
            match planner.smart_planning(TravelQuery::Text(question)).await {
                Ok(response) => {
                    let _ = tx.send(StreamMessage::Final {
                        content: response.content,
                        usage: None,
                        aborted: false,
                    });
                }
                Err(err) => {
                    let _ = tx.send(StreamMessage::Error(err.to_string()));
                }
            }
            let _ = tx.send(StreamMessage::Done);
        });
    }

    fn handle_slash_command(&mut self, line: &str) -> Result<()> {
        let Some(parsed) = slash_command::parse(line) else {
            self.push_log(
                LogKind::Error,
                locale::tr(
                    &self.language,
                    format!("未知命令: {line}，输入 /help 查看全部命令。"),
                    format!("unknown command: {line}, type /help for the list."),
                ),
            );
            return Ok(());
        };
        match parsed.command {
            SlashCommand::Mode => {
                if parsed.args.is_empty() {
                    let text = format!("mode: {}", self.mode.as_str());
                    self.push_log(LogKind::Info, text);
                } else if let Some(mode) = ChatMode::parse(parsed.args) {
                    self.mode = mode;
                    let text = format!("mode -> {}", mode.as_str());
                    self.push_log(LogKind::Info, text);
                } else {
                    self.push_log(
                        LogKind::Error,
                        "usage: /mode [chat|contract|travel]".to_string(),
                    );
                }
            }
            SlashCommand::Model => {
                if parsed.args.is_empty() {
                    let text = format!("model: {}", self.runtime.config.chat.model);
                    self.push_log(LogKind::Info, text);
                } else {
                    self.runtime.config.chat.model = parsed.args.to_string();
                    let text = format!("model -> {}", self.runtime.config.chat.model);
                    self.push_log(LogKind::Info, text);
                }
            }
            SlashCommand::Connect => self.spawn_connectivity_check(),
            SlashCommand::Clear => {
                self.session.clear();
                self.rebuild_logs_from_session();
                self.push_log(
                    LogKind::Info,
                    locale::tr(&self.language, "会话已清空。", "conversation cleared."),
                );
            }
            SlashCommand::Save => match self.save_transcript() {
                Ok(path) => {
                    let text = locale::tr(
                        &self.language,
                        format!("会话已保存: {path}"),
                        format!("transcript saved: {path}"),
                    );
                    self.push_log(LogKind::Info, text);
                }
                Err(err) => self.push_log(LogKind::Error, err.to_string()),
            },
            SlashCommand::Help => {
                for line in slash_command::help_lines() {
                    self.push_log(LogKind::Info, line);
                }
            }
            SlashCommand::Exit | SlashCommand::Quit => {
                self.should_quit = true;
            }
        }
        Ok(())
    }

    fn spawn_connectivity_check(&mut self) {
        if self.busy {
            return;
        }
        let (tx, rx) = mpsc::unbounded_channel::<StreamMessage>();
        self.stream_rx = Some(rx);
        self.busy = true;
        let graphql = self.runtime.graphql_client();
        let streaming = self.runtime.streaming_client();
        let travel = self.runtime.travel_planner();
        tokio::spawn(async move {
            let graphql_line = match graphql.hello().await {
                Ok(_) => "✅ GraphQL 接口连接正常".to_string(),
                Err(err) => format!("❌ GraphQL 接口连接失败: {err}"),
            };
            let _ = tx.send(StreamMessage::Info(graphql_line));
            let stream_line = if streaming.check_streaming_support().await {
                "✅ 流式接口可用".to_string()
            } else {
                "❌ 流式接口不可用，将使用备用模式".to_string()
            };
            let _ = tx.send(StreamMessage::Info(stream_line));
            let mastra_line = if travel.check_health().await {
                "✅ Mastra 服务健康".to_string()
            } else {
                "❌ 无法连接到 Mastra 服务".to_string()
            };
            let _ = tx.send(StreamMessage::Info(mastra_line));
            let _ = tx.send(StreamMessage::Done);
        });
    }

    fn handle_stream_message(&mut self, message: StreamMessage) {
        match message {
            StreamMessage::Delta(text) => {
                if let Some(id) = self.active_message_id.clone() {
                    self.session.append_delta(&id, &text);
                }
                if let Some(index) = self.active_assistant {
                    if let Some(entry) = self.logs.get_mut(index) {
                        entry.text.push_str(&text);
                    }
                }
                self.scroll_from_bottom = 0;
            }
            StreamMessage::Final {
                content,
                usage,
                aborted,
            } => {
                if let Some(id) = self.active_message_id.clone() {
                    // 非流式路径一次性补全内容。
                    if let Some(index) = self.active_assistant {
                        if let Some(entry) = self.logs.get_mut(index) {
                            if entry.text.is_empty() && !content.is_empty() {
                                entry.text = content.clone();
                                self.session.set_content(&id, &content);
                            }
                        }
                    }
                    self.session.finish(&id);
                }
                if let Some(usage) = usage {
                    self.last_usage = Some(format!(
                        "{}+{}={}",
                        usage.prompt_tokens, usage.completion_tokens, usage.total_tokens
                    ));
                }
                if aborted {
                    self.push_log(
                        LogKind::Info,
                        locale::tr(&self.language, "已停止生成。", "generation stopped."),
                    );
                }
                self.scroll_from_bottom = 0;
            }
            StreamMessage::Info(text) => self.push_log(LogKind::Info, text),
            StreamMessage::Error(text) => {
                // 错误同时进入会话与界面，保持“错误也是消息”的行为。
                self.session.finish_all_streaming();
                self.session.push_error(text.clone());
                self.push_log(LogKind::Error, text);
            }
            StreamMessage::Done => {
                self.stream_rx = None;
                self.finish_turn();
            }
        }
    }

    fn finish_turn(&mut self) {
        self.busy = false;
        self.cancel = None;
        self.active_assistant = None;
        self.active_message_id = None;
        self.session.finish_all_streaming();
        if let Err(err) = self.save_transcript() {
            warn!("保存会话失败: {err}");
        }
    }

    fn abort_stream(&mut self) {
        if let Some(cancel) = self.cancel.as_ref() {
            cancel.cancel();
        } else {
            // 没有取消令牌的模式（合同、旅游）只能丢弃结果。
            self.stream_rx = None;
            self.finish_turn();
            self.push_log(
                LogKind::Info,
                locale::tr(&self.language, "已停止生成。", "generation stopped."),
            );
        }
        self.session.finish_all_streaming();
    }

    fn save_transcript(&self) -> Result<String> {
        let path = self.runtime.transcript_file(self.session.session_id());
        self.session.save(&path)?;
        Ok(path.display().to_string())
    }

    fn rebuild_logs_from_session(&mut self) {
        self.logs.clear();
        let entries: Vec<LogEntry> = self
            .session
            .messages()
            .iter()
            .map(|message| LogEntry {
                kind: match message.sender {
                    Sender::User => LogKind::User,
                    Sender::Ai => LogKind::Assistant,
                },
                text: message.content.clone(),
            })
            .collect();
        self.logs.extend(entries);
    }

    fn apply_first_suggestion(&mut self) {
        let trimmed = self.input.trim_start();
        if !trimmed.starts_with('/') {
            return;
        }
        let body = trimmed.trim_start_matches('/');
        if body.contains(char::is_whitespace) {
            return;
        }
        if let Some(suggestion) = slash_command::first_command_completion(body) {
            self.input = format!("/{suggestion} ");
        }
    }

    fn history_up(&mut self) {
        if self.history.is_empty() {
            return;
        }
        match self.history_cursor {
            None => {
                self.history_draft = self.input.clone();
                self.history_cursor = Some(self.history.len() - 1);
            }
            Some(cursor) => self.history_cursor = Some(cursor.saturating_sub(1)),
        }
        if let Some(cursor) = self.history_cursor {
            self.input = self.history.get(cursor).cloned().unwrap_or_default();
        }
    }

    fn history_down(&mut self) {
        let Some(cursor) = self.history_cursor else {
            return;
        };
        if cursor + 1 >= self.history.len() {
            self.history_cursor = None;
            self.input = std::mem::take(&mut self.history_draft);
        } else {
            self.history_cursor = Some(cursor + 1);
            self.input = self.history.get(cursor + 1).cloned().unwrap_or_default();
        }
    }

    fn push_history(&mut self, line: &str) {
        if self.history.last().map(String::as_str) != Some(line) {
            self.history.push(line.to_string());
        }
    }

    fn push_log(&mut self, kind: LogKind, text: impl Into<String>) {
        self.logs.push(LogEntry {
            kind,
            text: text.into(),
        });
        // 截断会移动条目下标，流式回复进行中时跳过。
        if self.logs.len() > MAX_LOG_ENTRIES && self.active_assistant.is_none() {
            let excess = self.logs.len() - MAX_LOG_ENTRIES;
            self.logs.drain(..excess);
        }
    }
}

fn short_session_id(session_id: &str) -> String {
    session_id.chars().take(8).collect()
}

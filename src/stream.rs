// 流式聊天客户端：消费 OpenAI 兼容接口的 SSE 增量输出。
use crate::config::ChatApiConfig;
use crate::schemas::{ChatMessage, TokenUsage};
use anyhow::{anyhow, Result};
use futures::StreamExt;
use reqwest::Client;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// 单轮回复的最终结果；流式与非流式路径共用。
#[derive(Debug, Clone, Default)]
pub struct ChatReply {
    pub content: String,
    pub usage: Option<TokenUsage>,
    /// 流被用户中止时为 true，content 保留已接收部分。
    pub aborted: bool,
}

#[derive(Clone)]
pub struct StreamingChatClient {
    http: Client,
    config: ChatApiConfig,
}

impl StreamingChatClient {
    pub fn new(http: Client, config: ChatApiConfig) -> Self {
        Self { http, config }
    }

    /// 流式请求：每个增量通过 `on_delta` 回调，取消令牌在块间生效。
    pub async fn stream_chat<F>(
        &self,
        messages: &[ChatMessage],
        cancel: &CancellationToken,
        mut on_delta: F,
    ) -> Result<ChatReply>
    where
        F: FnMut(&str),
    {
        let response = self
            .http
            .post(&self.config.stream_endpoint)
            .headers(self.headers())
            .json(&self.payload(messages, true))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("流式请求失败: {status} {text}"));
        }

        let mut stream = response.bytes_stream();
        let mut parser = SseParser::default();
        let mut reply = ChatReply::default();
        loop {
            let item = tokio::select! {
                _ = cancel.cancelled() => {
                    // 中止不是错误，保留已接收的部分内容。
                    reply.aborted = true;
                    return Ok(reply);
                }
                item = stream.next() => match item {
                    Some(item) => item,
                    None => return Ok(reply),
                },
            };
            for event in parser.push(&item?) {
                match event {
                    SseEvent::Delta(text) => {
                        reply.content.push_str(&text);
                        on_delta(&text);
                    }
                    SseEvent::Usage(usage) => reply.usage = Some(usage),
                    SseEvent::Done => return Ok(reply),
                }
            }
        }
    }

    /// 非流式兜底请求，用于不支持流式输出的场合。
    pub async fn complete(&self, messages: &[ChatMessage]) -> Result<ChatReply> {
        let response = self
            .http
            .post(&self.config.stream_endpoint)
            .headers(self.headers())
            .json(&self.payload(messages, false))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("聊天请求失败: {status} {text}"));
        }
        let body: Value = response.json().await?;
        let content = body
            .get("choices")
            .and_then(|value| value.get(0))
            .and_then(|value| value.get("message"))
            .and_then(|value| value.get("content"))
            .and_then(Value::as_str)
            .map(ToString::to_string)
            .ok_or_else(|| anyhow!("响应格式错误"))?;
        Ok(ChatReply {
            content,
            usage: parse_usage(body.get("usage")),
            aborted: false,
        })
    }

    /// 探测端点是否可用：GET 同源 /v1/models，任何传输错误都按不可用处理。
    pub async fn check_streaming_support(&self) -> bool {
        let probe = self
            .config
            .stream_endpoint
            .replace("/v1/chat/completions", "/v1/models");
        match self.http.get(&probe).send().await {
            Ok(response) => response.status().is_success(),
            Err(err) => {
                debug!("流式端点探测失败: {err}");
                false
            }
        }
    }

    fn headers(&self) -> reqwest::header::HeaderMap {
        let mut headers = reqwest::header::HeaderMap::new();
        if let Some(api_key) = self.config.api_key.as_deref() {
            if !api_key.trim().is_empty() {
                if let Ok(value) = format!("Bearer {api_key}").parse() {
                    headers.insert(reqwest::header::AUTHORIZATION, value);
                }
            }
        }
        headers
    }

    fn payload(&self, messages: &[ChatMessage], stream: bool) -> Value {
        json!({
            "model": self.config.model,
            "messages": messages,
            "stream": stream,
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
            "top_p": self.config.top_p,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SseEvent {
    Delta(String),
    Usage(TokenUsage),
    Done,
}

/// 按行重组 SSE 数据。块边界可能落在行中甚至多字节字符中间，
/// 因此缓冲区按字节维护，只在完整行上做 UTF-8 解码。
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
}

impl SseParser {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|byte| *byte == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            events.extend(parse_sse_line(line.trim()));
        }
        events
    }
}

/// 单行最多产出两个事件：usage 与增量可能出现在同一个负载里。
fn parse_sse_line(line: &str) -> Vec<SseEvent> {
    if line.is_empty() || !line.starts_with("data:") {
        return Vec::new();
    }
    let data = line.trim_start_matches("data:").trim();
    if data == "[DONE]" {
        return vec![SseEvent::Done];
    }
    let payload = match serde_json::from_str::<Value>(data) {
        Ok(payload) => payload,
        Err(err) => {
            // 无法解析的行直接丢弃，不中断整个流。
            debug!("丢弃无法解析的 SSE 行: {err}");
            return Vec::new();
        }
    };
    let mut events = Vec::new();
    if let Some(usage) = parse_usage(payload.get("usage")) {
        events.push(SseEvent::Usage(usage));
    }
    let delta = payload
        .get("choices")
        .and_then(|value| value.get(0))
        .and_then(|value| value.get("delta"))
        .and_then(|value| value.get("content"))
        .and_then(Value::as_str)
        .unwrap_or("");
    if !delta.is_empty() {
        events.push(SseEvent::Delta(delta.to_string()));
    }
    events
}

fn parse_usage(raw: Option<&Value>) -> Option<TokenUsage> {
    let usage: TokenUsage = serde_json::from_value(raw?.clone()).ok()?;
    if usage.prompt_tokens == 0 && usage.completion_tokens == 0 && usage.total_tokens == 0 {
        return None;
    }
    Some(usage)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deltas(events: &[SseEvent]) -> String {
        events
            .iter()
            .filter_map(|event| match event {
                SseEvent::Delta(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn parses_single_complete_line() {
        let mut parser = SseParser::default();
        let events = parser.push(
            b"data: {\"choices\":[{\"delta\":{\"content\":\"hello\"}}]}\n",
        );
        assert_eq!(events, vec![SseEvent::Delta("hello".to_string())]);
    }

    #[test]
    fn reassembles_line_split_across_chunks() {
        let mut parser = SseParser::default();
        let first = parser.push(b"data: {\"choices\":[{\"delta\":{\"con");
        assert!(first.is_empty());
        let second = parser.push(b"tent\":\"ab\"}}]}\ndata: [DONE]\n");
        assert_eq!(
            second,
            vec![SseEvent::Delta("ab".to_string()), SseEvent::Done]
        );
    }

    #[test]
    fn survives_chunk_boundary_inside_multibyte_char() {
        let full = "data: {\"choices\":[{\"delta\":{\"content\":\"你好\"}}]}\n".as_bytes();
        // 在 “你” 的三个字节中间切开。
        let cut = full.len() - 11;
        let mut parser = SseParser::default();
        let mut events = parser.push(&full[..cut]);
        events.extend(parser.push(&full[cut..]));
        assert_eq!(deltas(&events), "你好");
    }

    #[test]
    fn skips_blank_comment_and_malformed_lines() {
        let mut parser = SseParser::default();
        let events = parser.push(
            b"\n: keep-alive\ndata: {broken\ndata: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\n",
        );
        assert_eq!(events, vec![SseEvent::Delta("ok".to_string())]);
    }

    #[test]
    fn done_marker_terminates_stream() {
        assert_eq!(parse_sse_line("data: [DONE]"), vec![SseEvent::Done]);
    }

    #[test]
    fn usage_payload_is_extracted() {
        let line = "data: {\"choices\":[],\"usage\":{\"prompt_tokens\":12,\"completion_tokens\":34,\"total_tokens\":46}}";
        match parse_sse_line(line).as_slice() {
            [SseEvent::Usage(usage)] => {
                assert_eq!(usage.prompt_tokens, 12);
                assert_eq!(usage.total_tokens, 46);
            }
            other => panic!("unexpected events: {other:?}"),
        }
    }

    #[test]
    fn usage_and_delta_in_one_payload_both_surface() {
        let line = "data: {\"choices\":[{\"delta\":{\"content\":\"尾\"}}],\"usage\":{\"total_tokens\":9}}";
        let events = parse_sse_line(line);
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], SseEvent::Usage(_)));
        assert_eq!(events[1], SseEvent::Delta("尾".to_string()));
    }

    #[test]
    fn empty_delta_emits_nothing() {
        assert!(parse_sse_line("data: {\"choices\":[{\"delta\":{}}]}").is_empty());
    }
}

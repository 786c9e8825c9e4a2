// Mastra 代理运行时客户端：带重试退避的 REST 封装。
use crate::config::MastraConfig;
use crate::schemas::ChatMessage;
use anyhow::{anyhow, Result};
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

pub const CONTRACT_AGENT_ID: &str = "contractAuditAgent";

/// 运行时目前公开的代理清单。
pub const KNOWN_AGENTS: [&str; 2] = [CONTRACT_AGENT_ID, "weatherAgent"];

#[derive(Clone)]
pub struct MastraClient {
    http: Client,
    config: MastraConfig,
}

impl MastraClient {
    pub fn new(http: Client, config: MastraConfig) -> Self {
        Self { http, config }
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    pub fn agent(&self, agent_id: impl Into<String>) -> MastraAgent {
        MastraAgent {
            client: self.clone(),
            agent_id: agent_id.into(),
        }
    }

    pub async fn run_tool(&self, tool_id: &str, input: Value) -> Result<Value> {
        self.post_json(
            "/api/tools/run",
            json!({ "toolId": tool_id, "input": input }),
        )
        .await
    }

    pub async fn run_agent(&self, agent_id: &str, messages: &[ChatMessage]) -> Result<Value> {
        self.post_json(
            "/api/agents/run",
            json!({ "agentId": agent_id, "messages": messages }),
        )
        .await
    }

    pub async fn run_workflow(&self, workflow_id: &str, input: Value) -> Result<Value> {
        self.post_json(
            "/api/workflows/run",
            json!({ "workflowId": workflow_id, "input": input }),
        )
        .await
    }

    pub async fn health(&self) -> bool {
        let url = format!("{}/api/health", self.config.base_url.trim_end_matches('/'));
        match self.http.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(err) => {
                debug!("Mastra 健康检查失败: {err}");
                false
            }
        }
    }

    pub async fn get_json(&self, path: &str) -> Result<Value> {
        let url = format!("{}{path}", self.config.base_url.trim_end_matches('/'));
        let response = self.http.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("代理接口调用失败: {status} {path}"));
        }
        Ok(response.json().await?)
    }

    /// POST 请求；连接类错误与 5xx 按配置重试，退避指数增长并封顶。
    pub async fn post_json(&self, path: &str, payload: Value) -> Result<Value> {
        let url = format!("{}{path}", self.config.base_url.trim_end_matches('/'));
        let mut backoff = Duration::from_millis(self.config.backoff_ms.max(1));
        let max_backoff = Duration::from_millis(self.config.max_backoff_ms.max(1));
        let mut attempt = 0u32;
        loop {
            let result = self
                .http
                .post(&url)
                .headers(self.headers())
                .json(&payload)
                .send()
                .await;
            let retryable = match &result {
                Ok(response) => response.status().is_server_error(),
                Err(err) => err.is_connect() || err.is_timeout(),
            };
            if retryable && attempt < self.config.retries {
                attempt += 1;
                warn!("Mastra 请求失败，第 {attempt} 次重试: {path}");
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(max_backoff);
                continue;
            }
            let response = result?;
            let status = response.status();
            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                return Err(anyhow!("代理接口调用失败: {status} {text}"));
            }
            return Ok(response.json().await?);
        }
    }

    fn headers(&self) -> reqwest::header::HeaderMap {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        for (name, value) in &self.config.headers {
            let Ok(name) = name.parse::<reqwest::header::HeaderName>() else {
                continue;
            };
            if let Ok(value) = value.parse() {
                headers.insert(name, value);
            }
        }
        headers
    }
}

pub struct MastraAgent {
    client: MastraClient,
    agent_id: String,
}

impl MastraAgent {
    pub async fn generate(
        &self,
        messages: &[ChatMessage],
        temperature: Option<f32>,
    ) -> Result<Value> {
        let mut payload = json!({ "messages": messages });
        if let Some(temperature) = temperature {
            payload["temperature"] = json!(temperature);
        }
        self.client
            .post_json(&format!("/agents/{}/generate", self.agent_id), payload)
            .await
    }
}

/// 合同审核封装：固定走 contractAuditAgent，低温度保证审核一致性。
#[derive(Clone)]
pub struct ContractReviewClient {
    client: MastraClient,
}

impl ContractReviewClient {
    pub fn new(client: MastraClient) -> Self {
        Self { client }
    }

    pub async fn review(&self, content: &str, contract_type: Option<&str>) -> Result<String> {
        let label = contract_type.map(str::trim).unwrap_or("");
        let question = format!("请审核以下{label}合同的合规性：\n\n{content}");
        let agent = self.client.agent(CONTRACT_AGENT_ID);
        let response = agent
            .generate(&[ChatMessage::user(question)], Some(0.1))
            .await?;
        Ok(extract_reply_text(&response))
    }

    /// 运行时的审核接口没有真正的 SSE，这里把完整结果按自然片段
    /// 重放给回调，节奏交给上层界面。
    pub async fn review_stream<F>(
        &self,
        content: &str,
        contract_type: Option<&str>,
        mut on_delta: F,
    ) -> Result<String>
    where
        F: FnMut(&str),
    {
        let full = self.review(content, contract_type).await?;
        for chunk in split_natural_chunks(&full) {
            on_delta(chunk);
        }
        Ok(full)
    }

    pub async fn check_connection(&self) -> bool {
        let agent = self.client.agent(CONTRACT_AGENT_ID);
        agent
            .generate(&[ChatMessage::user("测试连接")], Some(0.1))
            .await
            .is_ok()
    }

    pub fn available_agents(&self) -> Vec<&'static str> {
        KNOWN_AGENTS.to_vec()
    }
}

/// 从代理返回里取回复文本：content -> message -> text。
pub fn extract_reply_text(value: &Value) -> String {
    for key in ["content", "message", "text"] {
        if let Some(text) = value.get(key).and_then(Value::as_str) {
            if !text.trim().is_empty() {
                return text.to_string();
            }
        }
    }
    "审核完成，但无响应内容。".to_string()
}

/// 按中文标点与空白切分文本，片段保持原样拼接可还原全文。
pub fn split_natural_chunks(text: &str) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut start = 0;
    for (index, ch) in text.char_indices() {
        if matches!(ch, '。' | '！' | '？' | '，' | '、' | '；' | '：' | '\n') {
            let end = index + ch.len_utf8();
            chunks.push(&text[start..end]);
            start = end;
        }
    }
    if start < text.len() {
        chunks.push(&text[start..]);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_reply_prefers_content_field() {
        let value = json!({ "content": "审核意见", "text": "忽略" });
        assert_eq!(extract_reply_text(&value), "审核意见");
    }

    #[test]
    fn extract_reply_falls_back_through_fields() {
        let value = json!({ "text": "纯文本结果" });
        assert_eq!(extract_reply_text(&value), "纯文本结果");
        let empty = json!({ "status": "ok" });
        assert_eq!(extract_reply_text(&empty), "审核完成，但无响应内容。");
    }

    #[test]
    fn natural_chunks_roundtrip_to_original() {
        let text = "第一条合规。第二条存在风险，建议修订：\n补充违约责任。尾部";
        let chunks = split_natural_chunks(text);
        assert!(chunks.len() >= 4);
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn natural_chunks_handle_text_without_punctuation() {
        assert_eq!(split_natural_chunks("abc"), vec!["abc"]);
        assert!(split_natural_chunks("").is_empty());
    }
}

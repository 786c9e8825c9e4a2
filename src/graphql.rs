// GraphQL 聊天接口客户端：直接以 HTTP POST 提交查询与变更。
use crate::schemas::{ChatMessage, ChatResponse, CompletionResponse, ModelInfo};
use anyhow::{anyhow, Result};
use reqwest::Client;
use serde::Serialize;
use serde_json::{json, Value};

pub const HELLO_QUERY: &str = "query Hello { hello }";

pub const GET_MODELS_QUERY: &str = "\
query GetModels {
  models {
    id
    object
    created
    owned_by
  }
}";

pub const CHAT_MUTATION: &str = "\
mutation Chat($input: ChatInput!) {
  chat(input: $input) {
    id
    object
    created
    model
    choices {
      index
      message {
        role
        content
      }
      finish_reason
    }
    usage {
      prompt_tokens
      completion_tokens
      total_tokens
    }
  }
}";

pub const COMPLETION_MUTATION: &str = "\
mutation Completion($input: CompletionInput!) {
  completion(input: $input) {
    id
    object
    created
    model
    choices {
      text
      index
      finish_reason
    }
    usage {
      prompt_tokens
      completion_tokens
      total_tokens
    }
  }
}";

#[derive(Debug, Clone, Serialize)]
pub struct ChatInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompletionInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
}

#[derive(Clone)]
pub struct GraphqlClient {
    http: Client,
    endpoint: String,
}

impl GraphqlClient {
    pub fn new(http: Client, endpoint: impl Into<String>) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
        }
    }

    pub async fn hello(&self) -> Result<String> {
        let data = self.execute(HELLO_QUERY, Value::Null).await?;
        data.get("hello")
            .and_then(Value::as_str)
            .map(ToString::to_string)
            .ok_or_else(|| anyhow!("hello 查询缺少返回字段"))
    }

    pub async fn models(&self) -> Result<Vec<ModelInfo>> {
        let data = self.execute(GET_MODELS_QUERY, Value::Null).await?;
        let models = data
            .get("models")
            .cloned()
            .ok_or_else(|| anyhow!("models 查询缺少返回字段"))?;
        Ok(serde_json::from_value(models)?)
    }

    pub async fn chat(&self, input: &ChatInput) -> Result<ChatResponse> {
        let variables = json!({ "input": input });
        let data = self.execute(CHAT_MUTATION, variables).await?;
        let chat = data
            .get("chat")
            .cloned()
            .ok_or_else(|| anyhow!("chat 变更缺少返回字段"))?;
        Ok(serde_json::from_value(chat)?)
    }

    pub async fn completion(&self, input: &CompletionInput) -> Result<CompletionResponse> {
        let variables = json!({ "input": input });
        let data = self.execute(COMPLETION_MUTATION, variables).await?;
        let completion = data
            .get("completion")
            .cloned()
            .ok_or_else(|| anyhow!("completion 变更缺少返回字段"))?;
        Ok(serde_json::from_value(completion)?)
    }

    /// 提交一次 GraphQL 请求。errors 数组里的所有消息合并上报，
    /// 带着 errors 的部分 data 也视为失败。
    async fn execute(&self, query: &str, variables: Value) -> Result<Value> {
        let mut payload = json!({ "query": query });
        if !variables.is_null() {
            payload["variables"] = variables;
        }
        let response = self
            .http
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .json(&payload)
            .send()
            .await?;
        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);
        if !status.is_success() {
            return Err(anyhow!("GraphQL 请求失败: {status} {body}"));
        }
        if let Some(errors) = body.get("errors").and_then(Value::as_array) {
            if !errors.is_empty() {
                let joined = errors
                    .iter()
                    .map(|error| {
                        error
                            .get("message")
                            .and_then(Value::as_str)
                            .unwrap_or("未知错误")
                    })
                    .collect::<Vec<_>>()
                    .join("; ");
                return Err(anyhow!("GraphQL 错误: {joined}"));
            }
        }
        body.get("data")
            .cloned()
            .filter(|data| !data.is_null())
            .ok_or_else(|| anyhow!("GraphQL 响应缺少 data 字段"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schemas::ChatRole;

    #[test]
    fn chat_input_skips_unset_fields() {
        let input = ChatInput {
            model: None,
            messages: vec![ChatMessage::new(ChatRole::User, "hi")],
            max_tokens: Some(2000),
            temperature: None,
            top_p: None,
        };
        let value = serde_json::to_value(&input).expect("serialize input");
        let object = value.as_object().expect("object");
        assert!(!object.contains_key("model"));
        assert!(!object.contains_key("temperature"));
        assert_eq!(object["max_tokens"], 2000);
    }

    #[test]
    fn mutation_documents_request_usage_fields() {
        assert!(CHAT_MUTATION.contains("prompt_tokens"));
        assert!(COMPLETION_MUTATION.contains("finish_reason"));
    }
}

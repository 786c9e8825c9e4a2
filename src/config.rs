// 配置读取与覆盖合并：内置默认值 -> 基础 YAML -> 覆盖 YAML -> 环境变量。
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;
use tracing::warn;

pub const APP_NAME: &str = "小包包";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub chat: ChatApiConfig,
    #[serde(default)]
    pub mastra: MastraConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatApiConfig {
    pub graphql_endpoint: String,
    pub stream_endpoint: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
}

impl Default for ChatApiConfig {
    fn default() -> Self {
        Self {
            graphql_endpoint: "https://deepseek.jzq1020814597.workers.dev/graphql".to_string(),
            stream_endpoint: "https://ai-admin.juzhiqiang.shop/v1/chat/completions".to_string(),
            api_key: None,
            model: "deepseek-chat".to_string(),
            temperature: 0.7,
            max_tokens: 2000,
            top_p: 0.9,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MastraConfig {
    pub base_url: String,
    pub retries: u32,
    pub backoff_ms: u64,
    pub max_backoff_ms: u64,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

impl Default for MastraConfig {
    fn default() -> Self {
        Self {
            base_url: "https://agent.juzhiqiang.shop".to_string(),
            retries: 3,
            backoff_ms: 300,
            max_backoff_ms: 5000,
            headers: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// 发送请求时携带的历史消息条数（不含欢迎语与本轮输入）。
    pub history_window: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { history_window: 4 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ObservabilityConfig {
    #[serde(default)]
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AppInfo {
    pub name: &'static str,
    pub version: &'static str,
    pub config_errors: Vec<String>,
}

impl Config {
    /// 校验端点 URL，返回全部问题而不是第一个。
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if url::Url::parse(&self.chat.graphql_endpoint).is_err() {
            errors.push("GraphQL 端点 URL 格式不正确".to_string());
        }
        if url::Url::parse(&self.chat.stream_endpoint).is_err() {
            errors.push("流式端点 URL 格式不正确".to_string());
        }
        if url::Url::parse(&self.mastra.base_url).is_err() {
            errors.push("Mastra API 端点 URL 格式不正确".to_string());
        }
        errors
    }

    pub fn app_info(&self) -> AppInfo {
        AppInfo {
            name: APP_NAME,
            version: env!("CARGO_PKG_VERSION"),
            config_errors: self.validate(),
        }
    }

    pub fn log_level(&self) -> String {
        let env_level = env::var("XIAOBAOBAO_LOG_LEVEL").unwrap_or_default();
        let level = if env_level.trim().is_empty() {
            self.observability.log_level.trim().to_string()
        } else {
            env_level.trim().to_string()
        };
        if level.is_empty() {
            "info".to_string()
        } else {
            level.to_lowercase()
        }
    }
}

pub fn load_config() -> Config {
    let base_path =
        env::var("XIAOBAOBAO_CONFIG_PATH").unwrap_or_else(|_| "config/xiaobaobao.yaml".to_string());
    let override_path = env::var("XIAOBAOBAO_CONFIG_OVERRIDE_PATH")
        .unwrap_or_else(|_| "data/config/xiaobaobao.override.yaml".to_string());

    let mut merged = read_yaml(&base_path);
    if Path::new(&override_path).exists() {
        merge_yaml(&mut merged, read_yaml(&override_path));
    }
    expand_yaml_env(&mut merged);

    let mut config = serde_yaml::from_value::<Config>(merged).unwrap_or_else(|err| {
        warn!("配置解析失败，使用默认配置: {err}");
        Config::default()
    });
    apply_env_overrides(&mut config);
    config
}

/// 环境变量优先级最高，便于部署环境切换端点。
fn apply_env_overrides(config: &mut Config) {
    if let Some(value) = env_value("XIAOBAOBAO_GRAPHQL_ENDPOINT") {
        config.chat.graphql_endpoint = value;
    }
    if let Some(value) = env_value("XIAOBAOBAO_STREAM_ENDPOINT") {
        config.chat.stream_endpoint = value;
    }
    if let Some(value) = env_value("XIAOBAOBAO_MASTRA_API_URL") {
        config.mastra.base_url = value;
    }
    if let Some(value) = env_value("XIAOBAOBAO_API_KEY") {
        config.chat.api_key = Some(value);
    }
}

fn env_value(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn read_yaml(path: &str) -> Value {
    // 配置文件允许不存在，首次启动直接使用内置默认值。
    let content = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(_) => return Value::Null,
    };
    serde_yaml::from_str(&content).unwrap_or_else(|err| {
        warn!("解析 YAML 失败: {path}, {err}");
        Value::Null
    })
}

fn merge_yaml(base: &mut Value, override_value: Value) {
    match (base, override_value) {
        (Value::Mapping(base_map), Value::Mapping(override_map)) => {
            for (key, value) in override_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_yaml(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => {
            // 覆盖文件的空值不清空已有配置。
            if !value.is_null() {
                *slot = value;
            }
        }
    }
}

fn expand_yaml_env(value: &mut Value) {
    match value {
        Value::String(text) => *text = expand_env_placeholders(text),
        Value::Sequence(items) => items.iter_mut().for_each(expand_yaml_env),
        Value::Mapping(map) => map.iter_mut().for_each(|(_, item)| expand_yaml_env(item)),
        _ => {}
    }
}

fn expand_env_placeholders(input: &str) -> String {
    let mut output = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("${") {
        output.push_str(&rest[..start]);
        rest = &rest[start + 2..];
        let Some(end) = rest.find('}') else {
            output.push_str("${");
            output.push_str(rest);
            return output;
        };
        let inner = &rest[..end];
        rest = &rest[end + 1..];
        let (name, fallback) = match inner.split_once(":-") {
            Some((name, fallback)) => (name.trim(), Some(fallback)),
            None => (inner.trim(), None),
        };
        if name.is_empty() {
            output.push_str("${");
            output.push_str(inner);
            output.push('}');
            continue;
        }
        match (env_value(name), fallback) {
            (Some(value), _) => output.push_str(&value),
            (None, Some(fallback)) => output.push_str(fallback),
            (None, None) => {}
        }
    }
    output.push_str(rest);
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_production_endpoints() {
        let config = Config::default();
        assert!(config.chat.graphql_endpoint.ends_with("/graphql"));
        assert!(config.chat.stream_endpoint.ends_with("/v1/chat/completions"));
        assert_eq!(config.chat.model, "deepseek-chat");
        assert!(config.validate().is_empty());
    }

    #[test]
    fn validate_reports_every_bad_endpoint() {
        let mut config = Config::default();
        config.chat.graphql_endpoint = "not-a-url".to_string();
        config.mastra.base_url = "also bad".to_string();
        let errors = config.validate();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn merge_override_keeps_unset_fields() {
        let mut base: Value = serde_yaml::from_str(
            "chat:\n  model: deepseek-chat\n  temperature: 0.7\n",
        )
        .expect("base yaml");
        let override_value: Value =
            serde_yaml::from_str("chat:\n  model: deepseek-reasoner\n").expect("override yaml");
        merge_yaml(&mut base, override_value);
        let merged: Config = serde_yaml::from_value(base).expect("merged config");
        assert_eq!(merged.chat.model, "deepseek-reasoner");
        assert!((merged.chat.temperature - 0.7).abs() < f32::EPSILON);
    }

    #[test]
    fn placeholder_expansion_uses_fallback_when_unset() {
        env::remove_var("XBB_TEST_ENDPOINT");
        assert_eq!(
            expand_env_placeholders("${XBB_TEST_ENDPOINT:-https://example.com}"),
            "https://example.com"
        );
        env::set_var("XBB_TEST_ENDPOINT", "https://override.example.com");
        assert_eq!(
            expand_env_placeholders("base=${XBB_TEST_ENDPOINT}"),
            "base=https://override.example.com"
        );
        env::remove_var("XBB_TEST_ENDPOINT");
        assert_eq!(expand_env_placeholders("${XBB_TEST_ENDPOINT}"), "");
    }

    #[test]
    fn env_override_wins_over_defaults() {
        env::set_var("XIAOBAOBAO_MASTRA_API_URL", "https://agent.test.local");
        let mut config = Config::default();
        apply_env_overrides(&mut config);
        env::remove_var("XIAOBAOBAO_MASTRA_API_URL");
        assert_eq!(config.mastra.base_url, "https://agent.test.local");
    }
}

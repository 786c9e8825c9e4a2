// 旅游规划服务：经 Mastra 的工具、代理与工作流三条路径完成路线规划。
use crate::mastra::MastraClient;
use crate::schemas::ChatMessage;
use anyhow::{anyhow, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::OnceLock;
use tracing::warn;

pub const TRAVEL_TOOL_ID: &str = "travelRouteTool";
pub const TRAVEL_AGENT_ID: &str = "travelRouteAgent";
pub const TRAVEL_WORKFLOW_ID: &str = "travelRouteWorkflow";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TravelStyle {
    Budget,
    Comfort,
    Luxury,
}

impl TravelStyle {
    pub fn label(self) -> &'static str {
        match self {
            Self::Budget => "经济型",
            Self::Comfort => "舒适型",
            Self::Luxury => "奢华型",
        }
    }

    pub fn icon(self) -> &'static str {
        match self {
            Self::Budget => "🎒",
            Self::Comfort => "🏨",
            Self::Luxury => "💎",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TravelRouteRequest {
    pub destinations: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub travel_style: Option<TravelStyle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_location: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TravelDestination {
    pub name: String,
    #[serde(default)]
    pub latitude: f64,
    #[serde(default)]
    pub longitude: f64,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub order: u32,
    #[serde(default)]
    pub recommended_days: u32,
    #[serde(default)]
    pub attractions: Vec<String>,
    #[serde(default)]
    pub transportation: String,
    #[serde(default)]
    pub estimated_cost: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TravelRouteResponse {
    pub route: Vec<TravelDestination>,
    #[serde(default)]
    pub total_distance: f64,
    #[serde(default)]
    pub total_duration: u32,
    #[serde(default)]
    pub estimated_budget: String,
    #[serde(default)]
    pub best_travel_time: String,
    #[serde(default)]
    pub tips: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TravelToolResult {
    pub tool_id: String,
    pub result: TravelRouteResponse,
}

#[derive(Debug, Clone)]
pub struct TravelChatResponse {
    pub content: String,
    pub tool_results: Option<Vec<TravelToolResult>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TravelWorkflowSummary {
    #[serde(default)]
    pub total_destinations: u32,
    #[serde(default)]
    pub total_distance: f64,
    #[serde(default)]
    pub total_duration: u32,
    #[serde(default)]
    pub estimated_budget: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TravelWorkflowOutcome {
    pub itinerary: String,
    #[serde(default)]
    pub route_summary: Option<TravelWorkflowSummary>,
}

/// 自由文本走代理对话，结构化请求优先走工具调用。
#[derive(Debug, Clone)]
pub enum TravelQuery {
    Text(String),
    Route(TravelRouteRequest),
}

#[derive(Clone)]
pub struct TravelPlanner {
    client: MastraClient,
}

impl TravelPlanner {
    pub fn new(client: MastraClient) -> Self {
        Self { client }
    }

    pub async fn plan_route(&self, request: &TravelRouteRequest) -> Result<TravelRouteResponse> {
        let input = serde_json::to_value(request)?;
        let data = self
            .client
            .run_tool(TRAVEL_TOOL_ID, input)
            .await
            .map_err(friendly_error)?;
        let payload = data.get("result").cloned().unwrap_or(data);
        Ok(serde_json::from_value(payload)?)
    }

    pub async fn chat_with_agent(&self, messages: &[ChatMessage]) -> Result<TravelChatResponse> {
        let data = self
            .client
            .run_agent(TRAVEL_AGENT_ID, messages)
            .await
            .map_err(friendly_error)?;
        let content = ["content", "text"]
            .iter()
            .find_map(|key| data.get(*key).and_then(Value::as_str))
            .unwrap_or("规划完成")
            .to_string();
        let tool_results = data
            .get("toolResults")
            .cloned()
            .and_then(|value| serde_json::from_value(value).ok());
        Ok(TravelChatResponse {
            content,
            tool_results,
        })
    }

    pub async fn run_workflow(
        &self,
        request: &TravelRouteRequest,
    ) -> Result<TravelWorkflowOutcome> {
        let input = serde_json::to_value(request)?;
        let data = self
            .client
            .run_workflow(TRAVEL_WORKFLOW_ID, input)
            .await
            .map_err(friendly_error)?;
        let payload = data.get("result").cloned().unwrap_or(data);
        Ok(serde_json::from_value(payload)?)
    }

    /// 智能入口：结构化请求先试工具，失败降级为代理对话。
    pub async fn smart_planning(&self, query: TravelQuery) -> Result<TravelChatResponse> {
        match query {
            TravelQuery::Text(text) => self.chat_with_agent(&[ChatMessage::user(text)]).await,
            TravelQuery::Route(request) => match self.plan_route(&request).await {
                Ok(route) => Ok(TravelChatResponse {
                    content: format_route(&route),
                    tool_results: Some(vec![TravelToolResult {
                        tool_id: TRAVEL_TOOL_ID.to_string(),
                        result: route,
                    }]),
                }),
                Err(err) => {
                    warn!("旅游工具调用失败，降级为代理对话: {err}");
                    let prompt = fallback_prompt(&request);
                    self.chat_with_agent(&[ChatMessage::user(prompt)]).await
                }
            },
        }
    }

    pub async fn check_health(&self) -> bool {
        self.client.health().await
    }

    pub async fn supported_destinations(&self) -> Vec<String> {
        match self.client.get_json("/api/travel/destinations").await {
            Ok(data) => data
                .get("destinations")
                .and_then(|value| serde_json::from_value::<Vec<String>>(value.clone()).ok())
                .unwrap_or_else(default_destinations),
            Err(err) => {
                warn!("获取目的地列表失败，使用内置清单: {err}");
                default_destinations()
            }
        }
    }
}

fn fallback_prompt(request: &TravelRouteRequest) -> String {
    let style = request.travel_style.unwrap_or(TravelStyle::Comfort);
    let mut prompt = format!(
        "请为我规划一个旅游路线：\n目的地：{}\n旅行风格：{}\n总天数：{}天",
        request.destinations.join(", "),
        style.label(),
        request.duration.unwrap_or(7),
    );
    if let Some(start) = request
        .start_location
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
    {
        prompt.push_str("\n出发地：");
        prompt.push_str(start);
    }
    prompt
}

/// 把结构化路线渲染成文字版行程单。
pub fn format_route(route: &TravelRouteResponse) -> String {
    let mut text = String::from("# 🗺️ 您的专属旅游路线规划\n\n## 📋 行程概览\n\n");
    let stops = route
        .route
        .iter()
        .map(|stop| stop.name.as_str())
        .collect::<Vec<_>>()
        .join(" → ");
    text.push_str(&format!("🎯 **目的地**: {stops}\n"));
    text.push_str(&format!("⏰ **总天数**: {}天\n", route.total_duration));
    text.push_str(&format!("🛣️ **总距离**: {}公里\n", route.total_distance));
    text.push_str(&format!("💰 **预算范围**: {}\n", route.estimated_budget));
    text.push_str(&format!("🌟 **最佳时间**: {}\n\n", route.best_travel_time));

    text.push_str("## 🛤️ 详细路线安排\n\n");
    for (index, stop) in route.route.iter().enumerate() {
        text.push_str(&format!("### 📍 第{}站：{}\n\n", stop.order, stop.name));
        let region = stop
            .region
            .as_deref()
            .map(|value| format!(", {value}"))
            .unwrap_or_default();
        text.push_str(&format!("**📍 位置**: {}{region}\n", stop.country));
        text.push_str(&format!("**⏱️ 建议停留**: {}天\n", stop.recommended_days));
        text.push_str(&format!("**🚗 交通方式**: {}\n", stop.transportation));
        text.push_str(&format!("**💵 预估花费**: {}\n\n", stop.estimated_cost));
        text.push_str("**🎯 必游景点**:\n");
        for attraction in &stop.attractions {
            text.push_str(&format!("- {attraction}\n"));
        }
        text.push_str(&format!("\n**📝 目的地介绍**: {}\n\n", stop.description));
        if index + 1 < route.route.len() {
            text.push_str("---\n\n");
        }
    }

    if !route.tips.is_empty() {
        text.push_str("## 💡 实用旅行贴士\n\n");
        for tip in &route.tips {
            text.push_str(&format!("- {tip}\n"));
        }
    }
    text
}

/// 校验请求并返回全部问题。
pub fn validate_request(request: &TravelRouteRequest) -> Vec<String> {
    let mut errors = Vec::new();
    if request.destinations.is_empty() {
        errors.push("请至少输入一个目的地".to_string());
    }
    if request.destinations.len() > 10 {
        errors.push("目的地数量不能超过10个".to_string());
    }
    if let Some(duration) = request.duration {
        if !(1..=30).contains(&duration) {
            errors.push("旅行天数应在1-30天之间".to_string());
        }
    }
    errors
}

/// 目的地输入兼容中英文分隔符。
pub fn split_destinations(raw: &str) -> Vec<String> {
    static SEPARATOR: OnceLock<Regex> = OnceLock::new();
    let separator = SEPARATOR.get_or_init(|| Regex::new(r"[,，、]").expect("valid separator regex"));
    separator
        .split(raw)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// 把底层错误翻译成面向用户的提示。
fn friendly_error(err: anyhow::Error) -> anyhow::Error {
    if let Some(source) = err.downcast_ref::<reqwest::Error>() {
        if source.is_connect() || source.is_timeout() {
            return anyhow!("🌐 网络连接错误，请检查网络设置或稍后再试");
        }
    }
    let message = err.to_string();
    if message.contains("404") {
        anyhow!("🔍 旅游规划服务暂时不可用，请稍后再试")
    } else if message.contains("500") {
        anyhow!("⚠️ 服务器内部错误，请稍后再试")
    } else {
        anyhow!("🚫 旅游规划服务遇到问题：{message}")
    }
}

fn default_destinations() -> Vec<String> {
    [
        "巴黎", "伦敦", "罗马", "巴塞罗那", "阿姆斯特丹", "布鲁塞尔", "东京", "京都", "大阪",
        "首尔", "新加坡", "曼谷", "纽约", "洛杉矶", "旧金山", "芝加哥", "多伦多", "北京", "上海",
        "广州", "西安", "成都", "杭州",
    ]
    .into_iter()
    .map(ToString::to_string)
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_route() -> TravelRouteResponse {
        TravelRouteResponse {
            route: vec![TravelDestination {
                name: "京都".to_string(),
                latitude: 35.0,
                longitude: 135.7,
                country: "日本".to_string(),
                region: Some("关西".to_string()),
                order: 1,
                recommended_days: 3,
                attractions: vec!["清水寺".to_string(), "伏见稻荷".to_string()],
                transportation: "新干线".to_string(),
                estimated_cost: "¥5000".to_string(),
                description: "古都".to_string(),
            }],
            total_distance: 480.0,
            total_duration: 5,
            estimated_budget: "¥12000".to_string(),
            best_travel_time: "春秋两季".to_string(),
            tips: vec!["提前订票".to_string()],
        }
    }

    #[test]
    fn split_handles_mixed_separators() {
        assert_eq!(
            split_destinations("巴黎, 伦敦，罗马、 东京"),
            vec!["巴黎", "伦敦", "罗马", "东京"]
        );
        assert!(split_destinations(" ，、 ").is_empty());
    }

    #[test]
    fn validate_collects_all_problems() {
        let request = TravelRouteRequest {
            destinations: Vec::new(),
            travel_style: None,
            duration: Some(45),
            start_location: None,
        };
        let errors = validate_request(&request);
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn validate_accepts_reasonable_request() {
        let request = TravelRouteRequest {
            destinations: vec!["京都".to_string()],
            travel_style: Some(TravelStyle::Comfort),
            duration: Some(5),
            start_location: Some("上海".to_string()),
        };
        assert!(validate_request(&request).is_empty());
    }

    #[test]
    fn format_route_contains_overview_and_stops() {
        let text = format_route(&sample_route());
        assert!(text.contains("行程概览"));
        assert!(text.contains("第1站：京都"));
        assert!(text.contains("- 清水寺"));
        assert!(text.contains("实用旅行贴士"));
    }

    #[test]
    fn request_serializes_camel_case_for_the_wire() {
        let request = TravelRouteRequest {
            destinations: vec!["巴黎".to_string()],
            travel_style: Some(TravelStyle::Budget),
            duration: Some(7),
            start_location: Some("北京".to_string()),
        };
        let value = serde_json::to_value(&request).expect("serialize");
        assert_eq!(value["travelStyle"], "budget");
        assert_eq!(value["startLocation"], "北京");
    }

    #[test]
    fn fallback_prompt_mentions_style_and_start() {
        let request = TravelRouteRequest {
            destinations: vec!["巴黎".to_string(), "伦敦".to_string()],
            travel_style: Some(TravelStyle::Luxury),
            duration: None,
            start_location: Some("上海".to_string()),
        };
        let prompt = fallback_prompt(&request);
        assert!(prompt.contains("奢华型"));
        assert!(prompt.contains("7天"));
        assert!(prompt.contains("出发地：上海"));
    }
}

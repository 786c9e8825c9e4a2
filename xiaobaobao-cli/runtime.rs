use crate::args::GlobalArgs;
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use xiaobaobao::config::{load_config, Config};
use xiaobaobao::graphql::GraphqlClient;
use xiaobaobao::mastra::{ContractReviewClient, MastraClient};
use xiaobaobao::stream::StreamingChatClient;
use xiaobaobao::travel::TravelPlanner;

// 只限制建连时间；整请求超时会掐断长流式回复。
const HTTP_CONNECT_TIMEOUT_S: u64 = 15;

#[derive(Clone)]
pub struct CliRuntime {
    pub config: Config,
    pub http: reqwest::Client,
    pub temp_root: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionMeta {
    session_id: String,
    updated_at: DateTime<Utc>,
}

impl CliRuntime {
    pub fn init(global: &GlobalArgs) -> Result<Self> {
        let launch_dir = std::env::current_dir().context("read current directory failed")?;
        let temp_root = global
            .temp_root
            .clone()
            .unwrap_or_else(|| launch_dir.join("XIAOBAOBAO_TEMP"));
        ensure_runtime_dirs(&temp_root)?;

        if let Some(path) = global.config_path.as_deref() {
            set_env_path("XIAOBAOBAO_CONFIG_PATH", path);
        }
        if std::env::var("XIAOBAOBAO_CONFIG_OVERRIDE_PATH").is_err() {
            set_env_path(
                "XIAOBAOBAO_CONFIG_OVERRIDE_PATH",
                &temp_root.join("config/xiaobaobao.override.yaml"),
            );
        }

        let mut config = load_config();
        if let Some(model) = global
            .model
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
        {
            config.chat.model = model.to_string();
        }

        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(HTTP_CONNECT_TIMEOUT_S))
            .user_agent(format!("xiaobaobao/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .context("build http client failed")?;

        Ok(Self {
            config,
            http,
            temp_root,
        })
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.temp_root.join("sessions")
    }

    fn current_session_file(&self) -> PathBuf {
        self.sessions_dir().join("current_session.json")
    }

    pub fn transcript_file(&self, session_id: &str) -> PathBuf {
        self.sessions_dir().join(format!("{session_id}.json"))
    }

    pub fn load_saved_session(&self) -> Option<String> {
        let text = fs::read_to_string(self.current_session_file()).ok()?;
        let meta: SessionMeta = serde_json::from_str(&text).ok()?;
        let session_id = meta.session_id.trim();
        if session_id.is_empty() {
            None
        } else {
            Some(session_id.to_string())
        }
    }

    pub fn save_session(&self, session_id: &str) -> Result<()> {
        let session_id = session_id.trim();
        if session_id.is_empty() {
            return Err(anyhow!("session id is empty"));
        }
        let meta = SessionMeta {
            session_id: session_id.to_string(),
            updated_at: Utc::now(),
        };
        fs::write(
            self.current_session_file(),
            serde_json::to_string_pretty(&meta)?,
        )?;
        Ok(())
    }

    pub fn resolve_session(&self, preferred: Option<&str>) -> String {
        if let Some(value) = preferred.map(str::trim).filter(|value| !value.is_empty()) {
            return value.to_string();
        }
        if let Some(saved) = self.load_saved_session() {
            return saved;
        }
        uuid::Uuid::new_v4().simple().to_string()
    }

    pub fn streaming_client(&self) -> StreamingChatClient {
        StreamingChatClient::new(self.http.clone(), self.config.chat.clone())
    }

    pub fn graphql_client(&self) -> GraphqlClient {
        GraphqlClient::new(self.http.clone(), self.config.chat.graphql_endpoint.clone())
    }

    pub fn mastra_client(&self) -> MastraClient {
        MastraClient::new(self.http.clone(), self.config.mastra.clone())
    }

    pub fn contract_client(&self) -> ContractReviewClient {
        ContractReviewClient::new(self.mastra_client())
    }

    pub fn travel_planner(&self) -> TravelPlanner {
        TravelPlanner::new(self.mastra_client())
    }
}

fn ensure_runtime_dirs(temp_root: &Path) -> Result<()> {
    for dir in [
        temp_root.to_path_buf(),
        temp_root.join("config"),
        temp_root.join("logs"),
        temp_root.join("sessions"),
    ] {
        fs::create_dir_all(dir)?;
    }
    Ok(())
}

fn set_env_path(key: &str, value: &Path) {
    std::env::set_var(key, value.to_string_lossy().to_string());
}

//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `NEWSDESK__*` 覆盖（双下划线表示嵌套，如 `NEWSDESK__RUN__POLL_INTERVAL_SECS=2`）。
//! API Key 未配置时回退到 `OPENAI_API_KEY` / `NEWS_API_KEY`。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::core::orchestrator::{
    DEFAULT_ASSISTANT_NAME, DEFAULT_INSTRUCTIONS, DEFAULT_MESSAGE_TEMPLATE, DEFAULT_MODEL,
    DEFAULT_RUN_INSTRUCTIONS,
};
use crate::core::{AssistantProfile, PollConfig};

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub assistant: AssistantSection,
    pub openai: OpenAiSection,
    pub run: RunSection,
    pub tools: ToolsSection,
}

/// [app] 段
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
    /// 保存 Assistant / Thread id 的 JSON 文件
    #[serde(default = "default_session_file")]
    pub session_file: PathBuf,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            session_file: default_session_file(),
        }
    }
}

fn default_session_file() -> PathBuf {
    PathBuf::from(".newsdesk/session.json")
}

/// [assistant] 段：Assistant 参数、提示模板与可选的已知 id
#[derive(Debug, Clone, Deserialize)]
pub struct AssistantSection {
    #[serde(default = "default_assistant_name")]
    pub name: String,
    #[serde(default = "default_instructions")]
    pub instructions: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_run_instructions")]
    pub run_instructions: String,
    #[serde(default = "default_message_template")]
    pub message_template: String,
    pub id: Option<String>,
    pub thread_id: Option<String>,
}

impl Default for AssistantSection {
    fn default() -> Self {
        Self {
            name: default_assistant_name(),
            instructions: default_instructions(),
            model: default_model(),
            run_instructions: default_run_instructions(),
            message_template: default_message_template(),
            id: None,
            thread_id: None,
        }
    }
}

fn default_assistant_name() -> String {
    DEFAULT_ASSISTANT_NAME.to_string()
}

fn default_instructions() -> String {
    DEFAULT_INSTRUCTIONS.to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_run_instructions() -> String {
    DEFAULT_RUN_INSTRUCTIONS.to_string()
}

fn default_message_template() -> String {
    DEFAULT_MESSAGE_TEMPLATE.to_string()
}

impl AssistantSection {
    pub fn profile(&self) -> AssistantProfile {
        AssistantProfile {
            name: self.name.clone(),
            instructions: self.instructions.clone(),
            model: self.model.clone(),
            run_instructions: self.run_instructions.clone(),
            message_template: self.message_template.clone(),
        }
    }
}

/// [openai] 段
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiSection {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,
}

impl Default for OpenAiSection {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            timeout_secs: default_request_timeout(),
        }
    }
}

fn default_request_timeout() -> u64 {
    60
}

impl OpenAiSection {
    pub fn resolved_api_key(&self) -> Option<String> {
        non_empty(self.api_key.clone()).or_else(|| non_empty(std::env::var("OPENAI_API_KEY").ok()))
    }
}

/// [run] 段：轮询间隔、可选上限与瞬时错误退避
#[derive(Debug, Clone, Deserialize)]
pub struct RunSection {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    pub max_poll_attempts: Option<u32>,
    pub deadline_secs: Option<u64>,
    #[serde(default = "default_transient_retries")]
    pub transient_retries: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            max_poll_attempts: None,
            deadline_secs: None,
            transient_retries: default_transient_retries(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
        }
    }
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_transient_retries() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    500
}

fn default_backoff_max_ms() -> u64 {
    8000
}

impl RunSection {
    pub fn poll_config(&self) -> PollConfig {
        PollConfig {
            interval: Duration::from_secs(self.poll_interval_secs),
            max_attempts: self.max_poll_attempts,
            deadline: self.deadline_secs.map(Duration::from_secs),
            transient_retries: self.transient_retries,
            backoff_base: Duration::from_millis(self.backoff_base_ms),
            backoff_max: Duration::from_millis(self.backoff_max_ms),
        }
    }
}

/// [tools] 段：工具超时与分发方式
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
    /// 同一批次的工具调用是否并发执行（结果顺序不变）
    #[serde(default)]
    pub parallel_dispatch: bool,
    #[serde(default)]
    pub news: NewsSection,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: default_tool_timeout_secs(),
            parallel_dispatch: false,
            news: NewsSection::default(),
        }
    }
}

fn default_tool_timeout_secs() -> u64 {
    30
}

/// [tools.news] 段：NewsAPI 访问参数
#[derive(Debug, Clone, Deserialize)]
pub struct NewsSection {
    #[serde(default = "default_news_base_url")]
    pub base_url: String,
    pub api_key: Option<String>,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_news_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for NewsSection {
    fn default() -> Self {
        Self {
            base_url: default_news_base_url(),
            api_key: None,
            page_size: default_page_size(),
            timeout_secs: default_news_timeout_secs(),
        }
    }
}

fn default_news_base_url() -> String {
    "https://newsapi.org/v2".to_string()
}

fn default_page_size() -> u32 {
    5
}

fn default_news_timeout_secs() -> u64 {
    15
}

impl NewsSection {
    pub fn resolved_api_key(&self) -> Option<String> {
        non_empty(self.api_key.clone()).or_else(|| non_empty(std::env::var("NEWS_API_KEY").ok()))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// 从 config 目录加载配置，环境变量 NEWSDESK__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 NEWSDESK__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        } else {
            tracing::warn!(path = %path.display(), "config file not found, ignoring");
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("NEWSDESK")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

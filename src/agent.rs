//! 编排器装配
//!
//! 根据 AppConfig 构建 OpenAI Assistants 客户端、NewsAPI 工具、分发器与会话存储，
//! 供 CLI 与 Web 前端共用。测试可通过 `create_orchestrator_with` 注入任意服务与新闻源。

use std::sync::Arc;

use crate::config::AppConfig;
use crate::core::{AgentError, AssistantOrchestrator, FileSessionStore};
use crate::llm::{AgentService, OpenAiAssistants};
use crate::tools::{NewsApiProvider, NewsProvider, NewsTool, ToolDispatcher, ToolRegistry};

/// 注册全部本地工具（目前只有 get_news）
pub fn build_registry(news: Arc<dyn NewsProvider>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(NewsTool::new(news));
    registry
}

pub fn build_dispatcher(cfg: &AppConfig, news: Arc<dyn NewsProvider>) -> ToolDispatcher {
    ToolDispatcher::new(build_registry(news), cfg.tools.tool_timeout_secs)
        .with_parallel(cfg.tools.parallel_dispatch)
}

/// 使用真实的 OpenAI 与 NewsAPI 后端
pub fn create_orchestrator(cfg: &AppConfig) -> Result<AssistantOrchestrator, AgentError> {
    let openai_key = cfg.openai.resolved_api_key().ok_or_else(|| {
        AgentError::ConfigError(
            "OpenAI API key missing: set openai.api_key or OPENAI_API_KEY".to_string(),
        )
    })?;
    let news_key = cfg.tools.news.resolved_api_key().unwrap_or_else(|| {
        tracing::warn!("NEWS_API_KEY not set, get_news will return no articles");
        String::new()
    });

    let service = OpenAiAssistants::new(
        cfg.openai.base_url.as_deref(),
        Some(&openai_key),
        cfg.openai.timeout_secs,
    );
    let news = NewsApiProvider::new(
        &cfg.tools.news.base_url,
        &news_key,
        cfg.tools.news.page_size,
        cfg.tools.news.timeout_secs,
    );
    tracing::info!(model = %cfg.assistant.model, "using OpenAI Assistants backend");
    Ok(create_orchestrator_with(cfg, Arc::new(service), Arc::new(news)))
}

/// 以给定服务与新闻源装配编排器；会话 id 保存在 app.session_file
pub fn create_orchestrator_with(
    cfg: &AppConfig,
    service: Arc<dyn AgentService>,
    news: Arc<dyn NewsProvider>,
) -> AssistantOrchestrator {
    AssistantOrchestrator::new(service, build_dispatcher(cfg, news), cfg.assistant.profile())
        .with_poll_config(cfg.run.poll_config())
        .with_session_store(Box::new(FileSessionStore::new(&cfg.app.session_file)))
        .with_known_ids(cfg.assistant.id.clone(), cfg.assistant.thread_id.clone())
}

//! Newsdesk - 基于远程 Assistant Run 的新闻摘要
//!
//! 模块划分：
//! - **agent**: 由配置装配编排器（OpenAI + NewsAPI）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 编排器、Run 轮询、错误类型、过程事件、会话 id 持久化
//! - **llm**: 远程 Assistant 服务抽象与实现（OpenAI Assistants v2 / 脚本化 Mock）
//! - **observability**: tracing 日志初始化
//! - **tools**: 工具注册表、分发器与 get_news 工具

pub mod agent;
pub mod config;
pub mod core;
pub mod llm;
pub mod observability;
pub mod tools;

pub use crate::core::{AgentError, AssistantOrchestrator};

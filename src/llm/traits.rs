//! 远程 Assistant 服务抽象
//!
//! 所有后端（OpenAI Assistants / 脚本化 Mock）实现 AgentService：
//! Assistant 与 Thread 的创建/获取、追加消息、启动 Run、查询状态、回报工具结果、列出消息。

use async_trait::async_trait;
use thiserror::Error;

use crate::llm::types::{
    AssistantDefinition, AssistantSpec, ConversationThread, Message, Role, Run, ToolCallResult,
};

/// 远程服务调用错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// 网络层失败（连接、超时等），通常可重试
    #[error("transport error: {message}")]
    Transport { message: String, retryable: bool },

    #[error("HTTP {code}: {body}")]
    Status { code: u16, body: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("decode error: {0}")]
    Decode(String),

    /// 请求被服务拒绝（如提交的工具结果数量与待执行调用不符）
    #[error("rejected: {0}")]
    Rejected(String),
}

impl ServiceError {
    /// 是否为瞬时错误（网络抖动、限流、服务端 5xx），轮询时可退避重试
    pub fn is_transient(&self) -> bool {
        match self {
            ServiceError::Transport { retryable, .. } => *retryable,
            ServiceError::Status { code, .. } => *code == 408 || *code == 429 || *code >= 500,
            _ => false,
        }
    }
}

/// Assistant 服务 trait
#[async_trait]
pub trait AgentService: Send + Sync {
    async fn create_assistant(&self, spec: &AssistantSpec) -> Result<AssistantDefinition, ServiceError>;

    async fn get_assistant(&self, assistant_id: &str) -> Result<AssistantDefinition, ServiceError>;

    async fn create_thread(&self) -> Result<ConversationThread, ServiceError>;

    async fn get_thread(&self, thread_id: &str) -> Result<ConversationThread, ServiceError>;

    async fn post_message(&self, thread_id: &str, role: Role, content: &str) -> Result<(), ServiceError>;

    /// 在线程上启动 Run；instructions 为本次 Run 的附加指令
    async fn create_run(
        &self,
        thread_id: &str,
        assistant_id: &str,
        instructions: Option<&str>,
    ) -> Result<Run, ServiceError>;

    /// 查询 Run 状态（requires_action 时包含待执行工具调用）
    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<Run, ServiceError>;

    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        results: &[ToolCallResult],
    ) -> Result<(), ServiceError>;

    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<(), ServiceError>;

    /// 列出线程消息，最新的在前
    async fn list_messages(&self, thread_id: &str) -> Result<Vec<Message>, ServiceError>;
}

//! 编排过程错误类型
//!
//! 工具层的可恢复错误（参数错误、执行失败、超时）会被吸收为单条 ToolCallResult；
//! 其余错误（未知工具、Run 非正常终止、轮询重试耗尽等）向调用方传播。

use std::time::Duration;

use thiserror::Error;

use crate::llm::{RunStatus, ServiceError};

/// Run 编排过程中可能出现的错误
#[derive(Error, Debug)]
pub enum AgentError {
    /// 远程服务请求了本地未注册的工具
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments for {tool}: {reason}")]
    InvalidToolArguments { tool: String, reason: String },

    #[error("Tool execution failed: {0}")]
    ToolExecutionFailed(String),

    #[error("Tool timeout: {0}")]
    ToolTimeout(String),

    /// Run 以 completed 以外的终态结束
    #[error("Run not completed: {status}{}", reason_suffix(.reason))]
    RunNotCompleted {
        status: RunStatus,
        reason: Option<String>,
    },

    /// 连续的状态查询瞬时失败超过重试上限
    #[error("Run status query failed after {attempts} attempts: {message}")]
    TransientPoll { attempts: u32, message: String },

    #[error("Run still pending after {attempts} status checks")]
    PollLimitExceeded { attempts: u32 },

    #[error("Run still pending after waiting {waited:?}")]
    DeadlineExceeded { waited: Duration },

    /// Run 已完成但线程中没有任何消息
    #[error("No message found in thread {0}")]
    MissingResponse(String),

    #[error("Cancelled")]
    Cancelled,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Session store error: {0}")]
    StoreError(String),

    #[error("Service error: {0}")]
    Service(#[from] ServiceError),
}

fn reason_suffix(reason: &Option<String>) -> String {
    reason.as_deref().map(|r| format!(" ({r})")).unwrap_or_default()
}

impl AgentError {
    /// 可被吸收为单条工具失败结果（不中止整个批次）
    pub fn is_tool_local(&self) -> bool {
        matches!(
            self,
            AgentError::InvalidToolArguments { .. }
                | AgentError::ToolExecutionFailed(_)
                | AgentError::ToolTimeout(_)
        )
    }
}

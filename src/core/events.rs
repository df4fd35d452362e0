//! Run 过程事件：用于命令行 / Web 展示编排进度

use serde::Serialize;
use tokio::sync::mpsc;

use crate::llm::RunStatus;

/// 编排过程事件（可序列化为 JSON 供前端展示）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    /// Assistant 已就绪（created 为 true 表示本次新建）
    AssistantReady { assistant_id: String, created: bool },
    ThreadReady { thread_id: String, created: bool },
    RunStarted { run_id: String },
    /// 第 poll 次状态查询的结果
    Status {
        run_id: String,
        status: RunStatus,
        poll: u32,
    },
    /// 状态查询瞬时失败，将在 delay_ms 后重试
    PollRetry {
        attempt: u32,
        delay_ms: u64,
        reason: String,
    },
    /// 远程服务请求执行工具
    ToolCall { tool_call_id: String, tool: String },
    ToolOutputsSubmitted { run_id: String, count: usize },
    Completed { run_id: String },
}

pub(crate) fn send_event(tx: Option<&mpsc::UnboundedSender<RunEvent>>, ev: RunEvent) {
    if let Some(t) = tx {
        let _ = t.send(ev);
    }
}

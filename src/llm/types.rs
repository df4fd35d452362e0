//! 远程 Assistant 服务的领域数据模型
//!
//! Assistant / Thread / Run / Message 以及工具调用请求与结果。
//! 这些类型与具体后端无关；OpenAI 的线上 JSON 格式在 `llm::openai` 内部转换。

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 消息角色（线程中只有 user / assistant 两种）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 线程中的单条消息（只追加，不修改、不删除）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// 函数工具声明（对应 Assistants API 的 `{"type": "function", "function": {...}}`）
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub kind: String,
    /// code_interpreter 等非函数工具没有 function 字段
    #[serde(default)]
    pub function: FunctionDefinition,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parameters: Value,
}

impl ToolDefinition {
    pub fn function(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            kind: "function".to_string(),
            function: FunctionDefinition {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }
}

/// 创建 Assistant 时提交的固定参数
#[derive(Clone, Debug, PartialEq)]
pub struct AssistantSpec {
    pub name: String,
    pub instructions: String,
    pub tools: Vec<ToolDefinition>,
    pub model: String,
}

/// 远程服务中的 Assistant 定义；id 由服务分配，创建后不再变化
#[derive(Clone, Debug, PartialEq)]
pub struct AssistantDefinition {
    pub id: String,
    pub name: String,
    pub instructions: String,
    pub tools: Vec<ToolDefinition>,
    pub model: String,
}

/// 会话线程：id + 按时间顺序排列的消息
#[derive(Clone, Debug, PartialEq)]
pub struct ConversationThread {
    pub id: String,
    pub messages: Vec<Message>,
}

/// Run 状态
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    RequiresAction,
    Cancelling,
    Completed,
    Failed,
    Cancelled,
    Expired,
    Incomplete,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Queued => "queued",
            RunStatus::InProgress => "in_progress",
            RunStatus::RequiresAction => "requires_action",
            RunStatus::Cancelling => "cancelling",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
            RunStatus::Expired => "expired",
            RunStatus::Incomplete => "incomplete",
        }
    }

    /// 终态：到达后 Run 不会再变化
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed
                | RunStatus::Failed
                | RunStatus::Cancelled
                | RunStatus::Expired
                | RunStatus::Incomplete
        )
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 远程服务请求执行的单个工具调用；arguments 为服务原样下发的 JSON 文本
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

impl ToolCallRequest {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }
}

/// Run 最近一次失败的原因（failed / expired 时由服务给出）
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunError {
    pub code: String,
    pub message: String,
}

/// 一次 Run 的快照
#[derive(Clone, Debug, PartialEq)]
pub struct Run {
    pub id: String,
    pub thread_id: String,
    pub assistant_id: String,
    pub status: RunStatus,
    /// 仅在 requires_action 时存在：按顺序排列的待执行工具调用
    pub required_action: Option<Vec<ToolCallRequest>>,
    pub last_error: Option<RunError>,
}

impl Run {
    pub fn pending_tool_calls(&self) -> &[ToolCallRequest] {
        self.required_action.as_deref().unwrap_or(&[])
    }
}

/// 单个工具调用的执行结果
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ToolOutcome {
    /// 工具正常返回的文本
    Output(String),
    /// 参数错误、执行失败或超时；批次继续
    Failed(String),
    /// 本地未注册的工具名；整个批次不可提交
    UnknownTool(String),
}

/// 与请求一一对应的工具结果
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolCallResult {
    pub tool_call_id: String,
    pub outcome: ToolOutcome,
}

impl ToolCallResult {
    pub fn output(tool_call_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            outcome: ToolOutcome::Output(output.into()),
        }
    }

    pub fn failed(tool_call_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            outcome: ToolOutcome::Failed(reason.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self.outcome, ToolOutcome::Output(_))
    }

    /// 提交给远程服务的 output 文本；失败以 "Error: ..." 形式回报给模型
    pub fn wire_output(&self) -> String {
        match &self.outcome {
            ToolOutcome::Output(s) => s.clone(),
            ToolOutcome::Failed(reason) => format!("Error: {reason}"),
            ToolOutcome::UnknownTool(name) => format!("Error: unknown tool {name}"),
        }
    }
}

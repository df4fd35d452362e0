//! 远程服务层：Assistant 服务抽象与实现（OpenAI Assistants / 脚本化 Mock）

pub mod mock;
pub mod openai;
pub mod traits;
pub mod types;

pub use mock::{CallLog, ScriptedAgentService, ScriptedStatus};
pub use openai::OpenAiAssistants;
pub use traits::{AgentService, ServiceError};
pub use types::{
    AssistantDefinition, AssistantSpec, ConversationThread, FunctionDefinition, Message, Role, Run,
    RunError, RunStatus, ToolCallRequest, ToolCallResult, ToolDefinition, ToolOutcome,
};

//! 脚本化 Assistant 服务（用于测试，无需 API）
//!
//! 在内存中维护 Assistant / Thread / Run；get_run 按预设脚本依次返回状态，
//! 脚本耗尽后保持 Run 的当前状态。所有调用计入 CallLog，便于断言创建、提交次数。

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use crate::llm::traits::{AgentService, ServiceError};
use crate::llm::types::{
    AssistantDefinition, AssistantSpec, ConversationThread, Message, Role, Run, RunError,
    RunStatus, ToolCallRequest, ToolCallResult,
};

/// get_run 依次返回的脚本步骤
#[derive(Clone, Debug)]
pub enum ScriptedStatus {
    Status(RunStatus),
    /// 进入 requires_action，并携带待执行的工具调用
    RequiresAction(Vec<ToolCallRequest>),
    /// 进入 failed，last_error.message 为给定文本
    Failed(String),
    /// 本次查询返回 503，不改变 Run 状态
    TransientError,
}

/// 调用计数
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CallLog {
    pub create_assistant: usize,
    pub get_assistant: usize,
    pub create_thread: usize,
    pub get_thread: usize,
    pub post_message: usize,
    pub create_run: usize,
    pub get_run: usize,
    pub cancel_run: usize,
    /// 每次 submit_tool_outputs 提交的完整批次
    pub submissions: Vec<Vec<ToolCallResult>>,
}

struct RunState {
    thread_id: String,
    assistant_id: String,
    status: RunStatus,
    pending: Option<Vec<ToolCallRequest>>,
    last_error: Option<RunError>,
    replied: bool,
}

impl RunState {
    fn snapshot(&self, id: &str) -> Run {
        Run {
            id: id.to_string(),
            thread_id: self.thread_id.clone(),
            assistant_id: self.assistant_id.clone(),
            status: self.status,
            required_action: match self.status {
                RunStatus::RequiresAction => self.pending.clone(),
                _ => None,
            },
            last_error: self.last_error.clone(),
        }
    }
}

#[derive(Default)]
struct MockState {
    assistants: HashMap<String, AssistantDefinition>,
    threads: HashMap<String, Vec<Message>>,
    runs: HashMap<String, RunState>,
    script: VecDeque<ScriptedStatus>,
    reply: String,
    calls: CallLog,
}

/// 脚本化 Mock 服务
pub struct ScriptedAgentService {
    state: Mutex<MockState>,
}

impl Default for ScriptedAgentService {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedAgentService {
    /// 默认脚本：直接 completed，回复固定文本
    pub fn new() -> Self {
        let state = MockState {
            script: VecDeque::from(vec![ScriptedStatus::Status(RunStatus::Completed)]),
            reply: "Here is a short summary of the latest news.".to_string(),
            ..Default::default()
        };
        Self {
            state: Mutex::new(state),
        }
    }

    pub fn with_script(self, script: Vec<ScriptedStatus>) -> Self {
        self.lock().script = script.into();
        self
    }

    /// Run 完成时追加到线程的 assistant 回复
    pub fn with_reply(self, reply: impl Into<String>) -> Self {
        self.lock().reply = reply.into();
        self
    }

    /// 预置一个已存在的 Assistant（模拟缓存 id 指向的远程资源）
    pub fn with_assistant(self, assistant: AssistantDefinition) -> Self {
        self.lock().assistants.insert(assistant.id.clone(), assistant);
        self
    }

    pub fn with_thread(self, thread_id: impl Into<String>, messages: Vec<Message>) -> Self {
        self.lock().threads.insert(thread_id.into(), messages);
        self
    }

    /// 追加脚本步骤（供同一服务上的后续 Run 使用）
    pub fn push_script(&self, steps: Vec<ScriptedStatus>) {
        self.lock().script.extend(steps);
    }

    pub fn calls(&self) -> CallLog {
        self.lock().calls.clone()
    }

    /// 线程中的消息，按时间顺序
    pub fn thread_messages(&self, thread_id: &str) -> Vec<Message> {
        self.lock().threads.get(thread_id).cloned().unwrap_or_default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn new_id(prefix: &str) -> String {
    format!("{prefix}_{}", Uuid::new_v4().simple())
}

#[async_trait]
impl AgentService for ScriptedAgentService {
    async fn create_assistant(&self, spec: &AssistantSpec) -> Result<AssistantDefinition, ServiceError> {
        let mut state = self.lock();
        state.calls.create_assistant += 1;
        let assistant = AssistantDefinition {
            id: new_id("asst"),
            name: spec.name.clone(),
            instructions: spec.instructions.clone(),
            tools: spec.tools.clone(),
            model: spec.model.clone(),
        };
        state.assistants.insert(assistant.id.clone(), assistant.clone());
        Ok(assistant)
    }

    async fn get_assistant(&self, assistant_id: &str) -> Result<AssistantDefinition, ServiceError> {
        let mut state = self.lock();
        state.calls.get_assistant += 1;
        state
            .assistants
            .get(assistant_id)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(assistant_id.to_string()))
    }

    async fn create_thread(&self) -> Result<ConversationThread, ServiceError> {
        let mut state = self.lock();
        state.calls.create_thread += 1;
        let id = new_id("thread");
        state.threads.insert(id.clone(), Vec::new());
        Ok(ConversationThread {
            id,
            messages: Vec::new(),
        })
    }

    async fn get_thread(&self, thread_id: &str) -> Result<ConversationThread, ServiceError> {
        let mut state = self.lock();
        state.calls.get_thread += 1;
        let messages = state
            .threads
            .get(thread_id)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(thread_id.to_string()))?;
        Ok(ConversationThread {
            id: thread_id.to_string(),
            messages,
        })
    }

    async fn post_message(&self, thread_id: &str, role: Role, content: &str) -> Result<(), ServiceError> {
        let mut state = self.lock();
        state.calls.post_message += 1;
        let messages = state
            .threads
            .get_mut(thread_id)
            .ok_or_else(|| ServiceError::NotFound(thread_id.to_string()))?;
        messages.push(Message {
            role,
            content: content.to_string(),
        });
        Ok(())
    }

    async fn create_run(
        &self,
        thread_id: &str,
        assistant_id: &str,
        _instructions: Option<&str>,
    ) -> Result<Run, ServiceError> {
        let mut state = self.lock();
        state.calls.create_run += 1;
        if !state.threads.contains_key(thread_id) {
            return Err(ServiceError::NotFound(thread_id.to_string()));
        }
        if !state.assistants.contains_key(assistant_id) {
            return Err(ServiceError::NotFound(assistant_id.to_string()));
        }
        let id = new_id("run");
        let run = RunState {
            thread_id: thread_id.to_string(),
            assistant_id: assistant_id.to_string(),
            status: RunStatus::Queued,
            pending: None,
            last_error: None,
            replied: false,
        };
        let snapshot = run.snapshot(&id);
        state.runs.insert(id, run);
        Ok(snapshot)
    }

    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<Run, ServiceError> {
        let mut guard = self.lock();
        let state = &mut *guard;
        state.calls.get_run += 1;
        let run = state
            .runs
            .get_mut(run_id)
            .filter(|r| r.thread_id == thread_id)
            .ok_or_else(|| ServiceError::NotFound(run_id.to_string()))?;

        if !run.status.is_terminal() {
            match state.script.pop_front() {
                Some(ScriptedStatus::TransientError) => {
                    return Err(ServiceError::Status {
                        code: 503,
                        body: "service unavailable".to_string(),
                    });
                }
                Some(ScriptedStatus::RequiresAction(calls)) => {
                    run.status = RunStatus::RequiresAction;
                    run.pending = Some(calls);
                }
                Some(ScriptedStatus::Failed(message)) => {
                    run.status = RunStatus::Failed;
                    run.last_error = Some(RunError {
                        code: "server_error".to_string(),
                        message,
                    });
                }
                Some(ScriptedStatus::Status(status)) => {
                    run.status = status;
                }
                None => {}
            }
        }

        if run.status == RunStatus::Completed && !run.replied {
            run.replied = true;
            if let Some(messages) = state.threads.get_mut(thread_id) {
                messages.push(Message::assistant(state.reply.clone()));
            }
        }
        Ok(run.snapshot(run_id))
    }

    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        results: &[ToolCallResult],
    ) -> Result<(), ServiceError> {
        let mut guard = self.lock();
        let state = &mut *guard;
        let run = state
            .runs
            .get_mut(run_id)
            .filter(|r| r.thread_id == thread_id)
            .ok_or_else(|| ServiceError::NotFound(run_id.to_string()))?;
        if run.status != RunStatus::RequiresAction {
            return Err(ServiceError::Rejected(format!(
                "run {run_id} is {}, not requires_action",
                run.status
            )));
        }
        let pending = run.pending.as_deref().unwrap_or(&[]);
        if pending.len() != results.len()
            || !pending
                .iter()
                .all(|p| results.iter().any(|r| r.tool_call_id == p.id))
        {
            return Err(ServiceError::Rejected(format!(
                "expected outputs for {} tool calls, got {}",
                pending.len(),
                results.len()
            )));
        }
        run.pending = None;
        run.status = RunStatus::InProgress;
        state.calls.submissions.push(results.to_vec());
        Ok(())
    }

    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<(), ServiceError> {
        let mut state = self.lock();
        state.calls.cancel_run += 1;
        let run = state
            .runs
            .get_mut(run_id)
            .filter(|r| r.thread_id == thread_id)
            .ok_or_else(|| ServiceError::NotFound(run_id.to_string()))?;
        if !run.status.is_terminal() {
            run.status = RunStatus::Cancelled;
        }
        Ok(())
    }

    async fn list_messages(&self, thread_id: &str) -> Result<Vec<Message>, ServiceError> {
        let state = self.lock();
        let messages = state
            .threads
            .get(thread_id)
            .ok_or_else(|| ServiceError::NotFound(thread_id.to_string()))?;
        Ok(messages.iter().rev().cloned().collect())
    }
}

//! Assistant 编排器：一次 Run 的完整生命周期
//!
//! 确保 Assistant 与 Thread 存在（首次创建，之后复用）→ 追加用户消息 → 创建 Run
//! → 交给 RunPoller 轮询并处理工具调用 → 返回最终回复文本。
//! 已知 id 缓存在编排器内，并通过 SessionStore 跨进程保存；`reset()` 清除二者。

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::core::events::{send_event, RunEvent};
use crate::core::poller::{PollConfig, RunOutput, RunPoller, Sleeper, TokioSleeper};
use crate::core::session_store::{InMemorySessionStore, SessionIds, SessionStore};
use crate::core::AgentError;
use crate::llm::{
    AgentService, AssistantDefinition, AssistantSpec, ConversationThread, Role, ServiceError,
};
use crate::tools::ToolDispatcher;

pub const DEFAULT_ASSISTANT_NAME: &str = "News Summarizer";
pub const DEFAULT_INSTRUCTIONS: &str = "You are a personal article summarizer Assistant who knows how to take a list of article's titles and descriptions and then write a short summary of all the news articles";
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo-16k";
pub const DEFAULT_RUN_INSTRUCTIONS: &str = "Summarize the news";
pub const DEFAULT_MESSAGE_TEMPLATE: &str = "summarize the news on this topic {topic}?";

/// Assistant 的固定参数与每次 Run 的提示模板
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssistantProfile {
    pub name: String,
    pub instructions: String,
    pub model: String,
    /// 创建 Run 时附带的指令；为空则不传
    pub run_instructions: String,
    /// 用户消息模板，`{topic}` 会被替换为主题
    pub message_template: String,
}

impl Default for AssistantProfile {
    fn default() -> Self {
        Self {
            name: DEFAULT_ASSISTANT_NAME.to_string(),
            instructions: DEFAULT_INSTRUCTIONS.to_string(),
            model: DEFAULT_MODEL.to_string(),
            run_instructions: DEFAULT_RUN_INSTRUCTIONS.to_string(),
            message_template: DEFAULT_MESSAGE_TEMPLATE.to_string(),
        }
    }
}

impl AssistantProfile {
    pub fn message_for(&self, topic: &str) -> String {
        self.message_template.replace("{topic}", topic)
    }
}

/// 顶层编排器
pub struct AssistantOrchestrator {
    service: Arc<dyn AgentService>,
    dispatcher: ToolDispatcher,
    profile: AssistantProfile,
    poll: PollConfig,
    sleeper: Arc<dyn Sleeper>,
    store: Box<dyn SessionStore>,
    /// 配置中给出的 id；SessionStore 中没有记录时使用
    preset: SessionIds,
    assistant: Option<AssistantDefinition>,
    thread: Option<ConversationThread>,
    event_tx: Option<mpsc::UnboundedSender<RunEvent>>,
    cancel: Option<CancellationToken>,
    /// 最近一次保存会话 id 失败的原因；保存成功后清除
    store_error: Option<String>,
}

impl AssistantOrchestrator {
    pub fn new(
        service: Arc<dyn AgentService>,
        dispatcher: ToolDispatcher,
        profile: AssistantProfile,
    ) -> Self {
        Self {
            service,
            dispatcher,
            profile,
            poll: PollConfig::default(),
            sleeper: Arc::new(TokioSleeper),
            store: Box::new(InMemorySessionStore::new()),
            preset: SessionIds::default(),
            assistant: None,
            thread: None,
            event_tx: None,
            cancel: None,
            store_error: None,
        }
    }

    pub fn with_poll_config(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_session_store(mut self, store: Box<dyn SessionStore>) -> Self {
        self.store = store;
        self
    }

    /// 预置已知的 Assistant / Thread id
    pub fn with_known_ids(mut self, assistant_id: Option<String>, thread_id: Option<String>) -> Self {
        self.preset = SessionIds {
            assistant_id,
            thread_id,
            updated_at: None,
        };
        self
    }

    pub fn with_events(mut self, tx: mpsc::UnboundedSender<RunEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn profile(&self) -> &AssistantProfile {
        &self.profile
    }

    pub fn assistant_id(&self) -> Option<&str> {
        self.assistant.as_ref().map(|a| a.id.as_str())
    }

    pub fn thread_id(&self) -> Option<&str> {
        self.thread.as_ref().map(|t| t.id.as_str())
    }

    /// 新建的 id 未能写入 SessionStore 时返回原因（下次启动将无法复用）
    pub fn store_error(&self) -> Option<&str> {
        self.store_error.as_deref()
    }

    /// 返回可用的 Assistant：已缓存则直接复用，否则按已知 id 查询，仍无则新建
    pub async fn ensure_assistant(&mut self) -> Result<AssistantDefinition, AgentError> {
        if let Some(assistant) = &self.assistant {
            return Ok(assistant.clone());
        }

        if let Some(id) = self.known_ids().assistant_id {
            match self.service.get_assistant(&id).await {
                Ok(def) => {
                    self.dispatcher.registry().validate_declared(&def.tools)?;
                    tracing::info!(assistant_id = %def.id, "reusing assistant");
                    send_event(
                        self.event_tx.as_ref(),
                        RunEvent::AssistantReady {
                            assistant_id: def.id.clone(),
                            created: false,
                        },
                    );
                    self.assistant = Some(def.clone());
                    return Ok(def);
                }
                Err(ServiceError::NotFound(_)) => {
                    tracing::warn!(assistant_id = %id, "known assistant no longer exists, creating a new one");
                }
                Err(e) => return Err(e.into()),
            }
        }

        let spec = AssistantSpec {
            name: self.profile.name.clone(),
            instructions: self.profile.instructions.clone(),
            tools: self.dispatcher.registry().definitions(),
            model: self.profile.model.clone(),
        };
        let def = self.service.create_assistant(&spec).await?;
        tracing::info!(assistant_id = %def.id, model = %def.model, "assistant created");
        send_event(
            self.event_tx.as_ref(),
            RunEvent::AssistantReady {
                assistant_id: def.id.clone(),
                created: true,
            },
        );
        self.assistant = Some(def.clone());
        self.persist();
        Ok(def)
    }

    /// 返回可用的 Thread，规则同 ensure_assistant
    pub async fn ensure_thread(&mut self) -> Result<ConversationThread, AgentError> {
        if let Some(thread) = &self.thread {
            return Ok(thread.clone());
        }

        if let Some(id) = self.known_ids().thread_id {
            match self.service.get_thread(&id).await {
                Ok(thread) => {
                    tracing::info!(thread_id = %thread.id, messages = thread.messages.len(), "reusing thread");
                    send_event(
                        self.event_tx.as_ref(),
                        RunEvent::ThreadReady {
                            thread_id: thread.id.clone(),
                            created: false,
                        },
                    );
                    self.thread = Some(thread.clone());
                    return Ok(thread);
                }
                Err(ServiceError::NotFound(_)) => {
                    tracing::warn!(thread_id = %id, "known thread no longer exists, creating a new one");
                }
                Err(e) => return Err(e.into()),
            }
        }

        let thread = self.service.create_thread().await?;
        tracing::info!(thread_id = %thread.id, "thread created");
        send_event(
            self.event_tx.as_ref(),
            RunEvent::ThreadReady {
                thread_id: thread.id.clone(),
                created: true,
            },
        );
        self.thread = Some(thread.clone());
        self.persist();
        Ok(thread)
    }

    /// 对给定主题执行一次完整 Run，返回最新一条消息的文本
    pub async fn run(&mut self, topic: &str) -> Result<String, AgentError> {
        self.run_detailed(topic).await.map(|out| out.text)
    }

    /// 同 run，但返回角色与轮询统计
    pub async fn run_detailed(&mut self, topic: &str) -> Result<RunOutput, AgentError> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(AgentError::InvalidInput("topic must not be empty".into()));
        }

        let assistant = self.ensure_assistant().await?;
        let thread = self.ensure_thread().await?;

        let content = self.profile.message_for(topic);
        self.service
            .post_message(&thread.id, Role::User, &content)
            .await?;

        let instructions = Some(self.profile.run_instructions.as_str()).filter(|s| !s.is_empty());
        let run = self
            .service
            .create_run(&thread.id, &assistant.id, instructions)
            .await?;
        tracing::info!(run_id = %run.id, thread_id = %thread.id, topic = %topic, "run started");
        send_event(
            self.event_tx.as_ref(),
            RunEvent::RunStarted {
                run_id: run.id.clone(),
            },
        );

        let mut poller = RunPoller::new(
            self.service.as_ref(),
            &self.dispatcher,
            &self.poll,
            self.sleeper.as_ref(),
        );
        if let Some(tx) = &self.event_tx {
            poller = poller.with_events(tx);
        }
        if let Some(token) = &self.cancel {
            poller = poller.with_cancel(token.clone());
        }
        let output = poller.wait(&thread.id, &run.id).await?;
        if let Some(reason) = &self.store_error {
            tracing::warn!(reason = %reason, "run completed but session ids were not saved");
        }
        Ok(output)
    }

    /// 丢弃已缓存的 id 并清空 SessionStore，下次 Run 将重新创建 Assistant 与 Thread
    pub fn reset(&mut self) -> Result<(), AgentError> {
        self.assistant = None;
        self.thread = None;
        self.preset = SessionIds::default();
        self.store_error = None;
        self.store.clear()?;
        tracing::info!("session reset");
        Ok(())
    }

    fn known_ids(&self) -> SessionIds {
        let stored = self.store.load().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "ignoring unreadable session store");
            SessionIds::default()
        });
        SessionIds {
            assistant_id: stored.assistant_id.or_else(|| self.preset.assistant_id.clone()),
            thread_id: stored.thread_id.or_else(|| self.preset.thread_id.clone()),
            updated_at: stored.updated_at,
        }
    }

    /// 把已缓存的 id 合并写入 SessionStore；尚未确认的一项保留原记录
    fn persist(&mut self) {
        let mut ids = self.store.load().unwrap_or_default();
        if let Some(assistant) = &self.assistant {
            ids.assistant_id = Some(assistant.id.clone());
        }
        if let Some(thread) = &self.thread {
            ids.thread_id = Some(thread.id.clone());
        }
        ids.updated_at = Some(Utc::now());
        match self.store.save(&ids) {
            Ok(()) => self.store_error = None,
            Err(e) => {
                tracing::warn!(error = %e, "failed to save session ids");
                self.store_error = Some(e.to_string());
            }
        }
    }
}

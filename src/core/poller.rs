//! Run 状态轮询
//!
//! queued / in_progress -> 等待固定间隔后重新查询；
//! requires_action -> 分发工具调用、提交全部结果后立即重新查询；
//! completed -> 取线程中最新一条消息；failed / cancelled / expired -> RunNotCompleted。
//! 等待通过可注入的 Sleeper 完成，测试中无需真实时间；可选最大查询次数、截止时间与取消令牌。

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::core::events::{send_event, RunEvent};
use crate::core::AgentError;
use crate::llm::{AgentService, Role, Run, RunStatus};
use crate::tools::ToolDispatcher;

/// 轮询参数；max_attempts / deadline 为 None 时不设上限
#[derive(Debug, Clone)]
pub struct PollConfig {
    pub interval: Duration,
    pub max_attempts: Option<u32>,
    pub deadline: Option<Duration>,
    /// 单次状态查询连续瞬时失败的最大重试次数
    pub transient_retries: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_attempts: None,
            deadline: None,
            transient_retries: 3,
            backoff_base: Duration::from_millis(500),
            backoff_max: Duration::from_secs(8),
        }
    }
}

impl PollConfig {
    /// 第 attempt 次重试前的等待：base * 2^(attempt-1)，不超过 backoff_max
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.backoff_base
            .saturating_mul(factor)
            .min(self.backoff_max)
    }
}

/// 等待抽象
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// 真实等待（tokio::time::sleep）
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// 立即返回并记录每次等待时长（测试用）
#[derive(Debug, Default)]
pub struct InstantSleeper {
    slept: Mutex<Vec<Duration>>,
}

impl InstantSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.slept.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn total(&self) -> Duration {
        self.sleeps().iter().sum()
    }

    fn record(&self, duration: Duration) {
        if let Ok(mut s) = self.slept.lock() {
            s.push(duration);
        }
    }
}

#[async_trait]
impl Sleeper for InstantSleeper {
    async fn sleep(&self, duration: Duration) {
        self.record(duration);
        tokio::task::yield_now().await;
    }
}

/// Run 完成后的结果：最新消息与轮询统计
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutput {
    pub role: Role,
    pub text: String,
    /// 状态查询次数（不含瞬时失败的重试）
    pub polls: u32,
    /// 处理 requires_action 的次数
    pub dispatch_cycles: u32,
}

/// Run 轮询器
pub struct RunPoller<'a> {
    service: &'a dyn AgentService,
    dispatcher: &'a ToolDispatcher,
    config: &'a PollConfig,
    sleeper: &'a dyn Sleeper,
    cancel: Option<CancellationToken>,
    event_tx: Option<&'a mpsc::UnboundedSender<RunEvent>>,
}

impl<'a> RunPoller<'a> {
    pub fn new(
        service: &'a dyn AgentService,
        dispatcher: &'a ToolDispatcher,
        config: &'a PollConfig,
        sleeper: &'a dyn Sleeper,
    ) -> Self {
        Self {
            service,
            dispatcher,
            config,
            sleeper,
            cancel: None,
            event_tx: None,
        }
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn with_events(mut self, tx: &'a mpsc::UnboundedSender<RunEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// 轮询直到 Run 完成或进入其它终态
    pub async fn wait(&self, thread_id: &str, run_id: &str) -> Result<RunOutput, AgentError> {
        let mut polls = 0u32;
        let mut dispatch_cycles = 0u32;
        let mut waited = Duration::ZERO;

        loop {
            if self.is_cancelled() {
                return self.abort(thread_id, run_id).await;
            }
            if let Some(max) = self.config.max_attempts {
                if polls >= max {
                    return Err(AgentError::PollLimitExceeded { attempts: polls });
                }
            }

            let run = match self.fetch_run(thread_id, run_id, &mut waited).await {
                Err(AgentError::Cancelled) => return self.abort(thread_id, run_id).await,
                other => other?,
            };
            polls += 1;
            tracing::debug!(run_id = %run_id, status = %run.status, poll = polls, "run status");
            send_event(
                self.event_tx,
                RunEvent::Status {
                    run_id: run_id.to_string(),
                    status: run.status,
                    poll: polls,
                },
            );

            match run.status {
                RunStatus::Queued | RunStatus::InProgress | RunStatus::Cancelling => {
                    self.wait_interval(&mut waited).await?;
                }
                RunStatus::RequiresAction => {
                    if run.pending_tool_calls().is_empty() {
                        tracing::warn!(run_id = %run_id, "requires_action without tool calls");
                        self.wait_interval(&mut waited).await?;
                        continue;
                    }
                    dispatch_cycles += 1;
                    self.satisfy_action(&run).await?;
                }
                RunStatus::Completed => {
                    let latest = self
                        .service
                        .list_messages(thread_id)
                        .await?
                        .into_iter()
                        .next()
                        .ok_or_else(|| AgentError::MissingResponse(thread_id.to_string()))?;
                    tracing::info!(run_id = %run_id, polls, dispatch_cycles, "run completed");
                    send_event(
                        self.event_tx,
                        RunEvent::Completed {
                            run_id: run_id.to_string(),
                        },
                    );
                    return Ok(RunOutput {
                        role: latest.role,
                        text: latest.content,
                        polls,
                        dispatch_cycles,
                    });
                }
                RunStatus::Failed | RunStatus::Cancelled | RunStatus::Expired | RunStatus::Incomplete => {
                    let reason = run.last_error.map(|e| e.message);
                    tracing::warn!(run_id = %run_id, status = %run.status, reason = ?reason, "run ended without completing");
                    return Err(AgentError::RunNotCompleted {
                        status: run.status,
                        reason,
                    });
                }
            }
        }
    }

    /// 常规轮询间隔；每次等待前检查截止时间
    async fn wait_interval(&self, waited: &mut Duration) -> Result<(), AgentError> {
        if let Some(deadline) = self.config.deadline {
            if *waited >= deadline {
                return Err(AgentError::DeadlineExceeded { waited: *waited });
            }
        }
        self.pause(self.config.interval, waited).await;
        Ok(())
    }

    /// 查询一次状态；瞬时错误按指数退避重试，超过上限后返回 TransientPoll
    async fn fetch_run(
        &self,
        thread_id: &str,
        run_id: &str,
        waited: &mut Duration,
    ) -> Result<Run, AgentError> {
        let mut failures = 0u32;
        loop {
            match self.service.get_run(thread_id, run_id).await {
                Ok(run) => return Ok(run),
                Err(e) if e.is_transient() && failures < self.config.transient_retries => {
                    failures += 1;
                    let delay = self.config.backoff_delay(failures);
                    tracing::warn!(
                        run_id = %run_id,
                        attempt = failures,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "run status query failed, retrying"
                    );
                    send_event(
                        self.event_tx,
                        RunEvent::PollRetry {
                            attempt: failures,
                            delay_ms: delay.as_millis() as u64,
                            reason: e.to_string(),
                        },
                    );
                    self.pause(delay, waited).await;
                    if self.is_cancelled() {
                        return Err(AgentError::Cancelled);
                    }
                }
                Err(e) if e.is_transient() => {
                    return Err(AgentError::TransientPoll {
                        attempts: failures + 1,
                        message: e.to_string(),
                    });
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// 分发 requires_action 中的全部工具调用并一次性提交结果
    async fn satisfy_action(&self, run: &Run) -> Result<(), AgentError> {
        let requests = run.pending_tool_calls();
        tracing::info!(run_id = %run.id, calls = requests.len(), "dispatching tool calls");
        for request in requests {
            send_event(
                self.event_tx,
                RunEvent::ToolCall {
                    tool_call_id: request.id.clone(),
                    tool: request.name.clone(),
                },
            );
        }

        let outcome = self.dispatcher.dispatch(requests).await;
        let results = match outcome.into_submission() {
            Ok(results) => results,
            Err(e) => {
                // 无法为未知工具提供结果，Run 不会再前进
                if let Err(cancel_err) = self.service.cancel_run(&run.thread_id, &run.id).await {
                    tracing::warn!(run_id = %run.id, error = %cancel_err, "failed to cancel run");
                }
                return Err(e);
            }
        };
        debug_assert_eq!(results.len(), requests.len());

        self.service
            .submit_tool_outputs(&run.thread_id, &run.id, &results)
            .await?;
        tracing::info!(run_id = %run.id, count = results.len(), "tool outputs submitted");
        send_event(
            self.event_tx,
            RunEvent::ToolOutputsSubmitted {
                run_id: run.id.clone(),
                count: results.len(),
            },
        );
        Ok(())
    }

    async fn pause(&self, duration: Duration, waited: &mut Duration) {
        *waited += duration;
        match &self.cancel {
            Some(token) => {
                tokio::select! {
                    _ = token.cancelled() => {}
                    _ = self.sleeper.sleep(duration) => {}
                }
            }
            None => self.sleeper.sleep(duration).await,
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|t| t.is_cancelled())
    }

    async fn abort(&self, thread_id: &str, run_id: &str) -> Result<RunOutput, AgentError> {
        tracing::info!(run_id = %run_id, "cancelling run");
        if let Err(e) = self.service.cancel_run(thread_id, run_id).await {
            tracing::warn!(run_id = %run_id, error = %e, "failed to cancel run");
        }
        Err(AgentError::Cancelled)
    }
}

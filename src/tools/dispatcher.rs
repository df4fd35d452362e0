//! 工具调用分发器
//!
//! 持有 ToolRegistry 与单次调用超时：dispatch 对一批 ToolCallRequest 逐个解析参数并执行，
//! 每个请求恰好产生一个 ToolCallResult，顺序与输入一致；每次调用输出结构化审计日志（JSON）。

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use serde_json::Value;
use tokio::time::timeout;

use crate::core::AgentError;
use crate::llm::{ToolCallRequest, ToolCallResult, ToolOutcome};
use crate::tools::ToolRegistry;

/// 一批工具调用的执行结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub results: Vec<ToolCallResult>,
}

impl DispatchOutcome {
    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// 批次中未知的工具名
    pub fn unknown_tools(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter_map(|r| match &r.outcome {
                ToolOutcome::UnknownTool(name) => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }

    /// 转为可提交的完整结果；含未知工具时整个批次不可提交
    pub fn into_submission(self) -> Result<Vec<ToolCallResult>, AgentError> {
        if let Some(name) = self.unknown_tools().first() {
            return Err(AgentError::UnknownTool(name.to_string()));
        }
        Ok(self.results)
    }
}

/// 工具分发器：对每次调用施加超时，失败吸收为单条结果
pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
    timeout: Duration,
    parallel: bool,
}

impl ToolDispatcher {
    pub fn new(registry: ToolRegistry, timeout_secs: u64) -> Self {
        Self {
            registry: Arc::new(registry),
            timeout: Duration::from_secs(timeout_secs),
            parallel: false,
        }
    }

    /// 并发执行同一批次内的调用（结果顺序不变）
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// 执行一批工具调用；返回结果数量恒等于请求数量
    pub async fn dispatch(&self, requests: &[ToolCallRequest]) -> DispatchOutcome {
        let results = if self.parallel {
            join_all(requests.iter().map(|r| self.execute_one(r))).await
        } else {
            let mut results = Vec::with_capacity(requests.len());
            for request in requests {
                results.push(self.execute_one(request).await);
            }
            results
        };
        DispatchOutcome { results }
    }

    async fn execute_one(&self, request: &ToolCallRequest) -> ToolCallResult {
        let start = Instant::now();
        let args_preview = args_preview(&request.arguments);

        let result = match parse_arguments(&request.arguments) {
            Ok(args) => match timeout(self.timeout, self.registry.invoke(&request.name, args)).await {
                Ok(r) => r,
                Err(_) => Err(AgentError::ToolTimeout(request.name.clone())),
            },
            Err(reason) => Err(AgentError::InvalidToolArguments {
                tool: request.name.clone(),
                reason,
            }),
        };

        let outcome_label = match &result {
            Ok(_) => "ok",
            Err(AgentError::UnknownTool(_)) => "unknown_tool",
            Err(AgentError::ToolTimeout(_)) => "timeout",
            Err(AgentError::InvalidToolArguments { .. }) => "invalid_args",
            Err(_) => "error",
        };
        let duration_ms = start.elapsed().as_millis() as u64;
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": request.name,
            "tool_call_id": request.id,
            "ok": result.is_ok(),
            "outcome": outcome_label,
            "duration_ms": duration_ms,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        let outcome = match result {
            Ok(output) => ToolOutcome::Output(output),
            Err(AgentError::UnknownTool(name)) => ToolOutcome::UnknownTool(name),
            Err(e) => {
                debug_assert!(e.is_tool_local(), "unexpected dispatch error: {e}");
                ToolOutcome::Failed(e.to_string())
            }
        };
        ToolCallResult {
            tool_call_id: request.id.clone(),
            outcome,
        }
    }
}

/// 空参数视为空对象
fn parse_arguments(raw: &str) -> Result<Value, String> {
    if raw.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_str(raw).map_err(|e| format!("malformed JSON arguments: {e}"))
}

fn args_preview(args: &str) -> String {
    if args.chars().count() > 200 {
        format!("{}...", args.chars().take(200).collect::<String>())
    } else {
        args.to_string()
    }
}

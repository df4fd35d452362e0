//! OpenAI Assistants API 客户端（v2）
//!
//! 端点、鉴权头由 async_openai 的 `OpenAIConfig` 给出（可配置 base_url），额外携带 `OpenAI-Beta: assistants=v2`；
//! 请求经 reqwest 发出，以便按 HTTP 状态码区分 NotFound / 5xx。线上 JSON 在本模块内与领域类型互转。

use std::time::Duration;

use async_openai::config::{Config, OpenAIConfig};
use async_trait::async_trait;
use reqwest::header::HeaderValue;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::llm::traits::{AgentService, ServiceError};
use crate::llm::types::{
    AssistantDefinition, AssistantSpec, ConversationThread, Message, Role, Run, RunError,
    RunStatus, ToolCallRequest, ToolCallResult, ToolDefinition,
};

/// OpenAI Assistants 客户端：持有 OpenAIConfig 与带默认头的 reqwest Client
pub struct OpenAiAssistants {
    config: OpenAIConfig,
    client: Client,
}

impl OpenAiAssistants {
    pub fn new(base_url: Option<&str>, api_key: Option<&str>, timeout_secs: u64) -> Self {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_else(|| "sk-placeholder".to_string());

        let config = if let Some(url) = base_url {
            OpenAIConfig::new()
                .with_api_base(url.trim_end_matches('/'))
                .with_api_key(api_key)
        } else {
            OpenAIConfig::new().with_api_key(api_key)
        };

        let mut headers = config.headers();
        headers.insert("openai-beta", HeaderValue::from_static("assistants=v2"));

        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .default_headers(headers)
            .build()
            .unwrap_or_default();

        Self { config, client }
    }

    fn url(&self, path: &str) -> String {
        self.config.url(path)
    }

    /// 发送请求并解码 JSON；404 映射为 NotFound，其余非 2xx 映射为 Status
    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder, what: &str) -> Result<T, ServiceError> {
        let resp = req.send().await.map_err(|e| ServiceError::Transport {
            message: e.to_string(),
            retryable: e.is_timeout() || e.is_connect() || e.is_request(),
        })?;
        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ServiceError::NotFound(what.to_string()));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ServiceError::Status {
                code: status.as_u16(),
                body,
            });
        }
        resp.json::<T>()
            .await
            .map_err(|e| ServiceError::Decode(format!("{what}: {e}")))
    }
}

#[derive(Debug, Deserialize)]
struct WireAssistant {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    instructions: Option<String>,
    #[serde(default)]
    tools: Vec<ToolDefinition>,
    model: String,
}

impl From<WireAssistant> for AssistantDefinition {
    fn from(a: WireAssistant) -> Self {
        Self {
            id: a.id,
            name: a.name.unwrap_or_default(),
            instructions: a.instructions.unwrap_or_default(),
            tools: a.tools,
            model: a.model,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireObject {
    id: String,
}

#[derive(Debug, Deserialize)]
struct WireRun {
    id: String,
    thread_id: String,
    assistant_id: String,
    status: RunStatus,
    #[serde(default)]
    required_action: Option<WireRequiredAction>,
    #[serde(default)]
    last_error: Option<WireRunError>,
}

#[derive(Debug, Deserialize)]
struct WireRequiredAction {
    submit_tool_outputs: WireSubmitToolOutputs,
}

#[derive(Debug, Deserialize)]
struct WireSubmitToolOutputs {
    tool_calls: Vec<WireToolCall>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    id: String,
    function: WireFunctionCall,
}

#[derive(Debug, Deserialize)]
struct WireFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct WireRunError {
    code: String,
    message: String,
}

impl From<WireRun> for Run {
    fn from(r: WireRun) -> Self {
        Self {
            id: r.id,
            thread_id: r.thread_id,
            assistant_id: r.assistant_id,
            status: r.status,
            required_action: r.required_action.map(|a| {
                a.submit_tool_outputs
                    .tool_calls
                    .into_iter()
                    .map(|c| ToolCallRequest::new(c.id, c.function.name, c.function.arguments))
                    .collect()
            }),
            last_error: r.last_error.map(|e| RunError {
                code: e.code,
                message: e.message,
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireList<T> {
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    role: Role,
    #[serde(default)]
    content: Vec<WireContent>,
}

/// 消息内容块；只取 text 类型
#[derive(Debug, Deserialize)]
struct WireContent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<WireText>,
}

#[derive(Debug, Deserialize)]
struct WireText {
    value: String,
}

impl From<WireMessage> for Message {
    fn from(m: WireMessage) -> Self {
        let content = m
            .content
            .into_iter()
            .filter(|c| c.kind == "text")
            .filter_map(|c| c.text.map(|t| t.value))
            .collect::<Vec<_>>()
            .join("\n");
        Self {
            role: m.role,
            content,
        }
    }
}

#[derive(Debug, Serialize)]
struct WireToolOutput<'a> {
    tool_call_id: &'a str,
    output: String,
}

#[async_trait]
impl AgentService for OpenAiAssistants {
    async fn create_assistant(&self, spec: &AssistantSpec) -> Result<AssistantDefinition, ServiceError> {
        let body = json!({
            "name": spec.name,
            "instructions": spec.instructions,
            "tools": spec.tools,
            "model": spec.model,
        });
        let req = self.client.post(self.url("/assistants")).json(&body);
        let wire: WireAssistant = self.send(req, "assistant").await?;
        Ok(wire.into())
    }

    async fn get_assistant(&self, assistant_id: &str) -> Result<AssistantDefinition, ServiceError> {
        let req = self.client.get(self.url(&format!("/assistants/{assistant_id}")));
        let wire: WireAssistant = self.send(req, assistant_id).await?;
        Ok(wire.into())
    }

    async fn create_thread(&self) -> Result<ConversationThread, ServiceError> {
        let req = self.client.post(self.url("/threads")).json(&json!({}));
        let wire: WireObject = self.send(req, "thread").await?;
        Ok(ConversationThread {
            id: wire.id,
            messages: Vec::new(),
        })
    }

    async fn get_thread(&self, thread_id: &str) -> Result<ConversationThread, ServiceError> {
        let req = self.client.get(self.url(&format!("/threads/{thread_id}")));
        let wire: WireObject = self.send(req, thread_id).await?;
        let req = self
            .client
            .get(self.url(&format!("/threads/{thread_id}/messages")))
            .query(&[("order", "asc"), ("limit", "100")]);
        let list: WireList<WireMessage> = self.send(req, thread_id).await?;
        Ok(ConversationThread {
            id: wire.id,
            messages: list.data.into_iter().map(Message::from).collect(),
        })
    }

    async fn post_message(&self, thread_id: &str, role: Role, content: &str) -> Result<(), ServiceError> {
        let req = self
            .client
            .post(self.url(&format!("/threads/{thread_id}/messages")))
            .json(&json!({ "role": role, "content": content }));
        let _: WireObject = self.send(req, thread_id).await?;
        Ok(())
    }

    async fn create_run(
        &self,
        thread_id: &str,
        assistant_id: &str,
        instructions: Option<&str>,
    ) -> Result<Run, ServiceError> {
        let mut body = json!({ "assistant_id": assistant_id });
        if let Some(instructions) = instructions {
            body["instructions"] = json!(instructions);
        }
        let req = self
            .client
            .post(self.url(&format!("/threads/{thread_id}/runs")))
            .json(&body);
        let wire: WireRun = self.send(req, thread_id).await?;
        Ok(wire.into())
    }

    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<Run, ServiceError> {
        let req = self
            .client
            .get(self.url(&format!("/threads/{thread_id}/runs/{run_id}")));
        let wire: WireRun = self.send(req, run_id).await?;
        Ok(wire.into())
    }

    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        results: &[ToolCallResult],
    ) -> Result<(), ServiceError> {
        let tool_outputs: Vec<WireToolOutput<'_>> = results
            .iter()
            .map(|r| WireToolOutput {
                tool_call_id: &r.tool_call_id,
                output: r.wire_output(),
            })
            .collect();
        let req = self
            .client
            .post(self.url(&format!(
                "/threads/{thread_id}/runs/{run_id}/submit_tool_outputs"
            )))
            .json(&json!({ "tool_outputs": tool_outputs }));
        let _: WireRun = self.send(req, run_id).await?;
        Ok(())
    }

    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<(), ServiceError> {
        let req = self
            .client
            .post(self.url(&format!("/threads/{thread_id}/runs/{run_id}/cancel")));
        let _: WireRun = self.send(req, run_id).await?;
        Ok(())
    }

    async fn list_messages(&self, thread_id: &str) -> Result<Vec<Message>, ServiceError> {
        let req = self
            .client
            .get(self.url(&format!("/threads/{thread_id}/messages")))
            .query(&[("order", "desc")]);
        let list: WireList<WireMessage> = self.send(req, thread_id).await?;
        Ok(list.data.into_iter().map(Message::from).collect())
    }
}

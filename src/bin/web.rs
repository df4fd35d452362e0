//! Newsdesk Web 表单
//!
//! 启动: cargo run --bin newsdesk-web --features web
//! 浏览器访问 http://127.0.0.1:8080（监听地址可通过 NEWSDESK_WEB_ADDR 修改）
//!
//! - GET  /               输入主题的表单
//! - POST /summarize      表单提交，返回 HTML 摘要
//! - POST /api/summarize  JSON `{"topic": "..."}` -> `{"summary": "..."}`

#[cfg(feature = "web")]
mod server {
    use std::sync::Arc;

    use axum::{
        extract::State,
        http::StatusCode,
        response::{Html, IntoResponse, Response},
        routing::{get, post},
        Form, Json, Router,
    };
    use newsdesk::{AgentError, AssistantOrchestrator};
    use serde::{Deserialize, Serialize};
    use tokio::sync::Mutex;

    /// 同一时间只允许一个 Run 使用该线程
    pub struct AppState {
        pub orchestrator: Mutex<AssistantOrchestrator>,
    }

    #[derive(Deserialize)]
    pub struct TopicForm {
        #[serde(default)]
        topic: String,
    }

    #[derive(Serialize)]
    struct SummaryBody {
        topic: String,
        summary: String,
    }

    #[derive(Serialize)]
    struct ErrorBody {
        error: String,
    }

    pub fn router(state: Arc<AppState>) -> Router {
        Router::new()
            .route("/", get(index))
            .route("/summarize", post(summarize_form))
            .route("/api/summarize", post(api_summarize))
            .with_state(state)
    }

    fn status_for(err: &AgentError) -> StatusCode {
        match err {
            AgentError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AgentError::RunNotCompleted { .. }
            | AgentError::Service(_)
            | AgentError::TransientPoll { .. } => StatusCode::BAD_GATEWAY,
            AgentError::PollLimitExceeded { .. } | AgentError::DeadlineExceeded { .. } => {
                StatusCode::GATEWAY_TIMEOUT
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    async fn summarize(state: &AppState, topic: &str) -> Result<String, AgentError> {
        let mut orchestrator = state.orchestrator.lock().await;
        orchestrator.run(topic).await
    }

    const FORM: &str = r#"<form method="post" action="/summarize">
<label for="topic">Enter topic:</label>
<input id="topic" name="topic" type="text" value="{topic}" autofocus>
<button type="submit">Run Assistant</button>
</form>"#;

    fn page(topic: &str, body: &str) -> Html<String> {
        let form = FORM.replace("{topic}", &html_escape::encode_double_quoted_attribute(topic));
        Html(format!(
            "<!doctype html>\n<html><head><meta charset=\"utf-8\"><title>News Summarizer</title></head>\n<body>\n<h1>News Summarizer</h1>\n{form}\n{body}\n</body></html>"
        ))
    }

    async fn index() -> Html<String> {
        page("", "")
    }

    async fn summarize_form(State(state): State<Arc<AppState>>, Form(form): Form<TopicForm>) -> Response {
        match summarize(&state, &form.topic).await {
            Ok(summary) => {
                let body = format!(
                    "<h2>Summary</h2>\n<pre>{}</pre>",
                    html_escape::encode_text(&summary)
                );
                page(&form.topic, &body).into_response()
            }
            Err(e) => {
                tracing::warn!(error = %e, "summarize failed");
                let body = format!(
                    "<p class=\"error\">{}</p>",
                    html_escape::encode_text(&e.to_string())
                );
                (status_for(&e), page(&form.topic, &body)).into_response()
            }
        }
    }

    async fn api_summarize(State(state): State<Arc<AppState>>, Json(req): Json<TopicForm>) -> Response {
        match summarize(&state, &req.topic).await {
            Ok(summary) => Json(SummaryBody {
                topic: req.topic.trim().to_string(),
                summary,
            })
            .into_response(),
            Err(e) => {
                tracing::warn!(error = %e, "summarize failed");
                (
                    status_for(&e),
                    Json(ErrorBody {
                        error: e.to_string(),
                    }),
                )
                    .into_response()
            }
        }
    }
}

#[cfg(feature = "web")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use std::sync::Arc;

    use anyhow::Context;
    use newsdesk::agent::create_orchestrator;
    use newsdesk::config::load_config;

    newsdesk::observability::init();

    let cfg = load_config(None).context("Failed to load config")?;
    let orchestrator = create_orchestrator(&cfg).context("Failed to create orchestrator")?;
    let state = Arc::new(server::AppState {
        orchestrator: tokio::sync::Mutex::new(orchestrator),
    });

    let addr = std::env::var("NEWSDESK_WEB_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!("Newsdesk web listening on http://{}", addr);
    axum::serve(listener, server::router(state)).await?;
    Ok(())
}

#[cfg(not(feature = "web"))]
fn main() {
    eprintln!("请使用 --features web 编译: cargo run --bin newsdesk-web --features web");
    std::process::exit(1);
}

//! HTTP 客户端集成测试：OpenAiAssistants 与 NewsApiProvider 对接 wiremock 服务器

use std::sync::Arc;
use std::time::Duration;

use newsdesk::core::{AgentError, AssistantOrchestrator, AssistantProfile, InstantSleeper};
use newsdesk::llm::{
    AgentService, OpenAiAssistants, Role, RunStatus, ServiceError, ToolCallResult,
};
use newsdesk::tools::{NewsApiProvider, NewsProvider, NewsTool, ToolDispatcher, ToolRegistry};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn news_body() -> serde_json::Value {
    json!({
        "status": "ok",
        "totalResults": 2,
        "articles": [
            {
                "source": { "id": null, "name": "Coin Daily" },
                "author": "Jane Doe",
                "title": "Bitcoin tops 70k",
                "description": "Prices climbed overnight.",
                "url": "https://coin.example/70k",
                "content": "..."
            },
            {
                "source": { "id": null, "name": "Ledger News" },
                "author": null,
                "title": "Miners brace for halving",
                "description": "Rewards will be cut in half.",
                "url": "https://ledger.example/halving",
                "content": null
            }
        ]
    })
}

fn run_json(status: &str) -> serde_json::Value {
    json!({
        "id": "run_1",
        "object": "thread.run",
        "thread_id": "thread_1",
        "assistant_id": "asst_1",
        "status": status,
        "required_action": null,
        "last_error": null
    })
}

#[tokio::test]
async fn news_provider_queries_everything_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/everything"))
        .and(query_param("q", "bitcoin"))
        .and(query_param("pageSize", "5"))
        .and(query_param("apiKey", "news-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(news_body()))
        .expect(1)
        .mount(&server)
        .await;

    let provider = NewsApiProvider::new(&format!("{}/v2", server.uri()), "news-key", 5, 5);
    let articles = provider.lookup("bitcoin").await.unwrap();

    assert_eq!(articles.len(), 2);
    assert_eq!(articles[0].source.as_deref(), Some("Coin Daily"));
    assert_eq!(articles[1].author, None);
    assert!(articles[1].display().contains("Author: N/A,\n"));
}

#[tokio::test]
async fn news_provider_non_success_yields_empty_list() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/everything"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "status": "error",
            "code": "apiKeyInvalid"
        })))
        .mount(&server)
        .await;

    let provider = NewsApiProvider::new(&server.uri(), "bad", 5, 5);
    assert!(provider.lookup("bitcoin").await.unwrap().is_empty());
}

#[tokio::test]
async fn news_provider_undecodable_body_is_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/everything"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let provider = NewsApiProvider::new(&server.uri(), "key", 5, 5);
    assert!(provider.lookup("bitcoin").await.is_err());
}

#[tokio::test]
async fn assistants_client_sends_beta_header_and_maps_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/assistants/asst_missing"))
        .and(header("openai-beta", "assistants=v2"))
        .and(header("authorization", "Bearer sk-test"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": { "message": "No assistant found" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = OpenAiAssistants::new(Some(&server.uri()), Some("sk-test"), 5);
    let err = client.get_assistant("asst_missing").await.unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
}

#[tokio::test]
async fn assistants_client_server_error_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/threads/thread_1/runs/run_1"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let client = OpenAiAssistants::new(Some(&server.uri()), Some("sk-test"), 5);
    let err = client.get_run("thread_1", "run_1").await.unwrap_err();
    assert_eq!(
        err,
        ServiceError::Status {
            code: 503,
            body: "overloaded".into()
        }
    );
    assert!(err.is_transient());
}

#[tokio::test]
async fn assistants_client_submits_outputs_and_lists_messages() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/threads/thread_1/runs/run_1/submit_tool_outputs"))
        .and(body_partial_json(json!({
            "tool_outputs": [
                { "tool_call_id": "call_1", "output": "articles" },
                { "tool_call_id": "call_2", "output": "Error: provider down" }
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(run_json("queued")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/threads/thread_1/messages"))
        .and(query_param("order", "desc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "object": "list",
            "data": [
                { "id": "msg_2", "role": "assistant", "content": [
                    { "type": "text", "text": { "value": "Summary text", "annotations": [] } }
                ]},
                { "id": "msg_1", "role": "user", "content": [
                    { "type": "text", "text": { "value": "summarize the news on this topic bitcoin?", "annotations": [] } }
                ]}
            ]
        })))
        .mount(&server)
        .await;

    let client = OpenAiAssistants::new(Some(&server.uri()), Some("sk-test"), 5);
    client
        .submit_tool_outputs(
            "thread_1",
            "run_1",
            &[
                ToolCallResult::output("call_1", "articles"),
                ToolCallResult::failed("call_2", "provider down"),
            ],
        )
        .await
        .unwrap();

    let messages = client.list_messages("thread_1").await.unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, Role::Assistant);
    assert_eq!(messages[0].content, "Summary text");
}

/// 完整流程：OpenAI 与 NewsAPI 均由 wiremock 模拟
#[tokio::test]
async fn full_run_against_mock_servers() {
    let openai = MockServer::start().await;
    let news = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/everything"))
        .and(query_param("q", "bitcoin"))
        .respond_with(ResponseTemplate::new(200).set_body_json(news_body()))
        .expect(1)
        .mount(&news)
        .await;

    Mock::given(method("POST"))
        .and(path("/assistants"))
        .and(body_partial_json(json!({
            "name": "News Summarizer",
            "model": "gpt-3.5-turbo-16k",
            "tools": [{ "type": "function", "function": { "name": "get_news" } }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "asst_1",
            "object": "assistant",
            "name": "News Summarizer",
            "model": "gpt-3.5-turbo-16k",
            "instructions": "summarize",
            "tools": []
        })))
        .expect(1)
        .mount(&openai)
        .await;
    Mock::given(method("POST"))
        .and(path("/threads"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "thread_1", "object": "thread" })))
        .expect(1)
        .mount(&openai)
        .await;
    Mock::given(method("POST"))
        .and(path("/threads/thread_1/messages"))
        .and(body_partial_json(json!({
            "role": "user",
            "content": "summarize the news on this topic bitcoin?"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "msg_1" })))
        .expect(1)
        .mount(&openai)
        .await;
    Mock::given(method("POST"))
        .and(path("/threads/thread_1/runs"))
        .and(body_partial_json(json!({
            "assistant_id": "asst_1",
            "instructions": "Summarize the news"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(run_json("queued")))
        .expect(1)
        .mount(&openai)
        .await;

    let mut requires_action = run_json("requires_action");
    requires_action["required_action"] = json!({
        "type": "submit_tool_outputs",
        "submit_tool_outputs": {
            "tool_calls": [{
                "id": "call_1",
                "type": "function",
                "function": { "name": "get_news", "arguments": "{\"topic\":\"bitcoin\"}" }
            }]
        }
    });
    Mock::given(method("GET"))
        .and(path("/threads/thread_1/runs/run_1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(requires_action))
        .up_to_n_times(1)
        .mount(&openai)
        .await;
    Mock::given(method("GET"))
        .and(path("/threads/thread_1/runs/run_1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(run_json("completed")))
        .mount(&openai)
        .await;
    Mock::given(method("POST"))
        .and(path("/threads/thread_1/runs/run_1/submit_tool_outputs"))
        .and(body_partial_json(json!({
            "tool_outputs": [{ "tool_call_id": "call_1" }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(run_json("queued")))
        .expect(1)
        .mount(&openai)
        .await;
    Mock::given(method("GET"))
        .and(path("/threads/thread_1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "id": "msg_2", "role": "assistant", "content": [
                { "type": "text", "text": { "value": "Bitcoin climbed while miners prepare for the halving.", "annotations": [] } }
            ]}]
        })))
        .mount(&openai)
        .await;

    let service = Arc::new(OpenAiAssistants::new(Some(&openai.uri()), Some("sk-test"), 5));
    let provider = Arc::new(NewsApiProvider::new(&news.uri(), "news-key", 5, 5));
    let mut registry = ToolRegistry::new();
    registry.register(NewsTool::new(provider));
    let mut orchestrator =
        AssistantOrchestrator::new(service, ToolDispatcher::new(registry, 5), AssistantProfile::default())
            .with_sleeper(Arc::new(InstantSleeper::new()));

    let output = orchestrator.run_detailed("bitcoin").await.unwrap();
    assert_eq!(output.text, "Bitcoin climbed while miners prepare for the halving.");
    assert_eq!(output.dispatch_cycles, 1);
    assert_eq!(output.polls, 2);
}

#[tokio::test]
async fn failed_run_surfaces_last_error() {
    let server = MockServer::start().await;
    let mut failed = run_json("failed");
    failed["last_error"] = json!({ "code": "rate_limit_exceeded", "message": "You exceeded your quota" });
    Mock::given(method("GET"))
        .and(path("/assistants/asst_1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "asst_1", "model": "gpt-3.5-turbo-16k", "tools": []
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/threads"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "thread_1" })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/threads/thread_1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "msg_1" })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/threads/thread_1/runs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(run_json("queued")))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/threads/thread_1/runs/run_1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(failed))
        .mount(&server)
        .await;

    let service = Arc::new(OpenAiAssistants::new(Some(&server.uri()), Some("sk-test"), 5));
    let sleeper = Arc::new(InstantSleeper::new());
    let mut orchestrator = AssistantOrchestrator::new(
        service,
        ToolDispatcher::new(ToolRegistry::new(), 5),
        AssistantProfile::default(),
    )
    .with_known_ids(Some("asst_1".into()), None)
    .with_sleeper(sleeper.clone());

    let err = orchestrator.run("bitcoin").await.unwrap_err();
    match err {
        AgentError::RunNotCompleted { status, reason } => {
            assert_eq!(status, RunStatus::Failed);
            assert_eq!(reason.as_deref(), Some("You exceeded your quota"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(sleeper.total(), Duration::ZERO);
}

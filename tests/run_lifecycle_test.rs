//! Run 生命周期集成测试：脚本化服务 + 固定新闻源 + 即时 Sleeper

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use newsdesk::agent::create_orchestrator_with;
use newsdesk::config::AppConfig;
use newsdesk::core::{
    AgentError, AssistantOrchestrator, AssistantProfile, InstantSleeper, PollConfig, RunEvent,
    Sleeper,
};
use newsdesk::llm::{RunStatus, ScriptedAgentService, ScriptedStatus, ToolCallRequest, ToolOutcome};
use newsdesk::tools::{format_articles, Article, NewsProvider, NewsTool, ToolDispatcher, ToolRegistry};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// 按主题返回固定文章；主题 "offline" 模拟服务故障
struct TopicNews;

#[async_trait]
impl NewsProvider for TopicNews {
    async fn lookup(&self, topic: &str) -> Result<Vec<Article>, String> {
        if topic == "offline" {
            return Err("news provider unreachable".into());
        }
        Ok(articles_for(topic))
    }
}

fn articles_for(topic: &str) -> Vec<Article> {
    (1..=3)
        .map(|i| Article {
            source: Some("Wire".into()),
            author: Some(format!("Reporter {i}")),
            title: Some(format!("{topic} story {i}")),
            description: Some(format!("Details on {topic} #{i}")),
            url: Some(format!("https://wire.example/{topic}/{i}")),
            content: None,
        })
        .collect()
}

fn orchestrator(svc: Arc<ScriptedAgentService>, parallel: bool) -> AssistantOrchestrator {
    let mut registry = ToolRegistry::new();
    registry.register(NewsTool::new(Arc::new(TopicNews)));
    AssistantOrchestrator::new(
        svc,
        ToolDispatcher::new(registry, 5).with_parallel(parallel),
        AssistantProfile::default(),
    )
    .with_sleeper(Arc::new(InstantSleeper::new()))
}

fn news_call(id: &str, topic: &str) -> ToolCallRequest {
    ToolCallRequest::new(id, "get_news", format!(r#"{{"topic":"{topic}"}}"#))
}

#[tokio::test]
async fn batch_results_follow_request_order() {
    for parallel in [false, true] {
        let svc = Arc::new(ScriptedAgentService::new().with_script(vec![
            ScriptedStatus::RequiresAction(vec![
                news_call("call_a", "rust"),
                news_call("call_b", "offline"),
                ToolCallRequest::new("call_c", "get_news", "not json"),
                news_call("call_d", "tokio"),
            ]),
            ScriptedStatus::Status(RunStatus::Completed),
        ]));
        let mut orch = orchestrator(svc.clone(), parallel);
        orch.run("weekly roundup").await.unwrap();

        let calls = svc.calls();
        assert_eq!(calls.submissions.len(), 1);
        let batch = &calls.submissions[0];
        let ids: Vec<&str> = batch.iter().map(|r| r.tool_call_id.as_str()).collect();
        assert_eq!(ids, ["call_a", "call_b", "call_c", "call_d"]);
        assert_eq!(batch[0].outcome, ToolOutcome::Output(format_articles(&articles_for("rust"))));
        assert!(matches!(&batch[1].outcome, ToolOutcome::Failed(r) if r.contains("unreachable")));
        assert!(matches!(batch[2].outcome, ToolOutcome::Failed(_)));
        assert_eq!(batch[3].outcome, ToolOutcome::Output(format_articles(&articles_for("tokio"))));
    }
}

#[tokio::test]
async fn multiple_action_cycles_each_submit_once() {
    let svc = Arc::new(
        ScriptedAgentService::new()
            .with_reply("Two rounds of research done.")
            .with_script(vec![
                ScriptedStatus::Status(RunStatus::InProgress),
                ScriptedStatus::RequiresAction(vec![news_call("call_1", "bitcoin")]),
                ScriptedStatus::Status(RunStatus::InProgress),
                ScriptedStatus::RequiresAction(vec![news_call("call_2", "ethereum"), news_call("call_3", "solana")]),
                ScriptedStatus::Status(RunStatus::Completed),
            ]),
    );
    let mut orch = orchestrator(svc.clone(), false);
    let out = orch.run_detailed("crypto").await.unwrap();

    assert_eq!(out.text, "Two rounds of research done.");
    assert_eq!(out.dispatch_cycles, 2);
    let calls = svc.calls();
    assert_eq!(calls.submissions.len(), 2);
    assert_eq!(calls.submissions[0].len(), 1);
    assert_eq!(calls.submissions[1].len(), 2);
}

#[tokio::test]
async fn expired_and_incomplete_runs_are_not_completed() {
    for status in [RunStatus::Expired, RunStatus::Incomplete, RunStatus::Cancelled] {
        let svc = Arc::new(
            ScriptedAgentService::new().with_script(vec![
                ScriptedStatus::Status(RunStatus::Queued),
                ScriptedStatus::Status(status),
            ]),
        );
        let mut orch = orchestrator(svc.clone(), false);
        let err = orch.run("bitcoin").await.unwrap_err();
        assert!(
            matches!(err, AgentError::RunNotCompleted { status: s, .. } if s == status),
            "unexpected error for {status}: {err}"
        );
        assert!(svc.calls().submissions.is_empty());
    }
}

#[tokio::test]
async fn unknown_tool_aborts_without_partial_submission() {
    let svc = Arc::new(ScriptedAgentService::new().with_script(vec![ScriptedStatus::RequiresAction(vec![
        news_call("call_1", "bitcoin"),
        ToolCallRequest::new("call_2", "get_stock_price", r#"{"ticker":"MSFT"}"#),
    ])]));
    let mut orch = orchestrator(svc.clone(), false);
    let err = orch.run("markets").await.unwrap_err();

    assert!(matches!(err, AgentError::UnknownTool(ref n) if n == "get_stock_price"));
    assert!(svc.calls().submissions.is_empty());
}

#[tokio::test]
async fn events_trace_the_whole_lifecycle() {
    let svc = Arc::new(ScriptedAgentService::new().with_script(vec![
        ScriptedStatus::Status(RunStatus::Queued),
        ScriptedStatus::RequiresAction(vec![news_call("call_1", "bitcoin")]),
        ScriptedStatus::Status(RunStatus::Completed),
    ]));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut orch = orchestrator(svc, false).with_events(tx);
    orch.run("bitcoin").await.unwrap();
    drop(orch);

    let mut kinds = Vec::new();
    while let Some(ev) = rx.recv().await {
        let value = serde_json::to_value(&ev).unwrap();
        kinds.push(value["type"].as_str().unwrap().to_string());
    }
    assert_eq!(
        kinds,
        [
            "assistant_ready",
            "thread_ready",
            "run_started",
            "status",
            "status",
            "tool_call",
            "tool_outputs_submitted",
            "status",
            "completed"
        ]
    );
}

#[tokio::test]
async fn transient_errors_emit_retry_events() {
    let svc = Arc::new(ScriptedAgentService::new().with_script(vec![
        ScriptedStatus::TransientError,
        ScriptedStatus::Status(RunStatus::Completed),
    ]));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut orch = orchestrator(svc, false).with_events(tx);
    orch.run("bitcoin").await.unwrap();
    drop(orch);

    let mut retries = Vec::new();
    while let Some(ev) = rx.recv().await {
        if let RunEvent::PollRetry { attempt, delay_ms, .. } = ev {
            retries.push((attempt, delay_ms));
        }
    }
    assert_eq!(retries, [(1, 500)]);
}

/// 第一次等待时触发取消
struct CancellingSleeper(CancellationToken);

#[async_trait]
impl Sleeper for CancellingSleeper {
    async fn sleep(&self, _duration: Duration) {
        self.0.cancel();
    }
}

#[tokio::test]
async fn cancellation_during_polling_cancels_remote_run() {
    let svc = Arc::new(
        ScriptedAgentService::new().with_script(vec![ScriptedStatus::Status(RunStatus::InProgress)]),
    );
    let token = CancellationToken::new();
    let mut orch = orchestrator(svc.clone(), false)
        .with_sleeper(Arc::new(CancellingSleeper(token.clone())))
        .with_cancel(token);

    let err = orch.run("bitcoin").await.unwrap_err();
    assert!(matches!(err, AgentError::Cancelled));
    let calls = svc.calls();
    assert_eq!(calls.get_run, 1);
    assert_eq!(calls.cancel_run, 1);
}

#[tokio::test]
async fn poll_limit_from_config_is_honoured() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = AppConfig::default();
    cfg.app.session_file = dir.path().join("session.json");
    cfg.run.max_poll_attempts = Some(4);

    let svc = Arc::new(
        ScriptedAgentService::new().with_script(vec![ScriptedStatus::Status(RunStatus::Queued)]),
    );
    let sleeper = Arc::new(InstantSleeper::new());
    let mut orch = create_orchestrator_with(&cfg, svc.clone(), Arc::new(TopicNews))
        .with_sleeper(sleeper.clone());

    let err = orch.run("bitcoin").await.unwrap_err();
    assert!(matches!(err, AgentError::PollLimitExceeded { attempts: 4 }));
    assert_eq!(svc.calls().get_run, 4);
    assert_eq!(sleeper.sleeps(), vec![Duration::from_secs(5); 4]);
}

#[tokio::test]
async fn deadline_counts_only_poller_sleeps() {
    let svc = Arc::new(
        ScriptedAgentService::new().with_script(vec![ScriptedStatus::Status(RunStatus::InProgress)]),
    );
    let poll = PollConfig {
        interval: Duration::from_secs(2),
        deadline: Some(Duration::from_secs(7)),
        ..PollConfig::default()
    };
    let mut orch = orchestrator(svc.clone(), false).with_poll_config(poll);

    let err = orch.run("bitcoin").await.unwrap_err();
    match err {
        AgentError::DeadlineExceeded { waited } => assert_eq!(waited, Duration::from_secs(8)),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(svc.calls().get_run, 5);
}

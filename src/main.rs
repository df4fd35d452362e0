//! Newsdesk 命令行入口
//!
//! 用法: newsdesk [TOPIC] [--config PATH] [--reset] [--progress]
//! 省略 TOPIC 时从标准输入读取；Ctrl-C 会取消远程 Run。

use std::io::{BufRead, Write};
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use newsdesk::agent::create_orchestrator;
use newsdesk::config::load_config;
use newsdesk::core::RunEvent;
use newsdesk::observability;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(name = "newsdesk", version, about = "Summarize the latest news on a topic with an OpenAI assistant")]
struct Cli {
    /// 新闻主题，如 bitcoin
    topic: Option<String>,

    /// 额外的 TOML 配置文件（覆盖 config/default.toml）
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 丢弃已保存的 Assistant / Thread id，重新创建
    #[arg(long)]
    reset: bool,

    /// 在 stderr 输出 Run 进度
    #[arg(long)]
    progress: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    observability::init();

    let cfg = load_config(cli.config.clone()).context("Failed to load config")?;
    let mut orchestrator = create_orchestrator(&cfg).context("Failed to create orchestrator")?;

    if cli.reset {
        orchestrator.reset().context("Failed to reset session")?;
    }

    let topic = match cli.topic {
        Some(t) => t,
        None => prompt_topic().context("Failed to read topic")?,
    };

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received");
            ctrl_c.cancel();
        }
    });
    orchestrator = orchestrator.with_cancel(cancel);

    if cli.progress {
        let (tx, rx) = mpsc::unbounded_channel();
        orchestrator = orchestrator.with_events(tx);
        tokio::spawn(print_progress(rx));
    }

    let summary = orchestrator
        .run(&topic)
        .await
        .with_context(|| format!("Run for topic '{}' failed", topic.trim()))?;
    println!("{summary}");
    if let Some(reason) = orchestrator.store_error() {
        eprintln!("warning: session ids were not saved ({reason}); the next run will create new ones");
    }
    Ok(())
}

fn prompt_topic() -> anyhow::Result<String> {
    eprint!("Enter topic: ");
    std::io::stderr().flush()?;
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

async fn print_progress(mut rx: mpsc::UnboundedReceiver<RunEvent>) {
    while let Some(ev) = rx.recv().await {
        let line = match ev {
            RunEvent::AssistantReady { assistant_id, created } => {
                format!("assistant {assistant_id} ({})", if created { "created" } else { "reused" })
            }
            RunEvent::ThreadReady { thread_id, created } => {
                format!("thread {thread_id} ({})", if created { "created" } else { "reused" })
            }
            RunEvent::RunStarted { run_id } => format!("run {run_id} started"),
            RunEvent::Status { status, poll, .. } => format!("status: {status} (check {poll})"),
            RunEvent::PollRetry { attempt, delay_ms, reason } => {
                format!("status check failed ({reason}), retry {attempt} in {delay_ms} ms")
            }
            RunEvent::ToolCall { tool, tool_call_id } => format!("calling {tool} [{tool_call_id}]"),
            RunEvent::ToolOutputsSubmitted { count, .. } => format!("submitted {count} tool output(s)"),
            RunEvent::Completed { .. } => "completed".to_string(),
        };
        eprintln!("> {line}");
    }
}

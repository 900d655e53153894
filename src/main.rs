//! Scout - 多智能体研究助手
//!
//! 入口：`scout run "<目标>"` 在进程内运行控制循环（挂起时在终端逐项审批）；
//! `scout serve` 启动 SSE 流式 HTTP 服务。

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use scout::agent::{create_runtime, Runtime};
use scout::config::load_config;
use scout::graph::{new_thread_id, NodeMessage, RunOutcome};
use scout::store::{Decision, PendingInterrupt};

#[derive(Parser)]
#[command(name = "scout", version, about = "Scout: planner / actor-factory / worker research assistant")]
struct Cli {
    /// 额外的配置文件（覆盖 config/default.toml）
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 在终端中运行一次研究
    Run {
        /// 研究目标
        objective: String,
        /// 继续已有会话
        #[arg(long)]
        thread: Option<String>,
    },
    /// 启动 HTTP 服务
    Serve {
        /// 监听地址（覆盖配置）
        #[arg(long)]
        host: Option<String>,
        /// 监听端口（覆盖配置）
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    scout::observability::init();

    let cli = Cli::parse();
    let cfg = load_config(cli.config.clone()).context("Failed to load config")?;
    let runtime = create_runtime(&cfg);

    match cli.command {
        Commands::Run { objective, thread } => run_interactive(runtime, objective, thread).await,
        Commands::Serve { host, port } => {
            let host = host.unwrap_or_else(|| cfg.server.host.clone());
            let port = port.unwrap_or(cfg.server.port);
            scout::server::serve(runtime, &host, port).await.context("Server failed")
        }
    }
}

async fn run_interactive(runtime: Runtime, objective: String, thread: Option<String>) -> anyhow::Result<()> {
    let thread_id = thread.unwrap_or_else(new_thread_id);
    println!("thread: {thread_id}");

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let (tx, mut rx) = mpsc::unbounded_channel::<NodeMessage>();
    let printer = tokio::spawn(async move {
        while let Some(m) = rx.recv().await {
            println!("\n[{}]\n{}", m.node, m.content);
        }
    });

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut outcome = runtime
        .graph
        .run(&thread_id, &objective, Some(&tx), &cancel)
        .await
        .context("Run failed")?;
    loop {
        match outcome {
            RunOutcome::Done { reason, state } => {
                drop(tx);
                let _ = printer.await;
                println!(
                    "\ndone ({:?}) after {} iteration(s)\n\n{}",
                    reason, state.iteration_count, state.progress_outline
                );
                return Ok(());
            }
            RunOutcome::Cancelled => {
                drop(tx);
                let _ = printer.await;
                println!("\ncancelled");
                return Ok(());
            }
            RunOutcome::Suspended(pending) => {
                let decisions = ask_decisions(&pending, &mut stdin).await?;
                outcome = runtime
                    .graph
                    .resume(&thread_id, decisions, Some(&tx), &cancel)
                    .await
                    .context("Resume failed")?;
            }
        }
    }
}

/// 逐项询问：y 批准 / n 拒绝（可附理由）/ e 以新的 JSON 参数执行
async fn ask_decisions(pending: &PendingInterrupt, stdin: &mut Lines<BufReader<Stdin>>) -> anyhow::Result<Vec<Decision>> {
    let mut decisions = Vec::with_capacity(pending.action_requests.len());
    for req in &pending.action_requests {
        println!("\n{}", req.description);
        println!("approve? [y]es / [n]o / [e]dit: ");
        let answer = stdin.next_line().await?.unwrap_or_default();
        let decision = match answer.trim().to_lowercase().as_str() {
            "y" | "yes" | "" => Decision::Approve,
            "e" | "edit" => {
                println!("new args (JSON): ");
                let line = stdin.next_line().await?.unwrap_or_default();
                match serde_json::from_str(&line) {
                    Ok(args) => Decision::Edit { args },
                    Err(e) => {
                        println!("invalid JSON ({e}), rejecting");
                        Decision::Reject {
                            message: Some("edited arguments were not valid JSON".to_string()),
                        }
                    }
                }
            }
            _ => {
                println!("reason (optional): ");
                let reason = stdin.next_line().await?.unwrap_or_default();
                let reason = reason.trim();
                Decision::Reject {
                    message: (!reason.is_empty()).then(|| reason.to_string()),
                }
            }
        };
        decisions.push(decision);
    }
    Ok(decisions)
}

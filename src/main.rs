//! Quill CLI
//!
//! 入口：加载配置、初始化日志、装配研究智能体并执行子命令（research / rollback / list-checkpoints）。

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use quill::config::load_config;
use quill::core::AgentBuilder;
use quill::react::ReactEvent;
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
#[command(name = "quill", version, about = "Governed ReAct research agent")]
struct Cli {
    /// 额外配置文件（叠加在 config/default.toml 之上）
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// 写报告等受控操作前要求人工确认
    #[arg(long, global = true)]
    require_approval: bool,

    #[arg(long, global = true)]
    policy_file: Option<PathBuf>,

    #[arg(long, global = true)]
    max_iterations: Option<u32>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 对一个问题执行研究并写出报告
    Research { query: String },
    /// 查看某个检查点保存的状态
    Rollback {
        #[arg(long)]
        checkpoint_id: String,
    },
    /// 列出所有检查点
    ListCheckpoints,
}

fn print_event(ev: &ReactEvent) {
    match ev {
        ReactEvent::IterationStarted {
            iteration,
            max_iterations,
        } => println!("\n--- Iteration {}/{} ---", iteration, max_iterations),
        ReactEvent::Thought { text } => println!("💭 {}", text),
        ReactEvent::ToolCall { tool, args } => println!("🔧 {} {}", tool, args),
        ReactEvent::GuardrailRejected { tool, stage, message } => {
            println!("🛡️  {} blocked at {}: {}", tool, stage, message)
        }
        ReactEvent::Observation { tool, preview } => println!("👀 [{}] {}", tool, preview),
        ReactEvent::ToolFailure { tool, reason, critical } => {
            let tag = if *critical { "critical" } else { "error" };
            println!("⚠️  {} failed ({}): {}", tool, tag, reason)
        }
        ReactEvent::ApprovalDecided { operation, approved } => {
            let verdict = if *approved { "approved" } else { "rejected" };
            println!("🙋 {} {}", operation, verdict)
        }
        ReactEvent::PolicyViolations { phase, violations } => {
            println!("📏 {} policy violations:", phase);
            for v in violations {
                println!("   - {}", v);
            }
        }
        ReactEvent::Stopped { reason } => println!("\n⏹  Stopped: {}", reason),
        ReactEvent::RolledBack { checkpoint_id } => println!("⏪ Rolled back to {}", checkpoint_id),
        ReactEvent::Error { text } => println!("❌ {}", text),
        ReactEvent::CheckpointCreated { .. } | ReactEvent::ApprovalRequested { .. } => {}
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.clone()).context("Failed to load configuration")?;
    quill::observability::init(&config.app.log_level);

    let mut builder = AgentBuilder::new(config);
    if cli.require_approval {
        builder = builder.with_require_approval(true);
    }
    if let Some(path) = cli.policy_file {
        builder = builder.with_policy_file(path);
    }
    if let Some(n) = cli.max_iterations {
        builder = builder.with_max_iterations(n);
    }

    match cli.command {
        Command::Research { query } => {
            let (tx, mut rx) = mpsc::unbounded_channel();
            let agent = builder.with_event_tx(tx).build();
            let printer = tokio::spawn(async move {
                while let Some(ev) = rx.recv().await {
                    print_event(&ev);
                }
            });

            let token = agent.supervisor().cancel_token();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    println!("\nCancellation requested, finishing current iteration...");
                    token.cancel();
                }
            });

            println!("🔍 Research query: {}", query);
            println!("📊 Max iterations: {}", agent.max_iterations());
            let approval = if agent.approval().is_enabled() { "Required" } else { "Not required" };
            println!("👤 Human approval: {}", approval);

            let result = agent.research(&query).await;
            let (_, _, total_tokens) = agent.token_usage();
            drop(agent);
            let _ = printer.await;

            if !result.success {
                if let Some(id) = &result.rolled_back_to {
                    println!("⏪ State restored from checkpoint {}", id);
                }
                bail!(
                    "Research failed: {}",
                    result.error.as_deref().unwrap_or("unknown error")
                );
            }

            println!("\n✅ Research completed successfully!");
            if let Some(answer) = &result.final_answer {
                println!("\n📄 {}", answer);
            }
            for v in &result.report_violations {
                println!("⚠️  Report policy: {}", v);
            }
            println!("\n📈 Statistics:");
            println!("  - Iterations: {}", result.state.iteration());
            println!("  - Sources collected: {}", result.state.sources().len());
            println!("  - Information pieces: {}", result.state.collected_info().len());
            println!("  - Tokens used: {}", total_tokens);
        }
        Command::Rollback { checkpoint_id } => {
            let agent = builder.build();
            println!("⏪ Rolling back to checkpoint: {}", checkpoint_id);
            match agent.rollback(&checkpoint_id)? {
                Some(state) => {
                    println!("✅ Rollback successful!");
                    println!("State restored from iteration {}", state.iteration());
                    println!("Query: {}", state.query());
                }
                None => bail!("Rollback failed: checkpoint {} not found", checkpoint_id),
            }
        }
        Command::ListCheckpoints => {
            let agent = builder.build();
            let checkpoints = agent.list_checkpoints()?;
            if checkpoints.is_empty() {
                println!("No checkpoints available");
            } else {
                println!("📋 Available checkpoints:");
                for cp in checkpoints {
                    println!("  - {} ({})", cp.checkpoint_id, cp.timestamp.to_rfc3339());
                }
            }
        }
    }
    Ok(())
}

//! webwand command line
//!
//! Runs one task against a launched or connected Chrome. Ctrl-C interrupts
//! the task; checkpointed actions are approved or rejected on stdin.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::{path::PathBuf, sync::Arc, time::Duration};
use tokio::io::{AsyncBufReadExt, BufReader};
use webwand::{
    AgentConfig, AgentMode, BrowserSession, ConnectionOptions, LaunchOptions, Settings, TaskController, TaskStatus,
    UserDecision, task::ActionStatus,
};

#[derive(Parser)]
#[command(name = "webwand")]
#[command(version)]
#[command(about = "Let a language model drive your browser", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one task to completion
    Run(RunArgs),
    /// Print the default settings document
    Settings,
}

#[derive(clap::Args)]
struct RunArgs {
    /// What the agent should do
    instructions: String,

    /// Settings document (model, API keys, checkpoint rules, knowledge)
    #[arg(long, short = 's', value_name = "FILE")]
    settings: Option<PathBuf>,

    /// Launch browser in headed mode (default: headless)
    #[arg(long, short = 'H')]
    headed: bool,

    /// WebSocket endpoint URL of a running browser
    #[arg(long, value_name = "URL")]
    ws_endpoint: Option<String>,

    /// Override the perception mode from the settings
    #[arg(long, value_name = "MODE")]
    mode: Option<AgentMode>,

    /// Page to open before the task starts
    #[arg(long, value_name = "URL")]
    start_url: Option<String>,

    /// Iteration cap
    #[arg(long, default_value = "50")]
    max_iterations: usize,

    /// TrueType font used to caption screenshots
    #[arg(long, value_name = "FILE")]
    caption_font: Option<PathBuf>,
}

fn open_session(args: &RunArgs) -> webwand::Result<BrowserSession> {
    match &args.ws_endpoint {
        Some(endpoint) => BrowserSession::connect(ConnectionOptions::new(endpoint.clone())),
        None => BrowserSession::launch(LaunchOptions::new().headless(!args.headed)),
    }
}

/// Print progress and ask for approval whenever a checkpoint holds an action
async fn follow(controller: Arc<TaskController>) {
    let mut updates = controller.subscribe();
    let mut printed = 0;
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    while updates.changed().await.is_ok() {
        let snapshot = updates.borrow_and_update().clone();

        for entry in snapshot.history.iter().skip(printed) {
            if let Some(action) = entry.outcome.action() {
                println!("[{}] {}", snapshot.iteration, action.thought);
                println!("      -> {}", serde_json::to_string(&action.operation).unwrap_or_default());
            }
        }
        printed = snapshot.history.len();

        let waiting = snapshot.action_status == ActionStatus::AwaitingApproval;
        let Some(pending) = snapshot.pending_approval.filter(|p| waiting && p.decision.is_none()) else {
            continue;
        };

        println!("Checkpoint: {}", pending.proposed_action);
        loop {
            println!("Approve this action? [approve/reject]");
            let line = match stdin.next_line().await {
                Ok(Some(line)) => line,
                _ => {
                    controller.interrupt();
                    return;
                }
            };
            match line.parse::<UserDecision>() {
                Ok(decision) => {
                    controller.set_user_decision(decision);
                    break;
                }
                Err(e) => println!("{}", e),
            }
        }
    }
}

async fn run(args: RunArgs) -> anyhow::Result<TaskStatus> {
    let mut settings = match &args.settings {
        Some(path) => Settings::load(path).with_context(|| format!("reading settings from {}", path.display()))?,
        None => Settings::default(),
    };
    if let Some(mode) = args.mode {
        settings = settings.with_mode(mode);
    }

    let mut config = AgentConfig::default().max_iterations(args.max_iterations);
    if let Some(font) = &args.caption_font {
        config = config.caption_font(font);
    }

    let session = Arc::new(open_session(&args).context("starting browser")?);
    if let Some(url) = &args.start_url {
        session.navigate(&webwand::utils::normalize_url(url))?;
    }

    let tab = Arc::new(session.active_tab_handle());
    let controller = Arc::new(TaskController::from_settings(tab, &settings, config)?);

    let follower = tokio::spawn(follow(controller.clone()));
    let interrupter = {
        let controller = controller.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("Interrupting...");
                controller.interrupt();
            }
        })
    };

    let result = controller.run_task(&args.instructions).await;
    // Let the follower print the last entries
    tokio::time::sleep(Duration::from_millis(50)).await;
    follower.abort();
    interrupter.abort();

    let status = result?;
    if let Some(last) = controller.snapshot().history.last().and_then(|e| e.outcome.action()) {
        println!("\n{}", last.thought);
    }
    Ok(status)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    match Cli::parse().command {
        Command::Run(args) => {
            let status = run(args).await?;
            println!("Task {}", status);
            // a pending stdin read would otherwise hold the runtime open
            std::process::exit(if status == TaskStatus::Success { 0 } else { 1 });
        }
        Command::Settings => {
            println!("{}", serde_json::to_string_pretty(&Settings::default())?);
        }
    }
    Ok(())
}

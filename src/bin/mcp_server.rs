//! webwand MCP Server
//!
//! Exposes the browser task agent to MCP clients: start a task, poll its
//! state, answer safety checkpoints and interrupt it.

use anyhow::Context;
use clap::{Parser, ValueEnum};
use rmcp::{ServiceExt, transport::stdio};
use std::{path::PathBuf, sync::Arc};
use webwand::{
    AgentConfig, AgentMode, BrowserSession, ConnectionOptions, LaunchOptions, Settings, TaskController, WandServer,
};

use rmcp::transport::streamable_http_server::{StreamableHttpService, session::local::LocalSessionManager};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Transport {
    /// Standard input/output transport (default)
    Stdio,
    /// HTTP streamable transport
    Http,
}

#[derive(Parser)]
#[command(name = "webwand-mcp")]
#[command(version)]
#[command(about = "Browser task agent MCP server", long_about = None)]
struct Cli {
    /// Launch browser in headed mode (default: headless)
    #[arg(long, short = 'H')]
    headed: bool,

    /// Path to custom browser executable
    #[arg(long, value_name = "PATH")]
    executable_path: Option<PathBuf>,

    /// WebSocket endpoint URL for remote browser connection
    #[arg(long, value_name = "URL")]
    ws_endpoint: Option<String>,

    /// Persistent browser profile directory
    #[arg(long, value_name = "DIR")]
    user_data_dir: Option<PathBuf>,

    /// Settings document (model, API keys, checkpoint rules, knowledge)
    #[arg(long, short = 's', value_name = "FILE")]
    settings: Option<PathBuf>,

    /// Override the perception mode from the settings
    #[arg(long, value_name = "MODE")]
    mode: Option<AgentMode>,

    /// Transport type to use
    #[arg(long, short = 't', value_enum, default_value = "stdio")]
    transport: Transport,

    /// Port for HTTP transport (default: 3000)
    #[arg(long, short = 'p', default_value = "3000")]
    port: u16,

    /// HTTP streamable endpoint path (default: /mcp)
    #[arg(long, default_value = "/mcp")]
    http_path: String,
}

fn open_session(cli: &Cli) -> webwand::Result<BrowserSession> {
    match &cli.ws_endpoint {
        Some(endpoint) => BrowserSession::connect(ConnectionOptions::new(endpoint.clone())),
        None => {
            let mut options = LaunchOptions::new().headless(!cli.headed);
            if let Some(path) = &cli.executable_path {
                options = options.chrome_path(path.clone());
            }
            if let Some(dir) = &cli.user_data_dir {
                options = options.user_data_dir(dir.clone());
            }
            BrowserSession::launch(options)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries the MCP stream
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();
    let cli = Cli::parse();

    let mut settings = match &cli.settings {
        Some(path) => Settings::load(path).with_context(|| format!("reading settings from {}", path.display()))?,
        None => Settings::default(),
    };
    if let Some(mode) = cli.mode {
        settings = settings.with_mode(mode);
    }

    log::info!("webwand MCP Server v{}", env!("CARGO_PKG_VERSION"));
    log::info!("model: {}, mode: {:?}", settings.selected_model, settings.agent_mode);

    let session = Arc::new(open_session(&cli).context("starting browser")?);
    let tab = Arc::new(session.active_tab_handle());
    let controller = Arc::new(TaskController::from_settings(tab, &settings, AgentConfig::default())?);

    match cli.transport {
        Transport::Stdio => {
            log::info!("Ready to accept MCP connections via stdio");
            let server = WandServer::new(controller.clone()).serve(stdio()).await?;
            let quit_reason = server.waiting().await?;
            log::info!("Server quit with reason: {:?}", quit_reason);
            controller.interrupt();
        }
        Transport::Http => {
            let bind_addr = format!("127.0.0.1:{}", cli.port);

            let factory_controller = controller.clone();
            let http_service = StreamableHttpService::new(
                move || Ok::<_, std::io::Error>(WandServer::new(factory_controller.clone())),
                LocalSessionManager::default().into(),
                Default::default(),
            );
            let router = axum::Router::new().nest_service(&cli.http_path, http_service);

            log::info!("Ready to accept MCP connections at http://{}{}", bind_addr, cli.http_path);
            let listener = tokio::net::TcpListener::bind(bind_addr).await?;
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = tokio::signal::ctrl_c().await;
                })
                .await?;
            controller.interrupt();
        }
    }

    Ok(())
}

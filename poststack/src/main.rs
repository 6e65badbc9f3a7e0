//! poststack - posts API stack
//!
//! Assembles the posts stack (table, gated REST gateway, handler units)
//! and serves it.

use clap::Parser;
use std::net::SocketAddr;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use poststack::stack::API_KEY_ID_OUTPUT;
use poststack::{create_router, posts_stack, Config};

#[derive(Parser, Debug)]
#[command(name = "poststack")]
#[command(about = "Posts API stack: store, gated gateway, handler units", long_about = None)]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "POSTSTACK_PORT")]
    port: Option<u16>,

    /// Host to bind to
    #[arg(long, env = "POSTSTACK_HOST")]
    host: Option<String>,

    /// Deployment stage name
    #[arg(long, env = "POSTSTACK_STAGE")]
    stage: Option<String>,

    /// Table name injected into the handler units
    #[arg(long, env = "POSTSTACK_TABLE_NAME")]
    table_name: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "POSTSTACK_LOG_LEVEL")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("poststack={},tower_http=debug", args.log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = Config::load().unwrap_or_default();
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(stage) = args.stage {
        config.stack.stage_name = stage;
    }
    if let Some(table_name) = args.table_name {
        config.stack.table_name = table_name;
    }

    info!("Assembling posts stack...");
    info!("  table: {}", config.stack.table_name);
    info!("  stage: {}", config.stack.stage_name);

    let stack = posts_stack(&config.stack)?;
    if let Some(key_id) = stack.outputs.get(API_KEY_ID_OUTPUT) {
        info!("API key id: {} (value is retrievable in-process only)", key_id);
    }

    let app = create_router(&stack);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

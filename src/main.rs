//! Chat Room Server - Entry Point
//!
//! Loads configuration, starts the ChatServer actor and accepts
//! connections until Ctrl-C.

use std::env;

use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use chat_room::{serve, ChatServer, ServerConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=chat_room=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chat_room=info")),
        )
        .init();

    // Bind address from command line overrides the environment
    let mut config = ServerConfig::from_env()?;
    if let Some(addr) = env::args().nth(1) {
        config = config.with_bind_addr(addr);
    }

    // Failing to bind is the only fatal startup error
    let listener = TcpListener::bind(&config.bind_addr).await?;

    let (server, actor) = ChatServer::spawn(config.max_clients, config.command_buffer);
    info!("ChatServer actor started");

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };
    serve(listener, server, &config, shutdown).await?;

    actor.abort();
    info!("Bye bye~");
    Ok(())
}

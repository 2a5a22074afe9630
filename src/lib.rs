//! Multi-Client TCP Chat Room Library
//!
//! A chat room server built on tokio using the Actor pattern for state
//! management, plus the client-side pieces of the same protocol.
//!
//! # Features
//! - Nickname admission with uniqueness and capacity limits
//! - Broadcast, secret (one receiver) and except (all but one) messages
//! - Member listing and latency probe
//! - Moderation: a banned phrase gets its sender kicked
//! - Graceful server shutdown notice
//!
//! # Architecture
//! Uses the Actor pattern with `mpsc` channels:
//! - `ChatServer` is the central actor owning the participant registry
//! - Each connection has a `handler` task sending it `ServerCommand`s
//! - Each participant has a writer task draining its mailbox
//! - No locks needed - all registry access goes through message passing
//!
//! # Example
//! ```ignore
//! use tokio::net::TcpListener;
//! use chat_room::{serve, ChatServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), chat_room::AppError> {
//!     let config = ServerConfig::default();
//!     let listener = TcpListener::bind(&config.bind_addr).await?;
//!     let (server, _actor) = ChatServer::spawn(config.max_clients, config.command_buffer);
//!
//!     serve(listener, server, &config, async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await
//! }
//! ```

pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod handler;
pub mod listener;
pub mod message;
pub mod moderation;
pub mod participant;
pub mod registry;
pub mod router;
pub mod server;
pub mod types;

// Re-export main types for convenience
pub use client::{ChatClient, ClientCommand};
pub use codec::{Frame, JsonCodec};
pub use config::ServerConfig;
pub use error::{AppError, SendError};
pub use handler::{handle_connection, ConnectionContext};
pub use listener::serve;
pub use message::{Command, Request, Response, ResponseCode};
pub use moderation::ModerationFilter;
pub use participant::{mailbox, Inbox, Outbox, Participant};
pub use registry::Registry;
pub use server::{ChatServer, JoinAck, ServerCommand, ServerHandle, ServerStats};
pub use types::{ClientId, Nickname};

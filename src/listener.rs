//! Accept loop
//!
//! Admits or turns away incoming connections and spawns one handler task
//! per admitted connection. Runs until the shutdown future resolves.

use std::future::Future;

use futures_util::SinkExt;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::FramedWrite;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::codec::JsonCodec;
use crate::config::ServerConfig;
use crate::error::AppError;
use crate::handler::{handle_connection, linger, ConnectionContext};
use crate::message::Response;
use crate::moderation::ModerationFilter;
use crate::server::ServerHandle;

/// Serve connections on `listener` until `shutdown` completes
///
/// On shutdown every participant receives the server-terminated
/// response, the listener is closed, and writers get
/// `config.shutdown_grace` to flush.
pub async fn serve<F>(
    listener: TcpListener,
    server: ServerHandle,
    config: &ServerConfig,
    shutdown: F,
) -> Result<(), AppError>
where
    F: Future<Output = ()>,
{
    let ctx = ConnectionContext {
        server: server.clone(),
        filter: ModerationFilter::new(&config.banned_phrase),
        outbound_buffer: config.outbound_buffer,
        writers: TaskTracker::new(),
    };

    if let Ok(addr) = listener.local_addr() {
        info!("Server is ready to receive on {}", addr);
    }

    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown requested");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    debug!("New connection from {}", addr);
                    admit(stream, &ctx).await?;
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }
    }

    let notified = server.shutdown().await?;
    drop(listener);
    info!("Told {} participants the server is closing", notified);

    ctx.writers.close();
    if tokio::time::timeout(config.shutdown_grace, ctx.writers.wait())
        .await
        .is_err()
    {
        warn!("Some connections did not flush before shutdown");
    }
    Ok(())
}

/// Capacity gate, then hand the connection to its own task
///
/// The join itself re-checks capacity inside the actor, so a burst of
/// connections passing this gate together still cannot overfill the room.
async fn admit(stream: TcpStream, ctx: &ConnectionContext) -> Result<(), AppError> {
    let stats = ctx.server.stats().await?;

    if stats.members >= stats.capacity {
        info!("Room full ({} users), turning connection away", stats.members);
        tokio::spawn(turn_away(stream, AppError::CapacityExceeded(stats.capacity)));
        return Ok(());
    }

    let ctx = ctx.clone();
    tokio::spawn(async move {
        if let Err(e) = handle_connection(stream, ctx).await {
            error!("Connection handler error: {}", e);
        }
    });
    Ok(())
}

/// Send a rejection and wait for the peer to hang up
async fn turn_away(stream: TcpStream, reason: AppError) {
    let mut writer = FramedWrite::new(stream, JsonCodec::<Response>::new());
    if let Err(e) = writer.send(Response::from(reason)).await {
        debug!("Could not deliver rejection: {}", e);
    }
    let _ = writer.close().await;

    let mut stream = writer.into_inner();
    linger(&mut stream).await;
}

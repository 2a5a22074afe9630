//! TCP connection handler
//!
//! Drives one connection through `Admitting → Active → Closing`:
//! reads framed requests, turns them into `ServerCommand`s for the
//! ChatServer, and runs a writer task that drains the participant's
//! mailbox onto the socket.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::codec::{Frame, JsonCodec};
use crate::error::AppError;
use crate::message::{Command, Request, Response};
use crate::moderation::ModerationFilter;
use crate::participant::{mailbox, Inbox};
use crate::server::{ServerCommand, ServerHandle};
use crate::types::{ClientId, Nickname};

type RequestReader = FramedRead<OwnedReadHalf, JsonCodec<Request>>;
type ResponseWriter = FramedWrite<OwnedWriteHalf, JsonCodec<Response>>;

/// How long a rejected peer gets to hang up after the rejection
const REJECT_LINGER: Duration = Duration::from_secs(2);

/// Shared per-connection dependencies
#[derive(Debug, Clone)]
pub struct ConnectionContext {
    pub server: ServerHandle,
    pub filter: ModerationFilter,
    /// Outbound queue length for each participant
    pub outbound_buffer: usize,
    /// Writer tasks, so shutdown can wait for them to flush
    pub writers: TaskTracker,
}

/// Why an active connection is closing
#[derive(Debug)]
enum CloseReason {
    Quit,
    Disconnected,
    Kicked,
    Transport(AppError),
}

/// Handle a new TCP connection
///
/// Runs admission, then the request loop, and finally removes the
/// participant. Only an unreachable ChatServer is reported as an error;
/// client misbehaviour ends the connection normally.
pub async fn handle_connection(stream: TcpStream, ctx: ConnectionContext) -> Result<(), AppError> {
    let peer_addr = stream.peer_addr()?;
    let local_addr = stream.local_addr()?;
    let (read_half, write_half) = stream.into_split();

    let mut reader = FramedRead::new(read_half, JsonCodec::<Request>::new());
    let mut writer = FramedWrite::new(write_half, JsonCodec::<Response>::new());

    // Admitting
    let nickname = match read_join(&mut reader).await {
        Ok(Some(nickname)) => nickname,
        Ok(None) => {
            debug!("{} closed before joining", peer_addr);
            return Ok(());
        }
        Err(e) => {
            reject(&mut writer, &mut reader, e).await;
            return Ok(());
        }
    };

    let (outbox, inbox) = mailbox(ctx.outbound_buffer);
    let client_id = match ctx
        .server
        .join(nickname.clone(), peer_addr, local_addr, outbox)
        .await
    {
        Ok(ack) => ack.client_id,
        Err(AppError::ChannelSend) => return Err(AppError::ChannelSend),
        Err(e) => {
            reject(&mut writer, &mut reader, e).await;
            return Ok(());
        }
    };

    let write_task = ctx.writers.spawn(write_responses(writer, inbox, client_id));

    // Active
    let mut session = Session {
        client_id,
        nickname,
        server: ctx.server.clone(),
        filter: ctx.filter.clone(),
    };
    let reason = session.run(&mut reader).await;

    // Closing
    let closing = match &reason {
        CloseReason::Kicked => ServerCommand::Kick { client_id },
        _ => ServerCommand::Leave { client_id },
    };
    info!("{} ({}) closing: {:?}", session.nickname, client_id, reason);
    // Actor gone means the registry is gone too; nothing left to remove
    let _ = ctx.server.send(closing).await;

    // Writer ends once the registry drops our mailbox
    if let Err(e) = write_task.await {
        warn!("Writer task for {} failed: {}", client_id, e);
    }
    Ok(())
}

/// Read the admission request and validate its nickname
///
/// `Ok(None)` means the peer hung up without sending anything.
async fn read_join(reader: &mut RequestReader) -> Result<Option<Nickname>, AppError> {
    let Some(frame) = reader.next().await else {
        return Ok(None);
    };

    let request = match frame? {
        Frame::Message(request) => request,
        Frame::Malformed(reason) => return Err(AppError::MalformedMessage(reason)),
    };

    match request.command() {
        Command::Join => Nickname::parse(&request.header.sender).map(Some),
        other => Err(AppError::UnexpectedRequest(other.code())),
    }
}

/// Send an admission error and wait for the peer to hang up
async fn reject(writer: &mut ResponseWriter, reader: &mut RequestReader, error: AppError) {
    info!("Rejecting connection: {}", error);
    if let Err(e) = writer.send(Response::from(error)).await {
        debug!("Could not deliver rejection: {}", e);
    }
    let _ = writer.close().await;
    linger(reader.get_mut()).await;
}

/// Discard input until EOF or `REJECT_LINGER`
///
/// Closing a socket with unread input resets the connection, which can
/// destroy a rejection the peer has not read yet.
pub(crate) async fn linger<R: AsyncRead + Unpin>(reader: &mut R) {
    let mut sink = [0u8; 512];
    let drain = async {
        while let Ok(n) = reader.read(&mut sink).await {
            if n == 0 {
                break;
            }
        }
    };
    let _ = tokio::time::timeout(REJECT_LINGER, drain).await;
}

/// Drain a participant's mailbox onto its socket
async fn write_responses(mut writer: ResponseWriter, mut inbox: Inbox, client_id: ClientId) {
    while let Some(response) = inbox.recv().await {
        if let Err(e) = writer.send(response).await {
            debug!("Write to {} failed: {}", client_id, e);
            break;
        }
    }
    let _ = writer.close().await;
    debug!("Writer task ended for {}", client_id);
}

/// Active-state request loop for one participant
struct Session {
    client_id: ClientId,
    nickname: Nickname,
    server: ServerHandle,
    filter: ModerationFilter,
}

impl Session {
    async fn run(&mut self, reader: &mut RequestReader) -> CloseReason {
        while let Some(frame) = reader.next().await {
            let request = match frame {
                Ok(Frame::Message(request)) => request,
                Ok(Frame::Malformed(reason)) => {
                    warn!("Malformed frame from {}: {}", self.nickname, reason);
                    let response = Response::from(AppError::MalformedMessage(reason));
                    if let Err(e) = self.reply(response).await {
                        return CloseReason::Transport(e);
                    }
                    continue;
                }
                Err(e) => return CloseReason::Transport(e),
            };

            debug!("{} -> {:?}", self.nickname, request);
            match self.dispatch(request).await {
                Ok(None) => {}
                Ok(Some(reason)) => return reason,
                Err(e) => return CloseReason::Transport(e),
            }
        }
        CloseReason::Disconnected
    }

    /// Handle one request; `Some` ends the session
    async fn dispatch(&mut self, request: Request) -> Result<Option<CloseReason>, AppError> {
        let client_id = self.client_id;
        let command = request.command();
        let Request { header, body } = request;
        let text = body.message;

        let cmd = match command {
            Command::Quit => return Ok(Some(CloseReason::Quit)),
            Command::Broadcast => ServerCommand::Broadcast {
                client_id,
                text: text.clone(),
            },
            Command::List => ServerCommand::List { client_id },
            Command::Secret => ServerCommand::Secret {
                client_id,
                receiver: header.receiver,
                text: text.clone(),
            },
            Command::Except => ServerCommand::Except {
                client_id,
                receiver: header.receiver,
                text: text.clone(),
            },
            Command::Ping => ServerCommand::Reply {
                client_id,
                response: Response::ping_ack(),
            },
            Command::Join | Command::Unknown(_) => ServerCommand::Reply {
                client_id,
                response: Response::error(format!("invalid command: {}", text)),
            },
        };
        self.server.send(cmd).await?;

        if self.filter.is_violation(&text) {
            return Ok(Some(CloseReason::Kicked));
        }
        Ok(None)
    }

    async fn reply(&self, response: Response) -> Result<(), AppError> {
        self.server
            .send(ServerCommand::Reply {
                client_id: self.client_id,
                response,
            })
            .await
    }
}

//! Chat client
//!
//! Client side of the protocol: the line-oriented command grammar and a
//! framed connection that performs the join handshake.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::warn;

use crate::codec::{Frame, JsonCodec};
use crate::error::AppError;
use crate::message::{Command, Request, Response, ResponseCode};
use crate::types::Nickname;

/// One line of user input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    /// Bare text
    Broadcast(String),
    /// `\ls`
    List,
    /// `\secret <nickname> <text>`
    Secret { to: String, text: String },
    /// `\except <nickname> <text>`
    Except { to: String, text: String },
    /// `\ping`
    Ping,
    /// `\quit`
    Quit,
}

impl ClientCommand {
    /// Parse a trimmed input line
    pub fn parse(line: &str) -> Result<Self, AppError> {
        let line = line.trim();
        if !line.starts_with('\\') {
            return Ok(ClientCommand::Broadcast(line.to_string()));
        }

        let mut parts = line.splitn(3, ' ');
        let name = parts.next().unwrap_or_default();
        match name {
            "\\ls" => Ok(ClientCommand::List),
            "\\ping" => Ok(ClientCommand::Ping),
            "\\quit" => Ok(ClientCommand::Quit),
            "\\secret" | "\\except" => {
                let to = parts
                    .next()
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| AppError::InvalidCommand(format!("{} needs a nickname", name)))?
                    .to_string();
                let text = parts.next().unwrap_or_default().to_string();
                if name == "\\secret" {
                    Ok(ClientCommand::Secret { to, text })
                } else {
                    Ok(ClientCommand::Except { to, text })
                }
            }
            other => Err(AppError::InvalidCommand(other.to_string())),
        }
    }

    /// Build the wire request on behalf of `sender`
    pub fn into_request(self, sender: &Nickname) -> Request {
        let sender = sender.as_str();
        match self {
            ClientCommand::Broadcast(text) => Request::new(Command::Broadcast, sender, "", text),
            ClientCommand::List => Request::new(Command::List, sender, "", ""),
            ClientCommand::Secret { to, text } => Request::new(Command::Secret, sender, to, text),
            ClientCommand::Except { to, text } => Request::new(Command::Except, sender, to, text),
            ClientCommand::Ping => Request::new(Command::Ping, sender, "", ""),
            ClientCommand::Quit => Request::new(Command::Quit, sender, "", ""),
        }
    }
}

/// Receiving half of a client connection
pub struct ClientReader {
    inner: FramedRead<OwnedReadHalf, JsonCodec<Response>>,
}

impl ClientReader {
    /// Next response; `None` once the server hangs up
    ///
    /// Undecodable frames are logged and skipped.
    pub async fn recv(&mut self) -> Result<Option<Response>, AppError> {
        while let Some(frame) = self.inner.next().await {
            match frame? {
                Frame::Message(response) => return Ok(Some(response)),
                Frame::Malformed(reason) => warn!("Skipping malformed response: {}", reason),
            }
        }
        Ok(None)
    }
}

/// Sending half of a client connection
pub struct ClientWriter {
    inner: FramedWrite<OwnedWriteHalf, JsonCodec<Request>>,
    nickname: Nickname,
}

impl ClientWriter {
    pub async fn send(&mut self, command: ClientCommand) -> Result<(), AppError> {
        let request = command.into_request(&self.nickname);
        self.send_request(request).await
    }

    /// Send a raw request
    pub async fn send_request(&mut self, request: Request) -> Result<(), AppError> {
        self.inner.send(request).await
    }

    pub async fn close(&mut self) -> Result<(), AppError> {
        self.inner.close().await
    }
}

/// Joined chat connection
pub struct ChatClient {
    reader: ClientReader,
    writer: ClientWriter,
}

impl ChatClient {
    /// Connect, join as `nickname`, and wait up to `timeout` for the answer
    ///
    /// Returns the client and the welcome response. An error or
    /// terminated response from the server becomes `AppError::Rejected`.
    pub async fn connect<A: ToSocketAddrs>(
        addr: A,
        nickname: Nickname,
        timeout: Duration,
    ) -> Result<(Self, Response), AppError> {
        let stream = TcpStream::connect(addr).await?;
        let (read_half, write_half) = stream.into_split();

        let mut client = Self {
            reader: ClientReader {
                inner: FramedRead::new(read_half, JsonCodec::new()),
            },
            writer: ClientWriter {
                inner: FramedWrite::new(write_half, JsonCodec::new()),
                nickname: nickname.clone(),
            },
        };

        client
            .writer
            .send_request(Request::join(nickname.as_str()))
            .await?;

        let welcome = tokio::time::timeout(timeout, client.reader.recv())
            .await
            .map_err(|_| AppError::Timeout)??;

        match welcome {
            None => Err(AppError::Rejected("connection closed during join".into())),
            Some(res) if matches!(res.code, ResponseCode::Error | ResponseCode::Terminated) => {
                Err(AppError::Rejected(res.message))
            }
            Some(res) => Ok((client, res)),
        }
    }

    pub async fn send(&mut self, command: ClientCommand) -> Result<(), AppError> {
        self.writer.send(command).await
    }

    pub async fn send_request(&mut self, request: Request) -> Result<(), AppError> {
        self.writer.send_request(request).await
    }

    pub async fn recv(&mut self) -> Result<Option<Response>, AppError> {
        self.reader.recv().await
    }

    /// Split for concurrent reading and writing
    pub fn split(self) -> (ClientReader, ClientWriter) {
        (self.reader, self.writer)
    }
}

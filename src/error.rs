//! Error types for the chat server
//!
//! Defines application-level errors and participant delivery errors.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Application-level errors
///
/// Covers fatal errors (connection termination), admission rejections
/// (sent to the client before the socket closes), and client-side failures.
#[derive(Debug, Error)]
pub enum AppError {
    /// Transport error on a stream (fatal for that connection)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// A frame could not be decoded into a protocol message
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// Nickname is not 1-32 ASCII letters
    #[error("Invalid nickname: {0:?}")]
    InvalidNickname(String),

    /// Nickname is held by a connected participant
    #[error("Duplicate nickname: {0}")]
    DuplicateNickname(String),

    /// Room already holds the maximum number of participants
    #[error("Capacity exceeded ({0} participants)")]
    CapacityExceeded(usize),

    /// Server has started shutting down and admits nobody
    #[error("Server is shutting down")]
    ShuttingDown,

    /// First frame on a connection was not a join request
    #[error("Expected join request, got code {0}")]
    UnexpectedRequest(u8),

    /// Client input line does not match the command grammar
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    /// Server answered with an error response
    #[error("Rejected by server: {0}")]
    Rejected(String),

    /// No reply within the client's read timeout
    #[error("Server unreachable (timed out)")]
    Timeout,

    /// Channel send error (fatal - internal channel broken)
    #[error("Channel send error")]
    ChannelSend,

    /// Bad configuration value
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Participant delivery errors
///
/// Returned when queueing a response for one participant fails. Always
/// that participant's problem; fan-out logs it and moves on.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SendError {
    /// The participant's writer has gone away
    #[error("Channel closed")]
    ChannelClosed,

    /// The participant is not draining its queue
    #[error("Outbound queue full")]
    QueueFull,
}

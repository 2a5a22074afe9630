//! Message protocol definitions
//!
//! JSON-based request/response records. Requests carry a numeric operation
//! code in a header plus a message body; responses carry a numeric kind and
//! text. Numeric codes are mapped onto enums so dispatch is an exhaustive
//! `match` instead of comparisons against magic numbers.

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Client → Server instruction
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub header: RequestHeader,
    #[serde(default)]
    pub body: RequestBody,
}

/// Routing part of a request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestHeader {
    /// Operation code, see [`Command`]
    pub code: u8,
    #[serde(default)]
    pub sender: String,
    #[serde(default)]
    pub receiver: String,
}

/// Payload part of a request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestBody {
    #[serde(default)]
    pub message: String,
}

impl Request {
    pub fn new(
        command: Command,
        sender: impl Into<String>,
        receiver: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            header: RequestHeader {
                code: command.code(),
                sender: sender.into(),
                receiver: receiver.into(),
            },
            body: RequestBody {
                message: message.into(),
            },
        }
    }

    /// Admission request for the given nickname
    pub fn join(nickname: impl Into<String>) -> Self {
        Self::new(Command::Join, nickname, "", "")
    }

    /// Decoded operation
    pub fn command(&self) -> Command {
        Command::from(self.header.code)
    }

    pub fn message(&self) -> &str {
        &self.body.message
    }

    pub fn receiver(&self) -> &str {
        &self.header.receiver
    }
}

/// Request operation
///
/// Any code outside the protocol maps to `Unknown` so the handler can
/// answer it instead of dropping it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Join,
    Broadcast,
    List,
    Secret,
    Except,
    Ping,
    Quit,
    Unknown(u8),
}

impl Command {
    pub fn code(self) -> u8 {
        match self {
            Command::Join => 0,
            Command::Broadcast => 1,
            Command::List => 2,
            Command::Secret => 3,
            Command::Except => 4,
            Command::Ping => 5,
            Command::Quit => 6,
            Command::Unknown(code) => code,
        }
    }
}

impl From<u8> for Command {
    fn from(code: u8) -> Self {
        match code {
            0 => Command::Join,
            1 => Command::Broadcast,
            2 => Command::List,
            3 => Command::Secret,
            4 => Command::Except,
            5 => Command::Ping,
            6 => Command::Quit,
            other => Command::Unknown(other),
        }
    }
}

/// Server → Client payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub code: ResponseCode,
    pub message: String,
}

/// Response kind, serialized as its numeric code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum ResponseCode {
    /// Answer to a latency probe
    PingAck,
    /// Result of the recipient's own request
    Reply,
    /// Message originating from another participant or the room
    Message,
    /// Rejection, kick or bad request
    Error,
    /// Server is shutting down
    Terminated,
}

impl From<ResponseCode> for u8 {
    fn from(code: ResponseCode) -> Self {
        match code {
            ResponseCode::PingAck => 0,
            ResponseCode::Reply => 1,
            ResponseCode::Message => 2,
            ResponseCode::Error => 3,
            ResponseCode::Terminated => 4,
        }
    }
}

impl TryFrom<u8> for ResponseCode {
    type Error = AppError;

    fn try_from(code: u8) -> Result<Self, AppError> {
        match code {
            0 => Ok(ResponseCode::PingAck),
            1 => Ok(ResponseCode::Reply),
            2 => Ok(ResponseCode::Message),
            3 => Ok(ResponseCode::Error),
            4 => Ok(ResponseCode::Terminated),
            other => Err(AppError::MalformedMessage(format!(
                "unknown response code {other}"
            ))),
        }
    }
}

impl Response {
    fn new(code: ResponseCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn ping_ack() -> Self {
        Self::new(ResponseCode::PingAck, "")
    }

    pub fn reply(message: impl Into<String>) -> Self {
        Self::new(ResponseCode::Reply, message)
    }

    pub fn message(message: impl Into<String>) -> Self {
        Self::new(ResponseCode::Message, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(ResponseCode::Error, message)
    }

    pub fn terminated(message: impl Into<String>) -> Self {
        Self::new(ResponseCode::Terminated, message)
    }
}

/// Kick notice sent before a moderation removal
pub const KICK_NOTICE: &str = "[You are kicked out of the chat room.]";

/// Broadcast to everyone when the server shuts down
pub const SERVER_CLOSED: &str = "[Chat server is closed.]";

/// Convert AppError to Response for client notification
impl From<AppError> for Response {
    fn from(err: AppError) -> Self {
        if let AppError::ShuttingDown = err {
            return Response::terminated(SERVER_CLOSED);
        }
        let message = match &err {
            AppError::DuplicateNickname(_) => {
                "[nickname already used by another user. cannot connect.]".to_string()
            }
            AppError::CapacityExceeded(_) => "[chatting room full. cannot connect.]".to_string(),
            AppError::InvalidNickname(nick) => format!(
                "[invalid nickname '{}': English letters only, 32 characters or less.]",
                nick
            ),
            AppError::UnexpectedRequest(_) => {
                "[expected a join request. cannot connect.]".to_string()
            }
            AppError::MalformedMessage(reason) => format!("invalid message: {}", reason),
            AppError::Json(e) => format!("invalid message: {}", e),
            // Fatal errors are not typically converted (connection closes)
            _ => "Internal error".to_string(),
        };
        Response::error(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_deserialize() {
        let json = r#"{"header":{"code":3,"sender":"alice","receiver":"bob"},"body":{"message":"hello"}}"#;
        let req: Request = serde_json::from_str(json).unwrap();
        assert_eq!(req.command(), Command::Secret);
        assert_eq!(req.header.sender, "alice");
        assert_eq!(req.receiver(), "bob");
        assert_eq!(req.message(), "hello");
    }

    #[test]
    fn test_request_optional_fields_default() {
        let req: Request = serde_json::from_str(r#"{"header":{"code":5}}"#).unwrap();
        assert_eq!(req.command(), Command::Ping);
        assert!(req.receiver().is_empty());
        assert!(req.message().is_empty());
    }

    #[test]
    fn test_unknown_code_is_preserved() {
        let req: Request = serde_json::from_str(r#"{"header":{"code":42}}"#).unwrap();
        assert_eq!(req.command(), Command::Unknown(42));
        assert_eq!(req.command().code(), 42);
    }

    #[test]
    fn test_response_serialize_numeric_code() {
        let json = serde_json::to_string(&Response::error("nope")).unwrap();
        assert_eq!(json, r#"{"code":3,"message":"nope"}"#);
    }

    #[test]
    fn test_response_rejects_unknown_code() {
        let res = serde_json::from_str::<Response>(r#"{"code":9,"message":""}"#);
        assert!(res.is_err());
    }

    #[test]
    fn test_error_to_response() {
        let res = Response::from(AppError::DuplicateNickname("alice".into()));
        assert_eq!(res.code, ResponseCode::Error);
        assert!(res.message.contains("already used"));

        let res = Response::from(AppError::CapacityExceeded(8));
        assert!(res.message.contains("full"));
    }

    #[test]
    fn test_shutting_down_maps_to_terminated() {
        let res = Response::from(AppError::ShuttingDown);
        assert_eq!(res.code, ResponseCode::Terminated);
        assert_eq!(res.message, SERVER_CLOSED);
    }
}

//! Basic type definitions for the chat server
//!
//! Provides newtype wrappers for type safety:
//! - `ClientId`: monotonically assigned participant identifier
//! - `Nickname`: validated chat nickname (ASCII letters, 1-32 chars)

use std::fmt;

use crate::error::AppError;

/// Unique participant identifier (newtype pattern)
///
/// Assigned by the registry in admission order and never reused,
/// so it also serves as the fan-out iteration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClientId(pub u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Chat nickname
///
/// Only constructed through [`Nickname::parse`], so holding one means the
/// value is 1 to 32 ASCII letters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Nickname(String);

impl Nickname {
    /// Longest accepted nickname
    pub const MAX_LEN: usize = 32;

    /// Validate a raw nickname
    pub fn parse(raw: &str) -> Result<Self, AppError> {
        let valid = !raw.is_empty()
            && raw.len() <= Self::MAX_LEN
            && raw.chars().all(|c| c.is_ascii_alphabetic());

        if valid {
            Ok(Self(raw.to_string()))
        } else {
            Err(AppError::InvalidNickname(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Nickname {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Nickname {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_id_ordering() {
        assert!(ClientId(1) < ClientId(2));
        assert_eq!(ClientId(7).to_string(), "#7");
    }

    #[test]
    fn test_nickname_accepts_letters() {
        let nick = Nickname::parse("Alice").unwrap();
        assert_eq!(nick.as_str(), "Alice");
        assert!(Nickname::parse(&"a".repeat(32)).is_ok());
    }

    #[test]
    fn test_nickname_rejects_bad_input() {
        let long = "a".repeat(33);
        for raw in ["", "bob1", "bo b", "bob!", "jos\u{e9}", long.as_str()] {
            assert!(
                matches!(Nickname::parse(raw), Err(AppError::InvalidNickname(_))),
                "{raw:?} should be rejected"
            );
        }
    }
}

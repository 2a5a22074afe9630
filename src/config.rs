//! Server configuration
//!
//! Defaults match the classroom deployment (port 30768, eight seats).
//! Every field can be overridden through a `CHAT_*` environment variable.

use std::str::FromStr;
use std::time::Duration;

use crate::error::AppError;
use crate::moderation::DEFAULT_BANNED_PHRASE;

/// Default listen address
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:30768";

/// Default room capacity
pub const DEFAULT_MAX_CLIENTS: usize = 8;

/// Runtime settings for the chat server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the listener binds to
    pub bind_addr: String,
    /// Maximum simultaneous participants
    pub max_clients: usize,
    /// Phrase that gets its sender kicked (empty disables moderation)
    pub banned_phrase: String,
    /// Per-participant outbound queue length
    pub outbound_buffer: usize,
    /// ChatServer command channel length
    pub command_buffer: usize,
    /// How long shutdown waits for writers to flush
    pub shutdown_grace: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            max_clients: DEFAULT_MAX_CLIENTS,
            banned_phrase: DEFAULT_BANNED_PHRASE.to_string(),
            outbound_buffer: 64,
            command_buffer: 256,
            shutdown_grace: Duration::from_millis(500),
        }
    }
}

impl ServerConfig {
    /// Load from the process environment
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(addr) = lookup("CHAT_BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Some(phrase) = lookup("CHAT_BANNED_PHRASE") {
            config.banned_phrase = phrase;
        }
        if let Some(raw) = lookup("CHAT_MAX_CLIENTS") {
            config.max_clients = parse_var("CHAT_MAX_CLIENTS", &raw)?;
        }
        if let Some(raw) = lookup("CHAT_OUTBOUND_BUFFER") {
            config.outbound_buffer = parse_var("CHAT_OUTBOUND_BUFFER", &raw)?;
        }
        if let Some(raw) = lookup("CHAT_COMMAND_BUFFER") {
            config.command_buffer = parse_var("CHAT_COMMAND_BUFFER", &raw)?;
        }
        if let Some(raw) = lookup("CHAT_SHUTDOWN_GRACE_MS") {
            config.shutdown_grace =
                Duration::from_millis(parse_var("CHAT_SHUTDOWN_GRACE_MS", &raw)?);
        }

        config.validate()?;
        Ok(config)
    }

    /// Override the bind address (first CLI argument)
    pub fn with_bind_addr(mut self, addr: impl Into<String>) -> Self {
        self.bind_addr = addr.into();
        self
    }

    fn validate(&self) -> Result<(), AppError> {
        // tokio mpsc panics on zero-capacity channels
        for (name, value) in [
            ("CHAT_MAX_CLIENTS", self.max_clients),
            ("CHAT_OUTBOUND_BUFFER", self.outbound_buffer),
            ("CHAT_COMMAND_BUFFER", self.command_buffer),
        ] {
            if value == 0 {
                return Err(AppError::Config(format!("{} must be at least 1", name)));
            }
        }
        Ok(())
    }
}

fn parse_var<T: FromStr>(name: &str, raw: &str) -> Result<T, AppError> {
    raw.trim()
        .parse()
        .map_err(|_| AppError::Config(format!("{}: cannot parse {:?}", name, raw)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.bind_addr, DEFAULT_BIND_ADDR);
        assert_eq!(config.max_clients, 8);
        assert_eq!(config.banned_phrase, "i hate professor");
    }

    #[test]
    fn test_overrides() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("CHAT_BIND_ADDR", "127.0.0.1:9000"),
            ("CHAT_MAX_CLIENTS", " 3 "),
            ("CHAT_SHUTDOWN_GRACE_MS", "20"),
        ]))
        .unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:9000");
        assert_eq!(config.max_clients, 3);
        assert_eq!(config.shutdown_grace, Duration::from_millis(20));

        let config = config.with_bind_addr("127.0.0.1:9001");
        assert_eq!(config.bind_addr, "127.0.0.1:9001");
    }

    #[test]
    fn test_invalid_values() {
        let err = ServerConfig::from_lookup(lookup(&[("CHAT_MAX_CLIENTS", "eight")])).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));

        let err = ServerConfig::from_lookup(lookup(&[("CHAT_OUTBOUND_BUFFER", "0")])).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }
}

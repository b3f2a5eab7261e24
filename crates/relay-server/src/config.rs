//! Server configuration.

use serde::{Deserialize, Serialize};

use crate::error::ServerError;
use crate::hub::DEFAULT_QUEUE_CAPACITY;

/// Configuration for the relay server.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind (default `"0.0.0.0"`).
    pub host: String,
    /// Port to bind (default `8080`; `0` picks a free port).
    pub port: u16,
    /// Frames buffered per connection before it is evicted as a slow consumer.
    pub outbound_queue_capacity: usize,
    /// Messages returned by `/history`.
    pub history_limit: usize,
    /// Max inbound WebSocket message size in bytes. Larger frames close the
    /// connection.
    pub max_message_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            outbound_queue_capacity: DEFAULT_QUEUE_CAPACITY,
            history_limit: 50,
            max_message_size: 64 * 1024,
        }
    }
}

impl ServerConfig {
    /// Reject zero capacities and limits.
    pub fn validate(&self) -> Result<(), ServerError> {
        if self.outbound_queue_capacity == 0 {
            return Err(ServerError::Config("outbound_queue_capacity must be at least 1".into()));
        }
        if self.history_limit == 0 {
            return Err(ServerError::Config("history_limit must be at least 1".into()));
        }
        if self.max_message_size == 0 {
            return Err(ServerError::Config("max_message_size must be at least 1".into()));
        }
        Ok(())
    }

    /// `host:port` for the listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.host, "0.0.0.0");
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.outbound_queue_capacity, 256);
        assert_eq!(cfg.history_limit, 50);
        assert_eq!(cfg.max_message_size, 64 * 1024);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn bind_addr_joins_host_and_port() {
        let cfg = ServerConfig {
            host: "127.0.0.1".into(),
            port: 9000,
            ..Default::default()
        };
        assert_eq!(cfg.bind_addr(), "127.0.0.1:9000");
    }

    #[test]
    fn zero_capacity_rejected() {
        let cfg = ServerConfig {
            outbound_queue_capacity: 0,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(ServerError::Config(_))));
    }

    #[test]
    fn zero_history_limit_rejected() {
        let cfg = ServerConfig {
            history_limit: 0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg: ServerConfig = serde_json::from_str(r#"{"port":3000}"#).unwrap();
        assert_eq!(cfg.port, 3000);
        assert_eq!(cfg.host, "0.0.0.0");
        assert_eq!(cfg.history_limit, 50);
    }

    #[test]
    fn serde_roundtrip() {
        let cfg = ServerConfig {
            host: "10.0.0.1".into(),
            port: 1234,
            outbound_queue_capacity: 8,
            history_limit: 5,
            max_message_size: 512,
        };
        let back: ServerConfig = serde_json::from_str(&serde_json::to_string(&cfg).unwrap()).unwrap();
        assert_eq!(back.host, "10.0.0.1");
        assert_eq!(back.outbound_queue_capacity, 8);
        assert_eq!(back.max_message_size, 512);
    }
}

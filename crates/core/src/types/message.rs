//! Wire protocol messages for the terminal multiplexer.
//!
//! Grounded on `hostagent::quic_server`'s message dispatch loop. The legacy
//! single-session `RequestPty`/`StartShell`/`Command`/`Input` variants and the
//! VFS browsing variants are retired in favor of the explicit multiplexer
//! operations (`Create`/`Attach`/`Detach`/`Write`/`Resize`/`Kill`/`List`).

use crate::terminal::WindowSummary;
use crate::{AuthToken, CoreError, APP_VERSION_STRING, PROTOCOL_VERSION};
use crate::Result;
use serde::{Deserialize, Serialize};

/// Network message type for the QUIC protocol.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum NetworkMessage {
    /// Protocol handshake.
    Hello {
        protocol_version: u32,
        app_version: String,
        capabilities: u32,
        auth_token: Option<AuthToken>,
    },

    /// Heartbeat.
    Ping { timestamp: u64 },
    Pong { timestamp: u64 },

    /// Create a new window.
    Create {
        project_path: String,
        cwd: String,
        shell: String,
        env: Vec<(String, String)>,
        cols: u16,
        rows: u16,
        label: Option<String>,
        prefer_multiplexed: bool,
    },
    /// Response to `Create`.
    Created { window: WindowSummary },

    /// Attach a subscriber to an existing window, replaying its scrollback.
    Attach { window_id: String, cols: u16, rows: u16 },
    /// Response to `Attach`.
    Attached { window_id: String, sub_id: u64 },

    /// Detach a subscriber. Idempotent.
    Detach { window_id: String, sub_id: u64 },

    /// Raw input bytes, written to the window's host verbatim. The PTY itself
    /// handles echo and signal generation (Ctrl+C -> SIGINT); this is pure
    /// passthrough, never interpreted as a line-oriented command.
    Write { window_id: String, data: Vec<u8> },

    /// Resize a window's viewport. Last write wins.
    Resize { window_id: String, cols: u16, rows: u16 },

    /// Kill a window. Idempotent.
    Kill { window_id: String },

    /// List live windows, optionally filtered by project path.
    List { project_path: Option<String> },
    /// Response to `List`.
    Windows { windows: Vec<WindowSummary> },

    /// Output bytes for an attached window (including the scrollback replay,
    /// delivered as the first `Output` after `Attached`).
    Output { window_id: String, data: Vec<u8> },

    /// The window's process exited; no further `Output` will follow.
    WindowExited {
        window_id: String,
        code: Option<i32>,
        signal: Option<i32>,
    },

    /// A subscriber was evicted for falling too far behind.
    SlowConsumerEvicted { window_id: String, dropped_bytes: usize },

    /// Out-of-band error not tied to a specific request/response pair.
    Error { message: String },

    /// Connection close.
    Close,
}

impl NetworkMessage {
    pub fn hello(token: Option<AuthToken>) -> Self {
        Self::Hello {
            protocol_version: PROTOCOL_VERSION,
            app_version: APP_VERSION_STRING.to_string(),
            capabilities: 0,
            auth_token: token,
        }
    }

    pub fn validate_handshake(&self) -> Result<()> {
        match self {
            NetworkMessage::Hello { protocol_version, .. } => {
                if *protocol_version == PROTOCOL_VERSION {
                    Ok(())
                } else {
                    Err(CoreError::ProtocolVersionMismatch {
                        expected: PROTOCOL_VERSION,
                        got: *protocol_version,
                    })
                }
            }
            _ => Err(CoreError::InvalidHandshake),
        }
    }

    pub fn ping() -> Self {
        use std::time::{SystemTime, UNIX_EPOCH};
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self::Ping { timestamp }
    }

    pub fn pong(timestamp: u64) -> Self {
        Self::Pong { timestamp }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_creation() {
        let msg = NetworkMessage::hello(None);
        assert!(matches!(msg, NetworkMessage::Hello { .. }));
    }

    #[test]
    fn message_with_token() {
        let token = AuthToken::generate();
        let msg = NetworkMessage::hello(Some(token));
        assert!(matches!(msg, NetworkMessage::Hello { .. }));
    }

    #[test]
    fn close_round_trips() {
        let msg = NetworkMessage::Close;
        let serialized = postcard::to_allocvec(&msg).unwrap();
        let deserialized: NetworkMessage = postcard::from_bytes(&serialized).unwrap();
        assert_eq!(msg, deserialized);
    }

    #[test]
    fn handshake_validation_valid() {
        let msg = NetworkMessage::hello(None);
        assert!(msg.validate_handshake().is_ok());
    }

    #[test]
    fn handshake_validation_invalid_version() {
        let msg = NetworkMessage::Hello {
            protocol_version: 999,
            app_version: "0.0.0".to_string(),
            capabilities: 0,
            auth_token: None,
        };
        let result = msg.validate_handshake();
        match result.unwrap_err() {
            CoreError::ProtocolVersionMismatch { expected, got } => {
                assert_eq!(expected, PROTOCOL_VERSION);
                assert_eq!(got, 999);
            }
            _ => panic!("expected ProtocolVersionMismatch"),
        }
    }

    #[test]
    fn handshake_validation_invalid_message_type() {
        let msg = NetworkMessage::Ping { timestamp: 0 };
        assert!(matches!(
            msg.validate_handshake().unwrap_err(),
            CoreError::InvalidHandshake
        ));
    }

    #[test]
    fn create_message_round_trips() {
        let msg = NetworkMessage::Create {
            project_path: "/home/dev/proj".to_string(),
            cwd: "/home/dev/proj".to_string(),
            shell: "/bin/bash".to_string(),
            env: vec![("TERM".to_string(), "xterm-256color".to_string())],
            cols: 80,
            rows: 24,
            label: Some("main".to_string()),
            prefer_multiplexed: false,
        };
        let serialized = postcard::to_allocvec(&msg).unwrap();
        let deserialized: NetworkMessage = postcard::from_bytes(&serialized).unwrap();
        assert_eq!(msg, deserialized);
    }

    #[test]
    fn attach_and_write_round_trip() {
        let attach = NetworkMessage::Attach {
            window_id: "pty-abc".to_string(),
            cols: 80,
            rows: 24,
        };
        let write = NetworkMessage::Write {
            window_id: "pty-abc".to_string(),
            data: vec![3], // Ctrl+C
        };
        for msg in [attach, write] {
            let serialized = postcard::to_allocvec(&msg).unwrap();
            let deserialized: NetworkMessage = postcard::from_bytes(&serialized).unwrap();
            assert_eq!(msg, deserialized);
        }
    }

    #[test]
    fn window_exited_round_trips() {
        let msg = NetworkMessage::WindowExited {
            window_id: "pty-abc".to_string(),
            code: Some(0),
            signal: None,
        };
        let serialized = postcard::to_allocvec(&msg).unwrap();
        let deserialized: NetworkMessage = postcard::from_bytes(&serialized).unwrap();
        assert_eq!(msg, deserialized);
    }
}

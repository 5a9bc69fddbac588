//! Bench configuration, loadable from JSON.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uabench_frame::{FrameConfig, PROTOCOL_VERSION};

use crate::error::{BenchError, Result};
use crate::simulator::DEFAULT_FAULT_REASON;

/// Smallest chunk buffer an OPC-UA peer may announce.
pub const MIN_BUFFER_SIZE: u32 = 8192;

/// Limits and timing for the bench server and client.
///
/// Every field has a default, so a config file only needs the keys it
/// changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BenchConfig {
    pub protocol_version: u32,
    pub receive_buffer_size: u32,
    pub send_buffer_size: u32,
    /// Largest message accepted or sent, header included.
    pub max_message_size: u32,
    /// `0` means no limit.
    pub max_chunk_count: u32,
    pub handshake_timeout_ms: u64,
    /// Sleep between idle server loop iterations.
    pub poll_interval_ms: u64,
    /// Reason text of injected ERR frames. `null` sends a null string.
    pub fault_reason: Option<String>,
    pub max_connections: usize,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            receive_buffer_size: 65_535,
            send_buffer_size: 65_535,
            max_message_size: 16 * 1024 * 1024,
            max_chunk_count: 0,
            handshake_timeout_ms: 5_000,
            poll_interval_ms: 5,
            fault_reason: Some(DEFAULT_FAULT_REASON.to_string()),
            max_connections: 64,
        }
    }
}

impl BenchConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<()> {
        if self.receive_buffer_size < MIN_BUFFER_SIZE || self.send_buffer_size < MIN_BUFFER_SIZE {
            return Err(BenchError::Config(format!(
                "buffer sizes must be at least {MIN_BUFFER_SIZE} bytes"
            )));
        }
        if (self.max_message_size as usize) < uabench_frame::SECURE_HEADER_SIZE {
            return Err(BenchError::Config(format!(
                "max_message_size {} cannot hold a message header",
                self.max_message_size
            )));
        }
        if self.handshake_timeout_ms == 0 {
            return Err(BenchError::Config(
                "handshake_timeout_ms must be at least 1".to_string(),
            ));
        }
        if self.max_connections == 0 {
            return Err(BenchError::Config(
                "max_connections must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Reader/writer limits derived from this config.
    pub fn frame_config(&self) -> FrameConfig {
        FrameConfig {
            max_message_size: self.max_message_size as usize,
            read_timeout: Some(self.handshake_timeout()),
            write_timeout: Some(self.handshake_timeout()),
        }
    }
}

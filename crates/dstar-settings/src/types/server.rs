//! Server location and connection tuning.

use serde::{Deserialize, Serialize};

/// Where the DS-STAR server lives.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// HTTP base URL. The WebSocket scheme is derived from it.
    pub base_url: String,
    /// Path of the query WebSocket.
    pub ws_path: String,
    /// Path prefix of the file side-channel.
    pub api_prefix: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            ws_path: dstar_core::QUERY_WS_PATH.to_string(),
            api_prefix: "/api".to_string(),
        }
    }
}

/// WebSocket connection tuning.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectionSettings {
    /// Upper bound on the opening handshake.
    pub connect_timeout_ms: u64,
    /// Capacity of the inbound connection-event channel.
    pub event_channel_capacity: usize,
    /// Capacity of the outbound command queue.
    pub outbound_channel_capacity: usize,
    /// Extra connect attempts the CLI makes before giving up.
    pub connect_retries: u32,
    /// Delay between CLI connect attempts.
    pub retry_delay_ms: u64,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 10_000,
            event_channel_capacity: 256,
            outbound_channel_capacity: 32,
            connect_retries: 3,
            retry_delay_ms: 1_000,
        }
    }
}

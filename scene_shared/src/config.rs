//! Configuration system.
//!
//! Loads engine configuration from JSON strings/files (file IO left to app).

use serde::{Deserialize, Serialize};

/// Root configuration shared by client/server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Server listen address, e.g. `127.0.0.1:40000`.
    pub server_addr: String,
    /// Fixed simulation tick rate.
    pub tick_hz: u32,
    /// Path to stages directory.
    #[serde(default = "default_stages_dir")]
    pub stages_dir: String,
    /// Stage to load at startup; none means an empty stage.
    #[serde(default)]
    pub stage: Option<String>,
    /// Prop type spawned for a connecting client.
    #[serde(default = "default_player_prop")]
    pub player_prop: String,
}

fn default_stages_dir() -> String {
    "stages".to_string()
}

fn default_player_prop() -> String {
    "player".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:40000".to_string(),
            tick_hz: 64,
            stages_dir: default_stages_dir(),
            stage: None,
            player_prop: default_player_prop(),
        }
    }
}

impl EngineConfig {
    /// Parses config from JSON.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }
}

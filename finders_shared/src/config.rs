//! Configuration system.
//!
//! Loads client configuration from JSON strings/files (file IO left to app).
//! Every field has a default, so `{}` is a valid config.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Client configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientConfig {
    /// Server address, e.g. `127.0.0.1:8087` or `tcp://host:port`.
    #[serde(default = "default_server_url")]
    pub server_url: String,
    /// Display name sent in `Join` and used to recognise our own record.
    #[serde(default = "default_player_name")]
    pub player_name: String,
    /// Host update loop rate.
    #[serde(default = "default_tick_hz")]
    pub tick_hz: u32,
    /// Distance moved since the last send that forces a new send.
    #[serde(default = "default_send_threshold")]
    pub send_threshold: f32,
    /// Time since the last send that forces a new send.
    #[serde(default = "default_send_interval_ms")]
    pub send_interval_ms: u64,
    /// Exponential approach rate for remote players, per second.
    #[serde(default = "default_smooth_rate")]
    pub smooth_rate: f32,
    /// When false, remote players snap to each reported position.
    #[serde(default = "default_true")]
    pub smoothing: bool,
    /// Local movement speed in units per second.
    #[serde(default = "default_move_speed")]
    pub move_speed: f32,
    /// Smoothing time of the locally predicted position, in seconds.
    #[serde(default = "default_local_smooth_time")]
    pub local_smooth_time: f32,
    /// Remote players without updates for this long are reported stale.
    #[serde(default = "default_stale_after_ms")]
    pub stale_after_ms: u64,
}

fn default_server_url() -> String {
    "127.0.0.1:8087".to_string()
}

fn default_player_name() -> String {
    "Player".to_string()
}

fn default_tick_hz() -> u32 {
    60
}

fn default_send_threshold() -> f32 {
    0.1
}

fn default_send_interval_ms() -> u64 {
    50
}

fn default_smooth_rate() -> f32 {
    10.0
}

fn default_true() -> bool {
    true
}

fn default_move_speed() -> f32 {
    5.0
}

fn default_local_smooth_time() -> f32 {
    0.1
}

fn default_stale_after_ms() -> u64 {
    100
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            player_name: default_player_name(),
            tick_hz: default_tick_hz(),
            send_threshold: default_send_threshold(),
            send_interval_ms: default_send_interval_ms(),
            smooth_rate: default_smooth_rate(),
            smoothing: true,
            move_speed: default_move_speed(),
            local_smooth_time: default_local_smooth_time(),
            stale_after_ms: default_stale_after_ms(),
        }
    }
}

impl ClientConfig {
    /// Parses config from JSON.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    pub fn send_interval(&self) -> Duration {
        Duration::from_millis(self.send_interval_ms)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_millis(self.stale_after_ms)
    }

    /// Duration of one host tick; a zero rate is treated as 1 Hz.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f32(1.0 / self.tick_hz.max(1) as f32)
    }
}

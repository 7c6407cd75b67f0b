use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PlayerConfig {
    /// Period of the shared position poller.
    #[serde(default = "default_position_update_interval_ms")]
    pub position_update_interval_ms: u64,
    /// Volume multiplier applied while another holder owns output focus.
    #[serde(default = "default_duck_volume")]
    pub duck_volume: f64,
    /// Upper bound on bytes fetched from a remote source to probe its duration.
    #[serde(default = "default_probe_max_bytes")]
    pub probe_max_bytes: usize,
    #[serde(default = "default_http_timeout_ms")]
    pub http_timeout_ms: u64,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            position_update_interval_ms: default_position_update_interval_ms(),
            duck_volume: default_duck_volume(),
            probe_max_bytes: default_probe_max_bytes(),
            http_timeout_ms: default_http_timeout_ms(),
        }
    }
}

fn default_position_update_interval_ms() -> u64 {
    200
}

fn default_duck_volume() -> f64 {
    0.2
}

fn default_probe_max_bytes() -> usize {
    32 * 1024 * 1024
}

fn default_http_timeout_ms() -> u64 {
    10_000
}

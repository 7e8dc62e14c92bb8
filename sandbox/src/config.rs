use log::warn;
use serde::{Deserialize, Serialize};
use std::fs;

const CONFIG_FILENAME: &str = "sandbox.json";
const DEFAULT_LOCAL_PLAYER: &str = "Avery";
const DEFAULT_TURN_TIMEOUT_SECONDS: i64 = 604_800; // one week

#[derive(Serialize, Deserialize, Default)]
pub struct SandboxConfig {
    /// Display name the arena authenticates the local process for.
    local_player: Option<String>,
    turn_timeout_seconds: Option<i64>,
    start_fresh_on_decode_failure: Option<bool>,
}

impl SandboxConfig {
    /// Reads `sandbox.json` from the working directory, falling back to
    /// defaults when it is missing or malformed.
    pub fn load() -> SandboxConfig {
        match fs::read_to_string(CONFIG_FILENAME) {
            Ok(text) => serde_json::from_str(&text).unwrap_or_else(|err| {
                warn!("Ignoring malformed {CONFIG_FILENAME}: {err}");
                SandboxConfig::default()
            }),
            Err(_) => SandboxConfig::default(),
        }
    }

    pub fn local_player(&self) -> &str {
        self.local_player.as_deref().unwrap_or(DEFAULT_LOCAL_PLAYER)
    }

    pub fn turn_timeout_seconds(&self) -> i64 {
        self.turn_timeout_seconds
            .unwrap_or(DEFAULT_TURN_TIMEOUT_SECONDS)
    }

    pub fn start_fresh_on_decode_failure(&self) -> bool {
        self.start_fresh_on_decode_failure.unwrap_or(true)
    }
}

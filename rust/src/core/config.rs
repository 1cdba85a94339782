use std::path::Path;

use serde::Deserialize;

use super::AppCore;

const DEFAULT_API_URL: &str = "https://api.qinglian.app/api";
const DEFAULT_WS_URL: &str = "wss://api.qinglian.app/ws/websocket";

// Client and server advertise the same interval in the STOMP handshake.
pub(super) const DEFAULT_HEARTBEAT_MS: u64 = 10_000;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(super) struct AppConfig {
    pub(super) disable_network: Option<bool>,
    pub(super) api_url: Option<String>,
    pub(super) ws_url: Option<String>,
    pub(super) heartbeat_ms: Option<u64>,
}

pub(super) fn load_app_config(data_dir: &str) -> AppConfig {
    let path = Path::new(data_dir).join("qinglian_config.json");
    let Ok(bytes) = std::fs::read(&path) else {
        return AppConfig::default();
    };
    serde_json::from_slice::<AppConfig>(&bytes).unwrap_or_default()
}

impl AppCore {
    pub(super) fn network_enabled(&self) -> bool {
        // Used to keep Rust tests deterministic and offline.
        if let Some(disable) = self.config.disable_network {
            return !disable;
        }
        std::env::var("QINGLIAN_DISABLE_NETWORK").ok().as_deref() != Some("1")
    }

    pub(super) fn api_url(&self) -> String {
        match self.config.api_url.as_deref() {
            Some(url) if !url.is_empty() => url.trim_end_matches('/').to_string(),
            _ => DEFAULT_API_URL.to_string(),
        }
    }

    pub(super) fn ws_url(&self) -> String {
        match self.config.ws_url.as_deref() {
            Some(url) if !url.is_empty() => url.to_string(),
            _ => DEFAULT_WS_URL.to_string(),
        }
    }

    pub(super) fn heartbeat_ms(&self) -> u64 {
        self.config
            .heartbeat_ms
            .filter(|ms| *ms > 0)
            .unwrap_or(DEFAULT_HEARTBEAT_MS)
    }
}

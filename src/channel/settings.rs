//! Where the channel connects and how it paces itself.
//!
//! Values come from the settings file (see [`Config`]), falling back to the
//! defaults below.  The endpoint can also be overridden with the
//! `FUZZYMIX_WS_URL` environment variable, which beats the file.
use std::time::Duration;

use json::JsonValue;
use log::{error, info};
use simple_error::bail;
use url::Url;

use crate::channel::ws_transport::WsTimeouts;
use crate::common::{box_error::BoxError, config::Config};
use crate::utils::ms_to_micros;

pub const DEFAULT_SETTINGS_FILE: &str = "fuzzymix_settings.json";
pub const DEFAULT_WS_URL: &str = "ws://localhost:5000/ws";
pub const WS_URL_ENV: &str = "FUZZYMIX_WS_URL";
pub const DEFAULT_RECONNECT_DELAY_MS: u32 = 3_000;
pub const DEFAULT_READ_TIMEOUT_MS: u32 = 50;
pub const DEFAULT_CONNECT_TIMEOUT_MS: u32 = 2_000;
pub const DEFAULT_WRITE_TIMEOUT_MS: u32 = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct ChannelSettings {
    pub ws_url: String,
    pub reconnect_delay_ms: u32,
    pub read_timeout_ms: u32,
    pub connect_timeout_ms: u32,
    pub write_timeout_ms: u32,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        ChannelSettings {
            ws_url: DEFAULT_WS_URL.to_string(),
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY_MS,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            write_timeout_ms: DEFAULT_WRITE_TIMEOUT_MS,
        }
    }
}

pub fn default_params() -> JsonValue {
    json::object! {
        "ws_url": DEFAULT_WS_URL,
        "reconnect_delay_ms": DEFAULT_RECONNECT_DELAY_MS,
        "read_timeout_ms": DEFAULT_READ_TIMEOUT_MS,
        "connect_timeout_ms": DEFAULT_CONNECT_TIMEOUT_MS,
        "write_timeout_ms": DEFAULT_WRITE_TIMEOUT_MS
    }
}

/// Accept only ws:// and wss:// endpoints.
pub fn validate_ws_url(ws_url: &str) -> Result<(), BoxError> {
    let parsed = Url::parse(ws_url)?;
    match parsed.scheme() {
        "ws" | "wss" => Ok(()),
        other => {
            bail!("unsupported scheme '{}' in endpoint {}", other, ws_url);
        }
    }
}

impl ChannelSettings {
    /// Read `config_file` (default `fuzzymix_settings.json`) and the environment.
    pub fn load(config_file: Option<&str>) -> Result<ChannelSettings, BoxError> {
        let filename = config_file.unwrap_or(DEFAULT_SETTINGS_FILE);
        info!("settings::load - using config file: {}", filename);
        let config = Config::build(String::from(filename), default_params()).map_err(|e| {
            error!("settings::load - issue with config file or parameter: {}", e);
            e
        })?;
        Self::from_config(&config, std::env::var(WS_URL_ENV).ok())
    }

    /// Build from an already loaded config.  `env_url`, when set, replaces the endpoint.
    pub fn from_config(config: &Config, env_url: Option<String>) -> Result<ChannelSettings, BoxError> {
        let ws_url = match env_url.filter(|u| !u.trim().is_empty()) {
            Some(url) => url.trim().to_string(),
            None => config.get_str_value("ws_url", None)?,
        };
        validate_ws_url(&ws_url)?;
        let settings = ChannelSettings {
            ws_url,
            reconnect_delay_ms: config.get_u32_value("reconnect_delay_ms", None)?,
            read_timeout_ms: config.get_u32_value("read_timeout_ms", None)?,
            connect_timeout_ms: config.get_u32_value("connect_timeout_ms", None)?,
            write_timeout_ms: config.get_u32_value("write_timeout_ms", None)?,
        };
        info!(
            "settings::from_config - ws_url: {}, reconnect_delay_ms: {}, read_timeout_ms: {}, connect_timeout_ms: {}, write_timeout_ms: {}",
            settings.ws_url,
            settings.reconnect_delay_ms,
            settings.read_timeout_ms,
            settings.connect_timeout_ms,
            settings.write_timeout_ms
        );
        Ok(settings)
    }

    /// Copy the effective values into `config` so they can be saved.
    pub fn store_into(&self, config: &mut Config) -> Result<(), BoxError> {
        config.set_value("ws_url", self.ws_url.as_str())?;
        config.set_value("reconnect_delay_ms", self.reconnect_delay_ms)?;
        config.set_value("read_timeout_ms", self.read_timeout_ms)?;
        config.set_value("connect_timeout_ms", self.connect_timeout_ms)?;
        config.set_value("write_timeout_ms", self.write_timeout_ms)?;
        Ok(())
    }

    /// Reconnect delay on the microsecond clock the channel runs on.
    pub fn reconnect_delay(&self) -> u128 {
        ms_to_micros(self.reconnect_delay_ms)
    }
    // a zero timeout is refused by the socket layer, so floor at 1ms
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms.max(1) as u64)
    }
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms.max(1) as u64)
    }
    /// Longest a single `send` may wait on a peer that stopped reading.
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms.max(1) as u64)
    }

    pub fn ws_timeouts(&self) -> WsTimeouts {
        WsTimeouts {
            connect: self.connect_timeout(),
            read: self.read_timeout(),
            write: self.write_timeout(),
        }
    }
}

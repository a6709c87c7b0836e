//! Controller settings read from `lmsconfig`.
//!
//! The engine never reads the global configuration by itself: a caller
//! builds a [`ControllerSettings`] (from a `Config`, or by hand) and hands
//! it to the controller.
//!
//! ```no_run
//! use lmsconfig::get_config;
//! use lmscontrol::ControllerConfigExt;
//!
//! # fn main() -> anyhow::Result<()> {
//! let settings = get_config().get_controller_settings()?;
//! println!("polling {} every {:?}", settings.server_url, settings.player_status);
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use anyhow::Result;
use lmsconfig::{
    Config, DEFAULT_PLAYER_STATUS_MS, DEFAULT_PLAYTIME_TICK_MS, DEFAULT_REQUEST_TIMEOUT_MS,
    DEFAULT_RPC_PATH, DEFAULT_SCAN_POLL_MS, DEFAULT_SERVER_STATUS_IDLE_MS,
    DEFAULT_SERVER_STATUS_MS, DEFAULT_SERVER_URL,
};

use crate::model::PlayerId;

/// Everything a controller needs to know about its environment.
#[derive(Clone, Debug, PartialEq)]
pub struct ControllerSettings {
    pub server_url: String,
    pub rpc_path: String,
    pub request_timeout: Duration,
    pub player_status: Duration,
    pub server_status: Duration,
    /// Server-status interval once a player is selected and no scan runs.
    pub server_status_idle: Duration,
    /// Server-status interval right after the rescan flag flipped.
    pub scan_poll: Duration,
    pub playtime_tick: Duration,
    pub preferred_player: Option<PlayerId>,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            rpc_path: DEFAULT_RPC_PATH.to_string(),
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            player_status: Duration::from_millis(DEFAULT_PLAYER_STATUS_MS),
            server_status: Duration::from_millis(DEFAULT_SERVER_STATUS_MS),
            server_status_idle: Duration::from_millis(DEFAULT_SERVER_STATUS_IDLE_MS),
            scan_poll: Duration::from_millis(DEFAULT_SCAN_POLL_MS),
            playtime_tick: Duration::from_millis(DEFAULT_PLAYTIME_TICK_MS),
            preferred_player: None,
        }
    }
}

impl ControllerSettings {
    pub fn with_server_url(mut self, url: impl Into<String>) -> Self {
        self.server_url = url.into();
        self
    }

    pub fn with_preferred_player(mut self, player: Option<PlayerId>) -> Self {
        self.preferred_player = player;
        self
    }
}

/// Extension trait exposing controller settings on `lmsconfig::Config`.
pub trait ControllerConfigExt {
    fn get_controller_settings(&self) -> Result<ControllerSettings>;

    /// Player to fall back to when the selected one disappears.
    fn get_preferred_player_id(&self) -> Result<Option<PlayerId>>;
}

impl ControllerConfigExt for Config {
    fn get_controller_settings(&self) -> Result<ControllerSettings> {
        Ok(ControllerSettings {
            server_url: self.get_server_url()?,
            rpc_path: self.get_rpc_path()?,
            request_timeout: Duration::from_millis(self.get_request_timeout_ms()?),
            player_status: Duration::from_millis(self.get_player_status_ms()?),
            server_status: Duration::from_millis(self.get_server_status_ms()?),
            server_status_idle: Duration::from_millis(self.get_server_status_idle_ms()?),
            scan_poll: Duration::from_millis(self.get_scan_poll_ms()?),
            playtime_tick: Duration::from_millis(self.get_playtime_tick_ms()?),
            preferred_player: self.get_preferred_player_id()?,
        })
    }

    fn get_preferred_player_id(&self) -> Result<Option<PlayerId>> {
        Ok(self.get_preferred_player()?.map(PlayerId::new))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_defaults_match_settings_default() {
        let config = Config::from_yaml_str("{}").unwrap();
        assert_eq!(
            config.get_controller_settings().unwrap(),
            ControllerSettings::default()
        );
    }

    #[test]
    fn test_overrides_are_read() {
        let config = Config::from_yaml_str(
            r#"
server:
  url: "http://10.0.0.5:9000/"
observers:
  scan_poll_ms: 500
player:
  preferred: "00:04:20:aa:bb:cc"
"#,
        )
        .unwrap();

        let settings = config.get_controller_settings().unwrap();
        assert_eq!(settings.server_url, "http://10.0.0.5:9000/");
        assert_eq!(settings.scan_poll, Duration::from_millis(500));
        assert_eq!(settings.player_status, Duration::from_millis(5000));
        assert_eq!(
            settings.preferred_player,
            Some(PlayerId::new("00:04:20:aa:bb:cc"))
        );
    }
}

//! Data types exchanged with the server and held by the controller.
//!
//! The `result` objects returned by the server are loosely typed: numbers
//! sometimes arrive as strings, booleans as `0`/`1`. The `lenient` helpers
//! below accept every encoding seen in practice, and every struct keeps
//! unknown fields in an opaque `extra` map.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::time_utils::format_time;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub String);

impl PlayerId {
    pub fn new(id: impl Into<String>) -> Self {
        PlayerId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Power {
    On,
    Off,
    #[default]
    Unknown,
}

impl From<bool> for Power {
    fn from(on: bool) -> Self {
        if on { Power::On } else { Power::Off }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Stop,
    Play,
    Pause,
}

impl Mode {
    fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "stop" => Some(Mode::Stop),
            "play" => Some(Mode::Play),
            "pause" => Some(Mode::Pause),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RepeatMode {
    Off,
    Song,
    Playlist,
}

impl RepeatMode {
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(RepeatMode::Off),
            1 => Some(RepeatMode::Song),
            2 => Some(RepeatMode::Playlist),
            _ => None,
        }
    }

    pub fn code(self) -> u32 {
        match self {
            RepeatMode::Off => 0,
            RepeatMode::Song => 1,
            RepeatMode::Playlist => 2,
        }
    }
}

/// One row of `playlist_loop`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaylistEntry {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default, rename = "playlist index", deserialize_with = "lenient::opt_u32")]
    pub playlist_index: Option<u32>,
    #[serde(default)]
    pub artist: Option<String>,
    #[serde(default)]
    pub album: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The `result` object of a `status` query.
///
/// Background polls request the cheap tag set and get a summary; a full
/// refresh requests the expensive one. Both decode into this type, fields
/// the server did not send stay `None`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusResult {
    #[serde(default)]
    pub player_name: Option<String>,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub player_connected: bool,
    #[serde(default, deserialize_with = "lenient::opt_bool")]
    pub power: Option<bool>,
    #[serde(default, deserialize_with = "lenient::opt_mode")]
    pub mode: Option<Mode>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub rate: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub time: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub duration: Option<f64>,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub can_seek: bool,
    #[serde(default, rename = "playlist repeat", deserialize_with = "lenient::opt_u32")]
    pub repeat: Option<u32>,
    #[serde(default, rename = "playlist shuffle", deserialize_with = "lenient::opt_u32")]
    pub shuffle: Option<u32>,
    #[serde(default, rename = "mixer volume", deserialize_with = "lenient::opt_f64")]
    pub volume: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_u32")]
    pub playlist_cur_index: Option<u32>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub playlist_timestamp: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_u32")]
    pub playlist_tracks: Option<u32>,
    #[serde(default)]
    pub current_title: Option<String>,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub rescan: bool,
    #[serde(default, rename = "showBriefly")]
    pub show_briefly: Vec<String>,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub player_needs_upgrade: bool,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub player_is_upgrading: bool,
    #[serde(default)]
    pub playlist_loop: Vec<PlaylistEntry>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StatusResult {
    /// First row of `playlist_loop` when the playlist is not empty.
    pub fn current_entry(&self) -> Option<&PlaylistEntry> {
        match self.playlist_tracks {
            Some(tracks) if tracks > 0 => self.playlist_loop.first(),
            _ => None,
        }
    }
}

/// One row of `players_loop` in a server status.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub playerid: PlayerId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub connected: bool,
    #[serde(default, deserialize_with = "lenient::opt_bool")]
    pub power: Option<bool>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PlayerInfo {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            playerid: PlayerId::new(id),
            name: Some(name.into()),
            connected: true,
            power: None,
            model: None,
            ip: None,
            extra: Map::new(),
        }
    }
}

/// The `result` object of a `serverstatus` query.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerStatus {
    #[serde(default, deserialize_with = "lenient::flag")]
    pub rescan: bool,
    #[serde(default)]
    pub lastscanfailed: Option<String>,
    #[serde(default)]
    pub progressname: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_u64")]
    pub progressdone: Option<u64>,
    #[serde(default, deserialize_with = "lenient::opt_u64")]
    pub progresstotal: Option<u64>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default, rename = "player count", deserialize_with = "lenient::opt_u32")]
    pub player_count: Option<u32>,
    #[serde(default)]
    pub players_loop: Vec<PlayerInfo>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ServerStatus {
    pub fn find_player(&self, id: &PlayerId) -> Option<&PlayerInfo> {
        self.players_loop.iter().find(|p| &p.playerid == id)
    }
}

/// Last known state of the selected player.
///
/// Replaced wholesale after each full refresh, reset to `Default` when the
/// selected player changes.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PlayerStatus {
    pub power: Power,
    pub mode: Option<Mode>,
    pub rate: f64,
    pub current_title: Option<String>,
    pub title: Option<String>,
    pub track: Option<String>,
    pub playlist_tracks: Option<u32>,
    pub index: Option<u32>,
    pub duration: u32,
    pub playtime: u32,
    pub timestamp: Option<f64>,
    pub repeat: Option<RepeatMode>,
    pub rescan: bool,
    pub can_seek: bool,
}

impl PlayerStatus {
    /// Builds the record from a full status result.
    ///
    /// A missing `power` field means a client without power management,
    /// which is treated as always on. `rescan` is server-wide and is carried
    /// over by the caller rather than read from the result.
    pub fn from_result(result: &StatusResult, rescan: bool) -> Self {
        let entry = result.current_entry();
        Self {
            power: result.power.map(Power::from).unwrap_or(Power::On),
            mode: result.mode,
            rate: result.rate.unwrap_or(1.0),
            current_title: result.current_title.clone(),
            title: entry.and_then(|e| e.title.clone()),
            track: entry.and_then(|e| e.url.clone()),
            playlist_tracks: result.playlist_tracks,
            index: result.playlist_cur_index,
            duration: whole_seconds(result.duration),
            playtime: whole_seconds(result.time),
            timestamp: result.playlist_timestamp,
            repeat: result.repeat.and_then(RepeatMode::from_code),
            rescan,
            can_seek: result.can_seek,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.mode == Some(Mode::Play)
    }
}

pub(crate) fn whole_seconds(value: Option<f64>) -> u32 {
    match value {
        Some(v) if v.is_finite() && v > 0.0 => v.trunc() as u32,
        _ => 0,
    }
}

/// Payload of the playtime event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlaytimeInfo {
    pub current: u32,
    pub duration: u32,
    pub remaining: u32,
}

impl PlaytimeInfo {
    pub fn new(current: u32, duration: u32) -> Self {
        Self {
            current,
            duration,
            remaining: duration.saturating_sub(current),
        }
    }

    pub fn elapsed_label(&self) -> String {
        format_time(i64::from(self.current))
    }

    /// Remaining time as `-m:ss`, or an empty string for streams without a duration.
    pub fn remaining_label(&self) -> String {
        if self.duration == 0 {
            return String::new();
        }
        format_time(-i64::from(self.remaining))
    }
}

/// Payload of the scanner event.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScanUpdate {
    pub rescan: bool,
    pub progress_name: Option<String>,
    pub progress_done: Option<u64>,
    pub progress_total: Option<u64>,
    pub last_scan_failed: Option<String>,
}

impl From<&ServerStatus> for ScanUpdate {
    fn from(status: &ServerStatus) -> Self {
        Self {
            rescan: status.rescan,
            progress_name: status.progressname.clone(),
            progress_done: status.progressdone,
            progress_total: status.progresstotal,
            last_scan_failed: status.lastscanfailed.clone(),
        }
    }
}

impl From<&StatusResult> for ScanUpdate {
    fn from(status: &StatusResult) -> Self {
        Self {
            rescan: status.rescan,
            ..Default::default()
        }
    }
}

mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    use super::Mode;

    fn as_f64(value: &Value) -> Option<f64> {
        match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn opt_f64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
        let value = Option::<Value>::deserialize(d)?;
        Ok(value.as_ref().and_then(as_f64))
    }

    pub fn opt_u64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u64>, D::Error> {
        let value = Option::<Value>::deserialize(d)?;
        Ok(value
            .as_ref()
            .and_then(as_f64)
            .filter(|v| *v >= 0.0)
            .map(|v| v as u64))
    }

    pub fn opt_u32<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u32>, D::Error> {
        let value = Option::<Value>::deserialize(d)?;
        Ok(value
            .as_ref()
            .and_then(as_f64)
            .filter(|v| *v >= 0.0 && *v <= f64::from(u32::MAX))
            .map(|v| v as u32))
    }

    pub fn opt_bool<'de, D: Deserializer<'de>>(d: D) -> Result<Option<bool>, D::Error> {
        let value = Option::<Value>::deserialize(d)?;
        Ok(value.as_ref().and_then(as_f64).map(|v| v != 0.0))
    }

    pub fn flag<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
        Ok(opt_bool(d)?.unwrap_or(false))
    }

    pub fn opt_mode<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Mode>, D::Error> {
        let value = Option::<Value>::deserialize(d)?;
        Ok(value.as_ref().and_then(Value::as_str).and_then(Mode::parse))
    }
}

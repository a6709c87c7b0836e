//! Typed vocabulary of the commands the controller sends.
//!
//! On the wire a command is a JSON array whose first element is the command
//! name followed by positional arguments, e.g. `["playlist", "move", 5, 2]`.

use serde_json::{Value, json};

/// Tag set requested by background polls: enough to run the diff.
pub const SUMMARY_TAGS: &str = "tags:uB";

/// Tag set requested by a full refresh.
pub const FULL_STATUS_TAGS: &str = "tags:gABbehldiqtyrSuoKLN";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusDetail {
    Summary,
    Full,
}

impl StatusDetail {
    pub fn tags(self) -> &'static str {
        match self {
            StatusDetail::Summary => SUMMARY_TAGS,
            StatusDetail::Full => FULL_STATUS_TAGS,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Volume {
    Absolute(u32),
    Relative(i32),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Seek {
    Absolute(f64),
    Relative(f64),
}

#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// Current item only, starting at the playing position.
    Status(StatusDetail),
    ServerStatus { start: u32, count: u32 },
    PlaylistMove { from: usize, to: usize },
    PlaylistClear,
    /// Jump to an item of the playlist.
    PlaylistIndex(usize),
    PlaylistDelete(usize),
    PlaylistRepeat(u32),
    PlaylistShuffle(u32),
    MixerVolume(Volume),
    /// `None` toggles.
    Power(Option<bool>),
    Play,
    /// `None` toggles.
    Pause(Option<bool>),
    Stop,
    Time(Seek),
    Raw(Vec<Value>),
}

impl Command {
    pub fn server_status() -> Self {
        Command::ServerStatus {
            start: 0,
            count: 999,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Command::Status(_) => "status",
            Command::ServerStatus { .. } => "serverstatus",
            Command::PlaylistMove { .. }
            | Command::PlaylistClear
            | Command::PlaylistIndex(_)
            | Command::PlaylistDelete(_)
            | Command::PlaylistRepeat(_)
            | Command::PlaylistShuffle(_) => "playlist",
            Command::MixerVolume(_) => "mixer",
            Command::Power(_) => "power",
            Command::Play => "play",
            Command::Pause(_) => "pause",
            Command::Stop => "stop",
            Command::Time(_) => "time",
            Command::Raw(args) => args.first().and_then(Value::as_str).unwrap_or(""),
        }
    }

    /// The command array as sent inside the request envelope.
    pub fn to_params(&self) -> Vec<Value> {
        match self {
            Command::Status(detail) => vec![json!("status"), json!("-"), json!(1), json!(detail.tags())],
            Command::ServerStatus { start, count } => {
                vec![json!("serverstatus"), json!(start), json!(count)]
            }
            Command::PlaylistMove { from, to } => {
                vec![json!("playlist"), json!("move"), json!(from), json!(to)]
            }
            Command::PlaylistClear => vec![json!("playlist"), json!("clear")],
            Command::PlaylistIndex(index) => vec![json!("playlist"), json!("index"), json!(index)],
            Command::PlaylistDelete(index) => vec![json!("playlist"), json!("delete"), json!(index)],
            Command::PlaylistRepeat(mode) => vec![json!("playlist"), json!("repeat"), json!(mode)],
            Command::PlaylistShuffle(mode) => vec![json!("playlist"), json!("shuffle"), json!(mode)],
            Command::MixerVolume(Volume::Absolute(level)) => {
                vec![json!("mixer"), json!("volume"), json!(level.min(&100))]
            }
            Command::MixerVolume(Volume::Relative(delta)) => {
                vec![json!("mixer"), json!("volume"), json!(format!("{delta:+}"))]
            }
            Command::Power(None) => vec![json!("power")],
            Command::Power(Some(on)) => vec![json!("power"), json!(u8::from(*on))],
            Command::Play => vec![json!("play")],
            Command::Pause(None) => vec![json!("pause")],
            Command::Pause(Some(paused)) => vec![json!("pause"), json!(u8::from(*paused))],
            Command::Stop => vec![json!("stop")],
            Command::Time(Seek::Absolute(seconds)) => vec![json!("time"), json!(seconds)],
            Command::Time(Seek::Relative(delta)) => vec![json!("time"), json!(format!("{delta:+}"))],
            Command::Raw(args) => args.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_params() {
        assert_eq!(
            Command::Status(StatusDetail::Summary).to_params(),
            vec![json!("status"), json!("-"), json!(1), json!("tags:uB")]
        );
        assert_eq!(
            Command::Status(StatusDetail::Full).to_params()[3],
            json!(FULL_STATUS_TAGS)
        );
    }

    #[test]
    fn test_playlist_params() {
        assert_eq!(
            Command::PlaylistMove { from: 5, to: 2 }.to_params(),
            vec![json!("playlist"), json!("move"), json!(5), json!(2)]
        );
        assert_eq!(Command::PlaylistIndex(3).name(), "playlist");
        assert_eq!(
            Command::server_status().to_params(),
            vec![json!("serverstatus"), json!(0), json!(999)]
        );
    }

    #[test]
    fn test_relative_arguments_are_signed_strings() {
        assert_eq!(
            Command::MixerVolume(Volume::Relative(10)).to_params()[2],
            json!("+10")
        );
        assert_eq!(
            Command::MixerVolume(Volume::Relative(-20)).to_params()[2],
            json!("-20")
        );
        assert_eq!(
            Command::MixerVolume(Volume::Absolute(250)).to_params()[2],
            json!(100)
        );
        assert_eq!(Command::Time(Seek::Relative(-15.0)).to_params()[1], json!("-15"));
    }

    #[test]
    fn test_toggles_and_raw() {
        assert_eq!(Command::Pause(None).to_params(), vec![json!("pause")]);
        assert_eq!(Command::Power(Some(false)).to_params(), vec![json!("power"), json!(0)]);
        let raw = Command::Raw(vec![json!("button"), json!("jump_fwd")]);
        assert_eq!(raw.name(), "button");
        assert_eq!(raw.to_params().len(), 2);
    }
}

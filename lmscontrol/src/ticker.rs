//! Local playtime interpolation between two polls.
//!
//! The server never pushes track boundaries, so the ticker also watches the
//! last seconds of a track and asks for a full refresh when the boundary is
//! due.

use crate::model::{Mode, PlayerStatus, PlaytimeInfo};

/// Default tick interval; just under a second so the displayed seconds never stall.
pub const DEFAULT_TICK_MS: u64 = 950;

/// Outcome of one tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Tick {
    pub info: PlaytimeInfo,
    /// A full refresh should be requested.
    pub refresh: bool,
}

/// True when a playing track is within a second of its end or up to two past it.
pub fn near_track_boundary(status: &PlayerStatus) -> bool {
    status.is_playing()
        && status.duration > 0
        && status.playtime.saturating_add(1) >= status.duration
        && status.playtime <= status.duration.saturating_add(2)
}

/// Advances the interpolated playtime by one tick.
///
/// The returned info reflects the time *before* the increment, matching
/// what was last displayed plus the stop clamp.
pub fn advance(status: &mut PlayerStatus) -> Tick {
    let refresh = near_track_boundary(status);

    if status.mode == Some(Mode::Stop) {
        status.playtime = 0;
    }

    let info = PlaytimeInfo::new(status.playtime, status.duration);

    // no interpolation while scanning (rate != 1)
    if status.is_playing() && status.rate == 1.0 {
        status.playtime = status.playtime.saturating_add(1);
    }

    Tick { info, refresh }
}

//! Change detection between a polled status and the cached player status.
//!
//! A polled result only votes on the fields it actually carries: a field the
//! server left out never counts as a change. The playlist revision counts
//! only when it moves forward, so a late answer carrying an older revision
//! is ignored. The current index is compared as a value (`Some(0)` differs
//! from `None`), the playlist revision alone never stands in for it.

use crate::model::{PlayerStatus, Power, StatusResult};

/// Fields whose change warrants a full refresh.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusField {
    Power,
    Mode,
    PlaylistTimestamp,
    CurrentIndex,
    CurrentTitle,
    TrackTitle,
    TrackUrl,
    TrackPresence,
    Rate,
    Repeat,
    PlaylistLength,
}

/// Lists every tracked field on which `result` disagrees with `status`.
pub fn changed_fields(status: &PlayerStatus, result: &StatusResult) -> Vec<StatusField> {
    let mut changed = Vec::new();

    if let Some(power) = result.power {
        if Power::from(power) != status.power {
            changed.push(StatusField::Power);
        }
    }

    if let Some(mode) = result.mode {
        if status.mode != Some(mode) {
            changed.push(StatusField::Mode);
        }
    }

    if let Some(timestamp) = result.playlist_timestamp {
        let newer = match status.timestamp {
            Some(known) => timestamp > known,
            None => true,
        };
        if newer {
            changed.push(StatusField::PlaylistTimestamp);
        }
    }

    if let Some(index) = result.playlist_cur_index {
        if status.index != Some(index) {
            changed.push(StatusField::CurrentIndex);
        }
    }

    if let Some(title) = result.current_title.as_deref() {
        if status.current_title.as_deref() != Some(title) {
            changed.push(StatusField::CurrentTitle);
        }
    }

    if let Some(entry) = result.current_entry() {
        if let Some(title) = entry.title.as_deref() {
            if status.title.as_deref() != Some(title) {
                changed.push(StatusField::TrackTitle);
            }
        }
        if let Some(url) = entry.url.as_deref() {
            if status.track.as_deref() != Some(url) {
                changed.push(StatusField::TrackUrl);
            }
        }
    }

    if let Some(tracks) = result.playlist_tracks {
        // an emptied playlist, or a first track appearing
        if (tracks == 0) == status.track.is_some() {
            changed.push(StatusField::TrackPresence);
        }
        if status.playlist_tracks != Some(tracks) {
            changed.push(StatusField::PlaylistLength);
        }
    }

    if let Some(rate) = result.rate {
        if rate != status.rate {
            changed.push(StatusField::Rate);
        }
    }

    if let Some(repeat) = result.repeat {
        if status.repeat.map(|r| r.code()) != Some(repeat) {
            changed.push(StatusField::Repeat);
        }
    }

    changed
}

/// True iff at least one tracked field differs.
pub fn needs_update(status: &PlayerStatus, result: &StatusResult) -> bool {
    !changed_fields(status, result).is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Mode, PlaylistEntry, RepeatMode};

    fn cached() -> PlayerStatus {
        PlayerStatus {
            power: Power::On,
            mode: Some(Mode::Play),
            rate: 1.0,
            current_title: Some("Radio One".into()),
            title: Some("So What".into()),
            track: Some("file:///so_what.flac".into()),
            playlist_tracks: Some(4),
            index: Some(2),
            duration: 540,
            playtime: 10,
            timestamp: Some(1000.0),
            repeat: Some(RepeatMode::Off),
            rescan: false,
            can_seek: true,
        }
    }

    fn echo() -> StatusResult {
        StatusResult {
            player_connected: true,
            power: Some(true),
            mode: Some(Mode::Play),
            rate: Some(1.0),
            current_title: Some("Radio One".into()),
            playlist_timestamp: Some(1000.0),
            playlist_cur_index: Some(2),
            playlist_tracks: Some(4),
            repeat: Some(0),
            playlist_loop: vec![PlaylistEntry {
                title: Some("So What".into()),
                url: Some("file:///so_what.flac".into()),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_identical_summary_needs_no_update() {
        assert!(!needs_update(&cached(), &echo()));
    }

    #[test]
    fn test_each_tracked_field_triggers() {
        let cases: Vec<(StatusField, Box<dyn Fn(&mut StatusResult)>)> = vec![
            (StatusField::Power, Box::new(|r| r.power = Some(false))),
            (StatusField::Mode, Box::new(|r| r.mode = Some(Mode::Pause))),
            (StatusField::PlaylistTimestamp, Box::new(|r| r.playlist_timestamp = Some(1000.5))),
            (StatusField::CurrentIndex, Box::new(|r| r.playlist_cur_index = Some(3))),
            (StatusField::CurrentTitle, Box::new(|r| r.current_title = Some("Radio Two".into()))),
            (StatusField::TrackTitle, Box::new(|r| r.playlist_loop[0].title = Some("Blue".into()))),
            (StatusField::TrackUrl, Box::new(|r| r.playlist_loop[0].url = Some("file:///b".into()))),
            (StatusField::Rate, Box::new(|r| r.rate = Some(2.0))),
            (StatusField::Repeat, Box::new(|r| r.repeat = Some(2))),
            (StatusField::PlaylistLength, Box::new(|r| r.playlist_tracks = Some(5))),
        ];

        for (field, mutate) in cases {
            let mut result = echo();
            mutate(&mut result);
            assert_eq!(changed_fields(&cached(), &result), vec![field], "{field:?}");
        }
    }

    #[test]
    fn test_older_timestamp_is_ignored() {
        let mut result = echo();
        result.playlist_timestamp = Some(999.0);
        assert!(!needs_update(&cached(), &result));
    }

    #[test]
    fn test_index_zero_is_a_change() {
        let mut result = echo();
        result.playlist_cur_index = Some(0);
        assert_eq!(changed_fields(&cached(), &result), vec![StatusField::CurrentIndex]);

        let mut status = cached();
        status.index = None;
        assert!(needs_update(&status, &result));
    }

    #[test]
    fn test_track_presence_transitions() {
        // playlist emptied on the server
        let mut emptied = echo();
        emptied.playlist_tracks = Some(0);
        emptied.playlist_loop.clear();
        let fields = changed_fields(&cached(), &emptied);
        assert!(fields.contains(&StatusField::TrackPresence));

        // first track appears while we know of none
        let mut status = cached();
        status.track = None;
        status.title = None;
        let fields = changed_fields(&status, &echo());
        assert!(fields.contains(&StatusField::TrackPresence));
    }

    #[test]
    fn test_absent_fields_never_vote() {
        let sparse = StatusResult {
            player_connected: true,
            ..Default::default()
        };
        assert!(!needs_update(&cached(), &sparse));
    }

    #[test]
    fn test_unknown_power_after_reset_triggers() {
        let mut status = cached();
        status.power = Power::Unknown;
        assert_eq!(changed_fields(&status, &echo()), vec![StatusField::Power]);
    }
}

//! Last known state of the selected player, plus the pending-local-mutation token.
//!
//! # Local mutation contract
//!
//! A caller that has already rendered a change locally (a drag reorder, a
//! transport button) calls [`PlayerStatusStore::arm_local_mutation`] *before*
//! issuing the command. The very next [`PlayerStatusStore::evaluate`] consumes
//! the token: it adopts the incoming playlist revision as known, clears the
//! token, and only then runs the diff. The token is consumed exactly once,
//! whichever poll reaches `evaluate` first, and is never withdrawn when the
//! command fails: the following authoritative read repairs the view anyway.

use tracing::trace;

use crate::diff;
use crate::model::{PlayerStatus, Power, StatusResult, whole_seconds};

#[derive(Debug, Default)]
pub struct PlayerStatusStore {
    status: PlayerStatus,
    local_mutation: bool,
}

impl PlayerStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> &PlayerStatus {
        &self.status
    }

    pub fn status_mut(&mut self) -> &mut PlayerStatus {
        &mut self.status
    }

    pub fn snapshot(&self) -> PlayerStatus {
        self.status.clone()
    }

    /// Marks a locally rendered change whose server echo must not count as external.
    pub fn arm_local_mutation(&mut self) {
        self.local_mutation = true;
    }

    pub fn is_local_mutation_pending(&self) -> bool {
        self.local_mutation
    }

    /// Runs the diff against a polled summary, consuming a pending local mutation first.
    pub fn evaluate(&mut self, result: &StatusResult) -> bool {
        if self.local_mutation {
            self.local_mutation = false;
            if let Some(timestamp) = result.playlist_timestamp {
                self.status.timestamp = Some(timestamp);
            }
            trace!("Local mutation acknowledged");
        }

        let fields = diff::changed_fields(&self.status, result);
        if !fields.is_empty() {
            trace!(?fields, "Status changed");
        }
        !fields.is_empty()
    }

    /// Replaces the record wholesale from a full status result.
    ///
    /// The server-wide `rescan` flag survives; everything else comes from `result`.
    pub fn replace(&mut self, result: &StatusResult) {
        self.status = PlayerStatus::from_result(result, self.status.rescan);
    }

    /// Discards everything, including a pending local mutation.
    pub fn reset(&mut self) {
        self.status = PlayerStatus::default();
        self.local_mutation = false;
    }

    /// Forgets the power state so the next poll always looks like a change.
    pub fn reset_power_sentinel(&mut self) {
        self.status.power = Power::Unknown;
    }

    /// Resynchronizes the interpolated playtime from a polled summary.
    ///
    /// Only time and duration are taken; every field the diff looks at is left alone.
    pub fn sync_playtime(&mut self, result: &StatusResult) {
        if result.time.is_some() {
            self.status.playtime = whole_seconds(result.time);
        }
        if result.duration.is_some() {
            self.status.duration = whole_seconds(result.duration);
        }
    }

    /// Records the server's rescan flag; returns true when it flipped.
    pub fn set_rescan(&mut self, rescan: bool) -> bool {
        let changed = self.status.rescan != rescan;
        self.status.rescan = rescan;
        changed
    }
}

//! Optimistic drag-and-drop reordering of the playlist view.
//!
//! A drop moves the row locally at once and produces a [`PlaylistMove`];
//! the controller arms the pending-local-mutation token and sends the
//! `playlist move` command, and the next poll reconciles. Rows carry the
//! absolute playlist position they were rendered at (`index + offset` for
//! a paged view) and the ordinal shown to the user (`position + 1`).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, trace};

use crate::errors::{ControlError, Result};

/// Where a dragged row lands relative to the row under the cursor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DropSlot {
    Above = -1,
    Onto = 0,
    Below = 1,
}

impl DropSlot {
    /// Slot for a cursor `offset` pixels below the top of a row `height` pixels tall.
    ///
    /// Rows accepting a drop onto themselves split at 33% / 60%, plain rows at 50%.
    pub fn from_offset(height: f64, offset: f64, accepts_onto: bool) -> Self {
        if accepts_onto {
            if offset <= 0.33 * height {
                DropSlot::Above
            } else if offset >= 0.6 * height {
                DropSlot::Below
            } else {
                DropSlot::Onto
            }
        } else if offset <= 0.5 * height {
            DropSlot::Above
        } else {
            DropSlot::Below
        }
    }

    pub fn sign(self) -> i64 {
        self as i64
    }
}

/// Insertion indicator to draw on a row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DropIndicator {
    pub row_id: String,
    pub slot: DropSlot,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlaylistRow {
    pub id: String,
    /// Absolute playlist position.
    pub position: usize,
    /// Displayed number, `position + 1`.
    pub ordinal: usize,
    pub drop_target: bool,
    pub draggable: bool,
}

impl PlaylistRow {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            position: 0,
            ordinal: 1,
            drop_target: false,
            draggable: true,
        }
    }

    /// Row that also accepts items dropped onto it.
    pub fn drop_target(mut self) -> Self {
        self.drop_target = true;
        self
    }

    /// Row that cannot be dragged nor dropped on.
    pub fn fixed(mut self) -> Self {
        self.draggable = false;
        self
    }
}

/// The committed outcome of a drop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlaylistMove {
    /// Pre-move position of the dragged row.
    pub from: usize,
    /// Post-move position of the dragged row.
    pub to: usize,
    pub slot: DropSlot,
}

impl PlaylistMove {
    /// Where the row at `index` ends up once the server applied the move.
    pub fn adjust_index(&self, index: usize) -> usize {
        if index == self.from {
            self.to
        } else if self.from < index && index <= self.to {
            index - 1
        } else if self.to <= index && index < self.from {
            index + 1
        } else {
            index
        }
    }
}

/// Shared flag raised while a drag is in progress; hover highlighting stays off while it is up.
#[derive(Clone, Debug, Default)]
pub struct DragSuppressor(Arc<AtomicBool>);

impl DragSuppressor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn set(&self, raised: bool) {
        self.0.store(raised, Ordering::SeqCst);
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DragState {
    #[default]
    Idle,
    Dragging,
    Dropped,
    Cancelled,
}

#[derive(Debug)]
struct DragSession {
    source: String,
    slot: Option<DropSlot>,
    indicated: bool,
}

/// A reorderable list of playlist rows.
#[derive(Debug)]
pub struct SortableList {
    rows: Vec<PlaylistRow>,
    offset: usize,
    current: Option<usize>,
    suppressor: DragSuppressor,
    state: DragState,
    session: Option<DragSession>,
}

impl SortableList {
    pub fn new(rows: Vec<PlaylistRow>, offset: usize) -> Self {
        let mut list = Self {
            rows,
            offset,
            current: None,
            suppressor: DragSuppressor::new(),
            state: DragState::Idle,
            session: None,
        };
        let len = list.rows.len();
        list.renumber(0, len);
        list
    }

    pub fn with_suppressor(mut self, suppressor: DragSuppressor) -> Self {
        self.suppressor = suppressor;
        self
    }

    /// Position of the currently playing row.
    pub fn with_current(mut self, current: Option<usize>) -> Self {
        self.current = current;
        self
    }

    pub fn rows(&self) -> &[PlaylistRow] {
        &self.rows
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn current(&self) -> Option<usize> {
        self.current
    }

    pub fn state(&self) -> DragState {
        self.state
    }

    pub fn suppressor(&self) -> &DragSuppressor {
        &self.suppressor
    }

    /// Replaces the rows, e.g. after the view was reloaded from the server.
    pub fn reload(&mut self, rows: Vec<PlaylistRow>, offset: usize) {
        self.rows = rows;
        self.offset = offset;
        let len = self.rows.len();
        self.renumber(0, len);
        self.session = None;
        self.state = DragState::Idle;
        self.suppressor.set(false);
    }

    pub fn start_drag(&mut self, row_id: &str) -> Result<()> {
        if self.state == DragState::Dragging {
            return Err(ControlError::drag("a drag is already in progress"));
        }
        let row = &self.rows[self.row_index(row_id)?];
        if !row.draggable {
            return Err(ControlError::Drag(format!("row {row_id} cannot be dragged")));
        }

        trace!(row = row_id, position = row.position, "Drag started");
        self.session = Some(DragSession {
            source: row_id.to_string(),
            slot: None,
            indicated: false,
        });
        self.state = DragState::Dragging;
        self.suppressor.set(true);
        Ok(())
    }

    /// Tracks the cursor over a candidate row.
    ///
    /// Returns the indicator to draw when the slot changed, `None` when the
    /// current indicator stays valid or the row is not a valid target.
    pub fn drag_over(
        &mut self,
        row_id: &str,
        height: f64,
        offset: f64,
    ) -> Result<Option<DropIndicator>> {
        let index = self.row_index(row_id)?;
        let row = &self.rows[index];
        if !row.draggable {
            return Ok(None);
        }
        let slot = DropSlot::from_offset(height, offset, row.drop_target);

        let session = self.session_mut()?;
        let changed = session.slot != Some(slot) || !session.indicated;
        session.slot = Some(slot);
        if !changed {
            return Ok(None);
        }
        session.indicated = true;

        Ok(Some(DropIndicator {
            row_id: row_id.to_string(),
            slot,
        }))
    }

    /// The cursor left a row; its indicator is to be removed.
    pub fn drag_out(&mut self) -> Result<()> {
        self.session_mut()?.indicated = false;
        Ok(())
    }

    /// Drops the dragged row on `row_id` using the last computed slot.
    ///
    /// Returns `None` when the drop resolves to the row's own position.
    pub fn drop_on(&mut self, row_id: &str) -> Result<Option<PlaylistMove>> {
        let slot = self
            .session
            .as_ref()
            .ok_or_else(|| ControlError::drag("no drag in progress"))?
            .slot
            .ok_or_else(|| ControlError::drag("no drop slot computed"))?;
        self.drop_at(row_id, slot)
    }

    /// Drops the dragged row on `row_id` at an explicit slot.
    pub fn drop_at(&mut self, row_id: &str, slot: DropSlot) -> Result<Option<PlaylistMove>> {
        let Some(session) = self.session.take() else {
            return Err(ControlError::drag("no drag in progress"));
        };
        self.state = DragState::Dropped;
        self.suppressor.set(false);

        let source_index = self.row_index(&session.source)?;
        let target_index = self.row_index(row_id)?;
        if !self.rows[target_index].draggable {
            return Ok(None);
        }

        let from = self.rows[source_index].position;
        let mut to = self.rows[target_index].position;
        if (from > to && slot == DropSlot::Below) || (from < to && slot == DropSlot::Above) {
            to = (to as i64 + slot.sign()) as usize;
        }
        if from == to {
            trace!(position = from, "Drop on own position ignored");
            return Ok(None);
        }

        let row = self.rows.remove(source_index);
        match slot {
            DropSlot::Onto => {
                // the row disappears into the target, everything after it shifts up
                let len = self.rows.len();
                self.renumber(source_index, len);
            }
            DropSlot::Above | DropSlot::Below => {
                let target_index = self.row_index(row_id)?;
                let insert_at = match slot {
                    DropSlot::Above => target_index,
                    _ => target_index + 1,
                };
                self.rows.insert(insert_at, row);
                let (low, high) = if source_index < insert_at {
                    (source_index, insert_at + 1)
                } else {
                    (insert_at, source_index + 1)
                };
                self.renumber(low, high);
            }
        }

        let moved = PlaylistMove { from, to, slot };
        self.current = self.current.map(|current| moved.adjust_index(current));
        debug!(from, to, ?slot, "Row moved locally");
        Ok(Some(moved))
    }

    pub fn cancel(&mut self) {
        if self.session.take().is_some() {
            self.state = DragState::Cancelled;
        }
        self.suppressor.set(false);
    }

    /// Returns to `Idle` once the outcome of a drag was handled.
    pub fn end_drag(&mut self) {
        if self.state != DragState::Dragging {
            self.state = DragState::Idle;
        }
    }

    fn session_mut(&mut self) -> Result<&mut DragSession> {
        self.session
            .as_mut()
            .ok_or_else(|| ControlError::drag("no drag in progress"))
    }

    fn row_index(&self, row_id: &str) -> Result<usize> {
        self.rows
            .iter()
            .position(|row| row.id == row_id)
            .ok_or_else(|| ControlError::Drag(format!("unknown row {row_id}")))
    }

    fn renumber(&mut self, from: usize, to: usize) {
        let to = to.min(self.rows.len());
        for (index, row) in self.rows.iter_mut().enumerate().take(to).skip(from) {
            row.position = index + self.offset;
            row.ordinal = row.position + 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn playlist(len: usize) -> SortableList {
        SortableList::new(
            (0..len).map(|i| PlaylistRow::new(format!("row{i}"))).collect(),
            0,
        )
    }

    fn ids(list: &SortableList) -> Vec<&str> {
        list.rows().iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn test_slot_thresholds() {
        assert_eq!(DropSlot::from_offset(30.0, 9.0, true), DropSlot::Above);
        assert_eq!(DropSlot::from_offset(30.0, 15.0, true), DropSlot::Onto);
        assert_eq!(DropSlot::from_offset(30.0, 18.0, true), DropSlot::Below);
        assert_eq!(DropSlot::from_offset(30.0, 15.0, false), DropSlot::Above);
        assert_eq!(DropSlot::from_offset(30.0, 15.1, false), DropSlot::Below);
    }

    #[test]
    fn test_move_up_renumbers_affected_rows() {
        let mut list = playlist(8);
        list.start_drag("row5").unwrap();
        assert!(list.suppressor().is_raised());
        list.drag_over("row2", 20.0, 2.0).unwrap();

        let moved = list.drop_on("row2").unwrap().unwrap();
        assert_eq!(moved.from, 5);
        assert_eq!(moved.to, 2);
        assert_eq!(list.state(), DragState::Dropped);
        assert!(!list.suppressor().is_raised());

        assert_eq!(
            ids(&list),
            vec!["row0", "row1", "row5", "row2", "row3", "row4", "row6", "row7"]
        );
        let ordinals: Vec<usize> = list.rows()[2..=5].iter().map(|r| r.ordinal).collect();
        assert_eq!(ordinals, vec![3, 4, 5, 6]);
        for (index, row) in list.rows().iter().enumerate() {
            assert_eq!(row.position, index);
        }
    }

    #[test]
    fn test_self_crossing_adjusts_target() {
        // moving down, dropped above row5: lands at 4
        let mut list = playlist(8);
        list.start_drag("row2").unwrap();
        let moved = list.drop_at("row5", DropSlot::Above).unwrap().unwrap();
        assert_eq!((moved.from, moved.to), (2, 4));
        assert_eq!(list.rows()[4].id, "row2");

        // moving up, dropped below row2: lands at 3
        let mut list = playlist(8);
        list.start_drag("row5").unwrap();
        let moved = list.drop_at("row2", DropSlot::Below).unwrap().unwrap();
        assert_eq!((moved.from, moved.to), (5, 3));
        assert_eq!(list.rows()[3].id, "row5");
    }

    #[test]
    fn test_drop_next_to_itself_is_noop() {
        let mut list = playlist(4);
        list.start_drag("row1").unwrap();
        assert_eq!(list.drop_at("row2", DropSlot::Above).unwrap(), None);
        assert_eq!(ids(&list), vec!["row0", "row1", "row2", "row3"]);
    }

    #[test]
    fn test_indicator_only_on_slot_change() {
        let mut list = playlist(4);
        list.start_drag("row0").unwrap();
        let first = list.drag_over("row2", 20.0, 2.0).unwrap();
        assert_eq!(
            first,
            Some(DropIndicator {
                row_id: "row2".into(),
                slot: DropSlot::Above
            })
        );
        assert_eq!(list.drag_over("row2", 20.0, 5.0).unwrap(), None);
        assert!(list.drag_over("row2", 20.0, 15.0).unwrap().is_some());

        list.drag_out().unwrap();
        assert!(list.drag_over("row3", 20.0, 15.0).unwrap().is_some());
    }

    #[test]
    fn test_cancel_and_errors() {
        let mut list = SortableList::new(
            vec![PlaylistRow::new("a"), PlaylistRow::new("b").fixed()],
            0,
        );
        assert!(list.start_drag("b").is_err());
        assert!(list.start_drag("zz").is_err());
        assert!(list.drop_on("a").is_err());

        list.start_drag("a").unwrap();
        assert!(list.start_drag("a").is_err());
        list.cancel();
        assert_eq!(list.state(), DragState::Cancelled);
        assert!(!list.suppressor().is_raised());
        list.end_drag();
        assert_eq!(list.state(), DragState::Idle);
    }

    #[test]
    fn test_onto_removes_source() {
        let mut list = SortableList::new(
            vec![
                PlaylistRow::new("a"),
                PlaylistRow::new("b"),
                PlaylistRow::new("folder").drop_target(),
            ],
            10,
        );
        list.start_drag("a").unwrap();
        let moved = list.drop_at("folder", DropSlot::Onto).unwrap().unwrap();
        assert_eq!((moved.from, moved.to), (10, 12));
        assert_eq!(ids(&list), vec!["b", "folder"]);
        assert_eq!(list.rows()[0].position, 10);
        assert_eq!(list.rows()[1].ordinal, 12);
    }

    #[test]
    fn test_current_row_follows_move() {
        let mut list = playlist(8).with_current(Some(3));
        list.start_drag("row5").unwrap();
        list.drop_at("row2", DropSlot::Above).unwrap();
        assert_eq!(list.current(), Some(4));

        let moved = PlaylistMove {
            from: 1,
            to: 6,
            slot: DropSlot::Below,
        };
        assert_eq!(moved.adjust_index(1), 6);
        assert_eq!(moved.adjust_index(4), 3);
        assert_eq!(moved.adjust_index(7), 7);
        assert_eq!(moved.adjust_index(0), 0);
    }
}

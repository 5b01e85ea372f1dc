//! Undo history with typing coalescing.
//!
//! [`EditLog`] is a plain grouped history of inverse edits. [`CoalescingUndo`]
//! wraps any [`UndoLog`] and keeps one group open while consecutive edits
//! stay adjacent, so a typed word undoes in a single step.

use log::trace;

use crate::types::{RecordedEdit, TextRange};

/// Most recent undo groups kept before the oldest are discarded.
const UNDO_CAP: usize = 1000;

/// Grouped storage of inverse edits.
///
/// `undo` and `redo` hand each stored edit to `apply`, which must perform it
/// against the document and return its own inverse. The returned edits become
/// the opposing stack's group, so history flips back and forth losslessly.
pub trait UndoLog {
    fn begin_group(&mut self);
    fn end_group(&mut self);
    /// Push an inverse edit into the open group, or into a group of its own
    /// when none is open. Discards any redo history.
    fn record(&mut self, edit: RecordedEdit);
    fn undo(&mut self, apply: &mut dyn FnMut(&RecordedEdit) -> RecordedEdit) -> bool;
    fn redo(&mut self, apply: &mut dyn FnMut(&RecordedEdit) -> RecordedEdit) -> bool;
    fn can_undo(&self) -> bool;
    fn can_redo(&self) -> bool;
}

/// In-memory [`UndoLog`].
#[derive(Default)]
pub struct EditLog {
    undo_groups: Vec<Vec<RecordedEdit>>,
    redo_groups: Vec<Vec<RecordedEdit>>,
    open: Option<Vec<RecordedEdit>>,
}

impl EditLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn push_undo_group(&mut self, group: Vec<RecordedEdit>) {
        if group.is_empty() {
            return;
        }
        self.undo_groups.push(group);
        if self.undo_groups.len() > UNDO_CAP {
            self.undo_groups.remove(0);
        }
    }

    fn close_open_group(&mut self) {
        if let Some(group) = self.open.take() {
            self.push_undo_group(group);
        }
    }
}

impl UndoLog for EditLog {
    fn begin_group(&mut self) {
        self.close_open_group();
        self.open = Some(Vec::new());
    }

    fn end_group(&mut self) {
        self.close_open_group();
    }

    fn record(&mut self, edit: RecordedEdit) {
        self.redo_groups.clear();
        match self.open.as_mut() {
            Some(group) => group.push(edit),
            None => self.push_undo_group(vec![edit]),
        }
    }

    fn undo(&mut self, apply: &mut dyn FnMut(&RecordedEdit) -> RecordedEdit) -> bool {
        self.close_open_group();
        let Some(group) = self.undo_groups.pop() else {
            return false;
        };
        // Edits were recorded in document order; reverting replays them
        // newest first so every stored range is still valid when applied.
        let flipped: Vec<RecordedEdit> = group.iter().rev().map(|edit| apply(edit)).collect();
        self.redo_groups.push(flipped);
        true
    }

    fn redo(&mut self, apply: &mut dyn FnMut(&RecordedEdit) -> RecordedEdit) -> bool {
        let Some(group) = self.redo_groups.pop() else {
            return false;
        };
        let flipped: Vec<RecordedEdit> = group.iter().rev().map(|edit| apply(edit)).collect();
        self.undo_groups.push(flipped);
        true
    }

    fn can_undo(&self) -> bool {
        !self.undo_groups.is_empty() || self.open.as_ref().is_some_and(|g| !g.is_empty())
    }

    fn can_redo(&self) -> bool {
        !self.redo_groups.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CoalesceState {
    Idle,
    /// A group is open; `last` is the resulting range of the latest edit.
    Coalescing { last: TextRange },
}

/// Merges runs of adjacent edits into single undo groups.
///
/// Call [`check_coalescing`](Self::check_coalescing) with the post-edit range
/// of every edit before recording its inverse. Edits that touch or overlap
/// the previous one extend the open group; anything else seals the group and
/// opens a fresh one. Undo and redo always seal first, so an in-progress run
/// undoes as a unit.
pub struct CoalescingUndo<U: UndoLog> {
    log: U,
    state: CoalesceState,
}

impl<U: UndoLog> CoalescingUndo<U> {
    pub fn new(log: U) -> Self {
        Self {
            log,
            state: CoalesceState::Idle,
        }
    }

    /// Decide whether `range` (the range occupied by the edit's replacement
    /// text after applying) continues the current run.
    pub fn check_coalescing(&mut self, range: TextRange) {
        match self.state {
            CoalesceState::Idle => {
                trace!("undo: open coalescing group at {range:?}");
                self.log.begin_group();
            }
            CoalesceState::Coalescing { last } => {
                if !last.intersects(&range) && last.end() != range.start() {
                    trace!("undo: seal group, edit at {range:?} is not adjacent to {last:?}");
                    self.log.end_group();
                    self.log.begin_group();
                }
            }
        }
        self.state = CoalesceState::Coalescing { last: range };
    }

    /// Seal the open group, if any. Edits recorded afterwards start a new one.
    pub fn break_coalescing(&mut self) {
        if matches!(self.state, CoalesceState::Coalescing { .. }) {
            self.log.end_group();
            self.state = CoalesceState::Idle;
        }
    }

    pub fn record(&mut self, edit: RecordedEdit) {
        self.log.record(edit);
    }

    pub fn undo(&mut self, apply: &mut dyn FnMut(&RecordedEdit) -> RecordedEdit) -> bool {
        self.break_coalescing();
        self.log.undo(apply)
    }

    pub fn redo(&mut self, apply: &mut dyn FnMut(&RecordedEdit) -> RecordedEdit) -> bool {
        self.break_coalescing();
        self.log.redo(apply)
    }

    pub fn can_undo(&self) -> bool {
        self.log.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.log.can_redo()
    }
}

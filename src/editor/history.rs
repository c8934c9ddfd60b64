use std::collections::VecDeque;

use crate::error::CardResult;
use crate::store::{CardId, CardStore, IndexRef};

/// One invertible change to the card store. Link mirroring is not recorded:
/// the store redoes it whenever an edit is applied.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEdit {
    Insert {
        target: IndexRef,
        position: isize,
        id: CardId,
    },
    Remove {
        target: IndexRef,
        position: usize,
        id: CardId,
    },
    UpdateNote {
        id: CardId,
        before: String,
        after: String,
    },
}

impl StoreEdit {
    pub fn inverse(&self) -> StoreEdit {
        match self {
            StoreEdit::Insert { target, position, id } => StoreEdit::Remove {
                target: target.clone(),
                position: (position + 1) as usize,
                id: id.clone(),
            },
            StoreEdit::Remove { target, position, id } => StoreEdit::Insert {
                target: target.clone(),
                position: *position as isize - 1,
                id: id.clone(),
            },
            StoreEdit::UpdateNote { id, before, after } => StoreEdit::UpdateNote {
                id: id.clone(),
                before: after.clone(),
                after: before.clone(),
            },
        }
    }

    pub fn apply(&self, store: &mut CardStore) -> CardResult<()> {
        match self {
            StoreEdit::Insert { target, position, id } => store.insert_after(target, *position, id),
            StoreEdit::Remove { target, position, .. } => store.remove(target, *position).map(|_| ()),
            StoreEdit::UpdateNote { id, after, .. } => store.update_note(id, after.clone()).map(|_| ()),
        }
    }

    /// Card IDs this edit mentions
    pub fn card_ids(&self) -> Vec<&str> {
        match self {
            StoreEdit::Insert { target, id, .. } | StoreEdit::Remove { target, id, .. } => {
                vec![target.card_id(), id.as_str()]
            }
            StoreEdit::UpdateNote { id, .. } => vec![id.as_str()],
        }
    }
}

/// Apply `edits` in order. If one fails, the ones already applied are rolled
/// back and the store is left as it was.
pub fn apply_all(store: &mut CardStore, edits: &[StoreEdit]) -> CardResult<()> {
    for (done, edit) in edits.iter().enumerate() {
        if let Err(e) = edit.apply(store) {
            for applied in edits[..done].iter().rev() {
                let _ = applied.inverse().apply(store);
            }
            return Err(e);
        }
    }
    Ok(())
}

pub fn inverse_all(edits: &[StoreEdit]) -> Vec<StoreEdit> {
    edits.iter().rev().map(StoreEdit::inverse).collect()
}

#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub edits: Vec<StoreEdit>,
    /// Sequence that was on top of the breadcrumbs when the edit happened
    pub index: IndexRef,
    pub focus_before: isize,
    pub focus_after: isize,
}

pub struct History {
    undo_stack: VecDeque<HistoryEntry>,
    redo_stack: Vec<HistoryEntry>,
    max_entries: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::new()
    }
}

impl History {
    const DEFAULT_MAX_ENTRIES: usize = 1000;

    pub fn new() -> Self {
        Self::with_limit(Self::DEFAULT_MAX_ENTRIES)
    }

    pub fn with_limit(max_entries: usize) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: Vec::new(),
            max_entries: max_entries.max(1),
        }
    }

    pub fn record(&mut self, entry: HistoryEntry) {
        self.redo_stack.clear();
        self.push_undo(entry);
    }

    /// Push without touching the redo stack (used when redoing).
    pub fn push_undo(&mut self, entry: HistoryEntry) {
        self.undo_stack.push_back(entry);
        while self.undo_stack.len() > self.max_entries {
            self.undo_stack.pop_front();
        }
    }

    pub fn pop_undo(&mut self) -> Option<HistoryEntry> {
        self.undo_stack.pop_back()
    }

    pub fn push_redo(&mut self, entry: HistoryEntry) {
        self.redo_stack.push(entry);
    }

    pub fn pop_redo(&mut self) -> Option<HistoryEntry> {
        self.redo_stack.pop()
    }

    /// Fold a text update into the last entry when that entry only updated
    /// the same note, so typing into one note undoes as a single step.
    pub fn merge_update(&mut self, id: &str, after: &str) -> bool {
        if !self.redo_stack.is_empty() {
            return false;
        }
        let Some(last) = self.undo_stack.back_mut() else {
            return false;
        };
        match last.edits.as_mut_slice() {
            [StoreEdit::UpdateNote { id: last_id, after: last_after, .. }] if last_id.as_str() == id => {
                *last_after = after.to_string();
                true
            }
            _ => false,
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }

    /// Every card ID still needed to undo or redo
    pub fn referenced_ids(&self) -> Vec<CardId> {
        self.undo_stack
            .iter()
            .chain(self.redo_stack.iter())
            .flat_map(|entry| {
                entry
                    .edits
                    .iter()
                    .flat_map(|edit| edit.card_ids())
                    .chain(std::iter::once(entry.index.card_id()))
            })
            .map(str::to_string)
            .collect()
    }
}

use tracing::{debug, info, warn};

use super::navigator::{Mode, Navigator};
use crate::config::Config;
use crate::editor::history::{apply_all, inverse_all, History, HistoryEntry, StoreEdit};
use crate::error::{CardError, CardResult};
use crate::graph::LinkDirection;
use crate::persist::Snapshot;
use crate::search::{self, Normalizer, SearchIndex};
use crate::store::{Card, CardId, CardStore, IndexRef};

/// The whole application: cards, where the user is, and what can be undone.
pub struct State {
    pub(super) store: CardStore,
    pub(super) root: CardId,
    pub(super) navigator: Navigator,
    pub(super) clipboard: Vec<CardId>,
    pub(super) history: History,
    pub(super) search: SearchIndex,
    pub(super) normalizer: Normalizer,
    pub(super) max_results: usize,
    pub(super) dirty: bool,
}

impl State {
    /// Fresh state with an empty root index.
    pub fn new(config: &Config) -> Self {
        let mut store = CardStore::with_strategy(config.edit_strategy);
        let root = store.new_index();
        Self::assemble(store, root, config)
    }

    /// Rebuild the state from a snapshot. The search index starts empty; call
    /// [`State::rebuild_search_index`] or [`State::set_search_index`].
    pub fn from_snapshot(snapshot: Snapshot, config: &Config) -> CardResult<Self> {
        let Snapshot { mut db, root, .. } = snapshot;
        let migrated = db.migrate_legacy_links();
        if migrated > 0 {
            info!(migrated, "folded legacy link cards into notes");
        }
        db.set_strategy(config.edit_strategy);
        db.contents(&IndexRef::Index(root.clone()))?;
        Ok(Self::assemble(db, root, config))
    }

    fn assemble(store: CardStore, root: CardId, config: &Config) -> Self {
        let navigator = Navigator::new(IndexRef::Index(root.clone()), &store);
        let normalizer = Normalizer::new(config.weight_scheme, config.max_document_bytes);
        Self {
            store,
            root,
            navigator,
            clipboard: Vec::new(),
            history: History::with_limit(config.history_limit),
            search: SearchIndex::for_normalizer(&normalizer),
            normalizer,
            max_results: config.max_results,
            dirty: false,
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot::new(self.store.clone(), self.root.clone())
    }

    pub fn store(&self) -> &CardStore {
        &self.store
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn root_ref(&self) -> IndexRef {
        IndexRef::Index(self.root.clone())
    }

    pub fn navigator(&self) -> &Navigator {
        &self.navigator
    }

    pub fn mode(&self) -> Mode {
        self.navigator.mode()
    }

    pub fn focus(&self) -> isize {
        self.navigator.focus()
    }

    pub fn focused_id(&self) -> Option<CardId> {
        self.navigator.focused_id(&self.store)
    }

    pub fn clipboard(&self) -> &[CardId] {
        &self.clipboard
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn search_index(&self) -> &SearchIndex {
        &self.search
    }

    pub fn set_search_index(&mut self, index: SearchIndex) {
        self.search = index;
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    /// Whether anything changed since the last save
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn mark_saved(&mut self) {
        self.dirty = false;
    }

    pub fn rebuild_search_index(&mut self) -> Vec<CardId> {
        self.search.rebuild(&self.store, &self.normalizer)
    }

    /// Apply `edits` as one undoable step, then move focus to `focus_after`.
    pub(super) fn commit(&mut self, edits: Vec<StoreEdit>, focus_after: isize) -> CardResult<()> {
        if edits.is_empty() {
            return Ok(());
        }
        let index = self.navigator.current_index().clone();
        let focus_before = self.navigator.focus();

        apply_all(&mut self.store, &edits)?;
        self.reindex_edits(&edits);
        self.navigator.set_focus(&self.store, focus_after);
        self.navigator.clamp_all(&self.store);

        debug!(edits = edits.len(), index = %index, "committed");
        self.history.record(HistoryEntry {
            edits,
            index,
            focus_before,
            focus_after: self.navigator.focus(),
        });
        self.dirty = true;
        Ok(())
    }

    /// Insert an existing card right after `position` in the current sequence
    /// and focus it.
    pub fn insert_after(&mut self, position: isize, id: &str) -> CardResult<()> {
        let target = self.navigator.current_index().clone();
        self.commit(
            vec![StoreEdit::Insert {
                target,
                position,
                id: id.to_string(),
            }],
            position + 1,
        )
    }

    /// Create an empty note after the focused card, focus it and start
    /// editing it.
    pub fn new_note(&mut self) -> CardResult<CardId> {
        let target = self.navigator.current_index().clone();
        let focus = self.navigator.focus();
        let id = self.store.new_note();
        self.commit(
            vec![StoreEdit::Insert {
                target,
                position: focus,
                id: id.clone(),
            }],
            focus + 1,
        )?;
        self.navigator.begin_editing();
        Ok(id)
    }

    /// Replace a note's text and re-index it. Consecutive updates to the same
    /// note undo together.
    pub fn update_note(&mut self, id: &str, contents: String) -> CardResult<()> {
        let before = self.store.update_note(id, contents.clone())?;
        if before == contents {
            return Ok(());
        }
        if !self.history.merge_update(id, &contents) {
            self.history.record(HistoryEntry {
                edits: vec![StoreEdit::UpdateNote {
                    id: id.to_string(),
                    before,
                    after: contents,
                }],
                index: self.navigator.current_index().clone(),
                focus_before: self.navigator.focus(),
                focus_after: self.navigator.focus(),
            });
        }
        self.reindex_note(id);
        self.dirty = true;
        Ok(())
    }

    /// Re-index one note. If its text cannot be normalized the previous
    /// entries stay in place.
    pub fn reindex_note(&mut self, id: &str) {
        let Ok(note) = self.store.note(id) else {
            return;
        };
        match self.normalizer.features(&note.contents) {
            Ok(vector) => self.search.add_to_index(id, &vector),
            Err(e) => warn!(id = %id, error = %e, "not re-indexing note"),
        }
    }

    fn reindex_edits(&mut self, edits: &[StoreEdit]) {
        for edit in edits {
            if let StoreEdit::UpdateNote { id, .. } = edit {
                self.reindex_note(id);
            }
        }
    }

    fn restore_focus(&mut self, index: &IndexRef, focus: isize) {
        if self.navigator.current_index() == index {
            self.navigator.set_focus(&self.store, focus);
        }
        self.navigator.clamp_all(&self.store);
    }

    pub fn undo(&mut self) -> CardResult<bool> {
        let Some(entry) = self.history.pop_undo() else {
            return Ok(false);
        };
        if let Err(e) = apply_all(&mut self.store, &inverse_all(&entry.edits)) {
            self.history.push_undo(entry);
            return Err(e);
        }
        self.reindex_edits(&entry.edits);
        self.restore_focus(&entry.index, entry.focus_before);
        self.history.push_redo(entry);
        self.dirty = true;
        Ok(true)
    }

    pub fn redo(&mut self) -> CardResult<bool> {
        let Some(entry) = self.history.pop_redo() else {
            return Ok(false);
        };
        if let Err(e) = apply_all(&mut self.store, &entry.edits) {
            self.history.push_redo(entry);
            return Err(e);
        }
        self.reindex_edits(&entry.edits);
        self.restore_focus(&entry.index, entry.focus_after);
        self.history.push_undo(entry);
        self.dirty = true;
        Ok(true)
    }

    /// Run `query` and enter a new index holding the results. A blank query
    /// does nothing.
    pub fn search(&mut self, query: &str) -> CardResult<()> {
        if query.trim().is_empty() {
            return Ok(());
        }
        let results = search::search(&self.search, &self.normalizer, query, self.max_results)?;
        info!(query, results = results.len(), "search");
        self.show_results(results)
    }

    /// Enter an index of the notes closest to the focused note.
    pub fn show_related_notes(&mut self) -> CardResult<()> {
        let Some(id) = self.focused_id() else {
            return Ok(());
        };
        let results = search::related(
            &self.search,
            &self.normalizer,
            &self.store,
            &id,
            self.max_results,
        )?;
        self.show_results(results)
    }

    fn show_results(&mut self, results: Vec<CardId>) -> CardResult<()> {
        let id = self.store.new_index_with(results);
        self.navigator.stop_editing();
        self.navigator.enter(&self.store, IndexRef::Index(id))
    }

    /// Step into the focused card: a note's links in `direction`, or the
    /// contents of an index when moving right.
    pub fn enter_links(&mut self, direction: LinkDirection) -> CardResult<()> {
        let Some(id) = self.focused_id() else {
            return Ok(());
        };
        let target = match self.store.get(&id) {
            Some(Card::Note(_)) => IndexRef::links(&id, direction),
            Some(Card::Index(_)) if direction == LinkDirection::Outgoing => IndexRef::Index(id),
            Some(Card::Index(_)) => return Ok(()),
            None => return Err(CardError::UnknownCard(id)),
        };
        self.navigator.enter(&self.store, target)
    }

    pub fn exit(&mut self) -> bool {
        self.navigator.exit()
    }

    pub fn go_forward(&mut self) -> bool {
        self.navigator.go_forward(&self.store)
    }

    pub fn go_up(&mut self) {
        self.navigator.go_up();
    }

    pub fn go_down(&mut self) {
        self.navigator.go_down(&self.store);
    }

    /// Jump to a sequence named by its string form (`<id>`, `<id>-outgoing`
    /// or `<id>-incoming`), replacing the top breadcrumb.
    pub fn view(&mut self, target: &str, focus: isize) -> CardResult<()> {
        self.navigator.view(&self.store, IndexRef::parse(target), focus)
    }

    pub fn begin_editing(&mut self) -> bool {
        self.navigator.begin_editing()
    }

    pub fn stop_editing(&mut self) {
        self.navigator.stop_editing();
        self.dirty = true;
    }

    pub fn select(&mut self) -> bool {
        self.navigator.select()
    }

    pub fn clear_selection(&mut self) {
        self.navigator.clear_selection();
    }

    /// Delete every card that nothing can reach any more. Breadcrumbs, the
    /// clipboard and the undo history all count as references.
    pub fn collect_garbage(&mut self) -> Vec<CardId> {
        let mut roots = vec![self.root.clone()];
        roots.extend(
            self.navigator
                .frames()
                .iter()
                .chain(self.navigator.forward_frames())
                .map(|frame| frame.index.card_id().to_string()),
        );
        roots.extend(self.clipboard.iter().cloned());
        roots.extend(self.history.referenced_ids());

        let removed = self.store.collect_garbage(&roots);
        for id in &removed {
            self.search.remove_card(id);
        }
        if !removed.is_empty() {
            info!(removed = removed.len(), "collected unreachable cards");
            self.dirty = true;
        }
        removed
    }
}

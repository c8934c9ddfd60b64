//! Card store: the single source of truth for notes and indexes.
//!
//! Every structural edit goes through [`CardStore::insert_after`] and
//! [`CardStore::remove`], which keep the note link graph symmetric.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::fmt;
use std::ops::{Deref, DerefMut};

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::{CardError, CardResult};
use crate::graph::{self, LinkDirection};

pub type CardId = String;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub contents: String,
    #[serde(default)]
    pub outgoing: Vec<CardId>,
    #[serde(default)]
    pub incoming: Vec<CardId>,
}

impl Note {
    pub fn links(&self, direction: LinkDirection) -> &[CardId] {
        match direction {
            LinkDirection::Outgoing => &self.outgoing,
            LinkDirection::Incoming => &self.incoming,
        }
    }

    fn links_mut(&mut self, direction: LinkDirection) -> &mut Vec<CardId> {
        match direction {
            LinkDirection::Outgoing => &mut self.outgoing,
            LinkDirection::Incoming => &mut self.incoming,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexCard {
    pub contents: Vec<CardId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Card {
    Note(Note),
    Index(IndexCard),
}

impl Card {
    pub fn is_note(&self) -> bool {
        matches!(self, Card::Note(_))
    }

    pub fn as_note(&self) -> Option<&Note> {
        match self {
            Card::Note(note) => Some(note),
            Card::Index(_) => None,
        }
    }
}

/// Names an ordered sequence of card IDs that can be browsed: an Index card,
/// or one of the two link lists owned by a note.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IndexRef {
    Index(CardId),
    Outgoing(CardId),
    Incoming(CardId),
}

impl IndexRef {
    pub fn links(note: &str, direction: LinkDirection) -> Self {
        match direction {
            LinkDirection::Outgoing => IndexRef::Outgoing(note.to_string()),
            LinkDirection::Incoming => IndexRef::Incoming(note.to_string()),
        }
    }

    /// Parse the `<id>`, `<id>-outgoing`, `<id>-incoming` string form.
    pub fn parse(s: &str) -> Self {
        if let Some(owner) = s.strip_suffix(LinkDirection::Outgoing.suffix()) {
            IndexRef::Outgoing(owner.to_string())
        } else if let Some(owner) = s.strip_suffix(LinkDirection::Incoming.suffix()) {
            IndexRef::Incoming(owner.to_string())
        } else {
            IndexRef::Index(s.to_string())
        }
    }

    /// The card that holds this sequence.
    pub fn card_id(&self) -> &str {
        match self {
            IndexRef::Index(id) | IndexRef::Outgoing(id) | IndexRef::Incoming(id) => id,
        }
    }

    pub fn link_owner(&self) -> Option<(&str, LinkDirection)> {
        match self {
            IndexRef::Index(_) => None,
            IndexRef::Outgoing(owner) => Some((owner, LinkDirection::Outgoing)),
            IndexRef::Incoming(owner) => Some((owner, LinkDirection::Incoming)),
        }
    }
}

impl fmt::Display for IndexRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexRef::Index(id) => write!(f, "{}", id),
            IndexRef::Outgoing(id) => write!(f, "{}{}", id, LinkDirection::Outgoing.suffix()),
            IndexRef::Incoming(id) => write!(f, "{}{}", id, LinkDirection::Incoming.suffix()),
        }
    }
}

/// How `insert_after`/`remove` mutate a sequence. Both leave the same cards
/// behind; copy-on-write replaces the sequence value instead of splicing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EditStrategy {
    #[default]
    InPlace,
    CopyOnWrite,
}

/// A private copy of one sequence. Edit it freely, then hand it back to
/// [`CardStore::publish`].
#[derive(Debug, Clone)]
pub struct WorkingCopy {
    target: IndexRef,
    items: Vec<CardId>,
}

impl WorkingCopy {
    pub fn target(&self) -> &IndexRef {
        &self.target
    }
}

impl Deref for WorkingCopy {
    type Target = Vec<CardId>;

    fn deref(&self) -> &Self::Target {
        &self.items
    }
}

impl DerefMut for WorkingCopy {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.items
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CardStore {
    cards: BTreeMap<CardId, Card>,
    /// Bumped on every mutation, for change detection by observers
    #[serde(skip)]
    revision: u64,
    #[serde(skip)]
    strategy: EditStrategy,
}

impl CardStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_strategy(strategy: EditStrategy) -> Self {
        Self {
            strategy,
            ..Self::default()
        }
    }

    pub fn strategy(&self) -> EditStrategy {
        self.strategy
    }

    pub fn set_strategy(&mut self, strategy: EditStrategy) {
        self.strategy = strategy;
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    pub fn cards(&self) -> &BTreeMap<CardId, Card> {
        &self.cards
    }

    pub fn get(&self, id: &str) -> Option<&Card> {
        self.cards.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.cards.contains_key(id)
    }

    pub fn insert_card(&mut self, id: CardId, card: Card) {
        self.cards.insert(id, card);
        self.revision += 1;
    }

    /// Create an empty note. Its link lists exist from the start.
    pub fn new_note(&mut self) -> CardId {
        let id = Uuid::new_v4().to_string();
        self.insert_card(id.clone(), Card::Note(Note::default()));
        debug!(id = %id, "created note");
        id
    }

    pub fn new_index(&mut self) -> CardId {
        self.new_index_with(Vec::new())
    }

    pub fn new_index_with(&mut self, contents: Vec<CardId>) -> CardId {
        let id = Uuid::new_v4().to_string();
        self.insert_card(id.clone(), Card::Index(IndexCard { contents }));
        id
    }

    pub fn note(&self, id: &str) -> CardResult<&Note> {
        match self.cards.get(id) {
            Some(Card::Note(note)) => Ok(note),
            Some(Card::Index(_)) => Err(CardError::type_mismatch(id, "a note")),
            None => Err(CardError::UnknownCard(id.to_string())),
        }
    }

    pub fn notes(&self) -> impl Iterator<Item = (&CardId, &Note)> {
        self.cards
            .iter()
            .filter_map(|(id, card)| card.as_note().map(|note| (id, note)))
    }

    /// Replace a note's text, returning the previous text.
    pub fn update_note(&mut self, id: &str, contents: String) -> CardResult<String> {
        let note = match self.cards.get_mut(id) {
            Some(Card::Note(note)) => note,
            Some(Card::Index(_)) => return Err(CardError::type_mismatch(id, "a note")),
            None => return Err(CardError::UnknownCard(id.to_string())),
        };
        let previous = std::mem::replace(&mut note.contents, contents);
        self.revision += 1;
        Ok(previous)
    }

    pub fn contents(&self, target: &IndexRef) -> CardResult<&[CardId]> {
        match target {
            IndexRef::Index(id) => match self.cards.get(id) {
                Some(Card::Index(index)) => Ok(&index.contents),
                Some(Card::Note(_)) => Err(CardError::type_mismatch(id, "an index")),
                None => Err(CardError::UnknownCard(id.clone())),
            },
            IndexRef::Outgoing(owner) => Ok(self.note(owner)?.links(LinkDirection::Outgoing)),
            IndexRef::Incoming(owner) => Ok(self.note(owner)?.links(LinkDirection::Incoming)),
        }
    }

    /// Length of a sequence, or 0 when it cannot be resolved.
    pub fn sequence_len(&self, target: &IndexRef) -> usize {
        self.contents(target).map(|items| items.len()).unwrap_or(0)
    }

    fn sequence_mut(&mut self, target: &IndexRef) -> CardResult<&mut Vec<CardId>> {
        match target {
            IndexRef::Index(id) => match self.cards.get_mut(id) {
                Some(Card::Index(index)) => Ok(&mut index.contents),
                Some(Card::Note(_)) => Err(CardError::type_mismatch(id, "an index")),
                None => Err(CardError::UnknownCard(id.clone())),
            },
            IndexRef::Outgoing(owner) | IndexRef::Incoming(owner) => {
                let direction = match target {
                    IndexRef::Outgoing(_) => LinkDirection::Outgoing,
                    _ => LinkDirection::Incoming,
                };
                match self.cards.get_mut(owner) {
                    Some(Card::Note(note)) => Ok(note.links_mut(direction)),
                    Some(Card::Index(_)) => Err(CardError::type_mismatch(owner, "a note")),
                    None => Err(CardError::UnknownCard(owner.clone())),
                }
            }
        }
    }

    /// Apply `edit` to a sequence using the configured strategy.
    pub(crate) fn edit_sequence<R>(
        &mut self,
        target: &IndexRef,
        edit: impl FnOnce(&mut Vec<CardId>) -> R,
    ) -> CardResult<R> {
        match self.strategy {
            EditStrategy::InPlace => {
                let result = edit(self.sequence_mut(target)?);
                self.revision += 1;
                Ok(result)
            }
            EditStrategy::CopyOnWrite => self.edit_copy_on_write(target, edit),
        }
    }

    /// Insert `id` right after `position` in `target` (`-1` inserts at the
    /// front). Inserting into a note's link list also records the reverse
    /// link on `id`.
    pub fn insert_after(&mut self, target: &IndexRef, position: isize, id: &str) -> CardResult<()> {
        let len = self.contents(target)?.len();
        if position < -1 || position >= len as isize {
            return Err(CardError::IndexOutOfBounds {
                index: target.to_string(),
                position,
                len,
            });
        }
        if target.link_owner().is_some() {
            self.note(id)?;
        }

        let at = (position + 1) as usize;
        let inserted = id.to_string();
        self.edit_sequence(target, |items| items.insert(at, inserted))?;

        if let Some((owner, direction)) = target.link_owner() {
            graph::attach(self, owner, direction, id)?;
        }
        debug!(index = %target, position, id, "inserted card");
        Ok(())
    }

    /// Remove and return the ID at `position`. Removing from a note's link
    /// list also drops the reverse link held by the removed note.
    pub fn remove(&mut self, target: &IndexRef, position: usize) -> CardResult<CardId> {
        let items = self.contents(target)?;
        let removed = match items.get(position) {
            Some(id) => id.clone(),
            None => {
                return Err(CardError::IndexOutOfBounds {
                    index: target.to_string(),
                    position: position as isize,
                    len: items.len(),
                })
            }
        };
        if target.link_owner().is_some() {
            self.note(&removed)?;
        }

        self.edit_sequence(target, |items| {
            items.remove(position);
        })?;

        if let Some((owner, direction)) = target.link_owner() {
            graph::detach(self, owner, direction, &removed)?;
        }
        debug!(index = %target, position, id = %removed, "removed card");
        Ok(removed)
    }

    pub fn working_copy(&self, target: &IndexRef) -> CardResult<WorkingCopy> {
        Ok(WorkingCopy {
            target: target.clone(),
            items: self.contents(target)?.to_vec(),
        })
    }

    /// Replace the stored sequence with the edited copy as a new revision.
    pub fn publish(&mut self, copy: WorkingCopy) -> CardResult<()> {
        let WorkingCopy { target, items } = copy;
        match &target {
            IndexRef::Index(id) => {
                self.contents(&target)?;
                self.cards
                    .insert(id.clone(), Card::Index(IndexCard { contents: items }));
            }
            _ => *self.sequence_mut(&target)? = items,
        }
        self.revision += 1;
        Ok(())
    }

    /// Acquire a working copy of `target`, run `edit` against it, publish.
    /// This is a raw sequence edit: link bookkeeping is left to the caller.
    pub fn edit_copy_on_write<R>(
        &mut self,
        target: &IndexRef,
        edit: impl FnOnce(&mut Vec<CardId>) -> R,
    ) -> CardResult<R> {
        let mut copy = self.working_copy(target)?;
        let result = edit(&mut copy);
        self.publish(copy)?;
        Ok(result)
    }

    /// Delete every card not reachable from `roots` through index contents
    /// or note links. Returns the removed IDs.
    pub fn collect_garbage(&mut self, roots: &[CardId]) -> Vec<CardId> {
        let mut reachable: HashSet<CardId> = HashSet::new();
        let mut queue: VecDeque<CardId> = roots.iter().cloned().collect();

        while let Some(id) = queue.pop_front() {
            if !reachable.insert(id.clone()) {
                continue;
            }
            match self.cards.get(&id) {
                Some(Card::Index(index)) => queue.extend(index.contents.iter().cloned()),
                Some(Card::Note(note)) => {
                    queue.extend(note.outgoing.iter().chain(&note.incoming).cloned())
                }
                None => {}
            }
        }

        let removed: Vec<CardId> = self
            .cards
            .keys()
            .filter(|id| !reachable.contains(*id))
            .cloned()
            .collect();
        for id in &removed {
            self.cards.remove(id);
        }
        if !removed.is_empty() {
            self.revision += 1;
        }
        removed
    }

    /// Fold link lists stored as separate `<id>-outgoing` / `<id>-incoming`
    /// index cards into their owning notes. Returns how many were folded.
    pub fn migrate_legacy_links(&mut self) -> usize {
        let legacy: Vec<(CardId, CardId, LinkDirection)> = self
            .cards
            .iter()
            .filter(|(_, card)| !card.is_note())
            .filter_map(|(id, _)| {
                let (owner, direction) = match IndexRef::parse(id) {
                    IndexRef::Outgoing(owner) => (owner, LinkDirection::Outgoing),
                    IndexRef::Incoming(owner) => (owner, LinkDirection::Incoming),
                    IndexRef::Index(_) => return None,
                };
                matches!(self.cards.get(&owner), Some(Card::Note(_)))
                    .then(|| (id.clone(), owner, direction))
            })
            .collect();

        for (id, owner, direction) in &legacy {
            if let Some(Card::Index(index)) = self.cards.remove(id) {
                if let Some(Card::Note(note)) = self.cards.get_mut(owner) {
                    *note.links_mut(*direction) = index.contents;
                }
            }
        }
        if !legacy.is_empty() {
            self.revision += 1;
        }
        legacy.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_root() -> (CardStore, IndexRef) {
        let mut store = CardStore::new();
        let root = store.new_index();
        (store, IndexRef::Index(root))
    }

    #[test]
    fn test_new_note_into_empty_root() {
        let (mut store, root) = store_with_root();
        let note = store.new_note();
        store.insert_after(&root, -1, &note).unwrap();

        assert_eq!(store.contents(&root).unwrap(), &[note.clone()]);
        assert!(store.contents(&IndexRef::Outgoing(note.clone())).unwrap().is_empty());
        assert!(store.contents(&IndexRef::Incoming(note)).unwrap().is_empty());
    }

    #[test]
    fn test_insert_after_positions() {
        let (mut store, root) = store_with_root();
        store.insert_after(&root, -1, "b").unwrap();
        store.insert_after(&root, -1, "a").unwrap();
        store.insert_after(&root, 1, "c").unwrap();
        assert_eq!(store.contents(&root).unwrap(), &["a", "b", "c"]);
    }

    #[test]
    fn test_insert_out_of_bounds() {
        let (mut store, root) = store_with_root();
        let err = store.insert_after(&root, 0, "x").unwrap_err();
        assert!(matches!(err, CardError::IndexOutOfBounds { position: 0, len: 0, .. }));
        assert!(store.insert_after(&root, -2, "x").is_err());
    }

    #[test]
    fn test_remove_out_of_bounds() {
        let (mut store, root) = store_with_root();
        store.insert_after(&root, -1, "a").unwrap();
        let err = store.remove(&root, 1).unwrap_err();
        assert!(matches!(err, CardError::IndexOutOfBounds { position: 1, len: 1, .. }));
        assert_eq!(store.contents(&root).unwrap().len(), 1);
    }

    #[test]
    fn test_type_mismatch_on_note_as_index() {
        let mut store = CardStore::new();
        let note = store.new_note();
        let target = IndexRef::Index(note.clone());

        assert!(matches!(
            store.insert_after(&target, -1, "x"),
            Err(CardError::TypeMismatch { .. })
        ));
        assert!(matches!(store.remove(&target, 0), Err(CardError::TypeMismatch { .. })));
    }

    #[test]
    fn test_link_to_index_is_rejected_without_mutation() {
        let mut store = CardStore::new();
        let note = store.new_note();
        let folder = store.new_index();
        let outgoing = IndexRef::Outgoing(note.clone());

        let err = store.insert_after(&outgoing, -1, &folder).unwrap_err();
        assert!(matches!(err, CardError::TypeMismatch { .. }));
        assert!(store.contents(&outgoing).unwrap().is_empty());
    }

    #[test]
    fn test_update_note() {
        let mut store = CardStore::new();
        let note = store.new_note();
        let previous = store.update_note(&note, "hello".into()).unwrap();
        assert_eq!(previous, "");
        assert_eq!(store.note(&note).unwrap().contents, "hello");

        let folder = store.new_index();
        assert!(matches!(
            store.update_note(&folder, "x".into()),
            Err(CardError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_copy_on_write_matches_in_place() {
        let mut results = Vec::new();
        for strategy in [EditStrategy::InPlace, EditStrategy::CopyOnWrite] {
            let mut store = CardStore::with_strategy(strategy);
            store.insert_card("root".into(), Card::Index(IndexCard::default()));
            store.insert_card("a".into(), Card::Note(Note::default()));
            store.insert_card("b".into(), Card::Note(Note::default()));
            let root = IndexRef::Index("root".into());
            let links = IndexRef::Outgoing("a".into());

            store.insert_after(&root, -1, "a").unwrap();
            store.insert_after(&root, 0, "b").unwrap();
            store.insert_after(&links, -1, "b").unwrap();
            store.remove(&root, 0).unwrap();
            results.push(store.cards().clone());
        }
        assert_eq!(results[0], results[1]);
    }

    #[test]
    fn test_working_copy_publish_bumps_revision() {
        let (mut store, root) = store_with_root();
        let before = store.revision();

        let mut copy = store.working_copy(&root).unwrap();
        copy.push("x".into());
        assert!(store.contents(&root).unwrap().is_empty());

        store.publish(copy).unwrap();
        assert_eq!(store.contents(&root).unwrap(), &["x"]);
        assert!(store.revision() > before);
    }

    #[test]
    fn test_index_ref_string_form() {
        let outgoing = IndexRef::parse("abc-outgoing");
        assert_eq!(outgoing, IndexRef::Outgoing("abc".into()));
        assert_eq!(outgoing.to_string(), "abc-outgoing");
        assert_eq!(IndexRef::parse("abc-incoming").to_string(), "abc-incoming");
        assert_eq!(IndexRef::parse("abc"), IndexRef::Index("abc".into()));
    }

    #[test]
    fn test_collect_garbage_keeps_linked_notes() {
        let (mut store, root) = store_with_root();
        let kept = store.new_note();
        let linked = store.new_note();
        let orphan = store.new_note();
        store.insert_after(&root, -1, &kept).unwrap();
        store.insert_after(&IndexRef::Outgoing(kept.clone()), -1, &linked).unwrap();

        let removed = store.collect_garbage(&[root.card_id().to_string()]);
        assert_eq!(removed, vec![orphan.clone()]);
        assert!(store.contains(&linked));
        assert!(!store.contains(&orphan));
    }

    #[test]
    fn test_migrate_legacy_links() {
        let json = r#"{
            "root": {"type": "index", "contents": ["a", "b"]},
            "a": {"type": "note", "contents": "first"},
            "a-outgoing": {"type": "index", "contents": ["b"]},
            "a-incoming": {"type": "index", "contents": []},
            "b": {"type": "note", "contents": "second"},
            "b-outgoing": {"type": "index", "contents": []},
            "b-incoming": {"type": "index", "contents": ["a"]}
        }"#;
        let mut store: CardStore = serde_json::from_str(json).unwrap();
        assert_eq!(store.migrate_legacy_links(), 4);
        assert_eq!(store.len(), 3);
        assert_eq!(store.note("a").unwrap().outgoing, vec!["b".to_string()]);
        assert_eq!(store.note("b").unwrap().incoming, vec!["a".to_string()]);
    }
}

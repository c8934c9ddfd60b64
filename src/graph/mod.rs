//! Link graph between notes.
//! Every note owns an `outgoing` and an `incoming` list; `b` sits in
//! `a.outgoing` exactly as many times as `a` sits in `b.incoming`.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::CardResult;
use crate::store::{Card, CardId, CardStore, IndexRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LinkDirection {
    Outgoing,
    Incoming,
}

impl LinkDirection {
    pub fn opposite(self) -> Self {
        match self {
            LinkDirection::Outgoing => LinkDirection::Incoming,
            LinkDirection::Incoming => LinkDirection::Outgoing,
        }
    }

    /// Suffix used by the string form of a link list (`<id>-outgoing`).
    pub fn suffix(self) -> &'static str {
        match self {
            LinkDirection::Outgoing => "-outgoing",
            LinkDirection::Incoming => "-incoming",
        }
    }
}

/// `id` was just placed in `owner`'s `direction` list: mirror it.
pub(crate) fn attach(
    store: &mut CardStore,
    owner: &str,
    direction: LinkDirection,
    id: &str,
) -> CardResult<()> {
    let mirror = IndexRef::links(id, direction.opposite());
    let owner = owner.to_string();
    store.edit_sequence(&mirror, |links| links.push(owner))
}

/// `id` was just taken out of `owner`'s `direction` list: drop one mirror entry.
pub(crate) fn detach(
    store: &mut CardStore,
    owner: &str,
    direction: LinkDirection,
    id: &str,
) -> CardResult<()> {
    let mirror = IndexRef::links(id, direction.opposite());
    store.edit_sequence(&mirror, |links| {
        if let Some(pos) = links.iter().position(|linked| linked == owner) {
            links.remove(pos);
        }
    })
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct LinkViolation {
    pub from: CardId,
    pub to: CardId,
    /// The side that holds the unmatched entry
    pub direction: LinkDirection,
}

/// Report every link that is not mirrored on the other note. Empty when the
/// graph is consistent.
pub fn check_links(store: &CardStore) -> Vec<LinkViolation> {
    let mut balance: BTreeMap<(CardId, CardId), i64> = BTreeMap::new();

    for (id, note) in store.notes() {
        for target in &note.outgoing {
            *balance.entry((id.clone(), target.clone())).or_default() += 1;
        }
        for source in &note.incoming {
            *balance.entry((source.clone(), id.clone())).or_default() -= 1;
        }
    }

    let mut violations: Vec<LinkViolation> = balance
        .into_iter()
        .filter(|(_, count)| *count != 0)
        .map(|((from, to), count)| LinkViolation {
            from,
            to,
            direction: if count > 0 {
                LinkDirection::Outgoing
            } else {
                LinkDirection::Incoming
            },
        })
        .collect();

    // Links pointing at something that is not a note are never mirrored.
    for (id, note) in store.notes() {
        for target in &note.outgoing {
            if !matches!(store.get(target), Some(Card::Note(_))) {
                violations.push(LinkViolation {
                    from: id.clone(),
                    to: target.clone(),
                    direction: LinkDirection::Outgoing,
                });
            }
        }
    }
    violations.sort();
    violations.dedup();
    violations
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct LinkEdge {
    pub from: CardId,
    pub to: CardId,
    pub bidirectional: bool,
}

/// Distinct note-to-note edges, with mutual links folded into one edge.
pub fn edges(store: &CardStore) -> Vec<LinkEdge> {
    let mut seen: BTreeSet<(CardId, CardId)> = BTreeSet::new();
    let mut result = Vec::new();

    for (from, note) in store.notes() {
        for to in &note.outgoing {
            let key = if from <= to {
                (from.clone(), to.clone())
            } else {
                (to.clone(), from.clone())
            };
            if !seen.insert(key) {
                continue;
            }
            let bidirectional = from != to
                && store
                    .note(to)
                    .map(|other| other.outgoing.contains(from))
                    .unwrap_or(false);
            result.push(LinkEdge {
                from: from.clone(),
                to: to.clone(),
                bidirectional,
            });
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_notes() -> (CardStore, CardId, CardId) {
        let mut store = CardStore::new();
        let a = store.new_note();
        let b = store.new_note();
        (store, a, b)
    }

    #[test]
    fn test_outgoing_insert_mirrors_incoming() {
        let (mut store, a, b) = two_notes();
        store.insert_after(&IndexRef::Outgoing(a.clone()), -1, &b).unwrap();

        assert_eq!(store.note(&b).unwrap().incoming, vec![a.clone()]);
        assert!(check_links(&store).is_empty());

        store.remove(&IndexRef::Outgoing(a.clone()), 0).unwrap();
        assert!(store.note(&b).unwrap().incoming.is_empty());
        assert!(store.note(&a).unwrap().outgoing.is_empty());
    }

    #[test]
    fn test_incoming_insert_mirrors_outgoing() {
        let (mut store, a, b) = two_notes();
        store.insert_after(&IndexRef::Incoming(a.clone()), -1, &b).unwrap();

        assert_eq!(store.note(&b).unwrap().outgoing, vec![a.clone()]);
        store.remove(&IndexRef::Incoming(a), 0).unwrap();
        assert!(store.note(&b).unwrap().outgoing.is_empty());
    }

    #[test]
    fn test_duplicate_links_remove_one_mirror() {
        let (mut store, a, b) = two_notes();
        let outgoing = IndexRef::Outgoing(a.clone());
        store.insert_after(&outgoing, -1, &b).unwrap();
        store.insert_after(&outgoing, 0, &b).unwrap();
        assert_eq!(store.note(&b).unwrap().incoming.len(), 2);

        store.remove(&outgoing, 1).unwrap();
        assert_eq!(store.note(&b).unwrap().incoming, vec![a]);
        assert!(check_links(&store).is_empty());
    }

    #[test]
    fn test_check_links_reports_unmirrored() {
        let mut store = CardStore::new();
        store.insert_card(
            "a".into(),
            Card::Note(crate::store::Note {
                outgoing: vec!["b".into()],
                ..Default::default()
            }),
        );
        store.insert_card("b".into(), Card::Note(Default::default()));

        let violations = check_links(&store);
        assert_eq!(
            violations,
            vec![LinkViolation {
                from: "a".into(),
                to: "b".into(),
                direction: LinkDirection::Outgoing,
            }]
        );
    }

    #[test]
    fn test_edges_fold_mutual_links() {
        let mut store = CardStore::new();
        let a = store.new_note();
        let b = store.new_note();
        let c = store.new_note();
        store.insert_after(&IndexRef::Outgoing(a.clone()), -1, &b).unwrap();
        store.insert_after(&IndexRef::Outgoing(b.clone()), -1, &a).unwrap();
        store.insert_after(&IndexRef::Outgoing(a.clone()), 0, &c).unwrap();

        let edges = edges(&store);
        assert_eq!(edges.len(), 2);
        assert_eq!(edges.iter().filter(|edge| edge.bidirectional).count(), 1);
    }
}

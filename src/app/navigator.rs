use tracing::debug;

use crate::error::CardResult;
use crate::store::{CardId, CardStore, IndexRef};

const MAX_HISTORY: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Viewing,
    Editing,
    Selecting,
}

/// One breadcrumb: the sequence being browsed and the focused position in
/// it, `-1` when nothing is focused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub index: IndexRef,
    pub focus: isize,
}

fn initial_focus(len: usize) -> isize {
    if len > 0 {
        0
    } else {
        -1
    }
}

fn clamp_focus(focus: isize, len: usize, lower: isize) -> isize {
    let upper = len as isize - 1;
    if upper < 0 {
        return -1;
    }
    focus.clamp(lower.min(upper), upper)
}

#[derive(Debug, Clone)]
pub struct Navigator {
    crumbs: Vec<Frame>,
    mode: Mode,
    /// Other end of the selection, only set while selecting
    anchor: Option<isize>,
    /// Frames left through `exit`, most recent last
    forward: Vec<Frame>,
}

impl Navigator {
    pub fn new(root: IndexRef, store: &CardStore) -> Self {
        let focus = initial_focus(store.sequence_len(&root));
        Self {
            crumbs: vec![Frame { index: root, focus }],
            mode: Mode::Viewing,
            anchor: None,
            forward: Vec::new(),
        }
    }

    pub fn frames(&self) -> &[Frame] {
        &self.crumbs
    }

    /// Frames that `go_forward` can return to, most recent last
    pub fn forward_frames(&self) -> &[Frame] {
        &self.forward
    }

    pub fn current(&self) -> &Frame {
        // The root frame is never popped.
        &self.crumbs[self.crumbs.len() - 1]
    }

    fn current_mut(&mut self) -> &mut Frame {
        let last = self.crumbs.len() - 1;
        &mut self.crumbs[last]
    }

    pub fn current_index(&self) -> &IndexRef {
        &self.current().index
    }

    pub fn focus(&self) -> isize {
        self.current().focus
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn anchor(&self) -> Option<isize> {
        self.anchor
    }

    pub fn focused_id(&self, store: &CardStore) -> Option<CardId> {
        let focus = usize::try_from(self.focus()).ok()?;
        store
            .contents(self.current_index())
            .ok()?
            .get(focus)
            .cloned()
    }

    /// Move focus to `focus`, clamped to the current sequence.
    pub fn set_focus(&mut self, store: &CardStore, focus: isize) {
        let len = store.sequence_len(self.current_index());
        let lower = self.lower_bound();
        self.current_mut().focus = clamp_focus(focus, len, lower);
    }

    fn lower_bound(&self) -> isize {
        if self.mode == Mode::Selecting {
            0
        } else {
            -1
        }
    }

    /// Push a frame for `target`, focused on its first card if any.
    pub fn enter(&mut self, store: &CardStore, target: IndexRef) -> CardResult<()> {
        let len = store.contents(&target)?.len();
        self.clear_selection();
        debug!(index = %target, depth = self.crumbs.len() + 1, "enter");
        self.crumbs.push(Frame {
            index: target,
            focus: initial_focus(len),
        });
        self.forward.clear();
        Ok(())
    }

    /// Pop the top frame. The root frame stays.
    pub fn exit(&mut self) -> bool {
        if self.crumbs.len() <= 1 {
            return false;
        }
        self.clear_selection();
        if let Some(frame) = self.crumbs.pop() {
            self.forward.push(frame);
            if self.forward.len() > MAX_HISTORY {
                let excess = self.forward.len() - MAX_HISTORY;
                self.forward.drain(0..excess);
            }
        }
        true
    }

    /// Re-enter the frame most recently left through `exit`.
    pub fn go_forward(&mut self, store: &CardStore) -> bool {
        while let Some(frame) = self.forward.pop() {
            let Ok(items) = store.contents(&frame.index) else {
                continue;
            };
            let focus = clamp_focus(frame.focus, items.len(), -1);
            self.clear_selection();
            self.crumbs.push(Frame {
                index: frame.index,
                focus,
            });
            return true;
        }
        false
    }

    pub fn can_go_forward(&self) -> bool {
        !self.forward.is_empty()
    }

    pub fn go_up(&mut self) {
        let lower = self.lower_bound();
        let frame = self.current_mut();
        if frame.focus > lower {
            frame.focus -= 1;
        }
    }

    pub fn go_down(&mut self, store: &CardStore) {
        let len = store.sequence_len(self.current_index()) as isize;
        let frame = self.current_mut();
        if frame.focus < len - 1 {
            frame.focus += 1;
        }
    }

    /// Jump to `target` at `focus`, replacing the top frame.
    pub fn view(&mut self, store: &CardStore, target: IndexRef, focus: isize) -> CardResult<()> {
        let len = store.contents(&target)?.len();
        self.clear_selection();
        *self.current_mut() = Frame {
            index: target,
            focus: clamp_focus(focus, len, -1),
        };
        Ok(())
    }

    /// Enter editing mode. Needs a focused card.
    pub fn begin_editing(&mut self) -> bool {
        if self.focus() < 0 {
            return false;
        }
        self.anchor = None;
        self.mode = Mode::Editing;
        true
    }

    pub fn stop_editing(&mut self) {
        if self.mode == Mode::Editing {
            self.mode = Mode::Viewing;
        }
    }

    /// Enter (or stay in) selecting mode, anchoring at the current focus the
    /// first time. Needs a focused card.
    pub fn select(&mut self) -> bool {
        if self.focus() < 0 {
            return false;
        }
        self.mode = Mode::Selecting;
        if self.anchor.is_none() {
            self.anchor = Some(self.focus());
        }
        true
    }

    /// Leave selecting mode and forget the anchor.
    pub fn clear_selection(&mut self) {
        if self.mode == Mode::Selecting {
            self.mode = Mode::Viewing;
        }
        self.anchor = None;
    }

    /// Inclusive `(lower, upper)` positions covered by the current selection:
    /// the anchor range while selecting, otherwise the focused card alone.
    pub fn selection_range(&self) -> Option<(usize, usize)> {
        let focus = usize::try_from(self.focus()).ok()?;
        match (self.mode, self.anchor) {
            (Mode::Selecting, Some(anchor)) => {
                let anchor = usize::try_from(anchor).ok()?;
                Some((focus.min(anchor), focus.max(anchor)))
            }
            _ => Some((focus, focus)),
        }
    }

    /// Pull every frame's focus (and the anchor) back inside its sequence.
    /// Frames whose sequence no longer resolves are dropped, except the root.
    pub fn clamp_all(&mut self, store: &CardStore) {
        let root = self.crumbs[0].index.clone();
        self.crumbs
            .retain(|frame| frame.index == root || store.contents(&frame.index).is_ok());

        let top = self.crumbs.len() - 1;
        let lower = self.lower_bound();
        for (depth, frame) in self.crumbs.iter_mut().enumerate() {
            let len = store.sequence_len(&frame.index);
            let lower = if depth == top { lower } else { -1 };
            frame.focus = clamp_focus(frame.focus, len, lower);
        }

        if let Some(anchor) = self.anchor {
            let len = store.sequence_len(self.current_index());
            if len == 0 {
                self.clear_selection();
            } else {
                self.anchor = Some(clamp_focus(anchor, len, 0));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(items: &[&str]) -> (CardStore, IndexRef) {
        let mut store = CardStore::new();
        let root = store.new_index_with(items.iter().map(|s| s.to_string()).collect());
        (store, IndexRef::Index(root))
    }

    #[test]
    fn test_initial_focus() {
        let (store, root) = store_with(&[]);
        assert_eq!(Navigator::new(root, &store).focus(), -1);

        let (store, root) = store_with(&["a"]);
        assert_eq!(Navigator::new(root, &store).focus(), 0);
    }

    #[test]
    fn test_viewing_motion_bounds() {
        let (store, root) = store_with(&["a", "b"]);
        let mut nav = Navigator::new(root, &store);

        nav.go_up();
        assert_eq!(nav.focus(), -1);
        nav.go_up();
        assert_eq!(nav.focus(), -1);

        nav.go_down(&store);
        nav.go_down(&store);
        nav.go_down(&store);
        assert_eq!(nav.focus(), 1);
    }

    #[test]
    fn test_selecting_cannot_reach_no_focus() {
        let (store, root) = store_with(&["a", "b"]);
        let mut nav = Navigator::new(root, &store);
        assert!(nav.select());
        nav.go_up();
        assert_eq!(nav.focus(), 0);
        assert_eq!(nav.anchor(), Some(0));
    }

    #[test]
    fn test_select_keeps_first_anchor() {
        let (store, root) = store_with(&["a", "b", "c"]);
        let mut nav = Navigator::new(root, &store);
        nav.select();
        nav.go_down(&store);
        nav.select();
        nav.go_down(&store);

        assert_eq!(nav.anchor(), Some(0));
        assert_eq!(nav.selection_range(), Some((0, 2)));

        nav.clear_selection();
        assert_eq!(nav.mode(), Mode::Viewing);
        assert_eq!(nav.anchor(), None);
    }

    #[test]
    fn test_editing_needs_focus() {
        let (store, root) = store_with(&["a"]);
        let mut nav = Navigator::new(root, &store);
        nav.go_up();
        assert!(!nav.begin_editing());
        assert_eq!(nav.mode(), Mode::Viewing);

        nav.go_down(&store);
        assert!(nav.begin_editing());
        assert_eq!(nav.mode(), Mode::Editing);
    }

    #[test]
    fn test_enter_exit_and_forward() {
        let (mut store, root) = store_with(&[]);
        let child = IndexRef::Index(store.new_index_with(vec!["x".into()]));
        let mut nav = Navigator::new(root.clone(), &store);

        nav.enter(&store, child.clone()).unwrap();
        assert_eq!(nav.current_index(), &child);
        assert_eq!(nav.focus(), 0);

        assert!(nav.exit());
        assert!(!nav.exit());
        assert_eq!(nav.current_index(), &root);

        assert!(nav.go_forward(&store));
        assert_eq!(nav.current_index(), &child);
        assert!(!nav.go_forward(&store));
    }

    #[test]
    fn test_enter_note_as_index_fails() {
        let (mut store, root) = store_with(&[]);
        let note = store.new_note();
        let mut nav = Navigator::new(root, &store);

        assert!(nav.enter(&store, IndexRef::Index(note.clone())).is_err());
        assert!(nav.enter(&store, IndexRef::Outgoing(note)).is_ok());
        assert_eq!(nav.focus(), -1);
    }

    #[test]
    fn test_view_replaces_top_frame() {
        let (mut store, root) = store_with(&["a"]);
        let other = IndexRef::Index(store.new_index_with(vec!["x".into(), "y".into()]));
        let mut nav = Navigator::new(root, &store);

        nav.view(&store, other.clone(), 7).unwrap();
        assert_eq!(nav.frames().len(), 1);
        assert_eq!(nav.current_index(), &other);
        assert_eq!(nav.focus(), 1);
    }

    #[test]
    fn test_clamp_all_after_shrink() {
        let (mut store, root) = store_with(&["a", "b", "c"]);
        let mut nav = Navigator::new(root.clone(), &store);
        nav.set_focus(&store, 2);

        store.remove(&root, 2).unwrap();
        store.remove(&root, 1).unwrap();
        nav.clamp_all(&store);
        assert_eq!(nav.focus(), 0);

        store.remove(&root, 0).unwrap();
        nav.clamp_all(&store);
        assert_eq!(nav.focus(), -1);
    }
}

use super::state::State;
use crate::editor::history::StoreEdit;
use crate::error::{CardError, CardResult};

impl State {
    /// Copy the selected range (or the focused card) to the clipboard, in
    /// sequence order. Returns false when nothing is focused.
    pub fn copy(&mut self) -> bool {
        let Some((lower, upper)) = self.navigator.selection_range() else {
            return false;
        };
        let Ok(items) = self.store.contents(self.navigator.current_index()) else {
            return false;
        };
        let Some(range) = items.get(lower..=upper) else {
            return false;
        };
        self.clipboard = range.to_vec();
        true
    }

    /// Remove the selected range (or the focused card) from the current
    /// sequence and go back to viewing, focused where the range began.
    pub fn remove_selection(&mut self) -> CardResult<()> {
        let Some((lower, upper)) = self.navigator.selection_range() else {
            return Ok(());
        };
        let target = self.navigator.current_index().clone();
        let items = self.store.contents(&target)?;
        let Some(range) = items.get(lower..=upper) else {
            return Err(CardError::IndexOutOfBounds {
                index: target.to_string(),
                position: upper as isize,
                len: items.len(),
            });
        };
        // Each removal shifts the rest down, so every element is taken from
        // the lower end.
        let edits = range
            .iter()
            .map(|id| StoreEdit::Remove {
                target: target.clone(),
                position: lower,
                id: id.clone(),
            })
            .collect();

        self.navigator.clear_selection();
        self.commit(edits, lower as isize)
    }

    /// Insert the clipboard after the focused card, keeping its order. The
    /// clipboard is left as is so the same cards can be pasted again.
    pub fn paste(&mut self) -> CardResult<()> {
        if self.clipboard.is_empty() {
            return Ok(());
        }
        let target = self.navigator.current_index().clone();
        let focus = self.navigator.focus();
        let edits = self
            .clipboard
            .iter()
            .enumerate()
            .map(|(offset, id)| StoreEdit::Insert {
                target: target.clone(),
                position: focus + offset as isize,
                id: id.clone(),
            })
            .collect();
        self.commit(edits, focus)
    }

    pub fn cut(&mut self) -> CardResult<()> {
        if !self.copy() {
            return Ok(());
        }
        self.remove_selection()
    }
}

#[cfg(test)]
mod tests {
    use crate::app::navigator::Mode;
    use crate::app::State;
    use crate::config::Config;
    use crate::graph::{check_links, LinkDirection};
    use crate::store::{CardId, IndexRef};

    fn state_with(n: usize) -> (State, Vec<CardId>) {
        let mut state = State::new(&Config::default());
        let mut ids = Vec::new();
        for _ in 0..n {
            ids.push(state.new_note().unwrap());
            state.stop_editing();
        }
        (state, ids)
    }

    fn current(state: &State) -> Vec<CardId> {
        state
            .store()
            .contents(state.navigator().current_index())
            .unwrap()
            .to_vec()
    }

    fn select_range(state: &mut State, anchor: isize, focus: isize) {
        state.navigator.set_focus(&state.store, anchor);
        state.select();
        state.navigator.set_focus(&state.store, focus);
    }

    #[test]
    fn test_copy_focused_card() {
        let (mut state, ids) = state_with(3);
        state.navigator.set_focus(&state.store, 1);
        assert!(state.copy());
        assert_eq!(state.clipboard(), &ids[1..2]);
    }

    #[test]
    fn test_copy_without_focus_is_noop() {
        let (mut state, _) = state_with(0);
        assert!(!state.copy());
        assert!(state.clipboard().is_empty());
    }

    #[test]
    fn test_copy_reversed_selection_keeps_order() {
        let (mut state, ids) = state_with(5);
        select_range(&mut state, 3, 1);
        assert!(state.copy());
        assert_eq!(state.clipboard(), &ids[1..=3]);
    }

    #[test]
    fn test_remove_selection_range() {
        let (mut state, ids) = state_with(6);
        select_range(&mut state, 2, 5);

        state.remove_selection().unwrap();
        assert_eq!(current(&state), ids[..2].to_vec());
        assert_eq!(state.mode(), Mode::Viewing);
        assert_eq!(state.navigator().anchor(), None);
        assert_eq!(state.focus(), 1);
    }

    #[test]
    fn test_remove_middle_keeps_focus_at_lower() {
        let (mut state, ids) = state_with(6);
        select_range(&mut state, 3, 1);

        state.remove_selection().unwrap();
        assert_eq!(current(&state), vec![ids[0].clone(), ids[4].clone(), ids[5].clone()]);
        assert_eq!(state.focus(), 1);
    }

    #[test]
    fn test_remove_then_undo_restores_order() {
        let (mut state, ids) = state_with(4);
        select_range(&mut state, 1, 2);
        state.remove_selection().unwrap();

        state.undo().unwrap();
        assert_eq!(current(&state), ids);
    }

    #[test]
    fn test_copy_paste_round_trip() {
        let (mut state, ids) = state_with(3);
        select_range(&mut state, 0, 1);
        state.copy();
        state.clear_selection();

        state.paste().unwrap();
        assert_eq!(
            current(&state),
            vec![
                ids[0].clone(),
                ids[1].clone(),
                ids[0].clone(),
                ids[1].clone(),
                ids[2].clone()
            ]
        );
        assert_eq!(state.clipboard(), &ids[0..2]);
    }

    #[test]
    fn test_paste_is_repeatable() {
        let (mut state, ids) = state_with(1);
        state.copy();
        state.paste().unwrap();
        state.paste().unwrap();
        assert_eq!(current(&state), vec![ids[0].clone(); 3]);
    }

    #[test]
    fn test_cut_into_links_keeps_graph_symmetric() {
        let (mut state, ids) = state_with(2);
        state.navigator.set_focus(&state.store, 1);
        state.cut().unwrap();
        assert_eq!(current(&state), vec![ids[0].clone()]);

        state.navigator.set_focus(&state.store, 0);
        state.enter_links(LinkDirection::Outgoing).unwrap();
        state.paste().unwrap();
        assert_eq!(
            state.navigator().current_index(),
            &IndexRef::Outgoing(ids[0].clone())
        );
        assert_eq!(state.store().note(&ids[1]).unwrap().incoming, vec![ids[0].clone()]);
        assert!(check_links(state.store()).is_empty());
    }
}

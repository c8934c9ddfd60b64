use tracing::{debug, warn};

use super::navigator::Mode;
use super::state::State;
use crate::error::CardResult;
use crate::graph::LinkDirection;
use crate::store::CardId;

/// Everything the user can ask the application to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Search(String),
    FindRelatedNotes,
    Edit,
    UpdateNote { id: CardId, contents: String },
    StopEditing,
    NewNote,
    Remove,
    Left,
    Right,
    Up,
    Down,
    Back,
    Forward,
    Copy,
    Paste,
    Cut,
    Undo,
    Redo,
    SelectAndGoDown,
    SelectAndGoUp,
}

impl State {
    /// Apply one intent. Failures are logged and the state stays usable.
    pub fn dispatch(&mut self, intent: Intent) {
        if let Err(e) = self.try_dispatch(intent.clone()) {
            warn!(intent = ?intent, error = %e, "intent failed");
        }
    }

    /// Apply one intent, reporting failures to the caller. Intents that make
    /// no sense in the current mode are ignored.
    pub fn try_dispatch(&mut self, intent: Intent) -> CardResult<()> {
        debug!(intent = ?intent, mode = ?self.mode(), "dispatch");
        if let Intent::Search(query) = &intent {
            return self.search(query);
        }

        let focused = self.focus() >= 0;
        match self.mode() {
            Mode::Viewing => match intent {
                Intent::Edit if focused => {
                    self.begin_editing();
                }
                Intent::FindRelatedNotes if focused => self.show_related_notes()?,
                Intent::Back => {
                    self.exit();
                }
                Intent::Forward => {
                    self.go_forward();
                }
                Intent::NewNote => {
                    self.new_note()?;
                }
                Intent::Paste => self.paste()?,
                Intent::Right if focused => self.enter_links(LinkDirection::Outgoing)?,
                Intent::Left if focused => self.enter_links(LinkDirection::Incoming)?,
                Intent::Undo => {
                    self.undo()?;
                }
                Intent::Redo => {
                    self.redo()?;
                }
                other => self.dispatch_listing(other)?,
            },
            Mode::Selecting => match intent {
                Intent::Back => self.clear_selection(),
                other => self.dispatch_listing(other)?,
            },
            Mode::Editing => match intent {
                Intent::StopEditing => self.stop_editing(),
                Intent::UpdateNote { id, contents } => self.update_note(&id, contents)?,
                _ => {}
            },
        }
        Ok(())
    }

    /// Intents shared by viewing and selecting.
    fn dispatch_listing(&mut self, intent: Intent) -> CardResult<()> {
        let focused = self.focus() >= 0;
        match intent {
            Intent::Remove if focused => self.remove_selection()?,
            Intent::Copy if focused => {
                self.copy();
                self.clear_selection();
            }
            Intent::Cut if focused => self.cut()?,
            Intent::Up => self.go_up(),
            Intent::Down => self.go_down(),
            Intent::SelectAndGoDown if focused => {
                if self.select() {
                    self.go_down();
                }
            }
            Intent::SelectAndGoUp => {
                if self.select() {
                    self.go_up();
                }
            }
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::error::CardError;
    use crate::store::IndexRef;

    fn state_with(n: usize) -> State {
        let mut state = State::new(&Config::default());
        for _ in 0..n {
            state.dispatch(Intent::NewNote);
            state.dispatch(Intent::StopEditing);
        }
        state
    }

    fn current_len(state: &State) -> usize {
        state.store().sequence_len(state.navigator().current_index())
    }

    #[test]
    fn test_new_note_then_type() {
        let mut state = state_with(0);
        state.dispatch(Intent::NewNote);
        assert_eq!(state.mode(), Mode::Editing);

        let id = state.focused_id().unwrap();
        state.dispatch(Intent::UpdateNote {
            id: id.clone(),
            contents: "hello".into(),
        });
        state.dispatch(Intent::StopEditing);

        assert_eq!(state.mode(), Mode::Viewing);
        assert_eq!(state.store().note(&id).unwrap().contents, "hello");
    }

    #[test]
    fn test_update_index_reports_mismatch() {
        let mut state = state_with(1);
        state.dispatch(Intent::Edit);
        let root = state.root().to_string();

        let err = state
            .try_dispatch(Intent::UpdateNote {
                id: root.clone(),
                contents: "x".into(),
            })
            .unwrap_err();
        assert!(matches!(err, CardError::TypeMismatch { .. }));

        // dispatch only logs it
        state.dispatch(Intent::UpdateNote {
            id: root,
            contents: "x".into(),
        });
        assert_eq!(state.mode(), Mode::Editing);
    }

    #[test]
    fn test_edit_needs_focus() {
        let mut state = state_with(0);
        state.dispatch(Intent::Edit);
        assert_eq!(state.mode(), Mode::Viewing);
    }

    #[test]
    fn test_movement_ignored_while_editing() {
        let mut state = state_with(2);
        state.dispatch(Intent::Edit);
        let focus = state.focus();
        state.dispatch(Intent::Up);
        state.dispatch(Intent::Remove);
        assert_eq!(state.focus(), focus);
        assert_eq!(current_len(&state), 2);
    }

    #[test]
    fn test_select_then_back_clears_selection() {
        let mut state = state_with(3);
        state.dispatch(Intent::Up);
        state.dispatch(Intent::Up);
        state.dispatch(Intent::SelectAndGoDown);
        assert_eq!(state.mode(), Mode::Selecting);
        assert_eq!(state.navigator().selection_range(), Some((0, 1)));

        state.dispatch(Intent::Back);
        assert_eq!(state.mode(), Mode::Viewing);
        assert_eq!(state.navigator().anchor(), None);
        assert_eq!(state.navigator().frames().len(), 1);
    }

    #[test]
    fn test_select_and_remove() {
        let mut state = state_with(4);
        state.dispatch(Intent::SelectAndGoUp);
        state.dispatch(Intent::SelectAndGoUp);
        state.dispatch(Intent::Remove);

        assert_eq!(current_len(&state), 1);
        assert_eq!(state.mode(), Mode::Viewing);
        assert_eq!(state.focus(), 0);
    }

    #[test]
    fn test_copy_leaves_selecting() {
        let mut state = state_with(2);
        state.dispatch(Intent::SelectAndGoUp);
        state.dispatch(Intent::Copy);
        assert_eq!(state.mode(), Mode::Viewing);
        assert_eq!(state.clipboard().len(), 2);
    }

    #[test]
    fn test_right_left_back_forward() {
        let mut state = state_with(1);
        let id = state.focused_id().unwrap();

        state.dispatch(Intent::Right);
        assert_eq!(state.navigator().current_index(), &IndexRef::Outgoing(id.clone()));

        state.dispatch(Intent::Back);
        state.dispatch(Intent::Left);
        assert_eq!(state.navigator().current_index(), &IndexRef::Incoming(id.clone()));

        state.dispatch(Intent::Back);
        assert_eq!(state.navigator().frames().len(), 1);
        state.dispatch(Intent::Forward);
        assert_eq!(state.navigator().current_index(), &IndexRef::Incoming(id));
    }

    #[test]
    fn test_search_from_editing() {
        let mut state = state_with(0);
        state.dispatch(Intent::NewNote);
        let id = state.focused_id().unwrap();
        state.dispatch(Intent::UpdateNote {
            id: id.clone(),
            contents: "search engines rank documents".into(),
        });

        state.dispatch(Intent::Search("ranking".into()));
        assert_eq!(state.mode(), Mode::Viewing);
        assert_eq!(
            state.store().contents(state.navigator().current_index()).unwrap(),
            &[id]
        );
    }

    #[test]
    fn test_undo_redo_intents() {
        let mut state = state_with(2);
        state.dispatch(Intent::Remove);
        assert_eq!(current_len(&state), 1);

        state.dispatch(Intent::Undo);
        assert_eq!(current_len(&state), 2);
        state.dispatch(Intent::Redo);
        assert_eq!(current_len(&state), 1);
    }
}

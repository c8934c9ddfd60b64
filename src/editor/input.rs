use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::app::Intent;

#[derive(Debug, Clone, PartialEq)]
pub enum InputAction {
    Intent(Intent),
    /// Prompt for a query, then dispatch `Intent::Search`
    StartSearch,
    Quit,
    None,
}

/// Map a key pressed while browsing (viewing or selecting) to an action.
pub fn process_key(key: KeyEvent) -> InputAction {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    let shift = key.modifiers.contains(KeyModifiers::SHIFT);

    let intent = match key.code {
        KeyCode::Char(c) if ctrl => match c {
            'c' => Intent::Copy,
            'x' => Intent::Cut,
            'v' => Intent::Paste,
            'z' if shift => Intent::Redo,
            'Z' => Intent::Redo,
            'z' => Intent::Undo,
            'r' => Intent::Redo,
            _ => return InputAction::None,
        },
        KeyCode::Up if shift => Intent::SelectAndGoUp,
        KeyCode::Down if shift => Intent::SelectAndGoDown,
        KeyCode::Up | KeyCode::Char('k') => Intent::Up,
        KeyCode::Down | KeyCode::Char('j') => Intent::Down,
        KeyCode::Left | KeyCode::Char('h') => Intent::Left,
        KeyCode::Right | KeyCode::Char('l') => Intent::Right,
        KeyCode::Enter | KeyCode::Char('i') => Intent::Edit,
        KeyCode::Char(' ') | KeyCode::Char('a') => Intent::NewNote,
        KeyCode::Esc | KeyCode::Char('H') => Intent::Back,
        KeyCode::Char('L') => Intent::Forward,
        KeyCode::Backspace | KeyCode::Char('d') => Intent::Remove,
        KeyCode::Char('F') => Intent::FindRelatedNotes,
        KeyCode::Char('u') => Intent::Undo,
        KeyCode::Char('y') => Intent::Copy,
        KeyCode::Char('p') => Intent::Paste,
        KeyCode::Char('x') => Intent::Cut,
        KeyCode::Char('/') => return InputAction::StartSearch,
        KeyCode::Char('q') => return InputAction::Quit,
        _ => return InputAction::None,
    };
    InputAction::Intent(intent)
}

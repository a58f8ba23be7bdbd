use crossterm::event::{Event, KeyEvent};
use tui_input::backend::crossterm::EventHandler;
use tui_input::Input;

use crate::controller::FormField;

/// What the active text input writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditTarget {
    Search,
    Field(FormField),
    NoteTitle,
    NoteBody,
}

#[derive(Default)]
pub struct InlineEditor {
    pub active: bool,
    target: Option<EditTarget>,
    input: Input,
}

impl InlineEditor {
    pub fn start(&mut self, current: &str, target: EditTarget) {
        self.active = true;
        self.target = Some(target);
        self.input = Input::new(current.to_string());
    }

    pub fn cancel(&mut self) {
        self.active = false;
        self.target = None;
        self.input.reset();
    }

    pub fn target(&self) -> Option<EditTarget> {
        self.target
    }

    pub fn is_editing(&self, target: EditTarget) -> bool {
        self.active && self.target == Some(target)
    }

    pub fn value(&self) -> &str {
        self.input.value()
    }

    pub fn visual_cursor(&self) -> usize {
        self.input.visual_cursor()
    }

    /// Returns true when the value changed.
    pub fn handle_key_event(&mut self, key: KeyEvent) -> bool {
        self.input
            .handle_event(&Event::Key(key))
            .map(|change| change.value)
            .unwrap_or(false)
    }
}

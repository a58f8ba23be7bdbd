use std::io::stdout;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tui_widgets::popup::PopupState;

use crate::config::{Config, UiColors};
use crate::controller::{Completion, Controller, FormField, Task, View};
use crate::remote::CrmApi;

use super::draw;
use super::edit::{EditTarget, InlineEditor};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

pub struct App<'a, C: CrmApi + 'static> {
    config: &'a Config,
    api: Arc<C>,
    runtime: Handle,
    tx: UnboundedSender<Completion>,
    rx: UnboundedReceiver<Completion>,
    pub controller: Controller,
    pub editor: InlineEditor,
    pub form_field: FormField,
    last_view: View,
    pub modal_popup: PopupState,
}

impl<'a, C: CrmApi + 'static> App<'a, C> {
    pub fn new(config: &'a Config, api: Arc<C>, runtime: Handle) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            config,
            api,
            runtime,
            tx,
            rx,
            controller: Controller::new(),
            editor: InlineEditor::default(),
            form_field: FormField::GivenName,
            last_view: View::List,
            modal_popup: PopupState::default(),
        }
    }

    pub fn run(&mut self) -> Result<()> {
        enable_raw_mode()?;
        let mut stdout = stdout();
        stdout.execute(EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        terminal.clear()?;

        let tasks = self.controller.start();
        self.spawn(tasks);
        let result = self.event_loop(&mut terminal);

        disable_raw_mode()?;
        terminal.backend_mut().execute(LeaveAlternateScreen)?;
        terminal.show_cursor()?;

        result
    }

    fn event_loop<B>(&mut self, terminal: &mut Terminal<B>) -> Result<()>
    where
        B: ratatui::backend::Backend,
    {
        loop {
            self.drain_completions();
            draw::render(terminal, self)?;

            if event::poll(POLL_INTERVAL)? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press && self.handle_key(key) {
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    fn spawn(&self, tasks: Vec<Task>) {
        for task in tasks {
            let api = Arc::clone(&self.api);
            let tx = self.tx.clone();
            self.runtime.spawn(async move {
                let completion = task.run(api.as_ref()).await;
                // The receiver only goes away on shutdown.
                let _ = tx.send(completion);
            });
        }
    }

    /// Apply every finished task; never blocks.
    pub fn drain_completions(&mut self) {
        while let Ok(completion) = self.rx.try_recv() {
            let follow_up = self.controller.apply(completion);
            self.spawn(follow_up);
        }
        self.sync_focus();
    }

    /// Open or close the form editor when the view changed underneath it.
    fn sync_focus(&mut self) {
        let view = self.controller.view();
        if view == self.last_view {
            return;
        }
        self.last_view = view;
        self.editor.cancel();
        self.modal_popup = PopupState::default();
        if matches!(view, View::Add | View::Edit) {
            self.form_field = FormField::GivenName;
            self.start_field_editor();
        }
    }

    fn start_field_editor(&mut self) {
        let field = self.form_field;
        let value = self.controller.form().get(field).to_string();
        self.editor.start(&value, EditTarget::Field(field));
    }

    /// Returns true when the app should quit.
    pub fn handle_key(&mut self, key: KeyEvent) -> bool {
        // Ctrl+C always quits (hardcoded for safety)
        if key.modifiers.contains(KeyModifiers::CONTROL)
            && matches!(key.code, KeyCode::Char('c') | KeyCode::Char('C'))
        {
            return true;
        }

        if self.controller.confirm().is_some() {
            self.handle_confirm_modal_key(key);
            return false;
        }

        let quit = match self.controller.view() {
            View::List if self.editor.is_editing(EditTarget::Search) => {
                self.handle_search_key(key);
                false
            }
            View::List => self.handle_list_key(key),
            View::Add | View::Edit => {
                self.handle_form_key(key);
                false
            }
            View::Detail if self.editor.active => {
                self.handle_note_input_key(key);
                false
            }
            View::Detail => self.handle_detail_key(key),
        };
        self.sync_focus();
        quit
    }

    fn handle_list_key(&mut self, key: KeyEvent) -> bool {
        let keys = &self.config.keys.list;
        let row = self.controller.list_cursor();

        if self.key_matches_any(&key, keys.quit.keys()) {
            return true;
        }

        let tasks = if self.key_matches_any(&key, keys.next.keys()) {
            self.controller.select_next();
            Vec::new()
        } else if self.key_matches_any(&key, keys.prev.keys()) {
            self.controller.select_prev();
            Vec::new()
        } else if self.key_matches_any(&key, keys.add.keys()) {
            self.controller.add_contact();
            Vec::new()
        } else if self.key_matches_any(&key, keys.view.keys()) {
            self.controller.view_row(row)
        } else if self.key_matches_any(&key, keys.edit.keys()) {
            self.controller.edit_row(row);
            Vec::new()
        } else if self.key_matches_any(&key, keys.delete.keys()) {
            self.controller.request_delete_row(row);
            Vec::new()
        } else if self.key_matches_any(&key, keys.search.keys()) {
            let term = self.controller.search_term().to_string();
            self.editor.start(&term, EditTarget::Search);
            Vec::new()
        } else if self.key_matches_any(&key, keys.clear_search.keys()) {
            self.controller.clear_search()
        } else if self.key_matches_any(&key, keys.refresh.keys()) {
            self.controller.refresh()
        } else {
            Vec::new()
        };

        self.spawn(tasks);
        false
    }

    fn handle_search_key(&mut self, key: KeyEvent) {
        let keys = &self.config.keys.search_input;

        if self.key_matches_any(&key, keys.cancel.keys()) {
            self.editor.cancel();
            return;
        }

        if self.key_matches_any(&key, keys.confirm.keys()) {
            let term = self.editor.value().to_string();
            self.editor.cancel();
            self.controller.set_search_term(term);
            let tasks = self.controller.search();
            self.spawn(tasks);
            return;
        }

        self.editor.handle_key_event(key);
    }

    fn handle_form_key(&mut self, key: KeyEvent) {
        let keys = &self.config.keys.form;

        if self.key_matches_any(&key, keys.cancel.keys()) {
            self.controller.cancel();
        } else if self.key_matches_any(&key, keys.submit.keys()) {
            let tasks = self.controller.submit();
            self.spawn(tasks);
        } else if self.key_matches_any(&key, keys.next_field.keys()) {
            self.form_field = self.form_field.next();
            self.start_field_editor();
        } else if self.key_matches_any(&key, keys.prev_field.keys()) {
            self.form_field = self.form_field.prev();
            self.start_field_editor();
        } else if self.editor.handle_key_event(key) {
            let value = self.editor.value().to_string();
            self.controller.form_mut().set(self.form_field, value);
        }
    }

    fn handle_detail_key(&mut self, key: KeyEvent) -> bool {
        let keys = &self.config.keys.detail;
        let note_row = self.controller.note_cursor();

        if self.key_matches_any(&key, keys.quit.keys()) {
            return true;
        }

        let tasks = if self.key_matches_any(&key, keys.back.keys()) {
            self.controller.back();
            Vec::new()
        } else if self.key_matches_any(&key, keys.edit.keys()) {
            self.controller.edit_selected();
            Vec::new()
        } else if self.key_matches_any(&key, keys.refresh.keys()) {
            self.controller.refresh()
        } else if self.key_matches_any(&key, keys.next.keys()) {
            self.controller.note_next();
            Vec::new()
        } else if self.key_matches_any(&key, keys.prev.keys()) {
            self.controller.note_prev();
            Vec::new()
        } else if self.key_matches_any(&key, keys.note.keys()) {
            self.start_note_editor(EditTarget::NoteTitle);
            Vec::new()
        } else if self.key_matches_any(&key, keys.edit_note.keys()) {
            self.controller.edit_note_row(note_row);
            if self.controller.editing_note().is_some() {
                self.start_note_editor(EditTarget::NoteTitle);
            }
            Vec::new()
        } else if self.key_matches_any(&key, keys.delete_note.keys()) {
            self.controller.request_delete_note_row(note_row);
            Vec::new()
        } else {
            Vec::new()
        };

        self.spawn(tasks);
        false
    }

    fn start_note_editor(&mut self, target: EditTarget) {
        let draft = self.controller.note_draft();
        let value = match target {
            EditTarget::NoteBody => draft.body.clone(),
            _ => draft.title.clone(),
        };
        self.editor.start(&value, target);
    }

    fn handle_note_input_key(&mut self, key: KeyEvent) {
        let keys = &self.config.keys.note_input;

        if self.key_matches_any(&key, keys.cancel.keys()) {
            self.editor.cancel();
            self.controller.cancel_note_edit();
            return;
        }

        if self.key_matches_any(&key, keys.submit.keys()) {
            let tasks = self.controller.add_note();
            if !tasks.is_empty() {
                self.editor.cancel();
            }
            self.spawn(tasks);
            return;
        }

        if self.key_matches_any(&key, keys.next_field.keys()) {
            let next = match self.editor.target() {
                Some(EditTarget::NoteTitle) => EditTarget::NoteBody,
                _ => EditTarget::NoteTitle,
            };
            self.start_note_editor(next);
            return;
        }

        if self.editor.handle_key_event(key) {
            let value = self.editor.value().to_string();
            let draft = self.controller.note_draft_mut();
            match self.editor.target() {
                Some(EditTarget::NoteBody) => draft.body = value,
                _ => draft.title = value,
            }
        }
    }

    fn handle_confirm_modal_key(&mut self, key: KeyEvent) {
        let modal_keys = &self.config.keys.modal;

        if self.key_matches_any(&key, modal_keys.cancel.keys()) {
            self.controller.dismiss_confirm();
            self.modal_popup = PopupState::default();
            return;
        }

        if self.key_matches_any(&key, modal_keys.confirm.keys()) {
            let tasks = self.controller.confirm_pending();
            self.modal_popup = PopupState::default();
            self.spawn(tasks);
        }
    }

    pub fn ui_colors(&self) -> &UiColors {
        &self.config.ui.colors
    }

    pub fn config(&self) -> &Config {
        self.config
    }

    /// Check if the key event matches any of the bindings in the list
    fn key_matches_any(&self, event: &KeyEvent, bindings: &[String]) -> bool {
        bindings.iter().any(|b| key_matches_single(event, b))
    }
}

/// Check if the key event matches a single binding string
fn key_matches_single(event: &KeyEvent, binding: &str) -> bool {
    let trimmed = binding.trim();
    if trimmed.is_empty() {
        return false;
    }

    // Disallow Ctrl/Alt/Super modifiers (we don't support them)
    let disallowed = KeyModifiers::CONTROL | KeyModifiers::ALT | KeyModifiers::SUPER;
    if event.modifiers.intersects(disallowed) {
        return false;
    }

    match trimmed.to_ascii_lowercase().as_str() {
        "enter" => matches!(event.code, KeyCode::Enter),
        "tab" => matches!(event.code, KeyCode::Tab),
        "backtab" | "shift+tab" => matches!(event.code, KeyCode::BackTab),
        "backspace" => matches!(event.code, KeyCode::Backspace),
        "esc" | "escape" => matches!(event.code, KeyCode::Esc),
        "space" => matches!(event.code, KeyCode::Char(' ')),
        "up" => matches!(event.code, KeyCode::Up),
        "down" => matches!(event.code, KeyCode::Down),
        "left" => matches!(event.code, KeyCode::Left),
        "right" => matches!(event.code, KeyCode::Right),
        "pageup" | "page_up" => matches!(event.code, KeyCode::PageUp),
        "pagedown" | "page_down" => matches!(event.code, KeyCode::PageDown),
        "home" => matches!(event.code, KeyCode::Home),
        "end" => matches!(event.code, KeyCode::End),
        name if name.starts_with('f') && name.len() > 1 => name[1..]
            .parse::<u8>()
            .ok()
            .filter(|n| (1..=12).contains(n))
            .is_some_and(|n| matches!(event.code, KeyCode::F(f) if f == n)),
        // Single character - case-sensitive (m != M, since M requires Shift)
        _ => {
            let mut chars = trimmed.chars();
            if let (Some(first), None) = (chars.next(), chars.next()) {
                matches!(event.code, KeyCode::Char(c) if c == first)
            } else {
                false
            }
        }
    }
}

//! View state machine for the contact manager.
//!
//! The controller owns every piece of view state. User actions return the
//! remote `Task`s they need; the caller runs them and feeds each
//! `Completion` back through [`Controller::apply`], which may return
//! follow-up tasks (reloads after a mutation).

pub mod form;
pub mod task;

use std::collections::HashMap;

use tracing::{debug, warn};

pub use form::{ContactForm, FormError, FormField, NoteDraft};
pub use task::{Completion, Reply, Request, Slot, Task};

use crate::model::{Contact, Note};
use crate::search;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    List,
    Add,
    Edit,
    Detail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmAction {
    DeleteContact { id: i64 },
    DeleteNote { contact_id: i64, id: i64 },
}

/// A destructive action waiting for a yes/no.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirm {
    pub title: String,
    pub message: String,
    pub action: ConfirmAction,
}

#[derive(Debug)]
pub struct Controller {
    view: View,
    contacts: Vec<Contact>,
    list_cursor: usize,
    selected: Option<Contact>,
    notes: Vec<Note>,
    note_cursor: usize,
    form: ContactForm,
    note_draft: NoteDraft,
    editing_note: Option<i64>,
    search_term: String,
    active_search: Option<String>,
    error: Option<String>,
    status: Option<String>,
    in_flight: usize,
    confirm: Option<Confirm>,
    next_seq: u64,
    latest: HashMap<Slot, u64>,
    pending_submit: Option<u64>,
}

impl Default for Controller {
    fn default() -> Self {
        Self::new()
    }
}

impl Controller {
    pub fn new() -> Self {
        Self {
            view: View::List,
            contacts: Vec::new(),
            list_cursor: 0,
            selected: None,
            notes: Vec::new(),
            note_cursor: 0,
            form: ContactForm::default(),
            note_draft: NoteDraft::default(),
            editing_note: None,
            search_term: String::new(),
            active_search: None,
            error: None,
            status: None,
            in_flight: 0,
            confirm: None,
            next_seq: 0,
            latest: HashMap::new(),
            pending_submit: None,
        }
    }

    // -- accessors ----------------------------------------------------------

    pub fn view(&self) -> View {
        self.view
    }

    pub fn contacts(&self) -> &[Contact] {
        &self.contacts
    }

    pub fn list_cursor(&self) -> usize {
        self.list_cursor
    }

    pub fn selected(&self) -> Option<&Contact> {
        self.selected.as_ref()
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub fn note_cursor(&self) -> usize {
        self.note_cursor
    }

    pub fn form(&self) -> &ContactForm {
        &self.form
    }

    pub fn form_mut(&mut self) -> &mut ContactForm {
        &mut self.form
    }

    pub fn note_draft(&self) -> &NoteDraft {
        &self.note_draft
    }

    pub fn note_draft_mut(&mut self) -> &mut NoteDraft {
        &mut self.note_draft
    }

    /// Id of the note the draft will overwrite, if any.
    pub fn editing_note(&self) -> Option<i64> {
        self.editing_note
    }

    pub fn search_term(&self) -> &str {
        &self.search_term
    }

    pub fn set_search_term(&mut self, term: String) {
        self.search_term = term;
    }

    pub fn active_search(&self) -> Option<&str> {
        self.active_search.as_deref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    pub fn loading(&self) -> bool {
        self.in_flight > 0
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn confirm(&self) -> Option<&Confirm> {
        self.confirm.as_ref()
    }

    fn selected_id(&self) -> Option<i64> {
        self.selected.as_ref().and_then(|c| c.id)
    }

    // -- list view ----------------------------------------------------------

    /// Initial unfiltered load.
    pub fn start(&mut self) -> Vec<Task> {
        self.error = None;
        vec![self.load_contacts()]
    }

    pub fn select_next(&mut self) {
        if self.list_cursor + 1 < self.contacts.len() {
            self.list_cursor += 1;
        }
    }

    pub fn select_prev(&mut self) {
        self.list_cursor = self.list_cursor.saturating_sub(1);
    }

    pub fn add_contact(&mut self) {
        self.form = ContactForm::default();
        self.selected = None;
        self.view = View::Add;
    }

    pub fn edit_row(&mut self, index: usize) {
        let Some(contact) = self.contacts.get(index).cloned() else {
            return;
        };
        self.form = ContactForm::from_contact(&contact);
        self.selected = Some(contact);
        self.view = View::Edit;
    }

    pub fn view_row(&mut self, index: usize) -> Vec<Task> {
        let Some(contact) = self.contacts.get(index).cloned() else {
            return Vec::new();
        };
        let id = contact.id;
        self.selected = Some(contact);
        self.notes.clear();
        self.note_cursor = 0;
        self.note_draft = NoteDraft::default();
        self.editing_note = None;
        self.view = View::Detail;

        match id {
            Some(contact_id) => vec![self.dispatch_action(Request::ListNotes { contact_id })],
            None => Vec::new(),
        }
    }

    /// Ask for confirmation; nothing is sent until [`Controller::confirm_pending`].
    pub fn request_delete_row(&mut self, index: usize) {
        let Some(contact) = self.contacts.get(index) else {
            return;
        };
        let Some(id) = contact.id else {
            return;
        };
        self.confirm = Some(Confirm {
            title: "Delete contact".to_string(),
            message: format!("Delete {}? This cannot be undone.", display_or_id(contact, id)),
            action: ConfirmAction::DeleteContact { id },
        });
    }

    pub fn search(&mut self) -> Vec<Task> {
        self.active_search = search::normalize_query(&self.search_term);
        self.error = None;
        vec![self.load_contacts()]
    }

    pub fn clear_search(&mut self) -> Vec<Task> {
        self.search_term.clear();
        self.active_search = None;
        self.error = None;
        vec![self.load_contacts()]
    }

    pub fn refresh(&mut self) -> Vec<Task> {
        self.error = None;
        match self.view {
            View::List => vec![self.load_contacts()],
            View::Detail => match self.selected_id() {
                Some(id) => vec![
                    self.dispatch(Request::GetContact { id }),
                    self.dispatch(Request::ListNotes { contact_id: id }),
                ],
                None => Vec::new(),
            },
            View::Add | View::Edit => Vec::new(),
        }
    }

    // -- add / edit ---------------------------------------------------------

    pub fn submit(&mut self) -> Vec<Task> {
        if !matches!(self.view, View::Add | View::Edit) {
            return Vec::new();
        }
        if let Err(err) = self.form.validate() {
            self.error = Some(err.to_string());
            return Vec::new();
        }

        let request = match (self.view, self.selected_id()) {
            (View::Edit, Some(id)) => {
                let existing = self.selected.clone().unwrap_or_default();
                Request::UpdateContact {
                    id,
                    patch: self.form.apply_to(&existing),
                }
            }
            _ => Request::CreateContact {
                contact: self.form.to_new_contact(),
            },
        };
        let task = self.dispatch_action(request);
        self.pending_submit = Some(task.seq);
        vec![task]
    }

    pub fn cancel(&mut self) {
        if matches!(self.view, View::Add | View::Edit) {
            self.pending_submit = None;
            self.view = View::List;
        }
    }

    // -- detail view --------------------------------------------------------

    pub fn edit_selected(&mut self) {
        if let Some(contact) = &self.selected {
            self.form = ContactForm::from_contact(contact);
            self.view = View::Edit;
        }
    }

    pub fn back(&mut self) {
        if self.view == View::Detail {
            self.view = View::List;
        }
    }

    pub fn note_next(&mut self) {
        if self.note_cursor + 1 < self.notes.len() {
            self.note_cursor += 1;
        }
    }

    pub fn note_prev(&mut self) {
        self.note_cursor = self.note_cursor.saturating_sub(1);
    }

    /// Send the draft as a new note, or as an update when a note is being
    /// edited. A blank title sends nothing.
    pub fn add_note(&mut self) -> Vec<Task> {
        let Some(contact_id) = self.selected_id() else {
            return Vec::new();
        };
        let Some(note) = self.note_draft.to_note(contact_id) else {
            return Vec::new();
        };
        let request = match self.editing_note {
            Some(id) => Request::UpdateNote {
                contact_id,
                id,
                patch: note,
            },
            None => Request::CreateNote { contact_id, note },
        };
        vec![self.dispatch_action(request)]
    }

    pub fn edit_note_row(&mut self, index: usize) {
        let Some(note) = self.notes.get(index) else {
            return;
        };
        if let Some(id) = note.id {
            self.note_draft = NoteDraft::from_note(note);
            self.editing_note = Some(id);
        }
    }

    pub fn cancel_note_edit(&mut self) {
        self.note_draft = NoteDraft::default();
        self.editing_note = None;
    }

    pub fn request_delete_note_row(&mut self, index: usize) {
        let (Some(contact_id), Some(note)) = (self.selected_id(), self.notes.get(index)) else {
            return;
        };
        let Some(id) = note.id else {
            return;
        };
        let title = note.title.clone().unwrap_or_default();
        self.confirm = Some(Confirm {
            title: "Delete note".to_string(),
            message: format!("Delete note \"{title}\"? This cannot be undone."),
            action: ConfirmAction::DeleteNote { contact_id, id },
        });
    }

    // -- confirmation -------------------------------------------------------

    pub fn confirm_pending(&mut self) -> Vec<Task> {
        let Some(confirm) = self.confirm.take() else {
            return Vec::new();
        };
        let request = match confirm.action {
            ConfirmAction::DeleteContact { id } => Request::DeleteContact { id },
            ConfirmAction::DeleteNote { contact_id, id } => Request::DeleteNote { contact_id, id },
        };
        vec![self.dispatch_action(request)]
    }

    pub fn dismiss_confirm(&mut self) {
        self.confirm = None;
    }

    // -- dispatch and completion --------------------------------------------

    fn load_contacts(&mut self) -> Task {
        let search = self.active_search.clone();
        self.dispatch(Request::ListContacts { search })
    }

    /// Dispatch on behalf of the user; clears the previous failure message.
    fn dispatch_action(&mut self, request: Request) -> Task {
        self.error = None;
        self.dispatch(request)
    }

    fn dispatch(&mut self, request: Request) -> Task {
        self.next_seq += 1;
        let seq = self.next_seq;
        self.in_flight += 1;
        if let Some(slot) = request.slot() {
            self.latest.insert(slot, seq);
        }
        debug!(seq, request = request.name(), "dispatching");
        Task { seq, request }
    }

    /// Apply a finished task. Returns the follow-up tasks it triggers.
    pub fn apply(&mut self, completion: Completion) -> Vec<Task> {
        let Completion {
            seq,
            request,
            result,
        } = completion;
        self.in_flight = self.in_flight.saturating_sub(1);

        if let Some(slot) = request.slot() {
            if self.latest.get(&slot) != Some(&seq) {
                debug!(seq, request = request.name(), "discarding stale result");
                return Vec::new();
            }
        }

        match result {
            Ok(reply) => self.apply_success(seq, request, reply),
            Err(err) => {
                let message = request.failure_message();
                warn!(
                    request = request.name(),
                    kind = err.kind(),
                    status = err.status().map(|s| s.as_u16()),
                    correlation_id = err.correlation_id().map(|id| id.to_string()),
                    error = %err,
                    "{message}"
                );
                if self.pending_submit == Some(seq) {
                    self.pending_submit = None;
                }
                self.error = Some(message.to_string());
                Vec::new()
            }
        }
    }

    fn apply_success(&mut self, seq: u64, request: Request, reply: Reply) -> Vec<Task> {
        match (request, reply) {
            (Request::ListContacts { .. }, Reply::Contacts(contacts)) => {
                self.contacts = contacts;
                self.list_cursor = self.list_cursor.min(self.contacts.len().saturating_sub(1));
                Vec::new()
            }
            (Request::GetContact { id }, Reply::Contact(contact)) => {
                if let Some(row) = self.contacts.iter_mut().find(|c| c.id == Some(id)) {
                    *row = contact.clone();
                }
                if self.selected_id() == Some(id) {
                    self.selected = Some(contact);
                }
                Vec::new()
            }
            (Request::CreateContact { .. } | Request::UpdateContact { .. }, _) => {
                if self.pending_submit == Some(seq) {
                    self.pending_submit = None;
                    self.form = ContactForm::default();
                    self.view = View::List;
                }
                self.status = Some("Contact saved".to_string());
                vec![self.load_contacts()]
            }
            (Request::DeleteContact { id }, _) => {
                if self.selected_id() == Some(id) {
                    self.selected = None;
                }
                self.status = Some("Contact deleted".to_string());
                vec![self.load_contacts()]
            }
            (Request::ListNotes { contact_id }, Reply::Notes(notes)) => {
                if self.selected_id() == Some(contact_id) {
                    self.notes = notes;
                    self.note_cursor = self.note_cursor.min(self.notes.len().saturating_sub(1));
                }
                Vec::new()
            }
            (Request::CreateNote { contact_id, .. } | Request::UpdateNote { contact_id, .. }, _) => {
                self.status = Some("Note saved".to_string());
                if self.selected_id() != Some(contact_id) {
                    return Vec::new();
                }
                self.cancel_note_edit();
                vec![self.dispatch(Request::ListNotes { contact_id })]
            }
            (Request::DeleteNote { contact_id, id }, _) => {
                if self.editing_note == Some(id) {
                    self.cancel_note_edit();
                }
                self.status = Some("Note deleted".to_string());
                if self.selected_id() != Some(contact_id) {
                    return Vec::new();
                }
                vec![self.dispatch(Request::ListNotes { contact_id })]
            }
            (request, reply) => {
                warn!(request = request.name(), ?reply, "unexpected reply shape");
                Vec::new()
            }
        }
    }
}

fn display_or_id(contact: &Contact, id: i64) -> String {
    let name = contact.display_name();
    if name.is_empty() {
        format!("contact #{id}")
    } else {
        name
    }
}

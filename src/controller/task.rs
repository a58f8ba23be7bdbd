//! Remote work dispatched by the controller and the results that come back.

use crate::model::{Contact, Note};
use crate::remote::{ApiError, CrmApi};

/// Read results where only the most recently issued request may land.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    Contacts,
    Notes,
    Detail,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    ListContacts { search: Option<String> },
    GetContact { id: i64 },
    CreateContact { contact: Contact },
    UpdateContact { id: i64, patch: Contact },
    DeleteContact { id: i64 },
    ListNotes { contact_id: i64 },
    CreateNote { contact_id: i64, note: Note },
    UpdateNote { contact_id: i64, id: i64, patch: Note },
    DeleteNote { contact_id: i64, id: i64 },
}

impl Request {
    pub fn slot(&self) -> Option<Slot> {
        match self {
            Request::ListContacts { .. } => Some(Slot::Contacts),
            Request::ListNotes { .. } => Some(Slot::Notes),
            Request::GetContact { .. } => Some(Slot::Detail),
            _ => None,
        }
    }

    /// What the user sees when this request fails.
    pub fn failure_message(&self) -> &'static str {
        match self {
            Request::ListContacts { .. } => "Failed to load contacts",
            Request::GetContact { .. } => "Failed to refresh contact",
            Request::CreateContact { .. } | Request::UpdateContact { .. } => {
                "Failed to save contact"
            }
            Request::DeleteContact { .. } => "Failed to delete contact",
            Request::ListNotes { .. } => "Failed to load notes",
            Request::CreateNote { .. } => "Failed to add note",
            Request::UpdateNote { .. } => "Failed to save note",
            Request::DeleteNote { .. } => "Failed to delete note",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Request::ListContacts { .. } => "list_contacts",
            Request::GetContact { .. } => "get_contact",
            Request::CreateContact { .. } => "create_contact",
            Request::UpdateContact { .. } => "update_contact",
            Request::DeleteContact { .. } => "delete_contact",
            Request::ListNotes { .. } => "list_notes",
            Request::CreateNote { .. } => "create_note",
            Request::UpdateNote { .. } => "update_note",
            Request::DeleteNote { .. } => "delete_note",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Contacts(Vec<Contact>),
    Contact(Contact),
    Notes(Vec<Note>),
    Note(Note),
    Done,
}

#[derive(Debug)]
pub struct Task {
    pub seq: u64,
    pub request: Request,
}

#[derive(Debug)]
pub struct Completion {
    pub seq: u64,
    pub request: Request,
    pub result: Result<Reply, ApiError>,
}

impl Task {
    pub async fn run<A: CrmApi>(self, api: &A) -> Completion {
        let result = match &self.request {
            Request::ListContacts { search } => api
                .list_contacts(search.as_deref())
                .await
                .map(Reply::Contacts),
            Request::GetContact { id } => api.get_contact(*id).await.map(Reply::Contact),
            Request::CreateContact { contact } => {
                api.create_contact(contact).await.map(Reply::Contact)
            }
            Request::UpdateContact { id, patch } => {
                api.update_contact(*id, patch).await.map(Reply::Contact)
            }
            Request::DeleteContact { id } => api.delete_contact(*id).await.map(|()| Reply::Done),
            Request::ListNotes { contact_id } => {
                api.list_notes(*contact_id).await.map(Reply::Notes)
            }
            Request::CreateNote { note, .. } => api.create_note(note).await.map(Reply::Note),
            Request::UpdateNote { id, patch, .. } => {
                api.update_note(*id, patch).await.map(Reply::Note)
            }
            Request::DeleteNote { id, .. } => api.delete_note(*id).await.map(|()| Reply::Done),
        };

        Completion {
            seq: self.seq,
            request: self.request,
            result,
        }
    }
}

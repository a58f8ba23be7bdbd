//! In-memory `CrmApi` that records every call, for controller tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use reqwest::StatusCode;
use uuid::Uuid;

use super::{ApiError, CrmApi};
use crate::model::{Contact, Note};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    ListContacts(Option<String>),
    GetContact(i64),
    CreateContact(Contact),
    UpdateContact(i64, Contact),
    DeleteContact(i64),
    ListNotes(i64),
    CreateNote(Note),
    UpdateNote(i64, Note),
    DeleteNote(i64),
}

#[derive(Default)]
pub struct FakeApi {
    pub contacts: Vec<Contact>,
    pub notes: Vec<Note>,
    calls: Mutex<Vec<Call>>,
    failing: AtomicBool,
}

impl FakeApi {
    pub fn with_contacts(contacts: Vec<Contact>) -> Self {
        Self {
            contacts,
            ..Self::default()
        }
    }

    /// Every subsequent call fails with a 500.
    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: Call) -> Result<(), ApiError> {
        self.calls.lock().unwrap().push(call);
        if self.failing.load(Ordering::SeqCst) {
            return Err(ApiError::from_status(
                StatusCode::INTERNAL_SERVER_ERROR,
                Uuid::new_v4(),
            ));
        }
        Ok(())
    }
}

impl CrmApi for FakeApi {
    async fn list_contacts(&self, search: Option<&str>) -> Result<Vec<Contact>, ApiError> {
        self.record(Call::ListContacts(search.map(str::to_string)))?;
        Ok(self.contacts.clone())
    }

    async fn get_contact(&self, id: i64) -> Result<Contact, ApiError> {
        self.record(Call::GetContact(id))?;
        self.contacts
            .iter()
            .find(|c| c.id == Some(id))
            .cloned()
            .ok_or_else(|| ApiError::from_status(StatusCode::NOT_FOUND, Uuid::new_v4()))
    }

    async fn create_contact(&self, contact: &Contact) -> Result<Contact, ApiError> {
        self.record(Call::CreateContact(contact.clone()))?;
        Ok(Contact {
            id: Some(1000),
            ..contact.clone()
        })
    }

    async fn update_contact(&self, id: i64, patch: &Contact) -> Result<Contact, ApiError> {
        self.record(Call::UpdateContact(id, patch.clone()))?;
        Ok(Contact {
            id: Some(id),
            ..patch.clone()
        })
    }

    async fn delete_contact(&self, id: i64) -> Result<(), ApiError> {
        self.record(Call::DeleteContact(id))
    }

    async fn list_notes(&self, contact_id: i64) -> Result<Vec<Note>, ApiError> {
        self.record(Call::ListNotes(contact_id))?;
        Ok(self
            .notes
            .iter()
            .filter(|n| n.contact_id == Some(contact_id))
            .cloned()
            .collect())
    }

    async fn create_note(&self, note: &Note) -> Result<Note, ApiError> {
        self.record(Call::CreateNote(note.clone()))?;
        Ok(Note {
            id: Some(2000),
            ..note.clone()
        })
    }

    async fn update_note(&self, id: i64, patch: &Note) -> Result<Note, ApiError> {
        self.record(Call::UpdateNote(id, patch.clone()))?;
        Ok(Note {
            id: Some(id),
            ..patch.clone()
        })
    }

    async fn delete_note(&self, id: i64) -> Result<(), ApiError> {
        self.record(Call::DeleteNote(id))
    }
}

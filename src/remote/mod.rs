//! CRM client abstraction.
//!
//! This module provides:
//! - `CrmApi` trait covering the contact and note endpoints the UI uses
//! - `KeapClient` implementation over the Keap REST API (v2)
//! - `ApiError`, the single failure type surfaced to the controller

mod error;
#[cfg(test)]
pub mod fake;
pub mod keap;

use std::future::Future;

pub use error::ApiError;
pub use keap::KeapClient;

use crate::model::{Contact, Note};

/// Fixed page size for every list request.
pub const PAGE_SIZE: u32 = 100;

/// Operations the controller can dispatch. Implementations hold no state
/// between calls and return fresh values every time.
pub trait CrmApi: Send + Sync {
    /// First page of contacts, optionally filtered by a name search term.
    fn list_contacts(
        &self,
        search: Option<&str>,
    ) -> impl Future<Output = Result<Vec<Contact>, ApiError>> + Send;

    fn get_contact(&self, id: i64) -> impl Future<Output = Result<Contact, ApiError>> + Send;

    fn create_contact(
        &self,
        contact: &Contact,
    ) -> impl Future<Output = Result<Contact, ApiError>> + Send;

    /// Partial update: only the fields present in `patch` change.
    fn update_contact(
        &self,
        id: i64,
        patch: &Contact,
    ) -> impl Future<Output = Result<Contact, ApiError>> + Send;

    fn delete_contact(&self, id: i64) -> impl Future<Output = Result<(), ApiError>> + Send;

    /// First page of notes attached to `contact_id`, in server order.
    fn list_notes(&self, contact_id: i64)
        -> impl Future<Output = Result<Vec<Note>, ApiError>> + Send;

    fn create_note(&self, note: &Note) -> impl Future<Output = Result<Note, ApiError>> + Send;

    /// Partial update: only the fields present in `patch` change.
    fn update_note(
        &self,
        id: i64,
        patch: &Note,
    ) -> impl Future<Output = Result<Note, ApiError>> + Send;

    fn delete_note(&self, id: i64) -> impl Future<Output = Result<(), ApiError>> + Send;
}

//! Flat form buffer for the add/edit views and its mapping to contact
//! records.

use thiserror::Error;

use crate::model::{
    primary_index, Address, Contact, EmailAddress, Note, PhoneNumber, ADDRESS_FIELD,
    DEFAULT_COUNTRY_CODE, EMAIL_FIELD, PHONE_FIELD,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FormError {
    #[error("First name is required")]
    GivenNameRequired,
    #[error("Last name is required")]
    FamilyNameRequired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormField {
    GivenName,
    FamilyName,
    Email,
    Phone,
    Address,
    City,
    State,
    Zip,
}

impl FormField {
    pub const ALL: [FormField; 8] = [
        FormField::GivenName,
        FormField::FamilyName,
        FormField::Email,
        FormField::Phone,
        FormField::Address,
        FormField::City,
        FormField::State,
        FormField::Zip,
    ];

    pub fn title(self) -> &'static str {
        match self {
            FormField::GivenName => "First Name",
            FormField::FamilyName => "Last Name",
            FormField::Email => "Email",
            FormField::Phone => "Phone",
            FormField::Address => "Address",
            FormField::City => "City",
            FormField::State => "State",
            FormField::Zip => "ZIP",
        }
    }

    pub fn required(self) -> bool {
        matches!(self, FormField::GivenName | FormField::FamilyName)
    }

    pub fn next(self) -> Self {
        let idx = Self::ALL.iter().position(|f| *f == self).unwrap_or(0);
        Self::ALL[(idx + 1) % Self::ALL.len()]
    }

    pub fn prev(self) -> Self {
        let idx = Self::ALL.iter().position(|f| *f == self).unwrap_or(0);
        Self::ALL[(idx + Self::ALL.len() - 1) % Self::ALL.len()]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContactForm {
    pub given_name: String,
    pub family_name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip: String,
}

impl ContactForm {
    /// Fill from the contact's names and its primary email, phone and address.
    pub fn from_contact(contact: &Contact) -> Self {
        let address = contact.primary_address().cloned().unwrap_or_default();

        Self {
            given_name: contact.given_name.clone().unwrap_or_default(),
            family_name: contact.family_name.clone().unwrap_or_default(),
            email: contact
                .primary_email()
                .map(|e| e.email.clone())
                .unwrap_or_default(),
            phone: contact
                .primary_phone()
                .map(|p| p.number.clone())
                .unwrap_or_default(),
            address: address.line1.unwrap_or_default(),
            city: address.locality.unwrap_or_default(),
            state: address.region.unwrap_or_default(),
            zip: address.zip_code.unwrap_or_default(),
        }
    }

    pub fn get(&self, field: FormField) -> &str {
        match field {
            FormField::GivenName => &self.given_name,
            FormField::FamilyName => &self.family_name,
            FormField::Email => &self.email,
            FormField::Phone => &self.phone,
            FormField::Address => &self.address,
            FormField::City => &self.city,
            FormField::State => &self.state,
            FormField::Zip => &self.zip,
        }
    }

    pub fn set(&mut self, field: FormField, value: String) {
        let slot = match field {
            FormField::GivenName => &mut self.given_name,
            FormField::FamilyName => &mut self.family_name,
            FormField::Email => &mut self.email,
            FormField::Phone => &mut self.phone,
            FormField::Address => &mut self.address,
            FormField::City => &mut self.city,
            FormField::State => &mut self.state,
            FormField::Zip => &mut self.zip,
        };
        *slot = value;
    }

    pub fn validate(&self) -> Result<(), FormError> {
        if self.given_name.trim().is_empty() {
            return Err(FormError::GivenNameRequired);
        }
        if self.family_name.trim().is_empty() {
            return Err(FormError::FamilyNameRequired);
        }
        Ok(())
    }

    /// Create body. Sub-entries appear only when their scalar is filled in.
    pub fn to_new_contact(&self) -> Contact {
        let email = present(&self.email)
            .map(|email| EmailAddress { email, field: EMAIL_FIELD.into() });
        let phone = present(&self.phone)
            .map(|number| PhoneNumber { number, field: PHONE_FIELD.into() });
        let address = present(&self.address).map(|_| self.new_address());

        Contact {
            given_name: Some(self.given_name.trim().to_string()),
            family_name: Some(self.family_name.trim().to_string()),
            email_addresses: Some(email.into_iter().collect()),
            phone_numbers: Some(phone.into_iter().collect()),
            addresses: Some(address.into_iter().collect()),
            ..Contact::default()
        }
    }

    /// Update body for `existing`: the primary entries are replaced in place,
    /// every other entry is sent back untouched.
    pub fn apply_to(&self, existing: &Contact) -> Contact {
        let emails = merge_primary(
            existing.email_addresses.as_deref(),
            |e| e.field == EMAIL_FIELD,
            present(&self.email),
            |email| EmailAddress { email, field: EMAIL_FIELD.into() },
            |entry, email| entry.email = email,
        );
        let phones = merge_primary(
            existing.phone_numbers.as_deref(),
            |p| p.field == PHONE_FIELD,
            present(&self.phone),
            |number| PhoneNumber { number, field: PHONE_FIELD.into() },
            |entry, number| entry.number = number,
        );
        let is_billing = |a: &Address| a.field == ADDRESS_FIELD;
        // An existing entry survives while any of its parts is filled; a new
        // one needs a street line.
        let has_primary = existing
            .addresses
            .as_deref()
            .and_then(|entries| primary_index(entries, is_billing))
            .is_some();
        let keep_address = if has_primary {
            self.has_address_part()
        } else {
            present(&self.address).is_some()
        };
        let addresses = merge_primary(
            existing.addresses.as_deref(),
            is_billing,
            keep_address.then_some(()),
            |()| self.new_address(),
            |entry, ()| self.write_address(entry),
        );

        Contact {
            given_name: Some(self.given_name.trim().to_string()),
            family_name: Some(self.family_name.trim().to_string()),
            email_addresses: Some(emails),
            phone_numbers: Some(phones),
            addresses: Some(addresses),
            ..Contact::default()
        }
    }

    fn has_address_part(&self) -> bool {
        [&self.address, &self.city, &self.state, &self.zip]
            .iter()
            .any(|part| present(part).is_some())
    }

    fn new_address(&self) -> Address {
        let mut address = Address {
            country_code: Some(DEFAULT_COUNTRY_CODE.into()),
            field: ADDRESS_FIELD.into(),
            ..Address::default()
        };
        self.write_address(&mut address);
        address
    }

    /// Overwrite the form-owned parts of an address; `line2` and
    /// `country_code` are left as they are.
    fn write_address(&self, address: &mut Address) {
        address.line1 = present(&self.address);
        address.locality = present(&self.city);
        address.region = present(&self.state);
        address.zip_code = present(&self.zip);
    }
}

fn present(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Replace, append or drop the primary entry of a collection.
fn merge_primary<T: Clone, V>(
    existing: Option<&[T]>,
    is_tagged: impl Fn(&T) -> bool,
    value: Option<V>,
    create: impl FnOnce(V) -> T,
    update: impl FnOnce(&mut T, V),
) -> Vec<T> {
    let mut entries = existing.map(<[T]>::to_vec).unwrap_or_default();
    match (primary_index(&entries, is_tagged), value) {
        (Some(idx), Some(value)) => update(&mut entries[idx], value),
        (Some(idx), None) => {
            entries.remove(idx);
        }
        (None, Some(value)) => entries.push(create(value)),
        (None, None) => {}
    }
    entries
}

/// Mini-form on the detail view.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteDraft {
    pub title: String,
    pub body: String,
}

impl NoteDraft {
    pub fn from_note(note: &Note) -> Self {
        Self {
            title: note.title.clone().unwrap_or_default(),
            body: note.body.clone().unwrap_or_default(),
        }
    }

    /// `None` when the title is blank; such drafts are never sent.
    pub fn to_note(&self, contact_id: i64) -> Option<Note> {
        let title = present(&self.title)?;
        Some(Note {
            title: Some(title),
            body: Some(self.body.clone()),
            contact_id: Some(contact_id),
            ..Note::default()
        })
    }
}

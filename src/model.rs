//! Contact and note records as exchanged with the CRM.
//!
//! Every optional field is skipped when serializing, so a record built with
//! only some fields populated doubles as a partial-update body.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::OffsetDateTime;

/// Field tag for the email entry the UI edits.
pub const EMAIL_FIELD: &str = "EMAIL1";
/// Field tag for the phone entry the UI edits.
pub const PHONE_FIELD: &str = "PHONE1";
/// Field tag for the address entry the UI edits.
pub const ADDRESS_FIELD: &str = "BILLING";
pub const DEFAULT_COUNTRY_CODE: &str = "US";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub given_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_addresses: Option<Vec<EmailAddress>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_numbers: Option<Vec<PhoneNumber>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub addresses: Option<Vec<Address>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_fields: Option<Vec<CustomField>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailAddress {
    pub email: String,
    pub field: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhoneNumber {
    pub number: String,
    pub field: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line2: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locality: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zip_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,
    pub field: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomField {
    pub id: i64,
    /// Custom field content is typed by the server (text, number, date...).
    #[serde(default)]
    pub content: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_id: Option<i64>,
    /// Server-assigned; never sent back.
    #[serde(default, skip_serializing)]
    pub date_created: Option<String>,
    /// Server-assigned; never sent back.
    #[serde(default, skip_serializing)]
    pub last_updated: Option<String>,
}

impl Contact {
    pub fn display_name(&self) -> String {
        let given = self.given_name.as_deref().unwrap_or("").trim();
        let family = self.family_name.as_deref().unwrap_or("").trim();
        match (given.is_empty(), family.is_empty()) {
            (false, false) => format!("{given} {family}"),
            (false, true) => given.to_string(),
            (true, false) => family.to_string(),
            (true, true) => String::new(),
        }
    }

    /// The entry tagged `EMAIL1`, falling back to the first entry.
    pub fn primary_email(&self) -> Option<&EmailAddress> {
        let entries = self.email_addresses.as_deref().unwrap_or_default();
        primary_index(entries, |e| e.field == EMAIL_FIELD).map(|idx| &entries[idx])
    }

    /// The entry tagged `PHONE1`, falling back to the first entry.
    pub fn primary_phone(&self) -> Option<&PhoneNumber> {
        let entries = self.phone_numbers.as_deref().unwrap_or_default();
        primary_index(entries, |p| p.field == PHONE_FIELD).map(|idx| &entries[idx])
    }

    /// The entry tagged `BILLING`, falling back to the first entry.
    pub fn primary_address(&self) -> Option<&Address> {
        let entries = self.addresses.as_deref().unwrap_or_default();
        primary_index(entries, |a| a.field == ADDRESS_FIELD).map(|idx| &entries[idx])
    }
}

/// Position of the entry matching `is_tagged`, else the first entry.
pub fn primary_index<T>(entries: &[T], is_tagged: impl Fn(&T) -> bool) -> Option<usize> {
    if entries.is_empty() {
        return None;
    }
    Some(entries.iter().position(is_tagged).unwrap_or(0))
}

impl Address {
    /// Street line.
    pub fn street(&self) -> &str {
        self.line1.as_deref().unwrap_or("")
    }

    /// "Springfield, IL 60001"
    pub fn city_line(&self) -> String {
        let state_zip = join_present(&[self.region.as_deref(), self.zip_code.as_deref()], " ");
        join_present(&[self.locality.as_deref(), Some(state_zip.as_str())], ", ")
    }

    /// "1 Main St, Springfield, IL 60001"
    pub fn one_line(&self) -> String {
        let city = self.city_line();
        join_present(&[self.line1.as_deref(), Some(city.as_str())], ", ")
    }
}

fn join_present(parts: &[Option<&str>], separator: &str) -> String {
    parts
        .iter()
        .flatten()
        .map(|part| part.trim())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(separator)
}

impl Note {
    /// Creation date as `YYYY-MM-DD`, empty when the server sent none.
    pub fn created_on(&self) -> String {
        self.date_created
            .as_deref()
            .map(format_date)
            .unwrap_or_default()
    }
}

fn format_date(raw: &str) -> String {
    let format = format_description!("[year]-[month]-[day]");
    OffsetDateTime::parse(raw, &Rfc3339)
        .ok()
        .and_then(|dt| dt.format(&format).ok())
        .unwrap_or_else(|| raw.chars().take(10).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_server_contact_and_ignores_unknown_fields() {
        let contact: Contact = serde_json::from_value(json!({
            "id": 42,
            "given_name": "Ada",
            "family_name": "Lovelace",
            "email_addresses": [{"email": "ada@example.com", "field": "EMAIL1"}],
            "owner_id": 7,
            "tag_ids": [1, 2]
        }))
        .unwrap();

        assert_eq!(contact.id, Some(42));
        assert_eq!(contact.display_name(), "Ada Lovelace");
        assert_eq!(contact.primary_email().unwrap().email, "ada@example.com");
        assert!(contact.phone_numbers.is_none());
    }

    #[test]
    fn partial_contact_serializes_only_present_fields() {
        let patch = Contact {
            given_name: Some("Ada".into()),
            ..Contact::default()
        };
        assert_eq!(serde_json::to_value(&patch).unwrap(), json!({"given_name": "Ada"}));
    }

    #[test]
    fn primary_entry_prefers_tag_over_position() {
        let contact = Contact {
            phone_numbers: Some(vec![
                PhoneNumber { number: "555-0001".into(), field: "PHONE2".into() },
                PhoneNumber { number: "555-0002".into(), field: PHONE_FIELD.into() },
            ]),
            addresses: Some(vec![Address {
                line1: Some("9 Side Rd".into()),
                field: "SHIPPING".into(),
                ..Address::default()
            }]),
            ..Contact::default()
        };

        assert_eq!(contact.primary_phone().unwrap().number, "555-0002");
        assert_eq!(contact.primary_address().unwrap().street(), "9 Side Rd");
        assert!(contact.primary_email().is_none());
    }

    #[test]
    fn address_lines_tolerate_missing_parts() {
        let address = Address {
            line1: Some("1 Main St".into()),
            locality: Some("Springfield".into()),
            region: Some("IL".into()),
            zip_code: Some("60001".into()),
            field: ADDRESS_FIELD.into(),
            ..Address::default()
        };
        assert_eq!(address.one_line(), "1 Main St, Springfield, IL 60001");

        let partial = Address {
            locality: Some("Springfield".into()),
            zip_code: Some("60001".into()),
            field: ADDRESS_FIELD.into(),
            ..Address::default()
        };
        assert_eq!(partial.one_line(), "Springfield, 60001");

        let bare = Address { field: ADDRESS_FIELD.into(), ..Address::default() };
        assert_eq!(bare.one_line(), "");
    }

    #[test]
    fn note_dates_are_read_only_and_formatted() {
        let note: Note = serde_json::from_value(json!({
            "id": 3,
            "title": "Call back",
            "contact_id": 42,
            "date_created": "2024-03-05T14:22:10.000Z",
            "last_updated": "2024-03-06T09:00:00.000Z"
        }))
        .unwrap();

        assert_eq!(note.created_on(), "2024-03-05");
        let body = serde_json::to_value(&note).unwrap();
        assert!(body.get("date_created").is_none());
        assert!(body.get("last_updated").is_none());
    }

    #[test]
    fn unparseable_dates_fall_back_to_prefix() {
        let note = Note {
            date_created: Some("2024-03-05 garbage".into()),
            ..Note::default()
        };
        assert_eq!(note.created_on(), "2024-03-05");
        assert_eq!(Note::default().created_on(), "");
    }

    #[test]
    fn custom_field_without_content_still_decodes() {
        let contact: Contact = serde_json::from_value(json!({
            "id": 9,
            "custom_fields": [{"id": 1, "content": "gold"}, {"id": 2}]
        }))
        .unwrap();

        let fields = contact.custom_fields.unwrap();
        assert_eq!(fields[0].content, json!("gold"));
        assert_eq!(fields[1].content, Value::Null);
    }
}

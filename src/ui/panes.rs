use crate::model::{Contact, Note};

/// Shown in the detail view for a missing value.
pub const NOT_AVAILABLE: &str = "N/A";

/// Columns of the contact table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListColumn {
    Name,
    Email,
    Phone,
    City,
}

impl ListColumn {
    pub const ALL: [ListColumn; 4] = [
        ListColumn::Name,
        ListColumn::Email,
        ListColumn::Phone,
        ListColumn::City,
    ];

    pub fn title(self) -> &'static str {
        match self {
            ListColumn::Name => "NAME",
            ListColumn::Email => "EMAIL",
            ListColumn::Phone => "PHONE",
            ListColumn::City => "CITY",
        }
    }

    /// Percentage of the table width.
    pub fn width(self) -> u16 {
        match self {
            ListColumn::Name => 30,
            ListColumn::Email => 30,
            ListColumn::Phone => 18,
            ListColumn::City => 22,
        }
    }

    /// Cell text; empty when the contact lacks the value.
    pub fn cell(self, contact: &Contact) -> String {
        match self {
            ListColumn::Name => contact.display_name(),
            ListColumn::Email => contact
                .primary_email()
                .map(|e| e.email.clone())
                .unwrap_or_default(),
            ListColumn::Phone => contact
                .primary_phone()
                .map(|p| p.number.clone())
                .unwrap_or_default(),
            ListColumn::City => contact
                .primary_address()
                .map(|a| a.city_line())
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaneField {
    pub label: &'static str,
    pub value: String,
}

impl PaneField {
    fn new(label: &'static str, value: Option<String>) -> Self {
        let value = value
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| NOT_AVAILABLE.to_string());
        Self { label, value }
    }
}

/// Contact information block of the detail view.
pub fn detail_fields(contact: &Contact) -> Vec<PaneField> {
    let address = contact.primary_address();
    vec![
        PaneField::new("Name", Some(contact.display_name())),
        PaneField::new("Email", contact.primary_email().map(|e| e.email.clone())),
        PaneField::new("Phone", contact.primary_phone().map(|p| p.number.clone())),
        PaneField::new("Address", address.map(|a| a.street().to_string())),
        PaneField::new("City", address.map(|a| a.city_line())),
    ]
}

/// `2024-03-05  Title`, or just the title when the server sent no date.
pub fn note_heading(note: &Note) -> String {
    let title = note.title.as_deref().unwrap_or("");
    let date = note.created_on();
    if date.is_empty() {
        title.to_string()
    } else {
        format!("{date}  {title}")
    }
}

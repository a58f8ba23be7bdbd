/// Trim a user search term, returning `None` when nothing is left.
pub fn normalize_query(query: &str) -> Option<String> {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Quote a term for use inside a single-quoted filter literal.
pub fn quote_literal(term: &str) -> String {
    format!("'{}'", term.replace('\'', "''"))
}

/// Server-side filter matching a term against given or family name.
/// Case sensitivity is whatever the server does.
pub fn name_filter(query: &str) -> Option<String> {
    let term = quote_literal(&normalize_query(query)?);
    Some(format!("given_name~{term} OR family_name~{term}"))
}

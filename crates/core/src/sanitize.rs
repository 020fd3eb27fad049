//! Identifier validation and literal quoting for rendered SQL.
//!
//! Every identifier that ends up in generated SQL (table names, column
//! names, join keys) passes through [`validate_identifier`] at node
//! construction time, so rendering itself never has to re-check.

use eventide_error::{ErrorCode, ErrorContext, EventideError, Result};

const MAX_IDENTIFIER_LEN: usize = 128;

/// Characters that are never allowed inside an identifier, quoted or not.
const FORBIDDEN: &[char] = &['"', '\0', ';', '`', '\\', '\'', '\n', '\r'];

fn invalid(identifier: &str, reason: &str) -> EventideError {
    EventideError::new(
        ErrorCode::InvalidIdentifier,
        format!("Invalid identifier '{}': {}", identifier, reason),
    )
    .with_context(ErrorContext::InvalidIdentifier {
        identifier: identifier.to_string(),
        reason: reason.to_string(),
    })
}

/// Validate a bare SQL identifier (column name, join key, prefix).
pub fn validate_identifier(identifier: &str) -> Result<()> {
    if identifier.is_empty() {
        return Err(invalid(identifier, "empty"));
    }
    if identifier.len() > MAX_IDENTIFIER_LEN {
        return Err(invalid(identifier, "longer than 128 bytes"));
    }
    if identifier.chars().any(char::is_whitespace) {
        return Err(invalid(identifier, "contains whitespace"));
    }
    if let Some(c) = identifier.chars().find(|c| FORBIDDEN.contains(c)) {
        return Err(invalid(
            identifier,
            &format!("contains forbidden character {:?}", c),
        ));
    }
    Ok(())
}

/// Validate a table reference, which may be schema-qualified with a
/// single dot (`events.calls`).
pub fn validate_table_name(name: &str) -> Result<()> {
    let parts: Vec<&str> = name.split('.').collect();
    if parts.len() > 2 {
        return Err(invalid(name, "more than one schema qualifier"));
    }
    for part in parts {
        validate_identifier(part)?;
    }
    Ok(())
}

/// Quote a string literal for inclusion in rendered SQL.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

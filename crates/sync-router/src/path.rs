//! Path-grammar validation (§4.8): database names and document IDs.

use sync_core::SyncError;

/// `[a-z][a-z0-9_$()+/-]*`
pub fn validate_db_name(name: &str) -> Result<(), SyncError> {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() => {}
        _ => return Err(SyncError::BadRequest(format!("invalid database name: {name}"))),
    }
    let valid_rest = chars.all(|c| {
        c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '_' | '$' | '(' | ')' | '+' | '/' | '-')
    });
    if valid_rest {
        Ok(())
    } else {
        Err(SyncError::BadRequest(format!("invalid database name: {name}")))
    }
}

/// DocIDs starting with `_` are reserved except `_design/…` and `_local/…`.
pub fn validate_doc_id(doc_id: &str) -> Result<(), SyncError> {
    if doc_id.is_empty() {
        return Err(SyncError::BadId("empty document id".to_string()));
    }
    if doc_id.starts_with('_') && !doc_id.starts_with("_design/") && !doc_id.starts_with("_local/") {
        return Err(SyncError::BadId(format!("invalid document id: {doc_id}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_lowercase_punctuation_names() {
        assert!(validate_db_name("my-db_1$()+/").is_ok());
    }

    #[test]
    fn rejects_uppercase_or_leading_digit() {
        assert!(validate_db_name("MyDb").is_err());
        assert!(validate_db_name("1db").is_err());
    }

    #[test]
    fn reserved_prefix_allows_design_and_local() {
        assert!(validate_doc_id("_design/foo").is_ok());
        assert!(validate_doc_id("_local/foo").is_ok());
        assert!(validate_doc_id("_nope").is_err());
        assert!(validate_doc_id("plain").is_ok());
    }
}

//! Identifier allow-list for collection, table, column and sort names.

use crate::error::AppError;
use regex::Regex;
use std::sync::OnceLock;

/// Collections may contain `-` (quoted in SQL); fields may not.
fn collection_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_\-]{0,127}$").expect("static regex"))
}

fn field_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,63}$").expect("static regex"))
}

pub fn validate_collection(name: &str) -> Result<(), AppError> {
    if collection_re().is_match(name) {
        Ok(())
    } else {
        Err(AppError::Validation(format!("invalid collection name: {:?}", name)))
    }
}

pub fn validate_field(name: &str) -> Result<(), AppError> {
    if field_re().is_match(name) {
        Ok(())
    } else {
        Err(AppError::Validation(format!("invalid field name: {:?}", name)))
    }
}

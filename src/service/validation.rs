//! Request body validation before anything reaches a backend.

use crate::config::Limits;
use crate::error::AppError;
use crate::query::validate_field;
use serde_json::{Map, Value};

const INLINE_IMAGE_PREFIX: &str = "data:image/";

pub struct RequestValidator;

impl RequestValidator {
    /// Parse a request body that must be a JSON object.
    pub fn object_body(bytes: &[u8]) -> Result<Map<String, Value>, AppError> {
        let value: Value =
            serde_json::from_slice(bytes).map_err(|e| AppError::BadRequest(format!("invalid JSON body: {}", e)))?;
        match value {
            Value::Object(m) => Ok(m),
            _ => Err(AppError::BadRequest("body must be a JSON object".into())),
        }
    }

    /// Field names must be plain identifiers; inline images are capped per field.
    pub fn validate_fields(fields: &Map<String, Value>, limits: &Limits) -> Result<(), AppError> {
        for (name, value) in fields {
            if name != "_id" {
                validate_field(name)?;
            }
            if let Value::String(s) = value {
                if s.starts_with(INLINE_IMAGE_PREFIX) && s.len() > limits.max_image_field_bytes {
                    return Err(AppError::PayloadTooLarge(format!(
                        "{} exceeds {} bytes",
                        name, limits.max_image_field_bytes
                    )));
                }
            }
        }
        Ok(())
    }
}

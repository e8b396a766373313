//! API request handlers

pub mod events;
pub mod harvest;
pub mod health;
pub mod validate;

use axum::body::Bytes;
use serde::de::DeserializeOwned;

use crate::error::{Result, ScoutError};

/// Decode a JSON body, treating an empty body as the type's default.
/// Malformed bodies become `InvalidRequest` instead of axum's rejection.
pub(crate) fn json_body<T>(body: &Bytes) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| ScoutError::InvalidRequest(format!("invalid JSON body: {}", e)))
}

//! The payload boundary.
//!
//! Transports only move strings. Values are restricted to what JSON can
//! represent: strings, numbers, booleans, null, arrays and objects. Binary
//! data needs its own encoding convention (e.g. base64) chosen by the caller.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{CodecError, Result};

/// Default maximum encoded payload size: 16 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// Encode a value into its wire payload.
pub fn to_payload<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(CodecError::Encode)
}

/// Encode a value, rejecting payloads larger than `max` bytes.
pub fn to_payload_limited<T: Serialize + ?Sized>(value: &T, max: usize) -> Result<String> {
    let payload = to_payload(value)?;
    if payload.len() > max {
        return Err(CodecError::PayloadTooLarge {
            size: payload.len(),
            max,
        });
    }
    Ok(payload)
}

/// Decode a wire payload into a value.
pub fn from_payload<T: DeserializeOwned>(payload: &str) -> Result<T> {
    serde_json::from_str(payload).map_err(CodecError::Decode)
}

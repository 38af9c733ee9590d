use crate::error::{ErrorKind, SyncResult};
use crate::sync_error;

/// Parses a boolean from its source text form.
pub fn parse_bool(s: &str) -> SyncResult<bool> {
    match s {
        "t" => Ok(true),
        "f" => Ok(false),
        _ => Err(sync_error!(
            ErrorKind::ConversionError,
            "Invalid boolean value",
            format!("expected 't' or 'f', got '{s}'")
        )),
    }
}

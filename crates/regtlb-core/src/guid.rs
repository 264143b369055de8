//! GUID text conversions.
//!
//! The registry stores GUIDs in the brace-delimited upper-case form
//! (`{00020430-0000-0000-C000-000000000046}`). Parsing accepts that form as well
//! as bare, lower-case or mixed-case input.

use crate::error::{RegTlbError, Result};
use uuid::Uuid;

/// Format `guid` the way the registry stores it.
pub fn format_guid(guid: &Uuid) -> String {
    let mut buffer = Uuid::encode_buffer();
    format!("{{{}}}", guid.as_hyphenated().encode_upper(&mut buffer))
}

/// Parse a GUID, with or without braces.
pub fn parse_guid(text: &str) -> Result<Uuid> {
    let trimmed = text.trim();
    let bare = trimmed
        .strip_prefix('{')
        .and_then(|rest| rest.strip_suffix('}'))
        .unwrap_or(trimmed);
    Uuid::parse_str(bare)
        .map_err(|e| RegTlbError::application(format!("Invalid GUID '{}': {}", text, e)))
}

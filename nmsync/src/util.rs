//! Small conversion helpers shared across modules.

use log::warn;
use std::str;

/// Decode SSID bytes for comparison purposes, defaulting to empty string if
/// the bytes are empty or not valid UTF-8. Invalid UTF-8 is logged.
pub(crate) fn decode_ssid_or_empty(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return String::new();
    }
    str::from_utf8(bytes)
        .map(|s| s.to_string())
        .unwrap_or_else(|e| {
            warn!("Invalid UTF-8 in SSID: {e}");
            String::new()
        })
}

//! Input sanitization for persisted visit fields.
//!
//! The log file is tab-separated with newline-terminated rows, so a stray
//! `\r`, `\n`, or `\t` in any field would corrupt row/column alignment.
//! Every field goes through [`sanitize`] before it reaches the store.

/// Fallback stored when a field is absent or empty after cleaning.
pub const FIELD_FALLBACK: &str = "unknown";

/// Maximum stored length (characters) for the client address field.
pub const MAX_IP_LEN: usize = 160;
/// Maximum stored length (characters) for the timezone field.
pub const MAX_TIMEZONE_LEN: usize = 80;
/// Maximum stored length (characters) for the user-agent field.
pub const MAX_USER_AGENT_LEN: usize = 200;

/// Clean one untrusted string for storage.
///
/// Each `\r`, `\n`, and `\t` is replaced with a single space, then the result
/// is truncated to at most `max_len` characters. Absent input, or input that
/// is empty after cleaning, becomes `fallback`.
pub fn sanitize(input: Option<&str>, fallback: &str, max_len: usize) -> String {
    let Some(raw) = input else {
        return fallback.to_string();
    };

    let cleaned: String = raw
        .chars()
        .map(|c| if matches!(c, '\r' | '\n' | '\t') { ' ' } else { c })
        .take(max_len)
        .collect();

    if cleaned.is_empty() {
        fallback.to_string()
    } else {
        cleaned
    }
}

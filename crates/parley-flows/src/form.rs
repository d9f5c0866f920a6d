//! The partially filled registration form kept in the session blob.

use serde::{Deserialize, Serialize};

/// Longest accepted display name, in characters.
pub const MAX_NAME_CHARS: usize = 64;

/// Accepted group code length range, in characters.
pub const GROUP_CODE_CHARS: std::ops::RangeInclusive<usize> = 2..=16;

/// Registration answers collected so far.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationForm {
    /// Name given in `register_name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Group code given in `register_group`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    /// Message carrying the confirmation keyboard, once sent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirm_message_id: Option<i64>,
}

/// Trimmed name if acceptable.
pub fn validate_name(input: &str) -> Option<String> {
    let name = input.trim();
    if name.is_empty() || name.starts_with('/') || name.chars().count() > MAX_NAME_CHARS {
        return None;
    }
    Some(name.to_string())
}

/// Upper-cased group code if acceptable: ASCII letters, digits and `-`.
pub fn normalize_group(input: &str) -> Option<String> {
    let code = input.trim();
    if !GROUP_CODE_CHARS.contains(&code.chars().count()) {
        return None;
    }
    if !code.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return None;
    }
    Some(code.to_ascii_uppercase())
}

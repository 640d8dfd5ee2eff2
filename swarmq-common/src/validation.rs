//! Validation utilities

use regex::Regex;

lazy_static::lazy_static! {
    static ref TOPIC_CHANNEL_NAME_REGEX: Regex =
        Regex::new(r"^[\.a-zA-Z0-9_-]+(#ephemeral)?$").unwrap();
}

/// Suffix marking a name whose registration is deleted as soon as its
/// producer set empties.
pub const EPHEMERAL_SUFFIX: &str = "#ephemeral";

fn is_valid_name(name: &str) -> bool {
    if name.is_empty() || name.len() > 64 {
        return false;
    }
    TOPIC_CHANNEL_NAME_REGEX.is_match(name)
}

/// Check a topic name for correctness: 1-64 characters drawn from
/// `[.a-zA-Z0-9_-]`, optionally ending in `#ephemeral`.
pub fn is_valid_topic_name(name: &str) -> bool {
    is_valid_name(name)
}

/// Check a channel name for correctness; same rules as topic names.
pub fn is_valid_channel_name(name: &str) -> bool {
    is_valid_name(name)
}

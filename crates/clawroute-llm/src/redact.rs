//! Keeping credentials out of logs and error messages

/// Characters of a key left visible at each end
const KEY_EDGE: usize = 4;

/// Upstream text longer than this is not passed on
const MAX_MESSAGE_CHARS: usize = 200;

const WITHHELD: &str = "upstream error (details withheld)";

/// Fragments that suggest a message echoes a credential, compared after
/// lowercasing and dropping `-` and `_`
const CREDENTIAL_HINTS: &[&str] = &[
    "apikey",
    "authorization",
    "bearer",
    "token",
    "secret",
    "password",
    "credential",
];

/// Key shortened to its first and last few characters
///
/// Keys too short to hide anything that way are replaced whole.
pub(crate) fn redact_key(key: &str) -> String {
    if !key.is_ascii() || key.len() < 3 * KEY_EDGE {
        return "[redacted]".to_string();
    }
    let (head, rest) = key.split_at(KEY_EDGE);
    let tail = &rest[rest.len() - KEY_EDGE..];
    format!("{head}***{tail}")
}

/// Upstream message made safe to log and show, or a fixed placeholder
pub(crate) fn scrub_message(message: &str) -> String {
    if message.chars().count() > MAX_MESSAGE_CHARS {
        return WITHHELD.to_string();
    }

    let folded: String = message
        .chars()
        .filter(|c| *c != '-' && *c != '_')
        .flat_map(char::to_lowercase)
        .collect();
    if CREDENTIAL_HINTS.iter().any(|hint| folded.contains(hint)) {
        return WITHHELD.to_string();
    }

    message.to_string()
}

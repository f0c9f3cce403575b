//! Message parsing helpers for handler code.
//!
//! | Shape              | Helper                   |
//! |--------------------|--------------------------|
//! | `cmd:action`       | [`parse_command`]        |
//! | `cmd:action:value` | [`parse_command_value`]  |
//! | `k=v,k=v`          | [`parse_key_value`]      |

use std::collections::BTreeMap;

/// Split `cmd:action` at the first colon. Both halves must be non-empty.
pub fn parse_command(message: &str) -> Option<(&str, &str)> {
    let (command, action) = message.split_once(':')?;
    if command.is_empty() || action.is_empty() {
        return None;
    }
    Some((command, action))
}

/// Split `cmd:action:value`.  The value may be empty and may itself
/// contain colons.
pub fn parse_command_value(message: &str) -> Option<(&str, &str, &str)> {
    let (command, rest) = message.split_once(':')?;
    let (action, value) = rest.split_once(':')?;
    if command.is_empty() || action.is_empty() {
        return None;
    }
    Some((command, action, value))
}

/// Parse `pin=2, state=on` into trimmed pairs.  Malformed pairs are
/// skipped; a repeated key keeps its last value.
pub fn parse_key_value(message: &str) -> BTreeMap<&str, &str> {
    message
        .split(',')
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            if key.is_empty() || value.is_empty() {
                return None;
            }
            Some((key.trim(), value.trim()))
        })
        .collect()
}

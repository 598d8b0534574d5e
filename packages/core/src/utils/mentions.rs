//! Inline Mention Parsing
//!
//! Comments mention users with `@[Display Name](<user uuid>)`. The display
//! name is free text; only the UUID is used, in its canonical lowercase form.

use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;
use uuid::Uuid;

const MENTION_PATTERN: &str = r"@\[([^\]]+)\]\(([a-fA-F0-9-]{36})\)";

/// User ids mentioned in `content`, unique, in order of first appearance
pub fn extract_mentions(content: &str) -> Vec<String> {
    static MENTION_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = MENTION_REGEX.get_or_init(|| Regex::new(MENTION_PATTERN).unwrap());

    let mut seen = HashSet::new();
    let mut mentioned = Vec::new();
    for cap in regex.captures_iter(content) {
        let Some(user_id) = cap
            .get(2)
            .and_then(|m| Uuid::parse_str(m.as_str()).ok())
            .map(|uuid| uuid.to_string())
        else {
            continue;
        };
        if seen.insert(user_id.clone()) {
            mentioned.push(user_id);
        }
    }
    mentioned
}

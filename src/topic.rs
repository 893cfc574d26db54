//! MQTT topic-pattern matching (`+` single-level, `#` multi-level terminal).

/// Returns whether `topic` matches the MQTT subscription `pattern`.
///
/// Pure function of `pattern.split('/')` and `topic.split('/')`. `#` is only
/// meaningful as the final segment; elsewhere in the pattern it is matched
/// as a literal `#` byte (and will almost never match a real topic segment,
/// since `#` and `+` are themselves illegal in concrete MQTT topics
/// published by compliant clients).
///
/// `sensors/#` matches the bare topic `sensors` with zero trailing
/// sublevels, following the common broker convention (mosquitto, among
/// others) that a trailing `#` also matches the level it is attached to,
/// not only its children.
pub fn matches(pattern: &str, topic: &str) -> bool {
    let mut pattern_segments = pattern.split('/');
    let mut topic_segments = topic.split('/');

    loop {
        match (pattern_segments.next(), topic_segments.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => continue,
            (Some("+"), None) => return false,
            (Some(p), Some(t)) if p == t => continue,
            (Some(_), _) => return false,
            (None, None) => return true,
            (None, Some(_)) => return false,
        }
    }
}

/// `$share/<group>/<topic>` and `$queue/<topic>` prefixes are stripped here,
/// on the subscribe side, never inside [`matches`].
pub fn strip_shared_prefix(topic: &str) -> &str {
    if let Some(rest) = topic.strip_prefix("$share/") {
        if let Some(idx) = rest.find('/') {
            return &rest[idx + 1..];
        }
    }
    if let Some(rest) = topic.strip_prefix("$queue/") {
        return rest;
    }
    topic
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_level_wildcard_matches_one_segment_including_empty() {
        assert!(matches("sensors/+/temperature", "sensors/room1/temperature"));
        assert!(!matches("sensors/+/temperature", "sensors/room1/humidity"));
        assert!(!matches("sensors/+/temperature", "sensors/a/b/temperature"));
        assert!(matches("sensors/+/temperature", "sensors//temperature"));
    }

    #[test]
    fn multi_level_wildcard_matches_one_or_more_trailing_segments() {
        assert!(matches("sensors/#", "sensors"));
        assert!(matches("sensors/#", "sensors/x"));
        assert!(matches("sensors/#", "sensors/x/y"));
        assert!(!matches("sensors/#", "other/sensors/x"));
    }

    #[test]
    fn bare_hash_matches_everything() {
        assert!(matches("#", "a/b/c"));
        assert!(matches("#", ""));
    }

    #[test]
    fn literal_segments_must_match_byte_exact() {
        assert!(matches("a/b/c", "a/b/c"));
        assert!(!matches("a/b/c", "a/b/d"));
        assert!(!matches("a/b", "a/b/c"));
        assert!(!matches("a/b/c", "a/b"));
    }

    #[test]
    fn shared_prefixes_are_not_stripped_by_the_matcher() {
        assert!(!matches("a/b", "$share/g1/a/b"));
        assert_eq!(strip_shared_prefix("$share/g1/a/b"), "a/b");
        assert_eq!(strip_shared_prefix("$queue/a/b"), "a/b");
        assert_eq!(strip_shared_prefix("a/b"), "a/b");
    }
}

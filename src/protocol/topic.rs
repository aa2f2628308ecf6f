//! Topic names, topic filters, and mountpoint handling.
//!
//! - Well-formedness checks for `+`/`#` wildcard placement
//! - Shared subscription (`$share/<group>/...`) filter parsing
//! - Mountpoint template expansion and prefix mount/unmount

use super::SubscribeOptions;

pub const SHARE_PREFIX: &str = "$share/";

/// A topic name is what PUBLISH carries: non-empty, wildcard-free.
pub fn valid_topic_name(topic: &str) -> bool {
    !topic.is_empty() && !topic.contains(['+', '#', '\0'])
}

/// A topic filter allows wildcards: `+` occupies a whole level, `#`
/// occupies the final level only.
pub fn valid_topic_filter(filter: &str) -> bool {
    if filter.is_empty() || filter.contains('\0') {
        return false;
    }
    let levels: Vec<&str> = filter.split('/').collect();
    for (i, level) in levels.iter().enumerate() {
        if level.contains('#') {
            if *level != "#" || i != levels.len() - 1 {
                return false;
            }
        } else if level.contains('+') && *level != "+" {
            return false;
        }
    }
    true
}

/// Split a raw SUBSCRIBE filter into the effective topic and the
/// options it implies, merged over the packet-level options.
///
/// A `$share/<group>/rest` filter strips the share prefix and records
/// the group; everything else passes through unchanged.
pub fn parse_filter(raw: &str, base: &SubscribeOptions) -> (String, SubscribeOptions) {
    let mut opts = base.clone();
    if let Some(rest) = raw.strip_prefix(SHARE_PREFIX) {
        if let Some((group, topic)) = rest.split_once('/') {
            if !group.is_empty() && !topic.is_empty() {
                opts.shared_group = Some(group.to_string());
                return (topic.to_string(), opts);
            }
        }
    }
    (raw.to_string(), opts)
}

/// Substitute `%c` (client id) and `%u` (username) in a mountpoint
/// template. An undefined username leaves `%u` untouched.
pub fn expand_mountpoint(template: &str, client_id: &str, username: Option<&str>) -> String {
    let expanded = template.replace("%c", client_id);
    match username {
        Some(user) => expanded.replace("%u", user),
        None => expanded,
    }
}

/// Prepend the mountpoint prefix to a topic.
pub fn mount(mountpoint: Option<&str>, topic: &str) -> String {
    match mountpoint {
        Some(prefix) if !prefix.is_empty() => format!("{prefix}{topic}"),
        _ => topic.to_string(),
    }
}

/// Strip the mountpoint prefix from a topic on outbound delivery.
/// A topic that does not carry the prefix passes through unchanged.
pub fn unmount(mountpoint: Option<&str>, topic: &str) -> String {
    match mountpoint {
        Some(prefix) if !prefix.is_empty() => topic
            .strip_prefix(prefix)
            .unwrap_or(topic)
            .to_string(),
        _ => topic.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_names_reject_wildcards() {
        assert!(valid_topic_name("a/b/c"));
        assert!(!valid_topic_name(""));
        assert!(!valid_topic_name("a/+/c"));
        assert!(!valid_topic_name("a/#"));
    }

    #[test]
    fn filters_allow_wellformed_wildcards() {
        assert!(valid_topic_filter("a/b/c"));
        assert!(valid_topic_filter("a/+/c"));
        assert!(valid_topic_filter("a/#"));
        assert!(valid_topic_filter("#"));
        assert!(valid_topic_filter("+"));
        assert!(!valid_topic_filter(""));
        assert!(!valid_topic_filter("a/#/c"));
        assert!(!valid_topic_filter("a/b#"));
        assert!(!valid_topic_filter("a/b+/c"));
    }

    #[test]
    fn share_prefix_parses_into_group() {
        let base = SubscribeOptions::default();
        let (topic, opts) = parse_filter("$share/g1/a/b", &base);
        assert_eq!(topic, "a/b");
        assert_eq!(opts.shared_group.as_deref(), Some("g1"));

        let (topic, opts) = parse_filter("a/b", &base);
        assert_eq!(topic, "a/b");
        assert!(opts.shared_group.is_none());

        // Degenerate share filters pass through untouched.
        let (topic, opts) = parse_filter("$share/", &base);
        assert_eq!(topic, "$share/");
        assert!(opts.shared_group.is_none());
    }

    #[test]
    fn mountpoint_expansion_substitutes_placeholders() {
        assert_eq!(expand_mountpoint("u/%c/", "alice", None), "u/alice/");
        assert_eq!(
            expand_mountpoint("%u/%c/", "alice", Some("bob")),
            "bob/alice/"
        );
        assert_eq!(expand_mountpoint("%u/", "alice", None), "%u/");
    }

    #[test]
    fn mount_unmount_round_trip() {
        let mp = Some("u/alice/");
        assert_eq!(mount(mp, "t"), "u/alice/t");
        assert_eq!(unmount(mp, "u/alice/t"), "t");
        assert_eq!(unmount(mp, "other/t"), "other/t");
        assert_eq!(mount(None, "t"), "t");
        assert_eq!(unmount(None, "t"), "t");
    }
}

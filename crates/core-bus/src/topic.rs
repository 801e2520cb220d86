//! Command topic grammar and wildcard matching.
//!
//! Inbound commands arrive on `<prefix>/<host>/<section>/<action>`. The
//! prefix is process-wide configuration and may itself contain slashes
//! (`pixeld/cmd`); host, section and action are single segments.

use crate::BusError;

/// Parsed command topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTopic {
    pub host: String,
    pub section: String,
    pub action: String,
}

impl CommandTopic {
    /// Parse `topic` against the configured command prefix. Returns
    /// `BusError::InvalidTopic` when the prefix does not match or the
    /// remainder is not exactly `host/section/action`.
    pub fn parse(topic: &str, prefix: &str) -> Result<Self, BusError> {
        let rest = topic
            .strip_prefix(prefix)
            .and_then(|r| r.strip_prefix('/'))
            .ok_or_else(|| BusError::InvalidTopic(topic.to_string()))?;
        let mut parts = rest.split('/');
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(host), Some(section), Some(action), None)
                if !host.is_empty() && !section.is_empty() && !action.is_empty() =>
            {
                Ok(Self {
                    host: host.to_string(),
                    section: section.to_string(),
                    action: action.to_string(),
                })
            }
            _ => Err(BusError::InvalidTopic(topic.to_string())),
        }
    }

    pub fn format(prefix: &str, host: &str, section: &str, action: &str) -> String {
        format!("{prefix}/{host}/{section}/{action}")
    }
}

/// MQTT-style topic filter match: `+` matches one segment, `#` matches the
/// rest of the topic (only valid as the final segment of the pattern).
pub fn matches(pattern: &str, topic: &str) -> bool {
    let mut pat = pattern.split('/');
    let mut top = topic.split('/');
    loop {
        match (pat.next(), top.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => continue,
            (Some(p), Some(t)) if p == t => continue,
            (None, None) => return true,
            _ => return false,
        }
    }
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    fn segment() -> impl Strategy<Value = String> {
        "[a-z0-9_-]{1,12}"
    }

    proptest! {
        // Any well-formed host/section/action survives a format/parse round trip.
        #[test]
        fn format_parse_round_trip(host in segment(), section in segment(), action in segment()) {
            let topic = CommandTopic::format("pixeld/cmd", &host, &section, &action);
            let parsed = CommandTopic::parse(&topic, "pixeld/cmd").unwrap();
            prop_assert_eq!(parsed.host, host);
            prop_assert_eq!(parsed.section, section);
            prop_assert_eq!(parsed.action, action);
        }

        // The router subscription pattern covers every command topic.
        #[test]
        fn router_pattern_covers_commands(host in segment(), section in segment(), action in segment()) {
            let topic = CommandTopic::format("pixeld/cmd", &host, &section, &action);
            prop_assert!(matches("pixeld/cmd/+/+/+", &topic));
        }
    }
}

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Telegram chat id (numeric).
///
/// Serialized as a bare integer, and as a string when used as a JSON object key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(pub i64);

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// GitLab event families a chat can subscribe to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Jobs,
    Pipelines,
    MergeRequests,
}

impl EventKind {
    pub const ALL: [EventKind; 3] = [
        EventKind::Jobs,
        EventKind::Pipelines,
        EventKind::MergeRequests,
    ];

    /// Key used both in the subscription table and inside preferences.
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Jobs => "jobs",
            EventKind::Pipelines => "pipelines",
            EventKind::MergeRequests => "merge_requests",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Accept the GitLab hook names too (`job`, `merge_request`, `Pipeline Hook`...).
        let norm = s
            .trim()
            .to_lowercase()
            .trim_end_matches(" hook")
            .replace([' ', '-'], "_");
        match norm.as_str() {
            "jobs" | "job" | "build" | "builds" => Ok(EventKind::Jobs),
            "pipelines" | "pipeline" => Ok(EventKind::Pipelines),
            "merge_requests" | "merge_request" | "mr" | "mrs" => Ok(EventKind::MergeRequests),
            _ => Err(format!("unknown event kind: {s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_kind_aliases() {
        assert_eq!("jobs".parse::<EventKind>(), Ok(EventKind::Jobs));
        assert_eq!("Job Hook".parse::<EventKind>(), Ok(EventKind::Jobs));
        assert_eq!("pipeline".parse::<EventKind>(), Ok(EventKind::Pipelines));
        assert_eq!(
            "Merge Request Hook".parse::<EventKind>(),
            Ok(EventKind::MergeRequests)
        );
        assert_eq!("mr".parse::<EventKind>(), Ok(EventKind::MergeRequests));
        assert!("issues".parse::<EventKind>().is_err());
    }

    #[test]
    fn chat_id_is_a_bare_integer_in_json() {
        assert_eq!(serde_json::to_string(&ChatId(-100)).unwrap(), "-100");
        let id: ChatId = serde_json::from_str("42").unwrap();
        assert_eq!(id, ChatId(42));
    }
}

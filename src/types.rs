use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// A saved title. Serialized in the same shape the web reader kept in local
/// storage, so exported lists can be moved between the two.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bookmark {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub cover_url: Option<String>,
    /// RFC 3339, UTC, millisecond precision; sorts lexicographically.
    pub added_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BookmarkOrder {
    #[default]
    Newest,
    Oldest,
    Alphabetical,
}

impl BookmarkOrder {
    pub(crate) fn sql(&self) -> &'static str {
        match self {
            BookmarkOrder::Newest => "ORDER BY added_at DESC, id",
            BookmarkOrder::Oldest => "ORDER BY added_at ASC, id",
            BookmarkOrder::Alphabetical => "ORDER BY title COLLATE NOCASE ASC, id",
        }
    }
}

impl fmt::Display for BookmarkOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BookmarkOrder::Newest => "newest",
            BookmarkOrder::Oldest => "oldest",
            BookmarkOrder::Alphabetical => "alphabetical",
        })
    }
}

impl FromStr for BookmarkOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "newest" => Ok(BookmarkOrder::Newest),
            "oldest" => Ok(BookmarkOrder::Oldest),
            "alphabetical" | "alpha" | "title" => Ok(BookmarkOrder::Alphabetical),
            other => Err(format!("unknown sort order '{other}' (expected newest, oldest or alphabetical)")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stats {
    pub bookmarks: usize,
    pub cache_entries: usize,
    pub expired_cache_entries: usize,
}

pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bookmark_uses_web_storage_field_names() {
        let b = Bookmark {
            id: "m1".to_string(),
            title: "Omniscient Reader".to_string(),
            cover_url: None,
            added_at: "2024-03-01T08:00:00.000Z".to_string(),
        };
        let json = serde_json::to_value(&b).unwrap();
        assert_eq!(json["coverUrl"], serde_json::Value::Null);
        assert_eq!(json["addedAt"], "2024-03-01T08:00:00.000Z");

        let parsed: Bookmark = serde_json::from_str(r#"{"id":"m2","title":"T","addedAt":"x"}"#).unwrap();
        assert!(parsed.cover_url.is_none());
    }

    #[test]
    fn order_parses_aliases() {
        assert_eq!("Alphabetical".parse::<BookmarkOrder>().unwrap(), BookmarkOrder::Alphabetical);
        assert_eq!("oldest".parse::<BookmarkOrder>().unwrap(), BookmarkOrder::Oldest);
        assert!("random".parse::<BookmarkOrder>().is_err());
    }
}

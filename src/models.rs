// Core data structures for the scrape engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A target account
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    pub username: String, // identity used for claims, compared exactly
}

impl User {
    pub fn new(id: u64, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
        }
    }
}

impl std::fmt::Display for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.username)
    }
}

/// Region of a user's profile that posts are fetched from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentArea {
    Timeline,
    Stories,
    Highlights,
    Messages,
    Archived,
    Streams,
    Purchased,
    Labels,
}

impl ContentArea {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeline => "timeline",
            Self::Stories => "stories",
            Self::Highlights => "highlights",
            Self::Messages => "messages",
            Self::Archived => "archived",
            Self::Streams => "streams",
            Self::Purchased => "purchased",
            Self::Labels => "labels",
        }
    }

    /// Create from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "timeline" => Some(Self::Timeline),
            "stories" => Some(Self::Stories),
            "highlights" => Some(Self::Highlights),
            "messages" => Some(Self::Messages),
            "archived" => Some(Self::Archived),
            "streams" => Some(Self::Streams),
            "purchased" => Some(Self::Purchased),
            "labels" => Some(Self::Labels),
            _ => None,
        }
    }

    /// Get all areas
    pub fn all() -> Vec<Self> {
        vec![
            Self::Timeline,
            Self::Stories,
            Self::Highlights,
            Self::Messages,
            Self::Archived,
            Self::Streams,
            Self::Purchased,
            Self::Labels,
        ]
    }
}

impl std::fmt::Display for ContentArea {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Work routed to the action router for each user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Download,
    Like,
    Unlike,
    Metadata,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Download => "download",
            Self::Like => "like",
            Self::Unlike => "unlike",
            Self::Metadata => "metadata",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "download" => Some(Self::Download),
            "like" => Some(Self::Like),
            "unlike" => Some(Self::Unlike),
            "metadata" => Some(Self::Metadata),
            _ => None,
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind of media attached to a post
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    Audio,
    Gif,
}

/// Single media item embedded in a post
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Media {
    pub id: u64,
    pub kind: MediaKind,
    pub url: Option<String>, // None when locked or not yet purchased
}

/// A post returned by the content fetcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: u64,
    pub username: String,
    pub area: ContentArea,
    pub posted_at: Option<DateTime<Utc>>,
    pub media: Vec<Media>,
}

impl Post {
    /// Number of embedded media items
    pub fn media_count(&self) -> usize {
        self.media.len()
    }
}

/// Counters reported back by the action router for one action invocation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionReport {
    pub media_downloaded: u64,
    pub media_skipped: u64,
    pub media_failed: u64,
    pub likes_attempted: u64,
    pub likes_succeeded: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_area_parse() {
        assert_eq!(ContentArea::parse("Timeline"), Some(ContentArea::Timeline));
        assert_eq!(ContentArea::parse(" messages "), Some(ContentArea::Messages));
        assert_eq!(ContentArea::parse("feed"), None);
        assert_eq!(ContentArea::all().len(), 8);
    }

    #[test]
    fn test_action_round_trip_names() {
        for action in [Action::Download, Action::Like, Action::Unlike, Action::Metadata] {
            assert_eq!(Action::parse(action.as_str()), Some(action));
        }
        assert_eq!(Action::parse("delete"), None);
    }

    #[test]
    fn test_area_serde_lowercase() {
        let json = serde_json::to_string(&ContentArea::Highlights).unwrap();
        assert_eq!(json, "\"highlights\"");
    }

    #[test]
    fn test_post_media_count() {
        let post = Post {
            id: 1,
            username: "alice".to_string(),
            area: ContentArea::Timeline,
            posted_at: None,
            media: vec![
                Media { id: 10, kind: MediaKind::Image, url: None },
                Media { id: 11, kind: MediaKind::Video, url: Some("https://cdn/11".into()) },
            ],
        };
        assert_eq!(post.media_count(), 2);
    }
}

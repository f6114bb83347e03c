use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

pub const NO_TITLE: &str = "No Title";
pub const NO_LINK: &str = "No Link";
pub const NO_DATE: &str = "No Date";

/// A single job listing pulled out of a feed item.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Posting {
    pub title: String,
    pub link: String,       // Dedup key
    #[serde(rename = "pub_date")]
    pub published_at: String, // Kept verbatim, feeds disagree on date formats
    pub source: String,
}

impl Posting {
    pub fn new(title: &str, link: &str, published_at: &str, source: &str) -> Self {
        Self {
            title: title.to_string(),
            link: link.to_string(),
            published_at: published_at.to_string(),
            source: source.to_string(),
        }
    }
}

/// A posting as persisted by the dedup store.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SeenLink {
    pub link: String,
    pub title: String,
    pub published_at: String,
    pub source: String,
    pub first_seen: DateTime<Utc>,
}

use std::collections::{BTreeMap, HashMap};

use anyhow::Result;
use chrono::Utc;
use log::{error, info};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::aggregator::Aggregator;
use crate::archive::ArchiveSink;
use crate::config::{ChannelConfig, Config, Mode};
use crate::notify::Notifier;
use crate::syndication::render_feed;

pub const CONTENT_JSON: &str = "application/json";
pub const CONTENT_RSS: &str = "application/rss+xml";

/// Incoming invocation, from a scheduler or an HTTP-style request.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Event {
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

impl Event {
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_string(), value.to_string());
        self
    }

    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn accepts_json(&self) -> bool {
        self.header("accept")
            .is_some_and(|v| v.to_ascii_lowercase().contains(CONTENT_JSON))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Response {
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl Response {
    pub fn new(status_code: u16, content_type: &str, body: String) -> Self {
        let mut headers = BTreeMap::new();
        headers.insert("Content-Type".to_string(), content_type.to_string());
        Self {
            status_code,
            headers,
            body,
        }
    }

    pub fn json(status_code: u16, body: &serde_json::Value) -> Self {
        Self::new(status_code, CONTENT_JSON, body.to_string())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("Content-Type").map(String::as_str)
    }
}

/// Runs one invocation end to end: fetch, dedup, archive, notify.
pub struct Handler {
    mode: Mode,
    feeds: Vec<String>,
    channel: ChannelConfig,
    aggregator: Aggregator,
    archive: ArchiveSink,
    notifier: Option<Notifier>,
}

impl Handler {
    pub fn new(config: &Config, aggregator: Aggregator, archive: ArchiveSink, notifier: Option<Notifier>) -> Self {
        Self {
            mode: config.mode,
            feeds: config.feeds.clone(),
            channel: config.channel.clone(),
            aggregator,
            archive,
            notifier,
        }
    }

    /// Never fails: errors become a 500 response with a JSON error body.
    pub async fn handle(&self, event: &Event) -> Response {
        info!("Invocation received ({:?} mode, {} feeds)", self.mode, self.feeds.len());

        let result = match self.mode {
            Mode::Digest => self.run_digest().await,
            Mode::Feed => self.run_feed(event).await,
        };

        match result {
            Ok(response) => response,
            Err(e) => {
                error!("Invocation failed: {:#}", e);
                Response::json(500, &json!({ "error": format!("{:#}", e) }))
            }
        }
    }

    async fn run_digest(&self) -> Result<Response> {
        let postings = self.aggregator.run(&self.feeds).await?;
        let archive_url = self.archive.archive(&postings).await?;

        if let Some(notifier) = &self.notifier {
            notifier.notify(&postings, Some(&archive_url)).await?;
        }

        let message = if postings.is_empty() {
            "No new job postings found."
        } else {
            "Success"
        };
        Ok(Response::json(
            200,
            &json!({
                "message": message,
                "new_postings": postings.len(),
                "archive_url": archive_url,
            }),
        ))
    }

    async fn run_feed(&self, event: &Event) -> Result<Response> {
        let postings = self.aggregator.run(&self.feeds).await?;

        if postings.is_empty() {
            info!("No jobs were fetched");
            return Ok(Response::json(
                200,
                &json!({ "message": "No jobs were fetched. Check your RSS source URLs." }),
            ));
        }

        let feed = render_feed(&postings, &self.channel, Utc::now())?;

        if let Some(notifier) = &self.notifier {
            notifier.notify(&postings, None).await?;
        }

        if event.accepts_json() {
            info!("JSON requested, returning {} postings", postings.len());
            return Ok(Response::json(200, &serde_json::to_value(&postings)?));
        }

        Ok(Response::new(200, CONTENT_RSS, feed))
    }
}

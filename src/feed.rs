use std::time::Duration;

use anyhow::Result;
use log::{debug, info, warn};
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use reqwest::Client;

use crate::config::HttpConfig;
use crate::error::FetchError;
use crate::models::{Posting, NO_DATE, NO_LINK, NO_TITLE};

pub struct FeedFetcher {
    client: Client,
}

impl FeedFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Fetch every feed in order and concatenate their postings.
    ///
    /// A feed that fails to download or parse is logged and skipped; it never
    /// affects the postings of the other feeds.
    pub async fn fetch(&self, feed_urls: &[String]) -> Vec<Posting> {
        let mut postings = Vec::new();

        for url in feed_urls {
            match self.fetch_one(url).await {
                Ok(items) => {
                    info!("Fetched {} items from {}", items.len(), url);
                    postings.extend(items);
                }
                Err(e) => {
                    warn!("Skipping feed {}: {}", url, e);
                }
            }
        }

        postings
    }

    pub async fn fetch_one(&self, url: &str) -> Result<Vec<Posting>, FetchError> {
        debug!("Fetching feed: {}", url);

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        let bytes = response.bytes().await?;
        parse_items(&bytes, url)
    }
}

/// The one HTTP client an invocation uses, for feed downloads and archive uploads.
pub fn http_client(config: &HttpConfig) -> Result<Client> {
    let client = Client::builder()
        .user_agent(&config.user_agent)
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;
    Ok(client)
}

/// Extract every `<item>` of an RSS document, at any depth.
///
/// Only the direct `title`, `link` and `pubDate` children are read. Missing or
/// empty fields fall back to the "No Title" / "No Link" / "No Date" placeholders.
pub fn parse_items(xml: &[u8], source: &str) -> Result<Vec<Posting>, FetchError> {
    // Untrimmed, so text and CDATA pieces keep the spaces between them
    let mut reader = Reader::from_reader(xml);

    let mut items = Vec::new();
    let mut buf = Vec::new();

    // Open elements, outermost first
    let mut stack: Vec<String> = Vec::new();
    let mut seen_root = false;
    // Stack depth of the open <item> and the fields collected so far
    let mut current: Option<(usize, ItemBuilder)> = None;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if stack.is_empty() {
                    check_root(&mut seen_root, &name)?;
                }
                if name == "item" && current.is_none() {
                    current = Some((stack.len(), ItemBuilder::default()));
                }
                stack.push(name);
            }
            Event::Empty(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if stack.is_empty() {
                    check_root(&mut seen_root, &name)?;
                }
                if name == "item" && current.is_none() {
                    items.push(ItemBuilder::default().build(source));
                }
            }
            Event::End(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                match stack.pop() {
                    Some(open) if open == name => {}
                    Some(open) => {
                        return Err(FetchError::Malformed(format!(
                            "expected </{}>, found </{}>",
                            open, name
                        )));
                    }
                    None => {
                        return Err(FetchError::Malformed(format!("unexpected </{}>", name)));
                    }
                }

                if current.as_ref().is_some_and(|(depth, _)| *depth == stack.len()) {
                    if let Some((_, builder)) = current.take() {
                        items.push(builder.build(source));
                    }
                }
            }
            Event::Text(e) => {
                let text = e.unescape()?.into_owned();
                if !stack.is_empty() {
                    collect_text(&mut current, &stack, &text);
                } else if !text.trim().is_empty() {
                    return Err(FetchError::Malformed("text outside of root element".into()));
                }
            }
            Event::CData(e) => {
                let raw = e.into_inner();
                let text = String::from_utf8_lossy(&raw);
                collect_text(&mut current, &stack, &text);
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if let Some(open) = stack.last() {
        return Err(FetchError::Malformed(format!("unclosed <{}>", open)));
    }
    if !seen_root {
        return Err(FetchError::Malformed("no root element".into()));
    }

    debug!("Parsed {} items from {}", items.len(), source);
    Ok(items)
}

fn check_root(seen_root: &mut bool, name: &str) -> Result<(), FetchError> {
    if *seen_root {
        return Err(FetchError::Malformed(format!("second root element <{}>", name)));
    }
    *seen_root = true;
    Ok(())
}

fn collect_text(current: &mut Option<(usize, ItemBuilder)>, stack: &[String], text: &str) {
    let Some((depth, builder)) = current else {
        return;
    };
    // Only direct children of the item
    if stack.len() != *depth + 2 || text.is_empty() {
        return;
    }

    let field = match stack[stack.len() - 1].as_str() {
        "title" => &mut builder.title,
        "link" => &mut builder.link,
        "pubDate" => &mut builder.pub_date,
        _ => return,
    };
    field.get_or_insert_with(String::new).push_str(text);
}

#[derive(Default)]
struct ItemBuilder {
    title: Option<String>,
    link: Option<String>,
    pub_date: Option<String>,
}

impl ItemBuilder {
    fn build(self, source: &str) -> Posting {
        Posting {
            title: field_or(self.title, NO_TITLE),
            link: field_or(self.link, NO_LINK),
            published_at: field_or(self.pub_date, NO_DATE),
            source: source.to_string(),
        }
    }
}

/// Whitespace-only counts as missing.
fn field_or(raw: Option<String>, placeholder: &str) -> String {
    match raw.as_deref().map(str::trim) {
        Some(text) if !text.is_empty() => text.to_string(),
        _ => placeholder.to_string(),
    }
}

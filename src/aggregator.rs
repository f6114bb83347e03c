use std::sync::Arc;

use anyhow::Result;
use log::{debug, info};

use crate::db::SeenStore;
use crate::feed::FeedFetcher;
use crate::models::Posting;

/// Fetches all feeds and keeps the postings whose link was never seen before.
pub struct Aggregator {
    fetcher: FeedFetcher,
    // None disables dedup: everything fetched is reported
    store: Option<Arc<dyn SeenStore>>,
}

impl Aggregator {
    pub fn new(fetcher: FeedFetcher, store: Arc<dyn SeenStore>) -> Self {
        Self {
            fetcher,
            store: Some(store),
        }
    }

    pub fn without_dedup(fetcher: FeedFetcher) -> Self {
        Self {
            fetcher,
            store: None,
        }
    }

    pub async fn run(&self, feed_urls: &[String]) -> Result<Vec<Posting>> {
        let candidates = self.fetcher.fetch(feed_urls).await;

        let Some(store) = &self.store else {
            info!("Dedup disabled, reporting all {} postings", candidates.len());
            return Ok(candidates);
        };

        let mut new_postings = Vec::new();
        for posting in candidates {
            // Recorded before the next candidate is looked at, so the first
            // occurrence of a link within one run wins.
            if store.is_new(&posting.link).await? {
                store.record(&posting).await?;
                new_postings.push(posting);
            } else {
                debug!("Already seen: {}", posting.link);
            }
        }

        info!("Found {} new postings", new_postings.len());
        Ok(new_postings)
    }
}

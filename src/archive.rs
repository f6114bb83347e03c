use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{info, warn};
use reqwest::Client;

use crate::config::{ArchiveConfig, StoreConfig};
use crate::error::ArchiveError;
use crate::models::Posting;

pub const CSV_HEADER: [&str; 4] = ["Job Title", "Link", "Published Date", "Source"];

/// Durable storage the archive file is published to.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Upload the file at `path` as object `name` and return its public URL
    async fn put(&self, name: &str, path: &Path) -> Result<String, ArchiveError>;
}

/// Uploads objects with a plain HTTP PUT, e.g. to an S3 bucket endpoint.
pub struct HttpBucketStore {
    client: Client,
    bucket: String,
    endpoint: String,
    public_base_url: Option<String>,
}

impl HttpBucketStore {
    pub fn new(client: Client, bucket: &str, endpoint: &str, public_base_url: Option<String>) -> Self {
        Self {
            client,
            bucket: bucket.to_string(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            public_base_url,
        }
    }

    pub fn public_url(&self, name: &str) -> String {
        match &self.public_base_url {
            Some(base) => format!("{}/{}", base.trim_end_matches('/'), name),
            None => format!("https://{}.s3.amazonaws.com/{}", self.bucket, name),
        }
    }
}

#[async_trait]
impl BlobStore for HttpBucketStore {
    async fn put(&self, name: &str, path: &Path) -> Result<String, ArchiveError> {
        let body = tokio::fs::read(path).await?;
        let target = format!("{}/{}", self.endpoint, name);

        let response = self
            .client
            .put(&target)
            .header(reqwest::header::CONTENT_TYPE, "text/csv")
            .body(body)
            .send()
            .await
            .map_err(|e| ArchiveError::Upload {
                name: name.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ArchiveError::Upload {
                name: name.to_string(),
                reason: format!("HTTP {} from {}", status, target),
            });
        }

        Ok(self.public_url(name))
    }
}

/// Copies objects into a local directory, useful behind a static file server.
pub struct LocalDirStore {
    dir: PathBuf,
    public_base_url: Option<String>,
}

impl LocalDirStore {
    pub fn new(dir: PathBuf, public_base_url: Option<String>) -> Self {
        Self {
            dir,
            public_base_url,
        }
    }
}

#[async_trait]
impl BlobStore for LocalDirStore {
    async fn put(&self, name: &str, path: &Path) -> Result<String, ArchiveError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let dest = self.dir.join(name);
        tokio::fs::copy(path, &dest).await?;

        Ok(match &self.public_base_url {
            Some(base) => format!("{}/{}", base.trim_end_matches('/'), name),
            None => format!("file://{}", tokio::fs::canonicalize(&dest).await?.display()),
        })
    }
}

pub fn store_from_config(config: &StoreConfig, client: Client) -> Arc<dyn BlobStore> {
    match config {
        StoreConfig::Http {
            bucket,
            endpoint,
            public_base_url,
        } => Arc::new(HttpBucketStore::new(client, bucket, endpoint, public_base_url.clone())),
        StoreConfig::Local {
            dir,
            public_base_url,
        } => Arc::new(LocalDirStore::new(dir.clone(), public_base_url.clone())),
    }
}

/// Object name for an archive created at `now`. Sorts chronologically.
pub fn archive_name(now: DateTime<Utc>) -> String {
    format!("jobs_{}.csv", now.format("%Y-%m-%d_%H-%M-%S"))
}

/// Header row, then one row per posting: title, link, published date, source.
pub fn write_csv<W: io::Write>(out: W, postings: &[Posting]) -> Result<(), ArchiveError> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(CSV_HEADER)?;
    for p in postings {
        writer.write_record([&p.title, &p.link, &p.published_at, &p.source])?;
    }
    writer.flush()?;
    Ok(())
}

pub struct ArchiveSink {
    store: Arc<dyn BlobStore>,
    scratch_dir: PathBuf,
}

impl ArchiveSink {
    pub fn new(store: Arc<dyn BlobStore>, scratch_dir: PathBuf) -> Self {
        Self { store, scratch_dir }
    }

    pub fn from_config(config: &ArchiveConfig, client: Client) -> Self {
        let scratch_dir = config
            .scratch_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir);
        Self::new(store_from_config(&config.store, client), scratch_dir)
    }

    /// Write the postings to a CSV file and publish it. Returns the public URL.
    pub async fn archive(&self, postings: &[Posting]) -> Result<String, ArchiveError> {
        let name = archive_name(Utc::now());
        let local = self.scratch_dir.join(&name);

        write_csv(std::fs::File::create(&local)?, postings)?;
        let uploaded = self.store.put(&name, &local).await;

        if let Err(e) = tokio::fs::remove_file(&local).await {
            warn!("Failed to remove scratch file {}: {}", local.display(), e);
        }

        let url = uploaded?;
        info!("Archived {} postings to {}", postings.len(), url);
        Ok(url)
    }
}

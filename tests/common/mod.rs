#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::{Path as UrlPath, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::routing::{get, put};
use axum::Router;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use job_digest::archive::BlobStore;
use job_digest::error::{ArchiveError, NotifyError};
use job_digest::models::SeenLink;
use job_digest::notify::{Email, Mailer};
use job_digest::{Posting, SeenStore};

pub const DEVOPS_RSS: &str = include_str!("../fixtures/devops.rss");
pub const CLOUD_XML: &str = include_str!("../fixtures/cloud.xml");
pub const BROKEN_XML: &str = include_str!("../fixtures/broken.xml");

/// Serves the fixture feeds on a random local port. Returns the base URL.
pub async fn serve_fixtures() -> String {
    let app = Router::new()
        .route("/devops.rss", get(|| async { DEVOPS_RSS }))
        .route("/cloud.xml", get(|| async { CLOUD_XML }))
        .route("/broken.xml", get(|| async { BROKEN_XML }))
        .route("/gone.rss", get(|| async { (StatusCode::NOT_FOUND, "not here") }))
        .route("/error.rss", get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, DEVOPS_RSS) }));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{addr}")
}

pub fn feed_urls(base: &str, paths: &[&str]) -> Vec<String> {
    paths.iter().map(|p| format!("{base}/{p}")).collect()
}

#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<Email>>,
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: &Email) -> Result<(), NotifyError> {
        self.sent.lock().await.push(email.clone());
        Ok(())
    }
}

/// A bucket that rejects every upload.
pub struct UnreachableBucket;

#[async_trait]
impl BlobStore for UnreachableBucket {
    async fn put(&self, name: &str, _path: &Path) -> Result<String, ArchiveError> {
        Err(ArchiveError::Upload {
            name: name.to_string(),
            reason: "bucket unreachable".to_string(),
        })
    }
}

/// A mailer whose every delivery bounces.
pub struct FailingMailer;

#[async_trait]
impl Mailer for FailingMailer {
    async fn send(&self, _email: &Email) -> Result<(), NotifyError> {
        Err(NotifyError::Address("bounce@invalid".to_string()))
    }
}

/// A seen-link store whose backend is down.
pub struct FailingStore;

fn store_down<T>() -> Result<T> {
    Err(anyhow!("seen-link store unavailable"))
}

#[async_trait]
impl SeenStore for FailingStore {
    async fn is_new(&self, _link: &str) -> Result<bool> {
        store_down()
    }

    async fn record(&self, _posting: &Posting) -> Result<()> {
        store_down()
    }

    async fn record_if_absent(&self, _posting: &Posting) -> Result<bool> {
        store_down()
    }

    async fn count(&self) -> Result<u64> {
        store_down()
    }

    async fn recent(&self, _limit: u32) -> Result<Vec<SeenLink>> {
        store_down()
    }

    async fn prune(&self, _cutoff: DateTime<Utc>) -> Result<u64> {
        store_down()
    }
}

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub name: String,
    pub user_agent: String,
    pub body: Vec<u8>,
}

pub struct Bucket {
    pub base: String,
    pub objects: Arc<Mutex<Vec<StoredObject>>>,
}

async fn put_object(
    State(objects): State<Arc<Mutex<Vec<StoredObject>>>>,
    UrlPath(name): UrlPath<String>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    objects.lock().await.push(StoredObject {
        name,
        user_agent,
        body: body.to_vec(),
    });
    StatusCode::OK
}

/// A bucket endpoint on a random local port. PUTs under `/bucket/` are kept,
/// PUTs under `/stalled/` never get an answer.
pub async fn serve_bucket() -> Bucket {
    let objects = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new()
        .route("/bucket/{name}", put(put_object))
        .route(
            "/stalled/{name}",
            put(|| async { std::future::pending::<StatusCode>().await }),
        )
        .with_state(objects.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Bucket {
        base: format!("http://{addr}"),
        objects,
    }
}

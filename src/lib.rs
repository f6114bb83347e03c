pub mod aggregator;
pub mod archive;
pub mod config;
pub mod db;
pub mod error;
pub mod feed;
pub mod handler;
pub mod logger;
pub mod models;
pub mod notify;
pub mod syndication;

pub use aggregator::Aggregator;
pub use archive::{ArchiveSink, BlobStore};
pub use config::Config;
pub use db::{Database, MemoryStore, SeenStore};
pub use feed::FeedFetcher;
pub use handler::{Event, Handler, Response};
pub use models::Posting;
pub use notify::{Mailer, Notifier};

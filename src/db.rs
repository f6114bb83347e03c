use std::collections::HashMap;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use log::{debug, info};
use regex::Regex;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use tokio::sync::Mutex;

use crate::models::{Posting, SeenLink};

/// Persistent record of every posting link ever reported.
///
/// `is_new` followed by `record` is two independent operations. Callers that
/// may run concurrently should use `record_if_absent` instead.
#[async_trait]
pub trait SeenStore: Send + Sync {
    /// True if no record exists for `link`
    async fn is_new(&self, link: &str) -> Result<bool>;

    /// Store the posting keyed by its link, replacing any previous record
    async fn record(&self, posting: &Posting) -> Result<()>;

    /// Insert only when the link is unknown. Returns whether a row was written.
    async fn record_if_absent(&self, posting: &Posting) -> Result<bool>;

    async fn count(&self) -> Result<u64>;

    /// Most recently recorded links first
    async fn recent(&self, limit: u32) -> Result<Vec<SeenLink>>;

    /// Delete records first seen before `cutoff`. Returns the number removed.
    async fn prune(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}

pub struct Database {
    pub pool: SqlitePool,
    table: String,
}

impl Database {
    pub async fn connect(url: &str, table: &str) -> Result<Self> {
        let ident = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$")?;
        if !ident.is_match(table) {
            return Err(anyhow!("Invalid table name: {}", table));
        }

        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        // One connection keeps `sqlite::memory:` databases alive for the whole run
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let db = Self {
            pool,
            table: table.to_string(),
        };
        db.init().await?;
        info!("Opened seen-link store {} (table {})", url, table);
        Ok(db)
    }

    pub async fn init(&self) -> Result<()> {
        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                job_link TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                pub_date TEXT NOT NULL,
                source TEXT NOT NULL,
                first_seen INTEGER NOT NULL
            )
            "#,
            self.table
        ))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn upsert_at(&self, posting: &Posting, seen_at: DateTime<Utc>) -> Result<()> {
        sqlx::query(&format!(
            r#"
            INSERT INTO {} (job_link, title, pub_date, source, first_seen)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(job_link) DO UPDATE SET
                title = excluded.title,
                pub_date = excluded.pub_date,
                source = excluded.source
            "#,
            self.table
        ))
        .bind(&posting.link)
        .bind(&posting.title)
        .bind(&posting.published_at)
        .bind(&posting.source)
        .bind(seen_at.timestamp())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn row_to_seen(row: &SqliteRow) -> SeenLink {
    let first_seen: i64 = row.get(4);
    SeenLink {
        link: row.get(0),
        title: row.get(1),
        published_at: row.get(2),
        source: row.get(3),
        first_seen: DateTime::from_timestamp(first_seen, 0).unwrap_or_default(),
    }
}

#[async_trait]
impl SeenStore for Database {
    async fn is_new(&self, link: &str) -> Result<bool> {
        let row = sqlx::query(&format!(
            "SELECT 1 FROM {} WHERE job_link = ?",
            self.table
        ))
        .bind(link)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.is_none())
    }

    async fn record(&self, posting: &Posting) -> Result<()> {
        debug!("Recording {}", posting.link);
        self.upsert_at(posting, Utc::now()).await
    }

    async fn record_if_absent(&self, posting: &Posting) -> Result<bool> {
        let result = sqlx::query(&format!(
            r#"
            INSERT OR IGNORE INTO {} (job_link, title, pub_date, source, first_seen)
            VALUES (?, ?, ?, ?, ?)
            "#,
            self.table
        ))
        .bind(&posting.link)
        .bind(&posting.title)
        .bind(&posting.published_at)
        .bind(&posting.source)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn count(&self) -> Result<u64> {
        let row = sqlx::query(&format!("SELECT COUNT(*) FROM {}", self.table))
            .fetch_one(&self.pool)
            .await?;
        let count: i64 = row.get(0);
        Ok(count as u64)
    }

    async fn recent(&self, limit: u32) -> Result<Vec<SeenLink>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT job_link, title, pub_date, source, first_seen FROM {}
            ORDER BY first_seen DESC, rowid DESC
            LIMIT ?
            "#,
            self.table
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_seen).collect())
    }

    async fn prune(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(&format!("DELETE FROM {} WHERE first_seen < ?", self.table))
            .bind(cutoff.timestamp())
            .execute(&self.pool)
            .await?;

        info!("Pruned {} seen links older than {}", result.rows_affected(), cutoff);
        Ok(result.rows_affected())
    }
}

/// Cutoff for pruning records first seen more than `days` days before `now`.
pub fn prune_cutoff(now: DateTime<Utc>, days: i64) -> Result<DateTime<Utc>> {
    if days <= 0 {
        return Err(anyhow!("Prune age must be a positive number of days, got {}", days));
    }
    Duration::try_days(days)
        .and_then(|age| now.checked_sub_signed(age))
        .ok_or_else(|| anyhow!("Prune age of {} days is out of range", days))
}

/// Non-persistent store for dry runs and tests.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<MemoryRecords>,
}

#[derive(Default)]
struct MemoryRecords {
    // Never reused, so it stays a valid tie-break after a prune
    next_order: u64,
    // link -> (insertion order, record)
    by_link: HashMap<String, (u64, SeenLink)>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn insert(&self, posting: &Posting, replace: bool) -> bool {
        let mut records = self.records.lock().await;
        let existing = records.by_link.get(&posting.link).map(|(o, r)| (*o, r.first_seen));

        if existing.is_some() && !replace {
            return false;
        }
        let (order, first_seen) = match existing {
            Some(kept) => kept,
            None => {
                let order = records.next_order;
                records.next_order += 1;
                (order, Utc::now())
            }
        };
        records.by_link.insert(
            posting.link.clone(),
            (
                order,
                SeenLink {
                    link: posting.link.clone(),
                    title: posting.title.clone(),
                    published_at: posting.published_at.clone(),
                    source: posting.source.clone(),
                    first_seen,
                },
            ),
        );
        true
    }
}

#[async_trait]
impl SeenStore for MemoryStore {
    async fn is_new(&self, link: &str) -> Result<bool> {
        Ok(!self.records.lock().await.by_link.contains_key(link))
    }

    async fn record(&self, posting: &Posting) -> Result<()> {
        self.insert(posting, true).await;
        Ok(())
    }

    async fn record_if_absent(&self, posting: &Posting) -> Result<bool> {
        Ok(self.insert(posting, false).await)
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.records.lock().await.by_link.len() as u64)
    }

    async fn recent(&self, limit: u32) -> Result<Vec<SeenLink>> {
        let records = self.records.lock().await;
        let mut all: Vec<&(u64, SeenLink)> = records.by_link.values().collect();
        all.sort_by(|a, b| b.1.first_seen.cmp(&a.1.first_seen).then(b.0.cmp(&a.0)));
        Ok(all
            .into_iter()
            .take(limit as usize)
            .map(|(_, r)| r.clone())
            .collect())
    }

    async fn prune(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut records = self.records.lock().await;
        let before = records.by_link.len();
        records.by_link.retain(|_, (_, r)| r.first_seen >= cutoff);
        Ok((before - records.by_link.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn posting(n: u32) -> Posting {
        Posting::new(
            &format!("Job {n}"),
            &format!("https://jobs.example/{n}"),
            "Mon, 01 Jan 2024",
            "https://jobs.example/feed.rss",
        )
    }

    async fn memory_db() -> Database {
        Database::connect("sqlite::memory:", "job_listings").await.unwrap()
    }

    #[tokio::test]
    async fn unknown_link_is_new_until_recorded() {
        let db = memory_db().await;
        let p = posting(1);

        assert!(db.is_new(&p.link).await.unwrap());
        db.record(&p).await.unwrap();
        assert!(!db.is_new(&p.link).await.unwrap());
        assert_eq!(db.count().await.unwrap(), 1);

        let stored = db.recent(10).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].link, p.link);
        assert_eq!(stored[0].title, p.title);
        assert_eq!(stored[0].published_at, p.published_at);
        assert_eq!(stored[0].source, p.source);
    }

    #[tokio::test]
    async fn record_twice_keeps_one_row() {
        let db = memory_db().await;
        let mut p = posting(1);
        db.record(&p).await.unwrap();
        p.title = "Job 1 (updated)".to_string();
        db.record(&p).await.unwrap();

        assert_eq!(db.count().await.unwrap(), 1);
        assert_eq!(db.recent(1).await.unwrap()[0].title, "Job 1 (updated)");
    }

    #[tokio::test]
    async fn record_if_absent_only_inserts_once() {
        let db = memory_db().await;
        let p = posting(7);

        assert!(db.record_if_absent(&p).await.unwrap());
        assert!(!db.record_if_absent(&p).await.unwrap());
        assert_eq!(db.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn prune_removes_only_old_records() {
        let db = memory_db().await;
        let now = Utc::now();
        db.upsert_at(&posting(1), now - Duration::days(40)).await.unwrap();
        db.upsert_at(&posting(2), now - Duration::days(2)).await.unwrap();

        let removed = db.prune(now - Duration::days(30)).await.unwrap();

        assert_eq!(removed, 1);
        assert!(db.is_new(&posting(1).link).await.unwrap());
        assert!(!db.is_new(&posting(2).link).await.unwrap());
    }

    #[tokio::test]
    async fn rejects_unsafe_table_names() {
        assert!(Database::connect("sqlite::memory:", "jobs; DROP TABLE x").await.is_err());
    }

    #[tokio::test]
    async fn memory_store_matches_database_semantics() {
        let store = MemoryStore::new();
        let p = posting(3);

        assert!(store.is_new(&p.link).await.unwrap());
        assert!(store.record_if_absent(&p).await.unwrap());
        assert!(!store.record_if_absent(&p).await.unwrap());
        assert!(!store.is_new(&p.link).await.unwrap());
        store.record(&posting(4)).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 2);
        assert_eq!(store.recent(1).await.unwrap().len(), 1);
        assert_eq!(store.prune(Utc::now() + Duration::days(1)).await.unwrap(), 2);
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn memory_store_order_survives_prune() {
        let store = MemoryStore::new();
        for n in 1..=3 {
            store.record(&posting(n)).await.unwrap();
        }
        let old = Utc::now() - Duration::days(10);
        store.records.lock().await.by_link.get_mut(&posting(1).link).unwrap().1.first_seen = old;
        assert_eq!(store.prune(old + Duration::days(1)).await.unwrap(), 1);

        store.record(&posting(4)).await.unwrap();

        // Same timestamp for the last two, so only insertion order separates them
        let same = Utc::now();
        {
            let mut records = store.records.lock().await;
            for n in [3, 4] {
                records.by_link.get_mut(&posting(n).link).unwrap().1.first_seen = same;
            }
        }
        let recent = store.recent(3).await.unwrap();
        let links: Vec<&str> = recent.iter().map(|r| r.link.as_str()).collect();
        assert_eq!(links[..2], [posting(4).link.as_str(), posting(3).link.as_str()]);
    }

    #[test]
    fn prune_cutoff_accepts_positive_days() {
        let now = Utc::now();
        assert_eq!(prune_cutoff(now, 30).unwrap(), now - Duration::days(30));
    }

    #[test]
    fn prune_cutoff_rejects_zero_negative_and_huge_ages() {
        let now = Utc::now();
        for days in [0, -5, 200_000_000, i64::MAX] {
            assert!(prune_cutoff(now, days).is_err(), "{days} days accepted");
        }
    }
}

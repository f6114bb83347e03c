use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::Utc;
use clap::Parser;
use log::info;

use job_digest::config::Config;
use job_digest::db::prune_cutoff;
use job_digest::feed::http_client;
use job_digest::logger::{self, LogConfig};
use job_digest::notify::SmtpMailer;
use job_digest::{Aggregator, ArchiveSink, Database, Event, FeedFetcher, Handler, MemoryStore, Notifier, SeenStore};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML configuration file
    #[arg(short, long, default_value = "job-digest.yaml")]
    config: PathBuf,

    /// Value of the request `accept` header, e.g. "application/json"
    #[arg(short, long)]
    accept: Option<String>,

    /// Print the N most recently recorded postings and exit
    #[arg(short, long)]
    list: Option<u32>,

    /// Delete recorded postings first seen more than DAYS ago and exit
    #[arg(long, value_name = "DAYS")]
    prune_days: Option<i64>,

    /// Nothing outlives the run: in-memory dedup store, archive kept in the
    /// temp dir, no email
    #[arg(long)]
    dry_run: bool,

    #[arg(long, default_value = "info")]
    log_level: String,

    #[arg(long)]
    log_file: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    logger::init(LogConfig {
        console_level: logger::parse_log_level(&args.log_level),
        log_file: args.log_file.clone(),
        ..LogConfig::default()
    })?;

    let config = Config::load(&args.config)?;

    if args.list.is_some() || args.prune_days.is_some() {
        let db = Database::connect(&config.database.url, &config.database.table).await?;

        if let Some(days) = args.prune_days {
            let removed = db.prune(prune_cutoff(Utc::now(), days)?).await?;
            println!("Pruned {} postings older than {} days", removed, days);
        }

        if let Some(limit) = args.list {
            println!("{} postings recorded:", db.count().await?);
            for seen in db.recent(limit).await? {
                println!(
                    "{} | {} | {} | {}",
                    seen.first_seen.format("%Y-%m-%d %H:%M:%S"),
                    seen.title,
                    seen.link,
                    seen.source
                );
            }
        }
        return Ok(());
    }

    let handler = build_handler(&config, args.dry_run).await?;

    let mut event = Event::default();
    if let Some(accept) = &args.accept {
        event = event.with_header("accept", accept);
    }

    let response = handler.handle(&event).await;
    println!("{}", response.body);

    if response.status_code >= 500 {
        return Err(anyhow!("Invocation failed with status {}", response.status_code));
    }
    info!("Invocation finished with status {}", response.status_code);
    Ok(())
}

async fn build_handler(config: &Config, dry_run: bool) -> Result<Handler> {
    let dry_config;
    let config = if dry_run {
        info!("Dry run, using an in-memory dedup store, a temp archive and no email");
        dry_config = config.for_dry_run();
        &dry_config
    } else {
        config
    };

    let client = http_client(&config.http)?;
    let fetcher = FeedFetcher::new(client.clone());

    let aggregator = if !config.dedup {
        Aggregator::without_dedup(fetcher)
    } else if dry_run {
        Aggregator::new(fetcher, Arc::new(MemoryStore::new()))
    } else {
        let db = Database::connect(&config.database.url, &config.database.table).await?;
        Aggregator::new(fetcher, Arc::new(db))
    };

    let archive = ArchiveSink::from_config(&config.archive, client);

    let notifier = if config.email.enabled {
        let mailer = SmtpMailer::from_config(&config.email)?;
        Some(Notifier::new(Arc::new(mailer), &config.email))
    } else {
        None
    };

    Ok(Handler::new(config, aggregator, archive, notifier))
}

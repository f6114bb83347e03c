use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use log::info;
use serde::{Deserialize, Serialize};

/// What an invocation produces.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Dedup, archive to CSV, email the digest
    #[default]
    Digest,
    /// Render the postings as an RSS document (or JSON on request)
    Feed,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub mode: Mode,
    /// When false, every fetched posting counts as new and nothing is recorded
    #[serde(default = "default_true")]
    pub dedup: bool,
    pub feeds: Vec<String>,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub archive: ArchiveConfig,
    #[serde(default)]
    pub email: EmailConfig,
    #[serde(default)]
    pub channel: ChannelConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct HttpConfig {
    pub user_agent: String,
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: concat!("job-digest/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub table: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:job-digest.db".to_string(),
            table: "job_listings".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct ArchiveConfig {
    /// Where the CSV is written before upload; the OS temp dir when unset
    pub scratch_dir: Option<PathBuf>,
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StoreConfig {
    Http {
        bucket: String,
        /// Base URL objects are PUT to, e.g. "https://my-bucket.s3.amazonaws.com"
        endpoint: String,
        public_base_url: Option<String>,
    },
    Local {
        dir: PathBuf,
        public_base_url: Option<String>,
    },
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig::Local {
            dir: PathBuf::from("archive"),
            public_base_url: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct EmailConfig {
    pub enabled: bool,
    pub smtp_host: String,
    pub smtp_port: Option<u16>,
    /// Names of the environment variables holding the SMTP credentials
    pub username_env: String,
    pub password_env: String,
    pub sender: String,
    pub recipients: Vec<String>,
    pub subject: String,
    pub max_entries: usize,
    /// Log delivery failures instead of failing the invocation
    pub isolate_failures: bool,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            smtp_host: "localhost".to_string(),
            smtp_port: None,
            username_env: "SMTP_USER".to_string(),
            password_env: "SMTP_PASS".to_string(),
            sender: String::new(),
            recipients: Vec::new(),
            subject: "New Job Listings Available!".to_string(),
            max_entries: 10,
            isolate_failures: true,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ChannelConfig {
    pub title: String,
    pub link: String,
    pub description: String,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            title: "Job Listings".to_string(),
            link: "http://localhost/jobs/rss".to_string(),
            description: "Aggregated job listings".to_string(),
        }
    }
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from a YAML file
    pub fn load(path: &Path) -> Result<Self> {
        info!("Loading configuration from {}", path.display());

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = Self::from_yaml(&contents)
            .with_context(|| format!("Invalid config file {}", path.display()))?;

        info!("Loaded {} feeds, mode {:?}", config.feeds.len(), config.mode);
        Ok(config)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Same settings, but nothing outlives the run: the archive goes to a
    /// scratch directory and no email is sent.
    pub fn for_dry_run(&self) -> Self {
        let mut config = self.clone();
        config.archive.store = StoreConfig::Local {
            dir: std::env::temp_dir().join("job-digest-dry-run"),
            public_base_url: None,
        };
        config.email.enabled = false;
        config
    }

    fn validate(&self) -> Result<()> {
        if self.feeds.is_empty() {
            return Err(anyhow!("No feeds configured"));
        }
        if self.email.enabled {
            if self.email.sender.is_empty() {
                return Err(anyhow!("email.sender is required when email is enabled"));
            }
            if self.email.recipients.is_empty() {
                return Err(anyhow!("email.recipients is required when email is enabled"));
            }
        }
        Ok(())
    }
}

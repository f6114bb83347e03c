use thiserror::Error;

/// Failure of a single feed. Never crosses the fetcher's batch boundary.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("HTTP status {0}")]
    Status(reqwest::StatusCode),

    #[error("Malformed feed XML: {0}")]
    Malformed(String),
}

impl From<quick_xml::Error> for FetchError {
    fn from(e: quick_xml::Error) -> Self {
        FetchError::Malformed(e.to_string())
    }
}

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Failed to write CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Upload of {name} failed: {reason}")]
    Upload { name: String, reason: String },
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Invalid mailbox '{0}'")]
    Address(String),

    #[error("Failed to build email: {0}")]
    Build(#[from] lettre::error::Error),

    #[error("SMTP delivery failed: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

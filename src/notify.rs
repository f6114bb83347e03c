use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use lettre::message::{Mailbox, Message, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::AsyncSmtpTransport;
use lettre::{AsyncTransport, Tokio1Executor};
use log::{debug, error, info};
use quick_xml::escape::escape;

use crate::config::EmailConfig;
use crate::error::NotifyError;
use crate::models::Posting;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub html: String,
    pub text: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &Email) -> Result<(), NotifyError>;
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    /// Build an SMTP relay. Credentials are read from the environment
    /// variables named in the config; without them the relay is used anonymously.
    pub fn from_config(config: &EmailConfig) -> Result<Self> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
            .with_context(|| format!("Invalid SMTP host {}", config.smtp_host))?;

        if let Some(port) = config.smtp_port {
            builder = builder.port(port);
        }

        match (
            std::env::var(&config.username_env),
            std::env::var(&config.password_env),
        ) {
            (Ok(user), Ok(pass)) => {
                builder = builder.credentials(Credentials::new(user, pass));
            }
            _ => debug!(
                "{} / {} not set, using SMTP without authentication",
                config.username_env, config.password_env
            ),
        }

        Ok(Self {
            transport: builder.build(),
        })
    }
}

fn mailbox(addr: &str) -> Result<Mailbox, NotifyError> {
    addr.parse()
        .map_err(|_| NotifyError::Address(addr.to_string()))
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: &Email) -> Result<(), NotifyError> {
        let mut builder = Message::builder()
            .from(mailbox(&email.from)?)
            .subject(email.subject.clone());
        for to in &email.to {
            builder = builder.to(mailbox(to)?);
        }

        let message = builder.multipart(MultiPart::alternative_plain_html(
            email.text.clone(),
            email.html.clone(),
        ))?;

        self.transport.send(message).await?;
        Ok(())
    }
}

/// Rendered bodies of a digest email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Digest {
    pub html: String,
    pub text: String,
}

/// Render at most `max_entries` postings as HTML and plain text.
pub fn render_digest(postings: &[Posting], archive_url: Option<&str>, max_entries: usize) -> Digest {
    let shown = &postings[..postings.len().min(max_entries)];
    let hidden = postings.len() - shown.len();

    let items: String = shown
        .iter()
        .map(|p| {
            format!(
                "<li><strong>{title}</strong> - <a href='{link}' target='_blank'>Apply Now</a> (Posted: {date})<br>\
                 <small>Source: <a href='{source}' target='_blank'>{source}</a></small></li>",
                title = escape(p.title.as_str()),
                link = escape(p.link.as_str()),
                date = escape(p.published_at.as_str()),
                source = escape(p.source.as_str()),
            )
        })
        .collect();

    let mut footer = String::new();
    if hidden > 0 {
        footer.push_str(&format!("<p>...and {} more.</p>", hidden));
    }
    if let Some(url) = archive_url {
        footer.push_str(&format!(
            "<p><a href=\"{}\" target=\"_blank\">Download Full Job List (CSV)</a></p>",
            escape(url)
        ));
    }

    let html = format!(
        r#"<html>
<head>
<style>
body {{ font-family: Arial, sans-serif; }}
ul {{ padding: 0; list-style-type: none; }}
li {{ margin-bottom: 8px; }}
small {{ color: gray; }}
</style>
</head>
<body>
<h2>New Job Listings Available!</h2>
<p>The latest job opportunities have been collected from multiple sources:</p>
<ul>
{items}
</ul>
{footer}
</body>
</html>
"#
    );

    let mut text = String::from("New job listings available!\n\n");
    for p in shown {
        text.push_str(&format!(
            "- {} (Posted: {})\n  {}\n  Source: {}\n",
            p.title, p.published_at, p.link, p.source
        ));
    }
    if hidden > 0 {
        text.push_str(&format!("...and {} more.\n", hidden));
    }
    if let Some(url) = archive_url {
        text.push_str(&format!("\nFull job list (CSV): {}\n", url));
    }

    Digest { html, text }
}

/// Emails the digest of new postings.
pub struct Notifier {
    mailer: Arc<dyn Mailer>,
    sender: String,
    recipients: Vec<String>,
    subject: String,
    max_entries: usize,
    isolate_failures: bool,
}

impl Notifier {
    pub fn new(mailer: Arc<dyn Mailer>, config: &EmailConfig) -> Self {
        Self {
            mailer,
            sender: config.sender.clone(),
            recipients: config.recipients.clone(),
            subject: config.subject.clone(),
            max_entries: config.max_entries,
            isolate_failures: config.isolate_failures,
        }
    }

    /// Send the digest. Nothing is sent for an empty list.
    ///
    /// Delivery errors are only returned when failures are not isolated.
    pub async fn notify(&self, postings: &[Posting], archive_url: Option<&str>) -> Result<(), NotifyError> {
        if postings.is_empty() {
            info!("No new postings, skipping email notification");
            return Ok(());
        }

        let digest = render_digest(postings, archive_url, self.max_entries);
        let email = Email {
            from: self.sender.clone(),
            to: self.recipients.clone(),
            subject: format!("{} - {}", self.subject, Utc::now().format("%Y-%m-%d")),
            html: digest.html,
            text: digest.text,
        };

        match self.mailer.send(&email).await {
            Ok(()) => {
                info!("Sent digest of {} postings to {}", postings.len(), self.recipients.join(", "));
                Ok(())
            }
            Err(e) if self.isolate_failures => {
                error!("Failed to send digest email: {}", e);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

//! Task source client: reads the chores feed from the sheet endpoint and
//! performs the mark-done write-back.

use anyhow::{Context, Result};
use reqwest::header::CACHE_CONTROL;
use serde::Deserialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;
use tracing::debug;

use crate::types::{Task, TaskFeed};

/// Endpoint configuration loaded from environment.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    /// Base URL of the sheet endpoint
    pub api: String,
    /// Write token; without it the dashboard is read-only
    pub token: Option<String>,
}

impl SourceConfig {
    /// Load configuration from environment variables.
    ///
    /// Expects `FACCENDE_API` to be set, either in the environment or in
    /// a `.env` file. `FACCENDE_TOKEN` is optional and only needed for
    /// the mark-done write-back.
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let api = std::env::var("FACCENDE_API")
            .context("FACCENDE_API environment variable not set")?;
        let token = std::env::var("FACCENDE_TOKEN").ok().filter(|t| !t.is_empty());

        Ok(Self { api, token })
    }
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("task source returned a non-JSON body")]
    NonJson(#[source] serde_json::Error),

    #[error("write-back rejected: {0}")]
    Rejected(String),

    #[error("invalid sheet row: {0}")]
    BadRow(i64),

    #[error("FACCENDE_TOKEN is not set; write-back is disabled")]
    MissingToken,
}

/// Write-back response shape: `{ ok: boolean, error?: string }`.
#[derive(Debug, Deserialize)]
struct DoneResponse {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

/// HTTP client for the sheet endpoint.
///
/// Keeps a process-wide count of in-flight requests so the UI can show a
/// loading affordance while anything is pending.
#[derive(Debug)]
pub struct TaskSource {
    client: reqwest::Client,
    config: SourceConfig,
    in_flight: AtomicUsize,
}

/// Decrements the gauge when the request finishes, success or not.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl TaskSource {
    pub fn new(config: SourceConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            in_flight: AtomicUsize::new(0),
        }
    }

    /// Requests currently on the wire.
    pub fn pending_requests(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    fn track(&self) -> InFlight<'_> {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        InFlight(&self.in_flight)
    }

    /// Cache-busting query pair; the sheet endpoint sits behind caches
    /// that ignore Cache-Control on GET.
    fn bust() -> (&'static str, String) {
        ("_", chrono::Utc::now().timestamp_millis().to_string())
    }

    /// Fetch and validate the current task list.
    pub async fn fetch_tasks(&self) -> Result<Vec<Task>, SourceError> {
        let _guard = self.track();

        let body = self
            .client
            .get(&self.config.api)
            .query(&[Self::bust()])
            .header(CACHE_CONTROL, "no-store")
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let tasks = parse_feed(&body)?;
        debug!(count = tasks.len(), "Fetched tasks");
        Ok(tasks)
    }

    /// Record today's date against a sheet row:
    /// `GET {api}?action=done&row=<n>&token=<tok>`.
    pub async fn mark_done(&self, row: i64) -> Result<(), SourceError> {
        if row < 1 {
            return Err(SourceError::BadRow(row));
        }
        let token = self.config.token.as_deref().ok_or(SourceError::MissingToken)?;

        let _guard = self.track();

        let body = self
            .client
            .get(&self.config.api)
            .query(&[
                ("action", "done"),
                ("row", &row.to_string()),
                ("token", token),
            ])
            .query(&[Self::bust()])
            .header(CACHE_CONTROL, "no-store")
            .send()
            .await?
            .text()
            .await?;

        parse_done(&body)?;
        debug!(row, "Marked done");
        Ok(())
    }
}

/// Parse the `{ tasks: [...] }` feed, dropping junk rows: entries without
/// a task name and entries without a positive `freq` are padding in the
/// sheet, not chores.
pub fn parse_feed(body: &str) -> Result<Vec<Task>, SourceError> {
    let feed: TaskFeed = serde_json::from_str(body).map_err(SourceError::NonJson)?;
    Ok(feed
        .tasks
        .iter()
        .filter_map(Task::from_raw)
        .filter(|t| t.freq.map(|f| f > 0.0).unwrap_or(false))
        .collect())
}

/// Parse a write-back response body.
fn parse_done(body: &str) -> Result<(), SourceError> {
    let resp: DoneResponse = serde_json::from_str(body).map_err(SourceError::NonJson)?;
    if resp.ok {
        Ok(())
    } else {
        Err(SourceError::Rejected(
            resp.error.unwrap_or_else(|| "unknown error".to_string()),
        ))
    }
}

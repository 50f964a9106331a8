//! Delivering the monthly CSV through the chat-bot channel.

use std::path::Path;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::dates::Month;
use crate::errors::PipelineError;

const DEFAULT_API_BASE: &str = "https://api.telegram.org";
const SEND_TIMEOUT: Duration = Duration::from_secs(60);

/// Retry schedule for document delivery: up to `max_attempts`, sleeping
/// `backoff_base^attempt` seconds between attempts.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: 2,
        }
    }
}

pub struct ReportNotifier {
    http: reqwest::Client,
    token: String,
    chat_id: String,
    api_base: String,
    retry: RetryPolicy,
}

impl ReportNotifier {
    pub fn new(token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            token: token.into(),
            chat_id: chat_id.into(),
            api_base: DEFAULT_API_BASE.to_string(),
            retry: RetryPolicy::default(),
        }
    }

    /// Point the notifier at a different API endpoint (local stub, proxy).
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Upload the artifact with a month/row-count caption.
    ///
    /// Returns `false` after exhausting the retry schedule; delivery failure
    /// is reported, not fatal. The artifact stays on local storage as the
    /// fallback record.
    pub async fn send_report(&self, file: &Path, month: Month, total_rows: usize) -> bool {
        let caption = format!(
            "[monthly call report]\nmonth: {month}\nrows: {total_rows}\nstatus: SUCCESS"
        );
        let url = format!("{}/bot{}/sendDocument", self.api_base, self.token);

        for attempt in 1..=self.retry.max_attempts {
            match self.try_send(&url, &caption, file).await {
                Ok(()) => {
                    info!(
                        "report delivered: {} (attempt {attempt})",
                        file.display()
                    );
                    return true;
                }
                Err(e) => {
                    warn!(
                        "report delivery failed (attempt {attempt}/{}): {e}",
                        self.retry.max_attempts
                    );
                    if attempt < self.retry.max_attempts {
                        let wait = self.retry.backoff_base.pow(attempt);
                        info!("retrying in {wait}s");
                        tokio::time::sleep(Duration::from_secs(wait)).await;
                    }
                }
            }
        }

        error!(
            "report delivery exhausted retries; CSV kept locally: {}",
            file.display()
        );
        false
    }

    async fn try_send(&self, url: &str, caption: &str, file: &Path) -> Result<(), PipelineError> {
        let bytes = tokio::fs::read(file).await?;
        let filename = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "report.csv".to_string());

        let document = reqwest::multipart::Part::bytes(bytes)
            .file_name(filename)
            .mime_str("text/csv")?;
        let form = reqwest::multipart::Form::new()
            .text("chat_id", self.chat_id.clone())
            .text("caption", caption.to_string())
            .part("document", document);

        let response = self
            .http
            .post(url)
            .multipart(form)
            .timeout(SEND_TIMEOUT)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::Report(format!("HTTP {status}")));
        }
        let body: serde_json::Value = response.json().await?;
        if body.get("ok").and_then(|v| v.as_bool()) != Some(true) {
            return Err(PipelineError::Report(format!("API error: {body}")));
        }
        Ok(())
    }
}

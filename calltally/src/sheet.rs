//! Reconciling day records into the durable sheet.
//!
//! The sheet is the store of record, keyed by (date, employee code). The
//! reconciliation is planned in memory against a snapshot of the table, then
//! applied as one update batch and one append batch, so replaying a day never
//! duplicates rows.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::dates::Month;
use crate::errors::PipelineError;
use crate::records::{DayRecord, SHEET_HEADER};

/// First sheet row (1-based) holding data; row 1 is the header.
const DATA_START_ROW: usize = 2;

/// An in-place replacement of one existing sheet row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowUpdate {
    /// 1-based sheet row.
    pub row: usize,
    pub values: Vec<String>,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct UpsertPlan {
    pub updates: Vec<RowUpdate>,
    pub appends: Vec<Vec<String>>,
}

impl UpsertPlan {
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty() && self.appends.is_empty()
    }

    pub fn len(&self) -> usize {
        self.updates.len() + self.appends.len()
    }
}

/// Partition `records` against the existing data rows (header excluded).
///
/// A record whose key matches an existing row replaces that row in place;
/// the rest append in input order.
pub fn plan_upsert(existing: &[Vec<String>], records: &[DayRecord]) -> UpsertPlan {
    let mut key_to_row: HashMap<(String, String), usize> = HashMap::new();
    for (i, row) in existing.iter().enumerate() {
        if row.len() >= 2 {
            key_to_row.insert((row[0].clone(), row[1].clone()), DATA_START_ROW + i);
        }
    }

    // A key repeated within one batch keeps its first position with the last
    // value, so the one-row-per-key guarantee holds before anything is sent.
    let mut deduped: Vec<&DayRecord> = Vec::new();
    let mut seen: HashMap<(String, String), usize> = HashMap::new();
    for record in records {
        let key = (record.date.to_string(), record.employee_code.clone());
        match seen.get(&key) {
            Some(&i) => deduped[i] = record,
            None => {
                seen.insert(key, deduped.len());
                deduped.push(record);
            }
        }
    }

    let mut plan = UpsertPlan::default();
    for record in deduped {
        let key = (record.date.to_string(), record.employee_code.clone());
        let values = record.to_row();
        match key_to_row.get(&key) {
            Some(&row) => plan.updates.push(RowUpdate { row, values }),
            None => plan.appends.push(values),
        }
    }
    plan
}

/// The durable month-keyed table the pipeline reconciles into.
#[async_trait]
pub trait SheetStore: Send + Sync {
    /// Full table for `month`, header included, creating the tab (with the
    /// fixed header) when it does not exist yet.
    async fn get_all_values(&self, month: Month) -> Result<Vec<Vec<String>>, PipelineError>;

    async fn batch_update(
        &self,
        month: Month,
        updates: &[RowUpdate],
    ) -> Result<(), PipelineError>;

    async fn append_rows(&self, month: Month, rows: &[Vec<String>]) -> Result<(), PipelineError>;
}

/// Reconcile `records` into the month table. Returns the number of rows
/// written. Idempotent: replaying the same records changes nothing.
pub async fn upsert(
    store: &dyn SheetStore,
    month: Month,
    records: &[DayRecord],
) -> Result<usize, PipelineError> {
    if records.is_empty() {
        info!("[{month}] nothing to upsert");
        return Ok(0);
    }

    let all = store.get_all_values(month).await?;
    let existing = if all.len() > 1 { &all[1..] } else { &[] };
    let plan = plan_upsert(existing, records);

    if !plan.updates.is_empty() {
        store.batch_update(month, &plan.updates).await?;
        debug!("[{month}] updated {} rows in place", plan.updates.len());
    }
    if !plan.appends.is_empty() {
        store.append_rows(month, &plan.appends).await?;
        debug!("[{month}] appended {} new rows", plan.appends.len());
    }

    info!("[{month}] upsert complete - {} rows", plan.len());
    Ok(plan.len())
}

/// Every data row of the month table, header excluded. Used only for the
/// final export; no filtering.
pub async fn read_all(
    store: &dyn SheetStore,
    month: Month,
) -> Result<Vec<Vec<String>>, PipelineError> {
    let all = store.get_all_values(month).await?;
    if all.len() <= 1 {
        return Ok(Vec::new());
    }
    Ok(all[1..].to_vec())
}

// ---------------------------------------------------------------------------
// Google Sheets implementation
// ---------------------------------------------------------------------------

const SHEETS_API_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";
const TOKEN_LIFETIME_SECS: i64 = 3600;

#[derive(Debug, Deserialize)]
struct ServiceAccountKey {
    client_email: String,
    private_key: String,
    token_uri: String,
}

#[derive(Serialize)]
struct TokenClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

struct CachedToken {
    value: String,
    expires_at: std::time::Instant,
}

/// Sheet store backed by the Google Sheets REST API with service-account
/// authentication.
pub struct GoogleSheetStore {
    http: reqwest::Client,
    spreadsheet_id: String,
    key: ServiceAccountKey,
    token: tokio::sync::Mutex<Option<CachedToken>>,
    api_base: String,
}

impl GoogleSheetStore {
    pub fn from_key_file(
        path: &std::path::Path,
        spreadsheet_id: impl Into<String>,
    ) -> Result<Self, PipelineError> {
        let raw = std::fs::read_to_string(path)?;
        let key: ServiceAccountKey = serde_json::from_str(&raw)?;
        Ok(Self {
            http: reqwest::Client::new(),
            spreadsheet_id: spreadsheet_id.into(),
            key,
            token: tokio::sync::Mutex::new(None),
            api_base: SHEETS_API_BASE.to_string(),
        })
    }

    /// Point the store at a different API endpoint (local stub, proxy).
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    async fn access_token(&self) -> Result<String, PipelineError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > std::time::Instant::now() {
                return Ok(token.value.clone());
            }
        }

        let now = chrono::Utc::now().timestamp();
        let claims = TokenClaims {
            iss: &self.key.client_email,
            scope: SHEETS_SCOPE,
            aud: &self.key.token_uri,
            iat: now,
            exp: now + TOKEN_LIFETIME_SECS,
        };
        let jwt = jsonwebtoken::encode(
            &jsonwebtoken::Header::new(jsonwebtoken::Algorithm::RS256),
            &claims,
            &jsonwebtoken::EncodingKey::from_rsa_pem(self.key.private_key.as_bytes())
                .map_err(|e| PipelineError::Sheet(format!("bad service-account key: {e}")))?,
        )
        .map_err(|e| PipelineError::Sheet(format!("token signing failed: {e}")))?;

        let response = self
            .http
            .post(&self.key.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", jwt.as_str()),
            ])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(PipelineError::Sheet(format!(
                "token endpoint returned {}",
                response.status()
            )));
        }
        let token: TokenResponse = response.json().await?;

        let lifetime = token.expires_in.unwrap_or(TOKEN_LIFETIME_SECS).max(60) as u64;
        let value = token.access_token.clone();
        *cached = Some(CachedToken {
            value: token.access_token,
            // Refresh a minute early
            expires_at: std::time::Instant::now() + std::time::Duration::from_secs(lifetime - 60),
        });
        Ok(value)
    }

    fn values_url(&self, range: &str) -> String {
        format!(
            "{}/{}/values/{}",
            self.api_base,
            self.spreadsheet_id,
            urlencode(range)
        )
    }

    fn month_range(month: Month) -> String {
        format!("'{month}'!A:F")
    }

    async fn check(response: reqwest::Response, what: &str) -> Result<reqwest::Response, PipelineError> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(PipelineError::Sheet(format!("{what} failed: {status} {body}")))
        }
    }

    /// Create the month tab with its header when it does not exist yet.
    async fn ensure_month_tab(&self, month: Month) -> Result<(), PipelineError> {
        let token = self.access_token().await?;
        let meta_url = format!(
            "{}/{}?fields=sheets.properties.title",
            self.api_base, self.spreadsheet_id
        );
        let response = self
            .http
            .get(&meta_url)
            .bearer_auth(&token)
            .send()
            .await?;
        let meta: serde_json::Value = Self::check(response, "spreadsheet metadata")
            .await?
            .json()
            .await?;

        let title = month.to_string();
        let exists = meta["sheets"]
            .as_array()
            .map(|sheets| {
                sheets
                    .iter()
                    .any(|s| s["properties"]["title"].as_str() == Some(title.as_str()))
            })
            .unwrap_or(false);
        if exists {
            return Ok(());
        }

        info!("creating sheet tab {title}");
        let add_url = format!("{}/{}:batchUpdate", self.api_base, self.spreadsheet_id);
        let body = serde_json::json!({
            "requests": [{ "addSheet": { "properties": { "title": title } } }]
        });
        let response = self
            .http
            .post(&add_url)
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await?;
        Self::check(response, "addSheet").await?;

        let header_url = format!(
            "{}?valueInputOption=RAW",
            self.values_url(&format!("'{month}'!A1:F1"))
        );
        let header: Vec<&str> = SHEET_HEADER.to_vec();
        let body = serde_json::json!({ "values": [header] });
        let response = self
            .http
            .put(&header_url)
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await?;
        Self::check(response, "header write").await?;
        Ok(())
    }
}

#[async_trait]
impl SheetStore for GoogleSheetStore {
    async fn get_all_values(&self, month: Month) -> Result<Vec<Vec<String>>, PipelineError> {
        self.ensure_month_tab(month).await?;
        let token = self.access_token().await?;
        let url = self.values_url(&Self::month_range(month));
        let response = self.http.get(&url).bearer_auth(&token).send().await?;
        let body: serde_json::Value = Self::check(response, "values read").await?.json().await?;

        let values = body["values"]
            .as_array()
            .map(|rows| {
                rows.iter()
                    .map(|row| {
                        row.as_array()
                            .map(|cells| {
                                cells
                                    .iter()
                                    .map(|c| c.as_str().unwrap_or_default().to_string())
                                    .collect()
                            })
                            .unwrap_or_default()
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(values)
    }

    async fn batch_update(
        &self,
        month: Month,
        updates: &[RowUpdate],
    ) -> Result<(), PipelineError> {
        let token = self.access_token().await?;
        let url = format!(
            "{}/{}/values:batchUpdate",
            self.api_base, self.spreadsheet_id
        );
        let data: Vec<serde_json::Value> = updates
            .iter()
            .map(|u| {
                serde_json::json!({
                    "range": format!("'{month}'!A{row}:F{row}", row = u.row),
                    "values": [u.values],
                })
            })
            .collect();
        let body = serde_json::json!({ "valueInputOption": "RAW", "data": data });
        let response = self
            .http
            .post(&url)
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await?;
        Self::check(response, "batch update").await?;
        Ok(())
    }

    async fn append_rows(&self, month: Month, rows: &[Vec<String>]) -> Result<(), PipelineError> {
        let token = self.access_token().await?;
        let url = format!(
            "{}:append?valueInputOption=RAW",
            self.values_url(&Self::month_range(month))
        );
        let body = serde_json::json!({ "values": rows });
        let response = self
            .http
            .post(&url)
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await?;
        Self::check(response, "append").await?;
        Ok(())
    }
}

/// Minimal percent-encoding for sheet ranges embedded in URL paths.
fn urlencode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            'A'..='Z' | 'a'..='z' | '0'..='9' | '-' | '_' | '.' | '~' => out.push(c),
            _ => {
                let mut buf = [0u8; 4];
                for byte in c.encode_utf8(&mut buf).as_bytes() {
                    out.push_str(&format!("%{byte:02X}"));
                }
            }
        }
    }
    out
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

/// In-memory sheet store used by the test-suite in place of the live API.
#[derive(Default)]
pub struct MemorySheetStore {
    tabs: std::sync::Mutex<HashMap<String, Vec<Vec<String>>>>,
}

impl MemorySheetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current contents of the month tab, header included.
    pub fn snapshot(&self, month: Month) -> Vec<Vec<String>> {
        self.tabs
            .lock()
            .unwrap()
            .get(&month.to_string())
            .cloned()
            .unwrap_or_default()
    }

    fn with_tab<R>(&self, month: Month, f: impl FnOnce(&mut Vec<Vec<String>>) -> R) -> R {
        let mut tabs = self.tabs.lock().unwrap();
        let tab = tabs.entry(month.to_string()).or_insert_with(|| {
            vec![SHEET_HEADER.iter().map(|h| h.to_string()).collect()]
        });
        f(tab)
    }
}

#[async_trait]
impl SheetStore for MemorySheetStore {
    async fn get_all_values(&self, month: Month) -> Result<Vec<Vec<String>>, PipelineError> {
        Ok(self.with_tab(month, |tab| tab.clone()))
    }

    async fn batch_update(
        &self,
        month: Month,
        updates: &[RowUpdate],
    ) -> Result<(), PipelineError> {
        self.with_tab(month, |tab| {
            for update in updates {
                let index = update.row - 1;
                if index >= tab.len() {
                    tab.resize(index + 1, Vec::new());
                }
                tab[index] = update.values.clone();
            }
        });
        Ok(())
    }

    async fn append_rows(&self, month: Month, rows: &[Vec<String>]) -> Result<(), PipelineError> {
        self.with_tab(month, |tab| {
            tab.extend(rows.iter().cloned());
        });
        Ok(())
    }
}

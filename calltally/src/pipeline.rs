//! The month orchestrator: a checkpointed day-loop with per-day failure
//! isolation, followed by the export/report stage.
//!
//! A date becomes `done` only after its rows are reconciled (or it genuinely
//! had no activity); any step failure marks the date `failed` and the loop
//! moves on. One bad day never aborts the month. The report stage runs even
//! when failed dates remain, on whatever the sink currently holds.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::{error, info, warn};

use crate::checkpoint::{self, CheckpointStore};
use crate::dates::Month;
use crate::errors::PipelineError;
use crate::notify::ReportNotifier;
use crate::records::DayRecord;
use crate::screenshot;
use crate::session::{HostCredentials, ReportSession, SessionTimings, UiProfile};
use crate::sheet::{self, SheetStore};
use crate::workbook::{self, Workbook};
use crate::{csv_export, platforms};

/// Terminal state of one successfully processed date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DayOutcome {
    /// The export had no data rows: a quiet day, not a failure.
    NoActivity,
    /// Rows reconciled into the sink.
    Reconciled { rows: usize },
}

/// Drives one day through query, export and parse.
///
/// The UI side lives behind this seam so the loop's failure-isolation
/// contract stays testable without a desktop.
#[async_trait]
pub trait DayCollector: Send {
    /// Establish the UI session. Called once per run, and only when at least
    /// one date is pending.
    async fn connect(&mut self) -> Result<(), PipelineError>;

    /// Produce one day's records.
    async fn collect(&mut self, date: NaiveDate) -> Result<Vec<DayRecord>, PipelineError>;
}

/// What a month-run accomplished.
#[derive(Debug)]
pub struct RunReport {
    pub month: Month,
    pub done: usize,
    pub failed: usize,
    pub total_rows: usize,
    pub csv_path: Option<PathBuf>,
    pub report_sent: bool,
}

pub struct Pipeline {
    pub checkpoints: CheckpointStore,
    pub sheets: Arc<dyn SheetStore>,
    pub notifier: ReportNotifier,
    pub csv_dir: PathBuf,
    pub screens_dir: PathBuf,
}

impl Pipeline {
    /// Run the day-loop over `dates`, then (unless `skip_report`) the
    /// CSV/report stage.
    pub async fn run(
        &self,
        collector: &mut dyn DayCollector,
        month: Month,
        dates: &[NaiveDate],
        skip_report: bool,
    ) -> Result<RunReport, PipelineError> {
        let mut state = self.checkpoints.load(month);
        let pending = checkpoint::pending_dates(dates, &state);

        if pending.is_empty() {
            info!("[{month}] every date already done - continuing to the export stage");
        } else {
            info!(
                "[{month}] {} of {} dates to process",
                pending.len(),
                dates.len()
            );
            collector.connect().await?;

            for date in pending {
                info!("-- [{date}] starting --");
                match self.process_day(collector, month, date).await {
                    Ok(DayOutcome::NoActivity) => {
                        warn!("[{date}] no rows parsed - marking done");
                        self.checkpoints.mark_done(&mut state, date)?;
                    }
                    Ok(DayOutcome::Reconciled { rows }) => {
                        self.checkpoints.mark_done(&mut state, date)?;
                        info!("[{date}] done ({rows} rows)");
                    }
                    Err(e) => {
                        error!("[{date}] failed: {e}");
                        let _ =
                            screenshot::save_screenshot(&self.screens_dir, &format!("error_{date}"));
                        self.checkpoints.mark_failed(&mut state, date)?;
                    }
                }
            }
        }

        let done = state.done_dates.len();
        let failed = state.failed_dates.len();

        if skip_report {
            info!("[{month}] test mode - skipping CSV/report stage");
            return Ok(RunReport {
                month,
                done,
                failed,
                total_rows: 0,
                csv_path: None,
                report_sent: false,
            });
        }

        if failed > 0 {
            warn!(
                "[{month}] {failed} failed dates remain: {:?}",
                state.failed_dates
            );
        }

        info!("[{month}] CSV export starting");
        let (csv_path, total_rows) = match self.export_stage(month, &mut state).await {
            Ok(out) => out,
            Err(e) => {
                // The checkpoint and sheet are intact; a later run retries.
                error!("[{month}] CSV export failed: {e}");
                return Ok(RunReport {
                    month,
                    done,
                    failed,
                    total_rows: 0,
                    csv_path: None,
                    report_sent: false,
                });
            }
        };

        info!("[{month}] report delivery starting");
        let sent = self
            .notifier
            .send_report(&csv_path, month, total_rows)
            .await;
        state.report_sent = sent;
        self.checkpoints.save(&state)?;

        if sent {
            info!("[{month}] pipeline complete");
        } else {
            error!(
                "[{month}] report delivery failed - CSV kept at {}",
                csv_path.display()
            );
        }

        Ok(RunReport {
            month,
            done,
            failed,
            total_rows,
            csv_path: Some(csv_path),
            report_sent: sent,
        })
    }

    async fn process_day(
        &self,
        collector: &mut dyn DayCollector,
        month: Month,
        date: NaiveDate,
    ) -> Result<DayOutcome, PipelineError> {
        let records = collector.collect(date).await?;
        if records.is_empty() {
            return Ok(DayOutcome::NoActivity);
        }
        let rows = sheet::upsert(self.sheets.as_ref(), month, &records).await?;
        Ok(DayOutcome::Reconciled { rows })
    }

    async fn export_stage(
        &self,
        month: Month,
        state: &mut crate::checkpoint::MonthState,
    ) -> Result<(PathBuf, usize), PipelineError> {
        let rows = sheet::read_all(self.sheets.as_ref(), month).await?;
        let csv_path = csv_export::export_csv(&self.csv_dir, month, &rows)?;
        state.last_export_name = csv_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned());
        self.checkpoints.save(state)?;
        Ok((csv_path, rows.len()))
    }
}

/// The real collector: a [`ReportSession`] plus the companion-workbook
/// reader, created lazily so that runs with nothing pending never touch the
/// platform at all.
pub struct UiDayCollector {
    profile: UiProfile,
    timings: SessionTimings,
    /// `Some` drives the automated login path; `None` attaches to a screen
    /// the operator already opened.
    credentials: Option<HostCredentials>,
    parse_timeout: Duration,
    session: Option<ReportSession>,
    workbook: Option<Arc<dyn Workbook>>,
}

impl UiDayCollector {
    pub fn with_login(
        profile: UiProfile,
        timings: SessionTimings,
        credentials: HostCredentials,
    ) -> Self {
        Self {
            profile,
            timings,
            credentials: Some(credentials),
            parse_timeout: Duration::from_secs(30),
            session: None,
            workbook: None,
        }
    }

    pub fn attached(profile: UiProfile, timings: SessionTimings) -> Self {
        Self {
            profile,
            timings,
            credentials: None,
            parse_timeout: Duration::from_secs(30),
            session: None,
            workbook: None,
        }
    }
}

#[async_trait]
impl DayCollector for UiDayCollector {
    async fn connect(&mut self) -> Result<(), PipelineError> {
        let backend = platforms::create_backend()?;
        let session = match &self.credentials {
            Some(credentials) => {
                ReportSession::login(
                    backend.clone(),
                    self.profile.clone(),
                    self.timings.clone(),
                    credentials,
                )
                .await?
            }
            None => {
                ReportSession::connect(
                    backend.clone(),
                    self.profile.clone(),
                    self.timings.clone(),
                )
                .await?
            }
        };
        self.workbook = Some(workbook::create_workbook(backend)?);
        self.session = Some(session);
        Ok(())
    }

    async fn collect(&mut self, date: NaiveDate) -> Result<Vec<DayRecord>, PipelineError> {
        let not_connected = || {
            crate::errors::DriverError::UnsupportedOperation(
                "collector used before connect()".to_string(),
            )
        };
        let session = self.session.as_ref().ok_or_else(not_connected)?;
        let book = self.workbook.clone().ok_or_else(not_connected)?;

        session.query_date(date).await?;
        session.open_export().await?;

        let timeout = self.parse_timeout;
        let records = tokio::task::spawn_blocking(move || {
            let parsed = workbook::parse_day(book.as_ref(), date, timeout);
            if parsed.is_ok() {
                book.close_discard();
            }
            parsed
        })
        .await
        .map_err(|e| {
            crate::errors::DriverError::PlatformError(format!("parse task join error: {e}"))
        })??;

        Ok(records)
    }
}

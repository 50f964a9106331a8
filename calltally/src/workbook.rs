//! Reading the transient spreadsheet the host opens on export.
//!
//! The export lands in a companion spreadsheet application, not in a file, so
//! the parser talks to a live document: wait for it to appear, swat away the
//! licensing dialog the host sometimes raises, read the grid, close without
//! saving.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::controls::UiBackend;
use crate::errors::DriverError;
use crate::records::DayRecord;

/// Source column layout of the export, zero-based.
pub mod col {
    pub const CODE: usize = 0;
    pub const NAME: usize = 1;
    /// Inbound, split by caller type.
    pub const INBOUND_A: usize = 2;
    pub const INBOUND_B: usize = 3;
    /// Outbound, split the same way.
    pub const OUTBOUND_A: usize = 4;
    pub const OUTBOUND_B: usize = 5;
}

/// Header rows preceding the data.
pub const HEADER_ROWS: usize = 1;

/// A live exported document in the companion spreadsheet application.
pub trait Workbook: Send + Sync {
    /// Block until an active document is available, up to `timeout`.
    fn wait_ready(&self, timeout: Duration) -> Result<(), DriverError>;

    /// Dismiss an activation/licensing dialog if the host raised one.
    /// Best-effort; never blocks forward progress.
    fn dismiss_activation_dialog(&self);

    /// Number of populated rows, header included.
    fn row_count(&self) -> Result<usize, DriverError>;

    /// Cell value at (row, col), zero-based. `None` for a blank cell.
    fn cell(&self, row: usize, col: usize) -> Result<Option<String>, DriverError>;

    /// Close the active document discarding changes. Best-effort.
    fn close_discard(&self);
}

/// Lenient numeric read: blank or unparsable cells count as zero, with a
/// warning for the unparsable case. Thousands separators are tolerated.
pub(crate) fn lenient_count(value: Option<&str>, cell_ref: &str) -> u32 {
    let raw = match value {
        Some(v) if !v.trim().is_empty() => v.trim(),
        _ => return 0,
    };
    match raw.replace(',', "").parse::<f64>() {
        Ok(n) if n >= 0.0 => n as u32,
        Ok(n) => {
            warn!("negative count at {cell_ref} ({n}); treated as 0");
            0
        }
        Err(_) => {
            warn!("unparsable count at {cell_ref} ({raw:?}); treated as 0");
            0
        }
    }
}

/// Extract one day's records from the open export.
///
/// The calendar date is always `date`; the export's own date column is never
/// trusted. Rows with both identity columns blank are summary rows and are
/// skipped. An export with no data rows is a legitimate no-activity day and
/// yields an empty list.
pub fn parse_day(
    book: &dyn Workbook,
    date: NaiveDate,
    timeout: Duration,
) -> Result<Vec<DayRecord>, DriverError> {
    info!("[{date}] parsing export");

    book.wait_ready(timeout)?;
    book.dismiss_activation_dialog();

    let last_row = book.row_count()?;
    debug!("[{date}] export rows: {last_row}");
    if last_row <= HEADER_ROWS {
        warn!("[{date}] export has no data rows ({last_row} total)");
        return Ok(Vec::new());
    }

    let mut records = Vec::new();
    let mut skipped = 0usize;

    for row in HEADER_ROWS..last_row {
        let code = book
            .cell(row, col::CODE)?
            .map(|v| v.trim().to_string())
            .unwrap_or_default();
        let name = book
            .cell(row, col::NAME)?
            .map(|v| v.trim().to_string())
            .unwrap_or_default();

        if code.is_empty() && name.is_empty() {
            skipped += 1;
            continue;
        }

        let count_at = |column: usize, label: &str| -> Result<u32, DriverError> {
            let value = book.cell(row, column)?;
            Ok(lenient_count(
                value.as_deref(),
                &format!("{label}{}", row + 1),
            ))
        };
        let inbound = count_at(col::INBOUND_A, "C")? + count_at(col::INBOUND_B, "D")?;
        let outbound = count_at(col::OUTBOUND_A, "E")? + count_at(col::OUTBOUND_B, "F")?;

        records.push(DayRecord::new(date, code, name, inbound, outbound));
    }

    info!(
        "[{date}] parsed {} rows ({skipped} skipped)",
        records.len()
    );
    Ok(records)
}

/// Create the platform workbook reader bound to `backend`.
pub fn create_workbook(backend: Arc<dyn UiBackend>) -> Result<Arc<dyn Workbook>, DriverError> {
    #[cfg(target_os = "windows")]
    {
        Ok(Arc::new(UiaWorkbook::new(backend)))
    }
    #[cfg(not(target_os = "windows"))]
    {
        let _ = backend;
        Err(DriverError::UnsupportedPlatform(
            "the companion spreadsheet application is only driven on Windows".into(),
        ))
    }
}

/// Reads the companion spreadsheet through the same accessibility backend
/// that drives the host application.
#[cfg(target_os = "windows")]
pub struct UiaWorkbook {
    backend: Arc<dyn UiBackend>,
    title_pattern: String,
    grid: std::sync::Mutex<Option<Vec<Vec<Option<String>>>>>,
}

#[cfg(target_os = "windows")]
impl UiaWorkbook {
    pub fn new(backend: Arc<dyn UiBackend>) -> Self {
        Self {
            backend,
            title_pattern: r".*Excel.*|.*Spreadsheet.*".to_string(),
            grid: std::sync::Mutex::new(None),
        }
    }

    fn window(&self) -> Result<crate::controls::Control, DriverError> {
        self.backend
            .find_window(&self.title_pattern, Duration::from_millis(500))
    }

    /// Snapshot the sheet grid once per document; cell reads through the
    /// accessibility tree are too slow to repeat per cell.
    fn snapshot(&self) -> Result<Vec<Vec<Option<String>>>, DriverError> {
        if let Some(grid) = self.grid.lock().unwrap().as_ref() {
            return Ok(grid.clone());
        }

        let window = self.window()?;
        let table = self.backend.find(
            Some(&window),
            &crate::selector::Selector::role("table"),
            Duration::from_secs(5),
        )?;

        let mut rows = Vec::new();
        for row in table.children()? {
            if !row.role().eq_ignore_ascii_case("dataitem")
                && !row.role().eq_ignore_ascii_case("custom")
            {
                continue;
            }
            let mut cells = Vec::new();
            for cell in row.children()? {
                let value = cell.text().ok().filter(|v| !v.is_empty());
                cells.push(value);
            }
            rows.push(cells);
        }

        *self.grid.lock().unwrap() = Some(rows.clone());
        Ok(rows)
    }
}

#[cfg(target_os = "windows")]
impl Workbook for UiaWorkbook {
    fn wait_ready(&self, timeout: Duration) -> Result<(), DriverError> {
        let deadline = std::time::Instant::now() + timeout;
        while std::time::Instant::now() < deadline {
            if self.window().is_ok() {
                debug!("companion spreadsheet document detected");
                return Ok(());
            }
            std::thread::sleep(Duration::from_millis(500));
        }
        Err(DriverError::Timeout(format!(
            "companion spreadsheet did not open within {timeout:?}"
        )))
    }

    fn dismiss_activation_dialog(&self) {
        let window = match self.window() {
            Ok(w) => w,
            Err(_) => return,
        };
        let others = match self.backend.process_windows(&window) {
            Ok(wins) => wins,
            Err(e) => {
                debug!("activation dialog scan failed (ignored): {e}");
                return;
            }
        };
        for dialog in others {
            if dialog.name() == window.name() {
                continue;
            }
            let close = self.backend.find(
                Some(&dialog),
                &crate::selector::Selector::TitlePattern(r".*Close.*".into()),
                Duration::from_millis(500),
            );
            if let Ok(button) = close {
                match button.click() {
                    Ok(()) => {
                        info!("activation dialog dismissed");
                        return;
                    }
                    Err(e) => debug!("activation dialog close failed (ignored): {e}"),
                }
            }
        }
    }

    fn row_count(&self) -> Result<usize, DriverError> {
        Ok(self.snapshot()?.len())
    }

    fn cell(&self, row: usize, column: usize) -> Result<Option<String>, DriverError> {
        let grid = self.snapshot()?;
        Ok(grid.get(row).and_then(|r| r.get(column)).cloned().flatten())
    }

    fn close_discard(&self) {
        *self.grid.lock().unwrap() = None;
        let window = match self.window() {
            Ok(w) => w,
            Err(_) => return,
        };
        // Ctrl+W, then decline the save prompt if one appears.
        if let Err(e) = window.press_key("^w") {
            warn!("spreadsheet close failed (ignored): {e}");
            return;
        }
        std::thread::sleep(Duration::from_millis(500));
        if let Ok(button) = self.backend.find(
            Some(&window),
            &crate::selector::Selector::TitlePattern(r".*Don'?t Save.*".into()),
            Duration::from_millis(500),
        ) {
            if let Err(e) = button.click() {
                debug!("save prompt decline failed (ignored): {e}");
            }
        }
        debug!("spreadsheet closed without saving");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    /// Scripted workbook backed by a plain grid.
    struct GridWorkbook {
        rows: Vec<Vec<Option<String>>>,
        ready: bool,
        closed: Mutex<bool>,
    }

    impl GridWorkbook {
        fn new(rows: Vec<Vec<Option<&str>>>) -> Self {
            Self {
                rows: rows
                    .into_iter()
                    .map(|r| r.into_iter().map(|c| c.map(str::to_string)).collect())
                    .collect(),
                ready: true,
                closed: Mutex::new(false),
            }
        }

        fn header() -> Vec<Option<&'static str>> {
            vec![
                Some("Code"),
                Some("Name"),
                Some("Cust In"),
                Some("Agent In"),
                Some("Cust Out"),
                Some("Agent Out"),
            ]
        }
    }

    impl Workbook for GridWorkbook {
        fn wait_ready(&self, _timeout: Duration) -> Result<(), DriverError> {
            if self.ready {
                Ok(())
            } else {
                Err(DriverError::Timeout("no document".into()))
            }
        }

        fn dismiss_activation_dialog(&self) {}

        fn row_count(&self) -> Result<usize, DriverError> {
            Ok(self.rows.len())
        }

        fn cell(&self, row: usize, column: usize) -> Result<Option<String>, DriverError> {
            Ok(self
                .rows
                .get(row)
                .and_then(|r| r.get(column))
                .cloned()
                .flatten())
        }

        fn close_discard(&self) {
            *self.closed.lock().unwrap() = true;
        }
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 2, 18).unwrap()
    }

    #[test]
    fn parses_rows_and_recomputes_totals() {
        let book = GridWorkbook::new(vec![
            GridWorkbook::header(),
            vec![
                Some("A001"),
                Some("J. Doe"),
                Some("7"),
                Some("5"),
                Some("6"),
                Some("2"),
            ],
            vec![
                Some("A002"),
                Some("M. Lee"),
                Some("0"),
                Some("1"),
                None,
                Some("3"),
            ],
        ]);

        let records = parse_day(&book, day(), Duration::from_secs(1)).unwrap();
        assert_eq!(records.len(), 2);

        assert_eq!(records[0].employee_code, "A001");
        assert_eq!(records[0].inbound_total, 12);
        assert_eq!(records[0].outbound_total, 8);
        assert_eq!(records[0].grand_total, 20);
        assert_eq!(records[0].date, day());

        assert_eq!(records[1].inbound_total, 1);
        assert_eq!(records[1].outbound_total, 3);
        for r in &records {
            assert_eq!(r.grand_total, r.inbound_total + r.outbound_total);
        }
    }

    #[test]
    fn skips_rows_with_blank_code_and_name() {
        let book = GridWorkbook::new(vec![
            GridWorkbook::header(),
            vec![None, None, Some("99"), Some("99"), Some("99"), Some("99")],
            vec![
                Some(""),
                Some("  "),
                Some("1"),
                Some("1"),
                Some("1"),
                Some("1"),
            ],
            vec![Some("A003"), None, Some("1"), None, None, None],
            vec![None, Some("Only Name"), None, Some("2"), None, None],
        ]);

        let records = parse_day(&book, day(), Duration::from_secs(1)).unwrap();
        // Total rows are dropped; either identity column alone keeps a row
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].employee_code, "A003");
        assert_eq!(records[1].employee_name, "Only Name");
    }

    #[test]
    fn blank_and_garbage_counts_become_zero() {
        let book = GridWorkbook::new(vec![
            GridWorkbook::header(),
            vec![
                Some("A001"),
                Some("J. Doe"),
                Some(""),
                Some("n/a"),
                Some("1,250"),
                None,
            ],
        ]);

        let records = parse_day(&book, day(), Duration::from_secs(1)).unwrap();
        assert_eq!(records[0].inbound_total, 0);
        assert_eq!(records[0].outbound_total, 1250);
    }

    #[test]
    fn header_only_export_is_a_quiet_day() {
        let book = GridWorkbook::new(vec![GridWorkbook::header()]);
        let records = parse_day(&book, day(), Duration::from_secs(1)).unwrap();
        assert!(records.is_empty());

        let empty = GridWorkbook::new(vec![]);
        assert!(parse_day(&empty, day(), Duration::from_secs(1))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn unready_document_is_an_error_not_an_empty_day() {
        let mut book = GridWorkbook::new(vec![GridWorkbook::header()]);
        book.ready = false;
        let result = parse_day(&book, day(), Duration::from_millis(10));
        assert!(matches!(result, Err(DriverError::Timeout(_))));
    }

    #[test]
    fn lenient_count_accepts_decimals_and_rejects_negatives() {
        assert_eq!(lenient_count(Some("12.0"), "C2"), 12);
        assert_eq!(lenient_count(Some("-3"), "C2"), 0);
        assert_eq!(lenient_count(None, "C2"), 0);
        assert_eq!(lenient_count(Some("   "), "C2"), 0);
    }
}

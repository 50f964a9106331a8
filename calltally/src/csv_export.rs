//! Writing the month's reconciled rows to a local CSV artifact.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::dates::Month;
use crate::errors::PipelineError;
use crate::records::SHEET_HEADER;

/// Write `rows` (header excluded) as `call_stats_{month}_{ts}.csv` in `dir`.
///
/// UTF-8 with a byte-order mark so spreadsheet applications detect the
/// encoding when the operator double-clicks the file.
pub fn export_csv(
    dir: &Path,
    month: Month,
    rows: &[Vec<String>],
) -> Result<PathBuf, PipelineError> {
    fs::create_dir_all(dir)?;

    let ts = chrono::Local::now().format("%Y%m%d-%H%M");
    let path = dir.join(format!("call_stats_{month}_{ts}.csv"));

    let mut file = File::create(&path)?;
    file.write_all(b"\xEF\xBB\xBF")?;

    let mut writer = csv::Writer::from_writer(file);
    writer.write_record(SHEET_HEADER)?;
    for row in rows {
        writer.write_record(row)?;
    }
    writer.flush()?;

    info!("CSV written: {} ({} rows)", path.display(), rows.len());
    Ok(path)
}

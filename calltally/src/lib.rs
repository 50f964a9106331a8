//! Checkpointed desktop-automation pipeline for monthly call statistics.
//!
//! Drives a third-party call-center application through its accessibility
//! tree, one calendar day at a time: query, export to the companion
//! spreadsheet, parse, reconcile into the durable sheet, checkpoint. A final
//! stage writes the month's CSV artifact and delivers it through the
//! chat-bot channel.
//!
//! The host offers no automation API and no completion events; progress is
//! detected by polling and every wait is bounded. The checkpoint makes
//! re-runs resumable and the sink upsert makes them idempotent.

pub mod checkpoint;
pub mod config;
pub mod controls;
pub mod csv_export;
pub mod dates;
pub mod errors;
pub mod events;
pub mod logging;
pub mod notify;
pub mod pipeline;
pub mod platforms;
pub mod records;
pub mod screenshot;
pub mod selector;
pub mod session;
pub mod sheet;
pub mod workbook;

pub use checkpoint::{CheckpointStore, MonthState};
pub use controls::{Control, ControlImpl, UiBackend};
pub use dates::{date_range, Month};
pub use errors::{ConfigError, DriverError, PipelineError};
pub use pipeline::{DayCollector, DayOutcome, Pipeline, RunReport, UiDayCollector};
pub use records::DayRecord;
pub use selector::Selector;
pub use session::{HostCredentials, ReportSession, SessionTimings, UiProfile};
pub use sheet::{GoogleSheetStore, MemorySheetStore, SheetStore};

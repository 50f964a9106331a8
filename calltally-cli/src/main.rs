//! calltally CLI
//!
//! Usage:
//!   calltally run 2026-02                      # full month
//!   calltally run 2026-02 2026-02-15           # single-day test (no report)
//!   calltally run 2026-02-01 2026-02-05        # explicit range (no report)
//!   calltally run 2026-02 --attach             # use an already-open screen
//!   calltally dump-controls                    # selector maintenance aid

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing::info;

use calltally::config::{self, Config};
use calltally::controls::dump_tree;
use calltally::pipeline::{Pipeline, UiDayCollector};
use calltally::sheet::GoogleSheetStore;
use calltally::{
    checkpoint::CheckpointStore, logging, notify::ReportNotifier, platforms, Month,
    SessionTimings,
};

#[derive(Parser)]
#[command(name = "calltally")]
#[command(about = "Monthly call-statistics collection for the host call-center application")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the collection pipeline for a month, a single date or a range
    Run(RunArgs),
    /// Dump the host window's control tree for selector maintenance
    DumpControls(DumpArgs),
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// A month (2026-02) or a range start (2026-02-01)
    first: String,
    /// A single test date, or the range end
    second: Option<String>,
    /// Attach to an already-open report screen instead of logging in
    #[arg(long)]
    attach: bool,
}

#[derive(Parser, Debug)]
struct DumpArgs {
    /// Levels of the tree to visit
    #[arg(long, default_value_t = 8)]
    max_depth: usize,
    /// Output file; stdout when omitted
    #[arg(long)]
    output: Option<PathBuf>,
}

/// What one invocation is asked to do.
#[derive(Debug, PartialEq, Eq)]
struct RunPlan {
    month: Month,
    dates: Vec<NaiveDate>,
    skip_report: bool,
}

/// Map the three invocation forms onto a plan. Errors are user messages.
fn parse_run_args(first: &str, second: Option<&str>) -> Result<RunPlan, String> {
    // A range start is a full date (length 10), a month is YYYY-MM (length 7)
    if first.len() == 10 {
        let start: NaiveDate = first
            .parse()
            .map_err(|_| format!("invalid date: {first:?} (expected YYYY-MM-DD)"))?;
        let second =
            second.ok_or_else(|| "range mode needs an end date (e.g. 2026-02-05)".to_string())?;
        let end: NaiveDate = second
            .parse()
            .map_err(|_| format!("invalid date: {second:?} (expected YYYY-MM-DD)"))?;
        if start > end {
            return Err(format!("start ({start}) is after end ({end})"));
        }
        return Ok(RunPlan {
            month: Month::containing(start),
            dates: calltally::date_range(start, end),
            skip_report: true,
        });
    }

    let month: Month = first
        .parse()
        .map_err(|_| format!("invalid month: {first:?} (expected YYYY-MM)"))?;

    match second {
        Some(date) => {
            let date: NaiveDate = date
                .parse()
                .map_err(|_| format!("invalid date: {date:?} (expected YYYY-MM-DD)"))?;
            Ok(RunPlan {
                month,
                dates: vec![date],
                skip_report: true,
            })
        }
        None => Ok(RunPlan {
            month,
            dates: month.days(),
            skip_report: false,
        }),
    }
}

async fn run(args: RunArgs) -> anyhow::Result<()> {
    let plan = match parse_run_args(&args.first, args.second.as_deref()) {
        Ok(plan) => plan,
        Err(message) => {
            eprintln!("{message}");
            eprintln!("usage:");
            eprintln!("  calltally run 2026-02                 # full month");
            eprintln!("  calltally run 2026-02 2026-02-15      # single-day test");
            eprintln!("  calltally run 2026-02-01 2026-02-05   # date range");
            std::process::exit(1);
        }
    };

    config::load_dotenv();
    let config = Config::from_env().context("startup configuration incomplete")?;
    let _guard = logging::init(plan.month, &config.log_dir(), None)?;

    info!(
        "[{}] run starting: {} dates{}",
        plan.month,
        plan.dates.len(),
        if plan.skip_report { " (test mode)" } else { "" }
    );

    let sheets = Arc::new(GoogleSheetStore::from_key_file(
        &config.sa_key_path,
        config.spreadsheet_id.clone(),
    )?);
    let pipeline = Pipeline {
        checkpoints: CheckpointStore::new(config.log_dir()),
        sheets,
        notifier: ReportNotifier::new(config.bot_token.clone(), config.bot_chat_id.clone()),
        csv_dir: config.csv_dir(),
        screens_dir: config.screens_dir(plan.month),
    };

    let profile = config::ui_profile_from_env();
    let timings = SessionTimings::default();
    let mut collector = if args.attach {
        UiDayCollector::attached(profile, timings)
    } else {
        UiDayCollector::with_login(profile, timings, config.credentials.clone())
    };

    let report = pipeline
        .run(&mut collector, plan.month, &plan.dates, plan.skip_report)
        .await?;

    info!(
        "[{}] finished: {} done, {} failed{}",
        report.month,
        report.done,
        report.failed,
        match &report.csv_path {
            Some(path) => format!(", CSV at {}", path.display()),
            None => String::new(),
        }
    );
    Ok(())
}

fn dump_controls(args: DumpArgs) -> anyhow::Result<()> {
    config::load_dotenv();
    let backend = platforms::create_backend()?;
    let profile = config::ui_profile_from_env();
    let window = backend
        .find_window(&profile.window_title_pattern, Duration::from_secs(5))
        .context("host window not found; log in and open the report screen first")?;

    let lines = dump_tree(&window, args.max_depth);
    match args.output {
        Some(path) => {
            std::fs::write(&path, lines.join("\n"))?;
            println!("control tree written to {} ({} nodes)", path.display(), lines.len());
        }
        None => {
            for line in &lines {
                println!("{line}");
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => run(args).await?,
        Commands::DumpControls(args) => dump_controls(args)?,
    }
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn month_form_covers_every_day_and_reports() {
        let plan = parse_run_args("2026-02", None).unwrap();
        assert_eq!(plan.month.to_string(), "2026-02");
        assert_eq!(plan.dates.len(), 28);
        assert!(!plan.skip_report);
    }

    #[test]
    fn single_date_form_is_a_test_run() {
        let plan = parse_run_args("2026-02", Some("2026-02-15")).unwrap();
        assert_eq!(plan.dates, vec![date("2026-02-15")]);
        assert!(plan.skip_report);
    }

    #[test]
    fn range_form_spans_inclusive_dates() {
        let plan = parse_run_args("2026-02-01", Some("2026-02-05")).unwrap();
        assert_eq!(plan.dates.len(), 5);
        assert_eq!(plan.month.to_string(), "2026-02");
        assert!(plan.skip_report);
    }

    #[test]
    fn malformed_arguments_are_user_errors() {
        assert!(parse_run_args("2026/02", None).is_err());
        assert!(parse_run_args("2026-02", Some("15")).is_err());
        assert!(parse_run_args("2026-02-01", None).is_err());
        assert!(parse_run_args("2026-02-05", Some("2026-02-01")).is_err());
        assert!(parse_run_args("2026-02-30", Some("2026-02-28")).is_err());
    }
}

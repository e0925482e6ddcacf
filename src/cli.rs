use crate::config::{Config, Paths};
use crate::daemon::Daemon;
use crate::db::Database;
use crate::error::Result;
use crate::platform;
use crate::report::format::{render_json, render_text, top_rows, ReportRow};
use crate::report::rules::{AliasRules, SubProgramRules};
use crate::report::{app_report, details_report, load_usage, DetailsFilter, TimeRange};
use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand};
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(name = "screentime", version, about = "Per-application screen time tracker")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Sample the focused window until SIGINT/SIGTERM
    Daemon,
    /// Time per application
    Report(ReportArgs),
    /// Time per window title of one application
    Details(DetailsArgs),
    /// Delete samples and aggregates recorded before a date
    Prune {
        /// First day to keep (YYYY-MM-DD)
        #[arg(long)]
        before: NaiveDate,
    },
    /// Reclaim unused space in the database file
    Vacuum,
}

#[derive(Debug, Args)]
pub struct RangeArgs {
    /// First day (YYYY-MM-DD), defaults to today
    #[arg(long)]
    pub from: Option<NaiveDate>,
    /// Last day, inclusive (YYYY-MM-DD), defaults to today
    #[arg(long)]
    pub to: Option<NaiveDate>,
    /// Show at most this many rows (0 = all)
    #[arg(long, default_value_t = 0)]
    pub limit: usize,
    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct ReportArgs {
    #[command(flatten)]
    pub range: RangeArgs,
}

#[derive(Debug, Args)]
pub struct DetailsArgs {
    #[arg(long)]
    pub app_id: String,
    /// Only titles containing this text
    #[arg(long)]
    pub title: Option<String>,
    /// Ignore digits, parentheses and dashes when grouping titles
    #[arg(long)]
    pub only_text: bool,
    #[command(flatten)]
    pub range: RangeArgs,
}

pub fn run(cli: Cli) -> Result<()> {
    let paths = Paths::discover()?;

    match cli.command {
        Command::Daemon => {
            let config = Config::load(&paths.config_file())?;
            let source = platform::detect()?;
            let db = Database::open(&paths.db_path()?)?;
            Daemon::new(Arc::new(db), Arc::from(source), &config.daemon).run()
        }
        Command::Report(args) => {
            let db = Database::open(&paths.db_path()?)?;
            let range = args.range.time_range()?;
            let records = load_usage(&db, range)?;
            let rows = app_report(
                &records,
                &SubProgramRules::load(&paths.config_dir),
                &AliasRules::load(&paths.config_dir),
            );
            emit(rows, &args.range, &period_header("Screen time", &args.range))
        }
        Command::Details(args) => {
            let db = Database::open(&paths.db_path()?)?;
            let range = args.range.time_range()?;
            let records = load_usage(&db, range)?;
            let header = period_header(&format!("Screen time of {}", args.app_id), &args.range);
            let filter = DetailsFilter {
                app_id: args.app_id,
                title: args.title,
                only_text: args.only_text,
            };
            emit(details_report(&records, &filter), &args.range, &header)
        }
        Command::Prune { before } => {
            let db = Database::open(&paths.db_path()?)?;
            let cutoff = TimeRange::from_dates(Some(before), Some(before), before)?.from_ms;
            let (samples, aggregates) = db.prune_before(cutoff)?;
            print(&format!(
                "Deleted {samples} samples and {aggregates} aggregates recorded before {before}"
            ));
            Ok(())
        }
        Command::Vacuum => {
            let db = Database::open(&paths.db_path()?)?;
            db.vacuum()?;
            print(&format!("Vacuumed {}", db.path().display()));
            Ok(())
        }
    }
}

impl RangeArgs {
    fn time_range(&self) -> Result<TimeRange> {
        TimeRange::from_dates(self.from, self.to, today())
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn period_header(title: &str, range: &RangeArgs) -> String {
    let from = range.from.unwrap_or_else(today);
    let to = range.to.unwrap_or_else(today);
    if from == to {
        format!("{title} on {from}")
    } else {
        format!("{title} from {from} to {to}")
    }
}

fn emit(rows: Vec<ReportRow>, range: &RangeArgs, header: &str) -> Result<()> {
    let rows = top_rows(rows, range.limit);
    if range.json {
        print(&render_json(&rows)?);
    } else {
        print(render_text(header, &rows).trim_end());
    }
    Ok(())
}

#[allow(clippy::print_stdout, reason = "command output goes to stdout; logs go to stderr")]
fn print(text: &str) {
    println!("{text}");
}

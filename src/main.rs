//! CLI entry point for the GTFS subsetting tool.
//!
//! Provides subcommands for cutting feeds down to a date and time window and
//! for inspecting what a feed covers before choosing one.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use gtfs_subset::{
    config::{Settings, range_from_flags},
    filters::subset::{SubsetOptions, subset_feed},
    output::{append_record, print_json, write_feed},
    parser::load_feed,
    stats::{FeedProfile, SubsetStats},
};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "gtfs_subset")]
#[command(about = "A tool to cut GTFS feeds down to a date and time window", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Subset one or more feeds (zip files, directories or URLs)
    Subset {
        /// Feeds to process, added to those listed in the settings file
        #[arg(value_name = "FILE_OR_URL")]
        feeds: Vec<String>,

        /// JSON settings file; flags given here override its values
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// First service date to keep (YYYYMMDD or YYYY-MM-DD)
        #[arg(long, requires = "end_date")]
        start_date: Option<String>,

        /// Last service date to keep (YYYYMMDD or YYYY-MM-DD)
        #[arg(long, requires = "start_date")]
        end_date: Option<String>,

        /// Start of the service time window (H:MM:SS)
        #[arg(long, requires = "end_time")]
        start_time: Option<String>,

        /// End of the service time window (H:MM:SS, may exceed 24:00:00)
        #[arg(long, requires = "start_time")]
        end_time: Option<String>,

        /// Cut partially covered trips down to the window instead of dropping them
        #[arg(long, default_value_t = false)]
        trim: bool,

        /// Drop calendar_dates amendments of weekly services before subsetting
        #[arg(long, default_value_t = false)]
        remove_exception_calendars: bool,

        /// Directory receiving the reduced feeds
        #[arg(short, long)]
        output_dir: Option<String>,

        /// CSV file to append one report row per feed to
        #[arg(short, long)]
        report: Option<String>,
    },
    /// Show table sizes, service dates and service hours of a feed
    Inspect {
        /// Path to file, directory or URL to fetch
        #[arg(value_name = "FILE_OR_URL")]
        feed: String,
    },
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/gtfs_subset.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("gtfs_subset.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Subset {
            feeds,
            config,
            start_date,
            end_date,
            start_time,
            end_time,
            trim,
            remove_exception_calendars,
            output_dir,
            report,
        } => {
            let mut settings = match &config {
                Some(path) => Settings::load(path)
                    .with_context(|| format!("loading settings from {}", path.display()))?,
                None => Settings::default(),
            };
            settings.feeds.extend(feeds);
            if let Some(range) = range_from_flags("date", start_date, end_date)? {
                settings.date_range = Some(range);
            }
            if let Some(range) = range_from_flags("time", start_time, end_time)? {
                settings.time_range = Some(range);
            }
            settings.trim_trips |= trim;
            settings.remove_exception_calendars |= remove_exception_calendars;
            if output_dir.is_some() {
                settings.output_dir = output_dir;
            }
            if report.is_some() {
                settings.report = report;
            }

            run_subset(&settings)?;
        }
        Commands::Inspect { feed } => {
            let store = load_feed(&feed).with_context(|| format!("loading feed {feed}"))?;
            let profile = FeedProfile::from_store(&store)?;
            print_json(&profile)?;
        }
    }

    Ok(())
}

/// Runs the pipeline over every configured feed. A failing feed is logged
/// and reported, and the remaining feeds still run.
#[tracing::instrument(skip_all, fields(feeds = settings.feeds.len()))]
fn run_subset(settings: &Settings) -> Result<()> {
    // Validate before touching any feed
    let options = settings.options()?;
    if settings.feeds.is_empty() {
        bail!("no feeds given, pass them as arguments or list them in the settings file");
    }

    let output_dir = PathBuf::from(settings.output_dir.as_deref().unwrap_or("subset"));
    let report = settings.report.as_deref().map(Path::new);
    std::fs::create_dir_all(&output_dir)?;

    let mut failed = 0;
    for source in &settings.feeds {
        let span = tracing::info_span!("process_feed", feed = %source);
        let _enter = span.enter();

        match process_feed(source, &options, &output_dir) {
            Ok(stats) => {
                info!(
                    trips_before = stats.trips_before,
                    trips_after = stats.trips_after,
                    kept_pct = %format!("{:.1}", stats.trips_kept_pct()),
                    materialized = stats.materialized_trips,
                    "Feed processed successfully"
                );
                if let Some(report) = report {
                    append_record(report, &stats)?;
                }
            }
            Err(e) => {
                failed += 1;
                error!(error = %e, "Feed subset failed");
                if let Some(report) = report {
                    let error_stats =
                        SubsetStats::from_error(source, error_type(&e), &format!("{e:#}"));
                    if let Err(e) = append_record(report, &error_stats) {
                        warn!(error = %e, "Failed to write error record");
                    }
                }
            }
        }
    }

    info!(
        output_dir = %output_dir.display(),
        processed = settings.feeds.len(),
        failed,
        "Finished processing all feeds"
    );
    if failed > 0 {
        bail!("{failed} of {} feeds failed", settings.feeds.len());
    }
    Ok(())
}

fn process_feed(source: &str, options: &SubsetOptions, output_dir: &Path) -> Result<SubsetStats> {
    let mut store = load_feed(source).context("loading feed")?;

    let mut stats = SubsetStats::new(source, options);
    stats.record_before(&store);
    let time_stats = subset_feed(&mut store, options).context("subsetting feed")?;
    stats.record_after(&store, time_stats);

    let target = output_dir.join(output_name(source));
    write_feed(&store, &target)
        .with_context(|| format!("writing feed to {}", target.display()))?;

    Ok(stats)
}

/// Output file name for a feed source: its last path segment, keeping a
/// `.zip` extension when the input was an archive.
fn output_name(source: &str) -> String {
    let last = source
        .trim_end_matches('/')
        .rsplit(['/', '\\'])
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or("feed");
    let path = Path::new(last);
    let stem = path
        .file_stem()
        .and_then(OsStr::to_str)
        .unwrap_or("feed");

    let is_zip = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"))
        || source.starts_with("http");
    if is_zip {
        format!("{stem}.zip")
    } else {
        stem.to_string()
    }
}

/// Report category of a failure, from the innermost library error.
fn error_type(err: &anyhow::Error) -> &'static str {
    use gtfs_subset::Error;

    match err.downcast_ref::<Error>() {
        Some(Error::Io(_) | Error::Zip(_) | Error::Csv { .. }) => "load_error",
        Some(Error::Fetch(_)) => "fetch_error",
        Some(Error::Configuration(_)) => "config_error",
        Some(
            Error::MissingTable(_)
            | Error::MissingColumn { .. }
            | Error::SchemaViolation { .. }
            | Error::Parse { .. }
            | Error::InvalidField { .. },
        ) => "feed_error",
        Some(Error::Json(_)) | None => "other_error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_name() {
        assert_eq!(output_name("feeds/city.zip"), "city.zip");
        assert_eq!(output_name("feeds/city/"), "city");
        assert_eq!(output_name("https://example.org/gtfs/latest"), "latest.zip");
        assert_eq!(output_name("C:\\feeds\\town.ZIP"), "town.zip");
    }

    #[test]
    fn test_error_type_sees_through_context() {
        let err = anyhow::Error::new(gtfs_subset::Error::MissingTable("trips".into()))
            .context("subsetting feed");
        assert_eq!(error_type(&err), "feed_error");
        assert_eq!(error_type(&anyhow::anyhow!("boom")), "other_error");
    }
}

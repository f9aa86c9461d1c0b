//! CLI entry point for the ward operations reports.
//!
//! Each report subcommand reads one uploaded extract, runs the pipeline to
//! completion and writes flat CSV exports. A rejected upload renders nothing.
//! The GPS subcommands poll the telemetry vendor.

use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::{NaiveDate, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use ward_ops_report::aggregate::{
    CoverageMatrix, Dimension, KeyContext, Mode, RecordFilter, aggregate,
};
use ward_ops_report::changes::{ROUTE_IDENTITY, RouteMatrix};
use ward_ops_report::config::AppConfig;
use ward_ops_report::fetch::BasicClient;
use ward_ops_report::gps::{GpsProxy, HistoryPayload, Provider};
use ward_ops_report::ingest::coerce::{DateStyle, parse_date};
use ward_ops_report::ingest::records::{KycRecord, PoiRecord, QrMasterRecord, ScanRecord};
use ward_ops_report::ingest;
use ward_ops_report::metrics::{CountScope, KycGapReport, supervisor_counts, zonal_rollup};
use ward_ops_report::output::{self, Table, append_record, gzip_file, tables, write_table};
use ward_ops_report::qr_status::QrStatusReport;
use ward_ops_report::reference::{Department, ReferenceData, ResolveOptions, Resolver};
use ward_ops_report::session::ReportSession;

#[derive(Parser)]
#[command(name = "ward_ops_report")]
#[command(about = "Ward-level coverage, KYC and QR reports from field-ops extracts", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone, Default)]
struct FilterArgs {
    /// First day to include (DD-MM-YYYY or YYYY-MM-DD)
    #[arg(long, value_parser = date_arg)]
    from: Option<NaiveDate>,

    /// Last day to include
    #[arg(long, value_parser = date_arg)]
    to: Option<NaiveDate>,

    /// Comma-separated ward allow-list (numbers or full ward names)
    #[arg(long, value_delimiter = ',')]
    wards: Vec<String>,
}

impl FilterArgs {
    fn filter(&self) -> RecordFilter {
        RecordFilter {
            from: self.from,
            to: self.to,
            wards: self.wards.clone(),
        }
    }
}

#[derive(Args, Debug, Clone)]
struct ExportArgs {
    /// CSV file to write
    #[arg(short, long)]
    output: PathBuf,

    /// Gzip compress the export
    #[arg(long, default_value_t = false)]
    gzip: bool,

    /// Render dates as YYYY-MM-DD instead of DD-MM-YYYY
    #[arg(long, default_value_t = false)]
    iso_dates: bool,
}

impl ExportArgs {
    fn style(&self) -> DateStyle {
        if self.iso_dates {
            DateStyle::Iso
        } else {
            DateStyle::DayMonthYear
        }
    }

    fn write(&self, table: &Table) -> Result<PathBuf> {
        write_table(&self.output, table, self.gzip)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum PoiView {
    Ward,
    Vehicle,
    Date,
    Matrix,
    Supervisor,
    Zonal,
}

impl PoiView {
    fn dimensions(self) -> &'static [Dimension] {
        match self {
            PoiView::Ward | PoiView::Matrix => &[Dimension::Ward],
            PoiView::Vehicle => &[Dimension::Vehicle],
            PoiView::Date => &[Dimension::Date],
            PoiView::Supervisor => &[Dimension::Supervisor],
            PoiView::Zonal => &[Dimension::ZonalHead],
        }
    }

    fn mode(self) -> Mode {
        match self {
            PoiView::Ward | PoiView::Vehicle => Mode::LatestSnapshot,
            _ => Mode::Cumulative,
        }
    }

    fn needs_reference(self) -> bool {
        matches!(self, PoiView::Supervisor | PoiView::Zonal)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Route-coverage (POI) views of a route log upload
    Poi {
        #[arg(value_enum)]
        view: PoiView,

        /// Route log extract (CSV or spreadsheet)
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Reference data JSON (supervisors, wards, zones, targets)
        #[arg(short, long)]
        reference: Option<PathBuf>,

        /// Use every date instead of the latest snapshot for ward/vehicle views
        #[arg(long, default_value_t = false)]
        cumulative: bool,

        /// Add empty days inside --from/--to to the date view
        #[arg(long, default_value_t = false)]
        fill_dates: bool,

        #[command(flatten)]
        filter: FilterArgs,

        #[command(flatten)]
        export: ExportArgs,
    },
    /// Per-route vehicle history and vehicle change counts
    VehicleChanges {
        #[arg(value_name = "FILE")]
        input: PathBuf,

        #[arg(short, long)]
        reference: Option<PathBuf>,

        /// Only routes with at least this many vehicle changes
        #[arg(long, default_value_t = 0)]
        min_changes: usize,

        #[command(flatten)]
        filter: FilterArgs,

        #[command(flatten)]
        export: ExportArgs,
    },
    /// Household KYC done against ward targets
    KycGap {
        #[arg(value_name = "FILE")]
        input: PathBuf,

        #[arg(short, long)]
        reference: PathBuf,

        #[command(flatten)]
        export: ExportArgs,
    },
    /// KYC rows per supervisor, with an optional zonal-head rollup
    SupervisorCount {
        #[arg(value_name = "FILE")]
        input: PathBuf,

        #[arg(short, long)]
        reference: PathBuf,

        /// Only supervisors of this department (UCC, C&T, KYC-Team)
        #[arg(long, value_parser = department_arg)]
        department: Option<Department>,

        /// Leave supervisors of these departments out (comma-separated)
        #[arg(long, value_delimiter = ',', value_parser = department_arg)]
        exclude_department: Vec<Department>,

        /// List every in-scope master-list supervisor, including those with no rows
        #[arg(long, default_value_t = false)]
        roster: bool,

        /// Only supervisors covering these wards (comma-separated)
        #[arg(long, value_delimiter = ',')]
        wards: Vec<String>,

        /// Also write the zonal-head rollup here
        #[arg(long)]
        zonal_output: Option<PathBuf>,

        #[command(flatten)]
        export: ExportArgs,
    },
    /// QR master list reconciled against scan logs
    QrStatus {
        /// QR master list extract
        #[arg(long)]
        master: PathBuf,

        /// Scan log extract
        #[arg(long)]
        scans: PathBuf,

        #[arg(short, long)]
        reference: PathBuf,

        /// Only count scans from this day
        #[arg(long, value_parser = date_arg)]
        date: Option<NaiveDate>,

        /// Write scans of codes missing from the master list here
        #[arg(long)]
        unknown_output: Option<PathBuf>,

        #[command(flatten)]
        export: ExportArgs,
    },
    /// What-if coverage boost on a route log; exports are marked as simulated
    Simulate {
        #[arg(value_enum)]
        view: PoiView,

        #[arg(value_name = "FILE")]
        input: PathBuf,

        #[arg(short, long)]
        reference: Option<PathBuf>,

        /// Target coverage in percent
        #[arg(long)]
        target: f64,

        #[command(flatten)]
        filter: FilterArgs,

        #[command(flatten)]
        export: ExportArgs,
    },
    /// Poll live vehicles from both providers into a daily CSV log
    GpsLive {
        /// Directory for date=YYYY-MM-DD.csv logs
        #[arg(short = 'd', long, default_value = "gps")]
        output_dir: String,

        /// Sample rate: query the providers every X seconds
        #[arg(short = 'r', long, default_value_t = 60)]
        sample_rate: u64,

        /// Number of samples to collect (0 = infinite)
        #[arg(short = 'n', long, default_value_t = 1)]
        num_samples: usize,

        /// Gzip each day's log once the day is over
        #[arg(long, default_value_t = false)]
        gzip: bool,
    },
    /// Track history of one device
    GpsHistory {
        #[arg(long)]
        device_id: String,

        /// Vendor start timestamp
        #[arg(long)]
        from: String,

        /// Vendor end timestamp
        #[arg(long)]
        to: String,

        #[arg(long, default_value = "secondary")]
        provider: String,

        /// Write the payload here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    let cli = Cli::parse();
    let config = AppConfig::from_env();
    let file_guard = init_logging(&config.log_file_path)?;
    config.log_ignored();

    if let Err(e) = run(cli.command, &config).await {
        error!(error = %format!("{e:#}"), "Report failed, nothing was rendered");
        drop(file_guard);
        std::process::exit(1);
    }

    Ok(())
}

/// Logging setup: colored stderr + JSON rolling log file.
fn init_logging(log_file_path: &str) -> Result<WorkerGuard> {
    let log_dir = Path::new(log_file_path)
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("ward_ops_report.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);

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

    Ok(guard)
}

async fn run(command: Commands, config: &AppConfig) -> Result<()> {
    match command {
        Commands::Poi {
            view,
            input,
            reference,
            cumulative,
            fill_dates,
            filter,
            export,
        } => {
            let session = ReportSession::from(ingest::load::<PoiRecord>(&input)?);
            let reference = load_reference(reference.as_deref())?;
            let options = PoiOptions {
                view,
                cumulative,
                fill_dates,
                filter: filter.filter(),
                style: export.style(),
            };
            let table = poi_table(session.records(), reference.as_ref(), &options)?;
            export.write(&table)?;
        }
        Commands::VehicleChanges {
            input,
            reference,
            min_changes,
            filter,
            export,
        } => {
            let loaded = ingest::load_with::<PoiRecord>(&input, ROUTE_IDENTITY)?;
            let reference = load_reference(reference.as_deref())?;
            let matrix = RouteMatrix::build(
                &loaded.records,
                &filter.filter(),
                reference.as_ref().map(Resolver::new),
                &ResolveOptions::default(),
            );
            info!(
                routes = matrix.routes.len(),
                shown = matrix.with_min_changes(min_changes).len(),
                min_changes,
                "Vehicle change report ready"
            );
            export.write(&tables::route_matrix_table(&matrix, min_changes, export.style()))?;
        }
        Commands::KycGap {
            input,
            reference,
            export,
        } => {
            let loaded = ingest::load::<KycRecord>(&input)?;
            let reference = ReferenceData::load(&reference)?;
            let report = KycGapReport::build(&loaded.records, &reference);
            if report.unassigned > 0.0 {
                warn!(households = report.unassigned, "KYC rows without a target ward");
            }
            output::print_pretty(&report.total);
            export.write(&tables::kyc_gap_table(&report))?;
        }
        Commands::SupervisorCount {
            input,
            reference,
            department,
            exclude_department,
            roster,
            wards,
            zonal_output,
            export,
        } => {
            let loaded = ingest::load::<KycRecord>(&input)?;
            let reference = ReferenceData::load(&reference)?;
            let scope = CountScope {
                options: ResolveOptions {
                    department,
                    exclude: exclude_department,
                },
                seed_roster: roster,
                wards,
            };
            let counts = supervisor_counts(&loaded.records, &Resolver::new(&reference), &scope);
            export.write(&tables::supervisor_count_table(&counts))?;

            if let Some(path) = zonal_output {
                let rollup = zonal_rollup(&counts);
                write_table(&path, &tables::zonal_table(&rollup), export.gzip)?;
            }
        }
        Commands::QrStatus {
            master,
            scans,
            reference,
            date,
            unknown_output,
            export,
        } => {
            let master = ingest::load::<QrMasterRecord>(&master)?;
            let scans = ingest::load::<ScanRecord>(&scans)?;
            let reference = ReferenceData::load(&reference)?;
            let report = QrStatusReport::build(
                &master.records,
                &scans.records,
                &Resolver::new(&reference),
                date,
            );
            output::print_json(&report.stats)?;
            if let Some(latest) = report.available_dates.first() {
                info!(
                    latest = %export.style().format(*latest),
                    days = report.available_dates.len(),
                    "Scan dates available"
                );
            }
            export.write(&tables::qr_status_table(&report, export.style()))?;

            match unknown_output {
                Some(path) => {
                    let unknown = tables::unknown_scan_table(&report, export.style());
                    write_table(&path, &unknown, export.gzip)?;
                }
                None if !report.unknown.is_empty() => {
                    warn!(
                        unknown = report.unknown.len(),
                        "Scans of codes missing from the master list were not exported"
                    );
                }
                None => {}
            }
        }
        Commands::Simulate {
            view,
            input,
            reference,
            target,
            filter,
            export,
        } => {
            let mut session = ReportSession::from(ingest::load::<PoiRecord>(&input)?);
            let reference = load_reference(reference.as_deref())?;
            let scope = filter.filter();

            let outcome = session.simulate_coverage(&scope, target / 100.0)?;
            warn!(
                affected = outcome.affected,
                before = %format!("{:.2}", outcome.before_percent),
                after = %format!("{:.2}", outcome.after_percent),
                "Export contains SIMULATED coverage figures"
            );

            let options = PoiOptions {
                view,
                cumulative: false,
                fill_dates: false,
                filter: scope,
                style: export.style(),
            };
            let table = poi_table(session.records(), reference.as_ref(), &options)?;
            write_table(&simulated_path(&export.output), &table, export.gzip)?;
            session.restore();
        }
        Commands::GpsLive {
            output_dir,
            sample_rate,
            num_samples,
            gzip,
        } => {
            gps_live(config, &output_dir, sample_rate, num_samples, gzip).await?;
        }
        Commands::GpsHistory {
            device_id,
            from,
            to,
            provider,
            output,
        } => {
            let proxy = GpsProxy::new(config, BasicClient::insecure()?, BasicClient::new()?)?;
            let payload = proxy
                .history(&device_id, &from, &to, Provider::parse(&provider))
                .await?;
            let body = match payload {
                HistoryPayload::Json(json) => serde_json::to_string_pretty(&json)?,
                HistoryPayload::Text(text) => text,
            };
            match output {
                Some(path) => {
                    fs::write(&path, body)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    info!(path = %path.display(), "Wrote track history");
                }
                None => println!("{body}"),
            }
        }
    }

    Ok(())
}

fn date_arg(raw: &str) -> Result<NaiveDate, String> {
    parse_date(raw).ok_or_else(|| format!("invalid date '{raw}'"))
}

fn department_arg(raw: &str) -> Result<Department, String> {
    if raw.trim().is_empty() {
        return Err("empty department".to_string());
    }
    Ok(Department::parse(raw))
}

fn load_reference(path: Option<&Path>) -> Result<Option<ReferenceData>> {
    path.map(ReferenceData::load).transpose()
}

struct PoiOptions {
    view: PoiView,
    cumulative: bool,
    fill_dates: bool,
    filter: RecordFilter,
    style: DateStyle,
}

/// Builds one POI view as a flat table.
fn poi_table(
    records: &[PoiRecord],
    reference: Option<&ReferenceData>,
    options: &PoiOptions,
) -> Result<Table> {
    let view = options.view;
    if view.needs_reference() && reference.is_none() {
        bail!("the {view:?} view needs --reference");
    }
    let resolve = ResolveOptions::default();
    let ctx = KeyContext::new(reference.map(Resolver::new), &resolve);

    if view == PoiView::Matrix {
        let matrix = CoverageMatrix::build(records, Dimension::Ward, &options.filter, &ctx);
        if matrix.undated > 0 {
            warn!(undated = matrix.undated, "Records without a date left out of the matrix");
        }
        return Ok(tables::coverage_matrix_table(&matrix, options.style));
    }

    let mode = if options.cumulative {
        Mode::Cumulative
    } else {
        view.mode()
    };
    let mut aggregation = aggregate(records, view.dimensions(), mode, &options.filter, &ctx);

    if options.fill_dates {
        match (options.filter.from, options.filter.to) {
            (Some(from), Some(to)) => aggregation.fill_dates(from, to),
            _ => warn!("--fill-dates needs both --from and --to, ignoring"),
        }
    }
    if let Some(date) = aggregation.snapshot_date {
        info!(snapshot = %options.style.format(date), "Showing latest snapshot");
    }
    info!(
        view = ?view,
        buckets = aggregation.len(),
        coverage = %format!("{:.2}", aggregation.totals.display_coverage()),
        "POI view ready"
    );

    Ok(tables::aggregation_table(&aggregation, options.style))
}

/// `report.csv` → `report_simulated.csv`.
fn simulated_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{stem}_simulated.{}", ext.to_string_lossy()),
        None => format!("{stem}_simulated"),
    };
    path.with_file_name(name)
}

/// Polls both GPS providers at a fixed rate, appending each vehicle to
/// `{output_dir}/date=YYYY-MM-DD.csv`.
#[tracing::instrument(skip(config))]
async fn gps_live(
    config: &AppConfig,
    output_dir: &str,
    sample_rate: u64,
    num_samples: usize,
    gzip: bool,
) -> Result<()> {
    let proxy = GpsProxy::new(config, BasicClient::insecure()?, BasicClient::new()?)?;

    if num_samples == 0 {
        info!(sample_rate, "Sampling infinitely. Press Ctrl+C to stop.");
    } else {
        info!(num_samples, sample_rate, "Starting sample collection");
    }

    fs::create_dir_all(output_dir)?;

    let mut sample_count = 0;
    let mut current_day: Option<NaiveDate> = None;

    loop {
        if num_samples > 0 && sample_count >= num_samples {
            break;
        }
        sample_count += 1;

        let now = Utc::now();
        let today = now.date_naive();

        // Close out the previous day's log once the date rolls over
        if gzip
            && let Some(day) = current_day
            && day < today
        {
            let finished = day_log(output_dir, day);
            if finished.exists()
                && let Err(e) = gzip_file(&finished)
            {
                error!(error = %e, date = %day, "Failed to compress previous day's log");
            }
        }
        current_day = Some(today);

        let vehicles = proxy.live().await;
        let path = day_log(output_dir, today);
        let mut written = 0;
        for vehicle in &vehicles {
            match append_record(&path, &vehicle.log_row(now)) {
                Ok(()) => written += 1,
                Err(e) => error!(error = %e, "Failed to append vehicle position"),
            }
        }
        info!(
            sample = sample_count,
            vehicles = vehicles.len(),
            written,
            "Sample round complete"
        );

        if num_samples == 0 || sample_count < num_samples {
            info!(sample_rate, "Waiting before next sample");
            tokio::time::sleep(tokio::time::Duration::from_secs(sample_rate)).await;
        }
    }

    info!(output_dir, "Finished polling GPS providers");
    Ok(())
}

fn day_log(output_dir: &str, day: NaiveDate) -> PathBuf {
    Path::new(output_dir).join(format!("date={}.csv", day.format("%Y-%m-%d")))
}

// src/cli.rs
use std::fs::File;
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr};

use crate::config::consts::{API_URL, DATA_DIR, FILE_PREFIX, FLUSH_EVERY_ROWS, MAX_CONSECUTIVE_FAILURES, MAX_DELAY_SECS};
use crate::config::options::{ScrapeOptions, StartPoint};
use crate::core::net;
use crate::data::{Catalog, DateRange, Filters, Summary};
use crate::progress::Progress;
use crate::scrape::{self, Driver, RunSummary, StopReason};
use crate::specs::HttpFetcher;
use crate::store::{FlushReport, PartitionStore};

#[derive(Debug, Parser)]
#[command(name = "bdns_scrape", version, about = "Harvest BDNS grant announcements into per-year Parquet files")]
pub struct Cli {
    /// Directory holding the `<prefix>_<year>.parquet` partitions
    #[arg(long, global = true, env = "BDNS_DATA_DIR", default_value = DATA_DIR)]
    pub data_dir: PathBuf,

    #[arg(long, global = true, default_value = FILE_PREFIX)]
    pub prefix: String,

    #[arg(long, global = true, env = "BDNS_API_URL", default_value = API_URL)]
    pub api_url: String,

    /// Append diagnostics to this file instead of stderr
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Crawl upward from the resume point (or --start) until the API runs dry
    Run(RunArgs),
    /// Print the identifier a resumed crawl would start from
    ResumePoint,
    /// Rewrite partitions without duplicate identifiers (last one wins)
    Clean,
    /// Overall and per-year aggregates of the stored rows
    Summary(FilterArgs),
    /// Write the filtered rows to a CSV file
    Export {
        out: PathBuf,
        #[command(flatten)]
        filters: FilterArgs,
    },
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// First identifier to probe; skips the resume lookup
    #[arg(long)]
    pub start: Option<u64>,

    /// Stop after this many misses in a row
    #[arg(long, default_value_t = MAX_CONSECUTIVE_FAILURES, value_parser = clap::value_parser!(u32).range(1..))]
    pub max_failures: u32,

    /// Flush to disk every N buffered rows
    #[arg(long, default_value_t = FLUSH_EVERY_ROWS)]
    pub flush_every: usize,

    /// Pause a random [0, max-delay) seconds after each record found
    #[arg(long)]
    pub delay: bool,

    /// Upper bound of that pause, in seconds
    #[arg(long, default_value_t = MAX_DELAY_SECS)]
    pub max_delay: f64,
}

#[derive(Debug, Default, Args)]
pub struct FilterArgs {
    #[arg(long = "year")]
    pub years: Vec<i32>,
    /// Comma separated codigoBDNS values
    #[arg(long)]
    pub code: Option<String>,
    /// Case-insensitive text in the description
    #[arg(long)]
    pub search: Option<String>,
    #[arg(long)]
    pub received_from: Option<NaiveDate>,
    #[arg(long)]
    pub received_to: Option<NaiveDate>,
    /// Application window opens on or after
    #[arg(long)]
    pub apply_from: Option<NaiveDate>,
    /// Application window closes on or before
    #[arg(long)]
    pub apply_to: Option<NaiveDate>,
    #[arg(long = "organ1")]
    pub organ1: Vec<String>,
    #[arg(long = "organ2")]
    pub organ2: Vec<String>,
    #[arg(long = "region")]
    pub regions: Vec<String>,
    #[arg(long = "sector")]
    pub sectors: Vec<String>,
    #[arg(long = "beneficiary")]
    pub beneficiaries: Vec<String>,
    /// tipoConvocatoria
    #[arg(long = "kind")]
    pub kinds: Vec<String>,
    #[arg(long)]
    pub min_budget: Option<f64>,
    #[arg(long)]
    pub max_budget: Option<f64>,
    #[arg(long, conflicts_with = "closed")]
    pub open: bool,
    #[arg(long)]
    pub closed: bool,
}

impl From<FilterArgs> for Filters {
    fn from(a: FilterArgs) -> Self {
        Filters {
            years: a.years,
            codes: a.code.as_deref().map(Filters::parse_codes).unwrap_or_default(),
            search: a.search,
            received: DateRange { from: a.received_from, to: a.received_to },
            apply_from: a.apply_from,
            apply_to: a.apply_to,
            organo_nivel1: a.organ1,
            organo_nivel2: a.organ2,
            regions: a.regions,
            sectors: a.sectors,
            beneficiaries: a.beneficiaries,
            kinds: a.kinds,
            min_budget: a.min_budget,
            max_budget: a.max_budget,
            open: match (a.open, a.closed) {
                (true, _) => Some(true),
                (_, true) => Some(false),
                _ => None,
            },
        }
    }
}

impl Cli {
    fn options(&self) -> ScrapeOptions {
        ScrapeOptions {
            api_url: self.api_url.clone(),
            data_dir: self.data_dir.clone(),
            file_prefix: self.prefix.clone(),
            ..ScrapeOptions::default()
        }
    }
}

pub fn run() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    crate::log::init(cli.log_file.as_deref(), cli.verbose).wrap_err("failed to set up logging")?;

    let opts = cli.options();
    let store = PartitionStore::from_options(&opts);

    match cli.command {
        Command::Run(args) => crawl(opts, &store, args),
        Command::ResumePoint => {
            let start = scrape::resolve_start(&opts, &store).wrap_err("failed to scan partitions")?;
            println!("{start}");
            Ok(())
        }
        Command::Clean => clean(&store),
        Command::Summary(filters) => summary(&store, filters.into()),
        Command::Export { out, filters } => export(&store, &out, filters.into()),
    }
}

fn crawl(mut opts: ScrapeOptions, store: &PartitionStore, args: RunArgs) -> Result<()> {
    opts.start = args.start.map_or(StartPoint::Resume, StartPoint::At);
    opts.max_consecutive_failures = args.max_failures;
    opts.flush_every = args.flush_every.max(1);
    if args.delay {
        opts = opts.with_delay(args.max_delay);
    }

    let start = scrape::resolve_start(&opts, store).wrap_err("failed to compute the resume point")?;
    let mut fetcher = HttpFetcher::new(&opts).wrap_err("failed to build the HTTP client")?;

    let cancel = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancel);
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupted. Finishing the current request and saving...");
        flag.store(true, Ordering::SeqCst);
    })
    .wrap_err("failed to install the Ctrl-C handler")?;

    let mut progress = ConsoleProgress;
    let summary = Driver::new(store, &opts, start).run(&mut fetcher, &cancel, &mut progress);
    if summary.flush_failures > 0 {
        tracing::warn!(failures = summary.flush_failures, "some rows could not be saved");
    }
    Ok(())
}

fn clean(store: &PartitionStore) -> Result<()> {
    let reports = store.clean().wrap_err("failed to clean partitions")?;
    if reports.is_empty() {
        println!("No partitions in {}", store.dir().display());
    }
    for r in reports {
        println!(
            "{}: {} rows, {} duplicates removed",
            r.path.display(),
            r.after,
            r.removed()
        );
    }
    Ok(())
}

fn summary(store: &PartitionStore, filters: Filters) -> Result<()> {
    let catalog = Catalog::load(store).wrap_err("failed to load partitions")?;
    let view = catalog.filter(&filters);

    println!("== {} of {} rows match ==", view.len(), catalog.len());
    print_summary("", &view.summary());

    for y in view.by_year() {
        println!("\n-- {} --", y.year);
        print_summary("  ", &y.summary);
        if let (Some(first), Some(last)) = (y.first_received, y.last_received) {
            println!("  received      {first} .. {last}");
        }
        println!("  open/closed   {}/{}", y.open, y.closed);
        print_top("  top regions", &y.top_regions);
        print_top("  top sectors", &y.top_sectors);
    }
    Ok(())
}

fn print_summary(indent: &str, s: &Summary) {
    println!("{indent}records       {}", s.records);
    println!("{indent}unique codes  {}", s.unique_codes);
    println!("{indent}budget total  {:.2}", s.budget_sum);
    match s.budget_mean {
        Some(mean) => println!("{indent}budget mean   {mean:.2}"),
        None => println!("{indent}budget mean   -"),
    }
}

fn print_top(label: &str, ranked: &[(String, usize)]) {
    if ranked.is_empty() {
        return;
    }
    println!("{label}:");
    for (value, count) in ranked {
        println!("    {count:>6}  {value}");
    }
}

fn export(store: &PartitionStore, out: &Path, filters: Filters) -> Result<()> {
    let catalog = Catalog::load(store).wrap_err("failed to load partitions")?;
    let view = catalog.filter(&filters);

    if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
        crate::store::ensure_directory(parent)?;
    }
    let file = File::create(out).wrap_err_with(|| format!("cannot create {}", out.display()))?;
    let written = view.write_csv(BufWriter::new(file)).wrap_err("failed to write CSV")?;
    println!("Wrote {written} rows to {}", out.display());
    Ok(())
}

/// Progress lines on stdout; diagnostics still go through tracing.
struct ConsoleProgress;

impl Progress for ConsoleProgress {
    fn begin(&mut self, start_id: u64) {
        println!("Starting at BDNS {start_id}");
    }

    fn log(&mut self, msg: &str) {
        println!("{msg}");
    }

    fn item_done(&mut self, id: u64, rows: usize) {
        println!("[✓] BDNS {id} fetched ({rows} rows)");
    }

    fn item_missing(&mut self, id: u64, consecutive: u32) {
        println!("[404] BDNS {id} not found ({consecutive} in a row)");
    }

    fn item_failed(&mut self, id: u64, detail: &str, consecutive: u32) {
        println!("[!] BDNS {id}: {detail} ({consecutive} in a row)");
    }

    fn flushed(&mut self, r: &FlushReport) {
        println!("[SAVED] {} new rows -> {} ({} total)", r.appended, r.path.display(), r.total);
    }

    fn flush_failed(&mut self, year: i32, error: &str) {
        eprintln!("[ERROR] could not save {year}: {error}");
    }

    fn finish(&mut self, s: &RunSummary) {
        let reason = match s.stop_reason {
            StopReason::MaxConsecutiveFailures => "too many consecutive failures",
            StopReason::UserCancelled => "interrupted",
        };
        println!();
        println!("Stopped: {reason}");
        println!("  requests issued       {}", net::requests_issued());
        println!("  records found         {}", s.found);
        println!("  rows buffered         {}", s.rows_buffered);
        println!("  rows saved            {}", s.rows_flushed);
        match s.last_processed() {
            Some(id) => println!("  last id processed     {id}"),
            None => println!("  last id processed     -"),
        }
        println!("  consecutive failures  {}", s.consecutive_failures);
        if s.files_written.is_empty() {
            println!("  files written         -");
        }
        for path in &s.files_written {
            println!("  wrote                 {}", path.display());
        }
        let _ = io::Write::flush(&mut io::stdout());
    }
}

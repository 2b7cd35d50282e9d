use std::{
    error::Error,
    fs::{self, OpenOptions},
    io::{self, Write},
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use chrono::{DateTime, Datelike, Utc};
use chrono_tz::Tz;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use gridmeter::{
    catalog::{Report, catalog_from_config},
    cli::{Cli, Commands, parse_args},
    config::MeterConfig,
    http::HttpCsvSampleSource,
    sampledir::read_sample_dir,
    source::SampleSource,
    timerange::TimeRange,
};

fn main() {
    if let Err(err) = run() {
        eprintln!("gmeter: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let args = parse_args();
    init_logging(&args);

    match args.command {
        Commands::Catalog { config } => run_catalog(&config)?,
        Commands::Report {
            config,
            month,
            out,
        } => run_report(&config, &month, out.as_deref())?,
        Commands::Inspect { dir, glob } => run_inspect(&dir, &glob)?,
        Commands::Fetch {
            host,
            meter_tz,
            from,
            to,
            out,
        } => run_fetch(&host, &meter_tz, &from, &to, out.as_deref())?,
    }

    Ok(())
}

fn init_logging(args: &Cli) {
    let filter = if let Some(level) = args.log_level {
        EnvFilter::new(level.as_str())
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    // Report CSVs go to stdout; keep diagnostics on stderr.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn run_catalog(config_path: &str) -> Result<(), Box<dyn Error>> {
    let config = MeterConfig::load(Path::new(config_path))?;
    let tz = config.tz()?;
    let reports = catalog_from_config(&config, tz)?;
    if reports.is_empty() {
        println!("no reports producible");
        return Ok(());
    }
    for report in &reports {
        let start = report.range.t0.with_timezone(&report.tz);
        let end = report.range.t1.with_timezone(&report.tz);
        let coverage = if report.partial { "partial" } else { "full" };
        println!(
            "{} {coverage} {} .. {}",
            month_label(report),
            start.format("%Y-%m-%d %H:%M"),
            end.format("%Y-%m-%d %H:%M"),
        );
    }
    Ok(())
}

fn run_report(
    config_path: &str,
    month: &str,
    out: Option<&str>,
) -> Result<(), Box<dyn Error>> {
    let config = MeterConfig::load(Path::new(config_path))?;
    let tz = config.tz()?;
    let reports = catalog_from_config(&config, tz)?;
    let report = reports
        .iter()
        .find(|report| month_label(report) == month)
        .ok_or_else(|| format!("No report producible for {month}"))?;

    match out {
        Some(path) => {
            let mut file = fs::File::create(path)?;
            report.write(config.quantum(), &config.names(), &mut file)?;
            info!("wrote report for {month} to {path}");
        }
        None => {
            let stdout = io::stdout();
            let mut out = stdout.lock();
            report.write(config.quantum(), &config.names(), &mut out)?;
        }
    }
    Ok(())
}

fn month_label(report: &Report) -> String {
    let start = report.range.t0.with_timezone(&report.tz);
    format!("{:04}-{:02}", start.year(), start.month())
}

fn run_inspect(dir: &str, glob: &str) -> Result<(), Box<dyn Error>> {
    let dir = read_sample_dir(Path::new(dir), glob)?;
    for info in &dir.files {
        println!(
            "{}: {} ({} WH) .. {} ({} WH)",
            info.path.display(),
            info.first.time.format("%Y-%m-%d %H:%M:%S"),
            info.first.energy,
            info.last.time.format("%Y-%m-%d %H:%M:%S"),
            info.last.energy,
        );
    }
    println!(
        "{} files covering {} .. {}",
        dir.files.len(),
        dir.range.t0.format("%Y-%m-%d %H:%M:%S"),
        dir.range.t1.format("%Y-%m-%d %H:%M:%S"),
    );
    Ok(())
}

fn run_fetch(
    host: &str,
    meter_tz: &str,
    from: &str,
    to: &str,
    out: Option<&str>,
) -> Result<(), Box<dyn Error>> {
    let tz: Tz = meter_tz
        .parse()
        .map_err(|_| format!("Unknown timezone '{meter_tz}'"))?;
    let range = TimeRange::new(parse_instant(from)?, parse_instant(to)?);

    let cancel = Arc::new(AtomicBool::new(false));
    let handler_flag = cancel.clone();
    if let Err(err) = ctrlc::set_handler(move || {
        handler_flag.store(true, Ordering::Relaxed);
    }) {
        warn!("could not install Ctrl-C handler: {err}");
    }

    let mut source = HttpCsvSampleSource::fetch(host, range, tz, Some(cancel))?;
    let mut sink: Box<dyn Write> = match out {
        Some(path) => Box::new(OpenOptions::new().create(true).append(true).open(path)?),
        None => Box::new(io::stdout().lock()),
    };

    let mut count = 0u64;
    while let Some(sample) = source.read_sample()? {
        writeln!(sink, "{}", sample.format_line())?;
        count += 1;
    }
    sink.flush()?;
    info!("fetched {count} samples from {host}");
    Ok(())
}

fn parse_instant(text: &str) -> Result<DateTime<Utc>, Box<dyn Error>> {
    let parsed = DateTime::parse_from_rfc3339(text)
        .map_err(|err| format!("Bad instant '{text}': {err}"))?;
    Ok(parsed.with_timezone(&Utc))
}

//! Simulated synchronization run that exports its performance counters.
//!
//! One thread per management agent imports objects, runs them through the
//! timed holistic sync stages and exports them again. The counters are
//! printed in the chosen format at the end.
//!
//! Run with:
//! ```bash
//! cargo run --example sync_demo --features demo -- --help
//! RUST_LOG=mmsperf=debug cargo run --example sync_demo --features demo -- -f prometheus
//! ```

use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use mmsperf::block::PerfBlock;
use mmsperf::config::{PerfConfig, TimerUnit};
use mmsperf::header::{check_header, render_header};
use mmsperf::instances::InstanceSet;
use mmsperf::layout::{Category, CounterId};
use mmsperf::observers::json::JsonObserver;
use mmsperf::observers::prometheus::PrometheusObserver;
use mmsperf::observers::table::{CompactSeparator, TableObserver, TableStyle};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// One table per category and agent
    Table,
    /// Multi-column `name: value` grid
    Compact,
    /// Block snapshots as JSON
    Json,
    /// Prometheus exposition format
    Prometheus,
    /// The C offset header
    Header,
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum StyleChoice {
    Ascii,
    #[default]
    Rounded,
    Sharp,
    Modern,
    Markdown,
    Blank,
}

impl From<StyleChoice> for TableStyle {
    fn from(choice: StyleChoice) -> Self {
        match choice {
            StyleChoice::Ascii => TableStyle::Ascii,
            StyleChoice::Rounded => TableStyle::Rounded,
            StyleChoice::Sharp => TableStyle::Sharp,
            StyleChoice::Modern => TableStyle::Modern,
            StyleChoice::Markdown => TableStyle::Markdown,
            StyleChoice::Blank => TableStyle::Blank,
        }
    }
}

/// Simulates a synchronization run and prints its performance counters.
#[derive(Parser, Debug)]
#[command(name = "sync_demo")]
#[command(version, about, long_about = None)]
struct Args {
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,

    #[arg(short, long, value_enum, default_value_t = StyleChoice::Rounded)]
    style: StyleChoice,

    /// Management agents to simulate, one thread each
    #[arg(short, long, value_delimiter = ',', default_value = "ADMA,AADMA")]
    agents: Vec<String>,

    /// Objects imported per agent
    #[arg(short, long, default_value_t = 200)]
    objects: u64,

    /// Live categories; defaults to MMSPERF_CATEGORIES or all
    #[arg(short, long, value_delimiter = ',')]
    categories: Vec<Category>,

    /// Unit for timer values (us or ms)
    #[arg(short, long)]
    timer_unit: Option<TimerUnit>,

    /// Columns for the compact format
    #[arg(long, default_value_t = 2)]
    columns: usize,

    /// Leave out zero values in table output
    #[arg(long)]
    hide_zero: bool,

    /// Pretty-print JSON
    #[arg(long)]
    pretty: bool,

    /// Check a header file against the built-in layout and exit
    #[arg(long, value_name = "PATH")]
    check: Option<PathBuf>,
}

fn simulate_agent(block: &PerfBlock, objects: u64) -> mmsperf::Result<()> {
    block.time(CounterId::MaExtensionGenerateImportFileTimer, || {
        thread::sleep(Duration::from_micros(300));
    })?;

    for n in 0..objects {
        block.increment(CounterId::MaObjectsImported)?;

        let _sync = block.start_timer(CounterId::HsSynchronizeTimer)?;
        block.time(CounterId::HsFindCsObjectTimer, || {
            thread::sleep(Duration::from_micros(20));
        })?;
        {
            let _stage = block.start_timer(CounterId::HsStageTimer)?;
            block.record(CounterId::HsStageCreateTimer, Duration::from_micros(15))?;
            block.record(CounterId::HsCsPersistTimer, Duration::from_micros(40))?;
        }
        if n % 7 == 0 {
            block.time(CounterId::HsProvisionTimer, || {
                thread::sleep(Duration::from_micros(50));
            })?;
        }
        if n % 25 == 0 {
            block.increment(CounterId::SeRetrysProcessed)?;
            block.record(CounterId::HsRetryTimer, Duration::from_micros(120))?;
        }

        if n % 3 == 0 {
            prune(block, 3)?;
        }

        if n % 2 == 0 {
            block.increment(CounterId::MaObjectsExported)?;
        }
    }

    block.time(CounterId::MaExtensionWriteExportFileTimer, || {
        thread::sleep(Duration::from_micros(200));
    })?;
    Ok(())
}

/// Walks a small connector space subtree, raising the recursion gauge.
fn prune(block: &PerfBlock, depth: u32) -> mmsperf::Result<()> {
    let _level = block.enter(CounterId::CsPruneRecursionLevel)?;
    block.increment(CounterId::CsPruneCacheReads)?;
    if depth == 0 {
        block.increment(CounterId::CsObjectsPruned)?;
        block.increment(CounterId::CsPruneCacheWrites)?;
        return Ok(());
    }
    prune(block, depth - 1)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if let Some(path) = &args.check {
        let text = std::fs::read_to_string(path)?;
        check_header(&text)?;
        println!("{}: matches the built-in layout", path.display());
        return Ok(());
    }

    let mut config = PerfConfig::from_env()?;
    if !args.categories.is_empty() {
        config = config.with_categories(args.categories.iter().copied());
    }
    if let Some(unit) = args.timer_unit {
        config = config.with_timer_unit(unit);
    }

    let agents = InstanceSet::with_config(config);
    let handles: Vec<_> = args
        .agents
        .iter()
        .map(|name| {
            let block = agents.get_or_create(name);
            let objects = args.objects;
            thread::spawn(move || simulate_agent(&block, objects))
        })
        .collect();

    for handle in handles {
        handle
            .join()
            .map_err(|_| "agent thread panicked")??;
    }
    info!(agents = agents.len(), objects = args.objects, "sync run finished");

    match args.format {
        OutputFormat::Table => {
            for block in agents.blocks() {
                let observer = TableObserver::new()
                    .with_style(args.style.into())
                    .hide_zero(args.hide_zero);
                println!("== {} ==", block.instance().unwrap_or("(default)"));
                println!("{}\n", observer.render_block(&block));
            }
        }
        OutputFormat::Compact => {
            for block in agents.blocks() {
                let observer = TableObserver::new()
                    .with_style(args.style.into())
                    .with_title(block.instance().unwrap_or("(default)"))
                    .compact(true)
                    .columns(args.columns)
                    .separator(CompactSeparator::Colon)
                    .hide_zero(args.hide_zero);
                println!("{}\n", observer.render(block.observables().into_iter()));
            }
        }
        OutputFormat::Json => {
            let observer = JsonObserver::new().pretty(args.pretty);
            for block in agents.blocks() {
                println!("{}", observer.block_to_json(&block)?);
            }
        }
        OutputFormat::Prometheus => {
            let output = PrometheusObserver::new()
                .with_namespace("aadsync")
                .render_instances(&agents)?;
            print!("{}", output);
        }
        OutputFormat::Header => print!("{}", render_header()),
    }

    Ok(())
}

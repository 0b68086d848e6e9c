// == Std
use std::{fs, ops::Range, process::ExitCode};

// == Internal crates
use tree_collector::{
    common::RemotePath,
    v1::{
        collector::{CollectOptions, DEFAULT_CONCURRENCY, collect},
        mock_client::MockMetadataApi,
    },
};

// == External crates
use argh::FromArgs;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(FromArgs)]
/// Lists every file beneath a directory of a mock namespace loaded from mock data generator output
struct Args {
    /// maximum number of metadata requests in flight
    #[argh(option, short = 'j', default = "DEFAULT_CONCURRENCY")]
    concurrency: usize,
    /// sort files by depth, shallower files first
    #[argh(switch, short = 'o')]
    order: bool,
    /// directory to list, defaults to the namespace root
    #[argh(option, short = 'r', default = "String::new()")]
    root: String,
    /// namespace root the records are loaded under
    #[argh(option, default = "String::new()")]
    namespace_root: String,
    /// simulated request latency range in milliseconds, as `A..B` with B exclusive
    #[argh(option, default = "0..1", from_str_fn(parse_latency_range))]
    latency_ms: Range<u32>,
    /// paths whose metadata requests fail, may be repeated
    #[argh(option)]
    fail: Vec<String>,
    /// log debug output
    #[argh(switch, short = 'v')]
    verbose: bool,
    /// JSON record list written by mock_data_generator
    #[argh(positional)]
    records: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args: Args = argh::from_env();
    setup_logging(args.verbose);

    match run(args).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{e}");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Returns whether every reachable path was listed
async fn run(args: Args) -> Result<bool, Box<dyn std::error::Error>> {
    let json = fs::read_to_string(&args.records)?;
    let mut api = MockMetadataApi::from_json(RemotePath::new(&args.namespace_root)?, &json)?
        .with_latency_ms(args.latency_ms);
    for path in &args.fail {
        api = api.fail_path(RemotePath::new(path)?);
    }

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nInterrupt received, stopping...");
            interrupt.cancel();
        }
    });

    let root = RemotePath::new(&args.root)?;
    let options = CollectOptions::default()
        .with_concurrency(args.concurrency)
        .with_order(args.order)
        .with_cancellation(cancel);
    let result = collect(&api, &root, options).await;

    serde_json::to_writer_pretty(std::io::stdout(), &result.files)?;
    println!();

    for failure in &result.failures {
        warn!(path = %failure.path, "{}", failure.kind);
    }
    let total_bytes: u64 = result.files.iter().map(|file| file.size).sum();
    info!(
        files = result.files.len(),
        total_bytes,
        requests = api.fetch_count(),
        peak_in_flight = api.peak_in_flight(),
        "Listing finished"
    );

    match &result.error {
        Some(error) => {
            eprintln!("{error}");
            Ok(false)
        }
        None => Ok(true),
    }
}

/// Parses `A..B` into a millisecond range
fn parse_latency_range(value: &str) -> Result<Range<u32>, String> {
    let (start, end) = value
        .split_once("..")
        .ok_or_else(|| format!("expected a range like 0..20, got '{value}'"))?;
    let start = start.trim().parse::<u32>().map_err(|e| format!("invalid range start '{start}': {e}"))?;
    let end = end.trim().parse::<u32>().map_err(|e| format!("invalid range end '{end}': {e}"))?;
    if start > end {
        return Err(format!("range start {start} is past its end {end}"));
    }
    Ok(start..end)
}

fn setup_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("tree_collector=debug,collect_mock=debug,warn")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("tree_collector=info,collect_mock=info,warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use log::{info, warn, LevelFilter};

use dvbs2rx_lib::adapters::{FrameFormat, FrameWriter, U8IqReader};
use dvbs2rx_lib::{pipeline, ReceiverConfig, RxError, RxResult};

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum OutputFormat {
    /// Interleaved little-endian f32 payload symbols
    Raw,
    /// One JSON record per frame
    Json,
}

/// DVB-S2 receiver: u8 IQ samples in, PLFRAME payloads out
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// JSON configuration profile
    config: Option<PathBuf>,
    /// Input IQ file (stdin if omitted)
    #[arg(short, long)]
    input: Option<PathBuf>,
    /// Output file (stdout if omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,
    #[arg(value_enum, short, long, default_value_t = OutputFormat::Raw)]
    format: OutputFormat,
    /// Override the configured log verbosity (repeat for more)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn level_for(debug: u8) -> LevelFilter {
    match debug {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

fn init_logging(debug: u8) {
    let mut builder = env_logger::Builder::new();
    match std::env::var("RUST_LOG") {
        Ok(filters) => builder.parse_filters(&filters),
        Err(_) => builder.filter_level(level_for(debug)),
    };
    builder.init();
}

fn main() -> RxResult<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => ReceiverConfig::load(path)?,
        None => ReceiverConfig::default(),
    };
    init_logging(config.debug.max(args.verbose));

    let input: Box<dyn Read + Send> = match &args.input {
        Some(path) => Box::new(BufReader::new(File::open(path)?)),
        None => Box::new(BufReader::new(io::stdin())),
    };
    let output: Box<dyn io::Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };
    let format = match args.format {
        OutputFormat::Raw => FrameFormat::Raw,
        OutputFormat::Json => FrameFormat::JsonLines,
    };

    let mut sink = FrameWriter::new(output, format);
    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        ctrlc::set_handler(move || {
            info!("Interrupted, stopping receiver");
            running.store(false, Ordering::SeqCst);
        })
        .map_err(|e| RxError::Pipeline(format!("Could not install signal handler: {e}")))?;
    }
    let stats = pipeline::run(config, U8IqReader::new(input), &mut sink, running)?;

    match serde_json::to_string(&stats) {
        Ok(json) => info!("Final statistics: {json}"),
        Err(e) => warn!("Could not serialize statistics: {e}"),
    }
    Ok(())
}

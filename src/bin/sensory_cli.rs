use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use sensory_pipeline::analysis::FeatureSnapshot;
use sensory_pipeline::codec;
use sensory_pipeline::link::{self, PortDescriptor};
use sensory_pipeline::{AppConfig, Pipeline, PipelineStatistics};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match cli.execute() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("sensory_cli error: {err:?}");
            ExitCode::from(1)
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[derive(Parser, Debug)]
#[command(
    name = "sensory_cli",
    about = "Serial telemetry diagnostics for the sensory pipeline"
)]
struct Cli {
    /// Enable debug logging (RUST_LOG overrides)
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

impl Cli {
    fn execute(self) -> Result<()> {
        match self.command {
            Command::Ports(args) => ports_command(args),
            Command::Parse(args) => parse_command(args),
            Command::Monitor(args) => monitor_command(args),
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List serial ports that look like a sensing device.
    Ports(PortsArgs),
    /// Decode one telemetry frame and print it as JSON.
    Parse(ParseArgs),
    /// Run the pipeline and print feature snapshots.
    Monitor(MonitorArgs),
}

#[derive(Args, Debug, Clone)]
struct PortsArgs {
    /// Pipeline configuration (vendor ids and keywords)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Show every port, not only candidates
    #[arg(long)]
    all: bool,
}

#[derive(Args, Debug, Clone)]
struct ParseArgs {
    /// Frame text, e.g. "AMP:512,FREQ:440,BASS:300,MID:200,TREBLE:100,BEAT:1"
    line: String,
}

#[derive(Args, Debug, Clone)]
struct MonitorArgs {
    #[arg(long)]
    config: Option<PathBuf>,
    /// Override the configured port ("auto" for discovery)
    #[arg(long)]
    port: Option<String>,
    /// How long to run before stopping (milliseconds).
    #[arg(long, default_value_t = 10_000)]
    duration_ms: u64,
    /// Interval between printed snapshots (milliseconds).
    #[arg(long, default_value_t = 500)]
    interval_ms: u64,
    /// Write rhythm and silence frames back to the device
    #[arg(long)]
    control: bool,
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Json,
    Table,
}

fn load_config(path: Option<&PathBuf>) -> AppConfig {
    match path {
        Some(path) => AppConfig::load_from_file(path),
        None => AppConfig::load(),
    }
}

fn ports_command(args: PortsArgs) -> Result<()> {
    let config = load_config(args.config.as_ref());
    let ports: Vec<PortDescriptor> = if args.all {
        link::list_ports().context("failed to enumerate serial ports")?
    } else {
        link::list_candidate_ports(&config.link).context("failed to enumerate serial ports")?
    };

    if ports.is_empty() {
        println!("No {}serial ports found", if args.all { "" } else { "candidate " });
        return Ok(());
    }

    println!("{:<24} {:>6} {:>6}  description", "port", "vid", "pid");
    for port in ports {
        println!(
            "{:<24} {:>6} {:>6}  {}",
            port.name,
            port.vid.map(|v| format!("{v:04x}")).unwrap_or_else(|| "-".into()),
            port.pid.map(|p| format!("{p:04x}")).unwrap_or_else(|| "-".into()),
            port.description()
        );
    }
    Ok(())
}

fn parse_command(args: ParseArgs) -> Result<()> {
    let frame = codec::parse(&args.line).with_context(|| format!("could not decode {:?}", args.line))?;
    let json = serde_json::to_string_pretty(&frame).context("failed to serialize frame")?;
    println!("{json}");
    Ok(())
}

fn monitor_command(args: MonitorArgs) -> Result<()> {
    let mut config = load_config(args.config.as_ref());
    if let Some(port) = args.port {
        config.link.port = port;
    }
    config.link.enabled = true;
    config.control.enabled |= args.control;

    if args.interval_ms == 0 {
        bail!("--interval-ms must be positive");
    }

    let pipeline = Pipeline::new(config);
    pipeline.start().context("pipeline failed to start")?;

    let deadline = Instant::now() + Duration::from_millis(args.duration_ms);
    let interval = Duration::from_millis(args.interval_ms);
    let mut last_printed = None;
    while Instant::now() < deadline && pipeline.is_running() {
        thread::sleep(interval);
        let Some(snapshot) = pipeline.latest_snapshot() else {
            continue;
        };
        if last_printed == Some(snapshot.timestamp()) {
            continue;
        }
        last_printed = Some(snapshot.timestamp());
        print_snapshot(&snapshot, args.format)?;
    }

    let link_failed = pipeline.link_failed();
    pipeline.stop();
    let stats = pipeline.statistics();
    print_statistics(&stats, args.format)?;
    if link_failed {
        let port = stats
            .link
            .and_then(|link| link.port_name)
            .unwrap_or_else(|| "<unknown>".into());
        bail!("serial link on {port} was lost; see the log for the read errors");
    }
    Ok(())
}

fn print_snapshot(snapshot: &FeatureSnapshot, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let line = serde_json::to_string(snapshot).context("failed to serialize snapshot")?;
            println!("{line}");
        }
        OutputFormat::Table => println!(
            "t={:>9.3}s amp={:.3} bpm={:>6.1} conf={:.2} phase={:?} centroid={:>7.1}Hz onset={} silence={}",
            snapshot.timestamp(),
            snapshot.raw.amplitude,
            snapshot.rhythm.tempo_bpm,
            snapshot.rhythm.beat_confidence,
            snapshot.envelope.phase,
            snapshot.spectral.centroid,
            snapshot.events.onset,
            snapshot.events.silence
        ),
    }
    Ok(())
}

fn print_statistics(stats: &PipelineStatistics, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(stats).context("failed to serialize statistics")?;
            println!("{json}");
        }
        OutputFormat::Table => {
            println!("Snapshots        : {}", stats.samples_processed);
            println!("Avg cycle time   : {:?}", stats.avg_processing_time);
            println!("Feature buffer   : {:.1}%", stats.buffer_fill_ratio * 100.0);
            println!("Raw buffer       : {:.1}%", stats.raw_fill_ratio * 100.0);
            if let Some(link) = &stats.link {
                println!(
                    "Link             : {} packets, {} lost ({:.2}% loss), {} parse errors",
                    link.packets_received,
                    link.packets_lost,
                    link.loss_rate() * 100.0,
                    link.parse_errors
                );
            }
        }
    }
    Ok(())
}

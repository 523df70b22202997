/*
 * CLI entry point
 *
 * Parses a scenario file through the command driver and prints the final
 * state. `--snapshot` additionally streams a machine-readable snapshot
 * after every mutating or examine line (§4.10).
 */

use std::fs::File;
use std::io::{BufReader, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use arbiter::snapshot::LogBuffer;
use arbiter::{Arbiter, ArbiterConfig, PolicyMode};

#[derive(Parser, Debug)]
#[command(name = "arbiter", about = "Simulated resource-allocation arbiter")]
struct Args {
    /// Path to the scenario source file.
    #[arg(default_value = "scenario.txt")]
    scenario: PathBuf,

    /// Seed the initial policy before the scenario's own `S` lines run.
    #[arg(long, value_enum)]
    policy: Option<CliPolicy>,

    /// Emit a machine-readable snapshot after every mutating or examine line.
    #[arg(long)]
    snapshot: bool,

    /// Increase log verbosity; repeatable (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Path to an optional configuration file.
    #[arg(long, default_value = "arbiter.toml")]
    config: PathBuf,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum CliPolicy {
    Avoid,
    Detect,
}

impl From<CliPolicy> for PolicyMode {
    fn from(p: CliPolicy) -> Self {
        match p {
            CliPolicy::Avoid => PolicyMode::Avoid,
            CliPolicy::Detect => PolicyMode::Detect,
        }
    }
}

/// Installs `env_logger` as the process-wide logger and, via its format
/// callback, mirrors every emitted line into a `LogBuffer` the driver can
/// drain for snapshots (§4.9).
fn init_logging(verbosity: u8) -> Arc<LogBuffer> {
    let level = match verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    let buffer = Arc::new(LogBuffer::new());
    let sink = buffer.clone();
    env_logger::Builder::new()
        .filter_level(level)
        .format(move |f, record| {
            sink.push(format!("{:>5} {}: {}", record.level(), record.target(), record.args()));
            writeln!(f, "{:>5} {}: {}", record.level(), record.target(), record.args())
        })
        .init();
    buffer
}

fn main() -> ExitCode {
    let args = Args::parse();
    let log_buffer = init_logging(args.verbose);

    let config = match ArbiterConfig::load(&args.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            log::error!("configuration error: {e}");
            return ExitCode::from(2);
        }
    };

    let file = match File::open(&args.scenario) {
        Ok(f) => f,
        Err(e) => {
            log::error!("cannot open scenario {}: {e}", args.scenario.display());
            return ExitCode::from(2);
        }
    };

    let mut arb = Arbiter::with_clock_and_config(arbiter::MonotonicClock, config);
    if let Some(policy) = args.policy {
        let _ = arb.set_policy(policy.into());
    }

    let reader = BufReader::new(file);
    let outcome = if args.snapshot {
        arbiter::driver::run(&mut arb, reader, Some(&log_buffer), |snap| match snap.to_framed_json() {
            Ok(text) => println!("{text}"),
            Err(e) => log::error!("failed to serialize snapshot: {e}"),
        })
    } else {
        arbiter::driver::run(&mut arb, reader, Some(&log_buffer), |_| {})
    };

    print_summary(&arb, &outcome);

    if outcome.read_error {
        ExitCode::from(3)
    } else {
        ExitCode::SUCCESS
    }
}

fn print_summary<C: arbiter::Clock>(arb: &Arbiter<C>, outcome: &arbiter::driver::DriverOutcome) {
    println!(
        "processed {} line(s), {} malformed, policy={}",
        outcome.lines_processed,
        outcome.malformed_lines,
        arb.policy().name()
    );
    for (id, p) in arb.processes() {
        println!(
            "  {id}: priority={} holding={:?} waiting={}",
            p.priority,
            p.holdings,
            arb.waits().is_waiting(*id)
        );
    }
}

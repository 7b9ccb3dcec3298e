//! `ofprobe <iface> <ofp_port>` — passive OpenFlow control-channel latency
//! probe, wiring the live capture backend, capture loop, endpoint store,
//! and optional statistics log together.
//!
//! Logging follows the teacher's `examples/pcap_dump.rs` pattern: `-v`
//! raises the `env_logger` filter from `warn` to `info`, and `tracing`'s
//! `log` feature routes this crate's `tracing` calls through it.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use ofprobe::capture;
use ofprobe::logfile::StatsLog;
use ofprobe::pcap_source::PcapSource;
use ofprobe::store::EndpointLatencyStore;

#[derive(Parser)]
#[command(name = "ofprobe", about = "Passive OpenFlow 1.0 control-channel latency probe")]
struct Args {
    /// Capture device to listen on, e.g. "eth0".
    iface: String,

    /// TCP port the OpenFlow control channel runs on.
    ofp_port: u16,

    /// Write one line per sample to a timestamped log file in this directory.
    #[arg(long, value_name = "DIR")]
    stats_log_dir: Option<PathBuf>,

    /// Raise log verbosity to `info`.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let log_level = if args.verbose { log::LevelFilter::Info } else { log::LevelFilter::Warn };
    env_logger::Builder::new().filter(None, log_level).init();

    let store = match args.stats_log_dir {
        Some(dir) => match StatsLog::open_now(&dir) {
            Ok(log) => {
                info!(path = %log.path().display(), "opened statistics log");
                EndpointLatencyStore::with_log(log)
            }
            Err(e) => {
                error!(error = %e, "failed to open statistics log");
                return ExitCode::FAILURE;
            }
        },
        None => EndpointLatencyStore::new(),
    };

    let source = match PcapSource::open(&args.iface, args.ofp_port) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, iface = %args.iface, "failed to open capture device");
            return ExitCode::FAILURE;
        }
    };

    let stop = Arc::new(AtomicBool::new(false));
    for sig in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
        if let Err(e) = signal_hook::flag::register(sig, Arc::clone(&stop)) {
            error!(error = %e, signal = sig, "failed to register signal handler");
            return ExitCode::FAILURE;
        }
    }

    info!(iface = %args.iface, ofp_port = args.ofp_port, "starting capture");
    capture::run(source, &store, args.ofp_port, &stop);
    info!("capture stopped");

    ExitCode::SUCCESS
}

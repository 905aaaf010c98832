//! `tsinspect`: a CLI front-end over [`mpegts_demux`], printing the
//! decoded event stream and a periodic JSON snapshot of the accumulated SI
//! model (spec.md §6 "External Interfaces").
//!
//! Grounded on the teacher's `bin/cli.rs` + `core::run` (clap-derive
//! options feeding an async read loop with a periodic
//! `Reporter::generate_json_report` print), adapted to this crate's
//! synchronous, pull-based [`Parser`] instead of the teacher's inline
//! per-datagram processing: the parser runs on a blocking task
//! (`tokio::task::spawn_blocking`), forwarding decoded events and
//! periodic JSON snapshots over unbounded channels to an async loop that
//! prints them.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::Parser as ClapParser;
use mpegts_demux::config::{Config, PidFilter};
use mpegts_demux::model::Event;
use mpegts_demux::parser::{Parser, ParserError};
use mpegts_demux::report;
use tokio::sync::mpsc;

/// MPEG-2 Transport Stream demultiplexer and DVB/SI table inspector.
#[derive(ClapParser)]
#[command(name = "tsinspect", about)]
struct Opt {
    /// Read a concatenation of 188-byte packets from this file instead of
    /// a UDP socket. Mutually exclusive with `--addr`.
    #[arg(long)]
    path: Option<PathBuf>,

    /// UDP socket to bind (and, if multicast, join) for reading packets.
    #[arg(long, default_value = "239.1.1.2:1234")]
    addr: String,

    /// Only decode these PIDs (decimal or `0x`-prefixed hex, comma
    /// separated). Mutually exclusive with `--skip-pids`.
    #[arg(long, value_delimiter = ',')]
    target_pids: Vec<String>,

    /// Skip these PIDs in addition to the default skip set (decimal or
    /// `0x`-prefixed hex, comma separated). Mutually exclusive with
    /// `--target-pids`.
    #[arg(long, value_delimiter = ',')]
    skip_pids: Vec<String>,

    /// Suppress PES header decoding.
    #[arg(long, default_value_t = false)]
    skip_pes: bool,

    /// Suppress PSI/SI section decoding.
    #[arg(long, default_value_t = false)]
    skip_psi: bool,

    /// Suppress the adaptation-field parse step.
    #[arg(long, default_value_t = false)]
    ignore_adaptation: bool,

    /// Suppress the payload parse step.
    #[arg(long, default_value_t = false)]
    ignore_payload: bool,

    /// Suppress PAT-updated events from the printed stream.
    #[arg(long, default_value_t = false)]
    hide_pat: bool,

    /// Suppress PMT-updated events from the printed stream.
    #[arg(long, default_value_t = false)]
    hide_pmt: bool,

    /// Suppress SDT-updated events from the printed stream.
    #[arg(long, default_value_t = false)]
    hide_sdt: bool,

    /// Suppress EIT-updated events from the printed stream.
    #[arg(long, default_value_t = false)]
    hide_eit: bool,

    /// Suppress TDT-updated events from the printed stream.
    #[arg(long, default_value_t = false)]
    hide_tdt: bool,

    /// Suppress events for packets without `payload_unit_start_indicator`.
    #[arg(long, default_value_t = false)]
    hide_not_pusi: bool,

    /// Enable ETSI TR 101 290 conformance counters, included in the
    /// periodic JSON snapshot.
    #[arg(long, default_value_t = false)]
    tr101: bool,

    /// Seconds between JSON snapshot prints.
    #[arg(long, default_value_t = 2)]
    refresh: u64,

    /// Suppress the per-event log line; only print periodic snapshots.
    #[arg(long, default_value_t = false)]
    quiet: bool,
}

fn parse_pid(s: &str) -> anyhow::Result<u16> {
    let s = s.trim();
    let pid = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u16::from_str_radix(hex, 16)?
    } else {
        s.parse()?
    };
    Ok(pid)
}

fn parse_pids(values: &[String]) -> anyhow::Result<std::collections::HashSet<u16>> {
    values.iter().filter(|s| !s.is_empty()).map(|s| parse_pid(s)).collect()
}

fn build_config(opt: &Opt) -> anyhow::Result<Config> {
    if !opt.target_pids.is_empty() && !opt.skip_pids.is_empty() {
        anyhow::bail!("--target-pids and --skip-pids are mutually exclusive");
    }

    let mut config = match &opt.path {
        Some(path) => Config::from_path(path),
        None => Config::from_udp(opt.addr.parse()?),
    };

    if !opt.target_pids.is_empty() {
        config.pid_filter = PidFilter::Target(parse_pids(&opt.target_pids)?);
    } else if !opt.skip_pids.is_empty() {
        let mut skip = parse_pids(&opt.skip_pids)?;
        if let PidFilter::Skip(defaults) = PidFilter::default() {
            skip.extend(defaults);
        }
        config.pid_filter = PidFilter::Skip(skip);
    }

    config.skip_pes = opt.skip_pes;
    config.skip_psi = opt.skip_psi;
    config.ignore_adaptation = opt.ignore_adaptation;
    config.ignore_payload = opt.ignore_payload;
    config.hide_pat = opt.hide_pat;
    config.hide_pmt = opt.hide_pmt;
    config.hide_sdt = opt.hide_sdt;
    config.hide_eit = opt.hide_eit;
    config.hide_tdt = opt.hide_tdt;
    config.hide_not_pusi = opt.hide_not_pusi;
    config.enable_tr101 = opt.tr101;

    Ok(config)
}

/// What the blocking parser task reports back on exit (spec.md §6 "Exit
/// codes").
enum RunOutcome {
    Eof,
    Fatal(ParserError),
    Io(std::io::Error),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let opt = Opt::parse();
    let config = build_config(&opt)?;
    let quiet = opt.quiet;
    let refresh = Duration::from_secs(opt.refresh.max(1));

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<Event>();
    let (snapshot_tx, mut snapshot_rx) = mpsc::unbounded_channel::<String>();

    let parse_task = tokio::task::spawn_blocking(move || -> RunOutcome {
        let mut parser = match Parser::open(config) {
            Ok(parser) => parser,
            Err(e) => return RunOutcome::Io(e),
        };
        let mut last_snapshot = Instant::now();
        loop {
            match parser.next_event() {
                Ok(Some(event)) => {
                    if event_tx.send(event).is_err() {
                        return RunOutcome::Eof;
                    }
                    if last_snapshot.elapsed() >= refresh {
                        let snap = report::snapshot(
                            parser.model(),
                            parser.stats(),
                            parser.tr101_metrics(),
                            chrono::Utc::now().to_rfc3339(),
                        );
                        let _ = snapshot_tx.send(report::to_json_pretty(&snap));
                        last_snapshot = Instant::now();
                    }
                }
                Ok(None) => return RunOutcome::Eof,
                Err(e) => return RunOutcome::Fatal(e),
            }
        }
    });

    let print_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                event = event_rx.recv() => {
                    match event {
                        Some(event) => {
                            if !quiet {
                                log::info!("{event:?}");
                            }
                        }
                        None => break,
                    }
                }
                snapshot = snapshot_rx.recv() => {
                    if let Some(json) = snapshot {
                        println!("{json}");
                    }
                }
            }
        }
    });

    let exit_code = tokio::select! {
        outcome = parse_task => {
            let _ = print_task.await;
            match outcome {
                Ok(RunOutcome::Eof) => 0,
                Ok(RunOutcome::Fatal(e)) => {
                    log::error!("fatal parse error: {e}");
                    1
                }
                Ok(RunOutcome::Io(e)) => {
                    log::error!("I/O error: {e}");
                    2
                }
                Err(e) => {
                    log::error!("parser task panicked: {e}");
                    1
                }
            }
        }
        _ = tokio::signal::ctrl_c() => {
            log::info!("interrupted");
            130
        }
    };

    std::process::exit(exit_code);
}

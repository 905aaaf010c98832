//! Parser configuration (spec.md §6 "External Interfaces: Configuration").

use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::constants::DEFAULT_SKIP_PIDS;

/// Where the byte stream originates. Source adapters are external
/// collaborators (see [`crate::source`]); this only records which one to
/// build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceKind {
    /// Read a concatenation of 188-byte packets from a local file.
    Path(PathBuf),
    /// Join an IPv4 multicast group (or bind a unicast socket) and read
    /// datagrams of one or more 188-byte packets.
    Udp {
        /// Multicast group or unicast bind address.
        addr: SocketAddr,
    },
}

/// PID filter: at most one of `target_pids` / `skip_pids` is active, per
/// spec.md §6 ("mutually exclusive").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PidFilter {
    /// Only these PIDs pass; everything else is skipped.
    Target(HashSet<u16>),
    /// These PIDs (plus the default skip set) are skipped; everything else
    /// passes.
    Skip(HashSet<u16>),
}

impl Default for PidFilter {
    fn default() -> Self {
        PidFilter::Skip(DEFAULT_SKIP_PIDS.iter().copied().collect())
    }
}

impl PidFilter {
    /// True if `pid` should be dropped before any further processing.
    pub fn is_skipped(&self, pid: u16) -> bool {
        match self {
            PidFilter::Target(targets) => !targets.contains(&pid),
            PidFilter::Skip(skip) => skip.contains(&pid),
        }
    }
}

/// Full parser configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Byte source selection.
    pub source: SourceKind,
    /// PID filtering (defaults to the spec.md §6 default skip set).
    pub pid_filter: PidFilter,
    /// Suppress PES decoding after payload classification.
    pub skip_pes: bool,
    /// Suppress PSI/SI section decoding after payload classification.
    pub skip_psi: bool,
    /// Suppress the adaptation-field parse step entirely.
    pub ignore_adaptation: bool,
    /// Suppress the payload parse step entirely (classification still runs).
    pub ignore_payload: bool,
    /// Presentation filter: suppress `PATUpdated` events.
    pub hide_pat: bool,
    /// Presentation filter: suppress `PMTUpdated` events.
    pub hide_pmt: bool,
    /// Presentation filter: suppress `SDTUpdated` events.
    pub hide_sdt: bool,
    /// Presentation filter: suppress `EITUpdated` events.
    pub hide_eit: bool,
    /// Presentation filter: suppress `TDTUpdated` events.
    pub hide_tdt: bool,
    /// Presentation filter: suppress events for non-PUSI packets.
    pub hide_not_pusi: bool,
    /// Enable TR 101 290 conformance counters alongside the SI model.
    pub enable_tr101: bool,
}

impl Config {
    /// A config reading `path`, with every filter/suppression left at its
    /// permissive default.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            source: SourceKind::Path(path.into()),
            ..Self::defaults()
        }
    }

    /// A config reading UDP datagrams from `addr`.
    pub fn from_udp(addr: SocketAddr) -> Self {
        Self {
            source: SourceKind::Udp { addr },
            ..Self::defaults()
        }
    }

    fn defaults() -> Self {
        Self {
            source: SourceKind::Path(PathBuf::new()),
            pid_filter: PidFilter::default(),
            skip_pes: false,
            skip_psi: false,
            ignore_adaptation: false,
            ignore_payload: false,
            hide_pat: false,
            hide_pmt: false,
            hide_sdt: false,
            hide_eit: false,
            hide_tdt: false,
            hide_not_pusi: false,
            enable_tr101: false,
        }
    }
}

//! Elementary-stream byte/bitrate statistics (SPEC_FULL.md supplement,
//! see DESIGN.md): byte counters only, no codec decoding — video/audio
//! elementary-stream decoding is out of spec.md's scope (§1 Non-goals).
//!
//! Grounded on the teacher's `stats/mod.rs`, stripped of its codec-field
//! (the teacher guesses H.264/AAC/AC-3 from PES contents; that lives in
//! `src/es.rs`/`src/parsers/` and is dropped entirely, see DESIGN.md).

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Running byte/packet counters for one PID.
#[derive(Debug, Clone)]
pub struct PidStats {
    /// Total TS packets observed on this PID.
    pub packet_count: u64,
    /// Total payload bytes observed (excludes header/adaptation field).
    pub payload_bytes: u64,
    /// When this PID was first observed.
    pub first_seen: Instant,
    /// When this PID was last observed.
    pub last_seen: Instant,
}

impl PidStats {
    fn new(now: Instant) -> Self {
        Self {
            packet_count: 0,
            payload_bytes: 0,
            first_seen: now,
            last_seen: now,
        }
    }

    /// Approximate bitrate in bits/second since this PID was first seen.
    pub fn bitrate_bps(&self) -> f64 {
        let elapsed = self.last_seen.saturating_duration_since(self.first_seen).as_secs_f64();
        if elapsed <= 0.0 {
            return 0.0;
        }
        (self.payload_bytes as f64 * 8.0) / elapsed
    }
}

/// Tracks [`PidStats`] for every PID seen so far.
pub struct StreamStats {
    pids: HashMap<u16, PidStats>,
}

impl StreamStats {
    /// An empty stats tracker.
    pub fn new() -> Self {
        Self { pids: HashMap::new() }
    }

    /// Records one packet's payload for `pid` at `now`.
    pub fn observe(&mut self, pid: u16, payload_len: usize, now: Instant) {
        let entry = self.pids.entry(pid).or_insert_with(|| PidStats::new(now));
        entry.packet_count += 1;
        entry.payload_bytes += payload_len as u64;
        entry.last_seen = now;
    }

    /// Stats for `pid`, if observed.
    pub fn get(&self, pid: u16) -> Option<&PidStats> {
        self.pids.get(&pid)
    }

    /// Drops PIDs not observed within `max_age` of `now` (mirrors the
    /// teacher's `cleanup_old_streams`).
    pub fn prune_stale(&mut self, now: Instant, max_age: Duration) {
        self.pids.retain(|_, stats| now.saturating_duration_since(stats.last_seen) < max_age);
    }

    /// Every tracked PID, for reporting.
    pub fn pids(&self) -> impl Iterator<Item = (&u16, &PidStats)> {
        self.pids.iter()
    }
}

impl Default for StreamStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_packet_and_byte_counts() {
        let mut stats = StreamStats::new();
        let t0 = Instant::now();
        stats.observe(0x100, 184, t0);
        stats.observe(0x100, 184, t0);
        let pid_stats = stats.get(0x100).unwrap();
        assert_eq!(pid_stats.packet_count, 2);
        assert_eq!(pid_stats.payload_bytes, 368);
    }

    #[test]
    fn unseen_pid_has_no_stats() {
        let stats = StreamStats::new();
        assert!(stats.get(0x200).is_none());
    }

    #[test]
    fn prune_stale_drops_old_pids() {
        let mut stats = StreamStats::new();
        let t0 = Instant::now();
        stats.observe(0x100, 184, t0);
        let later = t0 + Duration::from_secs(60);
        stats.prune_stale(later, Duration::from_secs(30));
        assert!(stats.get(0x100).is_none());
    }
}

//! The core `Parser`: wires the framer, header/continuity/adaptation
//! decoders, payload classifier, section reassembler, table decoders, and
//! the SI model into one pull-based iterator of [`Event`]s (spec.md §1,
//! §6, §9 "Owned Parser instead of shared global accumulators").
//!
//! Grounded on the teacher's `processor/mod.rs::process_packet`, which
//! inlines this same sequence (header decode, continuity, adaptation, PCR
//! extraction, payload classification, PSI dispatch) directly in a tokio
//! task loop; this version keeps the sequence but drives it from a
//! synchronous [`Source`] pull instead of an async socket read, and
//! returns structured events instead of mutating shared reporting state.

use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use std::time::Instant;

use crate::adaptation::{self, AdaptationError};
use crate::classify::{self, PayloadKind};
use crate::config::{Config, SourceKind};
use crate::constants::{
    TABLE_ID_APPLICATION_INFORMATION, TABLE_ID_EIT_PF_ACTUAL, TABLE_ID_EIT_PF_OTHER,
    TABLE_ID_EIT_SCHEDULE_ACTUAL_END, TABLE_ID_EIT_SCHEDULE_ACTUAL_START, TABLE_ID_PAT,
    TABLE_ID_PMT, TABLE_ID_SDT_ACTUAL, TABLE_ID_SDT_OTHER, TABLE_ID_TDT,
};
use crate::continuity::{ContinuityMonitor, ContinuityOutcome};
use crate::framer::{FramerError, PacketFramer};
use crate::header::PacketHeader;
use crate::model::{Event, SiModel};
use crate::pes::{self, PesHeader};
use crate::reassembly::{ReassemblyDiagnostic, SectionReassembler};
use crate::si::section::{self, SectionError};
use crate::si::{eit, pat, pmt, sdt, tdt};
use crate::source::{FileSource, Source, UdpSource};
use crate::stats::StreamStats;
use crate::tr101::{Table as Tr101Table, Tr101Monitor};

/// Fatal parser errors (spec.md §7 "Fatal (abort iterator)").
#[derive(Debug, thiserror::Error)]
pub enum ParserError {
    /// The packet framer could not recover synchronization.
    #[error(transparent)]
    Framer(#[from] FramerError),
}

fn is_eit_table_id(table_id: u8) -> bool {
    table_id == TABLE_ID_EIT_PF_ACTUAL
        || table_id == TABLE_ID_EIT_PF_OTHER
        || (TABLE_ID_EIT_SCHEDULE_ACTUAL_START..=TABLE_ID_EIT_SCHEDULE_ACTUAL_END).contains(&table_id)
}

/// The owned, process-lifetime demultiplexer (spec.md §9): wraps a
/// [`Source`] and yields one [`Event`] at a time via [`Parser::next_event`].
pub struct Parser<S> {
    framer: PacketFramer<S>,
    continuity: ContinuityMonitor,
    reassembler: SectionReassembler,
    model: SiModel,
    stats: StreamStats,
    tr101: Option<Tr101Monitor>,
    config: Config,
    seen_pids: Box<[bool; 8192]>,
    pid_kind: Box<[Option<PayloadKind>; 8192]>,
    suppressed_pids: HashSet<u16>,
    pes_headers: HashMap<u16, PesHeader>,
    pending: VecDeque<Event>,
    eof: bool,
}

impl<S: Source> Parser<S> {
    /// Wraps an already-constructed [`Source`]. Use [`Parser::open`] to
    /// build the source from `config.source` instead.
    pub fn with_source(source: S, config: Config) -> Self {
        let tr101 = config.enable_tr101.then(Tr101Monitor::new);
        Self {
            framer: PacketFramer::new(source),
            continuity: ContinuityMonitor::new(),
            reassembler: SectionReassembler::new(),
            model: SiModel::new(),
            stats: StreamStats::new(),
            tr101,
            config,
            seen_pids: Box::new([false; 8192]),
            pid_kind: Box::new(std::array::from_fn(|_| None)),
            suppressed_pids: HashSet::new(),
            pes_headers: HashMap::new(),
            pending: VecDeque::new(),
            eof: false,
        }
    }

    /// The accumulated SI model.
    pub fn model(&self) -> &SiModel {
        &self.model
    }

    /// Per-PID byte/packet statistics.
    pub fn stats(&self) -> &StreamStats {
        &self.stats
    }

    /// TR 101 290 conformance counters, if `config.enable_tr101` was set.
    pub fn tr101_metrics(&self) -> Option<&crate::tr101::Tr101Metrics> {
        self.tr101.as_ref().map(Tr101Monitor::metrics)
    }

    /// The most recently decoded PES header for `pid`, if one has been
    /// seen (spec.md §9 "PES path partially unfinished": header only,
    /// through PTS/DTS — not surfaced as a stream event).
    pub fn pes_header(&self, pid: u16) -> Option<&PesHeader> {
        self.pes_headers.get(&pid)
    }

    /// Pulls the next event, decoding as many packets as necessary.
    /// Returns `Ok(None)` once the source is exhausted and every pending
    /// event has been drained.
    pub fn next_event(&mut self) -> Result<Option<Event>, ParserError> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Ok(Some(event));
            }
            if self.eof {
                return Ok(None);
            }
            self.advance()?;
        }
    }

    /// Decodes packets until at least one event is queued or the source is
    /// exhausted.
    fn advance(&mut self) -> Result<(), ParserError> {
        loop {
            let packet = match self.framer.next_packet() {
                Ok(Some(packet)) => packet,
                Ok(None) => {
                    self.flush_incomplete_sections();
                    self.eof = true;
                    return Ok(());
                }
                Err(err) => {
                    if let Some(tr101) = &mut self.tr101 {
                        tr101.on_packet(0, false, false, Instant::now());
                    }
                    return Err(err.into());
                }
            };
            self.process_packet(&packet);
            if !self.pending.is_empty() {
                return Ok(());
            }
        }
    }

    fn flush_incomplete_sections(&mut self) {
        for pid in 0u16..8192 {
            if self.reassembler.reset(pid) == Some(ReassemblyDiagnostic::Incomplete) {
                self.pending.push_back(Event::Incomplete { pid });
            }
        }
    }

    fn process_packet(&mut self, packet: &[u8; 188]) {
        let now = Instant::now();
        let header = PacketHeader::parse(packet);
        let pid = header.pid;

        if let Some(tr101) = &mut self.tr101 {
            tr101.on_packet(pid, true, header.transport_error_indicator, now);
            tr101.tick_timeouts(now);
        }

        if self.config.pid_filter.is_skipped(pid) || self.suppressed_pids.contains(&pid) {
            return;
        }

        let pusi = header.payload_unit_start_indicator;
        self.stats.observe(pid, packet.len() - 4, now);
        self.push_packet_event(Event::PacketSeen { pid }, pusi);
        if !self.seen_pids[pid as usize] {
            self.seen_pids[pid as usize] = true;
            self.push_packet_event(Event::NewPid { pid }, pusi);
        }
        if header.transport_error_indicator {
            self.push_packet_event(Event::TransportError { pid }, pusi);
        }

        let prev_cc = self.continuity.last(pid);
        let outcome = self.continuity.observe(pid, header.continuity_counter, header.adaptation_field_control);
        if let Some(tr101) = &mut self.tr101 {
            tr101.on_continuity(outcome);
        }
        if outcome == ContinuityOutcome::Discontinuity {
            let expected = prev_cc.map(|p| p.wrapping_add(1) & 0x0F).unwrap_or(header.continuity_counter);
            self.pending.push_back(Event::ContinuityDiscontinuity {
                pid,
                expected,
                got: header.continuity_counter,
            });
        }

        if header.adaptation_field_control.has_adaptation() && !self.config.ignore_adaptation {
            self.handle_adaptation(pid, packet, pusi, now);
        }

        if header.adaptation_field_control.has_payload() && !self.config.ignore_payload {
            let start = Self::payload_start(packet, header.adaptation_field_control.has_adaptation());
            let payload = packet[start..].to_vec();
            self.handle_payload(pid, pusi, &payload, now);
        }
    }

    /// Suppresses a `*Updated` event per its `hide_*` presentation filter
    /// (spec.md §6): the table is still decoded and merged into the model,
    /// only the event is dropped.
    fn push(&mut self, event: Event) {
        let hidden = match &event {
            Event::PatUpdated { .. } => self.config.hide_pat,
            Event::PmtUpdated { .. } => self.config.hide_pmt,
            Event::SdtUpdated { .. } => self.config.hide_sdt,
            Event::EitUpdated { .. } => self.config.hide_eit,
            Event::TdtUpdated { .. } => self.config.hide_tdt,
            _ => false,
        };
        if !hidden {
            self.pending.push_back(event);
        }
    }

    /// Like [`Parser::push`], additionally applying `hide_not_pusi` to
    /// packet-level events (spec.md §6).
    fn push_packet_event(&mut self, event: Event, pusi: bool) {
        if self.config.hide_not_pusi && !pusi {
            return;
        }
        self.push(event);
    }

    fn handle_adaptation(&mut self, pid: u16, packet: &[u8; 188], pusi: bool, now: Instant) {
        match adaptation::parse(packet) {
            Ok(field) => {
                if let Some(tr101) = &mut self.tr101 {
                    if let Some(pcr) = field.pcr {
                        tr101.on_pcr(pid, pcr, now);
                    }
                    if let Some(sc) = field.splice_countdown {
                        tr101.on_splice_countdown(sc);
                    }
                }
                self.push_packet_event(Event::AdaptationDecoded { pid, field }, pusi);
            }
            Err(
                AdaptationError::LengthOverflow(_)
                | AdaptationError::Truncated
                | AdaptationError::StuffingCorrupt(_),
            ) => {
                self.push_packet_event(Event::AdaptationMalformed { pid }, pusi);
            }
        }
    }

    fn payload_start(packet: &[u8; 188], has_adaptation: bool) -> usize {
        if has_adaptation {
            (5 + packet[4] as usize).min(188)
        } else {
            4
        }
    }

    /// Dispatches one packet's payload bytes. Continuation payloads
    /// (`pusi = false`) are only fed to the section reassembler when this
    /// PID's most recent PUSI-bearing payload classified as PSI/SI —
    /// elementary-stream continuation bytes are out of scope (spec.md §1
    /// Non-goals) and are silently dropped, same as the teacher's ES path.
    fn handle_payload(&mut self, pid: u16, pusi: bool, payload: &[u8], now: Instant) {
        if payload.is_empty() {
            return;
        }

        if !pusi {
            if self.pid_kind[pid as usize] == Some(PayloadKind::Psi) && !self.config.skip_psi {
                self.feed_reassembler(pid, false, payload, now);
            }
            return;
        }

        let kind = classify::classify(true, payload);
        self.pid_kind[pid as usize] = Some(kind);
        match kind {
            PayloadKind::DvbMip => {
                self.pending.push_back(Event::Unimplemented { pid, kind });
            }
            PayloadKind::Pes => {
                if !self.config.skip_pes {
                    if let Ok(parsed) = pes::parse(payload) {
                        self.pes_headers.insert(pid, parsed);
                    }
                }
            }
            PayloadKind::Psi => {
                if !self.config.skip_psi {
                    self.feed_reassembler(pid, true, payload, now);
                }
            }
            PayloadKind::Continuation => unreachable!("classify(true, _) never returns Continuation"),
        }
    }

    fn feed_reassembler(&mut self, pid: u16, pusi: bool, payload: &[u8], now: Instant) {
        let (sections, diag) = self.reassembler.feed(pid, pusi, payload);
        if let Some(diag) = diag {
            match diag {
                ReassemblyDiagnostic::OrphanContinuation => {
                    self.pending.push_back(Event::OrphanContinuation { pid });
                }
                ReassemblyDiagnostic::Incomplete => {
                    self.pending.push_back(Event::Incomplete { pid });
                }
            }
        }
        for data in sections {
            self.process_section(pid, &data, now);
        }
    }

    fn process_section(&mut self, pid: u16, data: &[u8], now: Instant) {
        if data.is_empty() {
            return;
        }
        let table_id = data[0];

        if table_id == TABLE_ID_TDT {
            match tdt::parse(data) {
                Ok(decoded) => {
                    if let Some(tr101) = &mut self.tr101 {
                        tr101.mark_seen(Tr101Table::Tdt, now);
                    }
                    if let Some(event) = self.model.observe_tdt(decoded) {
                        self.push(event);
                    }
                }
                Err(tdt::TdtError::MalformedBcd(_)) => {
                    self.pending.push_back(Event::MalformedBcd { pid });
                }
                Err(_) => {
                    self.pending.push_back(Event::Unknown { pid, table_id: Some(table_id) });
                }
            }
            return;
        }

        let section = match section::parse(data) {
            Ok(section) => section,
            Err(SectionError::TooShort | SectionError::Truncated { .. }) => {
                self.pending.push_back(Event::Incomplete { pid });
                return;
            }
        };

        if let Some(tr101_table) = tr101_table_for(section.table_id, pid) {
            if let Some(tr101) = &mut self.tr101 {
                tr101.on_crc_result(tr101_table, section.crc_ok, now);
            }
        }
        if !section.crc_ok {
            self.pending.push_back(Event::CrcFailure {
                pid,
                table_id: section.table_id,
                expected: section.crc_declared,
                got: section.crc_computed,
            });
            return;
        }

        match section.table_id {
            TABLE_ID_PAT => {
                let decoded = pat::decode(&section);
                if let Some(tr101) = &mut self.tr101 {
                    tr101.on_pat_version(section.table_id_extension, section.version_number);
                }
                if let Some(event) = self.model.observe_pat(decoded) {
                    self.push(event);
                }
            }
            TABLE_ID_PMT => match pmt::decode(&section) {
                Ok(decoded) => {
                    if let Some(tr101) = &mut self.tr101 {
                        tr101.on_pmt_version(pid, section.version_number);
                    }
                    for error in &decoded.descriptor_errors {
                        self.pending.push_back(Event::DescriptorOverflow { pid, error: *error });
                    }
                    if let Some(event) = self.model.observe_pmt(decoded) {
                        self.push(event);
                    }
                }
                Err(_) => self.pending.push_back(Event::Unknown { pid, table_id: Some(table_id) }),
            },
            TABLE_ID_SDT_ACTUAL | TABLE_ID_SDT_OTHER => {
                let decoded = sdt::decode(&section);
                for error in &decoded.descriptor_errors {
                    self.pending.push_back(Event::DescriptorOverflow { pid, error: *error });
                }
                if let Some(event) = self.model.observe_sdt(decoded) {
                    self.push(event);
                }
            }
            id if is_eit_table_id(id) => match eit::decode(&section) {
                Ok(decoded) => {
                    for error in &decoded.descriptor_errors {
                        self.pending.push_back(Event::DescriptorOverflow { pid, error: *error });
                    }
                    if let Some(event) = self.model.observe_eit(decoded) {
                        self.push(event);
                    }
                }
                Err(_) => self.pending.push_back(Event::Unknown { pid, table_id: Some(table_id) }),
            },
            TABLE_ID_APPLICATION_INFORMATION => {
                // spec.md §4.7: once a PID is observed carrying application
                // information sections, skip it from here on.
                self.suppressed_pids.insert(pid);
            }
            _ => {
                self.pending.push_back(Event::Unknown { pid, table_id: Some(table_id) });
            }
        }
    }
}

fn tr101_table_for(table_id: u8, pid: u16) -> Option<Tr101Table> {
    match table_id {
        TABLE_ID_PAT => Some(Tr101Table::Pat),
        TABLE_ID_PMT => Some(Tr101Table::Pmt(pid)),
        TABLE_ID_SDT_ACTUAL | TABLE_ID_SDT_OTHER => Some(Tr101Table::Sdt),
        id if is_eit_table_id(id) => Some(Tr101Table::Eit),
        _ => None,
    }
}

impl Parser<Box<dyn Source>> {
    /// Builds the [`Source`] named by `config.source` and wraps it.
    pub fn open(config: Config) -> io::Result<Self> {
        let source: Box<dyn Source> = match &config.source {
            SourceKind::Path(path) => Box::new(FileSource::open(path)?),
            SourceKind::Udp { addr } => Box::new(UdpSource::bind(*addr)?),
        };
        Ok(Self::with_source(source, config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SliceSource;

    fn ts_packet(pid: u16, pusi: bool, cc: u8, payload: &[u8]) -> Vec<u8> {
        let mut p = vec![0u8; 188];
        p[0] = 0x47;
        p[1] = if pusi { 0x40 } else { 0x00 } | ((pid >> 8) as u8 & 0x1F);
        p[2] = pid as u8;
        p[3] = 0x10 | (cc & 0x0F); // payload only
        let mut idx = 4;
        if pusi {
            p[idx] = 0x00; // pointer_field
            idx += 1;
        }
        let end = (idx + payload.len()).min(188);
        p[idx..end].copy_from_slice(&payload[..end - idx]);
        for byte in p[end..].iter_mut() {
            *byte = 0xFF;
        }
        p
    }

    fn pat_section(program_number: u16, pmt_pid: u16) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&program_number.to_be_bytes());
        body.push(0xE0 | ((pmt_pid >> 8) as u8 & 0x1F));
        body.push(pmt_pid as u8);
        let section_length = 5 + body.len() + 4;
        let mut s = vec![
            0x00,
            0x80 | (((section_length >> 8) & 0x0F) as u8),
            section_length as u8,
            0x00,
            0x01,
            0x01,
            0x00,
            0x00,
        ];
        s.extend_from_slice(&body);
        let crc = crate::crc::checksum(&s);
        s.extend_from_slice(&crc.to_be_bytes());
        s
    }

    #[test]
    fn single_pat_packet_yields_pat_updated() {
        let section = pat_section(1, 0x100);
        let packet = ts_packet(0x0000, true, 0, &section);
        let mut config = Config::from_path("");
        config.pid_filter = crate::config::PidFilter::Target([0x0000].into_iter().collect());
        let mut parser = Parser::with_source(SliceSource::new(&packet), config);

        let mut saw_pat_updated = false;
        while let Some(event) = parser.next_event().unwrap() {
            if matches!(event, Event::PatUpdated { .. }) {
                saw_pat_updated = true;
            }
        }
        assert!(saw_pat_updated);
        assert_eq!(parser.model().pat.get(&1), Some(&0x100));
    }

    #[test]
    fn continuity_discontinuity_is_reported() {
        let mut data = Vec::new();
        data.extend(ts_packet(0x100, false, 0, &[0xAA; 10]));
        data.extend(ts_packet(0x100, false, 5, &[0xAA; 10]));
        let mut config = Config::from_path("");
        config.pid_filter = crate::config::PidFilter::Target([0x100].into_iter().collect());
        let mut parser = Parser::with_source(SliceSource::new(&data), config);

        let mut saw_discontinuity = false;
        while let Some(event) = parser.next_event().unwrap() {
            if matches!(event, Event::ContinuityDiscontinuity { .. }) {
                saw_discontinuity = true;
            }
        }
        assert!(saw_discontinuity);
    }

    #[test]
    fn skipped_pid_produces_no_events() {
        let packet = ts_packet(0x1FFF, false, 0, &[0xFF; 184]);
        let config = Config::from_path("");
        let mut parser = Parser::with_source(SliceSource::new(&packet), config);
        assert!(parser.next_event().unwrap().is_none());
    }
}

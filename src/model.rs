//! The accumulated SI model and the typed event stream (spec.md §3 "SI
//! Model", §6 "Output").

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::adaptation::AdaptationField;
use crate::classify::PayloadKind;
use crate::descriptors::DescriptorError;
use crate::si::eit::Event as EitEvent;
use crate::si::pat::PatEntry;
use crate::si::pmt::StreamInfo;
use crate::si::sdt::Service;

/// `PMT[program_number] -> (pcr_pid, streams)` (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PmtEntry {
    /// `PCR_PID`.
    pub pcr_pid: u16,
    /// Elementary streams declared by the PMT.
    pub streams: Vec<StreamInfo>,
}

/// The process-lifetime, core-owned SI model (spec.md §3). Mutated only
/// by [`crate::parser::Parser`] on section decode.
#[derive(Debug, Clone, Default)]
pub struct SiModel {
    /// `program_number -> pmt_pid`, from the most recent `current_next=1`
    /// PAT.
    pub pat: HashMap<u16, u16>,
    /// `program_number -> (pcr_pid, streams)`, from the most recent
    /// `current_next=1` PMT per program.
    pub pmt: HashMap<u16, PmtEntry>,
    /// `service_id -> service`, actual TS only.
    pub sdt: HashMap<u16, Service>,
    /// `service_id -> events`, accumulated across EIT sections.
    pub eit: HashMap<u16, Vec<EitEvent>>,
    /// Most recent TDT observation.
    pub tdt: Option<DateTime<Utc>>,
}

impl SiModel {
    /// An empty model.
    pub fn new() -> Self {
        Self::default()
    }

    fn apply_pat(&mut self, pat: &crate::si::Pat) {
        if !pat.current_next {
            return;
        }
        for PatEntry { program_number, pid } in pat.programs() {
            self.pat.insert(program_number, pid);
        }
    }

    fn apply_pmt(&mut self, pmt: &crate::si::Pmt) {
        if !pmt.current_next {
            return;
        }
        self.pmt.insert(
            pmt.program_number,
            PmtEntry {
                pcr_pid: pmt.pcr_pid,
                streams: pmt.streams.clone(),
            },
        );
    }

    fn apply_sdt(&mut self, sdt: &crate::si::Sdt) {
        if !sdt.current_next || !sdt.is_actual {
            return;
        }
        for service in &sdt.services {
            self.sdt.insert(service.service_id, service.clone());
        }
    }

    fn apply_eit(&mut self, eit: &crate::si::Eit) {
        if !eit.current_next {
            return;
        }
        self.eit
            .entry(eit.service_id)
            .or_default()
            .extend(eit.events.iter().cloned());
    }

    fn apply_tdt(&mut self, tdt: &crate::si::Tdt) {
        if let Some(utc) = tdt.utc {
            self.tdt = Some(utc);
        }
    }
}

/// One event in the parser's output stream (spec.md §6 "Output").
#[derive(Debug, Clone)]
pub enum Event {
    /// A packet was accepted by the framer (not filtered by the skip set).
    PacketSeen { pid: u16 },
    /// First packet observed for this PID.
    NewPid { pid: u16 },
    /// Continuity counter mismatch (spec.md §4.2).
    ContinuityDiscontinuity { pid: u16, expected: u8, got: u8 },
    /// `transport_error_indicator` was set.
    TransportError { pid: u16 },
    /// An adaptation field was successfully decoded.
    AdaptationDecoded { pid: u16, field: AdaptationField },
    /// The PAT model changed.
    PatUpdated { entries: Vec<PatEntry> },
    /// A program's PMT changed.
    PmtUpdated { program_number: u16, entry: PmtEntry },
    /// The actual-TS SDT gained or updated a service.
    SdtUpdated { services: Vec<Service> },
    /// A service's EIT schedule gained events.
    EitUpdated { service_id: u16, events: Vec<EitEvent> },
    /// The TDT model changed.
    TdtUpdated { utc: DateTime<Utc> },
    /// A section's trailing CRC-32 didn't match.
    CrcFailure { pid: u16, table_id: u8, expected: u32, got: u32 },
    /// A section was still incomplete at end-of-stream or PID reset.
    Incomplete { pid: u16 },
    /// DVB-MIP signalling was seen but is not decoded.
    Unimplemented { pid: u16, kind: PayloadKind },
    /// A continuation payload arrived with no section in progress.
    OrphanContinuation { pid: u16 },
    /// A BCD field held a digit outside 0..=9.
    MalformedBcd { pid: u16 },
    /// A descriptor's declared length ran past its loop.
    DescriptorOverflow { pid: u16, error: DescriptorError },
    /// The adaptation field's stuffing or length was invalid.
    AdaptationMalformed { pid: u16 },
    /// A recognized PID carried a `table_id` this core doesn't decode, or
    /// a descriptor carried an unrecognized tag (spec.md §7 "Silent").
    Unknown { pid: u16, table_id: Option<u8> },
}

impl SiModel {
    /// Applies a decoded PAT/PMT/SDT/EIT/TDT to the model and returns the
    /// corresponding `*Updated` event, if the update was accepted
    /// (`current_next_indicator` gates every table per spec.md §3).
    pub fn observe_pat(&mut self, pat: crate::si::Pat) -> Option<Event> {
        self.apply_pat(&pat);
        pat.current_next.then(|| Event::PatUpdated { entries: pat.entries })
    }

    /// See [`SiModel::observe_pat`].
    pub fn observe_pmt(&mut self, pmt: crate::si::Pmt) -> Option<Event> {
        let program_number = pmt.program_number;
        self.apply_pmt(&pmt);
        pmt.current_next.then(|| Event::PmtUpdated {
            program_number,
            entry: PmtEntry { pcr_pid: pmt.pcr_pid, streams: pmt.streams },
        })
    }

    /// See [`SiModel::observe_pat`].
    pub fn observe_sdt(&mut self, sdt: crate::si::Sdt) -> Option<Event> {
        self.apply_sdt(&sdt);
        (sdt.current_next && sdt.is_actual).then(|| Event::SdtUpdated { services: sdt.services })
    }

    /// See [`SiModel::observe_pat`].
    pub fn observe_eit(&mut self, eit: crate::si::Eit) -> Option<Event> {
        let service_id = eit.service_id;
        self.apply_eit(&eit);
        eit.current_next.then(|| Event::EitUpdated { service_id, events: eit.events })
    }

    /// See [`SiModel::observe_pat`].
    pub fn observe_tdt(&mut self, tdt: crate::si::Tdt) -> Option<Event> {
        self.apply_tdt(&tdt);
        tdt.utc.map(|utc| Event::TdtUpdated { utc })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::si::pat::Pat;

    #[test]
    fn pat_ignored_when_not_current() {
        let mut model = SiModel::new();
        let pat = Pat {
            version: 0,
            current_next: false,
            transport_stream_id: 1,
            entries: vec![PatEntry { program_number: 1, pid: 0x100 }],
        };
        assert!(model.observe_pat(pat).is_none());
        assert!(model.pat.is_empty());
    }

    #[test]
    fn pat_applied_when_current() {
        let mut model = SiModel::new();
        let pat = Pat {
            version: 0,
            current_next: true,
            transport_stream_id: 1,
            entries: vec![PatEntry { program_number: 1, pid: 0x100 }],
        };
        assert!(model.observe_pat(pat).is_some());
        assert_eq!(model.pat.get(&1), Some(&0x100));
    }
}

//! JSON snapshot reporting (SPEC_FULL.md supplement, see DESIGN.md).
//!
//! Grounded on the teacher's `report/mod.rs::Reporter`, which walks
//! `PacketProcessor`'s PAT/PMT maps into a `ReportJson` tree alongside
//! `Tr101Metrics`. This version walks [`SiModel`] instead (PAT → PMT →
//! elementary streams), and drops the teacher's per-stream `codec` /
//! `width` / `height` / `fps` / `chroma` / `channels` / `sample_rate`
//! fields — those come from guessing a codec out of PES payloads
//! (`es.rs`/`parsers/`), which is video/audio elementary-stream decoding
//! and out of scope (spec.md §1 Non-goals).

use serde::Serialize;

use crate::model::SiModel;
use crate::stats::StreamStats;
use crate::tr101::Tr101Metrics;

/// One elementary stream within a [`ProgramSnapshot`].
#[derive(Serialize)]
struct StreamSnapshot {
    pid: u16,
    stream_type: u8,
    bitrate_kbps: f64,
}

/// One program, joining its PMT's elementary streams to their observed
/// bitrate.
#[derive(Serialize)]
struct ProgramSnapshot {
    program_number: u16,
    pcr_pid: u16,
    streams: Vec<StreamSnapshot>,
}

/// One SDT service entry.
#[derive(Serialize)]
struct ServiceSnapshot<'a> {
    service_id: u16,
    service_type: Option<u8>,
    provider_name: Option<&'a str>,
    service_name: Option<&'a str>,
    running_status: u8,
}

/// A full point-in-time snapshot of the accumulated SI model, suitable for
/// periodic JSON reporting (spec.md §6 "Output: ... the accumulated SI
/// model").
#[derive(Serialize)]
pub struct Snapshot<'a> {
    ts_time: String,
    programs: Vec<ProgramSnapshot>,
    services: Vec<ServiceSnapshot<'a>>,
    tdt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tr101: Option<&'a Tr101Metrics>,
}

/// Builds a [`Snapshot`] from the current model/stats/TR-101 state.
///
/// `now` is an RFC 3339 timestamp supplied by the caller rather than taken
/// from `chrono::Utc::now()` directly, so that report generation stays a
/// pure function of its inputs.
pub fn snapshot<'a>(
    model: &'a SiModel,
    stats: &StreamStats,
    tr101: Option<&'a Tr101Metrics>,
    now: String,
) -> Snapshot<'a> {
    let mut programs = Vec::new();
    for (&program_number, &pmt_pid) in &model.pat {
        let Some(pmt) = model.pmt.get(&program_number) else { continue };
        let _ = pmt_pid; // the PMT's own pcr_pid is authoritative, not the PAT's pmt_pid.
        let streams = pmt
            .streams
            .iter()
            .map(|s| StreamSnapshot {
                pid: s.elementary_pid,
                stream_type: s.stream_type,
                bitrate_kbps: stats.get(s.elementary_pid).map(|st| st.bitrate_bps() / 1000.0).unwrap_or(0.0),
            })
            .collect();
        programs.push(ProgramSnapshot { program_number, pcr_pid: pmt.pcr_pid, streams });
    }
    programs.sort_by_key(|p| p.program_number);

    let mut services: Vec<_> = model
        .sdt
        .values()
        .map(|s| ServiceSnapshot {
            service_id: s.service_id,
            service_type: s.service_type,
            provider_name: s.provider_name.as_deref(),
            service_name: s.service_name.as_deref(),
            running_status: s.running_status,
        })
        .collect();
    services.sort_by_key(|s| s.service_id);

    Snapshot {
        ts_time: now,
        programs,
        services,
        tdt: model.tdt.map(|t| t.to_rfc3339()),
        tr101,
    }
}

/// Pretty-prints a [`Snapshot`] as JSON, falling back to an error object on
/// the (unreachable in practice) case that serialization itself fails.
pub fn to_json_pretty(snapshot: &Snapshot<'_>) -> String {
    serde_json::to_string_pretty(snapshot)
        .unwrap_or_else(|e| format!("{{\"error\": \"report serialization failed: {e}\"}}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_model_reports_no_programs_or_services() {
        let model = SiModel::new();
        let stats = StreamStats::new();
        let snap = snapshot(&model, &stats, None, "2020-01-01T00:00:00Z".to_string());
        assert!(snap.programs.is_empty());
        assert!(snap.services.is_empty());
        assert!(snap.tdt.is_none());
    }

    #[test]
    fn json_output_is_well_formed() {
        let model = SiModel::new();
        let stats = StreamStats::new();
        let snap = snapshot(&model, &stats, None, "2020-01-01T00:00:00Z".to_string());
        let json = to_json_pretty(&snap);
        assert!(json.contains("\"programs\""));
        assert!(json.contains("\"ts_time\""));
    }
}

//! Constants for MPEG-TS demultiplexing and DVB/SI decoding.

/// Size in bytes of a single MPEG-TS packet (ISO/IEC 13818-1).
pub const TS_PACKET_SIZE: usize = 188;
/// Sync byte required at the start of every packet.
pub const TS_SYNC_BYTE: u8 = 0x47;

/// Null/stuffing PID; dropped before any further processing.
pub const PID_NULL: u16 = 0x1FFF;
/// Program Association Table PID.
pub const PID_PAT: u16 = 0x0000;
/// Conditional Access Table PID.
pub const PID_CAT: u16 = 0x0001;
/// Network Information Table PID.
pub const PID_NIT: u16 = 0x0010;
/// Service Description Table / Bouquet Association Table / EIT PID.
pub const PID_SDT: u16 = 0x0011;
/// Event Information Table PID.
pub const PID_EIT: u16 = 0x0012;
/// Running Status Table / Stuffing Table PID.
pub const PID_RST: u16 = 0x0013;
/// Time and Date Table / Time Offset Table PID.
pub const PID_TDT: u16 = 0x0014;
/// Network synchronization PID, skipped by default.
pub const PID_NETWORK_SYNC: u16 = 0x0015;

/// PAT table_id.
pub const TABLE_ID_PAT: u8 = 0x00;
/// CAT table_id.
pub const TABLE_ID_CAT: u8 = 0x01;
/// PMT table_id.
pub const TABLE_ID_PMT: u8 = 0x02;
/// NIT actual network table_id.
pub const TABLE_ID_NIT_ACTUAL: u8 = 0x40;
/// NIT other network table_id.
pub const TABLE_ID_NIT_OTHER: u8 = 0x41;
/// SDT actual transport stream table_id.
pub const TABLE_ID_SDT_ACTUAL: u8 = 0x42;
/// SDT other transport stream table_id.
pub const TABLE_ID_SDT_OTHER: u8 = 0x46;
/// EIT present/following, actual TS.
pub const TABLE_ID_EIT_PF_ACTUAL: u8 = 0x4E;
/// EIT present/following, other TS.
pub const TABLE_ID_EIT_PF_OTHER: u8 = 0x4F;
/// EIT schedule, actual TS: first id of the range (0x50..=0x5F).
pub const TABLE_ID_EIT_SCHEDULE_ACTUAL_START: u8 = 0x50;
/// EIT schedule, actual TS: last id of the range (0x50..=0x5F).
pub const TABLE_ID_EIT_SCHEDULE_ACTUAL_END: u8 = 0x5F;
/// TDT table_id (no CRC, short form).
pub const TABLE_ID_TDT: u8 = 0x70;
/// TOT table_id (CRC present).
pub const TABLE_ID_TOT: u8 = 0x73;
/// Application information section table_id; observed PIDs are skipped.
pub const TABLE_ID_APPLICATION_INFORMATION: u8 = 0x74;

/// Service descriptor tag (SDT).
pub const DESCRIPTOR_TAG_SERVICE: u8 = 0x48;
/// Short event descriptor tag (EIT).
pub const DESCRIPTOR_TAG_SHORT_EVENT: u8 = 0x4D;
/// Extended event descriptor tag (EIT).
pub const DESCRIPTOR_TAG_EXTENDED_EVENT: u8 = 0x4E;
/// Component descriptor tag (EIT).
pub const DESCRIPTOR_TAG_COMPONENT: u8 = 0x50;

/// Start-code prefix shared by every PES packet.
pub const PES_START_CODE_PREFIX: [u8; 3] = [0x00, 0x00, 0x01];

/// PCR/OPCR clock rate: 27 MHz.
pub const PCR_CLOCK_HZ: f64 = 27_000_000.0;
/// PTS/DTS clock rate: 90 kHz.
pub const PTS_CLOCK_HZ: u64 = 90_000;
/// PCR wraps every 2^33 * 300 ticks (33-bit base, times-300 extension).
pub const PCR_WRAP: u64 = (1u64 << 33) * 300;

/// Modified Julian Date of the Unix epoch (1970-01-01).
pub const MJD_UNIX_EPOCH: i64 = 40587;

/// Default skip set applied unless `target_pids` is configured (spec.md §6):
/// null packets, network sync, CAT, NIT.
pub const DEFAULT_SKIP_PIDS: &[u16] = &[PID_NULL, PID_NETWORK_SYNC, PID_CAT, PID_NIT];

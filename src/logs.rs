//! Fixed-layout views over log pages returned by Get Log Page.
//!
//! Multi-byte fields are in host byte order, the order the controller
//! data arrives in through the passthrough interface.

use static_assertions::const_assert_eq;
use zerocopy::byteorder::native_endian::{U16, U32, U128};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::error::{Error, Result};

/// Size of the SMART, telemetry header and firmware slot pages.
pub const LOG_PAGE_SIZE: usize = 512;

/// Size of one error information entry.
pub const ERROR_LOG_ENTRY_SIZE: usize = 64;

/// Telemetry data block sizes are counted in units of `1 << 9` bytes.
const TELEMETRY_BLOCK_SHIFT: u32 = 9;

/// Checks the length of `raw` against `T` and copies it out.
pub(crate) fn decode<T: FromBytes>(what: &'static str, raw: &[u8]) -> Result<T> {
    let mismatch = || Error::SizeMismatch {
        what,
        expected: size_of::<T>(),
        actual: raw.len(),
    };
    if raw.len() != size_of::<T>() {
        return Err(mismatch());
    }
    T::read_from_bytes(raw).map_err(|_| mismatch())
}

/// Trims the space and NUL padding of an ASCII field.
pub(crate) fn ascii(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_matches(|c: char| c == ' ' || c == '\0')
        .to_string()
}

/// SMART / Health Information (log page 02h).
#[derive(Debug, Clone, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct SmartLog {
    critical_warning: u8,
    composite_temperature: U16,
    available_spare: u8,
    available_spare_threshold: u8,
    percentage_used: u8,
    endurance_group_critical_warning: u8,
    _rsvd7: [u8; 25],
    data_units_read: U128,
    data_units_written: U128,
    host_read_commands: U128,
    host_write_commands: U128,
    controller_busy_time: U128,
    power_cycles: U128,
    power_on_hours: U128,
    unsafe_shutdowns: U128,
    media_errors: U128,
    error_log_entries: U128,
    warning_temperature_time: U32,
    critical_temperature_time: U32,
    temperature_sensors: [U16; 8],
    thermal_transition_count: [U32; 2],
    thermal_total_time: [U32; 2],
    _rsvd232: [u8; 280],
}

const_assert_eq!(size_of::<SmartLog>(), LOG_PAGE_SIZE);

impl SmartLog {
    pub fn decode(raw: &[u8]) -> Result<Self> {
        decode("SMART log", raw)
    }

    pub fn critical_warning(&self) -> u8 {
        self.critical_warning
    }

    /// Composite temperature in Kelvin.
    pub fn composite_temperature(&self) -> u16 {
        self.composite_temperature.get()
    }

    /// Remaining spare capacity, in percent.
    pub fn available_spare(&self) -> u8 {
        self.available_spare
    }

    pub fn available_spare_threshold(&self) -> u8 {
        self.available_spare_threshold
    }

    /// Vendor estimate of the life used, in percent. May exceed 100.
    pub fn percentage_used(&self) -> u8 {
        self.percentage_used
    }

    pub fn endurance_group_critical_warning(&self) -> u8 {
        self.endurance_group_critical_warning
    }

    /// Data read, in thousands of 512 byte units.
    pub fn data_units_read(&self) -> u128 {
        self.data_units_read.get()
    }

    /// Data written, in thousands of 512 byte units.
    pub fn data_units_written(&self) -> u128 {
        self.data_units_written.get()
    }

    pub fn host_read_commands(&self) -> u128 {
        self.host_read_commands.get()
    }

    pub fn host_write_commands(&self) -> u128 {
        self.host_write_commands.get()
    }

    /// Minutes spent busy with I/O.
    pub fn controller_busy_time(&self) -> u128 {
        self.controller_busy_time.get()
    }

    pub fn power_cycles(&self) -> u128 {
        self.power_cycles.get()
    }

    pub fn power_on_hours(&self) -> u128 {
        self.power_on_hours.get()
    }

    pub fn unsafe_shutdowns(&self) -> u128 {
        self.unsafe_shutdowns.get()
    }

    pub fn media_errors(&self) -> u128 {
        self.media_errors.get()
    }

    /// Lifetime count of error log entries.
    pub fn error_log_entries(&self) -> u128 {
        self.error_log_entries.get()
    }

    /// Minutes above the warning composite temperature threshold.
    pub fn warning_temperature_time(&self) -> u32 {
        self.warning_temperature_time.get()
    }

    /// Minutes above the critical composite temperature threshold.
    pub fn critical_temperature_time(&self) -> u32 {
        self.critical_temperature_time.get()
    }

    /// Temperature sensor `1..=8` in Kelvin. Zero means not implemented.
    pub fn temperature_sensor(&self, sensor: usize) -> Option<u16> {
        let index = sensor.checked_sub(1)?;
        self.temperature_sensors.get(index).map(|t| t.get())
    }

    /// Transition count into thermal management temperature `1` or `2`.
    pub fn thermal_transition_count(&self, level: usize) -> Option<u32> {
        let index = level.checked_sub(1)?;
        self.thermal_transition_count.get(index).map(|c| c.get())
    }

    /// Seconds spent in thermal management temperature `1` or `2`.
    pub fn thermal_total_time(&self, level: usize) -> Option<u32> {
        let index = level.checked_sub(1)?;
        self.thermal_total_time.get(index).map(|t| t.get())
    }
}

/// One of the three telemetry data blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelemetryBlock {
    Block1 = 1,
    Block2 = 2,
    Block3 = 3,
}

impl TelemetryBlock {
    fn index(self) -> usize {
        self as usize - 1
    }
}

/// Header of the telemetry host- and controller-initiated log pages.
#[derive(Debug, Clone, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct TelemetryHeader {
    identifier: u8,
    _rsvd1: [u8; 4],
    ieee: [u8; 3],
    data_area_last_block: [U16; 3],
    _rsvd14: [u8; 368],
    controller_initiated_available: u8,
    controller_initiated_generation: u8,
    reason_identifier: [u8; 128],
}

const_assert_eq!(size_of::<TelemetryHeader>(), LOG_PAGE_SIZE);

impl TelemetryHeader {
    pub fn decode(raw: &[u8]) -> Result<Self> {
        decode("telemetry header", raw)
    }

    pub fn identifier(&self) -> u8 {
        self.identifier
    }

    /// IEEE OUI, least significant byte first.
    pub fn ieee(&self) -> [u8; 3] {
        self.ieee
    }

    /// Last 512 byte block of the data area ending with `block`.
    pub fn data_area_last_block(&self, block: TelemetryBlock) -> u16 {
        self.data_area_last_block[block.index()].get()
    }

    /// Bytes from the start of the log through the end of `block`.
    pub fn block_size(&self, block: TelemetryBlock) -> u32 {
        (self.data_area_last_block(block) as u32) << TELEMETRY_BLOCK_SHIFT
    }

    pub fn controller_initiated_available(&self) -> bool {
        self.controller_initiated_available != 0
    }

    pub fn controller_initiated_generation(&self) -> u8 {
        self.controller_initiated_generation
    }

    pub fn reason_identifier(&self) -> &[u8; 128] {
        &self.reason_identifier
    }
}

/// A firmware slot number. Slot 0 means no slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FirmwareSlot(pub u8);

impl FirmwareSlot {
    pub const NONE: Self = Self(0);
}

/// Firmware Slot Information (log page 03h).
#[derive(Debug, Clone, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct FirmwareSlotInfo {
    active_firmware_info: u8,
    _rsvd1: [u8; 7],
    revisions: [[u8; 8]; 7],
    _rsvd64: [u8; 448],
}

const_assert_eq!(size_of::<FirmwareSlotInfo>(), LOG_PAGE_SIZE);

impl FirmwareSlotInfo {
    pub fn decode(raw: &[u8]) -> Result<Self> {
        decode("firmware slot information", raw)
    }

    /// The currently running slot and its revision.
    pub fn active(&self) -> (FirmwareSlot, String) {
        let slot = FirmwareSlot(self.active_firmware_info & 0b111);
        (slot, self.revision(slot))
    }

    /// The slot that activates at the next controller level reset, if any.
    pub fn next(&self) -> (FirmwareSlot, String) {
        let slot = FirmwareSlot((self.active_firmware_info >> 4) & 0b111);
        (slot, self.revision(slot))
    }

    /// Revision in `slot`, or an empty string for [`FirmwareSlot::NONE`].
    pub fn revision(&self, slot: FirmwareSlot) -> String {
        match (slot.0 as usize).checked_sub(1) {
            Some(index) => self.revisions.get(index).map_or_else(String::new, |rev| ascii(rev)),
            None => String::new(),
        }
    }
}

/// Status field of an error entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusField(pub u16);

impl StatusField {
    /// Bits 15:1, the status of the failed command.
    pub fn status_code(self) -> u16 {
        self.0 >> 1
    }

    /// Bit 0, the phase tag posted with the completion.
    pub fn phase_tag(self) -> bool {
        self.0 & 1 == 1
    }
}

/// Where in the command the error was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamErrorLocation(pub u16);

impl ParamErrorLocation {
    /// Bits 10:8, the bit within [`byte`](Self::byte).
    pub fn bit(self) -> u8 {
        ((self.0 >> 8) & 0b111) as u8
    }

    /// Bits 7:0, the byte within the command.
    pub fn byte(self) -> u8 {
        self.0 as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportType {
    None,
    Rdma,
    FibreChannel,
    Tcp,
    IntraHost,
    Other(u8),
}

impl From<u8> for TransportType {
    fn from(value: u8) -> Self {
        match value {
            0 => TransportType::None,
            1 => TransportType::Rdma,
            2 => TransportType::FibreChannel,
            3 => TransportType::Tcp,
            0xfe => TransportType::IntraHost,
            other => TransportType::Other(other),
        }
    }
}

/// One entry of the Error Information log page (01h).
///
/// An `error_count` of zero marks an unused entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct ErrorLogEntry {
    pub error_count: u64,
    pub sqid: u16,
    pub cmdid: u16,
    pub status_field: u16,
    pub param_error_location: u16,
    pub lba: u64,
    pub nsid: u32,
    pub vendor_specific: u8,
    pub trtype: u8,
    pub _rsvd30: [u8; 2],
    pub command_specific: u64,
    pub trtype_specific: u16,
    pub _rsvd42: [u8; 22],
}

const_assert_eq!(size_of::<ErrorLogEntry>(), ERROR_LOG_ENTRY_SIZE);

impl ErrorLogEntry {
    pub fn decode(raw: &[u8]) -> Result<Self> {
        decode("error log entry", raw)
    }

    pub fn is_valid(&self) -> bool {
        self.error_count != 0
    }

    pub fn status(&self) -> StatusField {
        StatusField(self.status_field)
    }

    pub fn parameter_error_location(&self) -> ParamErrorLocation {
        ParamErrorLocation(self.param_error_location)
    }

    pub fn transport_type(&self) -> TransportType {
        self.trtype.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zerocopy::FromZeros;

    #[test]
    fn one_byte_short_is_a_size_mismatch() {
        let raw = [0u8; LOG_PAGE_SIZE - 1];
        assert!(matches!(
            SmartLog::decode(&raw),
            Err(Error::SizeMismatch { expected: 512, actual: 511, .. })
        ));
        assert!(matches!(TelemetryHeader::decode(&raw), Err(Error::SizeMismatch { .. })));
        assert!(matches!(FirmwareSlotInfo::decode(&raw), Err(Error::SizeMismatch { .. })));
        assert!(matches!(
            ErrorLogEntry::decode(&raw[..ERROR_LOG_ENTRY_SIZE - 1]),
            Err(Error::SizeMismatch { expected: 64, actual: 63, .. })
        ));
    }

    #[test]
    fn longer_buffers_are_rejected_too() {
        let raw = [0u8; LOG_PAGE_SIZE + 1];
        assert!(SmartLog::decode(&raw).is_err());
    }

    #[test]
    fn smart_fields_land_at_their_offsets() {
        let mut raw = [0u8; LOG_PAGE_SIZE];
        raw[0] = 0x04;
        raw[1..3].copy_from_slice(&310u16.to_ne_bytes());
        raw[3] = 100;
        raw[5] = 3;
        raw[48..64].copy_from_slice(&0x1122u128.to_ne_bytes());
        raw[128..144].copy_from_slice(&9000u128.to_ne_bytes());
        raw[192..196].copy_from_slice(&17u32.to_ne_bytes());
        raw[202..204].copy_from_slice(&305u16.to_ne_bytes());

        let smart = SmartLog::decode(&raw).unwrap();
        assert_eq!(smart.critical_warning(), 0x04);
        assert_eq!(smart.composite_temperature(), 310);
        assert_eq!(smart.available_spare(), 100);
        assert_eq!(smart.percentage_used(), 3);
        assert_eq!(smart.data_units_written(), 0x1122);
        assert_eq!(smart.power_on_hours(), 9000);
        assert_eq!(smart.warning_temperature_time(), 17);
        assert_eq!(smart.temperature_sensor(2), Some(305));
        assert_eq!(smart.temperature_sensor(0), None);
        assert_eq!(smart.temperature_sensor(9), None);
    }

    #[test]
    fn telemetry_block_sizes_are_512_byte_units() {
        let mut raw = [0u8; LOG_PAGE_SIZE];
        raw[0] = 0x07;
        raw[5..8].copy_from_slice(&[0xef, 0xcd, 0xab]);
        for (i, count) in [2u16, 4, 8].into_iter().enumerate() {
            raw[8 + i * 2..10 + i * 2].copy_from_slice(&count.to_ne_bytes());
        }
        raw[382] = 1;
        raw[383] = 5;

        let header = TelemetryHeader::decode(&raw).unwrap();
        assert_eq!(header.identifier(), 0x07);
        assert_eq!(header.ieee(), [0xef, 0xcd, 0xab]);
        assert_eq!(header.block_size(TelemetryBlock::Block1), 1024);
        assert_eq!(header.block_size(TelemetryBlock::Block2), 2048);
        assert_eq!(header.block_size(TelemetryBlock::Block3), 4096);
        assert!(header.controller_initiated_available());
        assert_eq!(header.controller_initiated_generation(), 5);
    }

    #[test]
    fn firmware_slots() {
        let mut raw = [0u8; LOG_PAGE_SIZE];
        raw[0] = (3 << 4) | 1;
        raw[8..16].copy_from_slice(b"FwSlot01");
        raw[16..24].copy_from_slice(b"HELLO   ");
        raw[24..29].copy_from_slice(b"NEXT\0");

        let info = FirmwareSlotInfo::decode(&raw).unwrap();
        assert_eq!(info.active(), (FirmwareSlot(1), "FwSlot01".to_string()));
        assert_eq!(info.next(), (FirmwareSlot(3), "NEXT".to_string()));
        assert_eq!(info.revision(FirmwareSlot(2)), "HELLO");
        assert_eq!(info.revision(FirmwareSlot::NONE), "");
        assert_eq!(info.revision(FirmwareSlot(7)), "");
    }

    #[test]
    fn no_next_slot() {
        let mut raw = [0u8; LOG_PAGE_SIZE];
        raw[0] = 2;
        raw[16..24].copy_from_slice(b"ACTIVE02");
        let info = FirmwareSlotInfo::decode(&raw).unwrap();
        assert_eq!(info.next(), (FirmwareSlot::NONE, String::new()));
        assert_eq!(info.active().1, "ACTIVE02");
    }

    #[test]
    fn error_entry_fields() {
        let mut entry = ErrorLogEntry::new_zeroed();
        entry.error_count = 42;
        entry.status_field = (0x4002 << 1) | 1;
        entry.param_error_location = (5 << 8) | 0x2c;
        entry.trtype = 3;

        let decoded = ErrorLogEntry::decode(entry.as_bytes()).unwrap();
        assert_eq!(decoded, entry);
        assert!(decoded.is_valid());
        assert_eq!(decoded.status().status_code(), 0x4002);
        assert!(decoded.status().phase_tag());
        assert_eq!(decoded.parameter_error_location().bit(), 5);
        assert_eq!(decoded.parameter_error_location().byte(), 0x2c);
        assert_eq!(decoded.transport_type(), TransportType::Tcp);
        assert_eq!(TransportType::from(0xfe), TransportType::IntraHost);
        assert_eq!(TransportType::from(9), TransportType::Other(9));
    }
}

use static_assertions::const_assert_eq;
use zerocopy::byteorder::native_endian::{U16, U32, U64, U128};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::error::Result;
use crate::logs::{ascii, decode};

/// Size of every Identify data structure.
pub const IDENTIFY_SIZE: usize = 4096;

/// Identify Controller data structure (CNS 01h).
#[derive(Debug, Clone, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct IdentifyController {
    vid: U16,
    ssvid: U16,
    sn: [u8; 20],
    mn: [u8; 40],
    fr: [u8; 8],
    rab: u8,
    ieee: [u8; 3],
    cmic: u8,
    mdts: u8,
    cntlid: U16,
    ver: U32,
    rtd3r: U32,
    rtd3e: U32,
    oaes: U32,
    ctratt: U32,
    _ignore1: [u8; 156],
    oacs: U16,
    acl: u8,
    aerl: u8,
    frmw: u8,
    lpa: u8,
    elpe: u8,
    npss: u8,
    avscc: u8,
    apsta: u8,
    wctemp: U16,
    cctemp: U16,
    _ignore2: [u8; 10],
    tnvmcap: U128,
    unvmcap: U128,
    _ignore3: [u8; 200],
    sqes: u8,
    cqes: u8,
    maxcmd: U16,
    nn: U32,
    oncs: U16,
    fuses: U16,
    fna: u8,
    vwc: u8,
    _ignore4: [u8; 242],
    subnqn: [u8; 256],
    _ignore5: [u8; 3072],
}

const_assert_eq!(size_of::<IdentifyController>(), IDENTIFY_SIZE);

impl IdentifyController {
    pub fn decode(raw: &[u8]) -> Result<Self> {
        decode("identify controller", raw)
    }

    /// PCI vendor id
    pub fn vendor_id(&self) -> u16 {
        self.vid.get()
    }

    /// PCI subsystem vendor id
    pub fn subsystem_vendor_id(&self) -> u16 {
        self.ssvid.get()
    }

    pub fn serial_number(&self) -> String {
        ascii(&self.sn)
    }

    pub fn model_number(&self) -> String {
        ascii(&self.mn)
    }

    pub fn firmware_revision(&self) -> String {
        ascii(&self.fr)
    }

    pub fn recommended_arbitration_burst(&self) -> u8 {
        self.rab
    }

    pub fn ieee(&self) -> [u8; 3] {
        self.ieee
    }

    pub fn cmic(&self) -> u8 {
        self.cmic
    }

    /// Maximum data transfer size as a power of two of the minimum page size.
    /// Zero means no limit.
    pub fn mdts(&self) -> u8 {
        self.mdts
    }

    /// Maximum transfer size in bytes for a controller whose minimum memory
    /// page size is `min_page_size`.
    ///
    /// `None` if unlimited or not representable in a `u64`.
    pub fn max_transfer_size(&self, min_page_size: u64) -> Option<u64> {
        match self.mdts {
            0 => None,
            mdts => 1u64
                .checked_shl(mdts as u32)
                .and_then(|pages| pages.checked_mul(min_page_size)),
        }
    }

    pub fn controller_id(&self) -> u16 {
        self.cntlid.get()
    }

    /// Version as `(major, minor, tertiary)`.
    pub fn version(&self) -> (u16, u8, u8) {
        let ver = self.ver.get();
        ((ver >> 16) as u16, (ver >> 8) as u8, ver as u8)
    }

    pub fn rtd3_resume_latency(&self) -> u32 {
        self.rtd3r.get()
    }

    pub fn rtd3_entry_latency(&self) -> u32 {
        self.rtd3e.get()
    }

    pub fn optional_async_events(&self) -> u32 {
        self.oaes.get()
    }

    pub fn controller_attributes(&self) -> u32 {
        self.ctratt.get()
    }

    /// Optional admin command support.
    pub fn oacs(&self) -> u16 {
        self.oacs.get()
    }

    pub fn abort_command_limit(&self) -> u8 {
        self.acl
    }

    pub fn async_event_request_limit(&self) -> u8 {
        self.aerl
    }

    pub fn firmware_updates(&self) -> u8 {
        self.frmw
    }

    /// Log page attributes.
    pub fn lpa(&self) -> u8 {
        self.lpa
    }

    /// Error log page entries, zero based.
    pub fn elpe(&self) -> u8 {
        self.elpe
    }

    pub fn power_states(&self) -> u8 {
        self.npss
    }

    pub fn warning_temperature(&self) -> u16 {
        self.wctemp.get()
    }

    pub fn critical_temperature(&self) -> u16 {
        self.cctemp.get()
    }

    pub fn total_capacity(&self) -> u128 {
        self.tnvmcap.get()
    }

    pub fn unallocated_capacity(&self) -> u128 {
        self.unvmcap.get()
    }

    pub fn sqes(&self) -> u8 {
        self.sqes
    }

    pub fn cqes(&self) -> u8 {
        self.cqes
    }

    pub fn max_outstanding_commands(&self) -> u16 {
        self.maxcmd.get()
    }

    /// Number of namespaces.
    pub fn nn(&self) -> u32 {
        self.nn.get()
    }

    /// Optional NVM command support.
    pub fn oncs(&self) -> u16 {
        self.oncs.get()
    }

    pub fn fused_operations(&self) -> u16 {
        self.fuses.get()
    }

    pub fn format_attributes(&self) -> u8 {
        self.fna
    }

    pub fn volatile_write_cache(&self) -> bool {
        self.vwc & 1 == 1
    }

    pub fn subsystem_nqn(&self) -> String {
        ascii(&self.subnqn)
    }
}

/// One entry of a namespace's LBA format table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LbaFormat(pub u32);

impl LbaFormat {
    pub fn metadata_size(self) -> u16 {
        self.0 as u16
    }

    /// LBA data size as a power of two.
    pub fn lba_data_size(self) -> u8 {
        (self.0 >> 16) as u8
    }

    /// LBA data size in bytes, or zero if the format is not supported.
    pub fn block_size(self) -> u64 {
        match self.lba_data_size() {
            0 => 0,
            shift => 1u64.checked_shl(shift as u32).unwrap_or(0),
        }
    }

    pub fn relative_performance(self) -> u8 {
        ((self.0 >> 24) & 0b11) as u8
    }
}

/// Identify Namespace data structure (CNS 00h).
#[derive(Debug, Clone, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct IdentifyNamespace {
    nsze: U64,
    ncap: U64,
    nuse: U64,
    nsfeat: u8,
    nlbaf: u8,
    flbas: u8,
    mc: u8,
    dpc: u8,
    dps: u8,
    nmic: u8,
    rescap: u8,
    _ignore1: [u8; 96],
    lbaf: [U32; 16],
    _ignore2: [u8; 3904],
}

const_assert_eq!(size_of::<IdentifyNamespace>(), IDENTIFY_SIZE);

impl IdentifyNamespace {
    pub fn decode(raw: &[u8]) -> Result<Self> {
        decode("identify namespace", raw)
    }

    /// Namespace size in logical blocks.
    pub fn size(&self) -> u64 {
        self.nsze.get()
    }

    pub fn capacity(&self) -> u64 {
        self.ncap.get()
    }

    pub fn utilization(&self) -> u64 {
        self.nuse.get()
    }

    pub fn features(&self) -> u8 {
        self.nsfeat
    }

    /// Number of LBA formats, zero based.
    pub fn nlbaf(&self) -> u8 {
        self.nlbaf
    }

    /// Formatted LBA size.
    pub fn flbas(&self) -> u8 {
        self.flbas
    }

    pub fn metadata_capabilities(&self) -> u8 {
        self.mc
    }

    pub fn data_protection_capabilities(&self) -> u8 {
        self.dpc
    }

    pub fn data_protection_settings(&self) -> u8 {
        self.dps
    }

    pub fn multipath_capabilities(&self) -> u8 {
        self.nmic
    }

    pub fn reservation_capabilities(&self) -> u8 {
        self.rescap
    }

    pub fn lba_format(&self, index: usize) -> Option<LbaFormat> {
        self.lbaf.get(index).map(|f| LbaFormat(f.get()))
    }

    /// The format the namespace is currently formatted with.
    pub fn current_lba_format(&self) -> LbaFormat {
        LbaFormat(self.lbaf[(self.flbas & 0xf) as usize].get())
    }

    pub fn block_size(&self) -> u64 {
        self.current_lba_format().block_size()
    }
}

/// Active Namespace ID list (CNS 02h).
#[derive(Debug, Clone, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct NamespaceList {
    ids: [U32; IDENTIFY_SIZE / 4],
}

const_assert_eq!(size_of::<NamespaceList>(), IDENTIFY_SIZE);

impl NamespaceList {
    pub fn decode(raw: &[u8]) -> Result<Self> {
        decode("namespace list", raw)
    }

    /// Listed namespace ids, unused slots skipped.
    pub fn ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.ids.iter().map(|id| id.get()).filter(|&id| id != 0)
    }
}

/// A namespace with its geometry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
    pub id: u32,
    pub block_count: u64,
    pub block_size: u64,
}

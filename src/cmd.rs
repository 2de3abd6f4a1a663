use core::marker::PhantomData;

use static_assertions::const_assert_eq;

use crate::error::Result;
use crate::memory::DataBuffer;

/// Admin command opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    DeleteIoSq = 0x00,
    CreateIoSq = 0x01,
    GetLogPage = 0x02,
    DeleteIoCq = 0x04,
    CreateIoCq = 0x05,
    Identify = 0x06,
    Abort = 0x08,
    SetFeatures = 0x09,
    GetFeatures = 0x0a,
    AsyncEventRequest = 0x0c,
    NamespaceManagement = 0x0d,
    FirmwareActivate = 0x10,
    FirmwareDownload = 0x11,
    DeviceSelfTest = 0x14,
    NamespaceAttachment = 0x15,
    KeepAlive = 0x18,
    DirectiveSend = 0x19,
    DirectiveReceive = 0x1a,
    VirtualizationManagement = 0x1c,
    NvmeMiSend = 0x1d,
    NvmeMiReceive = 0x1e,
    DoorbellBufferConfig = 0x7c,
    FormatNvm = 0x80,
    SecuritySend = 0x81,
    SecurityReceive = 0x82,
    Sanitize = 0x84,
    GetLbaStatus = 0x86,
}

/// Controller or Namespace Structure selector of an Identify command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cns(pub u8);

impl Cns {
    pub const NAMESPACE: Self = Self(0x00);
    pub const CONTROLLER: Self = Self(0x01);
    pub const ACTIVE_NAMESPACE_LIST: Self = Self(0x02);
    pub const NAMESPACE_DESCRIPTOR_LIST: Self = Self(0x03);
    pub const NVM_SET_LIST: Self = Self(0x04);
}

/// Log page identifier. Values above 0xbf are vendor specific.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogPageId(pub u8);

impl LogPageId {
    pub const ERROR_INFORMATION: Self = Self(0x01);
    pub const SMART: Self = Self(0x02);
    pub const FIRMWARE_SLOT: Self = Self(0x03);
    pub const CHANGED_NAMESPACE_LIST: Self = Self(0x04);
    pub const COMMAND_EFFECTS: Self = Self(0x05);
    pub const DEVICE_SELF_TEST: Self = Self(0x06);
    pub const TELEMETRY_HOST: Self = Self(0x07);
    pub const TELEMETRY_CONTROLLER: Self = Self(0x08);
    pub const ENDURANCE_GROUP_INFO: Self = Self(0x09);
    pub const PREDICTABLE_LATENCY_PER_NVM_SET: Self = Self(0x0a);
    pub const PREDICTABLE_LATENCY_EVENT_AGGREGATE: Self = Self(0x0b);
    pub const ASYMMETRIC_NAMESPACE_ACCESS: Self = Self(0x0c);
    pub const PERSISTENT_EVENT: Self = Self(0x0d);
    pub const LBA_STATUS_INFO: Self = Self(0x0e);
    pub const ENDURANCE_GROUP_EVENT_AGGREGATE: Self = Self(0x0f);
}

/// Feature identifier of a Get/Set Features command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureId(pub u8);

impl FeatureId {
    pub const ARBITRATION: Self = Self(0x01);
    pub const POWER_MANAGEMENT: Self = Self(0x02);
    pub const LBA_RANGE_TYPE: Self = Self(0x03);
    pub const TEMPERATURE_THRESHOLD: Self = Self(0x04);
    pub const ERROR_RECOVERY: Self = Self(0x05);
    pub const VOLATILE_WRITE_CACHE: Self = Self(0x06);
    pub const NUMBER_OF_QUEUES: Self = Self(0x07);
    pub const INTERRUPT_COALESCING: Self = Self(0x08);
    pub const INTERRUPT_VECTOR_CONFIG: Self = Self(0x09);
    pub const WRITE_ATOMICITY_NORMAL: Self = Self(0x0a);
    pub const ASYNC_EVENT_CONFIG: Self = Self(0x0b);
    pub const AUTONOMOUS_POWER_STATE_TRANSITION: Self = Self(0x0c);
    pub const HOST_MEMORY_BUFFER: Self = Self(0x0d);
    pub const TIMESTAMP: Self = Self(0x0e);
    pub const KEEP_ALIVE_TIMER: Self = Self(0x0f);
    pub const HOST_CONTROLLED_THERMAL_MANAGEMENT: Self = Self(0x10);
    pub const NON_OPERATIONAL_POWER_STATE_CONFIG: Self = Self(0x11);
    pub const READ_RECOVERY_LEVEL_CONFIG: Self = Self(0x12);
    pub const PREDICTABLE_LATENCY_MODE_CONFIG: Self = Self(0x13);
    pub const PREDICTABLE_LATENCY_MODE_WINDOW: Self = Self(0x14);
    pub const LBA_STATUS_INFO_REPORT_INTERVAL: Self = Self(0x15);
    pub const HOST_BEHAVIOR_SUPPORT: Self = Self(0x16);
    pub const SANITIZE_CONFIG: Self = Self(0x17);
    pub const ENDURANCE_GROUP_EVENT_CONFIG: Self = Self(0x18);
}

/// Which value of a feature a Get Features command returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Select {
    Current = 0b00,
    Default = 0b01,
    Saved = 0b10,
    SupportedCapabilities = 0b11,
}

const MASK_U4: u32 = (1 << 4) - 1;
const MASK_U8: u32 = (1 << 8) - 1;
const MASK_U16: u32 = (1 << 16) - 1;
const LSP_SHIFT: u32 = 8;
const SEL_SHIFT: u32 = 8;
const SEL_MASK: u32 = 0b111 << SEL_SHIFT;
const SAVE_BIT: u32 = 1 << 31;

/// The admin passthrough record handed to the kernel.
///
/// The record stores raw addresses of the regions bound to it; the `'a`
/// lifetime keeps those regions borrowed for as long as the record exists.
#[derive(Debug)]
#[repr(C)]
pub struct AdminCommand<'a> {
    /// Opcode
    opcode: u8,
    /// Flags
    flags: u8,
    /// Reserved
    _rsvd: u16,
    /// Namespace ID
    nsid: u32,
    /// Command dword 2
    cdw2: u32,
    /// Command dword 3
    cdw3: u32,
    /// Metadata pointer
    metadata: u64,
    /// Data pointer
    addr: u64,
    /// Metadata length
    metadata_len: u32,
    /// Data length
    data_len: u32,
    /// Command dword 10
    cdw10: u32,
    /// Command dword 11
    cdw11: u32,
    /// Command dword 12
    cdw12: u32,
    /// Command dword 13
    cdw13: u32,
    /// Command dword 14
    cdw14: u32,
    /// Command dword 15
    cdw15: u32,
    /// Timeout in milliseconds; zero is the driver default
    timeout_ms: u32,
    /// Completion dword 0
    result: u32,
    _regions: PhantomData<&'a mut [u8]>,
}

const_assert_eq!(size_of::<AdminCommand<'static>>(), 72);

impl<'a> AdminCommand<'a> {
    /// Creates a command with every dword zeroed and no region bound.
    pub fn new(opcode: Opcode, nsid: u32) -> Self {
        Self {
            opcode: opcode as u8,
            flags: 0,
            _rsvd: 0,
            nsid,
            cdw2: 0,
            cdw3: 0,
            metadata: 0,
            addr: 0,
            metadata_len: 0,
            data_len: 0,
            cdw10: 0,
            cdw11: 0,
            cdw12: 0,
            cdw13: 0,
            cdw14: 0,
            cdw15: 0,
            timeout_ms: 0,
            result: 0,
            _regions: PhantomData,
        }
    }

    /// Binds the payload region.
    pub fn bind_data(&mut self, data: impl Into<DataBuffer<'a>>) -> Result<()> {
        (self.addr, self.data_len) = data.into().bind()?;
        Ok(())
    }

    /// Binds the metadata region.
    pub fn bind_metadata(&mut self, metadata: impl Into<DataBuffer<'a>>) -> Result<()> {
        (self.metadata, self.metadata_len) = metadata.into().bind()?;
        Ok(())
    }

    /// Builds an Identify command returning the structure selected by `cns`.
    pub fn identify(
        nsid: u32,
        controller_id: u16,
        cns: Cns,
        nvm_set_id: u16,
        data: impl Into<DataBuffer<'a>>,
    ) -> Result<Self> {
        let mut cmd = Self::new(Opcode::Identify, nsid);
        cmd.cdw10 = ((controller_id as u32) << 16) | (cns.0 as u32);
        cmd.cdw11 = nvm_set_id as u32;
        cmd.bind_data(data)?;
        Ok(cmd)
    }

    /// Builds a Get Log Page command.
    ///
    /// The dword count is taken from the bound region's length. Requesting
    /// more dwords than the log holds returns undefined data past its end,
    /// so multi-round readers shrink it with [`set_dword_count`] on the
    /// last round.
    ///
    /// [`set_dword_count`]: AdminCommand::set_dword_count
    pub fn get_log_page(
        nsid: u32,
        lid: LogPageId,
        lsp: u8,
        lsi: u16,
        offset: u64,
        data: impl Into<DataBuffer<'a>>,
    ) -> Result<Self> {
        let mut cmd = Self::new(Opcode::GetLogPage, nsid);
        cmd.cdw10 = ((lsp as u32 & MASK_U4) << LSP_SHIFT) | (lid.0 as u32 & MASK_U8);
        cmd.cdw11 = (lsi as u32) << 16;
        cmd.set_offset(offset);
        cmd.bind_data(data)?;
        cmd.set_dword_count(cmd.data_len >> 2);
        Ok(cmd)
    }

    /// Builds a Get Features command.
    ///
    /// Features that return a data structure need a region bound with
    /// [`bind_data`](AdminCommand::bind_data).
    pub fn get_features(nsid: u32, fid: FeatureId, select: Select, value: u32) -> Self {
        let mut cmd = Self::new(Opcode::GetFeatures, nsid);
        cmd.cdw10 = ((select as u32) << SEL_SHIFT) | (fid.0 as u32);
        cmd.cdw11 = value;
        cmd
    }

    /// Builds a Set Features command.
    ///
    /// Features that take a data structure need a region bound with
    /// [`bind_data`](AdminCommand::bind_data).
    pub fn set_features(nsid: u32, fid: FeatureId, save: bool, value: u32) -> Self {
        let mut cmd = Self::new(Opcode::SetFeatures, nsid);
        cmd.cdw10 = (if save { SAVE_BIT } else { 0 }) | (fid.0 as u32);
        cmd.cdw11 = value;
        cmd
    }
}

impl AdminCommand<'_> {
    /// Rewrites NUMDL/NUMDU, keeping LSP/LID and LSI.
    pub fn set_dword_count(&mut self, dwords: u32) {
        self.cdw10 = (dwords << 16) | (self.cdw10 & MASK_U16);
        self.cdw11 = (dwords >> 16) | (self.cdw11 & !MASK_U16);
    }

    pub fn dword_count(&self) -> u32 {
        (self.cdw10 >> 16) | (self.cdw11 << 16)
    }

    /// Rewrites the log page offset.
    pub fn set_offset(&mut self, offset: u64) {
        self.cdw12 = (offset >> 32) as u32;
        self.cdw13 = offset as u32;
    }

    pub fn offset(&self) -> u64 {
        ((self.cdw12 as u64) << 32) | self.cdw13 as u64
    }

    /// Rewrites the 4-bit log specific parameter. Higher bits of `lsp` are dropped.
    pub fn set_lsp(&mut self, lsp: u8) {
        const LSP_MASK: u32 = MASK_U4 << LSP_SHIFT;
        self.cdw10 = (self.cdw10 & !LSP_MASK) | ((lsp as u32 & MASK_U4) << LSP_SHIFT);
    }

    pub fn lsp(&self) -> u8 {
        ((self.cdw10 >> LSP_SHIFT) & MASK_U4) as u8
    }

    pub fn lid(&self) -> LogPageId {
        LogPageId((self.cdw10 & MASK_U8) as u8)
    }

    pub fn lsi(&self) -> u16 {
        (self.cdw11 >> 16) as u16
    }

    /// Rewrites the select field of a Get Features command, keeping the FID.
    pub fn set_select(&mut self, select: Select) {
        self.cdw10 = (self.cdw10 & !SEL_MASK) | ((select as u32) << SEL_SHIFT);
    }

    pub fn set_timeout(&mut self, timeout_ms: u32) {
        self.timeout_ms = timeout_ms;
    }

    pub fn opcode(&self) -> u8 {
        self.opcode
    }

    pub fn nsid(&self) -> u32 {
        self.nsid
    }

    /// Returns CDW10 through CDW15.
    pub fn cdws(&self) -> [u32; 6] {
        [
            self.cdw10, self.cdw11, self.cdw12, self.cdw13, self.cdw14, self.cdw15,
        ]
    }

    /// Address and length of the bound payload region.
    pub fn data(&self) -> (u64, u32) {
        (self.addr, self.data_len)
    }

    /// Address and length of the bound metadata region.
    pub fn metadata(&self) -> (u64, u32) {
        (self.metadata, self.metadata_len)
    }

    pub fn timeout_ms(&self) -> u32 {
        self.timeout_ms
    }

    /// Completion dword 0, filled in by the controller.
    pub fn result(&self) -> u32 {
        self.result
    }

    #[cfg(test)]
    pub(crate) fn set_result(&mut self, result: u32) {
        self.result = result;
    }
}

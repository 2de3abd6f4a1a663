use std::fs::File;
use std::os::fd::AsRawFd;
use std::path::Path;

use log::{debug, trace};
use zerocopy::FromZeros;

use crate::cmd::{AdminCommand, Cns, FeatureId, LogPageId, Select};
use crate::error::{Error, Result};
use crate::identify::{IdentifyController, IdentifyNamespace, Namespace, NamespaceList};
use crate::logs::{FirmwareSlotInfo, SmartLog};
use crate::memory::{DataBuffer, TransferPool};

mod ioctls {
    use crate::cmd::AdminCommand;
    use crate::ioctl::{NVME_IOCTL_ADMIN_CMD, NVME_IOCTL_ID};

    nix::ioctl_none_bad!(nvme_ioctl_id, NVME_IOCTL_ID.raw());
    nix::ioctl_readwrite_bad!(
        nvme_ioctl_admin_cmd,
        NVME_IOCTL_ADMIN_CMD.raw(),
        AdminCommand<'static>
    );
}

/// Something that can carry an admin command to a controller and back.
pub trait AdminTransport {
    /// Submits `cmd` and blocks until it completes.
    ///
    /// Completion dword 0 is written back into `cmd`.
    fn submit(&self, cmd: &mut AdminCommand<'_>) -> Result<()>;
}

impl<T: AdminTransport + ?Sized> AdminTransport for &T {
    fn submit(&self, cmd: &mut AdminCommand<'_>) -> Result<()> {
        (**self).submit(cmd)
    }
}

/// An open NVMe character or block device node.
#[derive(Debug)]
pub struct DeviceFile {
    file: File,
}

impl DeviceFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        debug!("opened nvme device {}", path.display());
        Ok(Self { file })
    }

    /// Returns the namespace id of a namespace block device such as `/dev/nvme0n1`.
    pub fn namespace_id(&self) -> Result<u32> {
        // SAFETY: the request takes no argument.
        let nsid = unsafe { ioctls::nvme_ioctl_id(self.file.as_raw_fd()) }?;
        Ok(nsid as u32)
    }
}

impl From<File> for DeviceFile {
    fn from(file: File) -> Self {
        Self { file }
    }
}

impl AdminTransport for DeviceFile {
    fn submit(&self, cmd: &mut AdminCommand<'_>) -> Result<()> {
        let ptr = core::ptr::from_mut(cmd).cast::<AdminCommand<'static>>();

        // SAFETY: `cmd` is a valid passthrough record and the regions bound
        // to it stay borrowed for at least as long as `cmd` lives.
        let status = unsafe { ioctls::nvme_ioctl_admin_cmd(self.file.as_raw_fd(), ptr) }?;
        if status > 0 {
            return Err(Error::CommandFailed(status as u16));
        }

        Ok(())
    }
}

/// Settings applied to every command a device issues.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Per-command timeout in milliseconds. Zero keeps the driver default.
    pub timeout_ms: u32,
    /// How many idle transfer buffers are kept between requests.
    pub pool_capacity: usize,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 0,
            pool_capacity: 4,
        }
    }
}

/// A structure representing an NVMe controller reached through a transport.
///
/// Calls are synchronous. A device may be shared across threads only when
/// the caller serializes the requests it makes.
pub struct NvmeDevice<T> {
    transport: T,
    pub(crate) pool: TransferPool,
    config: DeviceConfig,
}

impl NvmeDevice<DeviceFile> {
    /// Opens the device node at `path` with the default configuration.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(DeviceFile::open(path)?))
    }
}

impl<T: AdminTransport> NvmeDevice<T> {
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, DeviceConfig::default())
    }

    pub fn with_config(transport: T, config: DeviceConfig) -> Self {
        Self {
            transport,
            pool: TransferPool::new(config.pool_capacity),
            config,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub(crate) fn submit(&self, cmd: &mut AdminCommand<'_>) -> Result<()> {
        cmd.set_timeout(self.config.timeout_ms);
        let [cdw10, cdw11, cdw12, cdw13, ..] = cmd.cdws();
        trace!(
            "admin {:#04x} nsid {:#x} cdw10..13 {cdw10:#x} {cdw11:#x} {cdw12:#x} {cdw13:#x}",
            cmd.opcode(),
            cmd.nsid(),
        );
        self.transport.submit(cmd)
    }
}

impl<T: AdminTransport> NvmeDevice<T> {
    pub fn identify_controller(&self) -> Result<IdentifyController> {
        let mut data = IdentifyController::new_zeroed();
        let data_buffer = DataBuffer::record(&mut data);
        let mut cmd = AdminCommand::identify(0, 0, Cns::CONTROLLER, 0, data_buffer)?;
        self.submit(&mut cmd)?;
        Ok(data)
    }

    pub fn identify_namespace(&self, nsid: u32) -> Result<IdentifyNamespace> {
        let mut data = IdentifyNamespace::new_zeroed();
        let data_buffer = DataBuffer::record(&mut data);
        let mut cmd = AdminCommand::identify(nsid, 0, Cns::NAMESPACE, 0, data_buffer)?;
        self.submit(&mut cmd)?;
        Ok(data)
    }

    /// Active namespace ids greater than `base`.
    pub fn active_namespaces(&self, base: u32) -> Result<Vec<u32>> {
        let mut list = NamespaceList::new_zeroed();
        let mut cmd = AdminCommand::identify(
            base,
            0,
            Cns::ACTIVE_NAMESPACE_LIST,
            0,
            DataBuffer::record(&mut list),
        )?;
        self.submit(&mut cmd)?;
        Ok(list.ids().collect())
    }

    pub fn identify_namespaces(&self, base: u32) -> Result<Vec<Namespace>> {
        let get_namespace = |id| -> Result<Namespace> {
            let data = self.identify_namespace(id)?;
            Ok(Namespace {
                id,
                block_count: data.size(),
                block_size: data.block_size(),
            })
        };

        self.active_namespaces(base)?.into_iter().map(get_namespace).collect()
    }
}

impl<T: AdminTransport> NvmeDevice<T> {
    pub fn smart_log(&self) -> Result<SmartLog> {
        let mut data = SmartLog::new_zeroed();
        let data_buffer = DataBuffer::record(&mut data);
        let mut cmd = AdminCommand::get_log_page(0, LogPageId::SMART, 0, 0, 0, data_buffer)?;
        self.submit(&mut cmd)?;
        Ok(data)
    }

    pub fn firmware_slot_info(&self) -> Result<FirmwareSlotInfo> {
        let mut data = FirmwareSlotInfo::new_zeroed();
        let data_buffer = DataBuffer::record(&mut data);
        let mut cmd =
            AdminCommand::get_log_page(0, LogPageId::FIRMWARE_SLOT, 0, 0, 0, data_buffer)?;
        self.submit(&mut cmd)?;
        Ok(data)
    }

    /// Reads a log page, typically a vendor specific one, into `buffer`.
    ///
    /// The whole buffer is requested in a single command.
    pub fn vendor_log<'a>(
        &self,
        nsid: u32,
        lid: LogPageId,
        lsp: u8,
        lsi: u16,
        buffer: impl Into<DataBuffer<'a>>,
    ) -> Result<()> {
        let mut cmd = AdminCommand::get_log_page(nsid, lid, lsp, lsi, 0, buffer)?;
        self.submit(&mut cmd)
    }

    /// Reads a feature and returns completion dword 0.
    ///
    /// Features that return a data structure write it to `buffer`.
    pub fn get_feature<'a>(
        &self,
        nsid: u32,
        fid: FeatureId,
        select: Select,
        value: u32,
        buffer: Option<DataBuffer<'a>>,
    ) -> Result<u32> {
        let mut cmd = AdminCommand::get_features(nsid, fid, select, value);
        if let Some(buffer) = buffer {
            cmd.bind_data(buffer)?;
        }
        self.submit(&mut cmd)?;
        Ok(cmd.result())
    }

    /// Changes a feature and returns completion dword 0.
    ///
    /// With `save` set the value persists across power cycles.
    pub fn set_feature<'a>(
        &self,
        nsid: u32,
        fid: FeatureId,
        save: bool,
        value: u32,
        buffer: Option<DataBuffer<'a>>,
    ) -> Result<u32> {
        let mut cmd = AdminCommand::set_features(nsid, fid, save, value);
        if let Some(buffer) = buffer {
            cmd.bind_data(buffer)?;
        }
        self.submit(&mut cmd)?;
        Ok(cmd.result())
    }
}

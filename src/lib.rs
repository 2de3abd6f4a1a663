//! NVMe admin command passthrough for Linux hosts.
//!
//! This crate builds admin commands (Identify, Get Log Page, Get and Set
//! Features), submits them to a controller through the kernel's ioctl
//! interface and decodes the fixed-layout data the controller returns.
//! Log pages larger than one transfer, such as telemetry and the error
//! information log, are read in consecutive rounds.

mod cmd;
mod device;
mod error;
mod fetch;
mod identify;
mod ioctl;
mod logs;
mod memory;

#[cfg(test)]
mod mock;

pub use cmd::{AdminCommand, Cns, FeatureId, LogPageId, Opcode, Select};
pub use device::{AdminTransport, DeviceConfig, DeviceFile, NvmeDevice};
pub use error::{Error, Result};
pub use identify::{IdentifyController, IdentifyNamespace, LbaFormat, Namespace, NamespaceList};
pub use ioctl::{Direction, NVME_IOCTL_ADMIN_CMD, NVME_IOCTL_ID, RequestCode};
pub use logs::{
    ErrorLogEntry, FirmwareSlot, FirmwareSlotInfo, ParamErrorLocation, SmartLog, StatusField,
    TelemetryBlock, TelemetryHeader, TransportType,
};
pub use memory::{DataBuffer, DmaBuffer, PooledBuffer, TransferPool};

//! Log pages larger than one transfer, read in consecutive rounds through a
//! single pooled buffer.

use log::{debug, trace};

use crate::cmd::{AdminCommand, LogPageId};
use crate::device::{AdminTransport, NvmeDevice};
use crate::error::{Error, Result};
use crate::logs::{
    ERROR_LOG_ENTRY_SIZE, ErrorLogEntry, LOG_PAGE_SIZE, TelemetryBlock, TelemetryHeader,
};
use crate::memory::TRANSFER_UNIT;

/// Asks the controller to capture new host-initiated telemetry data.
const LSP_CREATE_TELEMETRY: u8 = 1;

const TELEMETRY_HEADER_SIZE: usize = LOG_PAGE_SIZE;
const ENTRIES_PER_TRANSFER: usize = TRANSFER_UNIT / ERROR_LOG_ENTRY_SIZE;

const fn dwords(bytes: usize) -> u32 {
    (bytes >> 2) as u32
}

impl<T: AdminTransport> NvmeDevice<T> {
    /// Reads the host-initiated telemetry log through the end of `block`.
    ///
    /// The result starts with the 512 byte header. With `create` set the
    /// controller captures a new snapshot before the header is returned.
    pub fn telemetry_host(&self, block: TelemetryBlock, create: bool) -> Result<Vec<u8>> {
        let lsp = if create { LSP_CREATE_TELEMETRY } else { 0 };
        self.telemetry(LogPageId::TELEMETRY_HOST, block, lsp)
    }

    /// Reads the controller-initiated telemetry log through the end of `block`.
    pub fn telemetry_controller(&self, block: TelemetryBlock) -> Result<Vec<u8>> {
        self.telemetry(LogPageId::TELEMETRY_CONTROLLER, block, 0)
    }

    fn telemetry(&self, lid: LogPageId, block: TelemetryBlock, lsp: u8) -> Result<Vec<u8>> {
        let buffer = self.pool.acquire()?;
        let mut cmd = AdminCommand::get_log_page(0, lid, lsp, 0, 0, &*buffer)?;

        cmd.set_dword_count(dwords(TELEMETRY_HEADER_SIZE));
        self.submit(&mut cmd)?;

        let mut log = buffer.to_vec(TELEMETRY_HEADER_SIZE);
        let header = TelemetryHeader::decode(&log)?;
        let size = header.block_size(block) as usize;
        debug!("telemetry log {:#04x}: {size} bytes through {block:?}", lid.0);

        // The snapshot is taken by the header request only.
        cmd.set_lsp(0);
        cmd.set_dword_count(dwords(TRANSFER_UNIT));

        log.reserve(size.saturating_sub(log.len()));
        let mut offset = TELEMETRY_HEADER_SIZE;
        while offset < size {
            let fetch = (size - offset).min(TRANSFER_UNIT);
            if fetch < TRANSFER_UNIT {
                cmd.set_dword_count(dwords(fetch));
            }
            cmd.set_offset(offset as u64);
            trace!("telemetry log {:#04x}: {fetch} bytes at {offset}", lid.0);

            self.submit(&mut cmd)?;
            buffer.extend_into(fetch, &mut log);
            offset += fetch;
        }

        Ok(log)
    }

    /// Reads at most `latest` entries of the error information log, newest first.
    ///
    /// The count is further limited by the number of entries the controller
    /// keeps, and stops at the first unused entry.
    pub fn error_log(&self, latest: u32) -> Result<Vec<ErrorLogEntry>> {
        let elpe = self.identify_controller()?.elpe();
        if elpe == 0 {
            return Err(Error::Unsupported("error log page"));
        }

        let count = (latest as usize).min(elpe as usize + 1);
        debug!("error log: reading {count} of {} entries", elpe as usize + 1);

        let buffer = self.pool.acquire()?;
        let lid = LogPageId::ERROR_INFORMATION;
        let mut cmd = AdminCommand::get_log_page(0, lid, 0, 0, 0, &*buffer)?;

        let mut raw = Vec::with_capacity(count * ERROR_LOG_ENTRY_SIZE);
        let mut index = 0;
        while index < count {
            let fetch = (count - index).min(ENTRIES_PER_TRANSFER);
            if fetch < ENTRIES_PER_TRANSFER {
                cmd.set_dword_count(dwords(fetch * ERROR_LOG_ENTRY_SIZE));
            }
            cmd.set_offset((index * ERROR_LOG_ENTRY_SIZE) as u64);
            trace!("error log: {fetch} entries from {index}");

            self.submit(&mut cmd)?;
            buffer.extend_into(fetch * ERROR_LOG_ENTRY_SIZE, &mut raw);
            index += fetch;
        }

        let mut entries = Vec::with_capacity(count);
        for chunk in raw.chunks_exact(ERROR_LOG_ENTRY_SIZE) {
            let entry = ErrorLogEntry::decode(chunk)?;
            if !entry.is_valid() {
                break;
            }
            entries.push(entry);
        }

        Ok(entries)
    }
}

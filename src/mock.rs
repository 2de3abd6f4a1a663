//! A simulated controller for exercising the command paths without hardware.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use crate::cmd::{AdminCommand, Cns, LogPageId, Opcode};
use crate::device::AdminTransport;
use crate::error::{Error, Result};

/// Invalid Field in Command
pub(crate) const INVALID_FIELD: u16 = 0x02;

/// What the controller saw for one submission.
#[derive(Debug, Clone)]
pub(crate) struct Submitted {
    pub opcode: u8,
    pub nsid: u32,
    pub cdws: [u32; 6],
    pub lsp: u8,
    pub dwords: u32,
    pub offset: u64,
    pub data_len: u32,
    pub timeout_ms: u32,
}

#[derive(Default)]
pub(crate) struct MockController {
    identify: RefCell<HashMap<(u8, u32), Vec<u8>>>,
    logs: RefCell<HashMap<u8, Vec<u8>>>,
    commands: RefCell<Vec<Submitted>>,
    failure: RefCell<Option<(usize, Error)>>,
    result: Cell<u32>,
}

impl MockController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serves `image` for Identify with `cns` on `nsid`.
    pub fn set_identify(&self, cns: Cns, nsid: u32, image: Vec<u8>) {
        self.identify.borrow_mut().insert((cns.0, nsid), image);
    }

    /// Serves `image` as the whole content of log page `lid`.
    pub fn set_log(&self, lid: LogPageId, image: Vec<u8>) {
        self.logs.borrow_mut().insert(lid.0, image);
    }

    /// Completion dword 0 reported for every command.
    pub fn set_result(&self, result: u32) {
        self.result.set(result);
    }

    /// Fails the `index`th submission (zero based) with `error`.
    pub fn fail_at(&self, index: usize, error: Error) {
        *self.failure.borrow_mut() = Some((index, error));
    }

    pub fn commands(&self) -> Vec<Submitted> {
        self.commands.borrow().clone()
    }

    fn transfer(&self, cmd: &AdminCommand<'_>, image: &[u8], offset: usize, len: usize) {
        let (addr, data_len) = cmd.data();
        let len = len.min(data_len as usize);
        // SAFETY: the command keeps the bound region borrowed and at least
        // `data_len` bytes long while it is submitted.
        let region = unsafe { core::slice::from_raw_parts_mut(addr as *mut u8, len) };

        region.fill(0);
        if let Some(src) = image.get(offset..) {
            let n = src.len().min(len);
            region[..n].copy_from_slice(&src[..n]);
        }
    }
}

impl AdminTransport for MockController {
    fn submit(&self, cmd: &mut AdminCommand<'_>) -> Result<()> {
        let index = {
            let mut commands = self.commands.borrow_mut();
            commands.push(Submitted {
                opcode: cmd.opcode(),
                nsid: cmd.nsid(),
                cdws: cmd.cdws(),
                lsp: cmd.lsp(),
                dwords: cmd.dword_count(),
                offset: cmd.offset(),
                data_len: cmd.data().1,
                timeout_ms: cmd.timeout_ms(),
            });
            commands.len() - 1
        };

        let mut failure = self.failure.borrow_mut();
        if failure.as_ref().is_some_and(|(at, _)| *at == index) {
            if let Some((_, error)) = failure.take() {
                return Err(error);
            }
        }
        drop(failure);

        match cmd.opcode() {
            op if op == Opcode::Identify as u8 => {
                let cns = (cmd.cdws()[0] & 0xff) as u8;
                let identify = self.identify.borrow();
                let image = identify
                    .get(&(cns, cmd.nsid()))
                    .ok_or(Error::CommandFailed(INVALID_FIELD))?;
                self.transfer(cmd, image, 0, cmd.data().1 as usize);
            }
            op if op == Opcode::GetLogPage as u8 => {
                let logs = self.logs.borrow();
                let image = logs.get(&cmd.lid().0).ok_or(Error::CommandFailed(INVALID_FIELD))?;
                let len = (cmd.dword_count() as usize) << 2;
                self.transfer(cmd, image, cmd.offset() as usize, len);
            }
            _ => {}
        }

        cmd.set_result(self.result.get());
        Ok(())
    }
}

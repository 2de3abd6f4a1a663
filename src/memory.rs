use core::mem::ManuallyDrop;
use core::ops::{Deref, DerefMut};
use core::ptr::NonNull;
use std::alloc::{self, Layout};

use crossbeam_queue::ArrayQueue;
use zerocopy::{FromBytes, IntoBytes};

use crate::error::{Error, Result};

pub const PAGE_SIZE: usize = 4096;

/// Bytes moved by one full Get Log Page or Identify transfer.
pub const TRANSFER_UNIT: usize = 4096;

/// A page-aligned, zero-initialized heap region handed to the kernel.
///
/// The region does not move when the `DmaBuffer` itself moves, so its
/// address stays valid from bind until the submission returns.
///
/// The controller writes through the raw address while the buffer is only
/// shared-borrowed by a command, so contents are never exposed as a slice
/// through `&self`. Reads copy out instead, which keeps a live slice from
/// ever overlapping a submission.
pub struct DmaBuffer {
    addr: NonNull<u8>,
    len: usize,
    layout: Layout,
}

// Only `Send`: a shared reference must never be used from two threads while
// one of them is submitting into the region.
unsafe impl Send for DmaBuffer {}

impl DmaBuffer {
    /// Allocates a zeroed region of `len` bytes.
    ///
    /// The allocation is rounded up to whole pages and aligned to a page.
    pub fn new(len: usize) -> Result<Self> {
        let size = len
            .max(1)
            .checked_next_multiple_of(PAGE_SIZE)
            .ok_or(Error::OutOfMemory(len))?;
        let layout = Layout::from_size_align(size, PAGE_SIZE).map_err(|_| Error::OutOfMemory(len))?;

        // SAFETY: `layout` has a non-zero size.
        let addr = unsafe { alloc::alloc_zeroed(layout) };
        let addr = NonNull::new(addr).ok_or(Error::OutOfMemory(len))?;

        Ok(Self { addr, len, layout })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the address the controller reads from and writes to.
    pub fn as_ptr(&self) -> *mut u8 {
        self.addr.as_ptr()
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: the region is `len` initialized bytes and `&mut self`
        // excludes any command still bound to it.
        unsafe { core::slice::from_raw_parts_mut(self.addr.as_ptr(), self.len) }
    }

    /// Copies the first `len` bytes (clamped to the buffer length) out.
    pub fn to_vec(&self, len: usize) -> Vec<u8> {
        let mut out = Vec::with_capacity(len.min(self.len));
        self.extend_into(len, &mut out);
        out
    }

    /// Appends the first `len` bytes (clamped to the buffer length) to `out`.
    pub fn extend_into(&self, len: usize, out: &mut Vec<u8>) {
        let len = len.min(self.len);
        // SAFETY: the slice lives only for this call and no submission can
        // run on this thread while it is alive.
        let bytes = unsafe { core::slice::from_raw_parts(self.addr.as_ptr(), len) };
        out.extend_from_slice(bytes);
    }

    fn clear(&mut self) {
        self.as_mut_slice().fill(0);
    }
}

impl Drop for DmaBuffer {
    fn drop(&mut self) {
        // SAFETY: allocated in `new` with this exact layout.
        unsafe { alloc::dealloc(self.addr.as_ptr(), self.layout) }
    }
}

impl core::fmt::Debug for DmaBuffer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DmaBuffer")
            .field("addr", &self.addr)
            .field("len", &self.len)
            .finish()
    }
}

/// A caller-owned region a command transfers into or out of.
///
/// The command that binds it borrows it for `'a`, so the region can neither
/// move nor be freed before the command is dropped.
#[derive(Debug)]
pub enum DataBuffer<'a> {
    /// A contiguous byte region.
    Bytes(&'a mut [u8]),
    /// A stable transfer buffer, readable between submissions.
    Dma(&'a DmaBuffer),
}

impl<'a> DataBuffer<'a> {
    /// Views a fixed-layout record as the transfer region.
    ///
    /// The bound length is `size_of::<T>()`.
    pub fn record<T: FromBytes + IntoBytes>(record: &'a mut T) -> Self {
        DataBuffer::Bytes(record.as_mut_bytes())
    }

    /// Resolves the region to the `(address, length)` pair stored in a command.
    pub fn bind(self) -> Result<(u64, u32)> {
        let (addr, len) = match self {
            DataBuffer::Bytes(bytes) => (bytes.as_mut_ptr() as u64, bytes.len()),
            DataBuffer::Dma(dma) => (dma.as_ptr() as u64, dma.len()),
        };

        if len == 0 {
            return Err(Error::NotAddressable { len });
        }
        let len = u32::try_from(len).map_err(|_| Error::NotAddressable { len })?;

        Ok((addr, len))
    }
}

impl<'a> From<&'a mut [u8]> for DataBuffer<'a> {
    fn from(bytes: &'a mut [u8]) -> Self {
        DataBuffer::Bytes(bytes)
    }
}

impl<'a, const N: usize> From<&'a mut [u8; N]> for DataBuffer<'a> {
    fn from(bytes: &'a mut [u8; N]) -> Self {
        DataBuffer::Bytes(bytes)
    }
}

impl<'a> From<&'a DmaBuffer> for DataBuffer<'a> {
    fn from(dma: &'a DmaBuffer) -> Self {
        DataBuffer::Dma(dma)
    }
}

/// Caches transfer-unit buffers so repeated requests do not reallocate.
pub struct TransferPool {
    buffers: ArrayQueue<DmaBuffer>,
}

impl Default for TransferPool {
    /// Creates a pool that keeps at most 4 idle buffers.
    fn default() -> Self {
        Self::new(4)
    }
}

impl TransferPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffers: ArrayQueue::new(capacity.max(1)),
        }
    }

    /// Takes an idle buffer or allocates a new one.
    ///
    /// Reused buffers are zeroed before they are handed out.
    pub fn acquire(&self) -> Result<PooledBuffer<'_>> {
        let buffer = match self.buffers.pop() {
            Some(mut buffer) => {
                buffer.clear();
                buffer
            }
            None => DmaBuffer::new(TRANSFER_UNIT)?,
        };

        Ok(PooledBuffer {
            pool: self,
            buffer: ManuallyDrop::new(buffer),
        })
    }

    /// Number of idle buffers.
    pub fn idle(&self) -> usize {
        self.buffers.len()
    }

    fn release(&self, buffer: DmaBuffer) {
        // A full pool drops the buffer.
        let _ = self.buffers.push(buffer);
    }
}

/// A transfer buffer on loan from a [`TransferPool`].
///
/// Returns to the pool when dropped.
pub struct PooledBuffer<'a> {
    pool: &'a TransferPool,
    buffer: ManuallyDrop<DmaBuffer>,
}

impl Deref for PooledBuffer<'_> {
    type Target = DmaBuffer;

    fn deref(&self) -> &Self::Target {
        &self.buffer
    }
}

impl DerefMut for PooledBuffer<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.buffer
    }
}

impl Drop for PooledBuffer<'_> {
    fn drop(&mut self) {
        // SAFETY: `buffer` is not touched again after being taken.
        let buffer = unsafe { ManuallyDrop::take(&mut self.buffer) };
        self.pool.release(buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zerocopy::{Immutable, KnownLayout};

    #[derive(FromBytes, IntoBytes, Immutable, KnownLayout)]
    #[repr(C)]
    struct Record {
        a: u64,
        b: [u8; 24],
    }

    #[test]
    fn binds_byte_region() {
        let mut bytes = vec![0u8; 32];
        let expected = bytes.as_ptr() as u64;
        let (addr, len) = DataBuffer::from(bytes.as_mut_slice()).bind().unwrap();
        assert_eq!(addr, expected);
        assert_eq!(len, 32);
    }

    #[test]
    fn binds_record_with_its_size() {
        let mut record = Record { a: 0, b: [0; 24] };
        let expected = &record as *const Record as u64;
        let (addr, len) = DataBuffer::record(&mut record).bind().unwrap();
        assert_eq!(addr, expected);
        assert_eq!(len as usize, size_of::<Record>());
    }

    #[test]
    fn rejects_empty_region() {
        let mut bytes: [u8; 0] = [];
        let err = DataBuffer::from(&mut bytes).bind().unwrap_err();
        assert!(matches!(err, Error::NotAddressable { len: 0 }));
    }

    #[test]
    fn dma_buffer_is_page_aligned_and_zeroed() {
        let buffer = DmaBuffer::new(100).unwrap();
        assert_eq!(buffer.as_ptr() as usize % PAGE_SIZE, 0);
        assert_eq!(buffer.len(), 100);
        assert!(buffer.to_vec(100).iter().all(|&b| b == 0));
        assert_eq!(buffer.to_vec(1000).len(), 100);
    }

    #[test]
    fn dma_address_survives_moves() {
        let buffer = DmaBuffer::new(TRANSFER_UNIT).unwrap();
        let before = buffer.as_ptr();
        let moved = Box::new(buffer);
        assert_eq!(moved.as_ptr(), before);
    }

    #[test]
    fn pool_reuses_and_clears_buffers() {
        let pool = TransferPool::new(2);
        let addr = {
            let mut buffer = pool.acquire().unwrap();
            buffer.as_mut_slice()[0] = 0xaa;
            buffer.as_ptr()
        };
        assert_eq!(pool.idle(), 1);

        let buffer = pool.acquire().unwrap();
        assert_eq!(buffer.as_ptr(), addr);
        assert_eq!(buffer.to_vec(1), vec![0]);
        assert_eq!(pool.idle(), 0);
    }

    #[test]
    fn full_pool_drops_extra_buffers() {
        let pool = TransferPool::new(1);
        let first = pool.acquire().unwrap();
        let second = pool.acquire().unwrap();
        drop(first);
        drop(second);
        assert_eq!(pool.idle(), 1);
    }
}

//! Encoding of device-control request numbers.
//!
//! A request number packs four fields into one 32-bit integer:
//!
//! ```text
//!  31 30 29                16 15         8 7          0
//! +-----+--------------------+------------+------------+
//! | dir |        size        |    type    |     nr     |
//! +-----+--------------------+------------+------------+
//! ```
//!
//! The size field is 14 bits wide. Larger sizes are truncated to the low
//! 14 bits on encode, as the kernel's own macros do.

use crate::cmd::AdminCommand;

const NR_BITS: u32 = 8;
const TYPE_BITS: u32 = 8;
const SIZE_BITS: u32 = 14;
const DIR_BITS: u32 = 2;

const NR_MASK: u32 = (1 << NR_BITS) - 1;
const TYPE_MASK: u32 = (1 << TYPE_BITS) - 1;
const SIZE_MASK: u32 = (1 << SIZE_BITS) - 1;
const DIR_MASK: u32 = (1 << DIR_BITS) - 1;

const NR_SHIFT: u32 = 0;
const TYPE_SHIFT: u32 = NR_SHIFT + NR_BITS;
const SIZE_SHIFT: u32 = TYPE_SHIFT + TYPE_BITS;
const DIR_SHIFT: u32 = SIZE_SHIFT + SIZE_BITS;

/// Data transfer direction, seen from user space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Direction {
    None = 0,
    Write = 1,
    Read = 2,
    ReadWrite = 3,
}

impl Direction {
    const fn from_bits(bits: u32) -> Self {
        match bits & DIR_MASK {
            0 => Direction::None,
            1 => Direction::Write,
            2 => Direction::Read,
            _ => Direction::ReadWrite,
        }
    }
}

/// An encoded device-control request number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestCode(u32);

impl RequestCode {
    pub const fn encode(direction: Direction, kind: u8, nr: u8, size: usize) -> Self {
        Self(
            ((direction as u32 & DIR_MASK) << DIR_SHIFT)
                | ((kind as u32 & TYPE_MASK) << TYPE_SHIFT)
                | ((nr as u32 & NR_MASK) << NR_SHIFT)
                | ((size as u32 & SIZE_MASK) << SIZE_SHIFT),
        )
    }

    /// `_IO(type, nr)`
    pub const fn none(kind: u8, nr: u8) -> Self {
        Self::encode(Direction::None, kind, nr, 0)
    }

    /// `_IOR(type, nr, size)`
    pub const fn read(kind: u8, nr: u8, size: usize) -> Self {
        Self::encode(Direction::Read, kind, nr, size)
    }

    /// `_IOW(type, nr, size)`
    pub const fn write(kind: u8, nr: u8, size: usize) -> Self {
        Self::encode(Direction::Write, kind, nr, size)
    }

    /// `_IOWR(type, nr, size)`
    pub const fn read_write(kind: u8, nr: u8, size: usize) -> Self {
        Self::encode(Direction::ReadWrite, kind, nr, size)
    }

    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    pub const fn direction(self) -> Direction {
        Direction::from_bits(self.0 >> DIR_SHIFT)
    }

    pub const fn kind(self) -> u8 {
        ((self.0 >> TYPE_SHIFT) & TYPE_MASK) as u8
    }

    pub const fn number(self) -> u8 {
        ((self.0 >> NR_SHIFT) & NR_MASK) as u8
    }

    pub const fn size(self) -> usize {
        ((self.0 >> SIZE_SHIFT) & SIZE_MASK) as usize
    }

    /// Splits the code back into `(direction, type, nr, size)`.
    pub const fn decode(self) -> (Direction, u8, u8, usize) {
        (self.direction(), self.kind(), self.number(), self.size())
    }
}

const NVME_IOCTL_TYPE: u8 = b'N';

/// Returns the namespace id of a namespace block device.
pub const NVME_IOCTL_ID: RequestCode = RequestCode::none(NVME_IOCTL_TYPE, 0x40);

/// Submits one admin command. The size field is the size of [`AdminCommand`].
pub const NVME_IOCTL_ADMIN_CMD: RequestCode =
    RequestCode::read_write(NVME_IOCTL_TYPE, 0x41, size_of::<AdminCommand<'static>>());

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nvme_codes_match_linux_headers() {
        assert_eq!(NVME_IOCTL_ID.raw(), 0x4e40);
        assert_eq!(NVME_IOCTL_ADMIN_CMD.raw(), 0xc048_4e41);
    }

    #[test]
    fn decode_reverses_encode() {
        let directions = [
            Direction::None,
            Direction::Write,
            Direction::Read,
            Direction::ReadWrite,
        ];
        for direction in directions {
            for kind in [0u8, 1, b'N', 0x7f, 0xff] {
                for nr in [0u8, 0x41, 0x80, 0xff] {
                    for size in [0usize, 1, 72, 4096, SIZE_MASK as usize] {
                        let code = RequestCode::encode(direction, kind, nr, size);
                        assert_eq!(code.decode(), (direction, kind, nr, size));
                    }
                }
            }
        }
    }

    #[test]
    fn builders_set_direction() {
        assert_eq!(RequestCode::none(b'N', 1).direction(), Direction::None);
        assert_eq!(RequestCode::read(b'N', 1, 8).direction(), Direction::Read);
        assert_eq!(RequestCode::write(b'N', 1, 8).direction(), Direction::Write);
        assert_eq!(
            RequestCode::read_write(b'N', 1, 8).direction(),
            Direction::ReadWrite
        );
        assert_eq!(RequestCode::write(b'N', 0x42, 48).raw(), 0x4030_4e42);
    }

    #[test]
    fn oversized_payload_is_truncated() {
        let code = RequestCode::read(b'N', 1, (1 << SIZE_BITS) + 5);
        assert_eq!(code.size(), 5);
        assert_eq!(code.direction(), Direction::Read);
    }
}

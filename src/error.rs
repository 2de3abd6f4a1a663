use nix::errno::Errno;
use thiserror::Error;

/// Contains all possible errors that can occur while talking to an NVMe controller.
#[derive(Debug, Error)]
pub enum Error {
    /// The buffer cannot be handed to the controller.
    ///
    /// Empty regions have no stable address and regions longer than
    /// `u32::MAX` do not fit the command's length field.
    #[error("buffer of {len} bytes is not an addressable fixed-size region")]
    NotAddressable { len: usize },

    /// A decoder received a buffer that does not match its fixed layout.
    #[error("unexpected {what} size: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    /// The ioctl itself failed.
    #[error("ioctl failed: {0}")]
    Os(#[from] Errno),

    /// The command reached the controller and completed with a status code.
    #[error("command failed with status code: {0:#x}")]
    CommandFailed(u16),

    /// A capability the request depends on is reported as unsupported.
    #[error("{0} is not supported by the controller")]
    Unsupported(&'static str),

    /// A page-aligned transfer buffer could not be allocated.
    #[error("failed to allocate a {0} byte transfer buffer")]
    OutOfMemory(usize),

    /// The device node could not be opened.
    #[error("failed to open device: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns the raw errno if the error came from the ioctl.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Error::Os(errno) => Some(*errno as i32),
            Error::Io(err) => err.raw_os_error(),
            _ => None,
        }
    }
}

/// Result type for NVMe operations.
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn os_error_keeps_raw_status() {
        let err = Error::from(Errno::EINVAL);
        assert_eq!(err.raw_os_error(), Some(nix::libc::EINVAL));
        assert!(err.to_string().starts_with("ioctl failed"));
    }

    #[test]
    fn non_os_errors_have_no_errno() {
        assert_eq!(Error::CommandFailed(0x4002).raw_os_error(), None);
        assert_eq!(
            Error::SizeMismatch {
                what: "SMART log",
                expected: 512,
                actual: 511,
            }
            .to_string(),
            "unexpected SMART log size: expected 512 bytes, got 511"
        );
    }
}

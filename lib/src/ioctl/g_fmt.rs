//! Safe wrapper for the `VIDIOC_G_FMT` ioctl.
use crate::bindings;
use crate::QueueType;
use nix::errno::Errno;
use std::os::unix::io::AsRawFd;
use thiserror::Error;

#[doc(hidden)]
mod ioctl {
    use crate::bindings::v4l2_format;
    nix::ioctl_readwrite!(vidioc_g_fmt, b'V', 4, v4l2_format);
}

#[derive(Debug, Error)]
pub enum GFmtError {
    #[error("error while converting from v4l2_format")]
    FromV4L2FormatConversionError,
    #[error("buffer type {0} not supported")]
    InvalidBufferType(u32),
    #[error("ioctl error: {0}")]
    IoctlError(Errno),
}

impl From<GFmtError> for Errno {
    fn from(err: GFmtError) -> Self {
        match err {
            GFmtError::FromV4L2FormatConversionError => Errno::EINVAL,
            GFmtError::InvalidBufferType(_) => Errno::EINVAL,
            GFmtError::IoctlError(e) => e,
        }
    }
}

/// Safe wrapper around the `VIDIOC_G_FMT` ioctl.
///
/// The format currently in effect on `queue` is read back from the driver and
/// converted into `O`, never assumed.
pub fn g_fmt<O: TryFrom<bindings::v4l2_format>>(
    fd: &impl AsRawFd,
    queue: QueueType,
) -> Result<O, GFmtError> {
    let mut fmt = bindings::v4l2_format {
        type_: queue as u32,
        ..Default::default()
    };

    match unsafe { ioctl::vidioc_g_fmt(fd.as_raw_fd(), &mut fmt) } {
        Ok(_) => Ok(O::try_from(fmt).map_err(|_| GFmtError::FromV4L2FormatConversionError)?),
        Err(Errno::EINVAL) => Err(GFmtError::InvalidBufferType(queue as u32)),
        Err(e) => Err(GFmtError::IoctlError(e)),
    }
}

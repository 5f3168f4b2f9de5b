//! Safe wrappers for the `VIDIOC_G_CTRL` and `VIDIOC_S_CTRL` ioctls.
use std::os::unix::io::AsRawFd;

use nix::errno::Errno;
use thiserror::Error;

use crate::bindings::v4l2_control;
use crate::ioctl::CtrlId;

#[doc(hidden)]
mod ioctl {
    use crate::bindings::v4l2_control;
    nix::ioctl_readwrite!(vidioc_g_ctrl, b'V', 27, v4l2_control);
    nix::ioctl_readwrite!(vidioc_s_ctrl, b'V', 28, v4l2_control);
}

#[derive(Debug, Error)]
pub enum CtrlError {
    #[error("control is not supported by the device")]
    Unsupported,
    #[error("control value out of range")]
    OutOfRange,
    #[error("device busy")]
    Busy,
    #[error("ioctl error: {0}")]
    IoctlError(Errno),
}

impl From<CtrlError> for Errno {
    fn from(err: CtrlError) -> Self {
        match err {
            CtrlError::Unsupported => Errno::EINVAL,
            CtrlError::OutOfRange => Errno::ERANGE,
            CtrlError::Busy => Errno::EBUSY,
            CtrlError::IoctlError(e) => e,
        }
    }
}

/// Safe wrapper around the `VIDIOC_G_CTRL` ioctl.
pub fn g_ctrl(fd: &impl AsRawFd, id: CtrlId) -> Result<i32, CtrlError> {
    let mut ctrl = v4l2_control {
        id: id.to_u32(),
        value: 0,
    };

    match unsafe { ioctl::vidioc_g_ctrl(fd.as_raw_fd(), &mut ctrl) } {
        Ok(_) => Ok(ctrl.value),
        Err(Errno::EINVAL) => Err(CtrlError::Unsupported),
        Err(e) => Err(CtrlError::IoctlError(e)),
    }
}

/// Safe wrapper around the `VIDIOC_S_CTRL` ioctl. Returns the value actually
/// applied by the driver, which may have been clamped.
pub fn s_ctrl(fd: &impl AsRawFd, id: CtrlId, value: i32) -> Result<i32, CtrlError> {
    let mut ctrl = v4l2_control {
        id: id.to_u32(),
        value,
    };

    match unsafe { ioctl::vidioc_s_ctrl(fd.as_raw_fd(), &mut ctrl) } {
        Ok(_) => Ok(ctrl.value),
        Err(Errno::EINVAL) => Err(CtrlError::Unsupported),
        Err(Errno::ERANGE) => Err(CtrlError::OutOfRange),
        Err(Errno::EBUSY) => Err(CtrlError::Busy),
        Err(e) => Err(CtrlError::IoctlError(e)),
    }
}

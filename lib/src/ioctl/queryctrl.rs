//! Safe wrapper for the `VIDIOC_QUERYCTRL` ioctl.
use std::os::unix::io::AsRawFd;

use nix::errno::Errno;
use thiserror::Error;

use crate::bindings;
use crate::bindings::v4l2_queryctrl;
use crate::ioctl::string_from_cstr;

/// Index of a control that has been validated, i.e. which ID is within the
/// range of `V4L2_CTRL_ID_MASK`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CtrlId(u32);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CtrlIdError {
    #[error("invalid control number: 0x{0:08x}")]
    InvalidControl(u32),
}

impl CtrlId {
    /// Create a new control index from its u32 representation, after
    /// validation.
    pub fn new(ctrl: u32) -> Result<Self, CtrlIdError> {
        if (ctrl & bindings::V4L2_CTRL_ID_MASK) != ctrl {
            Err(CtrlIdError::InvalidControl(ctrl))
        } else {
            Ok(CtrlId(ctrl))
        }
    }

    pub fn to_u32(self) -> u32 {
        self.0
    }
}

/// Safe variant of `v4l2_queryctrl`, describing one control of the device.
#[derive(Debug, Clone)]
pub struct CtrlDesc {
    pub id: CtrlId,
    pub name: String,
    pub minimum: i32,
    pub maximum: i32,
    pub step: i32,
    pub default_value: i32,
    pub read_only: bool,
    pub disabled: bool,
}

impl From<v4l2_queryctrl> for CtrlDesc {
    fn from(qctrl: v4l2_queryctrl) -> Self {
        CtrlDesc {
            id: CtrlId(qctrl.id & bindings::V4L2_CTRL_ID_MASK),
            name: string_from_cstr(&qctrl.name).unwrap_or_else(|_| "".into()),
            minimum: qctrl.minimum,
            maximum: qctrl.maximum,
            step: qctrl.step,
            default_value: qctrl.default_value,
            read_only: qctrl.flags & bindings::V4L2_CTRL_FLAG_READ_ONLY != 0,
            disabled: qctrl.flags & bindings::V4L2_CTRL_FLAG_DISABLED != 0,
        }
    }
}

#[doc(hidden)]
mod ioctl {
    use crate::bindings::v4l2_queryctrl;
    nix::ioctl_readwrite!(vidioc_queryctrl, b'V', 36, v4l2_queryctrl);
}

#[derive(Debug, Error)]
pub enum QueryCtrlError {
    #[error("control is not supported by the device")]
    Unsupported,
    #[error("ioctl error: {0}")]
    IoctlError(Errno),
}

impl From<QueryCtrlError> for Errno {
    fn from(err: QueryCtrlError) -> Self {
        match err {
            QueryCtrlError::Unsupported => Errno::EINVAL,
            QueryCtrlError::IoctlError(e) => e,
        }
    }
}

/// Safe wrapper around the `VIDIOC_QUERYCTRL` ioctl.
pub fn queryctrl<T: From<v4l2_queryctrl>>(
    fd: &impl AsRawFd,
    id: CtrlId,
) -> Result<T, QueryCtrlError> {
    let mut qctrl = v4l2_queryctrl {
        id: id.0,
        ..Default::default()
    };

    match unsafe { ioctl::vidioc_queryctrl(fd.as_raw_fd(), &mut qctrl) } {
        Ok(_) => Ok(T::from(qctrl)),
        Err(Errno::EINVAL) => Err(QueryCtrlError::Unsupported),
        Err(e) => Err(QueryCtrlError::IoctlError(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ctrlid() {
        assert_eq!(
            CtrlId::new(bindings::V4L2_CID_USER_BASE),
            Ok(CtrlId(bindings::V4L2_CID_USER_BASE))
        );
        assert_eq!(
            CtrlId::new(bindings::V4L2_CTRL_FLAG_NEXT_CTRL),
            Err(CtrlIdError::InvalidControl(
                bindings::V4L2_CTRL_FLAG_NEXT_CTRL
            ))
        );
    }
}

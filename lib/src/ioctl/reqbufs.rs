//! Safe wrapper for the `VIDIOC_REQBUFS` ioctl.
use crate::bindings::v4l2_requestbuffers;
use crate::QueueType;
use nix::errno::Errno;
use std::os::unix::io::AsRawFd;
use thiserror::Error;

/// The memory backings a queue's buffers can use. This pipeline only ever
/// allocates driver-backed MMAP buffers, which it then exports as DMA-BUFs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum MemoryType {
    Mmap = crate::bindings::v4l2_memory_V4L2_MEMORY_MMAP,
    UserPtr = crate::bindings::v4l2_memory_V4L2_MEMORY_USERPTR,
    DmaBuf = crate::bindings::v4l2_memory_V4L2_MEMORY_DMABUF,
}

impl From<v4l2_requestbuffers> for () {
    fn from(_reqbufs: v4l2_requestbuffers) -> Self {}
}

/// In case we are just interested in the number of buffers that `reqbufs`
/// created.
impl From<v4l2_requestbuffers> for usize {
    fn from(reqbufs: v4l2_requestbuffers) -> Self {
        reqbufs.count as usize
    }
}

#[doc(hidden)]
mod ioctl {
    use crate::bindings::v4l2_requestbuffers;
    nix::ioctl_readwrite!(vidioc_reqbufs, b'V', 8, v4l2_requestbuffers);
}

#[derive(Debug, Error)]
pub enum ReqbufsError {
    #[error("invalid buffer ({0}) or memory type ({1:?}) requested")]
    InvalidBufferType(QueueType, MemoryType),
    #[error("ioctl error: {0}")]
    IoctlError(Errno),
}

impl From<ReqbufsError> for Errno {
    fn from(err: ReqbufsError) -> Self {
        match err {
            ReqbufsError::InvalidBufferType(_, _) => Errno::EINVAL,
            ReqbufsError::IoctlError(e) => e,
        }
    }
}

/// Safe wrapper around the `VIDIOC_REQBUFS` ioctl.
///
/// Requesting zero buffers frees all previously allocated ones.
pub fn reqbufs<O: From<v4l2_requestbuffers>>(
    fd: &impl AsRawFd,
    queue: QueueType,
    memory: MemoryType,
    count: u32,
) -> Result<O, ReqbufsError> {
    let mut reqbufs = v4l2_requestbuffers {
        count,
        type_: queue as u32,
        memory: memory as u32,
        ..Default::default()
    };

    match unsafe { ioctl::vidioc_reqbufs(fd.as_raw_fd(), &mut reqbufs) } {
        Ok(_) => Ok(O::from(reqbufs)),
        Err(Errno::EINVAL) => Err(ReqbufsError::InvalidBufferType(queue, memory)),
        Err(e) => Err(ReqbufsError::IoctlError(e)),
    }
}

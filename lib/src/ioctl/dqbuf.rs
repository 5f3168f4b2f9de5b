//! Safe wrapper for the `VIDIOC_DQBUF` ioctl.
use crate::bindings;
use crate::ioctl::MemoryType;
use crate::QueueType;
use bitflags::bitflags;
use nix::errno::Errno;
use std::fmt::Debug;
use std::os::unix::io::AsRawFd;
use thiserror::Error;

bitflags! {
    /// `flags` member of `struct v4l2_buffer`.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct BufferFlags: u32 {
        const MAPPED = bindings::V4L2_BUF_FLAG_MAPPED;
        const QUEUED = bindings::V4L2_BUF_FLAG_QUEUED;
        const DONE = bindings::V4L2_BUF_FLAG_DONE;
        const ERROR = bindings::V4L2_BUF_FLAG_ERROR;
        const LAST = bindings::V4L2_BUF_FLAG_LAST;
        const TIMESTAMP_MONOTONIC = bindings::V4L2_BUF_FLAG_TIMESTAMP_MONOTONIC;
    }
}

/// Metadata of a successfully dequeued multi-planar buffer. Safe variant of
/// the information this pipeline needs from `struct v4l2_buffer`.
#[derive(Clone, Copy)]
pub struct DqBuffer {
    pub index: u32,
    pub sequence: u32,
    pub timestamp: bindings::timeval,
    pub bytes_used: u32,
    pub flags: BufferFlags,
}

impl DqBuffer {
    /// Whether the driver flagged this buffer as the last one of the stream.
    pub fn is_last(&self) -> bool {
        self.flags.contains(BufferFlags::LAST)
    }
}

impl Debug for DqBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DqBuffer")
            .field("index", &self.index)
            .field("sequence", &self.sequence)
            .field("flags", &self.flags)
            .finish()
    }
}

#[doc(hidden)]
mod ioctl {
    use crate::bindings::v4l2_buffer;
    nix::ioctl_readwrite!(vidioc_dqbuf, b'V', 17, v4l2_buffer);
}

#[derive(Debug, Error)]
pub enum DqBufError {
    #[error("end-of-stream reached")]
    Eos,
    #[error("no buffer ready for dequeue")]
    NotReady,
    #[error("ioctl error: {0}")]
    IoctlError(Errno),
}

impl From<Errno> for DqBufError {
    fn from(errno: Errno) -> Self {
        match errno {
            Errno::EAGAIN => Self::NotReady,
            Errno::EPIPE => Self::Eos,
            e => Self::IoctlError(e),
        }
    }
}

impl From<DqBufError> for Errno {
    fn from(err: DqBufError) -> Self {
        match err {
            DqBufError::Eos => Errno::EPIPE,
            DqBufError::NotReady => Errno::EAGAIN,
            DqBufError::IoctlError(e) => e,
        }
    }
}

pub type DqBufResult = Result<DqBuffer, DqBufError>;

/// Safe wrapper around the `VIDIOC_DQBUF` ioctl, for MMAP multi-planar
/// buffers. Blocks until a filled buffer is available unless the device was
/// opened non-blocking.
pub fn dqbuf(fd: &impl AsRawFd, queue: QueueType) -> DqBufResult {
    let mut planes: [bindings::v4l2_plane; bindings::VIDEO_MAX_PLANES as usize] =
        Default::default();
    let mut v4l2_buf = bindings::v4l2_buffer {
        type_: queue as u32,
        memory: MemoryType::Mmap as u32,
        length: planes.len() as u32,
        ..Default::default()
    };
    v4l2_buf.m.planes = planes.as_mut_ptr();

    unsafe { ioctl::vidioc_dqbuf(fd.as_raw_fd(), &mut v4l2_buf) }?;

    Ok(DqBuffer {
        index: v4l2_buf.index,
        sequence: v4l2_buf.sequence,
        timestamp: v4l2_buf.timestamp,
        // All planes carry the same payload size on this hardware; plane 0 is
        // authoritative.
        bytes_used: planes
            .first()
            .map(|p| p.bytesused)
            .unwrap_or(v4l2_buf.bytesused),
        flags: BufferFlags::from_bits_truncate(v4l2_buf.flags),
    })
}

//! Safe wrapper for the `VIDIOC_QBUF` ioctl.
use crate::bindings;
use crate::ioctl::MemoryType;
use crate::QueueType;
use nix::errno::Errno;
use std::os::unix::io::AsRawFd;
use thiserror::Error;

#[doc(hidden)]
mod ioctl {
    use crate::bindings::v4l2_buffer;
    nix::ioctl_readwrite!(vidioc_qbuf, b'V', 15, v4l2_buffer);
}

#[derive(Debug, Error)]
pub enum QBufError {
    #[error("invalid number of planes specified for the buffer: got {0}, expected at most {1}")]
    NumPlanesMismatch(usize, usize),
    #[error("buffer type {0} is not multi-planar")]
    NotMultiPlanar(QueueType),
    #[error("ioctl error: {0}")]
    IoctlError(Errno),
}

impl From<QBufError> for Errno {
    fn from(err: QBufError) -> Self {
        match err {
            QBufError::NumPlanesMismatch(_, _) => Errno::EINVAL,
            QBufError::NotMultiPlanar(_) => Errno::EINVAL,
            QBufError::IoctlError(e) => e,
        }
    }
}

/// Safe wrapper around the `VIDIOC_QBUF` ioctl, for driver-backed (MMAP)
/// multi-planar buffers.
///
/// MMAP planes carry no user-provided handles, so queuing only needs the
/// buffer index and its number of planes. The caller must not access any
/// mapping of the buffer until it is dequeued again: as soon as the buffer is
/// queued the capture hardware owns its memory.
pub fn qbuf(
    fd: &impl AsRawFd,
    queue: QueueType,
    index: usize,
    num_planes: usize,
) -> Result<(), QBufError> {
    if !queue.is_multiplanar() {
        return Err(QBufError::NotMultiPlanar(queue));
    }
    if num_planes == 0 || num_planes > bindings::VIDEO_MAX_PLANES as usize {
        return Err(QBufError::NumPlanesMismatch(
            num_planes,
            bindings::VIDEO_MAX_PLANES as usize,
        ));
    }

    let mut planes: [bindings::v4l2_plane; bindings::VIDEO_MAX_PLANES as usize] =
        Default::default();
    let mut v4l2_buf = bindings::v4l2_buffer {
        index: index as u32,
        type_: queue as u32,
        memory: MemoryType::Mmap as u32,
        length: num_planes as u32,
        ..Default::default()
    };
    v4l2_buf.m.planes = planes.as_mut_ptr();

    unsafe { ioctl::vidioc_qbuf(fd.as_raw_fd(), &mut v4l2_buf) }
        .map_err(QBufError::IoctlError)?;

    Ok(())
}

//! Safe wrapper for the `VIDIOC_QUERYBUF` ioctl.
use crate::bindings;
use crate::QueueType;
use nix::errno::Errno;
use std::os::unix::io::AsRawFd;
use thiserror::Error;

/// Information about a single plane of a queried buffer, as needed to mmap it.
#[derive(Debug, Clone, Copy)]
pub struct QueryBufPlane {
    /// Offset to pass to `mmap()` in order to obtain a mapping for this plane.
    pub mem_offset: u32,
    /// Length of this plane.
    pub length: u32,
}

/// Information about the planes of a MMAP buffer, as returned by
/// `VIDIOC_QUERYBUF`.
#[derive(Debug, Clone)]
pub struct QueryBuffer {
    pub index: usize,
    pub planes: Vec<QueryBufPlane>,
}

#[doc(hidden)]
mod ioctl {
    use crate::bindings::v4l2_buffer;
    nix::ioctl_readwrite!(vidioc_querybuf, b'V', 9, v4l2_buffer);
}

#[derive(Debug, Error)]
pub enum QueryBufError {
    #[error("buffer type {0} is not multi-planar")]
    NotMultiPlanar(QueueType),
    #[error("ioctl error: {0}")]
    IoctlError(Errno),
}

impl From<QueryBufError> for Errno {
    fn from(err: QueryBufError) -> Self {
        match err {
            QueryBufError::NotMultiPlanar(_) => Errno::EINVAL,
            QueryBufError::IoctlError(e) => e,
        }
    }
}

/// Safe wrapper around the `VIDIOC_QUERYBUF` ioctl, for multi-planar queues.
pub fn querybuf(
    fd: &impl AsRawFd,
    queue: QueueType,
    index: usize,
) -> Result<QueryBuffer, QueryBufError> {
    if !queue.is_multiplanar() {
        return Err(QueryBufError::NotMultiPlanar(queue));
    }

    let mut planes: [bindings::v4l2_plane; bindings::VIDEO_MAX_PLANES as usize] =
        Default::default();
    let mut v4l2_buf = bindings::v4l2_buffer {
        index: index as u32,
        type_: queue as u32,
        length: planes.len() as u32,
        ..Default::default()
    };
    v4l2_buf.m.planes = planes.as_mut_ptr();

    unsafe { ioctl::vidioc_querybuf(fd.as_raw_fd(), &mut v4l2_buf) }
        .map_err(QueryBufError::IoctlError)?;

    Ok(QueryBuffer {
        index: v4l2_buf.index as usize,
        planes: planes
            .iter()
            .take(v4l2_buf.length as usize)
            .map(|p| QueryBufPlane {
                mem_offset: unsafe { p.m.mem_offset },
                length: p.length,
            })
            .collect(),
    })
}

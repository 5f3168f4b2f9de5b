//! Memory mapping of driver-backed buffer planes.
use core::num::NonZeroUsize;
use std::os::unix::io::AsFd;
use std::ptr::NonNull;
use std::slice;

use log::error;
use nix::errno::Errno;
use nix::libc::{c_void, off_t};
use nix::sys::mman;
use thiserror::Error;

/// A read-only mapping of one buffer plane.
///
/// The mapping remains valid until the object is dropped, at which point the
/// memory is unmapped. The capture hardware writes into the underlying pages
/// whenever the buffer is queued, so the contents may only be inspected while
/// the slot is held by a display/test consumer.
pub struct PlaneMapping {
    data: NonNull<c_void>,
    len: usize,
}

// The mapping is plain memory, valid for the lifetime of the object.
unsafe impl Send for PlaneMapping {}
unsafe impl Sync for PlaneMapping {}

impl PlaneMapping {
    pub fn size(&self) -> usize {
        self.len
    }

    pub fn as_slice(&self) -> &[u8] {
        // Safe because the pointer and length were returned by mmap() and
        // stay valid until munmap() in drop().
        unsafe { slice::from_raw_parts(self.data.as_ptr() as *const u8, self.len) }
    }
}

impl AsRef<[u8]> for PlaneMapping {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl Drop for PlaneMapping {
    fn drop(&mut self) {
        // Safe because the pointer and length were constructed in mmap() and
        // are always valid.
        unsafe { mman::munmap(self.data, self.len) }.unwrap_or_else(|e| {
            error!("error while unmapping plane: {}", e);
        });
    }
}

#[derive(Debug, Error)]
pub enum MmapError {
    #[error("zero-sized mapping requested")]
    ZeroSize,
    #[error("ioctl error: {0}")]
    IoctlError(#[from] Errno),
}

impl From<MmapError> for Errno {
    fn from(err: MmapError) -> Self {
        match err {
            MmapError::ZeroSize => Errno::EINVAL,
            MmapError::IoctlError(e) => e,
        }
    }
}

/// Maps `length` bytes of `fd` at `mem_offset`, read-only and shared.
pub fn mmap(fd: &impl AsFd, mem_offset: u32, length: u32) -> Result<PlaneMapping, MmapError> {
    let non_zero_length = NonZeroUsize::new(length as usize).ok_or(MmapError::ZeroSize)?;
    let data = unsafe {
        mman::mmap(
            None,
            non_zero_length,
            mman::ProtFlags::PROT_READ,
            mman::MapFlags::MAP_SHARED,
            fd,
            mem_offset as off_t,
        )
    }?;

    Ok(PlaneMapping {
        data,
        len: length as usize,
    })
}

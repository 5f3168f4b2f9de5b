//! Dumb-buffer framebuffers for static overlay content.
//!
//! Captured frames never pass through here; dumb buffers only back the small
//! ARGB bitmaps (status text, logo) that the status sink composites next to
//! the live picture.
use core::num::NonZeroUsize;
use std::ptr::NonNull;
use std::slice;
use std::sync::Arc;

use log::{debug, warn};
use nix::libc::{c_void, off_t};
use nix::sys::mman;

use crate::kms::{ioctl, Card, KmsError};

/// A CPU-writable dumb buffer with a framebuffer bound to it.
pub struct DumbBuffer {
    card: Arc<Card>,
    handle: u32,
    map: NonNull<c_void>,
    size: usize,

    pub width: u32,
    pub height: u32,
    pub pitch: u32,
    pub fb_id: u32,
}

// The mapping is plain memory owned by this object.
unsafe impl Send for DumbBuffer {}
unsafe impl Sync for DumbBuffer {}

impl DumbBuffer {
    /// Allocates a `width`×`height` dumb buffer at `bpp` bits per pixel, maps
    /// it read-write and binds a framebuffer of `pixel_format` to it.
    pub fn new(
        card: Arc<Card>,
        width: u32,
        height: u32,
        bpp: u32,
        pixel_format: u32,
    ) -> Result<Self, KmsError> {
        let created = ioctl::create_dumb(card.as_ref(), width, height, bpp)
            .map_err(KmsError::ioctl("MODE_CREATE_DUMB"))?;

        let result = (|| {
            let offset = ioctl::map_dumb(card.as_ref(), created.handle)
                .map_err(KmsError::ioctl("MODE_MAP_DUMB"))?;

            let size = NonZeroUsize::new(created.size as usize).ok_or(KmsError::Ioctl {
                call: "MODE_CREATE_DUMB",
                source: nix::errno::Errno::EINVAL,
            })?;
            let map = unsafe {
                mman::mmap(
                    None,
                    size,
                    mman::ProtFlags::PROT_READ | mman::ProtFlags::PROT_WRITE,
                    mman::MapFlags::MAP_SHARED,
                    card.as_ref(),
                    offset as off_t,
                )
            }
            .map_err(KmsError::ioctl("mmap"))?;

            let fb_id = ioctl::add_fb2(
                card.as_ref(),
                width,
                height,
                pixel_format,
                &[created.handle],
                &[created.pitch],
                &[0],
            )
            .map_err(|e| {
                let _ = unsafe { mman::munmap(map, created.size as usize) };
                KmsError::Ioctl {
                    call: "ADDFB2",
                    source: e,
                }
            })?;

            debug!(
                "created dumb FB {:#04x} ({}x{}, {} bytes)",
                fb_id, width, height, created.size
            );

            Ok(DumbBuffer {
                card: Arc::clone(&card),
                handle: created.handle,
                map,
                size: created.size as usize,
                width,
                height,
                pitch: created.pitch,
                fb_id,
            })
        })();

        if result.is_err() {
            let _ = ioctl::destroy_dumb(card.as_ref(), created.handle);
        }

        result
    }

    /// Mutable access to the mapped pixels.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // Safe because the pointer and length come from mmap() and stay valid
        // until munmap() in drop().
        unsafe { slice::from_raw_parts_mut(self.map.as_ptr() as *mut u8, self.size) }
    }
}

impl Drop for DumbBuffer {
    fn drop(&mut self) {
        if let Err(e) = ioctl::rm_fb(self.card.as_ref(), self.fb_id) {
            warn!("RMFB({}) failed: {}", self.fb_id, e);
        }
        if let Err(e) = unsafe { mman::munmap(self.map, self.size) } {
            warn!("munmap of dumb buffer failed: {}", e);
        }
        if let Err(e) = ioctl::destroy_dumb(self.card.as_ref(), self.handle) {
            warn!("MODE_DESTROY_DUMB({}) failed: {}", self.handle, e);
        }
    }
}

//! DRM device access and the zero-copy import bridge.
use std::fs::{File, OpenOptions};
use std::os::unix::io::{AsFd, AsRawFd, BorrowedFd, RawFd};
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use nix::errno::Errno;

use crate::bindings;
use crate::kms::{ioctl, KmsError};

/// How many `/dev/dri/cardN` nodes the scan considers.
const CARD_SCAN_MAX: usize = 8;

/// An opened DRM device, with the atomic and universal-planes client
/// capabilities enabled.
///
/// The card doubles as the zero-copy bridge of the pipeline: captured buffer
/// slots enter the display world through [`Card::import_buffer`], which
/// translates each plane's DMA-BUF export fd into a device-local GEM handle
/// and binds all planes into a single framebuffer. This happens once per
/// slot; the returned framebuffer id is then reused for every frame captured
/// into that slot until [`Card::release_buffer`] tears it down.
pub struct Card {
    file: File,
    path: PathBuf,
    driver: String,
}

/// A slot's imported display-side resources, as returned by
/// [`Card::import_buffer`].
#[derive(Debug, Clone, Copy)]
pub struct ImportedBuffer {
    /// KMS framebuffer id covering all planes.
    pub fb_id: u32,
    /// One GEM handle per plane, to be closed on release.
    pub prime_handles: [u32; 3],
}

impl Card {
    /// Opens `path` and enables the client capabilities the pipeline needs.
    pub fn open(path: &Path) -> Result<Self, KmsError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| KmsError::Ioctl {
                call: "open",
                source: Errno::from_raw(e.raw_os_error().unwrap_or(0)),
            })?;

        let version = ioctl::version(&file).map_err(KmsError::ioctl("VERSION"))?;
        debug!(
            "{}: driver {} v{}.{}.{}",
            path.display(),
            version.name,
            version.major,
            version.minor,
            version.patchlevel
        );

        ioctl::set_client_cap(&file, bindings::DRM_CLIENT_CAP_ATOMIC, 1)
            .map_err(KmsError::ioctl("SET_CLIENT_CAP(ATOMIC)"))?;
        ioctl::set_client_cap(&file, bindings::DRM_CLIENT_CAP_UNIVERSAL_PLANES, 1)
            .map_err(KmsError::ioctl("SET_CLIENT_CAP(UNIVERSAL_PLANES)"))?;

        Ok(Card {
            file,
            path: path.to_path_buf(),
            driver: version.name,
        })
    }

    /// Scans `/dev/dri/card0..N` for a device driven by `driver_name` and
    /// opens it.
    pub fn open_by_driver(driver_name: &str) -> Result<Self, KmsError> {
        for i in 0..CARD_SCAN_MAX {
            let path = PathBuf::from(format!("/dev/dri/card{}", i));
            if !path.exists() {
                continue;
            }

            let card = match Card::open(&path) {
                Ok(card) => card,
                Err(e) => {
                    debug!("skipping {}: {}", path.display(), e);
                    continue;
                }
            };

            if card.driver == driver_name {
                info!("using {} for driver \"{}\"", path.display(), driver_name);
                return Ok(card);
            }
        }

        Err(KmsError::NoDevice(driver_name.into()))
    }

    pub fn driver(&self) -> &str {
        &self.driver
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Imports the exported planes of one captured buffer slot and binds them
    /// into a single multi-planar framebuffer.
    ///
    /// All planes share the same pitch on this hardware, which also matches
    /// the capture driver's line stride.
    pub fn import_buffer(
        &self,
        export_fds: [RawFd; 3],
        width: u32,
        height: u32,
        pitch: u32,
        pixel_format: u32,
    ) -> Result<ImportedBuffer, KmsError> {
        let mut prime_handles = [0u32; 3];

        for (i, export_fd) in export_fds.into_iter().enumerate() {
            prime_handles[i] = ioctl::prime_fd_to_handle(&self.file, export_fd)
                .map_err(KmsError::ioctl("PRIME_FD_TO_HANDLE"))?;
        }

        debug!(
            "prime handles: {:02x}, {:02x}, {:02x}",
            prime_handles[0], prime_handles[1], prime_handles[2]
        );

        let pitches = [pitch; 3];
        let offsets = [0u32; 3];
        let fb_id = ioctl::add_fb2(
            &self.file,
            width,
            height,
            pixel_format,
            &prime_handles,
            &pitches,
            &offsets,
        )
        .map_err(KmsError::ioctl("ADDFB2"))?;

        Ok(ImportedBuffer {
            fb_id,
            prime_handles,
        })
    }

    /// Removes a slot's framebuffer and closes its GEM handles. Called
    /// exactly once per imported slot, while draining.
    pub fn release_buffer(&self, imported: &ImportedBuffer) -> Result<(), KmsError> {
        ioctl::rm_fb(&self.file, imported.fb_id).map_err(KmsError::ioctl("RMFB"))?;

        for &handle in &imported.prime_handles {
            if let Err(e) = ioctl::gem_close(&self.file, handle) {
                // The handle is gone either way; finish closing the others.
                warn!("GEM_CLOSE({}) failed: {}", handle, e);
            }
        }

        Ok(())
    }
}

impl AsRawFd for Card {
    fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}

impl AsFd for Card {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.file.as_fd()
    }
}

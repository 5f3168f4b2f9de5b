//! The V4L2 capture side of the pipeline: device discovery, the buffer slot
//! pool, and the capture engine driving the dequeue loop.

pub mod engine;
pub mod pool;

pub use engine::*;
pub use pool::*;

use std::fs::{File, OpenOptions};
use std::os::unix::io::{AsFd, AsRawFd, BorrowedFd, RawFd};
use std::path::{Path, PathBuf};

use log::{debug, info};
use nix::errno::Errno;
use thiserror::Error;

use crate::ioctl;
use crate::ioctl::{Capabilities, Capability, QueryCapError};
use crate::QueueType;

/// Number of `/dev/videoN` nodes the scan considers.
const VIDEO_SCAN_MAX: usize = 16;

/// Number of planes per captured buffer. The capture engine delivers one
/// plane per color channel.
pub const PLANE_COUNT: usize = 3;

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("no multi-planar capture device found for driver \"{0}\"")]
    NoDevice(String),
    #[error("failed to open {0}: {1}")]
    OpenFailed(PathBuf, Errno),
    #[error("error while querying capabilities: {0}")]
    QueryCap(#[from] QueryCapError),
}

/// An opened V4L2 capture device.
pub struct CaptureDevice {
    file: File,
    path: PathBuf,
    pub capability: Capability,
}

impl CaptureDevice {
    /// The queue this pipeline captures from.
    pub const QUEUE: QueueType = QueueType::VideoCaptureMplane;

    /// Opens the device node at `path`.
    pub fn open(path: &Path) -> Result<Self, DeviceError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| {
                DeviceError::OpenFailed(
                    path.to_path_buf(),
                    Errno::from_raw(e.raw_os_error().unwrap_or(0)),
                )
            })?;

        let capability: Capability = ioctl::querycap(&file)?;

        Ok(CaptureDevice {
            file,
            path: path.to_path_buf(),
            capability,
        })
    }

    /// Scans `/dev/video0..15` for a device whose driver matches
    /// `driver_name` and which supports multi-planar video capture.
    pub fn find(driver_name: &str) -> Result<Self, DeviceError> {
        for i in 0..VIDEO_SCAN_MAX {
            let path = PathBuf::from(format!("/dev/video{}", i));
            if !path.exists() {
                continue;
            }

            let device = match CaptureDevice::open(&path) {
                Ok(device) => device,
                Err(e) => {
                    debug!("skipping {}: {}", path.display(), e);
                    continue;
                }
            };

            if device.capability.driver == driver_name
                && device
                    .capability
                    .device_caps()
                    .contains(Capabilities::VIDEO_CAPTURE_MPLANE)
            {
                info!(
                    "found {} driver as {}",
                    driver_name,
                    device.path.display()
                );
                return Ok(device);
            }
        }

        Err(DeviceError::NoDevice(driver_name.into()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AsRawFd for CaptureDevice {
    fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}

impl AsFd for CaptureDevice {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.file.as_fd()
    }
}

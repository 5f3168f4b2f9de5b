//! DRM/KMS layer: card access, mode-setting topology discovery, plane
//! handling, and the atomic-commit builder.
//!
//! The structure mirrors the V4L2 side of the crate: `kms::ioctl` contains
//! thin, safe wrappers over the raw DRM ioctls (including the two-pass
//! protocol for variable-length arrays), while the other modules build the
//! pipeline-level objects on top of them:
//!
//! * [`Card`] — an opened DRM device with atomic and universal-planes client
//!   caps, also acting as the zero-copy bridge: it turns a captured buffer's
//!   exported DMA-BUF fds into a single multi-planar framebuffer
//!   (PRIME fd → GEM handle → `ADDFB2`), once per slot.
//! * [`registry`] — connector → encoder → CRTC resolution and plane
//!   classification for each display sink.
//! * [`plane::KmsPlane`] — a plane with its property ids resolved by name and
//!   the `active` flag driving first-commit geometry.
//! * [`atomic::AtomicRequest`] — property batch submitted as one atomic
//!   commit.

pub mod atomic;
pub mod card;
pub mod dumb;
pub mod ioctl;
pub mod plane;
pub mod registry;

pub use atomic::*;
pub use card::*;
pub use dumb::*;
pub use plane::*;
pub use registry::*;

use enumn::N;
use nix::errno::Errno;
use std::fmt;
use thiserror::Error;

use crate::bindings;

/// DRM connector types, as exposed in `drm_mode_get_connector`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, N)]
#[repr(u32)]
pub enum ConnectorType {
    Unknown = bindings::DRM_MODE_CONNECTOR_Unknown,
    Vga = bindings::DRM_MODE_CONNECTOR_VGA,
    DviI = bindings::DRM_MODE_CONNECTOR_DVII,
    DviD = bindings::DRM_MODE_CONNECTOR_DVID,
    DviA = bindings::DRM_MODE_CONNECTOR_DVIA,
    Composite = bindings::DRM_MODE_CONNECTOR_Composite,
    SVideo = bindings::DRM_MODE_CONNECTOR_SVIDEO,
    Lvds = bindings::DRM_MODE_CONNECTOR_LVDS,
    Component = bindings::DRM_MODE_CONNECTOR_Component,
    NinePinDin = bindings::DRM_MODE_CONNECTOR_9PinDIN,
    DisplayPort = bindings::DRM_MODE_CONNECTOR_DisplayPort,
    HdmiA = bindings::DRM_MODE_CONNECTOR_HDMIA,
    HdmiB = bindings::DRM_MODE_CONNECTOR_HDMIB,
    Tv = bindings::DRM_MODE_CONNECTOR_TV,
    EDp = bindings::DRM_MODE_CONNECTOR_eDP,
    Virtual = bindings::DRM_MODE_CONNECTOR_VIRTUAL,
    Dsi = bindings::DRM_MODE_CONNECTOR_DSI,
    Dpi = bindings::DRM_MODE_CONNECTOR_DPI,
}

impl fmt::Display for ConnectorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectorType::Unknown => "Unknown",
            ConnectorType::Vga => "VGA",
            ConnectorType::DviI => "DVI-I",
            ConnectorType::DviD => "DVI-D",
            ConnectorType::DviA => "DVI-A",
            ConnectorType::Composite => "Composite",
            ConnectorType::SVideo => "S-Video",
            ConnectorType::Lvds => "LVDS",
            ConnectorType::Component => "Component",
            ConnectorType::NinePinDin => "DIN 9pin",
            ConnectorType::DisplayPort => "DisplayPort",
            ConnectorType::HdmiA => "HDMI A",
            ConnectorType::HdmiB => "HDMI B",
            ConnectorType::Tv => "TV",
            ConnectorType::EDp => "eDP",
            ConnectorType::Virtual => "Virtual",
            ConnectorType::Dsi => "DSI",
            ConnectorType::Dpi => "DPI",
        };
        f.write_str(name)
    }
}

/// Errors of the KMS layer. Failing ioctls keep the name of the call and the
/// original error code.
#[derive(Debug, Error)]
pub enum KmsError {
    #[error("no DRM device found for driver \"{0}\"")]
    NoDevice(String),
    #[error("no connector of type {0} found")]
    NoConnector(ConnectorType),
    #[error("connector {0} has no encoder attached")]
    NoEncoder(u32),
    #[error("CRTC {0} does not have a valid mode")]
    NoValidMode(u32),
    #[error("CRTC {0} is not part of the card resources")]
    UnknownCrtc(u32),
    #[error("no suitable plane found on CRTC index {0}")]
    NoPlane(usize),
    #[error("plane {0} is missing mandatory property \"{1}\"")]
    MissingProperty(u32, &'static str),
    #[error("{call}: ioctl error: {source}")]
    Ioctl {
        call: &'static str,
        source: Errno,
    },
}

impl KmsError {
    pub(crate) fn ioctl(call: &'static str) -> impl FnOnce(Errno) -> KmsError {
        move |source| KmsError::Ioctl { call, source }
    }
}

//! Discovery of the card's mode-setting topology and per-sink plane
//! selection. Stateless after initialization.
use log::{debug, info, warn};

use crate::kms::ioctl;
use crate::kms::ioctl::Connection;
use crate::kms::{Card, ConnectorType, KmsError, KmsPlane};

/// Mode-setting topology of a card.
///
/// Plane objects flag which CRTCs they can be placed on with a bitmask over
/// the CRTC *positions* in the card resources, while everything else deals in
/// object ids; the registry keeps the id order so the two can be matched.
pub struct PlaneRegistry {
    crtc_ids: Vec<u32>,
}

impl PlaneRegistry {
    pub fn new(card: &Card) -> Result<Self, KmsError> {
        let resources = ioctl::get_resources(card).map_err(KmsError::ioctl("GETRESOURCES"))?;

        debug!("card CRTCs: {:?}", resources.crtcs);

        Ok(PlaneRegistry {
            crtc_ids: resources.crtcs,
        })
    }

    /// Returns the resource index of `crtc_id`.
    pub fn crtc_index(&self, crtc_id: u32) -> Result<usize, KmsError> {
        self.crtc_ids
            .iter()
            .position(|&id| id == crtc_id)
            .ok_or(KmsError::UnknownCrtc(crtc_id))
    }
}

/// The resolved output path for one display sink: connector through encoder
/// to an active CRTC.
#[derive(Debug, Clone)]
pub struct CrtcRoute {
    pub connector_id: u32,
    pub encoder_id: u32,
    pub crtc_id: u32,
    pub crtc_index: usize,
    pub connected: bool,
    pub crtc_width: u32,
    pub crtc_height: u32,
}

impl PlaneRegistry {
    /// Finds the first connector of `connector_type`, checks its connection,
    /// and follows it to its CRTC. The CRTC must have a valid mode
    /// programmed; this pipeline never performs a full modeset of its own.
    pub fn resolve_route(
        &self,
        card: &Card,
        connector_type: ConnectorType,
    ) -> Result<CrtcRoute, KmsError> {
        let resources = ioctl::get_resources(card).map_err(KmsError::ioctl("GETRESOURCES"))?;

        let mut connector = None;
        for connector_id in resources.connectors {
            let info =
                ioctl::get_connector(card, connector_id).map_err(KmsError::ioctl("GETCONNECTOR"))?;

            if info.connector_type == connector_type as u32 {
                connector = Some(info);
                break;
            }
        }

        let connector = connector.ok_or(KmsError::NoConnector(connector_type))?;
        let connected = connector.connection == Connection::Connected;
        if !connected {
            warn!("connector {} ({}) is not connected", connector.connector_id, connector_type);
        }

        if connector.encoder_id == 0 {
            return Err(KmsError::NoEncoder(connector.connector_id));
        }

        let encoder = ioctl::get_encoder(card, connector.encoder_id)
            .map_err(KmsError::ioctl("GETENCODER"))?;

        let crtc = ioctl::get_crtc(card, encoder.crtc_id).map_err(KmsError::ioctl("GETCRTC"))?;
        if !crtc.mode_valid {
            return Err(KmsError::NoValidMode(crtc.crtc_id));
        }

        let route = CrtcRoute {
            connector_id: connector.connector_id,
            encoder_id: encoder.encoder_id,
            crtc_id: crtc.crtc_id,
            crtc_index: self.crtc_index(crtc.crtc_id)?,
            connected,
            crtc_width: crtc.width,
            crtc_height: crtc.height,
        };

        info!(
            "{}: FB -> CRTC({:#04x}, {}x{}, \"{}\") -> Encoder({:#04x}) -> Connector({:#04x})",
            connector_type,
            route.crtc_id,
            route.crtc_width,
            route.crtc_height,
            crtc.mode_name,
            route.encoder_id,
            route.connector_id,
        );

        Ok(route)
    }
}

/// Pixel-format probes used to classify the planes of a CRTC.
///
/// The hardware exposes three tiers of planes, distinguishable by the formats
/// they advertise: the scaler ("frontend") pipeline is the only one accepting
/// the multi-planar capture format, the YUV layers accept the linear variant,
/// and the simple sprite layers accept neither but do take ARGB overlays.
#[derive(Debug, Clone, Copy)]
pub struct PlaneFormats {
    /// Only supported by the scaler pipeline (e.g. NV12).
    pub scaled: u32,
    /// Supported by the scaler and the YUV layers (e.g. planar RGB).
    pub linear: u32,
    /// Supported by the simple layers but not the sprites (e.g. RGB565).
    pub layer: u32,
}

/// The planes selected for one display sink.
#[derive(Debug, Default)]
pub struct SinkPlanes {
    /// Plane able to scale the capture format; the one frames are shown on.
    pub capture_scaling: Option<KmsPlane>,
    /// Fallback plane accepting the linear capture format, unscaled.
    pub capture_yuv: Option<KmsPlane>,
    /// Planes suitable for static ARGB overlays (status text, logo).
    pub overlays: Vec<KmsPlane>,
    /// A plane some other client left active; it holds the CRTC's primary
    /// role and must be disabled in every commit until it turns off.
    pub foreign_active: Option<KmsPlane>,
}

impl PlaneRegistry {
    /// Walks all planes of the card and classifies the ones usable on the
    /// CRTC of `route`, picking up to `overlay_count` overlay planes.
    pub fn collect_planes(
        &self,
        card: &Card,
        route: &CrtcRoute,
        formats: PlaneFormats,
        overlay_count: usize,
    ) -> Result<SinkPlanes, KmsError> {
        let plane_ids =
            ioctl::get_plane_resources(card).map_err(KmsError::ioctl("GETPLANERESOURCES"))?;

        let mut planes = SinkPlanes::default();

        for plane_id in plane_ids {
            let info = ioctl::get_plane(card, plane_id).map_err(KmsError::ioctl("GETPLANE"))?;

            if !info.works_on_crtc_index(route.crtc_index) {
                continue;
            }

            let scaled = info.supports_format(formats.scaled);
            let linear = info.supports_format(formats.linear);
            let layer = info.supports_format(formats.layer);

            let mut used = false;
            if scaled && planes.capture_scaling.is_none() {
                planes.capture_scaling = Some(KmsPlane::from_id(card, plane_id)?);
                used = true;
            } else if linear && !scaled && planes.capture_yuv.is_none() {
                planes.capture_yuv = Some(KmsPlane::from_id(card, plane_id)?);
                used = true;
            } else if !scaled && !linear && !layer && planes.overlays.len() < overlay_count {
                planes.overlays.push(KmsPlane::from_id(card, plane_id)?);
                used = true;
            }

            // A leftover active plane (it has a framebuffer attached) that we
            // are not going to drive has to be disabled, or it keeps
            // obscuring ours.
            if info.fb_id != 0 && !used {
                if planes.foreign_active.is_none() {
                    let mut plane = KmsPlane::from_id(card, plane_id)?;
                    plane.active = true;
                    planes.foreign_active = Some(plane);
                } else {
                    warn!(
                        "multiple planes need to be disabled ({:#04x}, {:#04x})!",
                        planes.foreign_active.as_ref().map(|p| p.plane_id).unwrap_or(0),
                        plane_id
                    );
                }
            }
        }

        if planes.capture_scaling.is_none() {
            return Err(KmsError::NoPlane(route.crtc_index));
        }

        Ok(planes)
    }
}

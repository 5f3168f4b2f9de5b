//! The status sink: the captured signal composited on the operations LCD,
//! together with the static status text and logo overlays.
use std::sync::Arc;

use log::info;

use crate::capture::pool::SlotClaim;
use crate::display::{scale_to_fit_and_center, SinkBackend};
use crate::kms::{
    AtomicRequest, Card, ConnectorType, CrtcRoute, DumbBuffer, KmsError, KmsPlane, PlaneFormats,
    PlaneRegistry,
};

/// Alpha applied to the live capture plane on the status display, making the
/// overlays readable on top of it (16.16-style fixed point, full = 0xffff).
const CAPTURE_PLANE_ALPHA: u64 = 0x4000;

/// zpos keeping the logo above every other plane.
const LOGO_ZPOS: u64 = 4;

/// Margin between overlays and the display edges, in pixels.
const OVERLAY_MARGIN: u32 = 8;

/// A static ARGB overlay: one plane scanning out one dumb-buffer
/// framebuffer at a fixed position.
struct OverlayElement {
    plane: KmsPlane,
    buffer: DumbBuffer,
    x: u32,
    y: u32,
    zpos: Option<u64>,
}

impl OverlayElement {
    /// First commit carries the full geometry, later ones only the fb.
    fn build(&mut self, crtc_id: u32, request: &mut AtomicRequest) {
        let plane = &mut self.plane;

        if !plane.active {
            request.add_property(plane.plane_id, plane.property_crtc_id, crtc_id as u64);

            request.add_property(plane.plane_id, plane.property_crtc_x, self.x as u64);
            request.add_property(plane.plane_id, plane.property_crtc_y, self.y as u64);
            request.add_property(plane.plane_id, plane.property_crtc_w, self.buffer.width as u64);
            request.add_property(plane.plane_id, plane.property_crtc_h, self.buffer.height as u64);

            request.add_property(plane.plane_id, plane.property_src_x, 0);
            request.add_property(plane.plane_id, plane.property_src_y, 0);
            request.add_property(
                plane.plane_id,
                plane.property_src_w,
                (self.buffer.width as u64) << 16,
            );
            request.add_property(
                plane.plane_id,
                plane.property_src_h,
                (self.buffer.height as u64) << 16,
            );

            if let (Some(zpos), Some(property_zpos)) = (self.zpos, plane.property_zpos) {
                request.add_property(plane.plane_id, property_zpos, zpos);
            }

            plane.active = true;
        }

        request.add_property(plane.plane_id, plane.property_fb_id, self.buffer.fb_id as u64);
    }
}

/// Commit builder for the status display.
pub struct StatusBackend {
    route: CrtcRoute,
    capture_plane: KmsPlane,
    text: OverlayElement,
    logo: OverlayElement,
    foreign_plane: Option<KmsPlane>,
}

impl StatusBackend {
    /// Resolves the status display's connector, CRTC and planes, and places
    /// the overlay bitmaps: text at the bottom left, logo at the top right.
    pub fn new(
        card: &Arc<Card>,
        registry: &PlaneRegistry,
        connector_type: ConnectorType,
        formats: PlaneFormats,
        text_buffer: DumbBuffer,
        logo_buffer: DumbBuffer,
    ) -> Result<Self, KmsError> {
        let route = registry.resolve_route(card, connector_type)?;
        let mut planes = registry.collect_planes(card, &route, formats, 2)?;

        info!(
            "status is CRTC index {}, {}x{}",
            route.crtc_index, route.crtc_width, route.crtc_height
        );

        if planes.overlays.len() < 2 {
            return Err(KmsError::NoPlane(route.crtc_index));
        }
        let logo_plane = planes.overlays.pop().unwrap();
        let text_plane = planes.overlays.pop().unwrap();

        let text = OverlayElement {
            x: OVERLAY_MARGIN,
            y: route
                .crtc_height
                .saturating_sub(OVERLAY_MARGIN + text_buffer.height),
            plane: text_plane,
            buffer: text_buffer,
            zpos: None,
        };

        let logo = OverlayElement {
            x: route
                .crtc_width
                .saturating_sub(OVERLAY_MARGIN + logo_buffer.width),
            y: OVERLAY_MARGIN,
            plane: logo_plane,
            buffer: logo_buffer,
            zpos: Some(LOGO_ZPOS),
        };

        Ok(StatusBackend {
            route,
            capture_plane: planes
                .capture_scaling
                .expect("collect_planes returned without a scaling plane"),
            text,
            logo,
            foreign_plane: planes.foreign_active,
        })
    }

    pub fn route(&self) -> &CrtcRoute {
        &self.route
    }

    fn build_capture(&mut self, claim: &SlotClaim, request: &mut AtomicRequest) {
        let plane = &mut self.capture_plane;
        let geometry = claim.geometry();

        if !plane.active {
            request.add_property(plane.plane_id, plane.property_crtc_id, self.route.crtc_id as u64);

            let dest = scale_to_fit_and_center(
                geometry.width,
                geometry.height,
                self.route.crtc_width,
                self.route.crtc_height,
            );

            info!(
                "status capture plane: {}x{} -> {}",
                geometry.width, geometry.height, dest
            );

            request.add_property(plane.plane_id, plane.property_crtc_x, dest.x as u64);
            request.add_property(plane.plane_id, plane.property_crtc_y, dest.y as u64);
            request.add_property(plane.plane_id, plane.property_crtc_w, dest.width as u64);
            request.add_property(plane.plane_id, plane.property_crtc_h, dest.height as u64);

            request.add_property(plane.plane_id, plane.property_src_x, 0);
            request.add_property(plane.plane_id, plane.property_src_y, 0);
            request.add_property(
                plane.plane_id,
                plane.property_src_w,
                (geometry.width as u64) << 16,
            );
            request.add_property(
                plane.plane_id,
                plane.property_src_h,
                (geometry.height as u64) << 16,
            );

            if let Some(property_alpha) = plane.property_alpha {
                request.add_property(plane.plane_id, property_alpha, CAPTURE_PLANE_ALPHA);
            }

            plane.active = true;
        }

        request.add_property(plane.plane_id, plane.property_fb_id, claim.fb_id() as u64);
    }

    fn build_common(&mut self, request: &mut AtomicRequest) {
        let crtc_id = self.route.crtc_id;
        self.text.build(crtc_id, request);
        self.logo.build(crtc_id, request);

        if let Some(foreign) = &mut self.foreign_plane {
            if foreign.active {
                foreign.disable(request);
            }
        }
    }
}

impl SinkBackend for StatusBackend {
    fn build_show(&mut self, claim: &SlotClaim, request: &mut AtomicRequest) {
        self.build_capture(claim, request);
        self.build_common(request);
    }

    /// "No signal" blanks the live picture but keeps text and logo up.
    fn build_no_signal(&mut self, request: &mut AtomicRequest) {
        if self.capture_plane.active {
            self.capture_plane.disable(request);
        }
        self.build_common(request);
    }
}

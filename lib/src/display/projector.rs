//! The projector sink: full-screen output of the captured signal, scaled to
//! fit and centered.
use std::sync::Arc;

use log::info;

use crate::capture::pool::SlotClaim;
use crate::display::{scale_to_fit_and_center, SinkBackend};
use crate::kms::{
    AtomicRequest, Card, ConnectorType, CrtcRoute, KmsError, KmsPlane, PlaneFormats,
    PlaneRegistry,
};

/// Commit builder for the projector output.
pub struct ProjectorBackend {
    route: CrtcRoute,
    /// The scaler plane the captured frames are shown on.
    capture_plane: KmsPlane,
    /// A foreign plane left active on our CRTC; disabled alongside our
    /// commits until it is off.
    foreign_plane: Option<KmsPlane>,
}

impl ProjectorBackend {
    /// Resolves the projector's connector, CRTC and planes.
    pub fn new(
        card: &Arc<Card>,
        registry: &PlaneRegistry,
        connector_type: ConnectorType,
        formats: PlaneFormats,
    ) -> Result<Self, KmsError> {
        let route = registry.resolve_route(card, connector_type)?;
        let planes = registry.collect_planes(card, &route, formats, 0)?;

        info!(
            "projector is CRTC index {}, {}x{}",
            route.crtc_index, route.crtc_width, route.crtc_height
        );

        Ok(ProjectorBackend {
            route,
            capture_plane: planes
                .capture_scaling
                .expect("collect_planes returned without a scaling plane"),
            foreign_plane: planes.foreign_active,
        })
    }

    pub fn route(&self) -> &CrtcRoute {
        &self.route
    }
}

impl SinkBackend for ProjectorBackend {
    fn build_show(&mut self, claim: &SlotClaim, request: &mut AtomicRequest) {
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

            request.add_property(plane.plane_id, plane.property_crtc_x, dest.x as u64);
            request.add_property(plane.plane_id, plane.property_crtc_y, dest.y as u64);
            request.add_property(plane.plane_id, plane.property_crtc_w, dest.width as u64);
            request.add_property(plane.plane_id, plane.property_crtc_h, dest.height as u64);

            // Sample the full buffer, in 16.16 fixed point.
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

            plane.active = true;
        }

        // The actual flip.
        request.add_property(plane.plane_id, plane.property_fb_id, claim.fb_id() as u64);

        if let Some(foreign) = &mut self.foreign_plane {
            if foreign.active {
                foreign.disable(request);
            }
        }
    }

    fn build_no_signal(&mut self, request: &mut AtomicRequest) {
        if self.capture_plane.active {
            self.capture_plane.disable(request);
        }

        if let Some(foreign) = &mut self.foreign_plane {
            if foreign.active {
                foreign.disable(request);
            }
        }
    }
}

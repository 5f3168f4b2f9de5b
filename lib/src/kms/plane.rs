//! KMS plane objects with their property ids resolved by name.
use log::debug;

use crate::bindings;
use crate::kms::{ioctl, AtomicRequest, Card, KmsError};

/// A display plane, with the atomic property ids the commit builder needs.
///
/// `active` tracks whether the plane's geometry has already been committed:
/// the first commit of a plane carries `CRTC_ID` and the full CRTC/source
/// rectangles, subsequent commits only flip `FB_ID`.
#[derive(Debug, Clone)]
pub struct KmsPlane {
    pub plane_id: u32,

    pub property_crtc_id: u32,
    pub property_fb_id: u32,
    pub property_crtc_x: u32,
    pub property_crtc_y: u32,
    pub property_crtc_w: u32,
    pub property_crtc_h: u32,
    pub property_src_x: u32,
    pub property_src_y: u32,
    pub property_src_w: u32,
    pub property_src_h: u32,
    pub property_alpha: Option<u32>,
    pub property_zpos: Option<u32>,

    /// Geometry already committed once; only `FB_ID` needs updating on
    /// subsequent frames.
    pub active: bool,
}

impl KmsPlane {
    /// Builds a plane object for `plane_id`, resolving the property ids this
    /// pipeline uses by name.
    pub fn from_id(card: &Card, plane_id: u32) -> Result<KmsPlane, KmsError> {
        let properties =
            ioctl::get_object_properties(card, plane_id, bindings::DRM_MODE_OBJECT_PLANE)
                .map_err(KmsError::ioctl("OBJ_GETPROPERTIES"))?;

        let mut crtc_id = None;
        let mut fb_id = None;
        let mut crtc_x = None;
        let mut crtc_y = None;
        let mut crtc_w = None;
        let mut crtc_h = None;
        let mut src_x = None;
        let mut src_y = None;
        let mut src_w = None;
        let mut src_h = None;
        let mut alpha = None;
        let mut zpos = None;

        for (prop_id, _value) in properties {
            let name = ioctl::get_property_name(card, prop_id)
                .map_err(KmsError::ioctl("GETPROPERTY"))?;

            match name.as_str() {
                "CRTC_ID" => crtc_id = Some(prop_id),
                "FB_ID" => fb_id = Some(prop_id),
                "CRTC_X" => crtc_x = Some(prop_id),
                "CRTC_Y" => crtc_y = Some(prop_id),
                "CRTC_W" => crtc_w = Some(prop_id),
                "CRTC_H" => crtc_h = Some(prop_id),
                "SRC_X" => src_x = Some(prop_id),
                "SRC_Y" => src_y = Some(prop_id),
                "SRC_W" => src_w = Some(prop_id),
                "SRC_H" => src_h = Some(prop_id),
                "alpha" => alpha = Some(prop_id),
                "zpos" => zpos = Some(prop_id),
                other => debug!("plane {:#x}: unhandled property: {}", plane_id, other),
            }
        }

        let required = |opt: Option<u32>, name: &'static str| {
            opt.ok_or(KmsError::MissingProperty(plane_id, name))
        };

        let plane = KmsPlane {
            plane_id,
            property_crtc_id: required(crtc_id, "CRTC_ID")?,
            property_fb_id: required(fb_id, "FB_ID")?,
            property_crtc_x: required(crtc_x, "CRTC_X")?,
            property_crtc_y: required(crtc_y, "CRTC_Y")?,
            property_crtc_w: required(crtc_w, "CRTC_W")?,
            property_crtc_h: required(crtc_h, "CRTC_H")?,
            property_src_x: required(src_x, "SRC_X")?,
            property_src_y: required(src_y, "SRC_Y")?,
            property_src_w: required(src_w, "SRC_W")?,
            property_src_h: required(src_h, "SRC_H")?,
            property_alpha: alpha,
            property_zpos: zpos,
            active: false,
        };

        debug!("created plane {:#04x}", plane.plane_id);

        Ok(plane)
    }

    /// Appends a full disable of this plane to `request`. Every property set
    /// during activation has to be zeroed for the kernel to accept the
    /// disable.
    pub fn disable(&mut self, request: &mut AtomicRequest) {
        request.add_property(self.plane_id, self.property_crtc_id, 0);

        request.add_property(self.plane_id, self.property_crtc_x, 0);
        request.add_property(self.plane_id, self.property_crtc_y, 0);
        request.add_property(self.plane_id, self.property_crtc_w, 0);
        request.add_property(self.plane_id, self.property_crtc_h, 0);

        request.add_property(self.plane_id, self.property_src_x, 0);
        request.add_property(self.plane_id, self.property_src_y, 0);
        request.add_property(self.plane_id, self.property_src_w, 0);
        request.add_property(self.plane_id, self.property_src_h, 0);

        request.add_property(self.plane_id, self.property_fb_id, 0);

        self.active = false;
    }
}

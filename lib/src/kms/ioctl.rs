//! Thin, safe wrappers over the DRM ioctls this pipeline consumes.
//!
//! Like their V4L2 counterparts in [`crate::ioctl`], these functions take the
//! relevant inputs as parameters, drive the raw ioctl, and return validated
//! data. DRM enumeration ioctls fill caller-provided, variable-length arrays
//! and must be issued twice: once to learn the element counts, then again
//! with suitably sized buffers. The wrappers here hide that protocol.
use std::os::unix::io::AsRawFd;

use nix::errno::Errno;

use crate::bindings;
use crate::ioctl::string_from_cstr;

#[doc(hidden)]
mod ioctl {
    use crate::bindings::*;

    nix::ioctl_readwrite!(drm_ioctl_version, b'd', 0x00, drm_version);
    nix::ioctl_write_ptr!(drm_ioctl_gem_close, b'd', 0x09, drm_gem_close);
    nix::ioctl_write_ptr!(drm_ioctl_set_client_cap, b'd', 0x0d, drm_set_client_cap);
    nix::ioctl_readwrite!(drm_ioctl_prime_fd_to_handle, b'd', 0x2e, drm_prime_handle);
    nix::ioctl_readwrite!(drm_ioctl_mode_getresources, b'd', 0xa0, drm_mode_card_res);
    nix::ioctl_readwrite!(drm_ioctl_mode_getcrtc, b'd', 0xa1, drm_mode_crtc);
    nix::ioctl_readwrite!(drm_ioctl_mode_getencoder, b'd', 0xa6, drm_mode_get_encoder);
    nix::ioctl_readwrite!(drm_ioctl_mode_getconnector, b'd', 0xa7, drm_mode_get_connector);
    nix::ioctl_readwrite!(drm_ioctl_mode_getproperty, b'd', 0xaa, drm_mode_get_property);
    nix::ioctl_readwrite!(drm_ioctl_mode_rmfb, b'd', 0xaf, u32);
    nix::ioctl_readwrite!(drm_ioctl_mode_create_dumb, b'd', 0xb2, drm_mode_create_dumb);
    nix::ioctl_readwrite!(drm_ioctl_mode_map_dumb, b'd', 0xb3, drm_mode_map_dumb);
    nix::ioctl_readwrite!(drm_ioctl_mode_destroy_dumb, b'd', 0xb4, drm_mode_destroy_dumb);
    nix::ioctl_readwrite!(
        drm_ioctl_mode_getplaneresources,
        b'd',
        0xb5,
        drm_mode_get_plane_res
    );
    nix::ioctl_readwrite!(drm_ioctl_mode_getplane, b'd', 0xb6, drm_mode_get_plane);
    nix::ioctl_readwrite!(drm_ioctl_mode_addfb2, b'd', 0xb8, drm_mode_fb_cmd2);
    nix::ioctl_readwrite!(
        drm_ioctl_mode_obj_getproperties,
        b'd',
        0xb9,
        drm_mode_obj_get_properties
    );
    nix::ioctl_readwrite!(drm_ioctl_mode_atomic, b'd', 0xbc, drm_mode_atomic);
}

/// Driver identification, as returned by `DRM_IOCTL_VERSION`.
#[derive(Debug, Clone)]
pub struct DriverVersion {
    pub name: String,
    pub major: i32,
    pub minor: i32,
    pub patchlevel: i32,
}

/// Safe wrapper around the `DRM_IOCTL_VERSION` ioctl. Only the driver name is
/// fetched from the variable-length part.
pub fn version(fd: &impl AsRawFd) -> Result<DriverVersion, Errno> {
    let mut version = bindings::drm_version::default();
    unsafe { ioctl::drm_ioctl_version(fd.as_raw_fd(), &mut version) }?;

    let mut name = vec![0u8; version.name_len as usize + 1];
    version.name = name.as_mut_ptr() as usize as u64;
    version.date_len = 0;
    version.desc_len = 0;
    unsafe { ioctl::drm_ioctl_version(fd.as_raw_fd(), &mut version) }?;

    Ok(DriverVersion {
        name: string_from_cstr(&name).unwrap_or_else(|_| "".into()),
        major: version.version_major,
        minor: version.version_minor,
        patchlevel: version.version_patchlevel,
    })
}

/// Safe wrapper around the `DRM_IOCTL_SET_CLIENT_CAP` ioctl.
pub fn set_client_cap(fd: &impl AsRawFd, capability: u64, value: u64) -> Result<(), Errno> {
    let cap = bindings::drm_set_client_cap { capability, value };
    unsafe { ioctl::drm_ioctl_set_client_cap(fd.as_raw_fd(), &cap) }?;
    Ok(())
}

/// Card-level mode-setting resources: object ids only, fetched with the
/// two-pass protocol.
#[derive(Debug, Default, Clone)]
pub struct ModeResources {
    pub fbs: Vec<u32>,
    pub crtcs: Vec<u32>,
    pub connectors: Vec<u32>,
    pub encoders: Vec<u32>,
}

/// Safe wrapper around the `DRM_IOCTL_MODE_GETRESOURCES` ioctl.
pub fn get_resources(fd: &impl AsRawFd) -> Result<ModeResources, Errno> {
    let mut res = bindings::drm_mode_card_res::default();
    unsafe { ioctl::drm_ioctl_mode_getresources(fd.as_raw_fd(), &mut res) }?;

    let mut fbs = vec![0u32; res.count_fbs as usize];
    let mut crtcs = vec![0u32; res.count_crtcs as usize];
    let mut connectors = vec![0u32; res.count_connectors as usize];
    let mut encoders = vec![0u32; res.count_encoders as usize];

    res.fb_id_ptr = fbs.as_mut_ptr() as usize as u64;
    res.crtc_id_ptr = crtcs.as_mut_ptr() as usize as u64;
    res.connector_id_ptr = connectors.as_mut_ptr() as usize as u64;
    res.encoder_id_ptr = encoders.as_mut_ptr() as usize as u64;

    unsafe { ioctl::drm_ioctl_mode_getresources(fd.as_raw_fd(), &mut res) }?;

    // A hotplug between the two calls may shrink the counts; never grow the
    // vectors past what was allocated.
    fbs.truncate(res.count_fbs as usize);
    crtcs.truncate(res.count_crtcs as usize);
    connectors.truncate(res.count_connectors as usize);
    encoders.truncate(res.count_encoders as usize);

    Ok(ModeResources {
        fbs,
        crtcs,
        connectors,
        encoders,
    })
}

/// Connection state of a connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connection {
    Connected,
    Disconnected,
    Unknown,
}

impl From<u32> for Connection {
    fn from(v: u32) -> Self {
        match v {
            bindings::DRM_MODE_CONNECTED => Connection::Connected,
            bindings::DRM_MODE_DISCONNECTED => Connection::Disconnected,
            _ => Connection::Unknown,
        }
    }
}

/// The scalar part of `drm_mode_get_connector`.
#[derive(Debug, Clone)]
pub struct ConnectorInfo {
    pub connector_id: u32,
    pub connector_type: u32,
    pub connector_type_id: u32,
    pub connection: Connection,
    pub encoder_id: u32,
}

/// Safe wrapper around the `DRM_IOCTL_MODE_GETCONNECTOR` ioctl.
///
/// Only the scalar fields are retrieved; the mode/property arrays are left
/// unfetched (a zero-count call still probes the connection state).
pub fn get_connector(fd: &impl AsRawFd, connector_id: u32) -> Result<ConnectorInfo, Errno> {
    let mut conn = bindings::drm_mode_get_connector {
        connector_id,
        ..Default::default()
    };
    unsafe { ioctl::drm_ioctl_mode_getconnector(fd.as_raw_fd(), &mut conn) }?;

    Ok(ConnectorInfo {
        connector_id: conn.connector_id,
        connector_type: conn.connector_type,
        connector_type_id: conn.connector_type_id,
        connection: Connection::from(conn.connection),
        encoder_id: conn.encoder_id,
    })
}

/// The relevant part of `drm_mode_get_encoder`.
#[derive(Debug, Clone, Copy)]
pub struct EncoderInfo {
    pub encoder_id: u32,
    pub crtc_id: u32,
    pub possible_crtcs: u32,
}

/// Safe wrapper around the `DRM_IOCTL_MODE_GETENCODER` ioctl.
pub fn get_encoder(fd: &impl AsRawFd, encoder_id: u32) -> Result<EncoderInfo, Errno> {
    let mut enc = bindings::drm_mode_get_encoder {
        encoder_id,
        ..Default::default()
    };
    unsafe { ioctl::drm_ioctl_mode_getencoder(fd.as_raw_fd(), &mut enc) }?;

    Ok(EncoderInfo {
        encoder_id: enc.encoder_id,
        crtc_id: enc.crtc_id,
        possible_crtcs: enc.possible_crtcs,
    })
}

/// The relevant part of `drm_mode_crtc`: whether a mode is programmed and its
/// active pixel dimensions.
#[derive(Debug, Clone)]
pub struct CrtcInfo {
    pub crtc_id: u32,
    pub mode_valid: bool,
    pub width: u32,
    pub height: u32,
    pub mode_name: String,
}

/// Safe wrapper around the `DRM_IOCTL_MODE_GETCRTC` ioctl.
pub fn get_crtc(fd: &impl AsRawFd, crtc_id: u32) -> Result<CrtcInfo, Errno> {
    let mut crtc = bindings::drm_mode_crtc {
        crtc_id,
        ..Default::default()
    };
    unsafe { ioctl::drm_ioctl_mode_getcrtc(fd.as_raw_fd(), &mut crtc) }?;

    Ok(CrtcInfo {
        crtc_id: crtc.crtc_id,
        mode_valid: crtc.mode_valid != 0,
        width: crtc.mode.hdisplay as u32,
        height: crtc.mode.vdisplay as u32,
        mode_name: string_from_cstr(&crtc.mode.name).unwrap_or_else(|_| "".into()),
    })
}

/// Safe wrapper around the `DRM_IOCTL_MODE_GETPLANERESOURCES` ioctl.
pub fn get_plane_resources(fd: &impl AsRawFd) -> Result<Vec<u32>, Errno> {
    let mut res = bindings::drm_mode_get_plane_res::default();
    unsafe { ioctl::drm_ioctl_mode_getplaneresources(fd.as_raw_fd(), &mut res) }?;

    let mut planes = vec![0u32; res.count_planes as usize];
    res.plane_id_ptr = planes.as_mut_ptr() as usize as u64;
    unsafe { ioctl::drm_ioctl_mode_getplaneresources(fd.as_raw_fd(), &mut res) }?;
    planes.truncate(res.count_planes as usize);

    Ok(planes)
}

/// The relevant part of `drm_mode_get_plane`, formats included.
#[derive(Debug, Clone)]
pub struct PlaneInfo {
    pub plane_id: u32,
    pub crtc_id: u32,
    pub fb_id: u32,
    pub possible_crtcs: u32,
    pub formats: Vec<u32>,
}

impl PlaneInfo {
    /// Whether the plane can be placed on the CRTC with index `crtc_index`
    /// in the card resources.
    pub fn works_on_crtc_index(&self, crtc_index: usize) -> bool {
        self.possible_crtcs & (1 << crtc_index) != 0
    }

    pub fn supports_format(&self, fourcc: u32) -> bool {
        self.formats.contains(&fourcc)
    }
}

/// Safe wrapper around the `DRM_IOCTL_MODE_GETPLANE` ioctl.
pub fn get_plane(fd: &impl AsRawFd, plane_id: u32) -> Result<PlaneInfo, Errno> {
    let mut plane = bindings::drm_mode_get_plane {
        plane_id,
        ..Default::default()
    };
    unsafe { ioctl::drm_ioctl_mode_getplane(fd.as_raw_fd(), &mut plane) }?;

    let mut formats = vec![0u32; plane.count_format_types as usize];
    plane.format_type_ptr = formats.as_mut_ptr() as usize as u64;
    unsafe { ioctl::drm_ioctl_mode_getplane(fd.as_raw_fd(), &mut plane) }?;
    formats.truncate(plane.count_format_types as usize);

    Ok(PlaneInfo {
        plane_id: plane.plane_id,
        crtc_id: plane.crtc_id,
        fb_id: plane.fb_id,
        possible_crtcs: plane.possible_crtcs,
        formats,
    })
}

/// Safe wrapper around the `DRM_IOCTL_MODE_OBJ_GETPROPERTIES` ioctl. Returns
/// `(property id, value)` pairs for `obj_id`.
pub fn get_object_properties(
    fd: &impl AsRawFd,
    obj_id: u32,
    obj_type: u32,
) -> Result<Vec<(u32, u64)>, Errno> {
    let mut props = bindings::drm_mode_obj_get_properties {
        obj_id,
        obj_type,
        ..Default::default()
    };

    match unsafe { ioctl::drm_ioctl_mode_obj_getproperties(fd.as_raw_fd(), &mut props) } {
        Ok(_) => (),
        // An object without properties reports EINVAL.
        Err(Errno::EINVAL) => return Ok(Vec::new()),
        Err(e) => return Err(e),
    }

    let mut ids = vec![0u32; props.count_props as usize];
    let mut values = vec![0u64; props.count_props as usize];
    props.props_ptr = ids.as_mut_ptr() as usize as u64;
    props.prop_values_ptr = values.as_mut_ptr() as usize as u64;
    unsafe { ioctl::drm_ioctl_mode_obj_getproperties(fd.as_raw_fd(), &mut props) }?;

    let count = props.count_props as usize;
    ids.truncate(count);
    values.truncate(count);

    Ok(ids.into_iter().zip(values).collect())
}

/// Safe wrapper around the `DRM_IOCTL_MODE_GETPROPERTY` ioctl. Only the
/// property name is fetched; values and enums are not needed to resolve ids.
pub fn get_property_name(fd: &impl AsRawFd, prop_id: u32) -> Result<String, Errno> {
    let mut prop = bindings::drm_mode_get_property {
        prop_id,
        ..Default::default()
    };
    unsafe { ioctl::drm_ioctl_mode_getproperty(fd.as_raw_fd(), &mut prop) }?;

    Ok(string_from_cstr(&prop.name).unwrap_or_else(|_| "".into()))
}

/// Safe wrapper around the `DRM_IOCTL_PRIME_FD_TO_HANDLE` ioctl: turns a
/// DMA-BUF file descriptor into a GEM handle local to this device.
pub fn prime_fd_to_handle(fd: &impl AsRawFd, dmabuf_fd: i32) -> Result<u32, Errno> {
    let mut prime = bindings::drm_prime_handle {
        fd: dmabuf_fd,
        ..Default::default()
    };
    unsafe { ioctl::drm_ioctl_prime_fd_to_handle(fd.as_raw_fd(), &mut prime) }?;

    Ok(prime.handle)
}

/// Safe wrapper around the `DRM_IOCTL_MODE_ADDFB2` ioctl: creates one
/// framebuffer covering all planes of a buffer.
pub fn add_fb2(
    fd: &impl AsRawFd,
    width: u32,
    height: u32,
    pixel_format: u32,
    handles: &[u32],
    pitches: &[u32],
    offsets: &[u32],
) -> Result<u32, Errno> {
    let mut cmd = bindings::drm_mode_fb_cmd2 {
        width,
        height,
        pixel_format,
        ..Default::default()
    };
    for (i, &handle) in handles.iter().take(4).enumerate() {
        cmd.handles[i] = handle;
        cmd.pitches[i] = pitches.get(i).copied().unwrap_or(0);
        cmd.offsets[i] = offsets.get(i).copied().unwrap_or(0);
    }

    unsafe { ioctl::drm_ioctl_mode_addfb2(fd.as_raw_fd(), &mut cmd) }?;

    Ok(cmd.fb_id)
}

/// Safe wrapper around the `DRM_IOCTL_MODE_RMFB` ioctl.
pub fn rm_fb(fd: &impl AsRawFd, fb_id: u32) -> Result<(), Errno> {
    let mut id = fb_id;
    unsafe { ioctl::drm_ioctl_mode_rmfb(fd.as_raw_fd(), &mut id) }?;
    Ok(())
}

/// Safe wrapper around the `DRM_IOCTL_GEM_CLOSE` ioctl.
pub fn gem_close(fd: &impl AsRawFd, handle: u32) -> Result<(), Errno> {
    let close = bindings::drm_gem_close {
        handle,
        ..Default::default()
    };
    unsafe { ioctl::drm_ioctl_gem_close(fd.as_raw_fd(), &close) }?;
    Ok(())
}

/// Safe wrapper around the `DRM_IOCTL_MODE_ATOMIC` ioctl. The four arrays
/// follow the kernel's layout: one entry in `objs`/`count_props` per object,
/// and the flattened per-object `(prop, value)` pairs in `props`/`values`.
pub fn atomic_commit(
    fd: &impl AsRawFd,
    flags: u32,
    objs: &[u32],
    count_props: &[u32],
    props: &[u32],
    values: &[u64],
) -> Result<(), Errno> {
    let mut atomic = bindings::drm_mode_atomic {
        flags,
        count_objs: objs.len() as u32,
        objs_ptr: objs.as_ptr() as usize as u64,
        count_props_ptr: count_props.as_ptr() as usize as u64,
        props_ptr: props.as_ptr() as usize as u64,
        prop_values_ptr: values.as_ptr() as usize as u64,
        ..Default::default()
    };

    unsafe { ioctl::drm_ioctl_mode_atomic(fd.as_raw_fd(), &mut atomic) }?;
    Ok(())
}

/// Safe wrapper around the `DRM_IOCTL_MODE_CREATE_DUMB` ioctl.
pub fn create_dumb(
    fd: &impl AsRawFd,
    width: u32,
    height: u32,
    bpp: u32,
) -> Result<bindings::drm_mode_create_dumb, Errno> {
    let mut create = bindings::drm_mode_create_dumb {
        width,
        height,
        bpp,
        ..Default::default()
    };
    unsafe { ioctl::drm_ioctl_mode_create_dumb(fd.as_raw_fd(), &mut create) }?;
    Ok(create)
}

/// Safe wrapper around the `DRM_IOCTL_MODE_MAP_DUMB` ioctl. Returns the
/// offset at which the buffer can be mapped from the card fd.
pub fn map_dumb(fd: &impl AsRawFd, handle: u32) -> Result<u64, Errno> {
    let mut map = bindings::drm_mode_map_dumb {
        handle,
        ..Default::default()
    };
    unsafe { ioctl::drm_ioctl_mode_map_dumb(fd.as_raw_fd(), &mut map) }?;
    Ok(map.offset)
}

/// Safe wrapper around the `DRM_IOCTL_MODE_DESTROY_DUMB` ioctl.
pub fn destroy_dumb(fd: &impl AsRawFd, handle: u32) -> Result<(), Errno> {
    let mut destroy = bindings::drm_mode_destroy_dumb { handle };
    unsafe { ioctl::drm_ioctl_mode_destroy_dumb(fd.as_raw_fd(), &mut destroy) }?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plane_crtc_and_format_matching() {
        let plane = PlaneInfo {
            plane_id: 0x20,
            crtc_id: 0,
            fb_id: 0,
            possible_crtcs: 0b10,
            formats: vec![
                bindings::DRM_FORMAT_NV12,
                bindings::DRM_FORMAT_R8_G8_B8,
            ],
        };

        assert!(!plane.works_on_crtc_index(0));
        assert!(plane.works_on_crtc_index(1));

        assert!(plane.supports_format(bindings::DRM_FORMAT_NV12));
        assert!(!plane.supports_format(bindings::DRM_FORMAT_RGB565));
    }

    #[test]
    fn connection_states() {
        assert_eq!(
            Connection::from(bindings::DRM_MODE_CONNECTED),
            Connection::Connected
        );
        assert_eq!(
            Connection::from(bindings::DRM_MODE_DISCONNECTED),
            Connection::Disconnected
        );
        assert_eq!(Connection::from(99), Connection::Unknown);
    }
}

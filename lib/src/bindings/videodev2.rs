// Subset of linux/videodev2.h (64-bit layout).

pub use nix::libc::timeval;

pub const VIDEO_MAX_PLANES: u32 = 8;

pub const v4l2_buf_type_V4L2_BUF_TYPE_VIDEO_CAPTURE: u32 = 1;
pub const v4l2_buf_type_V4L2_BUF_TYPE_VIDEO_OUTPUT: u32 = 2;
pub const v4l2_buf_type_V4L2_BUF_TYPE_VIDEO_CAPTURE_MPLANE: u32 = 9;
pub const v4l2_buf_type_V4L2_BUF_TYPE_VIDEO_OUTPUT_MPLANE: u32 = 10;

pub const v4l2_memory_V4L2_MEMORY_MMAP: u32 = 1;
pub const v4l2_memory_V4L2_MEMORY_USERPTR: u32 = 2;
pub const v4l2_memory_V4L2_MEMORY_DMABUF: u32 = 4;

pub const v4l2_field_V4L2_FIELD_ANY: u32 = 0;
pub const v4l2_field_V4L2_FIELD_NONE: u32 = 1;

pub const V4L2_CAP_VIDEO_CAPTURE: u32 = 0x00000001;
pub const V4L2_CAP_VIDEO_OUTPUT: u32 = 0x00000002;
pub const V4L2_CAP_VIDEO_M2M_MPLANE: u32 = 0x00004000;
pub const V4L2_CAP_VIDEO_CAPTURE_MPLANE: u32 = 0x00001000;
pub const V4L2_CAP_VIDEO_OUTPUT_MPLANE: u32 = 0x00002000;
pub const V4L2_CAP_READWRITE: u32 = 0x01000000;
pub const V4L2_CAP_STREAMING: u32 = 0x04000000;
pub const V4L2_CAP_DEVICE_CAPS: u32 = 0x80000000;

pub const V4L2_BUF_FLAG_MAPPED: u32 = 0x00000001;
pub const V4L2_BUF_FLAG_QUEUED: u32 = 0x00000002;
pub const V4L2_BUF_FLAG_DONE: u32 = 0x00000004;
pub const V4L2_BUF_FLAG_ERROR: u32 = 0x00000040;
pub const V4L2_BUF_FLAG_LAST: u32 = 0x00100000;
pub const V4L2_BUF_FLAG_TIMESTAMP_MONOTONIC: u32 = 0x00002000;

pub const V4L2_CTRL_ID_MASK: u32 = 0x0fffffff;
pub const V4L2_CTRL_FLAG_NEXT_CTRL: u32 = 0x80000000;
pub const V4L2_CTRL_FLAG_DISABLED: u32 = 0x00000001;
pub const V4L2_CTRL_FLAG_READ_ONLY: u32 = 0x00000004;
pub const V4L2_CID_USER_BASE: u32 = 0x00980900;

/// 24-bit planar RGB. Not part of the mainline fourcc list; the target
/// platform's capture driver defines it.
pub const V4L2_PIX_FMT_R8_G8_B8: u32 =
    b'P' as u32 | (b'R' as u32) << 8 | (b'G' as u32) << 16 | (b'B' as u32) << 24;

#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct v4l2_capability {
    pub driver: [u8; 16],
    pub card: [u8; 32],
    pub bus_info: [u8; 32],
    pub version: u32,
    pub capabilities: u32,
    pub device_caps: u32,
    pub reserved: [u32; 3],
}

impl Default for v4l2_capability {
    fn default() -> Self {
        unsafe { std::mem::zeroed() }
    }
}

#[repr(C)]
#[derive(Debug, Default, Copy, Clone)]
pub struct v4l2_plane_pix_format {
    pub sizeimage: u32,
    pub bytesperline: u32,
    pub reserved: [u16; 6],
}

#[repr(C)]
#[derive(Copy, Clone)]
pub struct v4l2_pix_format_mplane {
    pub width: u32,
    pub height: u32,
    pub pixelformat: u32,
    pub field: u32,
    pub colorspace: u32,
    pub plane_fmt: [v4l2_plane_pix_format; VIDEO_MAX_PLANES as usize],
    pub num_planes: u8,
    pub flags: u8,
    pub ycbcr_enc: u8,
    pub quantization: u8,
    pub xfer_func: u8,
    pub reserved: [u8; 7],
}

impl Default for v4l2_pix_format_mplane {
    fn default() -> Self {
        unsafe { std::mem::zeroed() }
    }
}

#[repr(C)]
#[derive(Copy, Clone)]
pub union v4l2_format__bindgen_ty_1 {
    pub pix_mp: v4l2_pix_format_mplane,
    pub raw_data: [u8; 200],
    // The kernel union contains pointer-bearing members; force their
    // alignment so `fmt` lands at offset 8 on 64-bit.
    pub _align: [u64; 25],
}

impl Default for v4l2_format__bindgen_ty_1 {
    fn default() -> Self {
        unsafe { std::mem::zeroed() }
    }
}

#[repr(C)]
#[derive(Copy, Clone)]
pub struct v4l2_format {
    pub type_: u32,
    pub fmt: v4l2_format__bindgen_ty_1,
}

impl Default for v4l2_format {
    fn default() -> Self {
        unsafe { std::mem::zeroed() }
    }
}

#[repr(C)]
#[derive(Debug, Default, Copy, Clone)]
pub struct v4l2_requestbuffers {
    pub count: u32,
    pub type_: u32,
    pub memory: u32,
    pub capabilities: u32,
    pub flags: u8,
    pub reserved: [u8; 3],
}

#[repr(C)]
#[derive(Copy, Clone)]
pub union v4l2_plane__bindgen_ty_1 {
    pub mem_offset: u32,
    pub userptr: nix::libc::c_ulong,
    pub fd: i32,
}

impl Default for v4l2_plane__bindgen_ty_1 {
    fn default() -> Self {
        unsafe { std::mem::zeroed() }
    }
}

#[repr(C)]
#[derive(Copy, Clone)]
pub struct v4l2_plane {
    pub bytesused: u32,
    pub length: u32,
    pub m: v4l2_plane__bindgen_ty_1,
    pub data_offset: u32,
    pub reserved: [u32; 11],
}

impl Default for v4l2_plane {
    fn default() -> Self {
        unsafe { std::mem::zeroed() }
    }
}

#[repr(C)]
#[derive(Debug, Default, Copy, Clone)]
pub struct v4l2_timecode {
    pub type_: u32,
    pub flags: u32,
    pub frames: u8,
    pub seconds: u8,
    pub minutes: u8,
    pub hours: u8,
    pub userbits: [u8; 4],
}

#[repr(C)]
#[derive(Copy, Clone)]
pub union v4l2_buffer__bindgen_ty_1 {
    pub offset: u32,
    pub userptr: nix::libc::c_ulong,
    pub planes: *mut v4l2_plane,
    pub fd: i32,
}

impl Default for v4l2_buffer__bindgen_ty_1 {
    fn default() -> Self {
        unsafe { std::mem::zeroed() }
    }
}

#[repr(C)]
#[derive(Copy, Clone)]
pub union v4l2_buffer__bindgen_ty_2 {
    pub request_fd: i32,
    pub reserved: u32,
}

impl Default for v4l2_buffer__bindgen_ty_2 {
    fn default() -> Self {
        unsafe { std::mem::zeroed() }
    }
}

#[repr(C)]
#[derive(Copy, Clone)]
pub struct v4l2_buffer {
    pub index: u32,
    pub type_: u32,
    pub bytesused: u32,
    pub flags: u32,
    pub field: u32,
    pub timestamp: timeval,
    pub timecode: v4l2_timecode,
    pub sequence: u32,
    pub memory: u32,
    pub m: v4l2_buffer__bindgen_ty_1,
    pub length: u32,
    pub reserved2: u32,
    pub __bindgen_anon_1: v4l2_buffer__bindgen_ty_2,
}

impl Default for v4l2_buffer {
    fn default() -> Self {
        unsafe { std::mem::zeroed() }
    }
}

#[repr(C)]
#[derive(Debug, Default, Copy, Clone)]
pub struct v4l2_exportbuffer {
    pub type_: u32,
    pub index: u32,
    pub plane: u32,
    pub flags: u32,
    pub fd: i32,
    pub reserved: [u32; 11],
}

#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct v4l2_queryctrl {
    pub id: u32,
    pub type_: u32,
    pub name: [u8; 32],
    pub minimum: i32,
    pub maximum: i32,
    pub step: i32,
    pub default_value: i32,
    pub flags: u32,
    pub reserved: [u32; 2],
}

impl Default for v4l2_queryctrl {
    fn default() -> Self {
        unsafe { std::mem::zeroed() }
    }
}

#[repr(C)]
#[derive(Debug, Default, Copy, Clone)]
pub struct v4l2_control {
    pub id: u32,
    pub value: i32,
}

#[cfg(test)]
mod videodev2_layout_tests {
    use super::*;
    use std::mem::{align_of, size_of};

    #[test]
    fn v4l2_struct_sizes() {
        assert_eq!(size_of::<v4l2_capability>(), 104);
        assert_eq!(size_of::<v4l2_plane_pix_format>(), 20);
        assert_eq!(size_of::<v4l2_pix_format_mplane>(), 192);
        assert_eq!(size_of::<v4l2_format>(), 208);
        assert_eq!(align_of::<v4l2_format>(), 8);
        assert_eq!(size_of::<v4l2_requestbuffers>(), 20);
        assert_eq!(size_of::<v4l2_plane>(), 64);
        assert_eq!(size_of::<v4l2_buffer>(), 88);
        assert_eq!(size_of::<v4l2_exportbuffer>(), 64);
        assert_eq!(size_of::<v4l2_queryctrl>(), 68);
        assert_eq!(size_of::<v4l2_control>(), 8);
    }

    #[test]
    fn v4l2_format_fmt_offset() {
        // The pointer-bearing kernel union members must keep `fmt` 8-aligned.
        let fmt = v4l2_format::default();
        let base = &fmt as *const _ as usize;
        let fmt_field = unsafe { &fmt.fmt.raw_data } as *const _ as usize;
        assert_eq!(fmt_field - base, 8);
    }
}

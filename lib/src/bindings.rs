#![allow(dead_code)]
#![allow(non_upper_case_globals)]
#![allow(non_camel_case_types)]
#![allow(non_snake_case)]
#![allow(clippy::all)]

//! Hand-maintained subset of the kernel UAPI this crate consumes.
//!
//! Only the structures and constants actually used by the ioctl wrappers are
//! declared here, with the layout of the 64-bit UAPI and the naming bindgen
//! would produce, so the wrapper modules read the same as they would against
//! generated bindings. Layout is pinned down by the unit tests at the bottom
//! of each file.

include!("bindings/videodev2.rs");
include!("bindings/drm_mode.rs");

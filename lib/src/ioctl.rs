//! Thin, safe wrappers over the V4L2 ioctls this pipeline consumes, working
//! on anything `AsRawFd`.
//!
//! Each wrapper takes the relevant input as parameters rather than the whole
//! input/output structure, so there is no ambiguity about which fields
//! user-space is supposed to fill, and returns a validated safe type built
//! from the structure the driver filled in. Each ioctl has its own error
//! type: situations that are not necessarily errors (e.g. `VIDIOC_DQBUF`
//! returning `EAGAIN`, or `EPIPE` at end-of-stream) get their own variants,
//! while real errors keep their original error code and can be recovered via
//! the `Into<Errno>` implementations.

mod dqbuf;
mod expbuf;
mod g_fmt;
mod mmap;
mod qbuf;
mod querybuf;
mod querycap;
mod queryctrl;
mod reqbufs;
mod s_ctrl;
mod streamon;

pub use dqbuf::*;
pub use expbuf::*;
pub use g_fmt::*;
pub use mmap::*;
pub use qbuf::*;
pub use querybuf::*;
pub use querycap::*;
pub use queryctrl::*;
pub use reqbufs::*;
pub use s_ctrl::*;
pub use streamon::*;

use std::ffi::CStr;
use std::ffi::FromBytesWithNulError;

use nix::errno::Errno;

/// Utility function for sub-modules.
/// Constructs an owned String instance from a slice containing a nul-terminated
/// C string, after checking that the passed slice indeed contains a nul
/// character.
pub(crate) fn string_from_cstr(c_str: &[u8]) -> Result<String, FromBytesWithNulError> {
    // Make sure that our string contains a nul character.
    let slice = match c_str.iter().position(|x| *x == b'\0') {
        // Pass the full slice, `from_bytes_with_nul` will return an error.
        None => c_str,
        Some(pos) => &c_str[..pos + 1],
    };

    Ok(CStr::from_bytes_with_nul(slice)?
        .to_string_lossy()
        .into_owned())
}

/// Extension trait for allowing easy conversion of ioctl errors into their
/// originating error code.
pub trait IntoErrno {
    fn into_errno(self) -> i32;
}

impl<T> IntoErrno for T
where
    T: Into<Errno>,
{
    fn into_errno(self) -> i32 {
        self.into() as i32
    }
}

#[cfg(test)]
mod tests {
    use super::string_from_cstr;

    #[test]
    fn test_string_from_cstr() {
        // Nul-terminated slice.
        assert_eq!(string_from_cstr(b"Hello\0"), Ok(String::from("Hello")));

        // Slice with nul in the middle and not nul-terminated.
        assert_eq!(string_from_cstr(b"Hi\0lo"), Ok(String::from("Hi")));

        // Slice without nul.
        assert!(string_from_cstr(b"Hello").is_err());

        // Empty slice.
        assert!(string_from_cstr(b"").is_err());
    }
}

//! Static overlay bitmaps: PNG files rendered into ARGB dumb-buffer
//! framebuffers for the status display.
use std::path::Path;
use std::sync::Arc;

use log::info;
use thiserror::Error;

use crate::bindings;
use crate::kms::{Card, DumbBuffer, KmsError};

#[derive(Debug, Error)]
pub enum OverlayError {
    #[error("failed to read image: {0}")]
    Image(#[from] image::ImageError),
    #[error("kms error: {0}")]
    Kms(#[from] KmsError),
}

/// Loads `path` and renders it into a freshly allocated ARGB8888
/// dumb-buffer framebuffer.
pub fn load_png(card: &Arc<Card>, path: &Path) -> Result<DumbBuffer, OverlayError> {
    let image = image::open(path)?.to_rgba8();
    let (width, height) = image.dimensions();

    info!(
        "reading from {}: {}x{} ({} bytes)",
        path.display(),
        width,
        height,
        image.as_raw().len()
    );

    let mut buffer = DumbBuffer::new(
        Arc::clone(card),
        width,
        height,
        32,
        bindings::DRM_FORMAT_ARGB8888,
    )?;

    blit_rgba(image.as_raw(), width, height, buffer.pitch, buffer.as_mut_slice());

    Ok(buffer)
}

/// Copies RGBA rows into an ARGB8888 mapping, honoring the buffer pitch.
/// ARGB8888 scans out as B, G, R, A bytes on little-endian.
fn blit_rgba(rgba: &[u8], width: u32, height: u32, pitch: u32, out: &mut [u8]) {
    for y in 0..height as usize {
        let src_row = &rgba[y * width as usize * 4..(y + 1) * width as usize * 4];
        let dst_row = &mut out[y * pitch as usize..];

        for x in 0..width as usize {
            let src = &src_row[x * 4..x * 4 + 4];
            let dst = &mut dst_row[x * 4..x * 4 + 4];
            dst[0] = src[2];
            dst[1] = src[1];
            dst[2] = src[0];
            dst[3] = src[3];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blit_swizzles_and_honors_pitch() {
        // A 2x2 RGBA image: red, green / blue, white.
        #[rustfmt::skip]
        let rgba = [
            0xff, 0x00, 0x00, 0xff,  0x00, 0xff, 0x00, 0x80,
            0x00, 0x00, 0xff, 0xff,  0xff, 0xff, 0xff, 0xff,
        ];
        // Pitch is wider than the row payload, as dumb buffers often are.
        let pitch = 12;
        let mut out = vec![0u8; pitch * 2];

        blit_rgba(&rgba, 2, 2, pitch as u32, &mut out);

        // Red pixel: B=0, G=0, R=ff, A=ff.
        assert_eq!(&out[0..4], &[0x00, 0x00, 0xff, 0xff]);
        // Green pixel keeps its alpha.
        assert_eq!(&out[4..8], &[0x00, 0xff, 0x00, 0x80]);
        // Second row starts at the pitch boundary.
        assert_eq!(&out[pitch..pitch + 4], &[0xff, 0x00, 0x00, 0xff]);
        // Padding bytes stay untouched.
        assert_eq!(&out[8..pitch], &[0, 0, 0, 0]);
    }
}

//! The display side of the pipeline: frame fan-out and the sink threads.
//!
//! Each sink owns a one-deep [`Mailbox`]: the dispatcher replaces whatever
//! frame is pending there, and the displaced frame is released immediately —
//! a sink that cannot keep up skips frames, it never queues them. The sink
//! thread drains its mailbox at display cadence, shows the frame with one
//! atomic commit, and only then releases the frame it had on screen before.
//!
//! A sink whose mailbox stays empty for several consecutive cycles commits a
//! plane disable ("no signal") exactly once and releases its on-screen frame,
//! so a paused or dead capture path can fully drain; the next offered frame
//! reactivates the plane with full geometry.

pub mod dispatch;
pub mod mailbox;
pub mod projector;
pub mod sink;
pub mod status;

pub use dispatch::*;
pub use mailbox::*;
pub use projector::*;
pub use sink::*;
pub use status::*;

use crate::Rect;

/// Computes where a source buffer lands on a CRTC: scale to fit, keep the
/// aspect ratio, center the remaining axis.
///
/// A source matching the CRTC exactly is used unscaled. Otherwise the image
/// is first scaled to fill the CRTC width; if the resulting height exceeds
/// the CRTC, the logic inverts and fills the height instead. The axis with
/// slack is centered.
pub fn scale_to_fit_and_center(
    src_width: u32,
    src_height: u32,
    crtc_width: u32,
    crtc_height: u32,
) -> Rect {
    if src_width == crtc_width && src_height == crtc_height {
        return Rect::new(0, 0, crtc_width, crtc_height);
    }

    let mut width = crtc_width;
    let mut height = src_height * crtc_width / src_width;

    if height > crtc_height {
        height = crtc_height;
        width = src_width * crtc_height / src_height;
    }

    let x = (crtc_width - width) / 2;
    let y = (crtc_height - height) / 2;

    Rect::new(x as i32, y as i32, width, height)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_source_is_unscaled() {
        assert_eq!(
            scale_to_fit_and_center(1280, 720, 1280, 720),
            Rect::new(0, 0, 1280, 720)
        );
    }

    #[test]
    fn width_fit_falls_back_to_height_fit() {
        // 640x480 on 1280x720: width-fit gives 1280x960 which exceeds 720,
        // so height-fit applies and the horizontal axis is centered.
        assert_eq!(
            scale_to_fit_and_center(640, 480, 1280, 720),
            Rect::new(160, 0, 960, 720)
        );
    }

    #[test]
    fn wide_source_is_centered_vertically() {
        // 1280x512 on 1280x720: width fits exactly, height has slack.
        assert_eq!(
            scale_to_fit_and_center(1280, 512, 1280, 720),
            Rect::new(0, 104, 1280, 512)
        );
    }

    #[test]
    fn upscaling_works_too() {
        assert_eq!(
            scale_to_fit_and_center(640, 360, 1280, 720),
            Rect::new(0, 0, 1280, 720)
        );
    }
}

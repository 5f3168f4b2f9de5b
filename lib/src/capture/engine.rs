//! The capture engine: format negotiation, buffer preparation, and the
//! streaming dequeue loop.
//!
//! The engine walks a fixed state machine:
//!
//! ```text
//! Idle -> FormatNegotiated -> BuffersReady -> Streaming -> Draining -> Idle
//! ```
//!
//! * `FormatNegotiated`: the device is open and the active format has been
//!   read back from the driver — never assumed.
//! * `BuffersReady`: the pool is allocated, mapped, exported and imported
//!   into KMS. Nothing has been queued yet, so the display side never has to
//!   import on the hot path.
//! * `Streaming`: all slots queued, stream running. The loop dequeues one
//!   filled slot at a time in driver order and fans it out. The very first
//!   dequeued frame is dropped without dispatch: the hardware starts capture
//!   mid-line and its content is unreliable.
//! * `Draining`: stream-off, wait for every consumer reference to clear,
//!   release the KMS imports, free the driver buffers.
//!
//! [`CaptureEngine::run`] holds no state across invocations, so it can be
//! called again after a completed drain to re-enter the machine from `Idle`.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, error, info, warn};
use thiserror::Error;

use crate::capture::pool::{FrameMeta, PoolError, SlotGeometry, SlotPool};
use crate::capture::{CaptureDevice, DeviceError, PLANE_COUNT};
use crate::display::Dispatcher;
use crate::ioctl;
use crate::ioctl::{
    CtrlDesc, CtrlError, CtrlId, CtrlIdError, DqBufError, GFmtError, QueryCtrlError,
    StreamOffError, StreamOnError,
};
use crate::{Format, PixelFormat};

/// Default number of buffers requested from the driver.
pub const DEFAULT_BUFFER_COUNT: u32 = 16;

/// Static configuration of the capture path. Everything here is fixed by the
/// target hardware and handed in by the caller, not probed.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Framebuffer format the display planes scan the captured buffers out
    /// as.
    pub display_format: PixelFormat,
    /// Number of buffers to request.
    pub buffer_count: u32,
    /// Driver-specific control id for the horizontal capture start offset.
    pub hoffset_ctrl: u32,
    /// Driver-specific control id for the vertical capture start offset.
    pub voffset_ctrl: u32,
    /// Horizontal capture start offset to apply, if any.
    pub hoffset: Option<i32>,
    /// Vertical capture start offset to apply, if any.
    pub voffset: Option<i32>,
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("device error: {0}")]
    Device(#[from] DeviceError),
    #[error("error while negotiating format: {0}")]
    Format(#[from] GFmtError),
    #[error("format reports {0} planes, expected {1}")]
    UnexpectedPlaneCount(usize, usize),
    #[error("invalid control id: {0}")]
    CtrlId(#[from] CtrlIdError),
    #[error("error while querying control: {0}")]
    QueryCtrl(#[from] QueryCtrlError),
    #[error("error while setting control: {0}")]
    Ctrl(#[from] CtrlError),
    #[error("pool error: {0}")]
    Pool(#[from] PoolError),
    #[error("error while starting stream: {0}")]
    StreamOn(#[from] StreamOnError),
    #[error("error while stopping stream: {0}")]
    StreamOff(#[from] StreamOffError),
}

/// Outcome of one capture run.
#[derive(Debug, Clone, Copy, Default)]
pub struct CaptureStats {
    /// Frames dequeued, including the dropped first frame.
    pub frames_captured: u64,
    /// Frames handed to the dispatcher.
    pub frames_dispatched: u64,
}

/// States of the engine, tracked for logging and state assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EngineState {
    Idle,
    FormatNegotiated,
    BuffersReady,
    Streaming,
    Draining,
}

/// Drives one V4L2 multi-planar capture device through the capture state
/// machine and feeds dequeued slots to the dispatcher.
pub struct CaptureEngine {
    device: Arc<CaptureDevice>,
    card: Arc<crate::kms::Card>,
    config: CaptureConfig,
    state: EngineState,
}

impl CaptureEngine {
    pub fn new(
        device: Arc<CaptureDevice>,
        card: Arc<crate::kms::Card>,
        config: CaptureConfig,
    ) -> Self {
        CaptureEngine {
            device,
            card,
            config,
            state: EngineState::Idle,
        }
    }

    fn set_state(&mut self, state: EngineState) {
        debug!("capture engine: {:?} -> {:?}", self.state, state);
        self.state = state;
    }

    /// Reads the active format back from the driver and derives the slot
    /// geometry from it.
    fn negotiate_format(&mut self) -> Result<SlotGeometry, CaptureError> {
        let format: Format = ioctl::g_fmt(self.device.as_ref(), CaptureDevice::QUEUE)?;

        if format.plane_fmt.len() != PLANE_COUNT {
            return Err(CaptureError::UnexpectedPlaneCount(
                format.plane_fmt.len(),
                PLANE_COUNT,
            ));
        }

        let plane = &format.plane_fmt[0];
        info!(
            "format is {}x{} ({}x{} bytes, {}kB) {}",
            format.width,
            format.height,
            PLANE_COUNT,
            plane.bytesperline,
            plane.sizeimage >> 10,
            format.pixelformat,
        );

        let geometry = SlotGeometry {
            width: format.width,
            height: format.height,
            pitch: plane.bytesperline,
            plane_size: plane.sizeimage,
            source_format: format.pixelformat,
            display_format: self.config.display_format,
        };

        self.set_state(EngineState::FormatNegotiated);

        Ok(geometry)
    }

    /// Applies one capture start offset through its driver-specific control,
    /// after validating that the control exists.
    fn apply_offset(&self, ctrl: u32, value: i32, name: &str) -> Result<(), CaptureError> {
        let id = CtrlId::new(ctrl)?;
        let desc: CtrlDesc = ioctl::queryctrl(self.device.as_ref(), id)?;

        if desc.disabled || desc.read_only {
            warn!("control \"{}\" cannot be set, skipping", desc.name);
            return Ok(());
        }

        let current = ioctl::g_ctrl(self.device.as_ref(), id)?;
        let applied = ioctl::s_ctrl(self.device.as_ref(), id, value)?;
        info!(
            "{} offset: {} -> {} (requested {}, range {}..={})",
            name, current, applied, value, desc.minimum, desc.maximum
        );

        Ok(())
    }

    fn apply_offsets(&self) -> Result<(), CaptureError> {
        if let Some(hoffset) = self.config.hoffset {
            self.apply_offset(self.config.hoffset_ctrl, hoffset, "horizontal")?;
        }
        if let Some(voffset) = self.config.voffset {
            self.apply_offset(self.config.voffset_ctrl, voffset, "vertical")?;
        }
        Ok(())
    }

    /// Runs the whole state machine once: negotiate, prepare, stream until
    /// `frame_limit` frames were dequeued (or end-of-stream, a dequeue error,
    /// or `quit` is raised), then drain.
    pub fn run(
        &mut self,
        dispatcher: &Dispatcher,
        frame_limit: Option<u64>,
        quit: Arc<AtomicBool>,
    ) -> Result<CaptureStats, CaptureError> {
        let geometry = self.negotiate_format()?;
        self.apply_offsets()?;

        let pool = SlotPool::allocate(
            &self.device,
            &self.card,
            geometry,
            self.config.buffer_count,
            Arc::clone(&self.device) as Arc<dyn crate::capture::pool::SlotRecycler>,
        )?;
        self.set_state(EngineState::BuffersReady);

        pool.queue_all()?;
        ioctl::streamon(self.device.as_ref(), CaptureDevice::QUEUE)?;
        self.set_state(EngineState::Streaming);

        let stats = self.stream_loop(&pool, dispatcher, frame_limit, quit);

        self.set_state(EngineState::Draining);
        pool.stop_recycling();
        if let Err(e) = ioctl::streamoff(self.device.as_ref(), CaptureDevice::QUEUE) {
            error!("STREAMOFF failed: {}", e);
        }

        pool.wait_all_released();
        pool.destroy(&self.device, &self.card)?;
        self.set_state(EngineState::Idle);

        Ok(stats)
    }

    /// The hot loop: blockingly dequeue one filled slot at a time, in driver
    /// order, and fan it out.
    fn stream_loop(
        &self,
        pool: &Arc<SlotPool>,
        dispatcher: &Dispatcher,
        frame_limit: Option<u64>,
        quit: Arc<AtomicBool>,
    ) -> CaptureStats {
        let mut stats = CaptureStats::default();

        loop {
            if quit.load(Ordering::SeqCst) {
                info!("quit requested, stopping capture");
                break;
            }
            if let Some(limit) = frame_limit {
                if stats.frames_captured >= limit {
                    info!("captured {} frames, stopping", stats.frames_captured);
                    break;
                }
            }

            let dqbuf = match ioctl::dqbuf(self.device.as_ref(), CaptureDevice::QUEUE) {
                Ok(dqbuf) => dqbuf,
                Err(DqBufError::Eos) => {
                    info!("end of stream reached");
                    break;
                }
                Err(DqBufError::NotReady) => continue,
                Err(e) => {
                    error!("dequeue failed: {}", e);
                    break;
                }
            };

            let meta = FrameMeta {
                sequence: dqbuf.sequence,
                timestamp_us: dqbuf.timestamp.tv_sec * 1_000_000 + dqbuf.timestamp.tv_usec,
                bytes_used: dqbuf.bytes_used,
                last: dqbuf.is_last(),
            };
            pool.store_meta(dqbuf.index, meta);

            let first_frame = stats.frames_captured == 0;
            stats.frames_captured += 1;

            if first_frame {
                // Frame 0 starts at a random line anyway.
                debug!("dropping first frame (slot {})", dqbuf.index);
                pool.requeue_unclaimed(dqbuf.index);
            } else {
                dispatcher.dispatch(pool, dqbuf.index);
                stats.frames_dispatched += 1;
            }

            if meta.last {
                info!("driver flagged last buffer, stopping capture");
                break;
            }
        }

        info!(
            "captured {} buffers ({} dispatched)",
            stats.frames_captured, stats.frames_dispatched
        );

        stats
    }
}

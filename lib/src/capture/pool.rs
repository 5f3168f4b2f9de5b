//! The fixed pool of capture buffer slots and their reference counts.
//!
//! A slot is one physical, driver-allocated buffer. It cycles between two
//! owners for the lifetime of the stream:
//!
//! * the capture driver, which fills it with a frame (`reference_count == 0`,
//!   slot queued and writable by hardware);
//! * display consumers, which hold it between dequeue and the moment the last
//!   of them is done showing it (`reference_count > 0`).
//!
//! The dispatcher claims references for *all* consumers in one locked
//! operation before any consumer sees the slot, so a fast consumer can never
//! drive the count to zero while the others are still being offered the
//! frame. When a release brings the count to zero, the slot is queued back to
//! the capture driver, provided streaming is still active.
use std::os::unix::io::{AsRawFd, OwnedFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use thiserror::Error;

use crate::capture::{CaptureDevice, PLANE_COUNT};
use crate::ioctl;
use crate::ioctl::{
    ExpbufError, ExpbufFlags, MemoryType, MmapError, PlaneMapping, QBufError, QueryBufError,
    ReqbufsError,
};
use crate::kms::{Card, ImportedBuffer, KmsError};
use crate::PixelFormat;

/// Fixed per-slot geometry, identical across the pool and across planes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotGeometry {
    pub width: u32,
    pub height: u32,
    /// Bytes per line, assumed equal for all planes.
    pub pitch: u32,
    /// Bytes per plane, assumed equal for all planes.
    pub plane_size: u32,
    /// Pixel format delivered by the capture driver.
    pub source_format: PixelFormat,
    /// Equivalent framebuffer format the display planes scan out.
    pub display_format: PixelFormat,
}

/// Per-dequeue frame metadata, refreshed every time a slot comes back from
/// the driver.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameMeta {
    pub sequence: u32,
    pub timestamp_us: i64,
    pub bytes_used: u32,
    pub last: bool,
}

/// Gives a zero-referenced slot back to the capture driver. Implemented by
/// the capture device; tests substitute a recording stub.
pub trait SlotRecycler: Send + Sync + 'static {
    fn requeue(&self, index: u32) -> Result<(), QBufError>;
}

impl SlotRecycler for CaptureDevice {
    fn requeue(&self, index: u32) -> Result<(), QBufError> {
        ioctl::qbuf(self, CaptureDevice::QUEUE, index as usize, PLANE_COUNT)
    }
}

/// Mapped and exported state of one plane of a slot.
struct SlotPlane {
    mapping: PlaneMapping,
    export_fd: OwnedFd,
}

/// One physical capture buffer.
pub struct BufferSlot {
    index: u32,
    planes: Vec<SlotPlane>,
    imported: Option<ImportedBuffer>,
    meta: Mutex<FrameMeta>,
    reference_count: Mutex<u32>,
}

impl BufferSlot {
    fn empty(index: u32) -> Self {
        BufferSlot {
            index,
            planes: Vec::new(),
            imported: None,
            meta: Mutex::new(FrameMeta::default()),
            reference_count: Mutex::new(0),
        }
    }
}

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("error while requesting buffers: {0}")]
    Reqbufs(#[from] ReqbufsError),
    #[error("driver allocated no buffers")]
    NoBuffers,
    #[error("error while querying buffer: {0}")]
    QueryBuf(#[from] QueryBufError),
    #[error("buffer reports {0} planes, expected {1}")]
    UnexpectedPlaneCount(usize, usize),
    #[error("error while mapping plane: {0}")]
    Mmap(#[from] MmapError),
    #[error("error while exporting plane: {0}")]
    Expbuf(#[from] ExpbufError),
    #[error("error while importing into KMS: {0}")]
    Import(#[from] KmsError),
    #[error("error while queuing buffer: {0}")]
    QBuf(#[from] QBufError),
}

/// The pool of capture buffer slots.
///
/// All kernel-side setup (allocation, mapping, export, KMS import) happens in
/// [`SlotPool::allocate`], before any buffer is queued, so the display hot
/// path never has to import anything. The pool is then shared behind an
/// `Arc`: the engine queues and dequeues slots, the dispatcher creates
/// [`SlotClaim`]s, and claims release themselves on drop.
pub struct SlotPool {
    slots: Vec<BufferSlot>,
    geometry: SlotGeometry,
    recycler: Arc<dyn SlotRecycler>,
    /// Whether a zero-crossing release should requeue the slot. Cleared
    /// before `STREAMOFF` so draining releases do not feed dead buffers back
    /// to the driver.
    recycling: AtomicBool,
    /// Signaled by every release that reaches zero; `wait_all_released`
    /// sleeps on it, with a timed poll as fallback.
    idle: Condvar,
    idle_lock: Mutex<()>,
}

impl SlotPool {
    /// Requests `count` buffers from the capture driver and prepares every
    /// slot: maps each plane read-only, exports it as a DMA-BUF and imports
    /// the set into KMS as one framebuffer. Any per-slot failure aborts the
    /// whole setup.
    pub fn allocate(
        device: &CaptureDevice,
        card: &Card,
        geometry: SlotGeometry,
        count: u32,
        recycler: Arc<dyn SlotRecycler>,
    ) -> Result<Arc<SlotPool>, PoolError> {
        let num_buffers: usize = ioctl::reqbufs(
            device,
            CaptureDevice::QUEUE,
            MemoryType::Mmap,
            count,
        )?;
        if num_buffers == 0 {
            return Err(PoolError::NoBuffers);
        }

        info!("requested {} buffers, obtained {}", count, num_buffers);

        let mut slots = Vec::with_capacity(num_buffers);
        for index in 0..num_buffers {
            let mut slot = BufferSlot::empty(index as u32);

            let querybuf = ioctl::querybuf(device, CaptureDevice::QUEUE, index)?;
            if querybuf.planes.len() != PLANE_COUNT {
                return Err(PoolError::UnexpectedPlaneCount(
                    querybuf.planes.len(),
                    PLANE_COUNT,
                ));
            }

            for (plane_index, plane) in querybuf.planes.iter().enumerate() {
                let mapping = ioctl::mmap(device, plane.mem_offset, geometry.plane_size)?;
                let export_fd: OwnedFd = ioctl::expbuf(
                    device,
                    CaptureDevice::QUEUE,
                    index,
                    plane_index,
                    ExpbufFlags::RDONLY | ExpbufFlags::CLOEXEC,
                )?;

                debug!(
                    "mapped and exported buffer {:02}[{}] (fd {})",
                    index,
                    plane_index,
                    export_fd.as_raw_fd()
                );

                slot.planes.push(SlotPlane { mapping, export_fd });
            }

            let export_fds = [
                slot.planes[0].export_fd.as_raw_fd(),
                slot.planes[1].export_fd.as_raw_fd(),
                slot.planes[2].export_fd.as_raw_fd(),
            ];
            let imported = card.import_buffer(
                export_fds,
                geometry.width,
                geometry.height,
                geometry.pitch,
                geometry.display_format.to_u32(),
            )?;

            debug!("buffer {:02} imported as FB {:#04x}", index, imported.fb_id);

            slot.imported = Some(imported);
            slots.push(slot);
        }

        Ok(Arc::new(SlotPool {
            slots,
            geometry,
            recycler,
            recycling: AtomicBool::new(false),
            idle: Condvar::new(),
            idle_lock: Mutex::new(()),
        }))
    }

    /// Builds a pool without any kernel resources behind it, for exercising
    /// the reference-count machinery in tests.
    #[cfg(test)]
    pub(crate) fn fake(count: usize, geometry: SlotGeometry, recycler: Arc<dyn SlotRecycler>) -> Arc<SlotPool> {
        Arc::new(SlotPool {
            slots: (0..count).map(|i| BufferSlot::empty(i as u32)).collect(),
            geometry,
            recycler,
            recycling: AtomicBool::new(true),
            idle: Condvar::new(),
            idle_lock: Mutex::new(()),
        })
    }

    pub fn num_slots(&self) -> usize {
        self.slots.len()
    }

    pub fn geometry(&self) -> &SlotGeometry {
        &self.geometry
    }

    /// Queues every slot to the capture driver and starts recycling. Called
    /// once, right before `STREAMON`.
    pub fn queue_all(&self) -> Result<(), PoolError> {
        for slot in &self.slots {
            self.recycler.requeue(slot.index)?;
        }
        self.recycling.store(true, Ordering::SeqCst);

        info!("queued {} buffers", self.slots.len());

        Ok(())
    }

    /// Stops zero-crossing releases from requeuing slots. Called before
    /// `STREAMOFF`.
    pub fn stop_recycling(&self) {
        self.recycling.store(false, Ordering::SeqCst);
    }

    /// Refreshes the per-dequeue metadata of `index`. Only the capture engine
    /// calls this, and only while the slot has no references.
    pub fn store_meta(&self, index: u32, meta: FrameMeta) {
        if let Some(slot) = self.slots.get(index as usize) {
            *slot.meta.lock().unwrap() = meta;
        }
    }

    /// Claims `count` references on `index` in one locked operation and
    /// returns one claim token per reference. The slot must be unreferenced
    /// (just dequeued); a non-zero count indicates a dispatch/release
    /// mismatch and is logged.
    pub fn claim(self: &Arc<Self>, index: u32, count: u32) -> Vec<SlotClaim> {
        let slot = &self.slots[index as usize];

        {
            let mut reference_count = slot.reference_count.lock().unwrap();
            if *reference_count != 0 {
                error!(
                    "slot {}: claiming {} references over {} outstanding",
                    index, count, *reference_count
                );
            }
            *reference_count = count;
        }

        (0..count)
            .map(|_| SlotClaim {
                pool: Arc::clone(self),
                index,
            })
            .collect()
    }

    /// Requeues a slot that was never handed to any consumer (e.g. the
    /// dropped first frame).
    pub fn requeue_unclaimed(&self, index: u32) {
        self.recycle(index);
    }

    /// Drops one reference on `index`. At zero the slot goes back to the
    /// capture driver. A release without a matching claim is a bug signal,
    /// logged and clamped rather than fatal.
    fn release(&self, index: u32) {
        let slot = &self.slots[index as usize];

        let mut reference_count = slot.reference_count.lock().unwrap();
        match *reference_count {
            0 => {
                error!("slot {}: release without a matching claim", index);
                return;
            }
            1 => {
                *reference_count = 0;
                drop(reference_count);
                self.recycle(index);
                // Wake up a pending teardown; it re-checks all slots.
                let _guard = self.idle_lock.lock().unwrap();
                self.idle.notify_all();
            }
            _ => *reference_count -= 1,
        }
    }

    fn recycle(&self, index: u32) {
        if !self.recycling.load(Ordering::SeqCst) {
            return;
        }

        if let Err(e) = self.recycler.requeue(index) {
            warn!("failed to requeue slot {}: {}", index, e);
        }
    }

    fn all_released(&self) -> bool {
        self.slots
            .iter()
            .all(|slot| *slot.reference_count.lock().unwrap() == 0)
    }

    /// Blocks until every slot's reference count has been observed at zero.
    ///
    /// Normally woken by the release that drops the last reference; the timed
    /// wait doubles as a poll so a missed wakeup only costs a millisecond.
    pub fn wait_all_released(&self) {
        let mut last_report = Instant::now();
        let mut guard = self.idle_lock.lock().unwrap();

        while !self.all_released() {
            let (g, _timeout) = self
                .idle
                .wait_timeout(guard, Duration::from_millis(1))
                .unwrap();
            guard = g;

            if last_report.elapsed() > Duration::from_secs(1) {
                let busy: Vec<u32> = self
                    .slots
                    .iter()
                    .filter(|s| *s.reference_count.lock().unwrap() != 0)
                    .map(|s| s.index)
                    .collect();
                warn!("still waiting for slots {:?} to be released", busy);
                last_report = Instant::now();
            }
        }
    }

    /// Releases the display-side resources of every slot (framebuffer and
    /// GEM handles) and frees the driver buffers. Only valid once all
    /// references have cleared; the mappings and export fds are dropped with
    /// the pool itself.
    pub fn destroy(&self, device: &CaptureDevice, card: &Card) -> Result<(), PoolError> {
        for slot in &self.slots {
            if let Some(imported) = &slot.imported {
                debug!("releasing slot {} (FB {:#04x})", slot.index, imported.fb_id);
                card.release_buffer(imported)?;
            }
        }

        ioctl::reqbufs::<()>(device, CaptureDevice::QUEUE, MemoryType::Mmap, 0)?;

        info!("freed all driver buffers");

        Ok(())
    }

    fn fb_id(&self, index: u32) -> u32 {
        self.slots[index as usize]
            .imported
            .map(|i| i.fb_id)
            .unwrap_or(0)
    }

    fn meta(&self, index: u32) -> FrameMeta {
        *self.slots[index as usize].meta.lock().unwrap()
    }

    #[cfg(test)]
    pub(crate) fn reference_count(&self, index: u32) -> u32 {
        *self.slots[index as usize].reference_count.lock().unwrap()
    }
}

/// A single consumer's reference to a buffer slot.
///
/// The claim is the only way a consumer can reach a slot's data, and dropping
/// it is the only way to release the reference, so the count stays auditable:
/// one claim handed out per consumer per dispatch, one decrement per drop.
pub struct SlotClaim {
    pool: Arc<SlotPool>,
    index: u32,
}

impl SlotClaim {
    pub fn index(&self) -> u32 {
        self.index
    }

    /// KMS framebuffer id bound to this slot.
    pub fn fb_id(&self) -> u32 {
        self.pool.fb_id(self.index)
    }

    pub fn meta(&self) -> FrameMeta {
        self.pool.meta(self.index)
    }

    pub fn geometry(&self) -> SlotGeometry {
        *self.pool.geometry()
    }

    /// Runs `f` over the mapped contents of one plane. Returns `None` if the
    /// plane does not exist or is not mapped.
    ///
    /// Holding the claim guarantees the slot is not queued to the capture
    /// driver, so the contents are stable while `f` runs.
    pub fn with_plane<R>(&self, plane: usize, f: impl FnOnce(&[u8]) -> R) -> Option<R> {
        self.pool.slots[self.index as usize]
            .planes
            .get(plane)
            .map(|p| f(p.mapping.as_slice()))
    }
}

impl std::fmt::Debug for SlotClaim {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlotClaim")
            .field("index", &self.index)
            .finish()
    }
}

impl Drop for SlotClaim {
    fn drop(&mut self) {
        self.pool.release(self.index);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    /// Recycler stub recording every requeue.
    pub(crate) struct RecordingRecycler {
        pub requeued: Mutex<Vec<u32>>,
    }

    impl RecordingRecycler {
        pub(crate) fn new() -> Arc<Self> {
            Arc::new(RecordingRecycler {
                requeued: Mutex::new(Vec::new()),
            })
        }
    }

    impl SlotRecycler for RecordingRecycler {
        fn requeue(&self, index: u32) -> Result<(), QBufError> {
            self.requeued.lock().unwrap().push(index);
            Ok(())
        }
    }

    pub(crate) fn test_geometry() -> SlotGeometry {
        SlotGeometry {
            width: 1280,
            height: 720,
            pitch: 1280,
            plane_size: 1280 * 720,
            source_format: PixelFormat::from(b"PRGB"),
            display_format: PixelFormat::from(b"NV12"),
        }
    }

    #[test]
    fn claims_release_to_zero_and_requeue_once() {
        let recycler = RecordingRecycler::new();
        let pool = SlotPool::fake(4, test_geometry(), recycler.clone());

        let claims = pool.claim(2, 3);
        assert_eq!(pool.reference_count(2), 3);

        drop(claims);

        assert_eq!(pool.reference_count(2), 0);
        // Exactly one requeue, when the last reference dropped.
        assert_eq!(recycler.requeued.lock().unwrap().as_slice(), &[2]);
    }

    #[test]
    fn fast_consumer_cannot_starve_slower_ones() {
        let recycler = RecordingRecycler::new();
        let pool = SlotPool::fake(2, test_geometry(), recycler.clone());

        // All references are claimed before any consumer runs: a consumer
        // releasing immediately leaves the others' references intact.
        let mut claims = pool.claim(0, 3);
        drop(claims.pop());
        assert_eq!(pool.reference_count(0), 2);
        assert!(recycler.requeued.lock().unwrap().is_empty());

        claims.clear();
        assert_eq!(pool.reference_count(0), 0);
        assert_eq!(recycler.requeued.lock().unwrap().as_slice(), &[0]);
    }

    #[test]
    fn release_without_claim_is_clamped() {
        let recycler = RecordingRecycler::new();
        let pool = SlotPool::fake(1, test_geometry(), recycler.clone());

        // Underflow is logged and clamped, not fatal, and does not requeue.
        pool.release(0);
        assert_eq!(pool.reference_count(0), 0);
        assert!(recycler.requeued.lock().unwrap().is_empty());

        // The slot still works normally afterwards.
        let claims = pool.claim(0, 1);
        drop(claims);
        assert_eq!(recycler.requeued.lock().unwrap().as_slice(), &[0]);
    }

    #[test]
    fn no_requeue_once_recycling_stopped() {
        let recycler = RecordingRecycler::new();
        let pool = SlotPool::fake(1, test_geometry(), recycler.clone());

        let claims = pool.claim(0, 1);
        pool.stop_recycling();
        drop(claims);

        assert_eq!(pool.reference_count(0), 0);
        assert!(recycler.requeued.lock().unwrap().is_empty());
    }

    #[test]
    fn wait_all_released_blocks_until_zero() {
        let recycler = RecordingRecycler::new();
        let pool = SlotPool::fake(3, test_geometry(), recycler);

        let claims = pool.claim(1, 2);

        let released = Arc::new(AtomicUsize::new(0));
        let waiter = {
            let pool = Arc::clone(&pool);
            let released = Arc::clone(&released);
            std::thread::spawn(move || {
                pool.wait_all_released();
                released.load(Ordering::SeqCst)
            })
        };

        // Give the waiter a chance to block, then release.
        std::thread::sleep(Duration::from_millis(20));
        released.store(claims.len(), Ordering::SeqCst);
        drop(claims);

        // The waiter only returns after it observed both releases.
        assert_eq!(waiter.join().unwrap(), 2);
        assert!(pool.all_released());
    }
}

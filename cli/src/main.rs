//! Relays a live CSI capture signal to a projector output and a status
//! display, zero-copy, until the requested number of frames was captured.
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use anyhow::{anyhow, Context};
use clap::{App, Arg};
use log::info;

use framerelay::bindings;
use framerelay::capture::{CaptureConfig, CaptureDevice, CaptureEngine, DEFAULT_BUFFER_COUNT};
use framerelay::display::{spawn_sink, Dispatcher, FrameConsumer, ProjectorBackend, StatusBackend};
use framerelay::kms::{Card, ConnectorType, PlaneFormats, PlaneRegistry};
use framerelay::overlay;
use framerelay::selftest::FrameVerifier;
use framerelay::PixelFormat;

/// Capture-start trim controls of the target capture driver.
const CID_HORIZONTAL_OFFSET: u32 = bindings::V4L2_CID_USER_BASE + 0x1001;
const CID_VERTICAL_OFFSET: u32 = bindings::V4L2_CID_USER_BASE + 0x1002;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let matches = App::new("framerelay")
        .about("Relay a CSI capture signal to projector and status displays")
        .arg(
            Arg::with_name("count")
                .help("Number of frames to capture")
                .index(1),
        )
        .arg(
            Arg::with_name("test")
                .short('t')
                .long("test")
                .help("Verify the test-card markers of every captured frame"),
        )
        .arg(
            Arg::with_name("hoffset")
                .long("hoffset")
                .takes_value(true)
                .allow_hyphen_values(true)
                .help("Horizontal capture start offset"),
        )
        .arg(
            Arg::with_name("voffset")
                .long("voffset")
                .takes_value(true)
                .allow_hyphen_values(true)
                .help("Vertical capture start offset"),
        )
        .arg(
            Arg::with_name("capture_driver")
                .long("capture-driver")
                .takes_value(true)
                .default_value("sun4i_csi1")
                .help("V4L2 driver name to capture from"),
        )
        .arg(
            Arg::with_name("kms_driver")
                .long("kms-driver")
                .takes_value(true)
                .default_value("sun4i-drm")
                .help("DRM driver name to display on"),
        )
        .arg(
            Arg::with_name("text")
                .long("text")
                .takes_value(true)
                .default_value("status_text.png")
                .help("Status text bitmap shown on the status display"),
        )
        .arg(
            Arg::with_name("logo")
                .long("logo")
                .takes_value(true)
                .default_value("logo.png")
                .help("Logo bitmap shown on the status display"),
        )
        .get_matches();

    let count: u64 = match matches.value_of("count") {
        Some(value) => value
            .parse()
            .map_err(|_| anyhow!("invalid frame count: {}", value))?,
        None => 1000,
    };
    let hoffset = matches
        .value_of("hoffset")
        .map(|v| v.parse().map_err(|_| anyhow!("invalid hoffset: {}", v)))
        .transpose()?;
    let voffset = matches
        .value_of("voffset")
        .map(|v| v.parse().map_err(|_| anyhow!("invalid voffset: {}", v)))
        .transpose()?;

    info!("running for {} frames", count);

    let quit = Arc::new(AtomicBool::new(false));
    {
        let quit = Arc::clone(&quit);
        ctrlc::set_handler(move || {
            quit.store(true, Ordering::SeqCst);
        })
        .expect("failed to set Ctrl-C handler");
    }

    // Display side first: discover the card topology and bring up both
    // sinks, so capture buffers can be imported before streaming starts.
    let card = Arc::new(
        Card::open_by_driver(matches.value_of("kms_driver").unwrap())
            .context("failed to open KMS device")?,
    );
    let registry = PlaneRegistry::new(&card).context("failed to read KMS resources")?;

    let formats = PlaneFormats {
        scaled: bindings::DRM_FORMAT_NV12,
        linear: bindings::DRM_FORMAT_R8_G8_B8,
        layer: bindings::DRM_FORMAT_RGB565,
    };

    let projector = ProjectorBackend::new(&card, &registry, ConnectorType::HdmiA, formats)
        .context("failed to set up projector output")?;
    let projector_handle = spawn_sink("projector", Arc::clone(&card), projector)
        .context("failed to spawn projector thread")?;

    let text_buffer = overlay::load_png(&card, Path::new(matches.value_of("text").unwrap()))
        .context("failed to load status text bitmap")?;
    let logo_buffer = overlay::load_png(&card, Path::new(matches.value_of("logo").unwrap()))
        .context("failed to load logo bitmap")?;
    let status = StatusBackend::new(
        &card,
        &registry,
        ConnectorType::Dpi,
        formats,
        text_buffer,
        logo_buffer,
    )
    .context("failed to set up status display")?;
    let status_handle = spawn_sink("status", Arc::clone(&card), status)
        .context("failed to spawn status thread")?;

    let mut consumers: Vec<Arc<dyn FrameConsumer>> = vec![projector_handle, status_handle];
    if matches.is_present("test") {
        consumers.push(Arc::new(FrameVerifier::new()));
    }
    let dispatcher = Dispatcher::new(consumers);

    let device = Arc::new(
        CaptureDevice::find(matches.value_of("capture_driver").unwrap())
            .context("failed to find capture device")?,
    );

    let config = CaptureConfig {
        display_format: PixelFormat::from_u32(bindings::DRM_FORMAT_R8_G8_B8),
        buffer_count: DEFAULT_BUFFER_COUNT,
        hoffset_ctrl: CID_HORIZONTAL_OFFSET,
        voffset_ctrl: CID_VERTICAL_OFFSET,
        hoffset,
        voffset,
    };

    let mut engine = CaptureEngine::new(device, Arc::clone(&card), config);

    // The capture loop gets its own thread; the main thread just waits for
    // it. The sink threads keep running until the process exits.
    let capture_thread = thread::Builder::new()
        .name("capture".into())
        .spawn(move || engine.run(&dispatcher, Some(count), quit))
        .context("failed to spawn capture thread")?;

    let stats = capture_thread
        .join()
        .map_err(|_| anyhow!("capture thread panicked"))?
        .context("capture failed")?;

    info!(
        "done: {} frames captured, {} dispatched",
        stats.frames_captured, stats.frames_dispatched
    );

    Ok(())
}

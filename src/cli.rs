// SPDX-License-Identifier: GPL-3.0-only

//! Headless commands

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use vidmask::Config;
use vidmask::backends::camera::enumerate_devices;
use vidmask::pipelines::stream::{LiveParams, PipelineController};

const STATUS_INTERVAL: Duration = Duration::from_millis(500);

/// List video devices
pub fn list_devices() -> Result<(), Box<dyn std::error::Error>> {
    let devices = enumerate_devices();

    if devices.is_empty() {
        println!("No video devices found.");
        return Ok(());
    }

    println!("Video devices:");
    println!();
    for device in &devices {
        let name = if device.name.is_empty() {
            "(unknown)"
        } else {
            device.name.as_str()
        };
        let marker = if device.loopback { "  [loopback]" } else { "" };
        println!("  {}  {}{}", device.path, name, marker);
    }
    println!();

    if !devices.iter().any(|d| d.loopback) {
        println!("No v4l2loopback device found. Load the module with:");
        println!("  sudo modprobe v4l2loopback exclusive_caps=1");
    }
    Ok(())
}

/// Stream until Ctrl+C, the optional duration elapses, or the pipeline fails
pub fn stream(config: &Config, duration: Option<u64>) -> Result<(), Box<dyn std::error::Error>> {
    let backend = config.device_backend();
    println!("Input: {}", backend.input);
    println!("Output: {}", backend.output_device);

    // Nobody reads the preview here
    let mut initial = config.composition_params();
    initial.show_preview = false;
    let params = Arc::new(LiveParams::new(initial));
    let snapshot = params.snapshot();
    println!(
        "Format: {}x{} @ {}fps",
        snapshot.width, snapshot.height, snapshot.fps
    );

    let mut controller = PipelineController::new(Box::new(backend), params);
    controller.start()?;
    if let Some(session) = controller.session() {
        println!("Capture: {}", session.capture);
        println!("Segmentation: {}", session.segmenter);
    }

    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop_flag_handler = stop_flag.clone();
    ctrlc::set_handler(move || {
        stop_flag_handler.store(true, Ordering::SeqCst);
    })?;

    println!();
    println!("Streaming... (press Ctrl+C to stop)");

    let start = Instant::now();
    let limit = duration.map(Duration::from_secs);
    while controller.is_running() {
        if stop_flag.load(Ordering::SeqCst) {
            println!();
            println!("Stopping...");
            break;
        }
        if limit.is_some_and(|limit| start.elapsed() >= limit) {
            break;
        }

        let stats = controller.stats();
        let elapsed = start.elapsed().as_secs();
        print!(
            "\r{:02}:{:02}  {} frames  {:.1} ms/frame",
            elapsed / 60,
            elapsed % 60,
            stats.frames_processed,
            stats.last_frame_us as f64 / 1000.0
        );
        std::io::Write::flush(&mut std::io::stdout())?;
        std::thread::sleep(STATUS_INTERVAL);
    }
    println!();

    if controller.is_running() {
        controller.stop()?;
    }
    let failure = controller.take_error();

    println!("Stream ended: {}", controller.stats());
    match failure {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}

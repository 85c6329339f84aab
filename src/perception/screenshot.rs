// Screenshot capture of the primary monitor.
use async_trait::async_trait;

use crate::errors::{ReplayError, ReplayResult};
use crate::perception::traits::ScreenshotProvider;
use crate::perception::types::{Screenshot, ScreenshotMeta};

/// Captures the primary monitor through `xcap`.
#[derive(Debug, Default, Clone)]
pub struct PrimaryMonitorCapture;

impl PrimaryMonitorCapture {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ScreenshotProvider for PrimaryMonitorCapture {
    async fn capture(&self) -> ReplayResult<Screenshot> {
        tokio::task::spawn_blocking(capture_primary_blocking)
            .await
            .map_err(|e| ReplayError::Perception(format!("join: {e}")))?
    }
}

fn capture_primary_blocking() -> ReplayResult<Screenshot> {
    let monitors = xcap::Monitor::all()
        .map_err(|e| ReplayError::Perception(format!("list monitors: {e}")))?;

    let (index, monitor) = monitors
        .iter()
        .enumerate()
        .find(|(_, m)| m.is_primary())
        .or_else(|| monitors.iter().enumerate().next())
        .ok_or_else(|| ReplayError::Perception("no monitor available".into()))?;

    let frame = monitor
        .capture_image()
        .map_err(|e| ReplayError::Perception(format!("capture: {e}")))?;
    let (width, height) = frame.dimensions();

    let mut image_bytes = Vec::new();
    image::DynamicImage::ImageRgba8(frame).write_to(
        &mut std::io::Cursor::new(&mut image_bytes),
        image::ImageFormat::Png,
    )?;

    tracing::debug!(monitor = index, width, height, "screenshot captured");

    Ok(Screenshot::new(
        image_bytes,
        ScreenshotMeta {
            monitor_index: index as u32,
            scale_factor: monitor.scale_factor() as f64,
            physical_width: width,
            physical_height: height,
        },
    ))
}

// Fixtures and hand-written collaborator mocks shared by unit tests.
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use image::{ImageBuffer, Rgba};

use crate::errors::{ReplayError, ReplayResult};
use crate::executor::input::InputInjector;
use crate::matcher::embedder::Embedder;
use crate::perception::traits::{MarkerResolver, ScreenshotProvider, TextDetector};
use crate::perception::types::{Screenshot, ScreenshotMeta, TextDetection};
use crate::workflow::types::ScrollDirection;

fn encode(img: ImageBuffer<Rgba<u8>, Vec<u8>>) -> Vec<u8> {
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    bytes
}

pub fn png_solid(w: u32, h: u32, rgba: [u8; 4]) -> Vec<u8> {
    encode(ImageBuffer::from_pixel(w, h, Rgba(rgba)))
}

/// Black and white checkerboard with 8 cells per side.
pub fn png_checkerboard(w: u32, h: u32) -> Vec<u8> {
    let cw = (w / 8).max(1);
    let ch = (h / 8).max(1);
    encode(ImageBuffer::from_fn(w, h, |x, y| {
        if ((x / cw) + (y / ch)) % 2 == 0 {
            Rgba([255, 255, 255, 255])
        } else {
            Rgba([0, 0, 0, 255])
        }
    }))
}

pub fn screenshot(bytes: Vec<u8>, w: u32, h: u32) -> Screenshot {
    Screenshot::new(bytes, ScreenshotMeta::with_size(w, h))
}

/// Returns queued frames in order, then keeps repeating the last one.
pub struct MockScreens {
    frames: Mutex<VecDeque<Screenshot>>,
    last: Mutex<Option<Screenshot>>,
    pub calls: AtomicUsize,
}

impl MockScreens {
    pub fn new(frames: Vec<Screenshot>) -> Self {
        Self {
            frames: Mutex::new(frames.into()),
            last: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    /// The same blank frame forever.
    pub fn constant(w: u32, h: u32) -> Self {
        Self::new(vec![screenshot(png_solid(w, h, [255, 255, 255, 255]), w, h)])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ScreenshotProvider for MockScreens {
    async fn capture(&self) -> ReplayResult<Screenshot> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.frames.lock().unwrap().pop_front();
        let mut last = self.last.lock().unwrap();
        if let Some(frame) = next {
            *last = Some(frame);
        }
        last.clone()
            .ok_or_else(|| ReplayError::Perception("no frames queued".into()))
    }
}

/// Returns the same detections on every call.
pub struct MockOcr {
    detections: Vec<TextDetection>,
    pub calls: AtomicUsize,
}

impl MockOcr {
    pub fn new(detections: Vec<TextDetection>) -> Self {
        Self {
            detections,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextDetector for MockOcr {
    async fn detect_text(&self, _screenshot: &Screenshot) -> ReplayResult<Vec<TextDetection>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.detections.clone())
    }
}

pub enum ResolverReply {
    Marker(Option<u32>),
    Fail,
}

pub struct MockResolver {
    reply: ResolverReply,
    pub references: Mutex<Vec<String>>,
}

impl MockResolver {
    pub fn answering(marker: Option<u32>) -> Self {
        Self {
            reply: ResolverReply::Marker(marker),
            references: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: ResolverReply::Fail,
            references: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl MarkerResolver for MockResolver {
    async fn resolve_marker(
        &self,
        _marked_image: &[u8],
        element_reference: &str,
        _target_description: &str,
    ) -> ReplayResult<Option<u32>> {
        self.references.lock().unwrap().push(element_reference.to_string());
        match self.reply {
            ResolverReply::Marker(m) => Ok(m),
            ResolverReply::Fail => Err(ReplayError::LlmProvider("vision model unavailable".into())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Injected {
    Click(i32, i32),
    Type(String),
    Scroll(ScrollDirection, i32),
    Key(String),
}

#[derive(Default)]
pub struct MockInjector {
    pub log: Mutex<Vec<Injected>>,
    pub fail_clicks: bool,
    pub pointer: Option<(i32, i32)>,
}

impl MockInjector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> Vec<Injected> {
        self.log.lock().unwrap().clone()
    }
}

#[async_trait]
impl InputInjector for MockInjector {
    async fn click(&self, x: i32, y: i32) -> ReplayResult<()> {
        if self.fail_clicks {
            return Err(ReplayError::Input("click rejected".into()));
        }
        self.log.lock().unwrap().push(Injected::Click(x, y));
        Ok(())
    }

    async fn type_text(&self, text: &str) -> ReplayResult<()> {
        self.log.lock().unwrap().push(Injected::Type(text.to_string()));
        Ok(())
    }

    async fn scroll(&self, direction: ScrollDirection, amount: i32) -> ReplayResult<()> {
        self.log.lock().unwrap().push(Injected::Scroll(direction, amount));
        Ok(())
    }

    async fn key_press(&self, key: &str) -> ReplayResult<()> {
        self.log.lock().unwrap().push(Injected::Key(key.to_string()));
        Ok(())
    }

    async fn pointer_position(&self) -> ReplayResult<Option<(i32, i32)>> {
        Ok(self.pointer)
    }
}

/// Looks texts up in a fixed table; unknown texts get a zero vector.
#[derive(Default)]
pub struct MockEmbedder {
    pub vectors: HashMap<String, Vec<f32>>,
    pub fail: bool,
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, text: &str) -> ReplayResult<Vec<f32>> {
        if self.fail {
            return Err(ReplayError::LlmProvider("embedding service down".into()));
        }
        Ok(self.vectors.get(text).cloned().unwrap_or_else(|| vec![0.0, 0.0, 0.0]))
    }
}

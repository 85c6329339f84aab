// Perceptual hashing to tell whether the screen changed after an action.
use image::imageops::FilterType;

use crate::errors::ReplayResult;

/// 64-bit average hash of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PerceptualHash(pub u64);

impl PerceptualHash {
    /// Average hash: downscale to 8×8 grayscale, one bit per pixel brighter
    /// than the mean.
    pub fn of_image(img: &image::DynamicImage) -> Self {
        let small = img.resize_exact(8, 8, FilterType::Triangle).to_luma8();
        let pixels: Vec<u32> = small.pixels().map(|p| p[0] as u32).collect();
        let mean = pixels.iter().sum::<u32>() / pixels.len().max(1) as u32;

        let mut bits = 0u64;
        for (i, &p) in pixels.iter().enumerate() {
            if p > mean {
                bits |= 1 << i;
            }
        }
        Self(bits)
    }

    pub fn of_bytes(image_bytes: &[u8]) -> ReplayResult<Self> {
        let img = image::load_from_memory(image_bytes)?;
        Ok(Self::of_image(&img))
    }

    /// Number of differing bits (0–64).
    pub fn distance(&self, other: &PerceptualHash) -> u32 {
        (self.0 ^ other.0).count_ones()
    }

    pub fn to_hex(&self) -> String {
        format!("{:016x}", self.0)
    }

    pub fn from_hex(hex: &str) -> Option<Self> {
        u64::from_str_radix(hex.trim(), 16).ok().map(Self)
    }
}

#[derive(Debug, Clone)]
pub struct ChangeDetector {
    /// Frames whose hashes differ by more than this many bits count as changed.
    pub threshold: u32,
}

impl Default for ChangeDetector {
    fn default() -> Self {
        Self { threshold: 5 }
    }
}

impl ChangeDetector {
    pub fn new(threshold: u32) -> Self {
        Self { threshold }
    }

    pub fn changed(&self, before: &PerceptualHash, after: &PerceptualHash) -> bool {
        before.distance(after) > self.threshold
    }

    /// Compares two encoded frames.
    pub fn frames_differ(&self, before: &[u8], after: &[u8]) -> ReplayResult<bool> {
        let before = PerceptualHash::of_bytes(before)?;
        let after = PerceptualHash::of_bytes(after)?;
        let distance = before.distance(&after);
        tracing::debug!(distance, threshold = self.threshold, "frame hash distance");
        Ok(distance > self.threshold)
    }
}

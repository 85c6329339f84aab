// Resolution-independent coordinates on a 0-1000 grid.
use crate::perception::types::NormalizedPoint;

pub const NORMALIZED_SCALE: u32 = 1000;

/// Maps a physical pixel position onto the 0–1000 grid, clamped.
pub fn normalize(x: i32, y: i32, width: u32, height: u32) -> NormalizedPoint {
    let scale = |v: i32, extent: u32| -> u32 {
        if extent == 0 {
            return 0;
        }
        let n = (v as f64 / extent as f64 * NORMALIZED_SCALE as f64) as i64;
        n.clamp(0, NORMALIZED_SCALE as i64) as u32
    };
    NormalizedPoint::new(scale(x, width), scale(y, height))
}

/// Maps a 0–1000 grid position back to physical pixels on a `width`×`height`
/// screen, clamped to the last pixel.
pub fn denormalize(point: NormalizedPoint, width: u32, height: u32) -> (i32, i32) {
    let scale = |v: u32, extent: u32| -> i32 {
        if extent == 0 {
            return 0;
        }
        let p = (v as f64 / NORMALIZED_SCALE as f64 * extent as f64) as i64;
        p.clamp(0, extent as i64 - 1) as i32
    };
    (scale(point.x, width), scale(point.y, height))
}

/// Human-readable 3×3 region name, e.g. "top-left" or "center".
pub fn region_name(point: NormalizedPoint) -> String {
    let h = match point.x {
        0..=332 => "left",
        333..=665 => "center",
        _ => "right",
    };
    let v = match point.y {
        0..=332 => "top",
        333..=665 => "middle",
        _ => "bottom",
    };
    match (v, h) {
        ("middle", "center") => "center".to_string(),
        (v, "center") => v.to_string(),
        ("middle", h) => h.to_string(),
        (v, h) => format!("{v}-{h}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denormalize_scales_to_current_screen() {
        assert_eq!(denormalize(NormalizedPoint::new(500, 500), 1000, 800), (500, 400));
    }

    #[test]
    fn denormalize_clamps_to_last_pixel() {
        assert_eq!(denormalize(NormalizedPoint::new(1000, 1000), 1920, 1080), (1919, 1079));
    }

    #[test]
    fn normalize_clamps_out_of_range() {
        assert_eq!(normalize(-20, 5000, 1000, 1000), NormalizedPoint::new(0, 1000));
        assert_eq!(normalize(960, 540, 1920, 1080), NormalizedPoint::new(500, 500));
    }

    #[test]
    fn region_names() {
        assert_eq!(region_name(NormalizedPoint::new(500, 500)), "center");
        assert_eq!(region_name(NormalizedPoint::new(10, 10)), "top-left");
        assert_eq!(region_name(NormalizedPoint::new(500, 900)), "bottom");
        assert_eq!(region_name(NormalizedPoint::new(900, 500)), "right");
    }
}

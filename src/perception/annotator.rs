// Set-of-Marks annotation: numbered badges over detected text.
use std::collections::BTreeMap;

use crate::errors::ReplayResult;
use crate::perception::types::TextDetection;

const MARK_COLOUR: [u8; 4] = [255, 40, 40, 230];
const BOX_COLOUR: [u8; 4] = [255, 40, 40, 140];

/// Marker id → detection. Ids start at 1 and follow detection order.
pub type MarkerMap = BTreeMap<u32, TextDetection>;

/// Assigns marker ids to every detection at or above `min_confidence`.
pub fn build_marker_map(detections: &[TextDetection], min_confidence: f32) -> MarkerMap {
    detections
        .iter()
        .filter(|d| d.confidence >= min_confidence)
        .cloned()
        .enumerate()
        .map(|(i, d)| (i as u32 + 1, d))
        .collect()
}

/// Draws each marker's box and numbered badge onto `src_bytes`.
/// Returns PNG-encoded bytes.
pub fn annotate_markers(src_bytes: &[u8], markers: &MarkerMap) -> ReplayResult<Vec<u8>> {
    let img = image::load_from_memory(src_bytes)?;
    let mut canvas = img.to_rgba8();
    let (w, _) = canvas.dimensions();

    // Bigger badges on high-resolution frames so the model can read them.
    let scale: u32 = if w > 1600 { 2 } else { 1 };

    for (id, det) in markers {
        let b = det.bbox;
        draw_rect(&mut canvas, b.x_min, b.y_min, b.x_max, b.y_max, BOX_COLOUR, scale as i32);

        let label = id.to_string();
        let (badge_w, badge_h) = badge_size(&label, scale);
        let (cx, cy) = det.center;
        draw_badge(
            &mut canvas,
            cx - badge_w as i32 / 2,
            cy - badge_h as i32 / 2,
            &label,
            scale,
        );
    }

    let mut out = Vec::new();
    image::DynamicImage::ImageRgba8(canvas)
        .write_to(&mut std::io::Cursor::new(&mut out), image::ImageFormat::Png)?;
    Ok(out)
}

/// Text legend of the markers, one line each:
/// `#3: 'Submit' at (100, 50) (conf: 0.97)`.
pub fn compact_reference(markers: &MarkerMap, max_elements: usize) -> String {
    let mut lines: Vec<String> = markers
        .iter()
        .take(max_elements)
        .map(|(id, d)| {
            let text: String = d.text.chars().take(40).collect();
            format!(
                "#{}: '{}' at ({}, {}) (conf: {:.2})",
                id, text, d.center.0, d.center.1, d.confidence
            )
        })
        .collect();

    if markers.len() > max_elements {
        lines.push(format!("... and {} more elements", markers.len() - max_elements));
    }
    lines.join("\n")
}

// ── Drawing primitives ──────────────────────────────────────────────────────

fn badge_size(text: &str, scale: u32) -> (u32, u32) {
    let char_w = 5 * scale + 1;
    let pad = 2 * scale;
    (text.len() as u32 * char_w + pad * 2, 5 * scale + pad * 2)
}

fn draw_rect(
    canvas: &mut image::RgbaImage,
    x1: i32, y1: i32, x2: i32, y2: i32,
    col: [u8; 4],
    thickness: i32,
) {
    let (w, h) = canvas.dimensions();
    let (iw, ih) = (w as i32, h as i32);

    for t in 0..thickness {
        for x in x1..=x2 {
            for y in [y1 + t, y2 - t] {
                if x >= 0 && x < iw && y >= 0 && y < ih {
                    blend_pixel(canvas, x as u32, y as u32, col);
                }
            }
        }
        for y in y1..=y2 {
            for x in [x1 + t, x2 - t] {
                if x >= 0 && x < iw && y >= 0 && y < ih {
                    blend_pixel(canvas, x as u32, y as u32, col);
                }
            }
        }
    }
}

fn draw_badge(canvas: &mut image::RgbaImage, x: i32, y: i32, text: &str, scale: u32) {
    let (w, h) = canvas.dimensions();
    let (badge_w, badge_h) = badge_size(text, scale);
    let x = x.max(0) as u32;
    let y = y.max(0) as u32;

    for dy in 0..badge_h {
        for dx in 0..badge_w {
            let (px, py) = (x + dx, y + dy);
            if px < w && py < h {
                blend_pixel(canvas, px, py, MARK_COLOUR);
            }
        }
    }

    let pad = 2 * scale;
    let step = 5 * scale + 1;
    for (i, c) in text.chars().enumerate() {
        draw_digit(canvas, c, x + pad + i as u32 * step, y + pad, [255, 255, 255, 255], scale);
    }
}

/// 5×5 bitmap digit renderer with `scale`× pixel blocks.
fn draw_digit(canvas: &mut image::RgbaImage, c: char, px: u32, py: u32, col: [u8; 4], scale: u32) {
    let Some(d) = c.to_digit(10) else { return };
    let glyph = DIGITS[d as usize];
    let (w, h) = canvas.dimensions();
    for (row, &bits) in glyph.iter().enumerate() {
        for bit in 0..5u32 {
            if (bits >> (4 - bit)) & 1 == 0 {
                continue;
            }
            for sy in 0..scale {
                for sx in 0..scale {
                    let x = px + bit * scale + sx;
                    let y = py + row as u32 * scale + sy;
                    if x < w && y < h {
                        blend_pixel(canvas, x, y, col);
                    }
                }
            }
        }
    }
}

fn blend_pixel(canvas: &mut image::RgbaImage, x: u32, y: u32, col: [u8; 4]) {
    let p = canvas.get_pixel_mut(x, y);
    let a = col[3] as f32 / 255.0;
    for i in 0..3 {
        p[i] = (p[i] as f32 * (1.0 - a) + col[i] as f32 * a).round() as u8;
    }
    p[3] = 255;
}

const DIGITS: [[u8; 5]; 10] = [
    [0b01110, 0b10001, 0b10001, 0b10001, 0b01110],
    [0b00100, 0b01100, 0b00100, 0b00100, 0b01110],
    [0b01110, 0b10001, 0b00110, 0b01000, 0b11111],
    [0b11110, 0b00001, 0b00110, 0b00001, 0b11110],
    [0b00110, 0b01010, 0b10010, 0b11111, 0b00010],
    [0b11111, 0b10000, 0b11110, 0b00001, 0b11110],
    [0b01110, 0b10000, 0b11110, 0b10001, 0b01110],
    [0b11111, 0b00001, 0b00010, 0b00100, 0b00100],
    [0b01110, 0b10001, 0b01110, 0b10001, 0b01110],
    [0b01110, 0b10001, 0b01111, 0b00001, 0b01110],
];

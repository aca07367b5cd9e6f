//! Burned-in annotations: detection boxes, labels, frame rate.

use image::{Rgb, RgbImage};

use crate::capture::{DetectionSet, LabelTable};
use crate::render::font::{self, ADVANCE, GLYPH_HEIGHT, GLYPH_WIDTH};

pub const BOX_COLOR: Rgb<u8> = Rgb([0, 0, 255]);
pub const LABEL_COLOR: Rgb<u8> = Rgb([0, 0, 255]);
pub const FPS_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

fn put(img: &mut RgbImage, x: i32, y: i32, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < img.width() && (y as u32) < img.height() {
        img.put_pixel(x as u32, y as u32, color);
    }
}

/// One-pixel rectangle outline through both corners, clipped to the image.
pub fn draw_rect(img: &mut RgbImage, (x1, y1): (i32, i32), (x2, y2): (i32, i32), color: Rgb<u8>) {
    let (left, right) = (x1.min(x2), x1.max(x2));
    let (top, bottom) = (y1.min(y2), y1.max(y2));

    for x in left..=right {
        put(img, x, top, color);
        put(img, x, bottom, color);
    }
    for y in top..=bottom {
        put(img, left, y, color);
        put(img, right, y, color);
    }
}

/// Draw `text` with its baseline at `y`; glyphs occupy rows `y-7 .. y-1`.
pub fn draw_text(img: &mut RgbImage, text: &str, x: i32, y: i32, color: Rgb<u8>) {
    let top = y - GLYPH_HEIGHT as i32;
    for (i, c) in text.chars().enumerate() {
        let origin = x + (i as u32 * ADVANCE) as i32;
        for (row, bits) in font::glyph(c).iter().enumerate() {
            for col in 0..GLYPH_WIDTH {
                if bits & (1 << (GLYPH_WIDTH - 1 - col)) != 0 {
                    put(img, origin + col as i32, top + row as i32, color);
                }
            }
        }
    }
}

/// Box, class name and confidence for every detection in the set.
pub fn draw_detections(img: &mut RgbImage, detections: &DetectionSet, labels: &LabelTable) {
    let (width, height) = img.dimensions();
    for det in &detections.detections {
        let (x1, y1, x2, y2) = det.pixel_box(width, height);

        draw_text(img, &labels.resolve(det.label), x1 + 10, y1 + 20, LABEL_COLOR);
        draw_text(img, &confidence_text(det.confidence), x1 + 10, y1 + 40, LABEL_COLOR);
        draw_rect(img, (x1, y1), (x2, y2), BOX_COLOR);
    }
}

/// Confidence as a percentage with two decimals.
pub fn confidence_text(confidence: f32) -> String {
    format!("{:.2}", confidence * 100.0)
}

pub fn fps_text(fps: f32) -> String {
    format!("NN fps: {:.2}", fps)
}

/// Frame rate in the bottom-left corner.
pub fn draw_fps(img: &mut RgbImage, fps: f32) {
    let y = img.height() as i32 - 4;
    draw_text(img, &fps_text(fps), 2, y, FPS_COLOR);
}

//! Depth-to-color mapping: 16-bit samples → 8-bit intensity → jet palette

use image::RgbImage;

use crate::capture::{Frame, PixelFormat};
use crate::error::RenderError;

/// Map one raw depth sample to display intensity: `raw * 255 / depth_scale`,
/// rounded and clamped to [0, 255].
pub fn depth_intensity(raw: u16, depth_scale: f32) -> u8 {
    if depth_scale <= 0.0 {
        return if raw == 0 { 0 } else { u8::MAX };
    }
    (raw as f32 * 255.0 / depth_scale).round().clamp(0.0, 255.0) as u8
}

// (position, value) control points of the jet ramp, per channel
const JET_RED: &[(f32, f32)] = &[(0.0, 0.0), (0.35, 0.0), (0.66, 1.0), (0.89, 1.0), (1.0, 0.5)];
const JET_GREEN: &[(f32, f32)] = &[
    (0.0, 0.0),
    (0.125, 0.0),
    (0.375, 1.0),
    (0.64, 1.0),
    (0.91, 0.0),
    (1.0, 0.0),
];
const JET_BLUE: &[(f32, f32)] = &[(0.0, 0.5), (0.11, 1.0), (0.34, 1.0), (0.65, 0.0), (1.0, 0.0)];

fn ramp(points: &[(f32, f32)], x: f32) -> f32 {
    for pair in points.windows(2) {
        let (x0, y0) = pair[0];
        let (x1, y1) = pair[1];
        if x <= x1 {
            return y0 + (y1 - y0) * (x - x0) / (x1 - x0);
        }
    }
    points.last().map(|p| p.1).unwrap_or(0.0)
}

/// RGB value of the jet palette for an 8-bit intensity.
pub fn jet(intensity: u8) -> [u8; 3] {
    let x = intensity as f32 / 255.0;
    let channel = |points: &[(f32, f32)]| (ramp(points, x) * 255.0).round() as u8;
    [channel(JET_RED), channel(JET_GREEN), channel(JET_BLUE)]
}

/// Precomputed raw-depth → RGB lookup for one depth scale.
pub struct DepthColorizer {
    depth_scale: f32,
    palette: [[u8; 3]; 256],
}

impl DepthColorizer {
    pub fn new(depth_scale: f32) -> Self {
        let mut palette = [[0u8; 3]; 256];
        for (i, entry) in palette.iter_mut().enumerate() {
            *entry = jet(i as u8);
        }
        Self {
            depth_scale,
            palette,
        }
    }

    pub fn depth_scale(&self) -> f32 {
        self.depth_scale
    }

    pub fn color(&self, raw: u16) -> [u8; 3] {
        self.palette[depth_intensity(raw, self.depth_scale) as usize]
    }

    /// Colorize a `Gray16Le` frame into an RGB image of the same size.
    pub fn colorize(&self, frame: &Frame) -> Result<RgbImage, RenderError> {
        if frame.format() != PixelFormat::Gray16Le {
            return Err(RenderError::UnsupportedFormat(frame.format()));
        }

        let (width, height) = (frame.width(), frame.height());
        let mut out = Vec::with_capacity(PixelFormat::Rgb24.frame_len(width, height));
        for sample in frame.data.chunks_exact(2) {
            let raw = u16::from_le_bytes([sample[0], sample[1]]);
            out.extend_from_slice(&self.color(raw));
        }

        RgbImage::from_raw(width, height, out).ok_or(RenderError::BadBuffer { width, height })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_depth(value: u16, width: u32, height: u32) -> Frame {
        let data: Vec<u8> = std::iter::repeat(value.to_le_bytes())
            .take((width * height) as usize)
            .flatten()
            .collect();
        Frame::new(data, width, height, PixelFormat::Gray16Le, 0).unwrap()
    }

    #[test]
    fn intensity_scales_and_clamps() {
        assert_eq!(depth_intensity(0, 2000.0), 0);
        assert_eq!(depth_intensity(1000, 2000.0), 128); // 127.5 rounds up
        assert_eq!(depth_intensity(2000, 2000.0), 255);
        assert_eq!(depth_intensity(65535, 2000.0), 255);
        assert_eq!(depth_intensity(100, 255.0), 100);
    }

    #[test]
    fn jet_endpoints() {
        assert_eq!(jet(0), [0, 0, 128]);
        assert_eq!(jet(255), [128, 0, 0]);
        // green peaks in the middle of the ramp
        let mid = jet(128);
        assert!(mid[1] == 255, "{:?}", mid);
    }

    #[test]
    fn flat_depth_colorizes_uniformly() {
        let colorizer = DepthColorizer::new(4000.0);
        let frame = flat_depth(1500, 8, 4);

        let img = colorizer.colorize(&frame).unwrap();
        let expected = jet(((1500.0f32 * 255.0 / 4000.0).round()) as u8);

        assert_eq!(img.dimensions(), (8, 4));
        assert!(img.pixels().all(|p| p.0 == expected));
    }

    #[test]
    fn colorize_rejects_color_frames() {
        let colorizer = DepthColorizer::new(1000.0);
        let frame = Frame::new(vec![0u8; 12], 2, 2, PixelFormat::Rgb24, 0).unwrap();
        assert!(matches!(
            colorizer.colorize(&frame),
            Err(RenderError::UnsupportedFormat(PixelFormat::Rgb24))
        ));
    }
}

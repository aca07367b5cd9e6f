//! Pixel transform: raw sensor frames → RGB buffers sized for the sink

pub mod depth;
pub mod font;
pub mod overlay;

use image::imageops::{self, FilterType};
use image::RgbImage;
use tracing::instrument;

use crate::capture::{DetectionSet, Frame, LabelTable, PixelFormat};
use crate::error::RenderError;

pub use depth::{depth_intensity, jet, DepthColorizer};

/// What a stream does to its frames before they reach the sink.
pub enum RenderMode {
    /// RGB/BGR camera frames, copied as RGB
    Color,
    /// Z16 depth frames through the jet palette
    Depth(DepthColorizer),
    /// Camera frames with detection boxes burned in
    Annotate(LabelTable),
}

impl RenderMode {
    pub fn depth(depth_scale: f32) -> Self {
        RenderMode::Depth(DepthColorizer::new(depth_scale))
    }
}

/// Renders frames at the sink's negotiated resolution.
pub struct FrameRenderer {
    width: u32,
    height: u32,
    mode: RenderMode,
    show_fps: bool,
}

impl FrameRenderer {
    pub fn new(width: u32, height: u32, mode: RenderMode) -> Self {
        Self {
            width,
            height,
            mode,
            show_fps: false,
        }
    }

    pub fn with_fps_overlay(mut self, show_fps: bool) -> Self {
        self.show_fps = show_fps;
        self
    }

    /// Byte length of every buffer this renderer produces.
    pub fn output_len(&self) -> usize {
        PixelFormat::Rgb24.frame_len(self.width, self.height)
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[instrument(level = "trace", skip_all, fields(seq = frame.meta.sequence))]
    pub fn render(
        &self,
        frame: &Frame,
        detections: Option<&DetectionSet>,
        fps: f32,
    ) -> Result<RgbImage, RenderError> {
        let base = match &self.mode {
            RenderMode::Depth(colorizer) => colorizer.colorize(frame)?,
            RenderMode::Color | RenderMode::Annotate(_) => to_rgb(frame)?,
        };

        let mut img = if base.dimensions() == (self.width, self.height) {
            base
        } else {
            imageops::resize(&base, self.width, self.height, FilterType::Nearest)
        };

        if let (RenderMode::Annotate(labels), Some(detections)) = (&self.mode, detections) {
            overlay::draw_detections(&mut img, detections, labels);
        }

        if self.show_fps {
            overlay::draw_fps(&mut img, fps);
        }

        Ok(img)
    }
}

fn to_rgb(frame: &Frame) -> Result<RgbImage, RenderError> {
    let (width, height) = (frame.width(), frame.height());
    let data = match frame.format() {
        PixelFormat::Rgb24 => frame.data.to_vec(),
        PixelFormat::Bgr24 => frame
            .data
            .chunks_exact(3)
            .flat_map(|px| [px[2], px[1], px[0]])
            .collect(),
        other => return Err(RenderError::UnsupportedFormat(other)),
    };

    RgbImage::from_raw(width, height, data).ok_or(RenderError::BadBuffer { width, height })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::Detection;

    fn solid(width: u32, height: u32, format: PixelFormat, px: [u8; 3]) -> Frame {
        let data: Vec<u8> = std::iter::repeat(px)
            .take((width * height) as usize)
            .flatten()
            .collect();
        Frame::new(data, width, height, format, 1).unwrap()
    }

    #[test]
    fn bgr_frames_are_swapped() {
        let renderer = FrameRenderer::new(4, 4, RenderMode::Color);
        let img = renderer
            .render(&solid(4, 4, PixelFormat::Bgr24, [1, 2, 3]), None, 0.0)
            .unwrap();
        assert_eq!(img.get_pixel(0, 0).0, [3, 2, 1]);
    }

    #[test]
    fn output_always_matches_negotiated_size() {
        for (w, h) in [(640, 480), (320, 240), (1, 1), (33, 17)] {
            let renderer = FrameRenderer::new(w, h, RenderMode::Color).with_fps_overlay(true);
            let img = renderer
                .render(&solid(64, 48, PixelFormat::Rgb24, [9, 9, 9]), None, 30.0)
                .unwrap();
            assert_eq!(img.dimensions(), (w, h));
            assert_eq!(img.as_raw().len(), renderer.output_len());
        }
    }

    #[test]
    fn color_mode_rejects_depth() {
        let renderer = FrameRenderer::new(2, 2, RenderMode::Color);
        let frame = Frame::new(vec![0u8; 8], 2, 2, PixelFormat::Gray16Le, 0).unwrap();
        assert!(matches!(
            renderer.render(&frame, None, 0.0),
            Err(RenderError::UnsupportedFormat(PixelFormat::Gray16Le))
        ));
    }

    #[test]
    fn color_mode_ignores_detections() {
        let renderer = FrameRenderer::new(16, 16, RenderMode::Color);
        let set = DetectionSet::new(vec![Detection {
            label: 1,
            confidence: 0.5,
            xmin: 0.0,
            ymin: 0.0,
            xmax: 0.5,
            ymax: 0.5,
        }]);
        let img = renderer
            .render(&solid(16, 16, PixelFormat::Rgb24, [0, 0, 0]), Some(&set), 0.0)
            .unwrap();
        assert!(img.pixels().all(|p| p.0 == [0, 0, 0]));
    }

    #[test]
    fn rendering_is_deterministic() {
        let renderer =
            FrameRenderer::new(64, 64, RenderMode::Annotate(LabelTable::default())).with_fps_overlay(true);
        let frame = solid(64, 64, PixelFormat::Rgb24, [10, 20, 30]);
        let set = DetectionSet::new(vec![Detection {
            label: 99,
            confidence: 0.42,
            xmin: 0.1,
            ymin: 0.1,
            xmax: 0.9,
            ymax: 0.9,
        }]);

        let a = renderer.render(&frame, Some(&set), 12.5).unwrap();
        let b = renderer.render(&frame, Some(&set), 12.5).unwrap();
        assert_eq!(a.as_raw(), b.as_raw());
    }
}

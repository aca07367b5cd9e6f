mod common;

use common::*;
use framecast::capture::LabelTable;
use framecast::render::overlay::draw_text;
use framecast::render::{depth_intensity, jet, FrameRenderer, RenderMode};
use framecast::{Frame, PixelFormat};
use image::{Rgb, RgbImage};

const BLUE: [u8; 3] = [0, 0, 255];
const BLACK: [u8; 3] = [0, 0, 0];

#[test]
fn detection_box_lands_on_expected_pixels() {
    let renderer = FrameRenderer::new(640, 640, RenderMode::Annotate(LabelTable::default()));
    let detections = single_box(3, 0.1, 0.2, 0.5, 0.6);

    let img = renderer
        .render(&black_frame(640, 640, 1), Some(&detections), 0.0)
        .unwrap();
    let buf = img.as_raw();

    for (x, y) in [(64, 128), (320, 128), (64, 384), (320, 384), (192, 128), (64, 256)] {
        assert_eq!(pixel(buf, 640, x, y), BLUE, "edge pixel ({}, {})", x, y);
    }
    // Just outside and well inside the outline
    assert_eq!(pixel(buf, 640, 63, 128), BLACK);
    assert_eq!(pixel(buf, 640, 321, 384), BLACK);
    assert_eq!(pixel(buf, 640, 250, 300), BLACK);
}

#[test]
fn unknown_label_renders_as_its_index() {
    let labels = LabelTable::new(["only"]);
    let renderer = FrameRenderer::new(200, 200, RenderMode::Annotate(labels));
    let detections = single_box(7, 0.0, 0.0, 0.9, 0.9);

    let img = renderer
        .render(&black_frame(200, 200, 1), Some(&detections), 0.0)
        .unwrap();

    let mut expected = RgbImage::new(200, 200);
    draw_text(&mut expected, "7", 10, 20, Rgb(BLUE));
    for y in 13..20 {
        for x in 10..15 {
            assert_eq!(
                img.get_pixel(x, y),
                expected.get_pixel(x, y),
                "glyph pixel ({}, {})",
                x,
                y
            );
        }
    }
}

#[test]
fn flat_depth_renders_a_single_color() {
    let depth_scale = 4000.0;
    let raw: u16 = 1000;
    let data: Vec<u8> = std::iter::repeat(raw.to_le_bytes())
        .take(32 * 24)
        .flatten()
        .collect();
    let frame = Frame::new(data, 32, 24, PixelFormat::Gray16Le, 1).unwrap();

    let renderer = FrameRenderer::new(64, 48, RenderMode::depth(depth_scale));
    let img = renderer.render(&frame, None, 0.0).unwrap();

    let intensity = depth_intensity(raw, depth_scale);
    assert_eq!(intensity, 64);
    let expected = jet(intensity);
    assert!(img.pixels().all(|p| p.0 == expected));
}

#[test]
fn bgr_frames_are_swapped_to_rgb() {
    let data: Vec<u8> = [10u8, 20, 30].repeat(4 * 4);
    let frame = Frame::new(data, 4, 4, PixelFormat::Bgr24, 1).unwrap();

    let img = FrameRenderer::new(4, 4, RenderMode::Color)
        .render(&frame, None, 0.0)
        .unwrap();
    assert!(img.pixels().all(|p| p.0 == [30, 20, 10]));
}

#[test]
fn fps_overlay_only_when_enabled() {
    let frame = black_frame(120, 40, 1);

    let plain = FrameRenderer::new(120, 40, RenderMode::Color)
        .render(&frame, None, 29.97)
        .unwrap();
    assert!(plain.pixels().all(|p| p.0 == BLACK));

    let annotated = FrameRenderer::new(120, 40, RenderMode::Color)
        .with_fps_overlay(true)
        .render(&frame, None, 29.97)
        .unwrap();
    assert!(annotated.pixels().any(|p| p.0 == [255, 255, 255]));
}

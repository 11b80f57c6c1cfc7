//! Standalone image transforms behind the `cvdemo` binary.
//!
//! Color images are `RgbImage`; HSV images reuse `RgbImage` with the channels
//! holding H (0..180), S and V (0..=255).

use ab_glyph::{FontVec, PxScale};
use anyhow::{anyhow, Result};
use image::imageops::{self, FilterType};
use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::contours::find_contours;
use imageproc::contrast::{otsu_level, threshold, ThresholdType};
use imageproc::distance_transform::Norm;
use imageproc::drawing::{
    draw_filled_circle_mut, draw_filled_rect_mut, draw_hollow_circle_mut, draw_hollow_rect_mut,
    draw_line_segment_mut, draw_text_mut,
};
use imageproc::filter::{box_filter, gaussian_blur_f32, median_filter};
use imageproc::geometry::contour_area;
use imageproc::point::Point;
use imageproc::rect::Rect;

use crate::enhance;

const CONTOUR_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const MASK_BOX_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

/// Hue half-width and S/V floor of a color mask.
pub const HUE_TOLERANCE: u8 = 10;
pub const MIN_SATURATION: u8 = 100;
pub const MIN_VALUE: u8 = 100;

// ----------------------------------------------------------------------------
// Color spaces
// ----------------------------------------------------------------------------

pub fn to_gray(image: &RgbImage) -> GrayImage {
    enhance::to_intensity(image)
}

/// RGB → BGR (and back).
pub fn swap_channels(image: &RgbImage) -> RgbImage {
    let mut out = image.clone();
    for pixel in out.pixels_mut() {
        pixel.0.swap(0, 2);
    }
    out
}

/// 8-bit HSV of one pixel: H in 0..180, S and V in 0..=255.
pub fn rgb_to_hsv(rgb: [u8; 3]) -> [u8; 3] {
    let [r, g, b] = rgb.map(f32::from);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let saturation = if max == 0.0 { 0.0 } else { 255.0 * delta / max };
    let mut hue = if delta == 0.0 {
        0.0
    } else if max == r {
        60.0 * (g - b) / delta
    } else if max == g {
        120.0 + 60.0 * (b - r) / delta
    } else {
        240.0 + 60.0 * (r - g) / delta
    };
    if hue < 0.0 {
        hue += 360.0;
    }
    let hue = (hue / 2.0).round() as u32 % 180;
    [hue as u8, saturation.round() as u8, max as u8]
}

pub fn to_hsv(image: &RgbImage) -> RgbImage {
    let mut out = image.clone();
    for pixel in out.pixels_mut() {
        pixel.0 = rgb_to_hsv(pixel.0);
    }
    out
}

// ----------------------------------------------------------------------------
// Geometry
// ----------------------------------------------------------------------------

pub fn resize(image: &RgbImage, width: u32, height: u32) -> Result<RgbImage> {
    if width == 0 || height == 0 {
        return Err(anyhow!("resize target must be non-empty ({}x{})", width, height));
    }
    Ok(imageops::resize(image, width, height, FilterType::Triangle))
}

pub fn crop(image: &RgbImage, x: u32, y: u32, width: u32, height: u32) -> Result<RgbImage> {
    let fits = x.checked_add(width).is_some_and(|right| right <= image.width())
        && y.checked_add(height).is_some_and(|bottom| bottom <= image.height());
    if width == 0 || height == 0 || !fits {
        return Err(anyhow!(
            "crop {}x{}+{}+{} is outside the {}x{} image",
            width,
            height,
            x,
            y,
            image.width(),
            image.height()
        ));
    }
    Ok(imageops::crop_imm(image, x, y, width, height).to_image())
}

// ----------------------------------------------------------------------------
// Blur
// ----------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlurKind {
    Box,
    Gaussian,
    Median,
}

/// Blur with a square `kernel`-sized window. The kernel must be odd.
pub fn blur(image: &RgbImage, kind: BlurKind, kernel: u32) -> Result<RgbImage> {
    if kernel == 0 || kernel % 2 == 0 {
        return Err(anyhow!("kernel size must be a positive odd number, got {}", kernel));
    }
    let radius = kernel / 2;
    Ok(match kind {
        BlurKind::Box => box_blur(image, radius),
        BlurKind::Gaussian => gaussian_blur_f32(image, gaussian_sigma(kernel)),
        BlurKind::Median => median_filter(image, radius, radius),
    })
}

/// Sigma implied by a kernel size when none is given.
pub fn gaussian_sigma(kernel: u32) -> f32 {
    (0.3 * ((kernel as f32 - 1.0) * 0.5 - 1.0) + 0.8).max(0.1)
}

pub fn box_blur(image: &RgbImage, radius: u32) -> RgbImage {
    map_channels(image, |channel| box_filter(channel, radius, radius))
}

fn map_channels(image: &RgbImage, f: impl Fn(&GrayImage) -> GrayImage) -> RgbImage {
    let (width, height) = image.dimensions();
    let channels: Vec<GrayImage> = (0..3)
        .map(|c| {
            let plane = GrayImage::from_fn(width, height, |x, y| Luma([image.get_pixel(x, y)[c]]));
            f(&plane)
        })
        .collect();
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            channels[0].get_pixel(x, y)[0],
            channels[1].get_pixel(x, y)[0],
            channels[2].get_pixel(x, y)[0],
        ])
    })
}

/// Box-blur each rectangle in place; parts outside the image are ignored.
pub fn anonymize(image: &mut RgbImage, regions: &[Rect], kernel: u32) -> usize {
    let radius = (kernel / 2).max(1);
    let mut blurred = 0;
    for region in regions {
        let Some((x, y, width, height)) = clip(image, region) else {
            log::debug!("region {:?} is outside the image", region);
            continue;
        };
        let patch = imageops::crop_imm(image, x, y, width, height).to_image();
        imageops::replace(image, &box_blur(&patch, radius), x as i64, y as i64);
        blurred += 1;
    }
    blurred
}

fn clip(image: &RgbImage, rect: &Rect) -> Option<(u32, u32, u32, u32)> {
    let x0 = rect.left().max(0);
    let y0 = rect.top().max(0);
    let x1 = (rect.right() + 1).min(image.width() as i32);
    let y1 = (rect.bottom() + 1).min(image.height() as i32);
    if x1 <= x0 || y1 <= y0 {
        return None;
    }
    Some((x0 as u32, y0 as u32, (x1 - x0) as u32, (y1 - y0) as u32))
}

// ----------------------------------------------------------------------------
// Threshold
// ----------------------------------------------------------------------------

pub enum ThresholdSpec {
    /// `Binary` or `BinaryInverted` at a fixed level.
    Fixed { level: u8, kind: ThresholdType },
    Otsu,
    /// Local mean over a `block`×`block` window minus `offset`.
    AdaptiveMean { block: u32, offset: i16 },
}

/// Returns the global level used (0 for adaptive) and the binary image.
pub fn apply_threshold(gray: &GrayImage, spec: ThresholdSpec) -> Result<(u8, GrayImage)> {
    match spec {
        ThresholdSpec::Fixed { level, kind } => Ok((level, threshold(gray, level, kind))),
        ThresholdSpec::Otsu => {
            let level = otsu_level(gray);
            Ok((level, threshold(gray, level, ThresholdType::Binary)))
        }
        ThresholdSpec::AdaptiveMean { block, offset } => {
            if block < 3 || block % 2 == 0 {
                return Err(anyhow!("adaptive block size must be odd and at least 3"));
            }
            Ok((0, adaptive_mean_threshold(gray, block / 2, offset)))
        }
    }
}

fn adaptive_mean_threshold(gray: &GrayImage, radius: u32, offset: i16) -> GrayImage {
    let mean = box_filter(gray, radius, radius);
    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        let local = i16::from(mean.get_pixel(x, y)[0]) - offset;
        if i16::from(gray.get_pixel(x, y)[0]) > local {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

// ----------------------------------------------------------------------------
// Contours
// ----------------------------------------------------------------------------

#[derive(Clone, Debug)]
pub struct Region {
    pub points: Vec<Point<i32>>,
    pub area: f64,
    pub bounds: Rect,
}

/// Outer and nested borders of dark shapes (inverted `level` threshold)
/// whose area exceeds `min_area`.
pub fn find_regions(gray: &GrayImage, level: u8, min_area: f64) -> Vec<Region> {
    let binary = threshold(gray, level, ThresholdType::BinaryInverted);
    find_contours::<i32>(&binary)
        .into_iter()
        .filter_map(|contour| {
            let area = contour_area(&contour.points).abs();
            if area <= min_area {
                return None;
            }
            let bounds = bounding_rect(&contour.points)?;
            Some(Region {
                points: contour.points,
                area,
                bounds,
            })
        })
        .collect()
}

fn bounding_rect(points: &[Point<i32>]) -> Option<Rect> {
    let first = points.first()?;
    let (mut x0, mut y0, mut x1, mut y1) = (first.x, first.y, first.x, first.y);
    for p in points {
        x0 = x0.min(p.x);
        y0 = y0.min(p.y);
        x1 = x1.max(p.x);
        y1 = y1.max(p.y);
    }
    Some(Rect::at(x0, y0).of_size((x1 - x0 + 1) as u32, (y1 - y0 + 1) as u32))
}

pub fn draw_regions(image: &mut RgbImage, regions: &[Region]) {
    for region in regions {
        let n = region.points.len();
        for i in 0..n {
            let a = region.points[i];
            let b = region.points[(i + 1) % n];
            draw_thick_line(
                image,
                (a.x as f32, a.y as f32),
                (b.x as f32, b.y as f32),
                2,
                CONTOUR_COLOR,
            );
        }
        draw_thick_rect(image, region.bounds, 2, BOX_COLOR);
    }
}

// ----------------------------------------------------------------------------
// Edges
// ----------------------------------------------------------------------------

pub struct EdgeMaps {
    pub edges: GrayImage,
    pub dilated: GrayImage,
    pub eroded: GrayImage,
}

/// Canny edges, thickened with a 5×5 dilation, then thinned back with a 5×5
/// erosion.
pub fn edge_maps(gray: &GrayImage, low: f32, high: f32) -> Result<EdgeMaps> {
    if !(low >= 0.0 && high >= low) {
        return Err(anyhow!("canny thresholds need 0 <= low <= high ({} / {})", low, high));
    }
    let edges = imageproc::edges::canny(gray, low, high);
    let dilated = imageproc::morphology::dilate(&edges, Norm::LInf, 2);
    let eroded = imageproc::morphology::erode(&dilated, Norm::LInf, 2);
    Ok(EdgeMaps {
        edges,
        dilated,
        eroded,
    })
}

// ----------------------------------------------------------------------------
// Color mask
// ----------------------------------------------------------------------------

/// HSV bounds around a target color: hue ± 10 (clamped to 0..180), S and V
/// at least 100.
pub fn hsv_limits(target: [u8; 3]) -> ([u8; 3], [u8; 3]) {
    let hue = rgb_to_hsv(target)[0];
    (
        [hue.saturating_sub(HUE_TOLERANCE), MIN_SATURATION, MIN_VALUE],
        [(hue + HUE_TOLERANCE).min(179), 255, 255],
    )
}

pub fn color_mask(image: &RgbImage, target: [u8; 3]) -> GrayImage {
    let (lower, upper) = hsv_limits(target);
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let hsv = rgb_to_hsv(image.get_pixel(x, y).0);
        let inside = (0..3).all(|c| hsv[c] >= lower[c] && hsv[c] <= upper[c]);
        Luma([if inside { 255 } else { 0 }])
    })
}

/// Smallest rectangle holding every nonzero mask pixel.
pub fn mask_bounds(mask: &GrayImage) -> Option<Rect> {
    let mut bounds: Option<(u32, u32, u32, u32)> = None;
    for (x, y, pixel) in mask.enumerate_pixels() {
        if pixel[0] == 0 {
            continue;
        }
        bounds = Some(match bounds {
            None => (x, y, x, y),
            Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
        });
    }
    let (x0, y0, x1, y1) = bounds?;
    Some(Rect::at(x0 as i32, y0 as i32).of_size(x1 - x0 + 1, y1 - y0 + 1))
}

/// Outline the masked area of `target` on the image; returns the box drawn.
pub fn highlight_color(image: &mut RgbImage, target: [u8; 3]) -> Option<Rect> {
    let bounds = mask_bounds(&color_mask(image, target))?;
    draw_thick_rect(image, bounds, 5, MASK_BOX_COLOR);
    Some(bounds)
}

// ----------------------------------------------------------------------------
// Drawing
// ----------------------------------------------------------------------------

pub fn draw_thick_line(
    image: &mut RgbImage,
    a: (f32, f32),
    b: (f32, f32),
    thickness: i32,
    color: Rgb<u8>,
) {
    let half = thickness / 2;
    for d in -half..=half {
        let d = d as f32;
        draw_line_segment_mut(image, (a.0 + d, a.1), (b.0 + d, b.1), color);
        draw_line_segment_mut(image, (a.0, a.1 + d), (b.0, b.1 + d), color);
    }
}

/// Hollow rectangle whose border grows inwards.
pub fn draw_thick_rect(image: &mut RgbImage, rect: Rect, thickness: i32, color: Rgb<u8>) {
    for inset in 0..thickness.max(1) {
        let width = rect.width().saturating_sub(2 * inset as u32);
        let height = rect.height().saturating_sub(2 * inset as u32);
        if width == 0 || height == 0 {
            break;
        }
        draw_hollow_rect_mut(
            image,
            Rect::at(rect.left() + inset, rect.top() + inset).of_size(width, height),
            color,
        );
    }
}

fn draw_ring(image: &mut RgbImage, center: (i32, i32), radius: i32, thickness: i32, color: Rgb<u8>) {
    let half = thickness / 2;
    for r in (radius - half).max(1)..=radius + half {
        draw_hollow_circle_mut(image, center, r, color);
    }
}

/// Lines, boxes, discs and an optional caption at fixed positions.
pub fn draw_test_card(image: &mut RgbImage, font: Option<&FontVec>, caption: &str) {
    let line_colors = [
        Rgb([0, 255, 0]),
        Rgb([0, 0, 255]),
        Rgb([255, 0, 0]),
        Rgb([0, 0, 0]),
    ];
    for (i, color) in line_colors.into_iter().enumerate() {
        let y = 100.0 + 50.0 * i as f32;
        draw_thick_line(image, (200.0, y), (450.0, y), 3, color);
    }

    let frame = Rect::at(120, 80).of_size(391, 201);
    draw_filled_rect_mut(image, frame, Rgb([0, 0, 0]));
    draw_thick_rect(image, frame, 10, Rgb([250, 250, 0]));
    for (x, color) in [
        (150, Rgb([0, 0, 255])),
        (260, Rgb([255, 0, 0])),
        (370, Rgb([0, 255, 0])),
    ] {
        draw_filled_rect_mut(image, Rect::at(x, 125).of_size(101, 101), color);
    }

    draw_filled_circle_mut(image, (200, 175), 40, Rgb([255, 255, 255]));
    draw_ring(image, (310, 175), 40, 15, Rgb([0, 255, 255]));
    draw_filled_circle_mut(image, (420, 175), 40, Rgb([255, 255, 255]));

    if let Some(font) = font {
        draw_text_mut(image, Rgb([0, 0, 0]), 200, 10, PxScale::from(32.0), font, caption);
    }
}

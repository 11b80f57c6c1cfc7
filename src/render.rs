//! Frame annotation and snapshots.
//!
//! Purely cosmetic: nothing here feeds back into scanning. Outlines and label
//! bars are always drawn; label text and the banner need a TrueType font.

use ab_glyph::{FontVec, PxScale};
use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use std::path::{Path, PathBuf};

use crate::decode::{BoundingBox, DecodedCandidate};
use crate::scanner::Verdict;
use crate::vision::{draw_thick_line, draw_thick_rect};

pub const VALID_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
pub const INVALID_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const BANNER_COLOR: Rgb<u8> = Rgb([255, 255, 0]);
const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const BLACK: Rgb<u8> = Rgb([0, 0, 0]);

const OUTLINE_THICKNESS: i32 = 3;
const LABEL_LINE_HEIGHT: i32 = 25;
const LABEL_CHAR_WIDTH: u32 = 10;
const LABEL_SCALE: f32 = 18.0;

#[derive(Default)]
pub struct Annotator {
    font: Option<FontVec>,
}

impl Annotator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a TrueType/OpenType font for label text.
    pub fn with_font_file(mut self, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes =
            std::fs::read(path).with_context(|| format!("read font {}", path.display()))?;
        let font = FontVec::try_from_vec(bytes)
            .map_err(|e| anyhow::anyhow!("invalid font {}: {}", path.display(), e))?;
        self.font = Some(font);
        Ok(self)
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Outline a candidate and put its label above it.
    pub fn draw_candidate(&self, image: &mut RgbImage, candidate: &DecodedCandidate, verdict: &Verdict) {
        let color = if verdict.is_valid() {
            VALID_COLOR
        } else {
            INVALID_COLOR
        };

        if candidate.polygon.len() == 4 {
            for i in 0..4 {
                let a = candidate.polygon[i];
                let b = candidate.polygon[(i + 1) % 4];
                draw_thick_line(
                    image,
                    (a.x as f32, a.y as f32),
                    (b.x as f32, b.y as f32),
                    OUTLINE_THICKNESS,
                    color,
                );
            }
        }
        draw_thick_rect(image, to_rect(&candidate.rect), OUTLINE_THICKNESS, color);

        let lines = label_lines(&candidate.text, verdict);
        let (bar_color, text_color) = if verdict.is_valid() {
            (VALID_COLOR, BLACK)
        } else {
            (INVALID_COLOR, WHITE)
        };
        let longest = lines.iter().map(|l| l.chars().count()).max().unwrap_or(0) as u32;
        let bar_height = LABEL_LINE_HEIGHT * lines.len() as i32 + 10;
        let bar_top = candidate.rect.top - bar_height;
        if let Some(bar) = clipped_rect(
            image,
            candidate.rect.left,
            bar_top,
            longest * LABEL_CHAR_WIDTH,
            bar_height as u32,
        ) {
            draw_filled_rect_mut(image, bar, bar_color);
        }

        if let Some(font) = &self.font {
            for (i, line) in lines.iter().enumerate() {
                let y = bar_top + 5 + LABEL_LINE_HEIGHT * i as i32;
                draw_text_mut(
                    image,
                    text_color,
                    candidate.rect.left + 5,
                    y,
                    PxScale::from(LABEL_SCALE),
                    font,
                    line,
                );
            }
        }
    }

    /// Title and roster size in the top-left corner.
    pub fn draw_banner(&self, image: &mut RgbImage, roster_size: usize) {
        let Some(font) = &self.font else {
            return;
        };
        draw_text_mut(
            image,
            BANNER_COLOR,
            10,
            10,
            PxScale::from(24.0),
            font,
            "ATTENDANCE SCANNER - Scan ID Card Barcode",
        );
        draw_text_mut(
            image,
            WHITE,
            10,
            42,
            PxScale::from(LABEL_SCALE),
            font,
            &format!("Students: {} | Press 'q' to quit", roster_size),
        );
    }
}

/// Label text for a candidate: two lines for a roster hit, one otherwise.
pub fn label_lines(text: &str, verdict: &Verdict) -> Vec<String> {
    match verdict {
        Verdict::Valid { name } => vec![format!("VALID: {}", text), format!("Name: {}", name)],
        Verdict::Unknown | Verdict::BadFormat => vec![format!("INVALID: {}", text)],
    }
}

fn to_rect(bounds: &BoundingBox) -> Rect {
    Rect::at(bounds.left, bounds.top).of_size(bounds.width.max(1), bounds.height.max(1))
}

/// Intersect a rectangle with the image; `None` when nothing is visible.
fn clipped_rect(image: &RgbImage, left: i32, top: i32, width: u32, height: u32) -> Option<Rect> {
    let x0 = left.max(0);
    let y0 = top.max(0);
    let x1 = (left.saturating_add(width as i32)).min(image.width() as i32);
    let y1 = (top.saturating_add(height as i32)).min(image.height() as i32);
    if x1 <= x0 || y1 <= y0 {
        return None;
    }
    Some(Rect::at(x0, y0).of_size((x1 - x0) as u32, (y1 - y0) as u32))
}

/// Writes annotated frames to a directory.
pub struct SnapshotWriter {
    dir: PathBuf,
    written: u64,
}

impl SnapshotWriter {
    pub fn create(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("create snapshot dir {}", dir.display()))?;
        Ok(Self { dir, written: 0 })
    }

    pub fn write(&mut self, image: &RgbImage, frame_index: u64) -> Result<PathBuf> {
        let path = self.dir.join(format!("frame_{:06}.png", frame_index));
        image
            .save(&path)
            .with_context(|| format!("write snapshot {}", path.display()))?;
        self.written += 1;
        Ok(path)
    }

    pub fn written(&self) -> u64 {
        self.written
    }
}

use anyhow::Result;
use image::imageops::FilterType;
use image::GrayImage;

use crate::decode::backend::BarcodeDecoder;
use crate::decode::candidate::{DecodedCandidate, Point};

/// QR code backend built on `rqrr`.
///
/// Large frames can be downsampled before grid detection; reported corners are
/// scaled back to frame coordinates.
#[derive(Default)]
pub struct QrDecoder {
    /// Longest side to downsample to before detection (0 = never downsample).
    max_dimension: u32,
}

impl QrDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_dimension(mut self, max_dimension: u32) -> Self {
        self.max_dimension = max_dimension;
        self
    }

    fn downsample_factor(&self, width: u32, height: u32) -> f32 {
        let longest = width.max(height);
        if self.max_dimension > 0 && longest > self.max_dimension {
            longest as f32 / self.max_dimension as f32
        } else {
            1.0
        }
    }
}

impl BarcodeDecoder for QrDecoder {
    fn name(&self) -> &'static str {
        "qr"
    }

    fn decode(&mut self, image: &GrayImage) -> Result<Vec<DecodedCandidate>> {
        let factor = self.downsample_factor(image.width(), image.height());
        let gray = if factor > 1.0 {
            let w = ((image.width() as f32 / factor) as u32).max(1);
            let h = ((image.height() as f32 / factor) as u32).max(1);
            image::imageops::resize(image, w, h, FilterType::Nearest)
        } else {
            image.clone()
        };

        let mut prepared = rqrr::PreparedImage::prepare(gray);
        let grids = prepared.detect_grids();

        let mut candidates = Vec::with_capacity(grids.len());
        for grid in grids {
            match grid.decode() {
                Ok((_, content)) => {
                    let polygon = grid
                        .bounds
                        .iter()
                        .map(|p| {
                            Point::new(
                                (p.x as f32 * factor).round() as i32,
                                (p.y as f32 * factor).round() as i32,
                            )
                        })
                        .collect();
                    candidates.push(DecodedCandidate::new(content, polygon));
                }
                Err(err) => log::debug!("qr grid found but not decodable: {}", err),
            }
        }
        Ok(candidates)
    }
}

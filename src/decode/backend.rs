use anyhow::Result;
use image::GrayImage;

use crate::decode::candidate::DecodedCandidate;

/// Barcode decoder backend.
///
/// Backends receive an already-preprocessed single-channel image and return
/// every symbol they could read. An empty result is the common case and is not
/// an error; `Err` is reserved for backend faults.
pub trait BarcodeDecoder: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Locate and decode symbols in the image.
    fn decode(&mut self, image: &GrayImage) -> Result<Vec<DecodedCandidate>>;
}

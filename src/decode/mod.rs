mod backend;
mod candidate;
mod pipeline;
mod qr;

pub use backend::BarcodeDecoder;
pub use candidate::{BoundingBox, DecodedCandidate, Point};
pub use pipeline::{DecodeAttempt, DecodePass, DecodePipeline};
pub use qr::QrDecoder;

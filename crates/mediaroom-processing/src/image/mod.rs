//! Image processing: bounding-box resize and WebP renditions.

pub mod processor;
pub mod resize;

pub use processor::{ImageProcessor, ProcessedImage};
pub use resize::fit_within;

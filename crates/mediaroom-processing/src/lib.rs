//! Mediaroom Media Processing Library
//!
//! Turns a spooled upload into web-ready renditions: bounded WebP images with
//! thumbnail and medium sizes, and bounded H.264 MP4 videos with a poster
//! frame. All external encoders run through the [`Transcoder`] trait.

pub mod classify;
pub mod error;
pub mod image;
pub mod rendition;
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;
pub mod transcoder;
pub mod video;
pub mod workarea;

// Re-export commonly used types
pub use classify::{classify, MediaKind};
pub use error::{ProcessingError, ProcessingResult};
pub use self::image::{fit_within, ImageProcessor, ProcessedImage};
pub use rendition::Rendition;
pub use transcoder::{CommandOutput, FfmpegTranscoder, Program, Transcoder};
pub use video::{ProcessedVideo, VideoProbe, VideoProcessor};
pub use workarea::WorkArea;

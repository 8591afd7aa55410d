//! Video processing: probe, transcode and poster extraction.

pub mod processor;

pub use processor::{ProcessedVideo, VideoProbe, VideoProcessor};

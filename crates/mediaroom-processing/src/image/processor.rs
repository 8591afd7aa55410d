//! Image pipeline: decode, bound, derive thumbnail and medium, encode WebP.

use image::{DynamicImage, ImageFormat};
use mediaroom_core::ProcessorConfig;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::resize::{fit_within, resize_to};
use crate::error::{ProcessingError, ProcessingResult};
use crate::rendition::Rendition;
use crate::transcoder::{Program, Transcoder};
use crate::workarea::WorkArea;

const WEBP_CONTENT_TYPE: &str = "image/webp";

/// Output of [`ImageProcessor::process`]. Files live in the owned work area.
#[derive(Debug)]
pub struct ProcessedImage {
    pub source_width: u32,
    pub source_height: u32,
    pub primary: Rendition,
    pub thumbnail: Option<Rendition>,
    pub medium: Option<Rendition>,
    work: WorkArea,
}

impl ProcessedImage {
    pub fn work_area(&self) -> &WorkArea {
        &self.work
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Primary,
    Thumbnail,
    Medium,
}

impl Target {
    fn stem(&self) -> &'static str {
        match self {
            Target::Primary => "primary",
            Target::Thumbnail => "thumbnail",
            Target::Medium => "medium",
        }
    }
}

/// A resized PNG waiting to be encoded.
struct Intermediate {
    target: Target,
    png: PathBuf,
    width: u32,
    height: u32,
}

pub struct ImageProcessor {
    config: Arc<ProcessorConfig>,
    transcoder: Arc<dyn Transcoder>,
}

impl ImageProcessor {
    pub fn new(config: Arc<ProcessorConfig>, transcoder: Arc<dyn Transcoder>) -> Self {
        Self { config, transcoder }
    }

    /// Derive the web renditions of the image at `source`.
    ///
    /// A failure of the primary rendition fails the call. Thumbnail and medium
    /// failures are logged and leave the slot empty.
    #[tracing::instrument(skip(self, work, cancel), fields(media.kind = "image"))]
    pub async fn process(
        &self,
        work: WorkArea,
        source: &Path,
        cancel: &CancellationToken,
    ) -> ProcessingResult<ProcessedImage> {
        let start = std::time::Instant::now();

        let plan = Plan::new(&self.config);
        let source_path = source.to_path_buf();
        let dir = work.path().to_path_buf();
        let (source_width, source_height, prepared) =
            tokio::task::spawn_blocking(move || prepare(&source_path, &dir, plan))
                .await
                .map_err(|e| ProcessingError::Decode(format!("decode task failed: {e}")))??;

        let mut primary = None;
        let mut thumbnail = None;
        let mut medium = None;

        for (target, prepared) in prepared {
            let encoded = match prepared {
                Ok(intermediate) => self.encode_webp(&work, intermediate, cancel).await,
                Err(e) => Err(e),
            };
            match (target, encoded) {
                (Target::Primary, result) => primary = Some(result?),
                (_, Err(e)) if e.is_cancellation() => return Err(e),
                (_, Err(e)) => {
                    tracing::warn!(
                        error = %e,
                        variant = target.stem(),
                        "Optional image variant failed, skipping"
                    );
                }
                (Target::Thumbnail, Ok(r)) => thumbnail = Some(r),
                (Target::Medium, Ok(r)) => medium = Some(r),
            }
        }

        let primary = primary
            .ok_or_else(|| ProcessingError::Decode("no primary rendition produced".into()))?;

        tracing::info!(
            source_width,
            source_height,
            width = primary.width,
            height = primary.height,
            thumbnail = thumbnail.is_some(),
            medium = medium.is_some(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Image processed"
        );

        Ok(ProcessedImage {
            source_width,
            source_height,
            primary,
            thumbnail,
            medium,
            work,
        })
    }

    async fn encode_webp(
        &self,
        work: &WorkArea,
        intermediate: Intermediate,
        cancel: &CancellationToken,
    ) -> ProcessingResult<Rendition> {
        let output = work.path_for(&format!("{}.webp", intermediate.target.stem()));
        let args = vec![
            "-y".to_string(),
            "-i".to_string(),
            intermediate.png.to_string_lossy().to_string(),
            "-c:v".to_string(),
            "libwebp".to_string(),
            "-quality".to_string(),
            self.config.webp_quality.to_string(),
            output.to_string_lossy().to_string(),
        ];

        self.transcoder
            .execute(Program::Ffmpeg, &args, cancel)
            .await?;

        Rendition::from_file(
            output,
            WEBP_CONTENT_TYPE,
            "webp",
            intermediate.width,
            intermediate.height,
        )
        .await
    }
}

/// Target bounds, copied out of the config for the blocking task.
#[derive(Debug, Clone, Copy)]
struct Plan {
    max: (u32, u32),
    thumbnail: Option<(u32, u32)>,
    medium: (u32, u32),
}

impl Plan {
    fn new(config: &ProcessorConfig) -> Self {
        Self {
            max: (config.max_image_width, config.max_image_height),
            thumbnail: config
                .generate_thumbnail
                .then_some((config.thumbnail_width, config.thumbnail_height)),
            medium: (config.medium_width, config.medium_height),
        }
    }
}

type Prepared = Vec<(Target, ProcessingResult<Intermediate>)>;

/// Decode once and write one PNG intermediate per target.
fn prepare(source: &Path, dir: &Path, plan: Plan) -> ProcessingResult<(u32, u32, Prepared)> {
    let img = decode(source)?;
    let (w, h) = (img.width(), img.height());

    let primary = fit_within(w, h, plan.max.0, plan.max.1);
    let mut targets = vec![(Target::Primary, primary)];
    if let Some((tw, th)) = plan.thumbnail {
        targets.push((Target::Thumbnail, fit_within(w, h, tw, th)));
    }
    if primary.0 > plan.medium.0 || primary.1 > plan.medium.1 {
        targets.push((Target::Medium, fit_within(w, h, plan.medium.0, plan.medium.1)));
    }

    let prepared = targets
        .into_iter()
        .map(|(target, (tw, th))| {
            let png = dir.join(format!("{}.png", target.stem()));
            let result = resize_to(&img, tw, th)
                .save_with_format(&png, ImageFormat::Png)
                .map(|_| Intermediate {
                    target,
                    png,
                    width: tw,
                    height: th,
                })
                .map_err(|e| ProcessingError::Decode(e.to_string()));
            (target, result)
        })
        .collect();

    Ok((w, h, prepared))
}

fn decode(source: &Path) -> ProcessingResult<DynamicImage> {
    image::ImageReader::open(source)?
        .with_guessed_format()?
        .decode()
        .map_err(|e| ProcessingError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::FakeTranscoder;

    fn write_png(work: &WorkArea, w: u32, h: u32) -> PathBuf {
        let path = work.path_for("source.png");
        DynamicImage::new_rgb8(w, h).save(&path).unwrap();
        path
    }

    fn processor(config: ProcessorConfig, transcoder: Arc<FakeTranscoder>) -> ImageProcessor {
        ImageProcessor::new(Arc::new(config), transcoder)
    }

    #[tokio::test]
    async fn test_large_image_gets_all_renditions() {
        let transcoder = Arc::new(FakeTranscoder::new());
        let config = ProcessorConfig {
            max_image_width: 200,
            max_image_height: 200,
            thumbnail_width: 30,
            thumbnail_height: 30,
            medium_width: 120,
            medium_height: 120,
            ..Default::default()
        };
        let work = WorkArea::new().unwrap();
        let source = write_png(&work, 400, 300);

        let out = processor(config, transcoder.clone())
            .process(work, &source, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!((out.source_width, out.source_height), (400, 300));
        assert_eq!((out.primary.width, out.primary.height), (200, 150));
        let thumb = out.thumbnail.as_ref().unwrap();
        assert_eq!((thumb.width, thumb.height), (30, 23));
        let medium = out.medium.as_ref().unwrap();
        assert_eq!((medium.width, medium.height), (120, 90));
        assert_eq!(out.primary.content_type, "image/webp");
        assert!(out.primary.path.exists());

        let calls = transcoder.calls();
        assert_eq!(calls.len(), 3);
        assert!(calls.iter().all(|(p, args)| *p == Program::Ffmpeg
            && args.iter().any(|a| a == "libwebp")));
    }

    #[tokio::test]
    async fn test_small_image_is_not_upscaled_and_skips_medium() {
        let transcoder = Arc::new(FakeTranscoder::new());
        let work = WorkArea::new().unwrap();
        let source = write_png(&work, 200, 100);

        let out = processor(ProcessorConfig::default(), transcoder)
            .process(work, &source, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!((out.primary.width, out.primary.height), (200, 100));
        assert_eq!(out.thumbnail.as_ref().map(|t| t.width), Some(200));
        assert!(out.medium.is_none());
    }

    #[tokio::test]
    async fn test_thumbnail_failure_is_soft() {
        let transcoder = Arc::new(FakeTranscoder::new().fail_on("thumbnail"));
        let work = WorkArea::new().unwrap();
        let source = write_png(&work, 800, 600);

        let out = processor(ProcessorConfig::default(), transcoder)
            .process(work, &source, &CancellationToken::new())
            .await
            .unwrap();

        assert!(out.thumbnail.is_none());
        assert_eq!(out.primary.width, 800);
    }

    #[tokio::test]
    async fn test_primary_failure_is_fatal() {
        let transcoder = Arc::new(FakeTranscoder::new().fail_on("primary"));
        let work = WorkArea::new().unwrap();
        let source = write_png(&work, 800, 600);

        let err = processor(ProcessorConfig::default(), transcoder)
            .process(work, &source, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessingError::CommandFailed { .. }));
    }

    #[tokio::test]
    async fn test_thumbnail_disabled() {
        let transcoder = Arc::new(FakeTranscoder::new());
        let config = ProcessorConfig {
            generate_thumbnail: false,
            ..Default::default()
        };
        let work = WorkArea::new().unwrap();
        let source = write_png(&work, 64, 64);

        let out = processor(config, transcoder)
            .process(work, &source, &CancellationToken::new())
            .await
            .unwrap();
        assert!(out.thumbnail.is_none());
    }

    #[tokio::test]
    async fn test_garbage_input_is_decode_error() {
        let transcoder = Arc::new(FakeTranscoder::new());
        let work = WorkArea::new().unwrap();
        let source = work.path_for("source.png");
        std::fs::write(&source, b"definitely not a png").unwrap();

        let err = processor(ProcessorConfig::default(), transcoder.clone())
            .process(work, &source, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessingError::Decode(_)));
        assert!(transcoder.calls().is_empty());
    }
}

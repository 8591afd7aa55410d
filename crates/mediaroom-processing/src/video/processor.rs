//! Video pipeline: probe, bounded H.264 transcode, poster frame.

use mediaroom_core::ProcessorConfig;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::{ProcessingError, ProcessingResult};
use crate::image::resize::{even, fit_within};
use crate::rendition::Rendition;
use crate::transcoder::{Program, Transcoder};
use crate::workarea::WorkArea;

const MP4_CONTENT_TYPE: &str = "video/mp4";
const JPEG_CONTENT_TYPE: &str = "image/jpeg";
const OUTPUT_NAME: &str = "output.mp4";
const POSTER_NAME: &str = "poster.jpg";

/// What ffprobe reports about the first video stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoProbe {
    pub width: u32,
    pub height: u32,
    pub duration_seconds: Option<f64>,
}

impl VideoProbe {
    /// Parse `ffprobe -of json` output with `stream=width,height,duration` and
    /// `format=duration` entries.
    pub fn from_json(stdout: &[u8]) -> ProcessingResult<Self> {
        let probe_data: serde_json::Value = serde_json::from_slice(stdout)
            .map_err(|e| ProcessingError::Probe(format!("invalid ffprobe output: {e}")))?;

        let stream = probe_data["streams"]
            .get(0)
            .ok_or_else(|| ProcessingError::Probe("no video stream found".into()))?;

        let width = stream["width"]
            .as_u64()
            .filter(|w| *w > 0)
            .ok_or_else(|| ProcessingError::Probe("could not parse width".into()))?;
        let height = stream["height"]
            .as_u64()
            .filter(|h| *h > 0)
            .ok_or_else(|| ProcessingError::Probe("could not parse height".into()))?;

        // Stream duration is missing for some containers (mkv, webm).
        let duration_seconds = parse_duration(&stream["duration"])
            .or_else(|| parse_duration(&probe_data["format"]["duration"]));

        Ok(Self {
            width: width as u32,
            height: height as u32,
            duration_seconds,
        })
    }
}

fn parse_duration(value: &serde_json::Value) -> Option<f64> {
    let d = match value {
        serde_json::Value::String(s) => s.parse::<f64>().ok()?,
        serde_json::Value::Number(n) => n.as_f64()?,
        _ => return None,
    };
    (d.is_finite() && d >= 0.0).then_some(d)
}

/// Output of [`VideoProcessor::process`]. Files live in the owned work area.
#[derive(Debug)]
pub struct ProcessedVideo {
    pub probe: VideoProbe,
    pub primary: Rendition,
    pub poster: Option<Rendition>,
    work: WorkArea,
}

impl ProcessedVideo {
    pub fn work_area(&self) -> &WorkArea {
        &self.work
    }
}

pub struct VideoProcessor {
    config: Arc<ProcessorConfig>,
    transcoder: Arc<dyn Transcoder>,
}

impl VideoProcessor {
    pub fn new(config: Arc<ProcessorConfig>, transcoder: Arc<dyn Transcoder>) -> Self {
        Self { config, transcoder }
    }

    #[tracing::instrument(skip(self, cancel), fields(
        process.executable.name = "ffprobe",
        ffmpeg.operation = "probe"
    ))]
    pub async fn probe(
        &self,
        path: &Path,
        cancel: &CancellationToken,
    ) -> ProcessingResult<VideoProbe> {
        let args = vec![
            "-v".to_string(),
            "error".to_string(),
            "-select_streams".to_string(),
            "v:0".to_string(),
            "-show_entries".to_string(),
            "stream=width,height,duration:format=duration".to_string(),
            "-of".to_string(),
            "json".to_string(),
            path.to_string_lossy().to_string(),
        ];
        let output = self
            .transcoder
            .execute(Program::Ffprobe, &args, cancel)
            .await?;
        let probe = VideoProbe::from_json(&output.stdout)?;

        tracing::debug!(
            width = probe.width,
            height = probe.height,
            duration = ?probe.duration_seconds,
            "Video probe completed"
        );
        Ok(probe)
    }

    /// Transcode the video at `source` to a bounded MP4 and grab a poster frame.
    ///
    /// Probe and transcode failures fail the call; a poster failure is logged
    /// and leaves `poster` empty.
    #[tracing::instrument(skip(self, work, cancel), fields(media.kind = "video"))]
    pub async fn process(
        &self,
        work: WorkArea,
        source: &Path,
        cancel: &CancellationToken,
    ) -> ProcessingResult<ProcessedVideo> {
        let start = std::time::Instant::now();

        let probe = self.probe(source, cancel).await?;
        let primary = self.transcode(&work, source, &probe, cancel).await?;

        let poster = match self.poster(&work, &primary, cancel).await {
            Ok(poster) => Some(poster),
            Err(e) if e.is_cancellation() => return Err(e),
            Err(e) => {
                tracing::warn!(error = %e, "Poster extraction failed, skipping");
                None
            }
        };

        tracing::info!(
            source_width = probe.width,
            source_height = probe.height,
            width = primary.width,
            height = primary.height,
            poster = poster.is_some(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Video processed"
        );

        Ok(ProcessedVideo {
            probe,
            primary,
            poster,
            work,
        })
    }

    /// Output dimensions: inside the configured bounds, even on both sides.
    pub fn output_dimensions(&self, probe: &VideoProbe) -> (u32, u32) {
        let (w, h) = fit_within(
            probe.width,
            probe.height,
            self.config.video_max_width,
            self.config.video_max_height,
        );
        (even(w), even(h))
    }

    #[tracing::instrument(skip_all, fields(
        process.executable.name = "ffmpeg",
        ffmpeg.operation = "transcode"
    ))]
    async fn transcode(
        &self,
        work: &WorkArea,
        source: &Path,
        probe: &VideoProbe,
        cancel: &CancellationToken,
    ) -> ProcessingResult<Rendition> {
        let output = work.path_for(OUTPUT_NAME);
        let scale = format!(
            "scale='min({},iw)':'min({},ih)':force_original_aspect_ratio=decrease,scale=trunc(iw/2)*2:trunc(ih/2)*2",
            self.config.video_max_width, self.config.video_max_height
        );
        let args = vec![
            "-y".to_string(),
            "-i".to_string(),
            source.to_string_lossy().to_string(),
            "-c:v".to_string(),
            self.config.video_codec.clone(),
            "-preset".to_string(),
            self.config.video_preset.clone(),
            "-b:v".to_string(),
            self.config.video_bitrate.clone(),
            "-c:a".to_string(),
            "aac".to_string(),
            "-b:a".to_string(),
            "128k".to_string(),
            "-vf".to_string(),
            scale,
            "-movflags".to_string(),
            "+faststart".to_string(),
            output.to_string_lossy().to_string(),
        ];

        self.transcoder
            .execute(Program::Ffmpeg, &args, cancel)
            .await?;

        let (width, height) = self.output_dimensions(probe);
        Rendition::from_file(output, MP4_CONTENT_TYPE, "mp4", width, height).await
    }

    #[tracing::instrument(skip_all, fields(
        process.executable.name = "ffmpeg",
        ffmpeg.operation = "poster"
    ))]
    async fn poster(
        &self,
        work: &WorkArea,
        video: &Rendition,
        cancel: &CancellationToken,
    ) -> ProcessingResult<Rendition> {
        let output = work.path_for(POSTER_NAME);
        let (width, height) = fit_within(
            video.width,
            video.height,
            self.config.thumbnail_width,
            self.config.thumbnail_height,
        );
        let args = vec![
            "-y".to_string(),
            "-ss".to_string(),
            self.config.poster_time.clone(),
            "-i".to_string(),
            video.path.to_string_lossy().to_string(),
            "-frames:v".to_string(),
            "1".to_string(),
            "-vf".to_string(),
            format!(
                "scale='min({},iw)':'min({},ih)':force_original_aspect_ratio=decrease",
                self.config.thumbnail_width, self.config.thumbnail_height
            ),
            output.to_string_lossy().to_string(),
        ];

        self.transcoder
            .execute(Program::Ffmpeg, &args, cancel)
            .await?;

        // Seeking past the end of a short clip exits 0 with an empty file.
        Rendition::from_file(output, JPEG_CONTENT_TYPE, "jpg", width, height).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::FakeTranscoder;

    fn setup(transcoder: Arc<FakeTranscoder>) -> (VideoProcessor, WorkArea, std::path::PathBuf) {
        let processor = VideoProcessor::new(Arc::new(ProcessorConfig::default()), transcoder);
        let work = WorkArea::new().unwrap();
        let source = work.path_for("source.mov");
        std::fs::write(&source, b"not really a mov").unwrap();
        (processor, work, source)
    }

    #[test]
    fn test_probe_parsing() {
        let json = br#"{"streams":[{"width":1280,"height":720,"duration":"12.500000"}],"format":{"duration":"12.6"}}"#;
        let probe = VideoProbe::from_json(json).unwrap();
        assert_eq!((probe.width, probe.height), (1280, 720));
        assert_eq!(probe.duration_seconds, Some(12.5));

        let json = br#"{"streams":[{"width":640,"height":480}],"format":{"duration":"3.0"}}"#;
        assert_eq!(VideoProbe::from_json(json).unwrap().duration_seconds, Some(3.0));

        assert!(VideoProbe::from_json(br#"{"streams":[]}"#).is_err());
        assert!(VideoProbe::from_json(b"garbage").is_err());
    }

    #[tokio::test]
    async fn test_large_video_is_bounded_with_poster() {
        let transcoder = Arc::new(FakeTranscoder::new().with_probe(3840, 2160, Some(42.0)));
        let (processor, work, source) = setup(transcoder.clone());

        let out = processor
            .process(work, &source, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!((out.primary.width, out.primary.height), (1920, 1080));
        assert_eq!(out.primary.content_type, "video/mp4");
        assert_eq!(out.probe.duration_seconds, Some(42.0));
        let poster = out.poster.as_ref().unwrap();
        assert_eq!((poster.width, poster.height), (300, 169));
        assert_eq!(poster.content_type, "image/jpeg");

        let calls = transcoder.calls();
        assert_eq!(calls[0].0, Program::Ffprobe);
        let transcode = &calls[1].1;
        assert!(transcode.iter().any(|a| a.contains("min(1920,iw)")));
        assert!(transcode.iter().any(|a| a == "+faststart"));
        assert!(calls[2].1.iter().any(|a| a == "00:00:01"));
    }

    #[tokio::test]
    async fn test_small_video_poster_is_not_upscaled() {
        let transcoder = Arc::new(FakeTranscoder::new().with_probe(200, 100, Some(5.0)));
        let (processor, work, source) = setup(transcoder.clone());

        let out = processor
            .process(work, &source, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!((out.primary.width, out.primary.height), (200, 100));
        let poster = out.poster.as_ref().unwrap();
        assert_eq!((poster.width, poster.height), (200, 100));

        let calls = transcoder.calls();
        let poster_args = &calls[2].1;
        let filter = poster_args
            .iter()
            .position(|a| a == "-vf")
            .and_then(|i| poster_args.get(i + 1))
            .unwrap();
        assert_eq!(
            filter,
            "scale='min(300,iw)':'min(300,ih)':force_original_aspect_ratio=decrease"
        );
    }

    #[tokio::test]
    async fn test_odd_dimensions_become_even() {
        let transcoder = Arc::new(FakeTranscoder::new().with_probe(641, 361, None));
        let (processor, work, source) = setup(transcoder);

        let out = processor
            .process(work, &source, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!((out.primary.width, out.primary.height), (640, 360));
    }

    #[tokio::test]
    async fn test_poster_failure_is_soft() {
        let transcoder = Arc::new(FakeTranscoder::new().fail_on(POSTER_NAME));
        let (processor, work, source) = setup(transcoder);

        let out = processor
            .process(work, &source, &CancellationToken::new())
            .await
            .unwrap();
        assert!(out.poster.is_none());
        assert!(out.primary.path.exists());
    }

    #[tokio::test]
    async fn test_empty_poster_is_skipped() {
        let transcoder = Arc::new(FakeTranscoder::new().empty_output_on(POSTER_NAME));
        let (processor, work, source) = setup(transcoder);

        let out = processor
            .process(work, &source, &CancellationToken::new())
            .await
            .unwrap();
        assert!(out.poster.is_none());
    }

    #[tokio::test]
    async fn test_transcode_failure_is_fatal() {
        let transcoder = Arc::new(FakeTranscoder::new().fail_on(OUTPUT_NAME));
        let (processor, work, source) = setup(transcoder);

        let err = processor
            .process(work, &source, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessingError::CommandFailed { program: Program::Ffmpeg, .. }));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let transcoder = Arc::new(FakeTranscoder::new());
        let (processor, work, source) = setup(transcoder);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = processor.process(work, &source, &cancel).await.unwrap_err();
        assert!(err.is_cancellation());
    }
}

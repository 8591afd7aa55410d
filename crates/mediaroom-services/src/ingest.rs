//! Upload ingestion: validate, spool, derive renditions, store, register.
//!
//! The original rendition is mandatory. Optional renditions (thumbnail,
//! medium, poster) are dropped with a warning when they fail. A registry row
//! is only written after every upload it references has succeeded; if the
//! insert fails or the caller cancels, uploaded objects are deleted again.

use mediaroom_core::models::{
    validate_scope, MediaAsset, NewMediaAsset, NewMediaRelation, Variant, VariantKind,
};
use mediaroom_core::{AppError, ProcessorConfig, UploadLimits};
use mediaroom_db::MediaRegistry;
use mediaroom_processing::{
    classify, ImageProcessor, MediaKind, ProcessedImage, ProcessedVideo, Rendition, Transcoder,
    VideoProcessor, WorkArea,
};
use mediaroom_storage::{keys, Storage, UploadReader, UploadResult};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::IntoAppError;

/// Relation to create once the asset is registered.
#[derive(Debug, Clone)]
pub struct IngestLink {
    pub entity_type: String,
    pub entity_id: Uuid,
    pub relation_type: String,
    pub sort_order: i32,
}

pub struct IngestRequest {
    pub reader: UploadReader,
    pub filename: String,
    pub content_type: String,
    /// Declared size, checked before anything is read
    pub size: Option<u64>,
    pub title: Option<String>,
    pub alt_text: Option<String>,
    pub uploaded_by: Option<Uuid>,
    pub link: Option<IngestLink>,
}

enum Processed {
    Image(ProcessedImage),
    Video(ProcessedVideo),
}

impl Processed {
    fn primary(&self) -> &Rendition {
        match self {
            Processed::Image(image) => &image.primary,
            Processed::Video(video) => &video.primary,
        }
    }

    fn optional(&self) -> Vec<(VariantKind, &Rendition)> {
        match self {
            Processed::Image(image) => [
                (VariantKind::Thumbnail, image.thumbnail.as_ref()),
                (VariantKind::Medium, image.medium.as_ref()),
            ]
            .into_iter()
            .filter_map(|(kind, r)| r.map(|r| (kind, r)))
            .collect(),
            Processed::Video(video) => video
                .poster
                .iter()
                .map(|r| (VariantKind::VideoPoster, r))
                .collect(),
        }
    }

    fn duration_seconds(&self) -> Option<f64> {
        match self {
            Processed::Image(_) => None,
            Processed::Video(video) => video.probe.duration_seconds,
        }
    }
}

fn non_empty(text: Option<String>) -> Option<String> {
    text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())
}

fn to_variant(kind: VariantKind, rendition: &Rendition, uploaded: &UploadResult) -> Variant {
    Variant {
        kind,
        key: uploaded.key.clone(),
        url: uploaded.url.clone(),
        content_type: rendition.content_type.to_string(),
        width: Some(rendition.width as i32),
        height: Some(rendition.height as i32),
        size_bytes: uploaded.size as i64,
    }
}

/// Ingestion orchestrator
pub struct VariantGenerator {
    storage: Arc<dyn Storage>,
    registry: Arc<dyn MediaRegistry>,
    images: ImageProcessor,
    videos: VideoProcessor,
    limits: UploadLimits,
    transcode_slots: Arc<Semaphore>,
}

impl VariantGenerator {
    pub fn new(
        storage: Arc<dyn Storage>,
        registry: Arc<dyn MediaRegistry>,
        transcoder: Arc<dyn Transcoder>,
        config: Arc<ProcessorConfig>,
        limits: UploadLimits,
    ) -> Self {
        let slots = config.max_concurrent_transcodes.max(1);
        Self {
            storage,
            registry,
            images: ImageProcessor::new(config.clone(), transcoder.clone()),
            videos: VideoProcessor::new(config, transcoder),
            limits,
            transcode_slots: Arc::new(Semaphore::new(slots)),
        }
    }

    fn limit_for(&self, kind: MediaKind) -> u64 {
        match kind {
            MediaKind::Image => self.limits.max_image_size_bytes,
            MediaKind::Video => self.limits.max_video_size_bytes,
            MediaKind::Unsupported => 0,
        }
    }

    /// Checks that need no I/O. Nothing has been read or written when this fails.
    fn validate(
        &self,
        filename: &str,
        content_type: &str,
        size: Option<u64>,
        link: Option<&IngestLink>,
    ) -> Result<MediaKind, AppError> {
        if filename.trim().is_empty() {
            return Err(AppError::Validation("Filename is required".to_string()));
        }
        if content_type.trim().is_empty() {
            return Err(AppError::Validation("Content type is required".to_string()));
        }

        let kind = classify(filename, content_type);
        if kind == MediaKind::Unsupported {
            return Err(AppError::UnsupportedMedia(format!(
                "{} ({}) is neither an image nor a video",
                filename, content_type
            )));
        }

        let limit = self.limit_for(kind);
        if let Some(size) = size {
            if size > limit {
                return Err(AppError::PayloadTooLarge(format!(
                    "{} bytes exceeds the {} byte limit for {} uploads",
                    size, limit, kind
                )));
            }
        }

        if let Some(link) = link {
            validate_scope(&link.entity_type, &link.relation_type)?;
        }

        Ok(kind)
    }

    /// Ingest one upload and return the registered asset.
    #[tracing::instrument(skip(self, request, cancel), fields(filename = %request.filename, content_type = %request.content_type))]
    pub async fn ingest(
        &self,
        request: IngestRequest,
        cancel: &CancellationToken,
    ) -> Result<MediaAsset, AppError> {
        let start = Instant::now();
        let IngestRequest {
            mut reader,
            filename,
            content_type,
            size,
            title,
            alt_text,
            uploaded_by,
            link,
        } = request;

        let kind = self.validate(&filename, &content_type, size, link.as_ref())?;
        if cancel.is_cancelled() {
            return Err(AppError::Cancelled);
        }

        let work = WorkArea::new().map_err(IntoAppError::into_app_error)?;
        let spool_name = match keys::extension(&filename) {
            Some(ext) => format!("source.{}", ext),
            None => "source".to_string(),
        };
        let (source, source_size) = work
            .spool(&mut reader, &spool_name, self.limit_for(kind))
            .await
            .map_err(IntoAppError::into_app_error)?;
        if source_size == 0 {
            return Err(AppError::Validation("Uploaded file is empty".to_string()));
        }

        let processed = self.process(kind, work, &source, cancel).await?;

        let mut uploaded = Vec::new();
        let draft = match self.store(&processed, &mut uploaded, cancel).await {
            Ok(variants) => NewMediaAsset {
                original_filename: filename,
                mime_type: processed.primary().content_type.to_string(),
                size_bytes: source_size as i64,
                storage_backend: self.storage.backend_type(),
                width: Some(processed.primary().width as i32),
                height: Some(processed.primary().height as i32),
                duration_seconds: processed.duration_seconds(),
                title: non_empty(title),
                alt_text: non_empty(alt_text),
                uploaded_by,
                variants,
            },
            Err(e) => {
                self.compensate(&uploaded).await;
                return Err(e);
            }
        };

        let asset = match self.registry.create_media(draft).await {
            Ok(asset) => asset,
            Err(e) => {
                tracing::error!(error = %e, "Failed to register media, removing uploaded objects");
                self.compensate(&uploaded).await;
                return Err(e);
            }
        };
        drop(processed);

        if let Some(link) = link {
            self.link(&asset, link).await;
        }

        tracing::info!(
            media_id = %asset.id,
            kind = %kind,
            size_bytes = source_size,
            variants = asset.variants.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Media ingested"
        );

        Ok(asset)
    }

    async fn process(
        &self,
        kind: MediaKind,
        work: WorkArea,
        source: &Path,
        cancel: &CancellationToken,
    ) -> Result<Processed, AppError> {
        let processed = match kind {
            MediaKind::Image => self
                .images
                .process(work, source, cancel)
                .await
                .map(Processed::Image),
            MediaKind::Video => {
                let _permit = tokio::select! {
                    permit = self.transcode_slots.acquire() => permit
                        .map_err(|_| AppError::Internal("Transcode semaphore closed".to_string()))?,
                    _ = cancel.cancelled() => return Err(AppError::Cancelled),
                };
                self.videos
                    .process(work, source, cancel)
                    .await
                    .map(Processed::Video)
            }
            MediaKind::Unsupported => {
                return Err(AppError::UnsupportedMedia(kind.to_string()));
            }
        };

        processed.map_err(|e| {
            tracing::error!(error = %e, kind = %kind, "Media processing failed");
            e.into_app_error()
        })
    }

    /// Upload every rendition. Keys are pushed to `uploaded` as they land so
    /// the caller can remove them if anything later fails.
    async fn store(
        &self,
        processed: &Processed,
        uploaded: &mut Vec<String>,
        cancel: &CancellationToken,
    ) -> Result<Vec<Variant>, AppError> {
        let primary = processed.primary();
        let original = self
            .upload_rendition(primary, VariantKind::Original, cancel)
            .await
            .inspect_err(|e| {
                if !matches!(e, AppError::Cancelled) {
                    tracing::error!(error = %e, "Failed to upload original rendition");
                }
            })?;
        uploaded.push(original.key.clone());
        let mut variants = vec![to_variant(VariantKind::Original, primary, &original)];

        for (kind, rendition) in processed.optional() {
            match self.upload_rendition(rendition, kind, cancel).await {
                Ok(result) => {
                    uploaded.push(result.key.clone());
                    variants.push(to_variant(kind, rendition, &result));
                }
                Err(AppError::Cancelled) => return Err(AppError::Cancelled),
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        variant = %kind,
                        "Optional variant upload failed, skipping"
                    );
                }
            }
        }

        if cancel.is_cancelled() {
            return Err(AppError::Cancelled);
        }
        Ok(variants)
    }

    /// Upload one rendition, abandoning the transfer as soon as `cancel` fires.
    async fn upload_rendition(
        &self,
        rendition: &Rendition,
        kind: VariantKind,
        cancel: &CancellationToken,
    ) -> Result<UploadResult, AppError> {
        let upload = async {
            let file = tokio::fs::File::open(&rendition.path).await?;
            self.storage
                .upload(
                    Box::pin(file),
                    &rendition.file_name(kind.as_str()),
                    rendition.content_type,
                    Some(rendition.size_bytes),
                    true,
                )
                .await
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!(variant = %kind, "Upload abandoned on cancellation");
                Err(AppError::Cancelled)
            }
            result = upload => result.map_err(IntoAppError::into_app_error),
        }
    }

    async fn compensate(&self, keys: &[String]) {
        for key in keys {
            if let Err(e) = self.storage.delete(key).await {
                tracing::warn!(
                    error = %e,
                    storage_key = %key,
                    "Failed to remove uploaded object after ingestion failure"
                );
            }
        }
    }

    async fn link(&self, asset: &MediaAsset, link: IngestLink) {
        let relation = NewMediaRelation {
            media_id: asset.id,
            entity_type: link.entity_type,
            entity_id: link.entity_id,
            relation_type: link.relation_type,
            sort_order: link.sort_order,
        };
        if let Err(e) = self.registry.link_media(relation).await {
            tracing::warn!(
                error = %e,
                media_id = %asset.id,
                "Failed to link ingested media, asset kept"
            );
        }
    }
}

use crate::keys;
use crate::traits::{
    classify_io_error, sniff_dimensions, FailureKind, Storage, StorageError, StorageResult,
    UploadReader, UploadResult,
};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::path::Path;
use object_store::Error as ObjectStoreError;
use object_store::{
    Attribute, Attributes, ClientOptions, ObjectStore, ObjectStoreExt, PutMultipartOptions,
    PutOptions, PutPayload, Result as ObjectResult, WriteMultipart,
};
use std::time::Duration;
use tokio::io::AsyncReadExt;

/// Objects are written world-readable so the generated URLs resolve without signing.
const ACL_HEADER: &str = "x-amz-acl";
const PUBLIC_READ: &str = "public-read";

/// How many leading bytes are handed to the image header sniffer.
const SNIFF_LEN: usize = 64 * 1024;

/// S3 rejects non-final parts smaller than 5 MiB.
const PART_SIZE: usize = 5 * 1024 * 1024;
const READ_CHUNK: usize = 64 * 1024;
const MAX_PARTS_IN_FLIGHT: usize = 4;

/// S3 storage implementation
#[derive(Clone)]
pub struct S3Storage {
    store: AmazonS3,
    bucket: String,
    region: String,
    endpoint_url: Option<String>, // Custom endpoint for S3-compatible providers
    public_url: Option<String>,
}

impl S3Storage {
    /// Create a new S3Storage instance
    ///
    /// # Arguments
    /// * `bucket` - S3 bucket name
    /// * `region` - AWS region (or region identifier for S3-compatible providers)
    /// * `endpoint_url` - Optional custom endpoint URL for S3-compatible providers
    ///   (e.g., "http://localhost:9000" for MinIO)
    /// * `public_url` - Optional CDN base URL used when building object URLs
    /// * `request_timeout` - Per-request deadline for the HTTP client
    pub async fn new(
        bucket: String,
        region: String,
        endpoint_url: Option<String>,
        public_url: Option<String>,
        request_timeout: Duration,
    ) -> StorageResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static(ACL_HEADER),
            HeaderValue::from_static(PUBLIC_READ),
        );
        let client_options = ClientOptions::new()
            .with_timeout(request_timeout)
            .with_default_headers(headers);

        // Credentials come from the standard AWS environment variables.
        let mut builder = AmazonS3Builder::from_env()
            .with_region(region.clone())
            .with_bucket_name(bucket.clone())
            .with_client_options(client_options);

        if let Some(ref endpoint) = endpoint_url {
            let allow_http = endpoint.starts_with("http://");
            builder = builder
                .with_endpoint(endpoint.clone())
                .with_allow_http(allow_http);
        }

        let store = builder
            .build()
            .map_err(|e| StorageError::ConfigError(e.to_string()))?;

        tracing::info!(
            bucket = %bucket,
            region = %region,
            endpoint = ?endpoint_url,
            "S3 storage initialized"
        );

        Ok(S3Storage {
            store,
            bucket,
            region,
            endpoint_url,
            public_url,
        })
    }
}

/// Public URL for an S3 object.
///
/// Priority: explicit public (CDN) URL, then path-style URL on a custom
/// endpoint, then the virtual-hosted AWS URL.
pub(crate) fn object_url(
    public_url: Option<&str>,
    endpoint_url: Option<&str>,
    bucket: &str,
    region: &str,
    key: &str,
) -> String {
    if let Some(public) = public_url {
        format!("{}/{}", public.trim_end_matches('/'), key)
    } else if let Some(endpoint) = endpoint_url {
        format!("{}/{}/{}", endpoint.trim_end_matches('/'), bucket, key)
    } else {
        format!("https://{}.s3.{}.amazonaws.com/{}", bucket, region, key)
    }
}

/// Map an object store failure onto retry semantics.
pub(crate) fn classify_object_error(err: &ObjectStoreError) -> FailureKind {
    match err {
        // Transport errors, timeouts and 5xx responses surface as Generic.
        ObjectStoreError::Generic { .. } | ObjectStoreError::JoinError { .. } => {
            FailureKind::Transient
        }
        ObjectStoreError::NotFound { .. }
        | ObjectStoreError::PermissionDenied { .. }
        | ObjectStoreError::Unauthenticated { .. }
        | ObjectStoreError::UnknownConfigurationKey { .. }
        | ObjectStoreError::InvalidPath { .. } => FailureKind::Permanent,
        _ => FailureKind::Permanent,
    }
}

/// Result of [`put_streaming`].
pub(crate) struct Streamed {
    pub written: u64,
    /// Leading bytes of the object, at most `SNIFF_LEN`.
    pub head: Bytes,
}

fn read_error(key: &str, err: std::io::Error) -> StorageError {
    StorageError::upload(
        classify_io_error(&err),
        format!("Failed to read upload stream for {}", key),
        err,
    )
}

fn put_error(key: &str, err: ObjectStoreError) -> StorageError {
    StorageError::upload(classify_object_error(&err), format!("PUT {} failed", key), err)
}

async fn abort_quietly(writer: WriteMultipart, key: &str) {
    if let Err(e) = writer.abort().await {
        tracing::warn!(error = %e, key = %key, "Failed to abort multipart upload");
    }
}

/// Stream `reader` into `location`.
///
/// Bodies that end inside the sniff window go out as one PUT. Anything larger
/// becomes a multipart upload of `part_size` parts, so at most a few parts are
/// held in memory at once. A failed read aborts the multipart upload.
pub(crate) async fn put_streaming(
    store: &dyn ObjectStore,
    location: &Path,
    reader: &mut UploadReader,
    attributes: Attributes,
    part_size: usize,
) -> StorageResult<Streamed> {
    let key = location.as_ref();

    let mut head = Vec::with_capacity(SNIFF_LEN);
    (&mut *reader)
        .take(SNIFF_LEN as u64)
        .read_to_end(&mut head)
        .await
        .map_err(|e| read_error(key, e))?;
    let head = Bytes::from(head);

    let mut chunk = vec![0u8; READ_CHUNK];
    let n = reader.read(&mut chunk).await.map_err(|e| read_error(key, e))?;
    if n == 0 {
        let opts = PutOptions {
            attributes,
            ..Default::default()
        };
        store
            .put_opts(location, PutPayload::from(head.clone()), opts)
            .await
            .map_err(|e| put_error(key, e))?;
        return Ok(Streamed {
            written: head.len() as u64,
            head,
        });
    }

    let opts = PutMultipartOptions {
        attributes,
        ..Default::default()
    };
    let upload = store
        .put_multipart_opts(location, opts)
        .await
        .map_err(|e| put_error(key, e))?;
    let mut writer = WriteMultipart::new_with_chunk_size(upload, part_size);
    writer.put(head.clone());
    writer.write(&chunk[..n]);
    let mut written = (head.len() + n) as u64;

    loop {
        let n = match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                abort_quietly(writer, key).await;
                return Err(read_error(key, e));
            }
        };
        if let Err(e) = writer.wait_for_capacity(MAX_PARTS_IN_FLIGHT).await {
            abort_quietly(writer, key).await;
            return Err(put_error(key, e));
        }
        writer.write(&chunk[..n]);
        written += n as u64;
    }

    writer.finish().await.map_err(|e| put_error(key, e))?;
    Ok(Streamed { written, head })
}

#[async_trait]
impl Storage for S3Storage {
    async fn upload(
        &self,
        mut reader: UploadReader,
        filename: &str,
        content_type: &str,
        size: Option<u64>,
        generate_unique_name: bool,
    ) -> StorageResult<UploadResult> {
        let stored_name = keys::stored_name(filename, generate_unique_name);
        let key = keys::storage_key(&stored_name);
        keys::validate_key(&key)?;

        let start = std::time::Instant::now();

        let mut attributes = Attributes::new();
        attributes.insert(Attribute::ContentType, content_type.to_string().into());
        let location = Path::from(key.clone());

        let streamed = put_streaming(&self.store, &location, &mut reader, attributes, PART_SIZE)
            .await
            .inspect_err(|e| {
                tracing::error!(
                    error = %e,
                    bucket = %self.bucket,
                    key = %key,
                    declared_size = ?size,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 upload failed"
                );
            })?;
        let written = streamed.written;
        let (width, height) = sniff_dimensions(content_type, &streamed.head);

        let url = self.url(&key);

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            size_bytes = written,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 upload successful"
        );

        Ok(UploadResult {
            stored_name,
            key,
            url,
            size: written,
            width,
            height,
        })
    }

    async fn delete(&self, storage_key: &str) -> StorageResult<()> {
        keys::validate_key(storage_key)?;
        let start = std::time::Instant::now();
        let location = Path::from(storage_key.to_string());

        let result: ObjectResult<_> = self.store.delete(&location).await;

        match result {
            Ok(()) => {}
            Err(ObjectStoreError::NotFound { .. }) => {
                tracing::debug!(key = %storage_key, "Delete of missing S3 object ignored");
                return Ok(());
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    bucket = %self.bucket,
                    key = %storage_key,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 delete failed"
                );
                return Err(StorageError::delete(
                    classify_object_error(&e),
                    format!("DELETE {} failed", storage_key),
                    e,
                ));
            }
        }

        tracing::info!(
            bucket = %self.bucket,
            key = %storage_key,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 delete successful"
        );

        Ok(())
    }

    fn url(&self, storage_key: &str) -> String {
        object_url(
            self.public_url.as_deref(),
            self.endpoint_url.as_deref(),
            &self.bucket,
            &self.region,
            storage_key,
        )
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::S3
    }
}

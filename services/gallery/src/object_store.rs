use crate::config::StorageConfig;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Builder as S3ConfigBuilder;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use bytes::Bytes;
use thiserror::Error;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Errors raised while writing photo bytes to object storage
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Failed to store object {path}: {message}")]
    Store { path: String, message: String },

    #[error("Refusing to store an empty file: {0}")]
    EmptyFile(String),
}

/// Object storage boundary
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store bytes under `path` and return their public URL
    async fn store(&self, path: &str, bytes: Bytes, content_type: &str) -> Result<String, UploadError>;
}

/// S3-backed object store serving photos from a public base URL
pub struct S3ObjectStore {
    client: S3Client,
    bucket: String,
    public_base_url: String,
}

impl S3ObjectStore {
    /// Create a new S3 object store
    pub async fn new(config: &StorageConfig) -> Self {
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()))
            .load()
            .await;

        let mut s3_config_builder = S3ConfigBuilder::from(&aws_config);

        // Configure custom endpoint for MinIO/LocalStack
        if let Some(ref endpoint_url) = config.endpoint_url {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint_url);
        }

        // Force path-style access for MinIO compatibility
        if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        let client = S3Client::from_conf(s3_config_builder.build());

        info!(
            bucket = %config.bucket,
            region = %config.region,
            "S3 object store initialized"
        );

        Self {
            client,
            bucket: config.bucket.clone(),
            public_base_url: config.public_base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Public URL an object is served from
    pub fn public_url(&self, path: &str) -> String {
        public_url(&self.public_base_url, path)
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    #[instrument(skip(self, bytes), fields(size_bytes = bytes.len()))]
    async fn store(&self, path: &str, bytes: Bytes, content_type: &str) -> Result<String, UploadError> {
        if bytes.is_empty() {
            return Err(UploadError::EmptyFile(path.to_string()));
        }

        debug!(path = %path, "Uploading photo to S3");

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(path)
            .body(ByteStream::from(bytes))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| UploadError::Store {
                path: path.to_string(),
                message: e.to_string(),
            })?;

        metrics::counter!("gallery.objects.stored").increment(1);

        Ok(self.public_url(path))
    }
}

fn public_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path)
}

/// Storage path for an uploaded file
/// Format: {user_id}/{random}.{ext}
///
/// The random name avoids collisions between uploads of equally named files;
/// the extension is kept from the original file name.
pub fn object_path(user_id: Uuid, file_name: &str) -> String {
    format!("{}/{}.{}", user_id, Uuid::new_v4(), file_extension(file_name))
}

/// Lower-cased, sanitized extension of a file name, `bin` when it has none
pub fn file_extension(file_name: &str) -> String {
    let ext = match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => ext,
        _ => return "bin".to_string(),
    };
    sanitize_path_component(&ext.to_lowercase())
}

/// Sanitize a path component to prevent path traversal
fn sanitize_path_component(component: &str) -> String {
    component
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' => c,
            _ => '_',
        })
        .collect()
}

/// Get content type for an image extension
pub fn content_type_for(ext: &str) -> &'static str {
    match ext.to_lowercase().as_str() {
        "jpeg" | "jpg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "heic" => "image/heic",
        "avif" => "image/avif",
        "bmp" => "image/bmp",
        _ => "application/octet-stream",
    }
}

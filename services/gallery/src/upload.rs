//! Multi-file photo upload.
//!
//! Every file is stored and then recorded on its own; there is no
//! transaction spanning a batch, so a failed batch can leave some files
//! recorded.

use crate::catalog::{ImageRepository, InsertError};
use crate::config::UploadPolicy;
use crate::models::{ImageId, NewImage};
use crate::object_store::{content_type_for, file_extension, object_path, ObjectStore, UploadError};
use crate::session::Session;
use bytes::Bytes;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

/// Why a single file of a batch failed
#[derive(Error, Debug)]
pub enum FileUploadError {
    #[error(transparent)]
    Store(#[from] UploadError),

    #[error(transparent)]
    Insert(#[from] InsertError),
}

/// Aggregate failure of a multi-file upload
#[derive(Error, Debug)]
pub enum BatchUploadError {
    #[error("A location is required")]
    MissingLocation,

    #[error("No image files to upload")]
    NoFiles,

    #[error("{failed} of {total} files failed to upload")]
    Failed {
        failed: usize,
        total: usize,
        #[source]
        first: FileUploadError,
    },

    #[error("Upload of {total} files aborted")]
    Aborted {
        total: usize,
        #[source]
        source: FileUploadError,
    },
}

/// One file picked for upload
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

impl UploadFile {
    /// Declared content type, or one inferred from the extension
    fn resolved_content_type(&self) -> String {
        match self.content_type.as_deref().map(str::trim) {
            Some(ct) if !ct.is_empty() => ct.to_lowercase(),
            _ => content_type_for(&file_extension(&self.file_name)).to_string(),
        }
    }
}

/// Result of a successful upload
#[derive(Debug, Clone, PartialEq)]
pub struct UploadOutcome {
    /// Records created, in completion order
    pub images: Vec<ImageId>,
    /// Files dropped because they were not images
    pub skipped: usize,
}

/// Stores files and records them in the catalog
pub struct Uploader {
    objects: Arc<dyn ObjectStore>,
    images: Arc<dyn ImageRepository>,
    policy: UploadPolicy,
    concurrency: usize,
}

impl Uploader {
    pub fn new(
        objects: Arc<dyn ObjectStore>,
        images: Arc<dyn ImageRepository>,
        policy: UploadPolicy,
        concurrency: usize,
    ) -> Self {
        Self {
            objects,
            images,
            policy,
            concurrency: concurrency.max(1),
        }
    }

    /// Upload a batch of files tagged with one location
    #[instrument(skip(self, session, files), fields(user_id = %session.user_id, files = files.len()))]
    pub async fn upload(
        &self,
        session: &Session,
        files: Vec<UploadFile>,
        location: &str,
    ) -> Result<UploadOutcome, BatchUploadError> {
        let location = location.trim();
        if location.is_empty() {
            return Err(BatchUploadError::MissingLocation);
        }

        let submitted = files.len();
        let files: Vec<(UploadFile, String)> = files
            .into_iter()
            .filter_map(|file| {
                let content_type = file.resolved_content_type();
                if content_type.starts_with("image/") {
                    Some((file, content_type))
                } else {
                    debug!(file_name = %file.file_name, content_type = %content_type, "Skipping non-image file");
                    None
                }
            })
            .collect();
        let skipped = submitted - files.len();
        let total = files.len();

        if total == 0 {
            return Err(BatchUploadError::NoFiles);
        }

        let uploads = stream::iter(files)
            .map(|(file, content_type)| self.upload_one(session, file, content_type, location))
            .buffer_unordered(self.concurrency);

        let images = match self.policy {
            UploadPolicy::WaitForAll => {
                let results: Vec<Result<ImageId, FileUploadError>> = uploads.collect().await;
                let mut images = Vec::with_capacity(total);
                let mut failures = Vec::new();
                for result in results {
                    match result {
                        Ok(id) => images.push(id),
                        Err(e) => failures.push(e),
                    }
                }
                if let Some(first) = failures.into_iter().next() {
                    let failed = total - images.len();
                    error!(failed, total, error = %first, "Upload batch failed");
                    metrics::counter!("gallery.uploads.failed").increment(failed as u64);
                    return Err(BatchUploadError::Failed { failed, total, first });
                }
                images
            }
            UploadPolicy::AbortOnFirst => {
                // Dropping the stream on the first error cancels files still in flight
                uploads.try_collect::<Vec<ImageId>>().await.map_err(|source| {
                    error!(total, error = %source, "Upload batch aborted");
                    metrics::counter!("gallery.uploads.failed").increment(1);
                    BatchUploadError::Aborted { total, source }
                })?
            }
        };

        info!(uploaded = images.len(), skipped, "Upload batch completed");
        metrics::counter!("gallery.uploads.completed").increment(images.len() as u64);

        Ok(UploadOutcome { images, skipped })
    }

    async fn upload_one(
        &self,
        session: &Session,
        file: UploadFile,
        content_type: String,
        location: &str,
    ) -> Result<ImageId, FileUploadError> {
        let path = object_path(session.user_id, &file.file_name);

        let url = self
            .objects
            .store(&path, file.bytes, &content_type)
            .await
            .map_err(|e| {
                warn!(file_name = %file.file_name, error = %e, "Failed to store file");
                e
            })?;

        let id = self
            .images
            .insert(
                session,
                NewImage {
                    url,
                    location: location.to_string(),
                },
            )
            .await
            .map_err(|e| {
                warn!(file_name = %file.file_name, error = %e, "Failed to record file");
                e
            })?;

        Ok(id)
    }
}

//! Bulk export of images into a single zip archive.
//!
//! Export is all-or-nothing: every URL is fetched concurrently and the first
//! failure aborts the whole export without producing an archive.

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::try_join_all;
use reqwest::Client;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Archive name when exporting a selection
pub const SELECTED_ARCHIVE_NAME: &str = "selected-images.zip";

/// Archive name when exporting everything
pub const ALL_ARCHIVE_NAME: &str = "all-images.zip";

/// Errors raised while building an export
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Nothing to export")]
    Empty,

    #[error("Cannot export {count} images at once (limit {max})")]
    TooMany { count: usize, max: usize },

    #[error("Failed to fetch {url}: {message}")]
    Fetch { url: String, message: String },

    #[error("Fetching {url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("Failed to build archive: {0}")]
    Archive(String),

    #[error("Failed to save archive: {0}")]
    Save(#[from] std::io::Error),
}

impl From<zip::result::ZipError> for ExportError {
    fn from(e: zip::result::ZipError) -> Self {
        ExportError::Archive(e.to_string())
    }
}

/// Raw image bytes with their declared type
#[derive(Debug, Clone)]
pub struct FetchedImage {
    pub bytes: Bytes,
    pub content_type: Option<String>,
}

/// Source of image bytes
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedImage, ExportError>;
}

/// Fetches images over HTTP
pub struct HttpImageFetcher {
    client: Client,
}

impl HttpImageFetcher {
    pub fn new(timeout: Duration) -> Result<Self, ExportError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ExportError::Fetch {
                url: String::new(),
                message: e.to_string(),
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedImage, ExportError> {
        let fetch_error = |e: reqwest::Error| ExportError::Fetch {
            url: url.to_string(),
            message: e.to_string(),
        };

        let response = self.client.get(url).send().await.map_err(fetch_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExportError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().await.map_err(fetch_error)?;

        Ok(FetchedImage { bytes, content_type })
    }
}

/// Finished archive ready to be handed to the user
#[derive(Debug, Clone)]
pub struct ExportArchive {
    pub file_name: &'static str,
    pub bytes: Bytes,
    pub entries: usize,
}

impl ExportArchive {
    /// Write the archive into `dir`, replacing any file of the same name.
    ///
    /// Bytes go to a temporary file first; only a complete archive is renamed
    /// into place.
    pub async fn save_into(&self, dir: &Path) -> Result<PathBuf, ExportError> {
        let target = dir.join(self.file_name);
        let partial = dir.join(format!(".{}.{}.part", self.file_name, Uuid::new_v4()));

        if let Err(e) = tokio::fs::write(&partial, &self.bytes).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e.into());
        }
        tokio::fs::rename(&partial, &target).await?;

        info!(path = %target.display(), size_bytes = self.bytes.len(), "Archive saved");
        Ok(target)
    }
}

/// Name of the archive for a selection or a full export
pub fn archive_name(selected_only: bool) -> &'static str {
    if selected_only {
        SELECTED_ARCHIVE_NAME
    } else {
        ALL_ARCHIVE_NAME
    }
}

/// Entry name for the image at 1-based `position`, e.g. `image-3.png`
pub fn entry_name(position: usize, content_type: Option<&str>) -> String {
    let subtype = content_type
        .and_then(|ct| ct.split(';').next())
        .and_then(|mime| mime.split_once('/'))
        .map(|(_, subtype)| subtype.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "bin".to_string());

    format!("image-{}.{}", position, subtype)
}

/// Pack named entries into an in-memory zip
pub fn build_archive(entries: &[(String, Bytes)]) -> Result<Vec<u8>, ExportError> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    // Photos are already compressed
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);

    for (name, bytes) in entries {
        writer.start_file(name.as_str(), options)?;
        writer.write_all(bytes)?;
    }

    Ok(writer.finish()?.into_inner())
}

/// Builds zip exports from image URLs
pub struct Exporter {
    fetcher: Arc<dyn ImageFetcher>,
    max_items: usize,
}

impl Exporter {
    pub fn new(fetcher: Arc<dyn ImageFetcher>, max_items: usize) -> Self {
        Self { fetcher, max_items }
    }

    /// Fetch every URL and pack them into one archive
    #[instrument(skip(self, urls), fields(count = urls.len()))]
    pub async fn export(&self, urls: &[String], selected_only: bool) -> Result<ExportArchive, ExportError> {
        if urls.is_empty() {
            return Err(ExportError::Empty);
        }
        if urls.len() > self.max_items {
            return Err(ExportError::TooMany {
                count: urls.len(),
                max: self.max_items,
            });
        }

        let fetches = urls.iter().enumerate().map(|(i, url)| {
            let fetcher = self.fetcher.clone();
            async move {
                let image = fetcher.fetch(url).await?;
                let name = entry_name(i + 1, image.content_type.as_deref());
                debug!(url = %url, entry = %name, size_bytes = image.bytes.len(), "Fetched export item");
                Ok::<_, ExportError>((name, image.bytes))
            }
        });

        let entries = try_join_all(fetches).await.map_err(|e| {
            error!(error = %e, "Export aborted");
            metrics::counter!("gallery.exports.failed").increment(1);
            e
        })?;

        let count = entries.len();
        let bytes = tokio::task::spawn_blocking(move || build_archive(&entries))
            .await
            .map_err(|e| ExportError::Archive(e.to_string()))??;

        let archive = ExportArchive {
            file_name: archive_name(selected_only),
            bytes: Bytes::from(bytes),
            entries: count,
        };

        info!(
            file_name = archive.file_name,
            entries = count,
            size_bytes = archive.bytes.len(),
            "Export archive built"
        );
        metrics::counter!("gallery.exports.completed").increment(1);

        Ok(archive)
    }
}

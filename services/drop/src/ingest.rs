//! Upload ingestion.
//!
//! Every upload gets a fresh v4 UUID as its on-disk name; only the extension of the
//! client-supplied filename survives. Content is streamed into the staging area and
//! renamed into the root once fully written and synced, so a returned URL always
//! points at a complete object.

use crate::error::{DropError, Result};
use crate::storage::StorageDirectory;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::Serialize;
use std::convert::Infallible;
use std::path::Path;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Extension given to text snippets
pub const TEXT_EXTENSION: &str = ".txt";

/// Longest extension (without the dot) kept from a client filename
const MAX_EXTENSION_LEN: usize = 16;

/// A persisted upload
#[derive(Debug, Clone, Serialize)]
pub struct StoredObject {
    /// Random identifier, also the stem of the file name
    pub id: Uuid,
    /// Extension including the leading dot, or empty
    pub extension: String,
    /// `<id><extension>`, the single path segment naming the object
    pub file_name: String,
    /// Public retrieval path, `<prefix>/<file_name>`
    pub url: String,
    /// Number of bytes written
    pub size: u64,
}

/// Writes uploaded files and text snippets into the storage root
#[derive(Debug, Clone)]
pub struct UploadIngestor {
    storage: StorageDirectory,
    public_prefix: String,
}

impl UploadIngestor {
    /// Create an ingestor publishing objects under `public_prefix`
    pub fn new(storage: StorageDirectory, public_prefix: impl Into<String>) -> Self {
        let prefix = public_prefix.into();
        let prefix = format!("/{}", prefix.trim_matches('/'));
        Self {
            storage,
            public_prefix: prefix,
        }
    }

    /// Normalized URL prefix, e.g. `/uploads`
    pub fn public_prefix(&self) -> &str {
        &self.public_prefix
    }

    /// Underlying storage directory
    pub fn storage(&self) -> &StorageDirectory {
        &self.storage
    }

    /// Store a multipart file body.
    ///
    /// `file_name` only contributes its extension. An empty body is rejected as a
    /// missing field; errors from the body stream are converted into `DropError`.
    #[instrument(skip(self, content))]
    pub async fn ingest_file<S, E>(&self, file_name: Option<&str>, content: S) -> Result<StoredObject>
    where
        S: Stream<Item = std::result::Result<Bytes, E>>,
        E: Into<DropError>,
    {
        let extension = file_name.map(extension_of).unwrap_or_default();
        self.store("file", extension, content, false).await
    }

    /// Store a text snippet as a `.txt` object
    #[instrument(skip(self, raw), fields(len = raw.len()))]
    pub async fn ingest_text(&self, raw: &str) -> Result<StoredObject> {
        let body = futures::stream::iter([Ok::<_, Infallible>(Bytes::copy_from_slice(
            raw.as_bytes(),
        ))]);
        self.store("text", TEXT_EXTENSION.to_string(), body, true).await
    }

    async fn store<S, E>(
        &self,
        kind: &'static str,
        extension: String,
        content: S,
        allow_empty: bool,
    ) -> Result<StoredObject>
    where
        S: Stream<Item = std::result::Result<Bytes, E>>,
        E: Into<DropError>,
    {
        self.storage.ensure_root().await?;

        let id = Uuid::new_v4();
        let file_name = format!("{}{}", id, extension);
        let staged = self.storage.staging_dir().join(format!("{}.part", file_name));
        let target = self.storage.root().join(&file_name);

        let size = match write_staged(&staged, content).await {
            Ok(0) if !allow_empty => {
                discard(&staged).await;
                metrics::counter!("drop.ingest.failed").increment(1);
                return Err(DropError::MissingField("raw"));
            }
            Ok(size) => size,
            Err(e) => {
                discard(&staged).await;
                metrics::counter!("drop.ingest.failed").increment(1);
                return Err(e);
            }
        };

        if let Err(e) = tokio::fs::rename(&staged, &target).await {
            discard(&staged).await;
            metrics::counter!("drop.ingest.failed").increment(1);
            return Err(DropError::WriteFailure(e));
        }

        metrics::counter!("drop.objects.stored", "kind" => kind).increment(1);
        metrics::counter!("drop.bytes.stored").increment(size);

        let object = StoredObject {
            id,
            url: format!("{}/{}", self.public_prefix, file_name),
            extension,
            file_name,
            size,
        };

        info!(
            id = %object.id,
            kind = kind,
            file_name = %object.file_name,
            size_bytes = size,
            "Object stored"
        );

        Ok(object)
    }
}

/// Stream `content` into a freshly created staging file, returning the byte count
async fn write_staged<S, E>(path: &Path, content: S) -> Result<u64>
where
    S: Stream<Item = std::result::Result<Bytes, E>>,
    E: Into<DropError>,
{
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await
        .map_err(DropError::WriteFailure)?;

    let mut content = std::pin::pin!(content);
    let mut size = 0u64;

    while let Some(chunk) = content.next().await {
        let chunk = chunk.map_err(Into::into)?;
        file.write_all(&chunk)
            .await
            .map_err(DropError::WriteFailure)?;
        size += chunk.len() as u64;
    }

    file.flush().await.map_err(DropError::WriteFailure)?;
    file.sync_all().await.map_err(DropError::WriteFailure)?;

    debug!(path = %path.display(), size_bytes = size, "Staged upload written");
    Ok(size)
}

async fn discard(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "Failed to remove partial upload");
        }
    }
}

/// Extension (with leading dot) of a client-supplied filename.
///
/// Only the final suffix of the base name is considered, and only when it is
/// 1..=16 ASCII alphanumerics; anything else yields no extension. Case is kept.
pub fn extension_of(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    match base.rfind('.') {
        Some(pos) => {
            let ext = &base[pos + 1..];
            if !ext.is_empty()
                && ext.len() <= MAX_EXTENSION_LEN
                && ext.chars().all(|c| c.is_ascii_alphanumeric())
            {
                format!(".{}", ext)
            } else {
                String::new()
            }
        }
        None => String::new(),
    }
}

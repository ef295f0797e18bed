//! Read-only access to published objects.

use crate::error::{DropError, Result};
use crate::storage::StorageDirectory;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tokio::fs::File;
use tracing::{debug, instrument, warn};

/// An opened object ready to be streamed to a client
#[derive(Debug)]
pub struct RetrievedObject {
    pub file: File,
    /// Requested segment, used as the download filename
    pub file_name: String,
    pub size: u64,
}

/// Maps retrieval path segments back to files confined to the storage root
#[derive(Debug, Clone)]
pub struct RetrievalServer {
    storage: StorageDirectory,
}

impl RetrievalServer {
    pub fn new(storage: StorageDirectory) -> Self {
        Self { storage }
    }

    /// Resolve a segment to the canonical path of a stored object.
    ///
    /// The result is always a regular file inside the canonical storage root.
    #[instrument(skip(self))]
    pub async fn resolve(&self, segment: &str) -> Result<PathBuf> {
        validate_segment(segment)?;

        let root = match tokio::fs::canonicalize(self.storage.root()).await {
            Ok(root) => root,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(DropError::NotFound(segment.to_string()))
            }
            Err(e) => return Err(DropError::ReadFailure(e)),
        };

        let resolved = match tokio::fs::canonicalize(root.join(segment)).await {
            Ok(path) => path,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(DropError::NotFound(segment.to_string()))
            }
            Err(e) => return Err(DropError::ReadFailure(e)),
        };

        // A symlink planted in the root must not lead outside it.
        if resolved.parent() != Some(root.as_path()) {
            warn!(segment = %segment, resolved = %resolved.display(), "Path escapes storage root");
            return Err(DropError::InvalidPath(segment.to_string()));
        }

        let metadata = tokio::fs::metadata(&resolved)
            .await
            .map_err(DropError::ReadFailure)?;
        if !metadata.is_file() {
            return Err(DropError::NotFound(segment.to_string()));
        }

        Ok(resolved)
    }

    /// Open a stored object for streaming
    #[instrument(skip(self))]
    pub async fn open(&self, segment: &str) -> Result<RetrievedObject> {
        let path = self.resolve(segment).await?;

        let file = match File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(DropError::NotFound(segment.to_string()))
            }
            Err(e) => return Err(DropError::ReadFailure(e)),
        };
        let size = file
            .metadata()
            .await
            .map_err(DropError::ReadFailure)?
            .len();

        metrics::counter!("drop.objects.served").increment(1);
        debug!(segment = %segment, size_bytes = size, "Serving object");

        Ok(RetrievedObject {
            file,
            file_name: segment.to_string(),
            size,
        })
    }
}

/// Accept only a single, plain, non-hidden file name
fn validate_segment(segment: &str) -> Result<()> {
    if segment.is_empty() {
        return Err(DropError::NotFound(String::new()));
    }

    if segment.contains(['/', '\\', '\0']) || segment.starts_with('.') {
        return Err(DropError::InvalidPath(segment.to_string()));
    }

    let mut components = Path::new(segment).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(DropError::InvalidPath(segment.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::UploadIngestor;
    use bytes::Bytes;
    use std::convert::Infallible;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;

    struct Fixture {
        _tmp: TempDir,
        ingestor: UploadIngestor,
        retrieval: RetrievalServer,
    }

    fn fixture() -> Fixture {
        let tmp = TempDir::new().unwrap();
        let storage = StorageDirectory::new(tmp.path().join("uploads"));
        Fixture {
            ingestor: UploadIngestor::new(storage.clone(), "/uploads"),
            retrieval: RetrievalServer::new(storage),
            _tmp: tmp,
        }
    }

    async fn read_back(retrieval: &RetrievalServer, segment: &str) -> Vec<u8> {
        let mut object = retrieval.open(segment).await.unwrap();
        let mut buf = Vec::new();
        object.file.read_to_end(&mut buf).await.unwrap();
        assert_eq!(object.size, buf.len() as u64);
        buf
    }

    #[test]
    fn test_validate_segment() {
        assert!(validate_segment("3f1c.txt").is_ok());
        assert!(validate_segment("no-extension").is_ok());
        assert!(matches!(validate_segment(""), Err(DropError::NotFound(_))));
        for bad in ["..", ".", "../../etc/passwd", "/etc/passwd", "a/b", "a\\b", ".incoming", "x\0y"] {
            assert!(
                matches!(validate_segment(bad), Err(DropError::InvalidPath(_))),
                "{:?} should be rejected",
                bad
            );
        }
    }

    #[tokio::test]
    async fn test_file_round_trip() {
        let fx = fixture();
        let content: Vec<u8> = (0..=255u8).cycle().take(70_000).collect();

        let body = futures::stream::iter(
            content
                .chunks(4096)
                .map(|c| Ok::<_, Infallible>(Bytes::copy_from_slice(c)))
                .collect::<Vec<_>>(),
        );
        let object = fx.ingestor.ingest_file(Some("data.bin"), body).await.unwrap();

        assert_eq!(read_back(&fx.retrieval, &object.file_name).await, content);
    }

    #[tokio::test]
    async fn test_text_round_trip() {
        let fx = fixture();
        let text = "line one\nline two · ünïcödé";

        let object = fx.ingestor.ingest_text(text).await.unwrap();

        assert_eq!(read_back(&fx.retrieval, &object.file_name).await, text.as_bytes());
    }

    #[tokio::test]
    async fn test_missing_object() {
        let fx = fixture();
        fx.ingestor.storage().ensure_root().await.unwrap();

        let err = fx.retrieval.open("nonexistent-id.txt").await.unwrap_err();
        assert!(matches!(err, DropError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_missing_root_is_not_found() {
        let fx = fixture();
        let err = fx.retrieval.open("anything.txt").await.unwrap_err();
        assert!(matches!(err, DropError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_traversal_rejected() {
        let fx = fixture();
        fx.ingestor.ingest_text("inside").await.unwrap();

        for segment in ["../../etc/passwd", "/etc/passwd", "..", ".incoming"] {
            let err = fx.retrieval.open(segment).await.unwrap_err();
            assert!(
                matches!(err, DropError::InvalidPath(_)),
                "{} gave {:?}",
                segment,
                err
            );
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_escape_rejected() {
        let fx = fixture();
        let root = fx.ingestor.storage().root().to_path_buf();
        fx.ingestor.storage().ensure_root().await.unwrap();

        let outside = root.parent().unwrap().join("secret.txt");
        std::fs::write(&outside, b"top secret").unwrap();
        std::os::unix::fs::symlink(&outside, root.join("link.txt")).unwrap();

        let err = fx.retrieval.open("link.txt").await.unwrap_err();
        assert!(matches!(err, DropError::InvalidPath(_)));
    }

    #[tokio::test]
    async fn test_directory_is_not_an_object() {
        let fx = fixture();
        let root = fx.ingestor.storage().root().to_path_buf();
        std::fs::create_dir_all(root.join("subdir")).unwrap();

        let err = fx.retrieval.open("subdir").await.unwrap_err();
        assert!(matches!(err, DropError::NotFound(_)));
    }
}

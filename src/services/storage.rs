use crate::models::UploadedFile;
use std::ffi::OsString;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Cannot prepare storage area {path}: {source}")]
    Area {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Upload exceeds the maximum allowed size of {limit} bytes")]
    TooLarge { limit: u64 },

    #[error("Upload stream interrupted: {0}")]
    Upload(#[source] io::Error),

    #[error("Failed to write upload: {0}")]
    Write(#[source] io::Error),
}

/// Directory shared by all in-flight requests. Every file inside it belongs to
/// exactly one request and is named by a random UUID.
#[derive(Debug)]
pub struct StorageArea {
    root: PathBuf,
    max_file_size: u64,
}

impl StorageArea {
    /// Creates the directory if absent and verifies it is writable.
    pub async fn open(dir: impl AsRef<Path>, max_file_size: usize) -> Result<Self, StorageError> {
        let dir = dir.as_ref();
        let area_error = |source: io::Error| StorageError::Area {
            path: dir.to_path_buf(),
            source,
        };

        fs::create_dir_all(dir).await.map_err(&area_error)?;
        let root = fs::canonicalize(dir).await.map_err(&area_error)?;

        let marker = root.join(format!(".write-check-{}", Uuid::new_v4().simple()));
        fs::write(&marker, b"").await.map_err(&area_error)?;
        fs::remove_file(&marker).await.map_err(&area_error)?;

        debug!("📁 Storage area ready at {}", root.display());

        Ok(Self {
            root,
            max_file_size: max_file_size as u64,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Streams an upload into a fresh file. A partial file is removed before
    /// any error is returned, and also if the caller stops polling mid-write.
    pub async fn allocate_input<R>(
        &self,
        original_name: &str,
        reader: R,
    ) -> Result<UploadedFile, StorageError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let path = self.root.join(Uuid::new_v4().simple().to_string());

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(StorageError::Write)?;

        let pending = PendingFile {
            storage: self,
            path: Some(path),
        };
        let size = write_limited(file, reader, self.max_file_size).await?;
        let path = pending.keep();

        debug!("💾 Stored {} bytes at {}", size, path.display());

        Ok(UploadedFile {
            path,
            original_name: original_name.to_string(),
            size,
        })
    }

    /// Removes each path. Missing files are ignored, other failures are logged
    /// and swallowed. Paths outside the storage area are never touched.
    pub fn release<I, P>(&self, paths: I)
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        for path in paths {
            let path = path.as_ref();

            if !self.owns(path) {
                warn!(
                    "Cleanup warning: refusing to remove {} outside storage area",
                    path.display()
                );
                continue;
            }

            match std::fs::remove_file(path) {
                Ok(()) => debug!("🧹 Removed {}", path.display()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!("Cleanup warning: failed to remove {}: {}", path.display(), e),
            }
        }
    }

    fn owns(&self, path: &Path) -> bool {
        path.starts_with(&self.root)
            && path != self.root
            && !path.components().any(|c| matches!(c, Component::ParentDir))
    }

    pub async fn health_check(&self) -> bool {
        fs::metadata(&self.root)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }
}

async fn write_limited<R>(mut file: File, reader: R, limit: u64) -> Result<u64, StorageError>
where
    R: AsyncRead + Unpin + Send,
{
    let mut limited = reader.take(limit.saturating_add(1));
    let size = tokio::io::copy(&mut limited, &mut file)
        .await
        .map_err(|e| match e.kind() {
            io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof => StorageError::Upload(e),
            _ => StorageError::Write(e),
        })?;

    if size > limit {
        return Err(StorageError::TooLarge { limit });
    }

    file.flush().await.map_err(StorageError::Write)?;
    Ok(size)
}

/// Upload file that is removed on drop unless `keep` is called.
struct PendingFile<'a> {
    storage: &'a StorageArea,
    path: Option<PathBuf>,
}

impl PendingFile<'_> {
    fn keep(mut self) -> PathBuf {
        self.path.take().unwrap_or_default()
    }
}

impl Drop for PendingFile<'_> {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            self.storage.release([path]);
        }
    }
}

/// Sibling path of `input` with `suffix` appended to the file name.
pub fn derive_output_path(input: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(input.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Paths owned by one request, released when the guard is dropped.
///
/// The guard travels with the response body, so the files go away once the
/// body is fully sent, when the client disconnects mid-stream, or as soon as
/// the handler returns an error.
pub struct TempFiles {
    storage: Arc<StorageArea>,
    paths: Vec<PathBuf>,
}

impl TempFiles {
    pub fn new(storage: Arc<StorageArea>) -> Self {
        Self {
            storage,
            paths: Vec::new(),
        }
    }

    pub fn track(&mut self, path: impl Into<PathBuf>) {
        self.paths.push(path.into());
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }
}

impl Drop for TempFiles {
    fn drop(&mut self) {
        self.storage.release(self.paths.drain(..));
    }
}

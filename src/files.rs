use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Utc;
use tokio::fs;
use uuid::Uuid;

use crate::db::models::{FileIndex, FileMetadata};
use crate::db::JsonDocument;
use crate::error::ServiceError;

const METADATA_FILE: &str = "metadata.json";
const FALLBACK_NAME: &str = "upload";

/// Uploaded files, one directory per file id, indexed by `metadata.json`.
pub struct FileStore {
    root: PathBuf,
    index: JsonDocument<FileIndex>,
}

/// A file read back from the store.
#[derive(Debug, Clone)]
pub struct StoredFile {
    pub filename: String,
    pub data: Vec<u8>,
}

impl FileStore {
    pub async fn open(root: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .await
            .with_context(|| format!("creating uploads dir {:?}", root))?;

        let index = JsonDocument::<FileIndex>::open(root.join(METADATA_FILE), FileIndex::default).await?;
        let count = index.read(|i| i.files.len()).await;
        tracing::info!("File store ready at {:?} ({} files)", root, count);

        Ok(Self { root, index })
    }

    pub async fn save_file(
        &self,
        data: &[u8],
        filename: &str,
        file_type: &str,
        username: &str,
        description: &str,
    ) -> Result<FileMetadata, ServiceError> {
        let id = Uuid::new_v4().to_string();
        let safe_name = sanitize_filename(filename);

        let dir = self.root.join(&id);
        let path = dir.join(&safe_name);
        fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("creating {:?}", dir))?;
        fs::write(&path, data)
            .await
            .with_context(|| format!("writing {:?}", path))?;

        let metadata = FileMetadata {
            id: id.clone(),
            filename: safe_name,
            original_filename: filename.to_string(),
            file_type: file_type.to_string(),
            size: data.len() as u64,
            uploaded_by: username.to_string(),
            uploaded_at: Utc::now(),
            description: description.to_string(),
            path: path.to_string_lossy().into_owned(),
        };

        self.index
            .update(|index| {
                index.files.insert(id.clone(), metadata.clone());
                Ok::<_, ServiceError>(())
            })
            .await?;

        tracing::info!(
            "Stored file {} ({} bytes, type {}) for '{}'",
            id,
            metadata.size,
            metadata.file_type,
            username
        );
        Ok(metadata)
    }

    pub async fn metadata(&self, file_id: &str) -> Option<FileMetadata> {
        self.index.read(|index| index.files.get(file_id).cloned()).await
    }

    pub async fn get_file(&self, file_id: &str) -> Result<StoredFile, ServiceError> {
        let metadata = self
            .metadata(file_id)
            .await
            .ok_or_else(|| ServiceError::NotFound("File not found".into()))?;

        match fs::read(&metadata.path).await {
            Ok(data) => Ok(StoredFile {
                filename: metadata.filename,
                data,
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::warn!("File {} is indexed but missing at {}", file_id, metadata.path);
                Err(ServiceError::NotFound("File not found on disk".into()))
            }
            Err(e) => Err(anyhow::Error::new(e)
                .context(format!("reading {}", metadata.path))
                .into()),
        }
    }

    pub async fn delete_file(&self, file_id: &str) -> Result<(), ServiceError> {
        let metadata = self
            .metadata(file_id)
            .await
            .ok_or_else(|| ServiceError::NotFound("File not found".into()))?;

        let dir = Path::new(&metadata.path)
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.join(file_id));
        match fs::remove_dir_all(&dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                return Err(anyhow::Error::new(e)
                    .context(format!("removing {:?}", dir))
                    .into())
            }
        }

        self.index
            .update(|index| {
                index.files.remove(file_id);
                Ok::<_, ServiceError>(())
            })
            .await?;

        tracing::info!("Deleted file {}", file_id);
        Ok(())
    }

    /// Newest upload first.
    pub async fn list_files(&self, uploaded_by: Option<&str>, file_type: Option<&str>) -> Vec<FileMetadata> {
        let mut files: Vec<FileMetadata> = self
            .index
            .read(|index| {
                index
                    .files
                    .values()
                    .filter(|f| uploaded_by.map_or(true, |u| f.uploaded_by == u))
                    .filter(|f| file_type.map_or(true, |t| f.file_type == t))
                    .cloned()
                    .collect()
            })
            .await;
        files.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
        files
    }

    pub async fn file_types(&self) -> BTreeSet<String> {
        self.index
            .read(|index| index.files.values().map(|f| f.file_type.clone()).collect())
            .await
    }
}

/// Reduce a client-supplied name to something safe to use as a path
/// component.
pub fn sanitize_filename(name: &str) -> String {
    // Only the final component counts, whichever separator the client used.
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();

    let cleaned: String = base
        .chars()
        .filter_map(|c| match c {
            c if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') => Some(c),
            c if c.is_whitespace() => Some('_'),
            _ => None,
        })
        .collect();

    let trimmed = cleaned.trim_start_matches('.');
    if trimmed.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}

pub mod models;

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::fs;
use tokio::sync::Mutex;

/// A JSON file whose in-memory copy is authoritative.
///
/// All access goes through one async lock, so a read-check-mutate-write
/// sequence inside [`JsonDocument::update`] is atomic with respect to every
/// other caller of the same document. The file is only a serialization
/// target: it is rewritten in full after each successful mutation.
pub struct JsonDocument<T> {
    path: PathBuf,
    state: Mutex<T>,
}

impl<T> JsonDocument<T>
where
    T: Clone + Serialize + DeserializeOwned + Send,
{
    /// Load the document at `path`, or create it from `seed` if it is missing
    /// or unreadable as JSON.
    pub async fn open(path: impl Into<PathBuf>, seed: impl FnOnce() -> T) -> anyhow::Result<Self> {
        let path = path.into();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create data directory {}", parent.display()))?;
        }

        let loaded = match fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice::<T>(&bytes) {
                Ok(doc) => Some(doc),
                Err(e) => {
                    tracing::warn!("Document {:?} is not valid JSON ({}), re-initializing", path, e);
                    None
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read {}", path.display()));
            }
        };

        let doc = match loaded {
            Some(doc) => doc,
            None => {
                let doc = seed();
                write_atomic(&path, &doc).await?;
                tracing::info!("Initialized document {:?}", path);
                doc
            }
        };

        Ok(Self {
            path,
            state: Mutex::new(doc),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `f` against a consistent snapshot of the document.
    pub async fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let guard = self.state.lock().await;
        f(&guard)
    }

    /// Mutate the document and write it through to disk.
    ///
    /// `f` works on a copy that replaces the in-memory document only once it
    /// is on disk; if `f` or the write fails, readers still see the previous
    /// state. The lock is held until the write completes, so concurrent
    /// writers never clobber each other.
    pub async fn update<R, E>(&self, f: impl FnOnce(&mut T) -> Result<R, E>) -> Result<R, E>
    where
        E: From<anyhow::Error>,
    {
        let mut guard = self.state.lock().await;
        let mut next = guard.clone();
        let out = f(&mut next)?;
        write_atomic(&self.path, &next).await?;
        *guard = next;
        Ok(out)
    }
}

/// Write to a sibling temp file, then rename over the target.
async fn write_atomic<T: Serialize>(path: &Path, doc: &T) -> anyhow::Result<()> {
    let bytes = serde_json::to_vec_pretty(doc).context("failed to serialize document")?;

    let mut tmp: OsString = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, &bytes)
        .await
        .with_context(|| format!("failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .await
        .with_context(|| format!("failed to replace {}", path.display()))?;
    Ok(())
}

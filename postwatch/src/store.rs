//! Known posting identifiers.
//!
//! A flat append-only log, one GUID per line. An absent or empty file means no
//! posting has been seen yet. CSV exports (`GuidString,Titpost,...`) are also
//! read: the first column is the GUID and the header row is skipped.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::Result;
use crate::utils::fs::{ensure_parent_dir, io_error};

/// First header cell of CSV exports; that row is skipped on load.
const CSV_GUID_HEADER: &str = "GuidString";

/// Persisted set of previously-seen posting identifiers.
#[async_trait]
pub trait PostingStore: Send + Sync {
    /// Load every known identifier.
    async fn load(&self) -> Result<HashSet<String>>;

    /// Append identifiers to the set.
    async fn append(&self, guids: &[String]) -> Result<()>;
}

/// File-backed [`PostingStore`].
pub struct FilePostingStore {
    path: PathBuf,
}

impl FilePostingStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl PostingStore for FilePostingStore {
    async fn load(&self) -> Result<HashSet<String>> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No posting store yet");
                return Ok(HashSet::new());
            }
            Err(e) => return Err(io_error("reading posting store", &self.path, e)),
        };

        Ok(contents.lines().filter_map(guid_of_line).collect())
    }

    async fn append(&self, guids: &[String]) -> Result<()> {
        if guids.is_empty() {
            return Ok(());
        }

        ensure_parent_dir(&self.path).await?;

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| io_error("opening posting store", &self.path, e))?;

        let mut buf = String::new();
        for guid in guids {
            buf.push_str(guid);
            buf.push('\n');
        }

        file.write_all(buf.as_bytes())
            .await
            .map_err(|e| io_error("appending to posting store", &self.path, e))?;
        file.flush()
            .await
            .map_err(|e| io_error("flushing posting store", &self.path, e))?;

        debug!(count = guids.len(), "Recorded known postings");
        Ok(())
    }
}

/// GUID held by one store line: the whole line, or its first CSV column.
fn guid_of_line(line: &str) -> Option<String> {
    let first = line.split(',').next().unwrap_or_default();
    let guid = first.trim().trim_matches('"').trim();
    (!guid.is_empty() && guid != CSV_GUID_HEADER).then(|| guid.to_string())
}

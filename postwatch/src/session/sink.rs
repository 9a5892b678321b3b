//! Credential persistence.
//!
//! A refreshed cookie only lives in memory unless a sink writes it somewhere
//! that survives a restart.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;

use super::credential::SessionCredential;
use crate::Result;
use crate::utils::fs::io_error;

#[async_trait]
pub trait CredentialSink: Send + Sync {
    /// Persist a freshly obtained credential.
    async fn store(&self, credential: &SessionCredential) -> Result<()>;
}

/// Rewrites the `COOKIE=` line of a dotenv file, keeping every other line.
pub struct EnvFileSink {
    path: PathBuf,
    key: String,
}

impl EnvFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            key: "COOKIE".to_string(),
        }
    }

    /// Replace (or append) the credential line in `contents`.
    fn rewrite(&self, contents: &str, credential: &SessionCredential) -> String {
        let prefix = format!("{}=", self.key);
        let line = format!("{}='{}'", self.key, credential.header_value());

        let mut replaced = false;
        let mut out: Vec<String> = contents
            .lines()
            .map(|l| {
                if l.trim_start().starts_with(&prefix) {
                    replaced = true;
                    line.clone()
                } else {
                    l.to_string()
                }
            })
            .collect();

        if !replaced {
            out.push(line);
        }

        let mut result = out.join("\n");
        result.push('\n');
        result
    }
}

#[async_trait]
impl CredentialSink for EnvFileSink {
    async fn store(&self, credential: &SessionCredential) -> Result<()> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(io_error("reading env file", &self.path, e)),
        };

        let updated = self.rewrite(&contents, credential);
        tokio::fs::write(&self.path, updated)
            .await
            .map_err(|e| io_error("writing env file", &self.path, e))?;

        debug!(path = %self.path.display(), "Persisted refreshed cookie");
        Ok(())
    }
}

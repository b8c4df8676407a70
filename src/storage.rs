//! Job-scoped file storage for uploaded audio and transcript artifacts.
//!
//! Every job owns a directory `{root}/{job_id}` holding its upload and, once the
//! pipeline succeeds, its transcript.

use crate::error::Result;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Name of the stored upload inside a job directory.
const UPLOAD_FILE: &str = "upload.mp3";

/// Filesystem sink for job artifacts.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn job_dir(&self, job_id: &str) -> PathBuf {
        self.root.join(sanitize(job_id))
    }

    /// Where a job's uploaded audio lives.
    pub fn audio_path(&self, job_id: &str) -> PathBuf {
        self.job_dir(job_id).join(UPLOAD_FILE)
    }

    /// Where a job's transcript is written.
    pub fn output_path(&self, job_id: &str, podcast: &str, episode: &str, extension: &str) -> PathBuf {
        self.job_dir(job_id).join(format!(
            "{}_{}_transcription.{}",
            sanitize(podcast),
            sanitize(episode),
            extension
        ))
    }

    /// Persist uploaded bytes and return their location.
    pub async fn write_upload(&self, job_id: &str, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.audio_path(job_id);
        write(&path, bytes).await?;
        debug!("Stored {} byte upload at {}", bytes.len(), path.display());
        Ok(path)
    }

    /// Persist transcript bytes at `path`.
    pub async fn write_output(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        write(path, bytes).await
    }

    /// Read and delete a file in one step. Returns `None` if it is already gone.
    ///
    /// The file is renamed before reading, so concurrent callers never both receive it.
    pub async fn take(&self, path: &Path) -> Result<Option<Vec<u8>>> {
        let claimed = path.with_extension("taken");
        match tokio::fs::rename(path, &claimed).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        let bytes = tokio::fs::read(&claimed).await?;
        self.remove(&claimed).await?;
        Ok(Some(bytes))
    }

    /// Delete a file if present, then its job directory if that left it empty.
    pub async fn remove(&self, path: &Path) -> Result<()> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        if let Some(dir) = path.parent() {
            if dir.starts_with(&self.root) && dir != self.root {
                // Fails while the directory still has files in it, which is fine.
                let _ = tokio::fs::remove_dir(dir).await;
            }
        }
        Ok(())
    }

    /// Delete a job's directory and everything in it.
    pub async fn remove_job(&self, job_id: &str) -> Result<()> {
        match tokio::fs::remove_dir_all(self.job_dir(job_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

async fn write(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, bytes).await?;
    Ok(())
}

/// Reduce a free-text label to a safe file name component.
pub fn sanitize(label: &str) -> String {
    let cleaned: String = label
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "untitled".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("My Show"), "My_Show");
        assert_eq!(sanitize("../etc/passwd"), "___etc_passwd");
        assert_eq!(sanitize("ep-12_final"), "ep-12_final");
        assert_eq!(sanitize("  "), "untitled");
    }

    #[test]
    fn test_paths_are_job_scoped() {
        let store = ArtifactStore::new("/work");

        assert_eq!(store.audio_path("abc"), PathBuf::from("/work/abc/upload.mp3"));
        assert_eq!(
            store.output_path("abc", "The Show", "42", "json"),
            PathBuf::from("/work/abc/The_Show_42_transcription.json")
        );
    }

    #[tokio::test]
    async fn test_upload_round_trip_and_remove() {
        let temp = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp.path());

        let path = store.write_upload("job1", b"ID3 audio").await.unwrap();
        assert!(path.exists());
        assert_eq!(std::fs::read(&path).unwrap(), b"ID3 audio");

        store.remove(&path).await.unwrap();
        assert!(!path.exists());
        assert!(!temp.path().join("job1").exists());

        // Removing twice is not an error.
        store.remove(&path).await.unwrap();
    }

    #[tokio::test]
    async fn test_take_consumes_once() {
        let temp = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp.path());
        let output = store.output_path("job1", "show", "1", "json");
        store.write_output(&output, b"{}").await.unwrap();

        assert_eq!(store.take(&output).await.unwrap().as_deref(), Some(&b"{}"[..]));
        assert_eq!(store.take(&output).await.unwrap(), None);
        assert!(!temp.path().join("job1").exists());
    }

    #[tokio::test]
    async fn test_remove_keeps_non_empty_job_dir() {
        let temp = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp.path());

        let upload = store.write_upload("job1", b"audio").await.unwrap();
        let output = store.output_path("job1", "show", "1", "json");
        store.write_output(&output, b"{}").await.unwrap();

        store.remove(&upload).await.unwrap();
        assert!(output.exists());

        store.remove_job("job1").await.unwrap();
        assert!(!temp.path().join("job1").exists());
    }
}

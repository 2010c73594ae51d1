//! Writes generated artifacts into the shared temp directory
//!
//! File names carry one of the janitor's allowed prefixes so the files are
//! reclaimed on its schedule.

use chrono::Utc;
use glyph_core::{Artifact, ArtifactKind, Result};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Suffix of a half-written artifact
pub const STAGING_SUFFIX: &str = ".tmp";

/// Removes the staging file unless the rename went through
///
/// Covers error returns and a dropped `persist` future alike. A process
/// crash still leaves the file, which keeps the allowed prefix and ages out
/// through the janitor's retention pass.
struct StagingFile {
    path: PathBuf,
    committed: bool,
}

impl StagingFile {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            committed: false,
        }
    }

    async fn commit(mut self, target: &Path) -> Result<()> {
        fs::rename(&self.path, target).await?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for StagingFile {
    fn drop(&mut self) {
        if !self.committed {
            if let Err(e) = std::fs::remove_file(&self.path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!("Failed to remove staging file {}: {}", self.path.display(), e);
                }
            }
        }
    }
}

pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File name for an artifact: `<prefix>-<timestamp>-<uuid>.<ext>`
    pub fn file_name(kind: ArtifactKind) -> String {
        let (prefix, ext) = match kind {
            ArtifactKind::Raster => ("raster", "png"),
            ArtifactKind::Vector | ArtifactKind::Placeholder => ("vector", "svg"),
        };
        format!(
            "{}-{}-{}.{}",
            prefix,
            Utc::now().format("%Y%m%d%H%M%S"),
            uuid::Uuid::new_v4().simple(),
            ext
        )
    }

    /// Persist the artifact's payload and return it with `path` set
    ///
    /// Artifacts with neither inline bytes nor text are returned untouched.
    pub async fn persist(&self, artifact: Artifact) -> Result<Artifact> {
        let payload: Vec<u8> = match (&artifact.bytes, &artifact.text) {
            (Some(bytes), _) => bytes.clone(),
            (None, Some(text)) => text.as_bytes().to_vec(),
            (None, None) => return Ok(artifact),
        };

        fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(Self::file_name(artifact.kind));

        let mut staging_name = path.clone().into_os_string();
        staging_name.push(STAGING_SUFFIX);
        let staging = StagingFile::new(PathBuf::from(staging_name));

        fs::write(&staging.path, &payload).await?;
        staging.commit(&path).await?;

        tracing::debug!("Stored {} artifact at {}", artifact.kind, path.display());
        Ok(artifact.with_path(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_persist_vector_uses_allowed_prefix() {
        let temp = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp.path().join("artifacts"));

        let stored = store
            .persist(Artifact::svg("vectorizer", "<svg/>"))
            .await
            .unwrap();

        let path = stored.path.clone().unwrap();
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("vector-"));
        assert!(name.ends_with(".svg"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "<svg/>");
    }

    #[tokio::test]
    async fn test_url_only_artifact_is_not_written() {
        let temp = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp.path());

        let raster = Artifact::raster_url("synthesizer", "https://img.example/x.png");
        let out = store.persist(raster).await.unwrap();
        assert!(out.path.is_none());
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_persist_leaves_no_staging_file() {
        let temp = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp.path());

        store
            .persist(Artifact::svg("vectorizer", "<svg/>"))
            .await
            .unwrap();

        let names: Vec<String> = std::fs::read_dir(temp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(!names[0].ends_with(STAGING_SUFFIX));
    }

    #[tokio::test]
    async fn test_failed_commit_removes_staging_file() {
        let temp = TempDir::new().unwrap();
        let staged = temp.path().join("vector-x.svg.tmp");
        std::fs::write(&staged, "<svg/>").unwrap();

        // Renaming onto a missing directory fails
        let target = temp.path().join("missing").join("vector-x.svg");
        let result = StagingFile::new(staged.clone()).commit(&target).await;

        assert!(result.is_err());
        assert!(!staged.exists());
    }

    #[test]
    fn test_abandoned_staging_file_is_removed_on_drop() {
        let temp = TempDir::new().unwrap();
        let staged = temp.path().join("raster-x.png.tmp");
        std::fs::write(&staged, [0u8; 16]).unwrap();

        drop(StagingFile::new(staged.clone()));
        assert!(!staged.exists());
    }
}

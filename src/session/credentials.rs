//! On-disk credential snapshots, one opaque file per session.

use std::path::{Path, PathBuf};

use tokio::fs;

/// Directory of `{session}.json` snapshots written by the session tool.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    dir: PathBuf,
}

impl CredentialStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, session: &str) -> PathBuf {
        self.dir.join(format!("{session}.json"))
    }

    /// Whether a snapshot exists. IO errors count as absent.
    pub async fn exists(&self, session: &str) -> bool {
        fs::try_exists(self.path_for(session)).await.unwrap_or(false)
    }

    pub async fn ensure_dir(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.dir).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn exists_tracks_snapshot_file() {
        let dir = TempDir::new().unwrap();
        let store = CredentialStore::new(dir.path().join("auth-state"));
        assert!(!store.exists("outlook").await);

        store.ensure_dir().await.unwrap();
        std::fs::write(store.path_for("outlook"), "{}").unwrap();
        assert!(store.exists("outlook").await);
        assert!(!store.exists("outlook-calendar").await);
    }
}

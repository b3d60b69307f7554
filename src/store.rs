use crate::state::GenerationStatus;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs;

/// Generic key-value persistence. Keys are flat file-style names.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn write(&self, key: &str, value: &[u8]) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
}

/// File-per-key store rooted at a directory.
pub struct DirKvStore {
    root: PathBuf,
}

impl DirKvStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() || key.contains('/') || key.contains("..") {
            return Err(anyhow!("Invalid store key: {:?}", key));
        }
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl KvStore for DirKvStore {
    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).context(format!("Failed to read {:?}", path)),
        }
    }

    async fn write(&self, key: &str, value: &[u8]) -> Result<()> {
        let path = self.path_for(key)?;
        fs::create_dir_all(&self.root).await?;
        fs::write(&path, value)
            .await
            .context(format!("Failed to write {:?}", path))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).context(format!("Failed to delete {:?}", path)),
        }
    }
}

/// The finished artifact record appended to the overview list once a job
/// completes. Duration is estimated from word count, not decoded audio.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioOverview {
    pub id: String,
    pub title: String,
    pub file_path: String,
    pub duration_seconds: u64,
    pub created_at: DateTime<Utc>,
    pub offline: bool,
}

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn persist(&self, overview: &AudioOverview) -> Result<()>;
    async fn list(&self) -> Result<Vec<AudioOverview>>;
    async fn delete(&self, id: &str) -> Result<()>;
}

const OVERVIEWS_KEY: &str = "audio_overviews.json";

/// Overview list kept as one pretty-printed JSON document in the KV store.
pub struct JsonArtifactStore {
    kv: std::sync::Arc<dyn KvStore>,
}

impl JsonArtifactStore {
    pub fn new(kv: std::sync::Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    async fn load(&self) -> Result<Vec<AudioOverview>> {
        match self.kv.read(OVERVIEWS_KEY).await? {
            Some(bytes) => {
                let content = String::from_utf8(bytes)?;
                serde_json::from_str(&content).context("Failed to parse overview list")
            }
            None => Ok(Vec::new()),
        }
    }

    async fn save(&self, overviews: &[AudioOverview]) -> Result<()> {
        let content = serde_json::to_string_pretty(overviews)?;
        self.kv.write(OVERVIEWS_KEY, content.as_bytes()).await
    }
}

#[async_trait]
impl ArtifactStore for JsonArtifactStore {
    async fn persist(&self, overview: &AudioOverview) -> Result<()> {
        let mut overviews = self.load().await?;
        overviews.push(overview.clone());
        self.save(&overviews).await
    }

    async fn list(&self) -> Result<Vec<AudioOverview>> {
        self.load().await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let mut overviews = self.load().await?;
        overviews.retain(|o| o.id != id);
        self.save(&overviews).await
    }
}

/// Small in-flight job metadata record, written on every phase transition
/// and removed when the job ends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: String,
    pub title: String,
    pub status: GenerationStatus,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    pub fn key(job_id: &str) -> String {
        format!("job_{}.json", job_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn overview(id: &str) -> AudioOverview {
        AudioOverview {
            id: id.to_string(),
            title: "Deep Dive".to_string(),
            file_path: format!("output/{}.wav", id),
            duration_seconds: 42,
            created_at: Utc::now(),
            offline: true,
        }
    }

    #[tokio::test]
    async fn test_dir_kv_store_round_trip() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let store = DirKvStore::new(dir.path());

        assert!(store.read("missing.json").await?.is_none());

        store.write("a.json", b"payload").await?;
        assert_eq!(store.read("a.json").await?.as_deref(), Some(&b"payload"[..]));

        store.delete("a.json").await?;
        assert!(store.read("a.json").await?.is_none());
        // Deleting a missing key is not an error.
        store.delete("a.json").await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_dir_kv_store_rejects_path_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirKvStore::new(dir.path());
        assert!(store.read("../escape").await.is_err());
        assert!(store.write("a/b", b"x").await.is_err());
    }

    #[tokio::test]
    async fn test_artifact_store_persist_list_delete() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let store = JsonArtifactStore::new(Arc::new(DirKvStore::new(dir.path())));

        assert!(store.list().await?.is_empty());

        store.persist(&overview("one")).await?;
        store.persist(&overview("two")).await?;
        let listed = store.list().await?;
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, "one");

        store.delete("one").await?;
        let listed = store.list().await?;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, "two");
        Ok(())
    }

    #[test]
    fn test_job_record_serializes_status_snake_case() {
        let record = JobRecord {
            job_id: "abc".to_string(),
            title: "t".to_string(),
            status: GenerationStatus::WritingScript,
            updated_at: Utc::now(),
        };
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"writing_script\""));
    }
}

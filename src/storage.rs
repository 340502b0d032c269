use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use tracing::debug;
use url::Url;

use crate::paperdoll::ports::{ArtifactKey, ArtifactStore, PipelineArtifact};

/// Writes stage outputs under a directory and hands back URLs relative to
/// `public_base` (a static file server or a `file://` URL of the same directory).
#[derive(Debug, Clone)]
pub struct LocalArtifactStore {
    root: PathBuf,
    public_base: Url,
}

impl LocalArtifactStore {
    pub fn new(root: impl Into<PathBuf>, public_base: &str) -> Result<Self> {
        let mut base = public_base.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let public_base =
            Url::parse(&base).with_context(|| format!("invalid PUBLIC_BASE_URL: {public_base}"))?;
        if public_base.cannot_be_a_base() {
            return Err(anyhow!("PUBLIC_BASE_URL cannot be a base URL: {public_base}"));
        }
        Ok(Self {
            root: root.into(),
            public_base,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Keeps path segments to `[A-Za-z0-9_-]` so owners and style ids cannot escape the root.
fn sanitize_segment(value: &str) -> String {
    let cleaned: String = value
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                ch
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned
    }
}

#[async_trait]
impl ArtifactStore for LocalArtifactStore {
    async fn put_artifact(&self, key: &ArtifactKey, artifact: &PipelineArtifact) -> Result<String> {
        if artifact.is_empty() {
            anyhow::bail!("refusing to store empty {} artifact", key.stage);
        }
        let safe_key = ArtifactKey {
            owner: sanitize_segment(&key.owner),
            style_id: sanitize_segment(&key.style_id),
            ..key.clone()
        };
        let object_path = safe_key.object_path(artifact.file_extension());
        let path = self.root.join(&object_path);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("create {}", parent.display()))?;
        }
        tokio::fs::write(&path, artifact.bytes())
            .await
            .with_context(|| format!("write {}", path.display()))?;

        let url = self
            .public_base
            .join(&object_path)
            .with_context(|| format!("build URL for {object_path}"))?;
        debug!("Stored {} bytes at {}", artifact.len(), path.display());
        Ok(url.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paperdoll::pipeline::Stage;

    fn temp_root(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "paperdoll-store-{}-{}-{}",
            name,
            std::process::id(),
            chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn key(owner: &str, style: &str, stage: Stage) -> ArtifactKey {
        ArtifactKey {
            owner: owner.to_string(),
            timestamp: 1_718_000_000_000,
            style_id: style.to_string(),
            stage,
        }
    }

    #[tokio::test]
    async fn writes_file_and_returns_public_url() {
        let root = temp_root("put");
        let store = LocalArtifactStore::new(&root, "https://cdn.example.com/dolls").unwrap();
        let artifact = PipelineArtifact::new(vec![1u8, 2, 3], "image/png");

        let url = store
            .put_artifact(&key("42", "simple", Stage::LineArt), &artifact)
            .await
            .unwrap();
        assert_eq!(
            url,
            "https://cdn.example.com/dolls/42/1718000000000-simple-lineart.png"
        );
        let written = std::fs::read(root.join("42/1718000000000-simple-lineart.png")).unwrap();
        assert_eq!(written, vec![1u8, 2, 3]);

        std::fs::remove_dir_all(root).ok();
    }

    #[tokio::test]
    async fn hostile_segments_stay_inside_root() {
        let root = temp_root("sanitize");
        let store = LocalArtifactStore::new(&root, "file:///srv/dolls/").unwrap();
        let artifact = PipelineArtifact::new(vec![9u8], "image/jpeg");

        let url = store
            .put_artifact(&key("../etc", "a/b", Stage::Color), &artifact)
            .await
            .unwrap();
        assert_eq!(url, "file:///srv/dolls/___etc/1718000000000-a_b-color.jpg");
        assert!(root.join("___etc/1718000000000-a_b-color.jpg").exists());

        std::fs::remove_dir_all(root).ok();
    }

    #[tokio::test]
    async fn empty_artifacts_are_not_written() {
        let root = temp_root("empty");
        let store = LocalArtifactStore::new(&root, "file:///srv/dolls/").unwrap();
        let empty = PipelineArtifact::new(Vec::<u8>::new(), "image/png");

        let err = store
            .put_artifact(&key("42", "simple", Stage::Character), &empty)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("empty"));
        assert!(!root.join("42").exists());

        std::fs::remove_dir_all(root).ok();
    }

    #[test]
    fn rejects_non_base_urls() {
        assert!(LocalArtifactStore::new("x", "mailto:someone@example.com").is_err());
        assert!(LocalArtifactStore::new("x", "not a url").is_err());
    }
}

use super::{ObjectLocation, ObjectMetadata, ObjectStore};
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use tracing::debug;

const SIDECAR_SUFFIX: &str = ".meta.json";

#[derive(Debug, Serialize, Deserialize)]
struct Sidecar {
    content_type: String,
    metadata: ObjectMetadata,
}

/// Filesystem-backed store: `{root}/{bucket}/{key}`, with content type and
/// metadata in a `{key}.meta.json` sidecar next to each object.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a location to a path, refusing keys that escape the bucket.
    pub fn path_for(&self, location: &ObjectLocation) -> Result<PathBuf> {
        let relative = Path::new(&location.bucket).join(&location.key);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if escapes || location.bucket.is_empty() || location.key.is_empty() {
            return Err(Error::storage_with_context(
                format!("Object location is not a plain relative path: {}", location),
                ErrorContext::new().with_source("local_store"),
            ));
        }
        Ok(self.root.join(relative))
    }

    fn sidecar_path(path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_owned();
        name.push(SIDECAR_SUFFIX);
        PathBuf::from(name)
    }

    /// Content type and metadata written alongside an object, if any.
    pub async fn metadata(&self, location: &ObjectLocation) -> Result<Option<(String, ObjectMetadata)>> {
        let path = Self::sidecar_path(&self.path_for(location)?);
        match tokio::fs::read(&path).await {
            Ok(raw) => {
                let sidecar: Sidecar = serde_json::from_slice(&raw)?;
                Ok(Some((sidecar.content_type, sidecar.metadata)))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn get(&self, location: &ObjectLocation) -> Result<Bytes> {
        let path = self.path_for(location)?;
        match tokio::fs::read(&path).await {
            Ok(body) => Ok(Bytes::from(body)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::storage_with_context(
                format!("Object not found: {}", location),
                ErrorContext::new()
                    .with_details(path.display().to_string())
                    .with_source("local_store"),
            )),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(
        &self,
        location: &ObjectLocation,
        body: Bytes,
        content_type: &str,
        metadata: ObjectMetadata,
    ) -> Result<()> {
        let path = self.path_for(location)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &body).await?;

        let sidecar = Sidecar {
            content_type: content_type.to_string(),
            metadata,
        };
        tokio::fs::write(Self::sidecar_path(&path), serde_json::to_vec_pretty(&sidecar)?).await?;
        debug!(path = %path.display(), bytes = body.len(), "Object written");
        Ok(())
    }

    fn name(&self) -> &str {
        "local"
    }
}

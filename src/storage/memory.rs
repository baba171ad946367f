use super::{ObjectLocation, ObjectMetadata, ObjectStore, StoredObject};
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    objects: RwLock<HashMap<ObjectLocation, StoredObject>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object, typically a transcript for a test run.
    pub fn insert(&self, location: ObjectLocation, body: impl Into<Bytes>, content_type: &str) {
        let object = StoredObject {
            body: body.into(),
            content_type: content_type.to_string(),
            metadata: ObjectMetadata::new(),
        };
        self.objects
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .insert(location, object);
    }

    pub fn object(&self, location: &ObjectLocation) -> Option<StoredObject> {
        self.objects
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(location)
            .cloned()
    }

    pub fn keys(&self, bucket: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .objects
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .keys()
            .filter(|l| l.bucket == bucket)
            .map(|l| l.key.clone())
            .collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.objects.read().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn get(&self, location: &ObjectLocation) -> Result<Bytes> {
        self.object(location).map(|o| o.body).ok_or_else(|| {
            Error::storage_with_context(
                format!("Object not found: {}", location),
                ErrorContext::new().with_source("memory_store"),
            )
        })
    }

    async fn put(
        &self,
        location: &ObjectLocation,
        body: Bytes,
        content_type: &str,
        metadata: ObjectMetadata,
    ) -> Result<()> {
        let object = StoredObject {
            body,
            content_type: content_type.to_string(),
            metadata,
        };
        self.objects
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .insert(location.clone(), object);
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

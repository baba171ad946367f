//! Object storage collaborator: transcript input and document artifacts.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`ObjectStore`] | Async get/put by [`ObjectLocation`] |
//! | [`ObjectLocation`] | Bucket + key, parsed from `s3://` or HTTPS object URLs |
//! | [`InMemoryObjectStore`] | Map-backed store for tests and dry runs |
//! | [`LocalObjectStore`] | Buckets as directories under a root, metadata in sidecar JSON |

pub mod local;
pub mod location;
pub mod memory;

pub use local::LocalObjectStore;
pub use location::ObjectLocation;
pub use memory::InMemoryObjectStore;

use crate::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeMap;

/// Free-form string metadata attached to a stored object.
pub type ObjectMetadata = BTreeMap<String, String>;

/// A stored body with its content type and metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub body: Bytes,
    pub content_type: String,
    pub metadata: ObjectMetadata,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get(&self, location: &ObjectLocation) -> Result<Bytes>;

    async fn put(
        &self,
        location: &ObjectLocation,
        body: Bytes,
        content_type: &str,
        metadata: ObjectMetadata,
    ) -> Result<()>;

    fn name(&self) -> &str {
        "object-store"
    }
}

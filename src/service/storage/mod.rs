//! Object storage holding the page images.

pub mod supabase;

use std::{ops::Deref, sync::Arc};

use async_trait::async_trait;

use crate::base::types::{Res, Session};

// Traits.

/// Generic object storage client trait that clients must implement.
#[async_trait]
pub trait GenericStorageClient: Send + Sync + 'static {
    /// Download an object from the page image bucket.
    ///
    /// The path is relative to the bucket, e.g. `<user>/<review>/pages/page_1.png`.
    async fn download(&self, session: &Session, path: &str) -> Res<Vec<u8>>;
}

// Structs.

/// Storage client for the application.
///
/// This is trivially cloneable and can be passed around without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct StorageClient {
    inner: Arc<dyn GenericStorageClient>,
}

impl Deref for StorageClient {
    type Target = dyn GenericStorageClient;

    fn deref(&self) -> &Self::Target {
        &*self.inner
    }
}

impl StorageClient {
    pub fn new(inner: Arc<dyn GenericStorageClient>) -> Self {
        Self { inner }
    }
}

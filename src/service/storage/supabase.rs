//! Supabase storage implementation.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use tracing::{debug, instrument};

use crate::{
    base::{
        config::Config,
        types::{Res, Session},
    },
    service::supabase::{SupabaseHttp, check_response},
};

use super::{GenericStorageClient, StorageClient};

// Extra methods on `StorageClient` applied by the supabase implementation.

impl StorageClient {
    pub fn supabase(config: &Config) -> Res<Self> {
        let client = SupabaseStorageClient::new(config)?;
        Ok(Self { inner: Arc::new(client) })
    }
}

// Specific implementations.

/// Supabase storage client implementation.
#[derive(Clone)]
pub struct SupabaseStorageClient {
    http: SupabaseHttp,
    bucket: String,
}

impl SupabaseStorageClient {
    /// Create a new Supabase storage client for the configured bucket.
    pub fn new(config: &Config) -> Res<Self> {
        Ok(Self {
            http: SupabaseHttp::new(config)?,
            bucket: config.storage_bucket.clone(),
        })
    }
}

#[async_trait]
impl GenericStorageClient for SupabaseStorageClient {
    #[instrument(name = "SupabaseStorageClient::download", skip(self, session))]
    async fn download(&self, session: &Session, path: &str) -> Res<Vec<u8>> {
        let segments = ["storage", "v1", "object", "authenticated", self.bucket.as_str()].into_iter().chain(path.split('/').filter(|s| !s.is_empty()));
        let url = self.http.url(segments)?;

        let response = self.http.request(Method::GET, url, session).send().await?;
        let bytes = check_response(response).await?.bytes().await?;

        debug!("Downloaded {} bytes.", bytes.len());

        Ok(bytes.to_vec())
    }
}

//! Supabase auth implementation.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use tracing::instrument;

use crate::{
    base::{
        config::Config,
        types::{AuthenticatedUser, Res, Session},
    },
    service::supabase::{SupabaseHttp, check_response},
};

use super::{AuthClient, GenericAuthClient};

// Extra methods on `AuthClient` applied by the supabase implementation.

impl AuthClient {
    pub fn supabase(config: &Config) -> Res<Self> {
        let client = SupabaseAuthClient::new(config)?;
        Ok(Self { inner: Arc::new(client) })
    }
}

// Specific implementations.

/// Supabase auth client implementation.
#[derive(Clone)]
pub struct SupabaseAuthClient {
    http: SupabaseHttp,
}

impl SupabaseAuthClient {
    /// Create a new Supabase auth client.
    pub fn new(config: &Config) -> Res<Self> {
        Ok(Self { http: SupabaseHttp::new(config)? })
    }
}

#[async_trait]
impl GenericAuthClient for SupabaseAuthClient {
    #[instrument(name = "SupabaseAuthClient::get_user", skip_all)]
    async fn get_user(&self, session: &Session) -> Res<AuthenticatedUser> {
        let url = self.http.url(["auth", "v1", "user"])?;
        let response = self.http.request(Method::GET, url, session).send().await?;
        let user = check_response(response).await?.json::<AuthenticatedUser>().await?;

        Ok(user)
    }
}

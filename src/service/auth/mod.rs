//! Caller authentication.
//!
//! The service never verifies tokens itself: it hands the caller's token to
//! the backend and trusts the answer.

pub mod supabase;

use std::{ops::Deref, sync::Arc};

use async_trait::async_trait;
use tracing::{info, instrument, warn};

use crate::base::{
    error::ApiError,
    types::{AuthenticatedUser, Res, Session},
};

// Traits.

/// Generic auth client trait that clients must implement.
///
/// Implementing this trait allows a different identity backend to be used,
/// or a mock in tests.
#[async_trait]
pub trait GenericAuthClient: Send + Sync + 'static {
    /// Resolve the user that owns the session's access token.
    ///
    /// Fails if the backend rejects the token.
    async fn get_user(&self, session: &Session) -> Res<AuthenticatedUser>;
}

// Structs.

/// Auth client for the application.
///
/// This is trivially cloneable and can be passed around without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct AuthClient {
    inner: Arc<dyn GenericAuthClient>,
}

impl Deref for AuthClient {
    type Target = dyn GenericAuthClient;

    fn deref(&self) -> &Self::Target {
        &*self.inner
    }
}

impl AuthClient {
    pub fn new(inner: Arc<dyn GenericAuthClient>) -> Self {
        Self { inner }
    }

    /// Authenticate a caller from its `Authorization` and `apikey` header values.
    #[instrument(name = "AuthClient::authenticate", skip_all)]
    pub async fn authenticate(&self, authorization: Option<&str>, api_key: Option<&str>) -> Result<(Session, AuthenticatedUser), ApiError> {
        let session = session_from_headers(authorization, api_key)?;

        match self.get_user(&session).await {
            Ok(user) => {
                info!("Authenticated user `{}`.", user.id);
                Ok((session, user))
            }
            Err(err) => {
                warn!("Authentication failed: {err:#}");
                Err(ApiError::AuthenticationFailed)
            }
        }
    }
}

/// Build a session from raw header values.
///
/// Both headers are required; a leading `Bearer ` is stripped from the
/// authorization value.
pub fn session_from_headers(authorization: Option<&str>, api_key: Option<&str>) -> Result<Session, ApiError> {
    let (Some(authorization), Some(api_key)) = (authorization, api_key) else {
        return Err(ApiError::MissingAuthorization);
    };

    let access_token = authorization.strip_prefix("Bearer ").unwrap_or(authorization).trim();
    let api_key = api_key.trim();

    if access_token.is_empty() || api_key.is_empty() {
        return Err(ApiError::MissingAuthorization);
    }

    Ok(Session {
        access_token: access_token.to_string(),
        api_key: api_key.to_string(),
    })
}

// Tests.

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_from_headers() {
        let session = session_from_headers(Some("Bearer eyJhbGci"), Some("sb_publishable_123")).unwrap();

        assert_eq!(session.access_token, "eyJhbGci");
        assert_eq!(session.api_key, "sb_publishable_123");
    }

    #[test]
    fn test_session_accepts_bare_token() {
        let session = session_from_headers(Some("eyJhbGci"), Some("key")).unwrap();

        assert_eq!(session.access_token, "eyJhbGci");
    }

    #[test]
    fn test_session_requires_both_headers() {
        assert!(matches!(session_from_headers(None, Some("key")), Err(ApiError::MissingAuthorization)));
        assert!(matches!(session_from_headers(Some("Bearer t"), None), Err(ApiError::MissingAuthorization)));
        assert!(matches!(session_from_headers(Some("Bearer "), Some("key")), Err(ApiError::MissingAuthorization)));
    }
}

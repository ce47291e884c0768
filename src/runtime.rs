//! Runtime services and shared state for the review parser.

use tracing::{info, instrument};

use crate::{
    base::{
        config::Config,
        types::{Res, Void},
    },
    server,
    service::{auth::AuthClient, db::DbClient, llm::LlmClient, storage::StorageClient},
};

/// Runtime service context that can be shared across the application.
///
/// This struct holds the service clients and configuration.
/// It is designed to be trivially cloneable, allowing it to be passed around
/// without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct Runtime {
    /// The configuration for the application.
    pub config: Config,
    /// The auth client instance.
    pub auth: AuthClient,
    /// The database client instance.
    pub db: DbClient,
    /// The object storage client instance.
    pub storage: StorageClient,
    /// The LLM client instance.
    pub llm: LlmClient,
}

impl Runtime {
    /// Create a new runtime instance.
    #[instrument(skip_all)]
    pub fn new(config: Config) -> Res<Self> {
        // Initialize the backend clients.
        let auth = AuthClient::supabase(&config)?;
        let db = DbClient::supabase(&config)?;
        let storage = StorageClient::supabase(&config)?;

        // Initialize the LLM client.
        let llm = LlmClient::from_config(&config)?;

        info!("Using {:?} for extraction.", config.llm_provider);

        Ok(Self { config, auth, db, storage, llm })
    }

    /// Serve requests until shutdown.
    pub async fn start(&self) -> Void {
        server::serve(self.clone()).await
    }
}

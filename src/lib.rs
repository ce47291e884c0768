//! Library root for `review-parser`.
//!
//! Review-parser is a small HTTP backend that reads scanned pages of
//! systematic reviews and extracts:
//! - Forest plot statistics (effect type, pooled estimate, per-study results, heterogeneity)
//! - Risk of bias classifications for every study on the plot
//!
//! Page images, authentication, and persistence live in a Supabase project;
//! extraction is done by a vision LLM (Anthropic or OpenAI) forced through a
//! fixed tool schema. Each external service sits behind a trait so that
//! implementations can be swapped, or mocked in tests.

pub mod base;
pub mod interaction;
pub mod runtime;
pub mod server;
pub mod service;

use base::{config::Config, types::Void};
use rustls::crypto;
use tracing::info;

/// Public async entry for the binary crate.
///
/// Sets up necessary services and starts the review parser:
/// - Initializes the crypto provider
/// - Creates the runtime context with auth, database, storage, and LLM clients
/// - Serves HTTP requests until shutdown
pub async fn start(config: Config) -> Void {
    info!("Starting review-parser ...");

    // Start the crypto provider; another dependency may have installed one already.
    let _ = crypto::ring::default_provider().install_default();

    // Initialize the runtime.
    let runtime = runtime::Runtime::new(config)?;

    // Start the runtime.
    runtime.start().await?;

    Ok(())
}

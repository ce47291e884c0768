//! Relational storage for page sections and parsed reviews.

pub mod supabase;

use std::{ops::Deref, sync::Arc};

use async_trait::async_trait;

use crate::base::types::{PageSection, ParsedReview, ParsedReviewUpsert, Res, Session};

// Traits.

/// Generic database client trait that clients must implement.
///
/// This trait defines the two queries a parse request needs. Implementing
/// this trait allows different database backends to be used with the parser.
#[async_trait]
pub trait GenericDbClient: Send + Sync + 'static {
    /// Gets the image sections of a review page, ordered by section number.
    ///
    /// An empty list means the page does not exist (or is not visible to the caller).
    async fn get_page_sections(&self, session: &Session, review_id: &str, page_number: u32) -> Res<Vec<PageSection>>;

    /// Inserts or replaces the parsed data for a review, keyed by `review_id`.
    ///
    /// Returns the stored row.
    async fn upsert_parsed_review(&self, session: &Session, review: &ParsedReviewUpsert) -> Res<ParsedReview>;
}

// Structs.

/// Database client for the application.
///
/// This is trivially cloneable and can be passed around without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct DbClient {
    inner: Arc<dyn GenericDbClient>,
}

impl Deref for DbClient {
    type Target = dyn GenericDbClient;

    fn deref(&self) -> &Self::Target {
        &*self.inner
    }
}

impl DbClient {
    pub fn new(inner: Arc<dyn GenericDbClient>) -> Self {
        Self { inner }
    }
}

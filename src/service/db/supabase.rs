//! PostgREST implementation for review storage.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use tracing::{info, instrument};

use crate::{
    base::{
        config::Config,
        types::{PageSection, ParsedReview, ParsedReviewUpsert, Res, Session},
    },
    service::supabase::{SupabaseHttp, check_response},
};

use super::{DbClient, GenericDbClient};

/// Accept header asking PostgREST for a single object instead of an array.
const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";

// Extra methods on `DbClient` applied by the supabase implementation.

impl DbClient {
    pub fn supabase(config: &Config) -> Res<Self> {
        let client = SupabaseDbClient::new(config)?;
        Ok(Self { inner: Arc::new(client) })
    }
}

// Specific implementations.

/// PostgREST database client implementation.
#[derive(Clone)]
pub struct SupabaseDbClient {
    http: SupabaseHttp,
    pages_table: String,
    parsed_reviews_table: String,
}

impl SupabaseDbClient {
    /// Create a new PostgREST database client.
    pub fn new(config: &Config) -> Res<Self> {
        Ok(Self {
            http: SupabaseHttp::new(config)?,
            pages_table: config.pages_table.clone(),
            parsed_reviews_table: config.parsed_reviews_table.clone(),
        })
    }
}

/// Query string selecting the sections of one page, in order.
fn page_sections_query(review_id: &str, page_number: u32) -> Vec<(&'static str, String)> {
    vec![
        ("select", "image_path,section_number".to_string()),
        ("review_id", format!("eq.{review_id}")),
        ("page_number", format!("eq.{page_number}")),
        ("order", "section_number.asc".to_string()),
    ]
}

#[async_trait]
impl GenericDbClient for SupabaseDbClient {
    #[instrument(name = "SupabaseDbClient::get_page_sections", skip(self, session))]
    async fn get_page_sections(&self, session: &Session, review_id: &str, page_number: u32) -> Res<Vec<PageSection>> {
        let url = self.http.url(["rest", "v1", self.pages_table.as_str()])?;

        let response = self.http.request(Method::GET, url, session).query(&page_sections_query(review_id, page_number)).send().await?;
        let sections = check_response(response).await?.json::<Vec<PageSection>>().await?;

        info!("Page {} of review `{}` has {} sections.", page_number, review_id, sections.len());

        Ok(sections)
    }

    #[instrument(name = "SupabaseDbClient::upsert_parsed_review", skip_all, fields(review_id = %review.review_id))]
    async fn upsert_parsed_review(&self, session: &Session, review: &ParsedReviewUpsert) -> Res<ParsedReview> {
        let url = self.http.url(["rest", "v1", self.parsed_reviews_table.as_str()])?;

        let response = self
            .http
            .request(Method::POST, url, session)
            .query(&[("on_conflict", "review_id")])
            .header("Prefer", "resolution=merge-duplicates,return=representation")
            .header(reqwest::header::ACCEPT, SINGLE_OBJECT)
            .json(review)
            .send()
            .await?;

        let stored = check_response(response).await?.json::<ParsedReview>().await?;

        info!("Parsed review saved.");

        Ok(stored)
    }
}

// Tests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::skip_serializing_none;

pub type Err = anyhow::Error;
pub type Res<T> = Result<T, Err>;
pub type Void = Res<()>;

// Request.

/// Body of a parse request, as sent by the caller.
///
/// Every field is optional at this level so that a missing field can be
/// reported as such rather than as a generic deserialization failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParseReviewRequest {
    pub review_id: Option<String>,
    pub forest_plot_page: Option<u32>,
    pub rob_graph_page: Option<u32>,
}

/// A parse request with all of its fields present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewPages {
    pub review_id: String,
    pub forest_plot_page: u32,
    pub rob_graph_page: u32,
}

impl ParseReviewRequest {
    /// Returns the validated request, or `None` if any field is missing.
    ///
    /// An empty review id and a page number of `0` count as missing.
    pub fn validate(self) -> Option<ReviewPages> {
        let review_id = self.review_id.filter(|id| !id.trim().is_empty())?;
        let forest_plot_page = self.forest_plot_page.filter(|p| *p > 0)?;
        let rob_graph_page = self.rob_graph_page.filter(|p| *p > 0)?;

        Some(ReviewPages {
            review_id,
            forest_plot_page,
            rob_graph_page,
        })
    }
}

// Credentials.

/// Caller credentials, forwarded on every backend call so that row-level
/// security is evaluated as the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub access_token: String,
    pub api_key: String,
}

/// The user the backend resolved from a session's access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

// Pages.

/// One stored image fragment of a logical page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSection {
    pub image_path: String,
    #[serde(default)]
    pub section_number: Option<i32>,
}

/// A downloaded page section, ready to be attached to an LLM request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageImage {
    /// MIME type of the image, e.g. `image/png`.
    pub media_type: &'static str,
    /// Standard base64 of the raw image bytes.
    pub data: String,
}

impl PageImage {
    /// Renders the image as a `data:` URI.
    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.media_type, self.data)
    }
}

// Forest plot.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EffectEstimateType {
    RR,
    OR,
    MD,
    SMD,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestPlotStudy {
    /// Study label, formatted as `Author (Year)`.
    pub title: String,
    /// Weight in percent.
    pub weight: f64,
    pub point_estimate: f64,
    pub lower_ci: f64,
    pub upper_ci: f64,
    pub sample_size: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestPlotAggregatedStats {
    pub i_squared: f64,
    pub p_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestPlotData {
    pub effect_estimate_type: EffectEstimateType,
    pub pooled_estimate: f64,
    pub pooled_lower_ci: f64,
    pub pooled_upper_ci: f64,
    pub studies: Vec<ForestPlotStudy>,
    pub aggregated_stats: ForestPlotAggregatedStats,
}

impl ForestPlotData {
    /// Titles of every study on the plot, in plot order.
    pub fn study_titles(&self) -> Vec<String> {
        self.studies.iter().map(|s| s.title.clone()).collect()
    }
}

// Risk of bias.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskOfBias {
    Low,
    Uncertain,
    High,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BiasClassification {
    pub selection_bias_1: RiskOfBias,
    pub selection_bias_2: RiskOfBias,
    pub performance_bias: RiskOfBias,
    pub detection_bias: RiskOfBias,
    pub attrition_bias: RiskOfBias,
    pub reporting_bias: RiskOfBias,
    pub other_bias: RiskOfBias,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BiasStudy {
    pub title: String,
    pub bias_classification: BiasClassification,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BiasStudiesData {
    pub bias_studies: Vec<BiasStudy>,
}

// Persistence.

/// The row written to the parsed reviews table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedReviewUpsert {
    pub review_id: String,
    pub forest_plot_page: u32,
    pub rob_graph_page: u32,
    pub forest_plot_data: ForestPlotData,
    pub rob_graph_data: BiasStudiesData,
}

/// A parsed review row, as returned by the database.
///
/// Columns the service does not know about are kept in `extra` so the
/// caller receives the row unchanged.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedReview {
    pub id: Option<Value>,
    pub review_id: String,
    pub forest_plot_page: u32,
    pub rob_graph_page: u32,
    pub forest_plot_data: ForestPlotData,
    pub rob_graph_data: BiasStudiesData,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

// Tests.

//! Extraction prompts sent alongside page images.

/// Default directive for forest plot extraction.
pub const FOREST_PLOT_DIRECTIVE: &str = r#####"Extract from this forest plot:
- Effect type (RR/OR/MD/SMD)
- Pooled estimate with CI bounds
- Each study: title (format "Author (Year)"), weight %, point estimate, CI bounds, sample size
- I² and p-value

Extract values precisely as shown."#####;

/// Default directive for risk of bias extraction.
///
/// This is appended after the list of study titles.
pub const RISK_OF_BIAS_DIRECTIVE: &str = r#####"For each domain (selection_bias_1, selection_bias_2, performance_bias, detection_bias, attrition_bias, reporting_bias, other_bias):
- Green = "low", Yellow = "uncertain", Red = "high""#####;

/// Build the risk of bias prompt for the given studies.
///
/// The titles come from the forest plot so the model classifies the same
/// studies, using the same labels.
pub fn build_risk_of_bias_prompt(directive: &str, study_titles: &[String]) -> String {
    let studies = study_titles.iter().map(|t| format!("- {t}")).collect::<Vec<_>>().join("\n");

    format!("Extract risk of bias for these studies from the graph:\n{studies}\n\n{directive}")
}

// Tests.

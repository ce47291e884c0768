//! Fixed tool schemas used to coerce page images into typed JSON.
//!
//! Each schema mirrors one of the result types in [`crate::base::types`].
//! The LLM is forced to call the tool, so the tool input is the extraction.

use std::sync::OnceLock;

use serde_json::{Value, json};

/// A provider-agnostic tool definition.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
}

/// Name of the forest plot extraction tool.
pub const FOREST_PLOT_TOOL: &str = "extract_forest_plot";
/// Name of the risk of bias extraction tool.
pub const RISK_OF_BIAS_TOOL: &str = "extract_risk_of_bias";

/// The seven risk of bias domains, in graph order.
pub const BIAS_DOMAINS: [&str; 7] = [
    "selection_bias_1",
    "selection_bias_2",
    "performance_bias",
    "detection_bias",
    "attrition_bias",
    "reporting_bias",
    "other_bias",
];

// Statics.

static FOREST_PLOT_SPEC: OnceLock<ToolSpec> = OnceLock::new();
static RISK_OF_BIAS_SPEC: OnceLock<ToolSpec> = OnceLock::new();

/// Get the forest plot extraction tool.
pub fn forest_plot_tool() -> &'static ToolSpec {
    FOREST_PLOT_SPEC.get_or_init(|| ToolSpec {
        name: FOREST_PLOT_TOOL,
        description: "Extract structured data from a forest plot image",
        input_schema: json!({
            "type": "object",
            "properties": {
                "effect_estimate_type": { "type": "string", "enum": ["RR", "OR", "MD", "SMD"] },
                "pooled_estimate": { "type": "number" },
                "pooled_lower_ci": { "type": "number" },
                "pooled_upper_ci": { "type": "number" },
                "studies": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "title": { "type": "string" },
                            "weight": { "type": "number" },
                            "point_estimate": { "type": "number" },
                            "lower_ci": { "type": "number" },
                            "upper_ci": { "type": "number" },
                            "sample_size": { "type": "integer" }
                        },
                        "required": ["title", "weight", "point_estimate", "lower_ci", "upper_ci", "sample_size"]
                    }
                },
                "aggregated_stats": {
                    "type": "object",
                    "properties": {
                        "i_squared": { "type": "number" },
                        "p_value": { "type": "number" }
                    },
                    "required": ["i_squared", "p_value"]
                }
            },
            "required": ["effect_estimate_type", "pooled_estimate", "pooled_lower_ci", "pooled_upper_ci", "studies", "aggregated_stats"]
        }),
    })
}

/// Get the risk of bias extraction tool.
pub fn risk_of_bias_tool() -> &'static ToolSpec {
    RISK_OF_BIAS_SPEC.get_or_init(|| {
        let level = json!({ "type": "string", "enum": ["low", "uncertain", "high"] });
        let properties = BIAS_DOMAINS.iter().map(|d| (d.to_string(), level.clone())).collect::<serde_json::Map<_, _>>();

        ToolSpec {
            name: RISK_OF_BIAS_TOOL,
            description: "Extract risk of bias data from a risk of bias graph",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "bias_studies": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "title": { "type": "string" },
                                "bias_classification": {
                                    "type": "object",
                                    "properties": properties,
                                    "required": BIAS_DOMAINS
                                }
                            },
                            "required": ["title", "bias_classification"]
                        }
                    }
                },
                "required": ["bias_studies"]
            }),
        }
    })
}

// Tests.

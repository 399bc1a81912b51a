use serde::Serialize;

use crate::error::ErrorKind;

/// Why one candidate call was rejected while searching for an order-free match.
#[derive(Clone, Debug, Serialize)]
pub struct SubError {
    pub model_result_index: usize,
    pub sub_error: Vec<String>,
    pub sub_error_type: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_result_item: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub possible_answer_item: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_executed_output: Option<serde_json::Value>,
}

impl SubError {
    pub fn from_result(model_result_index: usize, result: &MatchResult) -> Self {
        Self {
            model_result_index,
            sub_error: result.errors.clone(),
            sub_error_type: result.kind,
            model_result_item: None,
            possible_answer_item: None,
            model_executed_output: result.model_executed_output.clone(),
        }
    }
}

/// Outcome of every matcher and comparator. Failures are data, never panics.
#[derive(Clone, Debug, Serialize)]
pub struct MatchResult {
    pub valid: bool,
    #[serde(rename = "error")]
    pub errors: Vec<String>,
    #[serde(rename = "error_type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sub_errors: Vec<SubError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_executed_output: Option<serde_json::Value>,
    /// Set when the value was judged to be a variable reference instead of a literal.
    #[serde(skip)]
    pub is_variable: bool,
}

impl MatchResult {
    pub fn success() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            kind: None,
            sub_errors: Vec::new(),
            model_executed_output: None,
            is_variable: false,
        }
    }

    pub fn failure(kind: ErrorKind, error: impl Into<String>) -> Self {
        Self {
            valid: false,
            errors: vec![error.into()],
            kind: Some(kind),
            sub_errors: Vec::new(),
            model_executed_output: None,
            is_variable: false,
        }
    }

    pub fn with_executed_output(mut self, output: serde_json::Value) -> Self {
        self.model_executed_output = Some(output);
        self
    }

    pub fn with_sub_errors(mut self, sub_errors: Vec<SubError>) -> Self {
        self.sub_errors = sub_errors;
        self
    }
}

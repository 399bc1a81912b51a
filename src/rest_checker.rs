use std::{collections::BTreeSet, path::Path, time::Duration};

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::{
    config::CheckerConfig,
    error::{ErrorKind, Result},
    match_result::MatchResult,
    sandbox::RestRequest,
    utils::load_json_lines,
};

const GEOCODE_HOST: &str = "https://geocode.maps.co";
/// Upper bound on a per-request `timeout=` argument.
const MAX_REQUEST_TIMEOUT: Duration = Duration::from_secs(600);

/// Recorded REST responses, one per test case, indexed by test position.
/// Loaded once and shared read-only.
#[derive(Clone, Debug, Default)]
pub struct RestGroundTruth {
    responses: Vec<Value>,
}

impl RestGroundTruth {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let responses = load_json_lines(path)?;
        debug!(count = responses.len(), "loaded REST ground truth");
        Ok(Self { responses })
    }

    pub fn from_values(responses: Vec<Value>) -> Self {
        Self { responses }
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.responses.get(index)
    }

    pub fn len(&self) -> usize {
        self.responses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.responses.is_empty()
    }
}

/// Sends the `requests.get` expression and compares the response's key shape
/// with the recorded response at `index`.
pub fn check_rest_response(
    call: &str,
    index: usize,
    ground_truth: &RestGroundTruth,
    config: &CheckerConfig,
) -> MatchResult {
    if call.contains(GEOCODE_HOST) {
        std::thread::sleep(config.geocode_delay());
    }

    let request = match RestRequest::parse(call) {
        Ok(request) => request,
        Err(e) => {
            return MatchResult::failure(
                ErrorKind::RestExecutionError,
                format!("Execution failed. {}", e),
            );
        }
    };
    let timeout = request
        .timeout_secs
        .filter(|t| *t > 0.0)
        .and_then(|t| Duration::try_from_secs_f64(t).ok())
        .map(|t| t.min(MAX_REQUEST_TIMEOUT))
        .unwrap_or_else(|| config.rest_timeout());

    let response = reqwest::blocking::Client::builder()
        .timeout(timeout)
        .build()
        .and_then(|client| {
            let mut builder = client.get(&request.url).query(&request.params);
            for (name, value) in &request.headers {
                builder = builder.header(name.as_str(), value.as_str());
            }
            builder.send()
        });
    let response = match response {
        Ok(response) => response,
        Err(e) => {
            warn!(url = %request.url, error = %e, "REST request failed");
            return MatchResult::failure(
                ErrorKind::RestExecutionError,
                format!("Execution failed. {}", e),
            );
        }
    };

    let status = response.status();
    if status.as_u16() != 200 {
        return MatchResult::failure(
            ErrorKind::RestWrongStatusCode,
            format!(
                "Execution result status code is not 200, got {}",
                status.as_u16()
            ),
        );
    }

    let Some(expected) = ground_truth.get(index) else {
        return MatchResult::failure(
            ErrorKind::RestCannotGetStatusCode,
            format!("No recorded response for test case index {}.", index),
        );
    };

    let body: Value = match response.json() {
        Ok(body) => body,
        Err(e) => {
            return MatchResult::failure(
                ErrorKind::RestResponseFormatError,
                format!(
                    "Error in execution and type checking. Status code: {}. Error: {}",
                    status.as_u16(),
                    e
                ),
            );
        }
    };
    compare_response_shape(&body, expected)
}

fn key_set(map: &Map<String, Value>) -> BTreeSet<&str> {
    map.keys().map(String::as_str).collect()
}

/// Dict responses need the recorded key set; list responses need the recorded
/// length and, element by element, the recorded key sets.
pub fn compare_response_shape(body: &Value, expected: &Value) -> MatchResult {
    match (expected, body) {
        (Value::Object(wanted), Value::Object(actual)) => {
            if key_set(wanted) == key_set(actual) {
                MatchResult::success()
            } else {
                MatchResult::failure(ErrorKind::RestWrongKey, "Key inconsistency")
            }
        }
        (Value::Object(_), other) => MatchResult::failure(
            ErrorKind::RestWrongType,
            format!("Expected dictionary, but got {}", json_type_name(other)),
        ),
        (Value::Array(wanted), Value::Array(actual)) => {
            if wanted.len() != actual.len() {
                return MatchResult::failure(
                    ErrorKind::RestResultCount,
                    "Response list length inconsistency.",
                );
            }
            for (wanted, actual) in wanted.iter().zip(actual) {
                let (Value::Object(wanted), Value::Object(actual)) = (wanted, actual) else {
                    return MatchResult::failure(
                        ErrorKind::RestResponseFormatError,
                        "Error in execution and type checking. List elements must be dictionaries.",
                    );
                };
                if key_set(wanted) != key_set(actual) {
                    return MatchResult::failure(ErrorKind::RestWrongKey, "Key inconsistency");
                }
            }
            MatchResult::success()
        }
        (Value::Array(_), other) => MatchResult::failure(
            ErrorKind::RestWrongType,
            format!("Expected list, but got {}", json_type_name(other)),
        ),
        (_, other) => MatchResult::failure(
            ErrorKind::RestWrongType,
            format!("Expected dict or list, but got {}", json_type_name(other)),
        ),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}

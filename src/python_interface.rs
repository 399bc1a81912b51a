use pyo3::{exceptions::PyValueError, prelude::*};
use serde::Deserialize;
use serde_json::Value;

use crate::{
    ast_checker::{AstCheckOptions, ast_checker},
    config::CheckerConfig,
    decoder::decoder_for_model,
    error::{CheckerError, ErrorKind, Result},
    eval_runner::TestCategory,
    exec_checker::{ExecContext, ExpectedExecution, exec_checker},
    function_doc::ToolList,
    match_result::MatchResult,
    possible_answer::MultiPossibleAnswer,
    reference_library::{Credentials, StandardLibrary},
};

/// `{"function": ..., "model_result": ..., "possible_answer": ..., "test_category": ...}`
#[derive(Deserialize)]
struct AstRequest {
    function: ToolList,
    model_result: Value,
    possible_answer: MultiPossibleAnswer,
    test_category: TestCategory,
}

/// `{"model_result": ..., "expected": [{"value": ..., "mode": ...}], "test_category": ...}`
#[derive(Deserialize)]
struct ExecRequest {
    model_result: Value,
    expected: Vec<ExpectedExecution>,
    test_category: TestCategory,
}

/// Checks single cases from Python. Requests and results are JSON strings.
#[pyclass]
pub struct BfclChecker {
    pub model_name: String,
    pub config: CheckerConfig,
    pub library: StandardLibrary,
}

#[pymethods]
impl BfclChecker {
    #[new]
    pub fn new(model_name: String) -> PyResult<Self> {
        Self::new_helper(model_name).map_err(|e| PyValueError::new_err(e.to_string()))
    }

    /// Returns the match result as `{"valid": bool, "error": [...], "error_type": str}`.
    pub fn check_ast(&self, request: String) -> PyResult<String> {
        self.check_ast_helper(&request)
            .map_err(|e| PyValueError::new_err(e.to_string()))
    }

    pub fn check_exec(&self, request: String) -> PyResult<String> {
        self.check_exec_helper(&request)
            .map_err(|e| PyValueError::new_err(e.to_string()))
    }
}

impl BfclChecker {
    pub fn new_helper(model_name: String) -> Result<Self> {
        let config = CheckerConfig::from_env()?;
        let library = StandardLibrary::new(Credentials::from_env());
        Ok(Self {
            model_name,
            config,
            library,
        })
    }

    pub fn check_ast_helper(&self, request: &str) -> Result<String> {
        let request: AstRequest = serde_json::from_str(request)?;
        let language = request.test_category.language();
        let decoder = decoder_for_model(&self.model_name);
        let result = match decoder.decode_ast(&request.model_result, language) {
            Ok(calls) => ast_checker(
                &request.function,
                &calls,
                &request.possible_answer,
                language,
                request.test_category,
                &AstCheckOptions {
                    enforce_order: false,
                    model_forbids_dots: self.config.model_forbids_dots(&self.model_name),
                },
            ),
            Err(e) => MatchResult::failure(
                ErrorKind::AstDecoderFailed,
                format!("Invalid syntax. Failed to decode AST. {}", e),
            ),
        };
        Ok(serde_json::to_string(&result)?)
    }

    pub fn check_exec_helper(&self, request: &str) -> Result<String> {
        let request: ExecRequest = serde_json::from_str(request)?;
        let decoder = decoder_for_model(&self.model_name);
        let result = match decoder.decode_execute(&request.model_result) {
            Ok(calls) => {
                let ctx = ExecContext {
                    library: &self.library,
                    config: &self.config,
                };
                exec_checker(&calls, &request.expected, request.test_category, &ctx)?
            }
            Err(e) => MatchResult::failure(
                ErrorKind::ExecDecoderFailed,
                format!("Failed to decode executable. {}", e),
            ),
        };
        serde_json::to_string(&result).map_err(CheckerError::from)
    }
}

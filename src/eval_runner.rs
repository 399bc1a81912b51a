use std::{fmt, path::Path, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::{
    ast_checker::{AstCheckOptions, ast_checker},
    config::CheckerConfig,
    decoder::{ModelDecoder, decoder_for_model},
    error::{CheckerError, ErrorKind, Result},
    exec_checker::{ComparisonMode, ExecContext, ExpectedExecution, exec_checker},
    function_doc::ToolList,
    match_result::{MatchResult, SubError},
    parse_ast::DecodedCall,
    paths::{model_result_file, possible_answer_file, prompt_file, score_file},
    possible_answer::{MultiPossibleAnswer, SimplePossibleAnswer},
    reference_library::ReferenceLibrary,
    rest_checker::{RestGroundTruth, check_rest_response},
    type_reconciler::Language,
    utils::{load_json_lines, write_json_lines_to_file},
};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TestCategory {
    Simple,
    MultipleFunction,
    ParallelFunction,
    ParallelMultipleFunction,
    Java,
    Javascript,
    Relevance,
    ExecutableSimple,
    ExecutableMultipleFunction,
    ExecutableParallelFunction,
    ExecutableParallelMultipleFunction,
    Rest,
}

impl TestCategory {
    pub const ALL: [TestCategory; 12] = [
        TestCategory::Simple,
        TestCategory::MultipleFunction,
        TestCategory::ParallelFunction,
        TestCategory::ParallelMultipleFunction,
        TestCategory::Java,
        TestCategory::Javascript,
        TestCategory::Relevance,
        TestCategory::ExecutableSimple,
        TestCategory::ExecutableMultipleFunction,
        TestCategory::ExecutableParallelFunction,
        TestCategory::ExecutableParallelMultipleFunction,
        TestCategory::Rest,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TestCategory::Simple => "simple",
            TestCategory::MultipleFunction => "multiple_function",
            TestCategory::ParallelFunction => "parallel_function",
            TestCategory::ParallelMultipleFunction => "parallel_multiple_function",
            TestCategory::Java => "java",
            TestCategory::Javascript => "javascript",
            TestCategory::Relevance => "relevance",
            TestCategory::ExecutableSimple => "executable_simple",
            TestCategory::ExecutableMultipleFunction => "executable_multiple_function",
            TestCategory::ExecutableParallelFunction => "executable_parallel_function",
            TestCategory::ExecutableParallelMultipleFunction => {
                "executable_parallel_multiple_function"
            }
            TestCategory::Rest => "rest",
        }
    }

    pub fn language(&self) -> Language {
        match self {
            TestCategory::Java => Language::Java,
            TestCategory::Javascript => Language::JavaScript,
            _ => Language::Python,
        }
    }

    /// Categories that expect several calls in one turn.
    pub fn is_multi_call(&self) -> bool {
        let name = self.as_str();
        name.contains("multiple") || name.contains("parallel")
    }

    pub fn is_executable(&self) -> bool {
        self.as_str().starts_with("executable") || self.is_rest()
    }

    pub fn is_rest(&self) -> bool {
        matches!(self, TestCategory::Rest)
    }

    pub fn is_relevance(&self) -> bool {
        matches!(self, TestCategory::Relevance)
    }
}

impl fmt::Display for TestCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TestCategory {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        TestCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown test category: {}", s))
    }
}

/// One line of a prompt file.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct TestEntry {
    #[serde(default)]
    pub question: Value,
    pub function: ToolList,
    #[serde(default)]
    pub execution_result: Vec<Value>,
    #[serde(default)]
    pub execution_result_type: Vec<ComparisonMode>,
}

impl TestEntry {
    /// Pairs each recorded result with its comparison mode; missing modes mean exact match.
    pub fn expected_executions(&self) -> Vec<ExpectedExecution> {
        self.execution_result
            .iter()
            .enumerate()
            .map(|(i, value)| {
                let mode = self.execution_result_type.get(i).copied().unwrap_or_default();
                ExpectedExecution::new(value.clone(), mode)
            })
            .collect()
    }
}

/// Ground truth of one AST case after resolving its record shape.
#[derive(Clone, Debug)]
pub enum PossibleAnswerRecord {
    Empty,
    /// `{"name": ...}` with no `arguments`: an argument-less tool matched by name.
    Builtin(String),
    Calls(MultiPossibleAnswer),
}

impl PossibleAnswerRecord {
    pub fn from_json(value: &Value) -> Result<Self> {
        if is_empty_value(value) {
            return Ok(PossibleAnswerRecord::Empty);
        }
        if matches!(value.get("name"), Some(Value::String(_))) {
            let simple: SimplePossibleAnswer = serde_json::from_value(value.clone())?;
            if simple.is_builtin() {
                return Ok(PossibleAnswerRecord::Builtin(simple.name));
            }
            return Ok(PossibleAnswerRecord::Calls(simple.into_expected().into()));
        }
        MultiPossibleAnswer::from_json(value)
            .map(PossibleAnswerRecord::Calls)
            .map_err(CheckerError::Config)
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// Diagnostic record for one failed case in a score file.
#[derive(Serialize, Clone, Debug)]
pub struct ScoreRecord {
    pub id: usize,
    pub model_name: String,
    pub test_category: TestCategory,
    pub valid: bool,
    pub error: Vec<String>,
    pub error_type: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sub_errors: Vec<SubError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub func_description: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_result_raw: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_result_decoded: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub possible_answer: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_executed_output: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct EvaluationSummary {
    pub accuracy: f64,
    pub correct_count: usize,
    pub total_count: usize,
}

#[derive(Serialize, Clone, Debug)]
pub struct CategoryScore {
    pub accuracy: f64,
    pub correct_count: usize,
    pub total_count: usize,
    pub records: Vec<ScoreRecord>,
}

impl CategoryScore {
    fn new(correct_count: usize, total_count: usize, records: Vec<ScoreRecord>) -> Self {
        let accuracy = if total_count == 0 {
            0.0
        } else {
            correct_count as f64 / total_count as f64
        };
        Self {
            accuracy,
            correct_count,
            total_count,
            records,
        }
    }

    pub fn summary(&self) -> EvaluationSummary {
        EvaluationSummary {
            accuracy: self.accuracy,
            correct_count: self.correct_count,
            total_count: self.total_count,
        }
    }
}

/// Writes the summary line followed by one line per failed case.
pub fn write_score_file(path: impl AsRef<Path>, score: &CategoryScore) -> Result<()> {
    let mut lines = Vec::with_capacity(score.records.len() + 1);
    lines.push(serde_json::to_value(score.summary())?);
    for record in &score.records {
        lines.push(serde_json::to_value(record)?);
    }
    write_json_lines_to_file(path, &lines)
}

fn parse_test_entry(prompt: &Value) -> std::result::Result<TestEntry, String> {
    serde_json::from_value(prompt.clone()).map_err(|e| format!("Malformed prompt entry: {}", e))
}

fn model_raw_result(record: &Value) -> Value {
    record.get("result").cloned().unwrap_or(Value::Null)
}

fn decoded_to_json(calls: &[DecodedCall]) -> Value {
    Value::Array(calls.iter().map(DecodedCall::to_json).collect())
}

fn check_lengths(model_result: usize, prompt: usize, possible_answer: usize) -> Result<()> {
    if model_result != prompt || model_result != possible_answer {
        return Err(CheckerError::LengthMismatch {
            model_result,
            prompt,
            possible_answer,
        });
    }
    Ok(())
}

fn is_rest_format_output(calls: &[String]) -> bool {
    matches!(calls, [call] if call.trim_start().starts_with("requests.get(") || call.trim_start().starts_with("requests_get("))
}

fn is_executable_format_output(calls: &[String]) -> bool {
    !calls.is_empty() && calls.iter().all(|c| !c.trim().is_empty())
}

/// Scores one model's result files, one category at a time.
pub struct EvalRunner<'a> {
    model_name: String,
    decoder: Box<dyn ModelDecoder>,
    config: &'a CheckerConfig,
    library: &'a dyn ReferenceLibrary,
    rest_ground_truth: Option<&'a RestGroundTruth>,
    enforce_order: bool,
}

impl<'a> EvalRunner<'a> {
    pub fn new(
        model_name: impl Into<String>,
        config: &'a CheckerConfig,
        library: &'a dyn ReferenceLibrary,
    ) -> Self {
        let model_name = model_name.into();
        Self {
            decoder: decoder_for_model(&model_name),
            model_name,
            config,
            library,
            rest_ground_truth: None,
            enforce_order: false,
        }
    }

    pub fn with_decoder(mut self, decoder: Box<dyn ModelDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn with_rest_ground_truth(mut self, ground_truth: &'a RestGroundTruth) -> Self {
        self.rest_ground_truth = Some(ground_truth);
        self
    }

    /// Check multi-call categories positionally.
    pub fn with_enforced_order(mut self, enforce_order: bool) -> Self {
        self.enforce_order = enforce_order;
        self
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    fn record(&self, id: usize, category: TestCategory, result: MatchResult) -> ScoreRecord {
        ScoreRecord {
            id,
            model_name: self.model_name.clone(),
            test_category: category,
            valid: result.valid,
            error: result.errors,
            error_type: result.kind,
            sub_errors: result.sub_errors,
            func_description: None,
            model_result_raw: None,
            model_result_decoded: None,
            possible_answer: None,
            model_executed_output: result.model_executed_output,
        }
    }

    /// Loads the category's files from the configured directories and scores them.
    pub fn run_category(&self, category: TestCategory) -> Result<CategoryScore> {
        let model_results = load_json_lines(model_result_file(
            &self.config.result_dir,
            &self.model_name,
            category.as_str(),
        ))?;
        if category.is_relevance() {
            return Ok(self.run_relevance(category, &model_results));
        }
        let prompts = load_json_lines(prompt_file(&self.config.data_dir, category.as_str()))?;
        if category.is_executable() {
            return self.run_executable(category, &model_results, &prompts);
        }
        let possible_answers = load_json_lines(possible_answer_file(
            &self.config.data_dir,
            category.as_str(),
        ))?;
        self.run_ast(category, &model_results, &prompts, &possible_answers)
    }

    /// Runs every category whose result file exists and writes its score file.
    pub fn evaluate_all(&self, categories: &[TestCategory]) -> Result<Vec<(TestCategory, EvaluationSummary)>> {
        let mut summaries = Vec::new();
        for &category in categories {
            let result_path =
                model_result_file(&self.config.result_dir, &self.model_name, category.as_str());
            if !result_path.exists() {
                warn!(path = %result_path.display(), "result file not found, skipping");
                continue;
            }
            let score = self.run_category(category)?;
            let output = score_file(&self.config.score_output_dir, &self.model_name, category.as_str());
            write_score_file(&output, &score)?;
            info!(
                model = self.model_name.as_str(),
                %category,
                accuracy = score.accuracy,
                correct = score.correct_count,
                total = score.total_count,
                "category evaluated"
            );
            summaries.push((category, score.summary()));
        }
        Ok(summaries)
    }

    pub fn run_ast(
        &self,
        category: TestCategory,
        model_results: &[Value],
        prompts: &[Value],
        possible_answers: &[Value],
    ) -> Result<CategoryScore> {
        check_lengths(model_results.len(), prompts.len(), possible_answers.len())?;
        let language = category.language();
        let options = AstCheckOptions {
            enforce_order: self.enforce_order,
            model_forbids_dots: self.config.model_forbids_dots(&self.model_name),
        };

        let mut records = Vec::new();
        let mut correct_count = 0;
        for (i, ((model_record, prompt), answer)) in
            model_results.iter().zip(prompts).zip(possible_answers).enumerate()
        {
            let id = i + 1;
            let raw = model_raw_result(model_record);
            let with_context = |mut record: ScoreRecord| {
                record.func_description = Some(prompt.clone());
                record.model_result_raw = Some(raw.clone());
                record.possible_answer = Some(answer.clone());
                record
            };
            let parsed = parse_test_entry(prompt).and_then(|entry| {
                PossibleAnswerRecord::from_json(answer)
                    .map(|expected| (entry, expected))
                    .map_err(|e| format!("Malformed possible answer: {}", e))
            });
            let (entry, expected) = match parsed {
                Ok(parsed) => parsed,
                Err(message) => {
                    warn!(id, %category, message = message.as_str(), "malformed test entry");
                    let failure = MatchResult::failure(ErrorKind::MalformedTestEntry, message);
                    records.push(with_context(self.record(id, category, failure)));
                    continue;
                }
            };

            let raw_empty = is_empty_value(&raw);
            let expected_calls = match expected {
                PossibleAnswerRecord::Empty if raw_empty => {
                    correct_count += 1;
                    continue;
                }
                PossibleAnswerRecord::Empty => {
                    let failure = MatchResult::failure(
                        ErrorKind::EmptyPossibleAnswer,
                        "The possible answer is empty, but the model output is not.",
                    );
                    records.push(with_context(self.record(id, category, failure)));
                    continue;
                }
                _ if raw_empty => {
                    let failure = MatchResult::failure(
                        ErrorKind::EmptyModelOutput,
                        "The model output is empty, but the possible answer is not.",
                    );
                    records.push(with_context(self.record(id, category, failure)));
                    continue;
                }
                PossibleAnswerRecord::Builtin(name) => {
                    let named = raw.get("name").and_then(Value::as_str) == Some(name.as_str());
                    if named && raw.get("arguments").is_none() {
                        correct_count += 1;
                    } else {
                        let failure = MatchResult::failure(
                            ErrorKind::BuiltinFunction,
                            "The possible answer is a built-in function, but the model output does not satisfy the requirement.",
                        );
                        records.push(with_context(self.record(id, category, failure)));
                    }
                    continue;
                }
                PossibleAnswerRecord::Calls(calls) => calls,
            };

            let decoded = match self.decoder.decode_ast(&raw, language) {
                Ok(decoded) => decoded,
                Err(e) => {
                    debug!(id, error = %e, "AST decoding failed");
                    let failure = MatchResult::failure(
                        ErrorKind::AstDecoderFailed,
                        format!("Invalid syntax. Failed to decode AST. {}", e),
                    );
                    records.push(with_context(self.record(id, category, failure)));
                    continue;
                }
            };
            if decoded.is_empty() || decoded.iter().any(|c| c.name.is_empty()) {
                let failure = MatchResult::failure(
                    ErrorKind::AstDecoderWrongOutputFormat,
                    "Did not output in the specified format.",
                );
                let mut record = with_context(self.record(id, category, failure));
                record.model_result_decoded = Some(decoded_to_json(&decoded));
                records.push(record);
                continue;
            }

            let result = ast_checker(
                &entry.function,
                &decoded,
                &expected_calls,
                language,
                category,
                &options,
            );
            if result.valid {
                correct_count += 1;
            } else {
                let mut record = with_context(self.record(id, category, result));
                record.model_result_decoded = Some(decoded_to_json(&decoded));
                records.push(record);
            }
        }
        Ok(CategoryScore::new(correct_count, model_results.len(), records))
    }

    pub fn run_executable(
        &self,
        category: TestCategory,
        model_results: &[Value],
        prompts: &[Value],
    ) -> Result<CategoryScore> {
        check_lengths(model_results.len(), prompts.len(), prompts.len())?;
        let ctx = ExecContext {
            library: self.library,
            config: self.config,
        };

        let mut records = Vec::new();
        let mut correct_count = 0;
        for (i, (model_record, prompt)) in model_results.iter().zip(prompts).enumerate() {
            let id = i + 1;
            let raw = model_raw_result(model_record);
            let with_context = |mut record: ScoreRecord| {
                record.func_description = Some(prompt.clone());
                record.model_result_raw = Some(raw.clone());
                record
            };

            let decoded = match self.decoder.decode_execute(&raw) {
                Ok(decoded) => decoded,
                Err(e) => {
                    debug!(id, error = %e, "executable decoding failed");
                    let failure = MatchResult::failure(
                        ErrorKind::ExecDecoderFailed,
                        format!("Failed to decode executable. {}", e),
                    );
                    records.push(with_context(self.record(id, category, failure)));
                    continue;
                }
            };
            let decoded_json = json!(decoded);

            let result = if category.is_rest() {
                if !is_rest_format_output(&decoded) {
                    let failure = MatchResult::failure(
                        ErrorKind::RestDecoderWrongOutputFormat,
                        "Did not output in the specified format.",
                    );
                    let mut record = with_context(self.record(id, category, failure));
                    record.model_result_decoded = Some(decoded_json);
                    records.push(record);
                    continue;
                }
                let ground_truth = self.rest_ground_truth.ok_or_else(|| {
                    CheckerError::Config("the rest category needs the REST ground truth file".to_string())
                })?;
                check_rest_response(&decoded[0], i, ground_truth, self.config)
            } else {
                if !is_executable_format_output(&decoded) {
                    let failure = MatchResult::failure(
                        ErrorKind::ExecDecoderWrongOutputFormat,
                        "Did not output in the specified format.",
                    );
                    let mut record = with_context(self.record(id, category, failure));
                    record.model_result_decoded = Some(decoded_json);
                    records.push(record);
                    continue;
                }
                match parse_test_entry(prompt) {
                    Ok(entry) => exec_checker(&decoded, &entry.expected_executions(), category, &ctx)?,
                    Err(message) => {
                        warn!(id, %category, message = message.as_str(), "malformed test entry");
                        MatchResult::failure(ErrorKind::MalformedTestEntry, message)
                    }
                }
            };

            if result.valid {
                correct_count += 1;
            } else {
                let mut record = with_context(self.record(id, category, result));
                record.model_result_decoded = Some(decoded_json);
                records.push(record);
            }
        }
        Ok(CategoryScore::new(correct_count, model_results.len(), records))
    }

    /// A relevance case passes when the model produced no call: decoding
    /// fails or yields nothing.
    pub fn run_relevance(&self, category: TestCategory, model_results: &[Value]) -> CategoryScore {
        let mut records = Vec::new();
        let mut correct_count = 0;
        for (i, model_record) in model_results.iter().enumerate() {
            let raw = model_raw_result(model_record);
            match self.decoder.decode_ast(&raw, Language::Python) {
                Ok(decoded) if !decoded.is_empty() => {
                    let failure = MatchResult::failure(
                        ErrorKind::RelevanceDecoderSuccess,
                        "Valid syntax. Successfully decode AST when it should not.",
                    );
                    let mut record = self.record(i + 1, category, failure);
                    record.model_result_raw = Some(raw);
                    record.model_result_decoded = Some(decoded_to_json(&decoded));
                    records.push(record);
                }
                _ => correct_count += 1,
            }
        }
        CategoryScore::new(correct_count, model_results.len(), records)
    }
}

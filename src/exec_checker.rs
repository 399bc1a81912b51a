//! Execution-based verification: run the call in the sandbox, then compare
//! its result with the recorded one.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::{
    config::CheckerConfig,
    error::{CheckerError, ErrorKind, ExecError, Result},
    eval_runner::TestCategory,
    match_result::{MatchResult, SubError},
    parse_ast::python_str_repr,
    reference_library::ReferenceLibrary,
    sandbox::Sandbox,
    type_reconciler::runtime_type_of,
    value_normalizer::values_equal,
};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonMode {
    #[default]
    ExactMatch,
    RealTimeMatch,
    /// Any unrecognized mode falls back to comparing shape only.
    #[serde(other)]
    StructuralMatch,
}

/// The recorded result of one expected call and how to compare against it.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ExpectedExecution {
    pub value: Value,
    pub mode: ComparisonMode,
}

impl ExpectedExecution {
    pub fn new(value: Value, mode: ComparisonMode) -> Self {
        Self { value, mode }
    }
}

/// Everything an execution check needs besides its inputs.
#[derive(Clone, Copy)]
pub struct ExecContext<'a> {
    pub library: &'a dyn ReferenceLibrary,
    pub config: &'a CheckerConfig,
}

/// Runs `call` and compares its result with `expected` under `mode`.
/// `sanity_check` relaxes dictionary comparison to equal cardinality.
///
/// A missing credential aborts with `Err`; every other failure is a `MatchResult`.
pub fn check_executed_simple(
    call: &str,
    expected: &Value,
    mode: ComparisonMode,
    sanity_check: bool,
    ctx: &ExecContext<'_>,
) -> Result<MatchResult> {
    let output = match Sandbox::new(ctx.library).evaluate(call) {
        Ok(output) => output,
        Err(ExecError::MissingCredential(key)) => return Err(CheckerError::MissingCredential(key)),
        Err(e) => {
            warn!(call, error = %e, "execution failed");
            return Ok(MatchResult::failure(
                ErrorKind::ExecutionError,
                format!("Error in execution: {}. Error: {}", python_str_repr(call), e),
            ));
        }
    };
    let output = output.normalize_tuples().to_json();

    let result = match mode {
        ComparisonMode::ExactMatch => {
            if values_equal(&output, expected) {
                MatchResult::success()
            } else {
                MatchResult::failure(
                    ErrorKind::WrongResult,
                    format!(
                        "Wrong execution result for {}. Expected: {}, but got: {}.",
                        python_str_repr(call),
                        expected,
                        output
                    ),
                )
                .with_executed_output(output)
            }
        }
        ComparisonMode::RealTimeMatch => {
            real_time_match(call, &output, expected, ctx.config.real_time_tolerance)
        }
        ComparisonMode::StructuralMatch => pattern_match(call, &output, expected, sanity_check),
    };
    Ok(result)
}

fn real_time_match(call: &str, output: &Value, expected: &Value, tolerance: f64) -> MatchResult {
    let (Some(actual), Some(target)) = (output.as_f64(), expected.as_f64()) else {
        return MatchResult::failure(
            ErrorKind::WrongResultRealTime,
            format!(
                "Wrong execution result for {}. Expected: {}, but got: {}. Type needs to be float or int for real time match criteria.",
                python_str_repr(call),
                expected,
                output
            ),
        )
        .with_executed_output(output.clone());
    };
    let (a, b) = (target * (1.0 - tolerance), target * (1.0 + tolerance));
    let (low, high) = if a <= b { (a, b) } else { (b, a) };
    if (low..=high).contains(&actual) {
        return MatchResult::success();
    }
    MatchResult::failure(
        ErrorKind::WrongResultRealTime,
        format!(
            "Wrong execution result for {}. Expected: {}, but got: {}. {}% difference allowed.",
            python_str_repr(call),
            expected,
            output,
            tolerance * 100.0
        ),
    )
    .with_executed_output(output.clone())
}

/// Shape comparison: same type; dictionaries with the same key set (or only
/// the same size when `sanity_check`); lists of the same length.
pub fn pattern_match(call: &str, output: &Value, expected: &Value, sanity_check: bool) -> MatchResult {
    let (actual_type, expected_type) = (runtime_type_of(output), runtime_type_of(expected));
    let fail = |kind: ErrorKind, message: String| {
        MatchResult::failure(kind, message).with_executed_output(output.clone())
    };
    if actual_type != expected_type {
        return fail(
            ErrorKind::WrongResultType,
            format!(
                "Wrong execution result type for {}. Expected type: {}, but got: {}.",
                python_str_repr(call),
                expected_type,
                actual_type
            ),
        );
    }
    match (output, expected) {
        (Value::Object(actual), Value::Object(wanted)) => {
            if sanity_check {
                if actual.len() != wanted.len() {
                    return fail(
                        ErrorKind::WrongResultDictLength,
                        format!(
                            "Wrong execution result pattern for {}. Expect type Dict, but wrong number of elements in the output. Expected length: {}, but got: {}.",
                            python_str_repr(call),
                            wanted.len(),
                            actual.len()
                        ),
                    );
                }
                return MatchResult::success();
            }
            if let Some(key) = wanted.keys().find(|k| !actual.contains_key(*k)) {
                return fail(
                    ErrorKind::WrongResultDictKeyNotFound,
                    format!(
                        "Wrong execution result pattern for {}. Expect type Dict, but key {} not found in the model output.",
                        python_str_repr(call),
                        python_str_repr(key)
                    ),
                );
            }
            if let Some(key) = actual.keys().find(|k| !wanted.contains_key(*k)) {
                return fail(
                    ErrorKind::WrongResultDictExtraKey,
                    format!(
                        "Wrong execution result pattern for {}. Expect type Dict, but key {} not expected in the model output.",
                        python_str_repr(call),
                        python_str_repr(key)
                    ),
                );
            }
            MatchResult::success()
        }
        (Value::Array(actual), Value::Array(wanted)) if actual.len() != wanted.len() => fail(
            ErrorKind::WrongResultListLength,
            format!(
                "Wrong execution result pattern for {}. Expect type list, but wrong number of elements in the output. Expected length: {}, but got: {}.",
                python_str_repr(call),
                wanted.len(),
                actual.len()
            ),
        ),
        _ => MatchResult::success(),
    }
}

/// Greedy claim-based matching of executed calls against expected results,
/// the execution counterpart of the order-free call matcher.
pub fn check_executed_unordered_multiple(
    calls: &[String],
    expected: &[ExpectedExecution],
    ctx: &ExecContext<'_>,
) -> Result<MatchResult> {
    if calls.len() != expected.len() {
        return Ok(MatchResult::failure(
            ErrorKind::ExecResultCount,
            format!(
                "Wrong number of functions provided. Expected {}, but got {}.",
                expected.len(),
                calls.len()
            ),
        ));
    }

    let mut matched = vec![false; calls.len()];
    for (answer_index, wanted) in expected.iter().enumerate() {
        let mut sub_errors = Vec::new();
        let mut claimed = None;
        for (index, call) in calls.iter().enumerate() {
            if matched[index] {
                continue;
            }
            let result = check_executed_simple(call, &wanted.value, wanted.mode, false, ctx)?;
            if result.valid {
                claimed = Some(index);
                break;
            }
            sub_errors.push(SubError::from_result(index, &result));
        }
        match claimed {
            Some(index) => matched[index] = true,
            None => {
                let considered: Vec<usize> = (0..calls.len()).filter(|i| !matched[*i]).collect();
                return Ok(MatchResult::failure(
                    ErrorKind::ExecCannotFindMatch,
                    format!(
                        "Could not find a matching function among index {:?} of model output for index {} of possible answers.",
                        considered, answer_index
                    ),
                )
                .with_sub_errors(sub_errors));
            }
        }
    }
    Ok(MatchResult::success())
}

/// Routes executable call expressions to the single or multi-call comparator.
pub fn exec_checker(
    calls: &[String],
    expected: &[ExpectedExecution],
    category: TestCategory,
    ctx: &ExecContext<'_>,
) -> Result<MatchResult> {
    if category.is_multi_call() {
        return check_executed_unordered_multiple(calls, expected, ctx);
    }
    let ([call], [wanted, ..]) = (calls, expected) else {
        return Ok(MatchResult::failure(
            ErrorKind::SimpleExecWrongCount,
            "Wrong number of functions.",
        ));
    };
    check_executed_simple(call, &wanted.value, wanted.mode, false, ctx)
}

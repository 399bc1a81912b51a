//! Structural matchers for decoded calls: one call against one expected call,
//! positional sequences, and order-free sets of calls.

use serde_json::Value;
use tracing::debug;

use crate::{
    error::ErrorKind,
    eval_runner::TestCategory,
    function_doc::{FunctionDescription, ToolList, convert_func_name},
    match_result::{MatchResult, SubError},
    parse_ast::DecodedCall,
    possible_answer::{ExpectedCall, MultiPossibleAnswer},
    type_coercion::coerce_value,
    type_reconciler::{Language, RuntimeType, convert_to_float, convert_to_list, reconcile, type_check},
    value_normalizer::{dict_matches, list_of_dict_matches, string_matches},
};

#[derive(Clone, Copy, Debug, Default)]
pub struct AstCheckOptions {
    /// Match multi-call categories positionally instead of order-free.
    pub enforce_order: bool,
    /// The model's API cannot carry `.` in function names, so expect `_` instead.
    pub model_forbids_dots: bool,
}

/// Validates one decoded call against one description and its expected call.
/// Short-circuits on the first failing check.
pub fn check_simple_call(
    description: &FunctionDescription,
    call: &DecodedCall,
    expected: &ExpectedCall,
    language: Language,
    model_forbids_dots: bool,
) -> MatchResult {
    let func_name = convert_func_name(&description.name, model_forbids_dots);
    if call.name != func_name {
        return MatchResult::failure(
            ErrorKind::WrongFuncName,
            format!("Function name '{}' not found in model output.", func_name),
        );
    }

    for param in &description.parameters.required {
        if !call.arguments.contains_key(param) {
            return MatchResult::failure(
                ErrorKind::MissingRequired,
                format!("Missing required parameter: '{}'.", param),
            );
        }
    }

    for (param, value) in &call.arguments {
        let (Some(param_spec), Some(candidates)) = (
            description.parameters.properties.get(param),
            expected.arguments.get(param),
        ) else {
            return MatchResult::failure(
                ErrorKind::UnexpectedParam,
                format!("Unexpected parameter: '{}'.", param),
            );
        };

        let reconciled = match reconcile(param_spec, language) {
            Ok(reconciled) => reconciled,
            Err(unknown) => {
                return MatchResult::failure(
                    ErrorKind::TypeUnknownDeclared,
                    format!(
                        "Unknown type '{}' declared for parameter '{}' in the {} vocabulary.",
                        unknown, param, language
                    ),
                );
            }
        };

        let mut value = if language.needs_coercion() {
            coerce_value(
                value,
                language,
                &reconciled.declared,
                reconciled.nested_declared.as_deref(),
            )
        } else {
            value.clone()
        };

        if reconciled.declared == "tuple" {
            match convert_to_list(&value) {
                Some(list) => value = list,
                None => {
                    return MatchResult::failure(
                        ErrorKind::CannotConvertToList,
                        format!(
                            "Param is: '{}', the expected type for its value is tuple, but the model outputed value is: {}, cannot be converted to a list.",
                            param, value
                        ),
                    );
                }
            }
        }
        if reconciled.declared == "float" {
            match convert_to_float(&value) {
                Some(float) => value = float,
                None => {
                    return MatchResult::failure(
                        ErrorKind::CannotConvertToFloat,
                        format!(
                            "Param is: '{}', the expected type for its value is float, but the model outputed value is: {}, cannot be converted to a float.",
                            param, value
                        ),
                    );
                }
            }
        }

        let type_result = type_check(
            param,
            &value,
            candidates,
            &reconciled.declared,
            reconciled.runtime,
            reconciled.nested,
        );
        if !type_result.valid {
            return type_result;
        }
        if type_result.is_variable {
            debug!(param = param.as_str(), %value, "argument treated as a variable reference");
            continue;
        }

        let value_result = match (&value, reconciled.runtime, reconciled.nested) {
            (Value::Object(map), RuntimeType::Dict, _) => dict_matches(param, map, candidates),
            (Value::Array(items), RuntimeType::List, Some(RuntimeType::Dict)) => {
                list_of_dict_matches(param, items, candidates)
            }
            (Value::String(s), RuntimeType::Str, _) => string_matches(param, s, candidates),
            // Numbers, booleans and plain lists are settled by the type check alone.
            _ => MatchResult::success(),
        };
        if !value_result.valid {
            return value_result;
        }
    }

    for param in expected.arguments.keys() {
        if !call.arguments.contains_key(param) && !expected.allows_omitting(param) {
            return MatchResult::failure(
                ErrorKind::MissingOptional,
                format!(
                    "Optional parameter '{}' not provided and not marked as optional.",
                    param
                ),
            );
        }
    }

    MatchResult::success()
}

/// Pairs decoded call `i` with expected call `i`.
pub fn check_ordered(
    descriptions: &ToolList,
    calls: &[DecodedCall],
    expected: &MultiPossibleAnswer,
    language: Language,
    model_forbids_dots: bool,
) -> MatchResult {
    if calls.len() != expected.len() {
        return MatchResult::failure(ErrorKind::OrderedWrongCount, "Wrong number of functions.");
    }
    for (call, expected_call) in calls.iter().zip(expected.iter()) {
        let Some(description) = descriptions.find(&expected_call.name) else {
            return MatchResult::failure(
                ErrorKind::OrderedCannotFindDescription,
                format!(
                    "Function doc description not found for function name: '{}'.",
                    expected_call.name
                ),
            );
        };
        let result = check_simple_call(description, call, expected_call, language, model_forbids_dots);
        if !result.valid {
            return result;
        }
    }
    MatchResult::success()
}

/// Greedy claim-based matching: each expected call, in declaration order,
/// claims the first unclaimed decoded call that validates against it.
/// There is no backtracking, so an earlier claim is never revisited.
pub fn check_unordered(
    descriptions: &ToolList,
    calls: &[DecodedCall],
    expected: &MultiPossibleAnswer,
    language: Language,
    model_forbids_dots: bool,
) -> MatchResult {
    if calls.len() != expected.len() {
        return MatchResult::failure(ErrorKind::UnorderedWrongCount, "Wrong number of functions.");
    }

    let mut matched = vec![false; calls.len()];
    for (answer_index, expected_call) in expected.iter().enumerate() {
        let Some(description) = descriptions.find(&expected_call.name) else {
            return MatchResult::failure(
                ErrorKind::UnorderedCannotFindDescription,
                format!(
                    "Function doc description not found for function name: '{}'.",
                    expected_call.name
                ),
            );
        };

        let mut sub_errors = Vec::new();
        let mut claimed = None;
        for (index, call) in calls.iter().enumerate() {
            if matched[index] {
                continue;
            }
            let result =
                check_simple_call(description, call, expected_call, language, model_forbids_dots);
            if result.valid {
                claimed = Some(index);
                break;
            }
            let mut sub_error = SubError::from_result(index, &result);
            sub_error.model_result_item = Some(call.to_json());
            sub_error.possible_answer_item = Some(expected_call.to_json());
            sub_errors.push(sub_error);
        }

        match claimed {
            Some(index) => matched[index] = true,
            None => {
                let considered: Vec<usize> = (0..calls.len()).filter(|i| !matched[*i]).collect();
                return MatchResult::failure(
                    ErrorKind::UnorderedCannotFindMatch,
                    format!(
                        "Could not find a matching function among index {:?} of model output for index {} of possible answers.",
                        considered, answer_index
                    ),
                )
                .with_sub_errors(sub_errors);
            }
        }
    }
    MatchResult::success()
}

/// Routes a decoded turn to the matcher its category calls for.
pub fn ast_checker(
    descriptions: &ToolList,
    calls: &[DecodedCall],
    expected: &MultiPossibleAnswer,
    language: Language,
    category: TestCategory,
    options: &AstCheckOptions,
) -> MatchResult {
    if category.is_multi_call() {
        return if options.enforce_order {
            check_ordered(descriptions, calls, expected, language, options.model_forbids_dots)
        } else {
            check_unordered(descriptions, calls, expected, language, options.model_forbids_dots)
        };
    }

    let [call] = calls else {
        return MatchResult::failure(ErrorKind::SimpleWrongCount, "Wrong number of functions.");
    };
    let Some(expected_call) = expected.iter().next() else {
        return MatchResult::failure(
            ErrorKind::EmptyPossibleAnswer,
            "The possible answer is empty.",
        );
    };
    let Some(description) = descriptions.primary() else {
        return MatchResult::failure(
            ErrorKind::WrongFuncName,
            format!(
                "No function description available for '{}'.",
                expected_call.name
            ),
        );
    };
    check_simple_call(description, call, expected_call, language, options.model_forbids_dots)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn description(value: Value) -> FunctionDescription {
        serde_json::from_value(value).unwrap()
    }

    fn expected(name: &str, arguments: Value) -> ExpectedCall {
        ExpectedCall::new(name, serde_json::from_value(arguments).unwrap())
    }

    fn call(name: &str, arguments: Value) -> DecodedCall {
        DecodedCall::new(name, serde_json::from_value(arguments).unwrap())
    }

    #[test]
    fn dotted_name_is_expected_in_underscore_form_when_forbidden() {
        let doc = description(json!({
            "name": "math.factorial",
            "parameters": {"properties": {"number": {"type": "integer"}}, "required": ["number"]}
        }));
        let answer = expected("math.factorial", json!({"number": [5]}));
        let result = check_simple_call(&doc, &call("math_factorial", json!({"number": 5})), &answer, Language::Python, true);
        assert!(result.valid);
        let result = check_simple_call(&doc, &call("math_factorial", json!({"number": 5})), &answer, Language::Python, false);
        assert_eq!(result.kind, Some(ErrorKind::WrongFuncName));
    }

    #[test]
    fn tuple_parameters_accept_strings_as_character_lists() {
        let doc = description(json!({
            "name": "f",
            "parameters": {"properties": {"t": {"type": "tuple", "items": {"type": "string"}}}, "required": ["t"]}
        }));
        let answer = expected("f", json!({"t": [["a", "b"]]}));
        assert!(check_simple_call(&doc, &call("f", json!({"t": "ab"})), &answer, Language::Python, false).valid);
        let result = check_simple_call(&doc, &call("f", json!({"t": 3})), &answer, Language::Python, false);
        assert_eq!(result.kind, Some(ErrorKind::CannotConvertToList));
    }

    #[test]
    fn unknown_declared_type_is_reported() {
        let doc = description(json!({
            "name": "f",
            "parameters": {"properties": {"m": {"type": "HashMap"}}, "required": ["m"]}
        }));
        let answer = expected("f", json!({"m": [{"a": ["b"]}]}));
        let result = check_simple_call(&doc, &call("f", json!({"m": {"a": "b"}})), &answer, Language::Python, false);
        assert_eq!(result.kind, Some(ErrorKind::TypeUnknownDeclared));
    }

    #[test]
    fn single_call_categories_require_exactly_one_call() {
        let tools: ToolList = vec![description(json!({
            "name": "f",
            "parameters": {"properties": {"a": {"type": "integer"}}, "required": ["a"]}
        }))]
        .into();
        let answers = MultiPossibleAnswer::from(expected("f", json!({"a": [1]})));
        let calls = [call("f", json!({"a": 1})), call("f", json!({"a": 1}))];
        let result = ast_checker(&tools, &calls, &answers, Language::Python, TestCategory::Simple, &AstCheckOptions::default());
        assert_eq!(result.kind, Some(ErrorKind::SimpleWrongCount));
    }
}

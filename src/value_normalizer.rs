use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::{
    error::ErrorKind,
    match_result::MatchResult,
    possible_answer::{AcceptableValue, DictAnswer, DictField},
    type_reconciler::{RuntimeType, runtime_type_of},
};

static PUNCTUATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ ,./\-_*^]").expect("punctuation pattern is valid"));

/// Removes spaces and `,./-_*^`, lowercases and unifies quotes, so that
/// "April 1, 2024" and "april 1 2024" compare equal.
pub fn standardize_string(input: &str) -> String {
    PUNCTUATION
        .replace_all(input, "")
        .to_lowercase()
        .replace('\'', "\"")
}

/// Equality with numeric promotion (`1 == 1.0`), applied recursively.
///
/// Booleans are not numbers here: `true` never equals `1` and `false`
/// never equals `0`, unlike Python's `==`.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(i), Some(j)) => i == j,
            _ => x.as_f64() == y.as_f64(),
        },
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).is_some_and(|y| values_equal(x, y)))
        }
        _ => a == b,
    }
}

fn standardize_elements(items: &[Value]) -> Vec<Value> {
    items
        .iter()
        .map(|item| match item {
            Value::String(s) => Value::String(standardize_string(s)),
            other => other.clone(),
        })
        .collect()
}

fn candidate_strings(candidates: &[AcceptableValue]) -> Vec<String> {
    candidates
        .iter()
        .filter_map(|candidate| match candidate {
            AcceptableValue::Omitted => Some(String::new()),
            AcceptableValue::Literal(Value::String(s)) => Some(standardize_string(s)),
            _ => None,
        })
        .collect()
}

fn render_candidates(candidates: &[AcceptableValue]) -> String {
    Value::Array(candidates.iter().map(AcceptableValue::to_json).collect()).to_string()
}

pub fn string_matches(param: &str, model_output: &str, candidates: &[AcceptableValue]) -> MatchResult {
    let standardized = standardize_string(model_output);
    if candidate_strings(candidates).contains(&standardized) {
        return MatchResult::success();
    }
    MatchResult::failure(
        ErrorKind::ValueString,
        format!(
            "Invalid value for parameter '{}': '{}'. Expected one of {}. Case insensitive.",
            param,
            model_output,
            render_candidates(candidates)
        ),
    )
}

/// Order-sensitive list comparison after standardizing string elements on both sides.
pub fn list_matches(param: &str, model_output: &[Value], candidates: &[AcceptableValue]) -> MatchResult {
    let standardized = standardize_elements(model_output);
    let found = candidates.iter().any(|candidate| match candidate {
        AcceptableValue::List(items) => {
            let items: Vec<Value> = items.iter().map(AcceptableValue::to_json).collect();
            let expected = standardize_elements(&items);
            expected.len() == standardized.len()
                && expected.iter().zip(&standardized).all(|(e, m)| values_equal(e, m))
        }
        _ => false,
    });
    if found {
        return MatchResult::success();
    }
    MatchResult::failure(
        ErrorKind::ValueListTuple,
        format!(
            "Invalid value for parameter '{}': {}. Expected one of {}.",
            param,
            Value::Array(model_output.to_vec()),
            render_candidates(candidates)
        ),
    )
}

enum FieldOutcome {
    Matched,
    WrongValue,
    WrongType,
}

fn same_type_family(a: RuntimeType, b: RuntimeType) -> bool {
    let numeric = |t| matches!(t, RuntimeType::Int | RuntimeType::Float);
    a == b || (numeric(a) && numeric(b))
}

fn field_value_matches(value: &Value, candidates: &[AcceptableValue]) -> FieldOutcome {
    let matched = candidates.iter().any(|candidate| match (candidate, value) {
        (AcceptableValue::Omitted, Value::String(s)) => standardize_string(s).is_empty(),
        (AcceptableValue::Literal(Value::String(expected)), Value::String(actual)) => {
            standardize_string(expected) == standardize_string(actual)
        }
        (AcceptableValue::Literal(expected), actual) => values_equal(expected, actual),
        (AcceptableValue::List(_), Value::Array(items)) => {
            list_matches("", items, std::slice::from_ref(candidate)).valid
        }
        (AcceptableValue::Dict(_), Value::Object(map)) => {
            dict_matches("", map, std::slice::from_ref(candidate)).valid
        }
        _ => false,
    });
    if matched {
        return FieldOutcome::Matched;
    }
    let actual = runtime_type_of(value);
    let type_seen = candidates
        .iter()
        .filter_map(AcceptableValue::runtime_type)
        .any(|t| same_type_family(t, actual));
    if type_seen {
        FieldOutcome::WrongValue
    } else {
        FieldOutcome::WrongType
    }
}

fn dict_variant_matches(param: &str, model_output: &Map<String, Value>, answer: &DictAnswer) -> MatchResult {
    if model_output.len() != answer.len() {
        return MatchResult::failure(
            ErrorKind::ValueDictItems,
            format!(
                "Wrong number of parameters for dictionary '{}'. Expected {}, got {}.",
                param,
                answer.len(),
                model_output.len()
            ),
        );
    }
    for (key, value) in model_output {
        let Some(field) = answer.get(key) else {
            return MatchResult::failure(ErrorKind::ValueDictKey, format!("Unexpected parameter: '{}'.", key));
        };
        match field {
            DictField::Nested(nested) => {
                let Value::Object(inner) = value else {
                    return MatchResult::failure(
                        ErrorKind::ValueDictValueType,
                        format!(
                            "Invalid value's type for parameter '{}': {}. Expected a dictionary.",
                            key, value
                        ),
                    );
                };
                let result = dict_variant_matches(key, inner, nested);
                if !result.valid {
                    return result;
                }
            }
            DictField::Candidates(candidates) => match field_value_matches(value, candidates) {
                FieldOutcome::Matched => {}
                FieldOutcome::WrongValue => {
                    return MatchResult::failure(
                        ErrorKind::ValueDictValue,
                        format!(
                            "Invalid value for parameter '{}': {}. Expected one of {}.",
                            key,
                            value,
                            render_candidates(candidates)
                        ),
                    );
                }
                FieldOutcome::WrongType => {
                    return MatchResult::failure(
                        ErrorKind::ValueDictValueType,
                        format!(
                            "Invalid value's type for parameter '{}': {}. Expected one of {}.",
                            key,
                            value,
                            render_candidates(candidates)
                        ),
                    );
                }
            },
        }
    }
    MatchResult::success()
}

/// Accepts the first dictionary-shaped variant all of whose keys and values
/// match. On failure the error of the last variant tried is reported.
pub fn dict_matches(param: &str, model_output: &Map<String, Value>, variants: &[AcceptableValue]) -> MatchResult {
    let mut last_failure = None;
    for variant in variants {
        let AcceptableValue::Dict(answer) = variant else {
            continue;
        };
        let result = dict_variant_matches(param, model_output, answer);
        if result.valid {
            return result;
        }
        last_failure = Some(result);
    }
    last_failure.unwrap_or_else(|| {
        MatchResult::failure(
            ErrorKind::ValueDictValueType,
            format!(
                "Parameter '{}' is a dictionary but none of the possible answers {} is.",
                param,
                render_candidates(variants)
            ),
        )
    })
}

/// Each possible answer is an ordered list of dictionary shapes; position matters.
pub fn list_of_dict_matches(param: &str, model_output: &[Value], candidates: &[AcceptableValue]) -> MatchResult {
    let mut last_failure = None;
    for candidate in candidates {
        let AcceptableValue::List(shapes) = candidate else {
            continue;
        };
        if shapes.len() != model_output.len() {
            last_failure = Some(MatchResult::failure(
                ErrorKind::ValueListDictCount,
                "Wrong number of dictionaries in the list.",
            ));
            continue;
        }
        let mut failure = None;
        for (item, shape) in model_output.iter().zip(shapes) {
            let result = match item {
                Value::Object(map) => dict_matches(param, map, std::slice::from_ref(shape)),
                other => MatchResult::failure(
                    ErrorKind::ValueDictValueType,
                    format!(
                        "Invalid value's type in list parameter '{}': {}. Expected a dictionary.",
                        param, other
                    ),
                ),
            };
            if !result.valid {
                failure = Some(result);
                break;
            }
        }
        match failure {
            None => return MatchResult::success(),
            Some(result) => last_failure = Some(result),
        }
    }
    last_failure.unwrap_or_else(|| {
        MatchResult::failure(
            ErrorKind::ValueListDictCount,
            format!(
                "Parameter '{}' is a list of dictionaries but none of the possible answers {} is a list.",
                param,
                render_candidates(candidates)
            ),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn answers(values: Value) -> Vec<AcceptableValue> {
        serde_json::from_value(values).unwrap()
    }

    #[test]
    fn standardize_ignores_case_spacing_and_punctuation() {
        assert_eq!(standardize_string("April 1, 2024"), "april12024");
        assert_eq!(standardize_string("april 1 2024"), "april12024");
        assert_eq!(standardize_string("New-York_City*"), "newyorkcity");
        assert_eq!(standardize_string("it's"), "it\"s");
    }

    #[test]
    fn string_matching_is_normalized_on_both_sides() {
        let candidates = answers(json!(["April 1, 2024"]));
        assert!(string_matches("date", "April 1,2024", &candidates).valid);
        assert!(string_matches("date", "april 1 2024", &candidates).valid);
        let miss = string_matches("date", "April 2, 2024", &candidates);
        assert_eq!(miss.kind, Some(ErrorKind::ValueString));
    }

    #[test]
    fn list_matching_keeps_order() {
        let candidates = answers(json!([["New York", "Boston"]]));
        assert!(list_matches("cities", &[json!("new york"), json!("BOSTON")], &candidates).valid);
        let swapped = list_matches("cities", &[json!("Boston"), json!("New York")], &candidates);
        assert_eq!(swapped.kind, Some(ErrorKind::ValueListTuple));
    }

    #[test]
    fn dict_matching_checks_count_keys_and_values() {
        let variants = answers(json!([{"field": ["age"], "operation": [">"], "value": ["25"]}]));
        let model = json!({"field": "Age", "operation": ">", "value": "25"});
        assert!(dict_matches("condition", model.as_object().unwrap(), &variants).valid);

        let extra = json!({"field": "age", "operation": ">", "value": "25", "x": 1});
        assert_eq!(
            dict_matches("condition", extra.as_object().unwrap(), &variants).kind,
            Some(ErrorKind::ValueDictItems)
        );

        let renamed = json!({"column": "age", "operation": ">", "value": "25"});
        assert_eq!(
            dict_matches("condition", renamed.as_object().unwrap(), &variants).kind,
            Some(ErrorKind::ValueDictKey)
        );

        let wrong_value = json!({"field": "job", "operation": ">", "value": "25"});
        assert_eq!(
            dict_matches("condition", wrong_value.as_object().unwrap(), &variants).kind,
            Some(ErrorKind::ValueDictValue)
        );

        let wrong_type = json!({"field": "age", "operation": ">", "value": 25});
        assert_eq!(
            dict_matches("condition", wrong_type.as_object().unwrap(), &variants).kind,
            Some(ErrorKind::ValueDictValueType)
        );
    }

    #[test]
    fn dict_matching_recurses_into_nested_shapes() {
        let variants = answers(json!([{"range": {"low": [18], "high": [65, 70]}, "unit": ["years"]}]));
        let model = json!({"range": {"low": 18, "high": 70}, "unit": "Years"});
        assert!(dict_matches("filter", model.as_object().unwrap(), &variants).valid);
        let model = json!({"range": {"low": 18, "high": 99}, "unit": "years"});
        assert_eq!(
            dict_matches("filter", model.as_object().unwrap(), &variants).kind,
            Some(ErrorKind::ValueDictValue)
        );
    }

    #[test]
    fn dict_matching_takes_the_first_passing_variant() {
        let variants = answers(json!(["", {"a": [1]}, {"a": [2]}]));
        let model = json!({"a": 2});
        assert!(dict_matches("p", model.as_object().unwrap(), &variants).valid);
    }

    #[test]
    fn list_of_dicts_is_positional() {
        let candidates = answers(json!([[
            {"field": ["age"], "operation": [">"], "value": ["25"]},
            {"field": ["job"], "operation": ["="], "value": ["engineer"]}
        ]]));
        let ordered = [
            json!({"field": "age", "operation": ">", "value": "25"}),
            json!({"field": "job", "operation": "=", "value": "engineer"}),
        ];
        assert!(list_of_dict_matches("conditions", &ordered, &candidates).valid);

        let reversed = [ordered[1].clone(), ordered[0].clone()];
        assert!(!list_of_dict_matches("conditions", &reversed, &candidates).valid);

        let short = [ordered[0].clone()];
        assert_eq!(
            list_of_dict_matches("conditions", &short, &candidates).kind,
            Some(ErrorKind::ValueListDictCount)
        );
    }

    #[test]
    fn numeric_equality_promotes_integers() {
        assert!(values_equal(&json!(1), &json!(1.0)));
        assert!(values_equal(&json!([1, {"a": 2}]), &json!([1.0, {"a": 2}])));
        assert!(!values_equal(&json!(true), &json!(1)));
        assert!(!values_equal(&json!([false]), &json!([0])));
    }
}

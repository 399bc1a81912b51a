use bfcl_eval::{
    ast_checker::{AstCheckOptions, ast_checker, check_simple_call},
    error::ErrorKind,
    eval_runner::TestCategory,
    function_doc::{FunctionDescription, ToolList},
    parse_ast::{DecodedCall, decode_function_list},
    possible_answer::{ExpectedCall, MultiPossibleAnswer},
    type_reconciler::Language,
};
use serde_json::{Value, json};

fn description(value: Value) -> FunctionDescription {
    serde_json::from_value(value).unwrap()
}

fn expected(name: &str, arguments: Value) -> ExpectedCall {
    ExpectedCall::new(name, serde_json::from_value(arguments).unwrap())
}

fn decode(source: &str) -> Vec<DecodedCall> {
    decode_function_list(source).unwrap()
}

fn triangle() -> FunctionDescription {
    description(json!({
        "name": "calculate_triangle_area",
        "description": "Area of a triangle.",
        "parameters": {
            "type": "dict",
            "properties": {
                "base": {"type": "integer"},
                "height": {"type": "integer"},
                "unit": {"type": "string"}
            },
            "required": ["base", "height"]
        }
    }))
}

fn weather() -> FunctionDescription {
    description(json!({
        "name": "get_weather",
        "parameters": {
            "properties": {
                "city": {"type": "string"},
                "days": {"type": "integer"}
            },
            "required": ["city"]
        }
    }))
}

fn check(source: &str, answer: &ExpectedCall) -> bfcl_eval::match_result::MatchResult {
    let calls = decode(source);
    check_simple_call(&triangle(), &calls[0], answer, Language::Python, false)
}

#[test]
fn matching_call_with_optional_parameter_omitted() {
    let answer = expected(
        "calculate_triangle_area",
        json!({"base": [10], "height": [5], "unit": ["units", ""]}),
    );
    assert!(check("[calculate_triangle_area(base=10, height=5)]", &answer).valid);
    assert!(check("[calculate_triangle_area(base=10, height=5, unit='Units')]", &answer).valid);
}

#[test]
fn missing_required_parameter() {
    let answer = expected("calculate_triangle_area", json!({"base": [10], "height": [5]}));
    let result = check("[calculate_triangle_area(base=10)]", &answer);
    assert_eq!(result.kind, Some(ErrorKind::MissingRequired));
}

#[test]
fn unexpected_parameter() {
    let answer = expected("calculate_triangle_area", json!({"base": [10], "height": [5]}));
    let result = check("[calculate_triangle_area(base=10, height=5, unit='cm')]", &answer);
    assert_eq!(result.kind, Some(ErrorKind::UnexpectedParam));
}

#[test]
fn optional_parameter_that_cannot_be_omitted() {
    let answer = expected(
        "calculate_triangle_area",
        json!({"base": [10], "height": [5], "unit": ["cm"]}),
    );
    let result = check("[calculate_triangle_area(base=10, height=5)]", &answer);
    assert_eq!(result.kind, Some(ErrorKind::MissingOptional));
}

#[test]
fn wrong_type_is_a_simple_type_error() {
    let answer = expected("calculate_triangle_area", json!({"base": [10], "height": [5]}));
    let result = check("[calculate_triangle_area(base=10.5, height=5)]", &answer);
    assert_eq!(result.kind, Some(ErrorKind::TypeSimple));
}

#[test]
fn integer_values_are_not_compared() {
    let answer = expected("calculate_triangle_area", json!({"base": [10], "height": [5]}));
    assert!(check("[calculate_triangle_area(base=99, height=1)]", &answer).valid);
}

#[test]
fn strings_compare_after_normalization() {
    let answer = expected("get_weather", json!({"city": ["New York, NY"], "days": [3, ""]}));
    let calls = decode("[get_weather(city='new york ny')]");
    assert!(check_simple_call(&weather(), &calls[0], &answer, Language::Python, false).valid);

    let calls = decode("[get_weather(city='Boston')]");
    let result = check_simple_call(&weather(), &calls[0], &answer, Language::Python, false);
    assert_eq!(result.kind, Some(ErrorKind::ValueString));
}

#[test]
fn variable_reference_skips_value_check() {
    let answer = expected("calculate_triangle_area", json!({"base": ["b"], "height": [5]}));
    assert!(check("[calculate_triangle_area(base=side_length, height=5)]", &answer).valid);
    let result = check("[calculate_triangle_area(base='10', height=5)]", &answer);
    assert!(result.valid, "a string where the answer holds a name is also a reference");
}

#[test]
fn list_of_dictionaries_matches_field_by_field() {
    let doc = description(json!({
        "name": "db.query",
        "parameters": {
            "properties": {
                "table": {"type": "string"},
                "conditions": {"type": "array", "items": {"type": "dict"}}
            },
            "required": ["table", "conditions"]
        }
    }));
    let answer = expected(
        "db.query",
        json!({
            "table": ["user"],
            "conditions": [[
                {"field": ["age"], "operation": [">"], "value": ["25"]},
                {"field": ["job"], "operation": ["="], "value": ["engineer"]}
            ]]
        }),
    );
    let calls = decode(
        "[db.query(table='user', conditions=[{'field': 'age', 'operation': '>', 'value': '25'}, {'field': 'job', 'operation': '=', 'value': 'Engineer'}])]",
    );
    assert!(check_simple_call(&doc, &calls[0], &answer, Language::Python, false).valid);

    let calls = decode(
        "[db.query(table='user', conditions=[{'field': 'age', 'operation': '>', 'value': '30'}, {'field': 'job', 'operation': '=', 'value': 'engineer'}])]",
    );
    let result = check_simple_call(&doc, &calls[0], &answer, Language::Python, false);
    assert_eq!(result.kind, Some(ErrorKind::ValueDictValue));

    let calls = decode("[db.query(table='user', conditions=[{'field': 'age', 'operation': '>', 'value': '25'}])]");
    let result = check_simple_call(&doc, &calls[0], &answer, Language::Python, false);
    assert_eq!(result.kind, Some(ErrorKind::ValueListDictCount));
}

fn parallel_setup() -> (ToolList, MultiPossibleAnswer) {
    let tools: ToolList = vec![weather()].into();
    let answers = MultiPossibleAnswer::from_json(&json!([
        {"get_weather": {"city": ["Boston"], "days": [""]}},
        {"get_weather": {"city": ["Paris"], "days": [""]}}
    ]))
    .unwrap();
    (tools, answers)
}

#[test]
fn order_free_matching_accepts_any_permutation() {
    let (tools, answers) = parallel_setup();
    let options = AstCheckOptions::default();
    for source in [
        "[get_weather(city='Boston'), get_weather(city='Paris')]",
        "[get_weather(city='Paris'), get_weather(city='Boston')]",
    ] {
        let result = ast_checker(
            &tools,
            &decode(source),
            &answers,
            Language::Python,
            TestCategory::ParallelFunction,
            &options,
        );
        assert!(result.valid, "{source}: {:?}", result.errors);
    }
}

#[test]
fn enforced_order_rejects_permutations() {
    let (tools, answers) = parallel_setup();
    let options = AstCheckOptions {
        enforce_order: true,
        ..Default::default()
    };
    let result = ast_checker(
        &tools,
        &decode("[get_weather(city='Paris'), get_weather(city='Boston')]"),
        &answers,
        Language::Python,
        TestCategory::ParallelFunction,
        &options,
    );
    assert_eq!(result.kind, Some(ErrorKind::ValueString));
}

#[test]
fn order_free_matching_reports_count_and_unmatched_answers() {
    let (tools, answers) = parallel_setup();
    let options = AstCheckOptions::default();
    let result = ast_checker(
        &tools,
        &decode("[get_weather(city='Paris')]"),
        &answers,
        Language::Python,
        TestCategory::ParallelFunction,
        &options,
    );
    assert_eq!(result.kind, Some(ErrorKind::UnorderedWrongCount));

    let result = ast_checker(
        &tools,
        &decode("[get_weather(city='Paris'), get_weather(city='Rome')]"),
        &answers,
        Language::Python,
        TestCategory::ParallelFunction,
        &options,
    );
    assert_eq!(result.kind, Some(ErrorKind::UnorderedCannotFindMatch));
    assert_eq!(result.sub_errors.len(), 2);
    assert!(result.sub_errors.iter().all(|e| e.possible_answer_item.is_some()));
}

#[test]
fn multiple_function_picks_the_description_by_name() {
    let tools: ToolList = vec![triangle(), weather()].into();
    let answers = MultiPossibleAnswer::from(expected("get_weather", json!({"city": ["Oslo"]})));
    let result = ast_checker(
        &tools,
        &decode("[get_weather(city='Oslo')]"),
        &answers,
        Language::Python,
        TestCategory::MultipleFunction,
        &AstCheckOptions::default(),
    );
    assert!(result.valid, "{:?}", result.errors);
}

#[test]
fn java_arguments_are_coerced_from_strings() {
    let doc = description(json!({
        "name": "Scheduler.schedule",
        "parameters": {
            "properties": {
                "delay": {"type": "long"},
                "repeat": {"type": "boolean"},
                "tags": {"type": "ArrayList", "items": {"type": "String"}}
            },
            "required": ["delay", "repeat", "tags"]
        }
    }));
    let answer = expected(
        "Scheduler.schedule",
        json!({"delay": [500], "repeat": [false], "tags": [["daily", "report"]]}),
    );
    let call = DecodedCall::new(
        "Scheduler.schedule",
        serde_json::from_value(json!({
            "delay": "500L",
            "repeat": "false",
            "tags": "new ArrayList<>(Arrays.asList(\"daily\", \"report\"))"
        }))
        .unwrap(),
    );
    let result = check_simple_call(&doc, &call, &answer, Language::Java, false);
    assert!(result.valid, "{:?}", result.errors);
}

#[test]
fn enforced_order_reports_count_and_unknown_functions() {
    let (tools, answers) = parallel_setup();
    let options = AstCheckOptions {
        enforce_order: true,
        ..Default::default()
    };
    let result = ast_checker(
        &tools,
        &decode("[get_weather(city='Boston')]"),
        &answers,
        Language::Python,
        TestCategory::ParallelFunction,
        &options,
    );
    assert_eq!(result.kind, Some(ErrorKind::OrderedWrongCount));

    let tools: ToolList = vec![weather(), triangle()].into();
    let answers = MultiPossibleAnswer::from(expected("get_time", json!({"zone": ["UTC"]})));
    let result = ast_checker(
        &tools,
        &decode("[get_time(zone='UTC')]"),
        &answers,
        Language::Python,
        TestCategory::ParallelFunction,
        &options,
    );
    assert_eq!(result.kind, Some(ErrorKind::OrderedCannotFindDescription));
}

use std::path::PathBuf;

use bfcl_eval::{
    config::CheckerConfig,
    error::{CheckerError, ErrorKind},
    eval_runner::{EvalRunner, TestCategory},
    paths::{model_result_file, possible_answer_file, prompt_file, score_file},
    reference_library::{Credentials, StandardLibrary},
    utils::{load_json_lines, write_json_lines_to_file},
};
use serde_json::{Value, json};

fn workspace(name: &str) -> CheckerConfig {
    let root: PathBuf = std::env::temp_dir().join(format!("bfcl_eval_{}_{}", name, std::process::id()));
    let _ = std::fs::remove_dir_all(&root);
    CheckerConfig {
        data_dir: root.join("data"),
        result_dir: root.join("result"),
        score_output_dir: root.join("score"),
        ..Default::default()
    }
}

fn triangle_prompt() -> Value {
    json!({
        "question": "What is the area of a triangle with base 10 and height 5?",
        "function": {
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
        },
        "execution_result": [25],
        "execution_result_type": ["exact_match"]
    })
}

#[test]
fn simple_category_is_scored_and_written() {
    let config = workspace("simple");
    let model = "gorilla-openfunctions-v0";
    let category = TestCategory::Simple;
    write_json_lines_to_file(prompt_file(&config.data_dir, category.as_str()), &[triangle_prompt(), triangle_prompt()]).unwrap();
    write_json_lines_to_file(
        possible_answer_file(&config.data_dir, category.as_str()),
        &[
            json!({"calculate_triangle_area": {"base": [10], "height": [5], "unit": ["units", ""]}}),
            json!({"calculate_triangle_area": {"base": [10], "height": [5], "unit": ["units", ""]}}),
        ],
    )
    .unwrap();
    write_json_lines_to_file(
        model_result_file(&config.result_dir, model, category.as_str()),
        &[
            json!({"id": 0, "result": "```python\n[calculate_triangle_area(base=10, height=5)]\n```"}),
            json!({"id": 1, "result": "[calculate_triangle_area(base=10)]"}),
        ],
    )
    .unwrap();

    let library = StandardLibrary::new(Credentials::default());
    let runner = EvalRunner::new(model, &config, &library);
    let summaries = runner.evaluate_all(&[category, TestCategory::Java]).unwrap();
    assert_eq!(summaries.len(), 1, "categories without a result file are skipped");
    let (_, summary) = summaries[0];
    assert_eq!((summary.correct_count, summary.total_count), (1, 2));
    assert_eq!(summary.accuracy, 0.5);

    let lines = load_json_lines(score_file(&config.score_output_dir, model, category.as_str())).unwrap();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["accuracy"], json!(0.5));
    assert_eq!(lines[1]["id"], json!(2));
    assert_eq!(lines[1]["valid"], json!(false));
    assert_eq!(lines[1]["error_type"], json!("simple_function_checker:missing_required"));
    assert_eq!(lines[1]["test_category"], json!("simple"));
}

#[test]
fn ast_runner_handles_empty_builtin_and_undecodable_outputs() {
    let config = workspace("ast_edges");
    let library = StandardLibrary::new(Credentials::default());
    let runner = EvalRunner::new("gorilla-openfunctions-v0", &config, &library);
    let prompt = triangle_prompt();
    let answer = json!({"calculate_triangle_area": {"base": [10], "height": [5]}});

    let score = runner
        .run_ast(
            TestCategory::Simple,
            &[
                json!({"result": ""}),
                json!({"result": "[f(a=1)]"}),
                json!({"result": "not python ("}),
                json!({"result": "[]"}),
                json!({"result": ""}),
            ],
            &[prompt.clone(), prompt.clone(), prompt.clone(), prompt.clone(), prompt],
            &[answer.clone(), json!({}), answer.clone(), answer, json!({})],
        )
        .unwrap();
    assert_eq!((score.correct_count, score.total_count), (1, 5));
    let kinds: Vec<_> = score.records.iter().map(|r| r.error_type).collect();
    assert_eq!(
        kinds,
        vec![
            Some(ErrorKind::EmptyModelOutput),
            Some(ErrorKind::EmptyPossibleAnswer),
            Some(ErrorKind::AstDecoderFailed),
            Some(ErrorKind::AstDecoderWrongOutputFormat),
        ]
    );
}

#[test]
fn builtin_answers_match_by_name_only() {
    let config = workspace("builtin");
    let library = StandardLibrary::new(Credentials::default());
    let runner = EvalRunner::new("gpt-4-0125-preview-FC", &config, &library);
    let prompt = json!({"question": "search", "function": [{"type": "web_search"}]});
    let answer = json!({"name": "web_search"});
    let score = runner
        .run_ast(
            TestCategory::Simple,
            &[
                json!({"result": {"name": "web_search"}}),
                json!({"result": {"name": "web_search", "arguments": {"q": "x"}}}),
            ],
            &[prompt.clone(), prompt],
            &[answer.clone(), answer],
        )
        .unwrap();
    assert_eq!(score.correct_count, 1);
    assert_eq!(score.records[0].error_type, Some(ErrorKind::BuiltinFunction));
}

#[test]
fn mismatched_file_lengths_are_fatal() {
    let config = workspace("lengths");
    let library = StandardLibrary::new(Credentials::default());
    let runner = EvalRunner::new("gorilla-openfunctions-v0", &config, &library);
    let outcome = runner.run_ast(TestCategory::Simple, &[json!({"result": ""})], &[], &[]);
    assert!(matches!(outcome, Err(CheckerError::LengthMismatch { model_result: 1, .. })));
}

#[test]
fn function_calling_results_are_executed() {
    let config = workspace("exec");
    let library = StandardLibrary::new(Credentials::default());
    let runner = EvalRunner::new("gpt-4-0125-preview-FC", &config, &library);
    let score = runner
        .run_executable(
            TestCategory::ExecutableSimple,
            &[
                json!({"result": [{"calculate_triangle_area": "{\"base\": 10, \"height\": 5}"}]}),
                json!({"result": [{"calculate_triangle_area": "{\"base\": 4, \"height\": 5}"}]}),
                json!({"result": "no calls here"}),
            ],
            &[triangle_prompt(), triangle_prompt(), triangle_prompt()],
        )
        .unwrap();
    assert_eq!(score.correct_count, 1);
    assert_eq!(score.records[0].error_type, Some(ErrorKind::WrongResult));
    assert_eq!(score.records[0].model_executed_output, Some(json!(10.0)));
    assert_eq!(score.records[1].error_type, Some(ErrorKind::ExecDecoderFailed));
}

#[test]
fn rest_category_without_ground_truth_is_a_configuration_error() {
    let config = workspace("rest");
    let library = StandardLibrary::new(Credentials::default());
    let runner = EvalRunner::new("gorilla-openfunctions-v0", &config, &library);
    let prompt = json!({"question": "q", "function": {"name": "requests.get", "parameters": {"properties": {}}}});

    let score = runner
        .run_executable(TestCategory::Rest, &[json!({"result": "[math_factorial(n=3)]"})], &[prompt.clone()])
        .unwrap();
    assert_eq!(score.records[0].error_type, Some(ErrorKind::RestDecoderWrongOutputFormat));

    let outcome = runner.run_executable(
        TestCategory::Rest,
        &[json!({"result": "[requests.get('http://localhost/x')]"})],
        &[prompt],
    );
    assert!(matches!(outcome, Err(CheckerError::Config(_))));
}

#[test]
fn relevance_passes_only_without_calls() {
    let config = workspace("relevance");
    let library = StandardLibrary::new(Credentials::default());
    let runner = EvalRunner::new("gorilla-openfunctions-v0", &config, &library);
    let score = runner.run_relevance(
        TestCategory::Relevance,
        &[
            json!({"result": "None of the functions can answer this."}),
            json!({"result": "[]"}),
            json!({"result": "[get_weather(city='Paris')]"}),
        ],
    );
    assert_eq!((score.correct_count, score.total_count), (2, 3));
    assert_eq!(score.records[0].error_type, Some(ErrorKind::RelevanceDecoderSuccess));
    assert_eq!(score.records[0].id, 3);
}

#[test]
fn malformed_entries_are_scored_and_evaluation_continues() {
    let config = workspace("malformed");
    let library = StandardLibrary::new(Credentials::default());
    let runner = EvalRunner::new("gorilla-openfunctions-v0", &config, &library);
    let result = json!({"result": "[calculate_triangle_area(base=10, height=5)]"});
    let answer = json!({"calculate_triangle_area": {"base": [10], "height": [5]}});

    let score = runner
        .run_ast(
            TestCategory::Simple,
            &[result.clone(), result.clone(), result.clone()],
            &[json!({"question": "q"}), triangle_prompt(), triangle_prompt()],
            &[answer.clone(), answer, json!(42)],
        )
        .unwrap();
    assert_eq!((score.correct_count, score.total_count), (1, 3));
    let failed: Vec<_> = score.records.iter().map(|r| (r.id, r.error_type)).collect();
    assert_eq!(
        failed,
        vec![
            (1, Some(ErrorKind::MalformedTestEntry)),
            (3, Some(ErrorKind::MalformedTestEntry)),
        ]
    );

    let score = runner
        .run_executable(
            TestCategory::ExecutableSimple,
            &[result.clone(), result],
            &[json!({"execution_result": [25]}), triangle_prompt()],
        )
        .unwrap();
    assert_eq!((score.correct_count, score.total_count), (1, 2));
    assert_eq!(score.records[0].error_type, Some(ErrorKind::MalformedTestEntry));
}

use bfcl_eval::{
    config::CheckerConfig,
    error::{CheckerError, ErrorKind, ExecError},
    eval_runner::TestCategory,
    exec_checker::{ComparisonMode, ExecContext, ExpectedExecution, check_executed_simple, exec_checker},
    reference_library::{Credentials, ReferenceLibrary, StandardLibrary},
    sandbox::ExecValue,
};
use indexmap::IndexMap;
use mockito::Matcher;
use serde_json::{Value, json};

/// Quotes a fixed price for any ticker.
struct Market {
    price: f64,
}

impl ReferenceLibrary for Market {
    fn contains(&self, name: &str) -> bool {
        name == "get_stock_price"
    }

    fn call(
        &self,
        _name: &str,
        _args: &[ExecValue],
        _kwargs: &IndexMap<String, ExecValue>,
    ) -> Result<ExecValue, ExecError> {
        Ok(ExecValue::float(self.price))
    }
}

fn standard() -> StandardLibrary {
    StandardLibrary::new(Credentials::default())
}

fn run(library: &dyn ReferenceLibrary, call: &str, expected: Value, mode: ComparisonMode) -> bfcl_eval::match_result::MatchResult {
    let config = CheckerConfig::default();
    let ctx = ExecContext {
        library,
        config: &config,
    };
    check_executed_simple(call, &expected, mode, false, &ctx).unwrap()
}

#[test]
fn exact_match_treats_integral_floats_as_integers() {
    let library = standard();
    let result = run(&library, "calculate_triangle_area(base=10, height=5)", json!(25), ComparisonMode::ExactMatch);
    assert!(result.valid, "{:?}", result.errors);

    let result = run(&library, "calculate_triangle_area(base=10, height=6)", json!(25), ComparisonMode::ExactMatch);
    assert_eq!(result.kind, Some(ErrorKind::WrongResult));
    assert_eq!(result.model_executed_output, Some(json!(30.0)));
}

#[test]
fn tuples_compare_equal_to_lists() {
    let result = run(&standard(), "quadratic_roots(a=1, b=-3, c=2)", json!([2, 1]), ComparisonMode::ExactMatch);
    assert!(result.valid, "{:?}", result.errors);
}

#[test]
fn real_time_match_allows_five_percent() {
    let inside = Market { price: 104.9 };
    assert!(run(&inside, "get_stock_price(ticker='AAPL')", json!(100.0), ComparisonMode::RealTimeMatch).valid);

    let outside = Market { price: 105.1 };
    let result = run(&outside, "get_stock_price(ticker='AAPL')", json!(100.0), ComparisonMode::RealTimeMatch);
    assert_eq!(result.kind, Some(ErrorKind::WrongResultRealTime));
}

#[test]
fn structural_match_ignores_values() {
    let library = standard();
    let result = run(&library, "get_prime_factors(number=12)", json!([7, 7, 7]), ComparisonMode::StructuralMatch);
    assert!(result.valid);
    let result = run(&library, "get_prime_factors(number=12)", json!([7, 7]), ComparisonMode::StructuralMatch);
    assert_eq!(result.kind, Some(ErrorKind::WrongResultListLength));
}

#[test]
fn functions_outside_the_library_are_execution_errors() {
    let result = run(&standard(), "os_system('rm -rf /')", json!(0), ComparisonMode::ExactMatch);
    assert_eq!(result.kind, Some(ErrorKind::ExecutionError));

    let result = run(&standard(), "math_factorial(n=__import__('os'))", json!(0), ComparisonMode::ExactMatch);
    assert_eq!(result.kind, Some(ErrorKind::ExecutionError));
}

#[test]
fn missing_credential_aborts_the_check() {
    let library = standard();
    let config = CheckerConfig::default();
    let ctx = ExecContext {
        library: &library,
        config: &config,
    };
    let outcome = check_executed_simple(
        "get_coordinates_from_city(city_name='Berlin')",
        &json!([52.52, 13.40]),
        ComparisonMode::ExactMatch,
        false,
        &ctx,
    );
    assert!(matches!(outcome, Err(CheckerError::MissingCredential(key)) if key == "GEOCODE_API_KEY"));
}

#[test]
fn geocoding_uses_the_configured_endpoint() {
    let mut server = mockito::Server::new();
    let mock = server
        .mock("GET", "/search")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("q".into(), "Berlin".into()),
            Matcher::UrlEncoded("api_key".into(), "test-key".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"[{"lat": "52.52", "lon": "13.40", "display_name": "Berlin"}]"#)
        .create();

    let library = StandardLibrary::new(Credentials {
        geocode_api_key: Some("test-key".to_string()),
    })
    .with_geocode_base_url(server.url());
    let result = run(
        &library,
        "get_coordinates_from_city(city_name='Berlin')",
        json!([52.52, 13.4]),
        ComparisonMode::ExactMatch,
    );
    assert!(result.valid, "{:?}", result.errors);
    mock.assert();
}

#[test]
fn parallel_results_match_in_any_order() {
    let library = standard();
    let config = CheckerConfig::default();
    let ctx = ExecContext {
        library: &library,
        config: &config,
    };
    let calls = vec!["math_factorial(n=5)".to_string(), "math_factorial(n=3)".to_string()];
    let expected = vec![
        ExpectedExecution::new(json!(6), ComparisonMode::ExactMatch),
        ExpectedExecution::new(json!(120), ComparisonMode::ExactMatch),
    ];
    let result = exec_checker(&calls, &expected, TestCategory::ExecutableParallelFunction, &ctx).unwrap();
    assert!(result.valid, "{:?}", result.errors);

    let result = exec_checker(&calls[..1], &expected, TestCategory::ExecutableParallelFunction, &ctx).unwrap();
    assert_eq!(result.kind, Some(ErrorKind::ExecResultCount));

    let wrong = vec!["math_factorial(n=5)".to_string(), "math_factorial(n=4)".to_string()];
    let result = exec_checker(&wrong, &expected, TestCategory::ExecutableParallelFunction, &ctx).unwrap();
    assert_eq!(result.kind, Some(ErrorKind::ExecCannotFindMatch));
    assert_eq!(result.sub_errors.len(), 2);
}

#[test]
fn simple_category_requires_one_call() {
    let library = standard();
    let config = CheckerConfig::default();
    let ctx = ExecContext {
        library: &library,
        config: &config,
    };
    let calls = vec!["math_factorial(n=3)".to_string(), "math_factorial(n=3)".to_string()];
    let expected = vec![ExpectedExecution::new(json!(6), ComparisonMode::ExactMatch)];
    let result = exec_checker(&calls, &expected, TestCategory::ExecutableSimple, &ctx).unwrap();
    assert_eq!(result.kind, Some(ErrorKind::SimpleExecWrongCount));
}

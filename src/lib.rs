pub mod ast_checker;
pub mod config;
pub mod decoder;
pub mod error;
pub mod eval_runner;
pub mod exec_checker;
pub mod function_doc;
pub mod match_result;
pub mod parse_ast;
pub mod paths;
pub mod possible_answer;
pub mod reference_library;
pub mod rest_checker;
pub mod sandbox;
pub mod type_coercion;
pub mod type_reconciler;
pub mod utils;
pub mod value_normalizer;

#[cfg(feature = "python")]
pub mod python_interface;

#[cfg(feature = "python")]
#[pyo3::pymodule]
pub mod bfcl_eval {
    #[pymodule_export]
    use super::python_interface::BfclChecker;
}

use std::fmt;

use serde::{Serialize, Serializer};
use thiserror::Error;

/// Closed set of failure categories a checker can report.
/// The serialized form is the `stage:leaf` string code consumed by score files.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    // type reconciliation
    TypeSimple,
    TypeNested,
    TypeUnknownDeclared,

    // value normalization
    ValueString,
    ValueListTuple,
    ValueDictItems,
    ValueDictKey,
    ValueDictValue,
    ValueDictValueType,
    ValueListDictCount,

    // single call
    WrongFuncName,
    MissingRequired,
    UnexpectedParam,
    MissingOptional,
    SimpleWrongCount,
    CannotConvertToList,
    CannotConvertToFloat,

    // multi call
    OrderedWrongCount,
    OrderedCannotFindDescription,
    UnorderedWrongCount,
    UnorderedCannotFindDescription,
    UnorderedCannotFindMatch,

    // execution
    ExecutionError,
    WrongResult,
    WrongResultRealTime,
    WrongResultType,
    WrongResultDictLength,
    WrongResultDictKeyNotFound,
    WrongResultDictExtraKey,
    WrongResultListLength,
    ExecCannotFindMatch,
    ExecResultCount,
    SimpleExecWrongCount,

    // rest
    RestExecutionError,
    RestWrongStatusCode,
    RestWrongKey,
    RestWrongType,
    RestResponseFormatError,
    RestCannotGetStatusCode,
    RestResultCount,

    // decoding and orchestration
    AstDecoderFailed,
    AstDecoderWrongOutputFormat,
    ExecDecoderFailed,
    ExecDecoderWrongOutputFormat,
    RestDecoderWrongOutputFormat,
    EmptyPossibleAnswer,
    EmptyModelOutput,
    BuiltinFunction,
    RelevanceDecoderSuccess,
    MalformedTestEntry,
}

impl ErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::TypeSimple => "type_error:simple",
            ErrorKind::TypeNested => "type_error:nested",
            ErrorKind::TypeUnknownDeclared => "type_error:unknown_declared_type",
            ErrorKind::ValueString => "value_error:string",
            ErrorKind::ValueListTuple => "value_error:list/tuple",
            ErrorKind::ValueDictItems => "value_error:dict_items",
            ErrorKind::ValueDictKey => "value_error:dict_key",
            ErrorKind::ValueDictValue => "value_error:dict_value",
            ErrorKind::ValueDictValueType => "value_error:dict_value's_type",
            ErrorKind::ValueListDictCount => "value_error:list_dict_count",
            ErrorKind::WrongFuncName => "simple_function_checker:wrong_func_name",
            ErrorKind::MissingRequired => "simple_function_checker:missing_required",
            ErrorKind::UnexpectedParam => "simple_function_checker:unexpected_param",
            ErrorKind::MissingOptional => "simple_function_checker:missing_optional",
            ErrorKind::SimpleWrongCount => "simple_function_checker:wrong_count",
            ErrorKind::CannotConvertToList => {
                "simple_function_checker:model_output_value_cannot_convert_to_list"
            }
            ErrorKind::CannotConvertToFloat => {
                "simple_function_checker:model_output_value_cannot_convert_to_float"
            }
            ErrorKind::OrderedWrongCount => "parallel_function_checker_enforce_order:wrong_count",
            ErrorKind::OrderedCannotFindDescription => {
                "parallel_function_checker_enforce_order:cannot_find_description"
            }
            ErrorKind::UnorderedWrongCount => "parallel_function_checker_no_order:wrong_count",
            ErrorKind::UnorderedCannotFindDescription => {
                "parallel_function_checker_no_order:cannot_find_description"
            }
            ErrorKind::UnorderedCannotFindMatch => {
                "parallel_function_checker_no_order:cannot_find_match"
            }
            ErrorKind::ExecutionError => "executable_checker:execution_error",
            ErrorKind::WrongResult => "executable_checker:wrong_result",
            ErrorKind::WrongResultRealTime => "executable_checker:wrong_result_real_time",
            ErrorKind::WrongResultType => "executable_checker:wrong_result_type",
            ErrorKind::WrongResultDictLength => "executable_checker:wrong_result_type:dict_length",
            ErrorKind::WrongResultDictKeyNotFound => {
                "executable_checker:wrong_result_type:dict_key_not_found"
            }
            ErrorKind::WrongResultDictExtraKey => {
                "executable_checker:wrong_result_type:dict_extra_key"
            }
            ErrorKind::WrongResultListLength => "executable_checker:wrong_result_type:list_length",
            ErrorKind::ExecCannotFindMatch => "executable_checker:cannot_find_match",
            ErrorKind::ExecResultCount => "value_error:exec_result_count",
            ErrorKind::SimpleExecWrongCount => "simple_exec_checker:wrong_count",
            ErrorKind::RestExecutionError => "executable_checker_rest:execution_error",
            ErrorKind::RestWrongStatusCode => "executable_checker_rest:wrong_status_code",
            ErrorKind::RestWrongKey => "executable_checker_rest:wrong_key",
            ErrorKind::RestWrongType => "executable_checker_rest:wrong_type",
            ErrorKind::RestResponseFormatError => "executable_checker_rest:response_format_error",
            ErrorKind::RestCannotGetStatusCode => "executable_checker_rest:cannot_get_status_code",
            ErrorKind::RestResultCount => "value_error:exec_result_rest_count",
            ErrorKind::AstDecoderFailed => "ast_decoder:decoder_failed",
            ErrorKind::AstDecoderWrongOutputFormat => "ast_decoder:decoder_wrong_output_format",
            ErrorKind::ExecDecoderFailed => "executable_decoder:decoder_failed",
            ErrorKind::ExecDecoderWrongOutputFormat => "executable_decoder:wrong_output_format",
            ErrorKind::RestDecoderWrongOutputFormat => {
                "executable_decoder:rest_wrong_output_format"
            }
            ErrorKind::EmptyPossibleAnswer => "ast_checker:empty_possible_answer",
            ErrorKind::EmptyModelOutput => "ast_checker:empty_model_output",
            ErrorKind::BuiltinFunction => "ast_checker:buildin_function",
            ErrorKind::RelevanceDecoderSuccess => "relevance_error:decoder_success",
            ErrorKind::MalformedTestEntry => "eval_runner:malformed_test_entry",
        }
    }
}

impl Serialize for ErrorKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.code())
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Failures that are not scoring outcomes and must abort the run.
#[derive(Debug, Error)]
pub enum CheckerError {
    #[error("missing credential {0}: the reference execution library cannot run without it")]
    MissingCredential(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Unable to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(
        "The length of the model result ({model_result}) does not match the length of the prompt ({prompt}) or possible answer ({possible_answer}). Please check the input files for completeness."
    )]
    LengthMismatch {
        model_result: usize,
        prompt: usize,
        possible_answer: usize,
    },
}

/// Failures while evaluating a call expression inside the sandbox.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("invalid syntax: {0}")]
    Syntax(String),

    #[error("unsupported expression: {0}")]
    Unsupported(String),

    #[error("name '{0}' is not defined")]
    UnknownFunction(String),

    #[error("{function}() argument error: {message}")]
    BadArguments { function: String, message: String },

    #[error("{0}")]
    Runtime(String),

    #[error("missing credential {0}")]
    MissingCredential(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl ExecError {
    pub fn bad_args(function: &str, message: impl Into<String>) -> Self {
        ExecError::BadArguments {
            function: function.to_string(),
            message: message.into(),
        }
    }
}

/// Failures reported by a model decoder.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Python function calls parsing failed: {0}")]
    Syntax(String),

    #[error("unexpected model output shape: {0}")]
    Shape(String),

    #[error("arguments are not valid JSON: {0}")]
    Arguments(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CheckerError>;

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    error::ErrorKind,
    function_doc::ParamSpec,
    match_result::MatchResult,
    possible_answer::{AcceptableValue, possible_answer_type},
};

/// Type vocabulary the function descriptions are written in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Language {
    #[default]
    Python,
    Java,
    JavaScript,
}

impl Language {
    /// Declared type names that carry one extra level of element typing via `items`.
    fn nested_type_names(&self) -> &'static [&'static str] {
        match self {
            Language::Python => &["array", "tuple"],
            Language::Java | Language::JavaScript => &["Array", "ArrayList", "array"],
        }
    }

    fn type_table(&self) -> &'static [(&'static str, RuntimeType)] {
        match self {
            Language::Python => PYTHON_TYPES,
            Language::Java => JAVA_TYPES,
            Language::JavaScript => JS_TYPES,
        }
    }

    /// Java and JavaScript handlers stringify every argument, so values are
    /// coerced back into the declared representation before type checking.
    pub fn needs_coercion(&self) -> bool {
        !matches!(self, Language::Python)
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Language::Python => "Python",
            Language::Java => "Java",
            Language::JavaScript => "JavaScript",
        };
        f.write_str(name)
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "python" => Ok(Language::Python),
            "java" => Ok(Language::Java),
            "javascript" | "js" => Ok(Language::JavaScript),
            other => Err(format!("unknown language vocabulary: {}", other)),
        }
    }
}

/// Canonical runtime type a decoded value can have.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RuntimeType {
    Str,
    Int,
    Float,
    Bool,
    List,
    Dict,
    None,
}

impl RuntimeType {
    pub fn name(&self) -> &'static str {
        match self {
            RuntimeType::Str => "str",
            RuntimeType::Int => "int",
            RuntimeType::Float => "float",
            RuntimeType::Bool => "bool",
            RuntimeType::List => "list",
            RuntimeType::Dict => "dict",
            RuntimeType::None => "NoneType",
        }
    }
}

impl fmt::Display for RuntimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

const PYTHON_TYPES: &[(&str, RuntimeType)] = &[
    ("string", RuntimeType::Str),
    ("integer", RuntimeType::Int),
    ("float", RuntimeType::Float),
    ("boolean", RuntimeType::Bool),
    ("array", RuntimeType::List),
    ("tuple", RuntimeType::List),
    ("dict", RuntimeType::Dict),
    ("any", RuntimeType::Str),
];

// Set, Queue and Stack have no JSON representation other than a list.
const JAVA_TYPES: &[(&str, RuntimeType)] = &[
    ("byte", RuntimeType::Int),
    ("short", RuntimeType::Int),
    ("integer", RuntimeType::Int),
    ("float", RuntimeType::Float),
    ("double", RuntimeType::Float),
    ("long", RuntimeType::Int),
    ("boolean", RuntimeType::Bool),
    ("char", RuntimeType::Str),
    ("Array", RuntimeType::List),
    ("ArrayList", RuntimeType::List),
    ("Set", RuntimeType::List),
    ("HashMap", RuntimeType::Dict),
    ("Hashtable", RuntimeType::Dict),
    ("Queue", RuntimeType::List),
    ("Stack", RuntimeType::List),
    ("String", RuntimeType::Str),
    ("any", RuntimeType::Str),
];

const JS_TYPES: &[(&str, RuntimeType)] = &[
    ("String", RuntimeType::Str),
    ("integer", RuntimeType::Int),
    ("float", RuntimeType::Float),
    ("Bigint", RuntimeType::Int),
    ("Boolean", RuntimeType::Bool),
    ("dict", RuntimeType::Dict),
    ("array", RuntimeType::List),
    ("any", RuntimeType::Str),
];

pub fn runtime_type_of(value: &Value) -> RuntimeType {
    match value {
        Value::String(_) => RuntimeType::Str,
        Value::Number(n) if n.is_f64() => RuntimeType::Float,
        Value::Number(_) => RuntimeType::Int,
        Value::Bool(_) => RuntimeType::Bool,
        Value::Array(_) => RuntimeType::List,
        Value::Object(_) => RuntimeType::Dict,
        Value::Null => RuntimeType::None,
    }
}

pub fn lookup_type(declared: &str, language: Language) -> Option<RuntimeType> {
    language
        .type_table()
        .iter()
        .find(|(name, _)| *name == declared)
        .map(|(_, runtime)| *runtime)
}

/// Declared parameter type resolved into the runtime vocabulary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reconciled {
    pub declared: String,
    pub runtime: RuntimeType,
    /// Element type for container declarations. Only one level is resolved.
    pub nested: Option<RuntimeType>,
    pub nested_declared: Option<String>,
}

/// Maps a parameter schema to its runtime type. `Err` carries the unknown type name.
pub fn reconcile(param_spec: &ParamSpec, language: Language) -> Result<Reconciled, String> {
    let runtime = lookup_type(&param_spec.type_name, language).ok_or_else(|| param_spec.type_name.clone())?;
    let (nested, nested_declared) = if language.nested_type_names().contains(&param_spec.type_name.as_str())
    {
        match &param_spec.items {
            Some(items) => (
                Some(lookup_type(&items.type_name, language).ok_or_else(|| items.type_name.clone())?),
                Some(items.type_name.clone()),
            ),
            None => (None, None),
        }
    } else {
        (None, None)
    };
    Ok(Reconciled {
        declared: param_spec.type_name.clone(),
        runtime,
        nested,
        nested_declared,
    })
}

/// `float(value)`: integers, booleans and numeric strings convert.
pub fn convert_to_float(value: &Value) -> Option<Value> {
    let f = match value {
        Value::Number(n) => n.as_f64()?,
        Value::Bool(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    serde_json::Number::from_f64(f).map(Value::Number)
}

/// `list(value)`: sequences stay, strings split into characters, dicts yield their keys.
pub fn convert_to_list(value: &Value) -> Option<Value> {
    match value {
        Value::Array(_) => Some(value.clone()),
        Value::String(s) => Some(Value::Array(
            s.chars().map(|c| Value::String(c.to_string())).collect(),
        )),
        Value::Object(map) => Some(Value::Array(
            map.keys().map(|k| Value::String(k.clone())).collect(),
        )),
        _ => None,
    }
}

/// Type-equivalence policy for one argument.
///
/// A value of the declared type passes (container elements are checked one
/// level deep against the list-shaped acceptable values). A value whose type
/// differs from the declaration but matches the type of the acceptable values
/// is a variable reference; the result is valid with `is_variable` set.
pub fn type_check(
    param: &str,
    value: &Value,
    candidates: &[AcceptableValue],
    declared: &str,
    expected: RuntimeType,
    nested: Option<RuntimeType>,
) -> MatchResult {
    let answer_type = possible_answer_type(candidates);
    let is_variable = answer_type.is_some_and(|t| t != expected);
    let actual = runtime_type_of(value);

    let mut nested_failed = false;
    if actual == expected {
        let Some(nested_type) = nested else {
            let mut result = MatchResult::success();
            result.is_variable = is_variable;
            return result;
        };
        let items = value.as_array().map(Vec::as_slice).unwrap_or_default();
        for candidate in candidates {
            // Every element has to fit the element type of at least one list-shaped answer.
            let all_items_fit = match candidate {
                AcceptableValue::List(inner) => items.iter().all(|item| {
                    type_check(param, item, inner, nested_type.name(), nested_type, None).valid
                }),
                _ => true,
            };
            if all_items_fit {
                let mut result = MatchResult::success();
                result.is_variable = is_variable;
                return result;
            }
        }
        nested_failed = true;
    }

    if is_variable && answer_type == Some(actual) {
        let mut result = MatchResult::success();
        result.is_variable = true;
        return result;
    }

    if nested_failed {
        let inner = nested.map(|t| t.name()).unwrap_or_default();
        return MatchResult::failure(
            ErrorKind::TypeNested,
            format!(
                "Nested type checking failed for parameter '{}'. Expected outer type {} with inner type {}. Parameter value: {}.",
                param, declared, inner, value
            ),
        );
    }
    MatchResult::failure(
        ErrorKind::TypeSimple,
        format!(
            "Incorrect type for parameter '{}'. Expected type {}, got {}. Parameter value: {}.",
            param, declared, actual, value
        ),
    )
}

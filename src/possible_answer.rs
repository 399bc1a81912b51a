use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::type_reconciler::{RuntimeType, runtime_type_of};

/// One acceptable value for a parameter, resolved once at load time.
#[derive(Clone, Debug, PartialEq)]
pub enum AcceptableValue {
    /// The `""` sentinel: the parameter (or dict field) may be omitted.
    Omitted,
    Literal(Value),
    List(Vec<AcceptableValue>),
    Dict(DictAnswer),
}

/// Ground truth for a dictionary-shaped value: each key maps either to its set
/// of acceptable values or directly to a nested dictionary shape.
pub type DictAnswer = IndexMap<String, DictField>;

#[derive(Clone, Debug, PartialEq)]
pub enum DictField {
    Candidates(Vec<AcceptableValue>),
    Nested(DictAnswer),
}

impl AcceptableValue {
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::String(s) if s.is_empty() => AcceptableValue::Omitted,
            Value::Array(items) => {
                AcceptableValue::List(items.iter().map(AcceptableValue::from_json).collect())
            }
            Value::Object(map) => AcceptableValue::Dict(dict_answer_from_json(map)),
            other => AcceptableValue::Literal(other.clone()),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            AcceptableValue::Omitted => Value::String(String::new()),
            AcceptableValue::Literal(v) => v.clone(),
            AcceptableValue::List(items) => {
                Value::Array(items.iter().map(AcceptableValue::to_json).collect())
            }
            AcceptableValue::Dict(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(k, field)| (k.clone(), field.to_json()))
                    .collect(),
            ),
        }
    }

    pub fn is_omitted(&self) -> bool {
        matches!(self, AcceptableValue::Omitted)
    }

    /// The runtime type this acceptable value would have as a model value.
    /// `None` for the omission sentinel, which carries no type information.
    pub fn runtime_type(&self) -> Option<RuntimeType> {
        match self {
            AcceptableValue::Omitted => None,
            AcceptableValue::Literal(v) => Some(runtime_type_of(v)),
            AcceptableValue::List(_) => Some(RuntimeType::List),
            AcceptableValue::Dict(_) => Some(RuntimeType::Dict),
        }
    }
}

impl DictField {
    fn from_json(value: &Value) -> Self {
        match value {
            Value::Object(map) => DictField::Nested(dict_answer_from_json(map)),
            Value::Array(items) => {
                DictField::Candidates(items.iter().map(AcceptableValue::from_json).collect())
            }
            scalar => DictField::Candidates(vec![AcceptableValue::from_json(scalar)]),
        }
    }

    fn to_json(&self) -> Value {
        match self {
            DictField::Candidates(values) => {
                Value::Array(values.iter().map(AcceptableValue::to_json).collect())
            }
            DictField::Nested(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(k, field)| (k.clone(), field.to_json()))
                    .collect(),
            ),
        }
    }
}

fn dict_answer_from_json(map: &serde_json::Map<String, Value>) -> DictAnswer {
    map.iter()
        .map(|(k, v)| (k.clone(), DictField::from_json(v)))
        .collect()
}

/// Type of the first non-sentinel acceptable value, used to detect variable references.
pub fn possible_answer_type(candidates: &[AcceptableValue]) -> Option<RuntimeType> {
    candidates.iter().find_map(AcceptableValue::runtime_type)
}

impl<'de> Deserialize<'de> for AcceptableValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(AcceptableValue::from_json(&value))
    }
}

impl Serialize for AcceptableValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl fmt::Display for AcceptableValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

/// Acceptable values per parameter of one expected call, in declaration order.
pub type ParamAnswers = IndexMap<String, Vec<AcceptableValue>>;

/// One expected call: a function name and its acceptable argument values.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ExpectedCall {
    pub name: String,
    pub arguments: ParamAnswers,
}

impl ExpectedCall {
    pub fn new(name: impl Into<String>, arguments: ParamAnswers) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }

    pub fn allows_omitting(&self, param: &str) -> bool {
        self.arguments
            .get(param)
            .is_some_and(|candidates| candidates.iter().any(AcceptableValue::is_omitted))
    }

    pub fn to_json(&self) -> Value {
        let params: serde_json::Map<String, Value> = self
            .arguments
            .iter()
            .map(|(k, vs)| {
                (
                    k.clone(),
                    Value::Array(vs.iter().map(AcceptableValue::to_json).collect()),
                )
            })
            .collect();
        let mut wrapper = serde_json::Map::new();
        wrapper.insert(self.name.clone(), Value::Object(params));
        Value::Object(wrapper)
    }
}

/// Ground truth of a simple case: `{"name": ..., "arguments": {...}}`.
/// A record without `arguments` describes a built-in, argument-less tool.
#[derive(Deserialize, Clone, Debug)]
pub struct SimplePossibleAnswer {
    pub name: String,
    #[serde(default)]
    pub arguments: Option<ParamAnswers>,
}

impl SimplePossibleAnswer {
    pub fn is_builtin(&self) -> bool {
        self.arguments.is_none()
    }

    pub fn into_expected(self) -> ExpectedCall {
        ExpectedCall::new(self.name, self.arguments.unwrap_or_default())
    }
}

/// Ground truth for multiple calls, kept in declaration order.
/// Accepts either `{"f": {...}, "g": {...}}` or `[{"f": {...}}, {"g": {...}}]`;
/// the list form allows the same function to be expected more than once.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MultiPossibleAnswer(pub Vec<ExpectedCall>);

impl MultiPossibleAnswer {
    pub fn from_json(value: &Value) -> Result<Self, String> {
        let mut calls = Vec::new();
        let mut push_map = |map: &serde_json::Map<String, Value>| -> Result<(), String> {
            for (name, params) in map {
                let arguments: ParamAnswers = serde_json::from_value(params.clone())
                    .map_err(|e| format!("invalid possible answer for {}: {}", name, e))?;
                calls.push(ExpectedCall::new(name.clone(), arguments));
            }
            Ok(())
        };
        match value {
            Value::Object(map) => push_map(map)?,
            Value::Array(items) => {
                for item in items {
                    let Value::Object(map) = item else {
                        return Err(format!("expected an object per expected call, got {}", item));
                    };
                    push_map(map)?;
                }
            }
            other => return Err(format!("expected an object or a list, got {}", other)),
        }
        Ok(Self(calls))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ExpectedCall> {
        self.0.iter()
    }
}

impl From<ExpectedCall> for MultiPossibleAnswer {
    fn from(call: ExpectedCall) -> Self {
        Self(vec![call])
    }
}

impl<'de> Deserialize<'de> for MultiPossibleAnswer {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        MultiPossibleAnswer::from_json(&value).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_string_becomes_the_omission_sentinel() {
        let answers: Vec<AcceptableValue> =
            serde_json::from_value(json!(["meters", ""])).unwrap();
        assert_eq!(answers[0], AcceptableValue::Literal(json!("meters")));
        assert!(answers[1].is_omitted());
        assert_eq!(possible_answer_type(&answers), Some(RuntimeType::Str));
    }

    #[test]
    fn nested_dict_answers_resolve_to_fields() {
        let answer = AcceptableValue::from_json(&json!({
            "field": ["age"],
            "range": {"low": [18], "high": [65]}
        }));
        let AcceptableValue::Dict(fields) = answer else {
            panic!("expected a dict answer");
        };
        assert!(matches!(fields["field"], DictField::Candidates(_)));
        assert!(matches!(fields["range"], DictField::Nested(_)));
    }

    #[test]
    fn multi_answer_accepts_map_and_list_forms() {
        let from_map = MultiPossibleAnswer::from_json(&json!({
            "f": {"a": [1]},
            "g": {"b": [2]}
        }))
        .unwrap();
        let from_list = MultiPossibleAnswer::from_json(&json!([
            {"f": {"a": [1]}},
            {"f": {"a": [3]}}
        ]))
        .unwrap();
        assert_eq!(from_map.len(), 2);
        assert_eq!(from_map.0[1].name, "g");
        assert_eq!(from_list.0[0].name, from_list.0[1].name);
    }

    #[test]
    fn simple_answer_without_arguments_is_builtin() {
        let answer: SimplePossibleAnswer =
            serde_json::from_value(json!({"name": "web_search"})).unwrap();
        assert!(answer.is_builtin());
    }
}

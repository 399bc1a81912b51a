use indexmap::IndexMap;
use serde_json::Value;

use crate::{
    error::DecodeError,
    parse_ast::{DecodedCall, decode_call_sources, decode_function_list, python_repr},
    type_reconciler::Language,
};

/// Turns a raw model result into structured calls or executable call expressions.
pub trait ModelDecoder {
    fn decode_ast(&self, raw: &Value, language: Language) -> Result<Vec<DecodedCall>, DecodeError>;

    fn decode_execute(&self, raw: &Value) -> Result<Vec<String>, DecodeError> {
        Ok(self
            .decode_ast(raw, Language::Python)?
            .iter()
            .map(DecodedCall::to_python_source)
            .collect())
    }
}

/// For prompt-style models whose answer is Python source such as `[f(a=1), g(b='x')]`.
#[derive(Clone, Copy, Debug, Default)]
pub struct PromptDecoder;

impl ModelDecoder for PromptDecoder {
    fn decode_ast(&self, raw: &Value, _language: Language) -> Result<Vec<DecodedCall>, DecodeError> {
        let Value::String(source) = raw else {
            return Err(DecodeError::Shape(format!(
                "expected Python source text, got {}",
                raw
            )));
        };
        decode_function_list(strip_code_fence(source))
    }

    /// Keeps each call exactly as written so positional arguments survive.
    fn decode_execute(&self, raw: &Value) -> Result<Vec<String>, DecodeError> {
        let Value::String(source) = raw else {
            return Err(DecodeError::Shape(format!(
                "expected Python source text, got {}",
                raw
            )));
        };
        decode_call_sources(strip_code_fence(source))
    }
}

/// For function-calling models that return `{name, arguments}` records.
#[derive(Clone, Copy, Debug, Default)]
pub struct FunctionCallingDecoder;

impl ModelDecoder for FunctionCallingDecoder {
    fn decode_ast(&self, raw: &Value, language: Language) -> Result<Vec<DecodedCall>, DecodeError> {
        let mut calls = match raw {
            Value::Array(items) => items
                .iter()
                .map(decode_invocation)
                .collect::<Result<Vec<_>, _>>()?,
            Value::Object(_) => vec![decode_invocation(raw)?],
            other => {
                return Err(DecodeError::Shape(format!(
                    "expected a function call record, got {}",
                    other
                )));
            }
        };
        // Java and JavaScript handlers receive every argument as a string.
        if language.needs_coercion() {
            for call in &mut calls {
                for value in call.arguments.values_mut() {
                    if !value.is_string() {
                        *value = Value::String(python_repr(value));
                    }
                }
            }
        }
        Ok(calls)
    }
}

/// Accepts `{"name": n, "arguments": a}` or the compact `{n: a}`, where `a`
/// is a JSON object or a JSON-encoded string of one.
fn decode_invocation(record: &Value) -> Result<DecodedCall, DecodeError> {
    let Value::Object(map) = record else {
        return Err(DecodeError::Shape(format!(
            "expected a function call record, got {}",
            record
        )));
    };
    let (name, arguments) = match (map.get("name"), map.get("arguments")) {
        (Some(Value::String(name)), Some(arguments)) => (name.clone(), arguments),
        _ => {
            let mut entries = map.iter();
            match (entries.next(), entries.next()) {
                (Some((name, arguments)), None) => (name.clone(), arguments),
                _ => {
                    return Err(DecodeError::Shape(format!(
                        "cannot find the function name in {}",
                        record
                    )));
                }
            }
        }
    };
    let arguments = match arguments {
        Value::String(encoded) if encoded.trim().is_empty() => Value::Object(Default::default()),
        Value::String(encoded) => serde_json::from_str(encoded)?,
        other => other.clone(),
    };
    let Value::Object(arguments) = arguments else {
        return Err(DecodeError::Shape(format!(
            "arguments of {} are not an object",
            name
        )));
    };
    Ok(DecodedCall::new(
        name,
        arguments.into_iter().collect::<IndexMap<_, _>>(),
    ))
}

fn strip_code_fence(source: &str) -> &str {
    let trimmed = source.trim();
    let Some(body) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = body.strip_prefix("python").unwrap_or(body);
    body.strip_suffix("```").unwrap_or(body).trim()
}

/// Function-calling decoding for model names carrying the `FC` marker.
pub fn decoder_for_model(model_name: &str) -> Box<dyn ModelDecoder> {
    if model_name.contains("FC") {
        Box::new(FunctionCallingDecoder)
    } else {
        Box::new(PromptDecoder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn prompt_decoder_parses_python_source() {
        let calls = PromptDecoder
            .decode_ast(&json!("```python\n[f(a=1), g(b='x')]\n```"), Language::Python)
            .unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].arguments["b"], json!("x"));
    }

    #[test]
    fn function_calling_decoder_accepts_both_record_shapes() {
        let single = FunctionCallingDecoder
            .decode_ast(
                &json!({"name": "ExpertSearch", "arguments": "{\"query\": \"price\"}"}),
                Language::Python,
            )
            .unwrap();
        assert_eq!(single[0].name, "ExpertSearch");
        assert_eq!(single[0].arguments["query"], json!("price"));

        let many = FunctionCallingDecoder
            .decode_ast(
                &json!([{"f": "{\"a\": 1}"}, {"g": {"b": [1, 2]}}]),
                Language::Python,
            )
            .unwrap();
        assert_eq!(many.len(), 2);
        assert_eq!(many[1].arguments["b"], json!([1, 2]));
    }

    #[test]
    fn java_arguments_are_stringified() {
        let calls = FunctionCallingDecoder
            .decode_ast(&json!({"name": "f", "arguments": {"n": 5, "ok": true}}), Language::Java)
            .unwrap();
        assert_eq!(calls[0].arguments["n"], json!("5"));
        assert_eq!(calls[0].arguments["ok"], json!("True"));
    }

    #[test]
    fn execute_renders_python_calls() {
        let rendered = PromptDecoder
            .decode_execute(&json!("[math_factorial(number=5)]"))
            .unwrap();
        assert_eq!(rendered, vec!["math_factorial(number=5)".to_string()]);
        let rendered = PromptDecoder
            .decode_execute(&json!("[requests.get('https://api.example.com/v1', params={'q': 1}), f(2)]"))
            .unwrap();
        assert_eq!(
            rendered,
            vec![
                "requests.get('https://api.example.com/v1', params={'q': 1})".to_string(),
                "f(2)".to_string()
            ]
        );
        assert!(
            decoder_for_model("gpt-4-FC")
                .decode_execute(&json!("not json"))
                .is_err()
        );
    }
}

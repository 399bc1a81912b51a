//! Restates stringified Java / JavaScript argument values in the representation
//! their declared type implies (`"123L"` -> `123`, `"new int[]{1, 2}"` -> `[1, 2]`).
//! Values that cannot be coerced are returned unchanged so the type check reports them.

use serde_json::{Map, Number, Value};
use tracing::debug;

use crate::type_reconciler::Language;

pub fn coerce_value(
    value: &Value,
    language: Language,
    declared: &str,
    nested: Option<&str>,
) -> Value {
    let Value::String(raw) = value else {
        return value.clone();
    };
    let coerced = match language {
        Language::Java => coerce_java(raw, declared, nested),
        Language::JavaScript => coerce_js(raw, declared, nested),
        Language::Python => None,
    };
    match coerced {
        Some(coerced) => {
            debug!(%language, declared, raw = raw.as_str(), %coerced, "coerced argument value");
            coerced
        }
        None => value.clone(),
    }
}

fn coerce_java(raw: &str, declared: &str, nested: Option<&str>) -> Option<Value> {
    let raw = raw.trim();
    match declared {
        "byte" | "short" | "integer" | "long" => parse_int(raw.trim_end_matches(['L', 'l'])),
        "float" | "double" => parse_float(raw.trim_end_matches(['f', 'F', 'd', 'D'])),
        "boolean" => parse_bool(raw),
        "char" => Some(Value::String(strip_quotes(raw, '\'').to_string())),
        "String" | "any" => Some(Value::String(strip_quotes(raw, '"').to_string())),
        "Array" | "ArrayList" | "Set" | "Queue" | "Stack" => {
            let body = java_collection_body(raw)?;
            let items = split_top_level(body, ',')
                .into_iter()
                .map(|item| match nested {
                    Some(inner) => coerce_java(item, inner, None)
                        .unwrap_or_else(|| Value::String(item.trim().to_string())),
                    None => guess_literal(item),
                })
                .collect();
            Some(Value::Array(items))
        }
        "HashMap" | "Hashtable" => java_map(raw),
        _ => None,
    }
}

/// Content between the delimiters of `new T[]{...}`, `Arrays.asList(...)`, `List.of(...)` or `[...]`.
fn java_collection_body(raw: &str) -> Option<&str> {
    if let (Some(open), Some(close)) = (raw.find('{'), raw.rfind('}')) {
        return (open < close).then(|| &raw[open + 1..close]);
    }
    for call in ["asList(", "List.of(", "Set.of(", "Stack<>(", "ArrayList<>("] {
        if let Some(pos) = raw.rfind(call) {
            let open = pos + call.len() - 1;
            let close = matching_close(raw, open)?;
            return Some(&raw[open + 1..close]);
        }
    }
    if raw.starts_with('[') && raw.ends_with(']') {
        return Some(&raw[1..raw.len() - 1]);
    }
    None
}

fn java_map(raw: &str) -> Option<Value> {
    let mut map = Map::new();
    if let Some(pos) = raw.find("Map.of(") {
        let open = pos + "Map.of(".len() - 1;
        let close = matching_close(raw, open)?;
        let parts = split_top_level(&raw[open + 1..close], ',');
        if parts.len() % 2 != 0 {
            return None;
        }
        for pair in parts.chunks(2) {
            map.insert(
                strip_quotes(pair[0].trim(), '"').to_string(),
                Value::String(strip_quotes(pair[1].trim(), '"').to_string()),
            );
        }
        return Some(Value::Object(map));
    }
    if raw.contains("put(") {
        for segment in raw.split("put(").skip(1) {
            let args = segment.split(");").next()?.trim_end_matches(')');
            let parts = split_top_level(args, ',');
            let [key, value] = parts.as_slice() else {
                return None;
            };
            map.insert(
                strip_quotes(key.trim(), '"').to_string(),
                Value::String(strip_quotes(value.trim(), '"').to_string()),
            );
        }
        return Some(Value::Object(map));
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(parsed)) => Some(Value::Object(parsed)),
        _ => None,
    }
}

fn coerce_js(raw: &str, declared: &str, nested: Option<&str>) -> Option<Value> {
    let raw = raw.trim();
    match declared {
        "integer" | "Bigint" => parse_int(raw.trim_end_matches('n')),
        "float" => parse_float(raw),
        "Boolean" => parse_bool(raw),
        "String" | "any" => Some(Value::String(strip_any_quotes(raw).to_string())),
        "array" => {
            let body = raw.strip_prefix('[')?.strip_suffix(']')?;
            let items = split_top_level(body, ',')
                .into_iter()
                .map(|item| match nested {
                    Some(inner) => coerce_js(item, inner, None).unwrap_or_else(|| guess_literal(item)),
                    None => guess_literal(item),
                })
                .collect();
            Some(Value::Array(items))
        }
        "dict" => js_object(raw),
        _ => None,
    }
}

fn js_object(raw: &str) -> Option<Value> {
    let body = raw.strip_prefix('{')?.strip_suffix('}')?;
    let mut map = Map::new();
    for entry in split_top_level(body, ',') {
        let (key, value) = entry.split_once(':')?;
        map.insert(strip_any_quotes(key.trim()).to_string(), guess_literal(value));
    }
    Some(Value::Object(map))
}

/// Interprets an untyped literal: quoted strings, booleans, numbers, arrays, objects.
fn guess_literal(raw: &str) -> Value {
    let raw = raw.trim();
    if let Some(b) = parse_bool(raw) {
        return b;
    }
    if let Some(i) = parse_int(raw) {
        return i;
    }
    if let Some(f) = parse_float(raw) {
        return f;
    }
    if raw.starts_with('[') {
        if let Some(list) = coerce_js(raw, "array", None) {
            return list;
        }
    }
    if raw.starts_with('{') {
        if let Some(object) = js_object(raw) {
            return object;
        }
    }
    Value::String(strip_any_quotes(raw).to_string())
}

fn parse_int(raw: &str) -> Option<Value> {
    raw.trim().parse::<i64>().ok().map(|i| Value::Number(i.into()))
}

fn parse_float(raw: &str) -> Option<Value> {
    let f = raw.trim().parse::<f64>().ok()?;
    Number::from_f64(f).map(Value::Number)
}

fn parse_bool(raw: &str) -> Option<Value> {
    match raw.trim() {
        "true" | "True" => Some(Value::Bool(true)),
        "false" | "False" => Some(Value::Bool(false)),
        _ => None,
    }
}

fn strip_quotes(raw: &str, quote: char) -> &str {
    raw.strip_prefix(quote)
        .and_then(|s| s.strip_suffix(quote))
        .unwrap_or(raw)
}

fn strip_any_quotes(raw: &str) -> &str {
    let stripped = strip_quotes(raw, '"');
    if stripped.len() != raw.len() {
        return stripped;
    }
    let stripped = strip_quotes(raw, '\'');
    if stripped.len() != raw.len() {
        return stripped;
    }
    strip_quotes(raw, '`')
}

fn matching_close(raw: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    for (i, c) in raw.char_indices().skip_while(|(i, _)| *i < open) {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '(' | '[' | '{') => depth += 1,
            (None, ')' | ']' | '}') => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Splits on `sep` outside of brackets and quotes. Empty trailing items are dropped.
fn split_top_level(raw: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (i, c) in raw.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'' | '`') => quote = Some(c),
            (None, '(' | '[' | '{') => depth += 1,
            (None, ')' | ']' | '}') => depth -= 1,
            (None, c) if c == sep && depth == 0 => {
                parts.push(raw[start..i].trim());
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    let last = raw[start..].trim();
    if !last.is_empty() {
        parts.push(last);
    }
    parts
}

use indexmap::IndexMap;
use rustpython_parser::{
    Mode,
    ast::{self, Ranged},
    parse,
    text_size::TextRange,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::error::DecodeError;

/// One decoded model call: a function name and its keyword arguments in source order.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DecodedCall {
    pub name: String,
    pub arguments: IndexMap<String, Value>,
}

impl DecodedCall {
    pub fn new(name: impl Into<String>, arguments: IndexMap<String, Value>) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }

    /// The `{name: {param: value}}` shape used in score-file diagnostics.
    pub fn to_json(&self) -> Value {
        let params: Map<String, Value> = self
            .arguments
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let mut wrapper = Map::new();
        wrapper.insert(self.name.clone(), Value::Object(params));
        Value::Object(wrapper)
    }

    /// Renders the call back to Python source, `name(k=<repr>, ...)`.
    pub fn to_python_source(&self) -> String {
        let args: Vec<String> = self
            .arguments
            .iter()
            .map(|(k, v)| format!("{}={}", k, python_repr(v)))
            .collect();
        format!("{}({})", self.name, args.join(", "))
    }
}

pub fn parse_from_string_to_ast(function_calls: &str) -> Result<Vec<ast::Expr>, DecodeError> {
    let parsed = parse(function_calls.trim(), Mode::Expression, "<model_output>")
        .map_err(|e| DecodeError::Syntax(format!("invalid syntax: {}", e)))?;
    let ast::Mod::Expression(expr) = parsed else {
        return Err(DecodeError::Shape("expected an expression".to_string()));
    };
    match *expr.body {
        ast::Expr::List(list_expr) => Ok(list_expr.elts),
        ast::Expr::Tuple(tuple_expr) => Ok(tuple_expr.elts),
        call @ ast::Expr::Call(_) => Ok(vec![call]),
        other => Err(DecodeError::Shape(format!(
            "expected a list of function calls, got {}",
            expr_kind(&other)
        ))),
    }
}

pub fn parse_from_ast_to_structured(
    function_calls_ast: &[ast::Expr],
    raw_function_calls: &str,
) -> Result<Vec<DecodedCall>, DecodeError> {
    let source = raw_function_calls.trim();
    let mut function_calls = Vec::new();
    for expr in function_calls_ast {
        let ast::Expr::Call(call_expr) = expr else {
            return Err(DecodeError::Shape(format!(
                "expected a function call expression, got {}",
                expr_kind(expr)
            )));
        };
        let name = dotted_name(&call_expr.func).ok_or_else(|| {
            DecodeError::Shape(format!(
                "unsupported function expression: {}",
                expr_kind(&call_expr.func)
            ))
        })?;
        let mut arguments = IndexMap::new();
        for keyword in &call_expr.keywords {
            if let Some(arg_name) = &keyword.arg {
                arguments.insert(
                    arg_name.to_string(),
                    ast_expr_to_structured(&keyword.value, source)?,
                );
            }
        }
        function_calls.push(DecodedCall::new(name, arguments));
    }
    Ok(function_calls)
}

/// Decodes Python source of a call list (`"[f(a=1), g(b='x')]"`) or a bare call.
pub fn decode_function_list(function_calls: &str) -> Result<Vec<DecodedCall>, DecodeError> {
    let function_calls_ast = parse_from_string_to_ast(function_calls)?;
    parse_from_ast_to_structured(&function_calls_ast, function_calls)
}

/// Source text of every call in a call list, positional arguments included.
pub fn decode_call_sources(function_calls: &str) -> Result<Vec<String>, DecodeError> {
    let source = function_calls.trim();
    parse_from_string_to_ast(source)?
        .iter()
        .map(|expr| match expr {
            ast::Expr::Call(_) => Ok(source_text(source, expr.range())),
            other => Err(DecodeError::Shape(format!(
                "expected a function call expression, got {}",
                expr_kind(other)
            ))),
        })
        .collect()
}

/// `a.b.c` for attribute chains over a plain name.
pub fn dotted_name(expr: &ast::Expr) -> Option<String> {
    match expr {
        ast::Expr::Name(name_expr) => Some(name_expr.id.to_string()),
        ast::Expr::Attribute(attr) => {
            let base = dotted_name(&attr.value)?;
            Some(format!("{}.{}", base, attr.attr))
        }
        _ => None,
    }
}

/// Converts an argument expression into a JSON value. Bare names become their
/// identifier string so that variable references survive decoding; expressions
/// with no literal meaning are kept as their source text.
pub fn ast_expr_to_structured(expr: &ast::Expr, source: &str) -> Result<Value, DecodeError> {
    match expr {
        ast::Expr::Constant(c) => constant_to_json(&c.value),
        ast::Expr::UnaryOp(u) => {
            let operand = ast_expr_to_structured(&u.operand, source)?;
            match u.op {
                ast::UnaryOp::USub => negate_json_value(&operand),
                ast::UnaryOp::UAdd => Ok(operand),
                ast::UnaryOp::Not => match operand {
                    Value::Bool(b) => Ok(Value::Bool(!b)),
                    _ => Ok(Value::String(source_text(source, u.range))),
                },
                ast::UnaryOp::Invert => Ok(Value::String(source_text(source, u.range))),
            }
        }
        ast::Expr::List(l) => l
            .elts
            .iter()
            .map(|e| ast_expr_to_structured(e, source))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        ast::Expr::Tuple(t) => t
            .elts
            .iter()
            .map(|e| ast_expr_to_structured(e, source))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        ast::Expr::Set(s) => s
            .elts
            .iter()
            .map(|e| ast_expr_to_structured(e, source))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        ast::Expr::Dict(d) => {
            let mut map = Map::new();
            for (key_opt, value) in d.keys.iter().zip(d.values.iter()) {
                let Some(key) = key_opt else {
                    return Err(DecodeError::Shape(
                        "dictionary unpacking is not supported in arguments".to_string(),
                    ));
                };
                let key = match ast_expr_to_structured(key, source)? {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                map.insert(key, ast_expr_to_structured(value, source)?);
            }
            Ok(Value::Object(map))
        }
        ast::Expr::Name(n) => match n.id.as_str() {
            "True" | "true" => Ok(Value::Bool(true)),
            "False" | "false" => Ok(Value::Bool(false)),
            "None" | "null" => Ok(Value::Null),
            other => Ok(Value::String(other.to_string())),
        },
        ast::Expr::Attribute(_) => Ok(Value::String(
            dotted_name(expr).unwrap_or_else(|| source_text(source, expr_range(expr))),
        )),
        other => Ok(Value::String(source_text(source, expr_range(other)))),
    }
}

fn constant_to_json(constant: &ast::Constant) -> Result<Value, DecodeError> {
    match constant {
        ast::Constant::Str(s) => Ok(Value::String(s.to_string())),
        ast::Constant::Int(i) => {
            let digits = i.to_string();
            if let Ok(val) = digits.parse::<i64>() {
                return Ok(Value::Number(Number::from(val)));
            }
            digits
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| DecodeError::Shape(format!("integer out of range: {}", digits)))
        }
        ast::Constant::Float(f) => Number::from_f64(*f)
            .map(Value::Number)
            .ok_or_else(|| DecodeError::Shape(format!("non-finite float: {}", f))),
        ast::Constant::Bool(b) => Ok(Value::Bool(*b)),
        ast::Constant::None => Ok(Value::Null),
        other => Err(DecodeError::Shape(format!(
            "unsupported constant: {:?}",
            other
        ))),
    }
}

pub fn negate_json_value(value: &Value) -> Result<Value, DecodeError> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Value::Number(Number::from(-i)))
            } else if let Some(f) = n.as_f64() {
                Number::from_f64(-f)
                    .map(Value::Number)
                    .ok_or_else(|| DecodeError::Shape("cannot negate value".to_string()))
            } else {
                Err(DecodeError::Shape("cannot negate value".to_string()))
            }
        }
        other => Err(DecodeError::Shape(format!(
            "cannot negate non-numeric value {}",
            other
        ))),
    }
}

fn expr_range(expr: &ast::Expr) -> TextRange {
    expr.range()
}

fn source_text(source: &str, range: TextRange) -> String {
    let start = usize::from(range.start());
    let end = usize::from(range.end());
    source.get(start..end).unwrap_or_default().to_string()
}

fn expr_kind(expr: &ast::Expr) -> &'static str {
    match expr {
        ast::Expr::Call(_) => "call",
        ast::Expr::Name(_) => "name",
        ast::Expr::Attribute(_) => "attribute",
        ast::Expr::Constant(_) => "constant",
        ast::Expr::List(_) => "list",
        ast::Expr::Tuple(_) => "tuple",
        ast::Expr::Dict(_) => "dict",
        ast::Expr::Subscript(_) => "subscript",
        ast::Expr::Lambda(_) => "lambda",
        _ => "expression",
    }
}

/// Python `repr` of a JSON value: single-quoted strings, `True`/`False`/`None`.
pub fn python_repr(value: &Value) -> String {
    match value {
        Value::Null => "None".to_string(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => python_str_repr(s),
        Value::Array(items) => {
            let inner: Vec<String> = items.iter().map(python_repr).collect();
            format!("[{}]", inner.join(", "))
        }
        Value::Object(map) => {
            let inner: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("{}: {}", python_str_repr(k), python_repr(v)))
                .collect();
            format!("{{{}}}", inner.join(", "))
        }
    }
}

pub fn python_str_repr(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_a_call_list_with_dotted_names() {
        let calls =
            decode_function_list("[math.factorial(number=5), geo.area(shape='circle', r=-2.5)]")
                .unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].name, "math.factorial");
        assert_eq!(calls[0].arguments["number"], json!(5));
        assert_eq!(calls[1].arguments["r"], json!(-2.5));
    }

    #[test]
    fn accepts_a_bare_call() {
        let calls = decode_function_list("f(flag=True, items=(1, 2), opts={'a': None})").unwrap();
        assert_eq!(calls[0].arguments["flag"], json!(true));
        assert_eq!(calls[0].arguments["items"], json!([1, 2]));
        assert_eq!(calls[0].arguments["opts"], json!({"a": null}));
    }

    #[test]
    fn bare_names_are_kept_as_variable_references() {
        let calls = decode_function_list("[f(x=some_variable_name)]").unwrap();
        assert_eq!(calls[0].arguments["x"], json!("some_variable_name"));
    }

    #[test]
    fn non_call_output_is_a_shape_error() {
        assert!(matches!(
            decode_function_list("[1, 2]"),
            Err(DecodeError::Shape(_))
        ));
        assert!(matches!(
            decode_function_list("I cannot help with that."),
            Err(DecodeError::Syntax(_))
        ));
    }

    #[test]
    fn renders_python_source() {
        let call = DecodedCall::new(
            "calc",
            IndexMap::from([
                ("name".to_string(), json!("it's")),
                ("values".to_string(), json!([1, 2.5, true, null])),
            ]),
        );
        assert_eq!(
            call.to_python_source(),
            "calc(name=\"it's\", values=[1, 2.5, True, None])"
        );
    }
}

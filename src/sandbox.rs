//! Evaluates model-authored call expressions without a host interpreter.
//! Only literals and calls into a [`ReferenceLibrary`] are reachable.

use std::fmt;

use indexmap::IndexMap;
use ordered_float::OrderedFloat;
use rustpython_parser::{Mode, ast, parse};
use serde_json::{Map, Number, Value};

use crate::{
    error::ExecError,
    parse_ast::{dotted_name, python_str_repr},
    reference_library::ReferenceLibrary,
};

/// Runtime value inside the sandbox. Tuples stay distinct from lists until
/// they are normalized for comparison.
#[derive(Clone, Debug, PartialEq)]
pub enum ExecValue {
    None,
    Bool(bool),
    Int(i64),
    Float(OrderedFloat<f64>),
    Str(String),
    List(Vec<ExecValue>),
    Tuple(Vec<ExecValue>),
    Dict(IndexMap<String, ExecValue>),
}

impl ExecValue {
    pub fn float(f: f64) -> Self {
        ExecValue::Float(OrderedFloat(f))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            ExecValue::None => "NoneType",
            ExecValue::Bool(_) => "bool",
            ExecValue::Int(_) => "int",
            ExecValue::Float(_) => "float",
            ExecValue::Str(_) => "str",
            ExecValue::List(_) => "list",
            ExecValue::Tuple(_) => "tuple",
            ExecValue::Dict(_) => "dict",
        }
    }

    /// Numeric view; booleans are not numbers here.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ExecValue::Int(i) => Some(*i as f64),
            ExecValue::Float(f) => Some(f.0),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ExecValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_items(&self) -> Option<&[ExecValue]> {
        match self {
            ExecValue::List(items) | ExecValue::Tuple(items) => Some(items),
            _ => None,
        }
    }

    /// Replaces tuples with lists at every depth, matching what a JSON round trip does.
    pub fn normalize_tuples(self) -> Self {
        match self {
            ExecValue::Tuple(items) | ExecValue::List(items) => {
                ExecValue::List(items.into_iter().map(ExecValue::normalize_tuples).collect())
            }
            ExecValue::Dict(map) => ExecValue::Dict(
                map.into_iter()
                    .map(|(k, v)| (k, v.normalize_tuples()))
                    .collect(),
            ),
            other => other,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            ExecValue::None => Value::Null,
            ExecValue::Bool(b) => Value::Bool(*b),
            ExecValue::Int(i) => Value::Number(Number::from(*i)),
            // NaN and infinities have no JSON form.
            ExecValue::Float(f) => Number::from_f64(f.0)
                .map(Value::Number)
                .unwrap_or_else(|| Value::String(f.0.to_string())),
            ExecValue::Str(s) => Value::String(s.clone()),
            ExecValue::List(items) | ExecValue::Tuple(items) => {
                Value::Array(items.iter().map(ExecValue::to_json).collect())
            }
            ExecValue::Dict(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect::<Map<_, _>>(),
            ),
        }
    }

    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => ExecValue::None,
            Value::Bool(b) => ExecValue::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) if !n.is_f64() => ExecValue::Int(i),
                _ => ExecValue::float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => ExecValue::Str(s.clone()),
            Value::Array(items) => ExecValue::List(items.iter().map(ExecValue::from_json).collect()),
            Value::Object(map) => ExecValue::Dict(
                map.iter()
                    .map(|(k, v)| (k.clone(), ExecValue::from_json(v)))
                    .collect(),
            ),
        }
    }
}

/// Python `repr` of the value.
impl fmt::Display for ExecValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join(f: &mut fmt::Formatter<'_>, items: &[ExecValue]) -> fmt::Result {
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{}", item)?;
            }
            Ok(())
        }
        match self {
            ExecValue::None => f.write_str("None"),
            ExecValue::Bool(true) => f.write_str("True"),
            ExecValue::Bool(false) => f.write_str("False"),
            ExecValue::Int(i) => write!(f, "{}", i),
            ExecValue::Float(x) if x.0.fract() == 0.0 && x.0.is_finite() => write!(f, "{:.1}", x.0),
            ExecValue::Float(x) => write!(f, "{}", x.0),
            ExecValue::Str(s) => f.write_str(&python_str_repr(s)),
            ExecValue::List(items) => {
                f.write_str("[")?;
                join(f, items)?;
                f.write_str("]")
            }
            ExecValue::Tuple(items) => {
                f.write_str("(")?;
                join(f, items)?;
                if items.len() == 1 {
                    f.write_str(",")?;
                }
                f.write_str(")")
            }
            ExecValue::Dict(map) => {
                f.write_str("{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", python_str_repr(k), v)?;
                }
                f.write_str("}")
            }
        }
    }
}

/// Evaluates call expressions against one reference library.
pub struct Sandbox<'a> {
    library: &'a dyn ReferenceLibrary,
}

impl<'a> Sandbox<'a> {
    pub fn new(library: &'a dyn ReferenceLibrary) -> Self {
        Self { library }
    }

    pub fn evaluate(&self, expression: &str) -> Result<ExecValue, ExecError> {
        let body = parse_expression(expression)?;
        self.eval_expr(&body)
    }

    fn eval_expr(&self, expr: &ast::Expr) -> Result<ExecValue, ExecError> {
        match expr {
            ast::Expr::Call(call) => {
                let name = dotted_name(&call.func).ok_or_else(|| {
                    ExecError::Unsupported("call target is not a plain function name".to_string())
                })?;
                if !self.library.contains(&name) {
                    return Err(ExecError::UnknownFunction(name));
                }
                let args = call
                    .args
                    .iter()
                    .map(|arg| self.eval_expr(arg))
                    .collect::<Result<Vec<_>, _>>()?;
                let mut kwargs = IndexMap::new();
                for keyword in &call.keywords {
                    let Some(arg_name) = &keyword.arg else {
                        return Err(ExecError::Unsupported("**kwargs unpacking".to_string()));
                    };
                    kwargs.insert(arg_name.to_string(), self.eval_expr(&keyword.value)?);
                }
                self.library.call(&name, &args, &kwargs)
            }
            other => eval_literal(other, &|inner| self.eval_expr(inner)),
        }
    }
}

fn parse_expression(expression: &str) -> Result<ast::Expr, ExecError> {
    let parsed = parse(expression.trim(), Mode::Expression, "<call>")
        .map_err(|e| ExecError::Syntax(e.to_string()))?;
    let ast::Mod::Expression(expr) = parsed else {
        return Err(ExecError::Syntax("expected an expression".to_string()));
    };
    Ok(*expr.body)
}

/// Literal evaluation shared by the call evaluator and the request parser.
/// `recurse` evaluates nested sub-expressions.
fn eval_literal(
    expr: &ast::Expr,
    recurse: &dyn Fn(&ast::Expr) -> Result<ExecValue, ExecError>,
) -> Result<ExecValue, ExecError> {
    match expr {
        ast::Expr::Constant(c) => match &c.value {
            ast::Constant::None => Ok(ExecValue::None),
            ast::Constant::Bool(b) => Ok(ExecValue::Bool(*b)),
            ast::Constant::Str(s) => Ok(ExecValue::Str(s.to_string())),
            ast::Constant::Int(i) => i
                .to_string()
                .parse::<i64>()
                .map(ExecValue::Int)
                .map_err(|_| ExecError::Runtime(format!("integer {} does not fit in 64 bits", i))),
            ast::Constant::Float(f) => Ok(ExecValue::float(*f)),
            other => Err(ExecError::Unsupported(format!("constant {:?}", other))),
        },
        ast::Expr::UnaryOp(u) => {
            let operand = recurse(&u.operand)?;
            match (&u.op, operand) {
                (ast::UnaryOp::USub, ExecValue::Int(i)) => i
                    .checked_neg()
                    .map(ExecValue::Int)
                    .ok_or_else(|| ExecError::Runtime("integer overflow".to_string())),
                (ast::UnaryOp::USub, ExecValue::Float(f)) => Ok(ExecValue::float(-f.0)),
                (ast::UnaryOp::UAdd, v @ (ExecValue::Int(_) | ExecValue::Float(_))) => Ok(v),
                (ast::UnaryOp::Not, ExecValue::Bool(b)) => Ok(ExecValue::Bool(!b)),
                (op, v) => Err(ExecError::Runtime(format!(
                    "bad operand type for unary {:?}: '{}'",
                    op,
                    v.type_name()
                ))),
            }
        }
        ast::Expr::List(l) => l.elts.iter().map(recurse).collect::<Result<Vec<_>, _>>().map(ExecValue::List),
        ast::Expr::Set(s) => s.elts.iter().map(recurse).collect::<Result<Vec<_>, _>>().map(ExecValue::List),
        ast::Expr::Tuple(t) => t.elts.iter().map(recurse).collect::<Result<Vec<_>, _>>().map(ExecValue::Tuple),
        ast::Expr::Dict(d) => {
            let mut map = IndexMap::new();
            for (key, value) in d.keys.iter().zip(&d.values) {
                let Some(key) = key else {
                    return Err(ExecError::Unsupported("dict unpacking".to_string()));
                };
                let key = match recurse(key)? {
                    ExecValue::Str(s) => s,
                    other => other.to_string(),
                };
                map.insert(key, recurse(value)?);
            }
            Ok(ExecValue::Dict(map))
        }
        ast::Expr::Name(n) => match n.id.as_str() {
            "True" => Ok(ExecValue::Bool(true)),
            "False" => Ok(ExecValue::Bool(false)),
            "None" => Ok(ExecValue::None),
            other => Err(ExecError::UnknownFunction(other.to_string())),
        },
        ast::Expr::Call(_) => Err(ExecError::Unsupported("nested call".to_string())),
        _ => Err(ExecError::Unsupported(
            "only literals and reference-library calls can be evaluated".to_string(),
        )),
    }
}

/// A `requests.get(...)` call expression restated as data.
#[derive(Clone, Debug, PartialEq)]
pub struct RestRequest {
    pub url: String,
    pub params: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub timeout_secs: Option<f64>,
}

impl RestRequest {
    /// Parses `requests.get(url, params=..., headers=..., timeout=...)`;
    /// the `requests_get` spelling used by function-calling models is accepted too.
    pub fn parse(expression: &str) -> Result<Self, ExecError> {
        let expression = expression.replace("requests_get", "requests.get");
        let body = parse_expression(&expression)?;
        let ast::Expr::Call(call) = &body else {
            return Err(ExecError::Unsupported("expected a requests.get call".to_string()));
        };
        let name = dotted_name(&call.func).unwrap_or_default();
        if name != "requests.get" {
            return Err(ExecError::UnknownFunction(name));
        }

        fn literal(expr: &ast::Expr) -> Result<ExecValue, ExecError> {
            eval_literal(expr, &literal)
        }

        let mut url = match call.args.first() {
            Some(arg) => Some(literal(arg)?),
            None => None,
        };
        let mut request = RestRequest {
            url: String::new(),
            params: Vec::new(),
            headers: Vec::new(),
            timeout_secs: None,
        };
        for keyword in &call.keywords {
            let Some(arg_name) = &keyword.arg else {
                return Err(ExecError::Unsupported("**kwargs unpacking".to_string()));
            };
            let value = literal(&keyword.value)?;
            match arg_name.as_str() {
                "url" => url = Some(value),
                "params" => request.params = string_pairs("params", value)?,
                "headers" => request.headers = string_pairs("headers", value)?,
                "timeout" => request.timeout_secs = value.as_f64(),
                _ => {}
            }
        }
        request.url = match url {
            Some(ExecValue::Str(url)) => url,
            Some(other) => {
                return Err(ExecError::bad_args(
                    "requests.get",
                    format!("url must be a string, got {}", other.type_name()),
                ));
            }
            None => return Err(ExecError::bad_args("requests.get", "missing url")),
        };
        Ok(request)
    }
}

fn string_pairs(field: &str, value: ExecValue) -> Result<Vec<(String, String)>, ExecError> {
    match value {
        ExecValue::Dict(map) => Ok(map
            .into_iter()
            .filter(|(_, v)| *v != ExecValue::None)
            .map(|(k, v)| {
                let v = match v {
                    ExecValue::Str(s) => s,
                    ExecValue::Bool(b) => if b { "True" } else { "False" }.to_string(),
                    other => other.to_string(),
                };
                (k, v)
            })
            .collect()),
        ExecValue::None => Ok(Vec::new()),
        other => Err(ExecError::bad_args(
            "requests.get",
            format!("{} must be a dict, got {}", field, other.type_name()),
        )),
    }
}

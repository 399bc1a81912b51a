use std::time::Duration;

use indexmap::IndexMap;
use serde_json::Value;
use tracing::debug;

use crate::{error::ExecError, sandbox::ExecValue};

/// The only functions a call expression can reach.
pub trait ReferenceLibrary {
    fn contains(&self, name: &str) -> bool;

    fn call(
        &self,
        name: &str,
        args: &[ExecValue],
        kwargs: &IndexMap<String, ExecValue>,
    ) -> Result<ExecValue, ExecError>;
}

pub const GEOCODE_API_KEY: &str = "GEOCODE_API_KEY";

/// API keys the reference functions may need. Read from the process environment.
#[derive(Clone, Debug, Default)]
pub struct Credentials {
    pub geocode_api_key: Option<String>,
}

impl Credentials {
    pub fn from_env() -> Self {
        Self {
            geocode_api_key: std::env::var(GEOCODE_API_KEY).ok().filter(|k| !k.is_empty()),
        }
    }
}

/// Positional and keyword arguments bound to a fixed parameter list, Python style.
struct Bound<'a> {
    function: &'a str,
    values: Vec<Option<&'a ExecValue>>,
    names: &'a [&'a str],
}

impl<'a> Bound<'a> {
    fn new(
        function: &'a str,
        names: &'a [&'a str],
        args: &'a [ExecValue],
        kwargs: &'a IndexMap<String, ExecValue>,
    ) -> Result<Self, ExecError> {
        if args.len() > names.len() {
            return Err(ExecError::bad_args(
                function,
                format!(
                    "takes {} positional arguments but {} were given",
                    names.len(),
                    args.len()
                ),
            ));
        }
        let mut values: Vec<Option<&ExecValue>> = vec![None; names.len()];
        for (slot, arg) in values.iter_mut().zip(args) {
            *slot = Some(arg);
        }
        for (key, value) in kwargs {
            let Some(pos) = names.iter().position(|n| n == key) else {
                return Err(ExecError::bad_args(
                    function,
                    format!("got an unexpected keyword argument '{}'", key),
                ));
            };
            if values[pos].is_some() {
                return Err(ExecError::bad_args(
                    function,
                    format!("got multiple values for argument '{}'", key),
                ));
            }
            values[pos] = Some(value);
        }
        Ok(Self {
            function,
            values,
            names,
        })
    }

    fn optional(&self, index: usize) -> Option<&'a ExecValue> {
        self.values.get(index).copied().flatten()
    }

    fn required(&self, index: usize) -> Result<&'a ExecValue, ExecError> {
        self.optional(index).ok_or_else(|| {
            ExecError::bad_args(
                self.function,
                format!("missing required argument: '{}'", self.names[index]),
            )
        })
    }

    fn number(&self, index: usize) -> Result<f64, ExecError> {
        let value = self.required(index)?;
        value.as_f64().ok_or_else(|| self.type_error(index, "a number", value))
    }

    fn int(&self, index: usize) -> Result<i64, ExecError> {
        match self.required(index)? {
            ExecValue::Int(i) => Ok(*i),
            other => Err(self.type_error(index, "an integer", other)),
        }
    }

    fn string(&self, index: usize) -> Result<&'a str, ExecError> {
        let value = self.required(index)?;
        value.as_str().ok_or_else(|| self.type_error(index, "a string", value))
    }

    fn numbers(&self, index: usize) -> Result<Vec<f64>, ExecError> {
        let value = self.required(index)?;
        let items = value
            .as_items()
            .ok_or_else(|| self.type_error(index, "a list of numbers", value))?;
        items
            .iter()
            .map(|item| {
                item.as_f64()
                    .ok_or_else(|| self.type_error(index, "a list of numbers", value))
            })
            .collect()
    }

    fn flag(&self, index: usize, default: bool) -> Result<bool, ExecError> {
        match self.optional(index) {
            None => Ok(default),
            Some(ExecValue::Bool(b)) => Ok(*b),
            Some(other) => Err(self.type_error(index, "a boolean", other)),
        }
    }

    fn type_error(&self, index: usize, expected: &str, got: &ExecValue) -> ExecError {
        ExecError::bad_args(
            self.function,
            format!(
                "'{}' must be {}, got {}",
                self.names[index],
                expected,
                got.type_name()
            ),
        )
    }
}

const FUNCTIONS: &[&str] = &[
    "calculate_triangle_area",
    "calc_binomial_probability",
    "calculate_cosine_similarity",
    "calculate_density",
    "calculate_final_velocity",
    "calculate_mean",
    "calculate_standard_deviation",
    "get_coordinates_from_city",
    "get_fibonacci_sequence",
    "get_prime_factors",
    "math_factorial",
    "math_gcd",
    "math_lcm",
    "quadratic_roots",
    "sort_array",
];

/// Deterministic math and list helpers plus one credential-gated geocoding lookup.
pub struct StandardLibrary {
    credentials: Credentials,
    geocode_base_url: String,
    http_timeout: Duration,
}

impl StandardLibrary {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            geocode_base_url: "https://geocode.maps.co".to_string(),
            http_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_geocode_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.geocode_base_url = base_url.into();
        self
    }

    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    fn get_coordinates_from_city(&self, city_name: &str) -> Result<ExecValue, ExecError> {
        let api_key = self
            .credentials
            .geocode_api_key
            .as_deref()
            .ok_or_else(|| ExecError::MissingCredential(GEOCODE_API_KEY.to_string()))?;
        let client = reqwest::blocking::Client::builder()
            .timeout(self.http_timeout)
            .build()?;
        let url = format!("{}/search", self.geocode_base_url.trim_end_matches('/'));
        debug!(%url, city_name, "geocoding city");
        let response = client
            .get(&url)
            .query(&[("q", city_name), ("api_key", api_key)])
            .send()?;
        let places: Value = response.json()?;
        let first = places
            .as_array()
            .and_then(|places| places.first())
            .ok_or_else(|| ExecError::Runtime(format!("no coordinates found for {}", city_name)))?;
        let coordinate = |key: &str| -> Result<ExecValue, ExecError> {
            first
                .get(key)
                .and_then(|v| match v {
                    Value::String(s) => s.parse::<f64>().ok(),
                    other => other.as_f64(),
                })
                .map(ExecValue::float)
                .ok_or_else(|| ExecError::Runtime(format!("geocoding response has no {}", key)))
        };
        Ok(ExecValue::Tuple(vec![coordinate("lat")?, coordinate("lon")?]))
    }
}

impl ReferenceLibrary for StandardLibrary {
    fn contains(&self, name: &str) -> bool {
        FUNCTIONS.contains(&name)
    }

    fn call(
        &self,
        name: &str,
        args: &[ExecValue],
        kwargs: &IndexMap<String, ExecValue>,
    ) -> Result<ExecValue, ExecError> {
        match name {
            "calculate_triangle_area" => {
                let a = Bound::new(name, &["base", "height"], args, kwargs)?;
                Ok(ExecValue::float(a.number(0)? * a.number(1)? / 2.0))
            }
            "calc_binomial_probability" => {
                let a = Bound::new(name, &["n", "k", "p"], args, kwargs)?;
                let (n, k, p) = (a.int(0)?, a.int(1)?, a.number(2)?);
                if k < 0 || n < k {
                    return Ok(ExecValue::float(0.0));
                }
                let combinations = binomial(n as u64, k as u64);
                Ok(ExecValue::float(
                    combinations * p.powi(k as i32) * (1.0 - p).powi((n - k) as i32),
                ))
            }
            "calculate_cosine_similarity" => {
                let a = Bound::new(name, &["vectorA", "vectorB"], args, kwargs)?;
                let (x, y) = (a.numbers(0)?, a.numbers(1)?);
                if x.len() != y.len() {
                    return Err(ExecError::Runtime("vectors must have the same length".to_string()));
                }
                let dot: f64 = x.iter().zip(&y).map(|(a, b)| a * b).sum();
                let norm = |v: &[f64]| v.iter().map(|a| a * a).sum::<f64>().sqrt();
                let denominator = norm(&x) * norm(&y);
                if denominator == 0.0 {
                    return Err(ExecError::Runtime("float division by zero".to_string()));
                }
                Ok(ExecValue::float(dot / denominator))
            }
            "calculate_density" => {
                let a = Bound::new(name, &["mass", "volume"], args, kwargs)?;
                let volume = a.number(1)?;
                if volume == 0.0 {
                    return Err(ExecError::Runtime("float division by zero".to_string()));
                }
                Ok(ExecValue::float(a.number(0)? / volume))
            }
            "calculate_final_velocity" => {
                let a = Bound::new(name, &["initial_velocity", "acceleration", "time"], args, kwargs)?;
                Ok(ExecValue::float(a.number(0)? + a.number(1)? * a.number(2)?))
            }
            "calculate_mean" => {
                let a = Bound::new(name, &["numbers"], args, kwargs)?;
                let numbers = a.numbers(0)?;
                if numbers.is_empty() {
                    return Err(ExecError::Runtime("division by zero".to_string()));
                }
                Ok(ExecValue::float(mean(&numbers)))
            }
            "calculate_standard_deviation" => {
                let a = Bound::new(name, &["numbers"], args, kwargs)?;
                let numbers = a.numbers(0)?;
                if numbers.is_empty() {
                    return Err(ExecError::Runtime("division by zero".to_string()));
                }
                let m = mean(&numbers);
                let variance =
                    numbers.iter().map(|x| (x - m).powi(2)).sum::<f64>() / numbers.len() as f64;
                Ok(ExecValue::float(variance.sqrt()))
            }
            "get_coordinates_from_city" => {
                let a = Bound::new(name, &["city_name"], args, kwargs)?;
                self.get_coordinates_from_city(a.string(0)?)
            }
            "get_fibonacci_sequence" => {
                let a = Bound::new(name, &["n"], args, kwargs)?;
                let n = a.int(0)?;
                let mut sequence = Vec::new();
                let (mut x, mut y) = (0i64, 1i64);
                for _ in 0..n.max(0) {
                    sequence.push(ExecValue::Int(x));
                    let next = x
                        .checked_add(y)
                        .ok_or_else(|| ExecError::Runtime("integer overflow".to_string()))?;
                    x = y;
                    y = next;
                }
                Ok(ExecValue::List(sequence))
            }
            "get_prime_factors" => {
                let a = Bound::new(name, &["number"], args, kwargs)?;
                Ok(ExecValue::List(
                    prime_factors(a.int(0)?).into_iter().map(ExecValue::Int).collect(),
                ))
            }
            "math_factorial" => {
                let a = Bound::new(name, &["n"], args, kwargs)?;
                let n = a.int(0)?;
                if n < 0 {
                    return Err(ExecError::Runtime(
                        "factorial() not defined for negative values".to_string(),
                    ));
                }
                (1..=n)
                    .try_fold(1i64, |acc, i| acc.checked_mul(i))
                    .map(ExecValue::Int)
                    .ok_or_else(|| ExecError::Runtime("integer overflow".to_string()))
            }
            "math_gcd" => {
                let a = Bound::new(name, &["a", "b"], args, kwargs)?;
                Ok(ExecValue::Int(gcd(a.int(0)?, a.int(1)?)))
            }
            "math_lcm" => {
                let a = Bound::new(name, &["a", "b"], args, kwargs)?;
                let (x, y) = (a.int(0)?, a.int(1)?);
                if x == 0 || y == 0 {
                    return Ok(ExecValue::Int(0));
                }
                (x / gcd(x, y))
                    .checked_mul(y)
                    .map(|l| ExecValue::Int(l.abs()))
                    .ok_or_else(|| ExecError::Runtime("integer overflow".to_string()))
            }
            "quadratic_roots" => {
                let a = Bound::new(name, &["a", "b", "c"], args, kwargs)?;
                let (qa, qb, qc) = (a.number(0)?, a.number(1)?, a.number(2)?);
                if qa == 0.0 {
                    return Err(ExecError::Runtime("float division by zero".to_string()));
                }
                let discriminant = qb * qb - 4.0 * qa * qc;
                if discriminant < 0.0 {
                    return Err(ExecError::Runtime("math domain error".to_string()));
                }
                let root = discriminant.sqrt();
                Ok(ExecValue::Tuple(vec![
                    ExecValue::float((-qb + root) / (2.0 * qa)),
                    ExecValue::float((-qb - root) / (2.0 * qa)),
                ]))
            }
            "sort_array" => {
                let a = Bound::new(name, &["array", "reverse"], args, kwargs)?;
                let value = a.required(0)?;
                let mut items = value
                    .as_items()
                    .ok_or_else(|| a.type_error(0, "a list", value))?
                    .to_vec();
                if items.iter().any(|item| item.as_f64().is_none()) {
                    return Err(ExecError::Runtime(
                        "'<' not supported between non-numeric instances".to_string(),
                    ));
                }
                items.sort_by(|x, y| {
                    let (x, y) = (x.as_f64().unwrap_or_default(), y.as_f64().unwrap_or_default());
                    x.total_cmp(&y)
                });
                if a.flag(1, false)? {
                    items.reverse();
                }
                Ok(ExecValue::List(items))
            }
            other => Err(ExecError::UnknownFunction(other.to_string())),
        }
    }
}

fn mean(numbers: &[f64]) -> f64 {
    numbers.iter().sum::<f64>() / numbers.len() as f64
}

fn binomial(n: u64, k: u64) -> f64 {
    let k = k.min(n - k);
    (0..k).fold(1.0, |acc, i| acc * (n - i) as f64 / (i + 1) as f64)
}

fn gcd(a: i64, b: i64) -> i64 {
    let (mut a, mut b) = (a.abs(), b.abs());
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

fn prime_factors(mut n: i64) -> Vec<i64> {
    let mut factors = Vec::new();
    let mut divisor = 2;
    while n >= 2 && divisor <= n / divisor {
        while n % divisor == 0 {
            factors.push(divisor);
            n /= divisor;
        }
        divisor += 1;
    }
    if n >= 2 {
        factors.push(n);
    }
    factors
}

use std::{path::PathBuf, str::FromStr, time::Duration};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    error::{CheckerError, Result},
    paths::{DATA_DIR, RESULT_DIR, REST_GROUND_TRUTH_PATH, SCORE_DIR},
};

/// Function-calling model names whose APIs reject `.` in function names.
/// Names are written with `/` where the model identifier uses `_`.
const DEFAULT_UNDERSCORE_TO_DOT_MODELS: &[&str] = &[
    "gpt-4o-2024-05-13-FC",
    "gpt-4-turbo-2024-04-09-FC",
    "gpt-4-1106-preview-FC",
    "gpt-4-0125-preview-FC",
    "gpt-4-0613-FC",
    "gpt-3.5-turbo-0125-FC",
    "claude-3-opus-20240229-FC",
    "claude-3-sonnet-20240229-FC",
    "claude-3-haiku-20240307-FC",
    "mistral-large-2402-FC",
    "mistral-large-2402-FC-Any",
    "mistral-large-2402-FC-Auto",
    "mistral-small-2402-FC-Any",
    "mistral-small-2402-FC-Auto",
    "gemini-1.0-pro",
    "gemini-1.5-pro-preview-0409",
    "meetkai/functionary-small-v2.2-FC",
    "meetkai/functionary-medium-v2.2-FC",
    "meetkai/functionary-small-v2.4-FC",
    "meetkai/functionary-medium-v2.4-FC",
    "NousResearch/Hermes-2-Pro-Mistral-7B",
    "command-r-plus-FC",
    "command-r-plus-FC-optimized",
    "ernie-bot-4-FC",
];

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct CheckerConfig {
    /// Relative band allowed around the expected value in real-time comparisons.
    pub real_time_tolerance: f64,
    /// Sleep before requests to the rate-limited geocoding endpoint.
    pub geocode_delay_ms: u64,
    pub rest_timeout_secs: u64,
    pub rest_ground_truth_path: PathBuf,
    pub data_dir: PathBuf,
    pub result_dir: PathBuf,
    pub score_output_dir: PathBuf,
    pub underscore_to_dot_models: Vec<String>,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            real_time_tolerance: 0.05,
            geocode_delay_ms: 2000,
            rest_timeout_secs: 30,
            rest_ground_truth_path: REST_GROUND_TRUTH_PATH.clone(),
            data_dir: DATA_DIR.clone(),
            result_dir: RESULT_DIR.clone(),
            score_output_dir: SCORE_DIR.clone(),
            underscore_to_dot_models: DEFAULT_UNDERSCORE_TO_DOT_MODELS
                .iter()
                .map(|m| m.to_string())
                .collect(),
        }
    }
}

impl CheckerConfig {
    /// Defaults, then a `.env` file if present, then `BFCL_*` environment variables.
    pub fn from_env() -> Result<Self> {
        match dotenvy::dotenv() {
            Ok(path) => debug!(path = %path.display(), "loaded environment file"),
            Err(e) if e.not_found() => {}
            Err(e) => return Err(CheckerError::Config(format!("cannot load .env: {}", e))),
        }
        let mut config = Self::default();
        if let Some(v) = env_parse("BFCL_REAL_TIME_TOLERANCE")? {
            config.real_time_tolerance = v;
        }
        if let Some(v) = env_parse("BFCL_GEOCODE_DELAY_MS")? {
            config.geocode_delay_ms = v;
        }
        if let Some(v) = env_parse("BFCL_REST_TIMEOUT_SECS")? {
            config.rest_timeout_secs = v;
        }
        if let Some(v) = env_parse("BFCL_REST_GROUND_TRUTH")? {
            config.rest_ground_truth_path = v;
        }
        if let Some(v) = env_parse("BFCL_DATA_DIR")? {
            config.data_dir = v;
        }
        if let Some(v) = env_parse("BFCL_RESULT_DIR")? {
            config.result_dir = v;
        }
        if let Some(v) = env_parse("BFCL_SCORE_DIR")? {
            config.score_output_dir = v;
        }
        if let Ok(models) = std::env::var("BFCL_UNDERSCORE_TO_DOT_MODELS") {
            config.underscore_to_dot_models = models
                .split(',')
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(str::to_string)
                .collect();
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..1.0).contains(&self.real_time_tolerance) {
            return Err(CheckerError::Config(format!(
                "real_time_tolerance must be in [0, 1), got {}",
                self.real_time_tolerance
            )));
        }
        Ok(())
    }

    pub fn geocode_delay(&self) -> Duration {
        Duration::from_millis(self.geocode_delay_ms)
    }

    pub fn rest_timeout(&self) -> Duration {
        Duration::from_secs(self.rest_timeout_secs)
    }

    /// Model identifiers use `_` where the published name has `/`.
    pub fn model_forbids_dots(&self, model_name: &str) -> bool {
        let escaped = model_name.replace('_', "/");
        self.underscore_to_dot_models.iter().any(|m| *m == escaped)
    }
}

fn env_parse<T: FromStr>(key: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| CheckerError::Config(format!("{}={}: {}", key, raw, e))),
        Err(_) => Ok(None),
    }
}

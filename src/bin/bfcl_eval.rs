use std::{path::PathBuf, process::ExitCode};

use bfcl_eval::{
    config::CheckerConfig,
    error::Result,
    eval_runner::{EvalRunner, TestCategory},
    reference_library::{Credentials, StandardLibrary},
    rest_checker::RestGroundTruth,
};
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[clap(
    name = "bfcl-eval",
    version,
    about = "Scores a model's function-call results against the recorded answers"
)]
struct Cli {
    /// Model whose result files are scored, as named in the result directory.
    #[clap(long)]
    model: String,

    /// Categories to score; every category when omitted.
    #[clap(long, value_delimiter = ',')]
    categories: Vec<TestCategory>,

    /// Match multi-call answers positionally instead of in any order.
    #[clap(long)]
    enforce_order: bool,

    #[clap(long)]
    data_dir: Option<PathBuf>,

    #[clap(long)]
    result_dir: Option<PathBuf>,

    #[clap(long)]
    score_dir: Option<PathBuf>,
}

fn run(cli: Cli) -> Result<()> {
    let mut config = CheckerConfig::from_env()?;
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    if let Some(dir) = cli.result_dir {
        config.result_dir = dir;
    }
    if let Some(dir) = cli.score_dir {
        config.score_output_dir = dir;
    }
    let categories = if cli.categories.is_empty() {
        TestCategory::ALL.to_vec()
    } else {
        cli.categories
    };

    let library = StandardLibrary::new(Credentials::from_env()).with_http_timeout(config.rest_timeout());
    let rest_ground_truth = if categories.iter().any(TestCategory::is_rest) {
        Some(RestGroundTruth::load(&config.rest_ground_truth_path)?)
    } else {
        None
    };

    let mut runner = EvalRunner::new(cli.model, &config, &library).with_enforced_order(cli.enforce_order);
    if let Some(ground_truth) = &rest_ground_truth {
        runner = runner.with_rest_ground_truth(ground_truth);
    }
    for (category, summary) in runner.evaluate_all(&categories)? {
        println!(
            "Model: {} | Category: {} | Accuracy: {:.4} ({}/{})",
            runner.model_name(),
            category,
            summary.accuracy,
            summary.correct_count,
            summary.total_count
        );
    }
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "evaluation aborted");
            ExitCode::FAILURE
        }
    }
}

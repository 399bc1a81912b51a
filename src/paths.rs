use std::{
    path::{Path, PathBuf},
    sync::LazyLock,
};

pub static DATA_DIR: LazyLock<PathBuf> = LazyLock::new(|| PathBuf::from("data"));

pub static RESULT_DIR: LazyLock<PathBuf> = LazyLock::new(|| PathBuf::from("result"));

pub static SCORE_DIR: LazyLock<PathBuf> = LazyLock::new(|| PathBuf::from("score"));

pub static REST_GROUND_TRUTH_PATH: LazyLock<PathBuf> =
    LazyLock::new(|| PathBuf::from("eval_checker/rest-eval-response_v5.jsonl"));

/// `<data_dir>/gorilla_openfunctions_v1_test_<category>.json`
pub fn prompt_file(data_dir: &Path, category: &str) -> PathBuf {
    data_dir.join(format!("gorilla_openfunctions_v1_test_{}.json", category))
}

/// `<data_dir>/possible_answer/gorilla_openfunctions_v1_test_<category>.json`
pub fn possible_answer_file(data_dir: &Path, category: &str) -> PathBuf {
    data_dir
        .join("possible_answer")
        .join(format!("gorilla_openfunctions_v1_test_{}.json", category))
}

/// `<result_dir>/<model>/gorilla_openfunctions_v1_test_<category>_result.json`
pub fn model_result_file(result_dir: &Path, model_name: &str, category: &str) -> PathBuf {
    result_dir
        .join(model_name)
        .join(format!("gorilla_openfunctions_v1_test_{}_result.json", category))
}

/// `<score_dir>/<model>/<category>_score.json`
pub fn score_file(score_dir: &Path, model_name: &str, category: &str) -> PathBuf {
    score_dir
        .join(model_name)
        .join(format!("{}_score.json", category))
}

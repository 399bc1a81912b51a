use std::{
    fs::{File, create_dir_all},
    io::{BufRead, BufReader, BufWriter, Write},
    path::Path,
};

use serde::Serialize;

use crate::error::{CheckerError, Result};

fn io_error(path: &Path, source: std::io::Error) -> CheckerError {
    CheckerError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Reads one JSON document per line. Blank lines are skipped.
pub fn load_json_lines(file_path: impl AsRef<Path>) -> Result<Vec<serde_json::Value>> {
    let path = file_path.as_ref();
    let file = File::open(path).map_err(|e| io_error(path, e))?;
    let reader = BufReader::new(file);

    let mut results = Vec::new();
    for line in reader.lines() {
        let line = line.map_err(|e| io_error(path, e))?;
        if line.trim().is_empty() {
            continue;
        }
        results.push(serde_json::from_str(&line)?);
    }
    Ok(results)
}

pub fn write_json_lines_to_file<T: Serialize>(
    file_path: impl AsRef<Path>,
    results: &[T],
) -> Result<()> {
    let path = file_path.as_ref();
    if let Some(parent) = path.parent() {
        create_dir_all(parent).map_err(|e| io_error(parent, e))?;
    }

    let file = File::create(path).map_err(|e| io_error(path, e))?;
    let mut writer = BufWriter::new(file);
    for result in results {
        let line = serde_json::to_string(result)?;
        writeln!(writer, "{}", line).map_err(|e| io_error(path, e))?;
    }
    writer.flush().map_err(|e| io_error(path, e))?;

    Ok(())
}

//! JSON and JSONL file helpers.
//!
//! Writers go through a `BufWriter` that is flushed explicitly so write errors surface as
//! `ReconError::Io` instead of being lost on drop.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{ReconError, Result};
use crate::types::Example;

/// Read one JSON value per non-empty line.
pub fn read_jsonl<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<Vec<T>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| ReconError::io(path, e))?;
    let reader = BufReader::new(file);

    let mut items = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| ReconError::io(path, e))?;
        if line.trim().is_empty() {
            continue;
        }
        let item = serde_json::from_str(&line).map_err(|e| ReconError::Parse {
            path: path.to_path_buf(),
            line: idx + 1,
            message: e.to_string(),
        })?;
        items.push(item);
    }

    Ok(items)
}

/// Write one compact JSON value per line, creating parent directories as needed.
pub fn write_jsonl<'a, T, I>(path: impl AsRef<Path>, items: I) -> Result<()>
where
    T: Serialize + 'a,
    I: IntoIterator<Item = &'a T>,
{
    let path = path.as_ref();
    let mut writer = create_writer(path)?;

    for item in items {
        serde_json::to_writer(&mut writer, item)?;
        writer
            .write_all(b"\n")
            .map_err(|e| ReconError::io(path, e))?;
    }

    writer.flush().map_err(|e| ReconError::io(path, e))
}

pub fn read_json<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| ReconError::io(path, e))?;
    serde_json::from_reader(BufReader::new(file)).map_err(|e| {
        ReconError::Persistence(format!("Failed to parse '{}': {}", path.display(), e))
    })
}

pub fn write_json_pretty<T: Serialize>(path: impl AsRef<Path>, value: &T) -> Result<()> {
    let path = path.as_ref();
    let mut writer = create_writer(path)?;
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.flush().map_err(|e| ReconError::io(path, e))
}

/// Read examples from a JSONL file and normalize them with [`Example::format`].
pub fn read_examples(path: impl AsRef<Path>) -> Result<Vec<Example>> {
    let mut examples: Vec<Example> = read_jsonl(path)?;
    for example in &mut examples {
        example.format();
    }
    Ok(examples)
}

pub(crate) fn create_writer(path: &Path) -> Result<BufWriter<File>> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| ReconError::io(parent, e))?;
        }
    }
    let file = File::create(path).map_err(|e| ReconError::io(path, e))?;
    Ok(BufWriter::new(file))
}

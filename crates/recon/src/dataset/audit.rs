//! Flat CSV export of the operation history.

use std::path::Path;

use serde::Serialize;
use tracing::debug;

use super::Dataset;
use crate::error::{ReconError, Result};
use crate::hashing::ExampleHash;
use crate::io;

#[derive(Serialize)]
struct HistoryRow<'a> {
    operation: &'a str,
    status: &'static str,
    ts: i64,
    #[serde(rename = "type")]
    kind: &'static str,
    prev_example: Option<ExampleHash>,
    example: Option<ExampleHash>,
}

impl Dataset {
    /// Write one CSV row per recorded transformation.
    ///
    /// Columns are `operation,status,ts,type,prev_example,example`. An operation that recorded no
    /// transformations still gets a row, with the last three columns empty.
    pub fn export_history_csv(&self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        let mut writer = csv::Writer::from_writer(io::create_writer(path)?);

        let mut rows = 0;
        for record in &self.operations {
            let base = HistoryRow {
                operation: &record.name,
                status: record.status.label(),
                ts: record.ts,
                kind: "",
                prev_example: None,
                example: None,
            };

            if record.transformations.is_empty() {
                writer.serialize(&base)?;
                rows += 1;
                continue;
            }
            for t in &record.transformations {
                writer.serialize(HistoryRow {
                    kind: t.kind.label(),
                    prev_example: t.prev_example_hash,
                    example: t.example_hash,
                    ..base
                })?;
                rows += 1;
            }
        }

        writer.flush().map_err(|e| ReconError::io(path, e))?;
        debug!(dataset = %self.name, path = %path.display(), rows, "exported history");
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use crate::operations::CallArgs;
    use crate::types::{Example, Span};
    use crate::Dataset;
    use tempfile::TempDir;

    #[test]
    fn test_export_history_csv() {
        let mut ds = Dataset::new(
            "train",
            vec![
                Example::new("C developer", vec![Span::new("C", 0, 1, "skill")]),
                Example::new("Java", vec![Span::new("Java", 0, 4, "SKILL")]),
            ],
        );
        ds.apply_in_place("recon.v1.upcase_labels", &CallArgs::new())
            .unwrap();
        ds.apply_in_place("recon.v1.upcase_labels", &CallArgs::new())
            .unwrap();

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.csv");
        assert_eq!(ds.export_history_csv(&path).unwrap(), 2);

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "operation,status,ts,type,prev_example,example");

        let changed = ds.operations()[0].transformations[0];
        let expected = format!(
            "recon.v1.upcase_labels,COMPLETED,{},EXAMPLE_CHANGED,{},{}",
            ds.operations()[0].ts,
            changed.prev_example_hash.unwrap(),
            changed.example_hash.unwrap()
        );
        assert_eq!(lines[1], expected);
        assert!(lines[2].ends_with(",,,"));
    }
}

//! Run outputs: per-book results, combined training data, failure report.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::generator::error::{GeneratorError, GeneratorResult};
use crate::schema::BookSummaryRecord;

pub const TRAINING_DATA_FILE: &str = "training_data.jsonl";
pub const FAILURES_FILE: &str = "failed_books.json";

/// A document that did not complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedBook {
    pub barcode: String,
    pub error: String,
}

/// `path` with `.tmp` appended to the full file name.
pub fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Write `contents` to `path` through a synced temp file and a rename, so
/// readers see either the old file or the complete new one.
pub fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = temp_path(path);
    {
        let mut file = std::fs::File::create(&tmp)?;
        file.write_all(contents)?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp, path)
}

fn output_err(path: &Path) -> impl FnOnce(std::io::Error) -> GeneratorError + '_ {
    move |source| GeneratorError::Output {
        path: path.display().to_string(),
        source,
    }
}

/// Path of a finished book's record.
pub fn result_path(dir: &Path, barcode: &str) -> PathBuf {
    dir.join(format!("{barcode}.json"))
}

/// Save one completed record as `<barcode>.json`.
pub fn write_record(dir: &Path, record: &BookSummaryRecord) -> GeneratorResult<PathBuf> {
    let path = result_path(dir, &record.barcode);
    let json = serde_json::to_string_pretty(record).map_err(|e| GeneratorError::Serialize {
        what: format!("record for \"{}\"", record.barcode),
        message: e.to_string(),
    })?;
    write_atomic(&path, json.as_bytes()).map_err(output_err(&path))?;
    Ok(path)
}

/// Load a record written by [`write_record`].
pub fn read_record(path: &Path) -> GeneratorResult<BookSummaryRecord> {
    let data = std::fs::read_to_string(path).map_err(output_err(path))?;
    serde_json::from_str(&data).map_err(|e| GeneratorError::Serialize {
        what: format!("record {}", path.display()),
        message: e.to_string(),
    })
}

/// One flattened training record per line.
pub fn write_training_data(dir: &Path, records: &[BookSummaryRecord]) -> GeneratorResult<PathBuf> {
    let path = dir.join(TRAINING_DATA_FILE);
    let mut out = String::new();
    for record in records {
        let line = serde_json::to_string(&record.to_training_record()).map_err(|e| {
            GeneratorError::Serialize {
                what: format!("training record for \"{}\"", record.barcode),
                message: e.to_string(),
            }
        })?;
        out.push_str(&line);
        out.push('\n');
    }
    write_atomic(&path, out.as_bytes()).map_err(output_err(&path))?;
    Ok(path)
}

pub fn write_failures(dir: &Path, failures: &[FailedBook]) -> GeneratorResult<PathBuf> {
    let path = dir.join(FAILURES_FILE);
    let json = serde_json::to_string_pretty(failures).map_err(|e| GeneratorError::Serialize {
        what: "failure report".into(),
        message: e.to_string(),
    })?;
    write_atomic(&path, json.as_bytes()).map_err(output_err(&path))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{BookMetadata, Strategy};

    #[test]
    fn temp_path_appends_suffix() {
        assert_eq!(
            temp_path(Path::new("out/checkpoint_b1.json")),
            PathBuf::from("out/checkpoint_b1.json.tmp")
        );
    }

    #[test]
    fn atomic_write_replaces_and_leaves_no_temp() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("a.json");
        write_atomic(&path, b"one").unwrap();
        write_atomic(&path, b"two").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "two");
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn training_data_has_one_line_per_record() {
        let dir = tempfile::TempDir::new().unwrap();
        let meta = BookMetadata {
            barcode: "b1".into(),
            title: "T".into(),
            author: "A".into(),
            date: "1900".into(),
        };
        let mut a = BookSummaryRecord::new(&meta, Strategy::ShortBook, 4_000, "m");
        a.final_summary = "x".repeat(400);
        let mut b = a.clone();
        b.barcode = "b2".into();
        let path = write_training_data(dir.path(), &[a, b]).unwrap();
        let content = std::fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["barcode"], "b1");
        assert_eq!(first["compression_ratio"], 40.0);
        assert_eq!(first["strategy"], "short_book");
    }

    #[test]
    fn record_round_trips_through_result_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let meta = BookMetadata {
            barcode: "b9".into(),
            ..Default::default()
        };
        let record = BookSummaryRecord::new(&meta, Strategy::LongBook, 200_000, "m");
        let path = write_record(dir.path(), &record).unwrap();
        assert_eq!(path, result_path(dir.path(), "b9"));
        assert_eq!(read_record(&path).unwrap(), record);
    }
}

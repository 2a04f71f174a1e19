//! Per-book checkpoint files.
//!
//! One `checkpoint_<barcode>.json` per book in progress, overwritten on
//! every save through a temp file and a rename. A crash mid-save leaves the
//! previous checkpoint (or none) in place, never a partial one.

use std::path::{Path, PathBuf};

use crate::generator::error::{CheckpointError, CheckpointResult};
use crate::generator::output::write_atomic;
use crate::schema::{BookSummaryRecord, Checkpoint, Strategy};

/// Checkpoint files for one output directory.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, barcode: &str) -> PathBuf {
        self.dir.join(format!("checkpoint_{barcode}.json"))
    }

    /// Snapshot `record` under the run name `config_name`.
    pub fn save(&self, config_name: &str, record: &BookSummaryRecord) -> CheckpointResult<PathBuf> {
        let path = self.path_for(&record.barcode);
        let checkpoint = Checkpoint::from_record(config_name, record);
        let json =
            serde_json::to_string_pretty(&checkpoint).map_err(|e| CheckpointError::Serialize {
                barcode: record.barcode.clone(),
                message: e.to_string(),
            })?;
        write_atomic(&path, json.as_bytes()).map_err(|e| CheckpointError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        tracing::debug!(
            barcode = %record.barcode,
            segment = record.current_segment,
            path = %path.display(),
            "checkpoint saved"
        );
        Ok(path)
    }

    /// The checkpoint for `barcode`, if one exists.
    pub fn load(&self, barcode: &str) -> CheckpointResult<Option<Checkpoint>> {
        let path = self.path_for(barcode);
        if !path.exists() {
            return Ok(None);
        }
        Self::load_file(&path).map(Some)
    }

    /// Read and structurally validate a checkpoint file.
    pub fn load_file(path: &Path) -> CheckpointResult<Checkpoint> {
        let data = std::fs::read_to_string(path).map_err(|e| CheckpointError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        let checkpoint: Checkpoint =
            serde_json::from_str(&data).map_err(|e| CheckpointError::Parse {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        checkpoint.record.validate()?;
        Ok(checkpoint)
    }

    /// Delete the checkpoint for `barcode`. Missing is fine.
    pub fn remove(&self, barcode: &str) -> CheckpointResult<()> {
        let path = self.path_for(barcode);
        match std::fs::remove_file(&path) {
            Ok(()) => {
                tracing::debug!(barcode, path = %path.display(), "checkpoint removed");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CheckpointError::Io {
                path: path.display().to_string(),
                source: e,
            }),
        }
    }
}

/// A checkpoint may only resume the book it was written for, under the
/// strategy that book still analyzes to.
pub fn verify_resume(
    checkpoint: &Checkpoint,
    barcode: &str,
    analyzed: Strategy,
) -> CheckpointResult<()> {
    let record = &checkpoint.record;
    if record.strategy != analyzed {
        return Err(CheckpointError::StrategyMismatch {
            barcode: barcode.to_string(),
            checkpoint: record.strategy,
            analyzed,
        });
    }
    for found in [&checkpoint.barcode, &record.barcode] {
        if found != barcode {
            return Err(CheckpointError::BarcodeMismatch {
                expected: barcode.to_string(),
                found: found.clone(),
            });
        }
    }
    Ok(())
}

/// Every stored segment must still fit inside the current text.
pub fn verify_segments(record: &BookSummaryRecord, text_len: usize) -> CheckpointResult<()> {
    match record.segments.iter().find(|s| s.end_char() > text_len) {
        Some(seg) => Err(CheckpointError::StaleSegments {
            barcode: record.barcode.clone(),
            index: seg.index(),
            end: seg.end_char(),
            text_len,
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::output::temp_path;
    use crate::schema::{BookMetadata, Segment};

    fn record(barcode: &str) -> BookSummaryRecord {
        let meta = BookMetadata {
            barcode: barcode.into(),
            title: "Principles".into(),
            author: "James".into(),
            date: "1890".into(),
        };
        let mut r = BookSummaryRecord::new(&meta, Strategy::LongBook, 300_000, "gpt-5.2");
        r.segments = vec![
            Segment::new(0, "CHAPTER I.", 0, 100, 25).unwrap(),
            Segment::new(1, "CHAPTER II.", 100, 250, 40).unwrap(),
        ];
        r
    }

    #[test]
    fn save_load_remove() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path());
        assert!(store.load("b1").unwrap().is_none());

        let path = store.save("run", &record("b1")).unwrap();
        assert_eq!(path, dir.path().join("checkpoint_b1.json"));
        assert!(!temp_path(&path).exists());

        let loaded = store.load("b1").unwrap().unwrap();
        assert_eq!(loaded.config_name, "run");
        let mut expected = record("b1");
        expected.timestamp = loaded.record.timestamp;
        assert_eq!(loaded.record, expected);

        store.remove("b1").unwrap();
        assert!(store.load("b1").unwrap().is_none());
        store.remove("b1").unwrap();
    }

    #[test]
    fn crash_before_rename_keeps_previous_checkpoint() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path());
        let mut r = record("b1");
        store.save("run", &r).unwrap();

        // A later save died after writing half of its temp file.
        r.final_summary = "partial".into();
        let path = store.path_for("b1");
        std::fs::write(temp_path(&path), "{\"config_name\": \"run\", \"barc").unwrap();

        let loaded = store.load("b1").unwrap().unwrap();
        assert!(loaded.record.final_summary.is_empty());
        assert_eq!(loaded.record.segments.len(), 2);

        // The next successful save replaces both.
        store.save("run", &r).unwrap();
        assert_eq!(store.load("b1").unwrap().unwrap().record.final_summary, "partial");
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn corrupt_checkpoint_is_parse_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path());
        std::fs::write(store.path_for("b1"), "").unwrap();
        assert!(matches!(store.load("b1"), Err(CheckpointError::Parse { .. })));
    }

    #[test]
    fn inconsistent_record_rejected_on_load() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path());
        let mut r = record("b1");
        r.current_segment = 1; // cursor moved without a summary
        store.save("run", &r).unwrap();
        assert!(matches!(
            store.load("b1"),
            Err(CheckpointError::Inconsistent(_))
        ));
    }

    #[test]
    fn resume_checks() {
        let checkpoint = Checkpoint::from_record("run", &record("b1"));
        verify_resume(&checkpoint, "b1", Strategy::LongBook).unwrap();
        assert!(matches!(
            verify_resume(&checkpoint, "b1", Strategy::ShortBook),
            Err(CheckpointError::StrategyMismatch { .. })
        ));
        assert!(matches!(
            verify_resume(&checkpoint, "b2", Strategy::LongBook),
            Err(CheckpointError::BarcodeMismatch { .. })
        ));

        verify_segments(&checkpoint.record, 250).unwrap();
        assert!(matches!(
            verify_segments(&checkpoint.record, 249),
            Err(CheckpointError::StaleSegments { index: 1, .. })
        ));
    }
}

//! Source table of book texts, stored as JSONL.
//!
//! Each line is one row: `{"barcode", "text", "title", "author", "date"}`.
//! Only `barcode` and `text` are required.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use miette::Diagnostic;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::schema::BookMetadata;

/// Errors from loading or querying the source table.
#[derive(Debug, Error, Diagnostic)]
pub enum SourceError {
    #[error("failed to read source table: {path}")]
    #[diagnostic(
        code(grokken::source::io),
        help("Check the `source` path in the config.")
    )]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}:{line}: {message}")]
    #[diagnostic(
        code(grokken::source::parse),
        help("Each line must be a JSON object with at least `barcode` and `text`.")
    )]
    Parse {
        path: String,
        line: usize,
        message: String,
    },

    #[error("barcode \"{barcode}\" not found in {path}")]
    #[diagnostic(
        code(grokken::source::missing_barcode),
        help("Check the barcode, or export the book into the source table first.")
    )]
    MissingBarcode { barcode: String, path: String },
}

pub type SourceResult<T> = std::result::Result<T, SourceError>;

/// One book's text and bibliographic fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookRow {
    pub barcode: String,
    pub text: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: String,
    /// Publication date; numbers in the source are kept as their text.
    #[serde(default, deserialize_with = "string_or_number")]
    pub date: String,
}

impl BookRow {
    pub fn metadata(&self) -> BookMetadata {
        BookMetadata {
            barcode: self.barcode.clone(),
            title: self.title.clone(),
            author: self.author.clone(),
            date: self.date.clone(),
        }
    }
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    })
}

/// In-memory source table indexed by barcode.
#[derive(Debug, Clone, Default)]
pub struct SourceTable {
    origin: String,
    rows: Vec<BookRow>,
    index: HashMap<String, usize>,
}

impl SourceTable {
    /// Load a JSONL file. Blank lines are skipped; the first row wins when a
    /// barcode repeats.
    pub fn from_jsonl(path: &Path) -> SourceResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| SourceError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        let mut rows = Vec::new();
        for (i, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let row: BookRow = serde_json::from_str(line).map_err(|e| SourceError::Parse {
                path: path.display().to_string(),
                line: i + 1,
                message: e.to_string(),
            })?;
            rows.push(row);
        }
        let table = Self::from_rows_with_origin(rows, path.display().to_string());
        tracing::debug!(path = %path.display(), books = table.len(), "loaded source table");
        Ok(table)
    }

    pub fn from_rows(rows: Vec<BookRow>) -> Self {
        Self::from_rows_with_origin(rows, "<memory>".into())
    }

    fn from_rows_with_origin(rows: Vec<BookRow>, origin: String) -> Self {
        let mut index = HashMap::with_capacity(rows.len());
        for (i, row) in rows.iter().enumerate() {
            if index.contains_key(&row.barcode) {
                tracing::warn!(barcode = %row.barcode, "duplicate barcode in source table, keeping the first row");
                continue;
            }
            index.insert(row.barcode.clone(), i);
        }
        Self {
            origin,
            rows,
            index,
        }
    }

    /// The row for `barcode`.
    pub fn get(&self, barcode: &str) -> SourceResult<&BookRow> {
        self.index
            .get(barcode)
            .map(|&i| &self.rows[i])
            .ok_or_else(|| SourceError::MissingBarcode {
                barcode: barcode.to_string(),
                path: self.origin.clone(),
            })
    }

    pub fn contains(&self, barcode: &str) -> bool {
        self.index.contains_key(barcode)
    }

    pub fn rows(&self) -> &[BookRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Write rows as JSONL, creating parent directories.
pub fn write_jsonl(path: &Path, rows: &[BookRow]) -> SourceResult<PathBuf> {
    let io_err = |e: std::io::Error| SourceError::Io {
        path: path.display().to_string(),
        source: e,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    let mut out = String::new();
    for (i, row) in rows.iter().enumerate() {
        let line = serde_json::to_string(row).map_err(|e| SourceError::Parse {
            path: path.display().to_string(),
            line: i + 1,
            message: e.to_string(),
        })?;
        out.push_str(&line);
        out.push('\n');
    }
    std::fs::write(path, out).map_err(io_err)?;
    Ok(path.to_path_buf())
}

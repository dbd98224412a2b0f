//src/table_io.rs

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, StringRecord, Trim};
use flate2::read::MultiGzDecoder;

use crate::error::AnalysisError;

pub type TableReader = csv::Reader<Box<dyn Read>>;

/// Comma for `.csv` / `.csv.gz`, tab for everything else.
pub fn delimiter_for(path: &Path) -> u8 {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let name = name.strip_suffix(".gz").unwrap_or(&name);
    if name.ends_with(".csv") {
        b','
    } else {
        b'\t'
    }
}

/// Opens a delimited table with a header row, decompressing `.gz` input.
pub fn open_table(path: &Path) -> Result<TableReader, AnalysisError> {
    let f = File::open(path).map_err(|e| AnalysisError::io(path, e))?;

    let is_gz = path
        .extension()
        .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case("gz"))
        .unwrap_or(false);

    let inner: Box<dyn Read> = if is_gz {
        Box::new(BufReader::new(MultiGzDecoder::new(f)))
    } else {
        Box::new(BufReader::new(f))
    };

    Ok(ReaderBuilder::new()
        .delimiter(delimiter_for(path))
        .has_headers(true)
        .trim(Trim::All)
        .from_reader(inner))
}

/// Header row with column lookup that turns a missing column into a
/// schema error naming the file.
pub struct Header {
    path: PathBuf,
    names: StringRecord,
}

impl Header {
    pub fn read(reader: &mut TableReader, path: &Path) -> Result<Self, AnalysisError> {
        let names = reader
            .headers()
            .map_err(|e| AnalysisError::csv(path, e))?
            .clone();
        Ok(Header { path: path.to_path_buf(), names })
    }

    pub fn require(&self, column: &str) -> Result<usize, AnalysisError> {
        self.optional(column).ok_or_else(|| AnalysisError::Schema {
            path: self.path.clone(),
            column: column.to_string(),
        })
    }

    pub fn optional(&self, column: &str) -> Option<usize> {
        self.names.iter().position(|h| h == column)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// A cell value, with empty and `NA` treated as missing.
pub fn cell(record: &StringRecord, idx: usize) -> Option<&str> {
    match record.get(idx) {
        None | Some("") | Some("NA") | Some("NaN") => None,
        Some(v) => Some(v),
    }
}

pub fn line_of(record: &StringRecord) -> u64 {
    record.position().map(|p| p.line()).unwrap_or(0)
}

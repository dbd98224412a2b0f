//src/metadata.rs

use std::path::Path;

use ahash::AHashMap;
use chrono::NaiveDate;

use crate::config::SampleTypeRecoding;
use crate::error::AnalysisError;
use crate::sample_id::{recode_sample_type, split_run_file_name};
use crate::table_io::{cell, line_of, open_table, Header};

/// (Subject, SampleType, SampleNo)
pub type SampleKey = (String, String, Option<String>);
/// (DerivingSampleID, LibraryMethod)
pub type RunKey = (String, String);

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%d.%m.%Y", "%m/%d/%Y"];

#[derive(Debug, Clone, PartialEq)]
pub struct SampleInfo {
    pub timepoint: Option<NaiveDate>,
    pub location: Option<String>,
    pub study_group: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunStats {
    pub reads_total: u64,
    pub reads_mapped: u64,
    pub reference_db: Option<String>,
}

pub type SampleTable = AHashMap<SampleKey, SampleInfo>;
pub type RunSummary = AHashMap<RunKey, RunStats>;

pub fn parse_timepoint(raw: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
}

/// Loads the subject/timepoint/location table. `StudyGroup` is optional and
/// any other columns are ignored. SampleType is recoded with the same rules
/// as parsed sample identifiers so control rows key the same way.
pub fn load_sample_table<P: AsRef<Path>>(
    filepath: P,
    recoding: SampleTypeRecoding,
) -> Result<SampleTable, AnalysisError> {
    let path = filepath.as_ref();
    let mut reader = open_table(path)?;
    let header = Header::read(&mut reader, path)?;

    let subject_col = header.require("Subject")?;
    let type_col = header.require("SampleType")?;
    let no_col = header.require("SampleNo")?;
    let time_col = header.require("Timepoint")?;
    let location_col = header.require("Location")?;
    let group_col = header.optional("StudyGroup");

    let mut table = SampleTable::new();
    for record in reader.records() {
        let record = record.map_err(|e| AnalysisError::csv(path, e))?;
        let line = line_of(&record);

        let (Some(subject), Some(sample_type)) = (cell(&record, subject_col), cell(&record, type_col))
        else {
            log::warn!("{}:{}: row without Subject/SampleType skipped", path.display(), line);
            continue;
        };

        let timepoint = match cell(&record, time_col) {
            None => None,
            Some(raw) => Some(parse_timepoint(raw).ok_or_else(|| AnalysisError::InvalidValue {
                path: path.to_path_buf(),
                line,
                column: "Timepoint".into(),
                value: raw.to_string(),
                reason: "unrecognised date format".into(),
            })?),
        };

        let key: SampleKey = (
            subject.to_string(),
            recode_sample_type(sample_type, recoding).0,
            cell(&record, no_col).map(str::to_string),
        );
        let info = SampleInfo {
            timepoint,
            location: cell(&record, location_col).map(str::to_string),
            study_group: group_col.and_then(|c| cell(&record, c)).map(str::to_string),
        };
        if table.insert(key.clone(), info).is_some() {
            return Err(AnalysisError::DuplicateKey {
                path: path.to_path_buf(),
                key: format_sample_key(&key),
            });
        }
    }

    log::info!("Loaded {} sample-table rows from {}", table.len(), path.display());
    Ok(table)
}

/// Loads the pipeline run summary, keyed by the sample file name split into
/// (DerivingSampleID, LibraryMethod).
pub fn load_run_summary<P: AsRef<Path>>(filepath: P) -> Result<RunSummary, AnalysisError> {
    let path = filepath.as_ref();
    let mut reader = open_table(path)?;
    let header = Header::read(&mut reader, path)?;

    let file_col = header.require("sample_filename")?;
    let total_col = header.require("reads_total")?;
    let mapped_col = header.require("reads_mapped")?;
    let db_col = header.require("reference_db")?;

    let mut summary = RunSummary::new();
    for record in reader.records() {
        let record = record.map_err(|e| AnalysisError::csv(path, e))?;
        let line = line_of(&record);
        let file_name = cell(&record, file_col).unwrap_or("");

        let Some(key) = split_run_file_name(file_name) else {
            log::warn!(
                "{}:{}: sample_filename '{}' has no library method suffix, skipped",
                path.display(),
                line,
                file_name
            );
            continue;
        };

        let read_count = |col: usize, column: &str| -> Result<u64, AnalysisError> {
            let raw = cell(&record, col).unwrap_or("0");
            raw.parse().map_err(|_| AnalysisError::InvalidValue {
                path: path.to_path_buf(),
                line,
                column: column.to_string(),
                value: raw.to_string(),
                reason: "not a non-negative integer".into(),
            })
        };

        let stats = RunStats {
            reads_total: read_count(total_col, "reads_total")?,
            reads_mapped: read_count(mapped_col, "reads_mapped")?,
            reference_db: cell(&record, db_col).map(str::to_string),
        };
        if summary.insert(key.clone(), stats).is_some() {
            return Err(AnalysisError::DuplicateKey {
                path: path.to_path_buf(),
                key: format_run_key(&key),
            });
        }
    }

    log::info!("Loaded {} run-summary rows from {}", summary.len(), path.display());
    Ok(summary)
}

pub fn format_sample_key(key: &SampleKey) -> String {
    format!(
        "Subject={} SampleType={} SampleNo={}",
        key.0,
        key.1,
        key.2.as_deref().unwrap_or("NA")
    )
}

pub fn format_run_key(key: &RunKey) -> String {
    format!("DerivingSampleID={} LibraryMethod={}", key.0, key.1)
}

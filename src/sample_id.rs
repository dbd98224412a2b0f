//src/sample_id.rs
//
// Sample identifier grammar:
//
//   <Subject>_<SampleType>[_<SampleNo>[_<ExtractionNo>]]_<LibraryMethod>
//
// Every slot is a non-empty run of non-underscore characters. Optional slots
// fill left to right, so an identifier that lacks an extraction number still
// places SampleNo correctly.

use std::sync::LazyLock;

use regex::Regex;

use crate::config::SampleTypeRecoding;

static SAMPLE_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<subject>[^_]+)_(?P<sample_type>[^_]+)(?:_(?P<sample_no>[^_]+))?(?:_(?P<extraction_no>[^_]+))?_(?P<library_method>[^_]+)$",
    )
    .expect("sample id grammar is a valid regex")
});

pub const EXTRACTION_CONTROL: &str = "EC";

/// Control sentinels that always mean an extraction control.
const BLANK_SENTINEL: &str = "blank";
/// Numeric sentinel whose meaning is unconfirmed.
const NUMERIC_SENTINEL: &str = "1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSampleId {
    /// Everything before the library method, e.g. `P01_S_3_1`.
    pub deriving_sample_id: String,
    pub library_method: String,
    pub subject: String,
    /// SampleType as written in the identifier.
    pub raw_sample_type: String,
    /// SampleType after control recoding.
    pub sample_type: String,
    pub sample_no: Option<String>,
    pub extraction_no: Option<String>,
    /// Set when the numeric sentinel was left uncollapsed.
    pub ambiguous_sample_type: bool,
}

impl ParsedSampleId {
    /// Key used against the sample table.
    pub fn sample_table_key(&self) -> (String, String, Option<String>) {
        (
            self.subject.clone(),
            self.sample_type.clone(),
            self.sample_no.clone(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SampleIdError {
    Empty,
    /// An underscore-separated token is empty; carries its 1-based position.
    EmptySlot(usize),
    /// Token structure does not match; carries the underscore token count.
    TokenCount(usize),
}

impl std::fmt::Display for SampleIdError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SampleIdError::Empty => f.write_str("empty identifier"),
            SampleIdError::EmptySlot(pos) => write!(f, "token {pos} is empty"),
            SampleIdError::TokenCount(n) => write!(
                f,
                "expected 3 to 5 non-empty underscore-separated tokens, found {n}"
            ),
        }
    }
}

/// Maps control SampleType sentinels onto "EC". Returns the recoded value and
/// whether it is the unconfirmed numeric sentinel left as-is.
pub fn recode_sample_type(raw: &str, recoding: SampleTypeRecoding) -> (String, bool) {
    match (raw, recoding) {
        (BLANK_SENTINEL, _) => (EXTRACTION_CONTROL.to_string(), false),
        (NUMERIC_SENTINEL, SampleTypeRecoding::CollapseToExtractionControl) => {
            (EXTRACTION_CONTROL.to_string(), false)
        }
        (NUMERIC_SENTINEL, SampleTypeRecoding::Preserve) => (raw.to_string(), true),
        _ => (raw.to_string(), false),
    }
}

pub fn parse_sample_id(
    raw: &str,
    recoding: SampleTypeRecoding,
) -> Result<ParsedSampleId, SampleIdError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(SampleIdError::Empty);
    }
    if let Some(pos) = raw.split('_').position(str::is_empty) {
        return Err(SampleIdError::EmptySlot(pos + 1));
    }
    let caps = SAMPLE_ID
        .captures(raw)
        .ok_or_else(|| SampleIdError::TokenCount(raw.split('_').count()))?;

    let slot = |name: &str| caps.name(name).map(|m| m.as_str().to_string());
    let library_method = caps["library_method"].to_string();
    let deriving_sample_id = raw[..raw.len() - library_method.len() - 1].to_string();
    let raw_sample_type = caps["sample_type"].to_string();
    let (sample_type, ambiguous_sample_type) = recode_sample_type(&raw_sample_type, recoding);

    Ok(ParsedSampleId {
        deriving_sample_id,
        library_method,
        subject: caps["subject"].to_string(),
        raw_sample_type,
        sample_type,
        sample_no: slot("sample_no"),
        extraction_no: slot("extraction_no"),
        ambiguous_sample_type,
    })
}

/// File extensions stripped from run-summary file names.
const READ_FILE_SUFFIXES: [&str; 5] = [".fastq.gz", ".fq.gz", ".fastq", ".fq", ".bam"];

/// Splits a run-summary file name into (DerivingSampleID, LibraryMethod) at
/// the last underscore, after dropping any directory and read-file suffix.
pub fn split_run_file_name(file_name: &str) -> Option<(String, String)> {
    let base = file_name.rsplit(['/', '\\']).next().unwrap_or(file_name);
    let stem = READ_FILE_SUFFIXES
        .iter()
        .find_map(|suffix| base.strip_suffix(suffix))
        .unwrap_or(base);
    let (deriving, method) = stem.rsplit_once('_')?;
    if deriving.is_empty() || method.is_empty() {
        return None;
    }
    Some((deriving.to_string(), method.to_string()))
}

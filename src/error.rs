//src/error.rs

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Fatal conditions. Any of these aborts the run before output is written.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed table {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("{} is missing required column '{column}'", path.display())]
    Schema { path: PathBuf, column: String },

    #[error("{}:{line}: bad value '{value}' in column '{column}': {reason}", path.display())]
    InvalidValue {
        path: PathBuf,
        line: u64,
        column: String,
        value: String,
        reason: String,
    },

    #[error("{} contains duplicate key '{key}'", path.display())]
    DuplicateKey { path: PathBuf, key: String },

    #[error("{count} sample(s) failed to reconcile against the metadata tables")]
    KeyMismatch { count: usize },
}

impl AnalysisError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        AnalysisError::Io { path: path.into(), source }
    }

    pub(crate) fn csv(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        AnalysisError::Csv { path: path.into(), source }
    }
}

/// Non-fatal findings collected during a run and reported with the output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// Sample identifier does not fit the token grammar.
    UnparseableSampleId { sample: String, reason: String },
    /// No sample-table row for the decomposed (Subject, SampleType, SampleNo).
    UnmatchedSampleTable { sample: String, key: String },
    /// No run-summary row for the (DerivingSampleID, LibraryMethod) pair.
    UnmatchedRunSummary { sample: String, key: String },
    /// SampleType "1" kept distinct from "EC" pending confirmation.
    AmbiguousSampleType { sample: String, value: String },
    /// Count row whose tax id is absent from the taxonomy.
    UnresolvedTaxon { tax_id: u32 },
    /// Sample with zero total reads; its relative frequencies are 0.
    DegenerateAggregation { sample: String },
}

impl Diagnostic {
    pub fn kind(&self) -> &'static str {
        match self {
            Diagnostic::UnparseableSampleId { .. } => "unparseable_sample_id",
            Diagnostic::UnmatchedSampleTable { .. } => "unmatched_sample_table",
            Diagnostic::UnmatchedRunSummary { .. } => "unmatched_run_summary",
            Diagnostic::AmbiguousSampleType { .. } => "ambiguous_sample_type",
            Diagnostic::UnresolvedTaxon { .. } => "unresolved_taxon",
            Diagnostic::DegenerateAggregation { .. } => "degenerate_aggregation",
        }
    }

    /// True for the conditions that mean a sample lost metadata.
    pub fn is_key_mismatch(&self) -> bool {
        matches!(
            self,
            Diagnostic::UnparseableSampleId { .. }
                | Diagnostic::UnmatchedSampleTable { .. }
                | Diagnostic::UnmatchedRunSummary { .. }
        )
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::UnparseableSampleId { sample, reason } => {
                write!(f, "sample '{sample}' cannot be decomposed: {reason}")
            }
            Diagnostic::UnmatchedSampleTable { sample, key } => {
                write!(f, "sample '{sample}' has no sample-table row for {key}")
            }
            Diagnostic::UnmatchedRunSummary { sample, key } => {
                write!(f, "sample '{sample}' has no run-summary row for {key}")
            }
            Diagnostic::AmbiguousSampleType { sample, value } => write!(
                f,
                "sample '{sample}' has SampleType '{value}', kept distinct from EC"
            ),
            Diagnostic::UnresolvedTaxon { tax_id } => {
                write!(f, "tax id {tax_id} is absent from the taxonomy table")
            }
            Diagnostic::DegenerateAggregation { sample } => {
                write!(f, "sample '{sample}' has zero total count")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_mismatch_classification() {
        let d = Diagnostic::UnmatchedRunSummary {
            sample: "A_S_1_WGS".into(),
            key: "A_S_1/WGS".into(),
        };
        assert!(d.is_key_mismatch());
        assert!(!Diagnostic::UnresolvedTaxon { tax_id: 9 }.is_key_mismatch());
        assert_eq!(d.kind(), "unmatched_run_summary");
    }

    #[test]
    fn schema_error_names_column() {
        let e = AnalysisError::Schema {
            path: PathBuf::from("taxonomy.tsv"),
            column: "tax_id".into(),
        };
        assert_eq!(e.to_string(), "taxonomy.tsv is missing required column 'tax_id'");
    }
}

//src/config.rs

use std::path::{Path, PathBuf};

/// Location of the project's data directory. Edit this to point the
/// analysis at another dataset.
pub const DATA_DIR: &str = "./data";

pub const TAXONOMY_FILE: &str = "taxonomy.tsv";
pub const COUNTS_FILE: &str = "counts.tsv";
pub const SAMPLE_TABLE_FILE: &str = "samples.csv";
pub const RUN_SUMMARY_FILE: &str = "run_summary.tsv";
pub const OUTPUT_SUBDIR: &str = "report";

/// What to do with the numeric "1" SampleType seen on some controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleTypeRecoding {
    /// Keep "1" as its own category and flag every occurrence.
    Preserve,
    /// Fold "1" into "EC" together with "blank".
    CollapseToExtractionControl,
}

/// How unmatched sample keys are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcilePolicy {
    /// Keep the sample with empty metadata and record a diagnostic.
    Report,
    /// Abort the run if any sample fails to reconcile.
    Strict,
}

#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    pub taxonomy_path: PathBuf,
    pub counts_path: PathBuf,
    pub sample_table_path: PathBuf,
    pub run_summary_path: PathBuf,
    pub output_dir: PathBuf,
    /// Literal (malformed, corrected) count-matrix header renames.
    pub header_fixes: Vec<(String, String)>,
    /// DerivingSampleID renames applied before the run-summary join.
    pub deriving_id_aliases: Vec<(String, String)>,
    pub sample_type_recoding: SampleTypeRecoding,
    pub reconcile_policy: ReconcilePolicy,
    pub target_kingdom: String,
    pub condensed_top_n: usize,
}

impl AnalysisConfig {
    pub fn with_data_dir<P: AsRef<Path>>(data_dir: P) -> Self {
        let dir = data_dir.as_ref();
        AnalysisConfig {
            taxonomy_path: dir.join(TAXONOMY_FILE),
            counts_path: dir.join(COUNTS_FILE),
            sample_table_path: dir.join(SAMPLE_TABLE_FILE),
            run_summary_path: dir.join(RUN_SUMMARY_FILE),
            output_dir: dir.join(OUTPUT_SUBDIR),
            header_fixes: vec![("library.blank_WGS".into(), "library_blank_WGS".into())],
            deriving_id_aliases: vec![("library_blank".into(), "library-blank".into())],
            sample_type_recoding: SampleTypeRecoding::Preserve,
            reconcile_policy: ReconcilePolicy::Report,
            target_kingdom: "Viruses".into(),
            condensed_top_n: 25,
        }
    }

    pub(crate) fn fixed_header<'a>(&'a self, header: &'a str) -> &'a str {
        lookup_alias(&self.header_fixes, header)
    }

    pub(crate) fn aliased_deriving_id<'a>(&'a self, id: &'a str) -> &'a str {
        lookup_alias(&self.deriving_id_aliases, id)
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig::with_data_dir(DATA_DIR)
    }
}

fn lookup_alias<'a>(aliases: &'a [(String, String)], key: &'a str) -> &'a str {
    aliases
        .iter()
        .find(|(from, _)| from == key)
        .map(|(_, to)| to.as_str())
        .unwrap_or(key)
}

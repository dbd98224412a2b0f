// src/lib.rs
pub mod abundance;
pub mod config;
pub mod count_matrix;
pub mod error;
pub mod metadata;
pub mod reconcile;
pub mod report;
pub mod sample_id;
pub mod table_io;
pub mod taxdb;
pub mod types;

use std::fs;
use std::path::PathBuf;

use crate::abundance::{AbundanceTable, AbundanceView};
use crate::config::AnalysisConfig;
use crate::count_matrix::load_count_matrix;
use crate::error::{AnalysisError, Diagnostic};
use crate::metadata::{load_run_summary, load_sample_table};
use crate::reconcile::{reconcile_samples, ReconciledSample};
use crate::report::{HeatmapMatrix, LongitudinalPoint, SampleSummaryRow, TallyRow};
use crate::taxdb::parse_taxonomy;
use crate::types::Dimension;

pub const SAMPLE_SUMMARY_FILE: &str = "sample_summary.tsv";
pub const TALLY_FILE: &str = "tallies.tsv";
pub const HEATMAP_FILE: &str = "heatmap_full.tsv";
pub const CONDENSED_HEATMAP_FILE: &str = "heatmap_condensed.tsv";
pub const LONGITUDINAL_FILE: &str = "longitudinal.tsv";
pub const RECONCILIATION_FILE: &str = "reconciliation.txt";

/// Dimensions the tally table is broken down by.
pub const TALLY_DIMENSIONS: [Dimension; 5] = [
    Dimension::StudyGroup,
    Dimension::SampleType,
    Dimension::LibraryMethod,
    Dimension::Subject,
    Dimension::Location,
];

/// Everything one run produces. The joined table is built once; reports
/// are derived from it on demand.
pub struct AnalysisResults {
    pub abundance: AbundanceTable,
    /// Per-sample join outcomes, in count-matrix column order.
    pub reconciled: Vec<ReconciledSample>,
    /// Reconciliation and aggregation diagnostics, in the order raised.
    pub diagnostics: Vec<Diagnostic>,
    pub target_kingdom: String,
    pub condensed_top_n: usize,
}

impl AnalysisResults {
    /// Records belonging to the configured target kingdom.
    pub fn target_view(&self) -> AbundanceView<'_> {
        self.abundance.filter_kingdom(&self.target_kingdom)
    }

    pub fn sample_summary(&self) -> Vec<SampleSummaryRow> {
        report::sample_summary(&self.abundance, &self.target_kingdom)
    }

    pub fn tallies(&self) -> Vec<TallyRow> {
        report::tally(&self.target_view(), &TALLY_DIMENSIONS)
    }

    pub fn heatmap(&self) -> HeatmapMatrix {
        report::heatmap(&self.target_view())
    }

    pub fn condensed_heatmap(&self) -> HeatmapMatrix {
        report::condense(&self.heatmap(), self.condensed_top_n)
    }

    pub fn longitudinal(&self) -> Vec<LongitudinalPoint> {
        report::longitudinal(&self.target_view())
    }

    /// Generate the reconciliation report text on demand
    pub fn get_reconciliation_report(&self) -> String {
        report::reconciliation_report(&self.diagnostics)
    }

    /// Writes every report table into `out_dir`, creating it if needed, and
    /// returns the written paths.
    pub fn write_reports(&self, out_dir: &std::path::Path) -> Result<Vec<PathBuf>, AnalysisError> {
        fs::create_dir_all(out_dir).map_err(|e| AnalysisError::io(out_dir, e))?;
        let path = |name: &str| out_dir.join(name);

        report::write_rows(&path(SAMPLE_SUMMARY_FILE), &self.sample_summary())?;
        report::write_rows(&path(TALLY_FILE), &self.tallies())?;
        let full = self.heatmap();
        report::write_heatmap(&path(HEATMAP_FILE), &full)?;
        report::write_heatmap(
            &path(CONDENSED_HEATMAP_FILE),
            &report::condense(&full, self.condensed_top_n),
        )?;
        report::write_rows(&path(LONGITUDINAL_FILE), &self.longitudinal())?;

        let reconciliation = path(RECONCILIATION_FILE);
        fs::write(&reconciliation, self.get_reconciliation_report())
            .map_err(|e| AnalysisError::io(&reconciliation, e))?;

        Ok([
            SAMPLE_SUMMARY_FILE,
            TALLY_FILE,
            HEATMAP_FILE,
            CONDENSED_HEATMAP_FILE,
            LONGITUDINAL_FILE,
            RECONCILIATION_FILE,
        ]
        .iter()
        .map(|&name| path(name))
        .collect())
    }
}

/// Loads all inputs named by `config`, reconciles sample metadata and builds
/// the joined abundance table. Any schema or value error aborts before
/// anything is written.
pub fn run_analysis(config: &AnalysisConfig) -> Result<AnalysisResults, AnalysisError> {
    // 1. Static inputs
    let taxonomy = parse_taxonomy(&config.taxonomy_path)?;
    let matrix = load_count_matrix(&config.counts_path, config)?;
    let sample_table = load_sample_table(&config.sample_table_path, config.sample_type_recoding)?;
    let run_summary = load_run_summary(&config.run_summary_path)?;

    // 2. Reconcile sample names against both metadata sources
    let reconciliation = reconcile_samples(matrix.samples(), &sample_table, &run_summary, config)?;

    // 3. Join counts, taxonomy and samples
    let abundance = AbundanceTable::build(&matrix, taxonomy, reconciliation.records());

    let mut diagnostics = reconciliation.diagnostics;
    diagnostics.extend_from_slice(abundance.diagnostics());

    if !diagnostics.is_empty() {
        log::warn!("{} diagnostic(s) raised; see the reconciliation report", diagnostics.len());
    }

    Ok(AnalysisResults {
        abundance,
        reconciled: reconciliation.samples,
        diagnostics,
        target_kingdom: config.target_kingdom.clone(),
        condensed_top_n: config.condensed_top_n,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn write_fixture(dir: &Path) {
        fs::write(
            dir.join(config::TAXONOMY_FILE),
            "tax_id\tsuperkingdom\tphylum\tclass\torder\tfamily\tgenus\tspecies\tname\n\
             1001\tBacteria\tBacillota\tBacilli\tNA\tNA\tNA\tB. one\tB. one\n\
             1002\tViruses\tUroviricota\tCaudoviricetes\tNA\tNA\tNA\tV. two\tV. two\n",
        )
        .unwrap();
        fs::write(
            dir.join(config::COUNTS_FILE),
            "tax_id\tP01_S_1_1_WGS\tlibrary.blank_WGS\tP01_S_2_WGS\n\
             1001\t10\t0\t\n\
             1002\t90\t5\tNA\n\
             9999\t3\t0\t0\n",
        )
        .unwrap();
        fs::write(
            dir.join(config::SAMPLE_TABLE_FILE),
            "Subject,SampleType,SampleNo,Timepoint,Location,StudyGroup\n\
             P01,S,1,2021-03-04,Ward A,SCID\n\
             P01,S,2,2021-04-01,Ward A,SCID\n\
             library,EC,,,,\n",
        )
        .unwrap();
        fs::write(
            dir.join(config::RUN_SUMMARY_FILE),
            "sample_filename\treads_total\treads_mapped\treference_db\n\
             P01_S_1_1_WGS.fastq.gz\t1000\t103\tnt_2023\n\
             library-blank_WGS.fastq.gz\t50\t5\tnt_2023\n",
        )
        .unwrap();
    }

    #[test]
    fn test_run_analysis_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path());
        let cfg = AnalysisConfig::with_data_dir(dir.path());

        let results = run_analysis(&cfg).expect("analysis failed");

        // Every matrix cell survives the join, including the unknown taxon.
        assert_eq!(results.abundance.records().len(), 9);
        assert_eq!(results.target_view().total_count(), 95);

        let blank = results.abundance.sample_index("library_blank_WGS").unwrap();
        let blank_rec = &results.abundance.samples()[blank];
        assert_eq!(blank_rec.sample_type.as_deref(), Some("EC"));
        assert_eq!(blank_rec.reads_mapped, Some(5));

        let kinds: Vec<&str> = results.diagnostics.iter().map(|d| d.kind()).collect();
        assert!(kinds.contains(&"unmatched_run_summary"));
        assert!(kinds.contains(&"unresolved_taxon"));
        assert!(kinds.contains(&"degenerate_aggregation"));
        assert!(!kinds.contains(&"unmatched_sample_table"));

        let p01 = &results.reconciled[0];
        assert!(p01.fully_matched());

        let out = dir.path().join("out");
        let written = results.write_reports(&out).unwrap();
        assert_eq!(written.len(), 6);
        assert!(written.iter().all(|p| p.exists()));

        let report = fs::read_to_string(out.join(RECONCILIATION_FILE)).unwrap();
        assert!(report.contains("P01_S_2_WGS"));
    }

    #[test]
    fn test_missing_input_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = AnalysisConfig::with_data_dir(dir.path());
        assert!(matches!(run_analysis(&cfg), Err(AnalysisError::Io { .. })));
    }
}

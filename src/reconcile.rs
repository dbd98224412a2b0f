//src/reconcile.rs

use crate::config::{AnalysisConfig, ReconcilePolicy};
use crate::error::{AnalysisError, Diagnostic};
use crate::metadata::{format_run_key, format_sample_key, RunKey, RunSummary, SampleTable};
use crate::sample_id::parse_sample_id;
use crate::types::SampleRecord;

/// Result of one join attempt for one sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    Matched,
    Unmatched { key: String },
    /// The identifier did not decompose, so there was no key to join on.
    NotAttempted,
}

impl JoinOutcome {
    pub fn is_matched(&self) -> bool {
        matches!(self, JoinOutcome::Matched)
    }
}

#[derive(Debug, Clone)]
pub struct ReconciledSample {
    pub record: SampleRecord,
    pub sample_table: JoinOutcome,
    pub run_summary: JoinOutcome,
}

impl ReconciledSample {
    pub fn fully_matched(&self) -> bool {
        self.sample_table.is_matched() && self.run_summary.is_matched()
    }
}

#[derive(Debug, Default)]
pub struct Reconciliation {
    pub samples: Vec<ReconciledSample>,
    pub diagnostics: Vec<Diagnostic>,
}

impl Reconciliation {
    pub fn records(&self) -> Vec<SampleRecord> {
        self.samples.iter().map(|s| s.record.clone()).collect()
    }

    pub fn unmatched_count(&self) -> usize {
        self.samples.iter().filter(|s| !s.fully_matched()).count()
    }
}

fn raise(diagnostics: &mut Vec<Diagnostic>, d: Diagnostic) {
    log::warn!("{}", d);
    diagnostics.push(d);
}

/// Decomposes each count-matrix sample name and joins it against the sample
/// table and the run summary. Samples are returned in input order; unmatched
/// joins leave the corresponding fields empty and raise a diagnostic.
pub fn reconcile_samples(
    sample_names: &[String],
    sample_table: &SampleTable,
    run_summary: &RunSummary,
    config: &AnalysisConfig,
) -> Result<Reconciliation, AnalysisError> {
    let mut out = Reconciliation::default();

    for name in sample_names {
        let mut record = SampleRecord::unresolved(name);

        let parsed = match parse_sample_id(name, config.sample_type_recoding) {
            Ok(p) => p,
            Err(e) => {
                raise(
                    &mut out.diagnostics,
                    Diagnostic::UnparseableSampleId {
                        sample: name.clone(),
                        reason: e.to_string(),
                    },
                );
                out.samples.push(ReconciledSample {
                    record,
                    sample_table: JoinOutcome::NotAttempted,
                    run_summary: JoinOutcome::NotAttempted,
                });
                continue;
            }
        };

        if parsed.ambiguous_sample_type {
            raise(
                &mut out.diagnostics,
                Diagnostic::AmbiguousSampleType {
                    sample: name.clone(),
                    value: parsed.raw_sample_type.clone(),
                },
            );
        }

        let sample_key = parsed.sample_table_key();
        let sample_outcome = match sample_table.get(&sample_key) {
            Some(info) => {
                record.timepoint = info.timepoint;
                record.location = info.location.clone();
                record.study_group = info.study_group.clone();
                JoinOutcome::Matched
            }
            None => {
                let key = format_sample_key(&sample_key);
                raise(
                    &mut out.diagnostics,
                    Diagnostic::UnmatchedSampleTable { sample: name.clone(), key: key.clone() },
                );
                JoinOutcome::Unmatched { key }
            }
        };

        let run_key: RunKey = (
            config.aliased_deriving_id(&parsed.deriving_sample_id).to_string(),
            parsed.library_method.clone(),
        );
        let run_outcome = match run_summary.get(&run_key) {
            Some(stats) => {
                record.reads_total = Some(stats.reads_total);
                record.reads_mapped = Some(stats.reads_mapped);
                record.reference_db = stats.reference_db.clone();
                JoinOutcome::Matched
            }
            None => {
                let key = format_run_key(&run_key);
                raise(
                    &mut out.diagnostics,
                    Diagnostic::UnmatchedRunSummary { sample: name.clone(), key: key.clone() },
                );
                JoinOutcome::Unmatched { key }
            }
        };

        record.deriving_sample_id = Some(parsed.deriving_sample_id);
        record.subject = Some(parsed.subject);
        record.sample_type = Some(parsed.sample_type);
        record.sample_no = parsed.sample_no;
        record.extraction_no = parsed.extraction_no;
        record.library_method = Some(parsed.library_method);

        out.samples.push(ReconciledSample {
            record,
            sample_table: sample_outcome,
            run_summary: run_outcome,
        });
    }

    let unmatched = out.unmatched_count();
    log::info!(
        "Reconciled {} of {} samples against metadata",
        out.samples.len() - unmatched,
        out.samples.len()
    );
    if unmatched > 0 && config.reconcile_policy == ReconcilePolicy::Strict {
        return Err(AnalysisError::KeyMismatch { count: unmatched });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SampleTypeRecoding;
    use crate::metadata::{load_sample_table, RunStats, SampleInfo};
    use chrono::NaiveDate;

    fn fixtures() -> (SampleTable, RunSummary) {
        let mut table = SampleTable::new();
        table.insert(
            ("P01".into(), "S".into(), Some("1".into())),
            SampleInfo {
                timepoint: NaiveDate::from_ymd_opt(2021, 3, 4),
                location: Some("Ward A".into()),
                study_group: Some("SCID".into()),
            },
        );
        table.insert(
            ("library".into(), "EC".into(), None),
            SampleInfo { timepoint: None, location: None, study_group: None },
        );

        let mut runs = RunSummary::new();
        runs.insert(
            ("P01_S_1_1".into(), "WGS".into()),
            RunStats { reads_total: 1000, reads_mapped: 900, reference_db: Some("nt".into()) },
        );
        runs.insert(
            ("library-blank".into(), "WGS".into()),
            RunStats { reads_total: 40, reads_mapped: 3, reference_db: Some("nt".into()) },
        );
        (table, runs)
    }

    fn names(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn joins_both_sources() {
        let (table, runs) = fixtures();
        let cfg = AnalysisConfig::with_data_dir("/tmp");
        let rec = reconcile_samples(&names(&["P01_S_1_1_WGS"]), &table, &runs, &cfg).unwrap();

        assert!(rec.diagnostics.is_empty());
        let s = &rec.samples[0];
        assert!(s.fully_matched());
        assert_eq!(s.record.study_group.as_deref(), Some("SCID"));
        assert_eq!(s.record.extraction_no.as_deref(), Some("1"));
        assert_eq!(s.record.reads_mapped, Some(900));
    }

    #[test]
    fn library_blank_matches_through_alias() {
        let (table, runs) = fixtures();
        let cfg = AnalysisConfig::with_data_dir("/tmp");
        let rec = reconcile_samples(&names(&["library_blank_WGS"]), &table, &runs, &cfg).unwrap();

        let s = &rec.samples[0];
        assert!(s.fully_matched(), "{:?}", rec.diagnostics);
        assert_eq!(s.record.sample_type.as_deref(), Some("EC"));
        assert_eq!(s.record.deriving_sample_id.as_deref(), Some("library_blank"));
        assert_eq!(s.record.reads_total, Some(40));
    }

    #[test]
    fn mismatches_are_reported_not_dropped() {
        let (table, runs) = fixtures();
        let cfg = AnalysisConfig::with_data_dir("/tmp");
        let rec = reconcile_samples(
            &names(&["garbage", "P09_S_1_WGS", "EC_1_WGS"]),
            &table,
            &runs,
            &cfg,
        )
        .unwrap();

        assert_eq!(rec.samples.len(), 3);
        assert_eq!(rec.samples[0].sample_table, JoinOutcome::NotAttempted);
        assert_eq!(rec.samples[0].record.subject, None);
        assert_eq!(rec.samples[1].record.subject.as_deref(), Some("P09"));
        assert!(matches!(rec.samples[1].sample_table, JoinOutcome::Unmatched { .. }));
        assert_eq!(rec.unmatched_count(), 3);

        let kinds: Vec<&str> = rec.diagnostics.iter().map(Diagnostic::kind).collect();
        assert!(kinds.contains(&"unparseable_sample_id"));
        assert!(kinds.contains(&"ambiguous_sample_type"));
        assert!(kinds.contains(&"unmatched_run_summary"));
    }

    #[test]
    fn strict_policy_fails_loudly() {
        let (table, runs) = fixtures();
        let mut cfg = AnalysisConfig::with_data_dir("/tmp");
        cfg.reconcile_policy = ReconcilePolicy::Strict;
        let err = reconcile_samples(&names(&["P01_S_1_1_WGS", "P09_S_1_WGS"]), &table, &runs, &cfg)
            .unwrap_err();
        assert!(matches!(err, AnalysisError::KeyMismatch { count: 1 }));
    }

    fn control_table(dir: &tempfile::TempDir, recoding: SampleTypeRecoding) -> SampleTable {
        let path = dir.path().join("samples.csv");
        std::fs::write(
            &path,
            "Subject,SampleType,SampleNo,Timepoint,Location\n\
             library,blank,,,Lab\n\
             EC,1,2,,Lab\n",
        )
        .unwrap();
        load_sample_table(&path, recoding).unwrap()
    }

    #[test]
    fn blank_rows_in_sample_table_match_blank_identifiers() {
        let dir = tempfile::tempdir().unwrap();
        let table = control_table(&dir, SampleTypeRecoding::Preserve);
        let (_, runs) = fixtures();
        let cfg = AnalysisConfig::with_data_dir("/tmp");
        let rec = reconcile_samples(&names(&["library_blank_WGS"]), &table, &runs, &cfg).unwrap();

        let s = &rec.samples[0];
        assert!(s.fully_matched(), "{:?}", rec.diagnostics);
        assert_eq!(s.record.sample_type.as_deref(), Some("EC"));
        assert_eq!(s.record.location.as_deref(), Some("Lab"));
    }

    #[test]
    fn numeric_sentinel_matches_under_either_recoding() {
        for recoding in [
            SampleTypeRecoding::Preserve,
            SampleTypeRecoding::CollapseToExtractionControl,
        ] {
            let dir = tempfile::tempdir().unwrap();
            let table = control_table(&dir, recoding);
            let mut cfg = AnalysisConfig::with_data_dir("/tmp");
            cfg.sample_type_recoding = recoding;
            let rec =
                reconcile_samples(&names(&["EC_1_2_WGS"]), &table, &RunSummary::new(), &cfg)
                    .unwrap();

            let s = &rec.samples[0];
            assert_eq!(s.sample_table, JoinOutcome::Matched, "{recoding:?}");
            assert_eq!(s.record.location.as_deref(), Some("Lab"));
            let kinds: Vec<&str> = rec.diagnostics.iter().map(Diagnostic::kind).collect();
            assert!(!kinds.contains(&"unmatched_sample_table"), "{recoding:?}");
        }
    }
}

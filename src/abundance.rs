// src/abundance.rs

use ahash::{AHashMap, AHashSet};
use rayon::prelude::*;

use crate::count_matrix::CountMatrix;
use crate::error::Diagnostic;
use crate::taxdb::Taxonomy;
use crate::types::{AbundanceRecord, Dimension, SampleRecord, TaxRank, TaxonRecord};

/// Denormalised long-format table: every (taxon, sample) cell of the count
/// matrix joined with its taxon ranks and sample metadata, plus the cell's
/// share of the sample total. Built once; views borrow from it.
#[derive(Debug)]
pub struct AbundanceTable {
    taxonomy: Taxonomy,
    samples: Vec<SampleRecord>,
    sample_totals: Vec<u64>,
    records: Vec<AbundanceRecord>,
    /// Kingdom -> record positions. `None` collects unresolved and
    /// kingdom-less taxa.
    by_kingdom: AHashMap<Option<String>, Vec<usize>>,
    diagnostics: Vec<Diagnostic>,
}

/// Per-group totals produced by [`AbundanceView::group_by`].
#[derive(Debug, Clone, PartialEq)]
pub struct GroupSummary {
    pub key: Option<String>,
    /// Distinct samples contributing to the group.
    pub samples: usize,
    pub count: u64,
    /// Per-sample sum of relative frequency, averaged over the group's samples.
    pub mean_relative_frequency: f64,
}

/// Share of `count` in `total`; a zero total yields 0.
pub fn relative_frequency(count: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64
    }
}

impl AbundanceTable {
    /// Joins `matrix` against `taxonomy` and `samples`. Sample records are
    /// matched to matrix columns by name; a column without a record gets an
    /// unresolved one. No matrix cell is dropped.
    pub fn build(matrix: &CountMatrix, taxonomy: Taxonomy, samples: Vec<SampleRecord>) -> Self {
        let mut diagnostics = Vec::new();

        let mut by_name: AHashMap<String, SampleRecord> =
            samples.into_iter().map(|s| (s.sample.clone(), s)).collect();
        let samples: Vec<SampleRecord> = matrix
            .samples()
            .iter()
            .map(|name| {
                by_name
                    .remove(name)
                    .unwrap_or_else(|| SampleRecord::unresolved(name))
            })
            .collect();

        let sample_totals = matrix.sample_totals();
        for (s, &total) in sample_totals.iter().enumerate() {
            if total == 0 {
                let d = Diagnostic::DegenerateAggregation { sample: samples[s].sample.clone() };
                log::warn!("{}", d);
                diagnostics.push(d);
            }
        }

        let mut records = Vec::with_capacity(matrix.n_taxa() * matrix.n_samples());
        let mut by_kingdom: AHashMap<Option<String>, Vec<usize>> = AHashMap::new();

        for (row, &tax_id) in matrix.tax_ids().iter().enumerate() {
            let taxon = taxonomy.position(tax_id);
            if taxon.is_none() {
                let d = Diagnostic::UnresolvedTaxon { tax_id };
                log::warn!("{}", d);
                diagnostics.push(d);
            }
            let kingdom = taxon
                .and_then(|pos| taxonomy.record(pos).rank(TaxRank::Kingdom))
                .map(str::to_string);
            let bucket = by_kingdom.entry(kingdom).or_default();

            for (sample, &count) in matrix.row(row).iter().enumerate() {
                bucket.push(records.len());
                records.push(AbundanceRecord {
                    tax_id,
                    taxon,
                    sample,
                    count,
                    relative_frequency: relative_frequency(count, sample_totals[sample]),
                });
            }
        }

        log::info!(
            "Built abundance table: {} records across {} kingdoms",
            records.len(),
            by_kingdom.len()
        );

        AbundanceTable {
            taxonomy,
            samples,
            sample_totals,
            records,
            by_kingdom,
            diagnostics,
        }
    }

    pub fn records(&self) -> &[AbundanceRecord] {
        &self.records
    }

    pub fn samples(&self) -> &[SampleRecord] {
        &self.samples
    }

    pub fn sample_total(&self, sample: usize) -> u64 {
        self.sample_totals[sample]
    }

    pub fn taxonomy(&self) -> &Taxonomy {
        &self.taxonomy
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn taxon_of(&self, record: &AbundanceRecord) -> Option<&TaxonRecord> {
        record.taxon.map(|pos| self.taxonomy.record(pos))
    }

    pub fn sample_of(&self, record: &AbundanceRecord) -> &SampleRecord {
        &self.samples[record.sample]
    }

    pub fn sample_index(&self, name: &str) -> Option<usize> {
        self.samples.iter().position(|s| s.sample == name)
    }

    /// Relative frequency of `tax_id` in the named sample; 0 for pairs that
    /// are absent from the matrix, `None` for an unknown sample.
    pub fn relative_frequency_of(&self, tax_id: u32, sample: &str) -> Option<f64> {
        let s = self.sample_index(sample)?;
        Some(
            self.records
                .iter()
                .find(|r| r.sample == s && r.tax_id == tax_id)
                .map(|r| r.relative_frequency)
                .unwrap_or(0.0),
        )
    }

    pub fn all(&self) -> AbundanceView<'_> {
        AbundanceView {
            table: self,
            rows: (0..self.records.len()).collect(),
        }
    }

    /// Records whose Kingdom equals `kingdom` exactly.
    pub fn filter_kingdom(&self, kingdom: &str) -> AbundanceView<'_> {
        let rows = self
            .by_kingdom
            .get(&Some(kingdom.to_string()))
            .cloned()
            .unwrap_or_default();
        AbundanceView { table: self, rows }
    }

    /// Records with no Kingdom, including tax ids absent from the taxonomy.
    pub fn without_kingdom(&self) -> AbundanceView<'_> {
        AbundanceView {
            table: self,
            rows: self.by_kingdom.get(&None).cloned().unwrap_or_default(),
        }
    }

    pub fn kingdoms(&self) -> Vec<Option<&str>> {
        let mut out: Vec<Option<&str>> = self.by_kingdom.keys().map(|k| k.as_deref()).collect();
        out.sort();
        out
    }
}

/// A borrowed subset of an [`AbundanceTable`].
#[derive(Debug, Clone)]
pub struct AbundanceView<'a> {
    table: &'a AbundanceTable,
    rows: Vec<usize>,
}

impl<'a> AbundanceView<'a> {
    pub fn table(&self) -> &'a AbundanceTable {
        self.table
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a AbundanceRecord> + '_ {
        let table: &'a AbundanceTable = self.table;
        let records = &table.records;
        self.rows.iter().map(move |&i| &records[i])
    }

    pub fn total_count(&self) -> u64 {
        self.iter().map(|r| r.count).sum()
    }

    /// Narrows the view by a predicate over each joined record.
    pub fn filter<F>(&self, mut keep: F) -> AbundanceView<'a>
    where
        F: FnMut(&AbundanceRecord, Option<&TaxonRecord>, &SampleRecord) -> bool,
    {
        let table = self.table;
        let rows = self
            .rows
            .iter()
            .copied()
            .filter(|&i| {
                let r = &table.records[i];
                keep(r, table.taxon_of(r), table.sample_of(r))
            })
            .collect();
        AbundanceView { table, rows }
    }

    /// Distinct tax ids in the view, in taxonomy order (unresolved last).
    pub fn tax_ids(&self) -> Vec<u32> {
        let mut seen = AHashSet::new();
        let mut ids: Vec<(Option<usize>, u32)> = self
            .iter()
            .filter(|r| seen.insert(r.tax_id))
            .map(|r| (r.taxon, r.tax_id))
            .collect();
        ids.sort_by_key(|&(pos, id)| (pos.is_none(), pos, id));
        ids.into_iter().map(|(_, id)| id).collect()
    }

    /// Aggregates the view over one metadata dimension. Groups are sorted
    /// by key with the missing-metadata group last.
    pub fn group_by(&self, dim: Dimension) -> Vec<GroupSummary> {
        let table = self.table;
        let mut groups: AHashMap<Option<&str>, Vec<usize>> = AHashMap::new();
        for &i in &self.rows {
            let key = table.sample_of(&table.records[i]).dimension(dim);
            groups.entry(key).or_default().push(i);
        }

        let groups: Vec<(Option<&str>, Vec<usize>)> = groups.into_iter().collect();
        let mut out: Vec<GroupSummary> = groups
            .into_par_iter()
            .map(|(key, rows)| {
                let mut per_sample: AHashMap<usize, f64> = AHashMap::new();
                let mut count = 0u64;
                for i in rows {
                    let r = &table.records[i];
                    count += r.count;
                    *per_sample.entry(r.sample).or_default() += r.relative_frequency;
                }
                let samples = per_sample.len();
                let mean_relative_frequency = if samples == 0 {
                    0.0
                } else {
                    per_sample.values().sum::<f64>() / samples as f64
                };
                GroupSummary {
                    key: key.map(str::to_string),
                    samples,
                    count,
                    mean_relative_frequency,
                }
            })
            .collect();

        out.sort_by(|a, b| match (&a.key, &b.key) {
            (Some(x), Some(y)) => x.cmp(y),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-12;

    fn taxon(tax_id: u32, kingdom: Option<&str>, species: &str) -> TaxonRecord {
        let mut ranks: [Option<String>; 8] = Default::default();
        ranks[TaxRank::Kingdom.index()] = kingdom.map(str::to_string);
        ranks[TaxRank::Species.index()] = Some(species.to_string());
        TaxonRecord { tax_id, ranks }
    }

    fn sample(name: &str, group: Option<&str>) -> SampleRecord {
        let mut s = SampleRecord::unresolved(name);
        s.study_group = group.map(str::to_string);
        s
    }

    /// taxon 1001 {A: 10, B: 0}, taxon 1002 {A: 90, B: 5}, taxon 7 absent from taxonomy.
    fn fixture() -> AbundanceTable {
        let matrix = CountMatrix::new(
            vec!["SampleA".into(), "SampleB".into(), "SampleC".into()],
            vec![
                (1001, vec![10, 0, 0]),
                (1002, vec![90, 5, 0]),
                (7, vec![0, 0, 0]),
            ],
        )
        .unwrap();
        let taxonomy = Taxonomy::from_records(vec![
            taxon(1001, Some("Bacteria"), "B. one"),
            taxon(1002, Some("Viruses"), "V. two"),
        ])
        .unwrap();
        let samples = vec![
            sample("SampleB", Some("healthy")),
            sample("SampleA", Some("SCID")),
        ];
        AbundanceTable::build(&matrix, taxonomy, samples)
    }

    #[test]
    fn relative_frequency_example() {
        let t = fixture();
        assert!((t.relative_frequency_of(1002, "SampleB").unwrap() - 1.0).abs() < EPS);
        assert!((t.relative_frequency_of(1001, "SampleB").unwrap()).abs() < EPS);
        assert!((t.relative_frequency_of(1001, "SampleA").unwrap() - 0.1).abs() < EPS);
        assert_eq!(t.relative_frequency_of(1001, "Nope"), None);
    }

    #[test]
    fn frequencies_sum_to_one_or_zero() {
        let t = fixture();
        for (s, rec) in t.samples().iter().enumerate() {
            let sum: f64 = t
                .records()
                .iter()
                .filter(|r| r.sample == s)
                .map(|r| r.relative_frequency)
                .sum();
            let expected = if t.sample_total(s) == 0 { 0.0 } else { 1.0 };
            assert!((sum - expected).abs() < 1e-9, "{}: {}", rec.sample, sum);
        }
    }

    #[test]
    fn join_keeps_every_cell() {
        let t = fixture();
        assert_eq!(t.records().len(), 9);
        let unresolved: Vec<_> = t.records().iter().filter(|r| r.tax_id == 7).collect();
        assert_eq!(unresolved.len(), 3);
        assert!(unresolved.iter().all(|r| t.taxon_of(r).is_none()));
        assert_eq!(t.without_kingdom().len(), 3);
        assert_eq!(t.kingdoms(), vec![None, Some("Bacteria"), Some("Viruses")]);
    }

    #[test]
    fn samples_follow_matrix_columns() {
        let t = fixture();
        let names: Vec<&str> = t.samples().iter().map(|s| s.sample.as_str()).collect();
        assert_eq!(names, vec!["SampleA", "SampleB", "SampleC"]);
        assert_eq!(t.samples()[2].study_group, None);
    }

    #[test]
    fn diagnostics_flag_unresolved_and_degenerate() {
        let t = fixture();
        assert!(t.diagnostics().contains(&Diagnostic::UnresolvedTaxon { tax_id: 7 }));
        assert!(t
            .diagnostics()
            .contains(&Diagnostic::DegenerateAggregation { sample: "SampleC".into() }));
        assert!((t.relative_frequency_of(1002, "SampleC").unwrap()).abs() < EPS);
    }

    #[test]
    fn viral_filter_total_matches_input() {
        let t = fixture();
        let viral = t.filter_kingdom("Viruses");
        assert_eq!(viral.total_count(), 95);
        assert_eq!(viral.tax_ids(), vec![1002]);
        assert!(t.filter_kingdom("viruses").is_empty());
    }

    #[test]
    fn group_by_study_group() {
        let t = fixture();
        let groups = t.filter_kingdom("Viruses").group_by(Dimension::StudyGroup);
        assert_eq!(groups.len(), 3);

        assert_eq!(groups[0].key.as_deref(), Some("SCID"));
        assert_eq!(groups[0].count, 90);
        assert!((groups[0].mean_relative_frequency - 0.9).abs() < EPS);

        assert_eq!(groups[1].key.as_deref(), Some("healthy"));
        assert!((groups[1].mean_relative_frequency - 1.0).abs() < EPS);

        assert_eq!(groups[2].key, None);
        assert_eq!(groups[2].samples, 1);
    }

    #[test]
    fn custom_filter_narrows_view() {
        let t = fixture();
        let nonzero = t.all().filter(|r, _, _| r.count > 0);
        assert_eq!(nonzero.len(), 3);
        let scid = nonzero.filter(|_, _, s| s.study_group.as_deref() == Some("SCID"));
        assert_eq!(scid.total_count(), 100);
    }
}

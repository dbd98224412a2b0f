// src/report.rs
//
// Tabular outputs handed to the plotting layer: per-sample summary, tallies,
// heatmap matrices and per-subject longitudinal series.

use std::cmp::Ordering;
use std::fmt::Write as FmtWrite;
use std::path::Path;

use ahash::AHashMap;
use rayon::prelude::*;
use serde::Serialize;

use crate::abundance::{relative_frequency, AbundanceTable, AbundanceView, GroupSummary};
use crate::error::{AnalysisError, Diagnostic};
use crate::types::{Dimension, SampleRecord};

pub const OTHER_LABEL: &str = "Other";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleSummaryRow {
    pub sample: String,
    pub subject: Option<String>,
    pub sample_type: Option<String>,
    pub sample_no: Option<String>,
    pub extraction_no: Option<String>,
    pub library_method: Option<String>,
    pub timepoint: Option<String>,
    pub location: Option<String>,
    pub study_group: Option<String>,
    pub total_count: u64,
    pub target_count: u64,
    pub target_fraction: f64,
    pub reads_total: Option<u64>,
    pub reads_mapped: Option<u64>,
    pub reference_db: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TallyRow {
    pub dimension: &'static str,
    pub value: Option<String>,
    pub samples: usize,
    pub count: u64,
    pub mean_relative_frequency: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LongitudinalPoint {
    pub subject: String,
    pub timepoint: Option<String>,
    pub sample: String,
    pub sample_type: Option<String>,
    pub tax_id: u32,
    pub taxon: String,
    pub count: u64,
    pub relative_frequency: f64,
}

/// Taxa (rows) by samples (columns) of relative frequency.
#[derive(Debug, Clone, PartialEq)]
pub struct HeatmapMatrix {
    pub rows: Vec<String>,
    pub columns: Vec<String>,
    pub cells: Vec<Vec<f64>>,
}

/// Column order for sample-wise outputs: subject, then timepoint, then name;
/// samples without a subject or timepoint go last within their level.
fn sample_order(a: &SampleRecord, b: &SampleRecord) -> Ordering {
    fn none_last<T: Ord>(x: &Option<T>, y: &Option<T>) -> Ordering {
        match (x, y) {
            (Some(x), Some(y)) => x.cmp(y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    }
    none_last(&a.subject, &b.subject)
        .then_with(|| none_last(&a.timepoint, &b.timepoint))
        .then_with(|| a.sample.cmp(&b.sample))
}

fn ordered_samples(table: &AbundanceTable) -> Vec<usize> {
    let samples = table.samples();
    let mut order: Vec<usize> = (0..samples.len()).collect();
    order.sort_by(|&a, &b| sample_order(&samples[a], &samples[b]));
    order
}

fn taxon_label(table: &AbundanceTable, tax_id: u32) -> String {
    table
        .taxonomy()
        .get(tax_id)
        .map(|t| t.label())
        .unwrap_or_else(|| format!("taxid:{tax_id}"))
}

/// Row labels for `tax_ids`; labels shared by several taxa get the tax id
/// appended so every row stays distinct.
fn unique_taxon_labels(table: &AbundanceTable, tax_ids: &[u32]) -> Vec<String> {
    let labels: Vec<String> = tax_ids.iter().map(|&t| taxon_label(table, t)).collect();
    let mut seen: AHashMap<&str, usize> = AHashMap::new();
    for label in &labels {
        *seen.entry(label.as_str()).or_insert(0) += 1;
    }
    labels
        .iter()
        .zip(tax_ids)
        .map(|(label, tax_id)| {
            if seen[label.as_str()] > 1 && !label.starts_with("taxid:") {
                format!("{label} (taxid:{tax_id})")
            } else {
                label.clone()
            }
        })
        .collect()
}

pub fn sample_summary(table: &AbundanceTable, target_kingdom: &str) -> Vec<SampleSummaryRow> {
    let mut target = vec![0u64; table.samples().len()];
    for r in table.filter_kingdom(target_kingdom).iter() {
        target[r.sample] += r.count;
    }

    ordered_samples(table)
        .into_iter()
        .map(|s| {
            let rec = &table.samples()[s];
            let total = table.sample_total(s);
            SampleSummaryRow {
                sample: rec.sample.clone(),
                subject: rec.subject.clone(),
                sample_type: rec.sample_type.clone(),
                sample_no: rec.sample_no.clone(),
                extraction_no: rec.extraction_no.clone(),
                library_method: rec.library_method.clone(),
                timepoint: rec.timepoint.map(|d| d.to_string()),
                location: rec.location.clone(),
                study_group: rec.study_group.clone(),
                total_count: total,
                target_count: target[s],
                target_fraction: relative_frequency(target[s], total),
                reads_total: rec.reads_total,
                reads_mapped: rec.reads_mapped,
                reference_db: rec.reference_db.clone(),
            }
        })
        .collect()
}

pub fn tally(view: &AbundanceView<'_>, dims: &[Dimension]) -> Vec<TallyRow> {
    dims.iter()
        .flat_map(|&dim| {
            view.group_by(dim).into_iter().map(move |g: GroupSummary| TallyRow {
                dimension: dim.name(),
                value: g.key,
                samples: g.samples,
                count: g.count,
                mean_relative_frequency: g.mean_relative_frequency,
            })
        })
        .collect()
}

/// Full heatmap over every taxon in the view and every sample in the table.
pub fn heatmap(view: &AbundanceView<'_>) -> HeatmapMatrix {
    let table = view.table();
    let order = ordered_samples(table);
    let column_of: AHashMap<usize, usize> =
        order.iter().enumerate().map(|(col, &s)| (s, col)).collect();

    let tax_ids = view.tax_ids();
    let row_of: AHashMap<u32, usize> = tax_ids.iter().enumerate().map(|(i, &t)| (t, i)).collect();

    let mut cells = vec![vec![0.0; order.len()]; tax_ids.len()];
    for r in view.iter() {
        cells[row_of[&r.tax_id]][column_of[&r.sample]] = r.relative_frequency;
    }

    HeatmapMatrix {
        rows: unique_taxon_labels(table, &tax_ids),
        columns: order.iter().map(|&s| table.samples()[s].sample.clone()).collect(),
        cells,
    }
}

/// Keeps the `top_n` rows with the highest mean relative frequency and sums
/// the rest into an `Other` row.
pub fn condense(full: &HeatmapMatrix, top_n: usize) -> HeatmapMatrix {
    let n_cols = full.columns.len();
    let mean = |row: &[f64]| {
        if n_cols == 0 {
            0.0
        } else {
            row.iter().sum::<f64>() / n_cols as f64
        }
    };

    let mut ranked: Vec<usize> = (0..full.rows.len()).collect();
    ranked.sort_by(|&a, &b| {
        mean(full.cells[b].as_slice())
            .partial_cmp(&mean(full.cells[a].as_slice()))
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.cmp(&b))
    });

    let (keep, rest) = ranked.split_at(top_n.min(ranked.len()));
    let mut rows: Vec<String> = keep.iter().map(|&i| full.rows[i].clone()).collect();
    let mut cells: Vec<Vec<f64>> = keep.iter().map(|&i| full.cells[i].clone()).collect();

    if !rest.is_empty() {
        let mut other = vec![0.0; n_cols];
        for &i in rest {
            for (o, v) in other.iter_mut().zip(&full.cells[i]) {
                *o += v;
            }
        }
        rows.push(OTHER_LABEL.to_string());
        cells.push(other);
    }

    HeatmapMatrix { rows, columns: full.columns.clone(), cells }
}

/// Per-subject series of non-zero abundances, ordered by timepoint then
/// sample then taxon. Samples without a subject are left out.
pub fn longitudinal(view: &AbundanceView<'_>) -> Vec<LongitudinalPoint> {
    let table = view.table();
    let mut by_subject: AHashMap<&str, Vec<usize>> = AHashMap::new();
    for (i, r) in view.iter().enumerate() {
        if r.count == 0 {
            continue;
        }
        if let Some(subject) = table.sample_of(r).subject.as_deref() {
            by_subject.entry(subject).or_default().push(i);
        }
    }

    let records: Vec<_> = view.iter().collect();
    let mut subjects: Vec<(&str, Vec<usize>)> = by_subject.into_iter().collect();
    subjects.sort_by(|a, b| a.0.cmp(b.0));

    subjects
        .into_par_iter()
        .flat_map_iter(|(subject, idx)| {
            let mut points: Vec<(&SampleRecord, LongitudinalPoint)> = idx
                .into_iter()
                .map(|i| {
                    let r = records[i];
                    let s = table.sample_of(r);
                    let point = LongitudinalPoint {
                        subject: subject.to_string(),
                        timepoint: s.timepoint.map(|d| d.to_string()),
                        sample: s.sample.clone(),
                        sample_type: s.sample_type.clone(),
                        tax_id: r.tax_id,
                        taxon: taxon_label(table, r.tax_id),
                        count: r.count,
                        relative_frequency: r.relative_frequency,
                    };
                    (s, point)
                })
                .collect();
            points.sort_by(|a, b| sample_order(a.0, b.0).then_with(|| a.1.taxon.cmp(&b.1.taxon)));
            points.into_iter().map(|(_, p)| p)
        })
        .collect()
}

/// Human-readable list of diagnostics grouped by kind.
pub fn reconciliation_report(diagnostics: &[Diagnostic]) -> String {
    let mut by_kind: Vec<(&'static str, Vec<&Diagnostic>)> = Vec::new();
    for d in diagnostics {
        match by_kind.iter_mut().find(|(k, _)| *k == d.kind()) {
            Some((_, list)) => list.push(d),
            None => by_kind.push((d.kind(), vec![d])),
        }
    }

    let mut out = String::new();
    if diagnostics.is_empty() {
        out.push_str("All samples and taxa reconciled.\n");
        return out;
    }
    for (kind, list) in by_kind {
        writeln!(out, "[{}] {}", kind, list.len()).unwrap();
        for d in list {
            writeln!(out, "\t{}", d).unwrap();
        }
    }
    out
}

fn tsv_writer(path: &Path) -> Result<csv::Writer<std::fs::File>, AnalysisError> {
    csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(path)
        .map_err(|e| AnalysisError::csv(path, e))
}

pub fn write_rows<T: Serialize>(path: &Path, rows: &[T]) -> Result<(), AnalysisError> {
    let mut wtr = tsv_writer(path)?;
    for row in rows {
        wtr.serialize(row).map_err(|e| AnalysisError::csv(path, e))?;
    }
    wtr.flush().map_err(|e| AnalysisError::io(path, e))
}

pub fn write_heatmap(path: &Path, matrix: &HeatmapMatrix) -> Result<(), AnalysisError> {
    let mut wtr = tsv_writer(path)?;
    let header = std::iter::once("taxon").chain(matrix.columns.iter().map(String::as_str));
    wtr.write_record(header).map_err(|e| AnalysisError::csv(path, e))?;
    for (label, row) in matrix.rows.iter().zip(&matrix.cells) {
        let record = std::iter::once(label.clone()).chain(row.iter().map(|v| format!("{v:.6}")));
        wtr.write_record(record).map_err(|e| AnalysisError::csv(path, e))?;
    }
    wtr.flush().map_err(|e| AnalysisError::io(path, e))
}

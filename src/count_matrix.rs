//src/count_matrix.rs

use std::path::Path;

use ahash::{AHashMap, AHashSet};

use crate::config::AnalysisConfig;
use crate::error::AnalysisError;
use crate::table_io::{cell, line_of, open_table, Header};

/// Dense taxon-by-sample read counts. Every cell is a non-negative integer;
/// missing input cells were read as 0.
#[derive(Debug, Clone)]
pub struct CountMatrix {
    samples: Vec<String>,
    tax_ids: Vec<u32>,
    row_of: AHashMap<u32, usize>,
    /// Row-major, `tax_ids.len() * samples.len()` cells.
    counts: Vec<u64>,
}

impl CountMatrix {
    pub fn new(samples: Vec<String>, rows: Vec<(u32, Vec<u64>)>) -> Result<Self, String> {
        let mut seen = AHashSet::with_capacity(samples.len());
        for s in &samples {
            if !seen.insert(s.as_str()) {
                return Err(s.clone());
            }
        }

        let mut tax_ids = Vec::with_capacity(rows.len());
        let mut row_of = AHashMap::with_capacity(rows.len());
        let mut counts = Vec::with_capacity(rows.len() * samples.len());
        for (tax_id, row) in rows {
            if row_of.insert(tax_id, tax_ids.len()).is_some() {
                return Err(tax_id.to_string());
            }
            debug_assert_eq!(row.len(), samples.len());
            tax_ids.push(tax_id);
            counts.extend(row);
        }
        Ok(CountMatrix { samples, tax_ids, row_of, counts })
    }

    pub fn samples(&self) -> &[String] {
        &self.samples
    }

    pub fn tax_ids(&self) -> &[u32] {
        &self.tax_ids
    }

    pub fn n_samples(&self) -> usize {
        self.samples.len()
    }

    pub fn n_taxa(&self) -> usize {
        self.tax_ids.len()
    }

    pub fn row(&self, row: usize) -> &[u64] {
        let n = self.samples.len();
        &self.counts[row * n..(row + 1) * n]
    }

    /// Count for a (tax id, sample column) pair; absent tax ids read as 0.
    pub fn count(&self, tax_id: u32, sample: usize) -> u64 {
        self.row_of
            .get(&tax_id)
            .map(|&r| self.row(r)[sample])
            .unwrap_or(0)
    }

    /// Column sums, one per sample.
    pub fn sample_totals(&self) -> Vec<u64> {
        let mut totals = vec![0u64; self.samples.len()];
        for r in 0..self.tax_ids.len() {
            for (t, &c) in totals.iter_mut().zip(self.row(r)) {
                *t += c;
            }
        }
        totals
    }
}

/// Parses one count cell. Integer-valued floats such as `12.0` are accepted.
fn parse_count(raw: &str) -> Result<u64, &'static str> {
    if let Ok(v) = raw.parse::<u64>() {
        return Ok(v);
    }
    match raw.parse::<f64>() {
        Ok(v) if !v.is_finite() => Err("not a finite number"),
        Ok(v) if v < 0.0 => Err("negative count"),
        Ok(v) if v.fract() != 0.0 => Err("fractional count"),
        Ok(v) => Ok(v as u64),
        Err(_) => Err("not a number"),
    }
}

/// Reads a matrix whose first column holds tax ids and whose remaining
/// columns are samples. Malformed sample headers listed in
/// `config.header_fixes` are renamed literally.
pub fn load_count_matrix<P: AsRef<Path>>(
    filepath: P,
    config: &AnalysisConfig,
) -> Result<CountMatrix, AnalysisError> {
    let path = filepath.as_ref();
    let mut reader = open_table(path)?;
    let header = Header::read(&mut reader, path)?;

    if header.len() < 2 {
        return Err(AnalysisError::Schema {
            path: path.to_path_buf(),
            column: "<sample columns>".into(),
        });
    }

    let samples: Vec<String> = header
        .names()
        .skip(1)
        .map(|name| {
            let fixed = config.fixed_header(name);
            if fixed != name {
                log::info!("Renamed malformed sample column '{}' -> '{}'", name, fixed);
            }
            fixed.to_string()
        })
        .collect();
    let id_column = header.names().next().unwrap_or("tax_id").to_string();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| AnalysisError::csv(path, e))?;
        let line = line_of(&record);
        let invalid = |column: &str, value: &str, reason: &str| AnalysisError::InvalidValue {
            path: path.to_path_buf(),
            line,
            column: column.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        };

        let raw_id = cell(&record, 0).unwrap_or("");
        let tax_id: u32 = raw_id
            .parse()
            .map_err(|_| invalid(&id_column, raw_id, "not a non-negative integer"))?;

        let mut row = Vec::with_capacity(samples.len());
        for (i, sample) in samples.iter().enumerate() {
            let value = match cell(&record, i + 1) {
                None => 0,
                Some(raw) => parse_count(raw).map_err(|reason| invalid(sample, raw, reason))?,
            };
            row.push(value);
        }
        rows.push((tax_id, row));
    }

    let matrix = CountMatrix::new(samples, rows).map_err(|key| AnalysisError::DuplicateKey {
        path: path.to_path_buf(),
        key,
    })?;

    log::info!(
        "Loaded count matrix: {} taxa x {} samples",
        matrix.n_taxa(),
        matrix.n_samples()
    );
    Ok(matrix)
}

//src/taxdb.rs

use std::cmp::Ordering;
use std::path::Path;

use ahash::AHashMap;

use crate::error::AnalysisError;
use crate::table_io::{cell, line_of, open_table, Header};
use crate::types::{TaxRank, TaxonRecord};

/// Read-only taxonomy keyed by tax id. Records are kept in canonical rank
/// order (Kingdom first, Strain last); `index` maps tax id -> position.
#[derive(Debug, Default)]
pub struct Taxonomy {
    records: Vec<TaxonRecord>,
    index: AHashMap<u32, usize>,
}

impl Taxonomy {
    /// Builds the container from unsorted records. Duplicate ids are rejected.
    pub fn from_records(mut records: Vec<TaxonRecord>) -> Result<Self, String> {
        records.sort_by(compare_by_rank);

        let mut index = AHashMap::with_capacity(records.len());
        for (pos, rec) in records.iter().enumerate() {
            if index.insert(rec.tax_id, pos).is_some() {
                return Err(rec.tax_id.to_string());
            }
        }
        Ok(Taxonomy { records, index })
    }

    pub fn get(&self, tax_id: u32) -> Option<&TaxonRecord> {
        self.position(tax_id).map(|pos| &self.records[pos])
    }

    pub fn position(&self, tax_id: u32) -> Option<usize> {
        self.index.get(&tax_id).copied()
    }

    pub fn record(&self, pos: usize) -> &TaxonRecord {
        &self.records[pos]
    }

    pub fn records(&self) -> &[TaxonRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Lexicographic over Kingdom..Strain; absent ranks sort after present ones,
/// tax id breaks ties.
fn compare_by_rank(a: &TaxonRecord, b: &TaxonRecord) -> Ordering {
    for rank in TaxRank::ALL {
        let ord = match (a.rank(rank), b.rank(rank)) {
            (Some(x), Some(y)) => x.cmp(y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.tax_id.cmp(&b.tax_id)
}

/// Parses a taxon table with columns
/// ```text
/// tax_id  superkingdom  phylum  class  order  family  genus  species  name
/// ```
/// and renames the rank columns to Kingdom..Species, with `name` as Strain.
/// Blank or `NA` ranks stay unclassified (`None`).
pub fn parse_taxonomy<P: AsRef<Path>>(filepath: P) -> Result<Taxonomy, AnalysisError> {
    let path = filepath.as_ref();
    let mut reader = open_table(path)?;
    let header = Header::read(&mut reader, path)?;

    let id_col = header.require("tax_id")?;
    let mut rank_cols = [0usize; 8];
    for rank in TaxRank::ALL {
        rank_cols[rank.index()] = header.require(rank.source_column())?;
    }

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row.map_err(|e| AnalysisError::csv(path, e))?;
        let raw_id = cell(&row, id_col).unwrap_or("");
        let tax_id: u32 = raw_id.parse().map_err(|_| AnalysisError::InvalidValue {
            path: path.to_path_buf(),
            line: line_of(&row),
            column: "tax_id".into(),
            value: raw_id.to_string(),
            reason: "not a non-negative integer".into(),
        })?;

        let ranks = rank_cols.map(|col| cell(&row, col).map(str::to_string));
        records.push(TaxonRecord { tax_id, ranks });
    }

    let taxonomy = Taxonomy::from_records(records).map_err(|key| AnalysisError::DuplicateKey {
        path: path.to_path_buf(),
        key,
    })?;

    log::info!(
        "Loaded taxonomy with {} taxa from {}",
        taxonomy.len(),
        path.display()
    );
    Ok(taxonomy)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "tax_id\tsuperkingdom\tphylum\tclass\torder\tfamily\tgenus\tspecies\tname\n";

    fn write(dir: &tempfile::TempDir, body: &str) -> std::path::PathBuf {
        let path = dir.path().join("taxonomy.tsv");
        std::fs::write(&path, format!("{HEADER}{body}")).unwrap();
        path
    }

    #[test]
    fn renames_and_sorts_by_rank() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "10\tViruses\tUroviricota\tCaudoviricetes\tNA\tNA\tNA\tphage X\tphage X str. 1\n\
             20\tBacteria\tBacillota\tBacilli\tLactobacillales\tStreptococcaceae\tStreptococcus\tS. mitis\tS. mitis B6\n\
             30\tViruses\tCressdnaviricota\t\t\t\t\t\tunclassified virus\n",
        );
        let tax = parse_taxonomy(&path).unwrap();

        let order: Vec<u32> = tax.records().iter().map(|r| r.tax_id).collect();
        assert_eq!(order, vec![20, 30, 10]);

        let phage = tax.get(10).unwrap();
        assert_eq!(phage.rank(TaxRank::Kingdom), Some("Viruses"));
        assert_eq!(phage.rank(TaxRank::Order), None);
        assert_eq!(phage.rank(TaxRank::Strain), Some("phage X str. 1"));
        assert_eq!(tax.get(30).unwrap().rank(TaxRank::Class), None);
        assert!(tax.get(99).is_none());
    }

    #[test]
    fn absent_ranks_sort_last() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "2\tNA\tNA\tNA\tNA\tNA\tNA\tNA\troot\n\
             1\tViruses\tNA\tNA\tNA\tNA\tNA\tNA\tvirus\n",
        );
        let tax = parse_taxonomy(&path).unwrap();
        assert_eq!(tax.record(0).tax_id, 1);
        assert_eq!(tax.position(2), Some(1));
    }

    #[test]
    fn duplicate_tax_id_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "5\tViruses\tNA\tNA\tNA\tNA\tNA\tNA\ta\n5\tViruses\tNA\tNA\tNA\tNA\tNA\tNA\tb\n",
        );
        assert!(matches!(
            parse_taxonomy(&path),
            Err(AnalysisError::DuplicateKey { .. })
        ));
    }

    #[test]
    fn missing_rank_column_is_schema_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("taxonomy.tsv");
        std::fs::write(&path, "tax_id\tsuperkingdom\n1\tViruses\n").unwrap();
        match parse_taxonomy(&path) {
            Err(AnalysisError::Schema { column, .. }) => assert_eq!(column, "phylum"),
            other => panic!("expected schema error, got {other:?}"),
        }
    }
}

//src/types.rs

use chrono::NaiveDate;
use std::fmt;

/// Canonical taxonomic ranks, in row-sort order. Strain is the display
/// name column appended after the standard ranks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TaxRank {
    Kingdom,
    Phylum,
    Class,
    Order,
    Family,
    Genus,
    Species,
    Strain,
}

impl TaxRank {
    pub const ALL: [TaxRank; 8] = [
        TaxRank::Kingdom,
        TaxRank::Phylum,
        TaxRank::Class,
        TaxRank::Order,
        TaxRank::Family,
        TaxRank::Genus,
        TaxRank::Species,
        TaxRank::Strain,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }

    /// Column name used by the upstream classifier's taxon table.
    pub const fn source_column(self) -> &'static str {
        match self {
            TaxRank::Kingdom => "superkingdom",
            TaxRank::Phylum => "phylum",
            TaxRank::Class => "class",
            TaxRank::Order => "order",
            TaxRank::Family => "family",
            TaxRank::Genus => "genus",
            TaxRank::Species => "species",
            TaxRank::Strain => "name",
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            TaxRank::Kingdom => "Kingdom",
            TaxRank::Phylum => "Phylum",
            TaxRank::Class => "Class",
            TaxRank::Order => "Order",
            TaxRank::Family => "Family",
            TaxRank::Genus => "Genus",
            TaxRank::Species => "Species",
            TaxRank::Strain => "Strain",
        }
    }
}

impl fmt::Display for TaxRank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One row of the taxonomy. Absent ranks stay `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaxonRecord {
    pub tax_id: u32,
    pub ranks: [Option<String>; 8],
}

impl TaxonRecord {
    pub fn rank(&self, rank: TaxRank) -> Option<&str> {
        self.ranks[rank.index()].as_deref()
    }

    /// Most specific available label, falling back to the tax id.
    pub fn label(&self) -> String {
        self.rank(TaxRank::Strain)
            .or_else(|| self.rank(TaxRank::Species))
            .or_else(|| self.rank(TaxRank::Genus))
            .map(str::to_string)
            .unwrap_or_else(|| format!("taxid:{}", self.tax_id))
    }
}

/// A fully reconciled sample. Metadata fields are `None` when the
/// corresponding join did not match; the matching diagnostic says why.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleRecord {
    /// Raw column name from the count matrix.
    pub sample: String,
    pub deriving_sample_id: Option<String>,
    pub subject: Option<String>,
    pub sample_type: Option<String>,
    pub sample_no: Option<String>,
    pub extraction_no: Option<String>,
    pub library_method: Option<String>,
    pub timepoint: Option<NaiveDate>,
    pub location: Option<String>,
    pub study_group: Option<String>,
    pub reads_total: Option<u64>,
    pub reads_mapped: Option<u64>,
    pub reference_db: Option<String>,
}

impl SampleRecord {
    pub fn unresolved(sample: &str) -> Self {
        SampleRecord {
            sample: sample.to_string(),
            deriving_sample_id: None,
            subject: None,
            sample_type: None,
            sample_no: None,
            extraction_no: None,
            library_method: None,
            timepoint: None,
            location: None,
            study_group: None,
            reads_total: None,
            reads_mapped: None,
            reference_db: None,
        }
    }

    pub fn dimension(&self, dim: Dimension) -> Option<&str> {
        match dim {
            Dimension::Subject => self.subject.as_deref(),
            Dimension::SampleType => self.sample_type.as_deref(),
            Dimension::LibraryMethod => self.library_method.as_deref(),
            Dimension::StudyGroup => self.study_group.as_deref(),
            Dimension::Location => self.location.as_deref(),
            Dimension::Sample => Some(self.sample.as_str()),
        }
    }
}

/// Metadata axes that abundance can be grouped over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dimension {
    Sample,
    Subject,
    SampleType,
    LibraryMethod,
    StudyGroup,
    Location,
}

impl Dimension {
    pub const fn name(self) -> &'static str {
        match self {
            Dimension::Sample => "Sample",
            Dimension::Subject => "Subject",
            Dimension::SampleType => "SampleType",
            Dimension::LibraryMethod => "LibraryMethod",
            Dimension::StudyGroup => "StudyGroup",
            Dimension::Location => "Location",
        }
    }
}

/// One long-format row: a (taxon, sample) cell joined with both sides.
/// `taxon` and `sample` index into the owning table's taxonomy and sample
/// lists; `taxon` is `None` when the tax id is absent from the taxonomy.
#[derive(Debug, Clone, PartialEq)]
pub struct AbundanceRecord {
    pub tax_id: u32,
    pub taxon: Option<usize>,
    pub sample: usize,
    pub count: u64,
    pub relative_frequency: f64,
}

// ========================================================================================
//
//                        The genotype dataset and its narrowed form
//
// ========================================================================================
//
// A genotype dataset is a variant-by-sample matrix stored sparsely: a sample only has an
// entry at a site when it carries something other than the reference genotype, or when
// its call is explicitly missing. The storage engine itself is a collaborator behind the
// `VariantDataset` trait; all it must do is list its samples and return the rows that
// fall inside a set of intervals.

use crate::intervals::IntervalIndex;
use crate::types::{ExplicitCall, GenotypeEntry, Locus, SampleIndex};
use ahash::AHashSet;
use rayon::prelude::*;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("I/O error while reading genotype data: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed genotype record on line {line}: {details}")]
    Parse { line: u64, details: String },
    #[error("Invalid genotype file header: {0}")]
    Header(String),
    #[error("Site {locus} references sample index {index}, but the dataset has {n_samples} samples.")]
    SampleIndexOutOfRange {
        locus: Locus,
        index: u32,
        n_samples: usize,
    },
    #[error("Site {locus} has more than one entry for sample '{sample_id}'.")]
    DuplicateSampleEntry { locus: Locus, sample_id: String },
}

/// One site as the storage engine holds it: the allele list (reference first) and the
/// explicit entries only.
#[derive(Debug, Clone, PartialEq)]
pub struct VariantRow {
    pub locus: Locus,
    /// Upper-cased alleles; index 0 is the reference allele.
    pub alleles: Vec<String>,
    pub calls: Vec<(SampleIndex, ExplicitCall)>,
}

/// The genomic matrix storage and query engine.
pub trait VariantDataset: Sync {
    /// Every sample in the cohort, in dataset order.
    fn sample_ids(&self) -> &[String];

    /// Whether the dataset knows the canonical contig at all.
    fn has_contig(&self, contig: &str) -> bool;

    /// Returns, in dataset order, every row whose locus lies inside the index.
    fn filter_intervals(&self, index: &IntervalIndex) -> Result<Vec<VariantRow>, DatasetError>;
}

// ========================================================================================
//                               In-memory sparse dataset
// ========================================================================================

#[derive(Debug, Clone, Default)]
pub struct SparseVariantDataset {
    sample_ids: Vec<String>,
    contigs: AHashSet<String>,
    rows: Vec<VariantRow>,
}

impl SparseVariantDataset {
    /// Builds a dataset, rejecting rows that reference unknown samples or list a
    /// sample twice.
    pub fn new(sample_ids: Vec<String>, rows: Vec<VariantRow>) -> Result<Self, DatasetError> {
        for row in &rows {
            check_row(row, &sample_ids)?;
        }
        let contigs = rows.iter().map(|row| row.locus.contig.clone()).collect();
        Ok(Self {
            sample_ids,
            contigs,
            rows,
        })
    }

    /// Registers contigs the dataset covers even if it holds no rows on them.
    pub fn with_declared_contigs<I, S>(mut self, contigs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.contigs.extend(
            contigs
                .into_iter()
                .map(|c| crate::types::canonical_contig(c.as_ref())),
        );
        self
    }

    pub fn rows(&self) -> &[VariantRow] {
        &self.rows
    }
}

impl VariantDataset for SparseVariantDataset {
    fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    fn has_contig(&self, contig: &str) -> bool {
        self.contigs.contains(contig)
    }

    fn filter_intervals(&self, index: &IntervalIndex) -> Result<Vec<VariantRow>, DatasetError> {
        Ok(self
            .rows
            .par_iter()
            .filter(|row| index.contains(&row.locus))
            .cloned()
            .collect())
    }
}

fn check_row(row: &VariantRow, sample_ids: &[String]) -> Result<(), DatasetError> {
    let mut seen = vec![false; sample_ids.len()];
    for &(SampleIndex(index), _) in &row.calls {
        let slot = seen
            .get_mut(index as usize)
            .ok_or_else(|| DatasetError::SampleIndexOutOfRange {
                locus: row.locus.clone(),
                index,
                n_samples: sample_ids.len(),
            })?;
        if *slot {
            return Err(DatasetError::DuplicateSampleEntry {
                locus: row.locus.clone(),
                sample_id: sample_ids[index as usize].clone(),
            });
        }
        *slot = true;
    }
    Ok(())
}

// ========================================================================================
//                                  Narrowed dataset
// ========================================================================================

/// A site after reduction: every sample has an entry, with absent samples
/// materialized as `AbsentImpliesRef`.
#[derive(Debug, Clone, PartialEq)]
pub struct NarrowedRow {
    pub locus: Locus,
    pub alleles: Vec<String>,
    /// Indexed by `SampleIndex`.
    pub entries: Vec<GenotypeEntry>,
}

impl NarrowedRow {
    pub fn materialize(row: VariantRow, sample_ids: &[String]) -> Result<Self, DatasetError> {
        check_row(&row, sample_ids)?;
        let mut entries = vec![GenotypeEntry::AbsentImpliesRef; sample_ids.len()];
        for (SampleIndex(index), call) in row.calls {
            entries[index as usize] = call.into();
        }
        Ok(Self {
            locus: row.locus,
            alleles: row.alleles,
            entries,
        })
    }

    /// Number of explicit, fully-called entries.
    pub fn n_called(&self) -> usize {
        self.entries.iter().filter(|e| e.is_called()).count()
    }

    /// Number of explicit, uncalled entries.
    pub fn n_missing(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e, GenotypeEntry::Missing))
            .count()
    }

    pub fn has_allele(&self, allele: &str) -> bool {
        self.alleles.iter().any(|a| a.eq_ignore_ascii_case(allele))
    }
}

/// The subset of a dataset relevant to one score. The sample set and its order are
/// exactly those of the source dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct NarrowedDataset {
    sample_ids: Vec<String>,
    rows: Vec<NarrowedRow>,
}

impl NarrowedDataset {
    pub fn new(sample_ids: Vec<String>, rows: Vec<NarrowedRow>) -> Self {
        Self { sample_ids, rows }
    }

    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    pub fn n_samples(&self) -> usize {
        self.sample_ids.len()
    }

    pub fn rows(&self) -> &[NarrowedRow] {
        &self.rows
    }
}

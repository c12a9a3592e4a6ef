// ========================================================================================
//                             High-Level Data Contracts
// ========================================================================================

// Loci, genotype entries and per-sample results. Everything here crosses at least two of
// the loader, reducer, policy, engine and exporter.

use std::fmt;

/// A genomic coordinate used as the join key between the weight table and the
/// genotype dataset.
///
/// The contig is always stored in canonical form (see [`canonical_contig`]) so
/// that `chr1:1000` and `1:1000` refer to the same locus.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Locus {
    pub contig: String,
    pub position: u32,
}

impl Locus {
    /// Builds a locus from a raw contig label, normalizing the label.
    pub fn new(contig: &str, position: u32) -> Self {
        Self {
            contig: canonical_contig(contig),
            position,
        }
    }
}

impl fmt::Display for Locus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chr{}:{}", self.contig, self.position)
    }
}

/// Normalizes a chromosome label to the canonical form used for joining.
///
/// A leading `chr` prefix is stripped case-insensitively, sex chromosomes are
/// upper-cased and both `M` and `MT` map to `MT`. Any other label (e.g. alt or
/// decoy contigs) is kept verbatim after the prefix is removed.
pub fn canonical_contig(label: &str) -> String {
    let mut trimmed = label.trim();

    if trimmed
        .get(..3)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("chr"))
    {
        trimmed = &trimmed[3..];
    }

    if trimmed.eq_ignore_ascii_case("X") {
        return "X".to_string();
    }
    if trimmed.eq_ignore_ascii_case("Y") {
        return "Y".to_string();
    }
    if trimmed.eq_ignore_ascii_case("M") || trimmed.eq_ignore_ascii_case("MT") {
        return "MT".to_string();
    }

    // Strip leading zeros from purely numeric labels ("chr01" -> "1").
    if !trimmed.is_empty() && trimmed.bytes().all(|b| b.is_ascii_digit()) {
        let stripped = trimmed.trim_start_matches('0');
        return if stripped.is_empty() {
            "0".to_string()
        } else {
            stripped.to_string()
        };
    }

    trimmed.to_string()
}

// ========================================================================================
//                            Genotype representation
// ========================================================================================

/// A fully-called genotype, expressed as indices into the site's allele list
/// (index 0 is the reference allele).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Genotype {
    indices: [u16; 2],
    ploidy: u8,
}

impl Genotype {
    #[inline]
    pub fn haploid(allele: u16) -> Self {
        Self {
            indices: [allele, 0],
            ploidy: 1,
        }
    }

    #[inline]
    pub fn diploid(first: u16, second: u16) -> Self {
        Self {
            indices: [first, second],
            ploidy: 2,
        }
    }

    /// The called allele indices, one per chromosome copy.
    #[inline]
    pub fn indices(&self) -> &[u16] {
        &self.indices[..self.ploidy as usize]
    }
}

/// What the storage engine holds for a (sample, locus) pair it has a record for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExplicitCall {
    /// A fully-called genotype.
    Called(Genotype),
    /// The record exists but the genotype is uncalled or failed quality control.
    Missing,
}

/// The three-valued entry for a (sample, locus) pair after interval reduction.
///
/// `Missing` and `AbsentImpliesRef` are deliberately distinct: the former is a
/// true missing genotype, the latter is the sparse-storage convention where a
/// sample without a record carries the reference genotype.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenotypeEntry {
    Called(Genotype),
    Missing,
    AbsentImpliesRef,
}

impl From<ExplicitCall> for GenotypeEntry {
    fn from(call: ExplicitCall) -> Self {
        match call {
            ExplicitCall::Called(genotype) => GenotypeEntry::Called(genotype),
            ExplicitCall::Missing => GenotypeEntry::Missing,
        }
    }
}

impl GenotypeEntry {
    /// True for entries the storage engine explicitly recorded as a called genotype.
    #[inline]
    pub fn is_called(&self) -> bool {
        matches!(self, GenotypeEntry::Called(_))
    }
}

// ========================================================================================
//                              Scoring contracts
// ========================================================================================

/// Why an effect allele count could not be determined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UndefinedReason {
    /// The sample has an explicit but uncalled genotype at the locus.
    MissingCall,
    /// A called allele matches neither the effect nor the non-effect allele.
    UnreconciledAllele { allele: String },
    /// A called allele index does not exist in the site's allele list.
    AlleleIndexOutOfRange { index: u16 },
    /// Several sites at the locus hold explicit entries for the sample that disagree.
    ConflictingEntries,
}

/// The number of effect alleles a sample carries at a weighted locus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EffectAlleleCount {
    Counted(u8),
    Undefined(UndefinedReason),
}

impl EffectAlleleCount {
    #[inline]
    pub fn value(&self) -> Option<u8> {
        match self {
            EffectAlleleCount::Counted(count) => Some(*count),
            EffectAlleleCount::Undefined(_) => None,
        }
    }
}

/// The final per-sample result of a scoring run.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleScore {
    pub sample_id: String,
    /// Σ weight × effect allele count over variants with a defined count.
    pub sum_weights: f64,
    /// The number of variants with a defined count for this sample.
    pub n_variants: u32,
}

// ========================================================================================
//                            Primitive Type Definitions
// ========================================================================================

/// An index into the dataset's sample list.
///
/// This newtype prevents confusion between different index spaces at compile time.
/// The `#[repr(transparent)]` attribute guarantees this is a zero-cost abstraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct SampleIndex(pub u32);

/// An index into the rows of the loaded weight table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct WeightRowIndex(pub usize);

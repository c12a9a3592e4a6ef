// ========================================================================================
//
//                              The locus join and scoring
//
// ========================================================================================
//
// Scoring happens in two steps. First every weight row is bound to the sites of the
// narrowed dataset at its locus; this is the only place duplicate and mismatched sites
// are resolved, so a weight is applied at most once per sample. Then the bound pairs are scored in
// fixed-size chunks on the rayon pool and the per-chunk partial sums are merged in chunk
// order, which makes the floating-point result independent of scheduling.

use crate::dataset::{NarrowedDataset, NarrowedRow};
use crate::policy::AlleleCountPolicy;
use crate::types::{EffectAlleleCount, Locus, SampleScore, UndefinedReason, WeightRowIndex};
use crate::weights::{VariantWeight, WeightTable};
use ahash::AHashMap;
use log::debug;
use rayon::prelude::*;
use std::fmt;

/// Bound pairs per parallel work unit.
pub const DEFAULT_CHUNK_SIZE: usize = 64;
/// Chunks in flight before their partials are folded into the running total.
const CHUNKS_PER_WAVE: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AmbiguityKind {
    /// Samples carried an allele that is neither the effect nor the non-effect allele.
    UnreconciledAllele,
    /// Samples carried an allele index the site does not define.
    AlleleIndexOutOfRange,
    /// More than one site at the locus carried the weight row's alleles.
    DuplicateSite,
    /// The locus is present, but no site there carries either allele.
    AlleleMismatch,
}

impl fmt::Display for AmbiguityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            AmbiguityKind::UnreconciledAllele => "unreconciled allele",
            AmbiguityKind::AlleleIndexOutOfRange => "allele index out of range",
            AmbiguityKind::DuplicateSite => "duplicate site",
            AmbiguityKind::AlleleMismatch => "allele mismatch",
        };
        f.write_str(text)
    }
}

/// A non-fatal join problem, aggregated per weight row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinAmbiguityWarning {
    pub variant_id: String,
    pub locus: Locus,
    pub kind: AmbiguityKind,
    pub affected_samples: usize,
    pub example_allele: Option<String>,
}

impl fmt::Display for JoinAmbiguityWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} at {}: {} ({} samples affected",
            self.variant_id, self.locus, self.kind, self.affected_samples
        )?;
        if let Some(allele) = &self.example_allele {
            write!(f, ", e.g. allele '{allele}'")?;
        }
        write!(f, ")")
    }
}

// ========================================================================================
//                                     Binding
// ========================================================================================

/// How well a site's alleles cover a weight row. Ordered from worst to best.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AlleleMatch {
    Neither,
    NonEffect,
    Effect,
}

impl AlleleMatch {
    pub fn of(site: &NarrowedRow, weight: &VariantWeight) -> Self {
        if site.has_allele(&weight.effect_allele) {
            AlleleMatch::Effect
        } else if site.has_allele(&weight.noneffect_allele) {
            AlleleMatch::NonEffect
        } else {
            AlleleMatch::Neither
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AlleleMatch::Neither => "neither",
            AlleleMatch::NonEffect => "noneffect",
            AlleleMatch::Effect => "effect",
        }
    }
}

/// A weight row paired with the sites it is scored against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub weight_row: WeightRowIndex,
    /// Indices into `NarrowedDataset::rows`, first in dataset order first. More than one
    /// only when equally matching duplicate records share the locus.
    pub sites: Vec<usize>,
    pub allele_match: AlleleMatch,
}

#[derive(Debug, Default)]
pub struct SiteBindings {
    pub bindings: Vec<Binding>,
    pub warnings: Vec<JoinAmbiguityWarning>,
    /// Weight rows whose locus has no site in the dataset.
    pub unbound: usize,
}

/// Groups the narrowed sites by locus, keeping only loci that carry a weight row.
pub fn weighted_sites<'a>(
    weights: &WeightTable,
    narrowed: &'a NarrowedDataset,
) -> AHashMap<&'a Locus, Vec<usize>> {
    let mut sites_by_locus: AHashMap<&Locus, Vec<usize>> = AHashMap::new();
    let mut unweighted_sites = 0usize;
    for (site, row) in narrowed.rows().iter().enumerate() {
        if weights.rows_at(&row.locus).is_empty() {
            unweighted_sites += 1;
            continue;
        }
        sites_by_locus.entry(&row.locus).or_default().push(site);
    }
    if unweighted_sites > 0 {
        debug!("{unweighted_sites} narrowed sites carry no weight row and are not scored.");
    }
    sites_by_locus
}

/// Pairs each weight row with the sites at its locus that best carry its alleles.
///
/// A site carrying the effect allele outranks one carrying only the non-effect allele.
/// Equally ranked sites are all kept and their entries pooled by the counting policy;
/// they are reported as `DuplicateSite`. If the locus is present but no site carries
/// either allele, the row is reported as `AlleleMismatch` and still bound to the first
/// site, so absent samples count as hom-ref and called samples become undefined.
pub fn bind_sites(weights: &WeightTable, narrowed: &NarrowedDataset) -> SiteBindings {
    let sites_by_locus = weighted_sites(weights, narrowed);
    let rows = narrowed.rows();
    let mut result = SiteBindings::default();

    for (i, weight) in weights.rows().iter().enumerate() {
        let Some(candidates) = sites_by_locus.get(&weight.locus) else {
            result.unbound += 1;
            continue;
        };

        let best = candidates
            .iter()
            .map(|&s| AlleleMatch::of(&rows[s], weight))
            .max()
            .unwrap_or(AlleleMatch::Neither);

        let sites: Vec<usize> = if best == AlleleMatch::Neither {
            result.warnings.push(JoinAmbiguityWarning {
                variant_id: weight.variant_id.clone(),
                locus: weight.locus.clone(),
                kind: AmbiguityKind::AlleleMismatch,
                affected_samples: candidates.iter().map(|&s| rows[s].n_called()).sum(),
                example_allele: candidates.first().map(|&s| rows[s].alleles.join(",")),
            });
            candidates.iter().copied().take(1).collect()
        } else {
            candidates
                .iter()
                .copied()
                .filter(|&s| AlleleMatch::of(&rows[s], weight) == best)
                .collect()
        };

        if sites.len() > 1 {
            let extras = &sites[1..];
            result.warnings.push(JoinAmbiguityWarning {
                variant_id: weight.variant_id.clone(),
                locus: weight.locus.clone(),
                kind: AmbiguityKind::DuplicateSite,
                affected_samples: extras.iter().map(|&s| rows[s].n_called()).sum(),
                example_allele: extras.first().map(|&s| rows[s].alleles.join(",")),
            });
        }

        if sites.is_empty() {
            result.unbound += 1;
            continue;
        }
        result.bindings.push(Binding {
            weight_row: WeightRowIndex(i),
            sites,
            allele_match: best,
        });
    }

    result
}

// ========================================================================================
//                                     Scoring
// ========================================================================================

/// The result of a scoring pass.
#[derive(Debug)]
pub struct ScoringOutcome {
    /// One entry per sample, in dataset order.
    pub scores: Vec<SampleScore>,
    pub warnings: Vec<JoinAmbiguityWarning>,
    pub bound: usize,
    pub unbound: usize,
}

/// Per-sample partial sums over one contiguous run of bindings.
struct ScoreAccumulator {
    sums: Vec<f64>,
    counts: Vec<u32>,
    warnings: Vec<JoinAmbiguityWarning>,
}

impl ScoreAccumulator {
    fn new(n_samples: usize) -> Self {
        Self {
            sums: vec![0.0; n_samples],
            counts: vec![0; n_samples],
            warnings: Vec::new(),
        }
    }

    fn merge(&mut self, other: ScoreAccumulator) {
        for (total, partial) in self.sums.iter_mut().zip(other.sums) {
            *total += partial;
        }
        for (total, partial) in self.counts.iter_mut().zip(other.counts) {
            *total += partial;
        }
        self.warnings.extend(other.warnings);
    }
}

/// Tally of one undefined-count kind across the samples of a single binding.
#[derive(Default)]
struct IssueTally {
    affected: usize,
    example: Option<String>,
}

pub struct ScoringEngine {
    chunk_size: usize,
}

impl Default for ScoringEngine {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

impl ScoringEngine {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    /// Scores every sample of `narrowed` against `weights`.
    pub fn score(&self, narrowed: &NarrowedDataset, weights: &WeightTable) -> ScoringOutcome {
        let SiteBindings {
            bindings,
            warnings: binding_warnings,
            unbound,
        } = bind_sites(weights, narrowed);
        debug!(
            "Bound {} of {} weight rows to dataset sites.",
            bindings.len(),
            weights.len()
        );

        let n_samples = narrowed.n_samples();
        let mut total = ScoreAccumulator::new(n_samples);
        total.warnings = binding_warnings;

        for wave in bindings.chunks(self.chunk_size * CHUNKS_PER_WAVE) {
            let partials: Vec<ScoreAccumulator> = wave
                .par_chunks(self.chunk_size)
                .map(|chunk| score_chunk(chunk, narrowed, weights))
                .collect();
            for partial in partials {
                total.merge(partial);
            }
        }

        let scores = narrowed
            .sample_ids()
            .iter()
            .zip(total.sums)
            .zip(total.counts)
            .map(|((sample_id, sum_weights), n_variants)| SampleScore {
                sample_id: sample_id.clone(),
                sum_weights,
                n_variants,
            })
            .collect();

        ScoringOutcome {
            scores,
            warnings: total.warnings,
            bound: bindings.len(),
            unbound,
        }
    }
}

fn score_chunk(
    chunk: &[Binding],
    narrowed: &NarrowedDataset,
    weights: &WeightTable,
) -> ScoreAccumulator {
    let mut acc = ScoreAccumulator::new(narrowed.n_samples());
    let rows = narrowed.rows();

    for binding in chunk {
        let weight = weights.row(binding.weight_row);
        let policy = AlleleCountPolicy::new(weight, binding.sites.iter().map(|&s| &rows[s]));

        let mut unreconciled = IssueTally::default();
        let mut out_of_range = IssueTally::default();

        for sample in 0..narrowed.n_samples() {
            match policy.count(sample) {
                EffectAlleleCount::Counted(count) => {
                    if count > 0 {
                        acc.sums[sample] += f64::from(count) * weight.weight;
                    }
                    acc.counts[sample] += 1;
                }
                // Conflicts were reported with the binding as DuplicateSite.
                EffectAlleleCount::Undefined(
                    UndefinedReason::MissingCall | UndefinedReason::ConflictingEntries,
                ) => {}
                EffectAlleleCount::Undefined(UndefinedReason::UnreconciledAllele { allele }) => {
                    unreconciled.affected += 1;
                    unreconciled.example.get_or_insert(allele);
                }
                EffectAlleleCount::Undefined(UndefinedReason::AlleleIndexOutOfRange { index }) => {
                    out_of_range.affected += 1;
                    out_of_range.example.get_or_insert_with(|| index.to_string());
                }
            }
        }

        // A mismatched binding was already reported for every called sample.
        if binding.allele_match == AlleleMatch::Neither {
            unreconciled.affected = 0;
        }

        for (kind, tally) in [
            (AmbiguityKind::UnreconciledAllele, unreconciled),
            (AmbiguityKind::AlleleIndexOutOfRange, out_of_range),
        ] {
            if tally.affected > 0 {
                acc.warnings.push(JoinAmbiguityWarning {
                    variant_id: weight.variant_id.clone(),
                    locus: weight.locus.clone(),
                    kind,
                    affected_samples: tally.affected,
                    example_allele: tally.example,
                });
            }
        }
    }

    acc
}

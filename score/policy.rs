// ========================================================================================
//
//                         Genotype to effect-allele-count rule
//
// ========================================================================================

use crate::dataset::NarrowedRow;
use crate::types::{EffectAlleleCount, GenotypeEntry, UndefinedReason};
use crate::weights::VariantWeight;

/// What a site's allele means relative to one weight row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AlleleRole {
    Effect,
    NonEffect,
    Other,
}

/// The per-site lookup from allele index to role, built once per bound
/// (weight row, site) pair and then applied to every sample.
#[derive(Debug, Clone)]
pub struct AlleleRoles {
    roles: Vec<AlleleRole>,
    alleles: Vec<String>,
}

impl AlleleRoles {
    pub fn new(alleles: &[String], weight: &VariantWeight) -> Self {
        let roles = alleles
            .iter()
            .map(|allele| {
                if allele.eq_ignore_ascii_case(&weight.effect_allele) {
                    AlleleRole::Effect
                } else if allele.eq_ignore_ascii_case(&weight.noneffect_allele) {
                    AlleleRole::NonEffect
                } else {
                    AlleleRole::Other
                }
            })
            .collect();
        Self {
            roles,
            alleles: alleles.to_vec(),
        }
    }

    /// Applies the counting rule to one sample's entry.
    pub fn count(&self, entry: &GenotypeEntry) -> EffectAlleleCount {
        let genotype = match entry {
            // Absence is hom-ref by convention, whatever the reference allele is.
            GenotypeEntry::AbsentImpliesRef => return EffectAlleleCount::Counted(0),
            GenotypeEntry::Missing => {
                return EffectAlleleCount::Undefined(UndefinedReason::MissingCall);
            }
            GenotypeEntry::Called(genotype) => genotype,
        };

        let mut count = 0u8;
        for &index in genotype.indices() {
            match self.roles.get(index as usize) {
                Some(AlleleRole::Effect) => count += 1,
                Some(AlleleRole::NonEffect) => {}
                Some(AlleleRole::Other) => {
                    return EffectAlleleCount::Undefined(UndefinedReason::UnreconciledAllele {
                        allele: self.alleles[index as usize].clone(),
                    });
                }
                None => {
                    return EffectAlleleCount::Undefined(
                        UndefinedReason::AlleleIndexOutOfRange { index },
                    );
                }
            }
        }
        EffectAlleleCount::Counted(count)
    }
}

/// The counting rule for one weight row against the site or sites it is bound to.
///
/// Usually there is a single site. When several records share the locus and carry the
/// row's alleles equally well, their explicit entries are pooled: a sample recorded on
/// only one of them is counted from that record, and a sample whose records disagree
/// gets `ConflictingEntries`. A sample with no explicit entry on any of them is hom-ref.
pub struct AlleleCountPolicy<'a> {
    sites: Vec<(&'a NarrowedRow, AlleleRoles)>,
}

impl<'a> AlleleCountPolicy<'a> {
    pub fn new<I>(weight: &VariantWeight, sites: I) -> Self
    where
        I: IntoIterator<Item = &'a NarrowedRow>,
    {
        let sites = sites
            .into_iter()
            .map(|site| (site, AlleleRoles::new(&site.alleles, weight)))
            .collect();
        Self { sites }
    }

    /// The effect allele count of one sample.
    pub fn count(&self, sample: usize) -> EffectAlleleCount {
        let mut pooled: Option<EffectAlleleCount> = None;
        for (site, roles) in &self.sites {
            let entry = match site.entries.get(sample) {
                Some(GenotypeEntry::AbsentImpliesRef) | None => continue,
                Some(entry) => entry,
            };
            let count = roles.count(entry);
            match &pooled {
                None => pooled = Some(count),
                Some(previous) if *previous == count => {}
                Some(_) => {
                    return EffectAlleleCount::Undefined(UndefinedReason::ConflictingEntries);
                }
            }
        }
        pooled.unwrap_or(EffectAlleleCount::Counted(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::VariantRow;
    use crate::types::{ExplicitCall, Genotype, Locus, SampleIndex};
    use csv::StringRecord;

    fn weight(effect: &str, noneffect: &str) -> VariantWeight {
        VariantWeight {
            variant_id: "v1".to_string(),
            locus: Locus::new("1", 1000),
            effect_allele: effect.to_string(),
            noneffect_allele: noneffect.to_string(),
            weight: 0.5,
            raw: StringRecord::new(),
        }
    }

    fn alleles(list: &[&str]) -> Vec<String> {
        list.iter().map(|a| a.to_string()).collect()
    }

    fn count(entry: GenotypeEntry, site: &[&str], w: &VariantWeight) -> EffectAlleleCount {
        AlleleRoles::new(&alleles(site), w).count(&entry)
    }

    fn site(list: &[&str], n_samples: usize, calls: Vec<(u32, ExplicitCall)>) -> NarrowedRow {
        let sample_ids: Vec<String> = (0..n_samples).map(|i| format!("S{i}")).collect();
        NarrowedRow::materialize(
            VariantRow {
                locus: Locus::new("1", 1000),
                alleles: alleles(list),
                calls: calls.into_iter().map(|(i, c)| (SampleIndex(i), c)).collect(),
            },
            &sample_ids,
        )
        .unwrap()
    }

    #[test]
    fn called_genotypes_count_effect_alleles() {
        let w = weight("G", "A");
        let site = ["A", "G"];
        let called = |a, b| GenotypeEntry::Called(Genotype::diploid(a, b));
        assert_eq!(count(called(0, 0), &site, &w), EffectAlleleCount::Counted(0));
        assert_eq!(count(called(0, 1), &site, &w), EffectAlleleCount::Counted(1));
        assert_eq!(count(called(1, 1), &site, &w), EffectAlleleCount::Counted(2));
        assert_eq!(
            count(GenotypeEntry::Called(Genotype::haploid(1)), &site, &w),
            EffectAlleleCount::Counted(1)
        );
    }

    #[test]
    fn effect_allele_on_reference_counts_reference_copies() {
        let w = weight("A", "G");
        let entry = GenotypeEntry::Called(Genotype::diploid(0, 0));
        assert_eq!(count(entry, &["A", "G"], &w), EffectAlleleCount::Counted(2));
    }

    #[test]
    fn absent_is_zero_even_when_effect_is_reference() {
        let w = weight("A", "G");
        assert_eq!(
            count(GenotypeEntry::AbsentImpliesRef, &["A", "G"], &w),
            EffectAlleleCount::Counted(0)
        );
    }

    #[test]
    fn missing_is_undefined_not_zero() {
        let w = weight("G", "A");
        let result = count(GenotypeEntry::Missing, &["A", "G"], &w);
        assert_eq!(
            result,
            EffectAlleleCount::Undefined(UndefinedReason::MissingCall)
        );
        assert_eq!(result.value(), None);
    }

    #[test]
    fn allele_comparison_ignores_case() {
        let w = weight("G", "A");
        let entry = GenotypeEntry::Called(Genotype::diploid(1, 1));
        assert_eq!(count(entry, &["a", "g"], &w), EffectAlleleCount::Counted(2));
    }

    #[test]
    fn unreconciled_allele_is_undefined() {
        let w = weight("G", "A");
        let entry = GenotypeEntry::Called(Genotype::diploid(1, 2));
        assert_eq!(
            count(entry, &["A", "G", "T"], &w),
            EffectAlleleCount::Undefined(UndefinedReason::UnreconciledAllele {
                allele: "T".to_string()
            })
        );
    }

    #[test]
    fn out_of_range_index_is_undefined() {
        let w = weight("G", "A");
        let entry = GenotypeEntry::Called(Genotype::diploid(0, 3));
        assert_eq!(
            count(entry, &["A", "G"], &w),
            EffectAlleleCount::Undefined(UndefinedReason::AlleleIndexOutOfRange { index: 3 })
        );
    }

    #[test]
    fn single_site_applies_the_entry_rule_per_sample() {
        let w = weight("G", "A");
        let only = site(
            &["A", "G"],
            3,
            vec![(0, ExplicitCall::Called(Genotype::diploid(1, 1))), (2, ExplicitCall::Missing)],
        );
        let policy = AlleleCountPolicy::new(&w, [&only]);
        assert_eq!(policy.count(0), EffectAlleleCount::Counted(2));
        assert_eq!(policy.count(1), EffectAlleleCount::Counted(0));
        assert_eq!(
            policy.count(2),
            EffectAlleleCount::Undefined(UndefinedReason::MissingCall)
        );
    }

    #[test]
    fn pooled_sites_use_whichever_record_holds_the_sample() {
        let w = weight("G", "A");
        let het = ExplicitCall::Called(Genotype::diploid(0, 1));
        let first = site(&["A", "G"], 3, vec![(0, het)]);
        // Allele order differs on the second record: index 0 is the effect allele here.
        let second = site(&["G", "A"], 3, vec![(0, het), (1, het)]);
        let policy = AlleleCountPolicy::new(&w, [&first, &second]);

        assert_eq!(policy.count(0), EffectAlleleCount::Counted(1));
        assert_eq!(policy.count(1), EffectAlleleCount::Counted(1));
        assert_eq!(policy.count(2), EffectAlleleCount::Counted(0));
    }

    #[test]
    fn disagreeing_records_make_the_count_undefined() {
        let w = weight("G", "A");
        let first = site(&["A", "G"], 2, vec![(0, ExplicitCall::Called(Genotype::diploid(1, 1)))]);
        let second = site(&["A", "G"], 2, vec![(0, ExplicitCall::Missing)]);
        let policy = AlleleCountPolicy::new(&w, [&first, &second]);
        assert_eq!(
            policy.count(0),
            EffectAlleleCount::Undefined(UndefinedReason::ConflictingEntries)
        );
        assert_eq!(policy.count(1), EffectAlleleCount::Counted(0));
    }
}

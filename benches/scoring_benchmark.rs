// ========================================================================================
//
//                        Scoring engine throughput benchmark
//
// ========================================================================================
//
// Measures the locus join and per-sample aggregation across a range of carrier
// frequencies. Sparse storage means the fraction of explicit entries per site drives
// both the reduction cost and the share of entries that are absent-implies-ref.
//
// ========================================================================================

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sparse_prs::dataset::{NarrowedDataset, NarrowedRow, VariantRow};
use sparse_prs::engine::ScoringEngine;
use sparse_prs::reference::ReferenceGenome;
use sparse_prs::types::{ExplicitCall, Genotype, Locus, SampleIndex};
use sparse_prs::weights::WeightTable;

// --- Benchmark Tuning Parameters ---

/// The number of individuals in the simulated cohort.
const NUM_SAMPLES: usize = 20_000;
/// The number of weighted variants, each observed at its own site.
const NUM_VARIANTS: usize = 2_000;
/// Fractions of samples with an explicit entry at each site.
const CARRIER_FREQUENCIES: [f64; 5] = [0.001, 0.01, 0.05, 0.1, 0.3];
/// Fraction of explicit entries that are uncalled.
const MISSING_RATE: f64 = 0.02;

fn build_weights(rng: &mut StdRng) -> WeightTable {
    let mut content =
        String::from("variant_id,weight,contig,position,effect_allele,noneffect_allele\n");
    for i in 0..NUM_VARIANTS {
        let weight: f64 = rng.gen_range(-0.05..0.05);
        content.push_str(&format!("v{i},{weight},1,{},G,A\n", 10_000 + i * 100));
    }
    WeightTable::load(content.as_bytes(), ReferenceGenome::Grch38)
        .expect("synthetic weight table is valid")
}

fn build_dataset(rng: &mut StdRng, carrier_frequency: f64) -> NarrowedDataset {
    let sample_ids: Vec<String> = (0..NUM_SAMPLES).map(|i| format!("S{i}")).collect();
    let rows = (0..NUM_VARIANTS)
        .map(|i| {
            let calls = (0..NUM_SAMPLES as u32)
                .filter_map(|s| {
                    if !rng.gen_bool(carrier_frequency) {
                        return None;
                    }
                    let call = if rng.gen_bool(MISSING_RATE) {
                        ExplicitCall::Missing
                    } else if rng.gen_bool(0.8) {
                        ExplicitCall::Called(Genotype::diploid(0, 1))
                    } else {
                        ExplicitCall::Called(Genotype::diploid(1, 1))
                    };
                    Some((SampleIndex(s), call))
                })
                .collect();
            let row = VariantRow {
                locus: Locus::new("1", (10_000 + i * 100) as u32),
                alleles: vec!["A".to_string(), "G".to_string()],
                calls,
            };
            NarrowedRow::materialize(row, &sample_ids).expect("synthetic row is valid")
        })
        .collect();
    NarrowedDataset::new(sample_ids, rows)
}

fn benchmark_scoring(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(42);
    let weights = build_weights(&mut rng);
    let engine = ScoringEngine::default();

    let mut group = c.benchmark_group("Scoring: carrier frequency sweep");
    group.throughput(Throughput::Elements((NUM_SAMPLES * NUM_VARIANTS) as u64));
    group.sample_size(10);

    for &frequency in CARRIER_FREQUENCIES.iter() {
        let dataset = build_dataset(&mut rng, frequency);
        group.bench_with_input(
            BenchmarkId::new("score", frequency),
            &dataset,
            |b, data| b.iter(|| engine.score(black_box(data), black_box(&weights))),
        );
    }

    group.finish();
}

criterion_group!(benches, benchmark_scoring);
criterion_main!(benches);

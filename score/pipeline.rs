// ========================================================================================
//
//                          The scoring run: weights to result tables
//
// ========================================================================================
//
// Owns the lifecycle of a single scoring run. Each stage fully completes before the next
// starts, and any fatal error aborts the run before a score table is written, so a score
// file on disk is always complete output of a successful run.

use crate::config::{ConfigError, PrsConfig};
use crate::dataset::{DatasetError, VariantDataset};
use crate::engine::{JoinAmbiguityWarning, ScoringEngine};
use crate::export::{ScoreExportOptions, export_found, export_scores};
use crate::intervals::{IntervalReducer, SkippedInterval, read_interval_file, write_interval_file};
use crate::storage::{ArtifactPaths, ArtifactStore, StorageError};
use crate::weights::{WeightTable, WeightTableError};
use log::{info, warn};
use std::io::{BufReader, Write};
use std::time::Instant;
use thiserror::Error;

/// Warnings logged individually before the rest are only counted.
const MAX_LOGGED_WARNINGS: usize = 20;

#[derive(Error, Debug)]
pub enum PrsError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Weights(#[from] WeightTableError),
    #[error(transparent)]
    Dataset(#[from] DatasetError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// What a successful run produced.
#[derive(Debug)]
pub struct PrsRunSummary {
    pub paths: ArtifactPaths,
    pub n_samples: usize,
    pub n_weights: usize,
    /// Sites left after reduction.
    pub n_sites: usize,
    pub n_bound: usize,
    pub n_unbound: usize,
    /// `Some` only when found variants were requested.
    pub found_variants: Option<usize>,
    pub warnings: Vec<JoinAmbiguityWarning>,
    pub skipped_intervals: Vec<SkippedInterval>,
}

/// Runs the full scoring flow against `dataset`, reading and writing every artifact
/// through `store`.
pub fn calculate_prs(
    dataset: &dyn VariantDataset,
    config: &PrsConfig,
    store: &dyn ArtifactStore,
) -> Result<PrsRunSummary, PrsError> {
    config.validate()?;
    let run_start = Instant::now();
    let paths = ArtifactPaths::from_config(config);

    // --- Stage 1: weights ---
    info!(
        "> Stage 1: Loading weights for '{}' from '{}'",
        config.prs_identifier,
        paths.weights.display()
    );
    let weights = WeightTable::load(store.open_read(&paths.weights)?, config.reference_genome)?;
    info!(
        "> Loaded {} weight rows at {} loci on contigs {}.",
        weights.len(),
        weights.locus_index().len(),
        weights.contigs().join(", ")
    );

    // --- Stage 2: interval artifact ---
    info!(
        "> Stage 2: Writing interval list to '{}'",
        paths.intervals.display()
    );
    let intervals = weights.intervals();
    store.write_atomic(&paths.intervals, &mut |w: &mut dyn Write| {
        write_interval_file(w, &intervals, config.reference_genome)
    })?;
    let import = read_interval_file(BufReader::new(store.open_read(&paths.intervals)?))
        .map_err(|source| StorageError::Io {
            location: paths.intervals.clone(),
            source,
        })?;

    // --- Stage 3: reduction ---
    info!("> Stage 3: Narrowing the dataset to the weighted loci");
    let reduction = IntervalReducer::reduce(dataset, &import.intervals)?;
    let mut skipped_intervals = import.skipped;
    skipped_intervals.extend(reduction.skipped);
    let narrowed = reduction.narrowed;

    // --- Stage 4: scoring ---
    info!(
        "> Stage 4: Scoring {} samples against {} sites",
        narrowed.n_samples(),
        narrowed.rows().len()
    );
    let outcome = ScoringEngine::default().score(&narrowed, &weights);
    report_warnings(&outcome.warnings);
    info!(
        "> {} weight rows bound to dataset sites, {} not observed.",
        outcome.bound, outcome.unbound
    );

    // --- Stage 5: results ---
    // The score table is committed last, so a run that fails here leaves no score file.
    info!(
        "> Stage 5: Writing results under '{}'",
        config.output_path.display()
    );
    let found_variants = if config.save_found_variants {
        let count = export_found(store, &paths.found_variants, &weights, &narrowed)?;
        info!(
            "> Saved {count} found variants to '{}'",
            paths.found_variants.display()
        );
        Some(count)
    } else {
        None
    };

    info!("> Writing scores to '{}'", paths.scores.display());
    let options = ScoreExportOptions {
        label: config
            .include_identifier
            .then(|| config.prs_identifier.clone()),
    };
    export_scores(store, &paths.scores, &outcome.scores, &options)?;

    info!(
        "> Scored {} samples in {:.2?}",
        outcome.scores.len(),
        run_start.elapsed()
    );

    Ok(PrsRunSummary {
        n_samples: outcome.scores.len(),
        n_weights: weights.len(),
        n_sites: narrowed.rows().len(),
        n_bound: outcome.bound,
        n_unbound: outcome.unbound,
        found_variants,
        warnings: outcome.warnings,
        skipped_intervals,
        paths,
    })
}

fn report_warnings(warnings: &[JoinAmbiguityWarning]) {
    for warning in warnings.iter().take(MAX_LOGGED_WARNINGS) {
        warn!("{warning}");
    }
    if warnings.len() > MAX_LOGGED_WARNINGS {
        warn!(
            "{} further join warnings not shown.",
            warnings.len() - MAX_LOGGED_WARNINGS
        );
    }
}

// ========================================================================================
//
//                                  Result tables
//
// ========================================================================================

use crate::dataset::NarrowedDataset;
use crate::engine::{AlleleMatch, weighted_sites};
use crate::storage::{ArtifactStore, StorageError};
use crate::types::SampleScore;
use crate::weights::{VariantWeight, WeightTable};
use csv::WriterBuilder;
use std::io::{self, Write};
use std::path::Path;

pub const SCORE_COLUMNS: [&str; 3] = ["sample_id", "sum_weights", "n_variants"];
pub const FOUND_DIAGNOSTIC_COLUMNS: [&str; 4] =
    ["n_called", "n_missing", "dataset_alleles", "allele_match"];

/// Optional pass-through annotation for the score table.
#[derive(Debug, Clone, Default)]
pub struct ScoreExportOptions {
    /// When set, every row carries this value in a trailing `prs_identifier` column.
    pub label: Option<String>,
}

/// Writes the score table: a header, then one row per sample in the given order.
pub fn write_scores(
    writer: &mut dyn Write,
    scores: &[SampleScore],
    options: &ScoreExportOptions,
) -> Result<(), csv::Error> {
    let mut csv_writer = WriterBuilder::new().from_writer(writer);

    let mut header: Vec<&str> = SCORE_COLUMNS.to_vec();
    if options.label.is_some() {
        header.push("prs_identifier");
    }
    csv_writer.write_record(&header)?;

    let mut ryu_buffer = ryu::Buffer::new();
    for score in scores {
        let sum = ryu_buffer.format(score.sum_weights);
        let n_variants = score.n_variants.to_string();
        let mut record = vec![score.sample_id.as_str(), sum, n_variants.as_str()];
        if let Some(label) = &options.label {
            record.push(label);
        }
        csv_writer.write_record(&record)?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Writes the score table to `location` all-or-nothing.
pub fn export_scores(
    store: &dyn ArtifactStore,
    location: &Path,
    scores: &[SampleScore],
    options: &ScoreExportOptions,
) -> Result<(), StorageError> {
    write_csv_atomically(store, location, |w| write_scores(w, scores, options))
}

// ========================================================================================
//                                  Found variants
// ========================================================================================

/// A weight row that was observed in the cohort, with match diagnostics.
#[derive(Debug, Clone)]
pub struct FoundVariant<'a> {
    pub weight: &'a VariantWeight,
    /// Explicit, fully-called entries over every site at the locus.
    pub n_called: usize,
    /// Explicit, uncalled entries over every site at the locus.
    pub n_missing: usize,
    /// Each site's alleles comma-joined, reference first; sites separated by `;`.
    pub dataset_alleles: String,
    /// The best allele coverage any site at the locus offers this row.
    pub allele_match: AlleleMatch,
}

/// The weight rows whose locus holds at least one non-missing call in the narrowed
/// dataset, in weight table order. Found-ness depends on the locus alone; whether the
/// alleles line up is reported in `allele_match`.
pub fn found_variants<'a>(
    weights: &'a WeightTable,
    narrowed: &NarrowedDataset,
) -> Vec<FoundVariant<'a>> {
    let sites_by_locus = weighted_sites(weights, narrowed);
    let rows = narrowed.rows();

    weights
        .rows()
        .iter()
        .filter_map(|weight| {
            let sites = sites_by_locus.get(&weight.locus)?;
            let n_called: usize = sites.iter().map(|&s| rows[s].n_called()).sum();
            if n_called == 0 {
                return None;
            }
            Some(FoundVariant {
                weight,
                n_called,
                n_missing: sites.iter().map(|&s| rows[s].n_missing()).sum(),
                dataset_alleles: sites
                    .iter()
                    .map(|&s| rows[s].alleles.join(","))
                    .collect::<Vec<_>>()
                    .join(";"),
                allele_match: sites
                    .iter()
                    .map(|&s| AlleleMatch::of(&rows[s], weight))
                    .max()
                    .unwrap_or(AlleleMatch::Neither),
            })
        })
        .collect()
}

/// Writes found variants with the weight table's original header and cells, followed
/// by the diagnostic columns.
pub fn write_found_variants(
    writer: &mut dyn Write,
    header: &csv::StringRecord,
    found: &[FoundVariant<'_>],
) -> Result<(), csv::Error> {
    let mut csv_writer = WriterBuilder::new().from_writer(writer);

    let mut full_header = header.clone();
    for column in FOUND_DIAGNOSTIC_COLUMNS {
        full_header.push_field(column);
    }
    csv_writer.write_record(&full_header)?;

    for variant in found {
        let mut record = variant.weight.raw.clone();
        record.push_field(&variant.n_called.to_string());
        record.push_field(&variant.n_missing.to_string());
        record.push_field(&variant.dataset_alleles);
        record.push_field(variant.allele_match.as_str());
        csv_writer.write_record(&record)?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Writes the found-variants table to `location` all-or-nothing and returns how many
/// weight rows it holds.
pub fn export_found(
    store: &dyn ArtifactStore,
    location: &Path,
    weights: &WeightTable,
    narrowed: &NarrowedDataset,
) -> Result<usize, StorageError> {
    let found = found_variants(weights, narrowed);
    write_csv_atomically(store, location, |w| {
        write_found_variants(w, weights.header(), &found)
    })?;
    Ok(found.len())
}

/// Runs a CSV writer through the store's atomic write, keeping CSV failures
/// distinguishable from plain I/O ones.
fn write_csv_atomically<F>(
    store: &dyn ArtifactStore,
    location: &Path,
    mut write: F,
) -> Result<(), StorageError>
where
    F: FnMut(&mut dyn Write) -> Result<(), csv::Error>,
{
    let mut csv_failure: Option<csv::Error> = None;
    let result = store.write_atomic(location, &mut |w: &mut dyn Write| {
        write(w).map_err(|err| {
            let io_err = io::Error::other(err.to_string());
            csv_failure = Some(err);
            io_err
        })
    });

    match (result, csv_failure) {
        (Err(_), Some(source)) => Err(StorageError::Csv {
            location: location.to_path_buf(),
            source,
        }),
        (result, _) => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{NarrowedRow, VariantRow};
    use crate::reference::ReferenceGenome;
    use crate::storage::LocalStore;
    use crate::types::{ExplicitCall, Genotype, Locus, SampleIndex};
    use std::fs;
    use tempfile::tempdir;

    fn score(id: &str, sum: f64, n: u32) -> SampleScore {
        SampleScore {
            sample_id: id.to_string(),
            sum_weights: sum,
            n_variants: n,
        }
    }

    fn render_scores(scores: &[SampleScore], options: &ScoreExportOptions) -> String {
        let mut buffer = Vec::new();
        write_scores(&mut buffer, scores, options).unwrap();
        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn score_table_has_header_and_one_row_per_sample() {
        let text = render_scores(
            &[score("S1", 0.5, 1), score("S2", 0.0, 1), score("S3", -1.25e-7, 0)],
            &ScoreExportOptions::default(),
        );
        assert_eq!(
            text,
            "sample_id,sum_weights,n_variants\nS1,0.5,1\nS2,0.0,1\nS3,-1.25e-7,0\n"
        );
    }

    #[test]
    fn label_adds_identifier_column() {
        let text = render_scores(
            &[score("S1", 1.0, 2)],
            &ScoreExportOptions {
                label: Some("PGS000001".to_string()),
            },
        );
        assert_eq!(
            text,
            "sample_id,sum_weights,n_variants,prs_identifier\nS1,1.0,2,PGS000001\n"
        );
    }

    #[test]
    fn export_scores_goes_through_the_store() {
        let dir = tempdir().unwrap();
        let store = LocalStore::new(dir.path().to_str()).unwrap();
        let location = Path::new("out/score/run_scores.csv");
        export_scores(&store, location, &[score("S1", 2.0, 1)], &ScoreExportOptions::default())
            .unwrap();
        let written = fs::read_to_string(dir.path().join(location)).unwrap();
        assert!(written.starts_with("sample_id,sum_weights,n_variants\n"));
    }

    /// 100 weight rows, of which only three loci are observed with a call.
    fn hundred_weights_three_observed() -> (WeightTable, NarrowedDataset) {
        let mut content =
            String::from("variant_id,weight,contig,position,effect_allele,noneffect_allele,note\n");
        for i in 0..100u32 {
            content.push_str(&format!("v{i},0.01,1,{},G,A,\"n, {i}\"\n", 1000 + i));
        }
        let weights = WeightTable::load(content.as_bytes(), ReferenceGenome::Grch38).unwrap();

        let sample_ids = vec!["S1".to_string(), "S2".to_string()];
        let het = ExplicitCall::Called(Genotype::diploid(0, 1));
        let site = |position: u32, calls: Vec<(SampleIndex, ExplicitCall)>| {
            NarrowedRow::materialize(
                VariantRow {
                    locus: Locus::new("1", position),
                    alleles: vec!["A".to_string(), "G".to_string()],
                    calls,
                },
                &sample_ids,
            )
            .unwrap()
        };
        let rows = vec![
            site(1000, vec![(SampleIndex(0), het)]),
            site(1010, vec![(SampleIndex(1), het), (SampleIndex(0), ExplicitCall::Missing)]),
            site(1099, vec![(SampleIndex(0), het), (SampleIndex(1), het)]),
            // Present but only missing calls: not found.
            site(1050, vec![(SampleIndex(1), ExplicitCall::Missing)]),
            // Present with no explicit entries at all: not found.
            site(1060, vec![]),
        ];
        (weights, NarrowedDataset::new(sample_ids.clone(), rows))
    }

    #[test]
    fn found_variants_are_the_observed_rows() {
        let (weights, narrowed) = hundred_weights_three_observed();
        let found = found_variants(&weights, &narrowed);
        let ids: Vec<&str> = found.iter().map(|f| f.weight.variant_id.as_str()).collect();
        assert_eq!(ids, vec!["v0", "v10", "v99"]);
        assert_eq!((found[1].n_called, found[1].n_missing), (1, 1));
        assert_eq!(found[2].dataset_alleles, "A,G");
    }

    #[test]
    fn called_locus_is_found_even_when_alleles_do_not_match() {
        let weights = WeightTable::load(
            "variant_id,weight,contig,position,effect_allele,noneffect_allele\n\
             v1,0.5,1,1000,T,C\n\
             v2,0.5,1,2000,T,C\n"
                .as_bytes(),
            ReferenceGenome::Grch38,
        )
        .unwrap();
        let sample_ids = vec!["S1".to_string()];
        let site = |position: u32, alleles: &str| {
            NarrowedRow::materialize(
                VariantRow {
                    locus: Locus::new("1", position),
                    alleles: alleles.split(',').map(str::to_string).collect(),
                    calls: vec![(SampleIndex(0), ExplicitCall::Called(Genotype::diploid(0, 1)))],
                },
                &sample_ids,
            )
            .unwrap()
        };
        let narrowed = NarrowedDataset::new(
            sample_ids.clone(),
            vec![site(1000, "A,G"), site(2000, "A,G"), site(2000, "C,T")],
        );

        let found = found_variants(&weights, &narrowed);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].weight.variant_id, "v1");
        assert_eq!(found[0].allele_match, AlleleMatch::Neither);
        assert_eq!(found[0].dataset_alleles, "A,G");
        assert_eq!(found[1].n_called, 2);
        assert_eq!(found[1].dataset_alleles, "A,G;C,T");
        assert_eq!(found[1].allele_match, AlleleMatch::Effect);
    }

    #[test]
    fn export_found_writes_original_columns_and_reports_count() {
        let (weights, narrowed) = hundred_weights_three_observed();
        let dir = tempdir().unwrap();
        let store = LocalStore::new(dir.path().to_str()).unwrap();
        let location = Path::new("score/run_found_variants.csv");

        let count = export_found(&store, location, &weights, &narrowed).unwrap();
        assert_eq!(count, 3);

        let mut reader = csv::Reader::from_path(dir.path().join(location)).unwrap();
        let header = reader.headers().unwrap().clone();
        assert_eq!(
            header.iter().collect::<Vec<_>>(),
            vec![
                "variant_id",
                "weight",
                "contig",
                "position",
                "effect_allele",
                "noneffect_allele",
                "note",
                "n_called",
                "n_missing",
                "dataset_alleles",
                "allele_match"
            ]
        );
        let records: Vec<csv::StringRecord> = reader.records().map(Result::unwrap).collect();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].get(6), Some("n, 0"));
        assert_eq!(records[2].get(0), Some("v99"));
        assert_eq!(records[2].get(7), Some("2"));
        assert_eq!(records[2].get(9), Some("A,G"));
        assert_eq!(records[2].get(10), Some("effect"));
    }
}

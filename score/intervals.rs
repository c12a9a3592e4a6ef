// ========================================================================================
//
//                       Interval artifacts and dataset reduction
//
// ========================================================================================
//
// The weight table names a few thousand loci; the dataset holds hundreds of millions.
// Reduction restricts the dataset to the weighted loci before any genotype is examined,
// and is where the sparse "no entry" convention is turned into explicit
// `AbsentImpliesRef` entries.

use crate::dataset::{DatasetError, NarrowedDataset, NarrowedRow, VariantDataset};
use crate::reference::ReferenceGenome;
use crate::types::{Locus, canonical_contig};
use ahash::AHashMap;
use log::{debug, info, warn};
use rayon::prelude::*;
use std::io::{self, BufRead, Write};

/// A closed, 1-based genomic interval on a canonical contig.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntervalSpec {
    pub contig: String,
    pub start: u32,
    pub end: u32,
}

impl IntervalSpec {
    pub fn new(contig: &str, start: u32, end: u32) -> Self {
        Self {
            contig: canonical_contig(contig),
            start,
            end,
        }
    }

    /// The single-point interval covering exactly one locus.
    pub fn point(locus: &Locus) -> Self {
        Self {
            contig: locus.contig.clone(),
            start: locus.position,
            end: locus.position,
        }
    }
}

/// An interval that was dropped instead of being applied. `line` is the 1-based
/// position of the interval in its list, which is also its line in the artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedInterval {
    pub line: usize,
    pub reason: String,
}

// ========================================================================================
//                               The interval artifact
// ========================================================================================

/// Writes the headerless, tab-separated `contig, position, position` artifact, naming
/// contigs the way `reference` spells them.
pub fn write_interval_file(
    writer: &mut dyn Write,
    intervals: &[IntervalSpec],
    reference: ReferenceGenome,
) -> io::Result<()> {
    for interval in intervals {
        writeln!(
            writer,
            "{}\t{}\t{}",
            reference.contig_name(&interval.contig),
            interval.start,
            interval.end
        )?;
    }
    Ok(())
}

/// The result of reading an interval artifact back.
#[derive(Debug, Default)]
pub struct IntervalImport {
    pub intervals: Vec<IntervalSpec>,
    pub skipped: Vec<SkippedInterval>,
}

/// Reads an interval artifact. Malformed lines are collected and logged, never fatal;
/// blank lines are ignored.
pub fn read_interval_file<R: BufRead>(reader: R) -> io::Result<IntervalImport> {
    let mut import = IntervalImport::default();

    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        let line_number = i + 1;
        if line.trim().is_empty() {
            continue;
        }
        match parse_interval_line(&line) {
            Ok(interval) => import.intervals.push(interval),
            Err(reason) => {
                warn!("Skipping interval on line {line_number}: {reason}");
                import.skipped.push(SkippedInterval {
                    line: line_number,
                    reason,
                });
            }
        }
    }
    Ok(import)
}

fn parse_interval_line(line: &str) -> Result<IntervalSpec, String> {
    let fields: Vec<&str> = line.split('\t').map(str::trim).collect();
    let [contig, start, end] = fields.as_slice() else {
        return Err(format!("expected 3 tab-separated fields, found {}", fields.len()));
    };
    if contig.is_empty() {
        return Err("empty contig".to_string());
    }
    let start: u32 = start
        .parse()
        .map_err(|_| format!("start '{start}' is not a non-negative integer"))?;
    let end: u32 = end
        .parse()
        .map_err(|_| format!("end '{end}' is not a non-negative integer"))?;
    Ok(IntervalSpec::new(contig, start, end))
}

// ========================================================================================
//                                  Interval index
// ========================================================================================

/// Sorted, merged ranges per canonical contig with binary-search membership.
#[derive(Debug, Clone, Default)]
pub struct IntervalIndex {
    ranges: AHashMap<String, Vec<(u32, u32)>>,
}

impl IntervalIndex {
    /// Compiles already-validated intervals.
    pub fn build(intervals: &[IntervalSpec]) -> Self {
        let mut ranges: AHashMap<String, Vec<(u32, u32)>> = AHashMap::new();
        for interval in intervals {
            ranges
                .entry(interval.contig.clone())
                .or_default()
                .push((interval.start, interval.end));
        }

        for list in ranges.values_mut() {
            list.sort_unstable();
            let mut merged: Vec<(u32, u32)> = Vec::with_capacity(list.len());
            for &(start, end) in list.iter() {
                match merged.last_mut() {
                    Some(last) if start <= last.1.saturating_add(1) => last.1 = last.1.max(end),
                    _ => merged.push((start, end)),
                }
            }
            *list = merged;
        }

        Self { ranges }
    }

    pub fn contains(&self, locus: &Locus) -> bool {
        let Some(list) = self.ranges.get(&locus.contig) else {
            return false;
        };
        // Index of the first range starting after the position.
        let after = list.partition_point(|&(start, _)| start <= locus.position);
        after > 0 && list[after - 1].1 >= locus.position
    }

    /// Number of disjoint ranges after merging.
    pub fn range_count(&self) -> usize {
        self.ranges.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

// ========================================================================================
//                                   The reducer
// ========================================================================================

#[derive(Debug)]
pub struct ReductionOutcome {
    pub narrowed: NarrowedDataset,
    pub skipped: Vec<SkippedInterval>,
}

pub struct IntervalReducer;

impl IntervalReducer {
    /// Narrows `dataset` to the rows inside `intervals`.
    ///
    /// Intervals on a contig the dataset does not know, with a zero start, or with
    /// `end < start` are skipped with a warning. The sample set and its order are left
    /// untouched.
    pub fn reduce(
        dataset: &dyn VariantDataset,
        intervals: &[IntervalSpec],
    ) -> Result<ReductionOutcome, DatasetError> {
        let mut valid = Vec::with_capacity(intervals.len());
        let mut skipped = Vec::new();

        for (i, interval) in intervals.iter().enumerate() {
            let reason = if interval.start == 0 {
                Some("start must be at least 1".to_string())
            } else if interval.end < interval.start {
                Some(format!(
                    "end {} is before start {}",
                    interval.end, interval.start
                ))
            } else if !dataset.has_contig(&interval.contig) {
                Some(format!("contig '{}' is not in the dataset", interval.contig))
            } else {
                None
            };

            match reason {
                Some(reason) => {
                    warn!(
                        "Skipping interval {}:{}-{}: {}",
                        interval.contig, interval.start, interval.end, reason
                    );
                    skipped.push(SkippedInterval { line: i + 1, reason });
                }
                None => valid.push(interval.clone()),
            }
        }

        let index = IntervalIndex::build(&valid);
        debug!(
            "Compiled {} intervals into {} disjoint ranges.",
            valid.len(),
            index.range_count()
        );

        let sample_ids = dataset.sample_ids();
        let rows = if index.is_empty() {
            Vec::new()
        } else {
            dataset.filter_intervals(&index)?
        };

        let narrowed_rows = rows
            .into_par_iter()
            .filter(|row| index.contains(&row.locus))
            .map(|row| NarrowedRow::materialize(row, sample_ids))
            .collect::<Result<Vec<_>, _>>()?;

        info!(
            "Reduced dataset to {} sites across {} samples ({} intervals skipped).",
            narrowed_rows.len(),
            sample_ids.len(),
            skipped.len()
        );

        Ok(ReductionOutcome {
            narrowed: NarrowedDataset::new(sample_ids.to_vec(), narrowed_rows),
            skipped,
        })
    }
}

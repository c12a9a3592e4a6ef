// ========================================================================================
//
//                              The weight table loader
//
// ========================================================================================
//
// Reads the comma-separated variant weight definitions, validates them in full, and
// derives the join structures the rest of the run depends on. Nothing downstream ever
// sees a partially-valid table: every error here is fatal and is raised before a single
// genotype is read.

use crate::intervals::IntervalSpec;
use crate::reference::ReferenceGenome;
use crate::types::{Locus, WeightRowIndex};
use ahash::AHashMap;
use csv::{ReaderBuilder, StringRecord, Trim};
use itertools::Itertools;
use natord::compare;
use std::io::Read;
use thiserror::Error;

/// The columns every weight table must carry, in canonical order.
pub const REQUIRED_COLUMNS: [&str; 6] = [
    "variant_id",
    "weight",
    "contig",
    "position",
    "effect_allele",
    "noneffect_allele",
];

#[derive(Error, Debug)]
pub enum WeightTableError {
    #[error("Weight table is missing required column(s): {}", missing_columns.join(", "))]
    Schema { missing_columns: Vec<String> },
    #[error("Invalid coordinate on line {line}: {contig}:{position} ({reason})")]
    Interval {
        line: u64,
        contig: String,
        position: String,
        reason: String,
    },
    #[error("Line {line} has an empty value in required column '{column}'.")]
    MissingValue { line: u64, column: &'static str },
    #[error("Line {line} has a weight that is not a finite number: '{value}'.")]
    InvalidWeight { line: u64, value: String },
    #[error("Weight table has a header but no variant rows.")]
    Empty,
    #[error("CSV parsing error in weight table: {0}")]
    Csv(#[from] csv::Error),
    #[error("I/O error while reading weight table: {0}")]
    Io(#[from] std::io::Error),
}

/// One scored variant.
#[derive(Debug, Clone)]
pub struct VariantWeight {
    pub variant_id: String,
    pub locus: Locus,
    /// Upper-cased.
    pub effect_allele: String,
    /// Upper-cased.
    pub noneffect_allele: String,
    pub weight: f64,
    /// The row exactly as it appeared in the input, pass-through columns included.
    pub raw: StringRecord,
}

/// Column positions of the required fields within the input header.
#[derive(Debug, Clone, Copy)]
struct ColumnMap {
    variant_id: usize,
    weight: usize,
    contig: usize,
    position: usize,
    effect_allele: usize,
    noneffect_allele: usize,
}

impl ColumnMap {
    /// Resolves every required column, reporting all of the missing ones at once.
    fn resolve(header: &StringRecord) -> Result<Self, WeightTableError> {
        let find = |name: &str| header.iter().position(|h| h == name);
        let positions: Vec<Option<usize>> = REQUIRED_COLUMNS.iter().map(|c| find(c)).collect();

        let missing_columns: Vec<String> = REQUIRED_COLUMNS
            .iter()
            .zip(&positions)
            .filter(|(_, pos)| pos.is_none())
            .map(|(name, _)| name.to_string())
            .collect();
        if !missing_columns.is_empty() {
            return Err(WeightTableError::Schema { missing_columns });
        }

        let at = |i: usize| positions[i].unwrap_or_default();
        Ok(Self {
            variant_id: at(0),
            weight: at(1),
            contig: at(2),
            position: at(3),
            effect_allele: at(4),
            noneffect_allele: at(5),
        })
    }
}

/// The validated, immutable weight table for a scoring run.
#[derive(Debug)]
pub struct WeightTable {
    header: StringRecord,
    rows: Vec<VariantWeight>,
    locus_index: AHashMap<Locus, Vec<WeightRowIndex>>,
}

impl WeightTable {
    /// Loads and validates a weight table.
    ///
    /// The header is checked before any row is read. Positions are validated
    /// against the primary assembly of `reference`; contigs the assembly does not
    /// know are accepted as-is.
    pub fn load<R: Read>(source: R, reference: ReferenceGenome) -> Result<Self, WeightTableError> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .trim(Trim::All)
            .from_reader(source);

        let header = reader.headers()?.clone();
        let columns = ColumnMap::resolve(&header)?;

        let mut rows = Vec::new();
        let mut locus_index: AHashMap<Locus, Vec<WeightRowIndex>> = AHashMap::new();

        for (row_number, result) in reader.records().enumerate() {
            let record = result?;
            // Header is line 1.
            let line = record
                .position()
                .map(|p| p.line())
                .unwrap_or(row_number as u64 + 2);

            let row = parse_row(&record, &columns, line, reference)?;
            locus_index
                .entry(row.locus.clone())
                .or_default()
                .push(WeightRowIndex(rows.len()));
            rows.push(row);
        }

        if rows.is_empty() {
            return Err(WeightTableError::Empty);
        }

        Ok(Self {
            header,
            rows,
            locus_index,
        })
    }

    pub fn header(&self) -> &StringRecord {
        &self.header
    }

    pub fn rows(&self) -> &[VariantWeight] {
        &self.rows
    }

    #[inline]
    pub fn row(&self, index: WeightRowIndex) -> &VariantWeight {
        &self.rows[index.0]
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The multi-map from locus to every weight row at that locus, in file order.
    pub fn locus_index(&self) -> &AHashMap<Locus, Vec<WeightRowIndex>> {
        &self.locus_index
    }

    /// The weight rows at `locus`, or an empty slice if the locus is unweighted.
    pub fn rows_at(&self, locus: &Locus) -> &[WeightRowIndex] {
        self.locus_index
            .get(locus)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// One single-point interval per row, in file order.
    pub fn intervals(&self) -> Vec<IntervalSpec> {
        self.rows
            .iter()
            .map(|row| IntervalSpec::point(&row.locus))
            .collect()
    }

    /// The distinct contigs the table touches, in natural order.
    pub fn contigs(&self) -> Vec<&str> {
        let mut contigs: Vec<&str> = self
            .rows
            .iter()
            .map(|row| row.locus.contig.as_str())
            .unique()
            .collect();
        contigs.sort_by(|a, b| compare(a, b));
        contigs
    }
}

fn required<'a>(
    record: &'a StringRecord,
    index: usize,
    column: &'static str,
    line: u64,
) -> Result<&'a str, WeightTableError> {
    match record.get(index) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(WeightTableError::MissingValue { line, column }),
    }
}

fn parse_row(
    record: &StringRecord,
    columns: &ColumnMap,
    line: u64,
    reference: ReferenceGenome,
) -> Result<VariantWeight, WeightTableError> {
    let variant_id = required(record, columns.variant_id, "variant_id", line)?;
    let raw_weight = required(record, columns.weight, "weight", line)?;
    let raw_contig = required(record, columns.contig, "contig", line)?;
    let raw_position = required(record, columns.position, "position", line)?;
    let effect_allele = required(record, columns.effect_allele, "effect_allele", line)?;
    let noneffect_allele = required(record, columns.noneffect_allele, "noneffect_allele", line)?;

    let weight = raw_weight
        .parse::<f64>()
        .ok()
        .filter(|w| w.is_finite())
        .ok_or_else(|| WeightTableError::InvalidWeight {
            line,
            value: raw_weight.to_string(),
        })?;

    let locus = parse_locus(raw_contig, raw_position, line, reference)?;

    Ok(VariantWeight {
        variant_id: variant_id.to_string(),
        locus,
        effect_allele: effect_allele.to_ascii_uppercase(),
        noneffect_allele: noneffect_allele.to_ascii_uppercase(),
        weight,
        raw: record.clone(),
    })
}

fn parse_locus(
    raw_contig: &str,
    raw_position: &str,
    line: u64,
    reference: ReferenceGenome,
) -> Result<Locus, WeightTableError> {
    let interval_error = |reason: String| WeightTableError::Interval {
        line,
        contig: raw_contig.to_string(),
        position: raw_position.to_string(),
        reason,
    };

    let position: u32 = raw_position
        .parse()
        .map_err(|_| interval_error("position is not a non-negative integer".to_string()))?;
    if position == 0 {
        return Err(interval_error("positions are 1-based".to_string()));
    }

    let locus = Locus::new(raw_contig, position);
    if let Some(length) = reference.contig_length(&locus.contig) {
        if position > length {
            return Err(interval_error(format!(
                "beyond the {length} bp length of the contig in {reference}"
            )));
        }
    }
    Ok(locus)
}

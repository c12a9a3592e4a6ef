// ========================================================================================
//
//                              Sparse VCF dataset reader
//
// ========================================================================================
//
// Builds a `SparseVariantDataset` from a VCF text export. A sample column that is exactly
// `.` (or empty) is an absent entry: the sample carries the reference genotype and the
// storage engine kept no record for it. Any other column is an explicit entry, read from
// `GT` or, for local-allele exports, from `LGT` mapped through `LA`.

use crate::dataset::{DatasetError, SparseVariantDataset, VariantRow};
use crate::types::{ExplicitCall, Genotype, Locus, SampleIndex};
use ahash::AHashSet;
use flate2::read::MultiGzDecoder;
use log::{debug, info};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Columns before the first sample: CHROM POS ID REF ALT QUAL FILTER INFO FORMAT.
const FIXED_COLUMNS: usize = 9;

/// Opens a VCF (optionally `.gz`) and reads it into memory.
pub fn load_vcf(path: &Path) -> Result<SparseVariantDataset, DatasetError> {
    let file = File::open(path)?;
    info!("Reading genotypes from '{}'", path.display());
    if path.extension().is_some_and(|ext| ext == "gz") {
        read_vcf(BufReader::new(MultiGzDecoder::new(file)))
    } else {
        read_vcf(BufReader::new(file))
    }
}

/// Where the genotype lives in a record's FORMAT column.
enum GenotypeField {
    Global { gt: usize },
    Local { lgt: usize, la: usize },
    None,
}

impl GenotypeField {
    fn resolve(format: &str) -> Self {
        let keys: Vec<&str> = format.split(':').collect();
        let find = |key: &str| keys.iter().position(|k| *k == key);
        if let Some(gt) = find("GT") {
            return GenotypeField::Global { gt };
        }
        match (find("LGT"), find("LA")) {
            (Some(lgt), Some(la)) => GenotypeField::Local { lgt, la },
            _ => GenotypeField::None,
        }
    }
}

pub fn read_vcf<R: BufRead>(reader: R) -> Result<SparseVariantDataset, DatasetError> {
    let mut declared_contigs = Vec::new();
    let mut sample_ids: Option<Vec<String>> = None;
    let mut rows = Vec::new();

    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        let line_number = i as u64 + 1;

        if let Some(meta) = line.strip_prefix("##") {
            if let Some(id) = meta
                .strip_prefix("contig=<ID=")
                .and_then(|rest| rest.split([',', '>']).next())
            {
                declared_contigs.push(id.to_string());
            }
            continue;
        }
        if line.starts_with("#CHROM") {
            sample_ids = Some(parse_header(&line)?);
            continue;
        }
        if line.trim().is_empty() {
            continue;
        }

        let samples = sample_ids.as_deref().ok_or_else(|| {
            DatasetError::Header(format!(
                "record on line {line_number} appears before the #CHROM header line"
            ))
        })?;
        rows.push(parse_record(&line, line_number, samples)?);
    }

    let sample_ids = sample_ids
        .ok_or_else(|| DatasetError::Header("no #CHROM header line found".to_string()))?;
    info!(
        "Loaded {} sites for {} samples.",
        rows.len(),
        sample_ids.len()
    );
    debug!("{} contigs declared in the VCF header.", declared_contigs.len());

    Ok(SparseVariantDataset::new(sample_ids, rows)?.with_declared_contigs(declared_contigs))
}

fn parse_header(line: &str) -> Result<Vec<String>, DatasetError> {
    let columns: Vec<&str> = line.split('\t').collect();
    if columns.len() < FIXED_COLUMNS - 1 {
        return Err(DatasetError::Header(format!(
            "expected at least {} columns, found {}",
            FIXED_COLUMNS - 1,
            columns.len()
        )));
    }
    let sample_ids: Vec<String> = columns
        .iter()
        .skip(FIXED_COLUMNS)
        .map(|s| s.to_string())
        .collect();

    let mut seen = AHashSet::with_capacity(sample_ids.len());
    for id in &sample_ids {
        if !seen.insert(id.as_str()) {
            return Err(DatasetError::Header(format!("duplicate sample id '{id}'")));
        }
    }
    Ok(sample_ids)
}

fn parse_record(
    line: &str,
    line_number: u64,
    sample_ids: &[String],
) -> Result<VariantRow, DatasetError> {
    let parse_error = |details: String| DatasetError::Parse {
        line: line_number,
        details,
    };

    let fields: Vec<&str> = line.split('\t').collect();
    let expected = if sample_ids.is_empty() {
        FIXED_COLUMNS - 1
    } else {
        FIXED_COLUMNS + sample_ids.len()
    };
    if fields.len() < expected || (!sample_ids.is_empty() && fields.len() != expected) {
        return Err(parse_error(format!(
            "expected {expected} columns, found {}",
            fields.len()
        )));
    }

    let position: u32 = fields[1]
        .parse()
        .ok()
        .filter(|p| *p > 0)
        .ok_or_else(|| parse_error(format!("invalid position '{}'", fields[1])))?;
    let locus = Locus::new(fields[0], position);

    let mut alleles = vec![fields[3].to_ascii_uppercase()];
    if fields[4] != "." {
        alleles.extend(fields[4].split(',').map(str::to_ascii_uppercase));
    }

    let mut calls = Vec::new();
    if !sample_ids.is_empty() {
        let genotype_field = GenotypeField::resolve(fields[8]);
        for (s, column) in fields[FIXED_COLUMNS..].iter().enumerate() {
            if column.is_empty() || *column == "." {
                continue;
            }
            let call = parse_sample(column, &genotype_field).map_err(|details| {
                parse_error(format!("sample '{}': {details}", sample_ids[s]))
            })?;
            calls.push((SampleIndex(s as u32), call));
        }
    }

    Ok(VariantRow {
        locus,
        alleles,
        calls,
    })
}

fn parse_sample(column: &str, field: &GenotypeField) -> Result<ExplicitCall, String> {
    let values: Vec<&str> = column.split(':').collect();
    let value = |i: usize| values.get(i).copied().unwrap_or(".");

    match *field {
        GenotypeField::Global { gt } => parse_genotype(value(gt), None),
        GenotypeField::Local { lgt, la } => {
            let local_alleles = value(la);
            let map: Vec<u16> = if local_alleles == "." {
                Vec::new()
            } else {
                local_alleles
                    .split(',')
                    .map(|a| a.parse::<u16>())
                    .collect::<Result<_, _>>()
                    .map_err(|_| format!("invalid LA value '{local_alleles}'"))?
            };
            parse_genotype(value(lgt), Some(&map))
        }
        GenotypeField::None => Ok(ExplicitCall::Missing),
    }
}

/// Parses a `GT`-style value. Any missing allele makes the whole call missing.
fn parse_genotype(text: &str, local_map: Option<&[u16]>) -> Result<ExplicitCall, String> {
    let tokens: Vec<&str> = text.split(['/', '|']).collect();
    if tokens.len() > 2 {
        return Err(format!("genotype '{text}' has ploidy above 2"));
    }
    if tokens.iter().any(|t| *t == "." || t.is_empty()) {
        return Ok(ExplicitCall::Missing);
    }

    let mut indices = [0u16; 2];
    for (slot, token) in indices.iter_mut().zip(&tokens) {
        let index: u16 = token
            .parse()
            .map_err(|_| format!("invalid allele index '{token}' in genotype '{text}'"))?;
        *slot = match local_map {
            Some(map) => *map.get(index as usize).ok_or_else(|| {
                format!("local allele {index} in '{text}' has no entry in LA")
            })?,
            None => index,
        };
    }

    Ok(ExplicitCall::Called(match tokens.len() {
        1 => Genotype::haploid(indices[0]),
        _ => Genotype::diploid(indices[0], indices[1]),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::VariantDataset;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::{Cursor, Write};
    use tempfile::tempdir;

    const VCF: &str = "##fileformat=VCFv4.2\n\
##contig=<ID=chr1,length=248956422>\n\
##contig=<ID=chr22,length=50818468>\n\
#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tS1\tS2\tS3\tS4\n\
chr1\t1000\trs1\ta\tG\t.\tPASS\t.\tGT:GQ\t0/1:30\t.\t./.:0\t1|1:99\n\
chr1\t2000\t.\tC\tT,A\t.\t.\t.\tGT\t0/2\t0/.\t\t1\n\
chrX\t500\t.\tA\t.\t.\t.\t.\tGT\t0/0\t.\t.\t.\n";

    #[test]
    fn reads_the_sparse_entry_convention() {
        let dataset = read_vcf(Cursor::new(VCF)).unwrap();
        assert_eq!(dataset.sample_ids(), &["S1", "S2", "S3", "S4"]);
        let rows = dataset.rows();
        assert_eq!(rows.len(), 3);

        assert_eq!(rows[0].locus, Locus::new("1", 1000));
        assert_eq!(rows[0].alleles, vec!["A", "G"]);
        assert_eq!(
            rows[0].calls,
            vec![
                (SampleIndex(0), ExplicitCall::Called(Genotype::diploid(0, 1))),
                (SampleIndex(2), ExplicitCall::Missing),
                (SampleIndex(3), ExplicitCall::Called(Genotype::diploid(1, 1))),
            ]
        );

        assert_eq!(rows[1].alleles, vec!["C", "T", "A"]);
        assert_eq!(
            rows[1].calls,
            vec![
                (SampleIndex(0), ExplicitCall::Called(Genotype::diploid(0, 2))),
                (SampleIndex(1), ExplicitCall::Missing),
                (SampleIndex(3), ExplicitCall::Called(Genotype::haploid(1))),
            ]
        );
        assert_eq!(rows[2].alleles, vec!["A"]);
    }

    #[test]
    fn header_contigs_are_known() {
        let dataset = read_vcf(Cursor::new(VCF)).unwrap();
        assert!(dataset.has_contig("22"));
        assert!(dataset.has_contig("X"));
        assert!(!dataset.has_contig("5"));
    }

    #[test]
    fn local_alleles_are_mapped_to_global_indices() {
        let vcf = "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tS1\tS2\n\
1\t100\t.\tA\tC,G,T\t.\t.\t.\tLGT:LA\t0/1:0,3\t1/1:0,2\n";
        let dataset = read_vcf(Cursor::new(vcf)).unwrap();
        assert_eq!(
            dataset.rows()[0].calls,
            vec![
                (SampleIndex(0), ExplicitCall::Called(Genotype::diploid(0, 3))),
                (SampleIndex(1), ExplicitCall::Called(Genotype::diploid(2, 2))),
            ]
        );
    }

    #[test]
    fn malformed_records_are_reported_with_line_numbers() {
        let vcf = "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tS1\n\
1\tabc\t.\tA\tG\t.\t.\t.\tGT\t0/1\n";
        assert!(matches!(
            read_vcf(Cursor::new(vcf)),
            Err(DatasetError::Parse { line: 2, .. })
        ));

        let vcf = "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tS1\n\
1\t10\t.\tA\tG\t.\t.\t.\tGT\t0/x\n";
        assert!(matches!(
            read_vcf(Cursor::new(vcf)),
            Err(DatasetError::Parse { line: 2, .. })
        ));
    }

    #[test]
    fn records_before_header_are_rejected() {
        let vcf = "1\t10\t.\tA\tG\t.\t.\t.\tGT\t0/1\n";
        assert!(matches!(read_vcf(Cursor::new(vcf)), Err(DatasetError::Header(_))));
    }

    #[test]
    fn duplicate_sample_ids_are_rejected() {
        let vcf = "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tS1\tS1\n";
        assert!(matches!(read_vcf(Cursor::new(vcf)), Err(DatasetError::Header(_))));
    }

    #[test]
    fn gzip_files_are_read_transparently() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cohort.vcf.gz");
        let mut encoder = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        encoder.write_all(VCF.as_bytes()).unwrap();
        encoder.finish().unwrap();

        let dataset = load_vcf(&path).unwrap();
        assert_eq!(dataset.rows().len(), 3);
    }
}

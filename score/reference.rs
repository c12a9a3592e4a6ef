// ========================================================================================
//
//                        Reference genome contig catalogue
//
// ========================================================================================
//
// Coordinates in the weight table are validated against the primary assembly of the
// configured reference genome before any genotype data is touched.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;

const GRCH38_LENGTHS: [(&str, u32); 25] = [
    ("1", 248_956_422),
    ("2", 242_193_529),
    ("3", 198_295_559),
    ("4", 190_214_555),
    ("5", 181_538_259),
    ("6", 170_805_979),
    ("7", 159_345_973),
    ("8", 145_138_636),
    ("9", 138_394_717),
    ("10", 133_797_422),
    ("11", 135_086_622),
    ("12", 133_275_309),
    ("13", 114_364_328),
    ("14", 107_043_718),
    ("15", 101_991_189),
    ("16", 90_338_345),
    ("17", 83_257_441),
    ("18", 80_373_285),
    ("19", 58_617_616),
    ("20", 64_444_167),
    ("21", 46_709_983),
    ("22", 50_818_468),
    ("X", 156_040_895),
    ("Y", 57_227_415),
    ("MT", 16_569),
];

const GRCH37_LENGTHS: [(&str, u32); 25] = [
    ("1", 249_250_621),
    ("2", 243_199_373),
    ("3", 198_022_430),
    ("4", 191_154_276),
    ("5", 180_915_260),
    ("6", 171_115_067),
    ("7", 159_138_663),
    ("8", 146_364_022),
    ("9", 141_213_431),
    ("10", 135_534_747),
    ("11", 135_006_516),
    ("12", 133_851_895),
    ("13", 115_169_878),
    ("14", 107_349_540),
    ("15", 102_531_392),
    ("16", 90_354_753),
    ("17", 81_195_210),
    ("18", 78_077_248),
    ("19", 59_128_983),
    ("20", 63_025_520),
    ("21", 48_129_895),
    ("22", 51_304_566),
    ("X", 155_270_560),
    ("Y", 59_373_566),
    ("MT", 16_569),
];

/// The reference assembly the weight table coordinates refer to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
pub enum ReferenceGenome {
    #[default]
    #[serde(rename = "GRCh38", alias = "grch38", alias = "hg38")]
    #[value(name = "grch38", alias = "GRCh38", alias = "hg38")]
    Grch38,
    #[serde(rename = "GRCh37", alias = "grch37", alias = "hg19")]
    #[value(name = "grch37", alias = "GRCh37", alias = "hg19")]
    Grch37,
}

impl ReferenceGenome {
    /// Returns the length of a canonical contig, or `None` if the contig is not
    /// part of the primary assembly.
    pub fn contig_length(&self, canonical_contig: &str) -> Option<u32> {
        let table: &[(&str, u32)] = match self {
            ReferenceGenome::Grch38 => &GRCH38_LENGTHS,
            ReferenceGenome::Grch37 => &GRCH37_LENGTHS,
        };
        table
            .iter()
            .find(|(name, _)| *name == canonical_contig)
            .map(|(_, length)| *length)
    }

    /// The contig name as the assembly spells it: `chr`-prefixed for GRCh38
    /// (mitochondrion as `chrM`), bare for GRCh37.
    pub fn contig_name(&self, canonical_contig: &str) -> String {
        match self {
            ReferenceGenome::Grch38 if canonical_contig == "MT" => "chrM".to_string(),
            ReferenceGenome::Grch38 => format!("chr{canonical_contig}"),
            ReferenceGenome::Grch37 => canonical_contig.to_string(),
        }
    }
}

impl fmt::Display for ReferenceGenome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReferenceGenome::Grch38 => write!(f, "GRCh38"),
            ReferenceGenome::Grch37 => write!(f, "GRCh37"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_contigs_have_lengths() {
        assert_eq!(ReferenceGenome::Grch38.contig_length("1"), Some(248_956_422));
        assert_eq!(ReferenceGenome::Grch37.contig_length("1"), Some(249_250_621));
        assert_eq!(ReferenceGenome::Grch38.contig_length("MT"), Some(16_569));
        assert_eq!(ReferenceGenome::Grch38.contig_length("chr1"), None);
        assert_eq!(ReferenceGenome::Grch38.contig_length("1_KI270706v1_random"), None);
    }

    #[test]
    fn contig_names_follow_assembly_convention() {
        assert_eq!(ReferenceGenome::Grch38.contig_name("7"), "chr7");
        assert_eq!(ReferenceGenome::Grch38.contig_name("MT"), "chrM");
        assert_eq!(ReferenceGenome::Grch37.contig_name("7"), "7");
        assert_eq!(ReferenceGenome::Grch37.contig_name("MT"), "MT");
    }

    #[test]
    fn default_is_grch38() {
        assert_eq!(ReferenceGenome::default(), ReferenceGenome::Grch38);
        assert_eq!(ReferenceGenome::default().to_string(), "GRCh38");
    }
}

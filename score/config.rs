use crate::reference::ReferenceGenome;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Everything a scoring run needs to know about where its inputs live and where
/// its results go.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrsConfig {
    /// Names every artifact the run writes.
    pub prs_identifier: String,
    pub pgs_weight_path: PathBuf,
    pub output_path: PathBuf,
    /// Optional root every location is resolved against.
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default)]
    pub save_found_variants: bool,
    /// Adds a `prs_identifier` column to the score table.
    #[serde(default)]
    pub include_identifier: bool,
    #[serde(default)]
    pub reference_genome: ReferenceGenome,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse TOML configuration: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl PrsConfig {
    /// Loads and validates a configuration from a TOML file.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let toml_string = fs::read_to_string(path)?;
        let config: PrsConfig = toml::from_str(&toml_string)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let id = self.prs_identifier.trim();
        if id.is_empty() {
            return Err(ConfigError::Invalid(
                "prs_identifier must not be empty.".to_string(),
            ));
        }
        if id.contains(['/', '\\']) {
            return Err(ConfigError::Invalid(format!(
                "prs_identifier '{id}' must not contain path separators."
            )));
        }
        if self.pgs_weight_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid(
                "pgs_weight_path must not be empty.".to_string(),
            ));
        }
        if self.bucket.as_deref().is_some_and(|b| b.trim().is_empty()) {
            return Err(ConfigError::Invalid(
                "bucket, when given, must not be blank.".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_toml(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let file = write_toml(
            r#"
prs_identifier = "PGS000746"
pgs_weight_path = "weights/PGS000746.csv"
output_path = "results"
"#,
        );
        let config = PrsConfig::from_toml_file(file.path()).unwrap();
        assert_eq!(config.prs_identifier, "PGS000746");
        assert_eq!(config.bucket, None);
        assert!(!config.save_found_variants);
        assert!(!config.include_identifier);
        assert_eq!(config.reference_genome, ReferenceGenome::Grch38);
    }

    #[test]
    fn full_config_is_parsed() {
        let file = write_toml(
            r#"
prs_identifier = "PGS000746"
pgs_weight_path = "weights/PGS000746.csv.gz"
output_path = "results"
bucket = "/mnt/workspace"
save_found_variants = true
reference_genome = "GRCh37"
"#,
        );
        let config = PrsConfig::from_toml_file(file.path()).unwrap();
        assert_eq!(config.bucket.as_deref(), Some("/mnt/workspace"));
        assert!(config.save_found_variants);
        assert_eq!(config.reference_genome, ReferenceGenome::Grch37);
    }

    #[test]
    fn missing_field_is_a_parse_error() {
        let file = write_toml("prs_identifier = \"x\"\n");
        assert!(matches!(
            PrsConfig::from_toml_file(file.path()),
            Err(ConfigError::Toml(_))
        ));
    }

    #[test]
    fn identifier_with_separator_is_rejected() {
        let file = write_toml(
            r#"
prs_identifier = "../escape"
pgs_weight_path = "w.csv"
output_path = "out"
"#,
        );
        assert!(matches!(
            PrsConfig::from_toml_file(file.path()),
            Err(ConfigError::Invalid(_))
        ));
    }
}

// ========================================================================================
//
//                         Artifact storage: reads, atomic writes
//
// ========================================================================================
//
// Every file the scoring run touches (the weight table, the interval artifact and the
// result tables) goes through an `ArtifactStore`. The store is a blocking boundary: no
// retries, no persistent connections, and failures are surfaced to the caller as-is.

use crate::config::PrsConfig;
use flate2::read::MultiGzDecoder;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// URI schemes that denote remote object storage.
const REMOTE_SCHEMES: [&str; 4] = ["gs://", "s3://", "http://", "https://"];

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error on '{}': {source}", location.display())]
    Io {
        location: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(
        "'{location}' refers to remote object storage, which this store cannot reach. Copy the data locally or supply a remote-capable store."
    )]
    UnsupportedScheme { location: String },
    #[error("CSV error while writing '{}': {source}", location.display())]
    Csv {
        location: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// A boxed writer callback handed to [`ArtifactStore::write_atomic`].
pub type WriteFn<'a> = dyn FnMut(&mut dyn Write) -> io::Result<()> + 'a;

/// The storage collaborator. Locations are relative to the store's root.
pub trait ArtifactStore: Sync {
    /// Opens an artifact for reading. `.gz` artifacts are decompressed transparently.
    fn open_read(&self, location: &Path) -> Result<Box<dyn Read + Send>, StorageError>;

    /// Writes an artifact all-or-nothing: either the complete content becomes
    /// visible at `location`, or nothing does.
    fn write_atomic(&self, location: &Path, write: &mut WriteFn<'_>) -> Result<(), StorageError>;
}

// ========================================================================================
//                                  Artifact layout
// ========================================================================================

/// The set of locations a scoring run reads from and writes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub weights: PathBuf,
    pub intervals: PathBuf,
    pub scores: PathBuf,
    pub found_variants: PathBuf,
}

impl ArtifactPaths {
    pub fn from_config(config: &PrsConfig) -> Self {
        let id = &config.prs_identifier;
        let output = &config.output_path;
        Self {
            weights: config.pgs_weight_path.clone(),
            intervals: output.join("interval").join(format!("{id}_interval.tsv")),
            scores: output.join("score").join(format!("{id}_scores.csv")),
            found_variants: output.join("score").join(format!("{id}_found_in_aou.csv")),
        }
    }
}

// ========================================================================================
//                                 Local filesystem
// ========================================================================================

/// A filesystem-backed store. An optional bucket qualifier acts as the root
/// directory every location is resolved against.
#[derive(Debug, Clone, Default)]
pub struct LocalStore {
    root: Option<PathBuf>,
}

impl LocalStore {
    pub fn new(bucket: Option<&str>) -> Result<Self, StorageError> {
        match bucket {
            Some(b) if is_remote(b) => Err(StorageError::UnsupportedScheme {
                location: b.to_string(),
            }),
            Some(b) => Ok(Self {
                root: Some(PathBuf::from(b)),
            }),
            None => Ok(Self { root: None }),
        }
    }

    fn resolve(&self, location: &Path) -> Result<PathBuf, StorageError> {
        let text = location.to_string_lossy();
        if is_remote(&text) {
            return Err(StorageError::UnsupportedScheme {
                location: text.into_owned(),
            });
        }
        Ok(match &self.root {
            Some(root) => root.join(location),
            None => location.to_path_buf(),
        })
    }
}

impl ArtifactStore for LocalStore {
    fn open_read(&self, location: &Path) -> Result<Box<dyn Read + Send>, StorageError> {
        let path = self.resolve(location)?;
        open_text(&path)
    }

    fn write_atomic(&self, location: &Path, write: &mut WriteFn<'_>) -> Result<(), StorageError> {
        let path = self.resolve(location)?;
        write_file_atomically(&path, write).map_err(|source| StorageError::Io {
            location: path.clone(),
            source,
        })
    }
}

fn is_remote(location: &str) -> bool {
    REMOTE_SCHEMES
        .iter()
        .any(|scheme| location.to_ascii_lowercase().starts_with(scheme))
}

/// Opens a local text file, decompressing it if the name ends in `.gz`.
pub fn open_text(path: &Path) -> Result<Box<dyn Read + Send>, StorageError> {
    let file = File::open(path).map_err(|source| StorageError::Io {
        location: path.to_path_buf(),
        source,
    })?;
    let reader: Box<dyn Read + Send> = if path.extension().is_some_and(|ext| ext == "gz") {
        Box::new(BufReader::new(MultiGzDecoder::new(file)))
    } else {
        Box::new(BufReader::new(file))
    };
    Ok(reader)
}

/// Writes to a uniquely-named hidden sibling file and renames it into place on
/// success. On any failure the temporary file is removed and the destination is
/// left untouched.
fn write_file_atomically(path: &Path, write: &mut WriteFn<'_>) -> io::Result<()> {
    let output_dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let output_name = path.file_name().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("Output path '{}' has no file name.", path.display()),
        )
    })?;
    fs::create_dir_all(output_dir)?;

    let pid = std::process::id();
    let ts_nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);

    let mut reserved = None;
    for attempt in 0..32u32 {
        let candidate = output_dir.join(format!(
            ".{}.{}.{}.tmp",
            output_name.to_string_lossy(),
            pid,
            ts_nanos + attempt as u128
        ));
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
        {
            Ok(file) => {
                reserved = Some((candidate, file));
                break;
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }

    let (temp_path, temp_file) = reserved.ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!(
                "Failed to allocate a unique temporary output file in '{}'.",
                output_dir.display()
            ),
        )
    })?;

    let write_result = (|| -> io::Result<()> {
        let mut writer = BufWriter::new(temp_file);
        write(&mut writer)?;
        writer.flush()?;
        let file = writer.into_inner().map_err(io::Error::other)?;
        file.sync_all()?;
        Ok(())
    })();

    if let Err(err) = write_result {
        let _ = fs::remove_file(&temp_path);
        return Err(err);
    }

    fs::rename(&temp_path, path).inspect_err(|_| {
        let _ = fs::remove_file(&temp_path);
    })
}

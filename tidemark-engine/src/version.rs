//! Version directory discovery.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config::{DEFAULT_SNAPSHOT_FILE, MANIFEST_FILE_NAME};
use crate::error::{MigrateResult, MigrationError};

/// A `v<N>` directory under the migrations root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    /// Sequence number parsed from the directory name.
    pub sequence: u64,
    /// Directory name, e.g. `v12`.
    pub name: String,
    /// Directory path.
    pub path: PathBuf,
    /// Schema snapshot, if the version has one.
    pub snapshot_path: Option<PathBuf>,
    /// Migration manifest, if the version has one.
    pub script_path: Option<PathBuf>,
}

/// Parse the sequence number from a directory name like `v12`.
pub fn parse_sequence(name: &str) -> Option<u64> {
    let digits = name.strip_prefix('v')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Scans a migrations root for version directories.
#[derive(Debug, Clone)]
pub struct VersionScanner {
    root: PathBuf,
    snapshot_file: String,
    manifest_file: String,
}

impl VersionScanner {
    /// Create a scanner for `root` with the default file names.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            snapshot_file: DEFAULT_SNAPSHOT_FILE.to_string(),
            manifest_file: MANIFEST_FILE_NAME.to_string(),
        }
    }

    /// Use a different snapshot file name.
    pub fn snapshot_file(mut self, name: impl Into<String>) -> Self {
        self.snapshot_file = name.into();
        self
    }

    /// The migrations root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// List version directories in ascending numeric order.
    ///
    /// A missing root yields no versions.
    pub fn scan(&self) -> MigrateResult<Vec<Version>> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %self.root.display(), "Migrations directory does not exist");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let mut versions: BTreeMap<u64, Version> = BTreeMap::new();
        for entry in entries {
            let path = entry?.path();
            if !path.is_dir() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
                continue;
            };

            let sequence = match parse_sequence(&name) {
                Some(0) => {
                    tracing::warn!(name = %name, "Version numbers start at 1, ignoring directory");
                    continue;
                }
                Some(n) => n,
                None => {
                    tracing::debug!(name = %name, "Not a version directory");
                    continue;
                }
            };

            if let Some(existing) = versions.get(&sequence) {
                return Err(MigrationError::InvalidVersion(format!(
                    "'{}' and '{}' share sequence number {}",
                    existing.name, name, sequence
                )));
            }

            let snapshot = path.join(&self.snapshot_file);
            let manifest = path.join(&self.manifest_file);
            versions.insert(
                sequence,
                Version {
                    sequence,
                    name,
                    snapshot_path: snapshot.is_file().then_some(snapshot),
                    script_path: manifest.is_file().then_some(manifest),
                    path,
                },
            );
        }

        Ok(versions.into_values().collect())
    }
}

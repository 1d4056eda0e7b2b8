//! Configuration persistence: load, write-with-backup, and backup management.

use std::collections::hash_map::DefaultHasher;
use std::fs;
use std::hash::{Hash, Hasher};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::config::schema::StackConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration persistence.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("configuration file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration in {path}: {}", join_errors(.errors))]
    Invalid {
        path: PathBuf,
        errors: Vec<ValidationError>,
    },

    #[error("failed to encode configuration: {0}")]
    Encode(#[from] toml::ser::Error),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("backup not found: {name}")]
    BackupNotFound { name: String },
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> PersistenceError {
    PersistenceError::Io {
        path: path.into(),
        source,
    }
}

/// A copy of the document as it existed immediately before an overwrite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupRecord {
    pub name: String,
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
    pub size_bytes: u64,
}

/// A document read from disk together with the digest of its text.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: StackConfig,
    pub digest: u64,
}

/// Result of a successful canonical write.
#[derive(Debug, Clone)]
pub struct WriteOutcome {
    /// Backup of the previous document; `None` when there was nothing to back up
    /// or the backup failed.
    pub backup: Option<BackupRecord>,
    /// Non-fatal backup failure, already logged.
    pub backup_warning: Option<String>,
    /// Digest of the text now at the canonical path.
    pub digest: u64,
}

/// Stable-within-process digest of a serialized document.
pub fn content_digest(text: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    hasher.finish()
}

/// Read, decode, and validate a configuration document.
pub fn load_config(path: &Path) -> Result<LoadedConfig, PersistenceError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(PersistenceError::NotFound {
                path: path.to_path_buf(),
            })
        }
        Err(e) => return Err(io_err(path, e)),
    };
    let config = decode(path, &content)?;
    Ok(LoadedConfig {
        config,
        digest: content_digest(&content),
    })
}

fn decode(path: &Path, content: &str) -> Result<StackConfig, PersistenceError> {
    let config: StackConfig = toml::from_str(content).map_err(|source| PersistenceError::Decode {
        path: path.to_path_buf(),
        source,
    })?;
    validate_config(&config).map_err(|errors| PersistenceError::Invalid {
        path: path.to_path_buf(),
        errors,
    })?;
    Ok(config)
}

/// Owner of the on-disk document and its backups.
#[derive(Debug, Clone)]
pub struct ConfigPersistence {
    path: PathBuf,
    backup_dir: PathBuf,
    retention: usize,
}

impl ConfigPersistence {
    pub fn new(path: impl Into<PathBuf>, backup_dir: impl Into<PathBuf>, retention: usize) -> Self {
        Self {
            path: path.into(),
            backup_dir: backup_dir.into(),
            retention: retention.max(1),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the canonical document.
    pub fn load(&self) -> Result<LoadedConfig, PersistenceError> {
        load_config(&self.path)
    }

    /// Back up the current file (non-fatal on failure), then atomically
    /// replace it with `config`.
    pub fn write_with_backup(&self, config: &StackConfig) -> Result<WriteOutcome, PersistenceError> {
        let text = toml::to_string_pretty(config)?;

        let (backup, backup_warning) = if self.path.exists() {
            match self.create_backup() {
                Ok(record) => (Some(record), None),
                Err(e) => {
                    tracing::warn!(path = %self.path.display(), error = %e, "Backup failed, continuing with write");
                    (None, Some(e.to_string()))
                }
            }
        } else {
            (None, None)
        };

        self.write_atomic(&text)?;

        tracing::info!(
            path = %self.path.display(),
            backup = backup.as_ref().map(|b| b.name.as_str()),
            "Configuration written"
        );

        Ok(WriteOutcome {
            backup,
            backup_warning,
            digest: content_digest(&text),
        })
    }

    /// Write to a sibling temp file, fsync, then rename over the canonical path.
    fn write_atomic(&self, text: &str) -> Result<(), PersistenceError> {
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "config.toml".to_string());
        let tmp_path = self.path.with_file_name(format!(".{file_name}.tmp"));

        let result = (|| {
            let mut file = fs::File::create(&tmp_path).map_err(|e| io_err(&tmp_path, e))?;
            file.write_all(text.as_bytes()).map_err(|e| io_err(&tmp_path, e))?;
            file.sync_all().map_err(|e| io_err(&tmp_path, e))?;
            fs::rename(&tmp_path, &self.path).map_err(|e| io_err(&self.path, e))
        })();

        if result.is_err() {
            let _ = fs::remove_file(&tmp_path);
        }
        result
    }

    /// Copy the current canonical file into the backup directory and prune.
    pub fn create_backup(&self) -> Result<BackupRecord, PersistenceError> {
        if !self.path.exists() {
            return Err(PersistenceError::NotFound {
                path: self.path.clone(),
            });
        }
        fs::create_dir_all(&self.backup_dir).map_err(|e| io_err(&self.backup_dir, e))?;

        let created_at = Utc::now();
        let stem = format!("config-{}", created_at.format("%Y%m%d-%H%M%S-%3f"));
        let mut seq = 0;
        let mut name = backup_name(&stem, seq);
        while self.backup_dir.join(&name).exists() {
            seq += 1;
            name = backup_name(&stem, seq);
        }
        let path = self.backup_dir.join(&name);

        let size_bytes = fs::copy(&self.path, &path).map_err(|e| io_err(&self.path, e))?;
        tracing::info!(backup = %path.display(), "Created backup of config file");

        self.prune_backups();

        Ok(BackupRecord {
            name,
            path,
            created_at,
            size_bytes,
        })
    }

    /// Backups, newest first.
    pub fn list_backups(&self) -> Result<Vec<BackupRecord>, PersistenceError> {
        let entries = match fs::read_dir(&self.backup_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_err(&self.backup_dir, e)),
        };

        let mut backups = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| io_err(&self.backup_dir, e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if !is_backup_name(&name) {
                continue;
            }
            let meta = entry.metadata().map_err(|e| io_err(entry.path(), e))?;
            let created_at = meta
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());
            backups.push(BackupRecord {
                name,
                path: entry.path(),
                created_at,
                size_bytes: meta.len(),
            });
        }

        // Names embed the timestamp, so lexical order is chronological.
        backups.sort_by(|a, b| b.name.cmp(&a.name));
        Ok(backups)
    }

    /// Read and validate a backup by name.
    pub fn read_backup(&self, name: &str) -> Result<LoadedConfig, PersistenceError> {
        if !is_backup_name(name) || name.contains(['/', '\\']) {
            return Err(PersistenceError::BackupNotFound {
                name: name.to_string(),
            });
        }
        match load_config(&self.backup_dir.join(name)) {
            Err(PersistenceError::NotFound { .. }) => Err(PersistenceError::BackupNotFound {
                name: name.to_string(),
            }),
            other => other,
        }
    }

    fn prune_backups(&self) {
        let backups = match self.list_backups() {
            Ok(backups) => backups,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to list backups for pruning");
                return;
            }
        };
        for stale in backups.iter().skip(self.retention) {
            match fs::remove_file(&stale.path) {
                Ok(()) => tracing::debug!(backup = %stale.name, "Pruned backup"),
                Err(e) => tracing::warn!(backup = %stale.name, error = %e, "Failed to prune backup"),
            }
        }
    }
}

/// Fixed-width sequence so same-millisecond backups still sort by creation.
fn backup_name(stem: &str, seq: u32) -> String {
    format!("{stem}-{seq:03}.toml")
}

fn is_backup_name(name: &str) -> bool {
    name.starts_with("config-") && name.ends_with(".toml")
}

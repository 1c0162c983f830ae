//! Usage document persistence with atomic replace.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, info};

use super::document::UsageDocument;
use super::migrate::migrate;
use super::{StoreError, SCHEMA_VERSION};

/// File name of the usage document
const DATA_FILE: &str = "usage-data.json";

/// Handle to the usage document on disk
#[derive(Debug, Clone)]
pub struct DataFile {
    path: PathBuf,
}

impl DataFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<data dir>/quotacast/usage-data.json`, or the working directory when
    /// the platform has no data directory
    pub fn default_path() -> PathBuf {
        dirs::data_dir()
            .map(|d| d.join("quotacast").join(DATA_FILE))
            .unwrap_or_else(|| PathBuf::from(DATA_FILE))
    }

    /// Get the path to the data file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the document, migrating older layouts.
    ///
    /// A missing file yields an empty document.
    pub fn load(&self) -> Result<UsageDocument, StoreError> {
        if !self.path.exists() {
            debug!("No usage document at {:?}, starting empty", self.path);
            return Ok(UsageDocument::default());
        }

        let content = fs::read_to_string(&self.path).map_err(|source| StoreError::Read {
            path: self.path.clone(),
            source,
        })?;
        let raw: Value = serde_json::from_str(&content).map_err(|source| StoreError::Parse {
            path: self.path.clone(),
            source,
        })?;

        let previous = raw
            .get("schemaVersion")
            .and_then(Value::as_str)
            .map(str::to_string);
        let migrated = migrate(raw)?;
        if previous.as_deref() != Some(SCHEMA_VERSION) {
            info!(
                "Migrated usage document {:?} from schema {} to {}",
                self.path,
                previous.as_deref().unwrap_or("(none)"),
                SCHEMA_VERSION
            );
        }

        serde_json::from_value(migrated).map_err(|source| StoreError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    /// Write the document.
    ///
    /// Writes to a sibling temp file created with O_CREAT|O_EXCL, syncs it and
    /// renames it over the target so readers never see a partial document.
    pub fn save(&self, doc: &UsageDocument) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(doc)?;
        let write_err = |source| StoreError::Write {
            path: self.path.clone(),
            source,
        };

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(write_err)?;
        }

        let temp_path = self.path.with_extension("json.tmp");
        // Left over from a previous failed write
        let _ = fs::remove_file(&temp_path);

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)
            .map_err(write_err)?;

        let written = file
            .write_all(json.as_bytes())
            .and_then(|_| file.sync_all())
            .and_then(|_| fs::rename(&temp_path, &self.path));
        if let Err(e) = written {
            let _ = fs::remove_file(&temp_path);
            return Err(write_err(e));
        }

        debug!(
            "Saved usage document ({} points) to {:?}",
            doc.historical_data.len(),
            self.path
        );
        Ok(())
    }
}

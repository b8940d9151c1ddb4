//! JSON state file used by the CLI to host a ledger between invocations.

use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::debug;

use crate::ledger::Ledger;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("state file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("state file {path} is corrupt: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub struct StateFile {
    path: PathBuf,
}

impl StateFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the ledger, or a fresh uninitialized one when the file is absent.
    pub fn load(&self) -> Result<Ledger, StoreError> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "no state file, starting empty");
            return Ok(Ledger::new());
        }
        let bytes = fs::read(&self.path).map_err(|source| self.io(source))?;
        serde_json::from_slice(&bytes).map_err(|source| StoreError::Json {
            path: self.path.clone(),
            source,
        })
    }

    /// Writes to a sibling temp file, then renames it over the state file.
    pub fn save(&self, ledger: &Ledger) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| self.io(source))?;
        }
        let json = serde_json::to_vec_pretty(ledger).map_err(|source| StoreError::Json {
            path: self.path.clone(),
            source,
        })?;
        let tmp = self.path.with_extension("json.tmp");
        let mut f = fs::File::create(&tmp).map_err(|source| self.io(source))?;
        f.write_all(&json).map_err(|source| self.io(source))?;
        f.sync_all().map_err(|source| self.io(source))?;
        fs::rename(&tmp, &self.path).map_err(|source| self.io(source))?;
        debug!(path = %self.path.display(), height = ledger.height(), "state saved");
        Ok(())
    }

    fn io(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

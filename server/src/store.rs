//! Player persistence collaborator
//!
//! Records are keyed by character name. The server treats every call as
//! synchronous and the store as authoritative once a write returned `Ok`.

use log::{debug, info};
use serde::{Deserialize, Serialize};
use shared::{Position, Stats};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store i/o failed: {0}")]
    Io(#[from] io::Error),
    #[error("store serialization failed: {0}")]
    Serialize(#[from] bincode::Error),
    #[error("record '{0}' already exists")]
    Duplicate(String),
    #[error("record '{0}' does not exist")]
    Missing(String),
}

/// Persisted part of a character
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub name: String,
    pub position: Position,
    pub stats: Stats,
}

pub trait PlayerStore {
    fn get(&self, name: &str) -> Result<Option<PlayerRecord>, StoreError>;

    /// Fails with [`StoreError::Duplicate`] when the name is taken
    fn insert(&mut self, record: PlayerRecord) -> Result<(), StoreError>;

    /// Fails with [`StoreError::Missing`] when nothing is stored under `name`
    fn replace(&mut self, name: &str, record: PlayerRecord) -> Result<(), StoreError>;

    /// Replaces the record, inserting it if it was never stored
    fn save(&mut self, record: PlayerRecord) -> Result<(), StoreError> {
        let name = record.name.clone();
        match self.replace(&name, record.clone()) {
            Err(StoreError::Missing(_)) => self.insert(record),
            other => other,
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    records: HashMap<String, PlayerRecord>,
    writes: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Successful insert and replace calls so far
    pub fn writes(&self) -> usize {
        self.writes
    }
}

impl PlayerStore for MemoryStore {
    fn get(&self, name: &str) -> Result<Option<PlayerRecord>, StoreError> {
        Ok(self.records.get(name).cloned())
    }

    fn insert(&mut self, record: PlayerRecord) -> Result<(), StoreError> {
        if self.records.contains_key(&record.name) {
            return Err(StoreError::Duplicate(record.name));
        }
        self.records.insert(record.name.clone(), record);
        self.writes += 1;
        Ok(())
    }

    fn replace(&mut self, name: &str, record: PlayerRecord) -> Result<(), StoreError> {
        match self.records.get_mut(name) {
            Some(existing) => {
                *existing = record;
                self.writes += 1;
                Ok(())
            }
            None => Err(StoreError::Missing(name.to_string())),
        }
    }
}

/// Whole-table store rewritten to disk on every write
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    records: HashMap<String, PlayerRecord>,
}

impl FileStore {
    /// Loads `path` if it exists, otherwise starts empty
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let records = match fs::read(&path) {
            Ok(bytes) => bincode::deserialize(&bytes)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };
        info!(
            "Player store {} opened with {} records",
            path.display(),
            records.len()
        );
        Ok(Self { path, records })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> Result<(), StoreError> {
        let bytes = bincode::serialize(&self.records)?;
        // Write aside and rename so readers never see a half-written table
        let staging = self.path.with_extension("tmp");
        fs::write(&staging, bytes)?;
        fs::rename(&staging, &self.path)?;
        debug!("Player store flushed to {}", self.path.display());
        Ok(())
    }
}

impl PlayerStore for FileStore {
    fn get(&self, name: &str) -> Result<Option<PlayerRecord>, StoreError> {
        Ok(self.records.get(name).cloned())
    }

    fn insert(&mut self, record: PlayerRecord) -> Result<(), StoreError> {
        if self.records.contains_key(&record.name) {
            return Err(StoreError::Duplicate(record.name));
        }
        self.records.insert(record.name.clone(), record);
        self.flush()
    }

    fn replace(&mut self, name: &str, record: PlayerRecord) -> Result<(), StoreError> {
        match self.records.get_mut(name) {
            Some(existing) => *existing = record,
            None => return Err(StoreError::Missing(name.to_string())),
        }
        self.flush()
    }
}

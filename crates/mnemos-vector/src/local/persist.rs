// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The `{table}.index` / `{table}.data` file pair.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use mnemos_core::{MnemosError, Record};
use serde::{Deserialize, Serialize};

use super::ann::IndexSnapshot;

/// Bumped when either file's layout changes incompatibly.
const FORMAT_VERSION: u32 = 1;

/// Contents of the `.data` file.
#[derive(Debug, Serialize, Deserialize)]
pub struct DataFile {
    pub version: u32,
    pub dimension: usize,
    pub records: Vec<Record>,
}

/// Contents of the `.index` file.
#[derive(Debug, Serialize, Deserialize)]
pub struct IndexFile {
    pub version: u32,
    pub index: IndexSnapshot,
}

/// Paths of one table's file pair.
#[derive(Debug, Clone)]
pub struct FilePair {
    pub index: PathBuf,
    pub data: PathBuf,
}

/// What was found on disk.
#[derive(Debug)]
pub enum Loaded {
    /// Neither file exists.
    Missing,
    Found { data: DataFile, index: IndexFile },
}

impl FilePair {
    pub fn new(dir: &Path, table: &str) -> Self {
        Self {
            index: dir.join(format!("{table}.index")),
            data: dir.join(format!("{table}.data")),
        }
    }

    /// Reads both files. A lone file, an unreadable file, a decode failure, or a
    /// version mismatch is reported as [`MnemosError::CorruptPersistedState`].
    pub async fn load(&self) -> Result<Loaded, MnemosError> {
        let data = read_optional(&self.data).await?;
        let index = read_optional(&self.index).await?;

        let (data, index) = match (data, index) {
            (None, None) => return Ok(Loaded::Missing),
            (Some(d), Some(i)) => (d, i),
            (Some(_), None) => return Err(corrupt(&self.index, "file missing")),
            (None, Some(_)) => return Err(corrupt(&self.data, "file missing")),
        };

        let data: DataFile =
            serde_json::from_slice(&data).map_err(|e| corrupt(&self.data, &e.to_string()))?;
        let index: IndexFile =
            serde_json::from_slice(&index).map_err(|e| corrupt(&self.index, &e.to_string()))?;

        if data.version != FORMAT_VERSION {
            return Err(corrupt(
                &self.data,
                &format!("unsupported format version {}", data.version),
            ));
        }
        if index.version != FORMAT_VERSION {
            return Err(corrupt(
                &self.index,
                &format!("unsupported format version {}", index.version),
            ));
        }
        Ok(Loaded::Found { data, index })
    }

    /// Writes both files, each through a temporary sibling and a rename.
    pub async fn save(
        &self,
        dimension: usize,
        records: &[Record],
        index: IndexSnapshot,
    ) -> Result<(), MnemosError> {
        let data = serde_json::to_vec(&DataFileRef {
            version: FORMAT_VERSION,
            dimension,
            records,
        })
        .map_err(MnemosError::storage)?;
        let index = serde_json::to_vec(&IndexFile {
            version: FORMAT_VERSION,
            index,
        })
        .map_err(MnemosError::storage)?;

        // Data first: an index left stale by a crash between the two is rebuilt on load.
        write_atomic(&self.data, &data).await?;
        write_atomic(&self.index, &index).await
    }

    /// Deletes both files; absent files are fine.
    pub async fn remove(&self) -> Result<(), MnemosError> {
        for path in [&self.index, &self.data] {
            match tokio::fs::remove_file(path).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(MnemosError::storage(e)),
            }
        }
        Ok(())
    }
}

/// Borrowing twin of [`DataFile`] so saving does not clone every record.
#[derive(Serialize)]
struct DataFileRef<'a> {
    version: u32,
    dimension: usize,
    records: &'a [Record],
}

fn corrupt(path: &Path, message: &str) -> MnemosError {
    MnemosError::CorruptPersistedState {
        path: path.to_path_buf(),
        message: message.to_string(),
    }
}

async fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, MnemosError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(corrupt(path, &e.to_string())),
    }
}

/// Writes `bytes` to `path` via `{path}.tmp` so readers never see a partial file.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), MnemosError> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    tokio::fs::write(&tmp, bytes)
        .await
        .map_err(MnemosError::storage)?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(MnemosError::storage)
}

//! Version store persisted as a single JSON document.
//!
//! ```json
//! {
//!   "containers": [{ "name": "api", "tag": "1.1" }],
//!   "version": 1
//! }
//! ```
//!
//! The whole document is loaded into memory; [`flush`](VersionStore::flush)
//! rewrites it atomically with owner-only permissions.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use directories::ProjectDirs;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use super::VersionStore;
use crate::error::StoreError;
use crate::types::ContainerRecord;

/// Highest document version this build understands.
pub const SCHEMA_VERSION: u32 = 1;

const APP_NAME: &str = "telepod";
const ROOT_STATE_DIR: &str = "/var/lib/telepod";
const DB_FILE: &str = "db.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct Document {
    #[serde(default)]
    containers: Vec<Entry>,
    #[serde(default)]
    version: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Entry {
    name: String,
    #[serde(rename = "tag")]
    version: String,
}

pub struct JsonVersionStore {
    path: PathBuf,
    doc: Document,
    index: HashMap<String, usize>,
    dirty: bool,
}

impl JsonVersionStore {
    /// `/var/lib/telepod/db.json` for root, the per-user state directory otherwise.
    pub fn default_path() -> Result<PathBuf, StoreError> {
        if is_root() {
            return Ok(Path::new(ROOT_STATE_DIR).join(DB_FILE));
        }
        let dirs = ProjectDirs::from("", "", APP_NAME).ok_or(StoreError::NoStateDir)?;
        let dir = dirs.state_dir().unwrap_or_else(|| dirs.data_local_dir());
        Ok(dir.join(DB_FILE))
    }

    /// Reads the document at `path`.  A missing file is an empty store.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let doc = match tokio::fs::read(&path).await {
            Ok(data) => {
                let mut doc: Document =
                    serde_json::from_slice(&data).map_err(|source| StoreError::Decode {
                        path: path.clone(),
                        source,
                    })?;
                if doc.version == 0 {
                    doc.version = SCHEMA_VERSION;
                }
                if doc.version > SCHEMA_VERSION {
                    return Err(StoreError::UnsupportedSchema {
                        found: doc.version,
                        supported: SCHEMA_VERSION,
                    });
                }
                doc
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No versions database at {}, starting empty", path.display());
                Document {
                    containers: Vec::new(),
                    version: SCHEMA_VERSION,
                }
            }
            Err(source) => {
                return Err(StoreError::Io {
                    op: "reading",
                    path,
                    source,
                })
            }
        };

        let (containers, index) = index_entries(doc.containers);
        debug!(
            "Loaded {} container versions from {}",
            containers.len(),
            path.display()
        );
        Ok(Self {
            path,
            doc: Document {
                containers,
                version: doc.version,
            },
            index,
            dirty: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.doc.containers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc.containers.is_empty()
    }

    fn entry_mut(&mut self, name: &str) -> Option<&mut Entry> {
        let idx = *self.index.get(name)?;
        self.doc.containers.get_mut(idx)
    }

    async fn write_document(&self) -> Result<(), StoreError> {
        let io_err = |op, source| StoreError::Io {
            op,
            path: self.path.clone(),
            source,
        };

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| io_err("creating directory for", e))?;
        }

        let mut data = serde_json::to_vec_pretty(&self.doc).map_err(StoreError::Encode)?;
        data.push(b'\n');

        let tmp = self.path.with_extension("json.tmp");
        // A leftover temp file would keep its old permissions through the rename.
        match tokio::fs::remove_file(&tmp).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(io_err("removing stale temp file for", e)),
        }

        let written = write_private(&tmp, &data).await;
        let result = match written {
            Ok(()) => tokio::fs::rename(&tmp, &self.path)
                .await
                .map_err(|e| io_err("replacing", e)),
            Err((op, e)) => Err(io_err(op, e)),
        };
        if result.is_err() {
            let _ = tokio::fs::remove_file(&tmp).await;
        }
        result
    }
}

#[async_trait]
impl VersionStore for JsonVersionStore {
    async fn get_container(&self, name: &str) -> Result<ContainerRecord, StoreError> {
        self.index
            .get(name)
            .and_then(|&idx| self.doc.containers.get(idx))
            .map(|e| ContainerRecord::new(e.name.clone(), e.version.clone()))
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    async fn create_container(&mut self, record: &ContainerRecord) -> Result<(), StoreError> {
        if let Some(entry) = self.entry_mut(&record.name) {
            entry.version = record.image_version.clone();
        } else {
            self.index
                .insert(record.name.clone(), self.doc.containers.len());
            self.doc.containers.push(Entry {
                name: record.name.clone(),
                version: record.image_version.clone(),
            });
        }
        self.dirty = true;
        Ok(())
    }

    async fn update_container(&mut self, record: &ContainerRecord) -> Result<(), StoreError> {
        let entry = self
            .entry_mut(&record.name)
            .ok_or_else(|| StoreError::NotFound(record.name.clone()))?;
        entry.version = record.image_version.clone();
        self.dirty = true;
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), StoreError> {
        if !self.dirty {
            return Ok(());
        }
        self.write_document().await?;
        self.dirty = false;
        debug!(
            "Flushed {} container versions to {}",
            self.doc.containers.len(),
            self.path.display()
        );
        Ok(())
    }

    async fn discard_pending(&mut self) -> Result<(), StoreError> {
        if !self.dirty {
            return Ok(());
        }
        info!(
            "Discarding unflushed changes, reloading {}",
            self.path.display()
        );
        *self = Self::load(self.path.clone()).await?;
        Ok(())
    }
}

/// Writes `data` to a fresh owner-only file at `path` and syncs it.
async fn write_private(path: &Path, data: &[u8]) -> Result<(), (&'static str, std::io::Error)> {
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(path)
        .await
        .map_err(|e| ("writing", e))?;
    file.write_all(data).await.map_err(|e| ("writing", e))?;
    file.sync_all().await.map_err(|e| ("syncing", e))
}

/// Builds the name index, collapsing repeated names onto their first
/// position with the last recorded version.
fn index_entries(entries: Vec<Entry>) -> (Vec<Entry>, HashMap<String, usize>) {
    let mut kept: Vec<Entry> = Vec::with_capacity(entries.len());
    let mut index: HashMap<String, usize> = HashMap::with_capacity(entries.len());
    for entry in entries {
        match index.get(&entry.name).and_then(|&idx| kept.get_mut(idx)) {
            Some(existing) => existing.version = entry.version,
            None => {
                index.insert(entry.name.clone(), kept.len());
                kept.push(entry);
            }
        }
    }
    (kept, index)
}

fn is_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}

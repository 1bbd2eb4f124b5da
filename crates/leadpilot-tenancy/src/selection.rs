//! Persisted "current organization" selection, one entry per principal.
//!
//! The store is injected into the organization context; nothing else reads
//! or writes it.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use leadpilot_core::error::{LeadpilotError, LeadpilotResult};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

pub trait SelectionStore: Send + Sync {
    fn load(&self, principal_id: Uuid) -> LeadpilotResult<Option<Uuid>>;
    fn save(&self, principal_id: Uuid, organization_id: Uuid) -> LeadpilotResult<()>;
    fn clear(&self, principal_id: Uuid) -> LeadpilotResult<()>;
}

#[derive(Debug, Default)]
pub struct MemorySelectionStore {
    entries: Mutex<HashMap<Uuid, Uuid>>,
}

impl MemorySelectionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SelectionStore for MemorySelectionStore {
    fn load(&self, principal_id: Uuid) -> LeadpilotResult<Option<Uuid>> {
        Ok(self.entries.lock().get(&principal_id).copied())
    }

    fn save(&self, principal_id: Uuid, organization_id: Uuid) -> LeadpilotResult<()> {
        self.entries.lock().insert(principal_id, organization_id);
        Ok(())
    }

    fn clear(&self, principal_id: Uuid) -> LeadpilotResult<()> {
        self.entries.lock().remove(&principal_id);
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SelectionFile {
    organization_id: Uuid,
}

/// One JSON file per principal under a directory.
#[derive(Debug, Clone)]
pub struct FileSelectionStore {
    dir: PathBuf,
}

impl FileSelectionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, principal_id: Uuid) -> PathBuf {
        self.dir.join(format!("{principal_id}.json"))
    }
}

fn io_error(action: &str, path: &Path, err: std::io::Error) -> LeadpilotError {
    LeadpilotError::Internal(format!("failed to {action} {}: {err}", path.display()))
}

impl SelectionStore for FileSelectionStore {
    fn load(&self, principal_id: Uuid) -> LeadpilotResult<Option<Uuid>> {
        let path = self.path_for(principal_id);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error("read", &path, e)),
        };

        // A corrupt entry is treated as no selection; it is overwritten by
        // the next resolution.
        match serde_json::from_str::<SelectionFile>(&raw) {
            Ok(file) => Ok(Some(file.organization_id)),
            Err(e) => {
                warn!(%principal_id, error = %e, "Ignoring unreadable selection file");
                Ok(None)
            }
        }
    }

    fn save(&self, principal_id: Uuid, organization_id: Uuid) -> LeadpilotResult<()> {
        fs::create_dir_all(&self.dir).map_err(|e| io_error("create", &self.dir, e))?;
        let path = self.path_for(principal_id);
        let body = serde_json::to_string(&SelectionFile { organization_id })
            .map_err(|e| LeadpilotError::Internal(e.to_string()))?;

        // Write then rename so a crash never leaves a half-written file.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, body).map_err(|e| io_error("write", &tmp, e))?;
        fs::rename(&tmp, &path).map_err(|e| io_error("replace", &path, e))
    }

    fn clear(&self, principal_id: Uuid) -> LeadpilotResult<()> {
        let path = self.path_for(principal_id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error("remove", &path, e)),
        }
    }
}

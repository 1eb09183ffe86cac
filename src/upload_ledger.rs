//! In-memory UploadLedger: artifacts whose upload has been confirmed within
//! the current process, keyed by absolute path. Never persisted — the
//! Cleanup Engine's age-based mode is the cross-process equivalent.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};

#[derive(Default)]
pub struct UploadLedger {
    entries: Mutex<HashMap<PathBuf, DateTime<Utc>>>,
}

impl UploadLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, path: PathBuf, uploaded_at: DateTime<Utc>) {
        self.entries.lock().unwrap().insert(path, uploaded_at);
    }

    pub fn uploaded_at(&self, path: &Path) -> Option<DateTime<Utc>> {
        self.entries.lock().unwrap().get(path).copied()
    }

    pub fn remove(&self, path: &Path) {
        self.entries.lock().unwrap().remove(path);
    }

    /// Snapshot of everything currently recorded, for the delete-after-upload
    /// cleanup pass to iterate without holding the lock across awaits.
    pub fn snapshot(&self) -> Vec<(PathBuf, DateTime<Utc>)> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .map(|(p, t)| (p.clone(), *t))
            .collect()
    }
}

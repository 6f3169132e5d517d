//! JSON file [`SessionStore`].
//!
//! The file holds a flat JSON object of string keys so other settings can
//! share it; only [`SESSION_TOKEN_KEY`] is touched here. Writes go to a
//! sibling temp file that is then renamed over the original.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use super::{SESSION_TOKEN_KEY, SessionStore};
use crate::domain::Token;
use crate::error::StoreError;

/// Token store backed by a JSON file.
#[derive(Debug)]
pub struct FileSessionStore {
    path: PathBuf,
    // Serialises read-modify-write cycles within the process.
    lock: Mutex<()>,
}

impl FileSessionStore {
    /// Creates a store over `path`. The file is created on first write.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_document(&self) -> Result<BTreeMap<String, String>, StoreError> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) if raw.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(raw) => serde_json::from_str(&raw).map_err(|e| StoreError::Corrupt(e.to_string())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_document(&self, doc: &BTreeMap<String, String>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let json =
            serde_json::to_string_pretty(doc).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl SessionStore for FileSessionStore {
    fn get(&self) -> Result<Option<Token>, StoreError> {
        let _guard = self.lock.lock();
        let doc = self.read_document()?;
        Ok(doc.get(SESSION_TOKEN_KEY).map(Token::new))
    }

    fn set(&self, token: &Token) -> Result<(), StoreError> {
        let _guard = self.lock.lock();
        let mut doc = self.read_document()?;
        doc.insert(SESSION_TOKEN_KEY.to_string(), token.expose().to_string());
        self.write_document(&doc)?;
        tracing::debug!(path = %self.path.display(), "session token persisted");
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        let _guard = self.lock.lock();
        let mut doc = self.read_document()?;
        if doc.remove(SESSION_TOKEN_KEY).is_some() {
            self.write_document(&doc)?;
            tracing::debug!(path = %self.path.display(), "session token cleared");
        }
        Ok(())
    }
}

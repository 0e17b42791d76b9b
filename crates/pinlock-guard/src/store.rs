//! Persistence for the settings document
//!
//! `SettingsStore` is the only holder of the live `LockSettings`. Every
//! mutation goes through `update`, which writes the new document before it
//! becomes visible in memory, so a crash can never leave an attempt counted
//! in memory but missing on disk.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use pinlock_core::LockSettings;
use tracing::{debug, warn};

use crate::error::StoreError;

/// Default number of write attempts before giving up
pub const DEFAULT_WRITE_ATTEMPTS: u32 = 3;

/// Pause between write attempts
const RETRY_BACKOFF: Duration = Duration::from_millis(20);

/// Durable storage for the settings document
pub trait StateBackend: Send + Sync {
    /// Load the stored document, `None` if nothing has been saved yet
    fn read(&self) -> Result<Option<LockSettings>, StoreError>;

    /// Replace the stored document
    fn write(&self, settings: &LockSettings) -> Result<(), StoreError>;
}

/// JSON file on disk, replaced atomically on every write
#[derive(Debug, Clone)]
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StateBackend for FileBackend {
    fn read(&self) -> Result<Option<LockSettings>, StoreError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&self.path)?;
        Ok(Some(serde_json::from_str(&contents)?))
    }

    fn write(&self, settings: &LockSettings) -> Result<(), StoreError> {
        let contents = serde_json::to_string_pretty(settings)?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Write atomically
        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, &contents)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&temp_path, fs::Permissions::from_mode(0o600))?;
        }

        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }
}

/// In-memory backend with injectable write failures
#[derive(Debug, Default)]
pub struct MemoryBackend {
    stored: Mutex<Option<LockSettings>>,
    failing_writes: AtomicU32,
    writes: AtomicU32,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing document
    pub fn with_settings(settings: LockSettings) -> Self {
        Self {
            stored: Mutex::new(Some(settings)),
            ..Default::default()
        }
    }

    /// Make the next `count` writes fail
    pub fn fail_next_writes(&self, count: u32) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    /// Number of successful writes so far
    pub fn write_count(&self) -> u32 {
        self.writes.load(Ordering::SeqCst)
    }

    /// The last successfully written document
    pub fn stored(&self) -> Option<LockSettings> {
        self.stored
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl StateBackend for MemoryBackend {
    fn read(&self) -> Result<Option<LockSettings>, StoreError> {
        Ok(self.stored())
    }

    fn write(&self, settings: &LockSettings) -> Result<(), StoreError> {
        let remaining = self.failing_writes.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_writes.store(remaining - 1, Ordering::SeqCst);
            return Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "injected write failure",
            )));
        }
        *self.stored.lock().unwrap_or_else(PoisonError::into_inner) = Some(settings.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// Shared handles can be passed straight to the store
impl<T: StateBackend + ?Sized> StateBackend for std::sync::Arc<T> {
    fn read(&self) -> Result<Option<LockSettings>, StoreError> {
        (**self).read()
    }

    fn write(&self, settings: &LockSettings) -> Result<(), StoreError> {
        (**self).write(settings)
    }
}

/// Owner of the live settings document
pub struct SettingsStore {
    backend: Box<dyn StateBackend>,
    current: Mutex<LockSettings>,
    write_attempts: u32,
}

impl SettingsStore {
    /// Load the document from `backend`, falling back to defaults when empty
    pub fn open(backend: impl StateBackend + 'static) -> Result<Self, StoreError> {
        let settings = match backend.read()? {
            Some(settings) => {
                debug!("Loaded settings: {:?}", settings);
                settings
            }
            None => {
                debug!("No stored settings, using defaults");
                LockSettings::default()
            }
        };
        Ok(Self::from_settings(backend, settings))
    }

    /// Like `open`, but an unparseable document is replaced by defaults
    ///
    /// The broken document stays on disk until the next successful write.
    /// IO errors are still returned.
    pub fn open_or_default(backend: impl StateBackend + 'static) -> Result<Self, StoreError> {
        let settings = match backend.read() {
            Ok(settings) => settings.unwrap_or_default(),
            Err(StoreError::Serialization(e)) => {
                warn!("Stored settings are unreadable ({}), starting from defaults", e);
                LockSettings::default()
            }
            Err(e) => return Err(e),
        };
        Ok(Self::from_settings(backend, settings))
    }

    fn from_settings(backend: impl StateBackend + 'static, settings: LockSettings) -> Self {
        Self {
            backend: Box::new(backend),
            current: Mutex::new(settings),
            write_attempts: DEFAULT_WRITE_ATTEMPTS,
        }
    }

    /// Set how many times a write is attempted before failing
    pub fn with_write_attempts(mut self, attempts: u32) -> Self {
        self.write_attempts = attempts.max(1);
        self
    }

    /// Copy of the current document
    pub fn snapshot(&self) -> LockSettings {
        self.lock().clone()
    }

    /// Apply `f` to a copy of the document, persist it, then commit it
    ///
    /// If every write attempt fails the in-memory document is unchanged.
    pub fn update<F>(&self, f: F) -> Result<LockSettings, StoreError>
    where
        F: FnOnce(&mut LockSettings),
    {
        let mut current = self.lock();
        let mut next = current.clone();
        f(&mut next);

        self.write_with_retry(&next)?;
        *current = next.clone();
        Ok(next)
    }

    fn write_with_retry(&self, settings: &LockSettings) -> Result<(), StoreError> {
        let mut attempt = 1;
        loop {
            match self.backend.write(settings) {
                Ok(()) => return Ok(()),
                Err(e) if attempt < self.write_attempts => {
                    warn!(
                        "Failed to persist settings (attempt {}/{}): {}",
                        attempt, self.write_attempts, e
                    );
                    thread::sleep(RETRY_BACKOFF);
                    attempt += 1;
                }
                Err(e) => {
                    return Err(StoreError::RetriesExhausted {
                        attempts: attempt,
                        last: e.to_string(),
                    })
                }
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, LockSettings> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[test]
    fn test_open_empty_uses_defaults() {
        let store = SettingsStore::open(MemoryBackend::new()).unwrap();
        assert_eq!(store.snapshot(), LockSettings::default());
    }

    #[test]
    fn test_update_persists_before_commit() {
        let backend = Arc::new(MemoryBackend::new());
        let store = SettingsStore::open(Arc::clone(&backend)).unwrap();

        store.update(|s| s.attempts = 3).unwrap();

        assert_eq!(store.snapshot().attempts, 3);
        assert_eq!(backend.stored().unwrap().attempts, 3);
        assert_eq!(backend.write_count(), 1);
    }

    #[test]
    fn test_transient_failure_is_retried() {
        let backend = Arc::new(MemoryBackend::new());
        let store = SettingsStore::open(Arc::clone(&backend)).unwrap();

        backend.fail_next_writes(2);
        store.update(|s| s.attempts = 1).unwrap();

        assert_eq!(store.snapshot().attempts, 1);
        assert_eq!(backend.stored().unwrap().attempts, 1);
    }

    #[test]
    fn test_exhausted_retries_leave_memory_unchanged() {
        let backend = Arc::new(MemoryBackend::new());
        let store = SettingsStore::open(Arc::clone(&backend)).unwrap();

        backend.fail_next_writes(DEFAULT_WRITE_ATTEMPTS);
        let err = store.update(|s| s.attempts = 4).unwrap_err();

        assert!(matches!(
            err,
            StoreError::RetriesExhausted { attempts: DEFAULT_WRITE_ATTEMPTS, .. }
        ));
        assert_eq!(store.snapshot().attempts, 0);
        assert!(backend.stored().is_none());
    }

    #[test]
    fn test_file_backend_roundtrip() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("nested").join("state.json");

        {
            let store = SettingsStore::open(FileBackend::new(&path)).unwrap();
            store
                .update(|s| {
                    s.attempts = 2;
                    s.locked_until = 1234;
                })
                .unwrap();
        }

        let reopened = SettingsStore::open(FileBackend::new(&path)).unwrap();
        let settings = reopened.snapshot();
        assert_eq!(settings.attempts, 2);
        assert_eq!(settings.locked_until, 1234);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_file_backend_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("state.json");
        FileBackend::new(&path)
            .write(&LockSettings::default())
            .unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_open_or_default_recovers_garbage() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("state.json");
        fs::write(&path, r#"{"attempts": -1, "passwordHash": "ab"}"#).unwrap();

        let store = SettingsStore::open_or_default(FileBackend::new(&path)).unwrap();
        assert_eq!(store.snapshot(), LockSettings::default());

        // Nothing is rewritten until the first update
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            r#"{"attempts": -1, "passwordHash": "ab"}"#
        );
        store.update(|s| s.attempts = 0).unwrap();
        assert!(SettingsStore::open(FileBackend::new(&path)).is_ok());
    }

    #[test]
    fn test_open_or_default_keeps_valid_document() {
        let backend = Arc::new(MemoryBackend::new());
        backend
            .write(&LockSettings {
                attempts: 3,
                ..Default::default()
            })
            .unwrap();

        let store = SettingsStore::open_or_default(Arc::clone(&backend)).unwrap();
        assert_eq!(store.snapshot().attempts, 3);
    }

    #[test]
    fn test_file_backend_rejects_garbage() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("state.json");
        fs::write(&path, "not json").unwrap();

        assert!(matches!(
            SettingsStore::open(FileBackend::new(&path)),
            Err(StoreError::Serialization(_))
        ));
    }
}

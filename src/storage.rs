use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::errors::{AppError, AppResult};

/// String-keyed device storage. Values are opaque strings, usually JSON.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> AppResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> AppResult<()>;
    fn remove(&self, key: &str) -> AppResult<()>;
}

/// All entries live in one JSON object on disk, rewritten on every change.
pub struct JsonFileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl JsonFileStore {
    pub fn open(path: impl Into<PathBuf>) -> AppResult<Self> {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<BTreeMap<String, String>>(&contents) {
                Ok(entries) => entries,
                Err(err) => {
                    warn!(
                        target: "storage",
                        path = %path.display(),
                        error = ?err,
                        "failed to parse storage file; starting empty"
                    );
                    BTreeMap::new()
                }
            },
            Err(err) if err.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => return Err(AppError::Io(err)),
        };

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist_locked(&self, entries: &BTreeMap<String, String>) -> AppResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let serialized = serde_json::to_string_pretty(entries)?;
        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, serialized)?;
        fs::rename(&staging, &self.path)?;
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> AppResult<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> AppResult<()> {
        let mut entries = self.entries.lock();
        entries.insert(key.to_string(), value.to_string());
        self.persist_locked(&entries)
    }

    fn remove(&self, key: &str) -> AppResult<()> {
        let mut entries = self.entries.lock();
        if entries.remove(key).is_none() {
            return Ok(());
        }
        self.persist_locked(&entries)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.lock().contains_key(key)
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> AppResult<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> AppResult<()> {
        self.entries
            .lock()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> AppResult<()> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

pub fn storage_path(data_dir: &Path, file_name: &str) -> PathBuf {
    data_dir.join(file_name)
}

enum WriteCommand {
    Set { key: String, value: String },
    Remove { key: String },
    Flush(oneshot::Sender<()>),
}

/// Best-effort background persistence. Writes apply in submission order on a
/// blocking worker; failures are logged and dropped.
#[derive(Clone)]
pub struct WriteQueue {
    sender: mpsc::UnboundedSender<WriteCommand>,
    backend: Arc<dyn KeyValueStore>,
}

impl WriteQueue {
    /// Must be called from within a Tokio runtime.
    pub fn spawn(backend: Arc<dyn KeyValueStore>) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<WriteCommand>();
        let worker_backend = Arc::clone(&backend);
        tokio::task::spawn_blocking(move || {
            while let Some(command) = receiver.blocking_recv() {
                apply(worker_backend.as_ref(), command);
            }
            debug!(target: "storage", "write queue closed");
        });
        Self { sender, backend }
    }

    pub fn set(&self, key: &str, value: String) {
        self.submit(WriteCommand::Set {
            key: key.to_string(),
            value,
        });
    }

    pub fn remove(&self, key: &str) {
        self.submit(WriteCommand::Remove {
            key: key.to_string(),
        });
    }

    /// Resolves once every write submitted before the call has been applied.
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.sender.send(WriteCommand::Flush(done)).is_err() {
            return;
        }
        let _ = wait.await;
    }

    /// Reads after draining pending writes. Storage errors read as "absent".
    pub async fn read(&self, key: &str) -> Option<String> {
        self.flush().await;
        match self.backend.get(key) {
            Ok(value) => value,
            Err(err) => {
                warn!(target: "storage", key, error = ?err, "failed to read storage entry");
                None
            }
        }
    }

    fn submit(&self, command: WriteCommand) {
        if self.sender.send(command).is_err() {
            warn!(target: "storage", "write queue is closed; dropping write");
        }
    }
}

fn apply(backend: &dyn KeyValueStore, command: WriteCommand) {
    match command {
        WriteCommand::Set { key, value } => {
            if let Err(err) = backend.set(&key, &value) {
                warn!(target: "storage", key = %key, error = ?err, "failed to persist entry");
            }
        }
        WriteCommand::Remove { key } => {
            if let Err(err) = backend.remove(&key) {
                warn!(target: "storage", key = %key, error = ?err, "failed to remove entry");
            }
        }
        WriteCommand::Flush(done) => {
            let _ = done.send(());
        }
    }
}

use std::collections::BTreeSet;

use parking_lot::RwLock;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::warn;

use crate::storage::WriteQueue;

/// One persisted array entry. Older builds stored visited places as objects
/// carrying their visit date, so both shapes are accepted on read.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum StoredId {
    Bare(i64),
    Visit {
        id: i64,
        #[serde(rename = "visitDate", default)]
        visit_date: Option<String>,
    },
}

impl StoredId {
    pub fn id(&self) -> i64 {
        match self {
            StoredId::Bare(id) => *id,
            StoredId::Visit { id, .. } => *id,
        }
    }
}

/// A set of integer IDs mirrored to a single storage key.
///
/// Nothing is held in memory until the stored set has been read. Toggling an
/// unread set reads it first, so a mutation never overwrites entries it has
/// not seen. Once present, the in-memory copy is authoritative: every mutation
/// updates it synchronously and then queues a write of the whole set. An empty
/// set removes the key instead of storing `[]`.
pub struct PersistedIdSet {
    key: &'static str,
    ids: RwLock<Option<BTreeSet<i64>>>,
    load_gate: Mutex<()>,
    writer: WriteQueue,
}

impl PersistedIdSet {
    pub fn new(key: &'static str, writer: WriteQueue) -> Self {
        Self {
            key,
            ids: RwLock::new(None),
            load_gate: Mutex::new(()),
            writer,
        }
    }

    pub fn is_hydrated(&self) -> bool {
        self.ids.read().is_some()
    }

    /// Flips membership and returns whether `id` is now present.
    pub async fn toggle(&self, id: i64) -> bool {
        self.hydrate().await;
        let mut guard = self.ids.write();
        let ids = guard.get_or_insert_with(BTreeSet::new);
        let present = if ids.remove(&id) {
            false
        } else {
            ids.insert(id);
            true
        };
        self.persist_locked(ids);
        present
    }

    /// Whatever was stored is discarded, so there is nothing to read first.
    pub fn clear(&self) {
        let mut guard = self.ids.write();
        let ids = guard.get_or_insert_with(BTreeSet::new);
        ids.clear();
        self.persist_locked(ids);
    }

    pub fn contains(&self, id: i64) -> bool {
        self.ids
            .read()
            .as_ref()
            .map(|ids| ids.contains(&id))
            .unwrap_or(false)
    }

    pub fn snapshot(&self) -> BTreeSet<i64> {
        self.ids.read().clone().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.ids.read().as_ref().map(BTreeSet::len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reads storage and replaces the in-memory set wholesale. Unreadable
    /// entries are logged and treated as an empty set.
    pub async fn load(&self) -> Vec<StoredId> {
        let _gate = self.load_gate.lock().await;
        self.read_stored().await
    }

    /// Reads storage unless the set is already in memory. Returns the stored
    /// entries only when this call did the read.
    pub async fn hydrate(&self) -> Option<Vec<StoredId>> {
        let _gate = self.load_gate.lock().await;
        if self.is_hydrated() {
            return None;
        }
        Some(self.read_stored().await)
    }

    async fn read_stored(&self) -> Vec<StoredId> {
        let entries = match self.writer.read(self.key).await {
            Some(raw) => decode(self.key, &raw),
            None => Vec::new(),
        };
        let ids = entries.iter().map(StoredId::id).collect::<BTreeSet<_>>();
        *self.ids.write() = Some(ids);
        entries
    }

    fn persist_locked(&self, ids: &BTreeSet<i64>) {
        match encode(ids) {
            Some(Ok(serialized)) => self.writer.set(self.key, serialized),
            Some(Err(err)) => {
                warn!(target: "annotations", key = self.key, error = ?err, "failed to encode id set")
            }
            None => self.writer.remove(self.key),
        }
    }
}

fn encode(ids: &BTreeSet<i64>) -> Option<serde_json::Result<String>> {
    if ids.is_empty() {
        return None;
    }
    Some(serde_json::to_string(&ids.iter().collect::<Vec<_>>()))
}

fn decode(key: &str, raw: &str) -> Vec<StoredId> {
    match serde_json::from_str::<Vec<StoredId>>(raw) {
        Ok(entries) => entries,
        Err(err) => {
            warn!(target: "annotations", key, error = ?err, "ignoring unreadable id set");
            Vec::new()
        }
    }
}

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::Local;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::bridge::{MapBridge, MapCommand, MarkerStatus};
use crate::errors::{AppError, AppResult};
use crate::idset::{PersistedIdSet, StoredId};
use crate::storage::WriteQueue;

pub const VISITED_STORAGE_KEY: &str = "fai_visited_places";
pub const FAVORITES_STORAGE_KEY: &str = "fai_favorites_places";
pub const NOT_INTERESTED_STORAGE_KEY: &str = "fai_not_interested_places";
pub const VISIT_DATES_STORAGE_KEY: &str = "fai_visit_dates";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AnnotationKind {
    Visited,
    Favorite,
    NotInterested,
}

impl AnnotationKind {
    pub const ALL: [AnnotationKind; 3] = [
        AnnotationKind::Visited,
        AnnotationKind::Favorite,
        AnnotationKind::NotInterested,
    ];

    pub fn storage_key(&self) -> &'static str {
        match self {
            AnnotationKind::Visited => VISITED_STORAGE_KEY,
            AnnotationKind::Favorite => FAVORITES_STORAGE_KEY,
            AnnotationKind::NotInterested => NOT_INTERESTED_STORAGE_KEY,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AnnotationKind::Visited => "visited",
            AnnotationKind::Favorite => "favorite",
            AnnotationKind::NotInterested => "notInterested",
        }
    }

    pub fn parse(value: &str) -> AppResult<Self> {
        match value.trim() {
            "visited" => Ok(AnnotationKind::Visited),
            "favorite" | "favorites" => Ok(AnnotationKind::Favorite),
            "notInterested" | "not_interested" => Ok(AnnotationKind::NotInterested),
            _ => Err(AppError::Config(format!("invalid annotation kind: {value}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceStatus {
    pub is_visited: bool,
    pub is_favorite: bool,
    pub is_not_interested: bool,
}

impl PlaceStatus {
    pub fn is_unmarked(&self) -> bool {
        !(self.is_visited || self.is_favorite || self.is_not_interested)
    }

    /// Single visual state when several flags are set.
    pub fn style(&self) -> MarkerStyle {
        if self.is_favorite {
            MarkerStyle::Favorite
        } else if self.is_not_interested {
            MarkerStyle::NotInterested
        } else if self.is_visited {
            MarkerStyle::Visited
        } else {
            MarkerStyle::Default
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MarkerStyle {
    Favorite,
    NotInterested,
    Visited,
    Default,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitedPlace {
    pub id: i64,
    #[serde(default)]
    pub visit_date: String,
}

/// Visited, favorite and not-interested markers for catalog places.
pub struct AnnotationStore {
    visited: PersistedIdSet,
    favorites: PersistedIdSet,
    not_interested: PersistedIdSet,
    visit_dates: RwLock<Option<BTreeMap<i64, String>>>,
    visited_gate: Mutex<()>,
    writer: WriteQueue,
    bridge: RwLock<Option<Arc<MapBridge>>>,
}

impl AnnotationStore {
    pub fn new(writer: WriteQueue) -> Self {
        Self {
            visited: PersistedIdSet::new(VISITED_STORAGE_KEY, writer.clone()),
            favorites: PersistedIdSet::new(FAVORITES_STORAGE_KEY, writer.clone()),
            not_interested: PersistedIdSet::new(NOT_INTERESTED_STORAGE_KEY, writer.clone()),
            visit_dates: RwLock::new(None),
            visited_gate: Mutex::new(()),
            writer,
            bridge: RwLock::new(None),
        }
    }

    pub fn attach_bridge(&self, bridge: Arc<MapBridge>) {
        *self.bridge.write() = Some(bridge);
    }

    pub fn detach_bridge(&self) {
        *self.bridge.write() = None;
    }

    fn set(&self, kind: AnnotationKind) -> &PersistedIdSet {
        match kind {
            AnnotationKind::Visited => &self.visited,
            AnnotationKind::Favorite => &self.favorites,
            AnnotationKind::NotInterested => &self.not_interested,
        }
    }

    /// Flips `id` in the named set and returns the new membership. A set not
    /// yet read from storage is read first; the write back happens in the
    /// background.
    pub async fn toggle(&self, kind: AnnotationKind, id: i64) -> bool {
        if kind == AnnotationKind::Visited {
            self.ensure_visited_loaded().await;
        }
        let present = self.set(kind).toggle(id).await;
        if kind == AnnotationKind::Visited {
            if present {
                let today = Local::now().date_naive().format("%Y-%m-%d").to_string();
                self.update_visit_dates(|dates| {
                    dates.entry(id).or_insert(today);
                });
            } else {
                self.update_visit_dates(|dates| {
                    dates.remove(&id);
                });
            }
        }
        debug!(target: "annotations", kind = kind.as_str(), id, present, "annotation toggled");
        self.notify_bridge(id);
        present
    }

    pub fn clear(&self, kind: AnnotationKind) {
        self.set(kind).clear();
        if kind == AnnotationKind::Visited {
            self.update_visit_dates(BTreeMap::clear);
        }
    }

    /// Replaces the in-memory set with what storage holds.
    pub async fn load(&self, kind: AnnotationKind) -> BTreeSet<i64> {
        if kind == AnnotationKind::Visited {
            let _gate = self.visited_gate.lock().await;
            let entries = self.visited.load().await;
            self.load_visit_dates(entries).await;
        } else {
            self.set(kind).load().await;
        }
        self.set(kind).snapshot()
    }

    /// Loads every set that has no in-memory copy yet.
    pub async fn hydrate(&self) {
        self.ensure_visited_loaded().await;
        self.favorites.hydrate().await;
        self.not_interested.hydrate().await;
    }

    pub async fn flush(&self) {
        self.writer.flush().await;
    }

    pub fn contains(&self, kind: AnnotationKind, id: i64) -> bool {
        self.set(kind).contains(id)
    }

    pub fn snapshot(&self, kind: AnnotationKind) -> BTreeSet<i64> {
        self.set(kind).snapshot()
    }

    pub fn status(&self, id: i64) -> PlaceStatus {
        PlaceStatus {
            is_visited: self.visited.contains(id),
            is_favorite: self.favorites.contains(id),
            is_not_interested: self.not_interested.contains(id),
        }
    }

    /// Visited places with their recorded date; an empty date means unknown.
    pub fn visited_places(&self) -> Vec<VisitedPlace> {
        let dates = self.visit_dates.read();
        self.visited
            .snapshot()
            .into_iter()
            .map(|id| VisitedPlace {
                id,
                visit_date: dates
                    .as_ref()
                    .and_then(|dates| dates.get(&id).cloned())
                    .unwrap_or_default(),
            })
            .collect()
    }

    pub fn set_visit_date(&self, id: i64, date: &str) -> AppResult<()> {
        if !self.visited.contains(id) {
            return Err(AppError::validation(
                "visitDate",
                format!("place {id} is not marked as visited"),
            ));
        }
        let date = date.trim().to_string();
        self.update_visit_dates(|dates| {
            if date.is_empty() {
                dates.remove(&id);
            } else {
                dates.insert(id, date);
            }
        });
        Ok(())
    }

    fn notify_bridge(&self, id: i64) {
        let Some(bridge) = self.bridge.read().clone() else {
            return;
        };
        bridge.send(MapCommand::UpdateMarker {
            data: MarkerStatus {
                id,
                status: self.status(id),
            },
        });
    }

    /// The visited set and its date ledger are read together.
    async fn ensure_visited_loaded(&self) {
        let _gate = self.visited_gate.lock().await;
        if let Some(entries) = self.visited.hydrate().await {
            self.load_visit_dates(entries).await;
        }
    }

    fn update_visit_dates(&self, mutate: impl FnOnce(&mut BTreeMap<i64, String>)) {
        let mut guard = self.visit_dates.write();
        let dates = guard.get_or_insert_with(BTreeMap::new);
        mutate(dates);
        if dates.is_empty() {
            self.writer.remove(VISIT_DATES_STORAGE_KEY);
            return;
        }
        match serde_json::to_string(dates) {
            Ok(serialized) => self.writer.set(VISIT_DATES_STORAGE_KEY, serialized),
            Err(err) => warn!(target: "annotations", error = ?err, "failed to encode visit dates"),
        }
    }

    async fn load_visit_dates(&self, entries: Vec<StoredId>) {
        let mut dates = match self.writer.read(VISIT_DATES_STORAGE_KEY).await {
            Some(raw) => serde_json::from_str::<BTreeMap<i64, String>>(&raw).unwrap_or_else(|err| {
                warn!(target: "annotations", error = ?err, "ignoring unreadable visit dates");
                BTreeMap::new()
            }),
            None => BTreeMap::new(),
        };
        for entry in entries {
            if let StoredId::Visit {
                id,
                visit_date: Some(date),
            } = entry
            {
                if !date.trim().is_empty() {
                    dates.entry(id).or_insert(date);
                }
            }
        }
        *self.visit_dates.write() = Some(dates);
    }
}

use std::collections::BTreeSet;

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::watch;
use tracing::debug;

use crate::catalog::{Category, Place};
use crate::idset::PersistedIdSet;
use crate::storage::WriteQueue;

pub const CATEGORY_FILTERS_STORAGE_KEY: &str = "fai_category_filters";
pub const HIDDEN_CATEGORIES_STORAGE_KEY: &str = "fai_hidden_categories";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryState {
    pub hydrated: bool,
    pub available_categories: Vec<Category>,
    pub selected_categories: BTreeSet<i64>,
    pub hidden_categories: BTreeSet<i64>,
}

/// Process-wide category filters.
///
/// `selected` narrows the map to matching places, `hidden` removes places from
/// statistics. The two are persisted separately and never derived from each
/// other. Until [`CategoryContext::hydrate`] completes both read as empty,
/// which means "no filter".
pub struct CategoryContext {
    available: RwLock<Vec<Category>>,
    selected: PersistedIdSet,
    hidden: PersistedIdSet,
    hydrated: watch::Sender<bool>,
}

impl CategoryContext {
    pub fn new(writer: WriteQueue) -> Self {
        let (hydrated, _) = watch::channel(false);
        Self {
            available: RwLock::new(Vec::new()),
            selected: PersistedIdSet::new(CATEGORY_FILTERS_STORAGE_KEY, writer.clone()),
            hidden: PersistedIdSet::new(HIDDEN_CATEGORIES_STORAGE_KEY, writer),
            hydrated,
        }
    }

    pub async fn hydrate(&self) {
        self.selected.hydrate().await;
        self.hidden.hydrate().await;
        self.hydrated.send_replace(true);
        debug!(
            target: "categories",
            selected = self.selected.len(),
            hidden = self.hidden.len(),
            "category filters hydrated"
        );
    }

    pub fn is_hydrated(&self) -> bool {
        *self.hydrated.borrow()
    }

    pub async fn wait_until_hydrated(&self) {
        let mut receiver = self.hydrated.subscribe();
        let _ = receiver.wait_for(|hydrated| *hydrated).await;
    }

    pub fn available_categories(&self) -> Vec<Category> {
        self.available.read().clone()
    }

    /// Stored as given; callers derive the list from the catalog.
    pub fn set_available_categories(&self, categories: Vec<Category>) {
        *self.available.write() = categories;
    }

    pub async fn toggle_category(&self, category_id: i64) -> bool {
        self.selected.toggle(category_id).await
    }

    pub fn clear_categories(&self) {
        self.selected.clear();
    }

    pub async fn toggle_hidden_category(&self, category_id: i64) -> bool {
        self.hidden.toggle(category_id).await
    }

    pub fn clear_hidden_categories(&self) {
        self.hidden.clear();
    }

    pub fn selected_categories(&self) -> BTreeSet<i64> {
        self.selected.snapshot()
    }

    pub fn hidden_categories(&self) -> BTreeSet<i64> {
        self.hidden.snapshot()
    }

    /// True when no inclusion filter is set or the place carries a selected
    /// category.
    pub fn matches_selection(&self, place: &Place) -> bool {
        self.selected.is_empty() || place.has_any_category(|id| self.selected.contains(id))
    }

    /// Uncategorised places are never hidden.
    pub fn is_hidden(&self, place: &Place) -> bool {
        place.has_any_category(|id| self.hidden.contains(id))
    }

    pub fn state(&self) -> CategoryState {
        CategoryState {
            hydrated: self.is_hydrated(),
            available_categories: self.available_categories(),
            selected_categories: self.selected_categories(),
            hidden_categories: self.hidden_categories(),
        }
    }
}

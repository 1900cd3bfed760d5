pub mod annotations;
pub mod bridge;
pub mod cards;
pub mod catalog;
pub mod categories;
#[cfg(feature = "app")]
mod commands;
pub mod config;
pub mod db;
pub mod documents;
pub mod errors;
mod idset;
pub mod links;
pub mod map;
pub mod secrets;
pub mod stats;
pub mod storage;
pub mod views;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDate;
use once_cell::sync::OnceCell;
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use crate::annotations::{AnnotationKind, AnnotationStore, PlaceStatus};
pub use crate::bridge::{MapBridge, MapCommand, RendererEvent};
pub use crate::cards::{CardData, CardStore};
pub use crate::catalog::{Catalog, CatalogLoader, CatalogOrigin, Place};
pub use crate::categories::{CategoryContext, CategoryState};
pub use crate::config::{AppConfig, PublicAppConfig};
pub use crate::db::{Asset, AssetsDatabase};
pub use crate::documents::{CardDocument, CardDocumentStore};
pub use crate::errors::{AppError, AppResult};
pub use crate::map::MapController;
pub use crate::stats::Statistics;
pub use crate::storage::{JsonFileStore, KeyValueStore, WriteQueue};
pub use crate::views::{ListEntry, ListScreen};

use crate::secrets::SecretVault;
use crate::stats::StatisticsInput;

const VAULT_SERVICE_NAME: &str = "FAInder";

// Every `target:` the crate logs under, plus the crate path for untargeted events.
const LOG_TARGETS: &[&str] = &[
    "fainder_lib",
    "annotations",
    "app_state",
    "card_document",
    "cards",
    "catalog",
    "categories",
    "database_bootstrap",
    "links",
    "map",
    "map_bridge",
    "secret_vault",
    "storage",
];

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppHealth {
    pub storage_path: String,
    pub db_path: String,
    pub db_recovered: bool,
    pub asset_count: i64,
    pub catalog_origin: String,
    pub catalog_size: usize,
    pub has_card: bool,
    pub config: PublicAppConfig,
}

/// Everything the shell shares between commands.
pub struct AppState {
    pub config: AppConfig,
    pub writer: WriteQueue,
    pub annotations: Arc<AnnotationStore>,
    pub categories: Arc<CategoryContext>,
    pub bridge: Arc<MapBridge>,
    pub map: Arc<MapController>,
    pub cards: CardStore,
    pub documents: CardDocumentStore,
    pub assets: AssetsDatabase,
    loader: CatalogLoader,
    storage_path: PathBuf,
}

impl AppState {
    /// Opens local stores under `data_dir` and hydrates persisted state. The
    /// catalog starts empty until [`AppState::reload_catalog`] runs.
    pub async fn initialize(data_dir: &Path, config: AppConfig) -> AppResult<Self> {
        Self::initialize_with_vault(data_dir, config, SecretVault::new(VAULT_SERVICE_NAME)).await
    }

    pub async fn initialize_with_vault(
        data_dir: &Path,
        config: AppConfig,
        vault: SecretVault,
    ) -> AppResult<Self> {
        std::fs::create_dir_all(data_dir)?;
        let storage_path = storage::storage_path(data_dir, &config.storage_file_name);
        let store = JsonFileStore::open(&storage_path)?;
        let writer = WriteQueue::spawn(Arc::new(store));

        let annotations = Arc::new(AnnotationStore::new(writer.clone()));
        let categories = Arc::new(CategoryContext::new(writer.clone()));
        let bridge = Arc::new(MapBridge::new());
        let map = MapController::new(
            Arc::clone(&annotations),
            Arc::clone(&categories),
            Arc::clone(&bridge),
            &config,
        );
        let assets = AssetsDatabase::open(data_dir, &config.database_file_name)?;
        let loader = CatalogLoader::from_config(&config)?;

        annotations.hydrate().await;
        categories.hydrate().await;
        info!(
            target: "app_state",
            storage = %storage_path.display(),
            "application state initialized"
        );

        Ok(Self {
            cards: CardStore::new(vault),
            documents: CardDocumentStore::new(writer.clone()),
            config,
            writer,
            annotations,
            categories,
            bridge,
            map,
            assets,
            loader,
            storage_path,
        })
    }

    /// Fetches the catalog again and swaps it in everywhere.
    pub async fn reload_catalog(&self) -> Arc<Catalog> {
        let catalog = Arc::new(self.loader.load().await);
        self.categories
            .set_available_categories(catalog.available_categories());
        self.map.replace_catalog(Arc::clone(&catalog));
        catalog
    }

    pub async fn toggle_annotation(&self, kind: AnnotationKind, id: i64) -> bool {
        self.annotations.toggle(kind, id).await
    }

    pub fn list(&self, screen: ListScreen) -> Vec<ListEntry> {
        views::derive_list(screen, &self.map.catalog(), &self.annotations)
    }

    pub fn statistics(&self, today: NaiveDate) -> Statistics {
        let catalog = self.map.catalog();
        let visited = self.annotations.visited_places();
        let favorites = self.annotations.snapshot(AnnotationKind::Favorite);
        let not_interested = self.annotations.snapshot(AnnotationKind::NotInterested);
        let hidden_categories = self.categories.hidden_categories();
        Statistics::compute(
            &StatisticsInput {
                places: &catalog.places,
                visited: &visited,
                favorites: &favorites,
                not_interested: &not_interested,
                hidden_categories: &hidden_categories,
            },
            today,
        )
    }

    /// Inclusion filter changes repaint the map.
    pub async fn toggle_category(&self, category_id: i64) -> bool {
        let selected = self.categories.toggle_category(category_id).await;
        self.map.refresh_markers();
        selected
    }

    pub fn clear_categories(&self) {
        self.categories.clear_categories();
        self.map.refresh_markers();
    }

    pub fn health(&self) -> AppResult<AppHealth> {
        let catalog = self.map.catalog();
        Ok(AppHealth {
            storage_path: self.storage_path.to_string_lossy().to_string(),
            db_path: self.assets.path().to_string_lossy().to_string(),
            db_recovered: self.assets.was_recovered(),
            asset_count: self.assets.count()?,
            catalog_origin: catalog.origin.as_str().to_string(),
            catalog_size: catalog.len(),
            has_card: self.cards.has()?,
            config: self.config.public_profile(),
        })
    }

    pub async fn flush(&self) {
        self.writer.flush().await;
    }
}

pub fn init_tracing() {
    static INIT: OnceCell<()> = OnceCell::new();
    let _ = INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_log_directives()));
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init();
    });
}

fn default_log_directives() -> String {
    std::iter::once("info".to_string())
        .chain(LOG_TARGETS.iter().map(|target| format!("{target}=debug")))
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(feature = "app")]
#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    use tauri::Manager;

    tauri::Builder::default()
        .plugin(tauri_plugin_opener::init())
        .setup(|app| {
            init_tracing();
            let config = AppConfig::from_env();
            let data_dir = app.path().app_data_dir()?;
            let state = tauri::async_runtime::block_on(AppState::initialize(&data_dir, config))
                .map_err(|err| -> Box<dyn std::error::Error> { Box::new(err) })?;
            app.manage(state);
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            commands::load_catalog,
            commands::annotation_toggle,
            commands::annotation_clear,
            commands::annotation_status,
            commands::visit_date_set,
            commands::list_places,
            commands::statistics,
            commands::categories_state,
            commands::category_toggle,
            commands::category_clear,
            commands::hidden_category_toggle,
            commands::hidden_category_clear,
            commands::map_attach,
            commands::map_detach,
            commands::map_event,
            commands::map_markers,
            commands::map_focus,
            commands::card_get,
            commands::card_save,
            commands::card_delete,
            commands::card_document_get,
            commands::card_document_save,
            commands::card_document_remove,
            commands::open_link,
            commands::assets_all,
            commands::asset_by_id,
            commands::assets_by_category,
            commands::app_health
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}

use std::sync::Arc;

use chrono::Local;
use serde::Serialize;
use tauri::{AppHandle, Emitter};

use crate::annotations::{AnnotationKind, PlaceStatus};
use crate::bridge::{MarkerPayload, Renderer, RendererEvent};
use crate::cards::CardData;
use crate::catalog::Place;
use crate::categories::CategoryState;
use crate::db::Asset;
use crate::documents::CardDocument;
use crate::errors::{AppError, AppResult};
use crate::links::{open_external_url, ShellOpener};
use crate::stats::Statistics;
use crate::views::{ListEntry, ListScreen};
use crate::{AppHealth, AppState};

const MAP_COMMAND_EVENT: &str = "map-command";

/// Delivers map commands to the webview hosting the renderer.
struct WebviewRenderer {
    app: AppHandle,
}

impl Renderer for WebviewRenderer {
    fn post_message(&self, message: &str) -> AppResult<()> {
        self.app.emit(MAP_COMMAND_EVENT, message)?;
        Ok(())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogSummary {
    pub origin: &'static str,
    pub loaded_at: String,
    pub places: Vec<Place>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleOutcome {
    pub id: i64,
    pub present: bool,
    pub status: PlaceStatus,
}

fn to_message(err: AppError) -> String {
    err.to_string()
}

#[tauri::command]
pub async fn load_catalog(state: tauri::State<'_, AppState>) -> Result<CatalogSummary, String> {
    let catalog = state.reload_catalog().await;
    Ok(CatalogSummary {
        origin: catalog.origin.as_str(),
        loaded_at: catalog.loaded_at.to_rfc3339(),
        places: catalog.places.clone(),
    })
}

#[tauri::command]
pub async fn annotation_toggle(
    state: tauri::State<'_, AppState>,
    kind: String,
    id: i64,
    center: Option<bool>,
) -> Result<ToggleOutcome, String> {
    let kind = AnnotationKind::parse(&kind).map_err(to_message)?;
    let present = if center.unwrap_or(false) {
        state
            .map
            .toggle_and_center(kind, id)
            .await
            .map_err(to_message)?
    } else {
        state.toggle_annotation(kind, id).await
    };
    Ok(ToggleOutcome {
        id,
        present,
        status: state.annotations.status(id),
    })
}

#[tauri::command]
pub async fn annotation_clear(state: tauri::State<'_, AppState>, kind: String) -> Result<(), String> {
    let kind = AnnotationKind::parse(&kind).map_err(to_message)?;
    state.annotations.clear(kind);
    state.map.refresh_markers();
    Ok(())
}

#[tauri::command]
pub async fn annotation_status(
    state: tauri::State<'_, AppState>,
    id: i64,
) -> Result<PlaceStatus, String> {
    Ok(state.annotations.status(id))
}

#[tauri::command]
pub async fn visit_date_set(
    state: tauri::State<'_, AppState>,
    id: i64,
    visit_date: String,
) -> Result<(), String> {
    state
        .annotations
        .set_visit_date(id, &visit_date)
        .map_err(to_message)
}

#[tauri::command]
pub async fn list_places(
    state: tauri::State<'_, AppState>,
    screen: String,
) -> Result<Vec<ListEntry>, String> {
    let screen = ListScreen::parse(&screen).map_err(to_message)?;
    Ok(state.list(screen))
}

#[tauri::command]
pub async fn statistics(state: tauri::State<'_, AppState>) -> Result<Statistics, String> {
    Ok(state.statistics(Local::now().date_naive()))
}

#[tauri::command]
pub async fn categories_state(state: tauri::State<'_, AppState>) -> Result<CategoryState, String> {
    state.categories.wait_until_hydrated().await;
    Ok(state.categories.state())
}

#[tauri::command]
pub async fn category_toggle(
    state: tauri::State<'_, AppState>,
    category_id: i64,
) -> Result<CategoryState, String> {
    state.toggle_category(category_id).await;
    Ok(state.categories.state())
}

#[tauri::command]
pub async fn category_clear(state: tauri::State<'_, AppState>) -> Result<CategoryState, String> {
    state.clear_categories();
    Ok(state.categories.state())
}

#[tauri::command]
pub async fn hidden_category_toggle(
    state: tauri::State<'_, AppState>,
    category_id: i64,
) -> Result<CategoryState, String> {
    state.categories.toggle_hidden_category(category_id).await;
    Ok(state.categories.state())
}

#[tauri::command]
pub async fn hidden_category_clear(
    state: tauri::State<'_, AppState>,
) -> Result<CategoryState, String> {
    state.categories.clear_hidden_categories();
    Ok(state.categories.state())
}

#[tauri::command]
pub async fn map_attach(app: AppHandle, state: tauri::State<'_, AppState>) -> Result<(), String> {
    state.bridge.attach(Arc::new(WebviewRenderer { app }));
    Ok(())
}

#[tauri::command]
pub async fn map_detach(state: tauri::State<'_, AppState>) -> Result<(), String> {
    state.bridge.detach();
    state.map.clear_selection();
    Ok(())
}

/// Entry point for messages posted by the renderer.
#[tauri::command]
pub async fn map_event(
    state: tauri::State<'_, AppState>,
    event: RendererEvent,
) -> Result<Option<Place>, String> {
    Ok(state.map.handle_event(event))
}

#[tauri::command]
pub async fn map_markers(state: tauri::State<'_, AppState>) -> Result<Vec<MarkerPayload>, String> {
    Ok(state.map.markers())
}

#[tauri::command]
pub async fn map_focus(state: tauri::State<'_, AppState>, id: i64) -> Result<bool, String> {
    state.map.focus_place(id).map_err(to_message)
}

#[tauri::command]
pub async fn card_get(state: tauri::State<'_, AppState>) -> Result<Option<CardData>, String> {
    state.cards.get().map_err(to_message)
}

#[tauri::command]
pub async fn card_save(
    state: tauri::State<'_, AppState>,
    card: CardData,
) -> Result<CardData, String> {
    state.cards.save(&card).map_err(to_message)
}

#[tauri::command]
pub async fn card_delete(state: tauri::State<'_, AppState>) -> Result<(), String> {
    state.cards.delete().map_err(to_message)
}

#[tauri::command]
pub async fn card_document_get(
    state: tauri::State<'_, AppState>,
) -> Result<Option<CardDocument>, String> {
    Ok(state.documents.load().await)
}

#[tauri::command]
pub async fn card_document_save(
    state: tauri::State<'_, AppState>,
    uri: String,
    mime_type: Option<String>,
) -> Result<CardDocument, String> {
    state
        .documents
        .save(&uri, mime_type.as_deref())
        .map_err(to_message)
}

#[tauri::command]
pub async fn card_document_remove(state: tauri::State<'_, AppState>) -> Result<(), String> {
    state.documents.remove();
    Ok(())
}

#[tauri::command]
pub async fn open_link(app: AppHandle, url: String) -> Result<(), String> {
    open_external_url(&ShellOpener::new(app), &url).map_err(to_message)
}

#[tauri::command]
pub async fn assets_all(state: tauri::State<'_, AppState>) -> Result<Vec<Asset>, String> {
    state.assets.get_all_assets().map_err(to_message)
}

#[tauri::command]
pub async fn asset_by_id(
    state: tauri::State<'_, AppState>,
    id: i64,
) -> Result<Option<Asset>, String> {
    state.assets.get_asset_by_id(id).map_err(to_message)
}

#[tauri::command]
pub async fn assets_by_category(
    state: tauri::State<'_, AppState>,
    category: String,
) -> Result<Vec<Asset>, String> {
    state.assets.get_assets_by_category(&category).map_err(to_message)
}

#[tauri::command]
pub async fn app_health(state: tauri::State<'_, AppState>) -> Result<AppHealth, String> {
    state.health().map_err(to_message)
}

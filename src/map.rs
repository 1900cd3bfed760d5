use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::annotations::{AnnotationKind, AnnotationStore};
use crate::bridge::{MapBridge, MapCommand, MarkerPayload, RendererEvent};
use crate::catalog::{Catalog, Place};
use crate::categories::CategoryContext;
use crate::config::AppConfig;
use crate::errors::{AppError, AppResult};

/// Map screen state: the current catalog, its markers and the renderer link.
pub struct MapController {
    catalog: RwLock<Arc<Catalog>>,
    annotations: Arc<AnnotationStore>,
    categories: Arc<CategoryContext>,
    bridge: Arc<MapBridge>,
    focus_zoom: u8,
}

impl MapController {
    pub fn new(
        annotations: Arc<AnnotationStore>,
        categories: Arc<CategoryContext>,
        bridge: Arc<MapBridge>,
        config: &AppConfig,
    ) -> Arc<Self> {
        let controller = Arc::new(Self {
            catalog: RwLock::new(Arc::new(Catalog::empty())),
            annotations: Arc::clone(&annotations),
            categories,
            bridge: Arc::clone(&bridge),
            focus_zoom: config.focus_zoom,
        });

        let weak: Weak<Self> = Arc::downgrade(&controller);
        bridge.set_snapshot_provider(move || {
            weak.upgrade()
                .map(|controller| controller.markers())
                .unwrap_or_default()
        });
        annotations.attach_bridge(bridge);
        controller
    }

    pub fn catalog(&self) -> Arc<Catalog> {
        Arc::clone(&self.catalog.read())
    }

    /// Swaps in a freshly loaded catalog and repaints a live renderer.
    pub fn replace_catalog(&self, catalog: Arc<Catalog>) {
        info!(
            target: "map",
            places = catalog.len(),
            origin = catalog.origin.as_str(),
            "catalog replaced"
        );
        *self.catalog.write() = catalog;
        self.refresh_markers();
    }

    /// Catalog places passing the inclusion filter, with their current status.
    pub fn markers(&self) -> Vec<MarkerPayload> {
        let catalog = self.catalog();
        catalog
            .places
            .iter()
            .filter(|place| self.categories.matches_selection(place))
            .map(|place| self.marker_for(place))
            .collect()
    }

    /// Resends the full marker set, e.g. after the category filter changed.
    pub fn refresh_markers(&self) -> bool {
        if !self.bridge.is_ready() {
            return false;
        }
        self.bridge.send(MapCommand::LoadMarkers {
            data: self.markers(),
        })
    }

    pub fn sync_visited(&self) -> bool {
        let visited = self
            .annotations
            .snapshot(AnnotationKind::Visited)
            .into_iter()
            .collect();
        self.bridge.send(MapCommand::SetVisitedStatus { data: visited })
    }

    /// Feeds a renderer event through the bridge; a marker press resolves to
    /// the catalog place it refers to.
    pub fn handle_event(&self, event: RendererEvent) -> Option<Place> {
        let selection = self.bridge.handle_event(event)?;
        let place = self.catalog().get(selection.id).cloned();
        if place.is_none() {
            debug!(target: "map", id = selection.id, "selected marker is not in the catalog");
        }
        place
    }

    pub fn handle_message(&self, message: &str) -> AppResult<Option<Place>> {
        let event = serde_json::from_str::<RendererEvent>(message)?;
        Ok(self.handle_event(event))
    }

    /// Place behind the last pressed marker, if it is still in the catalog.
    pub fn selected_place(&self) -> Option<Place> {
        let selection = self.bridge.selection()?;
        self.catalog().get(selection.id).cloned()
    }

    pub fn clear_selection(&self) {
        self.bridge.clear_selection();
    }

    pub fn focus_place(&self, id: i64) -> AppResult<bool> {
        let catalog = self.catalog();
        let place = catalog
            .get(id)
            .ok_or_else(|| AppError::Config(format!("unknown place: {id}")))?;
        Ok(self.bridge.send(MapCommand::SetCenter {
            lat: place.lat,
            lng: place.lng,
            zoom: Some(self.focus_zoom),
        }))
    }

    /// Toggle, repaint and recenter as three independent steps. A failed
    /// recenter does not undo the toggle.
    pub async fn toggle_and_center(&self, kind: AnnotationKind, id: i64) -> AppResult<bool> {
        if self.catalog().get(id).is_none() {
            return Err(AppError::Config(format!("unknown place: {id}")));
        }
        let present = self.annotations.toggle(kind, id).await;
        self.focus_place(id)?;
        Ok(present)
    }

    fn marker_for(&self, place: &Place) -> MarkerPayload {
        let status = self.annotations.status(place.id);
        MarkerPayload {
            id: place.id,
            title: place.display_title(),
            lat: place.lat,
            lng: place.lng,
            url: place.url.clone(),
            status,
            style: status.style(),
        }
    }
}

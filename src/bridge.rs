use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::annotations::{MarkerStyle, PlaceStatus};
use crate::errors::{AppError, AppResult};

/// App to renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum MapCommand {
    SetCenter {
        lat: f64,
        lng: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        zoom: Option<u8>,
    },
    UpdateMarker {
        data: MarkerStatus,
    },
    SetVisitedStatus {
        data: Vec<i64>,
    },
    LoadMarkers {
        data: Vec<MarkerPayload>,
    },
}

impl MapCommand {
    pub fn kind(&self) -> &'static str {
        match self {
            MapCommand::SetCenter { .. } => "setCenter",
            MapCommand::UpdateMarker { .. } => "updateMarker",
            MapCommand::SetVisitedStatus { .. } => "setVisitedStatus",
            MapCommand::LoadMarkers { .. } => "loadMarkers",
        }
    }
}

/// Renderer to app.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RendererEvent {
    Ready,
    MarkerPress { data: MarkerSelection },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkerStatus {
    pub id: i64,
    #[serde(flatten)]
    pub status: PlaceStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkerPayload {
    pub id: i64,
    pub title: String,
    pub lat: f64,
    pub lng: f64,
    pub url: String,
    #[serde(flatten)]
    pub status: PlaceStatus,
    pub style: MarkerStyle,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkerSelection {
    pub id: i64,
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub is_visited: bool,
}

/// Transport into the embedded renderer. Messages are serialized commands,
/// delivered postMessage-style without acknowledgement.
pub trait Renderer: Send + Sync {
    fn post_message(&self, message: &str) -> AppResult<()>;
}

/// Forwards messages to an in-process receiver.
pub struct ChannelRenderer {
    sender: mpsc::UnboundedSender<String>,
}

impl ChannelRenderer {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl Renderer for ChannelRenderer {
    fn post_message(&self, message: &str) -> AppResult<()> {
        self.sender
            .send(message.to_string())
            .map_err(|_| AppError::ExternalResource("map renderer channel closed".into()))
    }
}

type SnapshotProvider = Arc<dyn Fn() -> Vec<MarkerPayload> + Send + Sync>;

struct Attachment {
    renderer: Arc<dyn Renderer>,
    ready: bool,
    initial_sent: bool,
}

/// Control channel into the map renderer plus the selection it reports back.
///
/// Commands are dropped while no renderer is attached or before it has
/// announced `ready`. The initial marker set goes out once per attachment,
/// in response to `ready`.
#[derive(Default)]
pub struct MapBridge {
    attachment: RwLock<Option<Attachment>>,
    snapshot: RwLock<Option<SnapshotProvider>>,
    selection: RwLock<Option<MarkerSelection>>,
}

impl MapBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, renderer: Arc<dyn Renderer>) {
        *self.attachment.write() = Some(Attachment {
            renderer,
            ready: false,
            initial_sent: false,
        });
        debug!(target: "map_bridge", "renderer attached");
    }

    pub fn detach(&self) {
        if self.attachment.write().take().is_some() {
            debug!(target: "map_bridge", "renderer detached");
        }
    }

    pub fn is_ready(&self) -> bool {
        self.attachment
            .read()
            .as_ref()
            .map(|attachment| attachment.ready)
            .unwrap_or(false)
    }

    pub fn set_snapshot_provider(&self, provider: impl Fn() -> Vec<MarkerPayload> + Send + Sync + 'static) {
        *self.snapshot.write() = Some(Arc::new(provider));
    }

    /// Returns whether the command reached the renderer.
    pub fn send(&self, command: MapCommand) -> bool {
        let renderer = match self.attachment.read().as_ref() {
            Some(attachment) if attachment.ready => Arc::clone(&attachment.renderer),
            _ => {
                debug!(target: "map_bridge", command = command.kind(), "renderer not ready; dropping command");
                return false;
            }
        };
        deliver(renderer.as_ref(), &command)
    }

    pub fn handle_event(&self, event: RendererEvent) -> Option<MarkerSelection> {
        match event {
            RendererEvent::Ready => {
                self.on_ready();
                None
            }
            RendererEvent::MarkerPress { data } => {
                debug!(target: "map_bridge", id = data.id, "marker pressed");
                *self.selection.write() = Some(data.clone());
                Some(data)
            }
        }
    }

    pub fn handle_message(&self, message: &str) -> AppResult<Option<MarkerSelection>> {
        let event = serde_json::from_str::<RendererEvent>(message)?;
        Ok(self.handle_event(event))
    }

    pub fn selection(&self) -> Option<MarkerSelection> {
        self.selection.read().clone()
    }

    pub fn clear_selection(&self) {
        *self.selection.write() = None;
    }

    fn on_ready(&self) {
        let renderer = {
            let mut guard = self.attachment.write();
            let Some(attachment) = guard.as_mut() else {
                warn!(target: "map_bridge", "ready signal without an attached renderer");
                return;
            };
            attachment.ready = true;
            if attachment.initial_sent {
                return;
            }
            attachment.initial_sent = true;
            Arc::clone(&attachment.renderer)
        };

        let provider = self.snapshot.read().clone();
        let markers = provider.map(|snapshot| snapshot()).unwrap_or_default();
        info!(target: "map_bridge", markers = markers.len(), "renderer ready; sending initial markers");
        deliver(renderer.as_ref(), &MapCommand::LoadMarkers { data: markers });
    }
}

fn deliver(renderer: &dyn Renderer, command: &MapCommand) -> bool {
    let message = match serde_json::to_string(command) {
        Ok(message) => message,
        Err(err) => {
            warn!(target: "map_bridge", command = command.kind(), error = ?err, "failed to encode command");
            return false;
        }
    };
    match renderer.post_message(&message) {
        Ok(()) => true,
        Err(err) => {
            warn!(target: "map_bridge", command = command.kind(), error = %err, "failed to post command");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;

    fn ready_bridge() -> (MapBridge, mpsc::UnboundedReceiver<String>) {
        let bridge = MapBridge::new();
        let (renderer, receiver) = ChannelRenderer::new();
        bridge.attach(Arc::new(renderer));
        bridge.handle_event(RendererEvent::Ready);
        (bridge, receiver)
    }

    #[test]
    fn commands_use_tagged_wire_shape() {
        let command = MapCommand::UpdateMarker {
            data: MarkerStatus {
                id: 42,
                status: PlaceStatus {
                    is_visited: true,
                    is_favorite: false,
                    is_not_interested: false,
                },
            },
        };
        assert_eq!(
            serde_json::to_value(&command).unwrap(),
            json!({
                "type": "updateMarker",
                "data": { "id": 42, "isVisited": true, "isFavorite": false, "isNotInterested": false }
            })
        );
        assert_eq!(
            serde_json::to_value(MapCommand::SetCenter { lat: 1.5, lng: 2.5, zoom: None }).unwrap(),
            json!({ "type": "setCenter", "lat": 1.5, "lng": 2.5 })
        );
    }

    #[test]
    fn parses_marker_press() {
        let bridge = MapBridge::new();
        let selection = bridge
            .handle_message(
                r#"{"type":"markerPress","data":{"id":7,"title":"Villa","url":"https://x","isVisited":true}}"#,
            )
            .unwrap()
            .unwrap();
        assert_eq!(selection.id, 7);
        assert!(selection.is_visited);
        assert_eq!(bridge.selection(), Some(selection));
        assert!(bridge.handle_message(r#"{"type":"unknown"}"#).is_err());
    }

    #[test]
    fn drops_commands_until_ready() {
        let bridge = MapBridge::new();
        assert!(!bridge.send(MapCommand::SetVisitedStatus { data: vec![1] }));

        let (renderer, mut receiver) = ChannelRenderer::new();
        bridge.attach(Arc::new(renderer));
        assert!(!bridge.send(MapCommand::SetVisitedStatus { data: vec![1] }));
        assert!(receiver.try_recv().is_err());

        bridge.handle_event(RendererEvent::Ready);
        assert!(bridge.send(MapCommand::SetVisitedStatus { data: vec![1] }));
    }

    #[test]
    fn sends_initial_markers_once_per_attachment() {
        let bridge = MapBridge::new();
        bridge.set_snapshot_provider(|| {
            vec![MarkerPayload {
                id: 1,
                title: "Villa".into(),
                lat: 45.0,
                lng: 9.0,
                url: "https://x".into(),
                status: PlaceStatus::default(),
                style: MarkerStyle::Default,
            }]
        });
        let (renderer, mut receiver) = ChannelRenderer::new();
        bridge.attach(Arc::new(renderer));

        bridge.handle_event(RendererEvent::Ready);
        bridge.handle_event(RendererEvent::Ready);

        let first: Value = serde_json::from_str(&receiver.try_recv().unwrap()).unwrap();
        assert_eq!(first["type"], "loadMarkers");
        assert_eq!(first["data"][0]["style"], "default");
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn detach_stops_delivery() {
        let (bridge, mut receiver) = ready_bridge();
        let _ = receiver.try_recv();
        bridge.detach();
        assert!(!bridge.is_ready());
        assert!(!bridge.send(MapCommand::SetCenter { lat: 0.0, lng: 0.0, zoom: Some(3) }));
        assert!(receiver.try_recv().is_err());
    }
}

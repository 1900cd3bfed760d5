use std::sync::Arc;

use httptest::matchers::request;
use httptest::responders::{json_encoded, status_code};
use httptest::{Expectation, Server};
use serde_json::{json, Value};
use tempfile::tempdir;

use fainder_lib::bridge::ChannelRenderer;
use fainder_lib::{AppConfig, AppState, CatalogOrigin, ListScreen, RendererEvent};

fn config_for(server: &Server) -> AppConfig {
    AppConfig {
        catalog_url: server.url_str("/beni-fai.json"),
        catalog_connect_timeout_ms: 2_000,
        ..AppConfig::default()
    }
}

#[tokio::test]
async fn server_error_falls_back_to_bundled_catalog() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("GET", "/beni-fai.json"))
            .respond_with(status_code(500)),
    );
    let dir = tempdir().unwrap();
    let state = AppState::initialize(dir.path(), config_for(&server))
        .await
        .unwrap();

    let catalog = state.reload_catalog().await;
    assert_eq!(catalog.origin, CatalogOrigin::Bundled);
    assert_eq!(catalog.len(), 6);
    assert_eq!(state.categories.available_categories().len(), 5);

    let (renderer, mut receiver) = ChannelRenderer::new();
    state.bridge.attach(Arc::new(renderer));
    state.map.handle_event(RendererEvent::Ready);

    let message: Value = serde_json::from_str(&receiver.try_recv().unwrap()).unwrap();
    assert_eq!(message["type"], "loadMarkers");
    assert_eq!(message["data"].as_array().unwrap().len(), 6);
}

#[tokio::test]
async fn remote_catalog_wins_when_available() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("GET", "/beni-fai.json")).respond_with(
            json_encoded(json!([
                {
                    "id": 7,
                    "title": "Torre di Velate",
                    "lat": 45.85,
                    "lng": 8.8,
                    "url": "https://fondoambiente.it/luoghi/torre-di-velate",
                    "categories": null
                },
                {
                    "id": 8,
                    "title": "Bosco di San Francesco",
                    "lat": 43.07,
                    "lng": 12.6,
                    "url": "https://fondoambiente.it/luoghi/bosco-di-san-francesco",
                    "description": "Bosco &amp; abbazia",
                    "categories": [{ "id": 5, "name": "Aree naturali" }]
                }
            ])),
        ),
    );
    let dir = tempdir().unwrap();
    let state = AppState::initialize(dir.path(), config_for(&server))
        .await
        .unwrap();

    let catalog = state.reload_catalog().await;
    assert_eq!(catalog.origin, CatalogOrigin::Remote);
    assert_eq!(catalog.len(), 2);

    let others = state.list(ListScreen::AllOthers);
    let titles = others.iter().map(|entry| entry.title.as_str()).collect::<Vec<_>>();
    assert_eq!(titles, vec!["Bosco di San Francesco", "Torre di Velate"]);
    assert_eq!(others[0].description.as_deref(), Some("Bosco & abbazia"));
}

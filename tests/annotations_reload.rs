use chrono::NaiveDate;
use httptest::matchers::request;
use httptest::responders::status_code;
use httptest::{Expectation, Server};
use tempfile::tempdir;

use fainder_lib::{AnnotationKind, AppConfig, AppState, ListScreen};

fn offline_config(server: &Server) -> AppConfig {
    server.expect(
        Expectation::matching(request::method_path("GET", "/beni-fai.json"))
            .times(..)
            .respond_with(status_code(503)),
    );
    AppConfig {
        catalog_url: server.url_str("/beni-fai.json"),
        ..AppConfig::default()
    }
}

#[tokio::test]
async fn annotations_and_filters_survive_restart() {
    let server = Server::run();
    let config = offline_config(&server);
    let dir = tempdir().unwrap();

    {
        let state = AppState::initialize(dir.path(), config.clone()).await.unwrap();
        assert!(state.toggle_annotation(AnnotationKind::Favorite, 42).await);
        assert!(state.toggle_annotation(AnnotationKind::Visited, 101).await);
        state.categories.toggle_hidden_category(3).await;
        state.flush().await;
    }

    let state = AppState::initialize(dir.path(), config).await.unwrap();
    assert!(state.annotations.contains(AnnotationKind::Favorite, 42));
    assert!(state.annotations.contains(AnnotationKind::Visited, 101));
    assert!(state.categories.is_hydrated());
    assert!(state.categories.hidden_categories().contains(&3));

    state.reload_catalog().await;
    let visited = state.list(ListScreen::Visited);
    assert_eq!(visited.len(), 1);
    assert_eq!(visited[0].title, "Villa del Balbianello");
    assert_eq!(state.list(ListScreen::AllOthers).len(), 5);
}

#[tokio::test]
async fn statistics_follow_annotations() {
    let server = Server::run();
    let dir = tempdir().unwrap();
    let state = AppState::initialize(dir.path(), offline_config(&server))
        .await
        .unwrap();
    state.reload_catalog().await;

    state.toggle_annotation(AnnotationKind::Visited, 101).await;
    state.toggle_annotation(AnnotationKind::Visited, 103).await;
    state.toggle_annotation(AnnotationKind::Favorite, 104).await;
    state.toggle_annotation(AnnotationKind::Favorite, 999).await;
    state.annotations.set_visit_date(101, "2024-07-14").unwrap();
    state.annotations.set_visit_date(103, "2024-01-02").unwrap();

    let today = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
    let stats = state.statistics(today);
    assert_eq!(stats.total_visits, 2);
    assert_eq!(stats.total_favorites, 1);
    assert_eq!(stats.visits_by_year.get(&2024), Some(&2));

    state.categories.toggle_hidden_category(3).await;
    let stats = state.statistics(today);
    assert_eq!(stats.total_visits, 1);
}

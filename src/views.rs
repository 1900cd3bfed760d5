use serde::{Deserialize, Serialize};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::annotations::{AnnotationStore, PlaceStatus};
use crate::catalog::{Catalog, Place};
use crate::errors::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ListScreen {
    Favorites,
    Visited,
    NotInterested,
    AllOthers,
}

impl ListScreen {
    pub fn parse(value: &str) -> AppResult<Self> {
        match value.trim() {
            "favorites" => Ok(ListScreen::Favorites),
            "visited" => Ok(ListScreen::Visited),
            "notInterested" => Ok(ListScreen::NotInterested),
            "allOthers" => Ok(ListScreen::AllOthers),
            _ => Err(AppError::Config(format!("invalid list screen: {value}"))),
        }
    }

    pub fn includes(&self, status: &PlaceStatus) -> bool {
        match self {
            ListScreen::Favorites => status.is_favorite,
            ListScreen::Visited => status.is_visited,
            ListScreen::NotInterested => status.is_not_interested,
            ListScreen::AllOthers => status.is_unmarked(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListEntry {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub url: String,
    pub lat: f64,
    pub lng: f64,
    pub status: PlaceStatus,
}

/// Key for base-level comparison: accents and case are ignored, so
/// "àlbero" sorts with "albero" and before "Banana".
pub fn collation_key(text: &str) -> String {
    text.nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Places belonging to `screen`, alphabetically. Equal keys keep catalog order.
pub fn filter_places<'a>(
    screen: ListScreen,
    places: &'a [Place],
    status_of: impl Fn(i64) -> PlaceStatus,
) -> Vec<&'a Place> {
    let mut matching = places
        .iter()
        .filter(|place| screen.includes(&status_of(place.id)))
        .collect::<Vec<_>>();
    matching.sort_by_cached_key(|place| collation_key(&place.display_title()));
    matching
}

pub fn derive_list(
    screen: ListScreen,
    catalog: &Catalog,
    annotations: &AnnotationStore,
) -> Vec<ListEntry> {
    filter_places(screen, &catalog.places, |id| annotations.status(id))
        .into_iter()
        .map(|place| ListEntry {
            id: place.id,
            title: place.display_title(),
            description: place.description_preview(),
            url: place.url.clone(),
            lat: place.lat,
            lng: place.lng,
            status: annotations.status(place.id),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn place(id: i64, title: &str) -> Place {
        Place {
            id,
            title: title.into(),
            lat: 0.0,
            lng: 0.0,
            url: format!("https://example.com/{id}"),
            description: None,
            categories: Vec::new(),
        }
    }

    #[test]
    fn italian_base_collation() {
        let places = vec![place(1, "Zebra"), place(2, "àlbero"), place(3, "Banana")];
        let sorted = filter_places(ListScreen::AllOthers, &places, |_| PlaceStatus::default())
            .into_iter()
            .map(|p| p.title.as_str())
            .collect::<Vec<_>>();
        assert_eq!(sorted, vec!["àlbero", "Banana", "Zebra"]);
    }

    #[test]
    fn equal_keys_keep_catalog_order() {
        let places = vec![place(1, "Villa"), place(2, "villa"), place(3, "VÌLLA")];
        let ids = filter_places(ListScreen::AllOthers, &places, |_| PlaceStatus::default())
            .into_iter()
            .map(|p| p.id)
            .collect::<Vec<_>>();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn membership_drives_each_screen() {
        let places = vec![place(1, "A"), place(2, "B"), place(3, "C")];
        let statuses = HashMap::from([
            (
                1,
                PlaceStatus {
                    is_visited: true,
                    is_favorite: true,
                    is_not_interested: false,
                },
            ),
            (
                2,
                PlaceStatus {
                    is_not_interested: true,
                    ..PlaceStatus::default()
                },
            ),
        ]);
        let status_of = |id| statuses.get(&id).copied().unwrap_or_default();
        let ids = |screen| {
            filter_places(screen, &places, status_of)
                .into_iter()
                .map(|p| p.id)
                .collect::<Vec<_>>()
        };

        assert_eq!(ids(ListScreen::Favorites), vec![1]);
        assert_eq!(ids(ListScreen::Visited), vec![1]);
        assert_eq!(ids(ListScreen::NotInterested), vec![2]);
        assert_eq!(ids(ListScreen::AllOthers), vec![3]);
    }

    #[test]
    fn parses_screen_names() {
        assert_eq!(ListScreen::parse("allOthers").unwrap(), ListScreen::AllOthers);
        assert!(ListScreen::parse("everything").is_err());
    }
}

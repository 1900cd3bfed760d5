use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::errors::AppResult;
use crate::views::collation_key;

const BUNDLED_CATALOG: &str = include_str!("../data/beni-fai.json");
const DESCRIPTION_PREVIEW_CHARS: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub id: i64,
    pub title: String,
    pub lat: f64,
    pub lng: f64,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub categories: Vec<Category>,
}

impl Place {
    pub fn has_any_category(&self, matches: impl Fn(i64) -> bool) -> bool {
        self.categories.iter().any(|category| matches(category.id))
    }

    pub fn display_title(&self) -> String {
        decode_html_entities(&self.title)
    }

    pub fn description_preview(&self) -> Option<String> {
        self.description
            .as_deref()
            .map(|text| truncate_text(&decode_html_entities(text), DESCRIPTION_PREVIEW_CHARS))
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<Category>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<Category>>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CatalogOrigin {
    Remote,
    Bundled,
    Empty,
}

impl CatalogOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            CatalogOrigin::Remote => "remote",
            CatalogOrigin::Bundled => "bundled",
            CatalogOrigin::Empty => "empty",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Catalog {
    pub places: Vec<Place>,
    pub origin: CatalogOrigin,
    pub loaded_at: DateTime<Utc>,
}

impl Catalog {
    pub fn new(places: Vec<Place>, origin: CatalogOrigin) -> Self {
        Self {
            places,
            origin,
            loaded_at: Utc::now(),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new(), CatalogOrigin::Empty)
    }

    pub fn len(&self) -> usize {
        self.places.len()
    }

    pub fn is_empty(&self) -> bool {
        self.places.is_empty()
    }

    pub fn get(&self, id: i64) -> Option<&Place> {
        self.places.iter().find(|place| place.id == id)
    }

    /// Categories referenced by the catalog, one per ID (first occurrence
    /// wins), ordered by name.
    pub fn available_categories(&self) -> Vec<Category> {
        let mut seen = HashSet::new();
        let mut categories = self
            .places
            .iter()
            .flat_map(|place| place.categories.iter())
            .filter(|category| seen.insert(category.id))
            .cloned()
            .collect::<Vec<_>>();
        categories.sort_by_cached_key(|category| collation_key(&category.name));
        categories
    }
}

#[async_trait]
pub trait PlaceSource: Send + Sync {
    fn origin(&self) -> CatalogOrigin;
    async fn fetch(&self) -> AppResult<Vec<Place>>;
}

pub struct RemoteCatalog {
    http: Client,
    url: String,
}

impl RemoteCatalog {
    pub fn new(url: impl Into<String>, connect_timeout: Duration) -> AppResult<Self> {
        let http = Client::builder()
            .user_agent(concat!("fainder/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(connect_timeout)
            .build()?;
        Ok(Self {
            http,
            url: url.into(),
        })
    }
}

#[async_trait]
impl PlaceSource for RemoteCatalog {
    fn origin(&self) -> CatalogOrigin {
        CatalogOrigin::Remote
    }

    async fn fetch(&self) -> AppResult<Vec<Place>> {
        let response = self.http.get(&self.url).send().await?.error_for_status()?;
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

/// The copy shipped with the app, optionally replaced by a file on disk.
#[derive(Default)]
pub struct BundledCatalog {
    override_path: Option<PathBuf>,
}

impl BundledCatalog {
    pub fn new(override_path: Option<PathBuf>) -> Self {
        Self { override_path }
    }
}

#[async_trait]
impl PlaceSource for BundledCatalog {
    fn origin(&self) -> CatalogOrigin {
        CatalogOrigin::Bundled
    }

    async fn fetch(&self) -> AppResult<Vec<Place>> {
        match &self.override_path {
            Some(path) => Ok(serde_json::from_str(&fs::read_to_string(path)?)?),
            None => Ok(serde_json::from_str(BUNDLED_CATALOG)?),
        }
    }
}

pub struct CatalogLoader {
    primary: Box<dyn PlaceSource>,
    fallback: Box<dyn PlaceSource>,
}

impl CatalogLoader {
    pub fn from_config(config: &AppConfig) -> AppResult<Self> {
        let remote = RemoteCatalog::new(
            config.catalog_url.clone(),
            Duration::from_millis(config.catalog_connect_timeout_ms),
        )?;
        Ok(Self::with_sources(
            Box::new(remote),
            Box::new(BundledCatalog::new(config.catalog_fallback_path.clone())),
        ))
    }

    pub fn with_sources(primary: Box<dyn PlaceSource>, fallback: Box<dyn PlaceSource>) -> Self {
        Self { primary, fallback }
    }

    /// Single attempt against the primary source, then the fallback. Never
    /// fails: if both sources are unusable the catalog is empty.
    pub async fn load(&self) -> Catalog {
        match self.primary.fetch().await {
            Ok(places) => {
                info!(
                    target: "catalog",
                    origin = self.primary.origin().as_str(),
                    count = places.len(),
                    "catalog loaded"
                );
                return Catalog::new(places, self.primary.origin());
            }
            Err(err) => warn!(
                target: "catalog",
                origin = self.primary.origin().as_str(),
                error = %err,
                "catalog fetch failed; using fallback copy"
            ),
        }

        match self.fallback.fetch().await {
            Ok(places) => {
                info!(
                    target: "catalog",
                    origin = self.fallback.origin().as_str(),
                    count = places.len(),
                    "fallback catalog loaded"
                );
                Catalog::new(places, self.fallback.origin())
            }
            Err(err) => {
                error!(
                    target: "catalog",
                    origin = self.fallback.origin().as_str(),
                    error = %err,
                    "fallback catalog unavailable"
                );
                Catalog::empty()
            }
        }
    }
}

const NAMED_ENTITIES: &[(&str, &str)] = &[
    ("quot", "\""),
    ("amp", "&"),
    ("lt", "<"),
    ("gt", ">"),
    ("apos", "'"),
    ("agrave", "à"),
    ("egrave", "è"),
    ("eacute", "é"),
    ("igrave", "ì"),
    ("ograve", "ò"),
    ("ugrave", "ù"),
    ("Agrave", "À"),
    ("Egrave", "È"),
    ("Eacute", "É"),
    ("Igrave", "Ì"),
    ("Ograve", "Ò"),
    ("Ugrave", "Ù"),
    ("nbsp", " "),
    ("euro", "€"),
    ("ndash", "–"),
    ("mdash", "—"),
    ("lsquo", "'"),
    ("rsquo", "'"),
    ("ldquo", "\""),
    ("rdquo", "\""),
    ("hellip", "…"),
];

/// Decodes the named entities found in catalog text plus numeric references.
/// Unknown entities are left as written.
pub fn decode_html_entities(text: &str) -> String {
    let mut decoded = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find('&') {
        decoded.push_str(&rest[..start]);
        let candidate = &rest[start + 1..];
        let replacement = candidate
            .find(';')
            .filter(|end| *end > 0 && *end <= 10)
            .and_then(|end| resolve_entity(&candidate[..end]).map(|value| (value, end)));
        match replacement {
            Some((value, end)) => {
                decoded.push_str(&value);
                rest = &candidate[end + 1..];
            }
            None => {
                decoded.push('&');
                rest = candidate;
            }
        }
    }
    decoded.push_str(rest);
    decoded
}

fn resolve_entity(name: &str) -> Option<String> {
    if let Some(numeric) = name.strip_prefix('#') {
        let code = match numeric.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => numeric.parse::<u32>().ok()?,
        };
        return char::from_u32(code).map(String::from);
    }
    NAMED_ENTITIES
        .iter()
        .find(|(entity, _)| *entity == name)
        .map(|(_, value)| value.to_string())
}

pub fn truncate_text(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let head = text.chars().take(max_chars).collect::<String>();
    format!("{}...", head.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AppError;

    struct FailingSource;

    #[async_trait]
    impl PlaceSource for FailingSource {
        fn origin(&self) -> CatalogOrigin {
            CatalogOrigin::Remote
        }

        async fn fetch(&self) -> AppResult<Vec<Place>> {
            Err(AppError::Config("offline".into()))
        }
    }

    #[test]
    fn bundled_catalog_parses() {
        let places: Vec<Place> = serde_json::from_str(BUNDLED_CATALOG).unwrap();
        assert!(!places.is_empty());
        let olivetti = places.iter().find(|p| p.id == 104).unwrap();
        assert!(olivetti.categories.is_empty());
    }

    #[test]
    fn null_categories_become_empty() {
        let place: Place = serde_json::from_str(
            r#"{"id":1,"title":"A","lat":1.0,"lng":2.0,"url":"https://x","categories":null}"#,
        )
        .unwrap();
        assert!(place.categories.is_empty());
        assert_eq!(place.description, None);
    }

    #[tokio::test]
    async fn both_sources_failing_yields_empty_catalog() {
        let loader = CatalogLoader::with_sources(Box::new(FailingSource), Box::new(FailingSource));
        let catalog = loader.load().await;
        assert_eq!(catalog.origin, CatalogOrigin::Empty);
        assert!(catalog.is_empty());
    }

    #[tokio::test]
    async fn falls_back_to_bundled_copy() {
        let loader = CatalogLoader::with_sources(
            Box::new(FailingSource),
            Box::new(BundledCatalog::default()),
        );
        let catalog = loader.load().await;
        assert_eq!(catalog.origin, CatalogOrigin::Bundled);
        assert_eq!(catalog.len(), 6);
    }

    #[test]
    fn available_categories_are_unique_and_sorted() {
        let catalog = Catalog::new(
            serde_json::from_str(BUNDLED_CATALOG).unwrap(),
            CatalogOrigin::Bundled,
        );
        let names = catalog
            .available_categories()
            .into_iter()
            .map(|c| c.name)
            .collect::<Vec<_>>();
        assert_eq!(
            names,
            vec![
                "Abbazie e chiese",
                "Aree naturali",
                "Castelli",
                "Giardini",
                "Ville e palazzi"
            ]
        );
    }

    #[test]
    fn decodes_named_and_numeric_entities() {
        assert_eq!(
            decode_html_entities("Un&#39;abbazia &egrave; &quot;bella&quot; &amp; &#x41;"),
            "Un'abbazia è \"bella\" & A"
        );
        assert_eq!(decode_html_entities("R&D &unknown; &"), "R&D &unknown; &");
    }

    #[test]
    fn truncates_on_char_boundaries() {
        assert_eq!(truncate_text("breve", 200), "breve");
        let long = "è".repeat(210);
        let truncated = truncate_text(&long, 200);
        assert!(truncated.ends_with("..."));
        assert_eq!(truncated.chars().count(), 203);
    }
}

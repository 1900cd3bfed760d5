use std::path::PathBuf;
use std::{env, io};

use serde::Serialize;
use tracing::debug;

pub const DEFAULT_CATALOG_URL: &str =
    "https://raw.githubusercontent.com/GiacomoGuaresi/FAInder/main/data/beni-fai.json";
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_FOCUS_ZOOM: u8 = 15;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub catalog_url: String,
    pub catalog_fallback_path: Option<PathBuf>,
    pub catalog_connect_timeout_ms: u64,
    pub storage_file_name: String,
    pub database_file_name: String,
    pub focus_zoom: u8,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicAppConfig {
    pub catalog_url: String,
    pub has_catalog_fallback_override: bool,
    pub catalog_connect_timeout_ms: u64,
    pub storage_file_name: String,
    pub database_file_name: String,
    pub focus_zoom: u8,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            catalog_url: DEFAULT_CATALOG_URL.to_string(),
            catalog_fallback_path: None,
            catalog_connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            storage_file_name: "fainder-storage.json".to_string(),
            database_file_name: "assets.db".to_string(),
            focus_zoom: DEFAULT_FOCUS_ZOOM,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        load_dotenv_if_applicable();
        let defaults = Self::default();
        Self {
            catalog_url: env::var("FAI_CATALOG_URL")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.catalog_url),
            catalog_fallback_path: env::var("FAI_CATALOG_FALLBACK_PATH")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
            catalog_connect_timeout_ms: parse_u64(
                "FAI_CATALOG_CONNECT_TIMEOUT_MS",
                defaults.catalog_connect_timeout_ms,
            )
            .max(1),
            storage_file_name: env::var("FAI_STORAGE_FILE_NAME")
                .unwrap_or(defaults.storage_file_name),
            database_file_name: env::var("FAI_DATABASE_FILE_NAME")
                .unwrap_or(defaults.database_file_name),
            focus_zoom: parse_zoom("FAI_FOCUS_ZOOM", defaults.focus_zoom),
        }
    }

    pub fn public_profile(&self) -> PublicAppConfig {
        PublicAppConfig {
            catalog_url: self.catalog_url.clone(),
            has_catalog_fallback_override: self.catalog_fallback_path.is_some(),
            catalog_connect_timeout_ms: self.catalog_connect_timeout_ms,
            storage_file_name: self.storage_file_name.clone(),
            database_file_name: self.database_file_name.clone(),
            focus_zoom: self.focus_zoom,
        }
    }
}

fn load_dotenv_if_applicable() {
    if !should_load_dotenv() {
        debug!("skipping .env load outside dev mode");
        return;
    }

    if let Err(err) = dotenvy::dotenv() {
        match &err {
            dotenvy::Error::Io(io_err) if io_err.kind() == io::ErrorKind::NotFound => {}
            _ => debug!(?err, "unable to load .env file"),
        }
    }
}

fn should_load_dotenv() -> bool {
    cfg!(debug_assertions) || parse_bool("ALLOW_DOTENV", false)
}

fn parse_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "True"))
        .unwrap_or(default)
}

fn parse_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

// Map tiles stop at zoom 19.
fn parse_zoom(key: &str, default: u8) -> u8 {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u8>().ok())
        .map(|zoom| zoom.min(19))
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_overrides_and_builds_public_profile() {
        env::set_var("FAI_CATALOG_URL", "https://example.com/beni.json");
        env::set_var("FAI_CATALOG_FALLBACK_PATH", "/tmp/beni-fai.json");
        env::set_var("FAI_DATABASE_FILE_NAME", "custom.db");
        env::set_var("FAI_FOCUS_ZOOM", "42");

        let config = AppConfig::from_env();
        let public = config.public_profile();

        assert_eq!(public.catalog_url, "https://example.com/beni.json");
        assert!(public.has_catalog_fallback_override);
        assert_eq!(public.database_file_name, "custom.db");
        assert_eq!(public.focus_zoom, 19);
    }
}

use reqwest::Url;
use tracing::{info, warn};

use crate::errors::{AppError, AppResult};

/// Hands a URL to whatever the platform uses for external links.
pub trait LinkOpener: Send + Sync {
    fn open(&self, url: &Url) -> AppResult<()>;
}

/// Only absolute http(s) links leave the app.
pub fn parse_external_url(raw: &str) -> AppResult<Url> {
    let url = Url::parse(raw.trim())
        .map_err(|err| AppError::ExternalResource(format!("{raw}: {err}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(AppError::ExternalResource(format!(
            "{raw}: unsupported scheme {scheme}"
        ))),
    }
}

pub fn open_external_url(opener: &dyn LinkOpener, raw: &str) -> AppResult<()> {
    let url = match parse_external_url(raw) {
        Ok(url) => url,
        Err(err) => {
            warn!(target: "links", url = raw, error = %err, "refusing to open link");
            return Err(err);
        }
    };
    opener.open(&url)?;
    info!(target: "links", host = url.host_str().unwrap_or_default(), "opened external link");
    Ok(())
}

#[cfg(feature = "app")]
pub struct ShellOpener {
    app: tauri::AppHandle,
}

#[cfg(feature = "app")]
impl ShellOpener {
    pub fn new(app: tauri::AppHandle) -> Self {
        Self { app }
    }
}

#[cfg(feature = "app")]
impl LinkOpener for ShellOpener {
    fn open(&self, url: &Url) -> AppResult<()> {
        use tauri_plugin_opener::OpenerExt;

        self.app
            .opener()
            .open_url(url.as_str(), None::<&str>)
            .map_err(|err| AppError::ExternalResource(format!("{url}: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;

    #[derive(Default)]
    struct RecordingOpener {
        opened: Mutex<Vec<String>>,
    }

    impl LinkOpener for RecordingOpener {
        fn open(&self, url: &Url) -> AppResult<()> {
            self.opened.lock().push(url.to_string());
            Ok(())
        }
    }

    #[test]
    fn opens_web_links_only() {
        let opener = RecordingOpener::default();
        open_external_url(&opener, " https://fondoambiente.it/luoghi/villa ").unwrap();
        assert!(open_external_url(&opener, "javascript:alert(1)").is_err());
        assert!(open_external_url(&opener, "not a url").is_err());

        assert_eq!(
            opener.opened.lock().as_slice(),
            ["https://fondoambiente.it/luoghi/villa"]
        );
    }
}

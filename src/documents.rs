use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::errors::{AppError, AppResult};
use crate::storage::WriteQueue;

pub const CARD_DOCUMENT_STORAGE_KEY: &str = "fai_card_pdf";
pub const DEFAULT_DOCUMENT_MIME: &str = "application/pdf";

const ALLOWED_MIME_TYPES: [&str; 4] = ["application/pdf", "image/jpeg", "image/png", "image/jpg"];

/// Reference to a user-picked file showing the membership card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardDocument {
    pub uri: String,
    pub mime_type: String,
}

impl CardDocument {
    pub fn is_pdf(&self) -> bool {
        self.mime_type == DEFAULT_DOCUMENT_MIME
    }
}

pub struct CardDocumentStore {
    writer: WriteQueue,
}

impl CardDocumentStore {
    pub fn new(writer: WriteQueue) -> Self {
        Self { writer }
    }

    pub fn save(&self, uri: &str, mime_type: Option<&str>) -> AppResult<CardDocument> {
        let uri = uri.trim();
        if uri.is_empty() {
            return Err(AppError::validation("uri", "No document selected"));
        }
        let mime_type = mime_type
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or(DEFAULT_DOCUMENT_MIME)
            .to_ascii_lowercase();
        if !ALLOWED_MIME_TYPES.contains(&mime_type.as_str()) {
            return Err(AppError::validation(
                "mimeType",
                format!("Unsupported document type: {mime_type}"),
            ));
        }

        let document = CardDocument {
            uri: uri.to_string(),
            mime_type,
        };
        self.writer
            .set(CARD_DOCUMENT_STORAGE_KEY, serde_json::to_string(&document)?);
        info!(target: "card_document", mime = %document.mime_type, "card document saved");
        Ok(document)
    }

    pub async fn load(&self) -> Option<CardDocument> {
        let raw = self.writer.read(CARD_DOCUMENT_STORAGE_KEY).await?;
        match serde_json::from_str(&raw) {
            Ok(document) => Some(document),
            Err(err) => {
                warn!(target: "card_document", error = %err, "stored card document is unreadable");
                None
            }
        }
    }

    pub fn remove(&self) {
        self.writer.remove(CARD_DOCUMENT_STORAGE_KEY);
        info!(target: "card_document", "card document removed");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::storage::{KeyValueStore, MemoryStore};

    #[tokio::test]
    async fn saves_with_default_type() {
        let store = CardDocumentStore::new(WriteQueue::spawn(Arc::new(MemoryStore::new())));
        let saved = store.save("file:///card.pdf", None).unwrap();
        assert!(saved.is_pdf());
        assert_eq!(store.load().await, Some(saved));

        store.remove();
        assert!(store.load().await.is_none());
    }

    #[tokio::test]
    async fn rejects_unsupported_types() {
        let store = CardDocumentStore::new(WriteQueue::spawn(Arc::new(MemoryStore::new())));
        assert!(store.save("file:///card.gif", Some("image/gif")).is_err());
        assert!(store.save("  ", Some("image/png")).is_err());
        let image = store.save("file:///card.png", Some("IMAGE/PNG")).unwrap();
        assert_eq!(image.mime_type, "image/png");
    }

    #[tokio::test]
    async fn unreadable_payload_loads_as_none() {
        let backend = Arc::new(MemoryStore::new());
        backend.set(CARD_DOCUMENT_STORAGE_KEY, "file:///legacy.pdf").unwrap();
        let store = CardDocumentStore::new(WriteQueue::spawn(backend));
        assert!(store.load().await.is_none());
    }
}

//! Display-only preview references for the selected image.
//!
//! Each [`PreviewHandle`] owns one registry entry and releases it on drop, so a
//! session that replaces its handle never leaves a dangling preview behind.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use shared::domain::ImageFile;
use uuid::Uuid;

const PREVIEW_URL_PREFIX: &str = "blob:cropcare/";

struct PreviewEntry {
    mime_type: String,
    bytes: Vec<u8>,
}

#[derive(Clone, Default)]
pub struct PreviewRegistry {
    entries: Arc<Mutex<HashMap<Uuid, PreviewEntry>>>,
}

impl PreviewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, image: &ImageFile) -> PreviewHandle {
        let id = Uuid::new_v4();
        self.lock().insert(
            id,
            PreviewEntry {
                mime_type: image.mime_or_default().to_string(),
                bytes: image.bytes.clone(),
            },
        );
        tracing::debug!(preview = %id, file = %image.file_name, "preview created");
        PreviewHandle {
            id,
            url: format!("{PREVIEW_URL_PREFIX}{id}"),
            registry: self.clone(),
        }
    }

    pub fn live_count(&self) -> usize {
        self.lock().len()
    }

    pub fn is_live(&self, url: &str) -> bool {
        parse_preview_id(url).is_some_and(|id| self.lock().contains_key(&id))
    }

    /// Resolves a live preview URL into a `data:` URI for renderers.
    pub fn data_url(&self, url: &str) -> Option<String> {
        let id = parse_preview_id(url)?;
        let guard = self.lock();
        let entry = guard.get(&id)?;
        Some(format!(
            "data:{};base64,{}",
            entry.mime_type,
            STANDARD.encode(&entry.bytes)
        ))
    }

    fn release(&self, id: Uuid) {
        if self.lock().remove(&id).is_some() {
            tracing::debug!(preview = %id, "preview released");
        }
    }

    // A panic while holding the lock cannot leave the map half-updated.
    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, PreviewEntry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn parse_preview_id(url: &str) -> Option<Uuid> {
    url.strip_prefix(PREVIEW_URL_PREFIX)
        .and_then(|raw| Uuid::parse_str(raw).ok())
}

pub struct PreviewHandle {
    id: Uuid,
    url: String,
    registry: PreviewRegistry,
}

impl PreviewHandle {
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl std::fmt::Debug for PreviewHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PreviewHandle").field(&self.url).finish()
    }
}

impl Drop for PreviewHandle {
    fn drop(&mut self) {
        self.registry.release(self.id);
    }
}

//! Explorer core: key listing, per-key editors and the session that wires them.

pub mod abortable;
pub mod details;
pub mod editors;
pub mod error;
pub mod keys;
pub mod redis_client;
pub mod scanner;
pub mod sources;
pub mod store;
pub mod value_format;

#[cfg(test)]
pub(crate) mod testing;

pub use details::{DetailsController, DetailsView};
pub use editors::TypeEditor;
pub use error::{ErrorCode, StoreError};
pub use keys::{KeyState, KeyStatus, KeysController, KeysStatus, KeysView};
pub use redis_client::RedisStore;
pub use store::{Key, KeyType, NewKeyValue, StoreClient};

use crate::config::{ConnectionProfile, ExplorerSettings};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// One session against one store: the key listing and the detail pane,
/// torn down together.
pub struct Explorer {
    store: Arc<dyn StoreClient>,
    keys: KeysController,
    details: DetailsController,
    cancel: CancellationToken,
}

impl Explorer {
    pub fn new(store: Arc<dyn StoreClient>, settings: &ExplorerSettings) -> Self {
        let cancel = CancellationToken::new();
        Self {
            keys: KeysController::new(store.clone(), settings, cancel.child_token()),
            details: DetailsController::new(
                store.clone(),
                settings.elements_page_size,
                cancel.child_token(),
            ),
            store,
            cancel,
        }
    }

    pub async fn connect(
        profile: &ConnectionProfile,
        settings: &ExplorerSettings,
    ) -> Result<Self, StoreError> {
        let store = RedisStore::connect(profile).await?;
        Ok(Self::new(Arc::new(store), settings))
    }

    pub fn store(&self) -> Arc<dyn StoreClient> {
        self.store.clone()
    }

    pub fn keys(&self) -> &KeysController {
        &self.keys
    }

    pub fn details(&self) -> &DetailsController {
        &self.details
    }

    /// Selects `name` in the listing and opens its editor.
    pub async fn open_key(&self, name: &str) -> Result<Arc<TypeEditor>, StoreError> {
        let key = self
            .keys
            .select(name)
            .then(|| self.keys.selected_key())
            .flatten()
            .ok_or_else(|| StoreError::KeyNotFound(name.to_string()))?;
        match self.details.open(&key).await {
            Ok(editor) => Ok(editor),
            Err(e) => {
                self.reconcile(&e);
                Err(e)
            }
        }
    }

    pub fn close_details(&self) {
        self.details.close();
        self.keys.clear_selection();
    }

    /// Deletes a key. Its detail pane closes first, abandoning any load in
    /// flight, and is reopened when the store refuses the delete.
    pub async fn delete_key(&self, name: &str) -> Result<(), StoreError> {
        let was_open = self.details.close_if(name);
        let result = self.keys.delete(name).await;
        if let Err(e) = &result {
            if was_open && !e.is_not_found() && !self.is_closed() {
                log::warn!("delete of '{}' failed, reopening its details", name);
                if let Err(reopen) = self.open_key(name).await {
                    log::warn!("could not reopen '{}': {}", name, reopen);
                }
            }
        }
        result
    }

    /// Creates a key, shows it in the detail pane and lists it as selected.
    pub async fn create_key(
        &self,
        name: &str,
        value: &NewKeyValue,
    ) -> Result<Arc<TypeEditor>, StoreError> {
        let editor = self.details.create(name, value).await?;
        self.keys.add(Key::new(name, value.key_type()));
        Ok(editor)
    }

    /// Applies the recovery a not-found failure calls for; other errors are left alone.
    /// Returns whether anything was reconciled.
    pub fn reconcile(&self, error: &StoreError) -> bool {
        match error {
            StoreError::KeyNotFound(name) => {
                log::warn!("key '{}' no longer exists, dropping it", name);
                self.details.close_if(name);
                self.keys.remove(name);
                true
            }
            // The editor already dropped the element locally.
            StoreError::ElementNotFound { .. } => true,
            _ => false,
        }
    }

    /// Cancels everything in flight. No state is published afterwards.
    pub fn shutdown(&self) {
        if !self.cancel.is_cancelled() {
            log::info!("closing explorer session");
            self.cancel.cancel();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for Explorer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

use super::collection::{CollectionEditor, CollectionView};
use super::ElementStatus;
use crate::explorer::error::StoreError;
use crate::explorer::sources::{parse_pattern, HashSource, PatternFilter};
use crate::explorer::store::{HashElement, StoreClient};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

pub struct HashEditor {
    store: Arc<dyn StoreClient>,
    inner: CollectionEditor<HashSource>,
}

impl HashEditor {
    pub fn new(
        store: Arc<dyn StoreClient>,
        key: &str,
        page_size: usize,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            inner: CollectionEditor::new(
                key,
                HashSource::new(store.clone(), key),
                page_size,
                cancel,
            ),
            store,
        }
    }

    pub fn key(&self) -> &str {
        self.inner.key()
    }

    pub fn collection(&self) -> &CollectionEditor<HashSource> {
        &self.inner
    }

    pub fn subscribe(&self) -> watch::Receiver<CollectionView<HashElement>> {
        self.inner.subscribe()
    }

    pub fn view(&self) -> CollectionView<HashElement> {
        self.inner.view()
    }

    pub fn elements(&self) -> Vec<HashElement> {
        self.inner.scanner().elements()
    }

    pub async fn load(&self) -> Result<(), StoreError> {
        self.inner.load().await
    }

    /// Filters fields by glob; an empty pattern shows every field.
    pub async fn filter(&self, pattern: &str) -> Result<(), StoreError> {
        let pattern = parse_pattern(pattern)
            .map_err(|e| {
                StoreError::InvalidInput(format!("Invalid pattern '{}': {}", pattern, e))
            })?;
        self.inner.filter(PatternFilter { pattern }).await
    }

    pub async fn load_more(&self) -> Result<(), StoreError> {
        self.inner.load_more().await
    }

    pub async fn create(&self, fields: &[HashElement]) -> Result<(), StoreError> {
        let written = self.store.create_hash_key(self.key(), fields).await?;
        self.inner.seed(written);
        Ok(())
    }

    pub fn begin_edit(&self, field: &str) -> bool {
        self.inner.begin_edit(&field.to_string())
    }

    pub fn cancel_edit(&self, field: &str) {
        self.inner.cancel_edit(&field.to_string())
    }

    pub async fn update_element(&self, field: &str, value: &str) -> Result<(), StoreError> {
        let id = field.to_string();
        let written = self
            .inner
            .mutate(
                &id,
                ElementStatus::Updating,
                self.store.set_hash_field(self.key(), field, value),
            )
            .await?;
        if let Some(write) = written {
            self.inner.apply_update(&id, write.element);
        }
        Ok(())
    }

    pub async fn delete_element(&self, field: &str) -> Result<(), StoreError> {
        let id = field.to_string();
        let deleted = self
            .inner
            .mutate(
                &id,
                ElementStatus::Deleting,
                self.store.delete_hash_field(self.key(), field),
            )
            .await?;
        if deleted.is_some() {
            self.inner.apply_delete(&id);
        }
        Ok(())
    }

    /// Sets `field`, creating it when absent. Returns whether the field is new,
    /// `None` if the editor was discarded meanwhile.
    pub async fn add_element(&self, field: &str, value: &str) -> Result<Option<bool>, StoreError> {
        let written = self
            .inner
            .add(self.store.set_hash_field(self.key(), field, value))
            .await?;
        Ok(written.map(|write| write.added))
    }
}

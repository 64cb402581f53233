use super::collection::{CollectionEditor, CollectionView};
use super::ElementStatus;
use crate::explorer::error::StoreError;
use crate::explorer::sources::{parse_pattern, PatternFilter, SetSource};
use crate::explorer::store::{SetElement, StoreClient};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

pub struct SetEditor {
    store: Arc<dyn StoreClient>,
    inner: CollectionEditor<SetSource>,
}

impl SetEditor {
    pub fn new(
        store: Arc<dyn StoreClient>,
        key: &str,
        page_size: usize,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            inner: CollectionEditor::new(
                key,
                SetSource::new(store.clone(), key),
                page_size,
                cancel,
            ),
            store,
        }
    }

    pub fn key(&self) -> &str {
        self.inner.key()
    }

    pub fn collection(&self) -> &CollectionEditor<SetSource> {
        &self.inner
    }

    pub fn subscribe(&self) -> watch::Receiver<CollectionView<SetElement>> {
        self.inner.subscribe()
    }

    pub fn view(&self) -> CollectionView<SetElement> {
        self.inner.view()
    }

    pub fn elements(&self) -> Vec<SetElement> {
        self.inner.scanner().elements()
    }

    pub async fn load(&self) -> Result<(), StoreError> {
        self.inner.load().await
    }

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

    pub async fn create(&self, members: &[String]) -> Result<(), StoreError> {
        let written = self.store.create_set_key(self.key(), members).await?;
        self.inner.seed(written);
        Ok(())
    }

    pub fn begin_edit(&self, member: &str) -> bool {
        self.inner.begin_edit(&member.to_string())
    }

    pub fn cancel_edit(&self, member: &str) {
        self.inner.cancel_edit(&member.to_string())
    }

    /// Replaces `member` with `value`. The member's identity changes, so the
    /// old row is removed and the new one merged.
    pub async fn update_element(&self, member: &str, value: &str) -> Result<(), StoreError> {
        let id = member.to_string();
        let written = self
            .inner
            .mutate(
                &id,
                ElementStatus::Updating,
                self.store.replace_set_member(self.key(), member, value),
            )
            .await?;
        if let Some(write) = written {
            self.inner.apply_update(&id, write.element);
        }
        Ok(())
    }

    pub async fn delete_element(&self, member: &str) -> Result<(), StoreError> {
        let id = member.to_string();
        let deleted = self
            .inner
            .mutate(
                &id,
                ElementStatus::Deleting,
                self.store.delete_set_member(self.key(), member),
            )
            .await?;
        if deleted.is_some() {
            self.inner.apply_delete(&id);
        }
        Ok(())
    }

    /// Adds a member; `Some(false)` when it was already present.
    pub async fn add_element(&self, value: &str) -> Result<Option<bool>, StoreError> {
        let written = self
            .inner
            .add(self.store.add_set_member(self.key(), value))
            .await?;
        Ok(written.map(|write| write.added))
    }
}

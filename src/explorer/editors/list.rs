use super::collection::{CollectionEditor, CollectionView};
use super::ElementStatus;
use crate::explorer::error::StoreError;
use crate::explorer::sources::{IndexFilter, ListSource};
use crate::explorer::store::{ListElement, ListPosition, StoreClient};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

pub struct ListEditor {
    store: Arc<dyn StoreClient>,
    inner: CollectionEditor<ListSource>,
}

impl ListEditor {
    pub fn new(
        store: Arc<dyn StoreClient>,
        key: &str,
        page_size: usize,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            inner: CollectionEditor::new(
                key,
                ListSource::new(store.clone(), key),
                page_size,
                cancel,
            ),
            store,
        }
    }

    pub fn key(&self) -> &str {
        self.inner.key()
    }

    pub fn collection(&self) -> &CollectionEditor<ListSource> {
        &self.inner
    }

    pub fn subscribe(&self) -> watch::Receiver<CollectionView<ListElement>> {
        self.inner.subscribe()
    }

    pub fn view(&self) -> CollectionView<ListElement> {
        self.inner.view()
    }

    pub fn elements(&self) -> Vec<ListElement> {
        self.inner.scanner().elements()
    }

    pub async fn load(&self) -> Result<(), StoreError> {
        self.inner.load().await
    }

    /// `Some(index)` looks up a single element; `None` pages through the list.
    pub async fn filter(&self, index: Option<i64>) -> Result<(), StoreError> {
        self.inner.filter(IndexFilter { index }).await
    }

    pub async fn load_more(&self) -> Result<(), StoreError> {
        self.inner.load_more().await
    }

    pub async fn create(&self, values: &[String]) -> Result<(), StoreError> {
        let written = self.store.create_list_key(self.key(), values).await?;
        self.inner.seed(written);
        Ok(())
    }

    pub fn begin_edit(&self, index: i64) -> bool {
        self.inner.begin_edit(&index.to_string())
    }

    pub fn cancel_edit(&self, index: i64) {
        self.inner.cancel_edit(&index.to_string())
    }

    pub async fn update_element(&self, index: i64, value: &str) -> Result<(), StoreError> {
        let id = index.to_string();
        let written = self
            .inner
            .mutate(
                &id,
                ElementStatus::Updating,
                self.store.set_list_element(self.key(), index, value),
            )
            .await?;
        if let Some(element) = written {
            self.inner.apply_update(&id, element);
        }
        Ok(())
    }

    /// Removes the element at `index`. Every later element shifts down, so the
    /// first page is reloaded instead of patching indices locally.
    pub async fn delete_element(&self, index: i64) -> Result<(), StoreError> {
        let id = index.to_string();
        let deleted = self
            .inner
            .mutate(
                &id,
                ElementStatus::Deleting,
                self.store.delete_list_element(self.key(), index),
            )
            .await?;
        if deleted.is_some() {
            self.inner.apply_delete(&id);
            self.inner.load().await.ok();
        }
        Ok(())
    }

    /// Pushes onto the head or tail; returns the index the element landed at.
    pub async fn add_element(
        &self,
        position: ListPosition,
        value: &str,
    ) -> Result<Option<ListElement>, StoreError> {
        self.inner
            .add(self.store.push_list_element(self.key(), position, value))
            .await
    }
}

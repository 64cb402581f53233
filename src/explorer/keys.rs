use super::abortable::{lock, unless_cancelled, AbortableRequest};
use super::error::StoreError;
use super::scanner::IncrementalScanner;
use super::sources::{parse_pattern, KeyFilter, KeySource};
use super::store::{Key, KeyType, StoreClient};
use crate::config::ExplorerSettings;
use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Explorer-level listing status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeysStatus {
    LoadingKeys,
    Loaded,
    Filtering,
    Refreshing,
    Error(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStatus {
    Idle,
    Selected,
    Deleting,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyState {
    pub key: Key,
    pub status: KeyStatus,
}

/// Snapshot published to the presentation layer after every change.
#[derive(Debug, Clone, PartialEq)]
pub struct KeysView {
    pub status: KeysStatus,
    pub keys: Vec<KeyState>,
    pub total: Option<u64>,
    pub has_more: bool,
    pub filter_type: Option<KeyType>,
    pub filter_pattern: String,
    pub selected: Option<String>,
}

impl Default for KeysView {
    fn default() -> Self {
        Self {
            status: KeysStatus::LoadingKeys,
            keys: Vec::new(),
            total: None,
            has_more: true,
            filter_type: None,
            filter_pattern: String::new(),
            selected: None,
        }
    }
}

// UI marks live beside the scanner rather than inside its items: pages land
// from the wire without them, so they are reapplied on every snapshot.
struct Marks {
    status: KeysStatus,
    selected: Option<String>,
    deleting: HashSet<String>,
}

pub struct KeysController {
    store: Arc<dyn StoreClient>,
    scanner: IncrementalScanner<KeySource>,
    fetch: AbortableRequest,
    cancel: CancellationToken,
    fill_rounds: usize,
    marks: Mutex<Marks>,
    view: watch::Sender<KeysView>,
}

impl KeysController {
    pub fn new(
        store: Arc<dyn StoreClient>,
        settings: &ExplorerSettings,
        cancel: CancellationToken,
    ) -> Self {
        let (view, _) = watch::channel(KeysView::default());
        Self {
            scanner: IncrementalScanner::new(
                KeySource::new(store.clone()),
                settings.keys_page_size,
            ),
            store,
            fetch: AbortableRequest::new(&cancel),
            cancel,
            fill_rounds: settings.fill_rounds.max(1),
            marks: Mutex::new(Marks {
                status: KeysStatus::LoadingKeys,
                selected: None,
                deleting: HashSet::new(),
            }),
            view,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<KeysView> {
        self.view.subscribe()
    }

    pub fn view(&self) -> KeysView {
        self.snapshot()
    }

    pub fn status(&self) -> KeysStatus {
        lock(&self.marks).status.clone()
    }

    pub fn keys(&self) -> Vec<Key> {
        self.scanner.elements()
    }

    pub fn total(&self) -> Option<u64> {
        self.scanner.total()
    }

    pub fn has_more(&self) -> bool {
        self.scanner.has_more()
    }

    /// First fetch cycle of the session.
    pub async fn load(&self) -> Result<(), StoreError> {
        self.fetch_cycle(KeysStatus::LoadingKeys, |scanner| scanner.reset())
            .await
    }

    /// Applies a type + pattern filter; `None` type and an empty pattern clear those fields.
    pub async fn filter(&self, key_type: Option<KeyType>, pattern: &str) -> Result<(), StoreError> {
        let pattern = parse_pattern(pattern)
            .map_err(|e| {
                StoreError::InvalidInput(format!("Invalid pattern '{}': {}", pattern, e))
            })?;
        let filter = KeyFilter { key_type, pattern };
        self.fetch_cycle(KeysStatus::Filtering, move |scanner| scanner.set_filter(filter))
            .await
    }

    /// Restarts the scan under the same filter.
    pub async fn refresh(&self) -> Result<(), StoreError> {
        self.fetch_cycle(KeysStatus::Refreshing, |scanner| scanner.reset())
            .await
    }

    /// Fetches exactly one more page.
    pub async fn load_more(&self) -> Result<(), StoreError> {
        let outcome = self
            .fetch
            .run(async {
                self.set_status(KeysStatus::LoadingKeys);
                self.scanner.fetch_next_page().await?;
                self.reconcile_selection();
                Ok::<(), StoreError>(())
            })
            .await;
        self.finish(outcome)
    }

    async fn fetch_cycle<P>(&self, status: KeysStatus, prepare: P) -> Result<(), StoreError>
    where
        P: FnOnce(&IncrementalScanner<KeySource>),
    {
        let outcome = self
            .fetch
            .run(async {
                prepare(&self.scanner);
                self.set_status(status);
                let mut rounds = 0;
                loop {
                    self.scanner.fetch_next_page().await?;
                    rounds += 1;
                    if !self.scanner.has_more()
                        || self.scanner.len() >= self.scanner.page_size()
                        || rounds >= self.fill_rounds
                    {
                        break;
                    }
                    self.publish();
                }
                self.reconcile_selection();
                Ok::<(), StoreError>(())
            })
            .await;
        self.finish(outcome)
    }

    fn finish(&self, outcome: Option<Result<(), StoreError>>) -> Result<(), StoreError> {
        match outcome {
            None => Ok(()),
            Some(Ok(())) => {
                self.set_status(KeysStatus::Loaded);
                Ok(())
            }
            Some(Err(e)) => {
                log::warn!("key scan failed: {}", e);
                self.set_status(KeysStatus::Error(e.to_string()));
                Err(e)
            }
        }
    }

    /// Marks `name` as the single selected key. Fails when the key is not loaded.
    pub fn select(&self, name: &str) -> bool {
        if !self.scanner.contains(&name.to_string()) {
            return false;
        }
        lock(&self.marks).selected = Some(name.to_string());
        self.publish();
        true
    }

    pub fn clear_selection(&self) {
        let changed = lock(&self.marks).selected.take().is_some();
        if changed {
            self.publish();
        }
    }

    pub fn selected(&self) -> Option<String> {
        lock(&self.marks).selected.clone()
    }

    pub fn selected_key(&self) -> Option<Key> {
        let name = self.selected()?;
        self.scanner.get(&name)
    }

    /// Deletes a key remotely. The row shows `Deleting` meanwhile and falls
    /// back to its previous status if the store refuses.
    pub async fn delete(&self, name: &str) -> Result<(), StoreError> {
        let id = name.to_string();
        let tracked = self.scanner.contains(&id);
        if tracked {
            lock(&self.marks).deleting.insert(id.clone());
            self.publish();
        }

        let result = match unless_cancelled(&self.cancel, self.store.delete_key(name)).await {
            Some(result) => result,
            None => return Ok(()),
        };

        match result {
            Ok(deleted) => {
                if deleted {
                    log::info!("deleted key '{}'", name);
                } else {
                    log::debug!("key '{}' was already gone", name);
                }
                self.remove(name);
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                log::warn!("key '{}' vanished before delete: {}", name, e);
                self.remove(name);
                Err(e)
            }
            Err(e) => {
                log::warn!("delete of '{}' failed, restoring: {}", name, e);
                lock(&self.marks).deleting.remove(&id);
                self.publish();
                Err(e)
            }
        }
    }

    /// Inserts a freshly created key and selects it. A key the active filter
    /// excludes is not listed, and the selection is simply cleared.
    pub fn add(&self, key: Key) {
        let name = key.name.clone();
        self.scanner.update([key]);
        let listed = self.scanner.contains(&name);
        lock(&self.marks).selected = listed.then_some(name);
        self.publish();
    }

    /// Drops a key the store reported missing.
    pub fn remove(&self, name: &str) -> Option<usize> {
        let id = name.to_string();
        let position = self.scanner.delete(&id);
        {
            let mut marks = lock(&self.marks);
            marks.deleting.remove(&id);
            if marks.selected.as_deref() == Some(name) {
                marks.selected = None;
            }
        }
        self.publish();
        position
    }

    /// Fuzzy match over the keys already loaded, best score first.
    pub fn search(&self, query: &str) -> Vec<Key> {
        if query.is_empty() {
            return Vec::new();
        }
        let matcher = SkimMatcherV2::default();
        let mut scored: Vec<(i64, Key)> = self
            .scanner
            .elements()
            .into_iter()
            .filter_map(|key| matcher.fuzzy_match(&key.name, query).map(|score| (score, key)))
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        scored.into_iter().map(|(_, key)| key).collect()
    }

    fn reconcile_selection(&self) {
        let mut marks = lock(&self.marks);
        if let Some(name) = marks.selected.clone() {
            if !self.scanner.contains(&name) {
                log::debug!("selected key '{}' left the listing", name);
                marks.selected = None;
            }
        }
    }

    fn set_status(&self, status: KeysStatus) {
        lock(&self.marks).status = status;
        self.publish();
    }

    fn publish(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.view.send_replace(self.snapshot());
    }

    fn snapshot(&self) -> KeysView {
        let filter = self.scanner.filter();
        let marks = lock(&self.marks);
        let keys = self
            .scanner
            .elements()
            .into_iter()
            .map(|key| {
                let status = if marks.deleting.contains(&key.name) {
                    KeyStatus::Deleting
                } else if marks.selected.as_deref() == Some(key.name.as_str()) {
                    KeyStatus::Selected
                } else {
                    KeyStatus::Idle
                };
                KeyState { key, status }
            })
            .collect();
        KeysView {
            status: marks.status.clone(),
            keys,
            total: self.scanner.total(),
            has_more: self.scanner.has_more(),
            filter_type: filter.key_type,
            filter_pattern: filter
                .pattern
                .map(|p| p.as_str().to_string())
                .unwrap_or_default(),
            selected: marks.selected.clone(),
        }
    }
}

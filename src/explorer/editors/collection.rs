use super::{AddFormState, ElementRow, ElementStatus, LoadStatus};
use crate::explorer::abortable::{lock, unless_cancelled, AbortableRequest};
use crate::explorer::error::StoreError;
use crate::explorer::scanner::{IncrementalScanner, ScanSource};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Published state of a hash/list/set editor.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionView<T> {
    pub key: String,
    pub load: LoadStatus,
    pub elements: Vec<ElementRow<T>>,
    pub total: Option<u64>,
    pub has_more: bool,
    pub add_form: AddFormState,
}

struct Marks<Id> {
    load: LoadStatus,
    statuses: HashMap<Id, ElementStatus>,
    add_form: AddFormState,
}

/// The part every composite editor shares: a scanner over the key's
/// elements, per-element statuses and the optimistic mutation protocol.
pub struct CollectionEditor<S: ScanSource> {
    key: String,
    scanner: IncrementalScanner<S>,
    fetch: AbortableRequest,
    cancel: CancellationToken,
    marks: Mutex<Marks<S::Id>>,
    view: watch::Sender<CollectionView<S::Item>>,
}

impl<S: ScanSource> CollectionEditor<S> {
    pub fn new(key: &str, source: S, page_size: usize, cancel: CancellationToken) -> Self {
        let (view, _) = watch::channel(CollectionView {
            key: key.to_string(),
            load: LoadStatus::Loading,
            elements: Vec::new(),
            total: None,
            has_more: true,
            add_form: AddFormState::Idle,
        });
        Self {
            key: key.to_string(),
            scanner: IncrementalScanner::new(source, page_size),
            fetch: AbortableRequest::new(&cancel),
            cancel,
            marks: Mutex::new(Marks {
                load: LoadStatus::Loading,
                statuses: HashMap::new(),
                add_form: AddFormState::Idle,
            }),
            view,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn scanner(&self) -> &IncrementalScanner<S> {
        &self.scanner
    }

    pub fn subscribe(&self) -> watch::Receiver<CollectionView<S::Item>> {
        self.view.subscribe()
    }

    pub fn view(&self) -> CollectionView<S::Item> {
        self.snapshot()
    }

    pub fn status_of(&self, id: &S::Id) -> ElementStatus {
        lock(&self.marks)
            .statuses
            .get(id)
            .copied()
            .unwrap_or(ElementStatus::Idle)
    }

    pub fn add_form(&self) -> AddFormState {
        lock(&self.marks).add_form
    }

    /// Starts over from the first page under the current filter.
    pub async fn load(&self) -> Result<(), StoreError> {
        self.fetch_first_page(|scanner| scanner.reset()).await
    }

    pub async fn filter(&self, filter: S::Filter) -> Result<(), StoreError> {
        self.fetch_first_page(move |scanner| scanner.set_filter(filter))
            .await
    }

    pub async fn load_more(&self) -> Result<(), StoreError> {
        let outcome = self
            .fetch
            .run(async {
                self.set_load(LoadStatus::Loading);
                self.scanner.fetch_next_page().await?;
                Ok::<(), StoreError>(())
            })
            .await;
        self.finish(outcome)
    }

    async fn fetch_first_page<P>(&self, prepare: P) -> Result<(), StoreError>
    where
        P: FnOnce(&IncrementalScanner<S>),
    {
        let outcome = self
            .fetch
            .run(async {
                prepare(&self.scanner);
                // Statuses are keyed by identity; after a restart (list indices
                // shift) they would attach to the wrong rows.
                lock(&self.marks).statuses.clear();
                self.set_load(LoadStatus::Loading);
                self.scanner.fetch_next_page().await?;
                Ok::<(), StoreError>(())
            })
            .await;
        self.finish(outcome)
    }

    fn finish(&self, outcome: Option<Result<(), StoreError>>) -> Result<(), StoreError> {
        match outcome {
            None => Ok(()),
            Some(Ok(())) => {
                self.set_load(LoadStatus::Loaded);
                Ok(())
            }
            Some(Err(e)) => {
                log::warn!("loading elements of '{}' failed: {}", self.key, e);
                self.set_load(LoadStatus::Error(e.to_string()));
                Err(e)
            }
        }
    }

    /// Seeds the collection from a payload just written by a create.
    pub fn seed(&self, items: Vec<S::Item>) {
        self.fetch.abort();
        self.scanner.seed(items);
        {
            let mut marks = lock(&self.marks);
            marks.statuses.clear();
            marks.load = LoadStatus::Loaded;
        }
        self.publish();
    }

    /// `idle -> editing`. Returns false for unknown elements or ones with a request in flight.
    pub fn begin_edit(&self, id: &S::Id) -> bool {
        if !self.scanner.contains(id) {
            return false;
        }
        {
            let mut marks = lock(&self.marks);
            match marks.statuses.get(id) {
                None | Some(ElementStatus::Idle) | Some(ElementStatus::Editing) => {
                    marks.statuses.insert(id.clone(), ElementStatus::Editing);
                }
                Some(_) => return false,
            }
        }
        self.publish();
        true
    }

    pub fn cancel_edit(&self, id: &S::Id) {
        let changed = {
            let mut marks = lock(&self.marks);
            if marks.statuses.get(id) == Some(&ElementStatus::Editing) {
                marks.statuses.remove(id);
                true
            } else {
                false
            }
        };
        if changed {
            self.publish();
        }
    }

    /// Runs a remote element mutation with `pending` shown on the element.
    ///
    /// On failure the element's previous status is restored and the error
    /// returned; an element-not-found failure drops the element instead.
    /// `Ok(None)` means the editor was discarded while the call was in flight.
    pub async fn mutate<T, F>(
        &self,
        id: &S::Id,
        pending: ElementStatus,
        call: F,
    ) -> Result<Option<T>, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        if self.cancel.is_cancelled() {
            return Ok(None);
        }
        let prior = {
            let mut marks = lock(&self.marks);
            marks.statuses.insert(id.clone(), pending).unwrap_or(ElementStatus::Idle)
        };
        self.publish();

        let result = match unless_cancelled(&self.cancel, call).await {
            Some(result) => result,
            None => return Ok(None),
        };

        match result {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                if matches!(e, StoreError::ElementNotFound { .. }) {
                    log::warn!("element vanished from '{}': {}", self.key, e);
                    self.scanner.delete(id);
                    lock(&self.marks).statuses.remove(id);
                } else {
                    log::warn!("mutation on '{}' failed, restoring status: {}", self.key, e);
                    self.restore(id, prior);
                }
                self.publish();
                Err(e)
            }
        }
    }

    fn restore(&self, id: &S::Id, prior: ElementStatus) {
        let mut marks = lock(&self.marks);
        if prior == ElementStatus::Idle {
            marks.statuses.remove(id);
        } else {
            marks.statuses.insert(id.clone(), prior);
        }
    }

    /// Merges an authoritative element after a successful write.
    pub fn apply_update(&self, id: &S::Id, item: S::Item) {
        lock(&self.marks).statuses.remove(id);
        let new_id = S::id(&item);
        if &new_id != id {
            self.scanner.delete(id);
        }
        self.scanner.update([item]);
        self.publish();
    }

    pub fn apply_delete(&self, id: &S::Id) -> Option<usize> {
        lock(&self.marks).statuses.remove(id);
        let position = self.scanner.delete(id);
        self.publish();
        position
    }

    pub fn open_add_form(&self) {
        self.set_add_form(AddFormState::Adding);
    }

    pub fn cancel_add_form(&self) {
        self.set_add_form(AddFormState::Idle);
    }

    /// Runs an add. On success the form is cleared and the first page is
    /// reloaded rather than guessing where the server put the element.
    pub async fn add<T, F>(&self, call: F) -> Result<Option<T>, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        if self.cancel.is_cancelled() {
            return Ok(None);
        }
        let prior = self.add_form();
        self.set_add_form(AddFormState::Adding);
        let value = match unless_cancelled(&self.cancel, call).await {
            Some(Ok(value)) => value,
            Some(Err(e)) => {
                log::warn!("adding to '{}' failed: {}", self.key, e);
                self.set_add_form(prior);
                return Err(e);
            }
            None => return Ok(None),
        };
        self.set_add_form(AddFormState::Idle);
        // The write went through; a failed reload only shows up in the load status.
        self.load().await.ok();
        Ok(Some(value))
    }

    fn set_add_form(&self, state: AddFormState) {
        lock(&self.marks).add_form = state;
        self.publish();
    }

    fn set_load(&self, load: LoadStatus) {
        lock(&self.marks).load = load;
        self.publish();
    }

    pub(crate) fn publish(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.view.send_replace(self.snapshot());
    }

    fn snapshot(&self) -> CollectionView<S::Item> {
        let marks = lock(&self.marks);
        let elements = self
            .scanner
            .elements()
            .into_iter()
            .map(|element| {
                let status = marks
                    .statuses
                    .get(&S::id(&element))
                    .copied()
                    .unwrap_or(ElementStatus::Idle);
                ElementRow { element, status }
            })
            .collect();
        CollectionView {
            key: self.key.clone(),
            load: marks.load.clone(),
            elements,
            total: self.scanner.total(),
            has_more: self.scanner.has_more(),
            add_form: marks.add_form,
        }
    }
}

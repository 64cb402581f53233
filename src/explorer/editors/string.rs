use crate::explorer::abortable::{lock, unless_cancelled, AbortableRequest};
use crate::explorer::error::StoreError;
use crate::explorer::store::StoreClient;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringStatus {
    Loading,
    Idle,
    Saving,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringView {
    pub key: String,
    pub status: StringStatus,
    pub value: String,
    /// Last load or save failure, cleared by the next success.
    pub error: Option<String>,
}

struct State {
    status: StringStatus,
    value: String,
    error: Option<String>,
}

/// Editor for a scalar value: one point fetch and whole-value saves.
pub struct StringEditor {
    store: Arc<dyn StoreClient>,
    key: String,
    fetch: AbortableRequest,
    cancel: CancellationToken,
    state: Mutex<State>,
    view: watch::Sender<StringView>,
}

impl StringEditor {
    pub fn new(store: Arc<dyn StoreClient>, key: &str, cancel: CancellationToken) -> Self {
        let (view, _) = watch::channel(StringView {
            key: key.to_string(),
            status: StringStatus::Loading,
            value: String::new(),
            error: None,
        });
        Self {
            store,
            key: key.to_string(),
            fetch: AbortableRequest::new(&cancel),
            cancel,
            state: Mutex::new(State {
                status: StringStatus::Loading,
                value: String::new(),
                error: None,
            }),
            view,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn subscribe(&self) -> watch::Receiver<StringView> {
        self.view.subscribe()
    }

    pub fn view(&self) -> StringView {
        self.snapshot()
    }

    pub fn value(&self) -> String {
        lock(&self.state).value.clone()
    }

    pub fn status(&self) -> StringStatus {
        lock(&self.state).status
    }

    pub async fn load(&self) -> Result<(), StoreError> {
        let outcome = self
            .fetch
            .run(async {
                lock(&self.state).status = StringStatus::Loading;
                self.publish();
                self.store.get_string(&self.key).await
            })
            .await;
        match outcome {
            None => Ok(()),
            Some(Ok(value)) => {
                self.settle(value, None);
                Ok(())
            }
            Some(Err(e)) => {
                log::warn!("loading '{}' failed: {}", self.key, e);
                let value = self.value();
                self.settle(value, Some(e.to_string()));
                Err(e)
            }
        }
    }

    /// Writes `value`. Whatever the outcome, the editor returns to idle
    /// holding the value that was attempted.
    pub async fn save(&self, value: &str) -> Result<(), StoreError> {
        if self.cancel.is_cancelled() {
            return Ok(());
        }
        // A save makes any pending read stale.
        self.fetch.abort();
        {
            let mut state = lock(&self.state);
            state.status = StringStatus::Saving;
            state.value = value.to_string();
        }
        self.publish();

        let write = self.store.set_string(&self.key, value);
        let result = match unless_cancelled(&self.cancel, write).await {
            Some(result) => result,
            None => return Ok(()),
        };
        match result {
            Ok(stored) => {
                log::info!("saved '{}'", self.key);
                self.settle(stored, None);
                Ok(())
            }
            Err(e) => {
                log::warn!("saving '{}' failed: {}", self.key, e);
                self.settle(value.to_string(), Some(e.to_string()));
                Err(e)
            }
        }
    }

    /// Writes a brand-new string key and shows it without reading it back.
    pub async fn create(&self, value: &str) -> Result<(), StoreError> {
        let stored = self.store.create_string_key(&self.key, value).await?;
        self.fetch.abort();
        self.settle(stored, None);
        Ok(())
    }

    fn settle(&self, value: String, error: Option<String>) {
        {
            let mut state = lock(&self.state);
            state.status = StringStatus::Idle;
            state.value = value;
            state.error = error;
        }
        self.publish();
    }

    fn publish(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.view.send_replace(self.snapshot());
    }

    fn snapshot(&self) -> StringView {
        let state = lock(&self.state);
        StringView {
            key: self.key.clone(),
            status: state.status,
            value: state.value.clone(),
            error: state.error.clone(),
        }
    }
}

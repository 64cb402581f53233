use super::abortable::lock;
use super::editors::TypeEditor;
use super::error::StoreError;
use super::store::{Key, KeyType, NewKeyValue, StoreClient};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Which key the detail pane shows, if any.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetailsView {
    pub key: Option<String>,
    pub key_type: Option<KeyType>,
}

struct Slot {
    editor: Arc<TypeEditor>,
    token: CancellationToken,
}

/// Owns the single current editor. Installing a new one cancels the
/// previous editor's token, which aborts whatever it still had in flight.
pub struct DetailsController {
    store: Arc<dyn StoreClient>,
    page_size: usize,
    cancel: CancellationToken,
    current: Mutex<Option<Slot>>,
    view: watch::Sender<DetailsView>,
}

impl DetailsController {
    pub fn new(store: Arc<dyn StoreClient>, page_size: usize, cancel: CancellationToken) -> Self {
        let (view, _) = watch::channel(DetailsView::default());
        Self {
            store,
            page_size,
            cancel,
            current: Mutex::new(None),
            view,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<DetailsView> {
        self.view.subscribe()
    }

    pub fn view(&self) -> DetailsView {
        self.view.borrow().clone()
    }

    pub fn current(&self) -> Option<Arc<TypeEditor>> {
        lock(&self.current).as_ref().map(|slot| slot.editor.clone())
    }

    pub fn current_key(&self) -> Option<String> {
        lock(&self.current)
            .as_ref()
            .map(|slot| slot.editor.key().to_string())
    }

    /// Shows `key` and loads its value. A superseded load resolves to `Ok`.
    pub async fn open(&self, key: &Key) -> Result<Arc<TypeEditor>, StoreError> {
        let editor = self.install(&key.name, key.key_type);
        log::debug!("opened {} '{}'", key.key_type, key.name);
        editor.load().await?;
        Ok(editor)
    }

    /// Writes a brand-new key and shows it. The editor is dropped again if the write fails.
    pub async fn create(
        &self,
        name: &str,
        value: &NewKeyValue,
    ) -> Result<Arc<TypeEditor>, StoreError> {
        let editor = self.install(name, value.key_type());
        if let Err(e) = editor.create(value).await {
            self.close_if(name);
            return Err(e);
        }
        log::info!("created {} '{}'", value.key_type(), name);
        Ok(editor)
    }

    pub fn close(&self) {
        let previous = lock(&self.current).take();
        if let Some(slot) = previous {
            slot.token.cancel();
            log::debug!("closed '{}'", slot.editor.key());
            self.publish(DetailsView::default());
        }
    }

    /// Closes the pane only if it shows `name`. Returns whether it did.
    pub fn close_if(&self, name: &str) -> bool {
        let previous = {
            let mut current = lock(&self.current);
            match current.as_ref() {
                Some(slot) if slot.editor.key() == name => current.take(),
                _ => None,
            }
        };
        match previous {
            Some(slot) => {
                slot.token.cancel();
                log::debug!("closed '{}'", name);
                self.publish(DetailsView::default());
                true
            }
            None => false,
        }
    }

    fn install(&self, name: &str, key_type: KeyType) -> Arc<TypeEditor> {
        let token = self.cancel.child_token();
        let editor = Arc::new(TypeEditor::for_key(
            self.store.clone(),
            name,
            key_type,
            self.page_size,
            token.clone(),
        ));
        let previous = lock(&self.current).replace(Slot {
            editor: editor.clone(),
            token,
        });
        if let Some(slot) = previous {
            slot.token.cancel();
        }
        self.publish(DetailsView {
            key: Some(name.to_string()),
            key_type: Some(key_type),
        });
        editor
    }

    fn publish(&self, view: DetailsView) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.view.send_replace(view);
    }
}

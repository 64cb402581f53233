//! Per-type value editors. Hash, list and set share [`collection::CollectionEditor`];
//! strings are a single point fetch.

pub mod collection;
pub mod hash;
pub mod list;
pub mod set;
pub mod string;

pub use collection::{CollectionEditor, CollectionView};
pub use hash::HashEditor;
pub use list::ListEditor;
pub use set::SetEditor;
pub use string::{StringEditor, StringStatus, StringView};

use super::error::StoreError;
use super::store::{KeyType, NewKeyValue, StoreClient};
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementStatus {
    Idle,
    Editing,
    Updating,
    Deleting,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadStatus {
    Loading,
    Loaded,
    Error(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AddFormState {
    #[default]
    Idle,
    Adding,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementRow<T> {
    pub element: T,
    pub status: ElementStatus,
}

/// The editor for one key, chosen by its type.
pub enum TypeEditor {
    String(StringEditor),
    Hash(HashEditor),
    List(ListEditor),
    Set(SetEditor),
}

impl fmt::Debug for TypeEditor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeEditor")
            .field("key", &self.key())
            .field("key_type", &self.key_type())
            .finish()
    }
}

impl TypeEditor {
    pub fn for_key(
        store: Arc<dyn StoreClient>,
        key: &str,
        key_type: KeyType,
        page_size: usize,
        cancel: CancellationToken,
    ) -> Self {
        match key_type {
            KeyType::String => TypeEditor::String(StringEditor::new(store, key, cancel)),
            KeyType::Hash => TypeEditor::Hash(HashEditor::new(store, key, page_size, cancel)),
            KeyType::List => TypeEditor::List(ListEditor::new(store, key, page_size, cancel)),
            KeyType::Set => TypeEditor::Set(SetEditor::new(store, key, page_size, cancel)),
        }
    }

    pub fn key(&self) -> &str {
        match self {
            TypeEditor::String(editor) => editor.key(),
            TypeEditor::Hash(editor) => editor.key(),
            TypeEditor::List(editor) => editor.key(),
            TypeEditor::Set(editor) => editor.key(),
        }
    }

    pub fn key_type(&self) -> KeyType {
        match self {
            TypeEditor::String(_) => KeyType::String,
            TypeEditor::Hash(_) => KeyType::Hash,
            TypeEditor::List(_) => KeyType::List,
            TypeEditor::Set(_) => KeyType::Set,
        }
    }

    pub async fn load(&self) -> Result<(), StoreError> {
        match self {
            TypeEditor::String(editor) => editor.load().await,
            TypeEditor::Hash(editor) => editor.load().await,
            TypeEditor::List(editor) => editor.load().await,
            TypeEditor::Set(editor) => editor.load().await,
        }
    }

    /// Writes a new key with its initial payload. The payload must match the editor's type.
    pub async fn create(&self, value: &NewKeyValue) -> Result<(), StoreError> {
        match (self, value) {
            (TypeEditor::String(editor), NewKeyValue::String(value)) => editor.create(value).await,
            (TypeEditor::Hash(editor), NewKeyValue::Hash(fields)) => editor.create(fields).await,
            (TypeEditor::List(editor), NewKeyValue::List(values)) => editor.create(values).await,
            (TypeEditor::Set(editor), NewKeyValue::Set(members)) => editor.create(members).await,
            _ => Err(StoreError::InvalidInput(format!(
                "a {} payload cannot initialise {} key '{}'",
                value.key_type(),
                self.key_type(),
                self.key()
            ))),
        }
    }

    pub fn as_string(&self) -> Option<&StringEditor> {
        match self {
            TypeEditor::String(editor) => Some(editor),
            _ => None,
        }
    }

    pub fn as_hash(&self) -> Option<&HashEditor> {
        match self {
            TypeEditor::Hash(editor) => Some(editor),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&ListEditor> {
        match self {
            TypeEditor::List(editor) => Some(editor),
            _ => None,
        }
    }

    pub fn as_set(&self) -> Option<&SetEditor> {
        match self {
            TypeEditor::Set(editor) => Some(editor),
            _ => None,
        }
    }
}

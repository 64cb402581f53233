use super::error::StoreError;
use async_trait::async_trait;
use std::fmt;

/// Value types the explorer can browse and edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyType {
    String,
    Hash,
    List,
    Set,
}

impl KeyType {
    pub const ALL: [KeyType; 4] = [KeyType::String, KeyType::Hash, KeyType::List, KeyType::Set];

    pub fn as_str(self) -> &'static str {
        match self {
            KeyType::String => "string",
            KeyType::Hash => "hash",
            KeyType::List => "list",
            KeyType::Set => "set",
        }
    }

    /// Parses a `TYPE` reply. Types without an editor (zset, stream, ...) yield `None`.
    pub fn parse(type_name: &str) -> Option<Self> {
        match type_name.to_ascii_lowercase().as_str() {
            "string" => Some(KeyType::String),
            "hash" => Some(KeyType::Hash),
            "list" => Some(KeyType::List),
            "set" => Some(KeyType::Set),
            _ => None,
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Key {
    pub name: String,
    pub key_type: KeyType,
}

impl Key {
    pub fn new(name: impl Into<String>, key_type: KeyType) -> Self {
        Self {
            name: name.into(),
            key_type,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashElement {
    pub field: String,
    pub value: String,
}

impl HashElement {
    pub fn new(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListElement {
    pub index: i64,
    pub value: String,
}

impl ListElement {
    pub fn new(index: i64, value: impl Into<String>) -> Self {
        Self {
            index,
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetElement {
    pub value: String,
}

impl SetElement {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListPosition {
    Head,
    Tail,
}

/// One page of a cursor scan. `cursor == 0` means the scan is exhausted.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanPage<T> {
    pub cursor: u64,
    pub total: u64,
    pub items: Vec<T>,
}

/// Result of a write that may or may not have created the element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementWrite<T> {
    pub element: T,
    pub added: bool,
}

/// Initial payload for a brand-new key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NewKeyValue {
    String(String),
    Hash(Vec<HashElement>),
    List(Vec<String>),
    Set(Vec<String>),
}

impl NewKeyValue {
    pub fn key_type(&self) -> KeyType {
        match self {
            NewKeyValue::String(_) => KeyType::String,
            NewKeyValue::Hash(_) => KeyType::Hash,
            NewKeyValue::List(_) => KeyType::List,
            NewKeyValue::Set(_) => KeyType::Set,
        }
    }
}

/// Boundary to the key-value server. One method per capability; every
/// failure comes back as a structured [`StoreError`].
#[async_trait]
pub trait StoreClient: Send + Sync {
    async fn scan_keys(
        &self,
        cursor: u64,
        count: usize,
        key_type: Option<KeyType>,
        pattern: Option<&str>,
    ) -> Result<ScanPage<Key>, StoreError>;

    async fn delete_key(&self, key: &str) -> Result<bool, StoreError>;

    async fn get_string(&self, key: &str) -> Result<String, StoreError>;
    async fn set_string(&self, key: &str, value: &str) -> Result<String, StoreError>;

    async fn scan_hash(
        &self,
        key: &str,
        cursor: u64,
        count: usize,
        pattern: Option<&str>,
    ) -> Result<ScanPage<HashElement>, StoreError>;

    async fn scan_list(
        &self,
        key: &str,
        cursor: u64,
        count: usize,
        index: Option<i64>,
    ) -> Result<ScanPage<ListElement>, StoreError>;

    async fn scan_set(
        &self,
        key: &str,
        cursor: u64,
        count: usize,
        pattern: Option<&str>,
    ) -> Result<ScanPage<SetElement>, StoreError>;

    async fn create_string_key(&self, key: &str, value: &str) -> Result<String, StoreError>;
    async fn create_hash_key(
        &self,
        key: &str,
        fields: &[HashElement],
    ) -> Result<Vec<HashElement>, StoreError>;
    async fn create_list_key(
        &self,
        key: &str,
        values: &[String],
    ) -> Result<Vec<ListElement>, StoreError>;
    async fn create_set_key(
        &self,
        key: &str,
        members: &[String],
    ) -> Result<Vec<SetElement>, StoreError>;

    async fn set_hash_field(
        &self,
        key: &str,
        field: &str,
        value: &str,
    ) -> Result<ElementWrite<HashElement>, StoreError>;
    async fn delete_hash_field(&self, key: &str, field: &str) -> Result<bool, StoreError>;

    async fn set_list_element(
        &self,
        key: &str,
        index: i64,
        value: &str,
    ) -> Result<ListElement, StoreError>;
    async fn delete_list_element(&self, key: &str, index: i64) -> Result<bool, StoreError>;
    async fn push_list_element(
        &self,
        key: &str,
        position: ListPosition,
        value: &str,
    ) -> Result<ListElement, StoreError>;

    async fn add_set_member(
        &self,
        key: &str,
        value: &str,
    ) -> Result<ElementWrite<SetElement>, StoreError>;
    async fn replace_set_member(
        &self,
        key: &str,
        old_value: &str,
        new_value: &str,
    ) -> Result<ElementWrite<SetElement>, StoreError>;
    async fn delete_set_member(&self, key: &str, value: &str) -> Result<bool, StoreError>;

    /// Runs an arbitrary command and renders the reply as text.
    async fn execute(&self, args: &[String]) -> Result<String, StoreError>;
}

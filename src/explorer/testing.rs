//! In-memory [`StoreClient`] for controller tests, with failure injection
//! and gates that hold a call until released.

use super::abortable::lock;
use super::error::StoreError;
use super::store::{
    ElementWrite, HashElement, Key, KeyType, ListElement, ListPosition, ScanPage, SetElement,
    StoreClient,
};
use crate::pattern::glob_match;
use async_trait::async_trait;
use indexmap::{IndexMap, IndexSet};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

#[derive(Debug, Clone)]
enum Value {
    String(String),
    Hash(IndexMap<String, String>),
    List(Vec<String>),
    Set(IndexSet<String>),
}

impl Value {
    fn key_type(&self) -> KeyType {
        match self {
            Value::String(_) => KeyType::String,
            Value::Hash(_) => KeyType::Hash,
            Value::List(_) => KeyType::List,
            Value::Set(_) => KeyType::Set,
        }
    }
}

#[derive(Default)]
struct Inner {
    data: IndexMap<String, Value>,
    calls: HashMap<&'static str, usize>,
    failures: HashMap<&'static str, StoreError>,
    gates: HashMap<&'static str, Arc<Notify>>,
    key_pages: VecDeque<ScanPage<Key>>,
    key_cursors: Vec<u64>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

fn wrong_type(key: &str) -> StoreError {
    StoreError::Unexpected(format!("WRONGTYPE '{}' holds another kind of value", key))
}

/// Offset paging: the cursor is the next offset, `0` once the end is reached.
/// Like the server, `count` is how many entries are examined, not returned.
fn page<T, U>(
    entries: &[T],
    cursor: u64,
    count: usize,
    keep: impl Fn(&T) -> Option<U>,
) -> ScanPage<U> {
    let start = (cursor as usize).min(entries.len());
    let end = start.saturating_add(count).min(entries.len());
    let items = entries[start..end].iter().filter_map(keep).collect();
    ScanPage {
        cursor: if end >= entries.len() { 0 } else { end as u64 },
        total: entries.len() as u64,
        items,
    }
}

fn pattern_ok(pattern: Option<&str>, candidate: &str) -> bool {
    pattern.map_or(true, |p| glob_match(p, candidate))
}

fn resolve_index(index: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let resolved = if index < 0 { len + index } else { index };
    (0..len).contains(&resolved).then_some(resolved as usize)
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_string(&self, key: &str, value: &str) {
        lock(&self.inner)
            .data
            .insert(key.to_string(), Value::String(value.to_string()));
    }

    pub fn put_hash(&self, key: &str, fields: &[(&str, &str)]) {
        let map = fields
            .iter()
            .map(|(f, v)| (f.to_string(), v.to_string()))
            .collect();
        lock(&self.inner).data.insert(key.to_string(), Value::Hash(map));
    }

    pub fn put_list(&self, key: &str, values: &[&str]) {
        let list = values.iter().map(|v| v.to_string()).collect();
        lock(&self.inner).data.insert(key.to_string(), Value::List(list));
    }

    pub fn put_set(&self, key: &str, members: &[&str]) {
        let set = members.iter().map(|m| m.to_string()).collect();
        lock(&self.inner).data.insert(key.to_string(), Value::Set(set));
    }

    pub fn contains(&self, key: &str) -> bool {
        lock(&self.inner).data.contains_key(key)
    }

    pub fn string_value(&self, key: &str) -> Option<String> {
        match lock(&self.inner).data.get(key) {
            Some(Value::String(value)) => Some(value.clone()),
            _ => None,
        }
    }

    pub fn hash_field(&self, key: &str, field: &str) -> Option<String> {
        match lock(&self.inner).data.get(key) {
            Some(Value::Hash(map)) => map.get(field).cloned(),
            _ => None,
        }
    }

    pub fn list_values(&self, key: &str) -> Vec<String> {
        match lock(&self.inner).data.get(key) {
            Some(Value::List(list)) => list.clone(),
            _ => Vec::new(),
        }
    }

    pub fn set_contains(&self, key: &str, member: &str) -> bool {
        match lock(&self.inner).data.get(key) {
            Some(Value::Set(set)) => set.contains(member),
            _ => false,
        }
    }

    /// How many times `op` reached the store.
    pub fn calls(&self, op: &str) -> usize {
        lock(&self.inner).calls.get(op).copied().unwrap_or(0)
    }

    /// The next call to `op` fails with `error`.
    pub fn fail_next(&self, op: &'static str, error: StoreError) {
        lock(&self.inner).failures.insert(op, error);
    }

    /// The next call to `op` waits until the returned gate is notified.
    pub fn hold(&self, op: &'static str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        lock(&self.inner).gates.insert(op, gate.clone());
        gate
    }

    /// Serves these pages to `scan_keys` in order, ignoring its arguments.
    pub fn script_key_pages(&self, pages: Vec<ScanPage<Key>>) {
        lock(&self.inner).key_pages = pages.into();
    }

    pub fn key_scan_cursors(&self) -> Vec<u64> {
        lock(&self.inner).key_cursors.clone()
    }

    async fn enter(&self, op: &'static str) -> Result<(), StoreError> {
        let gate = {
            let mut inner = lock(&self.inner);
            *inner.calls.entry(op).or_insert(0) += 1;
            inner.gates.remove(op)
        };
        if let Some(gate) = gate {
            gate.notified().await;
        }
        match lock(&self.inner).failures.remove(op) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn with_hash<R>(
        &self,
        key: &str,
        f: impl FnOnce(&mut IndexMap<String, String>) -> Result<R, StoreError>,
    ) -> Result<R, StoreError> {
        match lock(&self.inner).data.get_mut(key) {
            Some(Value::Hash(map)) => f(map),
            Some(_) => Err(wrong_type(key)),
            None => Err(StoreError::KeyNotFound(key.to_string())),
        }
    }

    fn with_list<R>(
        &self,
        key: &str,
        f: impl FnOnce(&mut Vec<String>) -> Result<R, StoreError>,
    ) -> Result<R, StoreError> {
        match lock(&self.inner).data.get_mut(key) {
            Some(Value::List(list)) => f(list),
            Some(_) => Err(wrong_type(key)),
            None => Err(StoreError::KeyNotFound(key.to_string())),
        }
    }

    fn with_set<R>(
        &self,
        key: &str,
        f: impl FnOnce(&mut IndexSet<String>) -> Result<R, StoreError>,
    ) -> Result<R, StoreError> {
        match lock(&self.inner).data.get_mut(key) {
            Some(Value::Set(set)) => f(set),
            Some(_) => Err(wrong_type(key)),
            None => Err(StoreError::KeyNotFound(key.to_string())),
        }
    }

    fn insert_new(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let mut inner = lock(&self.inner);
        if inner.data.contains_key(key) {
            return Err(StoreError::KeyExists(key.to_string()));
        }
        inner.data.insert(key.to_string(), value);
        Ok(())
    }
}

#[async_trait]
impl StoreClient for MemoryStore {
    async fn scan_keys(
        &self,
        cursor: u64,
        count: usize,
        key_type: Option<KeyType>,
        pattern: Option<&str>,
    ) -> Result<ScanPage<Key>, StoreError> {
        self.enter("scan_keys").await?;
        let mut inner = lock(&self.inner);
        inner.key_cursors.push(cursor);
        if let Some(scripted) = inner.key_pages.pop_front() {
            return Ok(scripted);
        }
        let entries: Vec<(String, KeyType)> = inner
            .data
            .iter()
            .map(|(name, value)| (name.clone(), value.key_type()))
            .collect();
        Ok(page(&entries, cursor, count, |(name, t)| {
            (key_type.map_or(true, |wanted| wanted == *t) && pattern_ok(pattern, name))
                .then(|| Key::new(name.clone(), *t))
        }))
    }

    async fn delete_key(&self, key: &str) -> Result<bool, StoreError> {
        self.enter("delete_key").await?;
        Ok(lock(&self.inner).data.shift_remove(key).is_some())
    }

    async fn get_string(&self, key: &str) -> Result<String, StoreError> {
        self.enter("get_string").await?;
        match lock(&self.inner).data.get(key) {
            Some(Value::String(value)) => Ok(value.clone()),
            Some(_) => Err(wrong_type(key)),
            None => Err(StoreError::KeyNotFound(key.to_string())),
        }
    }

    async fn set_string(&self, key: &str, value: &str) -> Result<String, StoreError> {
        self.enter("set_string").await?;
        match lock(&self.inner).data.get_mut(key) {
            Some(Value::String(stored)) => {
                *stored = value.to_string();
                Ok(stored.clone())
            }
            Some(_) => Err(wrong_type(key)),
            None => Err(StoreError::KeyNotFound(key.to_string())),
        }
    }

    async fn scan_hash(
        &self,
        key: &str,
        cursor: u64,
        count: usize,
        pattern: Option<&str>,
    ) -> Result<ScanPage<HashElement>, StoreError> {
        self.enter("scan_hash").await?;
        let entries: Vec<(String, String)> = match lock(&self.inner).data.get(key) {
            Some(Value::Hash(map)) => map.iter().map(|(f, v)| (f.clone(), v.clone())).collect(),
            Some(_) => return Err(wrong_type(key)),
            None => Vec::new(),
        };
        Ok(page(&entries, cursor, count, |(field, value)| {
            pattern_ok(pattern, field).then(|| HashElement::new(field.clone(), value.clone()))
        }))
    }

    async fn scan_list(
        &self,
        key: &str,
        cursor: u64,
        count: usize,
        index: Option<i64>,
    ) -> Result<ScanPage<ListElement>, StoreError> {
        self.enter("scan_list").await?;
        let list = match lock(&self.inner).data.get(key) {
            Some(Value::List(list)) => list.clone(),
            Some(_) => return Err(wrong_type(key)),
            None => Vec::new(),
        };
        if let Some(index) = index {
            let items = resolve_index(index, list.len())
                .map(|i| ListElement::new(i as i64, list[i].clone()))
                .into_iter()
                .collect();
            return Ok(ScanPage {
                cursor: 0,
                total: list.len() as u64,
                items,
            });
        }
        let indexed: Vec<(usize, String)> = list.into_iter().enumerate().collect();
        Ok(page(&indexed, cursor, count, |(i, value)| {
            Some(ListElement::new(*i as i64, value.clone()))
        }))
    }

    async fn scan_set(
        &self,
        key: &str,
        cursor: u64,
        count: usize,
        pattern: Option<&str>,
    ) -> Result<ScanPage<SetElement>, StoreError> {
        self.enter("scan_set").await?;
        let members: Vec<String> = match lock(&self.inner).data.get(key) {
            Some(Value::Set(set)) => set.iter().cloned().collect(),
            Some(_) => return Err(wrong_type(key)),
            None => Vec::new(),
        };
        Ok(page(&members, cursor, count, |member| {
            pattern_ok(pattern, member).then(|| SetElement::new(member.clone()))
        }))
    }

    async fn create_string_key(&self, key: &str, value: &str) -> Result<String, StoreError> {
        self.enter("create_string_key").await?;
        self.insert_new(key, Value::String(value.to_string()))?;
        Ok(value.to_string())
    }

    async fn create_hash_key(
        &self,
        key: &str,
        fields: &[HashElement],
    ) -> Result<Vec<HashElement>, StoreError> {
        self.enter("create_hash_key").await?;
        if fields.is_empty() {
            return Err(StoreError::InvalidInput("a hash needs at least one field".into()));
        }
        let map = fields
            .iter()
            .map(|e| (e.field.clone(), e.value.clone()))
            .collect::<IndexMap<_, _>>();
        self.insert_new(key, Value::Hash(map.clone()))?;
        Ok(map.into_iter().map(|(f, v)| HashElement::new(f, v)).collect())
    }

    async fn create_list_key(
        &self,
        key: &str,
        values: &[String],
    ) -> Result<Vec<ListElement>, StoreError> {
        self.enter("create_list_key").await?;
        if values.is_empty() {
            return Err(StoreError::InvalidInput("a list needs at least one element".into()));
        }
        self.insert_new(key, Value::List(values.to_vec()))?;
        Ok(values
            .iter()
            .enumerate()
            .map(|(i, v)| ListElement::new(i as i64, v.clone()))
            .collect())
    }

    async fn create_set_key(
        &self,
        key: &str,
        members: &[String],
    ) -> Result<Vec<SetElement>, StoreError> {
        self.enter("create_set_key").await?;
        if members.is_empty() {
            return Err(StoreError::InvalidInput("a set needs at least one member".into()));
        }
        let set: IndexSet<String> = members.iter().cloned().collect();
        self.insert_new(key, Value::Set(set.clone()))?;
        Ok(set.into_iter().map(SetElement::new).collect())
    }

    async fn set_hash_field(
        &self,
        key: &str,
        field: &str,
        value: &str,
    ) -> Result<ElementWrite<HashElement>, StoreError> {
        self.enter("set_hash_field").await?;
        self.with_hash(key, |map| {
            let added = map.insert(field.to_string(), value.to_string()).is_none();
            Ok(ElementWrite {
                element: HashElement::new(field, value),
                added,
            })
        })
    }

    async fn delete_hash_field(&self, key: &str, field: &str) -> Result<bool, StoreError> {
        self.enter("delete_hash_field").await?;
        self.with_hash(key, |map| Ok(map.shift_remove(field).is_some()))
    }

    async fn set_list_element(
        &self,
        key: &str,
        index: i64,
        value: &str,
    ) -> Result<ListElement, StoreError> {
        self.enter("set_list_element").await?;
        self.with_list(key, |list| {
            let i = resolve_index(index, list.len()).ok_or_else(|| StoreError::ElementNotFound {
                key: key.to_string(),
                element: index.to_string(),
            })?;
            list[i] = value.to_string();
            Ok(ListElement::new(i as i64, value))
        })
    }

    async fn delete_list_element(&self, key: &str, index: i64) -> Result<bool, StoreError> {
        self.enter("delete_list_element").await?;
        self.with_list(key, |list| {
            let i = resolve_index(index, list.len()).ok_or_else(|| StoreError::ElementNotFound {
                key: key.to_string(),
                element: index.to_string(),
            })?;
            list.remove(i);
            Ok(true)
        })
    }

    async fn push_list_element(
        &self,
        key: &str,
        position: ListPosition,
        value: &str,
    ) -> Result<ListElement, StoreError> {
        self.enter("push_list_element").await?;
        self.with_list(key, |list| match position {
            ListPosition::Head => {
                list.insert(0, value.to_string());
                Ok(ListElement::new(0, value))
            }
            ListPosition::Tail => {
                list.push(value.to_string());
                Ok(ListElement::new(list.len() as i64 - 1, value))
            }
        })
    }

    async fn add_set_member(
        &self,
        key: &str,
        value: &str,
    ) -> Result<ElementWrite<SetElement>, StoreError> {
        self.enter("add_set_member").await?;
        self.with_set(key, |set| {
            Ok(ElementWrite {
                element: SetElement::new(value),
                added: set.insert(value.to_string()),
            })
        })
    }

    async fn replace_set_member(
        &self,
        key: &str,
        old_value: &str,
        new_value: &str,
    ) -> Result<ElementWrite<SetElement>, StoreError> {
        self.enter("replace_set_member").await?;
        self.with_set(key, |set| {
            if !set.shift_remove(old_value) {
                return Err(StoreError::ElementNotFound {
                    key: key.to_string(),
                    element: old_value.to_string(),
                });
            }
            Ok(ElementWrite {
                element: SetElement::new(new_value),
                added: set.insert(new_value.to_string()),
            })
        })
    }

    async fn delete_set_member(&self, key: &str, value: &str) -> Result<bool, StoreError> {
        self.enter("delete_set_member").await?;
        self.with_set(key, |set| Ok(set.shift_remove(value)))
    }

    async fn execute(&self, args: &[String]) -> Result<String, StoreError> {
        self.enter("execute").await?;
        let command = args
            .first()
            .ok_or_else(|| StoreError::InvalidInput("empty command".into()))?;
        match command.to_ascii_uppercase().as_str() {
            "PING" => Ok("PONG".to_string()),
            "DBSIZE" => Ok(format!("(integer) {}", lock(&self.inner).data.len())),
            "GET" => {
                let key = args
                    .get(1)
                    .ok_or_else(|| StoreError::InvalidInput("GET needs a key".into()))?;
                Ok(match lock(&self.inner).data.get(key) {
                    Some(Value::String(value)) => format!("\"{}\"", value),
                    Some(_) => return Err(wrong_type(key)),
                    None => "(nil)".to_string(),
                })
            }
            other => Err(StoreError::Unexpected(format!("unknown command '{}'", other))),
        }
    }
}

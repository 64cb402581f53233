use super::error::StoreError;
use super::scanner::ScanSource;
use super::store::{HashElement, Key, KeyType, ListElement, ScanPage, SetElement, StoreClient};
use crate::pattern::GlobPattern;
use async_trait::async_trait;
use std::sync::Arc;

/// Builds an optional glob from user input; empty input clears the filter.
/// An unparsable pattern is an error so the caller can report it.
pub fn parse_pattern(pattern: &str) -> Result<Option<GlobPattern>, regex::Error> {
    if pattern.is_empty() {
        Ok(None)
    } else {
        GlobPattern::new(pattern).map(Some)
    }
}

fn pattern_matches(pattern: &Option<GlobPattern>, candidate: &str) -> bool {
    pattern.as_ref().map_or(true, |glob| glob.is_match(candidate))
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyFilter {
    pub key_type: Option<KeyType>,
    pub pattern: Option<GlobPattern>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatternFilter {
    pub pattern: Option<GlobPattern>,
}

/// Lists are filtered by a point lookup on an index rather than a pattern.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexFilter {
    pub index: Option<i64>,
}

pub struct KeySource {
    store: Arc<dyn StoreClient>,
}

impl KeySource {
    pub fn new(store: Arc<dyn StoreClient>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ScanSource for KeySource {
    type Id = String;
    type Item = Key;
    type Filter = KeyFilter;

    fn id(item: &Key) -> String {
        item.name.clone()
    }

    fn matches(item: &Key, filter: &KeyFilter) -> bool {
        filter.key_type.map_or(true, |t| t == item.key_type)
            && pattern_matches(&filter.pattern, &item.name)
    }

    async fn fetch(
        &self,
        cursor: u64,
        count: usize,
        filter: &KeyFilter,
    ) -> Result<ScanPage<Key>, StoreError> {
        self.store
            .scan_keys(
                cursor,
                count,
                filter.key_type,
                filter.pattern.as_ref().map(GlobPattern::as_str),
            )
            .await
    }
}

/// Element sources are bound to the key they browse.
pub struct HashSource {
    store: Arc<dyn StoreClient>,
    key: String,
}

impl HashSource {
    pub fn new(store: Arc<dyn StoreClient>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }
}

#[async_trait]
impl ScanSource for HashSource {
    type Id = String;
    type Item = HashElement;
    type Filter = PatternFilter;

    fn id(item: &HashElement) -> String {
        item.field.clone()
    }

    fn matches(item: &HashElement, filter: &PatternFilter) -> bool {
        pattern_matches(&filter.pattern, &item.field)
    }

    async fn fetch(
        &self,
        cursor: u64,
        count: usize,
        filter: &PatternFilter,
    ) -> Result<ScanPage<HashElement>, StoreError> {
        self.store
            .scan_hash(
                &self.key,
                cursor,
                count,
                filter.pattern.as_ref().map(GlobPattern::as_str),
            )
            .await
    }
}

pub struct ListSource {
    store: Arc<dyn StoreClient>,
    key: String,
}

impl ListSource {
    pub fn new(store: Arc<dyn StoreClient>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }
}

#[async_trait]
impl ScanSource for ListSource {
    type Id = String;
    type Item = ListElement;
    type Filter = IndexFilter;

    fn id(item: &ListElement) -> String {
        item.index.to_string()
    }

    fn matches(item: &ListElement, filter: &IndexFilter) -> bool {
        filter.index.map_or(true, |index| index == item.index)
    }

    /// Pins a negative index to the position it resolved to, so later writes
    /// to that element still pass the filter.
    fn settle(filter: &IndexFilter, page: &ScanPage<ListElement>) -> Option<IndexFilter> {
        match filter.index {
            Some(index) if index < 0 => page.items.first().map(|element| IndexFilter {
                index: Some(element.index),
            }),
            _ => None,
        }
    }

    async fn fetch(
        &self,
        cursor: u64,
        count: usize,
        filter: &IndexFilter,
    ) -> Result<ScanPage<ListElement>, StoreError> {
        self.store
            .scan_list(&self.key, cursor, count, filter.index)
            .await
    }
}

pub struct SetSource {
    store: Arc<dyn StoreClient>,
    key: String,
}

impl SetSource {
    pub fn new(store: Arc<dyn StoreClient>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }
}

#[async_trait]
impl ScanSource for SetSource {
    type Id = String;
    type Item = SetElement;
    type Filter = PatternFilter;

    fn id(item: &SetElement) -> String {
        item.value.clone()
    }

    fn matches(item: &SetElement, filter: &PatternFilter) -> bool {
        pattern_matches(&filter.pattern, &item.value)
    }

    async fn fetch(
        &self,
        cursor: u64,
        count: usize,
        filter: &PatternFilter,
    ) -> Result<ScanPage<SetElement>, StoreError> {
        self.store
            .scan_set(
                &self.key,
                cursor,
                count,
                filter.pattern.as_ref().map(GlobPattern::as_str),
            )
            .await
    }
}

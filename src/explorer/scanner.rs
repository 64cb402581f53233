use super::abortable::lock;
use super::error::StoreError;
use super::store::ScanPage;
use async_trait::async_trait;
use indexmap::IndexMap;
use std::hash::Hash;
use std::sync::Mutex;

/// Per-collection hooks plugged into [`IncrementalScanner`]: item identity,
/// the client-side mirror of the server filter, and the page fetch itself.
#[async_trait]
pub trait ScanSource: Send + Sync {
    type Id: Clone + Eq + Hash + Send + Sync;
    type Item: Clone + Send + Sync;
    type Filter: Clone + Default + Send + Sync;

    fn id(item: &Self::Item) -> Self::Id;

    fn matches(item: &Self::Item, filter: &Self::Filter) -> bool;

    /// A filter that only becomes exact once the server answered (a relative
    /// position, say) can be pinned here. Returning `Some` replaces the active
    /// filter without resetting the scan.
    fn settle(_filter: &Self::Filter, _page: &ScanPage<Self::Item>) -> Option<Self::Filter> {
        None
    }

    async fn fetch(
        &self,
        cursor: u64,
        count: usize,
        filter: &Self::Filter,
    ) -> Result<ScanPage<Self::Item>, StoreError>;
}

struct ScanState<S: ScanSource> {
    filter: S::Filter,
    /// `None` until the first page of the current session is merged.
    cursor: Option<u64>,
    total: Option<u64>,
    items: IndexMap<S::Id, S::Item>,
    /// Bumped on every reset so a page requested before it is never merged after it.
    generation: u64,
}

/// Cursor-driven, deduplicated, order-preserving view over a server-side collection.
pub struct IncrementalScanner<S: ScanSource> {
    source: S,
    page_size: usize,
    state: Mutex<ScanState<S>>,
}

impl<S: ScanSource> IncrementalScanner<S> {
    pub fn new(source: S, page_size: usize) -> Self {
        Self {
            source,
            page_size: page_size.max(1),
            state: Mutex::new(ScanState {
                filter: S::Filter::default(),
                cursor: None,
                total: None,
                items: IndexMap::new(),
                generation: 0,
            }),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn filter(&self) -> S::Filter {
        lock(&self.state).filter.clone()
    }

    /// Replaces the filter and resets. Does not fetch.
    pub fn set_filter(&self, filter: S::Filter) {
        lock(&self.state).filter = filter;
        self.reset();
    }

    pub fn reset(&self) {
        let mut state = lock(&self.state);
        state.cursor = None;
        state.total = None;
        state.items.clear();
        state.generation += 1;
    }

    pub fn has_more(&self) -> bool {
        lock(&self.state).cursor != Some(0)
    }

    /// Server-reported size; `None` until a page was fetched under the current filter.
    pub fn total(&self) -> Option<u64> {
        lock(&self.state).total
    }

    pub fn len(&self) -> usize {
        lock(&self.state).items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn elements(&self) -> Vec<S::Item> {
        lock(&self.state).items.values().cloned().collect()
    }

    pub fn get(&self, id: &S::Id) -> Option<S::Item> {
        lock(&self.state).items.get(id).cloned()
    }

    pub fn contains(&self, id: &S::Id) -> bool {
        lock(&self.state).items.contains_key(id)
    }

    /// Fetches and merges the next page. Returns the number of items the page carried.
    pub async fn fetch_next_page(&self) -> Result<usize, StoreError> {
        let (cursor, filter, generation) = {
            let state = lock(&self.state);
            if state.cursor == Some(0) {
                return Ok(0);
            }
            (state.cursor.unwrap_or(0), state.filter.clone(), state.generation)
        };

        let page = self.source.fetch(cursor, self.page_size, &filter).await?;

        let mut state = lock(&self.state);
        if state.generation != generation {
            log::debug!("dropping page fetched before a reset");
            return Ok(0);
        }
        if let Some(settled) = S::settle(&state.filter, &page) {
            state.filter = settled;
        }
        let received = page.items.len();
        for item in page.items {
            state.items.insert(S::id(&item), item);
        }
        state.cursor = Some(page.cursor);
        state.total = Some(page.total);
        log::debug!(
            "merged page: {} items, cursor {} -> {}, {} held",
            received,
            cursor,
            page.cursor,
            state.items.len()
        );
        Ok(received)
    }

    /// Replaces the collection with a complete, locally known payload (a key
    /// that was just created), marking the scan exhausted.
    pub fn seed<I>(&self, items: I)
    where
        I: IntoIterator<Item = S::Item>,
    {
        let mut state = lock(&self.state);
        state.items.clear();
        state.generation += 1;
        for item in items {
            state.items.insert(S::id(&item), item);
        }
        state.cursor = Some(0);
        state.total = Some(state.items.len() as u64);
    }

    /// Upserts items that satisfy the active filter. Items already present are
    /// replaced in place; new ones are appended. Returns how many were appended.
    pub fn update<I>(&self, items: I) -> usize
    where
        I: IntoIterator<Item = S::Item>,
    {
        let mut state = lock(&self.state);
        let mut appended = 0;
        for item in items {
            if !S::matches(&item, &state.filter) {
                continue;
            }
            let id = S::id(&item);
            match state.items.get_mut(&id) {
                Some(existing) => *existing = item,
                None => {
                    state.items.insert(id, item);
                    appended += 1;
                }
            }
        }
        appended
    }

    /// Removes an item, returning the position it held.
    pub fn delete(&self, id: &S::Id) -> Option<usize> {
        lock(&self.state)
            .items
            .shift_remove_full(id)
            .map(|(index, _, _)| index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::GlobPattern;
    use std::collections::VecDeque;

    #[derive(Default, Clone)]
    struct NameFilter {
        pattern: Option<GlobPattern>,
    }

    /// Serves scripted pages in order.
    struct Scripted {
        pages: Mutex<VecDeque<ScanPage<String>>>,
    }

    impl Scripted {
        fn new(pages: Vec<ScanPage<String>>) -> Self {
            Self {
                pages: Mutex::new(pages.into()),
            }
        }
    }

    #[async_trait]
    impl ScanSource for Scripted {
        type Id = String;
        type Item = String;
        type Filter = NameFilter;

        fn id(item: &String) -> String {
            item.clone()
        }

        fn matches(item: &String, filter: &NameFilter) -> bool {
            filter.pattern.as_ref().map_or(true, |p| p.is_match(item))
        }

        async fn fetch(
            &self,
            _cursor: u64,
            _count: usize,
            _filter: &NameFilter,
        ) -> Result<ScanPage<String>, StoreError> {
            lock(&self.pages)
                .pop_front()
                .ok_or_else(|| StoreError::Unexpected("no more pages".into()))
        }
    }

    fn page(cursor: u64, items: &[&str]) -> ScanPage<String> {
        ScanPage {
            cursor,
            total: 10,
            items: items.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn fetch_dedupes_and_stops_at_cursor_zero() {
        let scanner = IncrementalScanner::new(
            Scripted::new(vec![page(5, &["a", "b"]), page(0, &["b", "c"])]),
            2,
        );
        assert!(scanner.has_more());
        assert_eq!(scanner.total(), None);

        scanner.fetch_next_page().await.expect("page 1");
        assert_eq!(scanner.len(), 2);
        assert!(scanner.has_more());

        scanner.fetch_next_page().await.expect("page 2");
        assert_eq!(scanner.elements(), vec!["a", "b", "c"]);
        assert!(!scanner.has_more());
        assert_eq!(scanner.total(), Some(10));

        // Exhausted: no request goes out (the script is empty and would error).
        assert_eq!(scanner.fetch_next_page().await.expect("no-op"), 0);
        assert_eq!(scanner.len(), 3);
    }

    #[tokio::test]
    async fn length_never_decreases_across_fetches() {
        let scanner = IncrementalScanner::new(
            Scripted::new(vec![
                page(3, &["a", "b"]),
                page(7, &["a"]),
                page(9, &[]),
                page(0, &["d", "b"]),
            ]),
            2,
        );
        let mut previous = 0;
        while scanner.has_more() {
            scanner.fetch_next_page().await.expect("page");
            assert!(scanner.len() >= previous);
            previous = scanner.len();
        }
        assert_eq!(scanner.elements(), vec!["a", "b", "d"]);
    }

    #[test]
    fn update_ignores_items_outside_filter() {
        let scanner = IncrementalScanner::new(Scripted::new(vec![]), 10);
        scanner.set_filter(NameFilter {
            pattern: Some(GlobPattern::new("user:*").expect("glob")),
        });
        let appended = scanner.update(vec![
            "user:1".to_string(),
            "order:1".to_string(),
            "user:2".to_string(),
            "user:1".to_string(),
        ]);
        assert_eq!(appended, 2);
        assert_eq!(scanner.elements(), vec!["user:1", "user:2"]);
        assert!(scanner.elements().iter().all(|k| k.starts_with("user:")));
    }

    #[test]
    fn delete_reports_prior_position() {
        let scanner = IncrementalScanner::new(Scripted::new(vec![]), 10);
        scanner.update(vec!["a".to_string(), "b".to_string(), "c".to_string()]);
        assert_eq!(scanner.delete(&"b".to_string()), Some(1));
        assert_eq!(scanner.delete(&"b".to_string()), None);
        assert_eq!(scanner.elements(), vec!["a", "c"]);
    }

    #[tokio::test]
    async fn set_filter_resets_without_fetching() {
        let scanner = IncrementalScanner::new(Scripted::new(vec![page(0, &["a"])]), 10);
        scanner.fetch_next_page().await.expect("page");
        assert!(!scanner.has_more());

        scanner.set_filter(NameFilter::default());
        assert!(scanner.is_empty());
        assert!(scanner.has_more());
        assert_eq!(scanner.total(), None);
    }

    #[tokio::test]
    async fn page_requested_before_reset_is_dropped() {
        struct Gated {
            gate: tokio::sync::Notify,
        }

        #[async_trait]
        impl ScanSource for Gated {
            type Id = String;
            type Item = String;
            type Filter = NameFilter;

            fn id(item: &String) -> String {
                item.clone()
            }

            fn matches(_item: &String, _filter: &NameFilter) -> bool {
                true
            }

            async fn fetch(
                &self,
                _cursor: u64,
                _count: usize,
                _filter: &NameFilter,
            ) -> Result<ScanPage<String>, StoreError> {
                self.gate.notified().await;
                Ok(page(4, &["stale"]))
            }
        }

        let scanner = IncrementalScanner::new(
            Gated {
                gate: tokio::sync::Notify::new(),
            },
            10,
        );
        let (fetched, _) = tokio::join!(scanner.fetch_next_page(), async {
            scanner.reset();
            scanner.source().gate.notify_one();
        });
        assert_eq!(fetched.expect("page"), 0);
        assert!(scanner.is_empty());
        assert_eq!(scanner.total(), None);
        assert!(scanner.has_more());
    }

    #[test]
    fn upsert_keeps_position_of_existing_items() {
        #[derive(Clone)]
        struct Row(&'static str, u32);

        struct Rows;

        #[async_trait]
        impl ScanSource for Rows {
            type Id = &'static str;
            type Item = Row;
            type Filter = ();

            fn id(item: &Row) -> &'static str {
                item.0
            }

            fn matches(_item: &Row, _filter: &()) -> bool {
                true
            }

            async fn fetch(&self, _: u64, _: usize, _: &()) -> Result<ScanPage<Row>, StoreError> {
                Ok(ScanPage { cursor: 0, total: 0, items: vec![] })
            }
        }

        let scanner = IncrementalScanner::new(Rows, 10);
        scanner.update(vec![Row("a", 1), Row("b", 1), Row("c", 1)]);
        assert_eq!(scanner.update(vec![Row("b", 2), Row("d", 1)]), 1);
        let rows: Vec<(&str, u32)> = scanner.elements().iter().map(|r| (r.0, r.1)).collect();
        assert_eq!(rows, vec![("a", 1), ("b", 2), ("c", 1), ("d", 1)]);
    }
}

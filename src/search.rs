//! Debounced item search for the transfer creation page.
//!
//! **Rules:**
//! - A keyword is searched only after the caller stops typing for the
//!   quiescence window and only when it has at least `min_chars` characters
//! - Each keystroke cancels the pending timer (and any older in-flight
//!   request) before starting a new one
//! - Results apply only when they belong to the latest generation; stale
//!   responses are dropped
//! - Errors raise a notice and keep the previous results
//! - After `teardown()` nothing is applied any more
//!
//! Applied results are also pushed to an optional subscriber so the bridge can
//! forward them without polling.

use serde::Serialize;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::api::TransferApi;
use crate::config::SearchSettings;
use crate::models::StockSearchResult;
use crate::notify::Notifier;

/// Results of one search generation, sent once they are applied.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchUpdate {
    pub keyword: String,
    pub generation: u64,
    pub results: Vec<StockSearchResult>,
}

#[derive(Default)]
struct SearchInner {
    keyword: String,
    generation: u64,
    pending: Option<JoinHandle<()>>,
    results: Vec<StockSearchResult>,
    loading: bool,
    updates: Option<mpsc::UnboundedSender<SearchUpdate>>,
}

impl SearchInner {
    /// Start a new generation, cancelling whatever the previous one had
    /// scheduled.
    fn bump(&mut self) -> u64 {
        self.generation += 1;
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
        self.generation
    }
}

pub struct ItemSearch<A: TransferApi + 'static> {
    api: Arc<A>,
    notifier: Notifier,
    settings: SearchSettings,
    inner: Arc<Mutex<SearchInner>>,
    teardown: CancellationToken,
}

fn lock(inner: &Mutex<SearchInner>) -> std::sync::MutexGuard<'_, SearchInner> {
    inner.lock().unwrap_or_else(|e| e.into_inner())
}

impl<A: TransferApi + 'static> ItemSearch<A> {
    pub fn new(api: Arc<A>, notifier: Notifier, settings: SearchSettings) -> Self {
        Self {
            api,
            notifier,
            settings,
            inner: Arc::new(Mutex::new(SearchInner::default())),
            teardown: CancellationToken::new(),
        }
    }

    /// Receive a `SearchUpdate` every time a generation's results are applied.
    pub fn subscribe(&self, tx: mpsc::UnboundedSender<SearchUpdate>) {
        lock(&self.inner).updates = Some(tx);
    }

    /// Feed the current contents of the search box.
    pub fn on_keyword(&self, keyword: &str) {
        let mut inner = lock(&self.inner);
        let generation = inner.bump();
        inner.keyword = keyword.to_string();

        if self.teardown.is_cancelled() {
            return;
        }

        let trimmed = keyword.trim().to_string();
        if trimmed.chars().count() < self.settings.min_chars {
            inner.results.clear();
            inner.loading = false;
            return;
        }

        inner.pending = Some(self.spawn_lookup(generation, trimmed));
    }

    fn spawn_lookup(&self, generation: u64, keyword: String) -> JoinHandle<()> {
        let api = Arc::clone(&self.api);
        let inner = Arc::clone(&self.inner);
        let notifier = self.notifier.clone();
        let token = self.teardown.clone();
        let window = self.settings.debounce;

        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(window) => {}
            }

            {
                let mut guard = lock(&inner);
                if guard.generation != generation {
                    return;
                }
                guard.loading = true;
            }
            debug!(keyword = %keyword, generation, "item search issued");

            let result = tokio::select! {
                _ = token.cancelled() => return,
                r = api.search_items(&keyword) => r,
            };

            let mut guard = lock(&inner);
            if guard.generation != generation || token.is_cancelled() {
                debug!(keyword = %keyword, generation, "dropping stale search response");
                return;
            }
            guard.loading = false;
            guard.pending = None;
            match result {
                Ok(items) => {
                    debug!(keyword = %keyword, count = items.len(), "item search applied");
                    if let Some(tx) = &guard.updates {
                        let _ = tx.send(SearchUpdate {
                            keyword: keyword.clone(),
                            generation,
                            results: items.clone(),
                        });
                    }
                    guard.results = items;
                }
                Err(e) => {
                    drop(guard);
                    warn!(keyword = %keyword, error = %e, "item search failed");
                    notifier.error(format!("Search failed: {e}"));
                }
            }
        })
    }

    pub fn results(&self) -> Vec<StockSearchResult> {
        lock(&self.inner).results.clone()
    }

    pub fn keyword(&self) -> String {
        lock(&self.inner).keyword.clone()
    }

    pub fn is_loading(&self) -> bool {
        lock(&self.inner).loading
    }

    /// Clear the box and the candidates, cancelling anything pending.
    pub fn clear(&self) {
        let mut inner = lock(&self.inner);
        inner.bump();
        inner.keyword.clear();
        inner.results.clear();
        inner.loading = false;
    }

    /// Page closed: cancel the pending timer and ignore late responses.
    pub fn teardown(&self) {
        self.teardown.cancel();
        let mut inner = lock(&self.inner);
        inner.bump();
        inner.loading = false;
    }
}

impl<A: TransferApi + 'static> Drop for ItemSearch<A> {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::{drain, NoticeLevel};
    use crate::test_support::{item, FakeApi};
    use std::time::Duration;

    fn setup() -> (
        Arc<FakeApi>,
        ItemSearch<FakeApi>,
        tokio::sync::mpsc::UnboundedReceiver<crate::notify::Notice>,
    ) {
        let api = Arc::new(FakeApi::new().with_catalog(vec![
            item(1, "BRG-001", "Baterai Samsung", 10),
            item(2, "BRG-002", "Baterai Xiaomi", 4),
            item(3, "LCD-010", "LCD Oppo", 2),
        ]));
        let (notifier, rx) = Notifier::channel();
        let search = ItemSearch::new(Arc::clone(&api), notifier, SearchSettings::default());
        (api, search, rx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_keywords_never_hit_the_server() {
        let (api, search, _rx) = setup();
        for kw in ["", "b", " b ", "é"] {
            search.on_keyword(kw);
            tokio::time::sleep(Duration::from_millis(800)).await;
            assert!(search.results().is_empty());
        }
        assert!(api.search_keywords().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rapid_typing_issues_one_request_with_final_keyword() {
        let (api, search, _rx) = setup();
        for kw in ["ba", "bat", "bate", "bater", "batera", "baterai"] {
            search.on_keyword(kw);
            tokio::time::sleep(Duration::from_millis(120)).await;
        }
        assert!(api.search_keywords().is_empty());

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(api.search_keywords(), vec!["baterai".to_string()]);
        assert_eq!(search.results().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_waits_for_full_quiescence_window() {
        let (api, search, _rx) = setup();
        search.on_keyword("lcd");
        tokio::time::sleep(Duration::from_millis(499)).await;
        assert!(api.search_keywords().is_empty());
        tokio::time::sleep(Duration::from_millis(2)).await;
        tokio::task::yield_now().await;
        assert_eq!(api.search_keywords(), vec!["lcd".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_below_minimum_clears_results() {
        let (api, search, _rx) = setup();
        search.on_keyword("lcd");
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(search.results().len(), 1);

        search.on_keyword("l");
        assert!(search.results().is_empty());
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(api.search_keywords().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_response_does_not_overwrite_newer() {
        let (api, search, _rx) = setup();
        api.delay_search("baterai", Duration::from_secs(3));

        search.on_keyword("baterai");
        tokio::time::sleep(Duration::from_millis(600)).await;
        // "baterai" is in flight; the user keeps typing.
        search.on_keyword("lcd");
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(
            api.search_keywords(),
            vec!["baterai".to_string(), "lcd".to_string()]
        );
        let results = search.results();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].code, "LCD-010");
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_keeps_previous_results_and_notifies() {
        let (api, search, mut rx) = setup();
        search.on_keyword("baterai");
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(search.results().len(), 2);

        api.fail_next("search", 500, "Server sibuk");
        search.on_keyword("lcd");
        tokio::time::sleep(Duration::from_millis(600)).await;

        assert_eq!(search.results().len(), 2);
        let notices = drain(&mut rx);
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].level, NoticeLevel::Error);
        assert!(notices[0].message.contains("Server sibuk"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_applied_results_are_pushed_to_subscriber() {
        let (api, search, _rx) = setup();
        let (tx, mut updates) = mpsc::unbounded_channel();
        search.subscribe(tx);
        api.delay_search("baterai", Duration::from_secs(3));

        search.on_keyword("baterai");
        tokio::time::sleep(Duration::from_millis(600)).await;
        search.on_keyword("lcd");
        tokio::time::sleep(Duration::from_secs(5)).await;

        let update = updates.try_recv().unwrap();
        assert_eq!(update.keyword, "lcd");
        assert_eq!(update.generation, 2);
        assert_eq!(update.results.len(), 1);
        assert_eq!(update.results[0].code, "LCD-010");
        // the stale "baterai" generation is never pushed
        assert!(updates.try_recv().is_err());

        api.fail_next("search", 500, "Server sibuk");
        search.on_keyword("baterai");
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(updates.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_cancels_pending_timer() {
        let (api, search, _rx) = setup();
        search.on_keyword("baterai");
        tokio::time::sleep(Duration::from_millis(200)).await;
        search.teardown();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(api.search_keywords().is_empty());

        search.on_keyword("lcd");
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(api.search_keywords().is_empty());
    }
}

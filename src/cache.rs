//! Time-bounded cache-aside cells over page-level fetches.
//!
//! A [`CachedCell`] owns one cache key. Activating it either adopts a fresh
//! entry from the [`KvStore`] or runs its producer on a worker thread; the UI
//! calls [`CachedCell::poll`] once per frame to pick up the result.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

use crate::db::KvStore;

pub const FIVE_MINUTES: Duration = Duration::from_secs(5 * 60);
pub const ONE_HOUR: Duration = Duration::from_secs(60 * 60);
pub const ONE_DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Cache keys shared between the views that read them and the mutation paths
/// that invalidate them.
pub mod keys {
    pub const HOMEPAGE_COLUMNS: &str = "homepage_columns";
    pub const HOMEPAGE_POSTS_PREFIX: &str = "homepage_posts_page_";

    pub fn homepage_posts(page: usize) -> String {
        format!("{}{}", HOMEPAGE_POSTS_PREFIX, page)
    }

    pub fn post_detail(id: &str) -> String {
        format!("post_detail_{}", id)
    }

    pub fn column_detail(id: &str) -> String {
        format!("column_detail_{}", id)
    }
}

pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry<T> {
    pub value: T,
    pub stored_at_epoch_ms: i64,
}

impl<T> CacheEntry<T> {
    pub fn is_fresh(&self, now_ms: i64, ttl: Duration) -> bool {
        now_ms - self.stored_at_epoch_ms < ttl.as_millis() as i64
    }
}

pub type Producer<T> = Arc<dyn Fn() -> anyhow::Result<T> + Send + Sync>;

struct Completion<T> {
    generation: u64,
    result: Result<T, String>,
}

pub struct CachedCell<T> {
    key: String,
    ttl: Duration,
    store: KvStore,
    clock: Arc<dyn Clock>,
    producer: Producer<T>,
    deps: Option<Vec<String>>,
    data: Option<T>,
    loading: bool,
    error: Option<String>,
    generation: u64,
    tx: Sender<Completion<T>>,
    rx: Receiver<Completion<T>>,
}

impl<T> CachedCell<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + 'static,
{
    pub fn with_clock(
        key: impl Into<String>,
        ttl: Duration,
        store: KvStore,
        producer: Producer<T>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            key: key.into(),
            ttl,
            store,
            clock,
            producer,
            deps: None,
            data: None,
            loading: false,
            error: None,
            generation: 0,
            tx,
            rx,
        }
    }

    pub fn data(&self) -> Option<&T> {
        self.data.as_ref()
    }

    pub fn loading(&self) -> bool {
        self.loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Runs the cache-aside read when first called and whenever `deps`
    /// differs from the previous activation. Calls with unchanged
    /// dependencies are no-ops, so this is safe to call every frame.
    pub fn activate(&mut self, deps: &[String]) {
        if self.deps.as_deref() == Some(deps) {
            return;
        }
        self.deps = Some(deps.to_vec());

        if let Some(entry) = self.read_entry() {
            if entry.is_fresh(self.clock.now_ms(), self.ttl) {
                debug!(key = %self.key, "cache hit");
                // Anything still in flight belongs to the old dependencies.
                self.generation += 1;
                self.data = Some(entry.value);
                self.loading = false;
                self.error = None;
                return;
            }
        }

        self.start_fetch();
    }

    /// Bypasses the cache and runs the producer again.
    pub fn refetch(&mut self) {
        self.start_fetch();
    }

    /// Drains finished fetches. Completions from superseded generations are
    /// dropped. Returns true when state changed.
    pub fn poll(&mut self) -> bool {
        let mut changed = false;
        while let Ok(completion) = self.rx.try_recv() {
            if completion.generation != self.generation {
                debug!(key = %self.key, "discarding stale completion");
                continue;
            }

            self.loading = false;
            changed = true;
            match completion.result {
                Ok(value) => {
                    self.write_entry(&value);
                    self.data = Some(value);
                    self.error = None;
                }
                Err(message) => {
                    warn!(key = %self.key, error = %message, "fetch failed");
                    self.error = Some(message);
                }
            }
        }
        changed
    }

    fn start_fetch(&mut self) {
        self.generation += 1;
        self.loading = true;
        self.error = None;

        let generation = self.generation;
        let producer = self.producer.clone();
        let tx = self.tx.clone();

        thread::spawn(move || {
            let result = producer().map_err(|e| e.to_string());
            // The receiver is gone when the view was torn down; nothing to do.
            let _ = tx.send(Completion { generation, result });
        });
    }

    fn read_entry(&self) -> Option<CacheEntry<T>> {
        let raw = match self.store.get(&self.key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(key = %self.key, error = %e, "cache read failed");
                return None;
            }
        };

        match serde_json::from_str::<CacheEntry<T>>(&raw) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(key = %self.key, error = %e, "ignoring corrupted cache entry");
                None
            }
        }
    }

    fn write_entry(&self, value: &T) {
        let entry = CacheEntry {
            value: value.clone(),
            stored_at_epoch_ms: self.clock.now_ms(),
        };
        let written = serde_json::to_string(&entry)
            .map_err(anyhow::Error::from)
            .and_then(|json| self.store.set(&self.key, &json));
        if let Err(e) = written {
            warn!(key = %self.key, error = %e, "cache write failed");
        }
    }
}

/// Drops the cached column list after a column is created.
pub fn invalidate_columns(store: &KvStore) -> anyhow::Result<()> {
    store.remove(keys::HOMEPAGE_COLUMNS)
}

/// Drops every entry a post write can make stale: its detail page, all
/// homepage post pages, and the detail pages of the columns it left or
/// joined.
pub fn invalidate_post(store: &KvStore, post_id: Option<&str>, column_ids: &[String]) -> anyhow::Result<()> {
    if let Some(id) = post_id {
        store.remove(&keys::post_detail(id))?;
    }
    let pages = store.remove_prefix(keys::HOMEPAGE_POSTS_PREFIX)?;
    for column_id in column_ids {
        store.remove(&keys::column_detail(column_id))?;
    }
    debug!(?post_id, pages, columns = column_ids.len(), "invalidated post caches");
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::test_support::ManualClock;
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    fn settle<T>(cell: &mut CachedCell<T>)
    where
        T: Serialize + DeserializeOwned + Clone + Send + 'static,
    {
        let deadline = Instant::now() + Duration::from_secs(5);
        while cell.loading() && Instant::now() < deadline {
            cell.poll();
            thread::sleep(Duration::from_millis(2));
        }
        assert!(!cell.loading(), "cell did not settle");
    }

    fn counting_producer(calls: Arc<AtomicUsize>, value: &'static str) -> Producer<String> {
        Arc::new(move || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(value.to_string())
        })
    }

    fn store_entry(store: &KvStore, key: &str, value: &str, stored_at: i64) {
        let entry = CacheEntry {
            value: value.to_string(),
            stored_at_epoch_ms: stored_at,
        };
        store.set(key, &serde_json::to_string(&entry).unwrap()).unwrap();
    }

    #[test]
    fn fresh_entry_skips_producer() {
        let store = KvStore::open_in_memory("test").unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let ttl = FIVE_MINUTES;
        let stored_at = 1_000_000;
        store_entry(&store, "k", "cached", stored_at);

        let clock = ManualClock::at(stored_at + ttl.as_millis() as i64 - 1);
        let mut cell = CachedCell::with_clock("k", ttl, store, counting_producer(calls.clone(), "fresh"), clock);
        cell.activate(&[]);

        assert!(!cell.loading());
        assert_eq!(cell.data().map(String::as_str), Some("cached"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn expired_entry_invokes_producer_and_rewrites_cache() {
        let store = KvStore::open_in_memory("test").unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let ttl = FIVE_MINUTES;
        let stored_at = 1_000_000;
        store_entry(&store, "k", "cached", stored_at);

        let now = stored_at + ttl.as_millis() as i64 + 1;
        let clock = ManualClock::at(now);
        let mut cell = CachedCell::with_clock("k", ttl, store.clone(), counting_producer(calls.clone(), "fresh"), clock);
        cell.activate(&[]);
        assert!(cell.loading());
        settle(&mut cell);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cell.data().map(String::as_str), Some("fresh"));

        let raw = store.get("k").unwrap().unwrap();
        let entry: CacheEntry<String> = serde_json::from_str(&raw).unwrap();
        assert_eq!(entry.value, "fresh");
        assert_eq!(entry.stored_at_epoch_ms, now);
    }

    #[test]
    fn corrupted_entry_is_a_cold_miss() {
        let store = KvStore::open_in_memory("test").unwrap();
        store.set("k", "{not json").unwrap();
        let calls = Arc::new(AtomicUsize::new(0));

        let mut cell = CachedCell::with_clock("k", ONE_HOUR, store, counting_producer(calls.clone(), "v"), ManualClock::at(0));
        cell.activate(&[]);
        settle(&mut cell);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cell.error(), None);
        assert_eq!(cell.data().map(String::as_str), Some("v"));
    }

    #[test]
    fn failure_surfaces_error_and_keeps_previous_data() {
        let store = KvStore::open_in_memory("test").unwrap();
        let fail = Arc::new(AtomicUsize::new(0));
        let flag = fail.clone();
        let producer: Producer<String> = Arc::new(move || {
            if flag.load(Ordering::SeqCst) > 0 {
                Err(anyhow::anyhow!("service unavailable"))
            } else {
                Ok("first".to_string())
            }
        });

        let mut cell = CachedCell::with_clock("k", ONE_HOUR, store, producer, ManualClock::at(0));
        cell.activate(&[]);
        settle(&mut cell);
        assert_eq!(cell.data().map(String::as_str), Some("first"));

        fail.store(1, Ordering::SeqCst);
        cell.refetch();
        settle(&mut cell);

        assert_eq!(cell.error(), Some("service unavailable"));
        assert_eq!(cell.data().map(String::as_str), Some("first"));
    }

    #[test]
    fn refetch_bypasses_fresh_cache() {
        let store = KvStore::open_in_memory("test").unwrap();
        store_entry(&store, "k", "cached", 0);
        let calls = Arc::new(AtomicUsize::new(0));

        let mut cell = CachedCell::with_clock("k", ONE_DAY, store, counting_producer(calls.clone(), "fresh"), ManualClock::at(10));
        cell.activate(&[]);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        cell.refetch();
        settle(&mut cell);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cell.data().map(String::as_str), Some("fresh"));
    }

    #[test]
    fn unchanged_dependencies_do_not_refetch() {
        let store = KvStore::open_in_memory("test").unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let mut cell = CachedCell::with_clock("k", ONE_HOUR, store.clone(), counting_producer(calls.clone(), "v"), ManualClock::at(0));

        let deps = vec!["1".to_string()];
        cell.activate(&deps);
        cell.activate(&deps);
        settle(&mut cell);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // New dependencies re-run the cache check, which now hits.
        cell.activate(&["2".to_string()]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!cell.loading());
    }

    #[test]
    fn superseded_fetch_result_is_discarded() {
        let store = KvStore::open_in_memory("test").unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let producer: Producer<String> = Arc::new(move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                thread::sleep(Duration::from_millis(100));
                Ok("slow".to_string())
            } else {
                Ok("fast".to_string())
            }
        });

        let mut cell = CachedCell::with_clock("k", ONE_HOUR, store, producer, ManualClock::at(0));
        cell.activate(&[]);
        cell.refetch();
        settle(&mut cell);
        assert_eq!(cell.data().map(String::as_str), Some("fast"));

        thread::sleep(Duration::from_millis(150));
        cell.poll();
        assert_eq!(cell.data().map(String::as_str), Some("fast"));
    }

    #[test]
    fn post_invalidation_clears_related_keys_only() {
        let store = KvStore::open_in_memory("https://a.example").unwrap();
        for key in [
            keys::post_detail("p1"),
            keys::post_detail("p2"),
            keys::homepage_posts(1),
            keys::homepage_posts(2),
            keys::column_detail("c1"),
            keys::HOMEPAGE_COLUMNS.to_string(),
        ] {
            store.set(&key, "{}").unwrap();
        }

        invalidate_post(&store, Some("p1"), &["c1".to_string()]).unwrap();

        assert_eq!(store.get(&keys::post_detail("p1")).unwrap(), None);
        assert_eq!(store.get(&keys::homepage_posts(1)).unwrap(), None);
        assert_eq!(store.get(&keys::homepage_posts(2)).unwrap(), None);
        assert_eq!(store.get(&keys::column_detail("c1")).unwrap(), None);
        assert!(store.get(&keys::post_detail("p2")).unwrap().is_some());
        assert!(store.get(keys::HOMEPAGE_COLUMNS).unwrap().is_some());

        invalidate_columns(&store).unwrap();
        assert_eq!(store.get(keys::HOMEPAGE_COLUMNS).unwrap(), None);
    }
}

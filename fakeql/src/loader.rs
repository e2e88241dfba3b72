//! Batched entity loading.
//!
//! Collapses near-simultaneous loads of an entity by key into one batch
//! fetch per collection window. The first `load` of a window schedules a
//! flush; keys arriving before the flush join it, keys arriving after join
//! the next window unless their batch is still in flight, in which case
//! they share that fetch. Results are cached for the rest of the request,
//! so a key is fetched at most once per request no matter how many fields
//! ask for it.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_graphql::Value;
use futures::future::BoxFuture;
use indexmap::IndexMap;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::error::MockError;

/// How long a batch window stays open collecting keys.
pub const DEFAULT_WINDOW: Duration = Duration::from_millis(1);

/// Boxed error for batch fetch implementations.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A batch fetch: receives a window's distinct keys and returns one value
/// per key, in the same order.
///
/// Plain `async fn(Vec<String>) -> Result<Vec<Value>, BoxError>` implements
/// this.
pub trait BatchFn: Send + Sync {
    fn fetch(&self, keys: Vec<String>) -> BoxFuture<'static, Result<Vec<Value>, BoxError>>;
}

impl<F, Fut> BatchFn for F
where
    F: Fn(Vec<String>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Vec<Value>, BoxError>> + Send + 'static,
{
    fn fetch(&self, keys: Vec<String>) -> BoxFuture<'static, Result<Vec<Value>, BoxError>> {
        Box::pin((self)(keys))
    }
}

type Waiter = oneshot::Sender<Result<Value, MockError>>;

#[derive(Default)]
struct LoaderState {
    /// Distinct pending keys in arrival order, each with its waiters.
    pending: IndexMap<String, Vec<Waiter>>,
    /// Keys dispatched in a batch whose fetch has not completed yet. Late
    /// loads append their waiter here instead of opening a new window.
    in_flight: HashMap<String, Vec<Waiter>>,
    /// Keys fulfilled earlier in this request.
    cached: HashMap<String, Value>,
    /// Whether a flush is already scheduled for the open window.
    flush_scheduled: bool,
}

struct LoaderInner {
    entity: String,
    window: Duration,
    fetch: Arc<dyn BatchFn>,
    state: Mutex<LoaderState>,
}

/// One entity's per-request loader.
#[derive(Clone)]
pub struct EntityLoader {
    inner: Arc<LoaderInner>,
}

impl EntityLoader {
    pub(crate) fn new(entity: impl Into<String>, window: Duration, fetch: Arc<dyn BatchFn>) -> Self {
        Self {
            inner: Arc::new(LoaderInner {
                entity: entity.into(),
                window,
                fetch,
                state: Mutex::new(LoaderState::default()),
            }),
        }
    }

    /// Load `key`, joining the open batch window.
    ///
    /// Concurrent loads of the same key share one fetch: a key whose batch
    /// is already in flight joins that fetch, and a key fulfilled earlier
    /// in the request resolves immediately from cache.
    pub async fn load(&self, key: impl Into<String>) -> Result<Value, MockError> {
        let key = key.into();
        let receiver = {
            let mut state = self.inner.state.lock();
            if let Some(value) = state.cached.get(&key) {
                return Ok(value.clone());
            }
            let (sender, receiver) = oneshot::channel();
            if let Some(waiters) = state.in_flight.get_mut(&key) {
                waiters.push(sender);
            } else {
                state.pending.entry(key).or_default().push(sender);
                if !state.flush_scheduled {
                    state.flush_scheduled = true;
                    tokio::spawn(Self::flush_after_window(self.inner.clone()));
                }
            }
            receiver
        };
        match receiver.await {
            Ok(result) => result,
            Err(_) => Err(MockError::BatchFetchFailed {
                entity: self.inner.entity.clone(),
                reason: "batch window was dropped before completing".to_string(),
            }),
        }
    }

    async fn flush_after_window(inner: Arc<LoaderInner>) {
        tokio::time::sleep(inner.window).await;
        let keys = {
            let mut state = inner.state.lock();
            state.flush_scheduled = false;
            let batch = std::mem::take(&mut state.pending);
            if batch.is_empty() {
                return;
            }
            if batch
                .values()
                .all(|waiters| waiters.iter().all(Waiter::is_closed))
            {
                tracing::debug!(
                    entity = %inner.entity,
                    "abandoning batch window, every requester is gone"
                );
                return;
            }
            let keys: Vec<String> = batch.keys().cloned().collect();
            // Dispatched keys stay visible until the fetch completes so a
            // later load joins it instead of opening a second one.
            for (key, waiters) in batch {
                state.in_flight.insert(key, waiters);
            }
            keys
        };
        tracing::debug!(entity = %inner.entity, size = keys.len(), "flushing batch window");
        match inner.fetch.fetch(keys.clone()).await {
            Ok(values) if values.len() == keys.len() => {
                let mut state = inner.state.lock();
                for (key, value) in keys.into_iter().zip(values) {
                    for waiter in state.in_flight.remove(&key).into_iter().flatten() {
                        // Requesters cancelled mid-window are simply gone.
                        let _ = waiter.send(Ok(value.clone()));
                    }
                    state.cached.insert(key, value);
                }
            }
            Ok(values) => {
                let failure = MockError::BatchResultShapeMismatch {
                    entity: inner.entity.clone(),
                    requested: keys.len(),
                    returned: values.len(),
                };
                tracing::error!(entity = %inner.entity, error = %failure, "batch fetch contract violation");
                Self::fail_keys(&inner, &keys, failure);
            }
            Err(error) => {
                let failure = MockError::BatchFetchFailed {
                    entity: inner.entity.clone(),
                    reason: error.to_string(),
                };
                tracing::error!(entity = %inner.entity, error = %failure, "batch fetch failed");
                Self::fail_keys(&inner, &keys, failure);
            }
        }
    }

    fn fail_keys(inner: &LoaderInner, keys: &[String], failure: MockError) {
        let mut state = inner.state.lock();
        for key in keys {
            for waiter in state.in_flight.remove(key).into_iter().flatten() {
                let _ = waiter.send(Err(failure.clone()));
            }
        }
    }
}

struct RegisteredFetch {
    window: Duration,
    fetch: Arc<dyn BatchFn>,
}

/// Startup registry of batch fetchers by entity name.
///
/// Read-only once the server is up; each request instantiates it into a
/// fresh [`LoaderSet`], which is where the per-request window and cache
/// live.
#[derive(Default)]
pub struct BatchMap {
    fetchers: HashMap<String, RegisteredFetch>,
}

impl BatchMap {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a batch fetch for `entity`, flushing `window` after the
    /// first key of each batch arrives.
    pub fn register(
        &mut self,
        entity: impl Into<String>,
        window: Duration,
        fetch: impl BatchFn + 'static,
    ) -> Result<(), MockError> {
        let entity = entity.into();
        if self.fetchers.contains_key(&entity) {
            return Err(MockError::DuplicateTypeRegistration { type_name: entity });
        }
        self.fetchers.insert(
            entity,
            RegisteredFetch {
                window,
                fetch: Arc::new(fetch),
            },
        );
        Ok(())
    }

    /// Fresh loaders for one request.
    pub fn for_request(&self) -> LoaderSet {
        LoaderSet {
            loaders: self
                .fetchers
                .iter()
                .map(|(entity, registered)| {
                    (
                        entity.clone(),
                        EntityLoader::new(
                            entity.clone(),
                            registered.window,
                            registered.fetch.clone(),
                        ),
                    )
                })
                .collect(),
        }
    }
}

/// The request-scoped set of entity loaders.
///
/// Created at request start, dropped with the request.
#[derive(Default)]
pub struct LoaderSet {
    loaders: HashMap<String, EntityLoader>,
}

impl LoaderSet {
    /// The loader for `entity`, if one was registered.
    pub fn entity(&self, entity: &str) -> Option<&EntityLoader> {
        self.loaders.get(entity)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    use super::*;

    struct Recording {
        calls: AtomicUsize,
        batches: Mutex<Vec<Vec<String>>>,
    }

    impl Recording {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                batches: Mutex::new(Vec::new()),
            })
        }
    }

    fn recording_loader(recording: &Arc<Recording>) -> EntityLoader {
        let recording = recording.clone();
        let fetch = move |keys: Vec<String>| {
            let recording = recording.clone();
            async move {
                recording.calls.fetch_add(1, Ordering::SeqCst);
                recording.batches.lock().push(keys.clone());
                Ok(keys.into_iter().map(Value::from).collect())
            }
        };
        EntityLoader::new("Product", DEFAULT_WINDOW, Arc::new(fetch))
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_loads_share_one_fetch() {
        let recording = Recording::new();
        let loader = recording_loader(&recording);
        let (a, b, a_again) = tokio::join!(loader.load("a"), loader.load("b"), loader.load("a"));
        assert_eq!(recording.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            *recording.batches.lock(),
            vec![vec!["a".to_string(), "b".to_string()]]
        );
        assert_eq!(a.unwrap(), Value::from("a"));
        assert_eq!(b.unwrap(), Value::from("b"));
        assert_eq!(a_again.unwrap(), Value::from("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn fulfilled_keys_are_cached_for_the_request() {
        let recording = Recording::new();
        let loader = recording_loader(&recording);
        loader.load("a").await.unwrap();
        loader.load("a").await.unwrap();
        assert_eq!(recording.calls.load(Ordering::SeqCst), 1);
        loader.load("b").await.unwrap();
        assert_eq!(recording.calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            *recording.batches.lock(),
            vec![vec!["a".to_string()], vec!["b".to_string()]]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn late_keys_join_the_next_window() {
        let recording = Recording::new();
        let loader = recording_loader(&recording);
        loader.load("a").await.unwrap();
        let (b, c) = tokio::join!(loader.load("b"), loader.load("c"));
        b.unwrap();
        c.unwrap();
        assert_eq!(recording.calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            *recording.batches.lock(),
            vec![
                vec!["a".to_string()],
                vec!["b".to_string(), "c".to_string()]
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn loads_arriving_mid_fetch_join_the_running_batch() {
        let recording = Recording::new();
        let slow_recording = recording.clone();
        let fetch = move |keys: Vec<String>| {
            let recording = slow_recording.clone();
            async move {
                recording.calls.fetch_add(1, Ordering::SeqCst);
                recording.batches.lock().push(keys.clone());
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok(keys.into_iter().map(Value::from).collect())
            }
        };
        let loader = EntityLoader::new("Product", DEFAULT_WINDOW, Arc::new(fetch));

        let first = tokio::spawn({
            let loader = loader.clone();
            async move { loader.load("a").await }
        });
        // Past the window, into the middle of the slow fetch.
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(recording.calls.load(Ordering::SeqCst), 1);

        let second = loader.load("a").await;
        let first = first.await.expect("first load ran");
        assert_eq!(recording.calls.load(Ordering::SeqCst), 1);
        assert_eq!(*recording.batches.lock(), vec![vec!["a".to_string()]]);
        assert_eq!(first.unwrap(), Value::from("a"));
        assert_eq!(second.unwrap(), Value::from("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_windows_skip_the_fetch() {
        let recording = Recording::new();
        let loader = recording_loader(&recording);
        let first = tokio::spawn({
            let loader = loader.clone();
            async move { loader.load("a").await }
        });
        let second = tokio::spawn({
            let loader = loader.clone();
            async move { loader.load("b").await }
        });
        // Both enqueue, then every requester leaves before the window
        // closes.
        tokio::task::yield_now().await;
        first.abort();
        second.abort();
        let _ = first.await;
        let _ = second.await;
        tokio::time::sleep(DEFAULT_WINDOW * 4).await;
        assert_eq!(recording.calls.load(Ordering::SeqCst), 0);
        assert!(recording.batches.lock().is_empty());

        // The loader itself stays usable afterwards.
        loader.load("a").await.unwrap();
        assert_eq!(recording.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_failure_reaches_every_requester() {
        let fetch = |_keys: Vec<String>| async move {
            Err::<Vec<Value>, BoxError>("backend down".into())
        };
        let loader = EntityLoader::new("Product", DEFAULT_WINDOW, Arc::new(fetch));
        let (a, b) = tokio::join!(loader.load("a"), loader.load("b"));
        let expected = MockError::BatchFetchFailed {
            entity: "Product".to_string(),
            reason: "backend down".to_string(),
        };
        assert_eq!(a.unwrap_err(), expected);
        assert_eq!(b.unwrap_err(), expected);
    }

    #[tokio::test(start_paused = true)]
    async fn shape_mismatch_is_fatal_for_the_window() {
        let fetch = |keys: Vec<String>| async move {
            let mut values: Vec<Value> = keys.into_iter().map(Value::from).collect();
            values.pop();
            Ok(values)
        };
        let loader = EntityLoader::new("Product", DEFAULT_WINDOW, Arc::new(fetch));
        let (a, b) = tokio::join!(loader.load("a"), loader.load("b"));
        let expected = MockError::BatchResultShapeMismatch {
            entity: "Product".to_string(),
            requested: 2,
            returned: 1,
        };
        assert_eq!(a.unwrap_err(), expected);
        assert_eq!(b.unwrap_err(), expected);
    }

    #[tokio::test(start_paused = true)]
    async fn loader_sets_are_independent_per_request() {
        let mut batchers = BatchMap::new();
        let fetch =
            |keys: Vec<String>| async move { Ok(keys.into_iter().map(Value::from).collect()) };
        batchers
            .register("Product", DEFAULT_WINDOW, fetch)
            .unwrap();

        let first = batchers.for_request();
        let second = batchers.for_request();
        first
            .entity("Product")
            .unwrap()
            .load("a")
            .await
            .unwrap();
        // A fresh request owns a fresh cache and window.
        second
            .entity("Product")
            .unwrap()
            .load("a")
            .await
            .unwrap();
        assert!(first.entity("Book").is_none());
    }

    #[test]
    fn duplicate_batcher_registration_is_rejected() {
        let mut batchers = BatchMap::new();
        let fetch =
            |keys: Vec<String>| async move { Ok(keys.into_iter().map(Value::from).collect()) };
        batchers
            .register("Product", DEFAULT_WINDOW, fetch)
            .unwrap();
        let err = batchers
            .register("Product", DEFAULT_WINDOW, fetch)
            .unwrap_err();
        assert_eq!(
            err,
            MockError::DuplicateTypeRegistration {
                type_name: "Product".to_string(),
            }
        );
    }
}

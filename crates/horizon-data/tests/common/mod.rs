//! Shared fixtures for the provider pipeline tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use futures_util::future::{BoxFuture, FutureExt};
use futures_util::stream::{self, StreamExt};
use horizon_data::provider::{fetch_by_keys_by_iteration, fetch_by_offset_by_iteration};
use horizon_data::{
    Capability, CapabilityName, DataError, DataProvider, DataProviderEvent, DataResult, EventTarget,
    EventTargetMixin, FetchByKeysParameters, FetchByKeysResults, FetchByOffsetParameters,
    FetchByOffsetResults, FetchListParameters, FetchListResult, FetchListStream, Item,
    MutationEventDetail, DEFAULT_FETCH_SIZE,
};
use parking_lot::Mutex;
use serde_json::{json, Value};

/// Install a test log writer once per test binary.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// A provider replaying scripted pages, with no capabilities and call counters.
pub struct ScriptedProvider {
    pages: Mutex<Vec<Vec<Item<i64, Value>>>>,
    failure: Mutex<Option<String>>,
    stalled: AtomicBool,
    events: EventTarget<DataProviderEvent<i64, Value>>,
    fetch_first_calls: AtomicUsize,
    lookup_calls: AtomicUsize,
}

impl ScriptedProvider {
    /// Pages of rows `{ "id": key }`.
    pub fn new(pages: Vec<Vec<i64>>) -> Self {
        Self::from_rows(
            pages
                .into_iter()
                .map(|keys| keys.into_iter().map(row).collect())
                .collect(),
        )
    }

    /// Pages of arbitrary rows.
    pub fn from_rows(pages: Vec<Vec<Item<i64, Value>>>) -> Self {
        Self {
            pages: Mutex::new(pages),
            failure: Mutex::new(None),
            stalled: AtomicBool::new(false),
            events: EventTarget::new(),
            fetch_first_calls: AtomicUsize::new(0),
            lookup_calls: AtomicUsize::new(0),
        }
    }

    /// Make every iteration fail after its first page.
    pub fn fail_after_first_page(&self, message: &str) {
        *self.failure.lock() = Some(message.to_string());
    }

    /// Leave every iteration pending after its scripted pages.
    pub fn stall_after_pages(&self) {
        self.stalled.store(true, Ordering::SeqCst);
    }

    pub fn dispatch(&self, detail: MutationEventDetail<i64, Value>) -> bool {
        self.dispatch_event(&DataProviderEvent::Mutate(detail))
    }

    pub fn refresh(&self) -> bool {
        self.dispatch_event(&DataProviderEvent::Refresh)
    }

    pub fn fetch_first_calls(&self) -> usize {
        self.fetch_first_calls.load(Ordering::SeqCst)
    }

    /// Calls of `fetch_by_keys`, `fetch_by_offset` and `contains_keys`.
    pub fn lookup_calls(&self) -> usize {
        self.lookup_calls.load(Ordering::SeqCst)
    }

    fn iterate(&self, params: FetchListParameters) -> FetchListStream<i64, Value> {
        let failure = self.failure.lock().clone();
        let mut pages: Vec<DataResult<FetchListResult<i64, Value>>> = self
            .pages
            .lock()
            .iter()
            .map(|items| Ok(FetchListResult::from_items(items.clone(), params.clone())))
            .collect();
        if let Some(message) = failure {
            pages.truncate(1);
            pages.push(Err(DataError::fetch(message)));
        }
        if self.stalled.load(Ordering::SeqCst) {
            return stream::iter(pages).chain(stream::pending()).boxed();
        }
        stream::iter(pages).boxed()
    }
}

/// The row with key `key`.
pub fn row(key: i64) -> Item<i64, Value> {
    Item::new(key, json!({ "id": key }))
}

impl EventTargetMixin<DataProviderEvent<i64, Value>> for ScriptedProvider {
    fn event_target(&self) -> &EventTarget<DataProviderEvent<i64, Value>> {
        &self.events
    }
}

impl DataProvider<i64, Value> for ScriptedProvider {
    fn fetch_first(&self, params: FetchListParameters) -> FetchListStream<i64, Value> {
        self.fetch_first_calls.fetch_add(1, Ordering::SeqCst);
        self.iterate(params)
    }

    fn get_capability(&self, _name: CapabilityName) -> Option<Capability> {
        None
    }

    fn fetch_by_keys(
        &self,
        params: FetchByKeysParameters<i64>,
    ) -> BoxFuture<'static, DataResult<FetchByKeysResults<i64, Value>>> {
        self.lookup_calls.fetch_add(1, Ordering::SeqCst);
        fetch_by_keys_by_iteration(self.iterate(FetchListParameters::new()), params).boxed()
    }

    fn fetch_by_offset(
        &self,
        params: FetchByOffsetParameters,
    ) -> BoxFuture<'static, DataResult<FetchByOffsetResults<i64, Value>>> {
        self.lookup_calls.fetch_add(1, Ordering::SeqCst);
        let stream = self.iterate(params.list_parameters());
        fetch_by_offset_by_iteration(stream, params, DEFAULT_FETCH_SIZE).boxed()
    }
}

/// Records every event dispatched by a provider.
pub struct EventLog {
    events: std::sync::Arc<Mutex<Vec<DataProviderEvent<i64, Value>>>>,
}

impl EventLog {
    pub fn attach(provider: &dyn DataProvider<i64, Value>) -> Self {
        let events = std::sync::Arc::new(Mutex::new(Vec::new()));
        for event_type in [horizon_data::MUTATE, horizon_data::REFRESH] {
            let events = events.clone();
            provider.add_event_listener(
                event_type,
                horizon_data::listener(move |event: &DataProviderEvent<i64, Value>| {
                    events.lock().push(event.clone())
                }),
            );
        }
        Self { events }
    }

    pub fn take(&self) -> Vec<DataProviderEvent<i64, Value>> {
        std::mem::take(&mut *self.events.lock())
    }
}

/// Keys of an operation, in order.
pub fn op_keys(operation: Option<&horizon_data::MutationOperationDetail<i64, Value>>) -> Vec<i64> {
    operation.map(|operation| operation.keys.iter().copied().collect()).unwrap_or_default()
}

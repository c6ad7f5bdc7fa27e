/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

#![deny(missing_docs)]

//! Coalescing of requests for a URL whose first transfer has been suspended.
//!
//! Every URL has at most one tracked transfer. While that transfer is suspended,
//! further requests for the same URL queue behind it and issue no traffic of their
//! own. Resuming the transfer releases them all with its result. If nobody
//! resumes it, a suspended-writer timer forces it to continue after a fixed
//! delay, so queued callers are never held back indefinitely.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use std::time::Duration;

use coalesce_config::prefs;
use log::{debug, trace, warn};
use net_traits::{FetchResult, NetworkError, NetworkEvent, RequestId};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::{oneshot, watch};
use tokio::time::Instant;
use url::Url;

use crate::observer::ObserverService;
use crate::suspend_timer::SuspendTimer;
use crate::transport::Transport;

/// The key used to match requests for the same resource.
///
/// Keys compare the WHATWG serialization of the URL without its fragment. The URL
/// parser already normalizes the scheme and host; query strings and paths are
/// compared exactly as written.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct CacheKey {
    url: Url,
}

impl CacheKey {
    /// Create a key for `url`.
    pub fn new(url: &Url) -> CacheKey {
        let mut url = url.clone();
        url.set_fragment(None);
        CacheKey { url }
    }

    /// Retrieve the URL associated with this key
    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(&self.url, f)
    }
}

/// Tunables for a [`RequestCoalescer`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CoalescerConfig {
    /// How long a suspended request may hold back its waiters before it is
    /// forced to resume.
    pub suspended_writer_delay: Duration,
    /// Whether requests for a suspended URL wait for it. When false they are sent
    /// independently.
    pub coalesce_suspended_requests: bool,
}

impl CoalescerConfig {
    /// A configuration with the given suspended-writer delay and coalescing enabled.
    pub fn new(suspended_writer_delay: Duration) -> CoalescerConfig {
        CoalescerConfig {
            suspended_writer_delay,
            coalesce_suspended_requests: true,
        }
    }

    /// Read the configuration from the current preferences.
    pub fn from_prefs() -> CoalescerConfig {
        let prefs = prefs::get();
        let delay_ms = prefs.network_cache_suspended_writer_delay_ms.max(0) as u64;
        CoalescerConfig {
            suspended_writer_delay: Duration::from_millis(delay_ms),
            coalesce_suspended_requests: prefs.network_http_coalesce_suspended_requests,
        }
    }
}

impl Default for CoalescerConfig {
    fn default() -> Self {
        Self::from_prefs()
    }
}

/// Counters describing what a [`RequestCoalescer`] has done so far.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct CoalescerStats {
    /// Calls to [`RequestCoalescer::issue_request`].
    pub requests: u64,
    /// Transfers handed to the transport.
    pub transfers: u64,
    /// Requests that waited on a suspended transfer instead of starting their own.
    pub coalesced: u64,
    /// Suspended transfers that were forced to resume by their timer.
    pub timer_fallbacks: u64,
}

enum RequestState {
    Active,
    Suspended { reason: String, since: Instant },
}

struct CoalescedWaiter {
    id: RequestId,
    sender: oneshot::Sender<FetchResult>,
    enqueued_at: Instant,
}

/// The tracked transfer for one [`CacheKey`].
struct PendingRequest {
    id: RequestId,
    issued_at: Instant,
    state: RequestState,
    waiters: Vec<CoalescedWaiter>,
    suspend_timer: Option<SuspendTimer>,
    /// Mirrors whether the request is suspended, for the transfer task to wait on.
    gate: watch::Sender<bool>,
}

impl PendingRequest {
    fn is_suspended(&self) -> bool {
        matches!(self.state, RequestState::Suspended { .. })
    }

    fn cancel_suspend_timer(&mut self) {
        if let Some(mut timer) = self.suspend_timer.take() {
            timer.cancel();
        }
    }

    fn set_active(&mut self) {
        self.state = RequestState::Active;
        self.gate.send_replace(false);
    }
}

#[derive(Default)]
struct CoalescerState {
    pending: FxHashMap<CacheKey, PendingRequest>,
    stats: CoalescerStats,
    next_timer_serial: u64,
}

struct CoalescerInner {
    config: CoalescerConfig,
    transport: Arc<dyn Transport>,
    observers: Arc<ObserverService>,
    state: Mutex<CoalescerState>,
}

impl CoalescerInner {
    /// Remove the entry for `key` if it still belongs to request `id`.
    fn remove_pending(&self, key: &CacheKey, id: RequestId) -> Option<PendingRequest> {
        let mut state = self.state.lock();
        match state.pending.remove(key) {
            Some(mut pending) if pending.id == id => {
                pending.cancel_suspend_timer();
                Some(pending)
            },
            Some(other) => {
                // Entries are only removed by their own transfer; keep the stranger.
                state.pending.insert(key.clone(), other);
                None
            },
            None => None,
        }
    }

    fn suspend_timer_fired(&self, key: &CacheKey, id: RequestId, serial: u64) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let Some(pending) = state.pending.get_mut(key) else {
            trace!("Suspend timer for {} fired after the request resolved", key);
            return;
        };
        let is_current_timer = pending
            .suspend_timer
            .as_ref()
            .is_some_and(|timer| timer.serial() == serial);
        if pending.id != id || !is_current_timer {
            trace!("Ignoring stale suspend timer for {}", key);
            return;
        }
        if let Some(mut timer) = pending.suspend_timer.take() {
            timer.disarm();
        }

        if let RequestState::Suspended { reason, since } = &pending.state {
            warn!(
                "Request {} to {} was suspended ({}) for {:?}; forcing it to resume",
                pending.id,
                key,
                reason,
                since.elapsed()
            );
            pending.set_active();
            state.stats.timer_fallbacks += 1;
        }
    }
}

/// A handle to a request issued through a [`RequestCoalescer`]. It resolves to the
/// result of the transfer it was attached to.
pub struct RequestHandle {
    id: RequestId,
    coalesced: bool,
    receiver: oneshot::Receiver<FetchResult>,
}

impl RequestHandle {
    /// The id of this request.
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// True if this request is waiting on another request's transfer.
    pub fn is_coalesced(&self) -> bool {
        self.coalesced
    }
}

impl Future for RequestHandle {
    type Output = FetchResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<FetchResult> {
        // The sender only disappears if the transfer task was torn down with the runtime.
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|result| result.unwrap_or_else(|_| Err(NetworkError::LoadCancelled)))
    }
}

/// Deduplicates requests for a URL while its tracked transfer is suspended.
///
/// Cloning is cheap and every clone shares the same state. [`issue_request`] and
/// [`suspend`] spawn tasks and must run inside a tokio runtime.
///
/// [`issue_request`]: RequestCoalescer::issue_request
/// [`suspend`]: RequestCoalescer::suspend
#[derive(Clone)]
pub struct RequestCoalescer {
    inner: Arc<CoalescerInner>,
}

impl RequestCoalescer {
    /// Create a coalescer that sends requests through `transport` and reports
    /// transfers to `observers`.
    pub fn new(
        config: CoalescerConfig,
        transport: Arc<dyn Transport>,
        observers: Arc<ObserverService>,
    ) -> RequestCoalescer {
        RequestCoalescer {
            inner: Arc::new(CoalescerInner {
                config,
                transport,
                observers,
                state: Mutex::new(CoalescerState::default()),
            }),
        }
    }

    /// The configuration this coalescer was created with.
    pub fn config(&self) -> &CoalescerConfig {
        &self.inner.config
    }

    /// The observers notified about this coalescer's transfers.
    pub fn observers(&self) -> &ObserverService {
        &self.inner.observers
    }

    /// Request `url`.
    ///
    /// If no transfer is tracked for the URL, a new one is started and tracked. If
    /// the tracked transfer is suspended, the request waits for it and resolves
    /// with its result. Otherwise an independent, untracked transfer is started.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(url = %url)))]
    pub fn issue_request(&self, url: &Url) -> RequestHandle {
        let key = CacheKey::new(url);
        let id = RequestId::default();
        let (sender, receiver) = oneshot::channel();

        let gate = {
            let mut guard = self.inner.state.lock();
            let state = &mut *guard;
            state.stats.requests += 1;

            let gate = match state.pending.get_mut(&key) {
                Some(pending)
                    if pending.is_suspended() && self.inner.config.coalesce_suspended_requests =>
                {
                    debug!(
                        "Request {} to {} waits on suspended request {}",
                        id, key, pending.id
                    );
                    pending.waiters.push(CoalescedWaiter {
                        id,
                        sender,
                        enqueued_at: Instant::now(),
                    });
                    state.stats.coalesced += 1;
                    return RequestHandle {
                        id,
                        coalesced: true,
                        receiver,
                    };
                },
                Some(pending) => {
                    debug!(
                        "Request {} to {} runs alongside request {}",
                        id, key, pending.id
                    );
                    None
                },
                None => {
                    let (gate, gate_receiver) = watch::channel(false);
                    state.pending.insert(
                        key.clone(),
                        PendingRequest {
                            id,
                            issued_at: Instant::now(),
                            state: RequestState::Active,
                            waiters: Vec::new(),
                            suspend_timer: None,
                            gate,
                        },
                    );
                    Some(gate_receiver)
                },
            };
            state.stats.transfers += 1;
            gate
        };

        self.inner.observers.notify(
            &NetworkEvent::modify_request(id, key.url().clone()),
            self,
        );

        tokio::spawn(run_transfer(self.clone(), id, key, gate, sender));

        RequestHandle {
            id,
            coalesced: false,
            receiver,
        }
    }

    /// Suspend the tracked transfer for `url`, holding back its completion and
    /// every request that arrives for the URL meanwhile. Does nothing if there is
    /// no tracked transfer or it is already suspended.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(url = %url)))]
    pub fn suspend(&self, url: &Url, reason: &str) {
        let key = CacheKey::new(url);
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;
        let Some(pending) = state.pending.get_mut(&key) else {
            trace!("Not suspending {}: no request in flight", key);
            return;
        };
        if pending.is_suspended() {
            trace!("Request {} to {} is already suspended", pending.id, key);
            return;
        }

        pending.state = RequestState::Suspended {
            reason: reason.to_owned(),
            since: Instant::now(),
        };
        pending.gate.send_replace(true);

        let serial = state.next_timer_serial;
        state.next_timer_serial += 1;
        let inner: Weak<CoalescerInner> = Arc::downgrade(&self.inner);
        let timer_key = key.clone();
        let id = pending.id;
        pending.cancel_suspend_timer();
        let timer = SuspendTimer::arm(
            serial,
            self.inner.config.suspended_writer_delay,
            move || {
                if let Some(inner) = inner.upgrade() {
                    inner.suspend_timer_fired(&timer_key, id, serial);
                }
            },
        );
        debug!(
            "Suspending request {} to {} ({}), forcing a resume in {:?}",
            id,
            key,
            reason,
            timer.deadline().saturating_duration_since(Instant::now())
        );
        pending.suspend_timer = Some(timer);
    }

    /// Resume the tracked transfer for `url` and cancel its suspend timer. Does
    /// nothing if there is no tracked transfer.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(url = %url)))]
    pub fn resume(&self, url: &Url) {
        let key = CacheKey::new(url);
        let mut state = self.inner.state.lock();
        let Some(pending) = state.pending.get_mut(&key) else {
            trace!("Not resuming {}: no request in flight", key);
            return;
        };
        pending.cancel_suspend_timer();
        if !pending.is_suspended() {
            trace!("Request {} to {} is not suspended", pending.id, key);
            return;
        }
        debug!(
            "Resuming request {} to {} with {} waiter(s)",
            pending.id,
            key,
            pending.waiters.len()
        );
        pending.set_active();
    }

    /// Whether the tracked transfer for `url` is currently suspended.
    pub fn is_suspended(&self, url: &Url) -> bool {
        self.inner
            .state
            .lock()
            .pending
            .get(&CacheKey::new(url))
            .is_some_and(PendingRequest::is_suspended)
    }

    /// The number of requests waiting on the tracked transfer for `url`.
    pub fn waiter_count(&self, url: &Url) -> usize {
        self.inner
            .state
            .lock()
            .pending
            .get(&CacheKey::new(url))
            .map_or(0, |pending| pending.waiters.len())
    }

    /// The number of tracked transfers that have not resolved yet.
    pub fn pending_request_count(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    /// A snapshot of this coalescer's counters.
    pub fn stats(&self) -> CoalescerStats {
        self.inner.state.lock().stats
    }
}

async fn wait_until_resumed(gate: &mut watch::Receiver<bool>) {
    // An error means the pending entry is gone, so nothing can hold us back.
    let _ = gate.wait_for(|suspended| !*suspended).await;
}

/// Owns the tracked entry of a running transfer. If the transfer task dies before
/// releasing it, the entry is removed and its waiters are cancelled.
struct PendingGuard {
    inner: Arc<CoalescerInner>,
    key: CacheKey,
    id: RequestId,
    released: bool,
}

impl PendingGuard {
    fn new(inner: Arc<CoalescerInner>, key: CacheKey, id: RequestId) -> PendingGuard {
        PendingGuard {
            inner,
            key,
            id,
            released: false,
        }
    }

    /// Remove the entry and hand back its waiters in arrival order.
    fn release(mut self) -> Vec<CoalescedWaiter> {
        self.released = true;
        match self.inner.remove_pending(&self.key, self.id) {
            Some(pending) => {
                debug!(
                    "Request {} to {} resolved after {:?}",
                    self.id,
                    self.key,
                    pending.issued_at.elapsed()
                );
                pending.waiters
            },
            None => Vec::new(),
        }
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let Some(pending) = self.inner.remove_pending(&self.key, self.id) else {
            return;
        };
        warn!(
            "Request {} to {} was abandoned; cancelling {} waiter(s)",
            self.id,
            self.key,
            pending.waiters.len()
        );
        for waiter in pending.waiters {
            let _ = waiter.sender.send(Err(NetworkError::LoadCancelled));
        }
    }
}

async fn fetch(coalescer: &RequestCoalescer, id: RequestId, key: &CacheKey) -> FetchResult {
    let result = coalescer.inner.transport.send(key.url()).await;
    match &result {
        Ok(response) => coalescer.inner.observers.notify(
            &NetworkEvent::examine_response(id, key.url().clone(), response.status),
            coalescer,
        ),
        Err(error) => warn!("Request {} to {} failed: {}", id, key, error),
    }
    result
}

async fn run_transfer(
    coalescer: RequestCoalescer,
    id: RequestId,
    key: CacheKey,
    gate: Option<watch::Receiver<bool>>,
    requester: oneshot::Sender<FetchResult>,
) {
    let Some(mut gate) = gate else {
        let result = fetch(&coalescer, id, &key).await;
        let _ = requester.send(result);
        return;
    };

    let guard = PendingGuard::new(coalescer.inner.clone(), key.clone(), id);
    wait_until_resumed(&mut gate).await;
    let result = fetch(&coalescer, id, &key).await;
    wait_until_resumed(&mut gate).await;
    let waiters = guard.release();

    let _ = requester.send(result.clone());
    for waiter in waiters {
        trace!(
            "Releasing request {} to {} after {:?}",
            waiter.id,
            key,
            waiter.enqueued_at.elapsed()
        );
        let _ = waiter.sender.send(result.clone());
    }
}

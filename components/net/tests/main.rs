/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

mod observer;

use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::future::BoxFuture;
use net::{CoalescerConfig, ObserverService, RequestCoalescer, Transport};
use net_traits::{FetchResult, NetworkError, NetworkEvent, NetworkEventTopic, Response};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use url::Url;

pub const MESSAGE: &[u8] = b"Hello World!";

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn blocked_url() -> Url {
    Url::parse("https://example.com/?test-blocked").unwrap()
}

/// A transport that answers every request after a fixed latency and records what
/// it was asked for.
pub struct MockTransport {
    latency: Duration,
    failure: Option<NetworkError>,
    sends: AtomicUsize,
    sent_urls: Mutex<Vec<Url>>,
}

impl MockTransport {
    pub fn new(latency: Duration) -> Arc<MockTransport> {
        Arc::new(MockTransport {
            latency,
            failure: None,
            sends: AtomicUsize::new(0),
            sent_urls: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(latency: Duration, error: NetworkError) -> Arc<MockTransport> {
        Arc::new(MockTransport {
            latency,
            failure: Some(error),
            sends: AtomicUsize::new(0),
            sent_urls: Mutex::new(Vec::new()),
        })
    }

    pub fn send_count(&self) -> usize {
        self.sends.load(Ordering::SeqCst)
    }

    pub fn sent_urls(&self) -> Vec<Url> {
        self.sent_urls.lock().clone()
    }
}

impl Transport for MockTransport {
    fn send(&self, url: &Url) -> BoxFuture<'static, FetchResult> {
        self.sends.fetch_add(1, Ordering::SeqCst);
        self.sent_urls.lock().push(url.clone());
        let latency = self.latency;
        let failure = self.failure.clone();
        let url = url.clone();
        Box::pin(async move {
            tokio::time::sleep(latency).await;
            match failure {
                Some(error) => Err(error),
                None => Ok(Response::with_body(url, MESSAGE)),
            }
        })
    }
}

pub fn new_coalescer(
    config: CoalescerConfig,
    transport: Arc<dyn Transport>,
) -> (RequestCoalescer, Arc<ObserverService>) {
    init_logging();
    let observers = Arc::new(ObserverService::new());
    let coalescer = RequestCoalescer::new(config, transport, observers.clone());
    (coalescer, observers)
}

/// Suspend the next transfer to `url` once its response headers arrive, the way
/// an extension blocking a response would. The returned receiver fires once the
/// transfer has been suspended.
pub fn suspend_on_examine_response(
    observers: &ObserverService,
    url: &Url,
) -> oneshot::Receiver<()> {
    let (sender, receiver) = oneshot::channel();
    let sender = Mutex::new(Some(sender));
    let target = url.clone();
    observers.add_observer(
        NetworkEventTopic::ExamineResponse,
        move |event: &NetworkEvent, coalescer: &RequestCoalescer| -> ControlFlow<()> {
            if event.url != target {
                return ControlFlow::Continue(());
            }
            coalescer.suspend(&event.url, "test-blocked-suspend");
            if let Some(sender) = sender.lock().take() {
                let _ = sender.send(());
            }
            ControlFlow::Break(())
        },
    );
    receiver
}

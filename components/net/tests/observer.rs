/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use http::StatusCode;
use net::{CoalescerConfig, RequestCoalescer};
use net_traits::{NetworkEvent, NetworkEventTopic, RequestId};
use parking_lot::Mutex;

use crate::{MockTransport, blocked_url, new_coalescer};

type Seen = Arc<Mutex<Vec<(NetworkEventTopic, RequestId, Option<StatusCode>)>>>;

fn record(seen: Seen) -> impl Fn(&NetworkEvent, &RequestCoalescer) -> ControlFlow<()> {
    move |event: &NetworkEvent, _: &RequestCoalescer| -> ControlFlow<()> {
        seen.lock().push((event.topic, event.request_id, event.status));
        ControlFlow::Continue(())
    }
}

#[tokio::test(start_paused = true)]
async fn test_observers_see_both_topics_in_order() {
    let transport = MockTransport::new(Duration::from_millis(10));
    let (coalescer, observers) =
        new_coalescer(CoalescerConfig::new(Duration::from_millis(300)), transport);
    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    observers.add_observer(NetworkEventTopic::ModifyRequest, record(seen.clone()));
    observers.add_observer(NetworkEventTopic::ExamineResponse, record(seen.clone()));

    let handle = coalescer.issue_request(&blocked_url());
    let id = handle.id();
    handle.await.unwrap();

    assert_eq!(
        *seen.lock(),
        vec![
            (NetworkEventTopic::ModifyRequest, id, None),
            (NetworkEventTopic::ExamineResponse, id, Some(StatusCode::OK)),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_coalesced_requests_are_not_observed() {
    let transport = MockTransport::new(Duration::from_millis(10));
    let (coalescer, observers) =
        new_coalescer(CoalescerConfig::new(Duration::from_millis(300)), transport);
    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    observers.add_observer(NetworkEventTopic::ModifyRequest, record(seen.clone()));

    let url = blocked_url();
    let first = coalescer.issue_request(&url);
    coalescer.suspend(&url, "test-blocked-suspend");
    let second = coalescer.issue_request(&url);
    coalescer.resume(&url);
    first.await.unwrap();
    second.await.unwrap();

    assert_eq!(seen.lock().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_observer_can_suspend_before_the_transfer_starts() {
    let transport = MockTransport::new(Duration::from_millis(10));
    let (coalescer, observers) =
        new_coalescer(CoalescerConfig::new(Duration::from_millis(300)), transport.clone());
    observers.add_observer(
        NetworkEventTopic::ModifyRequest,
        |event: &NetworkEvent, coalescer: &RequestCoalescer| -> ControlFlow<()> {
            coalescer.suspend(&event.url, "blocked-before-start");
            ControlFlow::Break(())
        },
    );

    let url = blocked_url();
    let first = coalescer.issue_request(&url);
    assert!(coalescer.is_suspended(&url));
    assert!(!observers.has_observers(NetworkEventTopic::ModifyRequest));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(transport.send_count(), 0);

    coalescer.resume(&url);
    first.await.unwrap();
    assert_eq!(transport.send_count(), 1);
}

#[test]
fn test_remove_observer() {
    let observers = net::ObserverService::new();
    let id = observers.add_observer(
        NetworkEventTopic::ExamineResponse,
        |_: &NetworkEvent, _: &RequestCoalescer| -> ControlFlow<()> { ControlFlow::Continue(()) },
    );
    assert!(observers.has_observers(NetworkEventTopic::ExamineResponse));
    assert!(!observers.has_observers(NetworkEventTopic::ModifyRequest));

    assert!(observers.remove_observer(id));
    assert!(!observers.remove_observer(id));
    assert!(!observers.has_observers(NetworkEventTopic::ExamineResponse));
}

/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! An explicit subscription point for parties that want to watch, and possibly
//! suspend, transfers as they happen. It is handed to the coalescer at
//! construction rather than living in a global.

use std::ops::ControlFlow;
use std::sync::Arc;

use log::trace;
use net_traits::{NetworkEvent, NetworkEventTopic};
use parking_lot::Mutex;

use crate::coalescer::RequestCoalescer;

pub trait NetworkObserver: Send + Sync {
    /// Called for every event on the topic this observer was registered for.
    /// Returning `ControlFlow::Break` unregisters the observer.
    fn observe(&self, event: &NetworkEvent, coalescer: &RequestCoalescer) -> ControlFlow<()>;
}

impl<F> NetworkObserver for F
where
    F: Fn(&NetworkEvent, &RequestCoalescer) -> ControlFlow<()> + Send + Sync,
{
    fn observe(&self, event: &NetworkEvent, coalescer: &RequestCoalescer) -> ControlFlow<()> {
        self(event, coalescer)
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct ObserverId(u64);

struct Registration {
    id: ObserverId,
    topic: NetworkEventTopic,
    observer: Arc<dyn NetworkObserver>,
}

#[derive(Default)]
struct Registrations {
    next_id: u64,
    entries: Vec<Registration>,
}

#[derive(Default)]
pub struct ObserverService {
    registrations: Mutex<Registrations>,
}

impl ObserverService {
    pub fn new() -> ObserverService {
        ObserverService::default()
    }

    pub fn add_observer<O>(&self, topic: NetworkEventTopic, observer: O) -> ObserverId
    where
        O: NetworkObserver + 'static,
    {
        let mut registrations = self.registrations.lock();
        let id = ObserverId(registrations.next_id);
        registrations.next_id += 1;
        registrations.entries.push(Registration {
            id,
            topic,
            observer: Arc::new(observer),
        });
        id
    }

    /// Returns false if no observer with this id was registered.
    pub fn remove_observer(&self, id: ObserverId) -> bool {
        let mut registrations = self.registrations.lock();
        let before = registrations.entries.len();
        registrations.entries.retain(|registration| registration.id != id);
        registrations.entries.len() != before
    }

    pub fn has_observers(&self, topic: NetworkEventTopic) -> bool {
        self.registrations
            .lock()
            .entries
            .iter()
            .any(|registration| registration.topic == topic)
    }

    /// Observers run on a snapshot of the registrations with no lock held, so they
    /// may register, unregister, suspend or resume from inside `observe`.
    pub(crate) fn notify(&self, event: &NetworkEvent, coalescer: &RequestCoalescer) {
        let interested: Vec<(ObserverId, Arc<dyn NetworkObserver>)> = self
            .registrations
            .lock()
            .entries
            .iter()
            .filter(|registration| registration.topic == event.topic)
            .map(|registration| (registration.id, registration.observer.clone()))
            .collect();

        for (id, observer) in interested {
            if observer.observe(event, coalescer).is_break() {
                trace!("Observer {:?} unregistered itself from {:?}", id, event.topic);
                self.remove_observer(id);
            }
        }
    }
}

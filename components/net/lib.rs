/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

#![deny(unsafe_code)]

pub mod coalescer;
pub mod connector;
pub mod http_loader;
pub mod observer;
mod suspend_timer;
pub mod transport;

pub use crate::coalescer::{
    CacheKey, CoalescerConfig, CoalescerStats, RequestCoalescer, RequestHandle,
};
pub use crate::observer::{NetworkObserver, ObserverId, ObserverService};
pub use crate::transport::Transport;

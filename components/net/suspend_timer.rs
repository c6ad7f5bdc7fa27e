/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};

/// A one-shot timer armed when a request is suspended. Dropping the timer
/// cancels it.
pub(crate) struct SuspendTimer {
    serial: u64,
    deadline: Instant,
    handle: Option<JoinHandle<()>>,
}

impl SuspendTimer {
    /// Run `on_fire` once `delay` has elapsed, unless the timer is cancelled first.
    pub(crate) fn arm<F>(serial: u64, delay: Duration, on_fire: F) -> SuspendTimer
    where
        F: FnOnce() + Send + 'static,
    {
        let deadline = Instant::now() + delay;
        let handle = tokio::spawn(async move {
            sleep_until(deadline).await;
            on_fire();
        });
        SuspendTimer {
            serial,
            deadline,
            handle: Some(handle),
        }
    }

    pub(crate) fn serial(&self) -> u64 {
        self.serial
    }

    pub(crate) fn deadline(&self) -> Instant {
        self.deadline
    }

    pub(crate) fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    /// Forget the task without aborting it; used from inside the firing callback.
    pub(crate) fn disarm(&mut self) {
        self.handle = None;
    }
}

impl Drop for SuspendTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use futures::future::BoxFuture;
use net_traits::FetchResult;
use url::Url;

/// The capability the coalescer uses to put a request on the wire. The coalescer
/// never performs networking itself.
pub trait Transport: Send + Sync {
    /// Start a transfer for `url` and return a future that produces the complete
    /// response, or the error that ended the transfer. Implementations must not
    /// retry on their own.
    fn send(&self, url: &Url) -> BoxFuture<'static, FetchResult>;
}

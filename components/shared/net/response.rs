/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! The response produced by a completed transfer.

use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use url::Url;

/// A fully received response. The body is reference counted so that one response
/// can be handed to every caller that waited on the same transfer.
#[derive(Clone, Debug)]
pub struct Response {
    /// The URL the response was fetched from.
    pub url: Url,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Response {
    pub fn new(url: Url) -> Response {
        Response {
            url,
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_body(url: Url, body: impl Into<Bytes>) -> Response {
        Response {
            body: body.into(),
            ..Response::new(url)
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

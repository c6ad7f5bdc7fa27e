/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use bytes::Bytes;
use http_body_util::Empty;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector as HyperHttpConnector;
use hyper_util::rt::TokioExecutor;

pub type Connector = HttpsConnector<HyperHttpConnector>;
pub type HttpClient = Client<Connector, Empty<Bytes>>;

fn create_http_connector() -> HyperHttpConnector {
    let mut inner = HyperHttpConnector::new();
    // The TLS layer decides which schemes it accepts.
    inner.enforce_http(false);
    inner.set_happy_eyeballs_timeout(None);
    inner
}

pub fn create_http_client() -> HttpClient {
    let connector = HttpsConnectorBuilder::new()
        .with_webpki_roots()
        .https_or_http()
        .enable_http1()
        .enable_http2()
        .wrap_connector(create_http_connector());

    Client::builder(TokioExecutor::new())
        .http1_title_case_headers(true)
        .build(connector)
}

/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use coalesce_config::pref;
use futures::future::BoxFuture;
use http::header::{self, HeaderValue};
use http::{Method, Request as HyperRequest, Uri};
use http_body_util::{BodyExt, Empty};
use log::{debug, warn};
use net_traits::{FetchResult, NetworkError, Response};
use url::Url;

use crate::connector::{HttpClient, create_http_client};
use crate::transport::Transport;

/// A [`Transport`] that performs plain `GET` requests over HTTP/1.1 or HTTP/2,
/// with TLS for `https` URLs.
#[derive(Clone)]
pub struct HttpTransport {
    client: HttpClient,
    user_agent: HeaderValue,
}

impl HttpTransport {
    /// Create a transport that identifies itself with the `user_agent` preference.
    pub fn new() -> HttpTransport {
        Self::with_user_agent(&pref!(user_agent))
    }

    pub fn with_user_agent(user_agent: &str) -> HttpTransport {
        let user_agent = HeaderValue::from_str(user_agent).unwrap_or_else(|_| {
            warn!("Ignoring invalid user agent {:?}", user_agent);
            HeaderValue::from_static("Mozilla/5.0")
        });
        HttpTransport {
            client: create_http_client(),
            user_agent,
        }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for HttpTransport {
    fn send(&self, url: &Url) -> BoxFuture<'static, FetchResult> {
        let client = self.client.clone();
        let user_agent = self.user_agent.clone();
        let url = url.clone();
        Box::pin(async move {
            if !matches!(url.scheme(), "http" | "https") {
                return Err(NetworkError::Internal(format!(
                    "Unsupported scheme: {}",
                    url.scheme()
                )));
            }

            let uri: Uri = url
                .as_str()
                .parse()
                .map_err(|error| NetworkError::Internal(format!("Invalid URL {url}: {error}")))?;
            let request = HyperRequest::builder()
                .method(Method::GET)
                .uri(uri)
                .header(header::USER_AGENT, user_agent)
                .body(Empty::new())
                .map_err(|error| NetworkError::from_http_error(&error))?;

            debug!("Sending GET {}", url);
            let response = client.request(request).await.map_err(|error| {
                warn!("Request to {} failed: {}", url, error);
                NetworkError::from_hyper_error(&error)
            })?;

            let (parts, body) = response.into_parts();
            let body = body
                .collect()
                .await
                .map_err(|error: hyper::Error| {
                    NetworkError::Internal(format!("Failed to read response body: {error}"))
                })?
                .to_bytes();
            debug!("Received {} ({} bytes) from {}", parts.status, body.len(), url);

            Ok(Response {
                url,
                status: parts.status,
                headers: parts.headers,
                body,
            })
        })
    }
}

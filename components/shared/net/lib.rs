/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

#![deny(unsafe_code)]

use std::fmt;

use http::Error as HttpError;
use hyper_util::client::legacy::Error as HyperError;
use serde::{Deserialize, Serialize};

pub mod network_event;
pub mod request;
pub mod response;

pub use crate::network_event::{NetworkEvent, NetworkEventTopic};
pub use crate::request::RequestId;
pub use crate::response::Response;

/// The outcome of a single fetch, shared by every caller waiting on it.
pub type FetchResult = Result<Response, NetworkError>;

/// Network errors that have to be exported out of the loaders
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum NetworkError {
    /// Could be any of the internal errors, like unsupported scheme, connection errors, etc.
    Internal(String),
    /// The transfer a request was attached to went away before producing a result.
    LoadCancelled,
}

impl NetworkError {
    pub fn from_hyper_error(error: &HyperError) -> Self {
        NetworkError::Internal(error.to_string())
    }

    pub fn from_http_error(error: &HttpError) -> Self {
        NetworkError::Internal(error.to_string())
    }
}

impl fmt::Display for NetworkError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            NetworkError::Internal(reason) => write!(f, "Network error: {}", reason),
            NetworkError::LoadCancelled => write!(f, "Load cancelled"),
        }
    }
}

impl std::error::Error for NetworkError {}

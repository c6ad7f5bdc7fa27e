/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use http::StatusCode;
use url::Url;

use crate::request::RequestId;

/// The points in a transfer's lifetime at which observers are notified.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum NetworkEventTopic {
    /// A transfer for the URL is about to start.
    ModifyRequest,
    /// Response headers have arrived and the body has not been delivered yet.
    ExamineResponse,
}

#[derive(Clone, Debug)]
pub struct NetworkEvent {
    pub request_id: RequestId,
    pub url: Url,
    pub topic: NetworkEventTopic,
    /// Only set for [`NetworkEventTopic::ExamineResponse`].
    pub status: Option<StatusCode>,
}

impl NetworkEvent {
    pub fn modify_request(request_id: RequestId, url: Url) -> NetworkEvent {
        NetworkEvent {
            request_id,
            url,
            topic: NetworkEventTopic::ModifyRequest,
            status: None,
        }
    }

    pub fn examine_response(request_id: RequestId, url: Url, status: StatusCode) -> NetworkEvent {
        NetworkEvent {
            request_id,
            url,
            topic: NetworkEventTopic::ExamineResponse,
            status: Some(status),
        }
    }
}

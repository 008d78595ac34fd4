// Copyright 2026 The ibctest Authors. All rights reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use core::fmt::Debug;
use core::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Empty};
use hyper::{Request, StatusCode, Uri};
use hyper_util::client::legacy::Client as LegacyClient;
use hyper_util::client::legacy::connect::HttpConnector as LegacyHttpConnector;
use hyper_util::rt::TokioExecutor;
use ibctest_error::{Code, Error, ResultExt, make_err, make_input_err};
use serde::Deserialize;
use serde_with::{DisplayFromStr, serde_as};

const STATUS_TIMEOUT: Duration = Duration::from_secs(10);

/// The parts of a node's `/status` response readiness depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeStatus {
    pub latest_block_height: u64,
    pub catching_up: bool,
}

/// Queries the status of a node's RPC endpoint.
#[async_trait]
pub trait StatusClient: Send + Sync + Debug {
    /// `rpc_addr` is `host:port` as published by the runtime.
    async fn status(&self, rpc_addr: &str) -> Result<NodeStatus, Error>;
}

#[serde_as]
#[derive(Deserialize)]
struct SyncInfo {
    #[serde_as(as = "DisplayFromStr")]
    latest_block_height: u64,
    catching_up: bool,
}

#[derive(Deserialize)]
struct StatusResult {
    sync_info: SyncInfo,
}

#[derive(Deserialize)]
struct StatusResponse {
    result: StatusResult,
}

/// Parses a JSON-RPC `/status` response body.
pub fn parse_status(body: &[u8]) -> Result<NodeStatus, Error> {
    let response: StatusResponse =
        serde_json::from_slice(body).err_tip(|| "while parsing node status")?;
    Ok(NodeStatus {
        latest_block_height: response.result.sync_info.latest_block_height,
        catching_up: response.result.sync_info.catching_up,
    })
}

/// [`StatusClient`] over plain HTTP/1.
#[derive(Clone)]
pub struct HttpStatusClient {
    client: LegacyClient<LegacyHttpConnector, Empty<Bytes>>,
    timeout: Duration,
}

impl Debug for HttpStatusClient {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HttpStatusClient")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl Default for HttpStatusClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpStatusClient {
    pub fn new() -> Self {
        Self {
            client: LegacyClient::builder(TokioExecutor::new()).build_http(),
            timeout: STATUS_TIMEOUT,
        }
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn fetch(&self, uri: Uri) -> Result<Bytes, Error> {
        let request = Request::get(uri)
            .body(Empty::new())
            .map_err(|e| make_err!(Code::Internal, "building status request: {e}"))?;
        let response = self
            .client
            .request(request)
            .await
            .map_err(|e| make_err!(Code::Unavailable, "{e}"))?;
        let status = response.status();
        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| make_err!(Code::Unavailable, "reading status body: {e}"))?
            .to_bytes();
        if status != StatusCode::OK {
            return Err(make_err!(
                Code::Unavailable,
                "status endpoint answered {status}: {}",
                String::from_utf8_lossy(&body)
            ));
        }
        Ok(body)
    }
}

#[async_trait]
impl StatusClient for HttpStatusClient {
    async fn status(&self, rpc_addr: &str) -> Result<NodeStatus, Error> {
        let uri: Uri = format!("http://{rpc_addr}/status")
            .parse()
            .map_err(|e| make_input_err!("invalid rpc address {rpc_addr}: {e}"))?;
        let body = tokio::time::timeout(self.timeout, self.fetch(uri))
            .await
            .map_err(|_| {
                make_err!(
                    Code::DeadlineExceeded,
                    "no status from {rpc_addr} within {:?}",
                    self.timeout
                )
            })?
            .err_tip(|| format!("while querying status of {rpc_addr}"))?;
        parse_status(&body)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn parses_sync_info() -> Result<(), Error> {
        let body = br#"{"jsonrpc":"2.0","id":-1,"result":{"node_info":{"network":"gaia-1"},"sync_info":{"latest_block_hash":"AB12","latest_block_height":"42","catching_up":true},"validator_info":{}}}"#;
        assert_eq!(
            parse_status(body)?,
            NodeStatus {
                latest_block_height: 42,
                catching_up: true,
            }
        );
        Ok(())
    }

    #[test]
    fn rejects_numeric_garbage() {
        let body = br#"{"result":{"sync_info":{"latest_block_height":"tall","catching_up":false}}}"#;
        assert_eq!(parse_status(body).unwrap_err().code, Code::DataLoss);
    }
}

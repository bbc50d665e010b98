// Copyright 2025 RISC Zero, Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::error::ClientError;
use crate::{Algod, NodeStatus};
use async_trait::async_trait;
use log::debug;
use reqwest::Response;
use url::Url;

const TOKEN_HEADER: &str = "X-Algo-API-Token";

/// HTTP client to an algod node.
#[derive(Clone, Debug)]
pub struct AlgodHttp {
    base: Url,
    token: Option<String>,
    http: reqwest::Client,
}

impl AlgodHttp {
    pub fn new(url: &str, token: Option<String>) -> Result<Self, ClientError> {
        // A trailing slash keeps Url::join from eating the last path
        // segment of the endpoint.
        let base = if url.ends_with('/') {
            Url::parse(url)?
        } else {
            Url::parse(&format!("{url}/"))?
        };
        Ok(AlgodHttp {
            base,
            token,
            http: reqwest::Client::new(),
        })
    }

    async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<Response, ClientError> {
        let url = self.base.join(path)?;
        let mut request = self.http.get(url.clone());
        if let Some(token) = &self.token {
            request = request.header(TOKEN_HEADER, token);
        }
        if !query.is_empty() {
            request = request.query(query);
        }
        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                status,
                url: url.to_string(),
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl Algod for AlgodHttp {
    async fn status(&self) -> Result<NodeStatus, ClientError> {
        debug!("querying algod status");
        Ok(self.get("v2/status", &[]).await?.json().await?)
    }

    async fn block_raw(&self, round: u64) -> Result<Vec<u8>, ClientError> {
        debug!("retrieving block {round} from algod");
        let response = self
            .get(&format!("v2/blocks/{round}"), &[("format", "msgpack")])
            .await?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn status_after_block(&self, round: u64) -> Result<NodeStatus, ClientError> {
        debug!("waiting for a block after round {round}");
        Ok(self
            .get(&format!("v2/status/wait-for-block-after/{round}"), &[])
            .await?
            .json()
            .await?)
    }
}

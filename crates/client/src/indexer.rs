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
use crate::{Indexer, TransactionQuery, TransactionSearchPage};
use async_trait::async_trait;
use log::debug;
use roundwatch_core::transaction::SubscribedTransaction;
use serde::Deserialize;
use url::Url;

const TOKEN_HEADER: &str = "X-Indexer-API-Token";

/// HTTP client to an indexer.
#[derive(Clone, Debug)]
pub struct IndexerHttp {
    base: Url,
    token: Option<String>,
    http: reqwest::Client,
}

impl IndexerHttp {
    pub fn new(url: &str, token: Option<String>) -> Result<Self, ClientError> {
        let base = if url.ends_with('/') {
            Url::parse(url)?
        } else {
            Url::parse(&format!("{url}/"))?
        };
        Ok(IndexerHttp {
            base,
            token,
            http: reqwest::Client::new(),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ClientError> {
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
        Ok(response.json().await?)
    }

    /// Looks a single transaction up by id.
    pub async fn lookup_transaction(
        &self,
        txid: &str,
    ) -> Result<SubscribedTransaction, ClientError> {
        #[derive(Deserialize)]
        struct Lookup {
            transaction: SubscribedTransaction,
        }
        let lookup: Lookup = self
            .get_json(&format!("v2/transactions/{txid}"), &[])
            .await?;
        Ok(lookup.transaction)
    }
}

#[async_trait]
impl Indexer for IndexerHttp {
    async fn search_transactions(
        &self,
        query: &TransactionQuery,
    ) -> Result<TransactionSearchPage, ClientError> {
        debug!(
            "searching indexer transactions, rounds {:?}..{:?}",
            query.min_round, query.max_round
        );
        self.get_json("v2/transactions", &query.query_pairs())
            .await
    }
}

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

//! Minimal clients to the two data sources the subscription engine
//! consumes: the node ("algod", raw msgpack blocks) and the historical
//! archive ("indexer", flat JSON transactions).
//!
//! Three algod flavors exist: plain HTTP, a file-backed provider serving
//! previously stored blocks, and a caching wrapper that fills the file
//! store through an inner client.

use async_trait::async_trait;
use roundwatch_core::transaction::SubscribedTransaction;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;

pub mod algod;
pub mod error;
pub mod file;
pub mod indexer;

pub use algod::AlgodHttp;
pub use error::ClientError;
pub use file::{CachingAlgod, FileAlgod};
pub use indexer::IndexerHttp;

/// Node status, as far as the engine cares.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct NodeStatus {
    #[serde(rename = "last-round")]
    pub last_round: u64,
}

/// The node client the sync orchestrator consumes.
#[async_trait]
pub trait Algod: Send + Sync {
    async fn status(&self) -> Result<NodeStatus, ClientError>;

    /// The raw msgpack-encoded block for a round.
    async fn block_raw(&self, round: u64) -> Result<Vec<u8>, ClientError>;

    /// Long-polls until a round later than `round` appears.
    async fn status_after_block(&self, round: u64) -> Result<NodeStatus, ClientError>;
}

/// The archive client used for indexer catchup.
#[async_trait]
pub trait Indexer: Send + Sync {
    async fn search_transactions(
        &self,
        query: &TransactionQuery,
    ) -> Result<TransactionSearchPage, ClientError>;
}

/// Query parameters of the indexer's transaction search endpoint.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TransactionQuery {
    pub address: Option<String>,
    /// `sender` or `receiver`; constrains what `address` matches against.
    pub address_role: Option<String>,
    pub txn_type: Option<String>,
    /// Base64-encoded prefix of the note field.
    pub note_prefix: Option<String>,
    pub application_id: Option<u64>,
    pub asset_id: Option<u64>,
    /// Exclusive lower bound on the amount.
    pub currency_greater_than: Option<u64>,
    /// Exclusive upper bound on the amount.
    pub currency_less_than: Option<u64>,
    pub min_round: Option<u64>,
    pub max_round: Option<u64>,
    pub limit: Option<u64>,
    pub next: Option<String>,
}

impl TransactionQuery {
    /// The REST query pairs for this search.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        let mut push = |key: &'static str, value: Option<String>| {
            if let Some(value) = value {
                pairs.push((key, value));
            }
        };
        push("address", self.address.clone());
        push("address-role", self.address_role.clone());
        push("tx-type", self.txn_type.clone());
        push("note-prefix", self.note_prefix.clone());
        push("application-id", self.application_id.map(|v| v.to_string()));
        push("asset-id", self.asset_id.map(|v| v.to_string()));
        push(
            "currency-greater-than",
            self.currency_greater_than.map(|v| v.to_string()),
        );
        push(
            "currency-less-than",
            self.currency_less_than.map(|v| v.to_string()),
        );
        push("min-round", self.min_round.map(|v| v.to_string()));
        push("max-round", self.max_round.map(|v| v.to_string()));
        push("limit", self.limit.map(|v| v.to_string()));
        push("next", self.next.clone());
        pairs
    }
}

/// One page of transaction search results.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct TransactionSearchPage {
    #[serde(rename = "current-round", default)]
    pub current_round: u64,
    #[serde(rename = "next-token", default)]
    pub next_token: Option<String>,
    #[serde(default)]
    pub transactions: Vec<SubscribedTransaction>,
}

const DEFAULT_SEARCH_LIMIT: u64 = 1000;

/// Drives the indexer's pagination to completion, returning all matching
/// transactions and the archive's current round.
pub async fn search_transactions_all(
    indexer: &dyn Indexer,
    query: &TransactionQuery,
) -> Result<(Vec<SubscribedTransaction>, u64), ClientError> {
    let mut results = Vec::new();
    let mut current_round = 0u64;
    let mut next_token: Option<String> = None;

    loop {
        let mut page_query = query.clone();
        page_query.limit = Some(query.limit.unwrap_or(DEFAULT_SEARCH_LIMIT));
        page_query.next = next_token.clone();

        let page = indexer.search_transactions(&page_query).await?;
        current_round = current_round.max(page.current_round);
        if page.transactions.is_empty() {
            break;
        }
        results.extend(page.transactions);
        match page.next_token {
            Some(token) if !token.is_empty() => next_token = Some(token),
            _ => break,
        }
    }

    Ok((results, current_round))
}

pub fn new_algod(url: &str, token: Option<String>) -> Result<Arc<dyn Algod>, ClientError> {
    Ok(Arc::new(AlgodHttp::new(url, token)?))
}

pub fn new_file_algod(dir: PathBuf) -> Result<Arc<dyn Algod>, ClientError> {
    Ok(Arc::new(FileAlgod::new(dir)?))
}

pub fn new_cached_algod(
    dir: PathBuf,
    url: &str,
    token: Option<String>,
) -> Result<Arc<dyn Algod>, ClientError> {
    Ok(Arc::new(CachingAlgod::new(dir, AlgodHttp::new(url, token)?)?))
}

pub fn new_indexer(url: &str, token: Option<String>) -> Result<Arc<dyn Indexer>, ClientError> {
    Ok(Arc::new(IndexerHttp::new(url, token)?))
}

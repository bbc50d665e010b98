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

//! In-memory algod/indexer doubles and block builders shared by the
//! integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use roundwatch_client::{
    Algod, ClientError, Indexer, NodeStatus, TransactionQuery, TransactionSearchPage,
};
use roundwatch_core::address::Address;
use roundwatch_core::block::{
    encode_block, Block, BlockData, BlockTxn, EvalDelta, HashDigest, TxnFields,
};
use roundwatch_core::normalize::{block_transactions, to_subscribed_transaction};
use roundwatch_core::transaction::{SubscribedTransaction, TxnType};
use std::collections::HashMap;
use std::sync::Mutex;

pub fn addr(seed: u8) -> Address {
    Address::new([seed; 32])
}

pub fn addr_str(seed: u8) -> String {
    addr(seed).to_string()
}

pub fn pay_txn(sender: u8, receiver: u8, amount: u64) -> BlockTxn {
    BlockTxn {
        txn: TxnFields {
            sender: Some(addr(sender)),
            receiver: Some(addr(receiver)),
            amount,
            fee: 1000,
            first_valid: 1,
            last_valid: 1000,
            txn_type: Some(TxnType::Payment),
            ..Default::default()
        },
        hgh: Some(true),
        ..Default::default()
    }
}

pub fn app_call_txn(sender: u8, app_id: u64, inner: Vec<BlockTxn>) -> BlockTxn {
    BlockTxn {
        txn: TxnFields {
            sender: Some(addr(sender)),
            app_id,
            fee: 1000,
            first_valid: 1,
            last_valid: 1000,
            txn_type: Some(TxnType::ApplicationCall),
            ..Default::default()
        },
        hgh: Some(true),
        dt: if inner.is_empty() {
            None
        } else {
            Some(EvalDelta {
                inner_txns: inner,
                ..Default::default()
            })
        },
        ..Default::default()
    }
}

pub fn inner_app_call_txn(sender: u8, app_id: u64, inner: Vec<BlockTxn>) -> BlockTxn {
    BlockTxn {
        txn: TxnFields {
            sender: Some(addr(sender)),
            app_id,
            txn_type: Some(TxnType::ApplicationCall),
            ..Default::default()
        },
        dt: if inner.is_empty() {
            None
        } else {
            Some(EvalDelta {
                inner_txns: inner,
                ..Default::default()
            })
        },
        ..Default::default()
    }
}

pub fn inner_pay_txn(sender: u8, receiver: u8, amount: u64) -> BlockTxn {
    BlockTxn {
        txn: TxnFields {
            sender: Some(addr(sender)),
            receiver: Some(addr(receiver)),
            amount,
            txn_type: Some(TxnType::Payment),
            ..Default::default()
        },
        ..Default::default()
    }
}

pub fn block(round: u64, txns: Vec<BlockTxn>) -> BlockData {
    BlockData {
        block: Block {
            rnd: round,
            ts: 1_700_000_000 + round,
            gen: "testnet-v1.0".to_string(),
            gh: HashDigest([3u8; 32]),
            proto: "future".to_string(),
            txns,
            ..Default::default()
        },
        cert: None,
    }
}

/// The canonical records algod-path normalization produces for a block's
/// top-level transactions.
pub fn canonical_top_level(data: &BlockData) -> Vec<SubscribedTransaction> {
    let entries = block_transactions(&data.block).unwrap();
    entries
        .iter()
        .filter(|entry| entry.parent_txn_id.is_none())
        .map(|entry| to_subscribed_transaction(entry, None).unwrap())
        .collect()
}

/// Strips the fields indexer search responses do not carry from inner
/// transactions (ids, parent links, offsets), emulating what the archive
/// returns for a matched top-level transaction.
pub fn as_indexer_result(mut txn: SubscribedTransaction) -> SubscribedTransaction {
    fn strip_inner(txn: &mut SubscribedTransaction) {
        if let Some(inner) = txn.inner_txns.as_mut() {
            for child in inner {
                child.id = String::new();
                child.parent_transaction_id = None;
                child.intra_round_offset = None;
                strip_inner(child);
            }
        }
    }
    strip_inner(&mut txn);
    txn
}

pub struct MockAlgod {
    pub last_round: u64,
    pub blocks: HashMap<u64, Vec<u8>>,
}

impl MockAlgod {
    pub fn new(last_round: u64) -> Self {
        MockAlgod {
            last_round,
            blocks: HashMap::new(),
        }
    }

    pub fn with_block(mut self, data: &BlockData) -> Self {
        self.blocks
            .insert(data.block.rnd, encode_block(data).unwrap());
        self
    }

    pub fn with_empty_rounds(mut self, from: u64, to: u64) -> Self {
        for round in from..=to {
            self.blocks
                .entry(round)
                .or_insert_with(|| encode_block(&block(round, vec![])).unwrap());
        }
        self
    }
}

#[async_trait]
impl Algod for MockAlgod {
    async fn status(&self) -> Result<NodeStatus, ClientError> {
        Ok(NodeStatus {
            last_round: self.last_round,
        })
    }

    async fn block_raw(&self, round: u64) -> Result<Vec<u8>, ClientError> {
        self.blocks
            .get(&round)
            .cloned()
            .ok_or(ClientError::BlockNotAvailable(round))
    }

    async fn status_after_block(&self, _round: u64) -> Result<NodeStatus, ClientError> {
        self.status().await
    }
}

pub struct MockIndexer {
    pub transactions: Vec<SubscribedTransaction>,
    pub queries: Mutex<Vec<TransactionQuery>>,
}

impl MockIndexer {
    pub fn new(transactions: Vec<SubscribedTransaction>) -> Self {
        MockIndexer {
            transactions,
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn recorded_queries(&self) -> Vec<TransactionQuery> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl Indexer for MockIndexer {
    async fn search_transactions(
        &self,
        query: &TransactionQuery,
    ) -> Result<TransactionSearchPage, ClientError> {
        self.queries.lock().unwrap().push(query.clone());

        // Like the real archive: the address/type constraints match any
        // transaction in the tree, but the returned record is the top-level
        // parent.
        let node_matches = |txn: &SubscribedTransaction| {
            if let Some(address) = &query.address {
                let matched = match query.address_role.as_deref() {
                    Some("receiver") => txn.receiver() == Some(address.as_str()),
                    _ => txn.sender == *address,
                };
                if !matched {
                    return false;
                }
            }
            if let Some(txn_type) = &query.txn_type {
                if txn.tx_type.as_str() != txn_type {
                    return false;
                }
            }
            true
        };

        let transactions = self
            .transactions
            .iter()
            .filter(|txn| {
                let round = txn.confirmed_round.unwrap_or(0);
                if query.min_round.is_some_and(|min| round < min) {
                    return false;
                }
                if query.max_round.is_some_and(|max| round > max) {
                    return false;
                }
                let mut any = false;
                txn.walk(&mut |node| any = any || node_matches(node));
                any
            })
            .cloned()
            .collect();

        Ok(TransactionSearchPage {
            current_round: self.transactions.len() as u64,
            next_token: None,
            transactions,
        })
    }
}

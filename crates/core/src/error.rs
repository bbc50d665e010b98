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

use thiserror::Error;

/// Errors raised by the pure compute stages of the pipeline.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("malformed block: {0}")]
    MalformedBlock(#[from] rmp_serde::decode::Error),

    #[error("transaction encoding failed: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid ABI type '{0}': {1}")]
    AbiType(String, String),

    #[error("ABI decode failed: {0}")]
    AbiDecode(String),

    #[error("error processing {group}.{event} on transaction {txn_id}: {reason}")]
    Arc28Decode {
        group: String,
        event: String,
        txn_id: String,
        reason: String,
    },

    #[error("received no transaction type for transaction at round offset {0}")]
    MissingTxnType(usize),

    #[error("unknown transaction type '{0}'")]
    UnknownTxnType(String),

    #[error("unknown on-completion value: {0}")]
    UnknownOnComplete(u64),
}

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

use roundwatch_client::ClientError;
use roundwatch_core::CoreError;
use thiserror::Error;

/// Anything a subscription poll can fail with. A failed poll never advances
/// the watermark; the next poll retries the same range.
#[derive(Debug, Error)]
pub enum SubscriberError {
    /// catchup-with-indexer was configured without an indexer client.
    #[error("received sync behaviour of catchup-with-indexer, but didn't receive an indexer instance")]
    IndexerRequired,

    /// `error` is the reserved name of the error event.
    #[error("'error' is reserved, please supply a different filter name")]
    ReservedFilterName,

    /// The `fail` sync behaviour hit a gap larger than max_rounds_to_sync.
    #[error("Invalid round number to subscribe from {from}; current round number is {current}")]
    SyncBehind { from: u64, current: u64 },

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("watermark store failed: {0}")]
    Watermark(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("listener for '{event}' failed: {source}")]
    Listener {
        event: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

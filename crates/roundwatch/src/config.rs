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

use crate::error::SubscriberError;
use crate::watermark::{InMemoryWatermark, WatermarkStore};
use roundwatch_core::arc28::Arc28EventGroup;
use roundwatch_core::block::BlockMetadata;
use roundwatch_core::filter::{NamedTransactionFilter, TransactionFilter};
use roundwatch_core::transaction::SubscribedTransaction;
use serde::Serialize;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_MAX_ROUNDS_TO_SYNC: u64 = 500;

/// What to do when the network tip is more than `max_rounds_to_sync` past
/// the watermark.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncBehaviour {
    /// Fail the poll immediately.
    Fail,
    /// Skip the gap and sync the newest rounds only.
    SkipSyncNewest,
    /// Sync forward from the watermark, `max_rounds_to_sync` at a time.
    SyncOldest,
    /// Like sync-oldest, except a zero watermark jumps to the tip first.
    SyncOldestStartNow,
    /// Bridge the gap with indexer search, then the tip from algod.
    CatchupWithIndexer,
}

impl Display for SyncBehaviour {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncBehaviour::Fail => "fail",
            SyncBehaviour::SkipSyncNewest => "skip-sync-newest",
            SyncBehaviour::SyncOldest => "sync-oldest",
            SyncBehaviour::SyncOldestStartNow => "sync-oldest-start-now",
            SyncBehaviour::CatchupWithIndexer => "catchup-with-indexer",
        };
        f.write_str(name)
    }
}

impl FromStr for SyncBehaviour {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fail" => Ok(SyncBehaviour::Fail),
            "skip-sync-newest" => Ok(SyncBehaviour::SkipSyncNewest),
            "sync-oldest" => Ok(SyncBehaviour::SyncOldest),
            "sync-oldest-start-now" => Ok(SyncBehaviour::SyncOldestStartNow),
            "catchup-with-indexer" => Ok(SyncBehaviour::CatchupWithIndexer),
            other => Err(format!("unknown sync behaviour '{other}'")),
        }
    }
}

/// Optional reshaping of a filter's matches before they are dispatched to
/// its listeners.
pub type TxnMapper =
    Box<dyn Fn(Vec<SubscribedTransaction>) -> Vec<SubscribedTransaction> + Send + Sync>;

/// A named filter to subscribe to, with an optional data mapper.
pub struct SubscriberFilter {
    pub named: NamedTransactionFilter,
    pub mapper: Option<TxnMapper>,
}

impl SubscriberFilter {
    pub fn new(name: impl Into<String>, filter: TransactionFilter) -> Self {
        SubscriberFilter {
            named: NamedTransactionFilter {
                name: name.into(),
                filter,
            },
            mapper: None,
        }
    }

    pub fn with_mapper(mut self, mapper: TxnMapper) -> Self {
        self.mapper = Some(mapper);
        self
    }

    pub fn name(&self) -> &str {
        &self.named.name
    }
}

/// Subscriber configuration.
pub struct SubscriberConfig {
    /// The filters to subscribe to / emit events for.
    pub filters: Vec<SubscriberFilter>,
    /// ARC-28 event definitions to process from app call logs.
    pub arc28_groups: Vec<Arc28EventGroup>,
    /// Maximum rounds to sync from algod per poll.
    pub max_rounds_to_sync: u64,
    /// Maximum rounds to bridge via indexer in catchup-with-indexer mode.
    pub max_indexer_rounds_to_sync: Option<u64>,
    pub sync_behaviour: SyncBehaviour,
    /// Sleep between polls.
    pub frequency: Duration,
    /// Long-poll for the next block instead of sleeping once the tip is
    /// reached.
    pub wait_for_block_when_at_tip: bool,
    /// Where the watermark is read at the start of a poll and persisted
    /// after its transactions have been processed.
    pub watermark: Arc<dyn WatermarkStore>,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        SubscriberConfig {
            filters: vec![],
            arc28_groups: vec![],
            max_rounds_to_sync: DEFAULT_MAX_ROUNDS_TO_SYNC,
            max_indexer_rounds_to_sync: None,
            sync_behaviour: SyncBehaviour::Fail,
            frequency: Duration::from_secs(1),
            wait_for_block_when_at_tip: false,
            watermark: Arc::new(InMemoryWatermark::new(0)),
        }
    }
}

/// Parameters of a single orchestrated poll.
pub struct SubscriptionParams<'a> {
    pub filters: &'a [SubscriberFilter],
    pub arc28_groups: &'a [Arc28EventGroup],
    pub max_rounds_to_sync: u64,
    pub max_indexer_rounds_to_sync: Option<u64>,
    pub sync_behaviour: SyncBehaviour,
    /// The highest round already delivered.
    pub watermark: u64,
    /// The network tip; resolved from algod when absent.
    pub current_round: Option<u64>,
}

/// The result of a single subscription poll.
#[derive(Clone, Debug, Serialize)]
pub struct SubscriptionResult {
    /// The network tip observed during the poll.
    pub current_round: u64,
    /// The watermark the poll started from.
    pub starting_watermark: u64,
    /// The watermark to persist after processing; equals the end of
    /// `synced_round_range`.
    pub new_watermark: u64,
    /// The (start, end) rounds this poll covered.
    pub synced_round_range: (u64, u64),
    /// Matching transactions, ordered by (round, intra-round offset).
    pub subscribed_transactions: Vec<SubscribedTransaction>,
    /// Metadata of the blocks retrieved from algod.
    pub block_metadata: Vec<BlockMetadata>,
}

/// Passed to `before:poll` listeners.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct BeforePollMetadata {
    pub watermark: u64,
    pub current_round: u64,
}

impl SubscriberConfig {
    pub(crate) fn validate(&self, has_indexer: bool) -> Result<(), SubscriberError> {
        if self.sync_behaviour == SyncBehaviour::CatchupWithIndexer && !has_indexer {
            return Err(SubscriberError::IndexerRequired);
        }
        if self.filters.iter().any(|f| f.name() == "error") {
            return Err(SubscriberError::ReservedFilterName);
        }
        Ok(())
    }
}

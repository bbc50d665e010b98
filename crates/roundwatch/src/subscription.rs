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

//! The sync orchestrator: decides the round range to cover from the
//! watermark and the network tip, pulls the range from algod (and, when
//! catching up, from indexer), and runs every transaction through
//! normalization, filtering and enrichment.
//!
//! A poll is transactional: either the whole range completes and
//! `new_watermark` advances to its end, or the error leaves the watermark
//! untouched and the next poll retries the same range.

use crate::config::{SubscriptionParams, SubscriptionResult, SyncBehaviour};
use crate::error::SubscriberError;
use crate::indexer_sync::{filter_indexer_transaction, indexer_pre_filter};
use log::{debug, info};
use roundwatch_client::{search_transactions_all, Algod, Indexer};
use roundwatch_core::arc28::{events_to_process, extract_for_transaction, Arc28EventGroup, Arc28EventToProcess};
use roundwatch_core::balance::changes_from_subscribed;
use roundwatch_core::block::{block_metadata, decode_block, BlockData, BlockMetadata};
use roundwatch_core::filter::{matches_filter, FilterContext};
use roundwatch_core::normalize::{block_transactions, to_subscribed_transaction};
use roundwatch_core::transaction::SubscribedTransaction;
use std::collections::HashMap;

/// Blocks are fetched in chunks of this size to avoid overloading the node.
const BLOCK_CHUNK_SIZE: u64 = 30;

/// Executes a single subscription poll for the given parameters.
pub async fn get_subscribed_transactions(
    params: &SubscriptionParams<'_>,
    algod: &dyn Algod,
    indexer: Option<&dyn Indexer>,
) -> Result<SubscriptionResult, SubscriberError> {
    let watermark = params.watermark;
    let max_rounds_to_sync = params.max_rounds_to_sync;
    let current_round = match params.current_round {
        Some(round) => round,
        None => algod.status().await?.last_round,
    };

    let arc28_events = events_to_process(params.arc28_groups);
    let ctx = FilterContext {
        arc28_events: &arc28_events,
        arc28_groups: params.arc28_groups,
    };

    // Nothing to sync, we are at the tip of the chain already.
    if current_round <= watermark {
        return Ok(SubscriptionResult {
            current_round,
            starting_watermark: watermark,
            new_watermark: watermark,
            synced_round_range: (current_round, current_round),
            subscribed_transactions: vec![],
            block_metadata: vec![],
        });
    }

    let mut algod_sync_from = watermark + 1;
    let start_round;
    let mut end_round = current_round;
    let mut skip_algod_sync = false;
    let mut catchup_transactions: Vec<SubscribedTransaction> = Vec::new();

    if current_round - watermark > max_rounds_to_sync {
        match params.sync_behaviour {
            SyncBehaviour::Fail => {
                return Err(SubscriberError::SyncBehind {
                    from: algod_sync_from,
                    current: current_round,
                });
            }
            SyncBehaviour::SkipSyncNewest => {
                algod_sync_from = current_round - max_rounds_to_sync + 1;
            }
            SyncBehaviour::SyncOldest => {
                end_round = algod_sync_from + max_rounds_to_sync - 1;
            }
            SyncBehaviour::SyncOldestStartNow => {
                if watermark == 0 {
                    algod_sync_from = current_round - max_rounds_to_sync + 1;
                } else {
                    end_round = algod_sync_from + max_rounds_to_sync - 1;
                }
            }
            SyncBehaviour::CatchupWithIndexer => {
                let indexer = indexer.ok_or(SubscriberError::IndexerRequired)?;
                let catchup_start = algod_sync_from;

                // The newest `max_rounds_to_sync` rounds come from algod;
                // everything before that from indexer, subject to its own
                // cap.
                let mut indexer_sync_to = current_round - max_rounds_to_sync;
                if let Some(max_indexer_rounds) = params.max_indexer_rounds_to_sync {
                    if indexer_sync_to - catchup_start + 1 > max_indexer_rounds {
                        indexer_sync_to = catchup_start + max_indexer_rounds - 1;
                        end_round = indexer_sync_to;
                        skip_algod_sync = true;
                    }
                }
                if !skip_algod_sync {
                    algod_sync_from = indexer_sync_to + 1;
                }

                debug!(
                    "catching up from round {catchup_start} to round {indexer_sync_to} via indexer; this may take a few seconds"
                );

                for filter in params.filters {
                    let query =
                        indexer_pre_filter(&filter.named.filter, catchup_start, indexer_sync_to);
                    let (transactions, _) = search_transactions_all(indexer, &query).await?;
                    for transaction in &transactions {
                        catchup_transactions.extend(filter_indexer_transaction(
                            transaction,
                            &filter.named,
                            &ctx,
                        ));
                    }
                }

                sort_by_round_order(&mut catchup_transactions);
                catchup_transactions = deduplicate(catchup_transactions);

                debug!(
                    "retrieved {} transactions from round {catchup_start} to round {indexer_sync_to} via indexer",
                    catchup_transactions.len()
                );

                start_round = catchup_start;
                let (block_metadata, algod_transactions) = if skip_algod_sync {
                    debug!("skipping algod sync; the indexer span covers the whole poll");
                    (vec![], vec![])
                } else {
                    sync_from_algod(algod, algod_sync_from, end_round, params, &ctx).await?
                };

                return assemble(
                    params,
                    current_round,
                    start_round,
                    end_round,
                    catchup_transactions,
                    algod_transactions,
                    block_metadata,
                    &arc28_events,
                );
            }
        }
        start_round = algod_sync_from;
    } else {
        start_round = algod_sync_from;
    }

    let (block_metadata, algod_transactions) =
        sync_from_algod(algod, algod_sync_from, end_round, params, &ctx).await?;

    assemble(
        params,
        current_round,
        start_round,
        end_round,
        catchup_transactions,
        algod_transactions,
        block_metadata,
        &arc28_events,
    )
}

#[allow(clippy::too_many_arguments)]
fn assemble(
    params: &SubscriptionParams<'_>,
    current_round: u64,
    start_round: u64,
    end_round: u64,
    catchup_transactions: Vec<SubscribedTransaction>,
    algod_transactions: Vec<SubscribedTransaction>,
    block_metadata: Vec<BlockMetadata>,
    arc28_events: &[Arc28EventToProcess],
) -> Result<SubscriptionResult, SubscriberError> {
    let mut subscribed_transactions = catchup_transactions;
    subscribed_transactions.extend(algod_transactions);
    for transaction in &mut subscribed_transactions {
        process_extra_fields(transaction, arc28_events, params.arc28_groups)?;
    }

    Ok(SubscriptionResult {
        current_round,
        starting_watermark: params.watermark,
        new_watermark: end_round,
        synced_round_range: (start_round, end_round),
        subscribed_transactions,
        block_metadata,
    })
}

/// Retrieves `[from, to]` from algod and runs the filters over every
/// transaction of every block.
async fn sync_from_algod(
    algod: &dyn Algod,
    from: u64,
    to: u64,
    params: &SubscriptionParams<'_>,
    ctx: &FilterContext<'_>,
) -> Result<(Vec<BlockMetadata>, Vec<SubscribedTransaction>), SubscriberError> {
    let blocks = get_blocks_bulk(algod, from, to).await?;

    let mut canonical = Vec::new();
    for block_data in &blocks {
        let entries = block_transactions(&block_data.block)?;
        for entry in &entries {
            canonical.push(to_subscribed_transaction(entry, None)?);
        }
    }
    debug!(
        "processed {} transactions from algod via round(s) {from}-{to}",
        canonical.len()
    );

    let mut matched = Vec::new();
    for filter in params.filters {
        for transaction in &canonical {
            if matches_filter(&filter.named.filter, transaction, ctx) {
                let mut tagged = transaction.clone();
                tagged.filters_matched = vec![filter.named.name.clone()];
                matched.push(tagged);
            }
        }
    }

    let mut matched = deduplicate(matched);
    sort_by_round_order(&mut matched);

    let metadata = blocks.iter().map(block_metadata).collect();
    Ok((metadata, matched))
}

/// Retrieves blocks in bulk between the given rounds, `BLOCK_CHUNK_SIZE` at
/// a time.
async fn get_blocks_bulk(
    algod: &dyn Algod,
    from: u64,
    to: u64,
) -> Result<Vec<BlockData>, SubscriberError> {
    let mut blocks = Vec::with_capacity((to - from + 1) as usize);
    let mut chunk_start = from;
    while chunk_start <= to {
        let chunk_end = (chunk_start + BLOCK_CHUNK_SIZE - 1).min(to);
        info!(
            "retrieving {} blocks from round {chunk_start} via algod",
            chunk_end - chunk_start + 1
        );
        for round in chunk_start..=chunk_end {
            let bytes = algod.block_raw(round).await?;
            blocks.push(decode_block(&bytes)?);
        }
        chunk_start = chunk_end + 1;
    }
    Ok(blocks)
}

/// Attaches the derived fields (balance changes, ARC-28 events) to a
/// transaction and, recursively, to its inner transactions.
fn process_extra_fields(
    transaction: &mut SubscribedTransaction,
    arc28_events: &[Arc28EventToProcess],
    arc28_groups: &[Arc28EventGroup],
) -> Result<(), SubscriberError> {
    transaction.arc28_events = extract_for_transaction(transaction, arc28_events, arc28_groups)?;
    transaction.balance_changes = changes_from_subscribed(transaction);
    if let Some(inner) = transaction.inner_txns.as_mut() {
        for child in inner {
            process_extra_fields(child, arc28_events, arc28_groups)?;
        }
    }
    Ok(())
}

/// Collapses duplicate transactions (matched by several filters) into one
/// record carrying the union of filter names, preserving first-seen order.
fn deduplicate(transactions: Vec<SubscribedTransaction>) -> Vec<SubscribedTransaction> {
    let mut result: Vec<SubscribedTransaction> = Vec::with_capacity(transactions.len());
    let mut seen: HashMap<String, usize> = HashMap::new();

    for transaction in transactions {
        match seen.get(&transaction.id) {
            Some(&index) => {
                let existing = &mut result[index];
                for name in transaction.filters_matched {
                    if !existing.filters_matched.contains(&name) {
                        existing.filters_matched.push(name);
                    }
                }
            }
            None => {
                seen.insert(transaction.id.clone(), result.len());
                result.push(transaction);
            }
        }
    }
    result
}

fn sort_by_round_order(transactions: &mut [SubscribedTransaction]) {
    transactions.sort_by_key(|transaction| {
        (
            transaction.confirmed_round.unwrap_or(0),
            transaction.intra_round_offset.unwrap_or(0),
        )
    });
}

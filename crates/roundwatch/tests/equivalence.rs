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

//! Observational equivalence of the two retrieval paths: for the same
//! underlying rounds and filters, the set of (id, filters_matched) is the
//! same whether transactions came from raw blocks or from indexer search.

mod common;

use common::*;
use roundwatch::{
    get_subscribed_transactions, SubscriberFilter, SubscriptionParams, SyncBehaviour,
};
use roundwatch_core::block::BlockData;
use roundwatch_core::filter::TransactionFilter;
use std::collections::BTreeSet;

fn filters() -> Vec<SubscriberFilter> {
    vec![
        // Matches the top-level app call.
        SubscriberFilter::new(
            "top",
            TransactionFilter {
                sender: Some(addr_str(1).into()),
                ..Default::default()
            },
        ),
        // Matches only an inner transaction, which indexer search reports
        // through its top-level parent.
        SubscriberFilter::new(
            "inner",
            TransactionFilter {
                sender: Some(addr_str(9).into()),
                ..Default::default()
            },
        ),
    ]
}

fn fixture_block(round: u64) -> BlockData {
    let top = app_call_txn(
        1,
        10,
        vec![inner_pay_txn(9, 2, 10), inner_pay_txn(8, 2, 20)],
    );
    block(round, vec![top, pay_txn(1, 3, 500)])
}

type MatchSet = BTreeSet<(String, Vec<String>)>;

fn match_set(result: &roundwatch::SubscriptionResult) -> MatchSet {
    result
        .subscribed_transactions
        .iter()
        .map(|txn| {
            let mut names = txn.filters_matched.clone();
            names.sort();
            (txn.id.clone(), names)
        })
        .collect()
}

#[tokio::test]
async fn algod_and_indexer_paths_return_the_same_matches() {
    const ROUND: u64 = 50;
    let fixture = fixture_block(ROUND);
    let filters = filters();

    // Algod path: the round is within max_rounds_to_sync of the tip.
    let algod = MockAlgod::new(ROUND).with_block(&fixture);
    let algod_result = get_subscribed_transactions(
        &SubscriptionParams {
            filters: &filters,
            arc28_groups: &[],
            max_rounds_to_sync: 500,
            max_indexer_rounds_to_sync: None,
            sync_behaviour: SyncBehaviour::Fail,
            watermark: ROUND - 1,
            current_round: Some(ROUND),
        },
        &algod,
        None,
    )
    .await
    .unwrap();

    // Indexer path: the tip has moved ahead so the round falls into the
    // archive span; the tail round from algod is empty.
    let tip = ROUND + 1;
    let algod_at_tip = MockAlgod::new(tip).with_empty_rounds(tip, tip);
    let indexer = MockIndexer::new(
        canonical_top_level(&fixture)
            .into_iter()
            .map(as_indexer_result)
            .collect(),
    );
    let indexer_result = get_subscribed_transactions(
        &SubscriptionParams {
            filters: &filters,
            arc28_groups: &[],
            max_rounds_to_sync: 1,
            max_indexer_rounds_to_sync: None,
            sync_behaviour: SyncBehaviour::CatchupWithIndexer,
            watermark: ROUND - 1,
            current_round: Some(tip),
        },
        &algod_at_tip,
        Some(&indexer),
    )
    .await
    .unwrap();

    let algod_matches = match_set(&algod_result);
    let indexer_matches = match_set(&indexer_result);
    assert_eq!(algod_matches, indexer_matches);

    // Sanity: the fixture exercises both a top-level and an inner match.
    assert_eq!(algod_matches.len(), 3);
    assert!(algod_matches
        .iter()
        .any(|(id, names)| id.contains("/inner/1") && names == &vec!["inner".to_string()]));
}

#[tokio::test]
async fn balance_changes_agree_across_paths() {
    const ROUND: u64 = 50;
    let fixture = fixture_block(ROUND);
    let filters = vec![SubscriberFilter::new("all", TransactionFilter::default())];

    let algod = MockAlgod::new(ROUND).with_block(&fixture);
    let algod_result = get_subscribed_transactions(
        &SubscriptionParams {
            filters: &filters,
            arc28_groups: &[],
            max_rounds_to_sync: 500,
            max_indexer_rounds_to_sync: None,
            sync_behaviour: SyncBehaviour::Fail,
            watermark: ROUND - 1,
            current_round: Some(ROUND),
        },
        &algod,
        None,
    )
    .await
    .unwrap();

    let tip = ROUND + 1;
    let algod_at_tip = MockAlgod::new(tip).with_empty_rounds(tip, tip);
    let indexer = MockIndexer::new(
        canonical_top_level(&fixture)
            .into_iter()
            .map(as_indexer_result)
            .collect(),
    );
    let indexer_result = get_subscribed_transactions(
        &SubscriptionParams {
            filters: &filters,
            arc28_groups: &[],
            max_rounds_to_sync: 1,
            max_indexer_rounds_to_sync: None,
            sync_behaviour: SyncBehaviour::CatchupWithIndexer,
            watermark: ROUND - 1,
            current_round: Some(tip),
        },
        &algod_at_tip,
        Some(&indexer),
    )
    .await
    .unwrap();

    for algod_txn in &algod_result.subscribed_transactions {
        let indexer_txn = indexer_result
            .subscribed_transactions
            .iter()
            .find(|txn| txn.id == algod_txn.id)
            .unwrap();
        assert_eq!(algod_txn.balance_changes, indexer_txn.balance_changes);
    }
}

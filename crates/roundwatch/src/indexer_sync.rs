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

//! Indexer adapter: translates filters into server-side search parameters
//! and restores the matches the server cannot resolve.
//!
//! The server-side projection is only a coarse pre-filter. The full filter
//! is re-evaluated locally over each returned transaction AND its flattened
//! inner transactions, because indexer search returns the top-level parent
//! when an inner transaction matches.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use roundwatch_client::TransactionQuery;
use roundwatch_core::filter::{matches_filter, FilterContext, NamedTransactionFilter, TransactionFilter};
use roundwatch_core::transaction::{SubscribedTransaction, TxnType};

/// The indexer rejects amounts beyond 2^53 - 1.
const MAX_SAFE_AMOUNT: u64 = (1 << 53) - 1;

/// Projects the server-expressible filter fields into search parameters.
///
/// Only scalar fields can be pushed down. `sender` and `receiver` share the
/// single address slot, so when both are set only the receiver is honored
/// server-side; the local re-evaluation makes the result correct either
/// way. Amount bounds are only expressible for payments or when an asset id
/// is given, and are exclusive server-side (hence the off-by-one
/// adjustments).
pub(crate) fn indexer_pre_filter(
    filter: &TransactionFilter,
    min_round: u64,
    max_round: u64,
) -> TransactionQuery {
    let mut query = TransactionQuery::default();

    if let Some(sender) = filter.sender.as_ref().and_then(|spec| spec.as_scalar()) {
        query.address = Some(sender.clone());
        query.address_role = Some("sender".to_string());
    }

    if let Some(receiver) = filter.receiver.as_ref().and_then(|spec| spec.as_scalar()) {
        query.address = Some(receiver.clone());
        query.address_role = Some("receiver".to_string());
    }

    if let Some(txn_type) = filter.txn_type.as_ref().and_then(|spec| spec.as_scalar()) {
        query.txn_type = Some(txn_type.to_string());
    }

    if let Some(prefix) = &filter.note_prefix {
        if !prefix.is_empty() {
            query.note_prefix = Some(BASE64.encode(prefix.as_bytes()));
        }
    }

    if let Some(app_id) = filter.app_id.as_ref().and_then(|spec| spec.as_scalar()) {
        query.application_id = Some(*app_id);
    }

    if let Some(asset_id) = filter.asset_id.as_ref().and_then(|spec| spec.as_scalar()) {
        query.asset_id = Some(*asset_id);
    }

    let type_is_pay = filter
        .txn_type
        .as_ref()
        .and_then(|spec| spec.as_scalar())
        .is_some_and(|txn_type| *txn_type == TxnType::Payment);
    let asset_scoped = query.asset_id.is_some();

    if let Some(min_amount) = filter.min_amount {
        if min_amount > 0 && (type_is_pay || asset_scoped) {
            query.currency_greater_than = Some(min_amount.saturating_sub(1).min(MAX_SAFE_AMOUNT));
        }
    }

    if let Some(max_amount) = filter.max_amount {
        if max_amount > 0 && (type_is_pay || asset_scoped) {
            query.currency_less_than = Some(max_amount.saturating_add(1).min(MAX_SAFE_AMOUNT));
        }
    }

    query.min_round = Some(min_round);
    query.max_round = Some(max_round);
    query
}

/// Assigns synthetic ids and offsets to every inner transaction of an
/// indexer-sourced top-level transaction: children are flattened in
/// pre-order and the k-th descendant gets `parent.id + "/inner/" + k` and
/// `parent.intra_round_offset + k`.
pub(crate) fn patch_inner_transactions(root: &mut SubscribedTransaction) {
    let root_id = root.id.clone();
    let root_offset = root.intra_round_offset.unwrap_or(0);
    let mut k = 0u64;
    patch_children(root, &root_id, root_offset, &mut k);
}

fn patch_children(
    node: &mut SubscribedTransaction,
    root_id: &str,
    root_offset: u64,
    k: &mut u64,
) {
    let Some(children) = node.inner_txns.as_mut() else {
        return;
    };
    let mut children = std::mem::take(children);
    for child in &mut children {
        *k += 1;
        child.id = format!("{root_id}/inner/{k}");
        child.parent_transaction_id = Some(root_id.to_string());
        child.intra_round_offset = Some(root_offset + *k);
        child.confirmed_round = child.confirmed_round.or(node.confirmed_round);
        child.round_time = child.round_time.or(node.round_time);
        patch_children(child, root_id, root_offset, k);
    }
    node.inner_txns = Some(children);
}

/// Re-runs a filter over an indexer-sourced transaction and its flattened
/// inner transactions; returns every transaction that matched, tagged with
/// the filter's name.
pub(crate) fn filter_indexer_transaction(
    root: &SubscribedTransaction,
    named: &NamedTransactionFilter,
    ctx: &FilterContext<'_>,
) -> Vec<SubscribedTransaction> {
    let mut patched = root.clone();
    patch_inner_transactions(&mut patched);

    let mut flattened = Vec::new();
    patched.walk(&mut |txn| flattened.push(txn.clone()));

    flattened.retain(|txn| matches_filter(&named.filter, txn, ctx));
    for txn in &mut flattened {
        txn.filters_matched = vec![named.name.clone()];
    }
    flattened
}

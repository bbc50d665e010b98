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

//! The transaction filter language and its evaluator.
//!
//! A filter is a record of optional predicate fragments over the canonical
//! record; a transaction matches when every specified fragment matches.
//! List-accepting fragments match when the transaction's value is in the
//! list; an empty list leaves the fragment unconstrained.

use crate::arc28::{
    has_matching_arc28_event, Arc28EventFilter, Arc28EventGroup, Arc28EventToProcess, TxnPredicate,
};
use crate::balance::{changes_from_subscribed, BalanceChange, BalanceChangeRole};
use crate::transaction::{OnComplete, SubscribedTransaction, TxnType};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use sha2::{Digest, Sha512_256};

/// A scalar-or-list filter value.
#[derive(Clone, Debug, PartialEq)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T: PartialEq> OneOrMany<T> {
    pub fn contains(&self, value: &T) -> bool {
        match self {
            OneOrMany::One(one) => one == value,
            OneOrMany::Many(many) => many.contains(value),
        }
    }

    /// An empty list constrains nothing.
    pub fn is_unconstrained(&self) -> bool {
        matches!(self, OneOrMany::Many(many) if many.is_empty())
    }

    /// The scalar form, when this is one. Only scalar values are eligible
    /// for server-side push-down.
    pub fn as_scalar(&self) -> Option<&T> {
        match self {
            OneOrMany::One(one) => Some(one),
            OneOrMany::Many(_) => None,
        }
    }
}

impl<T> From<T> for OneOrMany<T> {
    fn from(value: T) -> Self {
        OneOrMany::One(value)
    }
}

impl<T> From<Vec<T>> for OneOrMany<T> {
    fn from(values: Vec<T>) -> Self {
        OneOrMany::Many(values)
    }
}

/// Predicate over an app call's raw argument bytes.
pub type AppArgsPredicate = Box<dyn Fn(&[Vec<u8>]) -> bool + Send + Sync>;

/// The compositional transaction filter: all specified fragments must
/// match.
#[derive(Default)]
pub struct TransactionFilter {
    /// Transaction type(s).
    pub txn_type: Option<OneOrMany<TxnType>>,
    /// Sending address(es).
    pub sender: Option<OneOrMany<String>>,
    /// Receiving address(es) of pay/axfer transactions.
    pub receiver: Option<OneOrMany<String>>,
    /// The note starts with these bytes.
    pub note_prefix: Option<String>,
    /// Called or created app id(s).
    pub app_id: Option<OneOrMany<u64>>,
    /// Whether the transaction creates an app.
    pub app_create: Option<bool>,
    /// Normalized on-complete(s) of an app call.
    pub app_on_complete: Option<OneOrMany<OnComplete>>,
    /// Called, created or transferred asset id(s).
    pub asset_id: Option<OneOrMany<u64>>,
    /// Whether the transaction creates an asset.
    pub asset_create: Option<bool>,
    /// Lower bound (inclusive) on the pay/axfer amount.
    pub min_amount: Option<u64>,
    /// Upper bound (inclusive) on the pay/axfer amount.
    pub max_amount: Option<u64>,
    /// ARC-4 method signature(s); matches when the first app arg is the
    /// method selector.
    pub method_signature: Option<OneOrMany<String>>,
    /// Arbitrary predicate over the app call arguments.
    pub app_call_arguments_match: Option<AppArgsPredicate>,
    /// Emitted ARC-28 event(s); definitions come from the subscription's
    /// event groups.
    pub arc28_events: Option<Vec<Arc28EventFilter>>,
    /// Balance-change predicates; any consolidated change satisfying any
    /// element matches.
    pub balance_changes: Option<Vec<BalanceChangeFilter>>,
    /// Catch-all custom predicate over the canonical record.
    pub custom_filter: Option<TxnPredicate>,
}

/// A filter with the name used to tag its matches.
pub struct NamedTransactionFilter {
    pub name: String,
    pub filter: TransactionFilter,
}

/// One element of the `balance_changes` fragment. Unset (or empty-list)
/// fields are unconstrained.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BalanceChangeFilter {
    pub address: Option<OneOrMany<String>>,
    pub asset_id: Option<OneOrMany<u64>>,
    pub role: Option<OneOrMany<BalanceChangeRole>>,
    /// Signed bound: negative amounts are outflows.
    pub min_amount: Option<i128>,
    pub max_amount: Option<i128>,
    pub min_absolute_amount: Option<u128>,
    pub max_absolute_amount: Option<u128>,
}

/// The ARC-28 catalog the evaluator consults for `arc28_events` fragments.
pub struct FilterContext<'a> {
    pub arc28_events: &'a [Arc28EventToProcess],
    pub arc28_groups: &'a [Arc28EventGroup],
}

impl FilterContext<'static> {
    pub const EMPTY: FilterContext<'static> = FilterContext {
        arc28_events: &[],
        arc28_groups: &[],
    };
}

/// The base64 form of an ARC-4 method selector: the first four bytes of the
/// SHA-512/256 of the method signature.
pub fn method_selector_base64(method_signature: &str) -> String {
    let digest = Sha512_256::digest(method_signature.as_bytes());
    BASE64.encode(&digest[..4])
}

fn constrained<T: PartialEq>(spec: &Option<OneOrMany<T>>) -> Option<&OneOrMany<T>> {
    spec.as_ref().filter(|spec| !spec.is_unconstrained())
}

fn decoded_note(txn: &SubscribedTransaction) -> Vec<u8> {
    txn.note
        .as_deref()
        .and_then(|note| BASE64.decode(note).ok())
        .unwrap_or_default()
}

fn decoded_app_args(txn: &SubscribedTransaction) -> Vec<Vec<u8>> {
    txn.application()
        .map(|app| {
            app.application_args
                .iter()
                .filter_map(|arg| BASE64.decode(arg).ok())
                .collect()
        })
        .unwrap_or_default()
}

/// Evaluates a filter against one canonical transaction.
pub fn matches_filter(
    filter: &TransactionFilter,
    txn: &SubscribedTransaction,
    ctx: &FilterContext<'_>,
) -> bool {
    if let Some(spec) = constrained(&filter.txn_type) {
        if !spec.contains(&txn.tx_type) {
            return false;
        }
    }

    if let Some(spec) = constrained(&filter.sender) {
        if !spec.contains(&txn.sender) {
            return false;
        }
    }

    if let Some(spec) = constrained(&filter.receiver) {
        match txn.receiver() {
            Some(receiver) if spec.contains(&receiver.to_string()) => {}
            _ => return false,
        }
    }

    if let Some(prefix) = &filter.note_prefix {
        if !prefix.is_empty() && !decoded_note(txn).starts_with(prefix.as_bytes()) {
            return false;
        }
    }

    if let Some(spec) = constrained(&filter.app_id) {
        let called = txn.application().map_or(0, |app| app.application_id);
        let created = txn.created_application_index.unwrap_or(0);
        let matched = (called != 0 && spec.contains(&called))
            || (created != 0 && spec.contains(&created));
        if !matched {
            return false;
        }
    }

    if let Some(app_create) = filter.app_create {
        if txn.created_application_index.is_some() != app_create {
            return false;
        }
    }

    if let Some(spec) = constrained(&filter.app_on_complete) {
        match txn.application() {
            Some(app) if spec.contains(&app.on_completion) => {}
            _ => return false,
        }
    }

    if let Some(spec) = constrained(&filter.asset_id) {
        let candidates = [
            txn.created_asset_index.unwrap_or(0),
            txn.asset_config().and_then(|config| config.asset_id).unwrap_or(0),
            txn.asset_transfer().map_or(0, |transfer| transfer.asset_id),
            txn.asset_freeze().map_or(0, |freeze| freeze.asset_id),
        ];
        if !candidates
            .iter()
            .any(|id| *id != 0 && spec.contains(id))
        {
            return false;
        }
    }

    if let Some(asset_create) = filter.asset_create {
        if txn.created_asset_index.is_some() != asset_create {
            return false;
        }
    }

    if let Some(min_amount) = filter.min_amount {
        if txn.transfer_amount() < min_amount {
            return false;
        }
    }

    if let Some(max_amount) = filter.max_amount {
        if txn.transfer_amount() > max_amount {
            return false;
        }
    }

    if let Some(spec) = constrained(&filter.method_signature) {
        let first_arg = txn
            .application()
            .and_then(|app| app.application_args.first());
        let matched = match first_arg {
            Some(arg) => match spec {
                OneOrMany::One(signature) => *arg == method_selector_base64(signature),
                OneOrMany::Many(signatures) => signatures
                    .iter()
                    .any(|signature| *arg == method_selector_base64(signature)),
            },
            None => false,
        };
        if !matched {
            return false;
        }
    }

    if let Some(predicate) = &filter.app_call_arguments_match {
        if !predicate(&decoded_app_args(txn)) {
            return false;
        }
    }

    if let Some(event_filter) = filter.arc28_events.as_ref().filter(|f| !f.is_empty()) {
        let emitted = txn.tx_type == TxnType::ApplicationCall
            && txn.logs.as_ref().is_some_and(|logs| !logs.is_empty())
            && has_matching_arc28_event(txn, ctx.arc28_events, ctx.arc28_groups, event_filter);
        if !emitted {
            return false;
        }
    }

    if let Some(change_filters) = filter.balance_changes.as_ref().filter(|f| !f.is_empty()) {
        let changes = changes_from_subscribed(txn);
        if !has_balance_change_match(&changes, change_filters) {
            return false;
        }
    }

    if let Some(predicate) = &filter.custom_filter {
        if !predicate(txn) {
            return false;
        }
    }

    true
}

/// Whether any of the transaction's consolidated balance changes satisfies
/// any of the given change filters.
pub fn has_balance_change_match(
    changes: &[BalanceChange],
    filters: &[BalanceChangeFilter],
) -> bool {
    filters
        .iter()
        .any(|filter| changes.iter().any(|change| change_matches(change, filter)))
}

fn change_matches(change: &BalanceChange, filter: &BalanceChangeFilter) -> bool {
    if let Some(spec) = constrained(&filter.address) {
        if !spec.contains(&change.address) {
            return false;
        }
    }
    if let Some(spec) = constrained(&filter.asset_id) {
        if !spec.contains(&change.asset_id) {
            return false;
        }
    }
    if let Some(spec) = constrained(&filter.role) {
        if !change.roles.iter().any(|role| spec.contains(role)) {
            return false;
        }
    }
    if let Some(min_amount) = filter.min_amount {
        if change.amount < min_amount {
            return false;
        }
    }
    if let Some(max_amount) = filter.max_amount {
        if change.amount > max_amount {
            return false;
        }
    }
    if let Some(min_absolute) = filter.min_absolute_amount {
        if change.amount.unsigned_abs() < min_absolute {
            return false;
        }
    }
    if let Some(max_absolute) = filter.max_absolute_amount {
        if change.amount.unsigned_abs() > max_absolute {
            return false;
        }
    }
    true
}

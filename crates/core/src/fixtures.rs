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

//! Canonical-record builders shared by the unit tests.

use crate::transaction::{
    ApplicationTransaction, AssetTransferTransaction, PaymentTransaction, SubscribedTransaction,
    TxnPayload, TxnType,
};

pub(crate) fn base_txn(id: &str, tx_type: TxnType, payload: TxnPayload) -> SubscribedTransaction {
    SubscribedTransaction {
        id: id.to_string(),
        tx_type,
        fee: 1000,
        sender: "SENDER".to_string(),
        first_valid: 1,
        last_valid: 1000,
        confirmed_round: Some(1),
        round_time: Some(1_700_000_000),
        intra_round_offset: Some(0),
        genesis_id: None,
        genesis_hash: None,
        group: None,
        note: None,
        lease: None,
        rekey_to: None,
        auth_addr: None,
        closing_amount: None,
        created_asset_index: None,
        created_application_index: None,
        logs: None,
        payload,
        inner_txns: None,
        parent_transaction_id: None,
        filters_matched: vec![],
        balance_changes: vec![],
        arc28_events: vec![],
    }
}

pub(crate) fn payment_txn(id: &str, receiver: &str, amount: u64) -> SubscribedTransaction {
    base_txn(
        id,
        TxnType::Payment,
        TxnPayload::Payment {
            payment: PaymentTransaction {
                amount,
                receiver: receiver.to_string(),
                close_amount: None,
                close_remainder_to: None,
            },
        },
    )
}

pub(crate) fn axfer_txn(id: &str, asset_id: u64, receiver: &str, amount: u64) -> SubscribedTransaction {
    base_txn(
        id,
        TxnType::AssetTransfer,
        TxnPayload::AssetTransfer {
            asset_transfer: AssetTransferTransaction {
                asset_id,
                amount,
                receiver: receiver.to_string(),
                ..Default::default()
            },
        },
    )
}

pub(crate) fn app_call_txn(id: &str, app_id: u64) -> SubscribedTransaction {
    base_txn(
        id,
        TxnType::ApplicationCall,
        TxnPayload::ApplicationCall {
            application: ApplicationTransaction {
                application_id: app_id,
                ..Default::default()
            },
        },
    )
}

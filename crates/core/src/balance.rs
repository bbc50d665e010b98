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

//! Balance-change derivation: the per-(address, asset) deltas implied by a
//! single transaction's effects.
//!
//! Two derivations exist, one over the raw block form and one over the
//! canonical record, because transactions reach the pipeline in both shapes.
//! They must produce the same logical output for the same transaction; the
//! tests hold them to that.

use crate::address::Address;
use crate::block::BlockTxn;
use crate::transaction::{SubscribedTransaction, TxnType};
use serde::{Deserialize, Serialize};

/// The capacities in which an account participated in a balance change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BalanceChangeRole {
    Sender,
    Receiver,
    CloseTo,
    AssetCreator,
    AssetDestroyer,
}

/// A derived, per-(address, asset) delta for one transaction. `asset_id`
/// zero means microalgos.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BalanceChange {
    pub address: String,
    pub asset_id: u64,
    /// Signed amount in the asset's smallest unit; negative is outflow.
    pub amount: i128,
    pub roles: Vec<BalanceChangeRole>,
}

fn change(
    address: String,
    asset_id: u64,
    amount: i128,
    role: BalanceChangeRole,
) -> BalanceChange {
    BalanceChange {
        address,
        asset_id,
        amount,
        roles: vec![role],
    }
}

/// Groups changes by (address, asset), summing amounts and merging role
/// sets. A single account acting as both sender and close-to target ends up
/// with one entry covering both capacities.
fn consolidate(changes: Vec<BalanceChange>) -> Vec<BalanceChange> {
    let mut consolidated: Vec<BalanceChange> = Vec::with_capacity(changes.len());
    for change in changes {
        match consolidated
            .iter_mut()
            .find(|c| c.address == change.address && c.asset_id == change.asset_id)
        {
            Some(existing) => {
                existing.amount += change.amount;
                for role in change.roles {
                    if !existing.roles.contains(&role) {
                        existing.roles.push(role);
                    }
                }
            }
            None => consolidated.push(change),
        }
    }
    consolidated
}

/// Derives balance changes from a transaction in its raw block form. Does
/// not recurse into inner transactions.
pub fn changes_from_block_txn(raw: &BlockTxn) -> Vec<BalanceChange> {
    let txn = &raw.txn;
    let sender = txn.sender.unwrap_or(Address::ZERO).to_string();
    let mut changes = Vec::new();

    if txn.fee > 0 {
        changes.push(change(
            sender.clone(),
            0,
            -(txn.fee as i128),
            BalanceChangeRole::Sender,
        ));
    }

    match txn.txn_type {
        Some(TxnType::Payment) => {
            changes.push(change(
                sender.clone(),
                0,
                -(txn.amount as i128),
                BalanceChangeRole::Sender,
            ));
            changes.push(change(
                txn.receiver.unwrap_or(Address::ZERO).to_string(),
                0,
                txn.amount as i128,
                BalanceChangeRole::Receiver,
            ));
            if let Some(close_to) = txn.close_remainder_to {
                let closing = raw.ca.unwrap_or(0) as i128;
                changes.push(change(
                    close_to.to_string(),
                    0,
                    closing,
                    BalanceChangeRole::CloseTo,
                ));
                changes.push(change(sender.clone(), 0, -closing, BalanceChangeRole::Sender));
            }
        }
        Some(TxnType::AssetTransfer) if txn.xfer_asset_id != 0 => {
            let asset_id = txn.xfer_asset_id;
            // Clawback transfers debit the asset sender, not the signer.
            let effective_sender = txn.asset_sender.or(txn.sender).unwrap_or(Address::ZERO);
            changes.push(change(
                effective_sender.to_string(),
                asset_id,
                -(txn.asset_amount as i128),
                BalanceChangeRole::Sender,
            ));
            changes.push(change(
                txn.asset_receiver.unwrap_or(Address::ZERO).to_string(),
                asset_id,
                txn.asset_amount as i128,
                BalanceChangeRole::Receiver,
            ));
            if let Some(close_to) = txn.asset_close_to {
                let closing = raw.aca.unwrap_or(0) as i128;
                changes.push(change(
                    close_to.to_string(),
                    asset_id,
                    closing,
                    BalanceChangeRole::CloseTo,
                ));
                changes.push(change(
                    effective_sender.to_string(),
                    asset_id,
                    -closing,
                    BalanceChangeRole::Sender,
                ));
            }
        }
        Some(TxnType::AssetConfig) => {
            if txn.config_asset_id == 0 {
                if let Some(created) = raw.caid {
                    let total = txn.asset_params.as_ref().map_or(0, |params| params.total);
                    changes.push(change(
                        sender.clone(),
                        created,
                        total as i128,
                        BalanceChangeRole::AssetCreator,
                    ));
                }
            } else if txn.asset_params.is_none() {
                changes.push(change(
                    sender.clone(),
                    txn.config_asset_id,
                    0,
                    BalanceChangeRole::AssetDestroyer,
                ));
            }
        }
        _ => {}
    }

    consolidate(changes)
}

/// Derives balance changes from a transaction in the canonical record form.
/// Does not recurse into inner transactions.
pub fn changes_from_subscribed(txn: &SubscribedTransaction) -> Vec<BalanceChange> {
    let mut changes = Vec::new();

    if txn.fee > 0 {
        changes.push(change(
            txn.sender.clone(),
            0,
            -(txn.fee as i128),
            BalanceChangeRole::Sender,
        ));
    }

    if let Some(payment) = txn.payment() {
        changes.push(change(
            txn.sender.clone(),
            0,
            -(payment.amount as i128),
            BalanceChangeRole::Sender,
        ));
        changes.push(change(
            payment.receiver.clone(),
            0,
            payment.amount as i128,
            BalanceChangeRole::Receiver,
        ));
        if let Some(close_to) = &payment.close_remainder_to {
            let closing = payment.close_amount.unwrap_or(0) as i128;
            changes.push(change(
                close_to.clone(),
                0,
                closing,
                BalanceChangeRole::CloseTo,
            ));
            changes.push(change(
                txn.sender.clone(),
                0,
                -closing,
                BalanceChangeRole::Sender,
            ));
        }
    }

    if let Some(transfer) = txn.asset_transfer() {
        if transfer.asset_id != 0 {
            let effective_sender = transfer.sender.clone().unwrap_or_else(|| txn.sender.clone());
            changes.push(change(
                effective_sender.clone(),
                transfer.asset_id,
                -(transfer.amount as i128),
                BalanceChangeRole::Sender,
            ));
            changes.push(change(
                transfer.receiver.clone(),
                transfer.asset_id,
                transfer.amount as i128,
                BalanceChangeRole::Receiver,
            ));
            if let Some(close_to) = &transfer.close_to {
                let closing = transfer.close_amount.unwrap_or(0) as i128;
                changes.push(change(
                    close_to.clone(),
                    transfer.asset_id,
                    closing,
                    BalanceChangeRole::CloseTo,
                ));
                changes.push(change(
                    effective_sender,
                    transfer.asset_id,
                    -closing,
                    BalanceChangeRole::Sender,
                ));
            }
        }
    }

    if let Some(config) = txn.asset_config() {
        if config.asset_id.is_none() {
            if let Some(created) = txn.created_asset_index {
                let total = config.params.as_ref().map_or(0, |params| params.total);
                changes.push(change(
                    txn.sender.clone(),
                    created,
                    total as i128,
                    BalanceChangeRole::AssetCreator,
                ));
            }
        } else if config.params.is_none() {
            changes.push(change(
                txn.sender.clone(),
                config.asset_id.unwrap_or(0),
                0,
                BalanceChangeRole::AssetDestroyer,
            ));
        }
    }

    consolidate(changes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{AssetParamsFields, Block, TxnFields};
    use crate::normalize::{block_transactions, to_subscribed_transaction};

    const FEE: u64 = 2000;

    fn sender() -> Address {
        Address::new([1u8; 32])
    }

    fn receiver() -> Address {
        Address::new([2u8; 32])
    }

    fn base_txn(tx_type: TxnType) -> TxnFields {
        TxnFields {
            sender: Some(sender()),
            fee: FEE,
            first_valid: 1,
            last_valid: 1000,
            txn_type: Some(tx_type),
            ..Default::default()
        }
    }

    fn block_with(txn: BlockTxn) -> Block {
        Block {
            rnd: 1,
            ts: 1_700_000_000,
            gen: "testnet-v1.0".to_string(),
            gh: crate::block::HashDigest([3u8; 32]),
            txns: vec![txn],
            ..Default::default()
        }
    }

    fn assert_paths_agree(raw: BlockTxn) -> Vec<BalanceChange> {
        let from_block = changes_from_block_txn(&raw);
        let block = block_with(raw);
        let entries = block_transactions(&block).unwrap();
        let subscribed = to_subscribed_transaction(&entries[0], None).unwrap();
        let from_canonical = changes_from_subscribed(&subscribed);
        assert_eq!(from_block, from_canonical);
        from_block
    }

    #[test]
    fn payment_produces_symmetric_changes() {
        let mut txn = base_txn(TxnType::Payment);
        txn.amount = 5_000_000;
        txn.receiver = Some(receiver());
        let changes = assert_paths_agree(BlockTxn {
            txn,
            ..Default::default()
        });

        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].address, sender().to_string());
        assert_eq!(changes[0].amount, -(FEE as i128) - 5_000_000);
        assert_eq!(changes[0].roles, vec![BalanceChangeRole::Sender]);
        assert_eq!(changes[1].address, receiver().to_string());
        assert_eq!(changes[1].amount, 5_000_000);
        assert_eq!(changes[1].roles, vec![BalanceChangeRole::Receiver]);
    }

    #[test]
    fn close_to_consolidates_roles_for_same_account() {
        // Close the remainder back to the receiver: the receiver account
        // participates both as Receiver and CloseTo and must come out as a
        // single consolidated entry.
        let mut txn = base_txn(TxnType::Payment);
        txn.amount = 1_000;
        txn.receiver = Some(receiver());
        txn.close_remainder_to = Some(receiver());
        let changes = assert_paths_agree(BlockTxn {
            txn,
            ca: Some(9_000),
            ..Default::default()
        });

        assert_eq!(changes.len(), 2);
        let closed = &changes[1];
        assert_eq!(closed.address, receiver().to_string());
        assert_eq!(closed.amount, 10_000);
        assert_eq!(
            closed.roles,
            vec![BalanceChangeRole::Receiver, BalanceChangeRole::CloseTo]
        );
        // The sender loses fee + amount + closing amount.
        assert_eq!(changes[0].amount, -(FEE as i128) - 1_000 - 9_000);
    }

    #[test]
    fn clawback_debits_the_asset_sender() {
        let clawback_target = Address::new([7u8; 32]);
        let mut txn = base_txn(TxnType::AssetTransfer);
        txn.xfer_asset_id = 77;
        txn.asset_amount = 250;
        txn.asset_sender = Some(clawback_target);
        txn.asset_receiver = Some(receiver());
        let changes = assert_paths_agree(BlockTxn {
            txn,
            ..Default::default()
        });

        // Fee from the signing sender, asset movement from the clawback
        // target.
        assert_eq!(changes.len(), 3);
        assert_eq!(changes[0].address, sender().to_string());
        assert_eq!(changes[0].asset_id, 0);
        assert_eq!(changes[0].amount, -(FEE as i128));
        assert_eq!(changes[1].address, clawback_target.to_string());
        assert_eq!(changes[1].asset_id, 77);
        assert_eq!(changes[1].amount, -250);
        assert_eq!(changes[2].address, receiver().to_string());
        assert_eq!(changes[2].amount, 250);
    }

    #[test]
    fn asset_create_credits_the_creator_with_total_supply() {
        let mut txn = base_txn(TxnType::AssetConfig);
        txn.asset_params = Some(AssetParamsFields {
            total: 1_000_000,
            decimals: 0,
            ..Default::default()
        });
        let changes = assert_paths_agree(BlockTxn {
            txn,
            caid: Some(1234),
            ..Default::default()
        });

        assert_eq!(
            changes,
            vec![
                BalanceChange {
                    address: sender().to_string(),
                    asset_id: 0,
                    amount: -(FEE as i128),
                    roles: vec![BalanceChangeRole::Sender],
                },
                BalanceChange {
                    address: sender().to_string(),
                    asset_id: 1234,
                    amount: 1_000_000,
                    roles: vec![BalanceChangeRole::AssetCreator],
                },
            ]
        );
    }

    #[test]
    fn asset_destroy_marks_the_destroyer_with_zero_amount() {
        let mut txn = base_txn(TxnType::AssetConfig);
        txn.config_asset_id = 1234;
        let changes = assert_paths_agree(BlockTxn {
            txn,
            ..Default::default()
        });

        assert_eq!(
            changes,
            vec![
                BalanceChange {
                    address: sender().to_string(),
                    asset_id: 0,
                    amount: -(FEE as i128),
                    roles: vec![BalanceChangeRole::Sender],
                },
                BalanceChange {
                    address: sender().to_string(),
                    asset_id: 1234,
                    amount: 0,
                    roles: vec![BalanceChangeRole::AssetDestroyer],
                },
            ]
        );
    }

    #[test]
    fn payment_conserves_value_modulo_fee() {
        let mut txn = base_txn(TxnType::Payment);
        txn.amount = 123_456;
        txn.receiver = Some(receiver());
        txn.close_remainder_to = Some(Address::new([5u8; 32]));
        let changes = assert_paths_agree(BlockTxn {
            txn,
            ca: Some(50_000),
            ..Default::default()
        });

        let sum: i128 = changes
            .iter()
            .filter(|c| c.asset_id == 0)
            .map(|c| c.amount)
            .sum();
        assert_eq!(sum, -(FEE as i128));
    }

    #[test]
    fn inner_transaction_without_fee_has_no_fee_change() {
        let mut txn = base_txn(TxnType::Payment);
        txn.fee = 0;
        txn.amount = 10;
        txn.receiver = Some(receiver());
        let changes = changes_from_block_txn(&BlockTxn {
            txn,
            ..Default::default()
        });
        assert!(changes
            .iter()
            .all(|change| change.amount != -(FEE as i128)));
        assert_eq!(changes.len(), 2);
    }
}

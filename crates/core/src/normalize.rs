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

//! Block normalization: turns a raw block into a flat, depth-first pre-order
//! sequence of transactions (inner transactions included) and converts any
//! of those into the canonical record.
//!
//! Offsets and synthetic ids follow the block layout: one round-scoped
//! counter drives `round_offset` across the whole payset, and one counter
//! per top-level transaction drives the `/inner/k` sequence for every
//! descendant, however deeply nested.

use crate::address::Address;
use crate::block::{
    compute_txid, Block, BlockTxn, HashDigest, MerkleArrayProofFields, TxnFields,
};
use crate::error::CoreError;
use crate::transaction::{
    ApplicationTransaction, AssetConfigTransaction, AssetFreezeTransaction, AssetParams,
    AssetTransferTransaction, HashFactory, HeartbeatProof, HeartbeatTransaction,
    KeyregTransaction, MerkleArrayProof, MerkleSignature, OnComplete, PaymentTransaction,
    StateProofData, StateProofMessage, StateProofParticipant, StateProofReveal,
    StateProofSigSlot, StateProofTransaction, StateProofVerifier, SubscribedTransaction,
    TxnPayload, TxnType,
};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_bytes::ByteBuf;

/// One transaction (top-level or inner) located inside a block, with the
/// positioning data the pipeline needs.
#[derive(Clone, Debug)]
pub struct TxnInBlock<'a> {
    pub raw: &'a BlockTxn,
    /// Canonical hash id for top-level entries, `parent/inner/k` for inner
    /// ones.
    pub id: String,
    /// Index of this transaction's ultimate top-level parent in the payset.
    pub round_index: usize,
    /// Depth-first pre-order offset within the round, inner included.
    pub round_offset: u64,
    /// Pre-order position among the top-level parent's descendants
    /// (0-based), present iff this is an inner transaction.
    pub parent_offset: Option<u64>,
    /// Id of the ultimate top-level parent, present iff inner.
    pub parent_txn_id: Option<String>,
    pub round_number: u64,
    pub round_timestamp: u64,
    pub genesis_id: &'a str,
    pub genesis_hash: HashDigest,
}

/// Flattens a block's payset in depth-first pre-order, computing ids and
/// offsets for every transaction and inner transaction.
pub fn block_transactions(block: &Block) -> Result<Vec<TxnInBlock<'_>>, CoreError> {
    let mut entries = Vec::new();
    let mut round_offset = 0u64;

    for (round_index, txn) in block.txns.iter().enumerate() {
        let txid = compute_txid(&normalized_fields(txn, block.gh, &block.gen))?;

        entries.push(TxnInBlock {
            raw: txn,
            id: txid.clone(),
            round_index,
            round_offset,
            parent_offset: None,
            parent_txn_id: None,
            round_number: block.rnd,
            round_timestamp: block.ts,
            genesis_id: &block.gen,
            genesis_hash: block.gh,
        });
        round_offset += 1;

        let mut parent_offset = 0u64;
        if let Some(dt) = &txn.dt {
            for inner in &dt.inner_txns {
                push_inner(
                    &mut entries,
                    inner,
                    block,
                    round_index,
                    &txid,
                    &mut round_offset,
                    &mut parent_offset,
                );
            }
        }
    }

    Ok(entries)
}

fn push_inner<'a>(
    entries: &mut Vec<TxnInBlock<'a>>,
    txn: &'a BlockTxn,
    block: &'a Block,
    round_index: usize,
    root_txid: &str,
    round_offset: &mut u64,
    parent_offset: &mut u64,
) {
    let offset = *parent_offset;
    *parent_offset += 1;

    entries.push(TxnInBlock {
        raw: txn,
        id: format!("{}/inner/{}", root_txid, offset + 1),
        round_index,
        round_offset: *round_offset,
        parent_offset: Some(offset),
        parent_txn_id: Some(root_txid.to_string()),
        round_number: block.rnd,
        round_timestamp: block.ts,
        genesis_id: &block.gen,
        genesis_hash: block.gh,
    });
    *round_offset += 1;

    if let Some(dt) = &txn.dt {
        for inner in &dt.inner_txns {
            push_inner(
                entries,
                inner,
                block,
                round_index,
                root_txid,
                round_offset,
                parent_offset,
            );
        }
    }
}

/// Applies the block-level normalizations to a transaction's fields: inject
/// the genesis id/hash when the corresponding flags say so, and substitute
/// the zero address for a missing receiver on pay/axfer.
fn normalized_fields(raw: &BlockTxn, genesis_hash: HashDigest, genesis_id: &str) -> TxnFields {
    let mut txn = raw.txn.clone();
    if raw.hgi {
        txn.genesis_id = Some(genesis_id.to_string());
    }
    if raw.hgh.is_none() {
        txn.genesis_hash = Some(genesis_hash);
    }
    match txn.txn_type {
        Some(TxnType::Payment) if txn.receiver.is_none() => {
            txn.receiver = Some(Address::ZERO);
        }
        Some(TxnType::AssetTransfer) if txn.asset_receiver.is_none() => {
            txn.asset_receiver = Some(Address::ZERO);
        }
        _ => {}
    }
    txn
}

/// Converts one located transaction into the canonical record, materializing
/// its nested inner transactions with ids and offsets consistent with the
/// block layout.
pub fn to_subscribed_transaction(
    entry: &TxnInBlock<'_>,
    filter_name: Option<&str>,
) -> Result<SubscribedTransaction, CoreError> {
    let root_id = entry
        .parent_txn_id
        .clone()
        .unwrap_or_else(|| entry.id.clone());
    let mut next_offset = entry.round_offset;
    let mut next_k = entry.parent_offset.map_or(0, |offset| offset + 1);

    let mut txn = build_subscribed(
        entry.raw,
        entry,
        entry.id.clone(),
        entry.parent_txn_id.clone(),
        entry.round_offset,
        &root_id,
        &mut next_offset,
        &mut next_k,
    )?;
    if let Some(name) = filter_name {
        txn.filters_matched = vec![name.to_string()];
    }
    Ok(txn)
}

#[allow(clippy::too_many_arguments)]
fn build_subscribed(
    raw: &BlockTxn,
    entry: &TxnInBlock<'_>,
    id: String,
    parent_txn_id: Option<String>,
    intra_round_offset: u64,
    root_id: &str,
    next_offset: &mut u64,
    next_k: &mut u64,
) -> Result<SubscribedTransaction, CoreError> {
    let txn = normalized_fields(raw, entry.genesis_hash, entry.genesis_id);
    let tx_type = txn
        .txn_type
        .ok_or(CoreError::MissingTxnType(intra_round_offset as usize))?;

    let payload = build_payload(&txn, raw, tx_type)?;

    let logs = raw.dt.as_ref().and_then(|dt| {
        if dt.logs.is_empty() {
            None
        } else {
            Some(dt.logs.iter().map(|log| BASE64.encode(log)).collect())
        }
    });

    let mut inner_txns = Vec::new();
    if let Some(dt) = &raw.dt {
        for inner in &dt.inner_txns {
            *next_offset += 1;
            *next_k += 1;
            let inner_id = format!("{}/inner/{}", root_id, *next_k);
            inner_txns.push(build_subscribed(
                inner,
                entry,
                inner_id,
                Some(root_id.to_string()),
                *next_offset,
                root_id,
                next_offset,
                next_k,
            )?);
        }
    }

    Ok(SubscribedTransaction {
        id,
        tx_type,
        fee: txn.fee,
        sender: address_string(&txn.sender),
        first_valid: txn.first_valid,
        last_valid: txn.last_valid,
        confirmed_round: Some(entry.round_number),
        round_time: Some(entry.round_timestamp),
        intra_round_offset: Some(intra_round_offset),
        genesis_id: txn.genesis_id.clone(),
        genesis_hash: txn.genesis_hash.map(|gh| gh.to_base64()),
        group: txn.group.map(|group| BASE64.encode(group.0)),
        note: Some(b64_or_empty(txn.note.as_ref())),
        lease: Some(txn.lease.map(|lease| BASE64.encode(lease.0)).unwrap_or_default()),
        rekey_to: txn.rekey_to.map(|address| address.to_string()),
        auth_addr: raw.sgnr.map(|address| address.to_string()),
        closing_amount: raw.ca,
        created_asset_index: raw.caid,
        created_application_index: raw.apid,
        logs,
        payload,
        inner_txns: if inner_txns.is_empty() {
            None
        } else {
            Some(inner_txns)
        },
        parent_transaction_id: parent_txn_id,
        filters_matched: vec![],
        balance_changes: vec![],
        arc28_events: vec![],
    })
}

fn build_payload(
    txn: &TxnFields,
    raw: &BlockTxn,
    tx_type: TxnType,
) -> Result<TxnPayload, CoreError> {
    let payload = match tx_type {
        TxnType::Payment => TxnPayload::Payment {
            payment: PaymentTransaction {
                amount: txn.amount,
                receiver: address_string(&txn.receiver),
                close_amount: raw.ca,
                close_remainder_to: txn.close_remainder_to.map(|address| address.to_string()),
            },
        },
        TxnType::AssetTransfer => TxnPayload::AssetTransfer {
            asset_transfer: AssetTransferTransaction {
                asset_id: txn.xfer_asset_id,
                amount: txn.asset_amount,
                receiver: address_string(&txn.asset_receiver),
                sender: txn.asset_sender.map(|address| address.to_string()),
                close_amount: raw.aca,
                close_to: txn.asset_close_to.map(|address| address.to_string()),
            },
        },
        TxnType::AssetFreeze => TxnPayload::AssetFreeze {
            asset_freeze: AssetFreezeTransaction {
                address: address_string(&txn.freeze_account),
                asset_id: txn.freeze_asset_id,
                new_freeze_status: txn.freeze_status,
            },
        },
        TxnType::AssetConfig => TxnPayload::AssetConfig {
            asset_config: AssetConfigTransaction {
                asset_id: if txn.config_asset_id == 0 {
                    None
                } else {
                    Some(txn.config_asset_id)
                },
                params: txn.asset_params.as_ref().map(|params| AssetParams {
                    creator: address_string(&txn.sender),
                    decimals: params.decimals,
                    total: params.total,
                    clawback: params.clawback.map(|address| address.to_string()),
                    default_frozen: Some(params.default_frozen),
                    freeze: params.freeze.map(|address| address.to_string()),
                    manager: params.manager.map(|address| address.to_string()),
                    metadata_hash: params.metadata_hash.as_ref().map(|hash| BASE64.encode(hash)),
                    name: params.asset_name.clone(),
                    reserve: params.reserve.map(|address| address.to_string()),
                    unit_name: params.unit_name.clone(),
                    url: params.url.clone(),
                }),
            },
        },
        TxnType::ApplicationCall => TxnPayload::ApplicationCall {
            application: ApplicationTransaction {
                application_id: txn.app_id,
                on_completion: OnComplete::from_algod(txn.on_complete)?,
                application_args: txn
                    .app_args
                    .iter()
                    .map(|arg| BASE64.encode(arg))
                    .collect(),
                accounts: txn
                    .accounts
                    .iter()
                    .map(|address| address.to_string())
                    .collect(),
                foreign_apps: txn.foreign_apps.clone(),
                foreign_assets: txn.foreign_assets.clone(),
                approval_program: txn.approval_program.as_ref().map(|p| BASE64.encode(p)),
                clear_state_program: txn.clear_program.as_ref().map(|p| BASE64.encode(p)),
                extra_program_pages: if txn.extra_pages == 0 {
                    None
                } else {
                    Some(txn.extra_pages)
                },
            },
        },
        TxnType::KeyRegistration => TxnPayload::KeyRegistration {
            keyreg: KeyregTransaction {
                non_participation: Some(txn.non_participation),
                selection_participation_key: txn.selection_key.as_ref().map(|k| BASE64.encode(k)),
                state_proof_key: txn.state_proof_key.as_ref().map(|k| BASE64.encode(k)),
                vote_first_valid: Some(txn.vote_first),
                vote_key_dilution: Some(txn.vote_key_dilution),
                vote_last_valid: Some(txn.vote_last),
                vote_participation_key: txn.vote_key.as_ref().map(|k| BASE64.encode(k)),
            },
        },
        TxnType::StateProof => TxnPayload::StateProof {
            state_proof: Box::new(build_state_proof(txn)),
        },
        TxnType::Heartbeat => {
            let hb = txn.heartbeat.clone().unwrap_or_default();
            TxnPayload::Heartbeat {
                heartbeat: HeartbeatTransaction {
                    hb_address: address_string(&hb.address),
                    hb_key_dilution: hb.key_dilution,
                    hb_proof: hb.proof.as_ref().map(|proof| HeartbeatProof {
                        hb_pk: proof.pk.as_ref().map(|b| BASE64.encode(b)),
                        hb_pk1_sig: proof.pk1_sig.as_ref().map(|b| BASE64.encode(b)),
                        hb_pk2: proof.pk2.as_ref().map(|b| BASE64.encode(b)),
                        hb_pk2_sig: proof.pk2_sig.as_ref().map(|b| BASE64.encode(b)),
                        hb_sig: proof.sig.as_ref().map(|b| BASE64.encode(b)),
                    }),
                    hb_seed: hb.seed.as_ref().map(|b| BASE64.encode(b)),
                    hb_vote_id: hb.vote_id.as_ref().map(|b| BASE64.encode(b)),
                },
            }
        }
    };
    Ok(payload)
}

fn build_state_proof(txn: &TxnFields) -> StateProofTransaction {
    let sp = txn.state_proof.clone().unwrap_or_default();
    let msg = txn.state_proof_message.clone().unwrap_or_default();

    let reveals = sp
        .reveals
        .iter()
        .map(|(position, reveal)| {
            let participant = reveal.participant.clone().unwrap_or_default();
            let verifier = participant.verifier.unwrap_or_default();
            let sig_slot = reveal.sig_slot.clone().unwrap_or_default();
            let signature = sig_slot.signature.unwrap_or_default();
            StateProofReveal {
                position: *position,
                participant: StateProofParticipant {
                    weight: participant.weight,
                    verifier: StateProofVerifier {
                        commitment: b64_or_empty(verifier.commitment.as_ref()),
                        key_lifetime: verifier.key_lifetime,
                    },
                },
                sig_slot: StateProofSigSlot {
                    lower_sig_weight: sig_slot.lower_sig_weight,
                    signature: MerkleSignature {
                        falcon_signature: b64_or_empty(signature.falcon_signature.as_ref()),
                        merkle_array_index: signature.merkle_array_index,
                        proof: merkle_proof(signature.proof.as_ref()),
                        verifying_key: b64_or_empty(
                            signature
                                .verifying_key
                                .as_ref()
                                .and_then(|vkey| vkey.key.as_ref()),
                        ),
                    },
                },
            }
        })
        .collect();

    StateProofTransaction {
        message: StateProofMessage {
            block_headers_commitment: b64_or_empty(msg.block_headers_commitment.as_ref()),
            first_attested_round: msg.first_attested_round,
            latest_attested_round: msg.last_attested_round,
            ln_proven_weight: msg.ln_proven_weight,
            voters_commitment: b64_or_empty(msg.voters_commitment.as_ref()),
        },
        state_proof: StateProofData {
            part_proofs: merkle_proof(sp.part_proofs.as_ref()),
            positions_to_reveal: sp.positions_to_reveal.clone(),
            reveals,
            salt_version: sp.salt_version,
            sig_commit: b64_or_empty(sp.sig_commit.as_ref()),
            sig_proofs: merkle_proof(sp.sig_proofs.as_ref()),
            signed_weight: sp.signed_weight,
        },
        state_proof_type: txn.state_proof_type,
    }
}

fn merkle_proof(proof: Option<&MerkleArrayProofFields>) -> MerkleArrayProof {
    let proof = proof.cloned().unwrap_or_default();
    MerkleArrayProof {
        hash_factory: HashFactory {
            hash_type: proof
                .hash_factory
                .as_ref()
                .map_or(0, |factory| factory.hash_type),
        },
        path: proof.path.iter().map(|node| BASE64.encode(node)).collect(),
        tree_depth: proof.tree_depth,
    }
}

fn address_string(address: &Option<Address>) -> String {
    address.unwrap_or(Address::ZERO).to_string()
}

fn b64_or_empty(bytes: Option<&ByteBuf>) -> String {
    bytes.map(|b| BASE64.encode(b)).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::EvalDelta;

    fn pay_txn(sender: u8, amount: u64) -> BlockTxn {
        BlockTxn {
            txn: TxnFields {
                sender: Some(Address::new([sender; 32])),
                receiver: Some(Address::new([2u8; 32])),
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

    fn inner_pay(amount: u64) -> BlockTxn {
        BlockTxn {
            txn: TxnFields {
                sender: Some(Address::new([9u8; 32])),
                receiver: Some(Address::new([2u8; 32])),
                amount,
                txn_type: Some(TxnType::Payment),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn app_call(app_id: u64, inner: Vec<BlockTxn>) -> BlockTxn {
        BlockTxn {
            txn: TxnFields {
                sender: Some(Address::new([1u8; 32])),
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

    fn block_with(txns: Vec<BlockTxn>) -> Block {
        Block {
            rnd: 12345,
            ts: 1_700_000_000,
            gen: "testnet-v1.0".to_string(),
            gh: HashDigest([3u8; 32]),
            txns,
            ..Default::default()
        }
    }

    /// Top-level app call with five inner transactions, two of which are
    /// nested under an inner app call.
    fn nested_block() -> Block {
        let inner_app = app_call(50, vec![inner_pay(30), inner_pay(40)]);
        let top = app_call(
            10,
            vec![inner_pay(10), inner_app, inner_pay(50)],
        );
        block_with(vec![top, pay_txn(8, 777)])
    }

    #[test]
    fn flattening_is_preorder_with_shared_counters() {
        let block = nested_block();
        let entries = block_transactions(&block).unwrap();
        assert_eq!(entries.len(), 7);

        let offsets: Vec<u64> = entries.iter().map(|entry| entry.round_offset).collect();
        assert_eq!(offsets, vec![0, 1, 2, 3, 4, 5, 6]);

        let indexes: Vec<usize> = entries.iter().map(|entry| entry.round_index).collect();
        assert_eq!(indexes, vec![0, 0, 0, 0, 0, 0, 1]);

        let root = &entries[0].id;
        assert_eq!(entries[1].id, format!("{root}/inner/1"));
        assert_eq!(entries[2].id, format!("{root}/inner/2"));
        // Nested children keep incrementing the same counter.
        assert_eq!(entries[3].id, format!("{root}/inner/3"));
        assert_eq!(entries[4].id, format!("{root}/inner/4"));
        assert_eq!(entries[5].id, format!("{root}/inner/5"));
        assert!(entries[6].parent_txn_id.is_none());

        for entry in &entries[1..6] {
            assert_eq!(entry.parent_txn_id.as_deref(), Some(root.as_str()));
        }
    }

    #[test]
    fn conversion_materializes_nested_inner_transactions() {
        let block = nested_block();
        let entries = block_transactions(&block).unwrap();

        let top = to_subscribed_transaction(&entries[0], Some("main")).unwrap();
        assert_eq!(top.filters_matched, vec!["main".to_string()]);
        assert_eq!(top.confirmed_round, Some(12345));
        assert_eq!(top.intra_round_offset, Some(0));

        let inner = top.inner_txns.as_ref().unwrap();
        assert_eq!(inner.len(), 3);
        assert_eq!(inner[0].id, format!("{}/inner/1", top.id));
        assert_eq!(inner[0].intra_round_offset, Some(1));
        assert_eq!(inner[1].id, format!("{}/inner/2", top.id));

        let nested = inner[1].inner_txns.as_ref().unwrap();
        assert_eq!(nested[0].id, format!("{}/inner/3", top.id));
        assert_eq!(nested[0].intra_round_offset, Some(3));
        assert_eq!(nested[1].id, format!("{}/inner/4", top.id));
        assert_eq!(nested[1].intra_round_offset, Some(4));

        assert_eq!(inner[2].id, format!("{}/inner/5", top.id));
        assert_eq!(inner[2].intra_round_offset, Some(5));
        assert_eq!(
            inner[2].parent_transaction_id.as_deref(),
            Some(top.id.as_str())
        );
        // Inner transactions carry no fee.
        assert_eq!(inner[2].fee, 0);
    }

    #[test]
    fn conversion_of_inner_entry_continues_the_shared_counter() {
        let block = nested_block();
        let entries = block_transactions(&block).unwrap();

        // entries[2] is the inner app call (k = 2), whose children are k = 3
        // and k = 4.
        let inner_app = to_subscribed_transaction(&entries[2], None).unwrap();
        let root = entries[0].id.as_str();
        assert_eq!(inner_app.id, format!("{root}/inner/2"));
        let children = inner_app.inner_txns.as_ref().unwrap();
        assert_eq!(children[0].id, format!("{root}/inner/3"));
        assert_eq!(children[1].id, format!("{root}/inner/4"));
        assert_eq!(children[0].intra_round_offset, Some(3));
    }

    #[test]
    fn genesis_injection_follows_block_flags() {
        let mut txn = pay_txn(1, 500);
        txn.hgi = true;
        txn.hgh = None;
        let block = block_with(vec![txn]);
        let entries = block_transactions(&block).unwrap();
        let subscribed = to_subscribed_transaction(&entries[0], None).unwrap();
        assert_eq!(subscribed.genesis_id.as_deref(), Some("testnet-v1.0"));
        assert_eq!(
            subscribed.genesis_hash.as_deref(),
            Some(BASE64.encode([3u8; 32]).as_str())
        );
    }

    #[test]
    fn missing_receiver_becomes_zero_address() {
        let mut txn = pay_txn(1, 500);
        txn.txn.receiver = None;
        let block = block_with(vec![txn]);
        let entries = block_transactions(&block).unwrap();
        let subscribed = to_subscribed_transaction(&entries[0], None).unwrap();
        assert_eq!(
            subscribed.payment().unwrap().receiver,
            Address::ZERO.to_string()
        );
    }

    #[test]
    fn logs_are_exposed_base64_encoded() {
        let mut txn = app_call(10, vec![]);
        txn.dt = Some(EvalDelta {
            logs: vec![ByteBuf::from(b"log-entry".to_vec())],
            ..Default::default()
        });
        let block = block_with(vec![txn]);
        let entries = block_transactions(&block).unwrap();
        let subscribed = to_subscribed_transaction(&entries[0], None).unwrap();
        assert_eq!(
            subscribed.logs,
            Some(vec![BASE64.encode(b"log-entry")])
        );
    }
}

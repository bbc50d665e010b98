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

//! Typed model of the raw block returned by algod in msgpack format, plus the
//! canonical transaction-id computation over it.
//!
//! `TxnFields` doubles as the canonical encoder: its fields are declared in
//! bytewise-sorted key order and every zero/empty value is skipped, so
//! serializing it with `rmp_serde::to_vec_named` reproduces the sorted-key
//! omit-empty encoding that transaction ids are hashed over.

use crate::address::Address;
use crate::error::CoreError;
use crate::transaction::TxnType;
use base32::Alphabet;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::de::{Error as DeError, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_bytes::ByteBuf;
use sha2::{Digest, Sha512_256};
use std::collections::BTreeMap;
use std::fmt::{self, Formatter};

/// A 32-byte digest embedded in transactions (genesis hash, group, lease).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct HashDigest(pub [u8; 32]);

impl HashDigest {
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    pub fn to_base64(&self) -> String {
        BASE64.encode(self.0)
    }
}

impl Serialize for HashDigest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.0)
    }
}

impl<'de> Deserialize<'de> for HashDigest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct DigestVisitor;

        impl Visitor<'_> for DigestVisitor {
            type Value = HashDigest;

            fn expecting(&self, f: &mut Formatter<'_>) -> fmt::Result {
                f.write_str("32 digest bytes")
            }

            fn visit_bytes<E: DeError>(self, v: &[u8]) -> Result<Self::Value, E> {
                let bytes: [u8; 32] = v
                    .try_into()
                    .map_err(|_| E::custom(format!("expected 32 bytes, got {}", v.len())))?;
                Ok(HashDigest(bytes))
            }

            fn visit_str<E: DeError>(self, v: &str) -> Result<Self::Value, E> {
                self.visit_bytes(v.as_bytes())
            }
        }

        deserializer.deserialize_bytes(DigestVisitor)
    }
}

fn is_zero(v: &u64) -> bool {
    *v == 0
}

fn is_false(v: &bool) -> bool {
    !*v
}

fn is_empty_bytes(v: &Option<ByteBuf>) -> bool {
    v.as_ref().map_or(true, |b| b.is_empty())
}

fn is_empty_string(v: &Option<String>) -> bool {
    v.as_ref().map_or(true, |s| s.is_empty())
}

fn is_empty_vec<T>(v: &Vec<T>) -> bool {
    v.is_empty()
}

fn is_zero_address(v: &Option<Address>) -> bool {
    v.as_ref().map_or(true, Address::is_zero)
}

fn is_zero_digest(v: &Option<HashDigest>) -> bool {
    v.as_ref().map_or(true, HashDigest::is_zero)
}

/// The union of all wire transaction fields ("txn" map of a signed
/// transaction in a block). Field declaration order IS the canonical key
/// order; do not reorder.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TxnFields {
    #[serde(rename = "aamt", skip_serializing_if = "is_zero")]
    pub asset_amount: u64,
    #[serde(rename = "aclose", skip_serializing_if = "is_zero_address")]
    pub asset_close_to: Option<Address>,
    #[serde(rename = "afrz", skip_serializing_if = "is_false")]
    pub freeze_status: bool,
    #[serde(rename = "amt", skip_serializing_if = "is_zero")]
    pub amount: u64,
    #[serde(rename = "apaa", skip_serializing_if = "is_empty_vec")]
    pub app_args: Vec<ByteBuf>,
    #[serde(rename = "apan", skip_serializing_if = "is_zero")]
    pub on_complete: u64,
    #[serde(rename = "apap", skip_serializing_if = "is_empty_bytes")]
    pub approval_program: Option<ByteBuf>,
    #[serde(rename = "apar", skip_serializing_if = "Option::is_none")]
    pub asset_params: Option<AssetParamsFields>,
    #[serde(rename = "apas", skip_serializing_if = "is_empty_vec")]
    pub foreign_assets: Vec<u64>,
    #[serde(rename = "apat", skip_serializing_if = "is_empty_vec")]
    pub accounts: Vec<Address>,
    #[serde(rename = "apbx", skip_serializing_if = "is_empty_vec")]
    pub boxes: Vec<BoxRefFields>,
    #[serde(rename = "apep", skip_serializing_if = "is_zero")]
    pub extra_pages: u64,
    #[serde(rename = "apfa", skip_serializing_if = "is_empty_vec")]
    pub foreign_apps: Vec<u64>,
    #[serde(rename = "apgs", skip_serializing_if = "Option::is_none")]
    pub global_schema: Option<StateSchemaFields>,
    #[serde(rename = "apid", skip_serializing_if = "is_zero")]
    pub app_id: u64,
    #[serde(rename = "apls", skip_serializing_if = "Option::is_none")]
    pub local_schema: Option<StateSchemaFields>,
    #[serde(rename = "apsu", skip_serializing_if = "is_empty_bytes")]
    pub clear_program: Option<ByteBuf>,
    #[serde(rename = "arcv", skip_serializing_if = "is_zero_address")]
    pub asset_receiver: Option<Address>,
    #[serde(rename = "asnd", skip_serializing_if = "is_zero_address")]
    pub asset_sender: Option<Address>,
    #[serde(rename = "caid", skip_serializing_if = "is_zero")]
    pub config_asset_id: u64,
    #[serde(rename = "close", skip_serializing_if = "is_zero_address")]
    pub close_remainder_to: Option<Address>,
    #[serde(rename = "fadd", skip_serializing_if = "is_zero_address")]
    pub freeze_account: Option<Address>,
    #[serde(rename = "faid", skip_serializing_if = "is_zero")]
    pub freeze_asset_id: u64,
    #[serde(rename = "fee", skip_serializing_if = "is_zero")]
    pub fee: u64,
    #[serde(rename = "fv", skip_serializing_if = "is_zero")]
    pub first_valid: u64,
    #[serde(rename = "gen", skip_serializing_if = "is_empty_string")]
    pub genesis_id: Option<String>,
    #[serde(rename = "gh", skip_serializing_if = "is_zero_digest")]
    pub genesis_hash: Option<HashDigest>,
    #[serde(rename = "grp", skip_serializing_if = "is_zero_digest")]
    pub group: Option<HashDigest>,
    #[serde(rename = "hb", skip_serializing_if = "Option::is_none")]
    pub heartbeat: Option<HeartbeatFields>,
    #[serde(rename = "lv", skip_serializing_if = "is_zero")]
    pub last_valid: u64,
    #[serde(rename = "lx", skip_serializing_if = "is_zero_digest")]
    pub lease: Option<HashDigest>,
    #[serde(rename = "nonpart", skip_serializing_if = "is_false")]
    pub non_participation: bool,
    #[serde(rename = "note", skip_serializing_if = "is_empty_bytes")]
    pub note: Option<ByteBuf>,
    #[serde(rename = "rcv", skip_serializing_if = "is_zero_address")]
    pub receiver: Option<Address>,
    #[serde(rename = "rekey", skip_serializing_if = "is_zero_address")]
    pub rekey_to: Option<Address>,
    #[serde(rename = "selkey", skip_serializing_if = "is_empty_bytes")]
    pub selection_key: Option<ByteBuf>,
    #[serde(rename = "snd", skip_serializing_if = "is_zero_address")]
    pub sender: Option<Address>,
    #[serde(rename = "sp", skip_serializing_if = "Option::is_none")]
    pub state_proof: Option<StateProofFields>,
    #[serde(rename = "spmsg", skip_serializing_if = "Option::is_none")]
    pub state_proof_message: Option<StateProofMessageFields>,
    #[serde(rename = "sprfkey", skip_serializing_if = "is_empty_bytes")]
    pub state_proof_key: Option<ByteBuf>,
    #[serde(rename = "sptype", skip_serializing_if = "is_zero")]
    pub state_proof_type: u64,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub txn_type: Option<TxnType>,
    #[serde(rename = "votefst", skip_serializing_if = "is_zero")]
    pub vote_first: u64,
    #[serde(rename = "votekd", skip_serializing_if = "is_zero")]
    pub vote_key_dilution: u64,
    #[serde(rename = "votekey", skip_serializing_if = "is_empty_bytes")]
    pub vote_key: Option<ByteBuf>,
    #[serde(rename = "votelst", skip_serializing_if = "is_zero")]
    pub vote_last: u64,
    #[serde(rename = "xaid", skip_serializing_if = "is_zero")]
    pub xfer_asset_id: u64,
}

/// Asset parameters carried by an acfg transaction (`apar`).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetParamsFields {
    #[serde(rename = "am", skip_serializing_if = "is_empty_bytes")]
    pub metadata_hash: Option<ByteBuf>,
    #[serde(rename = "an", skip_serializing_if = "is_empty_string")]
    pub asset_name: Option<String>,
    #[serde(rename = "au", skip_serializing_if = "is_empty_string")]
    pub url: Option<String>,
    #[serde(rename = "c", skip_serializing_if = "is_zero_address")]
    pub clawback: Option<Address>,
    #[serde(rename = "dc", skip_serializing_if = "is_zero")]
    pub decimals: u64,
    #[serde(rename = "df", skip_serializing_if = "is_false")]
    pub default_frozen: bool,
    #[serde(rename = "f", skip_serializing_if = "is_zero_address")]
    pub freeze: Option<Address>,
    #[serde(rename = "m", skip_serializing_if = "is_zero_address")]
    pub manager: Option<Address>,
    #[serde(rename = "r", skip_serializing_if = "is_zero_address")]
    pub reserve: Option<Address>,
    #[serde(rename = "t", skip_serializing_if = "is_zero")]
    pub total: u64,
    #[serde(rename = "un", skip_serializing_if = "is_empty_string")]
    pub unit_name: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateSchemaFields {
    #[serde(rename = "nbs", skip_serializing_if = "is_zero")]
    pub num_byte_slices: u64,
    #[serde(rename = "nui", skip_serializing_if = "is_zero")]
    pub num_uints: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoxRefFields {
    #[serde(rename = "i", skip_serializing_if = "is_zero")]
    pub index: u64,
    #[serde(rename = "n", skip_serializing_if = "is_empty_bytes")]
    pub name: Option<ByteBuf>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatFields {
    #[serde(rename = "a", skip_serializing_if = "is_zero_address")]
    pub address: Option<Address>,
    #[serde(rename = "kd", skip_serializing_if = "is_zero")]
    pub key_dilution: u64,
    #[serde(rename = "prf", skip_serializing_if = "Option::is_none")]
    pub proof: Option<HeartbeatProofFields>,
    #[serde(rename = "sd", skip_serializing_if = "is_empty_bytes")]
    pub seed: Option<ByteBuf>,
    #[serde(rename = "vid", skip_serializing_if = "is_empty_bytes")]
    pub vote_id: Option<ByteBuf>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatProofFields {
    #[serde(rename = "p", skip_serializing_if = "is_empty_bytes")]
    pub pk: Option<ByteBuf>,
    #[serde(rename = "p1s", skip_serializing_if = "is_empty_bytes")]
    pub pk1_sig: Option<ByteBuf>,
    #[serde(rename = "p2", skip_serializing_if = "is_empty_bytes")]
    pub pk2: Option<ByteBuf>,
    #[serde(rename = "p2s", skip_serializing_if = "is_empty_bytes")]
    pub pk2_sig: Option<ByteBuf>,
    #[serde(rename = "s", skip_serializing_if = "is_empty_bytes")]
    pub sig: Option<ByteBuf>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateProofFields {
    #[serde(rename = "P", skip_serializing_if = "Option::is_none")]
    pub part_proofs: Option<MerkleArrayProofFields>,
    #[serde(rename = "S", skip_serializing_if = "Option::is_none")]
    pub sig_proofs: Option<MerkleArrayProofFields>,
    #[serde(rename = "c", skip_serializing_if = "is_empty_bytes")]
    pub sig_commit: Option<ByteBuf>,
    #[serde(rename = "pr", skip_serializing_if = "is_empty_vec")]
    pub positions_to_reveal: Vec<u64>,
    #[serde(rename = "r", skip_serializing_if = "BTreeMap::is_empty")]
    pub reveals: BTreeMap<u64, RevealFields>,
    #[serde(rename = "v", skip_serializing_if = "is_zero")]
    pub salt_version: u64,
    #[serde(rename = "w", skip_serializing_if = "is_zero")]
    pub signed_weight: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MerkleArrayProofFields {
    #[serde(rename = "hsh", skip_serializing_if = "Option::is_none")]
    pub hash_factory: Option<HashFactoryFields>,
    #[serde(rename = "pth", skip_serializing_if = "is_empty_vec")]
    pub path: Vec<ByteBuf>,
    #[serde(rename = "td", skip_serializing_if = "is_zero")]
    pub tree_depth: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HashFactoryFields {
    #[serde(rename = "t", skip_serializing_if = "is_zero")]
    pub hash_type: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RevealFields {
    #[serde(rename = "p", skip_serializing_if = "Option::is_none")]
    pub participant: Option<ParticipantFields>,
    #[serde(rename = "s", skip_serializing_if = "Option::is_none")]
    pub sig_slot: Option<SigSlotFields>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParticipantFields {
    #[serde(rename = "p", skip_serializing_if = "Option::is_none")]
    pub verifier: Option<VerifierFields>,
    #[serde(rename = "w", skip_serializing_if = "is_zero")]
    pub weight: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifierFields {
    #[serde(rename = "cmt", skip_serializing_if = "is_empty_bytes")]
    pub commitment: Option<ByteBuf>,
    #[serde(rename = "lf", skip_serializing_if = "is_zero")]
    pub key_lifetime: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SigSlotFields {
    #[serde(rename = "l", skip_serializing_if = "is_zero")]
    pub lower_sig_weight: u64,
    #[serde(rename = "s", skip_serializing_if = "Option::is_none")]
    pub signature: Option<MerkleSignatureFields>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MerkleSignatureFields {
    #[serde(rename = "idx", skip_serializing_if = "is_zero")]
    pub merkle_array_index: u64,
    #[serde(rename = "prf", skip_serializing_if = "Option::is_none")]
    pub proof: Option<MerkleArrayProofFields>,
    #[serde(rename = "sig", skip_serializing_if = "is_empty_bytes")]
    pub falcon_signature: Option<ByteBuf>,
    #[serde(rename = "vkey", skip_serializing_if = "Option::is_none")]
    pub verifying_key: Option<VerifyingKeyFields>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifyingKeyFields {
    #[serde(rename = "k", skip_serializing_if = "is_empty_bytes")]
    pub key: Option<ByteBuf>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateProofMessageFields {
    #[serde(rename = "P", skip_serializing_if = "is_zero")]
    pub ln_proven_weight: u64,
    #[serde(rename = "b", skip_serializing_if = "is_empty_bytes")]
    pub block_headers_commitment: Option<ByteBuf>,
    #[serde(rename = "f", skip_serializing_if = "is_zero")]
    pub first_attested_round: u64,
    #[serde(rename = "l", skip_serializing_if = "is_zero")]
    pub last_attested_round: u64,
    #[serde(rename = "v", skip_serializing_if = "is_empty_bytes")]
    pub voters_commitment: Option<ByteBuf>,
}

/// Eval delta attached to an app call: logs and inner transactions. The
/// global/local state deltas also live here on the wire but the pipeline
/// never consumes them.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalDelta {
    #[serde(rename = "lg")]
    pub logs: Vec<ByteBuf>,
    #[serde(rename = "itx")]
    pub inner_txns: Vec<BlockTxn>,
}

/// One signed transaction inside a block: the flattened SignedTxnInBlock map
/// (transaction fields plus apply data). Inner transactions reuse the same
/// shape without the genesis flags.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockTxn {
    pub txn: TxnFields,
    /// Signer when different from the sender (rekeyed accounts).
    pub sgnr: Option<Address>,
    /// Has-genesis-id flag: the block's genesis id applies to this txn.
    pub hgi: bool,
    /// Has-genesis-hash flag.
    pub hgh: Option<bool>,
    /// Eval delta (logs, inner transactions).
    pub dt: Option<EvalDelta>,
    /// Asset id when the transaction created an asset.
    pub caid: Option<u64>,
    /// App id when the transaction created an application.
    pub apid: Option<u64>,
    /// Asset closing amount.
    pub aca: Option<u64>,
    /// Algo closing amount in microalgos.
    pub ca: Option<u64>,
}

/// A raw block header plus its payset.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Block {
    pub rnd: u64,
    pub ts: u64,
    pub gen: String,
    pub gh: HashDigest,
    pub prev: Option<ByteBuf>,
    pub seed: Option<ByteBuf>,
    pub proto: String,
    pub fees: Option<Address>,
    pub rwd: Option<Address>,
    pub earn: u64,
    pub frac: u64,
    pub rate: Option<u64>,
    pub rwcalr: u64,
    pub tc: u64,
    pub txn: Option<ByteBuf>,
    pub txn256: Option<ByteBuf>,
    pub nextproto: Option<String>,
    pub nextyes: Option<u64>,
    pub nextbefore: Option<u64>,
    pub nextswitch: Option<u64>,
    pub txns: Vec<BlockTxn>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CertProposal {
    pub dig: Option<ByteBuf>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgreementCert {
    pub prop: Option<CertProposal>,
}

/// What `GET /v2/blocks/{round}?format=msgpack` decodes to.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockData {
    pub block: Block,
    pub cert: Option<AgreementCert>,
}

pub fn decode_block(bytes: &[u8]) -> Result<BlockData, CoreError> {
    Ok(rmp_serde::from_slice(bytes)?)
}

pub fn encode_block(block: &BlockData) -> Result<Vec<u8>, CoreError> {
    Ok(rmp_serde::to_vec_named(block)?)
}

/// Computes the canonical transaction id: sorted-key msgpack encoding of the
/// transaction fields, domain-separated with the `TX` tag, hashed with
/// SHA-512/256 and base32-encoded without padding (52 characters).
pub fn compute_txid(txn: &TxnFields) -> Result<String, CoreError> {
    let body = rmp_serde::to_vec_named(txn)?;
    let mut tagged = Vec::with_capacity(body.len() + 2);
    tagged.extend_from_slice(b"TX");
    tagged.extend_from_slice(&body);
    let digest = Sha512_256::digest(&tagged);
    Ok(base32::encode(Alphabet::RFC4648 { padding: false }, &digest))
}

/// Key metadata of a synced block, exposed alongside the subscribed
/// transactions on the algod path.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlockMetadata {
    pub round: u64,
    pub hash: Option<String>,
    pub timestamp: u64,
    pub genesis_id: String,
    pub genesis_hash: String,
    pub previous_block_hash: Option<String>,
    pub seed: String,
    pub parent_transaction_count: usize,
    pub full_transaction_count: usize,
    pub rewards: BlockRewards,
    pub upgrade_state: BlockUpgradeState,
    pub txn_counter: u64,
    pub transactions_root: String,
    pub transactions_root_sha256: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlockRewards {
    pub fee_sink: String,
    pub rewards_pool: String,
    pub rewards_level: u64,
    pub rewards_residue: u64,
    pub rewards_rate: u64,
    pub rewards_calculation_round: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlockUpgradeState {
    pub current_protocol: String,
    pub next_protocol: Option<String>,
    pub next_protocol_approvals: Option<u64>,
    pub next_protocol_switch_on: Option<u64>,
    pub next_protocol_vote_before: Option<u64>,
}

/// Extracts key metadata from a raw block.
pub fn block_metadata(block_data: &BlockData) -> BlockMetadata {
    let block = &block_data.block;
    let hash = block_data
        .cert
        .as_ref()
        .and_then(|cert| cert.prop.as_ref())
        .and_then(|prop| prop.dig.as_ref())
        .map(|dig| BASE64.encode(dig));

    BlockMetadata {
        round: block.rnd,
        hash,
        timestamp: block.ts,
        genesis_id: block.gen.clone(),
        genesis_hash: block.gh.to_base64(),
        previous_block_hash: block.prev.as_ref().map(|prev| BASE64.encode(prev)),
        seed: block
            .seed
            .as_ref()
            .map(|seed| BASE64.encode(seed))
            .unwrap_or_default(),
        parent_transaction_count: block.txns.len(),
        full_transaction_count: count_all_transactions(&block.txns),
        rewards: BlockRewards {
            fee_sink: block.fees.unwrap_or(Address::ZERO).to_string(),
            rewards_pool: block.rwd.unwrap_or(Address::ZERO).to_string(),
            rewards_level: block.earn,
            rewards_residue: block.frac,
            rewards_rate: block.rate.unwrap_or(0),
            rewards_calculation_round: block.rwcalr,
        },
        upgrade_state: BlockUpgradeState {
            current_protocol: block.proto.clone(),
            next_protocol: block.nextproto.clone(),
            next_protocol_approvals: block.nextyes,
            next_protocol_switch_on: block.nextswitch,
            next_protocol_vote_before: block.nextbefore,
        },
        txn_counter: block.tc,
        transactions_root: block
            .txn
            .as_ref()
            .map(|root| BASE64.encode(root))
            .unwrap_or_default(),
        transactions_root_sha256: block
            .txn256
            .as_ref()
            .map(|root| BASE64.encode(root))
            .unwrap_or_default(),
    }
}

/// Counts transactions and inner transactions, recursively.
pub fn count_all_transactions(txns: &[BlockTxn]) -> usize {
    txns.iter()
        .map(|txn| {
            1 + txn
                .dt
                .as_ref()
                .map_or(0, |dt| count_all_transactions(&dt.inner_txns))
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payment_fields() -> TxnFields {
        TxnFields {
            sender: Some(Address::new([1u8; 32])),
            receiver: Some(Address::new([2u8; 32])),
            amount: 5_000_000,
            fee: 1000,
            first_valid: 1,
            last_valid: 1000,
            genesis_id: Some("testnet-v1.0".to_string()),
            genesis_hash: Some(HashDigest([3u8; 32])),
            note: Some(ByteBuf::from(b"hello".to_vec())),
            txn_type: Some(TxnType::Payment),
            ..Default::default()
        }
    }

    #[test]
    fn payment_txid_matches_reference() {
        // Reference value computed with the canonical sorted-key msgpack
        // encoding and SHA-512/256.
        assert_eq!(
            compute_txid(&payment_fields()).unwrap(),
            "ON7RISYAKN2RALEF24L5I5R4IDJGBQ757IKS6XHOWOGQTD3S37KQ"
        );
    }

    #[test]
    fn clawback_txid_matches_reference() {
        let txn = TxnFields {
            sender: Some(Address::new([1u8; 32])),
            asset_receiver: Some(Address::new([2u8; 32])),
            asset_sender: Some(Address::new([4u8; 32])),
            asset_amount: 250,
            xfer_asset_id: 77,
            fee: 1000,
            first_valid: 10,
            last_valid: 1010,
            genesis_hash: Some(HashDigest([3u8; 32])),
            txn_type: Some(TxnType::AssetTransfer),
            ..Default::default()
        };
        assert_eq!(
            compute_txid(&txn).unwrap(),
            "45EYUWQXKOKHWHGZAMD55NJG357HP5X5KX2MBXFUSYB7HNVUHIGA"
        );
    }

    #[test]
    fn txid_ignores_zero_values() {
        let mut txn = payment_fields();
        let reference = compute_txid(&txn).unwrap();
        // Zero-value fields are absent from the canonical encoding, so
        // setting them explicitly must not change the id.
        txn.asset_amount = 0;
        txn.group = Some(HashDigest::default());
        txn.close_remainder_to = Some(Address::ZERO);
        assert_eq!(compute_txid(&txn).unwrap(), reference);
    }

    #[test]
    fn wire_round_trip_preserves_fields() {
        let txn = payment_fields();
        let bytes = rmp_serde::to_vec_named(&txn).unwrap();
        let decoded: TxnFields = rmp_serde::from_slice(&bytes).unwrap();
        assert_eq!(decoded, txn);
    }

    #[test]
    fn counts_inner_transactions_recursively() {
        let leaf = BlockTxn::default();
        let mid = BlockTxn {
            dt: Some(EvalDelta {
                inner_txns: vec![leaf.clone(), leaf.clone()],
                ..Default::default()
            }),
            ..Default::default()
        };
        let top = BlockTxn {
            dt: Some(EvalDelta {
                inner_txns: vec![mid],
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(count_all_transactions(&[top, leaf]), 5);
    }
}

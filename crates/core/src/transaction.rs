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

//! The canonical transaction record used throughout the pipeline.
//!
//! The shape follows the indexer's JSON schema so that transactions coming
//! from either source (normalized blocks or indexer search results)
//! deserialize into the same type. The per-type payload is a sum type,
//! flattened back into the indexer's one-key-per-type layout on the wire.

use crate::arc28::EmittedArc28Event;
use crate::balance::BalanceChange;
use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// Wire transaction type tags.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TxnType {
    #[serde(rename = "pay")]
    Payment,
    #[serde(rename = "keyreg")]
    KeyRegistration,
    #[serde(rename = "acfg")]
    AssetConfig,
    #[serde(rename = "axfer")]
    AssetTransfer,
    #[serde(rename = "afrz")]
    AssetFreeze,
    #[serde(rename = "appl")]
    ApplicationCall,
    #[serde(rename = "stpf")]
    StateProof,
    #[serde(rename = "hb")]
    Heartbeat,
}

impl TxnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxnType::Payment => "pay",
            TxnType::KeyRegistration => "keyreg",
            TxnType::AssetConfig => "acfg",
            TxnType::AssetTransfer => "axfer",
            TxnType::AssetFreeze => "afrz",
            TxnType::ApplicationCall => "appl",
            TxnType::StateProof => "stpf",
            TxnType::Heartbeat => "hb",
        }
    }
}

impl Display for TxnType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TxnType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pay" => Ok(TxnType::Payment),
            "keyreg" => Ok(TxnType::KeyRegistration),
            "acfg" => Ok(TxnType::AssetConfig),
            "axfer" => Ok(TxnType::AssetTransfer),
            "afrz" => Ok(TxnType::AssetFreeze),
            "appl" => Ok(TxnType::ApplicationCall),
            "stpf" => Ok(TxnType::StateProof),
            "hb" => Ok(TxnType::Heartbeat),
            other => Err(CoreError::UnknownTxnType(other.to_string())),
        }
    }
}

/// App-call on-complete action in the indexer's string form. The raw block
/// carries the numeric form; comparison always happens on this one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnComplete {
    Noop,
    Optin,
    Closeout,
    Clear,
    Update,
    Delete,
}

impl OnComplete {
    /// Maps the raw block's numeric on-complete (0..5) to the string form.
    pub fn from_algod(value: u64) -> Result<Self, CoreError> {
        match value {
            0 => Ok(OnComplete::Noop),
            1 => Ok(OnComplete::Optin),
            2 => Ok(OnComplete::Closeout),
            3 => Ok(OnComplete::Clear),
            4 => Ok(OnComplete::Update),
            5 => Ok(OnComplete::Delete),
            other => Err(CoreError::UnknownOnComplete(other)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OnComplete::Noop => "noop",
            OnComplete::Optin => "optin",
            OnComplete::Closeout => "closeout",
            OnComplete::Clear => "clear",
            OnComplete::Update => "update",
            OnComplete::Delete => "delete",
        }
    }
}

#[skip_serializing_none]
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PaymentTransaction {
    pub amount: u64,
    pub receiver: String,
    #[serde(rename = "close-amount")]
    pub close_amount: Option<u64>,
    #[serde(rename = "close-remainder-to")]
    pub close_remainder_to: Option<String>,
}

#[skip_serializing_none]
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetTransferTransaction {
    #[serde(rename = "asset-id")]
    pub asset_id: u64,
    pub amount: u64,
    pub receiver: String,
    /// Clawback source, when this is a revocation transfer.
    pub sender: Option<String>,
    #[serde(rename = "close-amount")]
    pub close_amount: Option<u64>,
    #[serde(rename = "close-to")]
    pub close_to: Option<String>,
}

#[skip_serializing_none]
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetFreezeTransaction {
    pub address: String,
    #[serde(rename = "asset-id")]
    pub asset_id: u64,
    #[serde(rename = "new-freeze-status")]
    pub new_freeze_status: bool,
}

#[skip_serializing_none]
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetConfigTransaction {
    /// The asset being configured; absent when the transaction creates one.
    #[serde(rename = "asset-id")]
    pub asset_id: Option<u64>,
    /// Absent on destroy transactions.
    pub params: Option<AssetParams>,
}

#[skip_serializing_none]
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetParams {
    pub creator: String,
    pub decimals: u64,
    pub total: u64,
    pub clawback: Option<String>,
    #[serde(rename = "default-frozen")]
    pub default_frozen: Option<bool>,
    pub freeze: Option<String>,
    pub manager: Option<String>,
    #[serde(rename = "metadata-hash")]
    pub metadata_hash: Option<String>,
    pub name: Option<String>,
    pub reserve: Option<String>,
    #[serde(rename = "unit-name")]
    pub unit_name: Option<String>,
    pub url: Option<String>,
}

#[skip_serializing_none]
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ApplicationTransaction {
    #[serde(rename = "application-id")]
    pub application_id: u64,
    #[serde(rename = "on-completion")]
    pub on_completion: OnComplete,
    #[serde(rename = "application-args", default, skip_serializing_if = "Vec::is_empty")]
    pub application_args: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub accounts: Vec<String>,
    #[serde(rename = "foreign-apps", default, skip_serializing_if = "Vec::is_empty")]
    pub foreign_apps: Vec<u64>,
    #[serde(rename = "foreign-assets", default, skip_serializing_if = "Vec::is_empty")]
    pub foreign_assets: Vec<u64>,
    #[serde(rename = "approval-program")]
    pub approval_program: Option<String>,
    #[serde(rename = "clear-state-program")]
    pub clear_state_program: Option<String>,
    #[serde(rename = "extra-program-pages")]
    pub extra_program_pages: Option<u64>,
}

impl Default for OnComplete {
    fn default() -> Self {
        OnComplete::Noop
    }
}

#[skip_serializing_none]
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct KeyregTransaction {
    #[serde(rename = "non-participation")]
    pub non_participation: Option<bool>,
    #[serde(rename = "selection-participation-key")]
    pub selection_participation_key: Option<String>,
    #[serde(rename = "state-proof-key")]
    pub state_proof_key: Option<String>,
    #[serde(rename = "vote-first-valid")]
    pub vote_first_valid: Option<u64>,
    #[serde(rename = "vote-key-dilution")]
    pub vote_key_dilution: Option<u64>,
    #[serde(rename = "vote-last-valid")]
    pub vote_last_valid: Option<u64>,
    #[serde(rename = "vote-participation-key")]
    pub vote_participation_key: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StateProofTransaction {
    pub message: StateProofMessage,
    #[serde(rename = "state-proof")]
    pub state_proof: StateProofData,
    #[serde(rename = "state-proof-type")]
    pub state_proof_type: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StateProofMessage {
    #[serde(rename = "block-headers-commitment")]
    pub block_headers_commitment: String,
    #[serde(rename = "first-attested-round")]
    pub first_attested_round: u64,
    #[serde(rename = "latest-attested-round")]
    pub latest_attested_round: u64,
    #[serde(rename = "ln-proven-weight")]
    pub ln_proven_weight: u64,
    #[serde(rename = "voters-commitment")]
    pub voters_commitment: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StateProofData {
    #[serde(rename = "part-proofs")]
    pub part_proofs: MerkleArrayProof,
    #[serde(rename = "positions-to-reveal", default)]
    pub positions_to_reveal: Vec<u64>,
    #[serde(default)]
    pub reveals: Vec<StateProofReveal>,
    #[serde(rename = "salt-version")]
    pub salt_version: u64,
    #[serde(rename = "sig-commit")]
    pub sig_commit: String,
    #[serde(rename = "sig-proofs")]
    pub sig_proofs: MerkleArrayProof,
    #[serde(rename = "signed-weight")]
    pub signed_weight: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MerkleArrayProof {
    #[serde(rename = "hash-factory")]
    pub hash_factory: HashFactory,
    #[serde(default)]
    pub path: Vec<String>,
    #[serde(rename = "tree-depth")]
    pub tree_depth: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HashFactory {
    #[serde(rename = "hash-type")]
    pub hash_type: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StateProofReveal {
    pub position: u64,
    pub participant: StateProofParticipant,
    #[serde(rename = "sig-slot")]
    pub sig_slot: StateProofSigSlot,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StateProofParticipant {
    pub verifier: StateProofVerifier,
    pub weight: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StateProofVerifier {
    pub commitment: String,
    #[serde(rename = "key-lifetime")]
    pub key_lifetime: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StateProofSigSlot {
    #[serde(rename = "lower-sig-weight")]
    pub lower_sig_weight: u64,
    pub signature: MerkleSignature,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MerkleSignature {
    #[serde(rename = "falcon-signature")]
    pub falcon_signature: String,
    #[serde(rename = "merkle-array-index")]
    pub merkle_array_index: u64,
    pub proof: MerkleArrayProof,
    #[serde(rename = "verifying-key")]
    pub verifying_key: String,
}

#[skip_serializing_none]
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatTransaction {
    #[serde(rename = "hb-address")]
    pub hb_address: String,
    #[serde(rename = "hb-key-dilution")]
    pub hb_key_dilution: u64,
    #[serde(rename = "hb-proof")]
    pub hb_proof: Option<HeartbeatProof>,
    #[serde(rename = "hb-seed")]
    pub hb_seed: Option<String>,
    #[serde(rename = "hb-vote-id")]
    pub hb_vote_id: Option<String>,
}

#[skip_serializing_none]
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatProof {
    #[serde(rename = "hb-pk")]
    pub hb_pk: Option<String>,
    #[serde(rename = "hb-pk1sig")]
    pub hb_pk1_sig: Option<String>,
    #[serde(rename = "hb-pk2")]
    pub hb_pk2: Option<String>,
    #[serde(rename = "hb-pk2sig")]
    pub hb_pk2_sig: Option<String>,
    #[serde(rename = "hb-sig")]
    pub hb_sig: Option<String>,
}

/// The per-type payload: exactly one of these is present, keyed on the wire
/// by the indexer's per-type field name.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TxnPayload {
    Payment {
        #[serde(rename = "payment-transaction")]
        payment: PaymentTransaction,
    },
    KeyRegistration {
        #[serde(rename = "keyreg-transaction")]
        keyreg: KeyregTransaction,
    },
    AssetConfig {
        #[serde(rename = "asset-config-transaction")]
        asset_config: AssetConfigTransaction,
    },
    AssetTransfer {
        #[serde(rename = "asset-transfer-transaction")]
        asset_transfer: AssetTransferTransaction,
    },
    AssetFreeze {
        #[serde(rename = "asset-freeze-transaction")]
        asset_freeze: AssetFreezeTransaction,
    },
    ApplicationCall {
        #[serde(rename = "application-transaction")]
        application: ApplicationTransaction,
    },
    StateProof {
        #[serde(rename = "state-proof-transaction")]
        state_proof: Box<StateProofTransaction>,
    },
    Heartbeat {
        #[serde(rename = "heartbeat-transaction")]
        heartbeat: HeartbeatTransaction,
    },
}

/// The common model for a transaction exposed by a subscription: the indexer
/// transaction format plus the fields the pipeline derives
/// (`parent_transaction_id`, `filters_matched`, `balance_changes`,
/// `arc28_events`).
#[skip_serializing_none]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubscribedTransaction {
    /// Absent on indexer-sourced inner transactions until the adapter
    /// assigns the synthetic id.
    #[serde(default)]
    pub id: String,
    #[serde(rename = "tx-type")]
    pub tx_type: TxnType,
    pub fee: u64,
    pub sender: String,
    #[serde(rename = "first-valid")]
    pub first_valid: u64,
    #[serde(rename = "last-valid")]
    pub last_valid: u64,
    #[serde(rename = "confirmed-round")]
    pub confirmed_round: Option<u64>,
    #[serde(rename = "round-time")]
    pub round_time: Option<u64>,
    #[serde(rename = "intra-round-offset")]
    pub intra_round_offset: Option<u64>,
    #[serde(rename = "genesis-id")]
    pub genesis_id: Option<String>,
    #[serde(rename = "genesis-hash")]
    pub genesis_hash: Option<String>,
    pub group: Option<String>,
    /// Base64 of the note bytes; empty when absent.
    pub note: Option<String>,
    pub lease: Option<String>,
    #[serde(rename = "rekey-to")]
    pub rekey_to: Option<String>,
    #[serde(rename = "auth-addr")]
    pub auth_addr: Option<String>,
    #[serde(rename = "closing-amount")]
    pub closing_amount: Option<u64>,
    #[serde(rename = "created-asset-index")]
    pub created_asset_index: Option<u64>,
    #[serde(rename = "created-application-index")]
    pub created_application_index: Option<u64>,
    /// Base64-encoded app call logs, in emission order.
    pub logs: Option<Vec<String>>,
    #[serde(flatten)]
    pub payload: TxnPayload,
    #[serde(rename = "inner-txns")]
    pub inner_txns: Option<Vec<SubscribedTransaction>>,
    /// Id of the ultimate top-level parent, present iff this is an inner
    /// transaction.
    pub parent_transaction_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters_matched: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub balance_changes: Vec<BalanceChange>,
    #[serde(default, skip_serializing_if = "Vec::is_empty", skip_deserializing)]
    pub arc28_events: Vec<EmittedArc28Event>,
}

impl SubscribedTransaction {
    pub fn payment(&self) -> Option<&PaymentTransaction> {
        match &self.payload {
            TxnPayload::Payment { payment } => Some(payment),
            _ => None,
        }
    }

    pub fn asset_transfer(&self) -> Option<&AssetTransferTransaction> {
        match &self.payload {
            TxnPayload::AssetTransfer { asset_transfer } => Some(asset_transfer),
            _ => None,
        }
    }

    pub fn asset_config(&self) -> Option<&AssetConfigTransaction> {
        match &self.payload {
            TxnPayload::AssetConfig { asset_config } => Some(asset_config),
            _ => None,
        }
    }

    pub fn asset_freeze(&self) -> Option<&AssetFreezeTransaction> {
        match &self.payload {
            TxnPayload::AssetFreeze { asset_freeze } => Some(asset_freeze),
            _ => None,
        }
    }

    pub fn application(&self) -> Option<&ApplicationTransaction> {
        match &self.payload {
            TxnPayload::ApplicationCall { application } => Some(application),
            _ => None,
        }
    }

    pub fn keyreg(&self) -> Option<&KeyregTransaction> {
        match &self.payload {
            TxnPayload::KeyRegistration { keyreg } => Some(keyreg),
            _ => None,
        }
    }

    /// The app id this transaction is about: the created app for creation
    /// calls, otherwise the called app. Zero when not an app call.
    pub fn in_scope_app_id(&self) -> u64 {
        self.created_application_index
            .or(self.application().map(|app| app.application_id))
            .unwrap_or(0)
    }

    /// The receiving address of a pay or axfer transaction.
    pub fn receiver(&self) -> Option<&str> {
        match &self.payload {
            TxnPayload::Payment { payment } => Some(&payment.receiver),
            TxnPayload::AssetTransfer { asset_transfer } => Some(&asset_transfer.receiver),
            _ => None,
        }
    }

    /// The amount moved by a pay or axfer transaction, zero otherwise.
    pub fn transfer_amount(&self) -> u64 {
        match &self.payload {
            TxnPayload::Payment { payment } => payment.amount,
            TxnPayload::AssetTransfer { asset_transfer } => asset_transfer.amount,
            _ => 0,
        }
    }

    /// Visits this transaction and every nested inner transaction.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a SubscribedTransaction)) {
        visit(self);
        if let Some(inner) = &self.inner_txns {
            for txn in inner {
                txn.walk(visit);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn payment(id: &str, sender: &str, receiver: &str, amount: u64) -> SubscribedTransaction {
        SubscribedTransaction {
            id: id.to_string(),
            tx_type: TxnType::Payment,
            fee: 1000,
            sender: sender.to_string(),
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
            payload: TxnPayload::Payment {
                payment: PaymentTransaction {
                    amount,
                    receiver: receiver.to_string(),
                    close_amount: None,
                    close_remainder_to: None,
                },
            },
            inner_txns: None,
            parent_transaction_id: None,
            filters_matched: vec![],
            balance_changes: vec![],
            arc28_events: vec![],
        }
    }

    #[test]
    fn payment_payload_round_trips_through_json() {
        let txn = payment("TXN1", "SENDER", "RECEIVER", 123);
        let json = serde_json::to_value(&txn).unwrap();
        assert_eq!(json["payment-transaction"]["amount"], 123);
        assert_eq!(json["tx-type"], "pay");
        assert!(json.get("keyreg-transaction").is_none());

        let back: SubscribedTransaction = serde_json::from_value(json).unwrap();
        assert_eq!(back, txn);
    }

    #[test]
    fn payload_variant_is_selected_by_key() {
        let json = serde_json::json!({
            "id": "TXN2",
            "tx-type": "keyreg",
            "fee": 1000,
            "sender": "SENDER",
            "first-valid": 1,
            "last-valid": 1000,
            "keyreg-transaction": { "non-participation": true },
            "signature": { "sig": "unmodelled keys are ignored" },
        });
        let txn: SubscribedTransaction = serde_json::from_value(json).unwrap();
        assert_eq!(
            txn.keyreg().unwrap().non_participation,
            Some(true),
        );
    }

    #[test]
    fn on_complete_mapping_covers_all_algod_values() {
        let expected = [
            OnComplete::Noop,
            OnComplete::Optin,
            OnComplete::Closeout,
            OnComplete::Clear,
            OnComplete::Update,
            OnComplete::Delete,
        ];
        for (value, on_complete) in expected.iter().enumerate() {
            assert_eq!(OnComplete::from_algod(value as u64).unwrap(), *on_complete);
        }
        assert!(OnComplete::from_algod(6).is_err());
    }

    #[test]
    fn in_scope_app_id_prefers_created_app() {
        let mut txn = payment("TXN3", "SENDER", "RECEIVER", 1);
        txn.tx_type = TxnType::ApplicationCall;
        txn.payload = TxnPayload::ApplicationCall {
            application: ApplicationTransaction {
                application_id: 7,
                ..Default::default()
            },
        };
        assert_eq!(txn.in_scope_app_id(), 7);
        txn.created_application_index = Some(9);
        assert_eq!(txn.in_scope_app_id(), 9);
    }
}

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

//! ARC-28 event extraction: matching app-call logs against a catalog of
//! event definitions and decoding the matches.
//!
//! An event's signature is `Name(type1,type2,...)`; its prefix is the first
//! four bytes of the SHA-512/256 of the signature. A log emits the event
//! when it starts with the prefix and its remainder decodes as the ABI
//! tuple of the argument types.

use crate::abi::{AbiType, AbiValue};
use crate::error::CoreError;
use crate::transaction::{SubscribedTransaction, TxnType};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use log::warn;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512_256};
use std::collections::BTreeMap;

/// Per-transaction predicate deciding whether a group applies.
pub type TxnPredicate = Box<dyn Fn(&SubscribedTransaction) -> bool + Send + Sync>;

/// One argument of an ARC-28 event definition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Arc28EventArg {
    /// The ABI type of the argument.
    #[serde(rename = "type")]
    pub type_name: String,
    /// Optional user-friendly name; named arguments also appear in the
    /// emitted event's by-name map.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
}

/// The ARC-28 metadata of one event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Arc28Event {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
    pub args: Vec<Arc28EventArg>,
}

/// A group of event definitions plus instructions for when to process them.
pub struct Arc28EventGroup {
    /// The name used to reference this group from filters.
    pub group_name: String,
    /// When non-empty, only transactions against these app ids are
    /// processed.
    pub process_for_app_ids: Vec<u64>,
    /// Optional predicate; evaluated only after the app-id whitelist
    /// passes.
    pub process_transaction: Option<TxnPredicate>,
    /// Tolerate (warn and skip) undecodable matching logs instead of
    /// failing the transaction.
    pub continue_on_error: bool,
    pub events: Vec<Arc28Event>,
}

impl Arc28EventGroup {
    pub fn new(group_name: impl Into<String>, events: Vec<Arc28Event>) -> Self {
        Arc28EventGroup {
            group_name: group_name.into(),
            process_for_app_ids: vec![],
            process_transaction: None,
            continue_on_error: false,
            events,
        }
    }
}

/// A pre-computed event to look for: definition plus signature and prefix.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Arc28EventToProcess {
    pub group_name: String,
    pub event_name: String,
    /// e.g. `Swapped(uint64,uint64)`
    pub event_signature: String,
    /// First 4 bytes of SHA-512/256 of the signature, lowercase hex.
    pub event_prefix: String,
    pub event_definition: Arc28Event,
}

/// An event that was actually emitted by a transaction's logs.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EmittedArc28Event {
    #[serde(flatten)]
    pub event: Arc28EventToProcess,
    pub args: Vec<AbiValue>,
    pub args_by_name: BTreeMap<String, AbiValue>,
}

pub fn event_signature(event: &Arc28Event) -> String {
    let types: Vec<&str> = event.args.iter().map(|arg| arg.type_name.as_str()).collect();
    format!("{}({})", event.name, types.join(","))
}

pub fn event_prefix(signature: &str) -> String {
    let digest = Sha512_256::digest(signature.as_bytes());
    hex::encode(&digest[..4])
}

/// Flattens the configured groups into the list of events to look for.
pub fn events_to_process(groups: &[Arc28EventGroup]) -> Vec<Arc28EventToProcess> {
    groups
        .iter()
        .flat_map(|group| {
            group.events.iter().map(|event| {
                let signature = event_signature(event);
                Arc28EventToProcess {
                    group_name: group.group_name.clone(),
                    event_name: event.name.clone(),
                    event_prefix: event_prefix(&signature),
                    event_signature: signature,
                    event_definition: event.clone(),
                }
            })
        })
        .collect()
}

/// Whether a group applies to a transaction against `app_id`. The group
/// predicate is only evaluated when the app-id whitelist passes.
pub fn group_applies(
    group: &Arc28EventGroup,
    app_id: u64,
    txn: &SubscribedTransaction,
) -> bool {
    let in_group =
        group.process_for_app_ids.is_empty() || group.process_for_app_ids.contains(&app_id);
    if !in_group {
        return false;
    }
    match &group.process_transaction {
        Some(predicate) => predicate(txn),
        None => true,
    }
}

/// Decodes the matching events out of a transaction's raw logs.
///
/// `continue_on_error` resolves the per-group tolerance for undecodable
/// logs: when it returns true the log is skipped with a warning, otherwise
/// the error is raised.
pub fn extract_arc28_events(
    txn_id: &str,
    logs: &[Vec<u8>],
    events: &[Arc28EventToProcess],
    continue_on_error: impl Fn(&str) -> bool,
) -> Result<Vec<EmittedArc28Event>, CoreError> {
    if events.is_empty() {
        return Ok(vec![]);
    }

    let mut emitted = Vec::new();
    for log in logs {
        if log.len() <= 4 {
            continue;
        }
        let prefix = hex::encode(&log[..4]);

        for event in events {
            if event.event_prefix != prefix {
                continue;
            }
            match decode_event(event, &log[4..]) {
                Ok(value) => emitted.push(value),
                Err(error) => {
                    if continue_on_error(&event.group_name) {
                        warn!(
                            "encountered error while processing {}.{} on transaction {}: {}",
                            event.group_name, event.event_name, txn_id, error
                        );
                    } else {
                        return Err(CoreError::Arc28Decode {
                            group: event.group_name.clone(),
                            event: event.event_name.clone(),
                            txn_id: txn_id.to_string(),
                            reason: error.to_string(),
                        });
                    }
                }
            }
        }
    }

    Ok(emitted)
}

fn decode_event(
    event: &Arc28EventToProcess,
    payload: &[u8],
) -> Result<EmittedArc28Event, CoreError> {
    let types = event
        .event_definition
        .args
        .iter()
        .map(|arg| arg.type_name.parse::<AbiType>())
        .collect::<Result<Vec<_>, _>>()?;
    let decoded = AbiType::Tuple(types).decode(payload)?;
    let args = match decoded {
        AbiValue::Tuple(values) => values,
        _ => unreachable!(),
    };

    let mut args_by_name = BTreeMap::new();
    for (arg, value) in event.event_definition.args.iter().zip(&args) {
        if let Some(name) = &arg.name {
            args_by_name.insert(name.clone(), value.clone());
        }
    }

    Ok(EmittedArc28Event {
        event: event.clone(),
        args,
        args_by_name,
    })
}

/// Extracts the ARC-28 events of one canonical transaction, honoring group
/// applicability. Non-app-calls produce nothing.
pub fn extract_for_transaction(
    txn: &SubscribedTransaction,
    all_events: &[Arc28EventToProcess],
    groups: &[Arc28EventGroup],
) -> Result<Vec<EmittedArc28Event>, CoreError> {
    if txn.tx_type != TxnType::ApplicationCall {
        return Ok(vec![]);
    }

    let app_id = txn.in_scope_app_id();
    let applicable: Vec<&Arc28EventGroup> = groups
        .iter()
        .filter(|group| group_applies(group, app_id, txn))
        .collect();
    if applicable.is_empty() {
        return Ok(vec![]);
    }

    let events: Vec<Arc28EventToProcess> = all_events
        .iter()
        .filter(|event| {
            applicable
                .iter()
                .any(|group| group.group_name == event.group_name)
        })
        .cloned()
        .collect();

    let logs = decoded_logs(txn)?;
    extract_arc28_events(&txn.id, &logs, &events, |group_name| {
        applicable
            .iter()
            .find(|group| group.group_name == group_name)
            .is_some_and(|group| group.continue_on_error)
    })
}

/// Whether any of the transaction's logs carries the prefix of one of the
/// filtered events, with group applicability honored. Used by the
/// `arc28_events` filter fragment; no decoding happens here.
pub fn has_matching_arc28_event(
    txn: &SubscribedTransaction,
    all_events: &[Arc28EventToProcess],
    groups: &[Arc28EventGroup],
    event_filter: &[Arc28EventFilter],
) -> bool {
    let app_id = txn.in_scope_app_id();
    let candidates: Vec<&Arc28EventToProcess> = all_events
        .iter()
        .filter(|event| {
            event_filter
                .iter()
                .any(|f| f.event_name == event.event_name && f.group_name == event.group_name)
        })
        .filter(|event| {
            groups
                .iter()
                .find(|group| group.group_name == event.group_name)
                .is_some_and(|group| group_applies(group, app_id, txn))
        })
        .collect();
    if candidates.is_empty() {
        return false;
    }

    let logs = match decoded_logs(txn) {
        Ok(logs) => logs,
        Err(_) => return false,
    };
    logs.iter().filter(|log| log.len() > 4).any(|log| {
        let prefix = hex::encode(&log[..4]);
        candidates.iter().any(|event| event.event_prefix == prefix)
    })
}

/// An `arc28_events` filter element: (group, event) to look for.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Arc28EventFilter {
    pub group_name: String,
    pub event_name: String,
}

fn decoded_logs(txn: &SubscribedTransaction) -> Result<Vec<Vec<u8>>, CoreError> {
    txn.logs
        .as_deref()
        .unwrap_or_default()
        .iter()
        .map(|log| {
            BASE64
                .decode(log)
                .map_err(|e| CoreError::AbiDecode(format!("invalid base64 log: {e}")))
        })
        .collect()
}

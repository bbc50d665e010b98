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

//! roundwatch: a transaction subscription engine for the Algorand ledger.
//!
//! Converts the raw append-only block stream into a filtered, enriched,
//! exactly-once stream of transactions. Progress is tracked through a
//! persistent watermark, so delivery survives restarts; a configurable sync
//! behaviour decides what happens when the chain has moved further than one
//! poll can cover.

pub mod config;
pub mod emitter;
pub mod error;
pub mod indexer_sync;
pub mod subscriber;
pub mod subscription;
pub mod watermark;

pub use config::{
    BeforePollMetadata, SubscriberConfig, SubscriberFilter, SubscriptionParams,
    SubscriptionResult, SyncBehaviour, TxnMapper, DEFAULT_MAX_ROUNDS_TO_SYNC,
};
pub use emitter::{Event, EventEmitter, Listener, ListenerId, ListenerResult};
pub use error::SubscriberError;
pub use subscriber::AlgorandSubscriber;
pub use subscription::get_subscribed_transactions;
pub use watermark::{FileWatermark, InMemoryWatermark, WatermarkError, WatermarkStore};

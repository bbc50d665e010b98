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

//! Pure compute core of the Algorand transaction subscription engine:
//! block normalization, balance-change derivation, ARC-28 event extraction
//! and filter evaluation. No I/O happens in this crate.

pub mod abi;
pub mod address;
pub mod arc28;
pub mod balance;
pub mod block;
pub mod error;
pub mod filter;
pub mod normalize;
pub mod transaction;

#[cfg(test)]
pub(crate) mod fixtures;

pub use address::Address;
pub use error::CoreError;
pub use transaction::{SubscribedTransaction, TxnType};

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

use crate::error::CoreError;
use base32::Alphabet;
use serde::de::{Error as DeError, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha512_256};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

const CHECKSUM_LEN: usize = 4;
const ENCODED_LEN: usize = 58;

/// An Algorand account address: an ed25519 public key, displayed as base32
/// over the key followed by a 4-byte SHA-512/256 checksum.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(pub [u8; 32]);

impl Address {
    pub const ZERO: Address = Address([0u8; 32]);

    pub fn new(bytes: [u8; 32]) -> Self {
        Address(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, CoreError> {
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CoreError::InvalidAddress(format!("expected 32 bytes, got {}", bytes.len())))?;
        Ok(Address(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    fn checksum(&self) -> [u8; CHECKSUM_LEN] {
        let digest = Sha512_256::digest(self.0);
        let mut checksum = [0u8; CHECKSUM_LEN];
        checksum.copy_from_slice(&digest[32 - CHECKSUM_LEN..]);
        checksum
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut raw = [0u8; 32 + CHECKSUM_LEN];
        raw[..32].copy_from_slice(&self.0);
        raw[32..].copy_from_slice(&self.checksum());
        f.write_str(&base32::encode(Alphabet::RFC4648 { padding: false }, &raw))
    }
}

impl FromStr for Address {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != ENCODED_LEN {
            return Err(CoreError::InvalidAddress(format!(
                "expected {} characters, got {}",
                ENCODED_LEN,
                s.len()
            )));
        }
        let raw = base32::decode(Alphabet::RFC4648 { padding: false }, s)
            .ok_or_else(|| CoreError::InvalidAddress(s.to_string()))?;
        let address = Address::from_slice(&raw[..32])?;
        if raw[32..32 + CHECKSUM_LEN] != address.checksum() {
            return Err(CoreError::InvalidAddress(format!("checksum mismatch in {s}")));
        }
        Ok(address)
    }
}

// The wire form is the bare public key, msgpack bin.
impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.0)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct AddressVisitor;

        impl Visitor<'_> for AddressVisitor {
            type Value = Address;

            fn expecting(&self, f: &mut Formatter<'_>) -> fmt::Result {
                f.write_str("32 raw address bytes")
            }

            fn visit_bytes<E: DeError>(self, v: &[u8]) -> Result<Self::Value, E> {
                Address::from_slice(v).map_err(E::custom)
            }

            fn visit_str<E: DeError>(self, v: &str) -> Result<Self::Value, E> {
                // Some encoders emit raw bytes as str; accept both.
                Address::from_slice(v.as_bytes()).map_err(E::custom)
            }
        }

        deserializer.deserialize_bytes(AddressVisitor)
    }
}

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

//! ARC-4 ABI types and decoding, as needed to unpack event log payloads.
//!
//! Implements the value subset of the ABI spec: uintN / ufixedNxM / bool /
//! byte / address / string, static and dynamic arrays, and tuples with the
//! standard head/tail layout (uint16 offsets and lengths, consecutive bools
//! bit-packed).

use crate::address::Address;
use crate::error::CoreError;
use serde::{Serialize, Serializer};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

const LENGTH_PREFIX: usize = 2;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AbiType {
    /// `uintN`, N a multiple of 8 in 8..=512.
    Uint(u16),
    /// `ufixedNxM`; the decoded value is the raw N-bit integer.
    Ufixed(u16, u8),
    Bool,
    Byte,
    Address,
    String,
    StaticArray(Box<AbiType>, u32),
    DynamicArray(Box<AbiType>),
    Tuple(Vec<AbiType>),
}

#[derive(Clone, Debug, PartialEq)]
pub enum AbiValue {
    Bool(bool),
    /// uintN / ufixedNxM up to 128 bits.
    Uint(u128),
    /// Big-endian raw value of a uintN wider than 128 bits.
    BigUint(Vec<u8>),
    Byte(u8),
    /// Base32 account address.
    Address(String),
    String(String),
    Array(Vec<AbiValue>),
    Tuple(Vec<AbiValue>),
}

impl Serialize for AbiValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            AbiValue::Bool(v) => serializer.serialize_bool(*v),
            AbiValue::Uint(v) => {
                if let Ok(small) = u64::try_from(*v) {
                    serializer.serialize_u64(small)
                } else {
                    serializer.serialize_str(&v.to_string())
                }
            }
            AbiValue::BigUint(bytes) => serializer.serialize_str(&hex::encode(bytes)),
            AbiValue::Byte(v) => serializer.serialize_u8(*v),
            AbiValue::Address(v) => serializer.serialize_str(v),
            AbiValue::String(v) => serializer.serialize_str(v),
            AbiValue::Array(values) | AbiValue::Tuple(values) => values.serialize(serializer),
        }
    }
}

impl Display for AbiType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            AbiType::Uint(n) => write!(f, "uint{n}"),
            AbiType::Ufixed(n, m) => write!(f, "ufixed{n}x{m}"),
            AbiType::Bool => f.write_str("bool"),
            AbiType::Byte => f.write_str("byte"),
            AbiType::Address => f.write_str("address"),
            AbiType::String => f.write_str("string"),
            AbiType::StaticArray(inner, len) => write!(f, "{inner}[{len}]"),
            AbiType::DynamicArray(inner) => write!(f, "{inner}[]"),
            AbiType::Tuple(elems) => {
                let inner: Vec<String> = elems.iter().map(|e| e.to_string()).collect();
                write!(f, "({})", inner.join(","))
            }
        }
    }
}

impl FromStr for AbiType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let err = |reason: &str| CoreError::AbiType(s.to_string(), reason.to_string());

        // Array suffixes bind last: the final '[' always starts the suffix.
        if s.ends_with(']') {
            let open = s.rfind('[').ok_or_else(|| err("unbalanced brackets"))?;
            let inner: AbiType = s[..open].parse()?;
            let len_str = &s[open + 1..s.len() - 1];
            return if len_str.is_empty() {
                Ok(AbiType::DynamicArray(Box::new(inner)))
            } else {
                let len: u32 = len_str.parse().map_err(|_| err("bad array length"))?;
                Ok(AbiType::StaticArray(Box::new(inner), len))
            };
        }

        if s.starts_with('(') {
            if !s.ends_with(')') {
                return Err(err("unbalanced parentheses"));
            }
            let body = &s[1..s.len() - 1];
            if body.is_empty() {
                return Ok(AbiType::Tuple(vec![]));
            }
            let mut elems = Vec::new();
            let mut depth = 0usize;
            let mut start = 0usize;
            for (i, c) in body.char_indices() {
                match c {
                    '(' => depth += 1,
                    ')' => depth = depth.checked_sub(1).ok_or_else(|| err("unbalanced parentheses"))?,
                    ',' if depth == 0 => {
                        elems.push(body[start..i].parse()?);
                        start = i + 1;
                    }
                    _ => {}
                }
            }
            if depth != 0 {
                return Err(err("unbalanced parentheses"));
            }
            elems.push(body[start..].parse()?);
            return Ok(AbiType::Tuple(elems));
        }

        match s {
            "bool" => return Ok(AbiType::Bool),
            "byte" => return Ok(AbiType::Byte),
            "address" => return Ok(AbiType::Address),
            "string" => return Ok(AbiType::String),
            _ => {}
        }

        if let Some(rest) = s.strip_prefix("ufixed") {
            let (n_str, m_str) = rest.split_once('x').ok_or_else(|| err("missing precision"))?;
            let n: u16 = n_str.parse().map_err(|_| err("bad bit width"))?;
            let m: u8 = m_str.parse().map_err(|_| err("bad precision"))?;
            check_uint_width(n).map_err(|_| err("bit width must be a multiple of 8 in 8..=512"))?;
            if m == 0 || m > 160 {
                return Err(err("precision must be in 1..=160"));
            }
            return Ok(AbiType::Ufixed(n, m));
        }

        if let Some(n_str) = s.strip_prefix("uint") {
            let n: u16 = n_str.parse().map_err(|_| err("bad bit width"))?;
            check_uint_width(n).map_err(|_| err("bit width must be a multiple of 8 in 8..=512"))?;
            return Ok(AbiType::Uint(n));
        }

        Err(err("unknown type"))
    }
}

fn check_uint_width(n: u16) -> Result<(), ()> {
    if n >= 8 && n <= 512 && n % 8 == 0 {
        Ok(())
    } else {
        Err(())
    }
}

impl AbiType {
    pub fn is_dynamic(&self) -> bool {
        match self {
            AbiType::String | AbiType::DynamicArray(_) => true,
            AbiType::StaticArray(inner, _) => inner.is_dynamic(),
            AbiType::Tuple(elems) => elems.iter().any(AbiType::is_dynamic),
            _ => false,
        }
    }

    /// Byte size of a static type's encoding. Bools are handled via run
    /// packing, so `Bool` on its own is one byte.
    fn static_size(&self) -> Result<usize, CoreError> {
        match self {
            AbiType::Uint(n) | AbiType::Ufixed(n, _) => Ok(*n as usize / 8),
            AbiType::Bool => Ok(1),
            AbiType::Byte => Ok(1),
            AbiType::Address => Ok(32),
            AbiType::StaticArray(inner, len) => {
                if **inner == AbiType::Bool {
                    Ok((*len as usize).div_ceil(8))
                } else {
                    Ok(inner.static_size()? * *len as usize)
                }
            }
            AbiType::Tuple(elems) => tuple_static_size(elems),
            AbiType::String | AbiType::DynamicArray(_) => Err(CoreError::AbiDecode(format!(
                "{self} is dynamic and has no static size"
            ))),
        }
    }

    /// Decodes `bytes` as a value of this type; the whole slice must be
    /// consumed.
    pub fn decode(&self, bytes: &[u8]) -> Result<AbiValue, CoreError> {
        match self {
            AbiType::Uint(n) | AbiType::Ufixed(n, _) => {
                let width = *n as usize / 8;
                expect_len(bytes, width, self)?;
                if width <= 16 {
                    let mut value = 0u128;
                    for byte in bytes {
                        value = (value << 8) | *byte as u128;
                    }
                    Ok(AbiValue::Uint(value))
                } else {
                    Ok(AbiValue::BigUint(bytes.to_vec()))
                }
            }
            AbiType::Bool => {
                expect_len(bytes, 1, self)?;
                match bytes[0] {
                    0x80 => Ok(AbiValue::Bool(true)),
                    0x00 => Ok(AbiValue::Bool(false)),
                    other => Err(CoreError::AbiDecode(format!(
                        "invalid bool encoding: {other:#04x}"
                    ))),
                }
            }
            AbiType::Byte => {
                expect_len(bytes, 1, self)?;
                Ok(AbiValue::Byte(bytes[0]))
            }
            AbiType::Address => {
                expect_len(bytes, 32, self)?;
                Ok(AbiValue::Address(Address::from_slice(bytes)?.to_string()))
            }
            AbiType::String => {
                let (len, rest) = read_length_prefix(bytes)?;
                expect_len(rest, len, self)?;
                let value = String::from_utf8(rest.to_vec())
                    .map_err(|e| CoreError::AbiDecode(format!("invalid utf-8 string: {e}")))?;
                Ok(AbiValue::String(value))
            }
            AbiType::DynamicArray(inner) => {
                let (len, rest) = read_length_prefix(bytes)?;
                let elems = vec![(**inner).clone(); len];
                match decode_tuple(&elems, rest)? {
                    AbiValue::Tuple(values) => Ok(AbiValue::Array(values)),
                    _ => unreachable!(),
                }
            }
            AbiType::StaticArray(inner, len) => {
                let elems = vec![(**inner).clone(); *len as usize];
                match decode_tuple(&elems, bytes)? {
                    AbiValue::Tuple(values) => Ok(AbiValue::Array(values)),
                    _ => unreachable!(),
                }
            }
            AbiType::Tuple(elems) => decode_tuple(elems, bytes),
        }
    }
}

fn expect_len(bytes: &[u8], expected: usize, ty: &AbiType) -> Result<(), CoreError> {
    if bytes.len() != expected {
        return Err(CoreError::AbiDecode(format!(
            "{ty} expects {expected} bytes, got {}",
            bytes.len()
        )));
    }
    Ok(())
}

fn read_length_prefix(bytes: &[u8]) -> Result<(usize, &[u8]), CoreError> {
    if bytes.len() < LENGTH_PREFIX {
        return Err(CoreError::AbiDecode(
            "truncated length prefix".to_string(),
        ));
    }
    let len = u16::from_be_bytes([bytes[0], bytes[1]]) as usize;
    Ok((len, &bytes[LENGTH_PREFIX..]))
}

fn tuple_static_size(elems: &[AbiType]) -> Result<usize, CoreError> {
    let mut size = 0usize;
    let mut i = 0usize;
    while i < elems.len() {
        if elems[i] == AbiType::Bool {
            let run = bool_run(elems, i);
            size += run.div_ceil(8);
            i += run;
        } else {
            size += elems[i].static_size()?;
            i += 1;
        }
    }
    Ok(size)
}

fn bool_run(elems: &[AbiType], start: usize) -> usize {
    elems[start..]
        .iter()
        .take_while(|e| **e == AbiType::Bool)
        .count()
}

/// Head/tail tuple decoding. Static elements (with consecutive bools packed
/// into shared bytes) live in the head; dynamic elements put a uint16 offset
/// in the head and their encoding in the tail, in element order.
fn decode_tuple(elems: &[AbiType], bytes: &[u8]) -> Result<AbiValue, CoreError> {
    let mut values: Vec<Option<AbiValue>> = vec![None; elems.len()];
    let mut dynamic: Vec<(usize, usize)> = Vec::new(); // (element index, offset)
    let mut pos = 0usize;

    fn take<'a>(bytes: &'a [u8], pos: &mut usize, n: usize) -> Result<&'a [u8], CoreError> {
        let end = pos
            .checked_add(n)
            .filter(|end| *end <= bytes.len())
            .ok_or_else(|| CoreError::AbiDecode("tuple encoding truncated".to_string()))?;
        let slice = &bytes[*pos..end];
        *pos = end;
        Ok(slice)
    }

    let mut i = 0usize;
    while i < elems.len() {
        let ty = &elems[i];
        if *ty == AbiType::Bool {
            let run = bool_run(elems, i);
            let packed = take(bytes, &mut pos, run.div_ceil(8))?;
            for j in 0..run {
                let bit = packed[j / 8] >> (7 - (j % 8)) & 1;
                values[i + j] = Some(AbiValue::Bool(bit == 1));
            }
            i += run;
        } else if ty.is_dynamic() {
            let head = take(bytes, &mut pos, LENGTH_PREFIX)?;
            let offset = u16::from_be_bytes([head[0], head[1]]) as usize;
            dynamic.push((i, offset));
            i += 1;
        } else {
            let size = ty.static_size()?;
            let slice = take(bytes, &mut pos, size)?;
            values[i] = Some(ty.decode(slice)?);
            i += 1;
        }
    }

    // Tails are laid out in element order; each one extends to the next
    // offset (or the end of the buffer).
    for (n, (index, offset)) in dynamic.iter().enumerate() {
        let end = dynamic
            .get(n + 1)
            .map(|(_, next)| *next)
            .unwrap_or(bytes.len());
        if *offset < pos || end < *offset || end > bytes.len() {
            return Err(CoreError::AbiDecode(format!(
                "invalid tail offset {offset} in tuple encoding"
            )));
        }
        values[*index] = Some(elems[*index].decode(&bytes[*offset..end])?);
    }

    if dynamic.is_empty() && pos != bytes.len() {
        return Err(CoreError::AbiDecode(format!(
            "{} trailing bytes after tuple encoding",
            bytes.len() - pos
        )));
    }

    Ok(AbiValue::Tuple(
        values.into_iter().map(|value| value.unwrap()).collect(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> AbiType {
        s.parse().unwrap()
    }

    #[test]
    fn parses_and_prints_types() {
        for s in [
            "uint64",
            "ufixed128x10",
            "bool",
            "byte",
            "address",
            "string",
            "uint8[3]",
            "uint8[]",
            "byte[4][]",
            "(uint64,string,bool)",
            "(uint8[2],(bool,bool))[3]",
            "()",
        ] {
            assert_eq!(parse(s).to_string(), s);
        }
    }

    #[test]
    fn rejects_malformed_types() {
        for s in ["uint65", "uint0", "ufixed64", "account", "(uint8", "uint8[", "bool[-1]"] {
            assert!(s.parse::<AbiType>().is_err(), "{s} should not parse");
        }
    }

    #[test]
    fn decodes_uints() {
        assert_eq!(
            parse("uint64").decode(&[0, 0, 0, 0, 0, 0, 1, 0]).unwrap(),
            AbiValue::Uint(256)
        );
        assert_eq!(parse("uint8").decode(&[0xff]).unwrap(), AbiValue::Uint(255));
        // Wider than 128 bits comes back raw.
        let wide = [0xab; 32];
        assert_eq!(
            parse("uint256").decode(&wide).unwrap(),
            AbiValue::BigUint(wide.to_vec())
        );
        assert!(parse("uint64").decode(&[0; 7]).is_err());
    }

    #[test]
    fn decodes_strings_and_addresses() {
        assert_eq!(
            parse("string").decode(&[0, 2, b'h', b'i']).unwrap(),
            AbiValue::String("hi".to_string())
        );
        assert_eq!(
            parse("address").decode(&[0u8; 32]).unwrap(),
            AbiValue::Address(Address::ZERO.to_string())
        );
    }

    #[test]
    fn decodes_dynamic_arrays() {
        assert_eq!(
            parse("uint8[]").decode(&[0, 3, 1, 2, 3]).unwrap(),
            AbiValue::Array(vec![
                AbiValue::Uint(1),
                AbiValue::Uint(2),
                AbiValue::Uint(3)
            ])
        );
        assert_eq!(
            parse("uint8[]").decode(&[0, 0]).unwrap(),
            AbiValue::Array(vec![])
        );
    }

    #[test]
    fn packs_bools_in_tuples_and_arrays() {
        // (bool,bool,bool) packs into a single byte, MSB first.
        assert_eq!(
            parse("(bool,bool,bool)").decode(&[0b1010_0000]).unwrap(),
            AbiValue::Tuple(vec![
                AbiValue::Bool(true),
                AbiValue::Bool(false),
                AbiValue::Bool(true)
            ])
        );
        // bool[10] needs two bytes.
        let decoded = parse("bool[10]").decode(&[0b1111_1111, 0b1100_0000]).unwrap();
        if let AbiValue::Array(values) = decoded {
            assert_eq!(values.len(), 10);
            assert_eq!(values[9], AbiValue::Bool(true));
        } else {
            panic!("expected array");
        }
        // A bool between non-bools occupies its own byte.
        assert_eq!(
            parse("(uint8,bool,uint8)").decode(&[7, 0x80, 9]).unwrap(),
            AbiValue::Tuple(vec![
                AbiValue::Uint(7),
                AbiValue::Bool(true),
                AbiValue::Uint(9)
            ])
        );
    }

    #[test]
    fn decodes_mixed_static_dynamic_tuples() {
        // (uint64,string): 8-byte head + 2-byte offset, then the tail.
        let mut bytes = vec![0, 0, 0, 0, 0, 0, 0, 42];
        bytes.extend_from_slice(&[0, 10]); // offset of the string tail
        bytes.extend_from_slice(&[0, 2, b'h', b'i']);
        assert_eq!(
            parse("(uint64,string)").decode(&bytes).unwrap(),
            AbiValue::Tuple(vec![
                AbiValue::Uint(42),
                AbiValue::String("hi".to_string())
            ])
        );
    }

    #[test]
    fn decodes_two_dynamic_elements() {
        // (string,string) with values "a" and "bc".
        let bytes = [
            0, 4, // offset of "a"
            0, 7, // offset of "bc"
            0, 1, b'a', 0, 2, b'b', b'c',
        ];
        assert_eq!(
            parse("(string,string)").decode(&bytes).unwrap(),
            AbiValue::Tuple(vec![
                AbiValue::String("a".to_string()),
                AbiValue::String("bc".to_string())
            ])
        );
    }

    #[test]
    fn rejects_trailing_bytes() {
        assert!(parse("(uint8)").decode(&[1, 2]).is_err());
    }

    #[test]
    fn serializes_to_transparent_json() {
        let value = AbiValue::Tuple(vec![
            AbiValue::Uint(7),
            AbiValue::String("x".to_string()),
            AbiValue::Bool(true),
            AbiValue::Uint(u128::MAX),
        ]);
        let json = serde_json::to_value(&value).unwrap();
        assert_eq!(json[0], 7);
        assert_eq!(json[1], "x");
        assert_eq!(json[2], true);
        assert_eq!(json[3], u128::MAX.to_string());
    }
}

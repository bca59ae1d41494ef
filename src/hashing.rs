//! SHA-256 hashing over a canonical byte encoding (spec §4.1).
//!
//! `CanonicalValue` is a small self-describing tree, mirroring the way the
//! teacher hand-assembles signing bytes field-by-field
//! (`FinalityVote::signing_message`) rather than leaning on a generic
//! serializer's incidental ordering. Map keys are sorted (`BTreeMap`),
//! integers render as decimal ASCII, strings as UTF-8 — exactly the three
//! rules the spec prescribes, so any two implementations that build the
//! same logical value produce byte-identical output.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

#[derive(Clone, Debug, PartialEq)]
pub enum CanonicalValue {
    Int(i64),
    Str(String),
    Bytes(Vec<u8>),
    Seq(Vec<CanonicalValue>),
    Map(BTreeMap<String, CanonicalValue>),
}

impl CanonicalValue {
    pub fn encode(&self) -> Vec<u8> {
        match self {
            CanonicalValue::Int(n) => n.to_string().into_bytes(),
            CanonicalValue::Str(s) => s.as_bytes().to_vec(),
            // Opaque bytes have no canonical textual form of their own;
            // hex-encode them so the result stays valid UTF-8 ASCII like
            // every other leaf, satisfying rule (c) uniformly.
            CanonicalValue::Bytes(b) => hex::encode(b).into_bytes(),
            CanonicalValue::Seq(items) => {
                let mut out = vec![b'['];
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(b',');
                    }
                    out.extend(item.encode());
                }
                out.push(b']');
                out
            }
            CanonicalValue::Map(fields) => {
                // BTreeMap already iterates keys in sorted order.
                let mut out = vec![b'{'];
                for (i, (key, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        out.push(b',');
                    }
                    out.extend(key.as_bytes());
                    out.push(b':');
                    out.extend(value.encode());
                }
                out.push(b'}');
                out
            }
        }
    }
}

/// Builds a `CanonicalValue::Map` from `(key, value)` pairs without
/// repeating `BTreeMap::from_iter` boilerplate at every call site.
pub fn map(fields: impl IntoIterator<Item = (&'static str, CanonicalValue)>) -> CanonicalValue {
    CanonicalValue::Map(fields.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
}

pub fn sha256_bytes(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// The `payload.hash` fingerprint of an opaque answer value: hex SHA-256
/// of the canonical encoding of the answer bytes.
pub fn fingerprint(answer: &[u8]) -> String {
    sha256_hex(&CanonicalValue::Bytes(answer.to_vec()).encode())
}

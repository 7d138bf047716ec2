//! Order-preserving byte encoding of key tuples. Comparing two encodings
//! byte-wise gives the same result as comparing the tuples under their key
//! definitions, so the index tree can be scanned in sort order directly.

use crate::keys::{Key, KeyDefinition, SortDirection};

const ESCAPE: u8 = 0x00;
const ESCAPED_NUL: u8 = 0xFF;
const TERMINATOR: u8 = 0x01;
const SIGN_BIT: u64 = 1 << 63;

pub const ROW_ID_LEN: usize = 8;

/// Encodes as many leading keys as given; a shorter tuple encodes to a
/// byte prefix of the full one.
pub fn encode_key_tuple(keys: &[Key], definitions: &[KeyDefinition]) -> Vec<u8> {
    let mut out = Vec::with_capacity(keys.len() * 12);
    for (key, def) in keys.iter().zip(definitions) {
        let start = out.len();
        encode_key(key, &mut out);
        if def.direction == SortDirection::Descending {
            for byte in &mut out[start..] {
                *byte = !*byte;
            }
        }
    }
    out
}

fn encode_key(key: &Key, out: &mut Vec<u8>) {
    match key {
        Key::Numeric(value) => {
            out.extend_from_slice(&((*value as u64) ^ SIGN_BIT).to_be_bytes());
        }
        Key::Text(value) => {
            // terminated so no encoding is a proper prefix of another
            for &byte in value.as_bytes() {
                out.push(byte);
                if byte == ESCAPE {
                    out.push(ESCAPED_NUL);
                }
            }
            out.push(ESCAPE);
            out.push(TERMINATOR);
        }
    }
}

/// Index entry key: the encoded tuple followed by the row id, which keeps
/// equal tuples distinct and in load order.
pub fn index_key(encoded_tuple: &[u8], id: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(encoded_tuple.len() + ROW_ID_LEN);
    key.extend_from_slice(encoded_tuple);
    key.extend_from_slice(&id.to_be_bytes());
    key
}

pub fn row_key(id: u64) -> [u8; ROW_ID_LEN] {
    id.to_be_bytes()
}

pub fn row_id_from_index_key(key: &[u8]) -> Option<u64> {
    let start = key.len().checked_sub(ROW_ID_LEN)?;
    let bytes: [u8; ROW_ID_LEN] = key[start..].try_into().ok()?;
    Some(u64::from_be_bytes(bytes))
}

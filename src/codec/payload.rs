use base64::Engine;

use crate::constants::{PRESERVE_CHAR, TAB_DELIMITER, ZSTD_COMPRESSION_LEVEL};
use crate::error::{Result, SortError};

/// How a source line is transformed before it is staged, so it can be
/// restored byte for byte on write-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadCodec {
    Plain,
    /// A trailing tab-delimited empty field would otherwise be lost.
    Preserved,
    /// Fixed-width lines carry significant trailing whitespace and can be wide.
    Compressed,
}

impl PayloadCodec {
    pub fn for_delimiter(delimiter: char) -> Self {
        if delimiter == TAB_DELIMITER {
            PayloadCodec::Preserved
        } else {
            PayloadCodec::Plain
        }
    }

    pub fn encode(&self, line: &str) -> Result<String> {
        match self {
            PayloadCodec::Plain => Ok(line.to_string()),
            PayloadCodec::Preserved => Ok(preserve(line)),
            PayloadCodec::Compressed => compress(&preserve(line)),
        }
    }

    pub fn decode(&self, stored: &str) -> Result<String> {
        match self {
            PayloadCodec::Plain => Ok(stored.to_string()),
            PayloadCodec::Preserved => unpreserve(stored),
            PayloadCodec::Compressed => unpreserve(&decompress(stored)?),
        }
    }
}

/// Appends the preserve sentinel.
pub fn preserve(line: &str) -> String {
    let mut out = String::with_capacity(line.len() + 1);
    out.push_str(line);
    out.push(PRESERVE_CHAR);
    out
}

/// Strips the preserve sentinel added by [`preserve`].
pub fn unpreserve(stored: &str) -> Result<String> {
    stored
        .strip_suffix(PRESERVE_CHAR)
        .map(str::to_string)
        .ok_or_else(|| SortError::Codec("Stored payload is missing its preserve character".to_string()))
}

/// Zstd-compresses a string and returns it base64 encoded.
pub fn compress(data: &str) -> Result<String> {
    let compressed = zstd::encode_all(data.as_bytes(), ZSTD_COMPRESSION_LEVEL)
        .map_err(|e| SortError::Codec(format!("Zstd compression failed: {}", e)))?;
    Ok(base64::engine::general_purpose::STANDARD.encode(compressed))
}

/// Reverses [`compress`].
pub fn decompress(data: &str) -> Result<String> {
    let compressed = base64::engine::general_purpose::STANDARD
        .decode(data)
        .map_err(|e| SortError::Codec(format!("Invalid base64 payload: {}", e)))?;
    let decompressed = zstd::decode_all(compressed.as_slice())
        .map_err(|e| SortError::Codec(format!("Zstd decompression failed: {}", e)))?;
    String::from_utf8(decompressed)
        .map_err(|e| SortError::Codec(format!("Decompressed payload is not UTF-8: {}", e)))
}

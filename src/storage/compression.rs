//! Payload blob encoding
//!
//! Payload spaces store each record as a self-describing blob:
//!
//! ```text
//! ┌───────┬────────────┬──────────────────────────────┐
//! │ codec │ crc32 (LE) │ body (JSON, maybe LZ4)        │
//! │ 1 B   │ 4 B        │ N B                           │
//! └───────┴────────────┴──────────────────────────────┘
//! ```
//!
//! The checksum covers the uncompressed JSON, so both codec bugs and bit rot
//! surface as `Corruption` on read.

use crate::storage::error::{StorageError, StorageResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

const HEADER_LEN: usize = 5;

/// Payload codec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    None,
    #[default]
    Lz4,
}

impl Compression {
    fn tag(self) -> u8 {
        match self {
            Compression::None => 0,
            Compression::Lz4 => 1,
        }
    }

    fn from_tag(tag: u8) -> StorageResult<Self> {
        match tag {
            0 => Ok(Compression::None),
            1 => Ok(Compression::Lz4),
            other => Err(StorageError::Corruption(format!(
                "unknown payload codec {}",
                other
            ))),
        }
    }
}

impl FromStr for Compression {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Compression::None),
            "lz4" => Ok(Compression::Lz4),
            other => Err(format!("unknown compression '{}'", other)),
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Compression::None => write!(f, "none"),
            Compression::Lz4 => write!(f, "lz4"),
        }
    }
}

/// Encode a payload into a storable blob
pub fn encode_payload(value: &Value, codec: Compression) -> StorageResult<Vec<u8>> {
    let json = serde_json::to_vec(value)?;
    let checksum = crc32fast::hash(&json);

    let body = match codec {
        Compression::None => json,
        Compression::Lz4 => lz4_flex::compress_prepend_size(&json),
    };

    let mut blob = Vec::with_capacity(HEADER_LEN + body.len());
    blob.push(codec.tag());
    blob.extend_from_slice(&checksum.to_le_bytes());
    blob.extend_from_slice(&body);
    Ok(blob)
}

/// Decode a blob written by [`encode_payload`]
pub fn decode_payload(blob: &[u8]) -> StorageResult<Value> {
    if blob.len() < HEADER_LEN {
        return Err(StorageError::Corruption(format!(
            "payload blob too short: {} bytes",
            blob.len()
        )));
    }

    let codec = Compression::from_tag(blob[0])?;
    let stored_checksum = u32::from_le_bytes([blob[1], blob[2], blob[3], blob[4]]);
    let body = &blob[HEADER_LEN..];

    let json = match codec {
        Compression::None => body.to_vec(),
        Compression::Lz4 => lz4_flex::decompress_size_prepended(body)
            .map_err(|e| StorageError::Compression(format!("LZ4 decompression failed: {}", e)))?,
    };

    let computed_checksum = crc32fast::hash(&json);
    if stored_checksum != computed_checksum {
        return Err(StorageError::Corruption(format!(
            "payload checksum mismatch: stored={}, computed={}",
            stored_checksum, computed_checksum
        )));
    }

    Ok(serde_json::from_slice(&json)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        let headers = vec!["accept: application/json"; 20];
        json!({
            "test": {"key": "parameter-required-missing"},
            "outcome": {"criticality": 4, "status": "incorrect"},
            "request": {"headers": headers}
        })
    }

    #[test]
    fn test_lz4_blob_shrinks_repetitive_payload() {
        let value = sample();
        let plain = encode_payload(&value, Compression::None).unwrap();
        let packed = encode_payload(&value, Compression::Lz4).unwrap();

        assert!(packed.len() < plain.len());
        assert_eq!(decode_payload(&packed).unwrap(), value);
        assert_eq!(decode_payload(&plain).unwrap(), value);
    }

    #[test]
    fn test_flipped_byte_is_detected() {
        let mut blob = encode_payload(&sample(), Compression::None).unwrap();
        let last = blob.len() - 2;
        blob[last] ^= 0x01;

        assert!(matches!(
            decode_payload(&blob),
            Err(StorageError::Corruption(_)) | Err(StorageError::Serialization(_))
        ));
    }

    #[test]
    fn test_bad_header() {
        assert!(matches!(
            decode_payload(&[1, 2]),
            Err(StorageError::Corruption(_))
        ));
        assert!(matches!(
            decode_payload(&[9, 0, 0, 0, 0, b'{', b'}']),
            Err(StorageError::Corruption(_))
        ));
    }

    #[test]
    fn test_compression_parse() {
        assert_eq!("LZ4".parse::<Compression>(), Ok(Compression::Lz4));
        assert_eq!("none".parse::<Compression>(), Ok(Compression::None));
        assert!("zstd".parse::<Compression>().is_err());
    }
}

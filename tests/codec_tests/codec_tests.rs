//! Tests for the encoding contract
//!
//! These tests verify:
//! - Cursor bookkeeping (position, used, capacity)
//! - Bounds checks on sub-slices and sequential access
//! - Composite types encode fields back to back
//! - Rejection of malformed input
//! - The bincode adapter

use std::collections::BTreeMap;

use atlasstore::address::StorageAddress;
use atlasstore::codec::{self, Bincode, Decoder, Encoder, Persist};
use atlasstore::error::{AtlasError, Result};
use serde::{Deserialize, Serialize};

// =============================================================================
// Helper Functions
// =============================================================================

/// A user type composed from persisted fields
#[derive(Debug, Clone, PartialEq)]
struct Record {
    key: u64,
    label: String,
    tags: Vec<u16>,
    parent: Option<StorageAddress>,
}

impl Persist for Record {
    fn encoded_len(&self) -> usize {
        self.key.encoded_len()
            + self.label.encoded_len()
            + self.tags.encoded_len()
            + self.parent.encoded_len()
    }

    fn encode(&self, out: &mut Encoder<'_>) -> Result<()> {
        self.key.encode(out)?;
        self.label.encode(out)?;
        self.tags.encode(out)?;
        self.parent.encode(out)
    }

    fn decode(input: &mut Decoder<'_>) -> Result<Self> {
        Ok(Self {
            key: u64::decode(input)?,
            label: String::decode(input)?,
            tags: Vec::decode(input)?,
            parent: Option::decode(input)?,
        })
    }
}

fn sample_record() -> Record {
    Record {
        key: 0x0102_0304_0506_0708,
        label: "node".to_string(),
        tags: vec![1, 2, 3],
        parent: Some(StorageAddress::new(4096, 64)),
    }
}

// =============================================================================
// Cursor Tests
// =============================================================================

#[test]
fn test_encoder_tracks_position() {
    let mut buf = [0u8; 16];
    let mut out = Encoder::new(&mut buf);

    out.put_u32(7).unwrap();
    out.put_u16(9).unwrap();

    assert_eq!(out.capacity(), 16);
    assert_eq!(out.used(), 6);
    assert_eq!(out.remaining(), 10);
}

#[test]
fn test_integers_are_little_endian() {
    let bytes = codec::to_vec(&0x0102_0304u32).unwrap();

    assert_eq!(bytes, vec![0x04, 0x03, 0x02, 0x01]);
}

#[test]
fn test_encoder_overrun_fails() {
    let mut buf = [0u8; 4];
    let mut out = Encoder::new(&mut buf);
    out.put_u16(1).unwrap();

    let err = out.put_u32(2).unwrap_err();

    assert!(matches!(
        err,
        AtlasError::BufferOverrun { offset: 2, len: 4, capacity: 4 }
    ));
    assert!(err.is_contract_violation());
}

#[test]
fn test_sub_slice_checks_capacity() {
    let mut buf = [0u8; 8];
    let mut out = Encoder::new(&mut buf);

    out.sub_slice(4, 4).unwrap().copy_from_slice(&[1, 2, 3, 4]);
    assert!(out.sub_slice(5, 4).is_err());
    assert!(out.sub_slice(usize::MAX, 2).is_err());
    assert_eq!(out.used(), 0);
    drop(out);

    let input = Decoder::new(&buf);
    assert_eq!(input.sub_slice(4, 4).unwrap(), &[1, 2, 3, 4]);
    assert!(input.sub_slice(8, 1).is_err());
}

#[test]
fn test_encode_into_reports_bytes_written() {
    let mut buf = [0u8; 64];

    let written = codec::encode_into(&sample_record(), &mut buf).unwrap();

    assert_eq!(written, sample_record().encoded_len());
}

// =============================================================================
// Composite Type Tests
// =============================================================================

#[test]
fn test_composite_layout_is_sequential() {
    let record = sample_record();

    let bytes = codec::to_vec(&record).unwrap();

    // key (8) | label len (4) + "node" | tags len (4) + 3 x u16 | tag (1) + address (16)
    assert_eq!(bytes.len(), 8 + 8 + 10 + 17);
    assert_eq!(&bytes[8..12], &4u32.to_le_bytes());
    assert_eq!(&bytes[12..16], b"node");
    assert_eq!(bytes[26], 1);
    assert_eq!(codec::from_slice::<Record>(&bytes).unwrap(), record);
}

#[test]
fn test_decode_ignores_trailing_bytes() {
    let mut bytes = codec::to_vec(&String::from("abc")).unwrap();
    bytes.extend_from_slice(&[0xff; 16]);

    assert_eq!(codec::from_slice::<String>(&bytes).unwrap(), "abc");
}

#[test]
fn test_nested_collections() {
    let value: Vec<(u32, Option<String>)> = vec![(1, None), (2, Some("two".to_string()))];

    let bytes = codec::to_vec(&value).unwrap();

    assert_eq!(bytes.len(), value.encoded_len());
    assert_eq!(codec::from_slice::<Vec<(u32, Option<String>)>>(&bytes).unwrap(), value);
}

// =============================================================================
// Malformed Input Tests
// =============================================================================

#[test]
fn test_truncated_input_fails() {
    let bytes = codec::to_vec(&sample_record()).unwrap();

    let err = codec::from_slice::<Record>(&bytes[..bytes.len() - 1]).unwrap_err();

    assert!(matches!(err, AtlasError::BufferOverrun { .. }));
}

#[test]
fn test_huge_length_prefix_fails_without_allocating() {
    let bytes = u32::MAX.to_le_bytes();

    assert!(codec::from_slice::<Vec<u64>>(&bytes).is_err());
    assert!(codec::from_slice::<String>(&bytes).is_err());
}

#[test]
fn test_invalid_tags_are_rejected() {
    assert!(matches!(
        codec::from_slice::<bool>(&[2]),
        Err(AtlasError::Serialization(_))
    ));
    assert!(matches!(
        codec::from_slice::<Option<u8>>(&[9, 0]),
        Err(AtlasError::Serialization(_))
    ));
    assert!(matches!(
        codec::from_slice::<String>(&[2, 0, 0, 0, 0xff, 0xfe]),
        Err(AtlasError::Serialization(_))
    ));
}

// =============================================================================
// Bincode Adapter Tests
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Settings {
    name: String,
    limits: BTreeMap<String, u64>,
}

#[test]
fn test_bincode_adapter_round_trip() {
    let mut limits = BTreeMap::new();
    limits.insert("pages".to_string(), 128);
    let settings = Bincode(Settings {
        name: "default".to_string(),
        limits,
    });

    let bytes = codec::to_vec(&settings).unwrap();

    assert_eq!(bytes.len(), settings.encoded_len());
    let decoded: Bincode<Settings> = codec::from_slice(&bytes).unwrap();
    assert_eq!(decoded.into_inner(), settings.0);
}

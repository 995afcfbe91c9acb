//! Store header
//!
//! ## Layout (little endian, at physical offset 0)
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Magic "ATLSTORE" (8) | Version: u32 (4)                      │
//! │ NextAddr (8)          address generator state                │
//! │ MappingOffset (8) | MappingLen (8) | MappingCrc: u32 (4)     │
//! │ MappingAddr (8) | MappingSize (8)   mapping's own address    │
//! │ NextMetadataAddr (8)                                         │
//! │ StaticAddr (8) | StaticSize (8)                              │
//! │ HeaderCrc: u32 (4)    CRC32 of everything above              │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//! The header occupies the first [`HEADER_RESERVED`](super::HEADER_RESERVED)
//! bytes of the store; the rest of that block stays zero.

use crate::codec::{Decoder, Encoder};
use crate::error::Result;

/// Magic bytes identifying an AtlasStore file
pub(crate) const MAGIC: &[u8; 8] = b"ATLSTORE";

/// Current header format version
pub(crate) const VERSION: u32 = 1;

/// Encoded header length
pub(crate) const HEADER_SIZE: usize = 8 + 4 + 8 + 8 + 8 + 4 + 8 + 8 + 8 + 8 + 8 + 4;

/// Decoded header fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreHeader {
    pub next_addr: u64,
    pub mapping_offset: u64,
    pub mapping_len: u64,
    pub mapping_crc: u32,
    pub mapping_addr: u64,
    pub mapping_size: u64,
    pub next_metadata_addr: u64,
    pub static_addr: u64,
    pub static_size: u64,
}

/// What the first bytes of a store say about it
#[derive(Debug, PartialEq, Eq)]
pub enum HeaderState {
    /// All zero: nothing was ever persisted
    Fresh,

    Valid(StoreHeader),

    /// Non-zero but unreadable
    Corrupt(String),
}

impl StoreHeader {
    pub fn encode(&self) -> Result<[u8; HEADER_SIZE]> {
        let mut buf = [0u8; HEADER_SIZE];
        {
            let mut out = Encoder::new(&mut buf);
            out.put_bytes(MAGIC)?;
            out.put_u32(VERSION)?;
            out.put_u64(self.next_addr)?;
            out.put_u64(self.mapping_offset)?;
            out.put_u64(self.mapping_len)?;
            out.put_u32(self.mapping_crc)?;
            out.put_u64(self.mapping_addr)?;
            out.put_u64(self.mapping_size)?;
            out.put_u64(self.next_metadata_addr)?;
            out.put_u64(self.static_addr)?;
            out.put_u64(self.static_size)?;
        }
        let crc = crc32fast::hash(&buf[..HEADER_SIZE - 4]);
        buf[HEADER_SIZE - 4..].copy_from_slice(&crc.to_le_bytes());
        Ok(buf)
    }

    pub fn decode(bytes: &[u8]) -> HeaderState {
        if bytes.iter().all(|&b| b == 0) {
            return HeaderState::Fresh;
        }
        match Self::parse(bytes) {
            Ok(state) => state,
            Err(e) => HeaderState::Corrupt(e.to_string()),
        }
    }

    fn parse(bytes: &[u8]) -> Result<HeaderState> {
        let mut input = Decoder::new(bytes);
        if input.get_bytes(MAGIC.len())? != MAGIC {
            return Ok(HeaderState::Corrupt("magic mismatch".to_string()));
        }
        let version = input.get_u32()?;
        if version != VERSION {
            return Ok(HeaderState::Corrupt(format!(
                "unsupported header version {}",
                version
            )));
        }

        let header = StoreHeader {
            next_addr: input.get_u64()?,
            mapping_offset: input.get_u64()?,
            mapping_len: input.get_u64()?,
            mapping_crc: input.get_u32()?,
            mapping_addr: input.get_u64()?,
            mapping_size: input.get_u64()?,
            next_metadata_addr: input.get_u64()?,
            static_addr: input.get_u64()?,
            static_size: input.get_u64()?,
        };

        let stored_crc = input.get_u32()?;
        let actual_crc = crc32fast::hash(input.sub_slice(0, HEADER_SIZE - 4)?);
        if stored_crc != actual_crc {
            return Ok(HeaderState::Corrupt(format!(
                "header checksum mismatch: stored {:#010x}, computed {:#010x}",
                stored_crc, actual_crc
            )));
        }
        Ok(HeaderState::Valid(header))
    }
}

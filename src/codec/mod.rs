//! Codec Module
//!
//! The contract every stored type fulfils: report its encoded length, encode
//! into a caller-provided byte span, and rebuild itself from one.
//!
//! ## Responsibilities
//! - [`Persist`] trait (encoded length / encode / decode)
//! - Bounds-checked cursors over byte spans ([`Encoder`], [`Decoder`])
//! - Implementations for integers, strings, collections and tuples
//! - [`Bincode`] adapter for any serde type
//!
//! ## Encoding Rules
//! ```text
//! integers      little endian, fixed width
//! bool          1 byte (0 / 1)
//! String, Vec   [Len: u32][items...]
//! Option<T>     [Tag: u8][T if tag == 1]
//! tuples        fields back to back
//! ```
//!
//! Composite types encode each field sequentially at the offset where the
//! previous one stopped.

mod buffer;
mod impls;

pub use buffer::{Decoder, Encoder};
pub use impls::Bincode;

use crate::error::{AtlasError, Result};

/// A type that can be stored in the engine
pub trait Persist: Sized {
    /// Exact number of bytes `encode` will write
    fn encoded_len(&self) -> usize;

    /// Write the encoded form at the encoder's position
    fn encode(&self, out: &mut Encoder<'_>) -> Result<()>;

    /// Rebuild a value from the decoder's position
    fn decode(input: &mut Decoder<'_>) -> Result<Self>;
}

/// Encode a value into a freshly allocated buffer
pub fn to_vec<T: Persist>(value: &T) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; value.encoded_len()];
    encode_into(value, &mut buf)?;
    Ok(buf)
}

/// Encode a value into `buf`, returning the number of bytes written
pub fn encode_into<T: Persist>(value: &T, buf: &mut [u8]) -> Result<usize> {
    let mut encoder = Encoder::new(buf);
    value.encode(&mut encoder)?;
    Ok(encoder.used())
}

/// Decode a value from the start of `bytes`
pub fn from_slice<T: Persist>(bytes: &[u8]) -> Result<T> {
    let mut decoder = Decoder::new(bytes);
    T::decode(&mut decoder)
}

/// Length prefix used by strings and collections
pub(crate) fn encode_len(out: &mut Encoder<'_>, len: usize) -> Result<()> {
    let len = u32::try_from(len)
        .map_err(|_| AtlasError::Serialization(format!("length {} exceeds u32", len)))?;
    out.put_u32(len)
}

pub(crate) const LEN_PREFIX: usize = 4;

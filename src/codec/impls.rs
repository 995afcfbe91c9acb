//! Persist implementations for common types

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::address::StorageAddress;
use crate::error::{AtlasError, Result};

use super::{encode_len, Decoder, Encoder, Persist, LEN_PREFIX};

macro_rules! persist_int {
    ($ty:ty, $put:ident, $get:ident) => {
        impl Persist for $ty {
            fn encoded_len(&self) -> usize {
                std::mem::size_of::<$ty>()
            }

            fn encode(&self, out: &mut Encoder<'_>) -> Result<()> {
                out.$put(*self)
            }

            fn decode(input: &mut Decoder<'_>) -> Result<Self> {
                input.$get()
            }
        }
    };
}

persist_int!(u8, put_u8, get_u8);
persist_int!(u16, put_u16, get_u16);
persist_int!(u32, put_u32, get_u32);
persist_int!(u64, put_u64, get_u64);
persist_int!(i32, put_i32, get_i32);
persist_int!(i64, put_i64, get_i64);

impl Persist for bool {
    fn encoded_len(&self) -> usize {
        1
    }

    fn encode(&self, out: &mut Encoder<'_>) -> Result<()> {
        out.put_u8(u8::from(*self))
    }

    fn decode(input: &mut Decoder<'_>) -> Result<Self> {
        match input.get_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(AtlasError::Serialization(format!("invalid bool byte {}", other))),
        }
    }
}

impl Persist for String {
    fn encoded_len(&self) -> usize {
        LEN_PREFIX + self.len()
    }

    fn encode(&self, out: &mut Encoder<'_>) -> Result<()> {
        encode_len(out, self.len())?;
        out.put_bytes(self.as_bytes())
    }

    fn decode(input: &mut Decoder<'_>) -> Result<Self> {
        let len = input.get_u32()? as usize;
        let bytes = input.get_bytes(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| AtlasError::Serialization(format!("invalid utf-8: {}", e)))
    }
}

impl<T: Persist> Persist for Vec<T> {
    fn encoded_len(&self) -> usize {
        LEN_PREFIX + self.iter().map(Persist::encoded_len).sum::<usize>()
    }

    fn encode(&self, out: &mut Encoder<'_>) -> Result<()> {
        encode_len(out, self.len())?;
        for item in self {
            item.encode(out)?;
        }
        Ok(())
    }

    fn decode(input: &mut Decoder<'_>) -> Result<Self> {
        let len = input.get_u32()? as usize;
        // Every item takes at least one byte, so a corrupt length cannot
        // force an allocation larger than the input.
        let mut items = Vec::with_capacity(len.min(input.remaining()));
        for _ in 0..len {
            items.push(T::decode(input)?);
        }
        Ok(items)
    }
}

impl<T: Persist> Persist for Option<T> {
    fn encoded_len(&self) -> usize {
        1 + self.as_ref().map_or(0, Persist::encoded_len)
    }

    fn encode(&self, out: &mut Encoder<'_>) -> Result<()> {
        match self {
            Some(value) => {
                out.put_u8(1)?;
                value.encode(out)
            }
            None => out.put_u8(0),
        }
    }

    fn decode(input: &mut Decoder<'_>) -> Result<Self> {
        match input.get_u8()? {
            0 => Ok(None),
            1 => Ok(Some(T::decode(input)?)),
            other => Err(AtlasError::Serialization(format!("invalid option tag {}", other))),
        }
    }
}

impl<A: Persist, B: Persist> Persist for (A, B) {
    fn encoded_len(&self) -> usize {
        self.0.encoded_len() + self.1.encoded_len()
    }

    fn encode(&self, out: &mut Encoder<'_>) -> Result<()> {
        self.0.encode(out)?;
        self.1.encode(out)
    }

    fn decode(input: &mut Decoder<'_>) -> Result<Self> {
        let a = A::decode(input)?;
        let b = B::decode(input)?;
        Ok((a, b))
    }
}

impl<A: Persist, B: Persist, C: Persist> Persist for (A, B, C) {
    fn encoded_len(&self) -> usize {
        self.0.encoded_len() + self.1.encoded_len() + self.2.encoded_len()
    }

    fn encode(&self, out: &mut Encoder<'_>) -> Result<()> {
        self.0.encode(out)?;
        self.1.encode(out)?;
        self.2.encode(out)
    }

    fn decode(input: &mut Decoder<'_>) -> Result<Self> {
        let a = A::decode(input)?;
        let b = B::decode(input)?;
        let c = C::decode(input)?;
        Ok((a, b, c))
    }
}

impl Persist for StorageAddress {
    fn encoded_len(&self) -> usize {
        16
    }

    fn encode(&self, out: &mut Encoder<'_>) -> Result<()> {
        out.put_u64(self.addr)?;
        out.put_u64(self.size)
    }

    fn decode(input: &mut Decoder<'_>) -> Result<Self> {
        let addr = input.get_u64()?;
        let size = input.get_u64()?;
        Ok(StorageAddress { addr, size })
    }
}

/// Stores any serde type through bincode
///
/// Layout: `[Len: u32][bincode bytes]`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Bincode<T>(pub T);

impl<T> Bincode<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T: Serialize + DeserializeOwned> Persist for Bincode<T> {
    fn encoded_len(&self) -> usize {
        // Unsizable values fail later in `encode`
        LEN_PREFIX + bincode::serialized_size(&self.0).unwrap_or(0) as usize
    }

    fn encode(&self, out: &mut Encoder<'_>) -> Result<()> {
        let bytes = bincode::serialize(&self.0)?;
        encode_len(out, bytes.len())?;
        out.put_bytes(&bytes)
    }

    fn decode(input: &mut Decoder<'_>) -> Result<Self> {
        let len = input.get_u32()? as usize;
        let bytes = input.get_bytes(len)?;
        Ok(Bincode(bincode::deserialize(bytes)?))
    }
}

//! Byte span cursors
//!
//! Both cursors track three numbers: the current position, the number of
//! bytes used so far and the total capacity of the span. Every access is
//! checked against capacity and fails with [`AtlasError::BufferOverrun`].

use bytes::{Buf, BufMut};

use crate::error::{AtlasError, Result};

/// Write cursor over a mutable byte span
pub struct Encoder<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> Encoder<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Total bytes available
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Bytes written so far
    pub fn used(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Claim the next `len` bytes and advance past them
    fn reserve(&mut self, len: usize) -> Result<&mut [u8]> {
        check_bounds(self.pos, len, self.buf.len())?;
        let start = self.pos;
        self.pos += len;
        Ok(&mut self.buf[start..start + len])
    }

    /// Mutable view of `[offset, offset + len)` without moving the cursor
    pub fn sub_slice(&mut self, offset: usize, len: usize) -> Result<&mut [u8]> {
        check_bounds(offset, len, self.buf.len())?;
        Ok(&mut self.buf[offset..offset + len])
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.reserve(bytes.len())?.copy_from_slice(bytes);
        Ok(())
    }

    pub fn put_u8(&mut self, v: u8) -> Result<()> {
        let mut dst = self.reserve(1)?;
        dst.put_u8(v);
        Ok(())
    }

    pub fn put_u16(&mut self, v: u16) -> Result<()> {
        let mut dst = self.reserve(2)?;
        dst.put_u16_le(v);
        Ok(())
    }

    pub fn put_u32(&mut self, v: u32) -> Result<()> {
        let mut dst = self.reserve(4)?;
        dst.put_u32_le(v);
        Ok(())
    }

    pub fn put_u64(&mut self, v: u64) -> Result<()> {
        let mut dst = self.reserve(8)?;
        dst.put_u64_le(v);
        Ok(())
    }

    pub fn put_i32(&mut self, v: i32) -> Result<()> {
        let mut dst = self.reserve(4)?;
        dst.put_i32_le(v);
        Ok(())
    }

    pub fn put_i64(&mut self, v: i64) -> Result<()> {
        let mut dst = self.reserve(8)?;
        dst.put_i64_le(v);
        Ok(())
    }
}

/// Read cursor over an immutable byte span
pub struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Bytes consumed so far
    pub fn used(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        check_bounds(self.pos, len, self.buf.len())?;
        let start = self.pos;
        self.pos += len;
        Ok(&self.buf[start..start + len])
    }

    /// View of `[offset, offset + len)` without moving the cursor
    pub fn sub_slice(&self, offset: usize, len: usize) -> Result<&'a [u8]> {
        check_bounds(offset, len, self.buf.len())?;
        Ok(&self.buf[offset..offset + len])
    }

    /// Borrow the next `len` bytes
    pub fn get_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        self.take(len)
    }

    pub fn get_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?.get_u8())
    }

    pub fn get_u16(&mut self) -> Result<u16> {
        Ok(self.take(2)?.get_u16_le())
    }

    pub fn get_u32(&mut self) -> Result<u32> {
        Ok(self.take(4)?.get_u32_le())
    }

    pub fn get_u64(&mut self) -> Result<u64> {
        Ok(self.take(8)?.get_u64_le())
    }

    pub fn get_i32(&mut self) -> Result<i32> {
        Ok(self.take(4)?.get_i32_le())
    }

    pub fn get_i64(&mut self) -> Result<i64> {
        Ok(self.take(8)?.get_i64_le())
    }
}

fn check_bounds(offset: usize, len: usize, capacity: usize) -> Result<()> {
    match offset.checked_add(len) {
        Some(end) if end <= capacity => Ok(()),
        _ => Err(AtlasError::BufferOverrun {
            offset: offset as u64,
            len: len as u64,
            capacity: capacity as u64,
        }),
    }
}

// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! TPM 2.0 wire encoding
//!
//! Big-endian serialization used by TPM commands, responses and stored key
//! structures. Variable-length fields use the TPM2B convention of a 16-bit
//! size prefix.

use anyhow::{bail, Result};

/// Growable buffer for building TPM-encoded byte strings
#[derive(Debug, Default)]
pub struct WireWriter {
    data: Vec<u8>,
}

impl WireWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
        }
    }

    pub fn put_u8(&mut self, v: u8) {
        self.data.push(v);
    }

    pub fn put_u16(&mut self, v: u16) {
        self.data.extend_from_slice(&v.to_be_bytes());
    }

    pub fn put_u32(&mut self, v: u32) {
        self.data.extend_from_slice(&v.to_be_bytes());
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Write a TPM2B field: 16-bit size prefix followed by the data
    pub fn put_tpm2b(&mut self, data: &[u8]) {
        self.put_u16(data.len() as u16);
        self.put_bytes(data);
    }

    /// Overwrite a previously written u32, used to patch command size fields
    pub fn patch_u32(&mut self, pos: usize, v: u32) {
        self.data[pos..pos + 4].copy_from_slice(&v.to_be_bytes());
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }
}

/// Cursor over a TPM-encoded byte string
#[derive(Debug)]
pub struct WireReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.remaining() {
            bail!(
                "buffer underflow: need {} bytes, {} remaining",
                len,
                self.remaining()
            );
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub fn get_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn get_u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn get_u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn get_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        Ok(self.take(len)?.to_vec())
    }

    /// Read a TPM2B field: 16-bit size prefix followed by the data
    pub fn get_tpm2b(&mut self) -> Result<Vec<u8>> {
        let size = self.get_u16()? as usize;
        self.get_bytes(size)
    }

    /// Fail if any bytes remain unconsumed
    pub fn expect_end(&self) -> Result<()> {
        if self.remaining() != 0 {
            bail!("{} trailing bytes after structure", self.remaining());
        }
        Ok(())
    }
}

/// Trait for types with a TPM wire encoding
pub trait Marshal {
    fn marshal(&self, w: &mut WireWriter);

    fn to_bytes(&self) -> Vec<u8> {
        let mut w = WireWriter::new();
        self.marshal(&mut w);
        w.into_vec()
    }
}

/// Trait for types parseable from their TPM wire encoding
pub trait Unmarshal: Sized {
    fn unmarshal(r: &mut WireReader) -> Result<Self>;

    fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut r = WireReader::new(data);
        let value = Self::unmarshal(&mut r)?;
        r.expect_end()?;
        Ok(value)
    }
}

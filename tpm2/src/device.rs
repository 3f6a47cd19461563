// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! TPM device communication layer
//!
//! Provides low-level communication with TPM devices via /dev/tpmrm0 or
//! /dev/tpm0, plus command framing and response parsing.

use anyhow::{bail, Context, Result};
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::Path;

use super::constants::*;
use super::wire::*;

/// Maximum TPM command/response size
const TPM_MAX_COMMAND_SIZE: usize = 4096;

/// Transport over which marshalled TPM commands travel.
///
/// The production implementation is [`TpmDevice`]. Tests substitute a
/// scripted transport to exercise command sequencing without hardware.
pub trait TpmTransport {
    /// Send a command to the TPM and receive the raw response
    fn transmit(&mut self, command: &[u8]) -> Result<Vec<u8>>;

    /// Send a command and parse the response header
    fn execute(&mut self, command: &[u8]) -> Result<TpmResponse> {
        let response = self.transmit(command)?;
        TpmResponse::parse(&response)
    }
}

/// TPM character device handle
pub struct TpmDevice {
    file: File,
    path: String,
}

impl TpmDevice {
    /// Open a TPM device
    pub fn open(path: &str) -> Result<Self> {
        // Strip "device:" prefix if present
        let device_path = path.strip_prefix("device:").unwrap_or(path);

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(device_path)
            .with_context(|| format!("failed to open TPM device: {}", device_path))?;

        Ok(Self {
            file,
            path: device_path.to_string(),
        })
    }

    /// Detect and open the default TPM device
    pub fn detect() -> Result<Self> {
        if Path::new("/dev/tpmrm0").exists() {
            Self::open("/dev/tpmrm0")
        } else if Path::new("/dev/tpm0").exists() {
            Self::open("/dev/tpm0")
        } else {
            bail!("TPM device not found")
        }
    }

    /// Get the device path
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl TpmTransport for TpmDevice {
    fn transmit(&mut self, command: &[u8]) -> Result<Vec<u8>> {
        self.file
            .write_all(command)
            .context("failed to write TPM command")?;

        let mut response = vec![0u8; TPM_MAX_COMMAND_SIZE];
        let n = self
            .file
            .read(&mut response)
            .context("failed to read TPM response")?;

        response.truncate(n);
        Ok(response)
    }
}

/// TPM command builder
///
/// All commands issued by this crate run without authorization sessions, so
/// the builder only emits the TPM_ST_NO_SESSIONS framing.
pub struct TpmCommand {
    buf: WireWriter,
}

impl TpmCommand {
    pub fn new(command_code: TpmCc) -> Self {
        let mut buf = WireWriter::with_capacity(256);

        // Header: tag (2) + size (4) + command code (4)
        buf.put_u16(TpmSt::NoSessions.to_u16());
        buf.put_u32(0); // Size placeholder
        buf.put_u32(command_code.to_u32());

        Self { buf }
    }

    /// Add a handle to the command
    pub fn add_handle(&mut self, handle: u32) {
        self.buf.put_u32(handle);
    }

    /// Add a u32 value
    pub fn add_u32(&mut self, v: u32) {
        self.buf.put_u32(v);
    }

    /// Add a TPM2B structure
    pub fn add_tpm2b(&mut self, data: &[u8]) {
        self.buf.put_tpm2b(data);
    }

    /// Add a marshallable structure
    pub fn add<T: Marshal>(&mut self, value: &T) {
        value.marshal(&mut self.buf);
    }

    /// Finalize the command and return the bytes
    pub fn finalize(mut self) -> Vec<u8> {
        let size = self.buf.len() as u32;
        self.buf.patch_u32(2, size);
        self.buf.into_vec()
    }
}

/// TPM response parser
#[derive(Debug)]
pub struct TpmResponse {
    pub tag: TpmSt,
    pub response_code: u32,
    pub data: Vec<u8>,
}

impl TpmResponse {
    /// Parse a TPM response
    pub fn parse(response: &[u8]) -> Result<Self> {
        if response.len() < 10 {
            bail!("TPM response too short: {} bytes", response.len());
        }

        let mut r = WireReader::new(response);

        let tag_raw = r.get_u16()?;
        let tag = TpmSt::from_u16(tag_raw)
            .ok_or_else(|| anyhow::anyhow!("invalid response tag: 0x{:04x}", tag_raw))?;

        let size = r.get_u32()? as usize;
        if response.len() < size || size < 10 {
            bail!(
                "TPM response size mismatch: header says {}, got {}",
                size,
                response.len()
            );
        }

        let response_code = r.get_u32()?;

        // Remaining data after the 10-byte header
        let data = response[10..size].to_vec();

        Ok(Self {
            tag,
            response_code,
            data,
        })
    }

    /// Check if the response indicates success
    pub fn is_success(&self) -> bool {
        self.response_code == 0
    }

    /// Fail with the typed response code unless the response is a success.
    ///
    /// The [`TpmRcError`] stays downcastable through any context added on
    /// top, so callers can distinguish a TPM-reported error from a broken
    /// transport.
    pub fn ensure_success(&self) -> Result<()> {
        if self.is_success() {
            Ok(())
        } else {
            Err(TpmRcError(self.response_code).into())
        }
    }

    /// Get a reader over the response data
    pub fn reader(&self) -> WireReader<'_> {
        WireReader::new(&self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_builder() {
        let mut cmd = TpmCommand::new(TpmCc::FlushContext);
        cmd.add_handle(0x80000001);

        let bytes = cmd.finalize();

        // Check header
        assert_eq!(&bytes[0..2], &[0x80, 0x01]); // TPM_ST_NO_SESSIONS
        assert_eq!(&bytes[6..10], &[0x00, 0x00, 0x01, 0x65]); // TPM_CC_FlushContext
        assert_eq!(&bytes[10..14], &[0x80, 0x00, 0x00, 0x01]);

        // Check size
        let size = u32::from_be_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]);
        assert_eq!(size as usize, bytes.len());
    }

    #[test]
    fn test_response_parse() {
        // Minimal success response
        let response = vec![
            0x80, 0x01, // TPM_ST_NO_SESSIONS
            0x00, 0x00, 0x00, 0x0A, // Size = 10
            0x00, 0x00, 0x00, 0x00, // TPM_RC_SUCCESS
        ];

        let parsed = TpmResponse::parse(&response).unwrap();
        assert!(parsed.is_success());
        assert!(parsed.data.is_empty());
        assert!(parsed.ensure_success().is_ok());
    }

    #[test]
    fn test_error_response_keeps_code() {
        let response = vec![
            0x80, 0x01, // TPM_ST_NO_SESSIONS
            0x00, 0x00, 0x00, 0x0A, // Size = 10
            0x00, 0x00, 0x02, 0xDB, // TPM_RC_SIGNATURE on parameter 2
        ];

        let parsed = TpmResponse::parse(&response).unwrap();
        let err = parsed.ensure_success().unwrap_err();
        let rc = err.downcast_ref::<TpmRcError>().expect("typed code");
        assert_eq!(rc.code(), 0x2DB);
        assert!(rc.is_signature_invalid());

        // Still downcastable with context layered on top
        let err = err.context("VerifySignature failed");
        assert!(err.downcast_ref::<TpmRcError>().is_some());
    }
}

// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! TPM 2.0 command implementations
//!
//! High-level operations over a TPM transport: loading an external public
//! key as a transient object and asking the TPM to verify a signature with
//! it. Loaded objects are modeled as guards so the transient slot is always
//! flushed, whichever way verification ends.

use anyhow::{Context, Result};
use tracing::debug;

use super::constants::*;
use super::device::*;
use super::types::*;
use super::wire::{Marshal, Unmarshal};

/// TPM context bound to a transport
pub struct TpmContext<T = TpmDevice> {
    device: T,
}

impl TpmContext<TpmDevice> {
    /// Create a new TPM context with the given device path, or auto-detect
    pub fn new(device_path: Option<&str>) -> Result<Self> {
        let device = match device_path {
            Some(path) => TpmDevice::open(path)?,
            None => TpmDevice::detect()?,
        };

        Ok(Self { device })
    }

    /// Get the device path
    pub fn device_path(&self) -> &str {
        self.device.path()
    }
}

impl<T: TpmTransport> TpmContext<T> {
    /// Create a TPM context over an arbitrary transport
    pub fn with_transport(device: T) -> Self {
        Self { device }
    }

    /// Consume the context and return the transport
    pub fn into_transport(self) -> T {
        self.device
    }

    /// Load a public key into the TPM as an external, unowned object.
    ///
    /// No sensitive area is supplied, so the resulting transient object can
    /// only be used for operations that need the public half, such as
    /// signature verification. The returned guard flushes the object when
    /// dropped.
    pub fn load_external(
        &mut self,
        public: &TpmtPublic,
        hierarchy: u32,
    ) -> Result<LoadedKey<'_, T>> {
        let mut cmd = TpmCommand::new(TpmCc::LoadExternal);
        // inPrivate (empty: public key only)
        cmd.add_tpm2b(&[]);
        // inPublic
        cmd.add_tpm2b(&public.to_bytes());
        // hierarchy
        cmd.add_u32(hierarchy);

        let response = self.device.execute(&cmd.finalize())?;
        response.ensure_success().context("LoadExternal failed")?;

        let mut r = response.reader();
        let handle = r.get_u32()?;
        let name = r.get_tpm2b()?;

        debug!(
            "loaded external key as transient object 0x{:08x}, name {}",
            handle,
            hex::encode(&name)
        );

        Ok(LoadedKey {
            ctx: self,
            handle,
            name,
        })
    }

    /// Flush a transient object or session handle
    pub fn flush_context(&mut self, handle: u32) -> Result<()> {
        let mut cmd = TpmCommand::new(TpmCc::FlushContext);
        cmd.add_handle(handle);

        let response = self.device.execute(&cmd.finalize())?;
        response.ensure_success().context("FlushContext failed")?;

        Ok(())
    }
}

/// A transient TPM object holding an externally loaded public key.
///
/// Borrows the context for its whole lifetime; dropping the guard issues
/// FlushContext so the transient slot is released on every exit path.
pub struct LoadedKey<'a, T: TpmTransport> {
    ctx: &'a mut TpmContext<T>,
    handle: u32,
    name: Vec<u8>,
}

impl<T: TpmTransport> LoadedKey<'_, T> {
    /// The transient handle assigned by the TPM
    pub fn handle(&self) -> u32 {
        self.handle
    }

    /// The TPM name of the loaded object
    pub fn name(&self) -> &[u8] {
        &self.name
    }

    /// Ask the TPM to verify a signature over a digest with this key.
    ///
    /// A nonzero response code surfaces as a downcastable [`TpmRcError`];
    /// TPM_RC_SIGNATURE is how the TPM reports an invalid signature.
    pub fn verify_signature(
        &mut self,
        digest: &[u8],
        signature: &TpmtSignature,
    ) -> Result<TpmtTkVerified> {
        let mut cmd = TpmCommand::new(TpmCc::VerifySignature);
        // keyHandle
        cmd.add_handle(self.handle);
        // digest
        cmd.add_tpm2b(digest);
        // signature
        cmd.add(signature);

        let response = self.ctx.device.execute(&cmd.finalize())?;
        response
            .ensure_success()
            .context("VerifySignature failed")?;

        let ticket = TpmtTkVerified::unmarshal(&mut response.reader())?;
        Ok(ticket)
    }
}

impl<T: TpmTransport> Drop for LoadedKey<'_, T> {
    fn drop(&mut self) {
        if let Err(err) = self.ctx.flush_context(self.handle) {
            debug!(
                "failed to flush transient object 0x{:08x}: {:#}",
                self.handle, err
            );
        }
    }
}

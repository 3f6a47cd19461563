// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! Sealed key object accessor
//!
//! Reads the stored sealed key blob and exposes the pieces the verifier
//! needs: the static policy's authorization public key, the dynamic
//! policy's authorized digest and signature, and the PCR policy counter
//! handle. The file is consumed, never produced or modified, and all
//! accessors are read-only.
//!
//! On-disk layout (big-endian, TPM2B size-prefixed fields):
//!
//! ```text
//! u32            magic
//! u32            version
//! TPM2B          sealed key private area (opaque here)
//! TPM2B          sealed key public area  (opaque here)
//! u32            PCR policy counter NV index handle
//! TPM2B          TPMT_PUBLIC: authorization public key
//! TPM2B          authorized policy digest
//! TPMT_SIGNATURE authorized policy signature
//! ```

use std::fs;
use std::path::Path;

use anyhow::Context;
use tpm2::{TpmtPublic, TpmtSignature, Unmarshal, WireReader};

use crate::error::{Result, VerifyError};

/// Magic number at the start of a sealed key file
pub const SEALED_KEY_MAGIC: u32 = 0x5553_4B24;

/// The only on-disk format version this tool understands
pub const SEALED_KEY_VERSION: u32 = 1;

/// Invariant part of the authorization scheme
#[derive(Debug, Clone)]
pub struct StaticPolicyData {
    /// Public key trusted to sign authorized policy digests
    pub auth_public_key: TpmtPublic,
}

/// Regenerable part of the authorization scheme
#[derive(Debug, Clone)]
pub struct DynamicPolicyData {
    /// The currently authorized policy digest
    pub authorized_policy: Vec<u8>,
    /// Signature over the authorized policy, bound to the counter identity
    pub authorized_policy_signature: TpmtSignature,
}

/// A parsed sealed key object
#[derive(Debug, Clone)]
pub struct SealedKeyObject {
    version: u32,
    key_private: Vec<u8>,
    key_public: Vec<u8>,
    pcr_policy_counter_handle: u32,
    static_policy: StaticPolicyData,
    dynamic_policy: DynamicPolicyData,
}

impl SealedKeyObject {
    /// Read and parse a sealed key object from a file
    pub fn read_from_file(path: &Path) -> Result<Self> {
        let data = fs::read(path).map_err(|e| {
            VerifyError::MalformedKeyData(
                anyhow::Error::new(e).context(format!("failed to read {}", path.display())),
            )
        })?;
        Self::from_bytes(&data)
    }

    /// Parse a sealed key object from raw bytes
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Self::parse(data).map_err(VerifyError::MalformedKeyData)
    }

    fn parse(data: &[u8]) -> anyhow::Result<Self> {
        let mut r = WireReader::new(data);

        let magic = r.get_u32().context("missing file header")?;
        if magic != SEALED_KEY_MAGIC {
            anyhow::bail!("not a sealed key file (magic 0x{:08x})", magic);
        }
        let version = r.get_u32()?;
        if version != SEALED_KEY_VERSION {
            anyhow::bail!("unsupported sealed key file version {}", version);
        }

        let key_private = r.get_tpm2b().context("bad sealed key private area")?;
        let key_public = r.get_tpm2b().context("bad sealed key public area")?;
        let pcr_policy_counter_handle = r.get_u32()?;

        let auth_key_area = r.get_tpm2b().context("bad authorization key area")?;
        let auth_public_key = TpmtPublic::from_bytes(&auth_key_area)
            .context("bad authorization public key")?;

        let authorized_policy = r.get_tpm2b().context("bad authorized policy digest")?;
        let authorized_policy_signature =
            TpmtSignature::unmarshal(&mut r).context("bad authorized policy signature")?;

        r.expect_end().context("trailing data in sealed key file")?;

        Ok(Self {
            version,
            key_private,
            key_public,
            pcr_policy_counter_handle,
            static_policy: StaticPolicyData { auth_public_key },
            dynamic_policy: DynamicPolicyData {
                authorized_policy,
                authorized_policy_signature,
            },
        })
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Private area of the sealed object, kept opaque
    pub fn key_private(&self) -> &[u8] {
        &self.key_private
    }

    /// Public area of the sealed object, kept opaque
    pub fn key_public(&self) -> &[u8] {
        &self.key_public
    }

    /// NV index of the monotonic counter anchoring the PCR policy.
    /// Identifying data only; this tool never dereferences it.
    pub fn pcr_policy_counter_handle(&self) -> u32 {
        self.pcr_policy_counter_handle
    }

    pub fn static_policy(&self) -> &StaticPolicyData {
        &self.static_policy
    }

    pub fn dynamic_policy(&self) -> &DynamicPolicyData {
        &self.dynamic_policy
    }
}

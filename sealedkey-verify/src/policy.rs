// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! Authorized policy digest reconstruction
//!
//! The authorization signature does not cover the stored policy digest
//! alone: it covers `H(approvedPolicy || policyRef)`, the digest
//! TPM2_PolicyAuthorize binds a signed policy to, where the policy ref ties
//! the approval to one specific NV counter. Both constants here are wire
//! format: the tag and the concatenation order must match what the signer
//! used byte for byte, or verification fails with no further hint.

use sha2::{Digest, Sha256, Sha384, Sha512};
use tpm2::TpmAlgId;

use crate::error::{Result, VerifyError};

/// Domain separation tag mixed into the PCR policy ref
const PCR_POLICY_REF_TAG: &[u8] = b"AUTH-PCR-POLICY";

/// Compute the policy ref binding the PCR policy to its counter.
///
/// Always SHA-256, independent of the authorization key's name algorithm.
pub fn pcr_policy_ref(counter_name: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(PCR_POLICY_REF_TAG);
    hasher.update(counter_name);
    hasher.finalize().to_vec()
}

/// Compute the digest the authorization signature must cover.
///
/// Hashed with the algorithm declared by the authorization public key, not
/// a fixed one.
pub fn policy_authorize_digest(
    name_alg: TpmAlgId,
    approved_policy: &[u8],
    policy_ref: &[u8],
) -> Result<Vec<u8>> {
    let digest = match name_alg {
        TpmAlgId::Sha256 => {
            let mut hasher = Sha256::new();
            hasher.update(approved_policy);
            hasher.update(policy_ref);
            hasher.finalize().to_vec()
        }
        TpmAlgId::Sha384 => {
            let mut hasher = Sha384::new();
            hasher.update(approved_policy);
            hasher.update(policy_ref);
            hasher.finalize().to_vec()
        }
        TpmAlgId::Sha512 => {
            let mut hasher = Sha512::new();
            hasher.update(approved_policy);
            hasher.update(policy_ref);
            hasher.finalize().to_vec()
        }
        other => {
            return Err(VerifyError::UnsupportedKeyType(format!(
                "unsupported name algorithm 0x{:04x}",
                other.to_u16()
            )))
        }
    };

    Ok(digest)
}

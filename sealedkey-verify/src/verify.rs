// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! Signature verification, software and hardware paths
//!
//! The software path re-checks the authorization signature with `p256`
//! before any hardware is touched; a mismatch here is final and the TPM is
//! never consulted. The hardware path then loads the same public key into
//! the TPM as an external object and asks the TPM's own verification
//! primitive for the authoritative answer.

use p256::ecdsa::{signature::hazmat::PrehashVerifier, Signature, VerifyingKey};
use tracing::{debug, warn};

use tpm2::{
    tpm_rh, TpmContext, TpmEccCurve, TpmRcError, TpmTransport, TpmtPublic, TpmtPublicParams,
    TpmtSignature,
};

use crate::error::{Result, VerifyError};

/// Verify the authorization signature in software.
///
/// Returns `Ok(false)` on a legitimate mismatch; errors are reserved for
/// keys and signatures this verifier cannot handle at all.
pub fn verify_policy_signature(
    public: &TpmtPublic,
    digest: &[u8],
    signature: &TpmtSignature,
) -> Result<bool> {
    let (parms, point) = match &public.params {
        TpmtPublicParams::Ecc { parms, unique } => (parms, unique),
        TpmtPublicParams::Rsa { .. } => {
            return Err(VerifyError::UnsupportedKeyType(
                "authorization key is RSA, expected an ECC key".into(),
            ))
        }
    };

    if parms.curve_id != TpmEccCurve::NistP256 {
        return Err(VerifyError::UnsupportedKeyType(format!(
            "unsupported ECC curve 0x{:04x}, expected NIST P-256",
            parms.curve_id.to_u16()
        )));
    }

    let (signature_r, signature_s) = match signature {
        TpmtSignature::EcDsa {
            signature_r,
            signature_s,
            ..
        } => (signature_r, signature_s),
        TpmtSignature::RsaSsa { .. } => {
            return Err(VerifyError::UnsupportedKeyType(
                "authorization signature is RSASSA, expected ECDSA".into(),
            ))
        }
    };

    let x = p256_field_bytes(&point.x).ok_or_else(|| {
        VerifyError::UnsupportedKeyType("ECC point does not fit the P-256 field".into())
    })?;
    let y = p256_field_bytes(&point.y).ok_or_else(|| {
        VerifyError::UnsupportedKeyType("ECC point does not fit the P-256 field".into())
    })?;

    let mut sec1 = Vec::with_capacity(65);
    sec1.push(0x04); // uncompressed point
    sec1.extend_from_slice(&x);
    sec1.extend_from_slice(&y);
    let verifying_key = VerifyingKey::from_sec1_bytes(&sec1).map_err(|e| {
        VerifyError::UnsupportedKeyType(format!("invalid P-256 public key: {e}"))
    })?;

    // R and S are stored as unsigned big-endian integers; an out-of-range
    // value cannot belong to a valid signature
    let (Some(r), Some(s)) = (p256_field_bytes(signature_r), p256_field_bytes(signature_s))
    else {
        warn!("signature R or S out of range for P-256");
        return Ok(false);
    };

    let mut sig_bytes = [0u8; 64];
    sig_bytes[..32].copy_from_slice(&r);
    sig_bytes[32..].copy_from_slice(&s);
    let sig = match Signature::from_slice(&sig_bytes) {
        Ok(sig) => sig,
        Err(e) => {
            warn!("malformed ECDSA signature: {e}");
            return Ok(false);
        }
    };

    match verifying_key.verify_prehash(digest, &sig) {
        Ok(()) => {
            debug!("software verification of the authorization signature succeeded");
            Ok(true)
        }
        Err(e) => {
            warn!("software verification of the authorization signature failed: {e}");
            Ok(false)
        }
    }
}

/// Left-align an unsigned big-endian integer into the P-256 field width.
/// Returns None if the value has more than 32 significant bytes.
fn p256_field_bytes(value: &[u8]) -> Option<[u8; 32]> {
    let stripped = match value.iter().position(|&b| b != 0) {
        Some(first) => &value[first..],
        None => &[],
    };
    if stripped.len() > 32 {
        return None;
    }
    let mut out = [0u8; 32];
    out[32 - stripped.len()..].copy_from_slice(stripped);
    Some(out)
}

/// Cross-check the signature against the live TPM.
///
/// The public key is loaded as a transient external object under the owner
/// hierarchy; the guard returned by `load_external` flushes it again on
/// every exit path. A response code from the verification primitive is a
/// rejection with the code preserved for diagnostics; a dead transport
/// leaves the hardware result indeterminate.
pub fn verify_on_tpm<T: TpmTransport>(
    ctx: &mut TpmContext<T>,
    public: &TpmtPublic,
    digest: &[u8],
    signature: &TpmtSignature,
) -> Result<()> {
    let mut key = ctx
        .load_external(public, tpm_rh::OWNER)
        .map_err(|e| match e.downcast_ref::<TpmRcError>() {
            Some(_) => VerifyError::CommandFailed(e),
            None => VerifyError::DeviceUnavailable(e),
        })?;

    match key.verify_signature(digest, signature) {
        Ok(ticket) => {
            debug!(
                "TPM verified the signature, ticket hierarchy 0x{:08x}",
                ticket.hierarchy
            );
            Ok(())
        }
        Err(e) => match e.downcast_ref::<TpmRcError>() {
            Some(rc) => Err(VerifyError::HardwareRejected(*rc)),
            None => Err(VerifyError::DeviceUnavailable(e)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_bytes_pads_and_strips() {
        let mut expected = [0u8; 32];
        expected[31] = 0x01;
        assert_eq!(p256_field_bytes(&[0x01]), Some(expected));

        // Leading zeros beyond 32 bytes are not significant
        let mut long = vec![0u8; 4];
        long.extend_from_slice(&[0x7F; 32]);
        assert_eq!(p256_field_bytes(&long), Some([0x7F; 32]));

        // 33 significant bytes cannot fit the field
        assert_eq!(p256_field_bytes(&[0x01; 33]), None);

        assert_eq!(p256_field_bytes(&[]), Some([0u8; 32]));
    }
}

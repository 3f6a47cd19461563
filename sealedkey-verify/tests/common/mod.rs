// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! Shared fixtures: a deterministic P-256 authorization key, its TPM public
//! area, and an encoder for sealed key files in the on-disk layout the
//! accessor consumes.
#![allow(dead_code)] // not every test binary uses every fixture

use p256::ecdsa::{signature::hazmat::PrehashSigner, Signature, SigningKey};
use sealedkey_verify::keydata::{SEALED_KEY_MAGIC, SEALED_KEY_VERSION};
use tpm2::{
    Marshal, TpmAlgId, TpmEccCurve, TpmsEccParms, TpmsEccPoint, TpmtPublic, TpmtPublicParams,
    TpmtScheme, TpmtSignature, TpmtSymDefObject, WireWriter,
};

pub const COUNTER_HANDLE: u32 = 0x01880001;

/// Fixed scalar so fixtures are reproducible across runs
pub fn test_signing_key() -> SigningKey {
    let secret: [u8; 32] = [
        0x6f, 0x12, 0x84, 0x3a, 0x5d, 0x20, 0xc1, 0x9e, 0x77, 0x04, 0xe8, 0x3b, 0x41, 0x59, 0xd2,
        0x08, 0x9a, 0x4c, 0x2f, 0xb0, 0x66, 0x8d, 0x13, 0xe5, 0x30, 0xab, 0x71, 0xf4, 0x5c, 0x27,
        0x09, 0xd8,
    ];
    SigningKey::from_slice(&secret).expect("valid P-256 scalar")
}

/// TPMT_PUBLIC area for the signing key's public half
pub fn auth_public_key(key: &SigningKey) -> TpmtPublic {
    let point = key.verifying_key().to_encoded_point(false);
    TpmtPublic {
        name_alg: TpmAlgId::Sha256,
        object_attributes: 0x00040040, // sign | userWithAuth
        auth_policy: Vec::new(),
        params: TpmtPublicParams::Ecc {
            parms: TpmsEccParms {
                symmetric: TpmtSymDefObject::null(),
                scheme: TpmtScheme::ecdsa(TpmAlgId::Sha256),
                curve_id: TpmEccCurve::NistP256,
                kdf: TpmtScheme::null(),
            },
            unique: TpmsEccPoint {
                x: point.x().expect("uncompressed point").to_vec(),
                y: point.y().expect("uncompressed point").to_vec(),
            },
        },
    }
}

/// Sign a precomputed digest and store R and S the way the TPM does
pub fn sign_policy_digest(key: &SigningKey, digest: &[u8]) -> TpmtSignature {
    let sig: Signature = key.sign_prehash(digest).expect("signing failed");
    let (r, s) = sig.split_bytes();
    TpmtSignature::EcDsa {
        hash_alg: TpmAlgId::Sha256,
        signature_r: r.to_vec(),
        signature_s: s.to_vec(),
    }
}

/// Assemble a sealed key file around the given authorization material
pub fn encode_sealed_key(
    public: &TpmtPublic,
    authorized_policy: &[u8],
    signature: &TpmtSignature,
) -> Vec<u8> {
    let mut w = WireWriter::new();
    w.put_u32(SEALED_KEY_MAGIC);
    w.put_u32(SEALED_KEY_VERSION);
    w.put_tpm2b(b"sealed-private-stub");
    w.put_tpm2b(b"sealed-public-stub");
    w.put_u32(COUNTER_HANDLE);
    w.put_tpm2b(&public.to_bytes());
    w.put_tpm2b(authorized_policy);
    signature.marshal(&mut w);
    w.into_vec()
}

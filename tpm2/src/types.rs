// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! TPM 2.0 data types
//!
//! Structures for public key areas and signatures, with both marshalling
//! directions: stored key material is parsed from its wire encoding, and the
//! same structures are re-marshalled when handed back to the TPM.

use anyhow::{bail, Result};

use super::constants::*;
use super::wire::*;

/// TPMT_SYM_DEF_OBJECT - Symmetric algorithm definition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TpmtSymDefObject {
    pub algorithm: TpmAlgId,
    pub key_bits: u16,
    pub mode: TpmAlgId,
}

impl TpmtSymDefObject {
    pub fn null() -> Self {
        Self {
            algorithm: TpmAlgId::Null,
            key_bits: 0,
            mode: TpmAlgId::Null,
        }
    }
}

impl Marshal for TpmtSymDefObject {
    fn marshal(&self, w: &mut WireWriter) {
        w.put_u16(self.algorithm.to_u16());
        if self.algorithm != TpmAlgId::Null {
            w.put_u16(self.key_bits);
            w.put_u16(self.mode.to_u16());
        }
    }
}

impl Unmarshal for TpmtSymDefObject {
    fn unmarshal(r: &mut WireReader) -> Result<Self> {
        let algorithm = get_alg(r)?;
        if algorithm == TpmAlgId::Null {
            return Ok(Self::null());
        }
        let key_bits = r.get_u16()?;
        let mode = get_alg(r)?;
        Ok(Self {
            algorithm,
            key_bits,
            mode,
        })
    }
}

/// Scheme selector plus optional hash algorithm.
///
/// TPMT_ECC_SCHEME, TPMT_RSA_SCHEME and TPMT_KDF_SCHEME all share this wire
/// shape: an algorithm id, followed by a hash algorithm unless null.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TpmtScheme {
    pub scheme: TpmAlgId,
    pub hash_alg: Option<TpmAlgId>,
}

impl TpmtScheme {
    pub fn null() -> Self {
        Self {
            scheme: TpmAlgId::Null,
            hash_alg: None,
        }
    }

    pub fn ecdsa(hash: TpmAlgId) -> Self {
        Self {
            scheme: TpmAlgId::EcDsa,
            hash_alg: Some(hash),
        }
    }
}

impl Marshal for TpmtScheme {
    fn marshal(&self, w: &mut WireWriter) {
        w.put_u16(self.scheme.to_u16());
        if let Some(hash) = self.hash_alg {
            w.put_u16(hash.to_u16());
        }
    }
}

impl Unmarshal for TpmtScheme {
    fn unmarshal(r: &mut WireReader) -> Result<Self> {
        let scheme = get_alg(r)?;
        if scheme == TpmAlgId::Null {
            return Ok(Self::null());
        }
        let hash_alg = Some(get_alg(r)?);
        Ok(Self { scheme, hash_alg })
    }
}

/// TPMS_ECC_POINT - Affine coordinates of an ECC public key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmsEccPoint {
    pub x: Vec<u8>,
    pub y: Vec<u8>,
}

impl Marshal for TpmsEccPoint {
    fn marshal(&self, w: &mut WireWriter) {
        w.put_tpm2b(&self.x);
        w.put_tpm2b(&self.y);
    }
}

impl Unmarshal for TpmsEccPoint {
    fn unmarshal(r: &mut WireReader) -> Result<Self> {
        let x = r.get_tpm2b()?;
        let y = r.get_tpm2b()?;
        Ok(Self { x, y })
    }
}

/// TPMS_ECC_PARMS - ECC key parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmsEccParms {
    pub symmetric: TpmtSymDefObject,
    pub scheme: TpmtScheme,
    pub curve_id: TpmEccCurve,
    pub kdf: TpmtScheme,
}

impl Marshal for TpmsEccParms {
    fn marshal(&self, w: &mut WireWriter) {
        self.symmetric.marshal(w);
        self.scheme.marshal(w);
        w.put_u16(self.curve_id.to_u16());
        self.kdf.marshal(w);
    }
}

impl Unmarshal for TpmsEccParms {
    fn unmarshal(r: &mut WireReader) -> Result<Self> {
        let symmetric = TpmtSymDefObject::unmarshal(r)?;
        let scheme = TpmtScheme::unmarshal(r)?;
        let curve_raw = r.get_u16()?;
        let curve_id = TpmEccCurve::from_u16(curve_raw)
            .ok_or_else(|| anyhow::anyhow!("unknown ECC curve: 0x{:04x}", curve_raw))?;
        let kdf = TpmtScheme::unmarshal(r)?;
        Ok(Self {
            symmetric,
            scheme,
            curve_id,
            kdf,
        })
    }
}

/// TPMS_RSA_PARMS - RSA key parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmsRsaParms {
    pub symmetric: TpmtSymDefObject,
    pub scheme: TpmtScheme,
    pub key_bits: u16,
    pub exponent: u32,
}

impl Marshal for TpmsRsaParms {
    fn marshal(&self, w: &mut WireWriter) {
        self.symmetric.marshal(w);
        self.scheme.marshal(w);
        w.put_u16(self.key_bits);
        w.put_u32(self.exponent);
    }
}

impl Unmarshal for TpmsRsaParms {
    fn unmarshal(r: &mut WireReader) -> Result<Self> {
        let symmetric = TpmtSymDefObject::unmarshal(r)?;
        let scheme = TpmtScheme::unmarshal(r)?;
        let key_bits = r.get_u16()?;
        let exponent = r.get_u32()?;
        Ok(Self {
            symmetric,
            scheme,
            key_bits,
            exponent,
        })
    }
}

/// Type-specific parameters and unique id of a TPMT_PUBLIC area.
///
/// The TPM selects both unions with the same type field, so they are kept
/// together per algorithm family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TpmtPublicParams {
    Ecc {
        parms: TpmsEccParms,
        unique: TpmsEccPoint,
    },
    Rsa {
        parms: TpmsRsaParms,
        unique: Vec<u8>,
    },
}

/// TPMT_PUBLIC - Public area of a TPM object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmtPublic {
    pub name_alg: TpmAlgId,
    pub object_attributes: u32,
    pub auth_policy: Vec<u8>,
    pub params: TpmtPublicParams,
}

impl TpmtPublic {
    /// The TPM_ALG_ID selecting the parameter and unique unions
    pub fn type_alg(&self) -> TpmAlgId {
        match self.params {
            TpmtPublicParams::Ecc { .. } => TpmAlgId::Ecc,
            TpmtPublicParams::Rsa { .. } => TpmAlgId::Rsa,
        }
    }

    /// ECC parameters and point, if this is an ECC key
    pub fn ecc(&self) -> Option<(&TpmsEccParms, &TpmsEccPoint)> {
        match &self.params {
            TpmtPublicParams::Ecc { parms, unique } => Some((parms, unique)),
            _ => None,
        }
    }
}

impl Marshal for TpmtPublic {
    fn marshal(&self, w: &mut WireWriter) {
        w.put_u16(self.type_alg().to_u16());
        w.put_u16(self.name_alg.to_u16());
        w.put_u32(self.object_attributes);
        w.put_tpm2b(&self.auth_policy);
        match &self.params {
            TpmtPublicParams::Ecc { parms, unique } => {
                parms.marshal(w);
                unique.marshal(w);
            }
            TpmtPublicParams::Rsa { parms, unique } => {
                parms.marshal(w);
                w.put_tpm2b(unique);
            }
        }
    }
}

impl Unmarshal for TpmtPublic {
    fn unmarshal(r: &mut WireReader) -> Result<Self> {
        let type_alg = get_alg(r)?;
        let name_alg = get_alg(r)?;
        let object_attributes = r.get_u32()?;
        let auth_policy = r.get_tpm2b()?;
        let params = match type_alg {
            TpmAlgId::Ecc => TpmtPublicParams::Ecc {
                parms: TpmsEccParms::unmarshal(r)?,
                unique: TpmsEccPoint::unmarshal(r)?,
            },
            TpmAlgId::Rsa => TpmtPublicParams::Rsa {
                parms: TpmsRsaParms::unmarshal(r)?,
                unique: r.get_tpm2b()?,
            },
            other => bail!("unsupported public area type: 0x{:04x}", other.to_u16()),
        };
        Ok(Self {
            name_alg,
            object_attributes,
            auth_policy,
            params,
        })
    }
}

/// TPMT_SIGNATURE - Signature with algorithm selectors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TpmtSignature {
    /// TPMS_SIGNATURE_ECDSA: R and S as unsigned big-endian integers
    EcDsa {
        hash_alg: TpmAlgId,
        signature_r: Vec<u8>,
        signature_s: Vec<u8>,
    },
    /// TPMS_SIGNATURE_RSA
    RsaSsa { hash_alg: TpmAlgId, signature: Vec<u8> },
}

impl TpmtSignature {
    pub fn sig_alg(&self) -> TpmAlgId {
        match self {
            TpmtSignature::EcDsa { .. } => TpmAlgId::EcDsa,
            TpmtSignature::RsaSsa { .. } => TpmAlgId::RsaSsa,
        }
    }

    pub fn hash_alg(&self) -> TpmAlgId {
        match self {
            TpmtSignature::EcDsa { hash_alg, .. } => *hash_alg,
            TpmtSignature::RsaSsa { hash_alg, .. } => *hash_alg,
        }
    }
}

impl Marshal for TpmtSignature {
    fn marshal(&self, w: &mut WireWriter) {
        w.put_u16(self.sig_alg().to_u16());
        w.put_u16(self.hash_alg().to_u16());
        match self {
            TpmtSignature::EcDsa {
                signature_r,
                signature_s,
                ..
            } => {
                w.put_tpm2b(signature_r);
                w.put_tpm2b(signature_s);
            }
            TpmtSignature::RsaSsa { signature, .. } => {
                w.put_tpm2b(signature);
            }
        }
    }
}

impl Unmarshal for TpmtSignature {
    fn unmarshal(r: &mut WireReader) -> Result<Self> {
        let sig_alg = get_alg(r)?;
        match sig_alg {
            TpmAlgId::EcDsa => {
                let hash_alg = get_alg(r)?;
                let signature_r = r.get_tpm2b()?;
                let signature_s = r.get_tpm2b()?;
                Ok(TpmtSignature::EcDsa {
                    hash_alg,
                    signature_r,
                    signature_s,
                })
            }
            TpmAlgId::RsaSsa => {
                let hash_alg = get_alg(r)?;
                let signature = r.get_tpm2b()?;
                Ok(TpmtSignature::RsaSsa { hash_alg, signature })
            }
            other => bail!("unsupported signature algorithm: 0x{:04x}", other.to_u16()),
        }
    }
}

/// TPMT_TK_VERIFIED - Ticket returned by TPM2_VerifySignature
#[derive(Debug, Clone)]
pub struct TpmtTkVerified {
    pub hierarchy: u32,
    pub digest: Vec<u8>,
}

impl Unmarshal for TpmtTkVerified {
    fn unmarshal(r: &mut WireReader) -> Result<Self> {
        let tag = r.get_u16()?;
        if tag != TPM_ST_VERIFIED {
            bail!("unexpected ticket tag: 0x{:04x}", tag);
        }
        let hierarchy = r.get_u32()?;
        let digest = r.get_tpm2b()?;
        Ok(Self { hierarchy, digest })
    }
}

fn get_alg(r: &mut WireReader) -> Result<TpmAlgId> {
    let raw = r.get_u16()?;
    TpmAlgId::from_u16(raw).ok_or_else(|| anyhow::anyhow!("unknown algorithm: 0x{:04x}", raw))
}

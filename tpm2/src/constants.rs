// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! TPM 2.0 constants, command codes and response codes

/// TPM 2.0 Command Codes (TPM_CC)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum TpmCc {
    FlushContext = 0x00000165,
    LoadExternal = 0x00000167,
    VerifySignature = 0x00000177,
}

impl TpmCc {
    pub fn to_u32(self) -> u32 {
        self as u32
    }
}

/// TPM command/response header tag (TPM_ST)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum TpmSt {
    RspCommand = 0x00C4,
    NoSessions = 0x8001,
    Sessions = 0x8002,
}

impl TpmSt {
    pub fn to_u16(self) -> u16 {
        self as u16
    }

    pub fn from_u16(v: u16) -> Option<Self> {
        match v {
            0x00C4 => Some(TpmSt::RspCommand),
            0x8001 => Some(TpmSt::NoSessions),
            0x8002 => Some(TpmSt::Sessions),
            _ => None,
        }
    }
}

/// Structure tag of the TPMT_TK_VERIFIED ticket returned by VerifySignature
pub const TPM_ST_VERIFIED: u16 = 0x8022;

/// A nonzero TPM response code, preserved verbatim for diagnostics.
///
/// Response codes come in two formats. Format-one codes (bit 7 set) carry a
/// 6-bit error number plus handle/parameter position info; the position bits
/// must be masked off before comparing against an error number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("TPM response code 0x{0:08x}")]
pub struct TpmRcError(pub u32);

impl TpmRcError {
    const RC_FMT1: u32 = 0x080;
    const RC_SIGNATURE: u32 = 0x01B;

    /// The raw response code as reported by the TPM.
    pub fn code(self) -> u32 {
        self.0
    }

    pub fn is_format_one(self) -> bool {
        self.0 & Self::RC_FMT1 != 0
    }

    /// True if this is TPM_RC_SIGNATURE: the signature itself was rejected,
    /// as opposed to a malformed command or an unusable key.
    pub fn is_signature_invalid(self) -> bool {
        self.is_format_one() && self.0 & 0x03F == Self::RC_SIGNATURE
    }
}

/// TPM 2.0 Algorithm IDs (TPM_ALG_ID)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum TpmAlgId {
    Rsa = 0x0001,
    Sha1 = 0x0004,
    Aes = 0x0006,
    KeyedHash = 0x0008,
    Sha256 = 0x000B,
    Sha384 = 0x000C,
    Sha512 = 0x000D,
    Null = 0x0010,
    RsaSsa = 0x0014,
    RsaPss = 0x0016,
    EcDsa = 0x0018,
    Ecc = 0x0023,
    SymCipher = 0x0025,
    Cfb = 0x0043,
}

impl TpmAlgId {
    pub fn to_u16(self) -> u16 {
        self as u16
    }

    pub fn from_u16(v: u16) -> Option<Self> {
        match v {
            0x0001 => Some(TpmAlgId::Rsa),
            0x0004 => Some(TpmAlgId::Sha1),
            0x0006 => Some(TpmAlgId::Aes),
            0x0008 => Some(TpmAlgId::KeyedHash),
            0x000B => Some(TpmAlgId::Sha256),
            0x000C => Some(TpmAlgId::Sha384),
            0x000D => Some(TpmAlgId::Sha512),
            0x0010 => Some(TpmAlgId::Null),
            0x0014 => Some(TpmAlgId::RsaSsa),
            0x0016 => Some(TpmAlgId::RsaPss),
            0x0018 => Some(TpmAlgId::EcDsa),
            0x0023 => Some(TpmAlgId::Ecc),
            0x0025 => Some(TpmAlgId::SymCipher),
            0x0043 => Some(TpmAlgId::Cfb),
            _ => None,
        }
    }

    pub fn digest_size(self) -> usize {
        match self {
            TpmAlgId::Sha1 => 20,
            TpmAlgId::Sha256 => 32,
            TpmAlgId::Sha384 => 48,
            TpmAlgId::Sha512 => 64,
            _ => 0,
        }
    }
}

/// ECC Curve IDs (TPM_ECC_CURVE)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum TpmEccCurve {
    None = 0x0000,
    NistP256 = 0x0003,
    NistP384 = 0x0004,
    NistP521 = 0x0005,
}

impl TpmEccCurve {
    pub fn to_u16(self) -> u16 {
        self as u16
    }

    pub fn from_u16(v: u16) -> Option<Self> {
        match v {
            0x0000 => Some(TpmEccCurve::None),
            0x0003 => Some(TpmEccCurve::NistP256),
            0x0004 => Some(TpmEccCurve::NistP384),
            0x0005 => Some(TpmEccCurve::NistP521),
            _ => None,
        }
    }
}

/// TPM 2.0 Permanent Handles
pub mod tpm_rh {
    pub const OWNER: u32 = 0x40000001;
    pub const NULL: u32 = 0x40000007;
    pub const ENDORSEMENT: u32 = 0x4000000B;
    pub const PLATFORM: u32 = 0x4000000C;
}

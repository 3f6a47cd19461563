// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! Error taxonomy for sealed key verification
//!
//! Every stage fails fast with exactly one of these kinds, so callers can
//! tell a provably wrong signature apart from an unreadable key file or a
//! TPM that could not be consulted at all.

use thiserror::Error;
use tpm2::TpmRcError;

pub type Result<T, E = VerifyError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum VerifyError {
    /// Bad caller-supplied input, such as a counter name that is not hex
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The sealed key file is unreadable or structurally invalid
    #[error("malformed sealed key data: {0:#}")]
    MalformedKeyData(anyhow::Error),

    /// The stored public key is not of the expected algorithm family
    #[error("unsupported key type: {0}")]
    UnsupportedKeyType(String),

    /// Software verification says the signature does not cover the policy
    #[error("the authorization policy signature does not match")]
    SignatureMismatch,

    /// The TPM device could not be opened or the transport broke mid-call.
    /// The hardware result is indeterminate, which is not the same thing as
    /// a rejected signature.
    #[error("TPM device unavailable: {0:#}")]
    DeviceUnavailable(anyhow::Error),

    /// The TPM answered a non-verification command with an error code
    #[error("TPM command failed: {0:#}")]
    CommandFailed(anyhow::Error),

    /// The TPM's verification primitive rejected the signature
    #[error("the TPM rejected the authorization policy signature: {0}")]
    HardwareRejected(TpmRcError),
}

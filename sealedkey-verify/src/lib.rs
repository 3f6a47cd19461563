// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! Sealed key authorization signature verification
//!
//! A sealed key object carries a dynamic authorization policy: a policy
//! digest plus a signature by the key's trusted authorization key, bound to
//! the NV counter that anchors the PCR policy. This crate reconstructs the
//! digest that signature must cover, checks the signature in software, and
//! cross-checks it against the TPM that would later unseal the key.
//!
//! # Architecture
//! - **Accessor**: [`keydata::SealedKeyObject`] parses the stored blob
//! - **Reconstruction**: [`policy`] recomputes the signed digest
//! - **Verification**: [`verify`] runs the software check, then the
//!   hardware check over a loaded external key
//!
//! The tool only ever loads the public half of the authorization key; it
//! performs no unsealing and writes nothing to the TPM.

use crate::error::Result;

pub mod error;
pub mod keydata;
pub mod policy;
pub mod verify;

pub use error::VerifyError;

/// Decode the hex counter name supplied on the command line.
///
/// Odd-length or non-hex input is rejected before any hashing happens.
pub fn decode_counter_name(arg: &str) -> Result<Vec<u8>> {
    hex::decode(arg)
        .map_err(|e| VerifyError::InvalidInput(format!("counter name is not valid hex: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_counter_name() {
        assert_eq!(decode_counter_name("aabb").unwrap(), vec![0xAA, 0xBB]);
        assert_eq!(decode_counter_name("AABB").unwrap(), vec![0xAA, 0xBB]);

        // Odd length
        assert!(matches!(
            decode_counter_name("aab").unwrap_err(),
            VerifyError::InvalidInput(_)
        ));
        // Not hex
        assert!(matches!(
            decode_counter_name("zz").unwrap_err(),
            VerifyError::InvalidInput(_)
        ));
    }
}

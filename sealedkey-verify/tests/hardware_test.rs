// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! Hardware-path tests over a scripted TPM transport
//!
//! The fake TPM accounts for transient object slots, so these tests prove
//! the loaded authorization key is flushed on every exit path: verified,
//! rejected, and transport death mid-call.

mod common;

use anyhow::{bail, Result};
use common::*;

use sealedkey_verify::{policy, verify, VerifyError};
use tpm2::{TpmCc, TpmContext, TpmSt, TpmTransport, TpmtPublic, TpmtSignature, WireWriter};

/// TPM_RC_SIGNATURE flagged on parameter 2, as a real TPM reports it
const RC_SIGNATURE_PARAM_2: u32 = 0x000002DB;
/// TPM_RC_SCHEME flagged on parameter 2
const RC_SCHEME_PARAM_2: u32 = 0x000002D2;

#[derive(Default)]
struct FakeTpm {
    /// Transient handles currently occupying slots
    live: Vec<u32>,
    /// Every handle that was flushed, in order
    flushed: Vec<u32>,
    handles_issued: u32,
    /// Response code for VerifySignature, 0 for success
    verify_rc: u32,
    /// Response code for LoadExternal, 0 for success
    load_rc: u32,
    /// Simulate the device going away once the key is loaded
    die_on_verify: bool,
}

impl FakeTpm {
    fn success(payload: impl FnOnce(&mut WireWriter)) -> Vec<u8> {
        let mut w = WireWriter::new();
        w.put_u16(TpmSt::NoSessions.to_u16());
        w.put_u32(0);
        w.put_u32(0); // TPM_RC_SUCCESS
        payload(&mut w);
        w.patch_u32(2, w.len() as u32);
        w.into_vec()
    }

    fn error(rc: u32) -> Vec<u8> {
        let mut w = WireWriter::new();
        w.put_u16(TpmSt::NoSessions.to_u16());
        w.put_u32(10);
        w.put_u32(rc);
        w.into_vec()
    }
}

impl TpmTransport for FakeTpm {
    fn transmit(&mut self, command: &[u8]) -> Result<Vec<u8>> {
        let cc = u32::from_be_bytes(command[6..10].try_into().unwrap());

        if cc == TpmCc::LoadExternal.to_u32() {
            if self.load_rc != 0 {
                return Ok(Self::error(self.load_rc));
            }
            let handle = 0x8000_0000 + self.handles_issued;
            self.handles_issued += 1;
            self.live.push(handle);
            Ok(Self::success(|w| {
                w.put_u32(handle);
                w.put_tpm2b(&[0x5A; 34]); // name: alg id + SHA-256 digest
            }))
        } else if cc == TpmCc::VerifySignature.to_u32() {
            if self.die_on_verify {
                bail!("device went away");
            }
            if self.verify_rc != 0 {
                return Ok(Self::error(self.verify_rc));
            }
            Ok(Self::success(|w| {
                w.put_u16(0x8022); // TPM_ST_VERIFIED
                w.put_u32(0x4000_0001); // hierarchy
                w.put_tpm2b(&[0xD1; 32]);
            }))
        } else if cc == TpmCc::FlushContext.to_u32() {
            let handle = u32::from_be_bytes(command[10..14].try_into().unwrap());
            self.live.retain(|&h| h != handle);
            self.flushed.push(handle);
            Ok(Self::success(|_| {}))
        } else {
            bail!("unexpected command code 0x{:08x}", cc);
        }
    }
}

fn fixture() -> (TpmtPublic, Vec<u8>, TpmtSignature) {
    let key = test_signing_key();
    let public = auth_public_key(&key);
    let digest = policy::policy_authorize_digest(
        public.name_alg,
        &[0x11u8; 32],
        &policy::pcr_policy_ref(&[0xAA, 0xBB]),
    )
    .unwrap();
    let signature = sign_policy_digest(&key, &digest);
    (public, digest, signature)
}

#[test]
fn test_verified_signature_releases_slot() {
    let (public, digest, signature) = fixture();
    let mut ctx = TpmContext::with_transport(FakeTpm::default());

    verify::verify_on_tpm(&mut ctx, &public, &digest, &signature).unwrap();

    let tpm = ctx.into_transport();
    assert!(tpm.live.is_empty(), "transient slot not released");
    assert_eq!(tpm.flushed, vec![0x8000_0000]);
}

#[test]
fn test_rejected_signature_reports_code_and_releases_slot() {
    let (public, digest, signature) = fixture();
    let mut ctx = TpmContext::with_transport(FakeTpm {
        verify_rc: RC_SIGNATURE_PARAM_2,
        ..Default::default()
    });

    let err = verify::verify_on_tpm(&mut ctx, &public, &digest, &signature).unwrap_err();
    match err {
        VerifyError::HardwareRejected(rc) => {
            assert_eq!(rc.code(), RC_SIGNATURE_PARAM_2);
            assert!(rc.is_signature_invalid());
        }
        other => panic!("expected HardwareRejected, got {other:?}"),
    }

    let tpm = ctx.into_transport();
    assert!(tpm.live.is_empty(), "transient slot not released");
    assert_eq!(tpm.flushed.len(), 1);
}

#[test]
fn test_other_verify_error_is_still_a_rejection() {
    let (public, digest, signature) = fixture();
    let mut ctx = TpmContext::with_transport(FakeTpm {
        verify_rc: RC_SCHEME_PARAM_2,
        ..Default::default()
    });

    let err = verify::verify_on_tpm(&mut ctx, &public, &digest, &signature).unwrap_err();
    match err {
        VerifyError::HardwareRejected(rc) => {
            assert_eq!(rc.code(), RC_SCHEME_PARAM_2);
            assert!(!rc.is_signature_invalid());
        }
        other => panic!("expected HardwareRejected, got {other:?}"),
    }
    assert!(ctx.into_transport().live.is_empty());
}

#[test]
fn test_transport_death_is_indeterminate_and_releases_slot() {
    let (public, digest, signature) = fixture();
    let mut ctx = TpmContext::with_transport(FakeTpm {
        die_on_verify: true,
        ..Default::default()
    });

    let err = verify::verify_on_tpm(&mut ctx, &public, &digest, &signature).unwrap_err();
    assert!(
        matches!(err, VerifyError::DeviceUnavailable(_)),
        "a dead transport must not read as a rejected signature"
    );

    let tpm = ctx.into_transport();
    assert!(tpm.live.is_empty(), "flush not attempted after failure");
    assert_eq!(tpm.flushed.len(), 1);
}

#[test]
fn test_rejected_load_is_a_command_failure() {
    let (public, digest, signature) = fixture();
    let mut ctx = TpmContext::with_transport(FakeTpm {
        load_rc: 0x000001C2, // TPM_RC_ATTRIBUTES on parameter 1
        ..Default::default()
    });

    let err = verify::verify_on_tpm(&mut ctx, &public, &digest, &signature).unwrap_err();
    assert!(matches!(err, VerifyError::CommandFailed(_)));

    let tpm = ctx.into_transport();
    assert!(tpm.live.is_empty());
    assert!(tpm.flushed.is_empty(), "nothing was loaded, nothing to flush");
}

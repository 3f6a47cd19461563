// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! Pure Rust TPM 2.0 command layer
//!
//! This crate talks directly to the TPM character device, without C library
//! dependencies, and implements the small command set needed to check an
//! authorization signature against the hardware:
//!
//! - `LoadExternal`: load a bare public key as a transient, unowned object
//! - `VerifySignature`: verify a signature over a digest with a loaded key
//! - `FlushContext`: release a transient object slot
//!
//! Loaded keys are returned as guards that flush themselves when dropped.
//!
//! ## Example
//!
//! ```no_run
//! use tpm2::{tpm_rh, TpmContext};
//! # fn example(public: &tpm2::TpmtPublic, digest: &[u8], sig: &tpm2::TpmtSignature) -> anyhow::Result<()> {
//! let mut ctx = TpmContext::new(None)?; // Auto-detect TPM device
//! let mut key = ctx.load_external(public, tpm_rh::OWNER)?;
//! key.verify_signature(digest, sig)?;
//! # Ok(())
//! # }
//! ```

mod commands;
mod constants;
mod device;
mod types;
mod wire;

pub use commands::{LoadedKey, TpmContext};
pub use constants::*;
pub use types::*;

// Re-export the transport layer for tests and advanced usage
pub use device::{TpmCommand, TpmDevice, TpmResponse, TpmTransport};
pub use wire::{Marshal, Unmarshal, WireReader, WireWriter};

// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;
use std::process;

use clap::Parser;
use tracing::{debug, info};

use sealedkey_verify::error::VerifyError;
use sealedkey_verify::keydata::SealedKeyObject;
use sealedkey_verify::{decode_counter_name, policy, verify};
use tpm2::TpmContext;

/// Check the authorization policy signature of a sealed key object, first in
/// software and then against the TPM that would unseal it
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// Sealed key file to check
    key_file: PathBuf,

    /// TPM name of the PCR policy counter, hex encoded
    counter_name: String,

    /// TPM device path (default: auto-detect /dev/tpmrm0, /dev/tpm0)
    #[arg(long)]
    device: Option<String>,
}

fn run(cli: &Cli) -> Result<(), VerifyError> {
    let key_object = SealedKeyObject::read_from_file(&cli.key_file)?;
    let counter_name = decode_counter_name(&cli.counter_name)?;

    info!(
        "sealed key uses PCR policy counter NV index 0x{:08x}",
        key_object.pcr_policy_counter_handle()
    );

    let public = &key_object.static_policy().auth_public_key;
    let dynamic = key_object.dynamic_policy();

    let policy_ref = policy::pcr_policy_ref(&counter_name);
    let digest =
        policy::policy_authorize_digest(public.name_alg, &dynamic.authorized_policy, &policy_ref)?;
    debug!("authorized policy digest to verify: {}", hex::encode(&digest));

    // A signature the software verifier rejects is provably wrong; the TPM
    // is not consulted in that case
    if !verify::verify_policy_signature(public, &digest, &dynamic.authorized_policy_signature)? {
        return Err(VerifyError::SignatureMismatch);
    }

    let mut ctx = TpmContext::new(cli.device.as_deref()).map_err(VerifyError::DeviceUnavailable)?;
    debug!("using TPM device {}", ctx.device_path());

    verify::verify_on_tpm(
        &mut ctx,
        public,
        &digest,
        &dynamic.authorized_policy_signature,
    )
}

fn main() {
    {
        use tracing_subscriber::{fmt, EnvFilter};
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        fmt().with_env_filter(filter).init();
    }

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // Usage errors share the failure exit code with every other
            // error; --help and --version still exit clean
            let _ = e.print();
            process::exit(if e.use_stderr() { 1 } else { 0 });
        }
    };

    match run(&cli) {
        Ok(()) => {
            println!("The TPM validated the authorization policy signature.");
        }
        Err(err) => {
            eprintln!("error: {err}");
            process::exit(1);
        }
    }
}

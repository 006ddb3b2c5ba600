// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Command-line entry points: the service itself plus the two helpers an
//! operator needs to produce `SEAL_KEY` and `MODERATOR_KEY_HASH`.

use base64ct::{Base64, Encoding};
use clap::{Parser, Subcommand};

use crate::codec::{CryptoError, SecretCodec, DEFAULT_PBKDF2_ITERATIONS};
use crate::config::PBKDF2_ITERATIONS_ENV;

/// Credential Escrow - moderated shared-account lending service.
#[derive(Parser)]
#[command(name = "credential-escrow", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the HTTP service (default)
    Serve,

    /// Print a fresh base64 value for SEAL_KEY
    GenSealKey,

    /// Read a console key from stdin and print its MODERATOR_KEY_HASH digest
    HashConsoleKey {
        /// PBKDF2 work factor baked into the digest
        #[arg(long, env = PBKDF2_ITERATIONS_ENV, default_value_t = DEFAULT_PBKDF2_ITERATIONS)]
        iterations: u32,
    },
}

/// Base64 of a new random seal key, in the form `SEAL_KEY` expects.
pub fn new_seal_key() -> Result<String, CryptoError> {
    Ok(Base64::encode_string(&SecretCodec::generate_seal_key()?))
}

/// Digest of a console key for `MODERATOR_KEY_HASH`.
pub fn console_key_digest(key: &str, iterations: u32) -> Result<String, CryptoError> {
    // Hashing never touches the seal key.
    let codec = SecretCodec::new(&SecretCodec::generate_seal_key()?, iterations)?;
    codec.hash(key.trim_end_matches(['\r', '\n']))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::SEAL_KEY_LEN;
    use crate::config::EscrowConfig;

    #[test]
    fn generated_seal_key_loads_as_config() {
        let key = new_seal_key().unwrap();
        assert_ne!(key, new_seal_key().unwrap());

        let config = EscrowConfig::from_lookup(|var| match var {
            "SEAL_KEY" => Some(key.clone()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.seal_key.len(), SEAL_KEY_LEN);
    }

    #[test]
    fn console_digest_verifies_without_line_ending() {
        let digest = console_key_digest("console-key\n", 10).unwrap();
        let codec = crate::codec::test_codec();
        assert!(codec.verify("console-key", &digest).unwrap());
        assert!(!codec.verify("console-key\n", &digest).unwrap());
    }

    #[test]
    fn serve_is_the_default() {
        let cli = Cli::try_parse_from(["credential-escrow"]).unwrap();
        assert!(cli.command.is_none());

        let cli = Cli::try_parse_from(["credential-escrow", "gen-seal-key"]).unwrap();
        assert!(matches!(cli.command, Some(Command::GenSealKey)));
    }
}

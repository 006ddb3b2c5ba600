// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Secret Codec
//!
//! Two distinct treatments for secrets:
//!
//! - **Hash** (`hash` / `verify`): one-way PBKDF2-HMAC-SHA256 with a random
//!   per-digest salt. Used for member passwords, the moderator key and game
//!   usernames, which are only ever compared.
//! - **Seal** (`seal` / `unseal`): AES-256-GCM under a key only this service
//!   holds. Used for game credentials that must later be disclosed verbatim
//!   to a grantee.
//!
//! ## Encodings
//!
//! ```text
//! pbkdf2-sha256$<iterations>$<salt b64>$<digest b64>
//! v1$<nonce b64>$<ciphertext+tag b64>
//! ```
//!
//! Malformed input on `verify` / `unseal` is a [`CryptoError`], never a
//! plain "wrong secret" answer.

use std::fmt;
use std::num::NonZeroU32;

use base64ct::{Base64, Encoding};
use ring::aead::{self, Aad, LessSafeKey, Nonce, UnboundKey, NONCE_LEN};
use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};

/// Identifier prefix of encoded password digests.
const DIGEST_SCHEME: &str = "pbkdf2-sha256";

/// Version prefix of sealed values.
const SEAL_VERSION: &str = "v1";

/// Length of the AES-256-GCM key in bytes.
pub const SEAL_KEY_LEN: usize = 32;

const SALT_LEN: usize = 16;
const DIGEST_LEN: usize = 32;

/// Associated data bound into every seal.
const SEAL_AAD: &[u8] = b"credential-escrow/seal/v1";

/// Default PBKDF2 work factor for production.
pub const DEFAULT_PBKDF2_ITERATIONS: u32 = 600_000;

/// Codec failures. Always fatal for the operation in progress.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CryptoError {
    #[error("seal key must be exactly 32 bytes")]
    InvalidKey,

    #[error("hash work factor must be at least 1")]
    InvalidWorkFactor,

    #[error("malformed digest: {0}")]
    MalformedDigest(&'static str),

    #[error("malformed sealed value: {0}")]
    MalformedSeal(&'static str),

    #[error("sealing failed")]
    SealFailed,

    #[error("sealed value failed authentication")]
    UnsealFailed,

    #[error("system random source unavailable")]
    Rng,
}

/// Hashes and seals secrets. Cheap to share behind an `Arc`.
pub struct SecretCodec {
    seal_key: LessSafeKey,
    iterations: NonZeroU32,
    rng: SystemRandom,
}

impl fmt::Debug for SecretCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretCodec")
            .field("iterations", &self.iterations)
            .finish_non_exhaustive()
    }
}

impl SecretCodec {
    /// Build a codec from a raw 32-byte seal key and a PBKDF2 iteration count.
    pub fn new(seal_key: &[u8], iterations: u32) -> Result<Self, CryptoError> {
        if seal_key.len() != SEAL_KEY_LEN {
            return Err(CryptoError::InvalidKey);
        }
        let unbound =
            UnboundKey::new(&aead::AES_256_GCM, seal_key).map_err(|_| CryptoError::InvalidKey)?;
        let iterations = NonZeroU32::new(iterations).ok_or(CryptoError::InvalidWorkFactor)?;

        Ok(Self {
            seal_key: LessSafeKey::new(unbound),
            iterations,
            rng: SystemRandom::new(),
        })
    }

    /// Generate a fresh random seal key.
    pub fn generate_seal_key() -> Result<[u8; SEAL_KEY_LEN], CryptoError> {
        let mut key = [0u8; SEAL_KEY_LEN];
        SystemRandom::new()
            .fill(&mut key)
            .map_err(|_| CryptoError::Rng)?;
        Ok(key)
    }

    /// One-way salted digest of an authentication secret.
    pub fn hash(&self, secret: &str) -> Result<String, CryptoError> {
        let mut salt = [0u8; SALT_LEN];
        self.rng.fill(&mut salt).map_err(|_| CryptoError::Rng)?;

        let mut digest = [0u8; DIGEST_LEN];
        pbkdf2::derive(
            pbkdf2::PBKDF2_HMAC_SHA256,
            self.iterations,
            &salt,
            secret.as_bytes(),
            &mut digest,
        );

        Ok(format!(
            "{DIGEST_SCHEME}${}${}${}",
            self.iterations,
            Base64::encode_string(&salt),
            Base64::encode_string(&digest)
        ))
    }

    /// Check a secret against a digest produced by [`SecretCodec::hash`].
    ///
    /// The digest carries its own work factor, so digests made under an older
    /// iteration count still verify.
    pub fn verify(&self, secret: &str, digest: &str) -> Result<bool, CryptoError> {
        let mut parts = digest.split('$');
        let scheme = parts.next().ok_or(CryptoError::MalformedDigest("empty"))?;
        if scheme != DIGEST_SCHEME {
            return Err(CryptoError::MalformedDigest("unknown scheme"));
        }
        let iterations = parts
            .next()
            .and_then(|raw| raw.parse::<u32>().ok())
            .and_then(NonZeroU32::new)
            .ok_or(CryptoError::MalformedDigest("bad work factor"))?;
        let salt = parts
            .next()
            .and_then(|raw| Base64::decode_vec(raw).ok())
            .ok_or(CryptoError::MalformedDigest("bad salt"))?;
        let expected = parts
            .next()
            .and_then(|raw| Base64::decode_vec(raw).ok())
            .ok_or(CryptoError::MalformedDigest("bad digest"))?;
        if parts.next().is_some() {
            return Err(CryptoError::MalformedDigest("trailing fields"));
        }
        if salt.is_empty() || expected.len() != DIGEST_LEN {
            return Err(CryptoError::MalformedDigest("bad length"));
        }

        let outcome = pbkdf2::verify(
            pbkdf2::PBKDF2_HMAC_SHA256,
            iterations,
            &salt,
            secret.as_bytes(),
            &expected,
        );
        Ok(outcome.is_ok())
    }

    /// Spend the work of a [`SecretCodec::verify`] when there is no digest to
    /// check against, so a missing account costs as much as a wrong secret.
    pub fn verify_absent(&self, secret: &str) {
        let mut digest = [0u8; DIGEST_LEN];
        pbkdf2::derive(
            pbkdf2::PBKDF2_HMAC_SHA256,
            self.iterations,
            &[0u8; SALT_LEN],
            secret.as_bytes(),
            &mut digest,
        );
    }

    /// Reversibly encrypt a secret destined for later disclosure.
    pub fn seal(&self, secret: &str) -> Result<String, CryptoError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|_| CryptoError::Rng)?;
        let nonce = Nonce::assume_unique_for_key(nonce_bytes);

        let mut in_out = secret.as_bytes().to_vec();
        self.seal_key
            .seal_in_place_append_tag(nonce, Aad::from(SEAL_AAD), &mut in_out)
            .map_err(|_| CryptoError::SealFailed)?;

        Ok(format!(
            "{SEAL_VERSION}${}${}",
            Base64::encode_string(&nonce_bytes),
            Base64::encode_string(&in_out)
        ))
    }

    /// Recover a secret sealed by [`SecretCodec::seal`] under the same key.
    pub fn unseal(&self, sealed: &str) -> Result<String, CryptoError> {
        let mut parts = sealed.split('$');
        if parts.next() != Some(SEAL_VERSION) {
            return Err(CryptoError::MalformedSeal("unknown version"));
        }
        let nonce_bytes = parts
            .next()
            .and_then(|raw| Base64::decode_vec(raw).ok())
            .ok_or(CryptoError::MalformedSeal("bad nonce"))?;
        let mut in_out = parts
            .next()
            .and_then(|raw| Base64::decode_vec(raw).ok())
            .ok_or(CryptoError::MalformedSeal("bad ciphertext"))?;
        if parts.next().is_some() {
            return Err(CryptoError::MalformedSeal("trailing fields"));
        }

        let nonce = Nonce::try_assume_unique_for_key(&nonce_bytes)
            .map_err(|_| CryptoError::MalformedSeal("bad nonce length"))?;
        let plaintext = self
            .seal_key
            .open_in_place(nonce, Aad::from(SEAL_AAD), &mut in_out)
            .map_err(|_| CryptoError::UnsealFailed)?;

        String::from_utf8(plaintext.to_vec()).map_err(|_| CryptoError::UnsealFailed)
    }
}

#[cfg(test)]
pub(crate) fn test_codec() -> SecretCodec {
    SecretCodec::new(&[7u8; SEAL_KEY_LEN], 10).expect("test codec")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn hash_then_verify() {
        let codec = test_codec();
        let digest = codec.hash("hunter2").unwrap();

        assert!(digest.starts_with("pbkdf2-sha256$10$"));
        assert!(codec.verify("hunter2", &digest).unwrap());
        assert!(!codec.verify("hunter3", &digest).unwrap());
    }

    #[test]
    fn hashes_are_salted() {
        let codec = test_codec();
        let a = codec.hash("same").unwrap();
        let b = codec.hash("same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn verify_honours_digest_work_factor() {
        let old = SecretCodec::new(&[7u8; SEAL_KEY_LEN], 3).unwrap();
        let digest = old.hash("pw").unwrap();
        assert!(test_codec().verify("pw", &digest).unwrap());
    }

    #[test]
    fn malformed_digest_is_an_error_not_a_mismatch() {
        let codec = test_codec();
        for bad in [
            "",
            "plain-text",
            "bcrypt$10$c2FsdA==$ZGlnZXN0",
            "pbkdf2-sha256$0$c2FsdA==$ZGlnZXN0",
            "pbkdf2-sha256$10$!!!$ZGlnZXN0",
            "pbkdf2-sha256$10$c2FsdA==$c2hvcnQ=",
        ] {
            assert!(
                matches!(codec.verify("x", bad), Err(CryptoError::MalformedDigest(_))),
                "expected malformed digest for {bad:?}"
            );
        }
    }

    #[test]
    fn seal_hides_plaintext() {
        let codec = test_codec();
        let sealed = codec.seal("p@ss").unwrap();
        assert!(sealed.starts_with("v1$"));
        assert!(!sealed.contains("p@ss"));
        assert_ne!(sealed, codec.seal("p@ss").unwrap());
    }

    #[test]
    fn tampered_seal_fails_authentication() {
        let codec = test_codec();
        let sealed = codec.seal("p@ss").unwrap();
        let (head, body) = sealed.rsplit_once('$').unwrap();
        let mut raw = Base64::decode_vec(body).unwrap();
        raw[0] ^= 0x01;
        let tampered = format!("{head}${}", Base64::encode_string(&raw));

        assert_eq!(codec.unseal(&tampered), Err(CryptoError::UnsealFailed));
    }

    #[test]
    fn foreign_key_cannot_unseal() {
        let sealed = test_codec().seal("p@ss").unwrap();
        let other = SecretCodec::new(&[9u8; SEAL_KEY_LEN], 10).unwrap();
        assert_eq!(other.unseal(&sealed), Err(CryptoError::UnsealFailed));
    }

    #[test]
    fn malformed_seal_is_rejected() {
        let codec = test_codec();
        assert!(matches!(codec.unseal("v2$a$b"), Err(CryptoError::MalformedSeal(_))));
        assert!(matches!(codec.unseal("v1$AAAA$AAAA"), Err(CryptoError::MalformedSeal(_))));
        assert!(matches!(codec.unseal("v1"), Err(CryptoError::MalformedSeal(_))));
    }

    #[test]
    fn key_length_is_enforced() {
        assert_eq!(SecretCodec::new(&[0u8; 16], 10).unwrap_err(), CryptoError::InvalidKey);
        assert_eq!(
            SecretCodec::new(&[0u8; SEAL_KEY_LEN], 0).unwrap_err(),
            CryptoError::InvalidWorkFactor
        );
    }

    proptest! {
        #[test]
        fn unseal_inverts_seal(password in "\\PC{1,256}") {
            let codec = test_codec();
            let sealed = codec.seal(&password).unwrap();
            prop_assert_eq!(codec.unseal(&sealed).unwrap(), password);
        }
    }
}

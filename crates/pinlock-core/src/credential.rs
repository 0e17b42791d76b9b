//! Salted credential digests
//!
//! A credential is stored as `SHA-256(secret || hex(salt))` together with the
//! salt. Hashing the hex form of the salt keeps digests compatible with state
//! files that store both fields as hex strings. The plaintext secret is only
//! held for the duration of a hash call and is wiped afterwards.

use std::fmt;

use rand::{rngs::OsRng, RngCore};
use sha2::{Digest as _, Sha256};
use zeroize::Zeroizing;

use crate::{CoreError, Result, DIGEST_LENGTH, SALT_LENGTH, SECRET_LENGTH};

/// Random per-credential salt
#[derive(Clone, PartialEq, Eq)]
pub struct Salt([u8; SALT_LENGTH]);

impl Salt {
    /// Generate a fresh salt from the operating system CSPRNG
    pub fn generate() -> Self {
        let mut bytes = [0u8; SALT_LENGTH];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; SALT_LENGTH]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SALT_LENGTH] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a salt from its persisted hex form
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s)?;
        let actual = bytes.len();
        let bytes: [u8; SALT_LENGTH] = bytes.try_into().map_err(|_| CoreError::InvalidLength {
            expected: SALT_LENGTH,
            actual,
        })?;
        Ok(Self(bytes))
    }
}

impl fmt::Debug for Salt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Salt(..)")
    }
}

/// SHA-256 digest of a salted secret
#[derive(Clone, PartialEq, Eq)]
pub struct Digest([u8; DIGEST_LENGTH]);

impl Digest {
    pub fn as_bytes(&self) -> &[u8; DIGEST_LENGTH] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a digest from its persisted hex form
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s)?;
        let actual = bytes.len();
        let bytes: [u8; DIGEST_LENGTH] =
            bytes.try_into().map_err(|_| CoreError::InvalidLength {
                expected: DIGEST_LENGTH,
                actual,
            })?;
        Ok(Self(bytes))
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Digest(..)")
    }
}

/// A configured credential: digest plus the salt it was derived with
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Credential {
    digest: Digest,
    salt: Salt,
}

impl Credential {
    /// Derive a new credential from a secret with a freshly generated salt
    pub fn derive(secret: &str) -> Result<Self> {
        if !is_valid_format(secret) {
            return Err(CoreError::InvalidFormat(SECRET_LENGTH));
        }
        let salt = Salt::generate();
        let digest = hash_secret(secret, &salt);
        Ok(Self { digest, salt })
    }

    /// Rebuild a credential from persisted hex fields
    ///
    /// Returns `Ok(None)` when either field is empty.
    pub fn from_hex_parts(hash: &str, salt: &str) -> Result<Option<Self>> {
        if hash.is_empty() || salt.is_empty() {
            return Ok(None);
        }
        Ok(Some(Self {
            digest: Digest::from_hex(hash)?,
            salt: Salt::from_hex(salt)?,
        }))
    }

    pub fn digest(&self) -> &Digest {
        &self.digest
    }

    pub fn salt(&self) -> &Salt {
        &self.salt
    }

    /// Check a candidate secret against this credential in constant time
    pub fn matches(&self, secret: &str) -> bool {
        let candidate = hash_secret(secret, &self.salt);
        constant_time_eq(candidate.as_bytes(), self.digest.as_bytes())
    }
}

/// Hash `secret || hex(salt)` with SHA-256
pub fn hash_secret(secret: &str, salt: &Salt) -> Digest {
    let mut input = Zeroizing::new(Vec::with_capacity(secret.len() + SALT_LENGTH * 2));
    input.extend_from_slice(secret.as_bytes());
    input.extend_from_slice(salt.to_hex().as_bytes());

    let out = Sha256::digest(input.as_slice());
    let mut bytes = [0u8; DIGEST_LENGTH];
    bytes.copy_from_slice(&out);
    Digest(bytes)
}

/// Verify a secret against persisted hex fields
///
/// Never fails: an empty or undecodable digest or salt simply yields `false`.
pub fn verify_secret(secret: &str, stored_hash: &str, salt: &str) -> bool {
    match Credential::from_hex_parts(stored_hash, salt) {
        Ok(Some(credential)) => credential.matches(secret),
        Ok(None) | Err(_) => false,
    }
}

/// A secret is exactly four ASCII digits
pub fn is_valid_format(secret: &str) -> bool {
    secret.len() == SECRET_LENGTH && secret.bytes().all(|b| b.is_ascii_digit())
}

/// Compare two byte slices without short-circuiting on content
///
/// Lengths are public (digests are fixed size), so a length mismatch
/// returns early.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

//! Verification code generation and hashing.
//!
//! # Security
//!
//! - Codes are drawn from the operating system CSPRNG (`OsRng`). If it
//!   cannot be read, generation fails with
//!   [`AuthError::EntropyUnavailable`]; there is no fallback source.
//! - Characters are picked by rejection sampling, so every symbol of the
//!   alphabet is equally likely (no modulo bias).
//! - Only an HMAC-SHA-256 of the code is stored. The HMAC key is a
//!   server-side pepper and the input is bound to the subject and purpose,
//!   so a hash copied between keys never verifies.
//! - Hashes are compared in constant time.

use crate::constants::codes::{DEFAULT_LENGTH, MAX_LENGTH, MIN_LENGTH};
use crate::error::{AuthError, Result};
use crate::state::VerificationKey;
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;

type HmacSha256 = Hmac<Sha256>;

/// Symbols a code is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CodeAlphabet {
    /// `0-9`.
    #[default]
    Numeric,
    /// `0-9` and `A-Z` without the look-alikes `0`, `O`, `1`, `I`.
    Alphanumeric,
}

impl CodeAlphabet {
    const NUMERIC: &'static [u8] = b"0123456789";
    const ALPHANUMERIC: &'static [u8] = b"23456789ABCDEFGHJKLMNPQRSTUVWXYZ";

    /// The symbols, as bytes.
    #[must_use]
    pub const fn symbols(self) -> &'static [u8] {
        match self {
            Self::Numeric => Self::NUMERIC,
            Self::Alphanumeric => Self::ALPHANUMERIC,
        }
    }
}

/// A verification code, generated or as submitted by a user.
///
/// Lives only long enough to be dispatched or checked. `Debug` never
/// prints it.
#[derive(Clone, PartialEq, Eq)]
pub struct VerificationCode(String);

impl VerificationCode {
    /// Wrap a code typed by the user.
    #[must_use]
    pub fn submitted(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The code as sent to the subject.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for VerificationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("VerificationCode([REDACTED])")
    }
}

/// Generates verification codes.
#[derive(Debug, Clone, Copy)]
pub struct CodeGenerator {
    length: usize,
    alphabet: CodeAlphabet,
}

impl Default for CodeGenerator {
    fn default() -> Self {
        Self {
            length: DEFAULT_LENGTH,
            alphabet: CodeAlphabet::Numeric,
        }
    }
}

impl CodeGenerator {
    /// Create a generator.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::ConfigError`] if `length` is outside
    /// `MIN_LENGTH..=MAX_LENGTH`.
    pub fn new(length: usize, alphabet: CodeAlphabet) -> Result<Self> {
        if !(MIN_LENGTH..=MAX_LENGTH).contains(&length) {
            return Err(AuthError::ConfigError(format!(
                "code length must be between {MIN_LENGTH} and {MAX_LENGTH}, got {length}"
            )));
        }
        Ok(Self { length, alphabet })
    }

    /// Configured code length.
    #[must_use]
    pub const fn length(&self) -> usize {
        self.length
    }

    /// Configured alphabet.
    #[must_use]
    pub const fn alphabet(&self) -> CodeAlphabet {
        self.alphabet
    }

    /// Generate a code.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::EntropyUnavailable`] if the OS random source
    /// fails.
    pub fn generate(&self) -> Result<VerificationCode> {
        self.generate_from(&mut OsRng)
    }

    /// Read the random source once so a broken source stops startup
    /// instead of the first login.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::EntropyUnavailable`] if the OS random source
    /// fails.
    pub fn probe() -> Result<()> {
        let mut buf = [0u8; 16];
        OsRng.try_fill_bytes(&mut buf).map_err(|e| {
            tracing::error!(error = %e, "OS random source unavailable");
            AuthError::EntropyUnavailable
        })
    }

    fn generate_from<R: RngCore>(&self, rng: &mut R) -> Result<VerificationCode> {
        let symbols = self.alphabet.symbols();
        // Largest multiple of the alphabet size that fits in a byte; bytes
        // at or above it are redrawn.
        let limit = 256 - (256 % symbols.len());

        let mut code = String::with_capacity(self.length);
        let mut buf = [0u8; 32];
        while code.len() < self.length {
            rng.try_fill_bytes(&mut buf).map_err(|e| {
                tracing::error!(error = %e, "OS random source unavailable");
                AuthError::EntropyUnavailable
            })?;
            for &byte in &buf {
                if usize::from(byte) >= limit {
                    continue;
                }
                code.push(char::from(symbols[usize::from(byte) % symbols.len()]));
                if code.len() == self.length {
                    break;
                }
            }
        }

        Ok(VerificationCode(code))
    }
}

/// Hex-encoded keyed hash of a code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CodeHash(String);

impl CodeHash {
    /// Wrap a stored hex digest.
    #[must_use]
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    /// Hex digest, for persisting.
    #[must_use]
    pub fn as_hex(&self) -> &str {
        &self.0
    }

    /// Constant-time equality.
    #[must_use]
    pub fn matches(&self, other: &Self) -> bool {
        constant_time_eq::constant_time_eq(self.0.as_bytes(), other.0.as_bytes())
    }
}

/// Keyed hasher for codes.
#[derive(Clone)]
pub struct CodeHasher {
    mac: HmacSha256,
}

impl fmt::Debug for CodeHasher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodeHasher").finish_non_exhaustive()
    }
}

impl CodeHasher {
    /// Create a hasher keyed with `pepper`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::ConfigError`] if the HMAC cannot be keyed.
    pub fn new(pepper: &SecretString) -> Result<Self> {
        let mac = HmacSha256::new_from_slice(pepper.expose_secret().as_bytes())
            .map_err(|e| AuthError::ConfigError(format!("invalid code pepper: {e}")))?;
        Ok(Self { mac })
    }

    /// Hash a code for `key`.
    ///
    /// Surrounding whitespace of a submitted code is ignored.
    #[must_use]
    pub fn hash(&self, key: &VerificationKey, code: &str) -> CodeHash {
        let mut mac = self.mac.clone();
        mac.update(key.purpose.as_str().as_bytes());
        mac.update(b"\0");
        mac.update(key.subject.as_str().as_bytes());
        mac.update(b"\0");
        mac.update(code.trim().as_bytes());
        CodeHash(hex::encode(mac.finalize().into_bytes()))
    }
}

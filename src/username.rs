//! Validated user names.
//!
//! # Background
//!
//! A user name travels three paths that must agree exactly: the management
//! side stores a verifier under it, the client hashes it into `x`, and the
//! server looks it up when the peer identifies itself. If any of the three
//! folds case differently, or accepts a character the others reject, a user
//! can end up unable to log in or, worse, logging in against someone else's
//! verifier.
//!
//! The only manageable solution is a restricted charset with one canonical
//! folding. Names are limited to ASCII letters, digits and `_`, `.`, `-`;
//! comparisons and the hashed form fold to ASCII lowercase. Everything else
//! is rejected before it reaches cryptography or storage.

use std::fmt;
use std::fmt::{Display, Formatter};

use crate::error::UsernameError;

/// Shortest accepted user name, in characters.
pub const MIN_USERNAME_LENGTH: usize = 3;

/// Longest accepted user name, in characters.
pub const MAX_USERNAME_LENGTH: usize = 64;

/// A user name known to contain only allowed characters.
///
/// Equality and hashing are case-insensitive; the original spelling is kept
/// for display. The case-folded form is what SRP hashes and what the user
/// catalog keys records by.
#[derive(Debug, Clone)]
pub struct Username {
    raw: String,
}

impl Username {
    /// Validates length and charset.
    ///
    /// Allowed characters are ASCII letters, digits, `_`, `.` and `-`,
    /// between [`MIN_USERNAME_LENGTH`] and [`MAX_USERNAME_LENGTH`]
    /// characters.
    ///
    /// # Errors
    ///
    /// One [`UsernameError`] naming the violated rule.
    pub fn new(s: impl Into<String>) -> Result<Self, UsernameError> {
        let raw = s.into();

        let length = raw.chars().count();
        if length < MIN_USERNAME_LENGTH {
            return Err(UsernameError::TooShort(MIN_USERNAME_LENGTH));
        }
        if length > MAX_USERNAME_LENGTH {
            return Err(UsernameError::TooLong(MAX_USERNAME_LENGTH));
        }

        for c in raw.chars() {
            if !c.is_ascii_alphanumeric() && c != '_' && c != '.' && c != '-' {
                return Err(UsernameError::BadCharacter(c));
            }
        }

        Ok(Self { raw })
    }

    /// The name as entered.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// ASCII-lowercase folding; the canonical form for lookups and for the
    /// SRP `x` computation.
    pub fn key(&self) -> String {
        self.raw.to_ascii_lowercase()
    }
}

impl PartialEq for Username {
    fn eq(&self, other: &Self) -> bool {
        self.raw.eq_ignore_ascii_case(&other.raw)
    }
}

impl Eq for Username {}

impl std::hash::Hash for Username {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        for b in self.raw.bytes() {
            state.write_u8(b.to_ascii_lowercase());
        }
    }
}

impl Display for Username {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl AsRef<str> for Username {
    fn as_ref(&self) -> &str {
        &self.raw
    }
}

//! Single-use approval tokens.
//!
//! A token is `width` bytes drawn from the operating system CSPRNG and
//! rendered as lower-case hex. The configured width only governs
//! generation: parsing is case-insensitive and accepts hex of any width in
//! [`MIN_TOKEN_BYTES`]..=[`MAX_TOKEN_BYTES`], so tokens issued before a
//! width change stay redeemable while malformed input never reaches the
//! store.

use std::fmt;

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::{ApprovalError, ApprovalResult};

/// Default token width in bytes (16 hex characters).
pub const DEFAULT_TOKEN_BYTES: usize = 8;
/// Smallest accepted token width in bytes.
pub const MIN_TOKEN_BYTES: usize = 4;
/// Largest accepted token width in bytes.
pub const MAX_TOKEN_BYTES: usize = 32;

/// An opaque approval token, always stored in canonical lower-case form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApprovalToken(String);

impl ApprovalToken {
    /// Parse a caller-supplied token.
    ///
    /// Returns `None` for anything that is not an even number of hex digits
    /// encoding between [`MIN_TOKEN_BYTES`] and [`MAX_TOKEN_BYTES`] bytes.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.len() % 2 != 0 || !(MIN_TOKEN_BYTES..=MAX_TOKEN_BYTES).contains(&(raw.len() / 2)) {
            return None;
        }
        if !raw.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        Some(Self(raw.to_ascii_lowercase()))
    }

    /// The canonical hex string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ApprovalToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Produces fresh tokens of a fixed width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenGenerator {
    width_bytes: usize,
}

impl TokenGenerator {
    /// Create a generator for `width_bytes`-byte tokens.
    ///
    /// # Errors
    ///
    /// Returns [`ApprovalError::Internal`] if the width is outside
    /// [`MIN_TOKEN_BYTES`]..=[`MAX_TOKEN_BYTES`].
    pub fn new(width_bytes: usize) -> ApprovalResult<Self> {
        if !(MIN_TOKEN_BYTES..=MAX_TOKEN_BYTES).contains(&width_bytes) {
            return Err(ApprovalError::Internal(format!(
                "token width must be between {MIN_TOKEN_BYTES} and {MAX_TOKEN_BYTES} bytes, \
                 got {width_bytes}"
            )));
        }
        Ok(Self { width_bytes })
    }

    /// Token width in bytes.
    #[must_use]
    pub fn width_bytes(&self) -> usize {
        self.width_bytes
    }

    /// Draw a new token from the OS random source.
    #[must_use]
    pub fn generate(&self) -> ApprovalToken {
        let mut buf = vec![0u8; self.width_bytes];
        rand::rngs::OsRng.fill_bytes(&mut buf);
        ApprovalToken(hex::encode(buf))
    }
}

impl Default for TokenGenerator {
    fn default() -> Self {
        Self {
            width_bytes: DEFAULT_TOKEN_BYTES,
        }
    }
}

//! Access token generation.
//!
//! Tokens are drawn uniformly from the 62-symbol alphabet `[A-Za-z0-9]`
//! using the operating system CSPRNG. For `n` tokens of length `len` the
//! birthday bound gives a collision probability of at most
//! `n^2 / 62^len`; with the default length of 16 that is below `10^-25`
//! even for a thousand sessions, so callers treat tokens as unique.

use std::fmt::{Debug, Display, Formatter};

use rand::distributions::{Alphanumeric, DistString};
use rand::rngs::OsRng;

/// Shared-secret token guarding one session.
///
/// `Debug` output is redacted so tokens never leak through `{:?}` logging.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct AccessToken(String);

impl AccessToken {
    /// Wrap an existing token value.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Token value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for AccessToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl Debug for AccessToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "AccessToken(<{} chars>)", self.0.len())
    }
}

/// Generate a random alphanumeric token of `length` characters.
#[must_use]
pub fn generate_token(length: usize) -> AccessToken {
    AccessToken(Alphanumeric.sample_string(&mut OsRng, length))
}

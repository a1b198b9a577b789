//! Credentials that must not end up in logs.

use std::{fmt, str::FromStr};

use serde::Deserialize;
use veil::Redact;

use crate::error::{Error, Result};

/// An access token: the Yandex Music OAuth token or a Telegram bot token.
///
/// Debug output is redacted. [`Display`](fmt::Display) reveals the token
/// and is only meant for building request headers and URLs.
#[derive(Clone, PartialEq, Eq, Hash, Deserialize, Redact)]
#[serde(try_from = "String")]
#[redact(all)]
pub struct Token(String);

impl Token {
    /// Returns the token as sent over the wire.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl FromStr for Token {
    type Err = Error;

    /// Parses a token, trimming surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the token is empty or contains
    /// characters that cannot go into a header.
    fn from_str(s: &str) -> Result<Self> {
        let token = s.trim();
        if token.is_empty() {
            return Err(Error::invalid_argument("token is empty"));
        }

        if let Some(chr) = token.chars().find(|chr| !chr.is_ascii_graphic()) {
            return Err(Error::invalid_argument(format!(
                "token contains invalid character {chr:?}"
            )));
        }

        Ok(Self(token.to_owned()))
    }
}

impl TryFrom<String> for Token {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

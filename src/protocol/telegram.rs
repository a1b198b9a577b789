//! Telegram Bot API requests and responses.
//!
//! Every method is a JSON `POST` to `https://api.telegram.org/bot{token}/{method}`
//! and every response has the same envelope:
//!
//! ```json
//! {"ok": false, "error_code": 429, "description": "Too Many Requests: retry after 35", "parameters": {"retry_after": 35}}
//! ```
//!
//! Errors are reported in the envelope, often with a non-2xx status code,
//! so the body must be parsed regardless of status.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A Bot API method.
pub trait Method: Serialize {
    /// Method name as it appears in the URL path.
    const NAME: &'static str;

    /// Type of the `result` field on success.
    type Output: for<'de> Deserialize<'de> + std::fmt::Debug;
}

/// Response envelope.
#[derive(Clone, Debug, Deserialize)]
pub struct Response<T> {
    pub ok: bool,

    #[serde(default = "Option::default")]
    pub result: Option<T>,

    #[serde(default)]
    pub error_code: Option<u16>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub parameters: Option<ResponseParameters>,
}

#[derive(Copy, Clone, Debug, Default, Deserialize, PartialEq, Eq)]
pub struct ResponseParameters {
    /// Seconds to wait before the request may be repeated.
    #[serde(default)]
    pub retry_after: Option<u64>,
}

impl<T> Response<T> {
    /// Converts the envelope into the method result.
    ///
    /// # Errors
    ///
    /// * `ResourceExhausted` with a retry hint when flood control kicks in
    /// * `OutOfRange` when a text exceeds the length Telegram accepts
    /// * `Unauthenticated` when the bot token is rejected
    /// * `NotFound` for unknown chats or methods
    /// * `InvalidArgument` for other rejected requests
    /// * `Unavailable` for server side failures
    pub fn into_result(self) -> Result<T> {
        if self.ok {
            return self
                .result
                .ok_or_else(|| Error::invalid_argument("response without result"));
        }

        let description = self
            .description
            .unwrap_or_else(|| "no description".to_owned());

        if let Some(seconds) = self.parameters.and_then(|parameters| parameters.retry_after) {
            return Err(Error::rate_limited(Duration::from_secs(seconds)));
        }

        Err(match self.error_code {
            Some(400) if description.to_lowercase().contains("too long") => {
                Error::out_of_range(description)
            }
            Some(400) => Error::invalid_argument(description),
            Some(401 | 403) => Error::unauthenticated(description),
            Some(404) => Error::not_found(description),
            Some(429) => Error::resource_exhausted(description),
            Some(code) if code >= 500 => Error::unavailable(description),
            _ => Error::unknown(description),
        })
    }
}

/// `getMyDescription`
#[derive(Clone, Debug, Default, Serialize)]
pub struct GetMyDescription<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language_code: Option<&'a str>,
}

impl Method for GetMyDescription<'_> {
    const NAME: &'static str = "getMyDescription";
    type Output = BotDescription;
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
pub struct BotDescription {
    #[serde(default)]
    pub description: String,
}

/// `setMyDescription`
#[derive(Clone, Debug, Serialize)]
pub struct SetMyDescription<'a> {
    pub description: &'a str,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub language_code: Option<&'a str>,
}

impl Method for SetMyDescription<'_> {
    const NAME: &'static str = "setMyDescription";
    type Output = bool;
}

/// `sendMessage`
#[derive(Clone, Debug, Serialize)]
pub struct SendMessage<'a> {
    /// Numeric identifier or `@username`.
    pub chat_id: &'a str,

    pub text: &'a str,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub parse_mode: Option<&'static str>,

    /// Forum topic to post into.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_thread_id: Option<i64>,
}

impl Method for SendMessage<'_> {
    const NAME: &'static str = "sendMessage";
    type Output = serde_json::Value;
}

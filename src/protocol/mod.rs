//! Wire types for the remote services that ynison-bio talks to.
//!
//! # Submodules
//!
//! * [`ynison`] - Ynison redirector and player state service (websocket)
//! * [`catalog`] - Yandex Music track catalog (HTTP)
//! * [`telegram`] - Telegram Bot API (HTTP)
//!
//! # Shared Functionality
//!
//! [`json`] parses a response body and logs it, so that protocol changes on
//! the remote end can be diagnosed from a trace log:
//!
//! ```
//! use ynison_bio::protocol;
//!
//! let redirect: protocol::ynison::Redirect = protocol::json(&body, "GetRedirectToYnison")?;
//! ```

pub mod catalog;
pub mod telegram;
pub mod ynison;

use crate::error::Result;
use serde::Deserialize;
use std::fmt::Debug;

/// Parses and logs JSON responses.
///
/// # Arguments
///
/// * `body` - Response body text to parse
/// * `origin` - Description of the endpoint for logging
///
/// # Errors
///
/// Returns an `InvalidArgument` error if the body is not valid JSON or does
/// not match the structure of `T`.
///
/// # Logging
///
/// * Success: Logs parsed structure at TRACE level
/// * Parse Error: Logs raw JSON at TRACE level if valid JSON
/// * Invalid JSON: Logs error and raw text at ERROR level
pub fn json<T>(body: &str, origin: &str) -> Result<T>
where
    T: for<'de> Deserialize<'de> + Debug,
{
    match serde_json::from_str(body) {
        Ok(result) => {
            trace!("{origin}: {result:#?}");
            Ok(result)
        }
        Err(e) => {
            if let Ok(json) = serde_json::from_str::<serde_json::Value>(body) {
                trace!("{origin}: {json:#?}");
            } else {
                error!("{origin}: failed parsing response ({e:?})");
                trace!("{body}");
            }
            Err(e.into())
        }
    }
}

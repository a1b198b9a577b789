//! Telegram Bot API client.
//!
//! Used for two things: the bot's description as the profile field that
//! shows the current status, and alert messages.

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use url::Url;

use crate::{
    config::Config,
    error::{Error, Result},
    http,
    protocol::{
        self,
        telegram::{Method, Response},
    },
    token::Token,
};

/// Bot API client for a single bot.
pub struct Bot {
    http: http::Client,

    /// `https://api.telegram.org/bot{token}/`
    ///
    /// Never log this.
    base_url: Url,
}

impl Bot {
    /// Creates a client for the bot with `token`.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be created or the API URL is
    /// invalid.
    pub fn new(config: &Config, token: &Token) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let base_url = config
            .telegram_url
            .join(&format!("bot{}/", token.expose()))?;

        Ok(Self {
            http: http::Client::new(config, headers)?,
            base_url,
        })
    }

    /// Calls a Bot API method.
    ///
    /// # Errors
    ///
    /// Returns the error reported by the Bot API (see
    /// [`Response::into_result`]), or a transport error.
    pub async fn call<M>(&self, method: &M) -> Result<M::Output>
    where
        M: Method,
    {
        let url = self.base_url.join(M::NAME)?;
        let body = serde_json::to_string(method)?;
        let request = self.http.post(url, body);

        let response = self.http.execute(request).await?;
        let status = response.status();
        let body = response.text().await?;

        // Errors come with a JSON body, except when a proxy in front of the
        // API fails.
        if status.is_server_error() && !body.trim_start().starts_with('{') {
            return Err(Error::unavailable(format!("{} failed with {status}", M::NAME)));
        }

        protocol::json::<Response<M::Output>>(&body, M::NAME)?.into_result()
    }
}

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;
use url::Url;
use veil::Redact;

use crate::{
    error::{Error, Result},
    protocol::ynison::Device,
    token::Token,
};

/// Credentials read from the secrets file.
///
/// ```toml
/// token = "y0_AgAAAAA..."
/// bot_token = "123456:ABC-DEF..."
/// chat_id = "-1001234567890"
/// ```
#[derive(Clone, PartialEq, Eq, Deserialize, Redact)]
pub struct Secrets {
    /// Yandex Music OAuth token.
    #[redact]
    pub token: Option<Token>,

    /// Telegram bot token.
    #[redact]
    pub bot_token: Option<Token>,

    /// Chat to post alerts to.
    #[serde(default)]
    pub chat_id: Option<String>,
}

impl Secrets {
    /// Largest secrets file that will be read.
    pub const MAX_FILE_SIZE: u64 = 4096;

    /// Reads secrets from a TOML file.
    ///
    /// # Errors
    ///
    /// * `NotFound` if the file does not exist
    /// * `OutOfRange` if the file is suspiciously large
    /// * `InvalidArgument` if the file is not valid TOML or a token is
    ///   malformed
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        // Prevent out-of-memory condition: secrets file should be small.
        let file_size = fs::metadata(path)?.len();
        if file_size > Self::MAX_FILE_SIZE {
            return Err(Error::out_of_range(format!(
                "{} is too large ({file_size} bytes)",
                path.display()
            )));
        }

        let contents = fs::read_to_string(path)?;
        toml::from_str(&contents).map_err(|e| {
            Error::invalid_argument(format!("{} format is invalid: {e}", path.display()))
        })
    }
}

/// Telegram Bot API settings.
#[derive(Clone, PartialEq, Eq, Redact)]
pub struct Telegram {
    #[redact]
    pub bot_token: Token,

    /// Chat for alerts; alerts are only logged without one.
    pub chat_id: Option<String>,

    /// Forum topic for playback alerts; none when zero.
    pub playback_thread: i64,

    /// Forum topic for profile alerts; none when zero.
    pub profile_thread: i64,
}

#[derive(Clone, PartialEq, Eq, Redact)]
pub struct Config {
    pub app_name: String,
    pub app_version: String,
    pub app_lang: String,

    pub user_agent: String,

    /// Identity towards the Ynison session service.
    pub device: Device,

    /// Yandex Music OAuth token.
    #[redact]
    pub token: Token,

    /// Text to restore when no user text has been seen yet.
    pub initial_bio: String,

    /// Where the profile record is kept.
    pub state_file: PathBuf,

    /// Where the last session state is dumped for diagnostics, if anywhere.
    pub snapshot_file: Option<PathBuf>,

    /// Pause between sync cycles.
    pub interval: Duration,

    pub redirect_url: Url,
    pub catalog_url: Url,
    pub telegram_url: Url,

    pub telegram: Option<Telegram>,
}

impl Config {
    pub const REDIRECT_URL: &'static str =
        "wss://ynison.music.yandex.ru/redirector.YnisonRedirectService/GetRedirectToYnison";
    pub const CATALOG_URL: &'static str = "https://api.music.yandex.net/";
    pub const TELEGRAM_URL: &'static str = "https://api.telegram.org/";

    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);
    pub const DEFAULT_STATE_FILE: &'static str = "database.json";
    pub const DEFAULT_SNAPSHOT_FILE: &'static str = "ynison_data.json";

    /// Returns a configuration with defaults for everything but the token.
    ///
    /// # Panics
    ///
    /// Panics when the application name or version, or the operating
    /// system name or version, cannot go into a `User-Agent`.
    #[must_use]
    pub fn with_token(token: Token) -> Self {
        let app_name = env!("CARGO_PKG_NAME").to_owned();
        let app_version = env!("CARGO_PKG_VERSION").to_owned();
        let app_lang = "en".to_owned();

        // Additional `User-Agent` string checks on top of `reqwest::HeaderValue`.
        let illegal_chars = |chr| chr == '/' || chr == ';';
        if app_name.is_empty()
            || app_name.contains(illegal_chars)
            || app_version.is_empty()
            || app_version.contains(illegal_chars)
        {
            panic!("application name and/or version invalid (\"{app_name}\"; \"{app_version}\")");
        }

        let os_name = match std::env::consts::OS {
            "macos" => "osx",
            other => other,
        };
        let os_version = sysinfo::System::os_version()
            .filter(|version| !version.is_empty() && !version.contains(illegal_chars))
            .unwrap_or_else(|| String::from("0"));

        let user_agent =
            format!("{app_name}/{app_version} (Rust; {os_name}/{os_version}; Desktop; {app_lang})");
        trace!("user agent: {user_agent}");

        let device = Device::random();
        trace!("device: {device}");

        Self {
            app_name,
            app_version,
            app_lang,

            user_agent,

            device,
            token,

            initial_bio: String::new(),
            state_file: PathBuf::from(Self::DEFAULT_STATE_FILE),
            snapshot_file: Some(PathBuf::from(Self::DEFAULT_SNAPSHOT_FILE)),
            interval: Self::DEFAULT_INTERVAL,

            redirect_url: Url::parse(Self::REDIRECT_URL).expect("invalid redirect url"),
            catalog_url: Url::parse(Self::CATALOG_URL).expect("invalid catalog url"),
            telegram_url: Url::parse(Self::TELEGRAM_URL).expect("invalid telegram url"),

            telegram: None,
        }
    }
}

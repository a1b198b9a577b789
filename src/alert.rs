//! Alerts for the person running the daemon.
//!
//! Every alert is logged. When a bot and a chat are configured, it is also
//! posted to the chat:
//!
//! ```text
//! ℹ️ *[INFO]* - Bio updated: 🎶 Now Playing: Song - A 1:05/3:05
//! ```
//!
//! Forum chats can route alerts into two topics, one for playback and
//! session trouble and one for profile changes.

use std::{fmt, sync::Arc};

use log::Level;

use crate::{protocol::telegram::SendMessage, telegram::Bot};

/// What an alert is about.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Topic {
    /// Session lookups, catalog lookups and the sync loop itself.
    Playback,
    /// Writes to and restores of the profile.
    Profile,
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Playback => write!(f, "playback"),
            Self::Profile => write!(f, "profile"),
        }
    }
}

struct Chat {
    bot: Arc<Bot>,
    chat_id: String,
    playback_thread: i64,
    profile_thread: i64,
}

/// Sends alerts to the log and, if configured, to a Telegram chat.
#[derive(Default)]
pub struct Alerter {
    chat: Option<Chat>,
}

impl Alerter {
    /// An alerter that only logs.
    #[must_use]
    pub fn log_only() -> Self {
        Self::default()
    }

    /// An alerter that also posts to `chat_id`.
    ///
    /// Thread ids of zero or below post to the chat itself.
    #[must_use]
    pub fn with_chat(
        bot: Arc<Bot>,
        chat_id: impl Into<String>,
        playback_thread: i64,
        profile_thread: i64,
    ) -> Self {
        Self {
            chat: Some(Chat {
                bot,
                chat_id: chat_id.into(),
                playback_thread,
                profile_thread,
            }),
        }
    }

    /// Logs `message` and posts it to the chat.
    ///
    /// Delivery failures are logged and otherwise ignored.
    pub async fn alert(&self, level: Level, topic: Topic, message: &str) {
        log!(level, "{message}");

        let Some(chat) = &self.chat else {
            return;
        };

        let thread = match topic {
            Topic::Playback => chat.playback_thread,
            Topic::Profile => chat.profile_thread,
        };
        let text = render(level, message);
        let request = SendMessage {
            chat_id: &chat.chat_id,
            text: &text,
            parse_mode: Some("Markdown"),
            message_thread_id: (thread > 0).then_some(thread),
        };

        if let Err(e) = chat.bot.call(&request).await {
            warn!("could not deliver {topic} alert: {e}");
        }
    }

    pub async fn info(&self, topic: Topic, message: &str) {
        self.alert(Level::Info, topic, message).await;
    }

    pub async fn warn(&self, topic: Topic, message: &str) {
        self.alert(Level::Warn, topic, message).await;
    }

    pub async fn error(&self, topic: Topic, message: &str) {
        self.alert(Level::Error, topic, message).await;
    }
}

/// Escapes the characters that legacy Telegram Markdown treats as entity
/// delimiters, so profile texts and track titles are posted as written.
fn escape_markdown(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for chr in text.chars() {
        if matches!(chr, '_' | '*' | '`' | '[') {
            escaped.push('\\');
        }
        escaped.push(chr);
    }
    escaped
}

/// Formats an alert as a Markdown chat message.
///
/// Only the level tag is formatted; `message` is escaped.
fn render(level: Level, message: &str) -> String {
    let emoji = match level {
        Level::Debug => "🔍",
        Level::Info => "ℹ️",
        Level::Warn => "⚠️",
        Level::Error => "❌",
        Level::Trace => "📝",
    };
    let name = match level {
        Level::Warn => "WARNING",
        other => other.as_str(),
    };
    let message = escape_markdown(message);
    format!("{emoji} *[{name}]* - {message}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_level_tag() {
        assert_eq!(render(Level::Info, "started"), "ℹ️ *[INFO]* - started");
        assert_eq!(render(Level::Warn, "slow"), "⚠️ *[WARNING]* - slow");
        assert_eq!(render(Level::Trace, "x"), "📝 *[TRACE]* - x");
    }

    #[test]
    fn escapes_message_markdown() {
        assert_eq!(
            render(Level::Info, "Bio restored: my_handle *loves* `code` [x]"),
            r"ℹ️ *[INFO]* - Bio restored: my\_handle \*loves\* \`code\` \[x]"
        );
        assert_eq!(escape_markdown("Song - A 1:05/3:05"), "Song - A 1:05/3:05");
    }

    #[tokio::test]
    async fn log_only_does_not_fail() {
        Alerter::log_only()
            .error(Topic::Playback, "session unavailable")
            .await;
    }
}

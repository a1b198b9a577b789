//! The profile field that shows the current status.
//!
//! The reconciliation engine only needs to read and write a single text
//! field, so it talks to a [`Profile`]:
//!
//! * [`BotProfile`]: the description of a Telegram bot, shown to everyone
//!   who opens the bot's profile
//! * [`Memory`]: an in-process field, used for dry runs and tests
//!
//! Both reject texts over their length ceiling with an `OutOfRange` error,
//! which is distinguishable from every other failure.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, PoisonError},
};

use async_trait::async_trait;

use crate::{
    error::{Error, Result},
    protocol::telegram::{GetMyDescription, SetMyDescription},
    telegram::Bot,
};

/// A remote text field.
#[async_trait]
pub trait Profile: Send + Sync {
    /// Reads the current text.
    async fn get(&self) -> Result<String>;

    /// Replaces the text.
    ///
    /// # Errors
    ///
    /// Returns `OutOfRange` when the text is too long for the field.
    async fn set(&self, text: &str) -> Result<()>;
}

/// Description of a Telegram bot.
pub struct BotProfile {
    bot: Arc<Bot>,
    language_code: Option<String>,
}

impl BotProfile {
    /// Longest description the Bot API accepts.
    pub const CEILING: usize = 512;

    #[must_use]
    pub fn new(bot: Arc<Bot>) -> Self {
        Self {
            bot,
            language_code: None,
        }
    }

    /// Uses the description for users with this language instead of the
    /// default one.
    #[must_use]
    pub fn with_language(mut self, language_code: impl Into<String>) -> Self {
        self.language_code = Some(language_code.into());
        self
    }
}

#[async_trait]
impl Profile for BotProfile {
    async fn get(&self) -> Result<String> {
        let request = GetMyDescription {
            language_code: self.language_code.as_deref(),
        };
        Ok(self.bot.call(&request).await?.description)
    }

    async fn set(&self, text: &str) -> Result<()> {
        let length = text.chars().count();
        if length > Self::CEILING {
            return Err(Error::out_of_range(format!(
                "description is {length} characters, at most {} allowed",
                Self::CEILING
            )));
        }

        let request = SetMyDescription {
            description: text,
            language_code: self.language_code.as_deref(),
        };
        if self.bot.call(&request).await? {
            Ok(())
        } else {
            Err(Error::unknown("description was not set"))
        }
    }
}

#[derive(Debug, Default)]
struct Field {
    text: String,
    ceiling: Option<usize>,
    writes: usize,
    failures: VecDeque<Error>,
}

/// In-process profile field.
///
/// Clones share the same field, so a caller can keep a handle to inspect
/// what was written.
#[derive(Clone, Debug, Default)]
pub struct Memory {
    field: Arc<Mutex<Field>>,
}

impl Memory {
    /// Creates a field holding `text`.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        let field = Field {
            text: text.into(),
            ..Field::default()
        };
        Self {
            field: Arc::new(Mutex::new(field)),
        }
    }

    /// Rejects writes longer than `ceiling` characters.
    #[must_use]
    pub fn with_ceiling(self, ceiling: usize) -> Self {
        self.lock().ceiling = Some(ceiling);
        self
    }

    /// The current text.
    #[must_use]
    pub fn text(&self) -> String {
        self.lock().text.clone()
    }

    /// Number of successful writes.
    #[must_use]
    pub fn writes(&self) -> usize {
        self.lock().writes
    }

    /// Replaces the text without counting a write, like a user editing the
    /// field by hand.
    pub fn edit(&self, text: impl Into<String>) {
        self.lock().text = text.into();
    }

    /// Makes the next call, read or write, fail with `error`.
    pub fn fail_next(&self, error: Error) {
        self.lock().failures.push_back(error);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Field> {
        self.field.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Profile for Memory {
    async fn get(&self) -> Result<String> {
        let mut field = self.lock();
        if let Some(error) = field.failures.pop_front() {
            return Err(error);
        }

        Ok(field.text.clone())
    }

    async fn set(&self, text: &str) -> Result<()> {
        let mut field = self.lock();
        if let Some(error) = field.failures.pop_front() {
            return Err(error);
        }

        if let Some(ceiling) = field.ceiling {
            let length = text.chars().count();
            if length > ceiling {
                return Err(Error::out_of_range(format!(
                    "text is {length} characters, at most {ceiling} allowed"
                )));
            }
        }

        debug!("profile text set to \"{text}\"");
        field.text = text.to_owned();
        field.writes += 1;
        Ok(())
    }
}

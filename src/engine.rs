//! Reconciliation of the profile field with what is playing.
//!
//! The profile field is shared with its owner. Each cycle the engine reads
//! it and decides, from [`MARKER`](crate::status::MARKER) alone, who wrote
//! it last:
//!
//! | Field    | Desired status | Action                                   |
//! |----------|----------------|------------------------------------------|
//! | unmarked | none           | remember it as the user's text           |
//! | unmarked | `new`          | remember it, then write `new`            |
//! | marked   | `new`          | write `new` unless the field equals it   |
//! | marked   | none           | restore the user's text unless equal     |
//!
//! Ownership is never taken from the [`Record`]: the record only provides
//! the text to restore. A user who edits the field while music plays gets
//! their text remembered on the next cycle, and overwritten by the next
//! status.
//!
//! The read and the write are not atomic. An edit that lands between them
//! is lost.

use std::fmt;

use crate::{
    error::Result,
    memory::Record,
    profile::Profile,
    retry,
    status::is_managed,
};

/// What a reconciliation did to the profile.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// The profile was left as it was.
    Unchanged,
    /// A status was written.
    Updated(String),
    /// The user's text was written back.
    Restored(String),
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unchanged => write!(f, "unchanged"),
            Self::Updated(text) => write!(f, "updated to \"{text}\""),
            Self::Restored(text) => write!(f, "restored to \"{text}\""),
        }
    }
}

/// Owner of the profile field and its record.
pub struct Engine {
    profile: Box<dyn Profile>,
    record: Record,
}

impl Engine {
    #[must_use]
    pub fn new(profile: Box<dyn Profile>, record: Record) -> Self {
        Self { profile, record }
    }

    #[must_use]
    pub fn record(&self) -> &Record {
        &self.record
    }

    /// Runs one reconciliation step.
    ///
    /// `desired` is the status to show, or `None` when nothing is playing
    /// or no status fits.
    ///
    /// Rate limits are waited out once per remote call.
    ///
    /// # Errors
    ///
    /// Returns the error of a failed read or write. A failed write leaves
    /// the record as it was; the user's text may have been remembered by
    /// then.
    pub async fn reconcile(&mut self, desired: Option<&str>) -> Result<Outcome> {
        let profile = self.profile.as_ref();

        let current = retry::rate_limited(move || profile.get()).await?;
        let managed = is_managed(&current);
        debug!(
            "profile is {} by us: \"{current}\"",
            if managed { "managed" } else { "not managed" }
        );

        if !managed && !current.is_empty() && self.record.remember_user_value(&current) {
            info!("remembered user text \"{current}\"");
        }

        if let Some(new) = desired {
            if new == current {
                return Ok(Outcome::Unchanged);
            }

            retry::rate_limited(move || profile.set(new)).await?;
            self.record.remember_bot_value(new);
            return Ok(Outcome::Updated(new.to_owned()));
        }

        if managed {
            let user_value = self.record.user_value();
            if user_value != current {
                let text = user_value.as_str();
                retry::rate_limited(move || profile.set(text)).await?;
                return Ok(Outcome::Restored(user_value));
            }
        }

        Ok(Outcome::Unchanged)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::Instant;

    use super::*;
    use crate::{
        error::{Error, ErrorKind},
        memory::InMemory,
        profile::Memory,
    };

    const STATUS: &str = "🎶 Now Playing: Song - A 1:05/3:05";

    fn engine(profile: &Memory, initial: &str) -> Engine {
        Engine::new(
            Box::new(profile.clone()),
            Record::new(Box::new(InMemory::default()), initial),
        )
    }

    #[tokio::test]
    async fn same_input_writes_once() {
        let profile = Memory::new("hello world");
        let mut engine = engine(&profile, "");

        let first = engine.reconcile(Some(STATUS)).await.unwrap();
        let second = engine.reconcile(Some(STATUS)).await.unwrap();

        assert_eq!(first, Outcome::Updated(STATUS.to_owned()));
        assert_eq!(second, Outcome::Unchanged);
        assert_eq!(profile.writes(), 1);
        assert_eq!(engine.record().bot_value().as_deref(), Some(STATUS));
    }

    #[tokio::test]
    async fn restores_user_text_byte_for_byte() {
        let user_text = "  hello\u{200b} world ✨\n";
        let profile = Memory::new(user_text);
        let mut engine = engine(&profile, "initial");

        engine.reconcile(Some(STATUS)).await.unwrap();
        assert_eq!(profile.text(), STATUS);

        let outcome = engine.reconcile(None).await.unwrap();
        assert_eq!(outcome, Outcome::Restored(user_text.to_owned()));
        assert_eq!(profile.text(), user_text);

        // Restoring again is a no-op.
        assert_eq!(engine.reconcile(None).await.unwrap(), Outcome::Unchanged);
        assert_eq!(profile.writes(), 2);
    }

    #[tokio::test]
    async fn first_cycle_captures_user_text_while_idle() {
        let profile = Memory::new("hello world");
        let mut engine = engine(&profile, "initial");

        assert_eq!(engine.reconcile(None).await.unwrap(), Outcome::Unchanged);
        assert_eq!(engine.record().user_value(), "hello world");
        assert_eq!(profile.writes(), 0);
    }

    #[tokio::test]
    async fn idle_user_text_is_left_alone() {
        let profile = Memory::new("");
        let mut engine = engine(&profile, "initial");

        assert_eq!(engine.reconcile(None).await.unwrap(), Outcome::Unchanged);
        assert_eq!(profile.text(), "");
        assert_eq!(engine.record().user_value(), "initial");
    }

    #[tokio::test]
    async fn marked_field_without_record_restores_initial_text() {
        let profile = Memory::new("🎶 : Leftover");
        let mut engine = engine(&profile, "initial");

        let outcome = engine.reconcile(None).await.unwrap();
        assert_eq!(outcome, Outcome::Restored("initial".to_owned()));
        assert_eq!(profile.text(), "initial");
    }

    #[tokio::test]
    async fn edit_during_playback_is_remembered() {
        let profile = Memory::new("hello world");
        let mut engine = engine(&profile, "");

        engine.reconcile(Some(STATUS)).await.unwrap();
        profile.edit("new bio");
        engine.reconcile(Some(STATUS)).await.unwrap();
        assert_eq!(profile.text(), STATUS);

        engine.reconcile(None).await.unwrap();
        assert_eq!(profile.text(), "new bio");
    }

    #[tokio::test]
    async fn rejected_write_keeps_record() {
        let profile = Memory::new("hello world").with_ceiling(10);
        let mut engine = engine(&profile, "");

        let error = engine.reconcile(Some(STATUS)).await.unwrap_err();
        assert_eq!(error.kind, ErrorKind::OutOfRange);
        assert_eq!(profile.text(), "hello world");
        assert_eq!(engine.record().bot_value(), None);
        assert_eq!(engine.record().user_value(), "hello world");
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limited_cycle_waits_and_completes() {
        let profile = Memory::new("hello world");
        let mut engine = engine(&profile, "");

        profile.fail_next(Error::rate_limited(Duration::from_secs(5)));

        let start = Instant::now();
        let outcome = engine.reconcile(Some(STATUS)).await.unwrap();

        assert!(start.elapsed() >= Duration::from_secs(5));
        assert_eq!(outcome, Outcome::Updated(STATUS.to_owned()));
        assert_eq!(profile.text(), STATUS);
        assert_eq!(profile.writes(), 1);
    }

    #[tokio::test]
    async fn failed_read_changes_nothing() {
        let profile = Memory::new("hello world");
        let mut engine = engine(&profile, "");
        profile.fail_next(Error::unavailable("down"));

        assert!(engine.reconcile(Some(STATUS)).await.is_err());
        assert_eq!(profile.writes(), 0);
        assert_eq!(engine.record().user_value(), "");
    }

    #[tokio::test]
    async fn playing_then_stopped() {
        let profile = Memory::new("hello world");
        let mut engine = engine(&profile, "");

        let outcome = engine.reconcile(Some(STATUS)).await.unwrap();
        assert_eq!(outcome, Outcome::Updated(STATUS.to_owned()));
        for needle in ["Song", "A", "1:05", "3:05"] {
            assert!(profile.text().contains(needle));
        }
        assert_eq!(engine.record().user_value(), "hello world");

        engine.reconcile(None).await.unwrap();
        assert_eq!(profile.text(), "hello world");
    }
}

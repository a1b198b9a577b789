//! Rendering of "now playing" statuses.
//!
//! A status is rendered from the first of a fixed list of templates whose
//! result fits the length budget. Templates go from most to least
//! informative:
//!
//! ```text
//! 🎶 Now Playing: Kalinka - Ensemble, Choir 1:05/3:05
//! 🎶 Now Playing: Kalinka - Ensemble, Choir
//! 🎶 : Kalinka - Ensemble, Choir
//! 🎶 Now Playing: Kalinka
//! 🎶 : Kalinka
//! ```
//!
//! Every template starts with [`MARKER`], which is how a status written by
//! us is told apart from text the user wrote.
//!
//! Lengths are counted in Unicode scalar values, so the marker counts as
//! one.

use crate::playback::{PlayerState, Track};

/// Sentinel carried by every status we write.
pub const MARKER: &str = "🎶";

/// Whether `text` was written by us.
///
/// This is a plain substring test. User text that happens to contain the
/// marker is taken for ours and will be replaced on the next idle cycle.
#[must_use]
pub fn is_managed(text: &str) -> bool {
    text.contains(MARKER)
}

/// Formats milliseconds as `minutes:seconds`.
///
/// Seconds are zero-padded, minutes are not. Both are truncated, never
/// rounded. Minutes wrap at the hour, so a 61 minute mix shows as `1:00`.
#[must_use]
pub fn format_ms(ms: u64) -> String {
    let seconds = (ms / 1000) % 60;
    let minutes = (ms / 60_000) % 60;
    format!("{minutes}:{seconds:02}")
}

/// Renders statuses under a length budget.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Formatter {
    templates: Vec<String>,
    budget: usize,
}

impl Formatter {
    /// Profile length limit minus a safety margin of two.
    pub const BUDGET: usize = 140 - 2;

    /// Placeholders: `{title}`, `{artists}`, `{album}`, `{progress}`,
    /// `{duration}`.
    pub const TEMPLATES: [&'static str; 5] = [
        "🎶 Now Playing: {title} - {artists} {progress}/{duration}",
        "🎶 Now Playing: {title} - {artists}",
        "🎶 : {title} - {artists}",
        "🎶 Now Playing: {title}",
        "🎶 : {title}",
    ];

    /// Returns a formatter with the default templates and budget.
    #[must_use]
    pub fn new() -> Self {
        Self {
            templates: Self::TEMPLATES.iter().map(ToString::to_string).collect(),
            budget: Self::BUDGET,
        }
    }

    /// Overrides the length budget.
    #[must_use]
    pub fn with_budget(mut self, budget: usize) -> Self {
        self.budget = budget;
        self
    }

    #[must_use]
    pub fn budget(&self) -> usize {
        self.budget
    }

    /// Renders the most informative status that fits the budget.
    ///
    /// Returns `None` when none does; that is not an error.
    #[must_use]
    pub fn format(&self, track: &Track, state: &PlayerState) -> Option<String> {
        let artists = track.artists();
        let progress = format_ms(state.progress_ms);
        let duration = format_ms(state.duration_ms);
        let values = [
            ("title", track.title.as_str()),
            ("artists", artists.as_str()),
            ("album", track.album()),
            ("progress", progress.as_str()),
            ("duration", duration.as_str()),
        ];

        self.templates
            .iter()
            .map(|template| render(template, &values))
            .inspect(|candidate| trace!("candidate ({}): {candidate}", candidate.chars().count()))
            .find(|candidate| candidate.chars().count() <= self.budget)
    }
}

impl Default for Formatter {
    fn default() -> Self {
        Self::new()
    }
}

/// Substitutes `{name}` placeholders in a single pass.
///
/// Substituted values are not scanned again, so braces in a title are
/// kept as they are. Unknown placeholders are left untouched.
fn render(template: &str, values: &[(&str, &str)]) -> String {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        output.push_str(&rest[..start]);
        let tail = &rest[start..];

        let value = tail.find('}').and_then(|end| {
            let name = &tail[1..end];
            values
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (*value, end))
        });

        if let Some((value, end)) = value {
            output.push_str(value);
            rest = &tail[end + 1..];
        } else {
            output.push('{');
            rest = &tail[1..];
        }
    }

    output.push_str(rest);
    output
}

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

use crate::patterns::state::{truncate_chars, MAX_EXCERPT_CHARS};
use regex::Regex;
use std::sync::LazyLock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteReading {
    pub approve: bool,
    pub reason: String,
    pub parsed: bool,
}

/// Turns free-text agent output into the decisions the state machines need.
///
/// The keyword heuristic is the default; a structured-output classifier can
/// replace it without touching the handlers.
pub trait ResponseClassifier {
    fn classify_vote(&self, text: &str) -> VoteReading;
    fn critic_approves(&self, text: &str) -> bool;
}

static APPROVE_WORDS: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)\b(approve[ds]?|yes|accept(?:s|ed)?)\b").ok());
static REJECT_WORDS: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)\b(reject(?:s|ed)?|no|den(?:y|ies|ied))\b").ok());
static REASON_LINE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?im)^\s*reason\s*:\s*(.+?)\s*$").ok());
static CRITIC_APPROVAL: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)\b(approved|lgtm|looks good)\b").ok());
static CRITIC_NEGATION: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)\bnot\s+(?:yet\s+)?approved\b").ok());

#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordClassifier;

fn first_match(pattern: &LazyLock<Option<Regex>>, text: &str) -> Option<usize> {
    pattern
        .as_ref()
        .and_then(|re| re.find(text))
        .map(|found| found.start())
}

impl KeywordClassifier {
    fn explicit_reason(text: &str) -> Option<String> {
        REASON_LINE
            .as_ref()
            .and_then(|re| re.captures(text))
            .and_then(|caps| caps.get(1))
            .map(|m| truncate_chars(m.as_str(), MAX_EXCERPT_CHARS))
    }

    fn summary_line(text: &str) -> String {
        text.lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map_or_else(String::new, |line| truncate_chars(line, 200))
    }
}

impl ResponseClassifier for KeywordClassifier {
    /// The earliest verdict keyword in the text decides the vote.
    fn classify_vote(&self, text: &str) -> VoteReading {
        let approve_at = first_match(&APPROVE_WORDS, text);
        let reject_at = first_match(&REJECT_WORDS, text);

        let (approve, parsed) = match (approve_at, reject_at) {
            (Some(a), Some(r)) => (a < r, true),
            (Some(_), None) => (true, true),
            (None, Some(_)) => (false, true),
            (None, None) => (false, false),
        };

        let reason = Self::explicit_reason(text).unwrap_or_else(|| {
            let summary = Self::summary_line(text);
            if parsed {
                summary
            } else {
                format!("could not parse vote: {summary}")
            }
        });

        VoteReading {
            approve,
            reason,
            parsed,
        }
    }

    fn critic_approves(&self, text: &str) -> bool {
        first_match(&CRITIC_APPROVAL, text).is_some() && first_match(&CRITIC_NEGATION, text).is_none()
    }
}

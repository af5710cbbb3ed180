#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

use crate::patterns::state::PatternType;
use crate::types::{PatternId, StageName};
use regex::Regex;
use std::sync::LazyLock;

// Id and stage are captured loosely so malformed values can be told apart
// from untagged text; the safe-id check happens in `TagMatch::validate`.
static TAG: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"\[PATTERN:(pipeline|jury|debate|gencritic)-([^:\]]+):([^\]]+)\]").ok()
});

/// A `[PATTERN:<type>-<id>:<stage>]` tag as found in free text, not yet validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagMatch {
    pub pattern_type: PatternType,
    pub raw_id: String,
    pub raw_stage: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternTag {
    pub pattern_type: PatternType,
    pub id: PatternId,
    pub stage: StageName,
}

impl TagMatch {
    /// Finds the first pattern tag in `text`.
    #[must_use]
    pub fn find(text: &str) -> Option<Self> {
        let caps = TAG.as_ref()?.captures(text)?;
        let pattern_type = PatternType::try_from(caps.get(1)?.as_str()).ok()?;
        Some(Self {
            pattern_type,
            raw_id: caps.get(2)?.as_str().to_string(),
            raw_stage: caps.get(3)?.as_str().to_string(),
        })
    }

    /// Applies the safe-id grammar to both id and stage.
    #[must_use]
    pub fn validate(self) -> Option<PatternTag> {
        Some(PatternTag {
            pattern_type: self.pattern_type,
            id: PatternId::parse(self.raw_id)?,
            stage: StageName::parse(self.raw_stage)?,
        })
    }
}

impl PatternTag {
    #[must_use]
    pub fn render(&self) -> String {
        format!("[PATTERN:{}-{}:{}]", self.pattern_type, self.id, self.stage)
    }
}

use serde::{Deserialize, Serialize};
use std::fmt;

/// Longest identifier accepted anywhere an id reaches a file path or SQL literal.
pub const MAX_ID_LEN: usize = 64;

/// True iff `candidate` matches `^[A-Za-z0-9_-]{1,64}$`.
#[must_use]
pub fn is_valid_id(candidate: &str) -> bool {
    !candidate.is_empty()
        && candidate.len() <= MAX_ID_LEN
        && candidate
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

macro_rules! safe_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Returns `None` when the value fails the safe-id grammar.
            #[must_use]
            pub fn parse(value: impl Into<String>) -> Option<Self> {
                let value = value.into();
                is_valid_id(&value).then_some(Self(value))
            }

            #[must_use]
            pub fn value(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = String;

            fn try_from(value: String) -> std::result::Result<Self, String> {
                Self::parse(value.clone())
                    .ok_or_else(|| format!("invalid {}: {value:?}", stringify!($name)))
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

safe_id!(
    /// Instance id of a running pattern, unique per pattern type.
    PatternId
);

safe_id!(
    /// Stage (pipeline) or role (`pro`, `con`, `generator`, `critic`, `juror`) name.
    StageName
);

safe_id!(
    /// Group of homogeneous agents sharing one broadcast ledger scope.
    SwarmId
);

safe_id!(AgentName);

#[cfg(test)]
mod tests {
    use super::{is_valid_id, PatternId, MAX_ID_LEN};

    #[test]
    fn when_id_uses_word_chars_and_hyphens_then_it_is_accepted() {
        assert!(is_valid_id("a"));
        assert!(is_valid_id("review-2_final"));
        assert!(is_valid_id(&"x".repeat(MAX_ID_LEN)));
    }

    #[test]
    fn when_id_contains_injection_characters_then_it_is_rejected() {
        for bad in ["", "a;rm", "a/b", "../x", "a b", "tab\tid", "quote'", "new\nline"] {
            assert!(!is_valid_id(bad), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn when_id_is_longer_than_limit_then_it_is_rejected() {
        assert!(!is_valid_id(&"x".repeat(MAX_ID_LEN + 1)));
    }

    #[test]
    fn when_id_is_non_ascii_alphanumeric_then_it_is_rejected() {
        assert!(!is_valid_id("café"));
    }

    #[test]
    fn deserializing_an_invalid_id_fails() {
        let parsed: Result<PatternId, _> = serde_json::from_str("\"bad id\"");
        assert!(parsed.is_err());
        let ok: Result<PatternId, _> = serde_json::from_str("\"good-id\"");
        assert!(ok.is_ok());
    }
}

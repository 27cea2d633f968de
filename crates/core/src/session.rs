use std::fmt;

use serde::{Deserialize, Serialize};

/// Session id used when the participant supplied none.
pub const DEFAULT_SESSION_ID: &str = "default-session";

/// Opaque grouping key for one experiment run.
///
/// The only rule is non-emptiness: a missing or whitespace-only value
/// becomes [`DEFAULT_SESSION_ID`]. Anything else is kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn resolve(raw: Option<&str>) -> Self {
        match raw {
            Some(s) if !s.trim().is_empty() => SessionId(s.to_string()),
            _ => SessionId(DEFAULT_SESSION_ID.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        SessionId(DEFAULT_SESSION_ID.to_string())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_falls_back_to_default() {
        assert_eq!(SessionId::resolve(None).as_str(), DEFAULT_SESSION_ID);
        assert_eq!(SessionId::resolve(Some("")).as_str(), DEFAULT_SESSION_ID);
        assert_eq!(SessionId::resolve(Some("  \t")).as_str(), DEFAULT_SESSION_ID);
    }

    #[test]
    fn non_blank_is_kept_verbatim() {
        assert_eq!(
            SessionId::resolve(Some("seminar-2025-12-10")).as_str(),
            "seminar-2025-12-10"
        );
        assert_eq!(SessionId::resolve(Some(" a ")).as_str(), " a ");
    }
}

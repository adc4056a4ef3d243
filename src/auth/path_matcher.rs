//! Decides whether a request path needs authentication.

use std::fmt;

/// Suffix marking a prefix rule.
pub const WILDCARD: char = '*';

/// A path excluded from authentication.
///
/// `/api/v1/status` matches `/api/v1/status` and `/api/v1/status/` only.
/// `/api/v1/users/*` matches any path containing `/api/v1/users/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExcludedPath {
    /// Normalized rule: trailing slash for exact rules, bare prefix for
    /// wildcard rules.
    pattern: String,
    wildcard: bool,
}

impl ExcludedPath {
    pub fn new(rule: impl AsRef<str>) -> Self {
        let rule = rule.as_ref();
        match rule.strip_suffix(WILDCARD) {
            Some(prefix) => Self {
                pattern: prefix.to_string(),
                wildcard: true,
            },
            None => Self {
                pattern: with_trailing_slash(rule),
                wildcard: false,
            },
        }
    }

    /// Whether an already normalized path falls under this rule.
    fn matches(&self, normalized_path: &str) -> bool {
        if self.wildcard {
            normalized_path.contains(self.pattern.as_str())
        } else {
            normalized_path == self.pattern
        }
    }
}

impl From<&str> for ExcludedPath {
    fn from(rule: &str) -> Self {
        Self::new(rule)
    }
}

impl fmt::Display for ExcludedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.wildcard {
            write!(f, "{}{}", self.pattern, WILDCARD)
        } else {
            write!(f, "{}", self.pattern)
        }
    }
}

/// Returns `true` when `path` must be authenticated.
///
/// An empty path or an empty rule list yields `false`. Otherwise the first
/// rule that matches the slash-normalized path excludes it.
pub fn requires_auth(path: &str, excluded: &[ExcludedPath]) -> bool {
    if path.is_empty() || excluded.is_empty() {
        return false;
    }

    let normalized = with_trailing_slash(path);
    !excluded.iter().any(|rule| rule.matches(&normalized))
}

fn with_trailing_slash(path: &str) -> String {
    if path.ends_with('/') {
        path.to_string()
    } else {
        format!("{}/", path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules(list: &[&str]) -> Vec<ExcludedPath> {
        list.iter().map(|r| ExcludedPath::new(r)).collect()
    }

    #[test]
    fn test_missing_input_is_permissive() {
        assert!(!requires_auth("", &rules(&["/api/v1/status/"])));
        assert!(!requires_auth("/api/v1/users", &[]));
    }

    #[test]
    fn test_exact_rule() {
        let excluded = rules(&["/api/v1/status/"]);
        assert!(!requires_auth("/api/v1/status/", &excluded));
        assert!(requires_auth("/api/v1/users", &excluded));
    }

    #[test]
    fn test_trailing_slash_is_ignored() {
        let excluded = rules(&["/api/v1/status"]);
        assert!(!requires_auth("/api/v1/status", &excluded));
        assert!(!requires_auth("/api/v1/status/", &excluded));

        let excluded = rules(&["/api/v1/status/"]);
        assert!(!requires_auth("/api/v1/status", &excluded));
    }

    #[test]
    fn test_exact_rule_does_not_match_children() {
        let excluded = rules(&["/api/v1/status/"]);
        assert!(requires_auth("/api/v1/status/extra", &excluded));
    }

    #[test]
    fn test_wildcard_rule() {
        let excluded = rules(&["/api/v1/users/*"]);
        assert!(!requires_auth("/api/v1/users/55", &excluded));
        assert!(!requires_auth("/api/v1/users/", &excluded));
        assert!(requires_auth("/api/v1/status", &excluded));
    }

    #[test]
    fn test_wildcard_is_substring_match() {
        let excluded = rules(&["/api/v1/stat*"]);
        assert!(!requires_auth("/api/v1/stats", &excluded));
        assert!(!requires_auth("/api/v1/status", &excluded));
        // unanchored: the prefix may appear anywhere in the path
        assert!(!requires_auth("/proxy/api/v1/stats", &excluded));
    }

    #[test]
    fn test_first_match_wins_among_many() {
        let excluded = rules(&["/api/v1/forbidden/", "/api/v1/status/", "/api/v1/auth_session/login/"]);
        assert!(!requires_auth("/api/v1/auth_session/login", &excluded));
        assert!(requires_auth("/api/v1/users/me", &excluded));
    }

    #[test]
    fn test_display_round_trips_rule() {
        assert_eq!(ExcludedPath::new("/api/v1/users/*").to_string(), "/api/v1/users/*");
        assert_eq!(ExcludedPath::new("/api/v1/status").to_string(), "/api/v1/status/");
        assert_eq!(ExcludedPath::from("/a/*").to_string(), "/a/*");
    }
}

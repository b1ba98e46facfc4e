//! Email allow-list gate.
//!
//! Patterns are globs where `*` is the only wildcard. Every other character is
//! matched literally and the pattern must match the whole email.

use regex::Regex;

use crate::error::AuthFlowError;

/// Pattern set used when the operator configures none.
pub const ALLOW_ALL: &str = "*";

#[derive(Debug, Clone)]
struct Pattern {
    source: String,
    // None for a bare `*`.
    regex: Option<Regex>,
}

impl Pattern {
    fn matches(&self, email: &str) -> bool {
        self.regex.as_ref().is_none_or(|r| r.is_match(email))
    }
}

/// A compiled, ordered set of email glob patterns.
#[derive(Debug, Clone)]
pub struct AllowList {
    patterns: Vec<Pattern>,
}

impl AllowList {
    /// Compiles the given patterns.
    ///
    /// # Errors
    ///
    /// Returns [`AuthFlowError::InvalidAllowListPattern`] if a pattern does
    /// not compile.
    pub fn compile<I, S>(patterns: I) -> Result<Self, AuthFlowError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| {
                let source = p.as_ref().trim().to_string();
                if source == ALLOW_ALL {
                    return Ok(Pattern {
                        source,
                        regex: None,
                    });
                }
                glob_to_regex(&source).map(|regex| Pattern {
                    source,
                    regex: Some(regex),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// An allow-list that admits every email.
    #[must_use]
    pub fn allow_all() -> Self {
        Self {
            patterns: vec![Pattern {
                source: ALLOW_ALL.to_string(),
                regex: None,
            }],
        }
    }

    /// Returns true if `email` matches any pattern. Patterns are tried in order.
    #[must_use]
    pub fn is_allowed(&self, email: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(email))
    }

    /// Returns true if no pattern is configured, which denies everyone.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// The configured patterns in order.
    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(|p| p.source.as_str())
    }
}

fn glob_to_regex(glob: &str) -> Result<Regex, AuthFlowError> {
    let body = glob
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");
    Regex::new(&format!("^{body}$")).map_err(|e| AuthFlowError::InvalidAllowListPattern {
        pattern: glob.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_wildcard() {
        let list = AllowList::compile(["*@co.com"]).expect("compiles");
        assert!(list.is_allowed("user@co.com"));
        assert!(!list.is_allowed("user@other.com"));
        assert!(!list.is_allowed("user@co.com.evil.example"));
    }

    #[test]
    fn star_admits_everyone() {
        let list = AllowList::compile([ALLOW_ALL]).expect("compiles");
        assert!(list.is_allowed("anyone@anywhere.example"));
        assert!(list.is_allowed(""));
        assert!(AllowList::allow_all().is_allowed("x@y.z"));
    }

    #[test]
    fn metacharacters_are_literal() {
        let list = AllowList::compile(["a.b*@co.com"]).expect("compiles");
        assert!(list.is_allowed("a.bob@co.com"));
        assert!(!list.is_allowed("axbob@co.com"));

        let list = AllowList::compile(["ops+(alerts)@co.com"]).expect("compiles");
        assert!(list.is_allowed("ops+(alerts)@co.com"));
        assert!(!list.is_allowed("opss(alerts)@co.com"));
    }

    #[test]
    fn patterns_match_whole_email() {
        let list = AllowList::compile(["admin@co.com"]).expect("compiles");
        assert!(list.is_allowed("admin@co.com"));
        assert!(!list.is_allowed("superadmin@co.com"));
    }

    #[test]
    fn any_pattern_may_match() {
        let list = AllowList::compile(["*@co.com", "guest@partner.org"]).expect("compiles");
        assert!(list.is_allowed("guest@partner.org"));
        assert!(list.is_allowed("dev@co.com"));
        assert!(!list.is_allowed("dev@partner.org"));
        assert_eq!(list.patterns().collect::<Vec<_>>(), ["*@co.com", "guest@partner.org"]);
    }

    #[test]
    fn empty_list_denies_everyone() {
        let list = AllowList::compile(Vec::<String>::new()).expect("compiles");
        assert!(list.is_empty());
        assert!(!list.is_allowed("user@co.com"));
    }
}

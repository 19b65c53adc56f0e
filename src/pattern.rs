//! Wildcard taxon-name patterns.
//!
//! A pattern token is a literal taxon name in which `*` stands for any
//! (possibly empty) run of characters. Tokens compile to anchored regular
//! expressions, so `Foo*` matches `Foo` and `Foobar` but never `XFoo`.
//! Every other character is matched literally.

use regex::Regex;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PatternError {
    #[error("empty taxon pattern")]
    Empty,
    #[error("taxon pattern '{0}' contains a reserved character (one of '(', ')', ',', '=')")]
    ReservedCharacter(String),
    #[error("taxon pattern '{token}' could not be compiled: {reason}")]
    Invalid { token: String, reason: String },
}

/// A compiled, anchored wildcard pattern.
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    regex: Regex,
}

impl Pattern {
    /// Compile a wildcard token.
    ///
    /// ```
    /// # use tree_sorter::pattern::Pattern;
    /// let p = Pattern::compile("Foo*").unwrap();
    /// assert!(p.matches("Foobar"));
    /// assert!(!p.matches("XFoo"));
    /// ```
    pub fn compile(token: &str) -> Result<Self, PatternError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(PatternError::Empty);
        }
        if token.contains(['(', ')', ',', '=']) {
            return Err(PatternError::ReservedCharacter(token.to_string()));
        }

        let body = token
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");
        let regex = Regex::new(&format!("^(?s:{body})$")).map_err(|e| PatternError::Invalid {
            token: token.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Pattern {
            source: token.to_string(),
            regex,
        })
    }

    #[inline]
    pub fn matches(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }

    /// The token this pattern was compiled from.
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl std::fmt::Display for Pattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_token_matches_only_itself() {
        let p = Pattern::compile("Foo").unwrap();
        assert!(p.matches("Foo"));
        assert!(!p.matches("Foobar"));
        assert!(!p.matches("XFoo"));
        assert!(!p.matches("foo"));
    }

    #[test]
    fn trailing_wildcard_is_anchored_at_start() {
        let p = Pattern::compile("Foo*").unwrap();
        assert!(p.matches("Foo"));
        assert!(p.matches("Foobar"));
        assert!(!p.matches("XFoo"));
    }

    #[test]
    fn inner_and_leading_wildcards() {
        let p = Pattern::compile("*_sp*_2").unwrap();
        assert!(p.matches("Toxo_sp1_2"));
        assert!(p.matches("_sp_2"));
        assert!(!p.matches("Toxo_sp1_21"));
    }

    #[test]
    fn regex_metacharacters_are_literal() {
        // Taxon names routinely carry dots (e.g. dated isolates).
        let p = Pattern::compile("1959.M.CD*").unwrap();
        assert!(p.matches("1959.M.CD.59.ZR59"));
        assert!(!p.matches("1959xMxCD"));

        let q = Pattern::compile("a+b").unwrap();
        assert!(q.matches("a+b"));
        assert!(!q.matches("aab"));
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        assert_eq!(Pattern::compile("  ").unwrap_err(), PatternError::Empty);
        assert!(matches!(
            Pattern::compile("Foo(bar"),
            Err(PatternError::ReservedCharacter(_))
        ));
    }
}

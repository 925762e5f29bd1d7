// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Classify recorded errors as retryable or not.

use regex::{Regex, RegexSet};

/// Matches stored error messages against the configured non-retryable
/// patterns (configuration, authorization, missing resources).
#[derive(Debug, Clone)]
pub struct ErrorClassifier {
    patterns: Vec<String>,
    set: RegexSet,
}

impl ErrorClassifier {
    /// Invalid patterns are skipped with a warning.
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns: Vec<String> = patterns
            .into_iter()
            .filter_map(|p| match Regex::new(p.as_ref()) {
                Ok(_) => Some(p.as_ref().to_string()),
                Err(e) => {
                    tracing::warn!(pattern = p.as_ref(), error = %e, "ignoring invalid non-retryable pattern");
                    None
                }
            })
            .collect();
        let set = RegexSet::new(&patterns).unwrap_or_else(|_| RegexSet::empty());
        Self { patterns, set }
    }

    pub fn from_config(config: &rj_core::Config) -> Self {
        Self::new(&config.non_retryable_patterns)
    }

    /// First pattern matching `message`, if any.
    pub fn non_retryable_match(&self, message: &str) -> Option<&str> {
        self.set
            .matches(message)
            .iter()
            .next()
            .and_then(|i| self.patterns.get(i))
            .map(String::as_str)
    }

    pub fn is_retryable(&self, message: &str) -> bool {
        self.non_retryable_match(message).is_none()
    }
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::new(rj_core::config::default_non_retryable_patterns())
    }
}

#[cfg(test)]
#[path = "classify_tests.rs"]
mod tests;

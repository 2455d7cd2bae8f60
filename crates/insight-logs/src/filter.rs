//! Message filters and iteration control

use std::collections::HashSet;

/// Whether iteration should go on after a record was delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

impl From<bool> for Flow {
    /// `true` continues, `false` stops
    fn from(keep_going: bool) -> Self {
        if keep_going {
            Flow::Continue
        } else {
            Flow::Stop
        }
    }
}

/// Selects records by exact rendered message
///
/// With an include set, only listed messages pass. Messages in the exclude
/// set never pass, even if also included.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogFilter {
    include: Option<HashSet<String>>,
    exclude: Option<HashSet<String>>,
}

impl LogFilter {
    /// A filter that passes every record
    pub fn new() -> Self {
        Self::default()
    }

    /// Only pass these messages
    pub fn include<I, S>(mut self, messages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include
            .get_or_insert_with(HashSet::new)
            .extend(messages.into_iter().map(Into::into));
        self
    }

    /// Never pass these messages
    pub fn exclude<I, S>(mut self, messages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude
            .get_or_insert_with(HashSet::new)
            .extend(messages.into_iter().map(Into::into));
        self
    }

    /// Whether a record with this message passes
    pub fn matches(&self, message: &str) -> bool {
        if self.exclude.as_ref().is_some_and(|set| set.contains(message)) {
            return false;
        }
        self.include.as_ref().is_none_or(|set| set.contains(message))
    }

    /// Whether the filter passes everything
    pub fn is_empty(&self) -> bool {
        self.include.is_none() && self.exclude.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_filter_passes_all() {
        let filter = LogFilter::new();
        assert!(filter.is_empty());
        assert!(filter.matches("anything"));
    }

    #[test]
    fn test_exclude_wins() {
        let filter = LogFilter::new()
            .include(["A", "B", "C", "D"])
            .exclude(["C", "D", "E", "F"]);

        let passed: Vec<&str> = ["A", "B", "C", "D", "E", "F"]
            .into_iter()
            .filter(|m| filter.matches(m))
            .collect();
        assert_eq!(passed, vec!["A", "B"]);
    }

    #[test]
    fn test_empty_include_passes_nothing() {
        let filter = LogFilter::new().include(Vec::<String>::new());
        assert!(!filter.is_empty());
        assert!(!filter.matches("A"));
    }

    #[test]
    fn test_exact_match_only() {
        let filter = LogFilter::new().include(["Email sent"]);
        assert!(filter.matches("Email sent"));
        assert!(!filter.matches("email sent"));
        assert!(!filter.matches("Email sent!"));
    }

    #[test]
    fn test_flow_from_bool() {
        assert_eq!(Flow::from(true), Flow::Continue);
        assert_eq!(Flow::from(false), Flow::Stop);
    }
}

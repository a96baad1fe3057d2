use regex::Regex;
use std::collections::HashSet;

use hordelog_types::{LogLevel, LogLine};

use crate::formatter::LineFormatter;

/// Compiled filter for log lines
#[derive(Clone)]
pub struct CompiledFilter {
    /// Regex pattern (if any)
    regex: Option<Regex>,

    /// Original pattern string
    pattern: String,

    /// Log levels to include (empty = all)
    levels: HashSet<LogLevel>,

    /// Whether to invert match
    invert: bool,
}

impl CompiledFilter {
    /// Create a new filter from a pattern string
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Self::build(pattern, false)
    }

    /// Create a case-insensitive filter
    pub fn new_case_insensitive(pattern: &str) -> Result<Self, regex::Error> {
        Self::build(pattern, true)
    }

    fn build(pattern: &str, case_insensitive: bool) -> Result<Self, regex::Error> {
        let regex = match (pattern.is_empty(), case_insensitive) {
            (true, _) => None,
            (false, false) => Some(Regex::new(pattern)?),
            (false, true) => Some(Regex::new(&format!("(?i){}", pattern))?),
        };

        Ok(Self {
            regex,
            pattern: pattern.to_string(),
            levels: HashSet::new(),
            invert: false,
        })
    }

    /// Filter on levels only
    pub fn levels_only(levels: impl IntoIterator<Item = LogLevel>) -> Self {
        Self {
            regex: None,
            pattern: String::new(),
            levels: levels.into_iter().collect(),
            invert: false,
        }
    }

    /// Set log levels to filter by
    pub fn with_levels(mut self, levels: HashSet<LogLevel>) -> Self {
        self.levels = levels;
        self
    }

    /// Invert the match
    pub fn inverted(mut self) -> Self {
        self.invert = true;
        self
    }

    /// Check if a log line matches this filter
    pub fn matches(&self, line: &LogLine) -> bool {
        if !self.levels.is_empty() && !self.levels.contains(&line.level) {
            return self.invert;
        }

        let text_match = match &self.regex {
            Some(re) => re.is_match(&LineFormatter::render(line)),
            None => true,
        };

        if self.invert { !text_match } else { text_match }
    }

    /// Check already rendered text against the pattern only
    pub fn matches_text(&self, text: &str) -> bool {
        let text_match = self.regex.as_ref().is_none_or(|re| re.is_match(text));
        if self.invert { !text_match } else { text_match }
    }

    /// Find all match positions in a string (for highlighting)
    pub fn find_matches(&self, text: &str) -> Vec<(usize, usize)> {
        match &self.regex {
            Some(re) => re.find_iter(text).map(|m| (m.start(), m.end())).collect(),
            None => Vec::new(),
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn levels(&self) -> &HashSet<LogLevel> {
        &self.levels
    }

    /// Check if filter is empty (matches everything)
    pub fn is_empty(&self) -> bool {
        self.regex.is_none() && self.levels.is_empty()
    }

    pub fn has_pattern(&self) -> bool {
        self.regex.is_some()
    }
}

impl std::fmt::Debug for CompiledFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledFilter")
            .field("pattern", &self.pattern)
            .field("levels", &self.levels)
            .field("invert", &self.invert)
            .finish()
    }
}

/// Quick filter presets
pub struct FilterPresets;

impl FilterPresets {
    /// Filter for errors only
    pub fn errors_only() -> CompiledFilter {
        CompiledFilter::levels_only([LogLevel::Error, LogLevel::Fatal])
    }

    /// Filter for warnings only
    pub fn warnings_only() -> CompiledFilter {
        CompiledFilter::levels_only([LogLevel::Warn])
    }

    /// Filter for warnings and above
    pub fn warnings_and_above() -> CompiledFilter {
        CompiledFilter::levels_only([LogLevel::Warn, LogLevel::Error, LogLevel::Fatal])
    }
}

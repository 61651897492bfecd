//! Include/exclude glob filters for bulk runs.

use regex::Regex;

use crate::error::{MigrateError, Result};

/// Table name filter built from `*`/`?` glob patterns.
///
/// A table is selected when it matches at least one include pattern (or the
/// include list is empty) and no exclude pattern.
#[derive(Debug, Clone, Default)]
pub struct TableFilter {
    include: Vec<Regex>,
    exclude: Vec<Regex>,
}

impl TableFilter {
    /// Compile include and exclude globs.
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self> {
        Ok(Self {
            include: include.iter().map(|p| glob_to_regex(p)).collect::<Result<_>>()?,
            exclude: exclude.iter().map(|p| glob_to_regex(p)).collect::<Result<_>>()?,
        })
    }

    /// Whether `table` should be migrated.
    pub fn matches(&self, table: &str) -> bool {
        let included = self.include.is_empty() || self.include.iter().any(|re| re.is_match(table));
        included && !self.exclude.iter().any(|re| re.is_match(table))
    }

    /// Keep only the selected tables, preserving order.
    pub fn apply(&self, tables: Vec<String>) -> Vec<String> {
        tables.into_iter().filter(|t| self.matches(t)).collect()
    }
}

fn glob_to_regex(pattern: &str) -> Result<Regex> {
    let mut re = String::with_capacity(pattern.len() + 8);
    re.push('^');
    for c in pattern.chars() {
        match c {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            c => re.push_str(&regex::escape(&c.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re)
        .map_err(|e| MigrateError::Config(format!("Invalid table pattern '{}': {}", pattern, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        let filter = TableFilter::default();
        assert!(filter.matches("users"));
        assert!(filter.matches("anything_at_all"));
    }

    #[test]
    fn test_include_and_exclude() {
        let filter = TableFilter::new(&strings(&["order*", "users"]), &strings(&["*_archive"])).unwrap();
        assert!(filter.matches("users"));
        assert!(filter.matches("orders"));
        assert!(filter.matches("order_items"));
        assert!(!filter.matches("orders_archive"));
        assert!(!filter.matches("events"));
    }

    #[test]
    fn test_question_mark_and_literal_dots() {
        let filter = TableFilter::new(&strings(&["log_202?", "a.b"]), &[]).unwrap();
        assert!(filter.matches("log_2024"));
        assert!(!filter.matches("log_20245"));
        assert!(filter.matches("a.b"));
        assert!(!filter.matches("axb"));
    }

    #[test]
    fn test_apply_keeps_order() {
        let filter = TableFilter::new(&[], &strings(&["tmp_*"])).unwrap();
        let tables = strings(&["b", "tmp_x", "a"]);
        assert_eq!(filter.apply(tables), strings(&["b", "a"]));
    }
}

//! First-match rule evaluation over normalized series paths.

use crate::config::Rule;
use crate::error::Result;
use crate::template::CompiledRule;

/// The winning rule for a path and its captured segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathMatch {
    /// Index of the rule in declaration order.
    pub rule_index: usize,
    /// Captured segments, in the rule's wildcard-name order.
    pub captures: Vec<String>,
}

/// An ordered, compiled rule list.
///
/// Rules are compiled once when the set is built; matching a path only runs
/// the prepared matchers.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<CompiledRule>,
}

impl RuleSet {
    /// Compiles every rule, preserving order.
    ///
    /// # Errors
    ///
    /// Returns the first [`crate::error::ConfigError::InvalidPattern`]
    /// encountered.
    pub fn compile(rules: Vec<Rule>) -> Result<Self> {
        let rules = rules
            .into_iter()
            .map(CompiledRule::compile)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    /// Returns the first rule matching anywhere in `normalized_path`.
    ///
    /// Matching is not anchored, so a rule can match inside a longer,
    /// unrelated path. Put more specific rules first.
    pub fn match_path(&self, normalized_path: &str) -> Option<PathMatch> {
        self.rules
            .iter()
            .enumerate()
            .find_map(|(rule_index, rule)| {
                rule.captures(normalized_path).map(|captures| PathMatch {
                    rule_index,
                    captures,
                })
            })
    }

    /// The compiled rule at `index`.
    pub fn get(&self, index: usize) -> Option<&CompiledRule> {
        self.rules.get(index)
    }

    /// Number of rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the set has no rules.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Compiled rules in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &CompiledRule> {
        self.rules.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule_set() -> RuleSet {
        RuleSet::compile(vec![
            Rule::new("stats.{{host}}.load"),
            Rule::new("stats.{{host}}.{{metric}}"),
            Rule::new("{{anything}}"),
        ])
        .unwrap()
    }

    #[test]
    fn test_first_match_wins() {
        let rules = rule_set();
        assert_eq!(
            rules.match_path("stats.server1.load"),
            Some(PathMatch {
                rule_index: 0,
                captures: vec!["server1".to_string()],
            })
        );
        assert_eq!(
            rules.match_path("stats.server1.mem"),
            Some(PathMatch {
                rule_index: 1,
                captures: vec!["server1".to_string(), "mem".to_string()],
            })
        );
        assert_eq!(rules.match_path("carbon").unwrap().rule_index, 2);
    }

    #[test]
    fn test_no_match() {
        let rules = RuleSet::compile(vec![Rule::new("stats.{{host}}.load")]).unwrap();
        assert_eq!(rules.match_path("collectd.server1.load"), None);
    }

    #[test]
    fn test_empty_rule_set_matches_nothing() {
        let rules = RuleSet::default();
        assert!(rules.is_empty());
        assert_eq!(rules.match_path("stats.a.b"), None);
    }

    #[test]
    fn test_partial_match_inside_longer_path() {
        let rules = RuleSet::compile(vec![Rule::new("{{host}}.load")]).unwrap();
        let matched = rules.match_path("legacy.stats.server1.load.avg").unwrap();
        assert_eq!(matched.captures, vec!["server1"]);
    }

    #[test]
    fn test_compile_reports_bad_rule() {
        let result = RuleSet::compile(vec![Rule::new("ok.{{x}}"), Rule::new("bad[.{{x}}")]);
        assert!(result.is_err());
    }

    #[test]
    fn test_get_returns_declared_rule() {
        let rules = rule_set();
        assert_eq!(rules.len(), 3);
        assert_eq!(rules.get(1).unwrap().rule().pattern, "stats.{{host}}.{{metric}}");
        assert!(rules.get(3).is_none());
        assert_eq!(rules.iter().count(), 3);
    }
}

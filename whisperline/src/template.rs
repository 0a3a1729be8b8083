//! Wildcard template compilation and resolution.
//!
//! A rule pattern such as `stats.{{ host }}.cpu.{{ core }}` is compiled once,
//! at load time, into a [`CompiledRule`]:
//!
//! - every literal `.` is escaped,
//! - each wildcard token becomes a group matching one or more non-`.`
//!   characters,
//! - wildcard names are recorded in first-occurrence order.
//!
//! Resolution substitutes the captured segments back into the rule's
//! measurement, field and tag templates.
//!
//! # Example
//!
//! ```rust
//! use whisperline::config::Rule;
//! use whisperline::template::CompiledRule;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let rule = Rule::new("a.{{x}}.b.{{y}}").with_measurement("{{x}}_{{y}}");
//! let compiled = CompiledRule::compile(rule)?;
//!
//! let captures = compiled.captures("a.10.b.20").unwrap();
//! assert_eq!(captures, vec!["10", "20"]);
//!
//! let resolved = compiled.resolve("a.10.b.20", &captures)?;
//! assert_eq!(resolved.measurement, "10_20");
//! assert_eq!(resolved.field, "value");
//! # Ok(())
//! # }
//! ```

use std::sync::LazyLock;

use regex::{NoExpand, Regex};

use crate::config::Rule;
use crate::error::{ConfigError, Result, TemplateError};

/// Field name used when a rule leaves the field template empty.
pub const DEFAULT_FIELD: &str = "value";

/// Finds `{{ name }}` tokens. Whitespace around the name is insignificant.
static WILDCARD_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([^\s{}]+)\s*\}\}").expect("wildcard token regex is valid")
});

/// Regex fragment matching one path segment.
const SEGMENT: &str = "[^.]+";

/// A named wildcard extracted from a pattern.
#[derive(Debug, Clone)]
struct Wildcard {
    /// Name as written between the braces.
    name: String,
    /// Capture group index in the compiled matcher.
    group: usize,
    /// Matches this wildcard's token in templates, any inner whitespace.
    token: Regex,
}

/// A rule with its pattern compiled into a matcher.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    rule: Rule,
    matcher: Regex,
    wildcards: Vec<Wildcard>,
}

/// Measurement, field and tag set after wildcard substitution.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResolvedTemplates {
    /// Resolved measurement name.
    pub measurement: String,
    /// Resolved field key.
    pub field: String,
    /// Resolved tag set, each tag rendered as `,key=value`.
    pub tags: String,
}

impl CompiledRule {
    /// Compiles a rule's pattern.
    ///
    /// Every wildcard token becomes its own capture group. A wildcard that
    /// appears more than once is bound by its last occurrence.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidPattern`] if the substituted pattern is
    /// not a valid regular expression (e.g. it carries unbalanced regex
    /// syntax outside the wildcard tokens).
    pub fn compile(rule: Rule) -> Result<Self> {
        // (name, index of its last occurrence), in first-occurrence order.
        let mut names: Vec<(String, usize)> = Vec::new();
        let mut source = String::with_capacity(rule.pattern.len() * 2);
        let mut last = 0;

        for (occurrence, caps) in WILDCARD_TOKEN.captures_iter(&rule.pattern).enumerate() {
            let (Some(token), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            source.push_str(&escape_dots(&rule.pattern[last..token.start()]));
            source.push_str(&format!("(?P<o{occurrence}>{SEGMENT})"));
            last = token.end();

            let name = name.as_str();
            match names.iter_mut().find(|(n, _)| n == name) {
                Some((_, binding)) => *binding = occurrence,
                None => names.push((name.to_string(), occurrence)),
            }
        }
        source.push_str(&escape_dots(&rule.pattern[last..]));

        let invalid = |e| ConfigError::InvalidPattern {
            pattern: rule.pattern.clone(),
            source: e,
        };
        let matcher = Regex::new(&source).map_err(invalid)?;

        let mut wildcards = Vec::with_capacity(names.len());
        for (name, occurrence) in names {
            let group_name = format!("o{occurrence}");
            let group = matcher
                .capture_names()
                .position(|n| n == Some(group_name.as_str()))
                .unwrap_or_default();
            let token = Regex::new(&format!(r"\{{\{{\s*{}\s*\}}\}}", regex::escape(&name)))
                .map_err(invalid)?;
            wildcards.push(Wildcard { name, group, token });
        }

        Ok(Self {
            rule,
            matcher,
            wildcards,
        })
    }

    /// The source rule.
    pub fn rule(&self) -> &Rule {
        &self.rule
    }

    /// Wildcard names in first-occurrence order.
    pub fn wildcard_names(&self) -> impl Iterator<Item = &str> {
        self.wildcards.iter().map(|w| w.name.as_str())
    }

    /// Matches the pattern anywhere in `path`.
    ///
    /// The match is deliberately unanchored: a pattern matching a substring
    /// of a longer path is accepted. Returns the captured segments in
    /// wildcard-name order.
    pub fn captures(&self, path: &str) -> Option<Vec<String>> {
        let caps = self.matcher.captures(path)?;
        Some(
            self.wildcards
                .iter()
                .map(|w| {
                    caps.get(w.group)
                        .map(|m| m.as_str().to_string())
                        .unwrap_or_default()
                })
                .collect(),
        )
    }

    /// Substitutes captured values into the rule's templates.
    ///
    /// An empty measurement template falls back to the last `.`-separated
    /// segment of `normalized_path`; an empty field template falls back to
    /// [`DEFAULT_FIELD`]. Wildcards are substituted from the last declared
    /// to the first.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::TokenInCapture`] if a captured value contains
    /// text shaped like a wildcard token, since substituting it could be
    /// rewritten again by a later wildcard.
    pub fn resolve(&self, normalized_path: &str, captures: &[String]) -> Result<ResolvedTemplates> {
        for (wildcard, value) in self.wildcards.iter().zip(captures) {
            if WILDCARD_TOKEN.is_match(value) {
                return Err(TemplateError::TokenInCapture {
                    wildcard: wildcard.name.clone(),
                    value: value.clone(),
                }
                .into());
            }
        }

        let mut measurement = if self.rule.measurement.is_empty() {
            normalized_path
                .rsplit('.')
                .next()
                .unwrap_or(normalized_path)
                .to_string()
        } else {
            self.rule.measurement.clone()
        };
        let mut field = if self.rule.field.is_empty() {
            DEFAULT_FIELD.to_string()
        } else {
            self.rule.field.clone()
        };
        let mut tags: String = self
            .rule
            .tags
            .iter()
            .map(|t| format!(",{}={}", t.tagkey, t.tagvalue))
            .collect();

        for (wildcard, value) in self.wildcards.iter().zip(captures).rev() {
            let token = &wildcard.token;
            measurement = token.replace_all(&measurement, NoExpand(value)).into_owned();
            field = token.replace_all(&field, NoExpand(value)).into_owned();
            tags = token.replace_all(&tags, NoExpand(value)).into_owned();
        }

        Ok(ResolvedTemplates {
            measurement,
            field,
            tags,
        })
    }
}

fn escape_dots(literal: &str) -> String {
    literal.replace('.', r"\.")
}

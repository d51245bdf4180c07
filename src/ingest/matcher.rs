//! Detection pattern compilation and log line scanning.

use crate::config::PatternRule;
use crate::metrics;
use regex::Regex;
use std::net::IpAddr;
use tracing::{debug, warn};

/// A compiled detection rule.
#[derive(Debug)]
struct CompiledPattern {
    name: String,
    regex: Regex,
    ip_group: usize,
    severity: i32,
    description: String,
}

/// An extracted violation, ready for the ban engine.
#[derive(Debug, Clone, PartialEq)]
pub struct LineMatch {
    pub pattern: String,
    pub ip: String,
    pub severity: i32,
    pub description: String,
}

/// The active rule set, compiled once and applied to every log line.
///
/// Rules whose regex fails to compile are dropped with a warning; a bad
/// rule never takes the service down. Disabled rules are skipped at
/// compile time.
#[derive(Debug, Default)]
pub struct PatternSet {
    patterns: Vec<CompiledPattern>,
}

impl PatternSet {
    /// Compile a rule set. Order is preserved so scanning stays stable.
    pub fn compile(rules: &[PatternRule]) -> Self {
        let mut patterns = Vec::with_capacity(rules.len());
        for rule in rules {
            if !rule.enabled {
                continue;
            }
            match Regex::new(&rule.regex) {
                Ok(regex) => patterns.push(CompiledPattern {
                    name: rule.name.clone(),
                    regex,
                    ip_group: rule.ip_group,
                    severity: rule.severity,
                    description: rule.description.clone(),
                }),
                Err(e) => {
                    warn!(
                        name = %rule.name,
                        regex = %rule.regex,
                        error = %e,
                        "Failed to compile regex pattern, rule dropped"
                    );
                }
            }
        }
        Self { patterns }
    }

    /// Number of active compiled rules.
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Scan one log line. Every matching rule whose capture group holds a
    /// valid address emits one violation; a line can emit several.
    pub fn scan(&self, line: &str) -> Vec<LineMatch> {
        let mut matches = Vec::new();

        for pattern in &self.patterns {
            let Some(captures) = pattern.regex.captures(line) else {
                continue;
            };
            let Some(group) = captures.get(pattern.ip_group) else {
                continue;
            };

            let candidate = group.as_str().trim();
            if candidate.parse::<IpAddr>().is_err() {
                continue;
            }

            debug!(
                pattern = %pattern.name,
                ip = %candidate,
                severity = pattern.severity,
                "Suspicious activity detected"
            );
            let severity_label = pattern.severity.to_string();
            metrics::PATTERN_MATCHES
                .with_label_values(&[pattern.name.as_str(), severity_label.as_str()])
                .inc();

            matches.push(LineMatch {
                pattern: pattern.name.clone(),
                ip: candidate.to_string(),
                severity: pattern.severity,
                description: pattern.description.clone(),
            });
        }

        matches
    }
}

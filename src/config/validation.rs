//! Configuration validation.
//!
//! Startup validation is fatal; the same checks are applied to dynamic
//! configuration loaded from the database before it is accepted.

use super::{BanConfig, Config, ConfigError, PatternRule};

impl Config {
    /// Validate the configuration. Called by [`Config::load`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.spoa.enabled && !self.envoy.enabled && !self.nginx.enabled {
            return Err(ConfigError::Invalid(
                "at least one proxy protocol must be enabled (spoa, envoy, or nginx)".to_string(),
            ));
        }

        validate_patterns(&self.syslog.patterns)?;
        validate_ban_config(&self.ban)?;

        Ok(())
    }
}

/// Validate a pattern rule set. Regex compilation is deliberately not
/// checked here: rules that fail to compile are dropped with a warning at
/// load time rather than rejecting the whole set.
pub fn validate_patterns(patterns: &[PatternRule]) -> Result<(), ConfigError> {
    for (i, pattern) in patterns.iter().enumerate() {
        if pattern.name.is_empty() {
            return Err(ConfigError::Invalid(format!("pattern {i} has empty name")));
        }
        if pattern.regex.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "pattern {} has empty regex",
                pattern.name
            )));
        }
        if pattern.ip_group < 1 {
            return Err(ConfigError::Invalid(format!(
                "pattern {} has invalid ip_group: {}",
                pattern.name, pattern.ip_group
            )));
        }
        if !(1..=6).contains(&pattern.severity) {
            return Err(ConfigError::Invalid(format!(
                "pattern {} has severity {} outside 1..6",
                pattern.name, pattern.severity
            )));
        }
    }
    Ok(())
}

/// Validate a ban policy.
pub fn validate_ban_config(ban: &BanConfig) -> Result<(), ConfigError> {
    if ban.initial_ban_time_seconds == 0 {
        return Err(ConfigError::Invalid(
            "initial ban time must be positive".to_string(),
        ));
    }
    if ban.max_ban_time_seconds < ban.initial_ban_time_seconds {
        return Err(ConfigError::Invalid(
            "max ban time must be at least the initial ban time".to_string(),
        ));
    }
    if ban.escalation_factor <= 1.0 {
        return Err(ConfigError::Invalid(
            "escalation factor must be greater than 1.0".to_string(),
        ));
    }
    if ban.max_attempts == 0 {
        return Err(ConfigError::Invalid(
            "max attempts must be positive".to_string(),
        ));
    }
    if ban.time_window_seconds == 0 {
        return Err(ConfigError::Invalid(
            "time window must be positive".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_all_adapters_disabled() {
        let mut config = Config::default();
        config.spoa.enabled = false;
        config.envoy.enabled = false;
        config.nginx.enabled = false;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_bad_escalation_factor() {
        let ban = BanConfig {
            escalation_factor: 1.0,
            ..BanConfig::default()
        };
        assert!(validate_ban_config(&ban).is_err());
    }

    #[test]
    fn rejects_max_ban_below_initial() {
        let ban = BanConfig {
            initial_ban_time_seconds: 600,
            max_ban_time_seconds: 300,
            ..BanConfig::default()
        };
        assert!(validate_ban_config(&ban).is_err());
    }

    #[test]
    fn rejects_empty_pattern_name() {
        let patterns = vec![PatternRule {
            name: String::new(),
            regex: "x".to_string(),
            ip_group: 1,
            severity: 1,
            description: String::new(),
            enabled: true,
        }];
        assert!(validate_patterns(&patterns).is_err());
    }

    #[test]
    fn rejects_zero_ip_group() {
        let patterns = vec![PatternRule {
            name: "p".to_string(),
            regex: "x".to_string(),
            ip_group: 0,
            severity: 1,
            description: String::new(),
            enabled: true,
        }];
        assert!(validate_patterns(&patterns).is_err());
    }

    #[test]
    fn rejects_out_of_range_severity() {
        let patterns = vec![PatternRule {
            name: "p".to_string(),
            regex: "x".to_string(),
            ip_group: 1,
            severity: 7,
            description: String::new(),
            enabled: true,
        }];
        assert!(validate_patterns(&patterns).is_err());
    }
}

use crate::config::types::{
    BrowserConfig, Config, ExtractionConfig, IntervalsConfig, LimitsConfig, OutputConfig,
    RetryConfig, TargetConfig,
};
use crate::ConfigError;
use url::Url;

/// Shortest cadence accepted for either crawl loop
const MIN_INTERVAL_MS: u64 = 60_000;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_target(&config.target)?;
    validate_limits(&config.limits)?;
    validate_intervals(&config.intervals)?;
    validate_browser(&config.browser)?;
    validate_extraction(&config.extraction)?;
    validate_retry(&config.retry)?;
    validate_output(&config.output)?;

    if config.discovery.max_no_change_attempts < 1 {
        return Err(ConfigError::Validation(
            "discovery.max-no-change-attempts must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Returns true if `name` looks like a handle on the target site
pub fn is_valid_username(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 15
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn validate_target(config: &TargetConfig) -> Result<(), ConfigError> {
    if !is_valid_username(&config.username) {
        return Err(ConfigError::Validation(format!(
            "target.username must be 1-15 characters of [A-Za-z0-9_], got '{}'",
            config.username
        )));
    }
    Ok(())
}

fn validate_limits(config: &LimitsConfig) -> Result<(), ConfigError> {
    let positive = [
        ("max-posts-per-account", config.max_posts_per_account),
        ("max-accounts-per-cycle", config.max_accounts_per_cycle),
        ("max-scroll-attempts", config.max_scroll_attempts as usize),
        ("max-accounts", config.max_accounts),
        (
            "max-persistence-failures",
            config.max_persistence_failures as usize,
        ),
    ];

    for (name, value) in positive {
        if value < 1 {
            return Err(ConfigError::Validation(format!(
                "limits.{} must be >= 1, got {}",
                name, value
            )));
        }
    }

    if !config.min_hours_between_updates.is_finite() || config.min_hours_between_updates < 0.0 {
        return Err(ConfigError::Validation(format!(
            "limits.min-hours-between-updates must be a non-negative number, got {}",
            config.min_hours_between_updates
        )));
    }

    Ok(())
}

fn validate_intervals(config: &IntervalsConfig) -> Result<(), ConfigError> {
    for (name, value) in [
        ("following-update-ms", config.following_update_ms),
        ("content-fetch-ms", config.content_fetch_ms),
    ] {
        if value < MIN_INTERVAL_MS {
            return Err(ConfigError::Validation(format!(
                "intervals.{} must be >= {}ms, got {}ms",
                name, MIN_INTERVAL_MS, value
            )));
        }
    }
    Ok(())
}

fn validate_browser(config: &BrowserConfig) -> Result<(), ConfigError> {
    let endpoint = Url::parse(&config.endpoint)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid browser.endpoint: {}", e)))?;
    if endpoint.scheme() != "http" && endpoint.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "browser.endpoint must be http(s), got '{}'",
            config.endpoint
        )));
    }

    let site = Url::parse(&config.site_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid browser.site-url: {}", e)))?;
    if site.scheme() != "https" {
        return Err(ConfigError::Validation(format!(
            "browser.site-url '{}' must use HTTPS scheme",
            config.site_url
        )));
    }

    if config.navigation_timeout_ms < 1_000 {
        return Err(ConfigError::Validation(format!(
            "browser.navigation-timeout-ms must be >= 1000ms, got {}ms",
            config.navigation_timeout_ms
        )));
    }

    if config.content_wait_ms == 0 {
        return Err(ConfigError::Validation(
            "browser.content-wait-ms must be > 0".to_string(),
        ));
    }

    Ok(())
}

fn validate_extraction(config: &ExtractionConfig) -> Result<(), ConfigError> {
    if config.no_new_content_max_attempts < 1 {
        return Err(ConfigError::Validation(
            "extraction.no-new-content-max-attempts must be >= 1".to_string(),
        ));
    }
    Ok(())
}

fn validate_retry(config: &RetryConfig) -> Result<(), ConfigError> {
    if config.max_attempts < 1 || config.max_attempts > 10 {
        return Err(ConfigError::Validation(format!(
            "retry.max-attempts must be between 1 and 10, got {}",
            config.max_attempts
        )));
    }
    Ok(())
}

fn validate_output(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "output.database-path cannot be empty".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_valid_username() {
        assert!(is_valid_username("jack"));
        assert!(is_valid_username("some_user_123"));

        assert!(!is_valid_username(""));
        assert!(!is_valid_username("has space"));
        assert!(!is_valid_username("dash-name"));
        assert!(!is_valid_username("sixteen_chars_xx"));
    }

    #[test]
    fn test_validate_intervals() {
        let ok = IntervalsConfig {
            following_update_ms: 86_400_000,
            content_fetch_ms: 60_000,
        };
        assert!(validate_intervals(&ok).is_ok());

        let too_fast = IntervalsConfig {
            following_update_ms: 86_400_000,
            content_fetch_ms: 500,
        };
        assert!(validate_intervals(&too_fast).is_err());
    }

    #[test]
    fn test_validate_limits_rejects_negative_hours() {
        let limits = LimitsConfig {
            max_posts_per_account: 10,
            max_accounts_per_cycle: 10,
            max_scroll_attempts: 5,
            max_accounts: 100,
            min_hours_between_updates: -1.0,
            max_persistence_failures: 3,
        };
        assert!(validate_limits(&limits).is_err());

        let zero_hours = LimitsConfig {
            min_hours_between_updates: 0.0,
            ..limits
        };
        assert!(validate_limits(&zero_hours).is_ok());
    }
}

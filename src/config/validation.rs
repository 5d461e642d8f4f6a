use crate::config::types::{
    Config, CrawlerConfig, DetectorConfig, HttpConfig, KnowledgeConfig, OutputConfig, Source,
};
use crate::ConfigError;
use std::collections::HashSet;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_detector_config(&config.detector)?;
    validate_knowledge_config(&config.knowledge)?;
    validate_http_config(&config.http)?;
    validate_output_config(&config.output)?;
    validate_sources(&config.sources)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.workers < 1 || config.workers > 64 {
        return Err(ConfigError::Validation(format!(
            "workers must be between 1 and 64, got {}",
            config.workers
        )));
    }

    if config.max_pages < 1 {
        return Err(ConfigError::Validation(format!(
            "max_pages must be >= 1, got {}",
            config.max_pages
        )));
    }

    if config.consecutive_empty_limit < 1 {
        return Err(ConfigError::Validation(
            "consecutive_empty_limit must be >= 1".to_string(),
        ));
    }

    if config.candidate_patterns < 1 {
        return Err(ConfigError::Validation(
            "candidate_patterns must be >= 1".to_string(),
        ));
    }

    if config.page_delay_min_ms > config.page_delay_max_ms {
        return Err(ConfigError::Validation(format!(
            "page_delay_min_ms ({}) exceeds page_delay_max_ms ({})",
            config.page_delay_min_ms, config.page_delay_max_ms
        )));
    }

    if config.politeness_min_ms > config.politeness_max_ms {
        return Err(ConfigError::Validation(format!(
            "politeness_min_ms ({}) exceeds politeness_max_ms ({})",
            config.politeness_min_ms, config.politeness_max_ms
        )));
    }

    Ok(())
}

/// Validates the detector depth band and group thresholds
fn validate_detector_config(config: &DetectorConfig) -> Result<(), ConfigError> {
    if config.min_depth >= config.max_depth {
        return Err(ConfigError::Validation(format!(
            "detector min_depth ({}) must be below max_depth ({})",
            config.min_depth, config.max_depth
        )));
    }

    if config.min_group_size < 2 {
        return Err(ConfigError::Validation(format!(
            "min_group_size must be >= 2, got {}",
            config.min_group_size
        )));
    }

    if config.min_valid_members > config.min_group_size {
        return Err(ConfigError::Validation(format!(
            "min_valid_members ({}) cannot exceed min_group_size ({})",
            config.min_valid_members, config.min_group_size
        )));
    }

    Ok(())
}

fn validate_knowledge_config(config: &KnowledgeConfig) -> Result<(), ConfigError> {
    if !(0.0..1.0).contains(&config.similarity_floor) {
        return Err(ConfigError::Validation(format!(
            "similarity_floor must be in [0, 1), got {}",
            config.similarity_floor
        )));
    }

    if config.max_similar_domains < 1 {
        return Err(ConfigError::Validation(
            "max_similar_domains must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_http_config(config: &HttpConfig) -> Result<(), ConfigError> {
    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user_agent cannot be empty".to_string(),
        ));
    }

    if config.timeout_secs == 0 || config.connect_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "timeouts must be at least one second".to_string(),
        ));
    }

    if config.max_attempts < 1 {
        return Err(ConfigError::Validation(
            "max_attempts must be >= 1".to_string(),
        ));
    }

    if config.backoff_base_ms > config.backoff_cap_ms {
        return Err(ConfigError::Validation(format!(
            "backoff_base_ms ({}) exceeds backoff_cap_ms ({})",
            config.backoff_base_ms, config.backoff_cap_ms
        )));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    if config.summary_path.is_empty() {
        return Err(ConfigError::Validation(
            "summary_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates source entries: unique ids and fetchable URLs
fn validate_sources(sources: &[Source]) -> Result<(), ConfigError> {
    let mut seen_ids = HashSet::new();

    for source in sources {
        if source.id.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "Source '{}' has an empty id",
                source.name
            )));
        }

        if !seen_ids.insert(source.id.as_str()) {
            return Err(ConfigError::Validation(format!(
                "Duplicate source id '{}'",
                source.id
            )));
        }

        let url = Url::parse(&source.url).map_err(|e| {
            ConfigError::InvalidUrl(format!("Invalid source URL '{}': {}", source.url, e))
        })?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::Validation(format!(
                "Source URL '{}' must use http or https",
                source.url
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        Config {
            output: OutputConfig {
                database_path: "./test.db".to_string(),
                summary_path: "./summary.md".to_string(),
            },
            sources: vec![Source::new("1", "Acme", "https://acme.com/listings")],
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults_are_valid() {
        assert!(validate(&valid_config()).is_ok());
    }

    #[test]
    fn test_inverted_depth_band() {
        let mut config = valid_config();
        config.detector.min_depth = 15;
        config.detector.max_depth = 3;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_similarity_floor_range() {
        let mut config = valid_config();
        config.knowledge.similarity_floor = 1.0;
        assert!(validate(&config).is_err());

        config.knowledge.similarity_floor = -0.1;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_backoff_base_above_cap() {
        let mut config = valid_config();
        config.http.backoff_base_ms = 20_000;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_duplicate_source_ids() {
        let mut config = valid_config();
        config
            .sources
            .push(Source::new("1", "Acme Again", "https://acme2.com/"));
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_source_scheme() {
        let mut config = valid_config();
        config.sources = vec![Source::new("9", "Ftp", "ftp://files.example.com/list.csv")];
        assert!(validate(&config).is_err());

        config.sources = vec![Source::new("9", "Broken", "not a url")];
        assert!(matches!(
            validate(&config).unwrap_err(),
            ConfigError::InvalidUrl(_)
        ));
    }

    #[test]
    fn test_delay_bounds() {
        let mut config = valid_config();
        config.crawler.politeness_min_ms = 5000;
        config.crawler.politeness_max_ms = 1000;
        assert!(validate(&config).is_err());
    }
}

// Environment configuration for the host binary.

use crate::core::moderation::ModerationConfig;
use anyhow::Context;

pub const DEFAULT_DATABASE_URL: &str = "data/moderation.db";

#[derive(Debug, Clone)]
pub struct HostConfig {
    pub database_url: String,
    pub moderation: ModerationConfig,
}

impl HostConfig {
    /// Read configuration from the process environment.
    ///
    /// Call `dotenv::dotenv()` first if a `.env` file should be honoured.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from any key lookup. Unset keys fall back to defaults;
    /// set but unparsable numbers are an error.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let defaults = ModerationConfig::default();

        let parse_size = |key: &str, default: u32| -> anyhow::Result<u32> {
            match lookup(key) {
                Some(raw) => raw
                    .trim()
                    .parse::<u32>()
                    .with_context(|| format!("{key} must be a positive integer, got {raw:?}")),
                None => Ok(default),
            }
        };

        let default_page_size = parse_size("MODERATION_PAGE_SIZE", defaults.default_page_size)?;
        let max_page_size = parse_size("MODERATION_MAX_PAGE_SIZE", defaults.max_page_size)?;
        if max_page_size == 0 {
            anyhow::bail!("MODERATION_MAX_PAGE_SIZE must be at least 1");
        }

        Ok(Self {
            database_url: lookup("DATABASE_URL")
                .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            moderation: ModerationConfig {
                default_page_size,
                max_page_size,
                media_base_url: lookup("MEDIA_BASE_URL").unwrap_or(defaults.media_base_url),
                warning_template: lookup("MODERATION_WARNING_TEMPLATE")
                    .unwrap_or(defaults.warning_template),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = HostConfig::from_lookup(lookup(&[])).unwrap();

        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(config.moderation.default_page_size, 20);
        assert_eq!(config.moderation.max_page_size, 100);
        assert_eq!(config.moderation.media_base_url, "/media");
    }

    #[test]
    fn test_overrides() {
        let config = HostConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "sqlite::memory:"),
            ("MODERATION_PAGE_SIZE", " 50 "),
            ("MEDIA_BASE_URL", "https://cdn.example.com/"),
            ("MODERATION_WARNING_TEMPLATE", "Warning: {reason}"),
        ]))
        .unwrap();

        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(config.moderation.default_page_size, 50);
        assert_eq!(
            config.moderation.media_url("a.png"),
            "https://cdn.example.com/a.png"
        );
        assert_eq!(config.moderation.warning_text("spam"), "Warning: spam");
    }

    #[test]
    fn test_bad_numbers_are_rejected() {
        let err = HostConfig::from_lookup(lookup(&[("MODERATION_PAGE_SIZE", "lots")]))
            .unwrap_err();
        assert!(err.to_string().contains("MODERATION_PAGE_SIZE"));

        assert!(HostConfig::from_lookup(lookup(&[("MODERATION_MAX_PAGE_SIZE", "0")])).is_err());
    }
}

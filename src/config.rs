//! Configuration for the recipe cache and its Supabase gateway

use std::time::Duration;
use url::Url;

use crate::error::{RecipeError, Result};

/// Default number of recipes fetched per page
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Default table holding user recipes
pub const DEFAULT_TABLE: &str = "user_recipes";

/// Configuration for the recipe cache
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// The base URL for the Supabase project
    pub url: Url,

    /// The anonymous API key for the Supabase project
    pub anon_key: String,

    /// The table holding recipes
    pub table: String,

    /// Rows requested per page
    pub page_size: usize,

    /// Upper bound for any single network call
    pub request_timeout: Duration,

    /// Refresh calls arriving within this window of the previous one are skipped
    pub refresh_debounce: Duration,
}

impl SyncConfig {
    /// Create a configuration, validating the URL and key
    pub fn new(url: &str, anon_key: &str) -> Result<Self> {
        let url = Url::parse(url)?;
        if anon_key.is_empty() {
            return Err(RecipeError::config("anon_key cannot be empty"));
        }

        Ok(Self {
            url,
            anon_key: anon_key.to_string(),
            table: DEFAULT_TABLE.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            request_timeout: Duration::from_secs(30),
            refresh_debounce: Duration::from_millis(500),
        })
    }

    /// Read the configuration from environment variables.
    ///
    /// `SUPABASE_URL` and `SUPABASE_ANON_KEY` are required; `RECIPE_TABLE`,
    /// `RECIPE_PAGE_SIZE` and `RECIPE_REQUEST_TIMEOUT_SECS` are optional.
    pub fn from_env() -> Result<Self> {
        let url = std::env::var("SUPABASE_URL")
            .map_err(|_| RecipeError::config("SUPABASE_URL environment variable not found"))?;
        let anon_key = std::env::var("SUPABASE_ANON_KEY").map_err(|_| {
            RecipeError::config("SUPABASE_ANON_KEY environment variable not found")
        })?;

        let mut config = Self::new(&url, &anon_key)?;

        if let Ok(table) = std::env::var("RECIPE_TABLE") {
            config = config.with_table(&table);
        }
        if let Ok(raw) = std::env::var("RECIPE_PAGE_SIZE") {
            let page_size = raw
                .parse::<usize>()
                .map_err(|_| RecipeError::config(format!("invalid RECIPE_PAGE_SIZE: {}", raw)))?;
            config = config.with_page_size(page_size)?;
        }
        if let Ok(raw) = std::env::var("RECIPE_REQUEST_TIMEOUT_SECS") {
            let secs = raw.parse::<u64>().map_err(|_| {
                RecipeError::config(format!("invalid RECIPE_REQUEST_TIMEOUT_SECS: {}", raw))
            })?;
            config = config.with_request_timeout(Duration::from_secs(secs));
        }

        Ok(config)
    }

    /// Set the recipe table
    pub fn with_table(mut self, table: &str) -> Self {
        self.table = table.to_string();
        self
    }

    /// Set the page size; zero is rejected
    pub fn with_page_size(mut self, page_size: usize) -> Result<Self> {
        if page_size == 0 {
            return Err(RecipeError::config("page_size must be at least 1"));
        }
        self.page_size = page_size;
        Ok(self)
    }

    /// Set the request timeout
    pub fn with_request_timeout(mut self, value: Duration) -> Self {
        self.request_timeout = value;
        self
    }

    /// Set the refresh debounce window
    pub fn with_refresh_debounce(mut self, value: Duration) -> Self {
        self.refresh_debounce = value;
        self
    }

    /// Base URL without a trailing slash
    pub fn base_url(&self) -> &str {
        self.url.as_str().trim_end_matches('/')
    }
}

/// Options for the cache alone, detached from any backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheOptions {
    pub page_size: usize,
    pub request_timeout: Duration,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl From<&SyncConfig> for CacheOptions {
    fn from(config: &SyncConfig) -> Self {
        Self {
            page_size: config.page_size,
            request_timeout: config.request_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SyncConfig::new("https://example.supabase.co", "anon").unwrap();
        assert_eq!(config.table, "user_recipes");
        assert_eq!(config.page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.base_url(), "https://example.supabase.co");
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(matches!(
            SyncConfig::new("not a url", "anon"),
            Err(RecipeError::Config(_))
        ));
        assert!(matches!(
            SyncConfig::new("https://example.supabase.co", ""),
            Err(RecipeError::Config(_))
        ));

        let config = SyncConfig::new("https://example.supabase.co", "anon").unwrap();
        assert!(config.with_page_size(0).is_err());
    }

    #[test]
    fn test_builder_methods() {
        let config = SyncConfig::new("https://example.supabase.co/", "anon")
            .unwrap()
            .with_table("recipes")
            .with_page_size(5)
            .unwrap()
            .with_request_timeout(Duration::from_secs(3))
            .with_refresh_debounce(Duration::ZERO);

        assert_eq!(config.table, "recipes");
        assert_eq!(config.page_size, 5);
        assert_eq!(config.refresh_debounce, Duration::ZERO);

        let options = CacheOptions::from(&config);
        assert_eq!(options.page_size, 5);
        assert_eq!(options.request_timeout, Duration::from_secs(3));
    }
}

//! Centralized configuration for pathmend.
//!
//! Compile-time constants grouped by concern, the category/environment naming
//! scheme shared by catalogs and albums, and the runtime [`Settings`] file.

use crate::persist::atomic_read_json;
use crate::{PathmendError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Object store defaults.
pub struct StoreConfig;

impl StoreConfig {
    pub const DEFAULT_CATALOG_PREFIX: &'static str = "data";
    pub const MAX_RETRY_ATTEMPTS: u32 = 4;
    pub const RETRY_BASE_DELAY: Duration = Duration::from_millis(250);
    pub const RETRY_MAX_DELAY: Duration = Duration::from_secs(8);
    pub const LIST_PAGE_SIZE: i32 = 1000;
}

/// Reconciliation run defaults.
pub struct RunConfig;

impl RunConfig {
    pub const DEFAULT_CONCURRENCY: usize = 8;
    pub const MAX_CONCURRENCY: usize = 32;
    pub const DEFAULT_SAMPLE_LIMIT: usize = 10;
}

/// Heuristics used by the path normalizer.
pub struct NamingConfig;

impl NamingConfig {
    pub const ID_TOKEN_MIN_LEN: usize = 20;
    pub const ID_TOKEN_MAX_LEN: usize = 64;
    pub const ID_TOKEN_MIN_DIGITS: usize = 2;
    pub const ID_TOKEN_MAX_UNDERSCORES: usize = 2;
    pub const ID_TOKEN_MAX_HYPHENS: usize = 1;
}

/// Business category. Each category has one catalog and one album per environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Cafe,
    Bar,
    Dining,
    Cowork,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Cafe,
        Category::Bar,
        Category::Dining,
        Category::Cowork,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Cafe => "cafe",
            Category::Bar => "bar",
            Category::Dining => "dining",
            Category::Cowork => "cowork",
        }
    }

    /// File stem of the category's catalog documents.
    pub fn catalog_stem(&self) -> &'static str {
        match self {
            Category::Cafe => "cafes",
            Category::Bar => "bars",
            Category::Dining => "dining",
            Category::Cowork => "cowork",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "cafe" | "cafes" => Some(Category::Cafe),
            "bar" | "bars" => Some(Category::Bar),
            "dining" => Some(Category::Dining),
            "cowork" | "coworking" => Some(Category::Cowork),
            _ => None,
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Deployment environment. `Prod` documents carry no suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

impl Environment {
    pub const ALL: [Environment; 2] = [Environment::Dev, Environment::Prod];

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Dev => "dev",
            Environment::Prod => "prod",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "dev" | "development" | "staging" => Some(Environment::Dev),
            "prod" | "production" => Some(Environment::Prod),
            _ => None,
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One (catalog document, album) pair to reconcile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    /// Catalog file name, e.g. `bars-dev.json`.
    pub catalog: String,
    /// Album prefix, e.g. `bar-image-dev`.
    pub album: String,
}

impl Target {
    pub fn new(catalog: impl Into<String>, album: impl Into<String>) -> Self {
        Self {
            catalog: catalog.into(),
            album: album.into(),
        }
    }

    /// Conventional target for a category in an environment.
    pub fn for_category(category: Category, env: Environment) -> Self {
        Self {
            catalog: catalog_file_name(category, env),
            album: album_name(category, env),
        }
    }

    /// Every category in every environment.
    pub fn all() -> Vec<Target> {
        Category::ALL
            .iter()
            .flat_map(|c| Environment::ALL.iter().map(|e| Target::for_category(*c, *e)))
            .collect()
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} <-> {}", self.catalog, self.album)
    }
}

/// `bars.json` for prod, `bars-dev.json` for dev.
pub fn catalog_file_name(category: Category, env: Environment) -> String {
    match env {
        Environment::Prod => format!("{}.json", category.catalog_stem()),
        other => format!("{}-{}.json", category.catalog_stem(), other.as_str()),
    }
}

/// `bar-image-dev`, `cafe-image-prod`, ...
pub fn album_name(category: Category, env: Environment) -> String {
    format!("{}-image-{}", category.as_str(), env.as_str())
}

/// Runtime settings, loaded from a JSON file and environment overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Settings {
    /// Bucket holding both albums and catalog documents.
    pub bucket: String,
    /// Key prefix of the catalog documents.
    #[serde(default = "default_catalog_prefix")]
    pub catalog_prefix: String,
    /// Base URL images are served from, e.g. `https://d2cmxnft4myi1k.cloudfront.net`.
    pub cdn_base: String,
    /// CDN distribution to invalidate after catalog writes.
    #[serde(default)]
    pub distribution_id: Option<String>,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_sample_limit")]
    pub sample_limit: usize,
    /// Correction table file.
    #[serde(default)]
    pub corrections: Option<PathBuf>,
    /// Serve the bucket from a local mirror instead of S3.
    #[serde(default)]
    pub local_root: Option<PathBuf>,
    #[serde(default)]
    pub endpoint_url: Option<String>,
    #[serde(default)]
    pub force_path_style: bool,
}

fn default_catalog_prefix() -> String {
    StoreConfig::DEFAULT_CATALOG_PREFIX.to_string()
}

fn default_concurrency() -> usize {
    RunConfig::DEFAULT_CONCURRENCY
}

fn default_sample_limit() -> usize {
    RunConfig::DEFAULT_SAMPLE_LIMIT
}

impl Settings {
    pub const FILE_NAME: &'static str = "settings.json";

    pub fn new(bucket: impl Into<String>, cdn_base: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            catalog_prefix: default_catalog_prefix(),
            cdn_base: cdn_base.into(),
            distribution_id: None,
            concurrency: default_concurrency(),
            sample_limit: default_sample_limit(),
            corrections: None,
            local_root: None,
            endpoint_url: None,
            force_path_style: false,
        }
    }

    /// Settings from `PATHMEND_*` variables alone, for runs without a file.
    pub fn from_env() -> Result<Self> {
        let mut settings = Self::new(String::new(), String::new());
        settings.apply_env_overrides(|name| std::env::var(name).ok());
        settings.validate()?;
        Ok(settings)
    }

    /// `{config_dir}/pathmend/settings.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("pathmend").join(Self::FILE_NAME))
    }

    /// Load settings from `path`, apply `PATHMEND_*` overrides and validate.
    pub fn load(path: &Path) -> Result<Self> {
        let mut settings: Settings =
            atomic_read_json(path)?.ok_or_else(|| PathmendError::Config {
                message: format!("Settings file not found: {}", path.display()),
            })?;
        settings.apply_env_overrides(|name| std::env::var(name).ok());
        settings.validate()?;
        Ok(settings)
    }

    /// Apply overrides from a variable lookup (the process environment in production).
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("PATHMEND_BUCKET") {
            self.bucket = v;
        }
        if let Some(v) = lookup("PATHMEND_CDN_BASE") {
            self.cdn_base = v;
        }
        if let Some(v) = lookup("PATHMEND_DISTRIBUTION_ID") {
            self.distribution_id = Some(v);
        }
        if let Some(v) = lookup("PATHMEND_S3_ENDPOINT_URL") {
            self.endpoint_url = Some(v);
        }
        if let Some(v) = lookup("PATHMEND_LOCAL_ROOT") {
            self.local_root = Some(PathBuf::from(v));
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.bucket.trim().is_empty() && self.local_root.is_none() {
            return Err(PathmendError::Config {
                message: "bucket must be set when no local_root is configured".into(),
            });
        }
        let cdn = url::Url::parse(&self.cdn_base).map_err(|e| PathmendError::Config {
            message: format!("Invalid cdn_base {:?}: {}", self.cdn_base, e),
        })?;
        if cdn.host_str().is_none() {
            return Err(PathmendError::Config {
                message: format!("cdn_base {:?} has no host", self.cdn_base),
            });
        }
        if self.concurrency == 0 || self.concurrency > RunConfig::MAX_CONCURRENCY {
            return Err(PathmendError::Config {
                message: format!(
                    "concurrency must be between 1 and {}, got {}",
                    RunConfig::MAX_CONCURRENCY,
                    self.concurrency
                ),
            });
        }
        Ok(())
    }

    /// Public URL of an object, with each key segment percent-encoded.
    pub fn object_url(&self, key: &str) -> String {
        let encoded: Vec<String> = key
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect();
        format!("{}/{}", self.cdn_base.trim_end_matches('/'), encoded.join("/"))
    }

    /// Object-store key of a catalog file.
    pub fn catalog_key(&self, catalog: &str) -> String {
        let prefix = self.catalog_prefix.trim_matches('/');
        if prefix.is_empty() {
            catalog.to_string()
        } else {
            format!("{}/{}", prefix, catalog)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> Settings {
        serde_json::from_str(
            r#"{"bucket": "baliciaga-database", "cdn_base": "https://d2cmxnft4myi1k.cloudfront.net"}"#,
        )
        .unwrap()
    }

    #[test]
    fn test_catalog_file_names() {
        assert_eq!(catalog_file_name(Category::Bar, Environment::Prod), "bars.json");
        assert_eq!(catalog_file_name(Category::Bar, Environment::Dev), "bars-dev.json");
        assert_eq!(catalog_file_name(Category::Cafe, Environment::Dev), "cafes-dev.json");
        assert_eq!(catalog_file_name(Category::Cowork, Environment::Prod), "cowork.json");
    }

    #[test]
    fn test_album_names() {
        assert_eq!(album_name(Category::Bar, Environment::Dev), "bar-image-dev");
        assert_eq!(album_name(Category::Dining, Environment::Prod), "dining-image-prod");
    }

    #[test]
    fn test_all_targets() {
        let targets = Target::all();
        assert_eq!(targets.len(), 8);
        assert!(targets.contains(&Target::new("cafes.json", "cafe-image-prod")));
    }

    #[test]
    fn test_category_from_str() {
        assert_eq!(Category::from_str("Bars"), Some(Category::Bar));
        assert_eq!(Category::from_str("coworking"), Some(Category::Cowork));
        assert_eq!(Category::from_str("hotel"), None);
    }

    #[test]
    fn test_settings_defaults() {
        let s = settings();
        assert_eq!(s.catalog_prefix, "data");
        assert_eq!(s.concurrency, RunConfig::DEFAULT_CONCURRENCY);
        assert_eq!(s.catalog_key("bars.json"), "data/bars.json");
        assert!(s.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let mut s = settings();
        s.apply_env_overrides(|name| match name {
            "PATHMEND_BUCKET" => Some("other-bucket".to_string()),
            "PATHMEND_DISTRIBUTION_ID" => Some("E2OWVXNIWJXMFR".to_string()),
            _ => None,
        });
        assert_eq!(s.bucket, "other-bucket");
        assert_eq!(s.distribution_id.as_deref(), Some("E2OWVXNIWJXMFR"));
    }

    #[test]
    fn test_validate_rejects_bad_cdn_base() {
        let mut s = settings();
        s.cdn_base = "not a url".into();
        assert!(matches!(s.validate(), Err(PathmendError::Config { .. })));
    }

    #[test]
    fn test_object_url_encodes_segments() {
        let s = settings();
        assert_eq!(
            s.object_url("bar-image-dev/The Shady Fox/1.webp"),
            "https://d2cmxnft4myi1k.cloudfront.net/bar-image-dev/The%20Shady%20Fox/1.webp"
        );
    }

    #[test]
    fn test_new_matches_file_defaults() {
        let s = Settings::new("baliciaga-database", "https://d2cmxnft4myi1k.cloudfront.net");
        assert_eq!(s.catalog_prefix, settings().catalog_prefix);
        assert_eq!(s.sample_limit, RunConfig::DEFAULT_SAMPLE_LIMIT);
        assert!(s.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let mut s = settings();
        s.concurrency = 0;
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_validate_concurrency_cap() {
        let mut s = settings();
        s.concurrency = RunConfig::MAX_CONCURRENCY;
        assert!(s.validate().is_ok());
        s.concurrency = RunConfig::MAX_CONCURRENCY + 1;
        assert!(s.validate().is_err());
        assert_eq!(RunConfig::MAX_CONCURRENCY, 32);
    }
}

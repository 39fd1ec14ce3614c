//! Configuration types for stockfetch
//!
//! A run is driven by one immutable [`Config`], built once at startup (usually from a
//! TOML file via [`Config::load`]) and shared behind an `Arc` by every component.

use crate::error::{Error, Result};
use crate::types::Category;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Remote transfer endpoint (`[transfer]`)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Server hostname
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port (default: 21)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Login user
    #[serde(default = "default_user")]
    pub user: String,

    /// Login password, passed through verbatim
    #[serde(default)]
    pub pass: String,

    /// Remote directory holding the archive drops (default: "/")
    #[serde(default = "default_remote_dir")]
    pub remote_dir: String,

    /// TCP connect timeout (default: 30 seconds)
    #[serde(default = "default_connect_timeout", with = "duration_serde")]
    pub connect_timeout: Duration,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            user: default_user(),
            pass: String::new(),
            remote_dir: default_remote_dir(),
            connect_timeout: default_connect_timeout(),
        }
    }
}

impl TransferConfig {
    /// `host:port` string used for connecting and in log fields
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Download behavior (`[download]`)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Width of the download worker pool (default: 4)
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
        }
    }
}

/// Category set and classification rules (`[categories]`)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CategoriesConfig {
    /// Closed set of recognized category prefixes
    #[serde(default = "default_known_categories")]
    pub known: Vec<String>,

    /// Alternate prefix tokens mapped to their canonical category
    #[serde(default = "default_aliases")]
    pub aliases: BTreeMap<String, String>,

    /// Categories whose `.zip` downloads are unpacked in place
    #[serde(default)]
    pub auto_extract: Vec<String>,

    /// Pattern marking numbered duplicates such as `name (1).zip`
    #[serde(default = "default_duplicate_pattern")]
    pub duplicate_pattern: String,
}

impl Default for CategoriesConfig {
    fn default() -> Self {
        Self {
            known: default_known_categories(),
            aliases: default_aliases(),
            auto_extract: Vec::new(),
            duplicate_pattern: default_duplicate_pattern(),
        }
    }
}

/// Ledger file locations (`[ledger]`)
///
/// One file per category, plus `default`, the run log that is sent as the report.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Run-log file (default: "ledger/run.log")
    #[serde(default = "default_run_log")]
    pub default: PathBuf,

    /// Category name -> ledger file
    #[serde(flatten)]
    pub categories: BTreeMap<String, PathBuf>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            default: default_run_log(),
            categories: default_known_categories()
                .into_iter()
                .map(|c| {
                    let path = PathBuf::from("ledger").join(format!("{c}.txt"));
                    (c, path)
                })
                .collect(),
        }
    }
}

/// Retry configuration for transient failures (`[retry]`)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 30 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Telegram bot upload (`[notification.primary]`)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Bot token, passed through verbatim
    pub bot_token: String,

    /// Target chat
    pub chat_id: String,

    /// Bot API base URL (default: "https://api.telegram.org")
    #[serde(default = "default_telegram_api")]
    pub api_base: String,

    /// Request timeout (default: 60 seconds)
    #[serde(default = "default_notify_timeout", with = "duration_serde")]
    pub timeout: Duration,
}

/// SMTP mail fallback (`[notification.fallback]`)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MailConfig {
    /// Submission server hostname
    pub smtp_host: String,

    /// Submission port, implicit TLS (default: 465)
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,

    /// SMTP login
    pub username: String,

    /// SMTP password, passed through verbatim
    pub password: String,

    /// Sender address
    pub from: String,

    /// Recipient address
    pub to: String,

    /// Connection timeout (default: 60 seconds)
    #[serde(default = "default_notify_timeout", with = "duration_serde")]
    pub timeout: Duration,
}

/// Report delivery channels (`[notification]`)
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Channel tried first
    #[serde(default)]
    pub primary: Option<TelegramConfig>,

    /// Channel tried when the primary cannot be reached
    #[serde(default)]
    pub fallback: Option<MailConfig>,
}

/// Main configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Remote endpoint
    #[serde(default)]
    pub transfer: TransferConfig,

    /// Worker pool settings
    #[serde(default)]
    pub download: DownloadConfig,

    /// Category set, aliases and auto-extract list
    #[serde(default)]
    pub categories: CategoriesConfig,

    /// Category name -> destination directory
    #[serde(default = "default_storage")]
    pub storage: BTreeMap<String, PathBuf>,

    /// Ledger file per category plus the run log
    #[serde(default)]
    pub ledger: LedgerConfig,

    /// Retry policy for connect and fetch
    #[serde(default)]
    pub retry: RetryConfig,

    /// Report delivery
    #[serde(default)]
    pub notification: NotificationConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            transfer: TransferConfig::default(),
            download: DownloadConfig::default(),
            categories: CategoriesConfig::default(),
            storage: default_storage(),
            ledger: LedgerConfig::default(),
            retry: RetryConfig::default(),
            notification: NotificationConfig::default(),
        }
    }
}

impl Config {
    /// Read and parse a TOML configuration file, then validate it.
    ///
    /// Returns the configuration together with the non-fatal warnings found by
    /// [`Config::validate`].
    pub fn load(path: &Path) -> Result<(Self, Vec<String>)> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("cannot read {}: {}", path.display(), e),
            key: None,
        })?;
        let config = Self::from_toml(&text)?;
        let warnings = config.validate()?;
        Ok((config, warnings))
    }

    /// Parse a TOML document without validating it
    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Check cross-references between sections.
    ///
    /// Missing storage or ledger entries for a known category, aliases pointing at
    /// unknown categories, a zero-width pool and a backoff multiplier below 1.0 are
    /// errors. Storage, ledger and auto-extract keys naming unknown categories are
    /// returned as warnings.
    pub fn validate(&self) -> Result<Vec<String>> {
        let mut warnings = Vec::new();

        if self.categories.known.is_empty() {
            return Err(Error::config(
                "at least one category is required",
                "categories.known",
            ));
        }
        if self.download.concurrency == 0 {
            return Err(Error::config(
                "concurrency must be at least 1",
                "download.concurrency",
            ));
        }

        let multiplier = self.retry.backoff_multiplier;
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(Error::config(
                format!("backoff multiplier must be a finite number >= 1.0, got {multiplier}"),
                "retry.backoff_multiplier",
            ));
        }

        let known: Vec<Category> = self.categories.known.iter().map(Category::new).collect();

        for category in &known {
            if !self.storage.keys().any(|k| Category::new(k) == *category) {
                return Err(Error::config(
                    format!("no destination directory for category {category}"),
                    format!("storage.{category}"),
                ));
            }
            if !self
                .ledger
                .categories
                .keys()
                .any(|k| Category::new(k) == *category)
            {
                return Err(Error::config(
                    format!("no ledger file for category {category}"),
                    format!("ledger.{category}"),
                ));
            }
        }

        for (alias, target) in &self.categories.aliases {
            if !known.contains(&Category::new(target)) {
                return Err(Error::config(
                    format!("alias {alias} points at unknown category {target}"),
                    format!("categories.aliases.{alias}"),
                ));
            }
        }

        for key in self.storage.keys() {
            if !known.contains(&Category::new(key)) {
                warnings.push(format!("storage.{key}: unknown category, ignored"));
            }
        }
        for key in self.ledger.categories.keys() {
            if !known.contains(&Category::new(key)) {
                warnings.push(format!("ledger.{key}: unknown category, ignored"));
            }
        }
        for key in &self.categories.auto_extract {
            if !known.contains(&Category::new(key)) {
                warnings.push(format!(
                    "categories.auto_extract: unknown category {key}, ignored"
                ));
            }
        }

        Ok(warnings)
    }

    /// Destination directory for a category
    pub fn destination(&self, category: &Category) -> Option<&Path> {
        self.storage
            .iter()
            .find(|(k, _)| Category::new(k.as_str()) == *category)
            .map(|(_, v)| v.as_path())
    }

    /// Ledger file for a category
    pub fn ledger_path(&self, category: &Category) -> Option<&Path> {
        self.ledger
            .categories
            .iter()
            .find(|(k, _)| Category::new(k.as_str()) == *category)
            .map(|(_, v)| v.as_path())
    }

    /// Whether `.zip` downloads of this category are unpacked
    pub fn is_auto_extract(&self, category: &Category) -> bool {
        self.categories
            .auto_extract
            .iter()
            .any(|c| Category::new(c.as_str()) == *category)
    }

    /// Run-log file sent as the report
    pub fn run_log_path(&self) -> &Path {
        &self.ledger.default
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    21
}

fn default_user() -> String {
    "anonymous".to_string()
}

fn default_remote_dir() -> String {
    "/".to_string()
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_concurrency() -> usize {
    4
}

fn default_known_categories() -> Vec<String> {
    vec![
        "shutterstock".into(),
        "depositphoto".into(),
        "fotolia".into(),
        "dreamstime".into(),
    ]
}

fn default_aliases() -> BTreeMap<String, String> {
    BTreeMap::from([("adobestock".to_string(), "fotolia".to_string())])
}

fn default_duplicate_pattern() -> String {
    r"\s*\(\d+\)\.[^.()\s]+$".to_string()
}

fn default_storage() -> BTreeMap<String, PathBuf> {
    default_known_categories()
        .into_iter()
        .map(|c| {
            let path = PathBuf::from("downloads").join(&c);
            (c, path)
        })
        .collect()
}

fn default_run_log() -> PathBuf {
    PathBuf::from("ledger").join("run.log")
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

fn default_telegram_api() -> String {
    "https://api.telegram.org".to_string()
}

fn default_notify_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_smtp_port() -> u16 {
    465
}

// Durations are written as whole seconds
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

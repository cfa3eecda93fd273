//! Application configuration for dragnet.
//!
//! User config lives at `~/.dragnet/dragnet.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DragnetError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "dragnet.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".dragnet";

/// Default database file name inside the config directory.
const DB_FILE_NAME: &str = "dragnet.db";

// ---------------------------------------------------------------------------
// Config structs (matching dragnet.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Harvest schedule and source list.
    #[serde(default)]
    pub harvest: HarvestConfig,

    /// Storage backend and capacity.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Lifecycle sweep ages and intervals.
    #[serde(default)]
    pub lifecycle: LifecycleConfig,

    /// Relevance filter thresholds.
    #[serde(default)]
    pub filters: FiltersConfig,

    /// Seed keyword lists.
    #[serde(default)]
    pub keywords: KeywordsConfig,

    /// Reply posting settings.
    #[serde(default)]
    pub responder: ResponderConfig,
}

/// `[harvest]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestConfig {
    /// Hours between scheduled pipeline runs.
    #[serde(default = "default_interval_hours")]
    pub interval_hours: u64,

    /// Channels to harvest from (listing feeds at the content service).
    #[serde(default)]
    pub sources: Vec<String>,

    /// Only keep posts created within the last N hours.
    #[serde(default = "default_window_hours")]
    pub window_hours: u64,

    /// Maximum posts requested per channel listing.
    #[serde(default = "default_fetch_limit")]
    pub fetch_limit: u32,

    /// Base URL of the external content service.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// User-Agent sent with every request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            interval_hours: default_interval_hours(),
            sources: Vec::new(),
            window_hours: default_window_hours(),
            fetch_limit: default_fetch_limit(),
            base_url: default_base_url(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_interval_hours() -> u64 {
    12
}
fn default_window_hours() -> u64 {
    12
}
fn default_fetch_limit() -> u32 {
    100
}
fn default_base_url() -> String {
    "https://www.reddit.com".into()
}
fn default_user_agent() -> String {
    format!("dragnet/{}", env!("CARGO_PKG_VERSION"))
}

/// Storage backend selector. One variant today; selected at construction,
/// never by runtime string dispatch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Libsql,
}

/// `[storage]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Which backend to construct.
    #[serde(default)]
    pub backend: StorageBackend,

    /// Database file path. A leading `~` expands to the home directory;
    /// empty means `~/.dragnet/dragnet.db`.
    #[serde(default)]
    pub db_path: String,

    /// Capacity ceiling. Oldest posts are evicted beyond this.
    #[serde(default = "default_max_posts")]
    pub max_posts: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            db_path: String::new(),
            max_posts: default_max_posts(),
        }
    }
}

fn default_max_posts() -> u64 {
    10_000
}

/// `[lifecycle]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Pending posts older than this are archived by the expire sweep.
    #[serde(default = "default_expire_days")]
    pub expire_days: i64,

    /// Assigned posts untouched for this long are returned to pending.
    #[serde(default = "default_unassign_hours")]
    pub unassign_hours: i64,

    /// Hours between expire sweeps.
    #[serde(default = "default_expire_sweep_hours")]
    pub expire_sweep_hours: u64,

    /// Hours between unassign sweeps.
    #[serde(default = "default_unassign_sweep_hours")]
    pub unassign_sweep_hours: u64,

    /// Seconds to wait for an in-flight run during shutdown.
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            expire_days: default_expire_days(),
            unassign_hours: default_unassign_hours(),
            expire_sweep_hours: default_expire_sweep_hours(),
            unassign_sweep_hours: default_unassign_sweep_hours(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

fn default_expire_days() -> i64 {
    7
}
fn default_unassign_hours() -> i64 {
    24
}
fn default_expire_sweep_hours() -> u64 {
    24
}
fn default_unassign_sweep_hours() -> u64 {
    6
}
fn default_shutdown_grace_secs() -> u64 {
    300
}

/// `[filters]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FiltersConfig {
    /// When false the whole filter stage is skipped (accept-all).
    /// The bypass is surfaced in every run summary.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Minimum upvotes to pass the engagement filter.
    #[serde(default)]
    pub min_upvotes: i64,

    /// Minimum comments to pass the engagement filter.
    #[serde(default)]
    pub min_comments: i64,

    /// Posts with more outbound links than this are treated as promotional.
    #[serde(default = "default_max_links")]
    pub max_links: usize,
}

impl Default for FiltersConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_upvotes: 0,
            min_comments: 0,
            max_links: default_max_links(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_max_links() -> usize {
    2
}

/// `[keywords]` section — seed lists loaded into the store on demand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordsConfig {
    /// Keyword namespace.
    #[serde(default = "default_tenant")]
    pub tenant: String,

    /// Primary-class seed terms.
    #[serde(default)]
    pub primary: Vec<String>,

    /// Secondary-class seed terms.
    #[serde(default)]
    pub secondary: Vec<String>,
}

impl Default for KeywordsConfig {
    fn default() -> Self {
        Self {
            tenant: default_tenant(),
            primary: Vec::new(),
            secondary: Vec::new(),
        }
    }
}

fn default_tenant() -> String {
    "default".into()
}

/// `[responder]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponderConfig {
    /// Base URL for posting replies. Empty means `harvest.base_url`.
    #[serde(default)]
    pub base_url: String,

    /// Name of the env var holding the API token (never store the token itself).
    #[serde(default = "default_token_env")]
    pub token_env: String,
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            token_env: default_token_env(),
        }
    }
}

fn default_token_env() -> String {
    "DRAGNET_API_TOKEN".into()
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.dragnet/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| DragnetError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.dragnet/dragnet.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Resolve the database path from config: expand a leading `~`, fall back
/// to `~/.dragnet/dragnet.db` when unset.
pub fn resolve_db_path(config: &AppConfig) -> Result<PathBuf> {
    if config.storage.db_path.is_empty() {
        return Ok(config_dir()?.join(DB_FILE_NAME));
    }
    expand_tilde(&config.storage.db_path)
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_tilde(path: &str) -> Result<PathBuf> {
    if let Some(rest) = path.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| DragnetError::config("could not determine home directory"))?;
        return Ok(home.join(rest));
    }
    Ok(PathBuf::from(path))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| DragnetError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content)
        .map_err(|e| DragnetError::config(format!("failed to parse {}: {e}", path.display())))?;

    validate(&config)?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| DragnetError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| DragnetError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| DragnetError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Reject configs that cannot drive the engine.
pub fn validate(config: &AppConfig) -> Result<()> {
    if config.harvest.interval_hours == 0 {
        return Err(DragnetError::config("harvest.interval_hours must be >= 1"));
    }
    if config.storage.max_posts == 0 {
        return Err(DragnetError::config("storage.max_posts must be >= 1"));
    }
    if config.lifecycle.expire_days <= 0 {
        return Err(DragnetError::config("lifecycle.expire_days must be >= 1"));
    }
    if config.lifecycle.unassign_hours <= 0 {
        return Err(DragnetError::config("lifecycle.unassign_hours must be >= 1"));
    }
    Ok(())
}

/// Check that the responder API token env var is set and non-empty.
pub fn validate_responder_token(config: &AppConfig) -> Result<String> {
    let var_name = &config.responder.token_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(DragnetError::config(format!(
            "responder API token not found. Set the {var_name} environment variable."
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("interval_hours"));
        assert!(toml_str.contains("max_posts"));
        assert!(toml_str.contains("DRAGNET_API_TOKEN"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.harvest.interval_hours, 12);
        assert_eq!(parsed.storage.max_posts, 10_000);
        assert_eq!(parsed.lifecycle.expire_days, 7);
        assert!(parsed.filters.enabled);
    }

    #[test]
    fn config_with_sources_and_keywords() {
        let toml_str = r#"
[harvest]
sources = ["rust", "webdev"]
interval_hours = 6

[keywords]
primary = ["recommend", "help me choose"]
secondary = ["crm", "helpdesk"]
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.harvest.sources.len(), 2);
        assert_eq!(config.harvest.interval_hours, 6);
        assert_eq!(config.keywords.primary.len(), 2);
        assert_eq!(config.keywords.secondary[1], "helpdesk");
        // Unset sections fall back to defaults.
        assert_eq!(config.storage.max_posts, 10_000);
    }

    #[test]
    fn backend_parses_from_lowercase() {
        let toml_str = r#"
[storage]
backend = "libsql"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.storage.backend, StorageBackend::Libsql);
    }

    #[test]
    fn validation_rejects_zero_interval() {
        let mut config = AppConfig::default();
        config.harvest.interval_hours = 0;
        let result = validate(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("interval_hours"));
    }

    #[test]
    fn validation_rejects_zero_capacity() {
        let mut config = AppConfig::default();
        config.storage.max_posts = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn tilde_expansion() {
        let expanded = expand_tilde("~/dragnet/test.db").expect("expand");
        assert!(!expanded.to_string_lossy().starts_with('~'));
        assert!(expanded.to_string_lossy().ends_with("dragnet/test.db"));

        let absolute = expand_tilde("/tmp/dragnet.db").expect("expand");
        assert_eq!(absolute, PathBuf::from("/tmp/dragnet.db"));
    }

    #[test]
    fn responder_token_validation() {
        let mut config = AppConfig::default();
        // Use a unique env var name to avoid interfering with other tests
        config.responder.token_env = "DRAGNET_TEST_NONEXISTENT_TOKEN_98765".into();
        let result = validate_responder_token(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("token not found"));
    }
}

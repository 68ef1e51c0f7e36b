//! Configuration for the meetflow service.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (MEETFLOW_HOME, plus per-adapter secrets)
//! 2. Config file (.meetflow/config.yaml)
//! 3. Defaults (~/.meetflow)
//!
//! Config file discovery:
//! - Searches current directory and parents for .meetflow/config.yaml
//! - Account roots in the config file are relative to the config file's
//!   parent directory
//!
//! A missing or unparsable config file, or a file with no enabled accounts,
//! is fatal at startup; nothing degrades silently into a do-nothing service.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::adapters::telegram::TelegramConfig;
use crate::adapters::QualityProfile;
use crate::core::{RetryPolicy, ScheduleSettings};

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<std::result::Result<ResolvedConfig, String>> = OnceLock::new();

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,

    /// Account roots to watch
    pub accounts: Vec<AccountConfig>,

    #[serde(default)]
    pub schedule: ScheduleSettings,

    #[serde(default)]
    pub retry: RetryPolicy,

    #[serde(default)]
    pub transcode: TranscodeConfig,

    #[serde(default)]
    pub transcription: TranscriptionConfig,

    #[serde(default)]
    pub summarizer: Option<SummarizerConfig>,

    #[serde(default)]
    pub notion: Option<NotionConfig>,

    #[serde(default)]
    pub telegram: Option<TelegramConfig>,
}

/// One watched account
#[derive(Debug, Clone, Deserialize)]
pub struct AccountConfig {
    /// Account tag used in artifact keys and snapshots
    pub name: String,

    /// Directory containing meeting folders
    pub root: String,

    /// Disabled accounts are skipped without being forgotten
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct TranscodeConfig {
    #[serde(default)]
    pub quality: QualityProfile,

    #[serde(default = "default_audio_format")]
    pub audio_format: String,

    /// Process-wide bound on concurrent ffmpeg runs
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    #[serde(default = "default_transcode_timeout")]
    pub timeout_seconds: u64,
}

fn default_audio_format() -> String {
    "mp3".to_string()
}
fn default_max_concurrent() -> usize {
    2
}
fn default_transcode_timeout() -> u64 {
    3600
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            quality: QualityProfile::default(),
            audio_format: default_audio_format(),
            max_concurrent: default_max_concurrent(),
            timeout_seconds: default_transcode_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TranscriptionConfig {
    #[serde(default = "default_whisper_model")]
    pub model: String,

    #[serde(default = "default_language")]
    pub language: String,

    #[serde(default = "default_transcription_timeout")]
    pub timeout_seconds: u64,
}

fn default_whisper_model() -> String {
    "base".to_string()
}
fn default_language() -> String {
    "en".to_string()
}
fn default_transcription_timeout() -> u64 {
    7200
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            model: default_whisper_model(),
            language: default_language(),
            timeout_seconds: default_transcription_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SummarizerConfig {
    pub endpoint: String,

    /// Inline key; SUMMARIZER_API_KEY overrides
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_model_profile")]
    pub model_profile: String,
}

fn default_model_profile() -> String {
    "gpt-4o-mini".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotionConfig {
    /// Inline token; NOTION_TOKEN overrides
    #[serde(default)]
    pub token: Option<String>,

    pub database_id: String,
}

/// A resolved account with an absolute root
#[derive(Debug, Clone)]
pub struct ResolvedAccount {
    pub name: String,
    pub root: PathBuf,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Absolute path to meetflow home (service state)
    pub home: PathBuf,

    /// Enabled accounts with absolute roots
    pub accounts: Vec<ResolvedAccount>,

    pub schedule: ScheduleSettings,
    pub retry: RetryPolicy,
    pub transcode: TranscodeConfig,
    pub transcription: TranscriptionConfig,
    pub summarizer: Option<SummarizerConfig>,
    pub notion: Option<NotionConfig>,
    pub telegram: Option<TelegramConfig>,

    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
}

impl ResolvedConfig {
    /// Stage record JSONL path ($MEETFLOW_HOME/records.jsonl)
    pub fn records_path(&self) -> PathBuf {
        self.home.join("records.jsonl")
    }

    /// Snapshot directory ($MEETFLOW_HOME/snapshots)
    pub fn snapshots_dir(&self) -> PathBuf {
        self.home.join("snapshots")
    }

    /// Single-instance lock file ($MEETFLOW_HOME/service.lock)
    pub fn lock_path(&self) -> PathBuf {
        self.home.join("service.lock")
    }
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".meetflow").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config file's parent
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// Prefer an environment variable over an inline config value
fn env_or(var: &str, inline: Option<String>) -> Option<String> {
    std::env::var(var).ok().or(inline)
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".meetflow");

    let config_path = find_config_file()
        .context("No .meetflow/config.yaml found in current directory or parents")?;
    let file = load_config_file(&config_path)?;
    resolve(file, Some(config_path), &default_home)
}

/// Resolve a parsed config file against a base directory
fn resolve(
    file: ConfigFile,
    config_path: Option<PathBuf>,
    default_home: &Path,
) -> Result<ResolvedConfig> {
    // Base directory is the parent of .meetflow/ (the project root)
    let base_dir = config_path
        .as_deref()
        .and_then(|p| p.parent())
        .and_then(|p| p.parent())
        .unwrap_or(Path::new("."))
        .to_path_buf();

    let home = if let Ok(env_home) = std::env::var("MEETFLOW_HOME") {
        PathBuf::from(env_home)
    } else {
        default_home.to_path_buf()
    };

    let accounts: Vec<ResolvedAccount> = file
        .accounts
        .iter()
        .filter(|a| a.enabled)
        .map(|a| ResolvedAccount {
            name: a.name.clone(),
            root: resolve_path(&base_dir, &a.root),
        })
        .collect();

    if accounts.is_empty() {
        anyhow::bail!("No enabled accounts configured");
    }

    let mut names: Vec<&str> = accounts.iter().map(|a| a.name.as_str()).collect();
    names.sort_unstable();
    names.dedup();
    if names.len() != accounts.len() {
        anyhow::bail!("Duplicate account names in configuration");
    }

    let summarizer = file.summarizer.map(|mut s| {
        s.api_key = env_or("SUMMARIZER_API_KEY", s.api_key);
        s
    });
    let notion = file.notion.map(|mut n| {
        n.token = env_or("NOTION_TOKEN", n.token);
        n
    });

    Ok(ResolvedConfig {
        home,
        accounts,
        schedule: file.schedule,
        retry: file.retry,
        transcode: file.transcode,
        transcription: file.transcription,
        summarizer,
        notion,
        telegram: file.telegram,
        config_file: config_path,
    })
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| format!("{e:#}")));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

/// Force reload configuration (useful for testing)
pub fn reload_config() -> Result<ResolvedConfig> {
    load_config()
}

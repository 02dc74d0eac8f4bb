//! Configuration management
//!
//! 設定は以下の優先順位で読み込まれます:
//! 1. 環境変数
//! 2. speech-gateway.toml 設定ファイル
//! 3. デフォルト値
//!
//! 設定ファイル内では `${VAR_NAME}` 形式で環境変数を展開できます。

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::Error;

/// Default config file name, looked up in the working directory
pub const CONFIG_FILE: &str = "speech-gateway.toml";

/// Main configuration for the speech gateway
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Engine selection and fallback
    #[serde(default)]
    pub routing: RoutingConfig,

    /// Result cache
    #[serde(default)]
    pub cache: CacheConfig,

    /// Where synthesized files are written
    #[serde(default)]
    pub output: OutputConfig,

    /// Per-engine settings keyed by engine id
    #[serde(default)]
    pub engines: BTreeMap<String, EngineConfig>,

    /// Preference table overrides: language alias -> ["backend:code:voice|voice"]
    #[serde(default)]
    pub preferences: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Language used for "auto" and empty aliases
    #[serde(default = "default_language")]
    pub default_language: String,

    /// Engine tried first when the caller does not pin one
    pub default_engine: Option<String>,

    /// Only use engines that run locally (--offline)
    #[serde(default)]
    pub offline_only: bool,

    /// Only use cloud engines (--online)
    #[serde(default)]
    pub online_only: bool,

    /// Try offline engines before online ones
    #[serde(default)]
    pub prefer_offline: bool,

    #[serde(default = "default_attempt_timeout_ms")]
    pub attempt_timeout_ms: u64,

    /// Whole-job deadline (none by default)
    pub job_timeout_ms: Option<u64>,

    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    #[serde(default = "default_recency_capacity")]
    pub recency_capacity: usize,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            default_language: default_language(),
            default_engine: None,
            offline_only: false,
            online_only: false,
            prefer_offline: false,
            attempt_timeout_ms: default_attempt_timeout_ms(),
            job_timeout_ms: None,
            max_concurrency: default_max_concurrency(),
            recency_capacity: default_recency_capacity(),
        }
    }
}

impl RoutingConfig {
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms.max(1))
    }

    pub fn job_timeout(&self) -> Option<Duration> {
        self.job_timeout_ms.filter(|ms| *ms > 0).map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: default_cache_ttl_secs(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub directory: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_dir(),
        }
    }
}

/// Settings for one engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Executable path for subprocess engines
    pub binary: Option<String>,

    /// API key for cloud engines
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    /// Service region (Azure)
    pub region: Option<String>,

    /// Endpoint override (optional, for proxies and tests)
    pub base_url: Option<String>,

    /// Overrides the engine's advertised latency
    pub typical_latency_ms: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            binary: None,
            api_key: None,
            region: None,
            base_url: None,
            typical_latency_ms: None,
        }
    }
}

fn default_language() -> String {
    "en".to_string()
}

fn default_attempt_timeout_ms() -> u64 {
    30_000
}

fn default_max_concurrency() -> usize {
    4
}

fn default_recency_capacity() -> usize {
    64
}

fn default_cache_ttl_secs() -> u64 {
    600
}

fn default_output_dir() -> PathBuf {
    std::env::temp_dir().join("speech-gateway")
}

fn default_true() -> bool {
    true
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

impl Config {
    /// 設定ファイルから環境変数を展開する
    ///
    /// `${VAR_NAME}` 形式の文字列を環境変数の値に置換します。
    /// 環境変数が存在しない場合は空文字列になります。
    fn expand_env_vars(value: &str) -> String {
        let mut result = String::new();
        let mut chars = value.chars().peekable();

        while let Some(c) = chars.next() {
            if c == '$' && chars.peek() == Some(&'{') {
                chars.next(); // '{' を消費

                let mut var_name = String::new();
                for c in chars.by_ref() {
                    if c == '}' {
                        break;
                    }
                    var_name.push(c);
                }

                if let Ok(env_value) = std::env::var(&var_name) {
                    result.push_str(&env_value);
                }
            } else {
                result.push(c);
            }
        }

        result
    }

    /// TOML 文字列から設定を読み込む（環境変数の上書きなし）
    pub fn from_toml_str(content: &str) -> crate::Result<Self> {
        let expanded_content = Self::expand_env_vars(content);

        let config: TomlConfig = toml::from_str(&expanded_content)
            .map_err(|e| Error::Config(format!("Failed to parse TOML: {}", e)))?;

        Self::from_toml_config(config)
    }

    /// TOML 設定ファイルから設定を読み込む
    ///
    /// 設定ファイル内の `${VAR_NAME}` は環境変数の値に置換され、
    /// その後、既存の環境変数で上書きされます。
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref();

        let toml_content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;

        let mut cfg = Self::from_toml_str(&toml_content)?;

        // 既存の環境変数で上書き（環境変数が優先）
        cfg.apply_env_overrides();
        cfg.validate()?;

        Ok(cfg)
    }

    /// デフォルトパスから設定を読み込む
    ///
    /// `./speech-gateway.toml` があればそれを、なければ環境変数のみを使います。
    pub fn load() -> crate::Result<Self> {
        if Path::new(CONFIG_FILE).exists() {
            return Self::from_toml_file(CONFIG_FILE);
        }

        Self::from_env()
    }

    /// Defaults plus environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut cfg = Self::default();
        cfg.apply_env_overrides();
        cfg.validate()?;
        Ok(cfg)
    }

    /// TOML 構造から Config を構築
    fn from_toml_config(toml: TomlConfig) -> crate::Result<Self> {
        let routing = toml.routing.unwrap_or_default();
        let defaults = RoutingConfig::default();
        let routing_config = RoutingConfig {
            default_language: routing.default_language.unwrap_or(defaults.default_language),
            default_engine: routing.default_engine.filter(|e| !e.trim().is_empty()),
            offline_only: routing.offline_only.unwrap_or(false),
            online_only: routing.online_only.unwrap_or(false),
            prefer_offline: routing.prefer_offline.unwrap_or(false),
            attempt_timeout_ms: routing.attempt_timeout_ms.unwrap_or(defaults.attempt_timeout_ms),
            job_timeout_ms: routing.job_timeout_ms,
            max_concurrency: routing.max_concurrency.unwrap_or(defaults.max_concurrency),
            recency_capacity: routing.recency_capacity.unwrap_or(defaults.recency_capacity),
        };

        let cache = toml.cache.unwrap_or_default();
        let cache_config = CacheConfig {
            enabled: cache.enabled.unwrap_or(true),
            ttl_secs: cache.ttl_secs.unwrap_or_else(default_cache_ttl_secs),
        };

        let output = toml.output.unwrap_or_default();
        let output_config = OutputConfig {
            directory: output
                .directory
                .filter(|d| !d.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(default_output_dir),
        };

        let engines = toml
            .engines
            .unwrap_or_default()
            .into_iter()
            .map(|(id, engine)| {
                let config = EngineConfig {
                    enabled: engine.enabled.unwrap_or(true),
                    binary: engine.binary.filter(|s| !s.is_empty()),
                    api_key: engine.api_key.filter(|s| !s.is_empty()),
                    region: engine.region.filter(|s| !s.is_empty()),
                    base_url: engine.base_url.filter(|s| !s.is_empty()),
                    typical_latency_ms: engine.typical_latency_ms,
                };
                (id.to_lowercase(), config)
            })
            .collect();

        Ok(Config {
            routing: routing_config,
            cache: cache_config,
            output: output_config,
            engines,
            preferences: toml.preferences.unwrap_or_default(),
        })
    }

    /// 環境変数で設定を上書きする
    pub fn apply_env_overrides(&mut self) {
        // Routing 設定の上書き
        if let Ok(language) = std::env::var("SPEECH_DEFAULT_LANGUAGE") {
            if !language.is_empty() {
                self.routing.default_language = language;
            }
        }
        if let Ok(engine) = std::env::var("SPEECH_DEFAULT_ENGINE") {
            self.routing.default_engine = Some(engine).filter(|e| !e.is_empty());
        }
        if let Ok(value) = std::env::var("SPEECH_OFFLINE_ONLY") {
            self.routing.offline_only = parse_bool(&value);
        }
        if let Ok(value) = std::env::var("SPEECH_ONLINE_ONLY") {
            self.routing.online_only = parse_bool(&value);
        }
        if let Ok(ms) = std::env::var("SPEECH_ATTEMPT_TIMEOUT_MS") {
            if let Ok(ms) = ms.parse() {
                self.routing.attempt_timeout_ms = ms;
            }
        }
        if let Ok(ms) = std::env::var("SPEECH_JOB_TIMEOUT_MS") {
            if let Ok(ms) = ms.parse() {
                self.routing.job_timeout_ms = Some(ms);
            }
        }
        if let Ok(n) = std::env::var("SPEECH_MAX_CONCURRENCY") {
            if let Ok(n) = n.parse() {
                self.routing.max_concurrency = n;
            }
        }

        // Cache / Output 設定の上書き
        if let Ok(ttl) = std::env::var("SPEECH_CACHE_TTL_SECS") {
            if let Ok(ttl) = ttl.parse() {
                self.cache.ttl_secs = ttl;
            }
        }
        if let Ok(dir) = std::env::var("SPEECH_OUTPUT_DIR") {
            if !dir.is_empty() {
                self.output.directory = PathBuf::from(dir);
            }
        }

        // Engine 設定の上書き
        if let Ok(binary) = std::env::var("ESPEAK_BINARY") {
            if !binary.is_empty() {
                self.engine_mut("espeak").binary = Some(binary);
            }
        }
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            if !key.is_empty() {
                self.engine_mut("openai").api_key = Some(key);
            }
        }
        if let Ok(key) = std::env::var("AZURE_SPEECH_KEY") {
            if !key.is_empty() {
                self.engine_mut("azure").api_key = Some(key);
            }
        }
        if let Ok(region) = std::env::var("AZURE_SPEECH_REGION") {
            if !region.is_empty() {
                self.engine_mut("azure").region = Some(region);
            }
        }
    }

    /// Reject contradictory settings
    pub fn validate(&self) -> crate::Result<()> {
        if self.routing.offline_only && self.routing.online_only {
            return Err(Error::Config(
                "offline_only and online_only cannot both be set".to_string(),
            ));
        }
        Ok(())
    }

    /// Settings for an engine (defaults when not configured)
    pub fn engine(&self, id: &str) -> EngineConfig {
        self.engines.get(id).cloned().unwrap_or_default()
    }

    fn engine_mut(&mut self, id: &str) -> &mut EngineConfig {
        self.engines.entry(id.to_string()).or_default()
    }
}

// ============================================================================
// TOML 構造体定義（ファイル解析用）
// ============================================================================

/// TOML ファイル用のトップレベル構造
#[derive(Debug, Deserialize)]
struct TomlConfig {
    /// ルーティング設定
    routing: Option<TomlRoutingConfig>,
    /// キャッシュ設定
    cache: Option<TomlCacheConfig>,
    /// 出力設定
    output: Option<TomlOutputConfig>,
    /// エンジン別設定
    engines: Option<BTreeMap<String, TomlEngineConfig>>,
    /// 言語ごとの優先順位
    preferences: Option<BTreeMap<String, Vec<String>>>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlRoutingConfig {
    default_language: Option<String>,
    default_engine: Option<String>,
    offline_only: Option<bool>,
    online_only: Option<bool>,
    prefer_offline: Option<bool>,
    attempt_timeout_ms: Option<u64>,
    job_timeout_ms: Option<u64>,
    max_concurrency: Option<usize>,
    recency_capacity: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlCacheConfig {
    /// 有効/無効
    enabled: Option<bool>,
    /// 有効期限（秒）
    ttl_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlOutputConfig {
    /// 出力ディレクトリ
    directory: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlEngineConfig {
    enabled: Option<bool>,
    binary: Option<String>,
    api_key: Option<String>,
    region: Option<String>,
    base_url: Option<String>,
    typical_latency_ms: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routing_config_default() {
        let config = RoutingConfig::default();
        assert_eq!(config.default_language, "en");
        assert_eq!(config.attempt_timeout(), Duration::from_secs(30));
        assert_eq!(config.job_timeout(), None);
        assert_eq!(config.max_concurrency, 4);
        assert_eq!(config.recency_capacity, 64);
        assert!(!config.prefer_offline);
    }

    #[test]
    fn test_cache_config_default() {
        let config = CacheConfig::default();
        assert!(config.enabled);
        assert_eq!(config.ttl(), Duration::from_secs(600));
    }

    #[test]
    fn test_unconfigured_engine_is_enabled() {
        let config = Config::default();
        let engine = config.engine("espeak");
        assert!(engine.enabled);
        assert!(engine.binary.is_none());
    }

    #[test]
    fn test_expand_env_vars() {
        // テスト用環境変数を設定
        unsafe {
            std::env::set_var("SPEECH_GATEWAY_TEST_VAR", "test_value");
        }

        let result = Config::expand_env_vars("prefix_${SPEECH_GATEWAY_TEST_VAR}_suffix");
        assert_eq!(result, "prefix_test_value_suffix");

        // 存在しない環境変数
        let result = Config::expand_env_vars("prefix_${NONEXISTENT_VAR}_suffix");
        assert_eq!(result, "prefix__suffix");

        unsafe {
            std::env::remove_var("SPEECH_GATEWAY_TEST_VAR");
        }
    }

    #[test]
    fn test_expand_env_vars_no_braces() {
        assert_eq!(Config::expand_env_vars("no_vars_here"), "no_vars_here");
        assert_eq!(Config::expand_env_vars("${}_content"), "_content");
    }

    #[test]
    fn test_toml_config_parsing() {
        let toml_content = r#"
[routing]
default_language = "zh-HK"
default_engine = "say"
prefer_offline = true
attempt_timeout_ms = 5000
job_timeout_ms = 20000
max_concurrency = 2

[cache]
enabled = false
ttl_secs = 60

[output]
directory = "/tmp/speech"

[engines.espeak]
binary = "espeak-ng"

[engines.Azure]
api_key = "key"
region = "eastasia"

[engines.openai]
enabled = false

[preferences]
cantonese = ["say:zh_HK:Sinji", "espeak:yue"]
"#;

        let config = Config::from_toml_str(toml_content).unwrap();

        assert_eq!(config.routing.default_language, "zh-HK");
        assert_eq!(config.routing.default_engine.as_deref(), Some("say"));
        assert!(config.routing.prefer_offline);
        assert_eq!(config.routing.attempt_timeout(), Duration::from_secs(5));
        assert_eq!(config.routing.job_timeout(), Some(Duration::from_secs(20)));
        assert_eq!(config.routing.max_concurrency, 2);
        assert_eq!(config.routing.recency_capacity, 64);

        assert!(!config.cache.enabled);
        assert_eq!(config.cache.ttl_secs, 60);
        assert_eq!(config.output.directory, PathBuf::from("/tmp/speech"));

        assert_eq!(config.engine("espeak").binary.as_deref(), Some("espeak-ng"));
        assert_eq!(config.engine("azure").region.as_deref(), Some("eastasia"));
        assert!(!config.engine("openai").enabled);
        assert_eq!(config.preferences["cantonese"].len(), 2);
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.routing.default_language, "en");
        assert!(config.cache.enabled);
        assert!(config.engines.is_empty());
    }

    #[test]
    fn test_invalid_toml() {
        assert!(Config::from_toml_str("[routing\n").is_err());
    }

    #[test]
    fn test_validate_rejects_conflicting_modes() {
        let mut config = Config::default();
        config.routing.offline_only = true;
        assert!(config.validate().is_ok());
        config.routing.online_only = true;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "[routing]\nprefer_offline = true\n").unwrap();

        let config = Config::from_toml_file(&path).unwrap();
        assert!(config.routing.prefer_offline);

        assert!(Config::from_toml_file(dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("1"));
        assert!(parse_bool(" TRUE "));
        assert!(parse_bool("on"));
        assert!(!parse_bool("false"));
        assert!(!parse_bool(""));
    }
}

//! 客户端配置加载
//!
//! 配置来源（后者覆盖前者）：
//! ```text
//! 1. 内置默认值
//! 2. YAML 配置文件（默认 ./config.yaml）
//! 3. 环境变量 / .env：MEM0_API_KEY、MEM0_BASE_URL、DEFAULT_USER_ID
//! ```
//! 加载后的 [`AppConfig`] 以值 / `Arc` 的形式显式传给各组件，不存在进程级单例。

use crate::error::{ConfigError, Result};
use crate::parser::ExtractMode;
use dotenv::dotenv;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Mem0Config {
    pub api_key: String,
    pub base_url: String,
    /// 单次 HTTP 调用超时（秒）
    pub timeout_secs: u64,
}

impl Default for Mem0Config {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.mem0.ai".to_string(),
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Defaults {
    pub user_id: String,
    /// `auto` / `raw`，其他值在加载时报错
    pub extract_mode: ExtractMode,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            user_id: "default_user".to_string(),
            extract_mode: ExtractMode::Auto,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct FileProcessing {
    /// 目录上传时识别的扩展名（含前导点）
    pub supported_formats: Vec<String>,
    pub max_file_size_mb: u64,
}

impl Default for FileProcessing {
    fn default() -> Self {
        Self {
            supported_formats: vec![".md".to_string(), ".txt".to_string(), ".json".to_string()],
            max_file_size_mb: 10,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct SearchConfig {
    pub default_limit: usize,
    pub max_limit: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: 10,
            max_limit: 100,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct DebugConfig {
    /// 开启后每次 API 尝试输出一条 debug 记录
    pub enable_api_logging: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            enable_api_logging: true,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct BatchConfig {
    /// 是否并发上传多个文件
    pub concurrent: bool,
    /// 并发模式下的最大 worker 数
    pub max_workers: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrent: false,
            max_workers: 3,
        }
    }
}

/// 上传重试策略：第 k 次尝试前等待 `base_delay_ms * 2^(k-1)`，再叠加 `[0, jitter_ms]`
/// 的随机抖动，总等待不超过 `max_delay_ms`
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_ms: u64,
    /// 非瞬时错误（鉴权、请求格式）是否立即失败而不再重试
    pub fail_fast_on_fatal: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 10_000,
            jitter_ms: 250,
            fail_fast_on_fatal: false,
        }
    }
}

impl RetryConfig {
    /// 第 `attempt` 次尝试（从 1 开始）之前的基础等待时长，不含抖动
    pub fn backoff(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let exp = (attempt - 1).min(16);
        let delay = self.base_delay_ms.saturating_mul(1u64 << exp);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub mem0: Mem0Config,
    pub defaults: Defaults,
    pub file_processing: FileProcessing,
    pub search: SearchConfig,
    pub debug: DebugConfig,
    pub batch: BatchConfig,
    pub retry: RetryConfig,
    /// 预设时间范围：名称 → 天数
    pub time_presets: HashMap<String, u32>,
}

impl AppConfig {
    /// 加载配置。`path` 为 `None` 时读取默认路径，文件不存在则使用默认值；
    /// 显式指定的文件不存在时报错。
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenv().ok();

        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_PATH))?
            }
            None => AppConfig::default(),
        };
        config.apply_env();
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .map_err(|_| ConfigError::FileNotFound(path.display().to_string()))?;
        let config: AppConfig = serde_yaml::from_reader(file)?;
        Ok(config)
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(raw)?)
    }

    fn apply_env(&mut self) {
        if let Some(key) = non_empty_env("MEM0_API_KEY") {
            self.mem0.api_key = key;
        }
        if let Some(url) = non_empty_env("MEM0_BASE_URL") {
            self.mem0.base_url = url;
        }
        if let Some(user) = non_empty_env("DEFAULT_USER_ID") {
            self.defaults.user_id = user;
        }
    }

    /// 调用 API 之前的校验
    pub fn validate(&self) -> Result<()> {
        if self.mem0.api_key.trim().is_empty() {
            return Err(ConfigError::MissingField("mem0.api_key (MEM0_API_KEY)".to_string()).into());
        }
        self.validate_limits()
    }

    /// 与 API 密钥无关的数值校验
    pub fn validate_limits(&self) -> Result<()> {
        if self.batch.max_workers == 0 {
            return Err(invalid("batch.max_workers", "must be at least 1"));
        }
        if self.retry.max_attempts == 0 {
            return Err(invalid("retry.max_attempts", "must be at least 1"));
        }
        if self.search.max_limit == 0 {
            return Err(invalid("search.max_limit", "must be at least 1"));
        }
        Ok(())
    }

    pub fn time_preset(&self, name: &str) -> Option<u32> {
        self.time_presets.get(name).copied()
    }

    /// 将请求的条数限制在 `[1, search.max_limit]`，未指定时取默认值
    pub fn clamp_limit(&self, limit: Option<usize>) -> usize {
        limit
            .unwrap_or(self.search.default_limit)
            .clamp(1, self.search.max_limit.max(1))
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn invalid(field: &str, message: &str) -> crate::error::ClientError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        message: message.to_string(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_extract_mode_rejected() {
        let raw = "defaults:\n  extract_mode: rwa\n";
        let err = AppConfig::from_yaml_str(raw).unwrap_err();
        assert!(matches!(err, crate::error::ClientError::Config(ConfigError::ParseFailed(_))));

        let config = AppConfig::from_yaml_str("defaults:\n  extract_mode: raw\n").unwrap();
        assert_eq!(config.defaults.extract_mode, ExtractMode::Raw);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let raw = r#"
defaults:
  user_id: alice
batch:
  concurrent: true
time_presets:
  last_week: 7
"#;
        let config = AppConfig::from_yaml_str(raw).unwrap();
        assert_eq!(config.defaults.user_id, "alice");
        assert_eq!(config.defaults.extract_mode, ExtractMode::Auto);
        assert!(config.batch.concurrent);
        assert_eq!(config.batch.max_workers, 3);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.time_preset("last_week"), Some(7));
        assert_eq!(config.mem0.base_url, "https://api.mem0.ai");
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let retry = RetryConfig::default();
        assert_eq!(retry.backoff(1), Duration::ZERO);
        assert_eq!(retry.backoff(2), Duration::from_secs(2));
        assert_eq!(retry.backoff(3), Duration::from_secs(4));
        assert_eq!(retry.backoff(5), Duration::from_secs(10));
    }

    #[test]
    fn test_validate_rejects_missing_key_and_zero_workers() {
        let mut config = AppConfig::default();
        assert!(config.validate().is_err());

        config.mem0.api_key = "m0-test".to_string();
        assert!(config.validate().is_ok());

        config.batch.max_workers = 0;
        assert!(matches!(
            config.validate(),
            Err(crate::error::ClientError::Config(ConfigError::InvalidValue { .. }))
        ));
    }

    #[test]
    fn test_missing_explicit_file() {
        let result = AppConfig::load(Some(Path::new("/nonexistent/mem0.yaml")));
        assert!(matches!(
            result,
            Err(crate::error::ClientError::Config(ConfigError::FileNotFound(_)))
        ));
    }

    #[test]
    fn test_clamp_limit() {
        let config = AppConfig::default();
        assert_eq!(config.clamp_limit(None), 10);
        assert_eq!(config.clamp_limit(Some(500)), 100);
        assert_eq!(config.clamp_limit(Some(0)), 1);
    }
}

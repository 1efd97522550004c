use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// 程序配置文件
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 数据库连接串（SQLite）
    pub database_url: String,
    /// HTTP 服务监听地址
    pub bind_addr: String,
    /// 上传文件最大字节数
    pub max_upload_bytes: usize,
    /// 最大页数
    pub max_page_count: u32,
    /// 文本提取后是否再次检查页数上限（在 AI 提取之前中止）
    pub enforce_page_limit_after_extraction: bool,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    // --- LLM 配置 ---
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
    /// 送入 LLM 的最大字符数，超出部分截断
    pub llm_max_input_chars: usize,
    // --- 状态轮询配置（客户端） ---
    pub poll_interval_ms: u64,
    pub poll_max_attempts: u32,
    pub poll_max_consecutive_errors: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite:paper_import.db".to_string(),
            bind_addr: "127.0.0.1:3000".to_string(),
            max_upload_bytes: 10 * 1024 * 1024,
            max_page_count: 50,
            enforce_page_limit_after_extraction: true,
            verbose_logging: false,
            llm_api_key: String::new(),
            llm_api_base_url: "https://api.openai.com/v1".to_string(),
            llm_model_name: "gpt-4o-mini".to_string(),
            llm_max_input_chars: 60_000,
            poll_interval_ms: 1000,
            poll_max_attempts: 120,
            poll_max_consecutive_errors: 3,
        }
    }
}

impl Config {
    /// 从环境变量读取配置，未设置的项使用默认值
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// 加载配置：默认值 → TOML 文件（可选）→ 环境变量
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let base = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("无法读取配置文件: {}", path.display()))?;
                Self::from_toml_str(&content)
                    .with_context(|| format!("无法解析配置文件: {}", path.display()))?
            }
            None => Self::default(),
        };
        Ok(base.with_env_overrides())
    }

    /// 解析 TOML 配置，缺失字段使用默认值
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    fn with_env_overrides(self) -> Self {
        let d = self;
        Self {
            database_url: std::env::var("DATABASE_URL").unwrap_or(d.database_url),
            bind_addr: std::env::var("BIND_ADDR").unwrap_or(d.bind_addr),
            max_upload_bytes: std::env::var("MAX_UPLOAD_BYTES").ok().and_then(|v| v.parse().ok()).unwrap_or(d.max_upload_bytes),
            max_page_count: std::env::var("MAX_PAGE_COUNT").ok().and_then(|v| v.parse().ok()).unwrap_or(d.max_page_count),
            enforce_page_limit_after_extraction: std::env::var("ENFORCE_PAGE_LIMIT_AFTER_EXTRACTION").ok().and_then(|v| v.parse().ok()).unwrap_or(d.enforce_page_limit_after_extraction),
            verbose_logging: std::env::var("VERBOSE_LOGGING").ok().and_then(|v| v.parse().ok()).unwrap_or(d.verbose_logging),
            llm_api_key: std::env::var("LLM_API_KEY").unwrap_or(d.llm_api_key),
            llm_api_base_url: std::env::var("LLM_API_BASE_URL").unwrap_or(d.llm_api_base_url),
            llm_model_name: std::env::var("LLM_MODEL_NAME").unwrap_or(d.llm_model_name),
            llm_max_input_chars: std::env::var("LLM_MAX_INPUT_CHARS").ok().and_then(|v| v.parse().ok()).unwrap_or(d.llm_max_input_chars),
            poll_interval_ms: std::env::var("POLL_INTERVAL_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(d.poll_interval_ms),
            poll_max_attempts: std::env::var("POLL_MAX_ATTEMPTS").ok().and_then(|v| v.parse().ok()).unwrap_or(d.poll_max_attempts),
            poll_max_consecutive_errors: std::env::var("POLL_MAX_CONSECUTIVE_ERRORS").ok().and_then(|v| v.parse().ok()).unwrap_or(d.poll_max_consecutive_errors),
        }
    }
}

use figment::Figment;
use figment::providers::Env;
use serde::Deserialize;
use serde::de::IgnoredAny;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_API_BASE: &str = "https://api.replicate.com/v1";
const DEFAULT_MODEL: &str = "google/nano-banana-pro";
const DEFAULT_OUTPUT_FORMAT: &str = "jpg";
const DEFAULT_TIMEOUT_MS: u64 = 60_000;
const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;
const DEFAULT_POLL_TIMEOUT_MS: u64 = 300_000;
const DEFAULT_DAILY_LIMIT: u32 = 4;
const DEFAULT_MAX_BODY_MB: usize = 50;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,

    pub api_token: String,
    pub api_base: String,
    pub model: String,
    pub output_format: String,
    pub timeout_ms: u64,
    pub proxy: String,

    pub poll_interval_ms: u64,
    pub poll_timeout_ms: u64,

    pub quota_enabled: bool,
    pub quota_daily_limit: u32,
    pub trust_forwarded_for: bool,

    pub max_body_mb: usize,

    pub debug: String,
    pub log_format: String,

    /// 加载时被忽略的非法配置；日志初始化之后由 main 输出。
    pub warnings: Vec<String>,
}

/// 每个字段都用宽松的 `EnvValue` 接收：单个变量写错只回退该字段，不影响其他配置。
#[derive(Debug, Default, Deserialize)]
struct RawEnv {
    #[serde(alias = "HOST")]
    host: Option<EnvValue>,
    #[serde(alias = "PORT")]
    port: Option<EnvValue>,

    #[serde(alias = "REPLICATE_API_TOKEN")]
    replicate_api_token: Option<EnvValue>,
    #[serde(alias = "REPLICATE_API_BASE")]
    replicate_api_base: Option<EnvValue>,
    #[serde(alias = "REPLICATE_MODEL")]
    replicate_model: Option<EnvValue>,
    #[serde(alias = "OUTPUT_FORMAT")]
    output_format: Option<EnvValue>,
    #[serde(alias = "TIMEOUT")]
    timeout: Option<EnvValue>,
    #[serde(alias = "PROXY")]
    proxy: Option<EnvValue>,

    #[serde(alias = "POLL_INTERVAL_MS")]
    poll_interval_ms: Option<EnvValue>,
    #[serde(alias = "POLL_TIMEOUT_MS")]
    poll_timeout_ms: Option<EnvValue>,

    #[serde(alias = "QUOTA_ENABLED")]
    quota_enabled: Option<EnvValue>,
    #[serde(alias = "QUOTA_DAILY_LIMIT")]
    quota_daily_limit: Option<EnvValue>,
    #[serde(alias = "TRUST_FORWARDED_FOR")]
    trust_forwarded_for: Option<EnvValue>,

    #[serde(alias = "MAX_BODY_MB")]
    max_body_mb: Option<EnvValue>,

    #[serde(alias = "DEBUG")]
    debug: Option<EnvValue>,
    #[serde(alias = "LOG_FORMAT")]
    log_format: Option<EnvValue>,
}

/// figment 会把环境变量值预先解析成 bool/整数/浮点/字符串（甚至数组、字典），这里统一兜住。
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum EnvValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Other(IgnoredAny),
}

impl EnvValue {
    fn text(&self) -> Option<String> {
        match self {
            Self::Bool(b) => Some(b.to_string()),
            Self::Int(i) => Some(i.to_string()),
            Self::Float(f) => Some(f.to_string()),
            Self::Text(s) => Some(s.clone()),
            Self::Other(_) => None,
        }
    }

    fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Int(i) => Some(*i != 0),
            Self::Text(s) => parse_bool(s),
            _ => None,
        }
    }

    fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Int(i) => u64::try_from(*i).ok(),
            Self::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl Config {
    pub fn load() -> Self {
        load_dotenv();

        let mut cfg = Self::from_env();

        // 命令行覆盖：-debug <level>
        let mut args = std::env::args().skip(1);
        while let Some(arg) = args.next() {
            if arg == "-debug"
                && let Some(v) = args.next()
            {
                cfg.debug = v;
            }
        }

        cfg
    }

    fn from_env() -> Self {
        match Figment::from(Env::raw()).extract::<RawEnv>() {
            Ok(raw) => Self::from_raw(raw),
            Err(e) => {
                let mut cfg = Self::from_raw(RawEnv::default());
                cfg.warnings.push(format!("读取环境变量失败，全部使用默认配置: {e}"));
                cfg
            }
        }
    }

    fn from_raw(raw: RawEnv) -> Self {
        let mut warnings = Vec::new();
        let w = &mut warnings;

        let host = text_or(raw.host, DEFAULT_HOST);
        let port = number("PORT", raw.port, DEFAULT_PORT, w);
        let api_token = raw
            .replicate_api_token
            .as_ref()
            .and_then(EnvValue::text)
            .map(|s| s.trim().to_string())
            .unwrap_or_default();
        let api_base = text_or(raw.replicate_api_base, DEFAULT_API_BASE)
            .trim_end_matches('/')
            .to_string();
        let model = text_or(raw.replicate_model, DEFAULT_MODEL);
        let output_format = text_or(raw.output_format, DEFAULT_OUTPUT_FORMAT);
        let timeout_ms = number("TIMEOUT", raw.timeout, DEFAULT_TIMEOUT_MS, w);
        let proxy = text_or(raw.proxy, "");
        let poll_interval_ms = number(
            "POLL_INTERVAL_MS",
            raw.poll_interval_ms,
            DEFAULT_POLL_INTERVAL_MS,
            w,
        );
        let poll_timeout_ms = number(
            "POLL_TIMEOUT_MS",
            raw.poll_timeout_ms,
            DEFAULT_POLL_TIMEOUT_MS,
            w,
        );
        let quota_enabled = flag("QUOTA_ENABLED", raw.quota_enabled, true, w);
        let quota_daily_limit =
            number("QUOTA_DAILY_LIMIT", raw.quota_daily_limit, DEFAULT_DAILY_LIMIT, w).max(1);
        let trust_forwarded_for = flag("TRUST_FORWARDED_FOR", raw.trust_forwarded_for, true, w);
        let max_body_mb = number("MAX_BODY_MB", raw.max_body_mb, DEFAULT_MAX_BODY_MB, w).max(1);
        let debug = text_or(raw.debug, "off");
        let log_format = text_or(raw.log_format, "text").to_lowercase();

        Self {
            host,
            port,
            api_token,
            api_base,
            model,
            output_format,
            timeout_ms,
            proxy,
            poll_interval_ms,
            poll_timeout_ms,
            quota_enabled,
            quota_daily_limit,
            trust_forwarded_for,
            max_body_mb,
            debug,
            log_format,
            warnings,
        }
    }

    pub fn log_level(&self) -> crate::logging::LogLevel {
        crate::logging::LogLevel::parse(&self.debug)
    }

    pub fn json_logs(&self) -> bool {
        self.log_format == "json"
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn max_body_bytes(&self) -> usize {
        self.max_body_mb.saturating_mul(1024 * 1024)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_raw(RawEnv::default())
    }
}

fn text_or(value: Option<EnvValue>, default: &str) -> String {
    match value.as_ref().and_then(EnvValue::text) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => default.to_string(),
    }
}

fn number<T>(key: &str, value: Option<EnvValue>, default: T, warnings: &mut Vec<String>) -> T
where
    T: TryFrom<u64> + std::fmt::Display,
{
    let Some(value) = value else {
        return default;
    };
    if let EnvValue::Text(s) = &value
        && s.trim().is_empty()
    {
        return default;
    }
    match value.as_u64().and_then(|n| T::try_from(n).ok()) {
        Some(n) => n,
        None => {
            warnings.push(format!("{key} 的值 {value:?} 无效，使用默认值 {default}"));
            default
        }
    }
}

fn flag(key: &str, value: Option<EnvValue>, default: bool, warnings: &mut Vec<String>) -> bool {
    let Some(value) = value else {
        return default;
    };
    value.as_bool().unwrap_or_else(|| {
        warnings.push(format!("{key} 的值 {value:?} 无效，使用默认值 {default}"));
        default
    })
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn load_dotenv() {
    let Some(path) = find_dotenv_path() else {
        return;
    };
    let Ok(content) = std::fs::read_to_string(&path) else {
        return;
    };

    for line in content.lines() {
        let Some((key, value)) = parse_dotenv_line(line) else {
            continue;
        };
        // 已存在的进程环境变量优先，.env 只做补充。
        if std::env::var_os(&key).is_some() {
            continue;
        }
        // Rust 2024：set_var 为 unsafe；此处仅在启动阶段、尚未启动任何线程时调用。
        unsafe {
            std::env::set_var(key, value);
        }
    }
}

fn find_dotenv_path() -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok()?;
    let mut dir: &Path = cwd.as_path();

    loop {
        let candidate = dir.join(".env");
        if candidate.is_file() {
            return Some(candidate);
        }
        // 发现 Cargo.toml 或 .git 即停止向上寻找，避免读到仓库外的 .env。
        if dir.join("Cargo.toml").is_file() || dir.join(".git").is_dir() {
            return None;
        }
        dir = dir.parent()?;
    }
}

fn parse_dotenv_line(line: &str) -> Option<(String, String)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let line = line.strip_prefix("export ").map(str::trim_start).unwrap_or(line);

    let (key, raw) = line.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }

    let raw = raw.trim();
    for quote in ['"', '\''] {
        if raw.len() >= 2 && raw.starts_with(quote) && raw.ends_with(quote) {
            return Some((key.to_string(), raw[1..raw.len() - 1].to_string()));
        }
    }

    // 未加引号的值：" #" 之后视为行内注释。
    let value = match raw.find(" #").or_else(|| raw.find("\t#")) {
        Some(idx) => raw[..idx].trim_end(),
        None if raw.starts_with('#') => "",
        None => raw,
    };
    Some((key.to_string(), value.to_string()))
}

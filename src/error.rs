use std::fmt;

/// mem0 客户端的统一错误类型
#[derive(Debug)]
pub enum ClientError {
    /// 文件内容 / 格式错误（单个文件致命，不重试）
    Format(FormatError),
    /// 记忆 API 调用错误
    Api(ApiError),
    /// 配置错误
    Config(ConfigError),
    /// IO 错误
    Io(std::io::Error),
    /// 其他错误
    Other(String),
}

/// 文件解析错误
#[derive(Debug)]
pub enum FormatError {
    /// JSON 无法解析
    InvalidJson(String),
    /// JSON 缺少 `messages` 数组
    MissingMessages,
    /// 清洗后没有任何有效消息
    NoValidMessages,
    /// 文件超过大小限制
    FileTooLarge { size_mb: f64, limit_mb: u64 },
    /// 元数据不是 string → scalar 的映射
    InvalidMetadata(String),
}

/// 记忆 API 调用错误
#[derive(Debug)]
pub enum ApiError {
    /// 网络 / 服务端瞬时错误（超时、连接失败、5xx、限流）
    Transient(String),
    /// 鉴权失败、请求格式错误等
    Fatal { status: Option<u16>, message: String },
    /// 响应体无法解析
    InvalidResponse(String),
    /// 所有尝试均失败，携带最后一次错误
    ExhaustedRetries { attempts: u32, last: Box<ApiError> },
}

/// 配置错误
#[derive(Debug)]
pub enum ConfigError {
    /// 配置文件未找到
    FileNotFound(String),
    /// 配置解析失败
    ParseFailed(String),
    /// 缺少必需的配置项
    MissingField(String),
    /// 配置值无效
    InvalidValue { field: String, message: String },
}

impl ApiError {
    /// 按 HTTP 状态码与响应正文归类：429 / 5xx 或命中可重试关键词视为瞬时错误
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let message = format!(
            "{} {}: {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or("Unknown"),
            body
        );
        if status.as_u16() == 429 || status.is_server_error() || is_retryable_message(&message) {
            ApiError::Transient(message)
        } else {
            ApiError::Fatal {
                status: Some(status.as_u16()),
                message,
            }
        }
    }

    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Transient(_) => true,
            ApiError::ExhaustedRetries { last, .. } => last.is_transient(),
            _ => false,
        }
    }
}

/// 触发重试诊断的错误关键词（大小写不敏感的子串匹配）
pub const RETRYABLE_PATTERNS: [&str; 7] = [
    "502 bad gateway",
    "503 service unavailable",
    "504 gateway timeout",
    "timeout",
    "connection",
    "rate limit",
    "server error",
];

/// 错误消息是否命中可重试关键词
pub fn is_retryable_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    RETRYABLE_PATTERNS.iter().any(|p| lower.contains(p))
}

// 实现 Display trait
impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Format(e) => write!(f, "Format Error: {}", e),
            ClientError::Api(e) => write!(f, "API Error: {}", e),
            ClientError::Config(e) => write!(f, "Config Error: {}", e),
            ClientError::Io(e) => write!(f, "IO Error: {}", e),
            ClientError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatError::InvalidJson(msg) => write!(f, "Invalid JSON format: {}", msg),
            FormatError::MissingMessages => write!(f, "JSON must contain a 'messages' array"),
            FormatError::NoValidMessages => write!(f, "No valid messages found"),
            FormatError::FileTooLarge { size_mb, limit_mb } => {
                write!(f, "File too large: {:.1}MB > {}MB", size_mb, limit_mb)
            }
            FormatError::InvalidMetadata(msg) => write!(f, "Invalid metadata: {}", msg),
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Transient(msg) => write!(f, "Transient error: {}", msg),
            ApiError::Fatal { status, message } => match status {
                Some(code) => write!(f, "Request rejected (status {}): {}", code, message),
                None => write!(f, "Request rejected: {}", message),
            },
            ApiError::InvalidResponse(msg) => write!(f, "Invalid response: {}", msg),
            ApiError::ExhaustedRetries { attempts, last } => {
                write!(f, "Failed after {} attempts: {}", attempts, last)
            }
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FileNotFound(path) => write!(f, "Config file not found: {}", path),
            ConfigError::ParseFailed(msg) => write!(f, "Failed to parse config: {}", msg),
            ConfigError::MissingField(field) => write!(f, "Missing config field: {}", field),
            ConfigError::InvalidValue { field, message } => {
                write!(f, "Invalid config value for '{}': {}", field, message)
            }
        }
    }
}

// 实现 std::error::Error trait
impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ClientError::Io(e) => Some(e),
            ClientError::Api(e) => Some(e),
            ClientError::Format(e) => Some(e),
            _ => None,
        }
    }
}

impl std::error::Error for FormatError {}
impl std::error::Error for ApiError {}
impl std::error::Error for ConfigError {}

// From 转换实现
impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        ClientError::Io(err)
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        ClientError::Api(ApiError::from(err))
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Transient(format!("Request timeout: {}", err))
        } else if err.is_connect() {
            ApiError::Transient(format!("Connection failed: {}", err))
        } else if err.is_decode() {
            ApiError::InvalidResponse(err.to_string())
        } else if is_retryable_message(&err.to_string()) {
            ApiError::Transient(err.to_string())
        } else {
            ApiError::Fatal {
                status: err.status().map(|s| s.as_u16()),
                message: err.to_string(),
            }
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Format(FormatError::InvalidJson(err.to_string()))
    }
}

impl From<serde_yaml::Error> for ClientError {
    fn from(err: serde_yaml::Error) -> Self {
        ClientError::Config(ConfigError::ParseFailed(err.to_string()))
    }
}

impl From<FormatError> for ClientError {
    fn from(err: FormatError) -> Self {
        ClientError::Format(err)
    }
}

impl From<ApiError> for ClientError {
    fn from(err: ApiError) -> Self {
        ClientError::Api(err)
    }
}

impl From<ConfigError> for ClientError {
    fn from(err: ConfigError) -> Self {
        ClientError::Config(err)
    }
}

// 便捷的 Result 类型别名
pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_retryable_patterns_case_insensitive() {
        assert!(is_retryable_message("HTTP 503 Service Unavailable"));
        assert!(is_retryable_message("Read TIMEOUT while waiting"));
        assert!(is_retryable_message("Rate limit exceeded"));
        assert!(is_retryable_message("connection reset by peer"));
        assert!(!is_retryable_message("401 Unauthorized: invalid token"));
        assert!(!is_retryable_message("400 Bad Request: messages required"));
    }

    #[test]
    fn test_status_classification() {
        assert!(ApiError::from_status(StatusCode::SERVICE_UNAVAILABLE, "").is_transient());
        assert!(ApiError::from_status(StatusCode::TOO_MANY_REQUESTS, "slow down").is_transient());
        assert!(ApiError::from_status(StatusCode::INTERNAL_SERVER_ERROR, "").is_transient());

        let fatal = ApiError::from_status(StatusCode::UNAUTHORIZED, "invalid api key");
        assert!(!fatal.is_transient());
        assert!(fatal.to_string().contains("401 Unauthorized"));
    }

    #[test]
    fn test_exhausted_retries_keeps_last_message() {
        let err = ApiError::ExhaustedRetries {
            attempts: 3,
            last: Box::new(ApiError::Transient("503 Service Unavailable: busy".to_string())),
        };
        let msg = err.to_string();
        assert!(msg.contains("3 attempts"));
        assert!(msg.contains("503 Service Unavailable"));
        assert!(err.is_transient());
    }
}

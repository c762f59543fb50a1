//! 带指数退避的单次上传
//!
//! 第 k 次尝试（k ≥ 2）之前等待 `base_delay * 2^(k-1)`，默认即 2s、4s，
//! 再叠加 `[0, jitter]` 的随机抖动，结果不超过 `max_delay`。全部失败时返回
//! [`ApiError::ExhaustedRetries`]，其中保留最后一次的错误。
//!
//! 错误分类（[`is_retryable_message`]）默认只用于诊断日志：所有错误都按同样方式重试。
//! 打开 `retry.fail_fast_on_fatal` 后，非瞬时错误会立即返回。

use crate::api::MemoryApi;
use crate::api::types::UploadRequest;
use crate::config::RetryConfig;
use crate::error::{ApiError, ClientError, Result, is_retryable_message};
use rand::Rng;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// 调试日志中错误文本的最大长度
const ERROR_PREVIEW_CHARS: usize = 200;

/// 一次上传（含重试）的结果
#[derive(Debug)]
pub struct UploadAttempts {
    /// 实际尝试次数，至少为 1
    pub attempts: u32,
    /// 退避等待的总时长
    pub waited: Duration,
    pub result: Result<Value>,
}

pub struct RetryingUploader {
    api: Arc<dyn MemoryApi>,
    policy: RetryConfig,
    debug_logging: bool,
}

impl RetryingUploader {
    pub fn new(api: Arc<dyn MemoryApi>, policy: RetryConfig, debug_logging: bool) -> Self {
        Self {
            api,
            policy,
            debug_logging,
        }
    }

    pub fn policy(&self) -> &RetryConfig {
        &self.policy
    }

    pub async fn upload(&self, request: &UploadRequest) -> UploadAttempts {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut waited = Duration::ZERO;
        let mut last_err: Option<ClientError> = None;
        let mut attempts = 0;

        if self.debug_logging {
            log_request_preview(request);
        }

        for attempt in 1..=max_attempts {
            if attempt > 1 {
                let delay = self.delay_before(attempt);
                tokio::time::sleep(delay).await;
                waited += delay;
            }
            attempts = attempt;

            match self.api.add(request).await {
                Ok(response) => {
                    if self.debug_logging {
                        debug!(
                            attempt,
                            waited_ms = waited.as_millis() as u64,
                            "✅ 上传成功"
                        );
                    }
                    return UploadAttempts {
                        attempts,
                        waited,
                        result: Ok(response),
                    };
                }
                Err(e) => {
                    let message = e.to_string();
                    let retryable = is_retryable_message(&message)
                        || matches!(&e, ClientError::Api(api) if api.is_transient());
                    if self.debug_logging {
                        debug!(
                            attempt,
                            max_attempts,
                            waited_ms = waited.as_millis() as u64,
                            retryable,
                            error = %truncate_chars(&message, ERROR_PREVIEW_CHARS),
                            "⚠️ 上传尝试失败"
                        );
                    }
                    let stop = !retryable && self.policy.fail_fast_on_fatal;
                    last_err = Some(e);
                    if stop {
                        warn!(attempt, "非瞬时错误，停止重试");
                        break;
                    }
                }
            }
        }

        let result = match last_err {
            Some(e) if attempts < max_attempts => Err(e),
            Some(e) => Err(ApiError::ExhaustedRetries {
                attempts,
                last: Box::new(into_api_error(e)),
            }
            .into()),
            None => Err(ClientError::Other("上传未执行".to_string())),
        };

        UploadAttempts {
            attempts,
            waited,
            result,
        }
    }

    /// 第 `attempt` 次尝试之前的等待时长（含抖动），不超过 `max_delay_ms`
    fn delay_before(&self, attempt: u32) -> Duration {
        let base = self.policy.backoff(attempt);
        if self.policy.jitter_ms == 0 {
            return base;
        }
        let jitter = rand::thread_rng().gen_range(0..=self.policy.jitter_ms);
        (base + Duration::from_millis(jitter)).min(Duration::from_millis(self.policy.max_delay_ms))
    }
}

fn into_api_error(err: ClientError) -> ApiError {
    match err {
        ClientError::Api(api) => api,
        other => ApiError::Fatal {
            status: None,
            message: other.to_string(),
        },
    }
}

fn log_request_preview(request: &UploadRequest) {
    for (i, msg) in request.messages.iter().take(3).enumerate() {
        debug!(
            index = i,
            role = msg.role.as_str(),
            content = %truncate_chars(&msg.content, 20),
            "📨 messages"
        );
    }
    if request.messages.len() > 3 {
        debug!(more = request.messages.len() - 3, "📨 ... 其余消息");
    }
    debug!(
        user_id = %request.user_id,
        custom_instructions = ?request.custom_instructions.as_deref().map(|s| truncate_chars(s, 50)),
        includes = ?request.includes,
        excludes = ?request.excludes,
        infer = request.infer,
        timestamp = ?request.timestamp,
        metadata_keys = request.metadata.len(),
        "🔍 Mem0 add 参数"
    );
}

/// 按字符截断，超长时追加 `...`
pub fn truncate_chars(s: &str, max: usize) -> String {
    let mut chars = s.chars();
    let out: String = chars.by_ref().take(max).collect();
    if chars.next().is_some() {
        format!("{out}...")
    } else {
        out
    }
}

//! 上传子系统
//!
//! ```text
//! 文件路径 → parser → 消息 + 元数据 → params::build_upload_request → UploadRequest
//!         → RetryingUploader（指数退避）→ FileOutcome → BatchReport
//! ```

pub mod batch;
pub mod params;
pub mod retry;

use crate::api::types::Metadata;
use crate::parser::ExtractMode;

pub use batch::{BatchReport, FileOutcome, MemoryUploader, OutcomeStatus, collect_files};
pub use params::build_upload_request;
pub use retry::{RetryingUploader, UploadAttempts};

/// 单次上传的可选参数，未设置的字段不会出现在请求体中
#[derive(Debug, Clone, Default)]
pub struct UploadOptions {
    /// 为空时使用配置中的默认用户
    pub user_id: Option<String>,
    /// 为空时使用配置中的默认模式
    pub extract_mode: Option<ExtractMode>,
    pub custom_instructions: Option<String>,
    pub includes: Option<String>,
    pub excludes: Option<String>,
    /// 为空时按 `true`（交给服务端提取）处理
    pub infer: Option<bool>,
    /// 调用方附加的元数据，最后合并
    pub metadata: Metadata,
}

impl UploadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn extract_mode(mut self, mode: ExtractMode) -> Self {
        self.extract_mode = Some(mode);
        self
    }

    pub fn custom_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.custom_instructions = Some(instructions.into());
        self
    }

    pub fn includes(mut self, includes: impl Into<String>) -> Self {
        self.includes = Some(includes.into());
        self
    }

    pub fn excludes(mut self, excludes: impl Into<String>) -> Self {
        self.excludes = Some(excludes.into());
        self
    }

    pub fn infer(mut self, infer: bool) -> Self {
        self.infer = Some(infer);
        self
    }

    pub fn metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// 是否设置了任何自定义处理参数（用于输出提示）
    pub fn has_custom_settings(&self) -> bool {
        params::non_blank(&self.custom_instructions).is_some()
            || params::non_blank(&self.includes).is_some()
            || params::non_blank(&self.excludes).is_some()
            || self.infer.is_some()
    }
}

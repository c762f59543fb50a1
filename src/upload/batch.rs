//! 批量上传编排
//!
//! - 顺序模式：按输入顺序逐个处理，单个文件失败不影响后续文件
//! - 并发模式：每个文件一个 tokio 任务，由 `Semaphore` 限制同时运行的 worker 数；
//!   任务把结果写回按提交序号预分配的槽位，报告顺序与输入一致
//!
//! 批量调用从不提前中止，总是为每个文件产出一条 [`FileOutcome`]。

use super::params::build_upload_request;
use super::retry::{RetryingUploader, UploadAttempts, truncate_chars};
use super::UploadOptions;
use crate::api::MemoryApi;
use crate::api::types::UploadRequest;
use crate::config::AppConfig;
use crate::error::{ClientError, ConfigError, Result};
use crate::parser::{self, ExtractMode};
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;
use walkdir::WalkDir;

/// 展示用错误文本的最大长度
const ERROR_DISPLAY_CHARS: usize = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Success,
    Error,
}

/// 单个文件的处理结果，创建后不可修改
#[derive(Debug, Clone, Serialize)]
pub struct FileOutcome {
    file: PathBuf,
    status: OutcomeStatus,
    attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response: Option<Value>,
}

impl FileOutcome {
    pub fn success(file: PathBuf, attempts: u32, response: Value) -> Self {
        Self {
            file,
            status: OutcomeStatus::Success,
            attempts: attempts.max(1),
            error: None,
            response: Some(response),
        }
    }

    pub fn failure(file: PathBuf, attempts: u32, error: impl Into<String>) -> Self {
        Self {
            file,
            status: OutcomeStatus::Error,
            attempts: attempts.max(1),
            error: Some(error.into()),
            response: None,
        }
    }

    pub fn from_attempts(file: PathBuf, outcome: UploadAttempts) -> Self {
        match outcome.result {
            Ok(response) => Self::success(file, outcome.attempts, response),
            Err(e) => Self::failure(file, outcome.attempts, e.to_string()),
        }
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    pub fn status(&self) -> OutcomeStatus {
        self.status
    }

    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// 截断后的错误文本，用于终端输出
    pub fn error_preview(&self) -> Option<String> {
        self.error
            .as_deref()
            .map(|e| truncate_chars(e, ERROR_DISPLAY_CHARS))
    }

    pub fn response(&self) -> Option<&Value> {
        self.response.as_ref()
    }
}

/// 一次批量上传的汇总报告，顺序与输入文件一致
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    outcomes: Vec<FileOutcome>,
}

impl BatchReport {
    pub fn outcomes(&self) -> &[FileOutcome] {
        &self.outcomes
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn success_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn error_count(&self) -> usize {
        self.len() - self.success_count()
    }

    /// 成功率 = 成功数 / 总数；空报告为 0
    pub fn success_rate(&self) -> f64 {
        if self.outcomes.is_empty() {
            0.0
        } else {
            self.success_count() as f64 / self.len() as f64
        }
    }

    pub fn errors(&self) -> impl Iterator<Item = &FileOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }
}

impl From<Vec<FileOutcome>> for BatchReport {
    fn from(outcomes: Vec<FileOutcome>) -> Self {
        Self { outcomes }
    }
}

/// 上传入口：单文本、单文件、批量与目录上传
///
/// 持有只读的配置与重试上传器，二者通过 `Arc` 在 worker 之间共享。
#[derive(Clone)]
pub struct MemoryUploader {
    config: Arc<AppConfig>,
    uploader: Arc<RetryingUploader>,
}

impl MemoryUploader {
    pub fn new(config: Arc<AppConfig>, api: Arc<dyn MemoryApi>) -> Self {
        let uploader = RetryingUploader::new(
            api,
            config.retry.clone(),
            config.debug.enable_api_logging,
        );
        Self {
            config,
            uploader: Arc::new(uploader),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    fn extract_mode(&self, options: &UploadOptions) -> ExtractMode {
        options
            .extract_mode
            .unwrap_or(self.config.defaults.extract_mode)
    }

    /// 上传一段文本（按纯文本处理）
    pub async fn upload_text(&self, content: &str, options: &UploadOptions) -> Result<Value> {
        let mode = self.extract_mode(options);
        let parsed = parser::parse_plain_text(content, mode);
        let request = self.finish_request(parsed, mode, options)?;

        let outcome = self.uploader.upload(&request).await;
        match &outcome.result {
            Ok(_) => info!(user_id = %request.user_id, attempts = outcome.attempts, "✅ 文本记忆上传成功"),
            Err(e) => warn!(user_id = %request.user_id, attempts = outcome.attempts, "❌ 文本上传失败: {}", e),
        }
        outcome.result
    }

    /// 解析文件并组装上传请求，不发起网络调用
    pub fn prepare_file(&self, path: &Path, options: &UploadOptions) -> Result<UploadRequest> {
        let mode = self.extract_mode(options);
        let parsed = parser::parse_file(path, mode, self.config.file_processing.max_file_size_mb)?;
        self.finish_request(parsed, mode, options)
    }

    fn finish_request(
        &self,
        parsed: parser::ParsedContent,
        mode: ExtractMode,
        options: &UploadOptions,
    ) -> Result<UploadRequest> {
        let mut metadata = parsed.metadata;
        metadata.insert("upload_time".into(), Value::String(parser::now_iso()));
        metadata.insert("extract_mode".into(), Value::String(mode.as_str().to_string()));
        build_upload_request(
            parsed.messages,
            options,
            &self.config.defaults.user_id,
            metadata,
            parsed.timestamp,
        )
    }

    /// 上传单个文件；解析失败时不调用 API，直接产出错误结果
    pub async fn upload_file(&self, path: &Path, options: &UploadOptions) -> FileOutcome {
        let request = match self.prepare_file(path, options) {
            Ok(request) => request,
            Err(e) => {
                warn!(file = %path.display(), "❌ 解析失败: {}", e);
                return FileOutcome::failure(path.to_path_buf(), 1, e.to_string());
            }
        };

        let outcome = FileOutcome::from_attempts(path.to_path_buf(), self.uploader.upload(&request).await);
        if outcome.is_success() {
            info!(file = %path.display(), user_id = %request.user_id, attempts = outcome.attempts(), "✅ 文件上传成功");
        } else {
            warn!(
                file = %path.display(),
                attempts = outcome.attempts(),
                error = %outcome.error_preview().unwrap_or_default(),
                "❌ 文件上传失败"
            );
        }
        outcome
    }

    /// 批量上传
    ///
    /// 仅在文件列表为空或 `max_workers == 0` 时返回错误；单个文件的失败记录在报告中。
    pub async fn upload_batch(
        &self,
        files: &[PathBuf],
        options: &UploadOptions,
        concurrent: bool,
        max_workers: usize,
    ) -> Result<BatchReport> {
        if files.is_empty() {
            return Err(ClientError::Other("批量上传的文件列表为空".to_string()));
        }
        if max_workers == 0 {
            return Err(ConfigError::InvalidValue {
                field: "batch.max_workers".to_string(),
                message: "must be at least 1".to_string(),
            }
            .into());
        }

        let batch_id = Uuid::new_v4();
        let span = info_span!("batch", %batch_id, files = files.len(), concurrent, max_workers);

        let report = async {
            info!("📁 开始批量上传");
            let outcomes = if concurrent {
                self.run_concurrent(files, options, max_workers).await
            } else {
                self.run_sequential(files, options).await
            };
            let report = BatchReport { outcomes };
            info!(
                success = report.success_count(),
                error = report.error_count(),
                "📊 批量上传完成"
            );
            report
        }
        .instrument(span)
        .await;

        Ok(report)
    }

    async fn run_sequential(&self, files: &[PathBuf], options: &UploadOptions) -> Vec<FileOutcome> {
        let mut outcomes = Vec::with_capacity(files.len());
        for file in files {
            outcomes.push(self.upload_file(file, options).await);
        }
        outcomes
    }

    async fn run_concurrent(
        &self,
        files: &[PathBuf],
        options: &UploadOptions,
        max_workers: usize,
    ) -> Vec<FileOutcome> {
        let semaphore = Arc::new(Semaphore::new(max_workers));
        let options = Arc::new(options.clone());
        let mut slots: Vec<Option<FileOutcome>> = (0..files.len()).map(|_| None).collect();
        let mut workers = JoinSet::new();

        for (index, file) in files.iter().cloned().enumerate() {
            let semaphore = semaphore.clone();
            let options = options.clone();
            let this = self.clone();
            workers.spawn(
                async move {
                    let _permit = semaphore.acquire_owned().await.ok();
                    (index, this.upload_file(&file, &options).await)
                }
                .in_current_span(),
            );
        }

        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok((index, outcome)) => slots[index] = Some(outcome),
                Err(e) => warn!("worker 异常退出: {}", e),
            }
        }

        slots
            .into_iter()
            .zip(files)
            .map(|(slot, file)| {
                slot.unwrap_or_else(|| FileOutcome::failure(file.clone(), 1, "worker 异常退出"))
            })
            .collect()
    }

    /// 上传目录下所有受支持的文件；没有文件时返回空报告
    pub async fn upload_directory(
        &self,
        dir: &Path,
        recursive: bool,
        options: &UploadOptions,
    ) -> Result<BatchReport> {
        if !dir.is_dir() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("Directory not found: {}", dir.display()),
            )
            .into());
        }

        let files = collect_files(dir, recursive, &self.config.file_processing.supported_formats);
        if files.is_empty() {
            warn!(dir = %dir.display(), "⚠️ 目录中没有受支持的文件");
            return Ok(BatchReport::default());
        }
        info!(dir = %dir.display(), count = files.len(), "📁 找到待上传文件");

        self.upload_batch(
            &files,
            options,
            self.config.batch.concurrent,
            self.config.batch.max_workers,
        )
        .await
    }
}

/// 收集目录下扩展名受支持的文件（大小写不敏感），按路径排序
pub fn collect_files(dir: &Path, recursive: bool, supported_formats: &[String]) -> Vec<PathBuf> {
    let max_depth = if recursive { usize::MAX } else { 1 };
    let formats: Vec<String> = supported_formats.iter().map(|f| f.to_lowercase()).collect();

    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .max_depth(max_depth)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(e) => Some(e),
            Err(err) => {
                warn!("跳过无法访问的路径: {}", err);
                None
            }
        })
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            let name = e.file_name().to_string_lossy().to_lowercase();
            formats.iter().any(|ext| name.ends_with(ext.as_str()))
        })
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use crate::testing::MockMemoryApi;
    use serde_json::json;
    use std::time::Duration;

    fn config() -> Arc<AppConfig> {
        let mut config = AppConfig::default();
        config.retry = RetryConfig {
            jitter_ms: 0,
            ..RetryConfig::default()
        };
        config.debug.enable_api_logging = false;
        Arc::new(config)
    }

    /// 写入 5 个文件，其中第 3 个是无效的 JSON 对话导出
    fn five_files(dir: &Path) -> Vec<PathBuf> {
        (1..=5)
            .map(|i| {
                if i == 3 {
                    let path = dir.join("03_broken.json");
                    std::fs::write(&path, r#"{"messages": [{"role": "user", "#).unwrap();
                    path
                } else {
                    let path = dir.join(format!("{i:02}_note.txt"));
                    std::fs::write(&path, format!("note number {i}")).unwrap();
                    path
                }
            })
            .collect()
    }

    #[tokio::test]
    async fn test_sequential_isolates_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let files = five_files(dir.path());
        let api = Arc::new(MockMemoryApi::new());
        let uploader = MemoryUploader::new(config(), api.clone());

        let report = uploader
            .upload_batch(&files, &UploadOptions::new(), false, 3)
            .await
            .unwrap();

        assert_eq!(report.len(), files.len());
        assert_eq!(report.success_count(), 4);
        assert_eq!(report.error_count(), 1);
        for (outcome, file) in report.outcomes().iter().zip(&files) {
            assert_eq!(outcome.file(), file.as_path());
        }
        let broken = &report.outcomes()[2];
        assert_eq!(broken.status(), OutcomeStatus::Error);
        assert_eq!(broken.attempts(), 1);
        assert!(broken.error().unwrap().contains("Invalid JSON"));
        // 解析失败的文件不会调用 API
        assert_eq!(api.call_count(), 4);
        assert!((report.success_rate() - 0.8).abs() < f64::EPSILON);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_preserves_input_order() {
        let dir = tempfile::tempdir().unwrap();
        let files = five_files(dir.path());
        // 越靠前的文件延迟越长，完成顺序与提交顺序相反
        let api = Arc::new(MockMemoryApi::new().with_latency(|req| {
            let n: u64 = req.messages[0]
                .content
                .trim_start_matches("note number ")
                .parse()
                .unwrap_or(0);
            Duration::from_millis(1000 - n * 100)
        }));
        let uploader = MemoryUploader::new(config(), api.clone());

        let report = uploader
            .upload_batch(&files, &UploadOptions::new(), true, 3)
            .await
            .unwrap();

        assert_eq!(report.len(), 5);
        let files_in_report: Vec<&Path> = report.outcomes().iter().map(|o| o.file()).collect();
        let expected: Vec<&Path> = files.iter().map(|f| f.as_path()).collect();
        assert_eq!(files_in_report, expected);
        assert_eq!(report.errors().count(), 1);
        assert!(!report.outcomes()[2].is_success());
        assert!(api.peak_concurrency() <= 3);
        assert!(api.peak_concurrency() >= 2);
        assert_eq!(api.call_count(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_worker_never_overlaps() {
        let dir = tempfile::tempdir().unwrap();
        let files = five_files(dir.path());
        let api = Arc::new(MockMemoryApi::new().with_latency(|_| Duration::from_millis(50)));
        let uploader = MemoryUploader::new(config(), api.clone());

        let report = uploader
            .upload_batch(&files, &UploadOptions::new(), true, 1)
            .await
            .unwrap();
        assert_eq!(report.len(), 5);
        assert_eq!(api.peak_concurrency(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_recorded_per_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, "hello").unwrap();
        let api = Arc::new(MockMemoryApi::new().with_failures(3, "503 Service Unavailable"));
        let uploader = MemoryUploader::new(config(), api);

        let report = uploader
            .upload_batch(&[path], &UploadOptions::new(), false, 3)
            .await
            .unwrap();
        let outcome = &report.outcomes()[0];
        assert_eq!(outcome.status(), OutcomeStatus::Error);
        assert_eq!(outcome.attempts(), 3);
        assert!(outcome.error().unwrap().contains("503 Service Unavailable"));
    }

    #[tokio::test]
    async fn test_invalid_batch_arguments() {
        let uploader = MemoryUploader::new(config(), Arc::new(MockMemoryApi::new()));
        assert!(uploader.upload_batch(&[], &UploadOptions::new(), false, 3).await.is_err());

        let files = vec![PathBuf::from("x.txt")];
        let err = uploader
            .upload_batch(&files, &UploadOptions::new(), true, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Config(ConfigError::InvalidValue { .. })));
    }

    #[tokio::test]
    async fn test_json_timestamp_reaches_request() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chat.json");
        std::fs::write(
            &path,
            r#"{"updated": 1672531200000, "messages": [
                {"role": "用户", "content": "下周一开会"},
                {"role": "助手", "content": "   "}
            ]}"#,
        )
        .unwrap();
        let api = Arc::new(MockMemoryApi::new().with_response(json!({"id": "m-1"})));
        let uploader = MemoryUploader::new(config(), api.clone());

        let outcome = uploader
            .upload_file(&path, &UploadOptions::new().user_id("bob"))
            .await;
        assert!(outcome.is_success());
        assert_eq!(outcome.response(), Some(&json!({"id": "m-1"})));

        let sent = api.last_request().unwrap();
        assert_eq!(sent.timestamp, Some(1672531200));
        assert_eq!(sent.user_id, "bob");
        assert_eq!(sent.messages.len(), 1);
        assert_eq!(sent.metadata["extract_mode"], "auto");
        assert!(sent.metadata.contains_key("upload_time"));
    }

    #[tokio::test]
    async fn test_upload_text_uses_default_user() {
        let api = Arc::new(MockMemoryApi::new());
        let uploader = MemoryUploader::new(config(), api.clone());

        uploader
            .upload_text("我喜欢喝乌龙茶", &UploadOptions::new().extract_mode(ExtractMode::Raw))
            .await
            .unwrap();
        let sent = api.last_request().unwrap();
        assert_eq!(sent.user_id, "default_user");
        assert_eq!(sent.metadata["format"], "raw_content");

        assert!(uploader.upload_text("   ", &UploadOptions::new()).await.is_err());
    }

    #[tokio::test]
    async fn test_collect_files_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.MD"), "x").unwrap();
        std::fs::write(dir.path().join("a.txt"), "x").unwrap();
        std::fs::write(dir.path().join("skip.png"), "x").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub").join("c.json"), "{}").unwrap();

        let formats = AppConfig::default().file_processing.supported_formats;
        let flat = collect_files(dir.path(), false, &formats);
        let names: Vec<String> = flat
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.txt", "b.MD"]);

        let deep = collect_files(dir.path(), true, &formats);
        assert_eq!(deep.len(), 3);

        let uploader = MemoryUploader::new(config(), Arc::new(MockMemoryApi::new()));
        let empty = tempfile::tempdir().unwrap();
        let report = uploader
            .upload_directory(empty.path(), true, &UploadOptions::new())
            .await
            .unwrap();
        assert!(report.is_empty());
    }
}

//! 内容解析
//!
//! 把原始文件内容（JSON 对话导出 / Markdown / 纯文本）转换成有序的
//! [`Message`] 列表和派生元数据：
//!
//! | 格式 | 入口 | 失败方式 |
//! |------|------|----------|
//! | JSON 对话 | [`json_chat::parse_json_chat`] | 结构无效时返回 `FormatError` |
//! | Markdown 对话 | [`markdown::parse_markdown_chat`] | 不失败，退化为单条消息 |
//! | 纯文本 | [`parse_plain_text`] | 不失败 |

pub mod json_chat;
pub mod markdown;
pub mod role;

use crate::api::types::{Message, Metadata};
use crate::error::{ClientError, FormatError, Result};
use chrono::{DateTime, Local};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::LazyLock;

pub use json_chat::parse_json_chat;
pub use markdown::parse_markdown_chat;
pub use role::normalize_role;

/// 解析结果
#[derive(Debug, Clone, Default)]
pub struct ParsedContent {
    pub messages: Vec<Message>,
    pub metadata: Metadata,
    /// 原始对话时间（Unix 秒），仅 JSON 导出带 `updated` 时存在
    pub timestamp: Option<i64>,
}

/// 处理模式：`auto` 交给服务端 AI 提取，`raw` 原样保存
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractMode {
    #[default]
    Auto,
    Raw,
}

impl ExtractMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractMode::Auto => "auto",
            ExtractMode::Raw => "raw",
        }
    }
}

impl fmt::Display for ExtractMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExtractMode {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(ExtractMode::Auto),
            "raw" => Ok(ExtractMode::Raw),
            other => Err(ClientError::Other(format!(
                "未知的 extract_mode: {other}（可选 auto / raw）"
            ))),
        }
    }
}

/// 自动识别出的内容类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    JsonChat,
    MarkdownChat,
    PlainText,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::JsonChat => "json_chat",
            ContentKind::MarkdownChat => "markdown_chat",
            ContentKind::PlainText => "plain_text",
        }
    }
}

static CHAT_INDICATORS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\*\*[^*\n]+[:：]\*\*",
        r"(?m)^##[ \t]+[^#\n]+",
        r"(?m)^[^:：\n]+[:：]\s",
        r"\[[^\]\n]+\]",
        r"(?i)(user|assistant|human|ai|bot|gpt|claude)[\s:：]",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("invalid chat indicator"))
    .collect()
});

/// 超过这些阈值的 `.md` 视为普通文档而非对话
const MD_MAX_CHAT_CHARS: usize = 3000;
const MD_MAX_CHAT_NEWLINES: usize = 50;
const MD_EXPORT_MARKERS: [&str; 2] = ["Made with Echoes", "This conversation was exported"];

/// 根据内容和扩展名（含前导点，如 `.json`）判断内容类型
///
/// `.json` 文件一律按 JSON 对话解析，结构无效时由解析器报错；
/// 其他扩展名只有在内容是带 `messages` 的 JSON 对象时才按 JSON 处理。
pub fn detect_content_kind(content: &str, extension: &str) -> ContentKind {
    let extension = extension.to_lowercase();

    if extension == ".json" {
        return ContentKind::JsonChat;
    }
    if content.trim_start().starts_with('{') {
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(content) {
            if map.contains_key("messages") {
                return ContentKind::JsonChat;
            }
        }
    }

    if extension == ".md"
        && (MD_EXPORT_MARKERS.iter().any(|m| content.contains(m))
            || content.chars().count() > MD_MAX_CHAT_CHARS
            || content.matches('\n').count() > MD_MAX_CHAT_NEWLINES)
    {
        return ContentKind::PlainText;
    }

    if CHAT_INDICATORS.iter().any(|re| re.is_match(content)) {
        return ContentKind::MarkdownChat;
    }

    ContentKind::PlainText
}

/// 纯文本整体作为一条 user 消息
pub fn parse_plain_text(raw: &str, mode: ExtractMode) -> ParsedContent {
    let mut metadata = Metadata::new();
    insert_str(&mut metadata, "source", "plain_text");
    insert_str(&mut metadata, "extract_mode", mode.as_str());
    insert_str(&mut metadata, "parsed_at", &now_iso());
    let format = match mode {
        ExtractMode::Raw => "raw_content",
        ExtractMode::Auto => "ai_extract",
    };
    insert_str(&mut metadata, "format", format);

    ParsedContent {
        messages: Message::user(raw).into_iter().collect(),
        metadata,
        timestamp: None,
    }
}

pub fn parse_content(raw: &str, kind: ContentKind, mode: ExtractMode) -> Result<ParsedContent> {
    match kind {
        ContentKind::JsonChat => parse_json_chat(raw),
        ContentKind::MarkdownChat => Ok(parse_markdown_chat(raw)),
        ContentKind::PlainText => Ok(parse_plain_text(raw, mode)),
    }
}

/// 读取文件：优先 UTF-8（去掉 BOM），失败时按 Latin-1 逐字节解码
pub fn read_file(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(&bytes);
    match std::str::from_utf8(bytes) {
        Ok(text) => Ok(text.to_string()),
        Err(_) => {
            tracing::warn!(path = %path.display(), "文件不是 UTF-8，按 Latin-1 解码");
            Ok(bytes.iter().map(|&b| b as char).collect())
        }
    }
}

/// 读取并解析任意受支持的文件，合并文件层面的元数据
pub fn parse_file(path: &Path, mode: ExtractMode, max_file_size_mb: u64) -> Result<ParsedContent> {
    let meta = std::fs::metadata(path)?;
    let size_mb = meta.len() as f64 / (1024.0 * 1024.0);
    if size_mb > max_file_size_mb as f64 {
        return Err(FormatError::FileTooLarge {
            size_mb,
            limit_mb: max_file_size_mb,
        }
        .into());
    }

    let content = read_file(path)?;
    let extension = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let kind = detect_content_kind(&content, &extension);
    tracing::debug!(path = %path.display(), kind = kind.as_str(), "识别内容类型");

    let mut parsed = parse_content(&content, kind, mode)?;

    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    insert_str(&mut parsed.metadata, "file_name", &file_name);
    insert_str(&mut parsed.metadata, "file_path", &absolute.display().to_string());
    parsed.metadata.insert("file_size".into(), meta.len().into());
    if let Ok(modified) = meta.modified() {
        let modified: DateTime<Local> = modified.into();
        insert_str(&mut parsed.metadata, "file_modified", &modified.to_rfc3339());
    }

    Ok(parsed)
}

pub(crate) fn insert_str(metadata: &mut Metadata, key: &str, value: &str) {
    metadata.insert(key.to_string(), Value::String(value.to_string()));
}

pub(crate) fn now_iso() -> String {
    Local::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::types::Role;
    use std::io::Write;

    #[test]
    fn test_detect_json_chat() {
        let json = r#"{"messages": [{"role": "user", "content": "hi"}]}"#;
        assert_eq!(detect_content_kind(json, ".json"), ContentKind::JsonChat);
        assert_eq!(detect_content_kind(json, ".txt"), ContentKind::JsonChat);
        // `.json` 扩展名按声明的格式处理，其他扩展名要求带 messages
        assert_eq!(detect_content_kind(r#"{"a": 1}"#, ".json"), ContentKind::JsonChat);
        assert_ne!(detect_content_kind(r#"{"a": 1}"#, ".txt"), ContentKind::JsonChat);
    }

    #[test]
    fn test_detect_markdown_and_plain() {
        assert_eq!(
            detect_content_kind("**User:** hi\n**AI:** hello", ".md"),
            ContentKind::MarkdownChat
        );
        assert_eq!(
            detect_content_kind("just a quiet paragraph of notes", ".txt"),
            ContentKind::PlainText
        );
    }

    #[test]
    fn test_md_export_markers_force_plain_text() {
        let exported = "**User:** hi\n**AI:** hello\n\nThis conversation was exported from somewhere";
        assert_eq!(detect_content_kind(exported, ".md"), ContentKind::PlainText);
        assert_eq!(detect_content_kind(exported, ".txt"), ContentKind::MarkdownChat);

        let long = format!("**User:** {}", "x".repeat(3001));
        assert_eq!(detect_content_kind(&long, ".md"), ContentKind::PlainText);

        let many_lines = "User: hi\n".repeat(51);
        assert_eq!(detect_content_kind(&many_lines, ".md"), ContentKind::PlainText);
    }

    #[test]
    fn test_plain_text_modes() {
        let auto = parse_plain_text("  hello  ", ExtractMode::Auto);
        assert_eq!(auto.messages, vec![Message::user("hello").unwrap()]);
        assert_eq!(auto.metadata["format"], "ai_extract");

        let raw = parse_plain_text("hello", ExtractMode::Raw);
        assert_eq!(raw.metadata["format"], "raw_content");
        assert_eq!(raw.metadata["extract_mode"], "raw");
    }

    #[test]
    fn test_extract_mode_from_str() {
        assert_eq!("RAW".parse::<ExtractMode>().unwrap(), ExtractMode::Raw);
        assert_eq!("auto".parse::<ExtractMode>().unwrap(), ExtractMode::Auto);
        assert!("summary".parse::<ExtractMode>().is_err());
    }

    #[test]
    fn test_read_file_latin1_fallback() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[b'c', b'a', b'f', 0xE9]).unwrap();
        assert_eq!(read_file(file.path()).unwrap(), "café");
    }

    #[test]
    fn test_parse_file_merges_file_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chat.json");
        std::fs::write(
            &path,
            r#"{"updated": 1672531200000, "messages": [{"role": "human", "content": "hi"}]}"#,
        )
        .unwrap();

        let parsed = parse_file(&path, ExtractMode::Auto, 10).unwrap();
        assert_eq!(parsed.timestamp, Some(1672531200));
        assert_eq!(parsed.messages[0].role, Role::User);
        assert_eq!(parsed.metadata["file_name"], "chat.json");
        assert_eq!(parsed.metadata["source"], "json_chat");
        assert!(parsed.metadata.contains_key("file_modified"));
    }

    #[test]
    fn test_parse_file_size_limit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.txt");
        std::fs::write(&path, vec![b'a'; 1024 * 1024 + 1]).unwrap();
        let err = parse_file(&path, ExtractMode::Auto, 1).unwrap_err();
        assert!(matches!(err, ClientError::Format(FormatError::FileTooLarge { .. })));
    }
}

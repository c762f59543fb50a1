//! Mem0 REST API 类型定义

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// string → scalar 的元数据映射
pub type Metadata = Map<String, Value>;

/// 消息角色，上游 API 只接受这两个值
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// 一条待上传的对话消息
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    /// 内容去除首尾空白后为空时返回 `None`
    pub fn new(role: Role, content: &str) -> Option<Self> {
        let content = content.trim();
        if content.is_empty() {
            return None;
        }
        Some(Self {
            role,
            content: content.to_string(),
        })
    }

    pub fn user(content: &str) -> Option<Self> {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: &str) -> Option<Self> {
        Self::new(Role::Assistant, content)
    }
}

/// `POST /v1/memories/` 请求体
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct UploadRequest {
    pub messages: Vec<Message>,
    pub user_id: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_instructions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub includes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub excludes: Option<String>,
    pub infer: bool,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub metadata: Metadata,
    /// 原始对话时间（Unix 秒），而非上传时间
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

/// `POST /v2/memories/search/` 请求体
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SearchRequest {
    pub query: String,
    pub filters: Value,
    pub top_k: usize,
}

/// `POST /v2/memories/` 请求体（按过滤条件列出）
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ListRequest {
    pub filters: Value,
    pub page_size: usize,
}

/// 检索返回的单条记忆
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct MemoryRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub memory: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub metadata: Option<Metadata>,
    #[serde(default)]
    pub score: Option<f64>,
}

impl MemoryRecord {
    /// 读取 metadata 中的字符串字段
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.as_ref()?.get(key)?.as_str()
    }
}

/// 检索响应可能是裸数组，也可能包在 `results` / `memories` 字段里
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum MemoryListResponse {
    List(Vec<MemoryRecord>),
    Results { results: Vec<MemoryRecord> },
    Memories { memories: Vec<MemoryRecord> },
}

impl MemoryListResponse {
    pub(crate) fn into_records(self) -> Vec<MemoryRecord> {
        match self {
            MemoryListResponse::List(v)
            | MemoryListResponse::Results { results: v }
            | MemoryListResponse::Memories { memories: v } => v,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_rejects_blank_content() {
        assert!(Message::user("   \n\t").is_none());
        let m = Message::assistant("  hi  ").unwrap();
        assert_eq!(m.content, "hi");
        assert_eq!(serde_json::to_value(&m).unwrap(), json!({"role": "assistant", "content": "hi"}));
    }

    #[test]
    fn test_list_response_shapes() {
        let bare: MemoryListResponse =
            serde_json::from_value(json!([{"id": "a", "memory": "x"}])).unwrap();
        assert_eq!(bare.into_records().len(), 1);

        let wrapped: MemoryListResponse = serde_json::from_value(
            json!({"results": [{"id": "a", "memory": "x", "score": 0.5, "extra": 1}]}),
        )
        .unwrap();
        let records = wrapped.into_records();
        assert_eq!(records[0].score, Some(0.5));
    }
}

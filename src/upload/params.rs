//! 上传请求组装（纯函数，无 IO、无重试）

use super::UploadOptions;
use crate::api::types::{Message, Metadata, UploadRequest};
use crate::error::{FormatError, Result};
use serde_json::Value;

pub const API_VERSION: &str = "v2";

/// 组装一次上传的请求体
///
/// - `user_id` 取 `options.user_id`，为空时退回 `default_user_id`
/// - 空串 / 纯空白的 instructions、includes、excludes 视为未设置并从请求中省略
/// - 空内容消息被过滤；过滤后为空返回 [`FormatError::NoValidMessages`]
/// - 已设置的自定义参数同时写入元数据便于追踪；`options.metadata` 最后合并，
///   只接受标量值
pub fn build_upload_request(
    messages: Vec<Message>,
    options: &UploadOptions,
    default_user_id: &str,
    mut metadata: Metadata,
    timestamp: Option<i64>,
) -> Result<UploadRequest> {
    let messages: Vec<Message> = messages
        .into_iter()
        .filter(|m| !m.content.trim().is_empty())
        .collect();
    if messages.is_empty() {
        return Err(FormatError::NoValidMessages.into());
    }

    let user_id = non_blank(&options.user_id).unwrap_or_else(|| default_user_id.to_string());
    let custom_instructions = non_blank(&options.custom_instructions);
    let includes = non_blank(&options.includes);
    let excludes = non_blank(&options.excludes);
    let infer = options.infer.unwrap_or(true);

    metadata.insert("user_id".into(), Value::String(user_id.clone()));
    if let Some(v) = &custom_instructions {
        metadata.insert("custom_instructions".into(), Value::String(v.clone()));
    }
    if let Some(v) = &includes {
        metadata.insert("includes".into(), Value::String(v.clone()));
    }
    if let Some(v) = &excludes {
        metadata.insert("excludes".into(), Value::String(v.clone()));
    }
    if let Some(v) = options.infer {
        metadata.insert("infer".into(), Value::Bool(v));
    }

    for (key, value) in &options.metadata {
        if value.is_object() || value.is_array() {
            return Err(FormatError::InvalidMetadata(format!(
                "'{key}' 必须是标量值（字符串 / 数字 / 布尔）"
            ))
            .into());
        }
        metadata.insert(key.clone(), value.clone());
    }

    Ok(UploadRequest {
        messages,
        user_id,
        version: API_VERSION.to_string(),
        custom_instructions,
        includes,
        excludes,
        infer,
        metadata,
        timestamp,
    })
}

pub(crate) fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::types::Role;
    use crate::error::ClientError;
    use serde_json::json;

    fn msgs() -> Vec<Message> {
        vec![
            Message::user("记得我喜欢深色主题").unwrap(),
            Message {
                role: Role::Assistant,
                content: "   ".to_string(),
            },
        ]
    }

    #[test]
    fn test_unset_and_blank_fields_are_omitted() {
        let options = UploadOptions::new().includes("  ").excludes("");
        let req = build_upload_request(msgs(), &options, "default_user", Metadata::new(), None).unwrap();
        let body = serde_json::to_value(&req).unwrap();

        assert_eq!(body["user_id"], "default_user");
        assert_eq!(body["version"], "v2");
        assert_eq!(body["infer"], true);
        assert!(body.get("includes").is_none());
        assert!(body.get("excludes").is_none());
        assert!(body.get("custom_instructions").is_none());
        assert!(body.get("timestamp").is_none());
        assert_eq!(req.messages.len(), 1);
    }

    #[test]
    fn test_set_fields_are_sent_and_tracked() {
        let mut extra = Metadata::new();
        extra.insert("project".into(), json!("atlas"));
        let options = UploadOptions::new()
            .user_id("alice")
            .custom_instructions("只提取偏好")
            .includes("preferences")
            .infer(false)
            .metadata(extra);

        let req =
            build_upload_request(msgs(), &options, "default_user", Metadata::new(), Some(1672531200))
                .unwrap();
        let body = serde_json::to_value(&req).unwrap();

        assert_eq!(body["user_id"], "alice");
        assert_eq!(body["custom_instructions"], "只提取偏好");
        assert_eq!(body["includes"], "preferences");
        assert_eq!(body["infer"], false);
        assert_eq!(body["timestamp"], 1672531200);
        assert_eq!(body["metadata"]["project"], "atlas");
        assert_eq!(body["metadata"]["infer"], false);
        assert_eq!(body["messages"][0], json!({"role": "user", "content": "记得我喜欢深色主题"}));
    }

    #[test]
    fn test_rejects_empty_messages_and_nested_metadata() {
        let blank = vec![Message {
            role: Role::User,
            content: "\n".to_string(),
        }];
        let err = build_upload_request(blank, &UploadOptions::new(), "u", Metadata::new(), None)
            .unwrap_err();
        assert!(matches!(err, ClientError::Format(FormatError::NoValidMessages)));

        let mut nested = Metadata::new();
        nested.insert("tags".into(), json!(["a", "b"]));
        let options = UploadOptions::new().metadata(nested);
        let err = build_upload_request(msgs(), &options, "u", Metadata::new(), None).unwrap_err();
        assert!(matches!(err, ClientError::Format(FormatError::InvalidMetadata(_))));
    }
}

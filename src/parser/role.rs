//! 角色归一化
//!
//! 各种导出格式里的说话人标签（`Human`、`ChatGPT`、`用户`、`助手`……）统一映射到
//! [`Role::User`] / [`Role::Assistant`]。无法识别的标签（包括 `system`）一律视为
//! `user`，因为上游 API 只接受这两个角色。

use crate::api::types::Role;

pub const USER_ALIASES: &[&str] = &[
    "user", "human", "you", "me", "question", "用户", "我", "人类", "提问者", "ユーザー", "사용자",
];

pub const ASSISTANT_ALIASES: &[&str] = &[
    "assistant",
    "ai",
    "bot",
    "gpt",
    "claude",
    "chatgpt",
    "model",
    "answer",
    "助手",
    "机器人",
    "人工智能",
    "アシスタント",
    "어시스턴트",
];

/// 参与子串匹配的 ASCII 别名最短长度
const MIN_SUBSTRING_ALIAS: usize = 3;

/// 大小写不敏感的角色归一化，对已归一化的值幂等
pub fn normalize_role(raw: &str) -> Role {
    let label = raw.trim().to_lowercase();

    if let Some(role) = lookup(&label) {
        return role;
    }

    for word in label
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        if let Some(role) = lookup(word) {
            return role;
        }
    }

    // CJK 标签没有词边界，退化为子串匹配
    if USER_ALIASES
        .iter()
        .any(|a| !a.is_ascii() && label.contains(a))
    {
        return Role::User;
    }
    if ASSISTANT_ALIASES
        .iter()
        .any(|a| !a.is_ascii() && label.contains(a))
    {
        return Role::Assistant;
    }

    // `GPT4`、`Claude3`、`AIBot` 这类把模型名和版本 / 前缀连写的标签；
    // 过短的别名（`ai`、`me`）不参与，避免 `name` 之类误判
    if ASSISTANT_ALIASES
        .iter()
        .any(|a| a.is_ascii() && a.len() >= MIN_SUBSTRING_ALIAS && label.contains(a))
    {
        return Role::Assistant;
    }

    Role::User
}

fn lookup(token: &str) -> Option<Role> {
    if USER_ALIASES.contains(&token) {
        Some(Role::User)
    } else if ASSISTANT_ALIASES.contains(&token) {
        Some(Role::Assistant)
    } else {
        None
    }
}

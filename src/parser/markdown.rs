//! Markdown / 纯文本对话解析
//!
//! 说话人分隔约定按固定顺序尝试，第一个至少产出一轮对话的约定胜出：
//!
//! | 顺序 | 约定 | 示例 |
//! |------|------|------|
//! | 1 | 加粗前缀 | `**User:** 你好` |
//! | 2 | 二级标题 | `## Assistant` 换行后为正文 |
//! | 3 | 行首冒号 | `User: 你好` |
//! | 4 | 方括号 | `[User] 你好` |
//!
//! 每轮内容从分隔符结束处延伸到下一个同类分隔符开始处；第一个分隔符之前的
//! 文字保留为开头的一条 user 消息。

use super::role::normalize_role;
use super::{ParsedContent, insert_str, now_iso};
use crate::api::types::{Message, Metadata};
use regex::Regex;
use std::sync::LazyLock;

/// 一种说话人分隔约定，正则的第 1 个捕获组为说话人标签
pub struct SpeakerConvention {
    pub name: &'static str,
    delimiter: Regex,
}

impl SpeakerConvention {
    fn new(name: &'static str, pattern: &str) -> Self {
        Self {
            name,
            // 模式均为编译期常量
            delimiter: Regex::new(pattern).expect("invalid speaker pattern"),
        }
    }

    /// 按该约定切分出对话轮次；空内容的轮次被丢弃
    pub fn split_turns(&self, text: &str) -> Vec<Message> {
        let delimiters: Vec<(usize, usize, &str)> = self
            .delimiter
            .captures_iter(text)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                let speaker = caps.get(1)?;
                Some((whole.start(), whole.end(), speaker.as_str()))
            })
            .collect();

        let turns: Vec<Message> = delimiters
            .iter()
            .enumerate()
            .filter_map(|(i, &(_, body_start, speaker))| {
                let body_end = delimiters
                    .get(i + 1)
                    .map(|&(next_start, _, _)| next_start)
                    .unwrap_or(text.len());
                Message::new(normalize_role(speaker), &text[body_start..body_end])
            })
            .collect();
        if turns.is_empty() {
            return turns;
        }

        // 第一个分隔符之前的文字作为开头的 user 轮次保留
        let first_start = delimiters.first().map_or(0, |&(start, _, _)| start);
        Message::user(&text[..first_start])
            .into_iter()
            .chain(turns)
            .collect()
    }
}

pub static CONVENTIONS: LazyLock<Vec<SpeakerConvention>> = LazyLock::new(|| {
    vec![
        SpeakerConvention::new("bold", r"\*\*([^*\n]+?)[:：]\*\*"),
        SpeakerConvention::new("heading", r"(?m)^##[ \t]+([^#\n]+?)[ \t]*$"),
        SpeakerConvention::new("colon", r"(?m)^([^:：\n\[\]*#]{1,40})[:：]"),
        SpeakerConvention::new("bracket", r"\[([^\]\n]+)\]"),
    ]
});

/// 解析 Markdown 对话；不会失败，无法识别结构时退化为单条 user 消息
pub fn parse_markdown_chat(raw: &str) -> ParsedContent {
    let mut metadata = Metadata::new();
    insert_str(&mut metadata, "source", "markdown_chat");
    insert_str(&mut metadata, "parsed_at", &now_iso());

    let matched = CONVENTIONS
        .iter()
        .map(|c| (c.name, c.split_turns(raw)))
        .find(|(_, turns)| !turns.is_empty());

    let messages = match matched {
        Some((name, turns)) => {
            insert_str(&mut metadata, "format", "conversation");
            insert_str(&mut metadata, "speaker_convention", name);
            turns
        }
        None => {
            insert_str(&mut metadata, "format", "single_message");
            Message::user(raw).into_iter().collect()
        }
    };
    metadata.insert("message_count".into(), messages.len().into());

    ParsedContent {
        messages,
        metadata,
        timestamp: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::types::Role;

    #[test]
    fn test_bold_convention_spans_lines() {
        let raw = "**User:** 第一行\n第二行\n\n**Assistant:** 回答\n**User:**   \n";
        let parsed = parse_markdown_chat(raw);
        assert_eq!(parsed.messages.len(), 2);
        assert_eq!(parsed.messages[0].role, Role::User);
        assert_eq!(parsed.messages[0].content, "第一行\n第二行");
        assert_eq!(parsed.messages[1].role, Role::Assistant);
        assert_eq!(parsed.metadata["speaker_convention"], "bold");
    }

    #[test]
    fn test_heading_convention() {
        let raw = "## Human\nWhat is Rust?\n\n## Claude\nA systems language.\n";
        let parsed = parse_markdown_chat(raw);
        assert_eq!(parsed.metadata["speaker_convention"], "heading");
        assert_eq!(parsed.messages.len(), 2);
        assert_eq!(parsed.messages[1].role, Role::Assistant);
        assert_eq!(parsed.messages[1].content, "A systems language.");
    }

    #[test]
    fn test_colon_and_fullwidth_colon() {
        let raw = "用户：今天天气如何？\n助手：晴天。\n";
        let parsed = parse_markdown_chat(raw);
        assert_eq!(parsed.metadata["speaker_convention"], "colon");
        assert_eq!(parsed.messages[0].role, Role::User);
        assert_eq!(parsed.messages[1].role, Role::Assistant);
        assert_eq!(parsed.messages[1].content, "晴天。");
    }

    #[test]
    fn test_bracket_convention() {
        let raw = "[User] hi there [Bot] hello!";
        let parsed = parse_markdown_chat(raw);
        assert_eq!(parsed.metadata["speaker_convention"], "bracket");
        assert_eq!(parsed.messages.len(), 2);
        assert_eq!(parsed.messages[0].content, "hi there");
        assert_eq!(parsed.messages[1].role, Role::Assistant);
    }

    #[test]
    fn test_earlier_convention_wins() {
        // 同时满足 bold 与 colon，取顺序靠前的 bold
        let raw = "**User:** note: keep this together\n**AI:** ok";
        let parsed = parse_markdown_chat(raw);
        assert_eq!(parsed.metadata["speaker_convention"], "bold");
        assert_eq!(parsed.messages[0].content, "note: keep this together");
    }

    #[test]
    fn test_leading_text_kept_as_user_turn() {
        let raw = "Meeting Monday\nAgenda: budget review\nAssistant: noted";
        let parsed = parse_markdown_chat(raw);
        assert_eq!(parsed.metadata["speaker_convention"], "colon");
        assert_eq!(parsed.messages.len(), 3);
        assert_eq!(parsed.messages[0].role, Role::User);
        assert_eq!(parsed.messages[0].content, "Meeting Monday");
        assert_eq!(parsed.messages[1].content, "budget review");
        assert_eq!(parsed.messages[2].role, Role::Assistant);

        // 只有空白的前导文字不产生消息
        let parsed = parse_markdown_chat("\n\n**User:** hi");
        assert_eq!(parsed.messages.len(), 1);
    }

    #[test]
    fn test_unstructured_text_becomes_single_message() {
        let parsed = parse_markdown_chat("  just some notes without speakers  ");
        assert_eq!(parsed.messages.len(), 1);
        assert_eq!(parsed.messages[0].role, Role::User);
        assert_eq!(parsed.messages[0].content, "just some notes without speakers");
        assert_eq!(parsed.metadata["format"], "single_message");

        assert!(parse_markdown_chat("   ").messages.is_empty());
    }
}

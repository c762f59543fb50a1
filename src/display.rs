//! 终端输出
//!
//! 所有函数只负责拼接文本，由 `main` 打印。

use crate::api::types::MemoryRecord;
use crate::search::{UserStats, WeeklyReport};
use crate::upload::{BatchReport, OutcomeStatus};
use crate::upload::retry::truncate_chars;
use chrono::DateTime;
use std::fmt::Write as _;

/// 未开启 `--full` 时记忆内容的显示长度
pub const PREVIEW_CHARS: usize = 100;
const BANNER_WIDTH: usize = 60;

pub fn banner(title: &str) -> String {
    let line = "═".repeat(BANNER_WIDTH);
    format!("{line}\n{title}\n{line}")
}

/// `2024-01-01T08:00:00Z` → `2024-01-01`；无法解析时取前 10 个字符
fn short_date(raw: Option<&str>) -> String {
    match raw {
        None => "N/A".to_string(),
        Some(s) => match DateTime::parse_from_rfc3339(s) {
            Ok(dt) => dt.format("%Y-%m-%d").to_string(),
            Err(_) => s.chars().take(10).collect(),
        },
    }
}

pub fn render_memory(index: usize, record: &MemoryRecord, show_full: bool) -> String {
    let content = if show_full {
        record.memory.clone()
    } else {
        truncate_chars(&record.memory, PREVIEW_CHARS)
    };
    let id: String = record.id.chars().take(8).collect();
    let source = record.metadata_str("source").unwrap_or("unknown");

    let mut out = format!("{:>3}. 🧠 {}\n", index + 1, content);
    let _ = write!(
        out,
        "     🆔 {}  📅 {}  📂 {}",
        if id.is_empty() { "N/A" } else { &id },
        short_date(record.created_at.as_deref()),
        source
    );
    if let Some(score) = record.score {
        let _ = write!(out, "  🎯 {:.2}", score);
    }
    out
}

pub fn render_results(title: &str, records: &[MemoryRecord], show_full: bool) -> String {
    if records.is_empty() {
        return "📭 没有找到结果".to_string();
    }
    let mut out = format!("{}\n", banner(&format!("{title}（{} 条）", records.len())));
    for (i, record) in records.iter().enumerate() {
        let _ = writeln!(out, "{}", render_memory(i, record, show_full));
    }
    out
}

pub fn render_batch_report(report: &BatchReport) -> String {
    if report.is_empty() {
        return "📭 没有需要上传的文件".to_string();
    }
    let mut out = format!("{}\n", banner("📊 批量上传结果"));
    for outcome in report.outcomes() {
        let name = outcome
            .file()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| outcome.file().display().to_string());
        match outcome.status() {
            OutcomeStatus::Success => {
                let _ = writeln!(out, "✅ {}  (尝试 {} 次)", name, outcome.attempts());
            }
            OutcomeStatus::Error => {
                let _ = writeln!(
                    out,
                    "❌ {}  (尝试 {} 次)  {}",
                    name,
                    outcome.attempts(),
                    outcome.error_preview().unwrap_or_default()
                );
            }
        }
    }
    let _ = write!(
        out,
        "成功 {} / 失败 {} / 共 {}，成功率 {:.1}%",
        report.success_count(),
        report.error_count(),
        report.len(),
        report.success_rate() * 100.0
    );
    out
}

pub fn render_weekly_report(report: &WeeklyReport, show_full: bool) -> String {
    let mut out = format!(
        "{}\n",
        banner(&format!("📊 周报：{} ~ {}", report.week_start, report.week_end))
    );
    let _ = writeln!(
        out,
        "本周记忆 {} 条，相关历史记忆 {} 条\n",
        report.summary.total_current, report.summary.total_related
    );
    out.push_str(&render_results("📅 本周记忆", &report.week_memories, show_full));
    if !report.related_memories.is_empty() {
        out.push('\n');
        out.push_str(&render_results("🔗 相关历史记忆", &report.related_memories, show_full));
    }
    out
}

pub fn render_stats(stats: &UserStats) -> String {
    let mut out = format!("{}\n", banner(&format!("📈 用户统计：{}", stats.user_id)));
    let _ = writeln!(out, "总记忆数: {}", stats.total_memories);
    let _ = writeln!(out, "近 7 天: {}", stats.recent_memories_7d);
    let _ = writeln!(out, "按来源:");
    for (source, count) in &stats.sources {
        let _ = writeln!(out, "  • {source}: {count}");
    }
    let _ = writeln!(out, "按处理模式:");
    for (mode, count) in &stats.extract_modes {
        let _ = writeln!(out, "  • {mode}: {count}");
    }
    let _ = write!(out, "生成时间: {}", stats.generated_at);
    out
}

//! 记忆检索
//!
//! | 方法 | API | 说明 |
//! |------|-----|------|
//! | [`MemorySearcher::search_by_query`] | search | 语义检索 |
//! | [`MemorySearcher::search_by_time_range`] | search / get_all | 有 query 时检索，否则列出 |
//! | [`MemorySearcher::weekly_report`] | get_all + search | 某一周的记忆及相关历史记忆 |
//! | [`MemorySearcher::search_related`] | search | 与给定内容相关的记忆 |
//! | [`MemorySearcher::user_stats`] | get_all × 2 | 总量、近 7 天、按来源统计 |

pub mod filter;

use crate::api::MemoryApi;
use crate::api::types::{ListRequest, MemoryRecord, SearchRequest};
use crate::config::AppConfig;
use crate::error::{ClientError, Result};
use crate::upload::retry::truncate_chars;
use chrono::{Datelike, Days, Local, NaiveDate, Utc};
use serde::Serialize;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

pub use filter::{FilterBuilder, TimeRange, to_iso};

/// 检索 query 的最大字符数
const MAX_QUERY_CHARS: usize = 500;
/// 周报中用于生成相关检索 query 的记忆条数
const WEEKLY_SEED_MEMORIES: usize = 5;
const WEEKLY_RELATED_LIMIT: usize = 20;
/// 统计时单次拉取的最大条数
const STATS_PAGE_SIZE: usize = 1000;
const RECENT_DAYS: u32 = 7;

/// 周报数据
#[derive(Debug, Clone, Serialize)]
pub struct WeeklyReport {
    pub week_start: NaiveDate,
    pub week_end: NaiveDate,
    pub week_memories: Vec<MemoryRecord>,
    pub related_memories: Vec<MemoryRecord>,
    pub summary: ReportSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportSummary {
    pub total_current: usize,
    pub total_related: usize,
}

/// 用户记忆统计
#[derive(Debug, Clone, Serialize)]
pub struct UserStats {
    pub user_id: String,
    pub total_memories: usize,
    pub recent_memories_7d: usize,
    pub sources: BTreeMap<String, usize>,
    pub extract_modes: BTreeMap<String, usize>,
    pub generated_at: String,
}

pub struct MemorySearcher {
    api: Arc<dyn MemoryApi>,
    config: Arc<AppConfig>,
}

impl MemorySearcher {
    pub fn new(config: Arc<AppConfig>, api: Arc<dyn MemoryApi>) -> Self {
        Self { api, config }
    }

    fn user_or_default<'a>(&'a self, user_id: Option<&'a str>) -> &'a str {
        user_id
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .unwrap_or(&self.config.defaults.user_id)
    }

    /// 语义检索；`extra` 作为额外条件并入 `AND`
    pub async fn search_by_query(
        &self,
        query: &str,
        user_id: Option<&str>,
        limit: Option<usize>,
        extra: Option<Value>,
    ) -> Result<Vec<MemoryRecord>> {
        let user_id = self.user_or_default(user_id);
        let filters = FilterBuilder::new()
            .user(user_id)
            .clause(extra.unwrap_or(Value::Null))
            .build();
        let request = SearchRequest {
            query: truncate_query(query),
            filters,
            top_k: self.config.clamp_limit(limit),
        };

        let results = self.api.search(&request).await?;
        info!(
            user_id,
            query = %truncate_chars(&request.query, 50),
            "🔍 找到 {} 条相关记忆",
            results.len()
        );
        Ok(results)
    }

    /// 由 `--days` / `--preset` / 起止日期确定时间范围，优先级依次降低
    pub fn resolve_time_range(
        &self,
        days: Option<u32>,
        preset: Option<&str>,
        start: Option<&str>,
        end: Option<&str>,
    ) -> Result<TimeRange> {
        let days = match (days, preset) {
            (Some(d), _) => Some(d),
            (None, Some(name)) => Some(self.config.time_preset(name).ok_or_else(|| {
                ClientError::Other(format!("Unknown time preset: {name}"))
            })?),
            (None, None) => None,
        };
        match (days, start, end) {
            (Some(d), _, _) => Ok(TimeRange::last_days(d, Utc::now())),
            (None, Some(s), Some(e)) => TimeRange::from_strs(s, e),
            _ => Err(ClientError::Other(
                "Either days_back or both start_date and end_date must be provided".to_string(),
            )),
        }
    }

    /// 时间范围内的记忆；提供 query 时做语义检索，否则列出全部
    pub async fn search_by_time_range(
        &self,
        range: &TimeRange,
        user_id: Option<&str>,
        query: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<MemoryRecord>> {
        let user_id = self.user_or_default(user_id);
        let filters = FilterBuilder::new().user(user_id).created_within(range).build();
        let limit = self.config.clamp_limit(limit);

        let results = match query.map(str::trim).filter(|q| !q.is_empty()) {
            Some(q) => {
                let request = SearchRequest {
                    query: truncate_query(q),
                    filters,
                    top_k: limit,
                };
                self.api.search(&request).await?
            }
            None => {
                let request = ListRequest {
                    filters,
                    page_size: limit,
                };
                self.api.get_all(&request).await?
            }
        };

        info!(
            user_id,
            start = %to_iso(range.start),
            end = %to_iso(range.end),
            count = results.len(),
            "📅 时间范围检索完成"
        );
        Ok(results)
    }

    /// `weeks_back` 周之前那一周（周一至周日）的周报数据
    pub async fn weekly_report(&self, weeks_back: u32, user_id: Option<&str>) -> Result<WeeklyReport> {
        self.weekly_report_for(Local::now().date_naive(), weeks_back, user_id)
            .await
    }

    /// 以 `today` 为基准计算周报，便于测试
    pub async fn weekly_report_for(
        &self,
        today: NaiveDate,
        weeks_back: u32,
        user_id: Option<&str>,
    ) -> Result<WeeklyReport> {
        let offset = u64::from(today.weekday().num_days_from_monday()) + 7 * u64::from(weeks_back);
        let week_start = today
            .checked_sub_days(Days::new(offset))
            .ok_or_else(|| ClientError::Other(format!("weeks_back {weeks_back} out of range")))?;
        let week_end = week_start
            .checked_add_days(Days::new(6))
            .ok_or_else(|| ClientError::Other("week end out of range".to_string()))?;

        let range = TimeRange::from_dates(week_start, week_end)?;
        let week_memories = self
            .search_by_time_range(&range, user_id, None, Some(self.config.search.max_limit))
            .await?;

        let seed = week_memories
            .iter()
            .take(WEEKLY_SEED_MEMORIES)
            .map(|m| m.memory.as_str())
            .collect::<Vec<_>>()
            .join(" ");

        let related_memories = if seed.trim().is_empty() {
            Vec::new()
        } else {
            let extra = json!({"created_at": {"lt": to_iso(range.start)}});
            self.search_by_query(&seed, user_id, Some(WEEKLY_RELATED_LIMIT), Some(extra))
                .await?
        };

        info!(
            %week_start,
            %week_end,
            current = week_memories.len(),
            related = related_memories.len(),
            "📊 周报数据"
        );

        Ok(WeeklyReport {
            week_start,
            week_end,
            summary: ReportSummary {
                total_current: week_memories.len(),
                total_related: related_memories.len(),
            },
            week_memories,
            related_memories,
        })
    }

    /// 与给定内容相关的记忆，可排除某个时间范围
    pub async fn search_related(
        &self,
        content: &str,
        user_id: Option<&str>,
        exclude: Option<&TimeRange>,
        limit: Option<usize>,
    ) -> Result<Vec<MemoryRecord>> {
        let user_id = self.user_or_default(user_id);
        let mut builder = FilterBuilder::new().user(user_id);
        if let Some(range) = exclude {
            builder = builder.exclude_range(range);
        }
        let request = SearchRequest {
            query: truncate_query(content),
            filters: builder.build(),
            top_k: self.config.clamp_limit(limit),
        };

        let results = self.api.search(&request).await?;
        info!(user_id, count = results.len(), "🔗 找到 {} 条相关记忆", results.len());
        Ok(results)
    }

    /// 用户记忆统计：全部记忆与近 7 天记忆并发拉取
    pub async fn user_stats(&self, user_id: Option<&str>) -> Result<UserStats> {
        let user_id = self.user_or_default(user_id).to_string();
        let all_request = ListRequest {
            filters: FilterBuilder::new().user(&user_id).build(),
            page_size: STATS_PAGE_SIZE,
        };
        let recent_range = TimeRange::last_days(RECENT_DAYS, Utc::now());
        let recent_request = ListRequest {
            filters: FilterBuilder::new()
                .user(&user_id)
                .created_within(&recent_range)
                .build(),
            page_size: STATS_PAGE_SIZE,
        };

        let (all, recent) = futures::try_join!(
            self.api.get_all(&all_request),
            self.api.get_all(&recent_request)
        )?;

        let mut sources = BTreeMap::new();
        let mut extract_modes = BTreeMap::new();
        for memory in &all {
            let source = memory.metadata_str("source").unwrap_or("unknown");
            let mode = memory.metadata_str("extract_mode").unwrap_or("unknown");
            *sources.entry(source.to_string()).or_insert(0) += 1;
            *extract_modes.entry(mode.to_string()).or_insert(0) += 1;
        }

        Ok(UserStats {
            user_id,
            total_memories: all.len(),
            recent_memories_7d: recent.len(),
            sources,
            extract_modes,
            generated_at: Local::now().to_rfc3339(),
        })
    }
}

fn truncate_query(query: &str) -> String {
    query.trim().chars().take(MAX_QUERY_CHARS).collect()
}

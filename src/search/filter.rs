//! Mem0 v2 过滤条件
//!
//! ```json
//! {"AND": [{"user_id": "alice"}, {"created_at": {"gte": "2024-01-01T00:00:00Z", "lte": "2024-01-07T23:59:59Z"}}]}
//! ```
//!
//! 时间一律输出完整的 RFC 3339（UTC）时间，不发送仅日期的字符串。

use crate::error::{ConfigError, Result};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, SecondsFormat, TimeZone, Utc};
use serde_json::{Value, json};

/// 闭区间时间范围 `[start, end]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if start > end {
            return Err(ConfigError::InvalidValue {
                field: "time_range".to_string(),
                message: format!("start {} is after end {}", to_iso(start), to_iso(end)),
            }
            .into());
        }
        Ok(Self { start, end })
    }

    /// 截止到 `now` 的最近 `days` 天
    pub fn last_days(days: u32, now: DateTime<Utc>) -> Self {
        Self {
            start: now - Duration::days(i64::from(days)),
            end: now,
        }
    }

    /// 按日期 / 时间字符串构造；`YYYY-MM-DD` 的起点取当天 00:00:00，终点取 23:59:59
    pub fn from_strs(start: &str, end: &str) -> Result<Self> {
        Self::new(parse_bound(start, Bound::Start)?, parse_bound(end, Bound::End)?)
    }

    /// 由日历日期构造整天范围
    pub fn from_dates(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        Self::new(day_start(start), day_end(end))
    }

    pub fn to_value(&self) -> Value {
        json!({"gte": to_iso(self.start), "lte": to_iso(self.end)})
    }
}

#[derive(Clone, Copy)]
enum Bound {
    Start,
    End,
}

fn parse_bound(raw: &str, bound: Bound) -> Result<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| ConfigError::InvalidValue {
        field: "date".to_string(),
        message: format!("'{raw}' is not YYYY-MM-DD or RFC 3339"),
    })?;
    Ok(match bound {
        Bound::Start => day_start(date),
        Bound::End => day_end(date),
    })
}

fn day_start(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}

fn day_end(date: NaiveDate) -> DateTime<Utc> {
    let end = NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN);
    Utc.from_utc_datetime(&date.and_time(end))
}

/// `2024-01-01T00:00:00Z`
pub fn to_iso(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// `{"AND": [...]}` 过滤条件构造器
#[derive(Debug, Clone, Default)]
pub struct FilterBuilder {
    clauses: Vec<Value>,
}

impl FilterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user(mut self, user_id: &str) -> Self {
        self.clauses.push(json!({"user_id": user_id}));
        self
    }

    pub fn created_within(mut self, range: &TimeRange) -> Self {
        self.clauses.push(json!({"created_at": range.to_value()}));
        self
    }

    /// 排除某个时间范围内创建的记忆
    pub fn exclude_range(mut self, range: &TimeRange) -> Self {
        self.clauses
            .push(json!({"NOT": [{"created_at": range.to_value()}]}));
        self
    }

    /// 追加任意条件；`null` 被忽略
    pub fn clause(mut self, clause: Value) -> Self {
        if !clause.is_null() {
            self.clauses.push(clause);
        }
        self
    }

    pub fn build(self) -> Value {
        json!({"AND": self.clauses})
    }
}

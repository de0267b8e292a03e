//! 时间处理工具模块
//!
//! - **存储层**: 目录缓存刷新时间使用 UTC 毫秒时间戳
//! - **业务层**: 评论发布时间为 RFC 3339 字符串，按需解析为 `DateTime<Utc>`
//! - **显示层**: 工单正文里的时间按配置的时区偏移格式化；时区作为值传入，不使用全局状态

use chrono::{DateTime, Duration, FixedOffset, Offset, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// 时区配置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimezoneConfig {
    /// 时区偏移（秒），例如：+08:00 = 28800, -05:00 = -18000
    pub offset_seconds: i32,
}

impl TimezoneConfig {
    /// 创建时区配置（从小时偏移）
    pub fn from_hours(hours: i32) -> Self {
        Self {
            offset_seconds: hours * 3600,
        }
    }

    /// 创建时区配置（从分钟偏移）
    pub fn from_minutes(minutes: i32) -> Self {
        Self {
            offset_seconds: minutes * 60,
        }
    }

    pub fn utc() -> Self {
        Self::default()
    }

    /// 获取 FixedOffset；偏移越界时退回 UTC
    pub fn to_fixed_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.offset_seconds).unwrap_or_else(|| Utc.fix())
    }
}

/// 时间格式化工具
pub struct TimeFormatter;

impl TimeFormatter {
    /// 格式化为标准日期时间字符串 "YYYY-MM-DD HH:MM:SS ±HH:MM"
    pub fn format_standard(dt: DateTime<Utc>, tz: TimezoneConfig) -> String {
        dt.with_timezone(&tz.to_fixed_offset())
            .format("%Y-%m-%d %H:%M:%S %:z")
            .to_string()
    }
}

/// 解析 RFC 3339 时间为 UTC
pub fn parse_rfc3339_utc(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// 本轮同步的截止时间：`now - lookback`
pub fn cutoff(now: DateTime<Utc>, lookback: std::time::Duration) -> DateTime<Utc> {
    let lookback = Duration::from_std(lookback).unwrap_or_else(|_| Duration::days(36500));
    now.checked_sub_signed(lookback).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// UTC 毫秒时间戳转 DateTime
pub fn from_millis(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rfc3339_utc() {
        let dt = parse_rfc3339_utc("2024-05-01T10:00:00Z").unwrap();
        assert_eq!(dt.timestamp(), 1714557600);

        let shifted = parse_rfc3339_utc("2024-05-01T18:00:00+08:00").unwrap();
        assert_eq!(shifted, dt);

        assert!(parse_rfc3339_utc("").is_none());
        assert!(parse_rfc3339_utc("2024-13-01T00:00:00Z").is_none());
        assert!(parse_rfc3339_utc("not a date").is_none());
    }

    #[test]
    fn test_cutoff() {
        let now = parse_rfc3339_utc("2024-05-02T10:00:00Z").unwrap();
        let c = cutoff(now, std::time::Duration::from_secs(24 * 3600));
        assert_eq!(c, parse_rfc3339_utc("2024-05-01T10:00:00Z").unwrap());
    }

    #[test]
    fn test_format_standard_with_offset() {
        let dt = parse_rfc3339_utc("2024-05-01T10:00:00Z").unwrap();
        assert_eq!(
            TimeFormatter::format_standard(dt, TimezoneConfig::utc()),
            "2024-05-01 10:00:00 +00:00"
        );
        assert_eq!(
            TimeFormatter::format_standard(dt, TimezoneConfig::from_hours(8)),
            "2024-05-01 18:00:00 +08:00"
        );
        assert_eq!(
            TimeFormatter::format_standard(dt, TimezoneConfig::from_minutes(-300)),
            "2024-05-01 05:00:00 -05:00"
        );
    }

    #[test]
    fn test_out_of_range_offset_falls_back_to_utc() {
        let tz = TimezoneConfig { offset_seconds: 999_999 };
        assert_eq!(tz.to_fixed_offset().local_minus_utc(), 0);
    }

    #[test]
    fn test_from_millis_roundtrip() {
        let dt = parse_rfc3339_utc("2024-05-01T10:00:00Z").unwrap();
        assert_eq!(from_millis(dt.timestamp_millis()), Some(dt));
    }
}

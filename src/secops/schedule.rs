//! 调度表达式解析
//!
//! 只支持 `<整数><单位>`，单位为 `s` / `m` / `h`。cron 形状的配置值、空串、未知单位、
//! 非法或非正整数一律回退到默认间隔（30 分钟）。超过 [`MAX_INTERVAL`] 的值同样回退，
//! 否则 `Instant + interval` 会溢出。

use std::time::Duration;

/// 默认调度间隔：30 分钟
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// 可接受的最大间隔：100 年
pub const MAX_INTERVAL: Duration = Duration::from_secs(100 * 365 * 24 * 3600);

/// 解析调度表达式，失败时返回 [`DEFAULT_INTERVAL`]
pub fn parse_schedule(expr: &str) -> Duration {
    try_parse_schedule(expr).unwrap_or(DEFAULT_INTERVAL)
}

/// 严格解析，无法识别时返回 None
pub fn try_parse_schedule(expr: &str) -> Option<Duration> {
    let expr = expr.trim();
    let unit_secs: u64 = match expr.chars().last()? {
        's' => 1,
        'm' => 60,
        'h' => 3600,
        _ => return None,
    };
    // 单位是 ASCII，去掉末字节即为数字部分
    let count: u64 = expr[..expr.len() - 1].parse().ok()?;
    if count == 0 {
        return None;
    }
    count
        .checked_mul(unit_secs)
        .map(Duration::from_secs)
        .filter(|d| *d <= MAX_INTERVAL)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_units() {
        assert_eq!(parse_schedule("45m"), Duration::from_secs(45 * 60));
        assert_eq!(parse_schedule("2h"), Duration::from_secs(2 * 3600));
        assert_eq!(parse_schedule("90s"), Duration::from_secs(90));
    }

    #[test]
    fn test_every_positive_count_scales_exactly() {
        for n in [1u64, 7, 59, 600] {
            assert_eq!(parse_schedule(&format!("{n}s")), Duration::from_secs(n));
            assert_eq!(parse_schedule(&format!("{n}m")), Duration::from_secs(n * 60));
            assert_eq!(parse_schedule(&format!("{n}h")), Duration::from_secs(n * 3600));
        }
    }

    #[test]
    fn test_fallbacks() {
        for expr in [
            "",
            "abc",
            "m",
            "0m",
            "-5m",
            "10d",
            "1.5h",
            "*/30 * * * *",
            "30",
            "5 m",
            "时m",
        ] {
            assert_eq!(parse_schedule(expr), DEFAULT_INTERVAL, "expr {expr:?}");
        }
    }

    #[test]
    fn test_overflow_falls_back() {
        assert_eq!(parse_schedule(&format!("{}h", u64::MAX)), DEFAULT_INTERVAL);
        assert_eq!(parse_schedule("5000000000000000h"), DEFAULT_INTERVAL);
    }

    #[test]
    fn test_upper_bound() {
        assert_eq!(parse_schedule("876000h"), MAX_INTERVAL);
        assert_eq!(parse_schedule("876001h"), DEFAULT_INTERVAL);
        assert!(try_parse_schedule("876001h").is_none());
    }
}

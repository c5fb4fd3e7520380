//! Cron 调度规格模块
//! Cron schedule spec module
//!
//! 在 `cron` crate 之上封装了回放核心需要的三个操作：
//! Wraps the `cron` crate with the three operations the replay core needs:
//! 下一个触发点、上一个触发点、闭区间内的全部预期触发点。
//! next occurrence, previous occurrence, and all expected occurrences within
//! a closed interval.

use crate::error::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use cron::Schedule;
use std::str::FromStr;

/// 解析后的 cron 调度规格
/// A parsed cron schedule spec
///
/// 接受标准五字段表达式；`cron` crate 需要秒字段，五字段表达式会自动补零。
/// Accepts standard five-field expressions; the `cron` crate requires a
/// seconds field, so five-field expressions are zero-padded automatically.
#[derive(Debug, Clone)]
pub struct ScheduleSpec {
  schedule: Schedule,
  source: String,
}

impl ScheduleSpec {
  /// 解析 cron 表达式
  /// Parse a cron expression
  pub fn parse(interval: &str) -> Result<Self> {
    let interval = interval.trim();
    if interval.is_empty() {
      return Err(Error::invalid_input("cron schedule is empty"));
    }

    let normalized = if interval.split_whitespace().count() == 5 {
      format!("0 {interval}")
    } else {
      interval.to_string()
    };

    let schedule = Schedule::from_str(&normalized).map_err(|e| {
      Error::invalid_input(format!("unable to parse cron schedule \"{interval}\": {e}"))
    })?;

    Ok(Self {
      schedule,
      source: interval.to_string(),
    })
  }

  /// 原始表达式
  /// The original expression
  pub fn source(&self) -> &str {
    &self.source
  }

  /// 严格晚于 at 的下一个触发点
  /// The next occurrence strictly after `at`
  pub fn next_after(&self, at: DateTime<Utc>) -> Option<DateTime<Utc>> {
    self.schedule.after(&at).next()
  }

  /// 严格早于 at 的上一个触发点
  /// The previous occurrence strictly before `at`
  ///
  /// 逐步扩大回看窗口直到找到触发点；四年内无触发点则视为不存在。
  /// Widens the lookback window until an occurrence is found; none within
  /// four years counts as absent.
  pub fn prev_before(&self, at: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let max_lookback = Duration::days(366 * 4);
    let mut lookback = Duration::hours(1);
    loop {
      let from = at - lookback;
      let mut last = None;
      for occurrence in self.schedule.after(&from) {
        if occurrence >= at {
          break;
        }
        last = Some(occurrence);
      }
      if last.is_some() {
        return last;
      }
      if lookback >= max_lookback {
        return None;
      }
      lookback = lookback * 24;
    }
  }

  /// 闭区间 [start, end] 内的全部预期触发点，升序
  /// All expected occurrences within the closed interval [start, end], ascending
  pub fn expected_runs_between(
    &self,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
  ) -> Vec<DateTime<Utc>> {
    if end < start {
      return vec![];
    }
    // after 是严格大于语义，起点回退一纳秒以包含 start 本身
    // `after` is strictly-greater, step back one nanosecond to include start itself
    let from = start - Duration::nanoseconds(1);
    self
      .schedule
      .after(&from)
      .take_while(|occurrence| *occurrence <= end)
      .collect()
  }
}

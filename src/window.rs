//! 时间窗口模块
//! Time window module
//!
//! 根据窗口配置和逻辑执行时间推导半开区间 [start, end)
//! Derives the half-open interval [start, end) from a window config and a
//! logical execution time
//!
//! 解析器是纯函数：相同输入永远产生相同输出。
//! The resolver is pure: identical inputs always yield identical outputs.

use crate::error::{Error, Result};
use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// 窗口配置：大小、偏移与截断单位
/// Window configuration: size, shift and truncation unit
///
/// size 与 shift 使用带单位的时长字符串（"24h"、"1h30m"、"-2h"），
/// truncate_to 取 "h"、"d"、"w"、"M" 或空。
/// size and shift are unit-suffixed duration strings ("24h", "1h30m", "-2h"),
/// truncate_to is one of "h", "d", "w", "M" or empty.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WindowConfig {
  pub size: String,
  pub shift: String,
  pub truncate_to: String,
}

impl WindowConfig {
  pub fn new<S1, S2, S3>(size: S1, shift: S2, truncate_to: S3) -> Self
  where
    S1: Into<String>,
    S2: Into<String>,
    S3: Into<String>,
  {
    Self {
      size: size.into(),
      shift: shift.into(),
      truncate_to: truncate_to.into(),
    }
  }
}

/// 半开时间区间 [start, end)
/// Half-open time interval [start, end)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
  pub start: DateTime<Utc>,
  pub end: DateTime<Utc>,
}

/// 时间窗口解析器
/// Time window resolver
#[derive(Debug, Clone)]
pub struct Window {
  config: WindowConfig,
}

impl Window {
  pub fn from_config(config: &WindowConfig) -> Self {
    Self {
      config: config.clone(),
    }
  }

  /// 计算给定调度时间对应的窗口区间
  /// Compute the window interval for the given schedule time
  ///
  /// end = truncate(scheduled_at) + shift，start = end - size。
  /// end = truncate(scheduled_at) + shift, start = end - size.
  pub fn get_interval(&self, scheduled_at: DateTime<Utc>) -> Result<Interval> {
    let size = parse_duration(&self.config.size).map_err(|e| {
      Error::InvalidWindow(format!(
        "failed to parse task window with size {}: {}",
        self.config.size, e
      ))
    })?;

    let shift = if self.config.shift.is_empty() {
      Duration::zero()
    } else {
      parse_duration(&self.config.shift).map_err(|e| {
        Error::InvalidWindow(format!(
          "failed to parse task window with shift {}: {}",
          self.config.shift, e
        ))
      })?
    };

    let end = truncate(scheduled_at, &self.config.truncate_to)? + shift;
    let start = end - size;
    Ok(Interval { start, end })
  }
}

/// 将时间截断到指定单位的边界
/// Truncate a time down to the boundary of the given unit
fn truncate(at: DateTime<Utc>, unit: &str) -> Result<DateTime<Utc>> {
  let day_start = |date: chrono::NaiveDate| {
    Utc
      .with_ymd_and_hms(date.year(), date.month(), date.day(), 0, 0, 0)
      .unwrap()
  };

  match unit {
    "" | "none" => Ok(at),
    "h" => Ok(
      Utc
        .with_ymd_and_hms(at.year(), at.month(), at.day(), at.hour(), 0, 0)
        .unwrap(),
    ),
    "d" => Ok(day_start(at.date_naive())),
    // 周一作为一周的起点
    // Monday is the start of the week
    "w" => {
      let days_from_monday = at.weekday().num_days_from_monday() as i64;
      Ok(day_start(at.date_naive()) - Duration::days(days_from_monday))
    }
    "M" => Ok(
      Utc
        .with_ymd_and_hms(at.year(), at.month(), 1, 0, 0, 0)
        .unwrap(),
    ),
    other => Err(Error::InvalidWindow(format!(
      "failed to parse task window with truncate_to {other}: unknown truncate unit"
    ))),
  }
}

/// 解析带单位的时长字符串，如 "24h"、"1h30m"、"-2h"
/// Parse a unit-suffixed duration string such as "24h", "1h30m" or "-2h"
///
/// 支持的单位：ns、us、ms、s、m、h。裸数字（如 "2"）视为缺少单位。
/// Supported units: ns, us, ms, s, m, h. A bare number (like "2") is missing
/// its unit.
fn parse_duration(input: &str) -> std::result::Result<Duration, String> {
  if input.is_empty() {
    return Err(format!("invalid duration \"{input}\""));
  }

  let mut rest = input;
  let negative = match rest.as_bytes().first() {
    Some(b'-') => {
      rest = &rest[1..];
      true
    }
    Some(b'+') => {
      rest = &rest[1..];
      false
    }
    _ => false,
  };
  if rest.is_empty() {
    return Err(format!("invalid duration \"{input}\""));
  }

  let mut total = Duration::zero();
  while !rest.is_empty() {
    let digits_len = rest.bytes().take_while(|b| b.is_ascii_digit()).count();
    if digits_len == 0 {
      return Err(format!("invalid duration \"{input}\""));
    }
    let value: i64 = rest[..digits_len]
      .parse()
      .map_err(|_| format!("invalid duration \"{input}\""))?;
    rest = &rest[digits_len..];

    let unit_len = rest
      .bytes()
      .take_while(|b| !b.is_ascii_digit())
      .count();
    if unit_len == 0 {
      return Err(format!("missing unit in duration \"{input}\""));
    }
    let unit = &rest[..unit_len];
    rest = &rest[unit_len..];

    let component = match unit {
      "ns" => Duration::nanoseconds(value),
      "us" => Duration::microseconds(value),
      "ms" => Duration::milliseconds(value),
      "s" => Duration::seconds(value),
      "m" => Duration::minutes(value),
      "h" => Duration::hours(value),
      _ => {
        return Err(format!("unknown unit \"{unit}\" in duration \"{input}\""));
      }
    };
    total = total + component;
  }

  if negative {
    total = -total;
  }
  Ok(total)
}

//! 配置模块
//! Configuration module
//!
//! 回放子系统的运行配置
//! Runtime configuration of the replay subsystem

use crate::base::constants::DEFAULT_REPLAY_TIMEOUT;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 回放子系统配置
/// Replay subsystem configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayConfig {
  /// 单个回放请求从创建起的处理时限，超时标记为失败
  /// Processing bound for one replay request measured from creation,
  /// exceeding it marks the replay failed
  #[serde(default = "default_replay_timeout")]
  pub replay_timeout: Duration,

  /// 调度循环的轮询间隔
  /// Poll interval of the dispatch loop
  #[serde(default = "default_poll_interval")]
  pub poll_interval: Duration,

  /// 并发工作器数量上限
  /// Upper bound on concurrent workers
  #[serde(default = "default_worker_pool_size")]
  pub worker_pool_size: usize,
}

fn default_replay_timeout() -> Duration {
  DEFAULT_REPLAY_TIMEOUT
}

fn default_poll_interval() -> Duration {
  Duration::from_secs(5)
}

fn default_worker_pool_size() -> usize {
  10
}

impl Default for ReplayConfig {
  fn default() -> Self {
    Self {
      replay_timeout: default_replay_timeout(),
      poll_interval: default_poll_interval(),
      worker_pool_size: default_worker_pool_size(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults() {
    let config = ReplayConfig::default();
    assert_eq!(config.replay_timeout, Duration::from_secs(3 * 60 * 60));
    assert_eq!(config.poll_interval, Duration::from_secs(5));
    assert_eq!(config.worker_pool_size, 10);
  }

  #[test]
  fn test_deserialize_applies_defaults() {
    let config: ReplayConfig = serde_json::from_str("{}").unwrap();
    assert_eq!(config.replay_timeout, Duration::from_secs(10800));
  }
}

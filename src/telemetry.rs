//! 遥测模块
//! Telemetry module
//!
//! 进程内的带标签计数器注册表
//! In-process registry of label-tagged counters
//!
//! 每次回放状态迁移都会递增一个按 {project, namespace, job, status}
//! 打标签的计数器；测试可以读取计数值进行断言。
//! Every replay state transition increments a counter tagged with
//! {project, namespace, job, status}; tests can read counter values back for
//! assertions.

use crate::job::JobName;
use crate::replay::ReplayState;
use crate::tenant::Tenant;
use std::collections::HashMap;
use std::sync::{OnceLock, RwLock};

/// 回放状态迁移计数器名称
/// Counter name for replay state transitions
pub const METRIC_JOB_REPLAY: &str = "jobrun_replay_total";

fn registry() -> &'static RwLock<HashMap<String, u64>> {
  static REGISTRY: OnceLock<RwLock<HashMap<String, u64>>> = OnceLock::new();
  REGISTRY.get_or_init(|| RwLock::new(HashMap::new()))
}

/// 标签按名称排序后拼入键，保证同一标签集合落在同一个计数器上
/// Labels are sorted by name into the key so the same label set always lands
/// on the same counter
fn counter_key(name: &str, labels: &[(&str, &str)]) -> String {
  let mut sorted: Vec<&(&str, &str)> = labels.iter().collect();
  sorted.sort();
  let mut key = String::from(name);
  for (label, value) in sorted {
    key.push(',');
    key.push_str(label);
    key.push('=');
    key.push_str(value);
  }
  key
}

/// 递增计数器
/// Increment a counter
pub fn increment_counter(name: &str, labels: &[(&str, &str)]) {
  let key = counter_key(name, labels);
  let mut counters = registry().write().unwrap();
  *counters.entry(key).or_insert(0) += 1;
}

/// 读取计数器当前值，不存在时为零
/// Read the current counter value, zero when absent
pub fn counter_value(name: &str, labels: &[(&str, &str)]) -> u64 {
  let key = counter_key(name, labels);
  let counters = registry().read().unwrap();
  counters.get(&key).copied().unwrap_or(0)
}

/// 上报一次回放状态迁移
/// Report one replay state transition
pub fn raise_replay_metric(tenant: &Tenant, job_name: &JobName, state: ReplayState) {
  tracing::debug!(
    project = tenant.project_name().as_str(),
    namespace = tenant.namespace_name().as_str(),
    job = job_name.as_str(),
    status = state.as_str(),
    "replay state transition"
  );
  increment_counter(
    METRIC_JOB_REPLAY,
    &[
      ("project", tenant.project_name().as_str()),
      ("namespace", tenant.namespace_name().as_str()),
      ("job", job_name.as_str()),
      ("status", state.as_str()),
    ],
  );
}

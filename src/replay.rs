//! 回放模块
//! Replay module
//!
//! 定义了回放请求、回放状态、运行状态以及运行状态列表的辅助函数
//! Defines replay requests, replay states, run states and helpers over run
//! status lists
//!
//! 一个回放是对某作业在 [start_time, end_time] 区间内全部调度点的重放请求；
//! 其 Runs 向量对每个 cron 预期调度点恰好持有一个条目。
//! A replay is a request to re-execute every schedule point of a job within
//! [start_time, end_time]; its run vector holds exactly one entry per
//! cron-expected point.

use crate::cronspec::ScheduleSpec;
use crate::job::JobName;
use crate::tenant::Tenant;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// 回放请求的生命周期状态
/// Lifecycle state of a replay request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReplayState {
  /// 刚创建，尚未被工作器处理
  /// Just created, not yet picked up by a worker
  Created,
  /// 顺序模式下部分运行已提交
  /// Some runs dispatched in sequential mode
  PartialReplayed,
  /// 全部运行已提交，等待结果
  /// All runs dispatched, awaiting outcomes
  Replayed,
  /// 所有运行成功，终态
  /// Every run succeeded, terminal
  Success,
  /// 存在失败或处理出错，终态
  /// A run failed or processing errored, terminal
  Failed,
}

impl ReplayState {
  /// 将回放状态转换为字符串
  /// Convert the replay state to a string
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Created => "created",
      Self::PartialReplayed => "in progress",
      Self::Replayed => "replayed",
      Self::Success => "success",
      Self::Failed => "failed",
    }
  }

  /// 终态不再被任何工作器修改
  /// Terminal states are never mutated by any worker again
  pub fn is_terminal(&self) -> bool {
    matches!(self, Self::Success | Self::Failed)
  }

  /// 非终态集合，调度循环用它来挑选候选回放
  /// The non-terminal set, used by the dispatch loop to select candidates
  pub fn non_terminal() -> [ReplayState; 3] {
    [Self::Created, Self::PartialReplayed, Self::Replayed]
  }
}

/// 单个调度点运行的状态
/// State of a single scheduled run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunState {
  Pending,
  InProgress,
  Success,
  Failed,
  /// 调度器上不存在对应运行
  /// No corresponding run exists on the scheduler
  Missing,
}

impl RunState {
  /// 将运行状态转换为字符串
  /// Convert the run state to a string
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Pending => "pending",
      Self::InProgress => "in_progress",
      Self::Success => "success",
      Self::Failed => "failed",
      Self::Missing => "missing",
    }
  }
}

/// 某个调度点的运行状态
/// Run status at one schedule point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRunStatus {
  pub scheduled_at: DateTime<Utc>,
  pub state: RunState,
}

impl JobRunStatus {
  pub fn new(scheduled_at: DateTime<Utc>, state: RunState) -> Self {
    Self {
      scheduled_at,
      state,
    }
  }

  /// 该运行的逻辑时间：调度点之前最近的一个 cron 触发点
  /// Logical time of the run: the nearest cron occurrence before the
  /// schedule point
  ///
  /// 外部调度器以逻辑时间标识运行，与挂钟启动时间不同。
  /// The external scheduler identifies runs by logical time, distinct from
  /// the wall-clock start time.
  pub fn logical_time(&self, job_cron: &ScheduleSpec) -> DateTime<Utc> {
    job_cron
      .prev_before(self.scheduled_at)
      .unwrap_or(self.scheduled_at)
  }
}

/// 回放请求的配置
/// Configuration of a replay request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayConfig {
  pub start_time: DateTime<Utc>,
  pub end_time: DateTime<Utc>,
  /// 并行模式整批清理后并发重建；顺序模式一次只推进一个运行
  /// Parallel mode batch-clears then recreates concurrently; sequential mode
  /// advances one run at a time
  pub parallel: bool,
  /// 覆盖作业配置的键值对
  /// Key-value overrides applied on top of the job configuration
  pub job_config: HashMap<String, String>,
  pub description: String,
}

impl ReplayConfig {
  pub fn new(start_time: DateTime<Utc>, end_time: DateTime<Utc>, parallel: bool) -> Self {
    Self {
      start_time,
      end_time,
      parallel,
      job_config: HashMap::new(),
      description: String::new(),
    }
  }
}

/// 回放请求记录
/// A replay request record
#[derive(Debug, Clone)]
pub struct Replay {
  id: Uuid,
  tenant: Tenant,
  job_name: JobName,
  config: ReplayConfig,
  state: ReplayState,
  message: String,
  created_at: DateTime<Utc>,
}

impl Replay {
  pub fn new(
    id: Uuid,
    tenant: Tenant,
    job_name: JobName,
    config: ReplayConfig,
    state: ReplayState,
    message: String,
    created_at: DateTime<Utc>,
  ) -> Self {
    Self {
      id,
      tenant,
      job_name,
      config,
      state,
      message,
      created_at,
    }
  }

  pub fn id(&self) -> Uuid {
    self.id
  }

  pub fn tenant(&self) -> &Tenant {
    &self.tenant
  }

  pub fn job_name(&self) -> &JobName {
    &self.job_name
  }

  pub fn config(&self) -> &ReplayConfig {
    &self.config
  }

  pub fn state(&self) -> ReplayState {
    self.state
  }

  pub fn message(&self) -> &str {
    &self.message
  }

  pub fn created_at(&self) -> DateTime<Utc> {
    self.created_at
  }

  /// 更新状态与消息，仅供仓储实现使用
  /// Update state and message, for repository implementations only
  pub fn set_state<S: Into<String>>(&mut self, state: ReplayState, message: S) {
    self.state = state;
    self.message = message.into();
  }
}

/// 回放请求及其运行向量
/// A replay request together with its run vector
#[derive(Debug, Clone)]
pub struct ReplayWithRun {
  pub replay: Replay,
  pub runs: Vec<JobRunStatus>,
}

impl ReplayWithRun {
  /// 最早的待执行（pending）运行
  /// The earliest pending run
  pub fn first_executable_run(&self) -> Option<JobRunStatus> {
    sorted_runs_by_states(&self.runs, &[RunState::Pending])
      .first()
      .copied()
  }

  /// 最晚的待执行（pending）运行
  /// The latest pending run
  pub fn last_executable_run(&self) -> Option<JobRunStatus> {
    sorted_runs_by_states(&self.runs, &[RunState::Pending])
      .last()
      .copied()
  }
}

/// 以 UTC 调度时间为键的运行状态映射
/// Run status map keyed by the UTC schedule time
pub fn run_status_map(runs: &[JobRunStatus]) -> HashMap<DateTime<Utc>, RunState> {
  runs.iter().map(|r| (r.scheduled_at, r.state)).collect()
}

/// 将更新映射合并到现有运行列表上，保持原有顺序
/// Merge an update map over an existing run list, preserving order
pub fn merge_with_updated_runs(
  runs: &[JobRunStatus],
  updated: &HashMap<DateTime<Utc>, RunState>,
) -> Vec<JobRunStatus> {
  runs
    .iter()
    .map(|run| match updated.get(&run.scheduled_at) {
      Some(state) => JobRunStatus::new(run.scheduled_at, *state),
      None => *run,
    })
    .collect()
}

/// 过滤出指定状态的运行并按调度时间升序排序
/// Filter runs by the given states and sort ascending by schedule time
///
/// 排序是稳定的：相同时刻（cron 语义下不会出现）退回插入顺序。
/// The sort is stable: equal instants (impossible under cron semantics)
/// fall back to insertion order.
pub fn sorted_runs_by_states(runs: &[JobRunStatus], states: &[RunState]) -> Vec<JobRunStatus> {
  let mut filtered: Vec<JobRunStatus> = runs
    .iter()
    .filter(|r| states.contains(&r.state))
    .copied()
    .collect();
  filtered.sort_by_key(|r| r.scheduled_at);
  filtered
}

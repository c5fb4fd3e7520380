//! 内存仓储实现
//! In-memory repository implementation
//!
//! 使用内存数据结构实现回放记录的存储与管理，不依赖任何外部服务
//! Implements replay record storage and management using in-memory data
//! structures without any external service dependencies
//!
//! 单把读写锁让状态与运行向量总是一起改变，满足原子更新契约。
//! A single RwLock makes the state and the run vector always change
//! together, satisfying the atomic update contract.

use crate::base::ReplayRepository;
use crate::cronspec::ScheduleSpec;
use crate::error::{Error, Result};
use crate::job::JobName;
use crate::replay::{JobRunStatus, Replay, ReplayConfig, ReplayState, ReplayWithRun, RunState};
use crate::tenant::Tenant;
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// 存储中的一条回放记录
/// One stored replay record
#[derive(Debug, Clone)]
struct StoredReplay {
  replay: Replay,
  runs: Vec<JobRunStatus>,
}

/// 内存回放仓储
/// In-memory replay repository
#[derive(Default)]
pub struct MemoryReplayRepository {
  store: RwLock<Vec<StoredReplay>>,
}

impl MemoryReplayRepository {
  /// 创建新的内存仓储
  /// Create a new in-memory repository
  pub fn new() -> Self {
    Self {
      store: RwLock::new(Vec::new()),
    }
  }

  /// 写入一条新的回放请求，状态为 created
  /// Persist a new replay request in the created state
  ///
  /// 运行向量按 cron 展开：[start_time, end_time] 内每个预期调度点
  /// 恰好一个 pending 条目。
  /// The run vector expands over cron: exactly one pending entry per
  /// expected schedule point within [start_time, end_time].
  pub async fn create_replay(
    &self,
    tenant: Tenant,
    job_name: JobName,
    config: ReplayConfig,
    job_cron: &ScheduleSpec,
  ) -> Result<Uuid> {
    let runs: Vec<JobRunStatus> = job_cron
      .expected_runs_between(config.start_time, config.end_time)
      .into_iter()
      .map(|scheduled_at| JobRunStatus::new(scheduled_at, RunState::Pending))
      .collect();

    let id = Uuid::new_v4();
    let replay = Replay::new(
      id,
      tenant,
      job_name,
      config,
      ReplayState::Created,
      String::new(),
      Utc::now(),
    );

    let mut store = self.store.write().await;
    store.push(StoredReplay { replay, runs });
    Ok(id)
  }

  /// 按 ID 读取回放记录
  /// Read a replay record by id
  pub async fn get_replay_by_id(&self, id: Uuid) -> Result<ReplayWithRun> {
    let store = self.store.read().await;
    store
      .iter()
      .find(|stored| stored.replay.id() == id)
      .map(|stored| ReplayWithRun {
        replay: stored.replay.clone(),
        runs: stored.runs.clone(),
      })
      .ok_or_else(|| Error::not_found("replay", format!("no replay with id {id}")))
  }
}

#[async_trait]
impl ReplayRepository for MemoryReplayRepository {
  async fn get_replay_to_execute(&self) -> Result<Option<ReplayWithRun>> {
    let store = self.store.read().await;
    let candidate = store
      .iter()
      .filter(|stored| !stored.replay.state().is_terminal())
      .min_by_key(|stored| stored.replay.created_at());
    Ok(candidate.map(|stored| ReplayWithRun {
      replay: stored.replay.clone(),
      runs: stored.runs.clone(),
    }))
  }

  async fn get_replay_requests_by_status(
    &self,
    states: &[ReplayState],
  ) -> Result<Vec<ReplayWithRun>> {
    let store = self.store.read().await;
    Ok(
      store
        .iter()
        .filter(|stored| states.contains(&stored.replay.state()))
        .map(|stored| ReplayWithRun {
          replay: stored.replay.clone(),
          runs: stored.runs.clone(),
        })
        .collect(),
    )
  }

  async fn update_replay(
    &self,
    id: Uuid,
    state: ReplayState,
    runs: &[JobRunStatus],
    message: &str,
  ) -> Result<()> {
    let mut store = self.store.write().await;
    let stored = store
      .iter_mut()
      .find(|stored| stored.replay.id() == id)
      .ok_or_else(|| Error::not_found("replay", format!("no replay with id {id}")))?;

    // 状态与运行向量在同一把写锁下一起落盘
    // State and run vector land together under the same write lock
    stored.replay.set_state(state, message);
    stored.runs = runs.to_vec();
    Ok(())
  }

  async fn update_replay_status(&self, id: Uuid, state: ReplayState, message: &str) -> Result<()> {
    let mut store = self.store.write().await;
    let stored = store
      .iter_mut()
      .find(|stored| stored.replay.id() == id)
      .ok_or_else(|| Error::not_found("replay", format!("no replay with id {id}")))?;
    stored.replay.set_state(state, message);
    Ok(())
  }
}

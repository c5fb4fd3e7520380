//! 外部接口模块
//! External interface module
//!
//! 定义了回放核心与外部协作者之间的抽象层：
//! Defines the abstraction layer between the replay core and its external
//! collaborators:
//! 外部工作流调度器的客户端契约，以及回放记录的持久化仓储。
//! the wire-level contract with the external workflow scheduler, and the
//! persistence repository for replay records.

use crate::cronspec::ScheduleSpec;
use crate::error::Result;
use crate::job::JobName;
use crate::replay::{JobRunStatus, ReplayState, ReplayWithRun};
use crate::tenant::Tenant;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub mod constants;

/// 运行查询条件
/// Run query criteria
#[derive(Debug, Clone)]
pub struct JobRunsCriteria {
  pub job_name: String,
  pub start_date: DateTime<Utc>,
  pub end_date: DateTime<Utc>,
}

/// 调度器客户端特性，定义了与外部工作流调度器交互的接口
/// Scheduler client trait, defines the interface for interacting with the
/// external workflow scheduler
///
/// 每个操作都必须是幂等安全的：
/// Every operation must be idempotency-safe:
/// 重复创建同一运行在调度器侧是空操作，清理不存在的运行以未找到错误失败，
/// creating the same run twice is a no-op at the scheduler, clearing an
/// absent run fails with a recognizable not found error,
/// 调用方据此回退到创建。
/// on which the caller falls back to create.
#[async_trait]
pub trait ReplayScheduler: Send + Sync {
  /// 以给定逻辑时间创建一个运行，运行 ID 前缀标记发起方
  /// Create a run at the given logical time, the run id prefix marks the initiator
  async fn create_run(
    &self,
    tenant: &Tenant,
    job_name: &JobName,
    logical_time: DateTime<Utc>,
    dag_run_id_prefix: &str,
  ) -> Result<()>;

  /// 重置单个已存在的运行
  /// Reset one existing run
  async fn clear(
    &self,
    tenant: &Tenant,
    job_name: &JobName,
    logical_time: DateTime<Utc>,
  ) -> Result<()>;

  /// 清理闭区间内所有已存在的运行
  /// Clear every existing run within the closed interval
  async fn clear_batch(
    &self,
    tenant: &Tenant,
    job_name: &JobName,
    start_logical_time: DateTime<Utc>,
    end_logical_time: DateTime<Utc>,
  ) -> Result<()>;

  /// 查询符合条件的运行状态
  /// Fetch run statuses matching the criteria
  async fn get_job_runs(
    &self,
    tenant: &Tenant,
    criteria: &JobRunsCriteria,
    job_cron: &ScheduleSpec,
  ) -> Result<Vec<JobRunStatus>>;
}

/// 回放仓储特性，定义了回放记录及其运行向量的持久化接口
/// Replay repository trait, defines persistence for replay records and their
/// run vectors
///
/// 仓储是回放状态的唯一串行化点。
/// The repository is the sole serialisation point for replay state.
#[async_trait]
pub trait ReplayRepository: Send + Sync {
  /// 取一个待执行的非终态回放
  /// Fetch one non-terminal replay awaiting execution
  async fn get_replay_to_execute(&self) -> Result<Option<ReplayWithRun>>;

  /// 按状态集合查询回放请求
  /// Fetch replay requests by state set
  async fn get_replay_requests_by_status(
    &self,
    states: &[ReplayState],
  ) -> Result<Vec<ReplayWithRun>>;

  /// 原子地写入状态与运行向量：两者要么一起改变要么都不变
  /// Atomically persist state and run vector: both change together or not at all
  async fn update_replay(
    &self,
    id: Uuid,
    state: ReplayState,
    runs: &[JobRunStatus],
    message: &str,
  ) -> Result<()>;

  /// 仅更新状态与消息
  /// Update state and message only
  async fn update_replay_status(&self, id: Uuid, state: ReplayState, message: &str) -> Result<()>;
}

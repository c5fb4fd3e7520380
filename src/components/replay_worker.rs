//! 回放工作器模块
//! Replay worker module
//!
//! 状态机驱动的回放核对器：一次调用把一个回放请求推进一个 tick
//! State-machine driven replay reconciler: one invocation advances one
//! replay request by one tick
//!
//! ## 状态机
//! ## State machine
//!
//! ```text
//! created ──► replayed          （并行，或运行数 ≤ 1）
//!         └─► partial replayed  （顺序且运行数 > 1）
//!
//! partial replayed ──► partial replayed （仍有 pending 运行）
//!                  └─► replayed          （pending 清空）
//!
//! replayed ──► success   （无 in_progress 且无 failed）
//!          └─► failed    （无 in_progress 且 ≥1 failed）
//!          └─► replayed  （仍有 in_progress）
//!
//! 任意状态 ──► failed    （不可恢复错误，持久化错误消息）
//! ```
//!
//! 同一回放的 tick 严格串行：上一个 tick 的仓储写入可见后，下一个 tick
//! 才会开始。串行化由调度循环中按回放 ID 的互斥保证。
//! Ticks of one replay are strictly serialised: a tick's repository write is
//! visible before the next tick begins, enforced by the dispatch loop's
//! per-replay exclusion.

use crate::base::constants::PREFIX_REPLAYED;
use crate::base::{JobRunsCriteria, ReplayRepository, ReplayScheduler};
use crate::config::ReplayConfig;
use crate::cronspec::ScheduleSpec;
use crate::error::{Error, Result};
use crate::job::{JobName, JobRepository};
use crate::replay::{
  merge_with_updated_runs, run_status_map, sorted_runs_by_states, JobRunStatus, ReplayState,
  ReplayWithRun, RunState,
};
use crate::telemetry::raise_replay_metric;
use crate::tenant::Tenant;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// 回放工作器
/// Replay worker
pub struct ReplayWorker {
  replay_repo: Arc<dyn ReplayRepository>,
  scheduler: Arc<dyn ReplayScheduler>,

  job_repo: Arc<dyn JobRepository>,

  config: ReplayConfig,
}

impl ReplayWorker {
  /// 创建新的回放工作器
  /// Create a new replay worker
  pub fn new(
    replay_repo: Arc<dyn ReplayRepository>,
    scheduler: Arc<dyn ReplayScheduler>,
    job_repo: Arc<dyn JobRepository>,
    config: ReplayConfig,
  ) -> Self {
    Self {
      replay_repo,
      scheduler,
      job_repo,
      config,
    }
  }

  /// 处理一个回放请求的一个 tick
  /// Process one tick of a replay request
  ///
  /// 错误在内部消化：处理失败会把回放标记为终态 failed 并带上错误消息，
  /// 取消例外，被取消的 tick 不再写任何持久化状态。
  /// Errors are absorbed here: a processing failure marks the replay as
  /// terminal failed with the error message, except cancellation, a
  /// cancelled tick writes no further persistent state.
  pub async fn process(&self, replay_req: &ReplayWithRun, token: &CancellationToken) {
    let replay_id = replay_req.replay.id();
    tracing::debug!(
      "processing replay request {} with status {}",
      replay_id,
      replay_req.replay.state().as_str()
    );

    // 整个回放请求的处理从创建起受 replay_timeout 约束
    // Processing of the whole replay request is bounded by replay_timeout
    // measured from creation
    let age = Utc::now() - replay_req.replay.created_at();
    let timeout = chrono::Duration::from_std(self.config.replay_timeout)
      .unwrap_or_else(|_| chrono::Duration::hours(3));
    if age > timeout {
      let message = format!(
        "replay timed out after {}s",
        self.config.replay_timeout.as_secs()
      );
      tracing::error!("replay {} exceeded its processing bound: {}", replay_id, message);
      self.update_replay_as_failed(replay_id, &message, token).await;
      raise_replay_metric(
        replay_req.replay.tenant(),
        replay_req.replay.job_name(),
        ReplayState::Failed,
      );
      return;
    }

    let job_cron = match self
      .get_job_cron(replay_req.replay.tenant(), replay_req.replay.job_name())
      .await
    {
      Ok(job_cron) => job_cron,
      Err(e) => {
        tracing::error!(
          "unable to get cron value for job [{}] replay id [{}]: {}",
          replay_req.replay.job_name(),
          replay_id,
          e
        );
        self.update_replay_as_failed(replay_id, &e.to_string(), token).await;
        raise_replay_metric(
          replay_req.replay.tenant(),
          replay_req.replay.job_name(),
          ReplayState::Failed,
        );
        return;
      }
    };

    let result = match replay_req.replay.state() {
      ReplayState::Created => self.process_new_replay_request(replay_req, &job_cron, token).await,
      ReplayState::PartialReplayed => {
        self
          .process_partial_replayed_request(replay_req, &job_cron, token)
          .await
      }
      ReplayState::Replayed => {
        self
          .process_replayed_request(replay_req, &job_cron, token)
          .await
      }
      // 终态不再推进
      // Terminal states are never advanced
      ReplayState::Success | ReplayState::Failed => Ok(()),
    };

    if let Err(e) = result {
      if e.is_cancelled() {
        tracing::debug!("replay {} tick cancelled", replay_id);
        return;
      }
      tracing::error!("error encountered when processing replay request: {}", e);
      self.update_replay_as_failed(replay_id, &e.to_string(), token).await;
      raise_replay_metric(
        replay_req.replay.tenant(),
        replay_req.replay.job_name(),
        ReplayState::Failed,
      );
    }
  }

  /// created 状态：按模式提交全部或首个运行
  /// created state: dispatch all runs or the first one depending on the mode
  async fn process_new_replay_request(
    &self,
    replay_req: &ReplayWithRun,
    job_cron: &ScheduleSpec,
    token: &CancellationToken,
  ) -> Result<()> {
    let parallel = replay_req.replay.config().parallel;
    let state = if !parallel && replay_req.runs.len() > 1 {
      ReplayState::PartialReplayed
    } else {
      ReplayState::Replayed
    };

    let updated_runs = if parallel {
      self
        .process_new_replay_request_parallel(replay_req, job_cron)
        .await
    } else {
      self
        .process_new_replay_request_sequential(replay_req, job_cron)
        .await
    }
    .map_err(|e| {
      tracing::error!("error processing new replay: {}", e);
      e
    })?;

    self
      .checked_update_replay(replay_req.replay.id(), state, &updated_runs, "", token)
      .await?;
    raise_replay_metric(replay_req.replay.tenant(), replay_req.replay.job_name(), state);
    Ok(())
  }

  /// 并行模式：批量清理区间后补建缺失运行，全部标记为 in_progress
  /// Parallel mode: batch-clear the interval, recreate missing runs, mark
  /// everything in_progress
  async fn process_new_replay_request_parallel(
    &self,
    replay_req: &ReplayWithRun,
    job_cron: &ScheduleSpec,
  ) -> Result<Vec<JobRunStatus>> {
    let (Some(first_run), Some(last_run)) = (
      replay_req.first_executable_run(),
      replay_req.last_executable_run(),
    ) else {
      return Ok(replay_req.runs.clone());
    };

    let start_logical_time = first_run.logical_time(job_cron);
    let end_logical_time = last_run.logical_time(job_cron);
    self
      .scheduler
      .clear_batch(
        replay_req.replay.tenant(),
        replay_req.replay.job_name(),
        start_logical_time,
        end_logical_time,
      )
      .await
      .map_err(|e| {
        tracing::error!(
          "unable to clear job run for replay with replay_id [{}]: {}",
          replay_req.replay.id(),
          e
        );
        e
      })?;
    self.create_missing_runs(replay_req, job_cron).await.map_err(|e| {
      tracing::error!(
        "unable to create missing runs for replay with replay_id [{}]: {}",
        replay_req.replay.id(),
        e
      );
      e
    })?;

    tracing::info!(
      "cleared/created [{}] runs for replay [{}]",
      replay_req.replay.job_name(),
      replay_req.replay.id()
    );

    let updated_runs = replay_req
      .runs
      .iter()
      .map(|run| JobRunStatus::new(run.scheduled_at, RunState::InProgress))
      .collect();
    Ok(updated_runs)
  }

  /// 顺序模式：只提交最早的 pending 运行
  /// Sequential mode: dispatch only the earliest pending run
  async fn process_new_replay_request_sequential(
    &self,
    replay_req: &ReplayWithRun,
    job_cron: &ScheduleSpec,
  ) -> Result<Vec<JobRunStatus>> {
    let Some(run_to_replay) = replay_req.first_executable_run() else {
      return Ok(replay_req.runs.clone());
    };

    self
      .replay_run_on_scheduler(replay_req, job_cron, &run_to_replay)
      .await?;

    let updated_replay_map = HashMap::from([(run_to_replay.scheduled_at, RunState::InProgress)]);
    Ok(merge_with_updated_runs(&replay_req.runs, &updated_replay_map))
  }

  /// partial replayed 状态：合并观察结果，空闲时提交下一个 pending 运行
  /// partial replayed state: merge observations, dispatch the next pending
  /// run when nothing is in flight
  async fn process_partial_replayed_request(
    &self,
    replay_req: &ReplayWithRun,
    job_cron: &ScheduleSpec,
    token: &CancellationToken,
  ) -> Result<()> {
    let incoming_runs = self.fetch_runs(replay_req, job_cron).await.map_err(|e| {
      tracing::error!("unable to get runs for replay [{}]: {}", replay_req.replay.id(), e);
      e
    })?;

    let mut updated_replay_map = identify_updated_run_status(&replay_req.runs, &incoming_runs);
    let mut updated_runs = merge_with_updated_runs(&replay_req.runs, &updated_replay_map);

    let replayed_runs = sorted_runs_by_states(&updated_runs, &[RunState::InProgress]);
    let to_be_replayed_runs = sorted_runs_by_states(&updated_runs, &[RunState::Pending]);

    if replayed_runs.is_empty() && !to_be_replayed_runs.is_empty() {
      let run_to_replay = to_be_replayed_runs[0];
      self
        .replay_run_on_scheduler(replay_req, job_cron, &run_to_replay)
        .await?;

      updated_replay_map.insert(run_to_replay.scheduled_at, RunState::InProgress);
      updated_runs = merge_with_updated_runs(&updated_runs, &updated_replay_map);
    }

    let pending_runs = sorted_runs_by_states(&updated_runs, &[RunState::Pending]);
    let replay_state = if pending_runs.is_empty() {
      ReplayState::Replayed
    } else {
      ReplayState::PartialReplayed
    };

    self
      .checked_update_replay(replay_req.replay.id(), replay_state, &updated_runs, "", token)
      .await?;
    raise_replay_metric(
      replay_req.replay.tenant(),
      replay_req.replay.job_name(),
      replay_state,
    );
    Ok(())
  }

  /// replayed 状态：合并观察结果并判定终态
  /// replayed state: merge observations and decide the terminal outcome
  async fn process_replayed_request(
    &self,
    replay_req: &ReplayWithRun,
    job_cron: &ScheduleSpec,
    token: &CancellationToken,
  ) -> Result<()> {
    let incoming_runs = self.fetch_runs(replay_req, job_cron).await.map_err(|e| {
      tracing::error!(
        "unable to get runs for replay with replay_id [{}]: {}",
        replay_req.replay.id(),
        e
      );
      e
    })?;

    let updated_replay_map = identify_updated_run_status(&replay_req.runs, &incoming_runs);
    let updated_runs = merge_with_updated_runs(&replay_req.runs, &updated_replay_map);
    let in_progress_runs = sorted_runs_by_states(&updated_runs, &[RunState::InProgress]);
    let failed_runs = sorted_runs_by_states(&updated_runs, &[RunState::Failed]);

    let mut message = String::new();
    let mut state = ReplayState::Replayed;
    if in_progress_runs.is_empty() && failed_runs.is_empty() {
      state = ReplayState::Success;
      tracing::info!("marking replay {} as success", replay_req.replay.id());
    } else if in_progress_runs.is_empty() && !failed_runs.is_empty() {
      state = ReplayState::Failed;
      message = format!("found {} failed runs.", failed_runs.len());
      tracing::info!("marking replay {} as failed", replay_req.replay.id());
    }

    self
      .checked_update_replay(replay_req.replay.id(), state, &updated_runs, &message, token)
      .await?;
    raise_replay_metric(replay_req.replay.tenant(), replay_req.replay.job_name(), state);
    Ok(())
  }

  /// 补建缺失运行：逐个创建，错误累积为多重错误一起上抛
  /// Recreate missing runs: create one by one, accumulating errors into a
  /// single multi-error
  async fn create_missing_runs(
    &self,
    replay_req: &ReplayWithRun,
    job_cron: &ScheduleSpec,
  ) -> Result<()> {
    // 先取回区间内已经存在的运行
    // Fetch the runs already existing within the interval first
    let existed_runs = self.fetch_runs(replay_req, job_cron).await?;

    let runs_to_be_created = get_missing_runs(&replay_req.runs, &existed_runs);
    tracing::info!(
      "create {} missing runs with replay id {}",
      runs_to_be_created.len(),
      replay_req.replay.id()
    );

    let mut errors = Vec::new();
    for run in runs_to_be_created {
      if let Err(e) = self
        .scheduler
        .create_run(
          replay_req.replay.tenant(),
          replay_req.replay.job_name(),
          run.logical_time(job_cron),
          PREFIX_REPLAYED,
        )
        .await
      {
        errors.push(e);
      }
    }

    match Error::multi("create runs", errors) {
      Some(e) => Err(e),
      None => Ok(()),
    }
  }

  /// 目标运行不存在时创建，存在时清理
  /// Create the target run when absent, clear it when present
  async fn replay_run_on_scheduler(
    &self,
    replay_req: &ReplayWithRun,
    job_cron: &ScheduleSpec,
    run_to_replay: &JobRunStatus,
  ) -> Result<()> {
    match self.fetch_run(replay_req, job_cron, run_to_replay.scheduled_at).await {
      Err(e) if e.is_not_found() => {
        self
          .scheduler
          .create_run(
            replay_req.replay.tenant(),
            replay_req.replay.job_name(),
            run_to_replay.logical_time(job_cron),
            PREFIX_REPLAYED,
          )
          .await
          .map_err(|e| {
            tracing::error!(
              "unable to create missing runs for replay with replay_id [{}] with logical time {}: {}",
              replay_req.replay.id(),
              run_to_replay.logical_time(job_cron),
              e
            );
            e
          })?;
        tracing::info!(
          "created [{}] [{}] run for replay {}",
          replay_req.replay.job_name(),
          run_to_replay.scheduled_at,
          replay_req.replay.id()
        );
      }
      Err(e) => return Err(e),
      Ok(_) => {
        self
          .scheduler
          .clear(
            replay_req.replay.tenant(),
            replay_req.replay.job_name(),
            run_to_replay.logical_time(job_cron),
          )
          .await
          .map_err(|e| {
            tracing::error!(
              "unable to clear job run for replay with replay_id [{}]: {}",
              replay_req.replay.id(),
              e
            );
            e
          })?;
        tracing::info!(
          "cleared [{}] [{}] run for replay {}",
          replay_req.replay.job_name(),
          run_to_replay.scheduled_at,
          replay_req.replay.id()
        );
      }
    }
    Ok(())
  }

  /// 查询单个调度点的运行，不存在时返回未找到错误
  /// Fetch the run at one schedule point, absence yields a not found error
  async fn fetch_run(
    &self,
    replay_req: &ReplayWithRun,
    job_cron: &ScheduleSpec,
    scheduled_at: DateTime<Utc>,
  ) -> Result<JobRunStatus> {
    let job_run_criteria = JobRunsCriteria {
      job_name: replay_req.replay.job_name().to_string(),
      start_date: scheduled_at,
      end_date: scheduled_at,
    };
    let runs = self
      .scheduler
      .get_job_runs(replay_req.replay.tenant(), &job_run_criteria, job_cron)
      .await?;
    match runs.first() {
      Some(run) => Ok(*run),
      None => Err(Error::not_found(
        "replay",
        format!(
          "run on job {} with scheduled_at {} not exist",
          replay_req.replay.job_name(),
          scheduled_at
        ),
      )),
    }
  }

  /// 查询回放区间内的全部运行
  /// Fetch every run within the replay interval
  async fn fetch_runs(
    &self,
    replay_req: &ReplayWithRun,
    job_cron: &ScheduleSpec,
  ) -> Result<Vec<JobRunStatus>> {
    let job_run_criteria = JobRunsCriteria {
      job_name: replay_req.replay.job_name().to_string(),
      start_date: replay_req.replay.config().start_time,
      end_date: replay_req.replay.config().end_time,
    };
    self
      .scheduler
      .get_job_runs(replay_req.replay.tenant(), &job_run_criteria, job_cron)
      .await
  }

  /// 解析作业的 cron 调度表
  /// Resolve the job's cron schedule
  async fn get_job_cron(&self, tenant: &Tenant, job_name: &JobName) -> Result<ScheduleSpec> {
    let details = self
      .job_repo
      .get_job_details(tenant.project_name(), job_name)
      .await
      .map_err(|e| {
        Error::upstream(format!(
          "unable to get job details for jobName: {}, project: {}: {}",
          job_name,
          tenant.project_name(),
          e
        ))
      })?;

    if details.schedule.interval.trim().is_empty() {
      return Err(Error::invalid_input(format!(
        "job schedule interval not found for job {job_name}"
      )));
    }
    ScheduleSpec::parse(&details.schedule.interval)
  }

  /// 带取消检查的仓储写入：令牌一旦触发就不再持久化任何状态
  /// Repository write with a cancellation check: once the token trips no
  /// state is persisted
  async fn checked_update_replay(
    &self,
    id: Uuid,
    state: ReplayState,
    runs: &[JobRunStatus],
    message: &str,
    token: &CancellationToken,
  ) -> Result<()> {
    if token.is_cancelled() {
      return Err(Error::Cancelled);
    }
    self
      .replay_repo
      .update_replay(id, state, runs, message)
      .await
      .map_err(|e| {
        tracing::error!("unable to update replay state for replay_id [{}]: {}", id, e);
        e
      })
  }

  /// 把回放标记为终态 failed
  /// Mark the replay as terminal failed
  async fn update_replay_as_failed(&self, replay_id: Uuid, message: &str, token: &CancellationToken) {
    if token.is_cancelled() {
      return;
    }
    if let Err(e) = self
      .replay_repo
      .update_replay_status(replay_id, ReplayState::Failed, message)
      .await
    {
      tracing::error!(
        "unable to update replay state to failed for replay_id [{}]: {}",
        replay_id,
        e
      );
    }
  }
}

/// 期望集合减去观察集合，按调度时间为键
/// The expected set minus the observed set, keyed by schedule time
fn get_missing_runs(
  expected_runs: &[JobRunStatus],
  existing_runs: &[JobRunStatus],
) -> Vec<JobRunStatus> {
  let existed_runs_map = run_status_map(existing_runs);
  expected_runs
    .iter()
    .filter(|run| !existed_runs_map.contains_key(&run.scheduled_at))
    .copied()
    .collect()
}

/// 找出观察到终态的 in_progress 运行
/// Identify in_progress runs whose observed state turned terminal
///
/// 只有 success 和 failed 会被采纳，其他观察状态一概忽略。
/// Only success and failed are adopted, every other observed state is
/// ignored.
fn identify_updated_run_status(
  existing_job_runs: &[JobRunStatus],
  incoming_job_runs: &[JobRunStatus],
) -> HashMap<DateTime<Utc>, RunState> {
  let incoming_run_status_map = run_status_map(incoming_job_runs);

  let mut updated_replay_map = HashMap::new();
  for run in existing_job_runs {
    if run.state != RunState::InProgress {
      continue;
    }
    match incoming_run_status_map.get(&run.scheduled_at) {
      Some(state @ (RunState::Success | RunState::Failed)) => {
        updated_replay_map.insert(run.scheduled_at, *state);
      }
      _ => {}
    }
  }
  updated_replay_map
}

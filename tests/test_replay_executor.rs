//! 回放执行调度器的集成测试
//! Integration tests for the replay executor dispatch loop

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use replayq::base::{JobRunsCriteria, ReplayRepository, ReplayScheduler};
use replayq::components::replay_executor::ReplayExecutor;
use replayq::components::replay_worker::ReplayWorker;
use replayq::components::ComponentLifecycle;
use replayq::config::ReplayConfig;
use replayq::cronspec::ScheduleSpec;
use replayq::error::Result;
use replayq::job::{Job, JobName, JobRepository, JobWithDetails, Schedule, Task};
use replayq::memdb::MemoryReplayRepository;
use replayq::replay::{JobRunStatus, ReplayState, RunState};
use replayq::tenant::{ProjectName, Tenant};
use replayq::window::WindowConfig;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// 任何查询都返回成功运行的假调度器客户端
/// Fake scheduler client reporting success for every queried run
#[derive(Default)]
struct AllSuccessScheduler {
  get_job_runs_delay: Option<Duration>,
  get_job_runs_calls: AtomicUsize,
}

#[async_trait]
impl ReplayScheduler for AllSuccessScheduler {
  async fn create_run(
    &self,
    _tenant: &Tenant,
    _job_name: &JobName,
    _logical_time: DateTime<Utc>,
    _dag_run_id_prefix: &str,
  ) -> Result<()> {
    Ok(())
  }

  async fn clear(
    &self,
    _tenant: &Tenant,
    _job_name: &JobName,
    _logical_time: DateTime<Utc>,
  ) -> Result<()> {
    Ok(())
  }

  async fn clear_batch(
    &self,
    _tenant: &Tenant,
    _job_name: &JobName,
    _start_logical_time: DateTime<Utc>,
    _end_logical_time: DateTime<Utc>,
  ) -> Result<()> {
    Ok(())
  }

  async fn get_job_runs(
    &self,
    _tenant: &Tenant,
    criteria: &JobRunsCriteria,
    job_cron: &ScheduleSpec,
  ) -> Result<Vec<JobRunStatus>> {
    self.get_job_runs_calls.fetch_add(1, Ordering::SeqCst);
    if let Some(delay) = self.get_job_runs_delay {
      tokio::time::sleep(delay).await;
    }
    Ok(
      job_cron
        .expected_runs_between(criteria.start_date, criteria.end_date)
        .into_iter()
        .map(|scheduled_at| JobRunStatus::new(scheduled_at, RunState::Success))
        .collect(),
    )
  }
}

#[derive(Default)]
struct CountingJobRepository {
  calls: AtomicUsize,
}

#[async_trait]
impl JobRepository for CountingJobRepository {
  async fn get_job_details(
    &self,
    _project_name: &ProjectName,
    job_name: &JobName,
  ) -> Result<JobWithDetails> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    Ok(JobWithDetails {
      job: Job {
        id: Uuid::nil(),
        name: job_name.clone(),
        tenant: Tenant::new("proj1", "ns1").unwrap(),
        destination: String::new(),
        task: Task::default(),
        hooks: vec![],
        window_config: WindowConfig::new("24h", "", "d"),
        assets: HashMap::new(),
      },
      schedule: Schedule {
        interval: "0 * * * *".to_string(),
      },
    })
  }
}

fn at(hour: u32) -> DateTime<Utc> {
  Utc.with_ymd_and_hms(2023, 1, 1, hour, 0, 0).unwrap()
}

async fn create_replay(repo: &MemoryReplayRepository, parallel: bool) -> Uuid {
  let job_cron = ScheduleSpec::parse("0 * * * *").unwrap();
  repo
    .create_replay(
      Tenant::new("proj1", "ns1").unwrap(),
      JobName::new("job1").unwrap(),
      replayq::replay::ReplayConfig::new(at(10), at(12), parallel),
      &job_cron,
    )
    .await
    .unwrap()
}

fn executor_with(
  repo: Arc<MemoryReplayRepository>,
  scheduler: Arc<AllSuccessScheduler>,
  job_repo: Arc<CountingJobRepository>,
  config: ReplayConfig,
) -> Arc<ReplayExecutor> {
  let worker = Arc::new(ReplayWorker::new(
    repo.clone(),
    scheduler,
    job_repo,
    config.clone(),
  ));
  Arc::new(ReplayExecutor::new(repo, worker, config))
}

#[tokio::test]
async fn test_executor_drives_replay_to_success() {
  let repo = Arc::new(MemoryReplayRepository::new());
  let scheduler = Arc::new(AllSuccessScheduler::default());
  let job_repo = Arc::new(CountingJobRepository::default());
  let id = create_replay(&repo, true).await;

  let config = ReplayConfig {
    poll_interval: Duration::from_millis(20),
    ..ReplayConfig::default()
  };
  let executor = executor_with(repo.clone(), scheduler, job_repo, config);
  let handle = executor.clone().start();

  // 轮询直到回放到达终态
  // Poll until the replay reaches a terminal state
  let mut state = ReplayState::Created;
  for _ in 0..100 {
    tokio::time::sleep(Duration::from_millis(20)).await;
    state = repo.get_replay_by_id(id).await.unwrap().replay.state();
    if state.is_terminal() {
      break;
    }
  }
  assert_eq!(state, ReplayState::Success);

  executor.shutdown();
  assert!(executor.is_done());
  let _ = handle.await;
}

#[tokio::test]
async fn test_dispatch_excludes_inflight_replays() {
  let repo = Arc::new(MemoryReplayRepository::new());
  let scheduler = Arc::new(AllSuccessScheduler {
    get_job_runs_delay: Some(Duration::from_millis(300)),
    ..Default::default()
  });
  let job_repo = Arc::new(CountingJobRepository::default());
  create_replay(&repo, false).await;

  let executor = executor_with(
    repo.clone(),
    scheduler,
    job_repo.clone(),
    ReplayConfig::default(),
  );

  // 两次快速的调度迭代，第二次必须因为在途互斥而什么都不做
  // Two quick dispatch iterations, the second must do nothing because of the
  // in-flight exclusion
  executor.dispatch_next().await.unwrap();
  executor.dispatch_next().await.unwrap();
  tokio::time::sleep(Duration::from_millis(100)).await;

  assert_eq!(job_repo.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_dispatch_skips_terminal_replays() {
  let repo = Arc::new(MemoryReplayRepository::new());
  let scheduler = Arc::new(AllSuccessScheduler::default());
  let job_repo = Arc::new(CountingJobRepository::default());
  let id = create_replay(&repo, false).await;
  repo
    .update_replay_status(id, ReplayState::Failed, "boom")
    .await
    .unwrap();

  let executor = executor_with(
    repo.clone(),
    scheduler,
    job_repo.clone(),
    ReplayConfig::default(),
  );

  executor.dispatch_next().await.unwrap();
  tokio::time::sleep(Duration::from_millis(100)).await;

  // 终态回放不会被派发
  // Terminal replays are never dispatched
  assert_eq!(job_repo.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_executor_shutdown_stops_loop() {
  let repo = Arc::new(MemoryReplayRepository::new());
  let scheduler = Arc::new(AllSuccessScheduler::default());
  let job_repo = Arc::new(CountingJobRepository::default());

  let config = ReplayConfig {
    poll_interval: Duration::from_millis(10),
    ..ReplayConfig::default()
  };
  let executor = executor_with(repo, scheduler, job_repo, config);
  let handle = executor.clone().start();

  assert!(!executor.is_done());
  executor.shutdown();
  assert!(executor.is_done());

  // 循环在关闭信号后退出
  // The loop exits after the shutdown signal
  tokio::time::timeout(Duration::from_secs(1), handle)
    .await
    .expect("executor loop should stop")
    .unwrap();
}

#[tokio::test]
async fn test_dispatch_picks_oldest_replay_first() {
  let repo = Arc::new(MemoryReplayRepository::new());
  let scheduler = Arc::new(AllSuccessScheduler::default());
  let job_repo = Arc::new(CountingJobRepository::default());

  let first = create_replay(&repo, false).await;
  let _second = create_replay(&repo, false).await;

  let executor = executor_with(
    repo.clone(),
    scheduler,
    job_repo,
    ReplayConfig::default(),
  );
  executor.dispatch_next().await.unwrap();
  tokio::time::sleep(Duration::from_millis(100)).await;

  // 最老的回放先被推进
  // The oldest replay advances first
  let state = repo.get_replay_by_id(first).await.unwrap().replay.state();
  assert_ne!(state, ReplayState::Created);
}

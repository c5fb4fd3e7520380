//! # Replayq
//!
//! 数据管道编排平台的回放执行核心
//! Replay execution core for a data pipeline orchestration platform
//!
//! Replayq 负责把一段历史调度区间内的作业运行重新提交到外部工作流调度器，
//! 跟踪每个运行的进度并核对最终结果。
//! Replayq re-submits a historical range of scheduled job runs to an external
//! workflow scheduler, tracking per-run progress and reconciling outcomes.
//! 同时它实现了执行器输入编译器：为每次任务或钩子运行组装配置、密钥和资产文件。
//! It also implements the executor input compiler: assembling the configs,
//! secrets and asset files each task or hook run receives on launch.
//!
//! ## 特性
//! ## Features
//!
//! - 状态机驱动的回放核对器，逐 tick 推进每个回放请求
//!   - State-machine driven replay reconciler, advancing each request one tick at a time
//! - 顺序模式与并行模式：逐个重放或整批清理后并发重建
//!   - Sequential and parallel modes: one run at a time, or batch-clear then recreate concurrently
//! - 幂等的调度器交互：清理失败时回退到创建
//!   - Idempotent scheduler interaction: clear falls back to create on absence
//! - 有界并发的调度循环，按回放 ID 互斥
//!   - Bounded-concurrency dispatch loop with per-replay mutual exclusion
//! - 确定性的模板求值管道：租户配置、密钥、系统变量、时间窗口、资产文件
//!   - Deterministic template evaluation pipeline over tenant configs, secrets,
//!     system variables, time windows and asset files
//! - 可插拔的插件能力槽（依赖模块与 YAML 模块）
//!   - Pluggable plugin capability slots (dependency mod and yaml mod)
//!
//! ## 快速开始
//! ## Quick Start
//!
//! ```rust,no_run
//! use replayq::components::replay_executor::ReplayExecutor;
//! use replayq::components::replay_worker::ReplayWorker;
//! use replayq::components::ComponentLifecycle;
//! use replayq::config::ReplayConfig;
//! use replayq::memdb::MemoryReplayRepository;
//! use std::sync::Arc;
//!
//! # use replayq::base::{JobRunsCriteria, ReplayScheduler};
//! # use replayq::cronspec::ScheduleSpec;
//! # use replayq::error::Result;
//! # use replayq::job::{JobName, JobRepository, JobWithDetails};
//! # use replayq::replay::JobRunStatus;
//! # use replayq::tenant::{ProjectName, Tenant};
//! # use chrono::{DateTime, Utc};
//! # struct MyScheduler;
//! # #[async_trait::async_trait]
//! # impl ReplayScheduler for MyScheduler {
//! #   async fn create_run(&self, _: &Tenant, _: &JobName, _: DateTime<Utc>, _: &str) -> Result<()> { Ok(()) }
//! #   async fn clear(&self, _: &Tenant, _: &JobName, _: DateTime<Utc>) -> Result<()> { Ok(()) }
//! #   async fn clear_batch(&self, _: &Tenant, _: &JobName, _: DateTime<Utc>, _: DateTime<Utc>) -> Result<()> { Ok(()) }
//! #   async fn get_job_runs(&self, _: &Tenant, _: &JobRunsCriteria, _: &ScheduleSpec) -> Result<Vec<JobRunStatus>> { Ok(vec![]) }
//! # }
//! # struct MyJobRepo;
//! # #[async_trait::async_trait]
//! # impl JobRepository for MyJobRepo {
//! #   async fn get_job_details(&self, _: &ProjectName, _: &JobName) -> Result<JobWithDetails> { unimplemented!() }
//! # }
//! # async fn example() {
//! let replay_repo = Arc::new(MemoryReplayRepository::new());
//! let scheduler = Arc::new(MyScheduler);
//! let job_repo = Arc::new(MyJobRepo);
//!
//! let config = ReplayConfig::default();
//! let worker = Arc::new(ReplayWorker::new(
//!   replay_repo.clone(),
//!   scheduler,
//!   job_repo,
//!   config.clone(),
//! ));
//!
//! // 启动调度循环
//! // Start the dispatch loop
//! let executor = Arc::new(ReplayExecutor::new(replay_repo, worker, config));
//! let handle = executor.clone().start();
//!
//! // 关闭
//! // Shutdown
//! executor.shutdown();
//! let _ = handle.await;
//! # }
//! ```

pub mod base;
pub mod compiler;
pub mod components;
pub mod config;
pub mod cronspec;
pub mod error;
pub mod job;
pub mod memdb;
pub mod plugin;
pub mod replay;
pub mod telemetry;
pub mod tenant;
pub mod window;

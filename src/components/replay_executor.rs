//! 回放执行调度器模块
//! Replay executor module
//!
//! 顶层调度循环：周期性地从仓储挑选待处理的回放请求，
//! Top-level dispatch loop: periodically selects pending replay requests
//! from the repository,
//! 在有界并发的工作器池里推进它们。
//! and advances them on a bounded-concurrency worker pool.
//!
//! ## 并发契约
//! ## Concurrency contract
//!
//! - 信号量限制同时运行的工作器数量
//!   - A semaphore bounds the number of workers running at once
//! - 按回放 ID 的在途集合保证同一回放不会被两个工作器同时推进，
//!   由此同一回放的 tick 严格串行
//!   - An in-flight set keyed by replay id guarantees no two workers advance
//!     the same replay concurrently, serialising its ticks
//! - 取消令牌贯穿每个工作器；触发后不再有持久化写入
//!   - The cancellation token reaches every worker; once tripped no further
//!     persistent writes happen

use crate::base::ReplayRepository;
use crate::components::replay_worker::ReplayWorker;
use crate::components::ComponentLifecycle;
use crate::config::ReplayConfig;
use crate::error::Result;
use crate::replay::{ReplayState, ReplayWithRun};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// 回放执行调度器
/// Replay executor
pub struct ReplayExecutor {
  replay_repo: Arc<dyn ReplayRepository>,
  worker: Arc<ReplayWorker>,
  config: ReplayConfig,

  // 信号量用于限制并发工作者数量
  // Semaphore to limit the number of concurrent workers
  sema: Arc<Semaphore>,

  // 在途回放 ID 集合，同一回放的互斥键
  // In-flight replay id set, the per-replay exclusion key
  inflight: Arc<Mutex<HashSet<Uuid>>>,

  done: Arc<AtomicBool>,
  token: CancellationToken,
}

impl ReplayExecutor {
  /// 创建新的回放执行调度器
  /// Create a new replay executor
  pub fn new(
    replay_repo: Arc<dyn ReplayRepository>,
    worker: Arc<ReplayWorker>,
    config: ReplayConfig,
  ) -> Self {
    let sema = Arc::new(Semaphore::new(config.worker_pool_size.max(1)));
    Self {
      replay_repo,
      worker,
      config,
      sema,
      inflight: Arc::new(Mutex::new(HashSet::new())),
      done: Arc::new(AtomicBool::new(false)),
      token: CancellationToken::new(),
    }
  }

  /// 执行一次调度：挑选最老的未在途回放并派发一个工作器
  /// Run one dispatch iteration: pick the oldest replay not in flight and
  /// spawn one worker for it
  ///
  /// 每次迭代最多派发一个回放，随后立即返回。
  /// At most one replay is dispatched per iteration, then the call returns.
  pub async fn dispatch_next(&self) -> Result<()> {
    // 没有空闲的工作者槽位就跳过本轮
    // Skip this round when no worker slot is free
    let Ok(permit) = self.sema.clone().try_acquire_owned() else {
      return Ok(());
    };

    let candidates = self
      .replay_repo
      .get_replay_requests_by_status(&ReplayState::non_terminal())
      .await?;

    let replay_req = {
      let mut inflight = self.inflight.lock().unwrap();
      let mut candidates: Vec<ReplayWithRun> = candidates
        .into_iter()
        .filter(|candidate| !inflight.contains(&candidate.replay.id()))
        .collect();
      candidates.sort_by_key(|candidate| candidate.replay.created_at());
      match candidates.into_iter().next() {
        Some(replay_req) => {
          inflight.insert(replay_req.replay.id());
          replay_req
        }
        None => return Ok(()),
      }
    };

    let worker = self.worker.clone();
    let inflight = self.inflight.clone();
    let token = self.token.clone();
    tokio::spawn(async move {
      let _permit = permit; // 持有许可直到 tick 完成

      worker.process(&replay_req, &token).await;

      inflight.lock().unwrap().remove(&replay_req.replay.id());
    });

    Ok(())
  }

  /// 取消令牌，供调用方联动关闭
  /// The cancellation token, for callers wiring shutdown together
  pub fn cancellation_token(&self) -> CancellationToken {
    self.token.clone()
  }
}

impl ComponentLifecycle for ReplayExecutor {
  fn start(self: Arc<Self>) -> JoinHandle<()> {
    tokio::spawn(async move {
      let mut interval = tokio::time::interval(self.config.poll_interval);
      loop {
        tokio::select! {
          _ = interval.tick() => {}
          _ = self.token.cancelled() => {
            tracing::debug!("replay executor: shutting down");
            break;
          }
        }

        if self.done.load(Ordering::Relaxed) {
          tracing::debug!("replay executor: shutting down");
          break;
        }

        if let Err(e) = self.dispatch_next().await {
          tracing::error!("replay executor error: {}", e);
        }
      }
    })
  }

  fn shutdown(&self) {
    self.done.store(true, Ordering::Relaxed);
    self.token.cancel();
  }

  fn is_done(&self) -> bool {
    self.done.load(Ordering::Relaxed)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_worker_pool_size_floor() {
    // 池大小为零时也要保证至少一个槽位
    // A zero pool size still leaves at least one slot
    let config = ReplayConfig {
      worker_pool_size: 0,
      ..ReplayConfig::default()
    };
    let sema = Semaphore::new(config.worker_pool_size.max(1));
    assert_eq!(sema.available_permits(), 1);
  }
}

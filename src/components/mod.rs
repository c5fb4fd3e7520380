//! 组件模块
//! Components module
//!
//! 提供通用的组件生命周期管理 trait 以及回放核心的各个组件
//! Provides a common component lifecycle trait along with the replay core's
//! components
//!
//! - [`asset_compiler`] 编译作业的资产文件，必要时委托给插件
//!   - compiles a job's asset files, delegating to the plugin when needed
//! - [`input_compiler`] 组装交付给执行器的完整输入
//!   - assembles the full input handed to an executor
//! - [`plugin_service`] 通过插件能力生成目标资源与上游依赖
//!   - generates destinations and upstream dependencies through plugin capabilities
//! - [`replay_worker`] 按 tick 推进单个回放请求的状态机
//!   - advances a single replay request's state machine one tick at a time
//! - [`replay_executor`] 有界并发地把待处理回放分发给工作器
//!   - dispatches pending replays to workers with bounded concurrency

use std::sync::Arc;
use tokio::task::JoinHandle;

pub mod asset_compiler;
pub mod input_compiler;
pub mod plugin_service;
pub mod replay_executor;
pub mod replay_worker;

/// 组件生命周期管理接口
/// Component lifecycle management interface
///
/// 定义了后台组件的基本生命周期操作：启动、关闭和状态检查
/// Defines the basic lifecycle operations of a background component: start,
/// shutdown, and state check
pub trait ComponentLifecycle {
  /// 启动组件的后台任务，返回可用于等待其结束的 JoinHandle
  /// Start the component's background task, returning a JoinHandle to await
  /// its completion
  fn start(self: Arc<Self>) -> JoinHandle<()>;

  /// 发送关闭信号，组件完成当前操作后停止
  /// Send the shutdown signal, the component stops after finishing its
  /// current operation
  fn shutdown(&self);

  /// 检查组件是否已停止
  /// Check whether the component has stopped
  fn is_done(&self) -> bool;
}

//! 作业模块
//! Job module
//!
//! 定义了作业、任务、钩子、调度表以及执行器输入的数据结构
//! Defines data structures for jobs, tasks, hooks, schedules and executor input

use crate::error::{Error, Result};
use crate::tenant::{ProjectName, Tenant};
use crate::window::WindowConfig;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// 作业名称
/// Job name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobName(String);

impl JobName {
  /// 创建作业名称，不允许为空
  /// Create a job name, must not be empty
  pub fn new<S: Into<String>>(name: S) -> Result<Self> {
    let name = name.into();
    if name.trim().is_empty() {
      return Err(Error::invalid_input("job name is empty"));
    }
    Ok(Self(name))
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for JobName {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// 作业的主体任务
/// The main executable body of a job
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Task {
  pub name: String,
  pub config: HashMap<String, String>,
}

/// 任务前后触发的辅助钩子
/// An auxiliary hook triggered before or after the task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hook {
  pub name: String,
  pub config: HashMap<String, String>,
}

/// 作业：任务、钩子、时间窗口与资产文件的组合
/// Job: the combination of a task, hooks, a time window and asset files
#[derive(Debug, Clone)]
pub struct Job {
  pub id: Uuid,
  pub name: JobName,
  pub tenant: Tenant,
  /// 任务写入的资源 URN
  /// Resource URN the task writes to
  pub destination: String,
  pub task: Task,
  /// 钩子列表，保持声明顺序
  /// Hook list, declaration order preserved
  pub hooks: Vec<Hook>,
  pub window_config: WindowConfig,
  /// 文件名到模板内容的映射
  /// Mapping from file name to template body
  pub assets: HashMap<String, String>,
}

impl Job {
  /// 按名称查找钩子
  /// Look up a hook by name
  pub fn hook(&self, hook_name: &str) -> Result<&Hook> {
    self
      .hooks
      .iter()
      .find(|h| h.name == hook_name)
      .ok_or_else(|| Error::not_found("job run", format!("hook:{hook_name}")))
  }
}

/// 调度表，interval 为 cron 表达式
/// Schedule, interval is a cron specification
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Schedule {
  pub interval: String,
}

/// 作业及其调度信息
/// Job together with its schedule
#[derive(Debug, Clone)]
pub struct JobWithDetails {
  pub job: Job,
  pub schedule: Schedule,
}

impl JobWithDetails {
  pub fn name(&self) -> &JobName {
    &self.job.name
  }
}

/// 执行器类型：任务或钩子
/// Executor type: task or hook
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutorType {
  Task,
  Hook,
}

impl ExecutorType {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Task => "task",
      Self::Hook => "hook",
    }
  }
}

/// 执行器标识
/// Executor identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Executor {
  pub name: String,
  pub executor_type: ExecutorType,
}

impl Executor {
  pub fn task<S: Into<String>>(name: S) -> Self {
    Self {
      name: name.into(),
      executor_type: ExecutorType::Task,
    }
  }

  pub fn hook<S: Into<String>>(name: S) -> Self {
    Self {
      name: name.into(),
      executor_type: ExecutorType::Hook,
    }
  }
}

/// 单次运行的执行请求
/// The request to execute one run
#[derive(Debug, Clone)]
pub struct RunConfig {
  pub executor: Executor,
  pub scheduled_at: DateTime<Utc>,
  pub job_run_id: Uuid,
}

/// 交付给执行器的载荷：配置、密钥与文件
/// The payload handed to an executor: configs, secrets and files
///
/// configs 中总是包含 DSTART、DEND、EXECUTION_TIME（RFC3339）、
/// JOB_DESTINATION 与 JOB_LABELS。
/// configs always carries DSTART, DEND, EXECUTION_TIME (RFC3339),
/// JOB_DESTINATION and JOB_LABELS.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExecutorInput {
  pub configs: HashMap<String, String>,
  pub secrets: HashMap<String, String>,
  pub files: HashMap<String, String>,
}

/// 作业仓储特性，定义了读取作业详情的接口
/// Job repository trait, defines the interface for reading job details
#[async_trait]
pub trait JobRepository: Send + Sync {
  /// 按项目与作业名获取作业及调度信息
  /// Fetch a job with its schedule by project and job name
  async fn get_job_details(
    &self,
    project_name: &ProjectName,
    job_name: &JobName,
  ) -> Result<JobWithDetails>;
}

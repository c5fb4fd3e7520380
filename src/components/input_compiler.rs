//! 执行器输入编译器模块
//! Executor input compiler module
//!
//! 为一次具体的任务或钩子运行组装完整的执行器输入：
//! Assembles the full executor input for one concrete task or hook run:
//! 编译后的配置、路由到独立映射的密钥、以及求值后的资产文件。
//! compiled configs, secrets routed into their own map, and the evaluated
//! asset files.
//!
//! 配置分两趟编译：明文配置与引用密钥的配置各自独立校验，
//! Configs compile in two passes so plaintext configs and secret-referencing
//! configs validate independently,
//! 密钥结果只进入 ExecutorInput.secrets，与 configs 的键集合互不相交。
//! secret results only land in ExecutorInput.secrets, disjoint from the
//! configs key set.

use crate::base::constants::{
  CONFIG_KEY_DEND, CONFIG_KEY_DESTINATION, CONFIG_KEY_DSTART, CONFIG_KEY_EXECUTION_TIME,
  CONFIG_KEY_JOB_LABELS, CONTEXT_PROJECT, CONTEXT_SECRET, CONTEXT_SYSTEM_DEFINED,
  PROJECT_CONFIG_PREFIX,
};
use crate::compiler::{from, prepare_context, Context, Engine};
use crate::components::asset_compiler::JobRunAssetsCompiler;
use crate::error::Result;
use crate::job::{ExecutorInput, ExecutorType, Job, JobWithDetails, RunConfig};
use crate::tenant::TenantService;
use crate::window::{Interval, Window};
use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::HashMap;
use std::sync::Arc;

/// 作业标签值的长度上限，对应调度器侧的标签约束
/// Length cap for job label values, matching the scheduler-side label rules
const MAX_LABEL_LENGTH: usize = 63;

/// 执行器输入编译器
/// Executor input compiler
pub struct JobInputCompiler {
  tenant_service: Arc<dyn TenantService>,
  compiler: Arc<Engine>,
  asset_compiler: Arc<JobRunAssetsCompiler>,
}

impl JobInputCompiler {
  /// 创建新的执行器输入编译器
  /// Create a new executor input compiler
  pub fn new(
    tenant_service: Arc<dyn TenantService>,
    compiler: Arc<Engine>,
    asset_compiler: Arc<JobRunAssetsCompiler>,
  ) -> Self {
    Self {
      tenant_service,
      compiler,
      asset_compiler,
    }
  }

  /// 编译一次运行的执行器输入
  /// Compile the executor input for one run
  pub async fn compile(
    &self,
    details: &JobWithDetails,
    config: &RunConfig,
    executed_at: DateTime<Utc>,
  ) -> Result<ExecutorInput> {
    let tenant_details = self
      .tenant_service
      .get_details(&details.job.tenant)
      .await
      .map_err(|e| {
        tracing::error!("error getting tenant details: {}", e);
        e
      })?;

    let window = Window::from_config(&details.job.window_config);
    let interval = window.get_interval(config.scheduled_at)?;

    let system_defined_vars = get_system_defined_configs(&details.job, interval, executed_at);

    let task_context = prepare_context([
      from(tenant_details.get_configs())
        .with_name(CONTEXT_PROJECT)
        .with_key_prefix(PROJECT_CONFIG_PREFIX),
      from(tenant_details.secrets_map()).with_name(CONTEXT_SECRET),
      from(system_defined_vars.clone())
        .with_name(CONTEXT_SYSTEM_DEFINED)
        .add_to_context(),
    ]);

    let files = self
      .asset_compiler
      .compile_job_run_assets(&details.job, &system_defined_vars, interval, &task_context)
      .await?;

    // 激活的配置集：任务运行取任务配置，钩子运行取同名钩子的配置
    // The active config set: the task's config for a task run, the matching
    // hook's config for a hook run
    let active_config = match config.executor.executor_type {
      ExecutorType::Task => &details.job.task.config,
      ExecutorType::Hook => &details.job.hook(&config.executor.name)?.config,
    };

    let (confs, secret_confs) = self.compile_configs(active_config, &task_context)?;

    let mut configs = system_defined_vars;
    configs.extend(confs);
    configs.insert(
      CONFIG_KEY_JOB_LABELS.to_string(),
      get_job_labels(&details.job),
    );

    Ok(ExecutorInput {
      configs,
      secrets: secret_confs,
      files,
    })
  }

  /// 分两趟编译配置：明文与密钥各自独立
  /// Compile configs in two passes: plaintext and secrets independently
  fn compile_configs(
    &self,
    configs: &HashMap<String, String>,
    context: &Context,
  ) -> Result<(HashMap<String, String>, HashMap<String, String>)> {
    let (plain, secrets) = split_config_with_secrets(configs);

    let compiled_plain = self.compiler.compile(&plain, context)?;
    let compiled_secrets = self.compiler.compile(&secrets, context)?;

    Ok((compiled_plain, compiled_secrets))
  }
}

/// 按键值启发式把配置分成明文与密钥两个不相交的映射
/// Partition configs into two disjoint maps, plaintext and secrets, by
/// key/value heuristics
///
/// 键名以 secret 开头（大小写不敏感）或模板值引用了 secret 查找的条目
/// 归入密钥分区。
/// An entry whose key begins with secret (case-insensitive) or whose
/// template value references a secret lookup lands in the secret partition.
fn split_config_with_secrets(
  configs: &HashMap<String, String>,
) -> (HashMap<String, String>, HashMap<String, String>) {
  let mut plain = HashMap::new();
  let mut secrets = HashMap::new();
  for (key, value) in configs {
    if key.to_lowercase().starts_with("secret") || value.contains("secret.") {
      secrets.insert(key.clone(), value.clone());
    } else {
      plain.insert(key.clone(), value.clone());
    }
  }
  (plain, secrets)
}

/// 系统定义变量：时间窗口边界、执行时间与目标资源
/// System-defined variables: window bounds, execution time and destination
fn get_system_defined_configs(
  job: &Job,
  interval: Interval,
  executed_at: DateTime<Utc>,
) -> HashMap<String, String> {
  HashMap::from([
    (CONFIG_KEY_DSTART.to_string(), format_rfc3339(interval.start)),
    (CONFIG_KEY_DEND.to_string(), format_rfc3339(interval.end)),
    (
      CONFIG_KEY_EXECUTION_TIME.to_string(),
      format_rfc3339(executed_at),
    ),
    (CONFIG_KEY_DESTINATION.to_string(), job.destination.clone()),
  ])
}

/// RFC3339，UTC，秒精度
/// RFC3339 in UTC at second precision
fn format_rfc3339(at: DateTime<Utc>) -> String {
  at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// 作业标签集合，逗号拼接
/// The job label set, comma-joined
fn get_job_labels(job: &Job) -> String {
  format!(
    "project={},namespace={},job_name={},job_id={}",
    sanitise_label(job.tenant.project_name().as_str()),
    sanitise_label(job.tenant.namespace_name().as_str()),
    sanitise_label(job.name.as_str()),
    sanitise_label(&job.id.to_string()),
  )
}

/// 清洗标签值：转小写，[a-z0-9-] 之外的字符替换为 -，
/// 超长时保留末尾 61 个字符并加 __ 前缀标记截断
/// Sanitise a label value: lowercase, replace anything outside [a-z0-9-]
/// with -, and when over-long keep the last 61 chars behind a __ truncation
/// marker
fn sanitise_label(value: &str) -> String {
  let mut label: String = value
    .to_lowercase()
    .chars()
    .map(|c| {
      if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' {
        c
      } else {
        '-'
      }
    })
    .collect();
  if label.len() > MAX_LABEL_LENGTH {
    label = format!("__{}", &label[label.len() - (MAX_LABEL_LENGTH - 2)..]);
  }
  label
}

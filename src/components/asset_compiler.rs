//! 资产编译器模块
//! Asset compiler module
//!
//! 编译作业运行的资产文件
//! Compiles a job run's asset files
//!
//! 如果任务插件带有依赖模块，先让插件预处理文件集，再整体走模板求值；
//! If the task plugin carries a dependency mod, the plugin preprocesses the
//! fileset first, then the whole set goes through template evaluation;
//! 否则直接对作业声明的资产求值。
//! otherwise the job's declared assets are evaluated directly.

use crate::base::constants::TYPE_ENV;
use crate::compiler::{Context, Engine};
use crate::error::Result;
use crate::job::Job;
use crate::plugin::{CompileAssetsRequest, JobRunSpecData, PluginRepo};
use crate::window::Interval;
use std::collections::HashMap;
use std::sync::Arc;

/// 作业运行资产编译器
/// Job run assets compiler
pub struct JobRunAssetsCompiler {
  compiler: Arc<Engine>,
  plugin_repo: Arc<dyn PluginRepo>,
}

impl JobRunAssetsCompiler {
  /// 创建新的资产编译器
  /// Create a new assets compiler
  pub fn new(compiler: Arc<Engine>, plugin_repo: Arc<dyn PluginRepo>) -> Self {
    Self {
      compiler,
      plugin_repo,
    }
  }

  /// 编译一次作业运行的全部资产文件
  /// Compile every asset file of one job run
  ///
  /// 插件或模板的任何失败原样上抛。
  /// Any plugin or template failure surfaces unchanged.
  pub async fn compile_job_run_assets(
    &self,
    job: &Job,
    system_env_vars: &HashMap<String, String>,
    interval: Interval,
    context_for_task: &Context,
  ) -> Result<HashMap<String, String>> {
    let task_plugin = self.plugin_repo.get_by_name(&job.task.name).map_err(|e| {
      tracing::error!("error getting plugin [{}]: {}", job.task.name, e);
      e
    })?;

    let mut input_files = job.assets.clone();

    if let Some(dependency_mod) = &task_plugin.dependency_mod {
      // 任务插件接管编译前的资产处理
      // The task plugin takes over asset preparation before compilation
      let compiled_asset_response = dependency_mod
        .compile_assets(CompileAssetsRequest {
          start_time: interval.start,
          end_time: interval.end,
          config: job.task.config.clone(),
          assets: job.assets.clone(),
          instance_data: to_job_run_spec_data(system_env_vars),
        })
        .await
        .map_err(|e| {
          tracing::error!("error compiling assets through plugin dependency mod: {}", e);
          e
        })?;
      input_files = compiled_asset_response.assets;
    }

    let file_map = self
      .compiler
      .compile(&input_files, context_for_task)
      .map_err(|e| {
        tracing::error!("error compiling assets: {}", e);
        e
      })?;
    Ok(file_map)
  }
}

/// 把系统变量展平为实例数据条目，按名称排序保证确定性
/// Flatten system variables into instance data entries, sorted by name for
/// determinism
fn to_job_run_spec_data(mapping: &HashMap<String, String>) -> Vec<JobRunSpecData> {
  let mut job_run_data: Vec<JobRunSpecData> = mapping
    .iter()
    .map(|(name, value)| JobRunSpecData {
      name: name.clone(),
      value: value.clone(),
      data_type: TYPE_ENV.to_string(),
    })
    .collect();
  job_run_data.sort_by(|a, b| a.name.cmp(&b.name));
  job_run_data
}

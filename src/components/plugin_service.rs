//! 插件服务模块
//! Plugin service module
//!
//! 通过插件的能力槽提供作业侧的三项操作：
//! Exposes the three job-side operations backed by plugin capabilities:
//! 读取静态元信息、生成目标资源、生成上游依赖。
//! reading static metadata, generating the destination, and generating
//! upstream dependencies.

use crate::base::constants::{
  CONFIG_KEY_DEND, CONFIG_KEY_DESTINATION, CONFIG_KEY_DSTART, CONFIG_KEY_EXECUTION_TIME,
  CONTEXT_PROJECT, CONTEXT_SECRET, PROJECT_CONFIG_PREFIX,
};
use crate::compiler::{from, prepare_context, Context, Engine};
use crate::error::{Error, Result};
use crate::job::{JobWithDetails, Task};
use crate::plugin::{
  GenerateDependenciesRequest, GenerateDestinationRequest, Plugin, PluginInfo, PluginOptions,
  PluginRepo,
};
use crate::tenant::TenantDetails;
use crate::window::Window;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// 作业插件服务
/// Job plugin service
pub struct JobPluginService {
  plugin_repo: Arc<dyn PluginRepo>,
  engine: Arc<Engine>,

  now: fn() -> DateTime<Utc>,
}

impl JobPluginService {
  /// 创建新的插件服务
  /// Create a new plugin service
  pub fn new(plugin_repo: Arc<dyn PluginRepo>, engine: Arc<Engine>) -> Self {
    Self {
      plugin_repo,
      engine,
      now: Utc::now,
    }
  }

  /// 注入当前时间来源，供测试固定时钟
  /// Inject the clock source, letting tests pin the current time
  pub fn with_now(mut self, now: fn() -> DateTime<Utc>) -> Self {
    self.now = now;
    self
  }

  /// 读取任务插件的静态元信息
  /// Read the task plugin's static metadata
  pub fn info(&self, task_name: &str) -> Result<PluginInfo> {
    let task_plugin = self.plugin_repo.get_by_name(task_name).map_err(|e| {
      tracing::error!("error getting plugin [{}]: {}", task_name, e);
      e
    })?;

    match &task_plugin.yaml_mod {
      Some(yaml_mod) => Ok(yaml_mod.plugin_info().clone()),
      None => {
        tracing::error!("task plugin yaml mod is not found");
        Err(Error::YamlModNotExist)
      }
    }
  }

  /// 生成任务写入的目标资源 URN
  /// Generate the resource URN the task writes to
  pub async fn generate_destination(
    &self,
    tenant: &TenantDetails,
    task: &Task,
  ) -> Result<String> {
    let task_plugin = self.plugin_repo.get_by_name(&task.name).map_err(|e| {
      tracing::error!("error getting plugin [{}]: {}", task.name, e);
      e
    })?;

    let Some(dependency_mod) = &task_plugin.dependency_mod else {
      tracing::error!("{}", Error::UpstreamModNotFound);
      return Err(Error::UpstreamModNotFound);
    };

    let compiled_config = self.compile_config(&task.config, tenant);

    let destination = dependency_mod
      .generate_destination(GenerateDestinationRequest {
        config: compiled_config,
        assets: HashMap::new(),
        options: PluginOptions::default(),
      })
      .await
      .map_err(|e| {
        tracing::error!("error generating destination: {}", e);
        Error::upstream(format!("failed to generate destination: {e}"))
      })?;

    Ok(destination.urn())
  }

  /// 生成作业的上游依赖资源列表
  /// Generate the job's upstream dependency resources
  pub async fn generate_upstreams(
    &self,
    job_tenant: &TenantDetails,
    details: &JobWithDetails,
    dry_run: bool,
  ) -> Result<Vec<String>> {
    let task_plugin = self
      .plugin_repo
      .get_by_name(&details.job.task.name)
      .map_err(|e| {
        tracing::error!("error getting plugin [{}]: {}", details.job.task.name, e);
        e
      })?;

    let Some(dependency_mod) = task_plugin.dependency_mod.clone() else {
      tracing::error!("{}", Error::UpstreamModNotFound);
      return Err(Error::UpstreamModNotFound);
    };

    let assets = self
      .compile_asset(&task_plugin, details, (self.now)())
      .await
      .map_err(|e| {
        tracing::error!("error compiling asset: {}", e);
        Error::upstream(format!("asset compilation failure: {e}"))
      })?;

    let compiled_configs = self.compile_config(&details.job.task.config, job_tenant);

    let response = dependency_mod
      .generate_dependencies(GenerateDependenciesRequest {
        config: compiled_configs,
        assets,
        options: PluginOptions { dry_run },
      })
      .await
      .map_err(|e| {
        tracing::error!("error generating dependencies: {}", e);
        e
      })?;

    Ok(response.dependencies)
  }

  /// 基于项目配置与密钥逐条编译配置，单条失败时保留原始模板文本
  /// Compile configs entry by entry against project configs and secrets,
  /// keeping the original template text when an entry fails
  fn compile_config(
    &self,
    configs: &HashMap<String, String>,
    tenant: &TenantDetails,
  ) -> HashMap<String, String> {
    let template_context = prepare_context([
      from(tenant.get_configs())
        .with_name(CONTEXT_PROJECT)
        .with_key_prefix(PROJECT_CONFIG_PREFIX),
      from(tenant.secrets_map()).with_name(CONTEXT_SECRET),
    ]);

    configs
      .iter()
      .map(|(key, value)| {
        let compiled = match self.engine.compile_string(value, &template_context) {
          Ok(compiled) => compiled,
          Err(e) => {
            tracing::warn!("template compilation encountered suppressed error: {}", e);
            value.clone()
          }
        };
        (key.clone(), compiled)
      })
      .collect()
  }

  /// 为依赖生成准备资产：必要时先干跑生成目标，再按窗口求值模板
  /// Prepare assets for dependency generation: dry-run the destination when
  /// possible, then evaluate templates against the window
  async fn compile_asset(
    &self,
    task_plugin: &Plugin,
    details: &JobWithDetails,
    scheduled_at: DateTime<Utc>,
  ) -> Result<HashMap<String, String>> {
    let mut job_destination = String::new();
    if let Some(dependency_mod) = &task_plugin.dependency_mod {
      let destination_response = dependency_mod
        .generate_destination(GenerateDestinationRequest {
          config: details.job.task.config.clone(),
          assets: details.job.assets.clone(),
          options: PluginOptions { dry_run: true },
        })
        .await
        .map_err(|e| {
          tracing::error!("error generating destination: {}", e);
          e
        })?;
      job_destination = destination_response.destination;
    }

    let window = Window::from_config(&details.job.window_config);
    let interval = window.get_interval(scheduled_at)?;

    let iso = |at: DateTime<Utc>| at.to_rfc3339_opts(SecondsFormat::Secs, true);
    let mut context = Context::new();
    context.insert(CONFIG_KEY_DSTART.to_string(), Value::String(iso(interval.start)));
    context.insert(CONFIG_KEY_DEND.to_string(), Value::String(iso(interval.end)));
    context.insert(
      CONFIG_KEY_EXECUTION_TIME.to_string(),
      Value::String(iso(scheduled_at)),
    );
    context.insert(
      CONFIG_KEY_DESTINATION.to_string(),
      Value::String(job_destination),
    );

    self
      .engine
      .compile(&details.job.assets, &context)
      .map_err(|e| Error::upstream(format!("failed to compile templates: {e}")))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::job::{Job, JobName, Schedule};
  use crate::plugin::{
    CompileAssetsRequest, CompileAssetsResponse, DependencyMod, GenerateDependenciesResponse,
    GenerateDestinationResponse, YamlMod,
  };
  use crate::tenant::{Namespace, PlainTextSecret, Project, Tenant};
  use crate::window::WindowConfig;
  use async_trait::async_trait;
  use chrono::TimeZone;
  use uuid::Uuid;

  struct StaticPluginRepo {
    plugin: Arc<Plugin>,
  }

  impl PluginRepo for StaticPluginRepo {
    fn get_by_name(&self, _name: &str) -> Result<Arc<Plugin>> {
      Ok(self.plugin.clone())
    }
  }

  struct StaticYamlMod {
    info: PluginInfo,
  }

  impl YamlMod for StaticYamlMod {
    fn plugin_info(&self) -> &PluginInfo {
      &self.info
    }
  }

  struct TableDependencyMod;

  #[async_trait]
  impl DependencyMod for TableDependencyMod {
    async fn generate_destination(
      &self,
      request: GenerateDestinationRequest,
    ) -> Result<GenerateDestinationResponse> {
      // 配置应当已经过一轮项目上下文编译
      // Configs should already have gone through project-context compilation
      let table = request
        .config
        .get("TABLE")
        .cloned()
        .unwrap_or_else(|| "fallback.table".to_string());
      Ok(GenerateDestinationResponse {
        destination: table,
        resource_type: "bigquery".to_string(),
      })
    }

    async fn generate_dependencies(
      &self,
      request: GenerateDependenciesRequest,
    ) -> Result<GenerateDependenciesResponse> {
      assert!(request.options.dry_run);
      Ok(GenerateDependenciesResponse {
        dependencies: vec!["bigquery://upstream.table".to_string()],
      })
    }

    async fn compile_assets(&self, _request: CompileAssetsRequest) -> Result<CompileAssetsResponse> {
      Ok(CompileAssetsResponse::default())
    }
  }

  fn tenant_details() -> TenantDetails {
    TenantDetails::new(
      Project::new(
        "proj1",
        HashMap::from([("DATASET".to_string(), "warehouse".to_string())]),
      )
      .unwrap(),
      Namespace::new("ns1", HashMap::new()).unwrap(),
      vec![PlainTextSecret::new("token", "s3cr3t").unwrap()],
    )
  }

  fn details_with_task_config(config: HashMap<String, String>) -> JobWithDetails {
    JobWithDetails {
      job: Job {
        id: Uuid::nil(),
        name: JobName::new("job1").unwrap(),
        tenant: Tenant::new("proj1", "ns1").unwrap(),
        destination: String::new(),
        task: Task {
          name: "bq2bq".to_string(),
          config,
        },
        hooks: vec![],
        window_config: WindowConfig::new("24h", "", "d"),
        assets: HashMap::from([(
          "query.sql".to_string(),
          "select * from t where dt >= '{{ DSTART }}'".to_string(),
        )]),
      },
      schedule: Schedule {
        interval: "0 * * * *".to_string(),
      },
    }
  }

  fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, 6, 1, 12, 30, 0).unwrap()
  }

  #[test]
  fn test_info_requires_yaml_mod() {
    let service = JobPluginService::new(
      Arc::new(StaticPluginRepo {
        plugin: Arc::new(Plugin::default()),
      }),
      Arc::new(Engine::new()),
    );
    let err = service.info("bq2bq").unwrap_err();
    assert!(matches!(err, Error::YamlModNotExist));
    assert_eq!(err.to_string(), "yaml mod not found for plugin");
  }

  #[test]
  fn test_info_returns_plugin_metadata() {
    let info = PluginInfo {
      name: "bq2bq".to_string(),
      description: "bigquery to bigquery".to_string(),
      ..Default::default()
    };
    let service = JobPluginService::new(
      Arc::new(StaticPluginRepo {
        plugin: Arc::new(Plugin::new(None, Some(Arc::new(StaticYamlMod { info })))),
      }),
      Arc::new(Engine::new()),
    );
    assert_eq!(service.info("bq2bq").unwrap().name, "bq2bq");
  }

  #[tokio::test]
  async fn test_generate_destination_requires_dependency_mod() {
    let service = JobPluginService::new(
      Arc::new(StaticPluginRepo {
        plugin: Arc::new(Plugin::default()),
      }),
      Arc::new(Engine::new()),
    );
    let err = service
      .generate_destination(&tenant_details(), &Task::default())
      .await
      .unwrap_err();
    assert!(matches!(err, Error::UpstreamModNotFound));
  }

  #[tokio::test]
  async fn test_generate_destination_compiles_config_best_effort() {
    let service = JobPluginService::new(
      Arc::new(StaticPluginRepo {
        plugin: Arc::new(Plugin::new(Some(Arc::new(TableDependencyMod)), None)),
      }),
      Arc::new(Engine::new()),
    );

    let task = Task {
      name: "bq2bq".to_string(),
      config: HashMap::from([
        ("TABLE".to_string(), "{{ proj.DATASET }}.events".to_string()),
        // 单条编译失败的条目保留原文
        // A failing entry keeps its original text
        ("BROKEN".to_string(), "{{ unterminated".to_string()),
      ]),
    };

    let urn = service
      .generate_destination(&tenant_details(), &task)
      .await
      .unwrap();
    assert_eq!(urn, "bigquery://warehouse.events");
  }

  #[tokio::test]
  async fn test_generate_upstreams() {
    let service = JobPluginService::new(
      Arc::new(StaticPluginRepo {
        plugin: Arc::new(Plugin::new(Some(Arc::new(TableDependencyMod)), None)),
      }),
      Arc::new(Engine::new()),
    )
    .with_now(fixed_now);

    let upstreams = service
      .generate_upstreams(&tenant_details(), &details_with_task_config(HashMap::new()), true)
      .await
      .unwrap();
    assert_eq!(upstreams, vec!["bigquery://upstream.table".to_string()]);
  }

  #[tokio::test]
  async fn test_generate_upstreams_surfaces_window_failure() {
    let mut details = details_with_task_config(HashMap::new());
    details.job.window_config = WindowConfig::new("2", "", "d");

    let service = JobPluginService::new(
      Arc::new(StaticPluginRepo {
        plugin: Arc::new(Plugin::new(Some(Arc::new(TableDependencyMod)), None)),
      }),
      Arc::new(Engine::new()),
    )
    .with_now(fixed_now);

    let err = service
      .generate_upstreams(&tenant_details(), &details, false)
      .await
      .unwrap_err();
    assert!(err
      .to_string()
      .contains("failed to parse task window with size 2"));
  }
}

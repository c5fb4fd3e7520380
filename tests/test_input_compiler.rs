//! 执行器输入编译器的集成测试
//! Integration tests for the executor input compiler

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use replayq::compiler::Engine;
use replayq::components::asset_compiler::JobRunAssetsCompiler;
use replayq::components::input_compiler::JobInputCompiler;
use replayq::error::{Error, Result};
use replayq::job::{Executor, Hook, Job, JobName, JobWithDetails, RunConfig, Schedule, Task};
use replayq::plugin::{Plugin, PluginRepo};
use replayq::tenant::{
  Namespace, PlainTextSecret, Project, Tenant, TenantDetails, TenantService,
};
use replayq::window::WindowConfig;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

struct StaticTenantService {
  details: TenantDetails,
}

#[async_trait]
impl TenantService for StaticTenantService {
  async fn get_details(&self, _tenant: &Tenant) -> Result<TenantDetails> {
    Ok(self.details.clone())
  }
}

struct FailingTenantService;

#[async_trait]
impl TenantService for FailingTenantService {
  async fn get_details(&self, _tenant: &Tenant) -> Result<TenantDetails> {
    Err(Error::upstream("get details error"))
  }
}

struct StaticPluginRepo;

impl PluginRepo for StaticPluginRepo {
  fn get_by_name(&self, _name: &str) -> Result<Arc<Plugin>> {
    Ok(Arc::new(Plugin::default()))
  }
}

/// 被调用即 panic，用来断言短路路径没有触达后续协作者
/// Panics when called, asserting short-circuit paths never reach later
/// collaborators
struct UnreachablePluginRepo;

impl PluginRepo for UnreachablePluginRepo {
  fn get_by_name(&self, _name: &str) -> Result<Arc<Plugin>> {
    panic!("plugin repo must not be called");
  }
}

fn tenant_details() -> TenantDetails {
  TenantDetails::new(
    Project::new(
      "proj1",
      HashMap::from([
        ("STORAGE_PATH".to_string(), "somePath".to_string()),
        ("SCHEDULER_HOST".to_string(), "localhost".to_string()),
      ]),
    )
    .unwrap(),
    Namespace::new("ns1", HashMap::new()).unwrap(),
    vec![
      PlainTextSecret::new("secretName", "secretValue").unwrap(),
      PlainTextSecret::new("secret2Name", "secret2Value").unwrap(),
    ],
  )
}

fn sample_job() -> Job {
  Job {
    id: Uuid::nil(),
    name: JobName::new("job1").unwrap(),
    tenant: Tenant::new("proj1", "ns1").unwrap(),
    destination: "some_destination_table_name".to_string(),
    task: Task {
      name: "bq2bq".to_string(),
      config: HashMap::from([
        ("some.config".to_string(), "val".to_string()),
        ("secret.config".to_string(), "a.secret.val".to_string()),
      ]),
    },
    hooks: vec![],
    window_config: WindowConfig::new("24h", "1h", "d"),
    assets: HashMap::new(),
  }
}

fn details_of(job: Job) -> JobWithDetails {
  JobWithDetails {
    job,
    schedule: Schedule {
      interval: "0 * * * *".to_string(),
    },
  }
}

fn scheduled_at() -> DateTime<Utc> {
  Utc.with_ymd_and_hms(2023, 5, 10, 14, 0, 0).unwrap()
}

fn executed_at() -> DateTime<Utc> {
  Utc.with_ymd_and_hms(2023, 5, 10, 16, 0, 0).unwrap()
}

fn run_config(executor: Executor) -> RunConfig {
  RunConfig {
    executor,
    scheduled_at: scheduled_at(),
    job_run_id: Uuid::nil(),
  }
}

fn compiler_with(tenant_service: Arc<dyn TenantService>) -> JobInputCompiler {
  let engine = Arc::new(Engine::new());
  let asset_compiler = Arc::new(JobRunAssetsCompiler::new(
    engine.clone(),
    Arc::new(StaticPluginRepo),
  ));
  JobInputCompiler::new(tenant_service, engine, asset_compiler)
}

#[tokio::test]
async fn test_compile_fails_when_tenant_lookup_fails() {
  let engine = Arc::new(Engine::new());
  let asset_compiler = Arc::new(JobRunAssetsCompiler::new(
    engine.clone(),
    Arc::new(UnreachablePluginRepo),
  ));
  let input_compiler =
    JobInputCompiler::new(Arc::new(FailingTenantService), engine, asset_compiler);

  let err = input_compiler
    .compile(
      &details_of(sample_job()),
      &run_config(Executor::task("bq2bq")),
      executed_at(),
    )
    .await
    .unwrap_err();

  // 租户查询失败后不再有任何后续调用
  // After the tenant lookup failure no further calls are made
  assert_eq!(err.to_string(), "get details error");
}

#[tokio::test]
async fn test_compile_fails_on_malformed_window_size() {
  let mut job = sample_job();
  job.window_config = WindowConfig::new("2", "2h", "d");

  let engine = Arc::new(Engine::new());
  let asset_compiler = Arc::new(JobRunAssetsCompiler::new(
    engine.clone(),
    Arc::new(UnreachablePluginRepo),
  ));
  let input_compiler = JobInputCompiler::new(
    Arc::new(StaticTenantService {
      details: tenant_details(),
    }),
    engine,
    asset_compiler,
  );

  let err = input_compiler
    .compile(&details_of(job), &run_config(Executor::task("bq2bq")), executed_at())
    .await
    .unwrap_err();

  assert_eq!(
    err.to_string(),
    "failed to parse task window with size 2: missing unit in duration \"2\""
  );
}

#[tokio::test]
async fn test_compile_task_happy_path() {
  let input_compiler = compiler_with(Arc::new(StaticTenantService {
    details: tenant_details(),
  }));

  let input = input_compiler
    .compile(
      &details_of(sample_job()),
      &run_config(Executor::task("bq2bq")),
      executed_at(),
    )
    .await
    .unwrap();

  // 窗口：按天截断加一小时偏移，大小 24 小时
  // Window: day truncation plus a one hour shift, 24 hours wide
  assert_eq!(input.configs["DSTART"], "2023-05-09T01:00:00Z");
  assert_eq!(input.configs["DEND"], "2023-05-10T01:00:00Z");
  assert_eq!(input.configs["EXECUTION_TIME"], "2023-05-10T16:00:00Z");
  assert_eq!(
    input.configs["JOB_DESTINATION"],
    "some_destination_table_name"
  );
  assert_eq!(input.configs["some.config"], "val");
  assert!(!input.configs.contains_key("secret.config"));

  assert_eq!(input.secrets.len(), 1);
  assert_eq!(input.secrets["secret.config"], "a.secret.val");

  let labels: HashSet<&str> = input.configs["JOB_LABELS"].split(',').collect();
  let expected: HashSet<&str> = HashSet::from([
    "project=proj1",
    "namespace=ns1",
    "job_name=job1",
    "job_id=00000000-0000-0000-0000-000000000000",
  ]);
  assert_eq!(labels, expected);
}

#[tokio::test]
async fn test_compile_evaluates_templates_and_assets() {
  let mut job = sample_job();
  job.task.config = HashMap::from([
    ("LOCATION".to_string(), "{{ GLOBAL__STORAGE_PATH }}".to_string()),
    ("SECRET_TOKEN".to_string(), "{{ secret.secretName }}".to_string()),
  ]);
  job.assets = HashMap::from([(
    "query.sql".to_string(),
    "select * from t where dt >= '{{ DSTART }}' and dt < '{{ DEND }}'".to_string(),
  )]);

  let input_compiler = compiler_with(Arc::new(StaticTenantService {
    details: tenant_details(),
  }));

  let input = input_compiler
    .compile(&details_of(job), &run_config(Executor::task("bq2bq")), executed_at())
    .await
    .unwrap();

  assert_eq!(input.configs["LOCATION"], "somePath");
  // 以 SECRET 开头的键路由到密钥映射
  // Keys starting with SECRET route into the secrets map
  assert_eq!(input.secrets["SECRET_TOKEN"], "secretValue");
  assert_eq!(
    input.files["query.sql"],
    "select * from t where dt >= '2023-05-09T01:00:00Z' and dt < '2023-05-10T01:00:00Z'"
  );

  // configs 与 secrets 的键集合互不相交
  // The configs and secrets key sets are disjoint
  assert!(input.configs.keys().all(|k| !input.secrets.contains_key(k)));
}

#[tokio::test]
async fn test_compile_round_trips_execution_time() {
  let input_compiler = compiler_with(Arc::new(StaticTenantService {
    details: tenant_details(),
  }));

  let input = input_compiler
    .compile(
      &details_of(sample_job()),
      &run_config(Executor::task("bq2bq")),
      executed_at(),
    )
    .await
    .unwrap();

  let parsed: DateTime<Utc> = input.configs["EXECUTION_TIME"].parse().unwrap();
  assert_eq!(parsed, executed_at());
}

#[tokio::test]
async fn test_compile_sanitises_job_labels() {
  let mut job = sample_job();
  job.id = Uuid::new_v4();
  job.name =
    JobName::new("nameWith Invalid~Characters)(Which Are.even.LongerThan^63Charancters").unwrap();

  let input_compiler = compiler_with(Arc::new(StaticTenantService {
    details: tenant_details(),
  }));

  let input = input_compiler
    .compile(&details_of(job.clone()), &run_config(Executor::task("bq2bq")), executed_at())
    .await
    .unwrap();

  let labels: HashSet<String> = input.configs["JOB_LABELS"]
    .split(',')
    .map(str::to_string)
    .collect();
  assert!(labels.contains(
    "job_name=__h-invalid-characters--which-are-even-longerthan-63charancters"
  ));
  assert!(labels.contains(&format!("job_id={}", job.id)));
  assert!(labels.contains("project=proj1"));
  assert!(labels.contains("namespace=ns1"));
}

#[tokio::test]
async fn test_compile_hook_executor() {
  let mut job = sample_job();
  job.hooks = vec![Hook {
    name: "predator".to_string(),
    config: HashMap::from([
      ("hook_some_config".to_string(), "val".to_string()),
      ("hook_secret".to_string(), "a.secret.val".to_string()),
    ]),
  }];

  let input_compiler = compiler_with(Arc::new(StaticTenantService {
    details: tenant_details(),
  }));

  let input = input_compiler
    .compile(&details_of(job), &run_config(Executor::hook("predator")), executed_at())
    .await
    .unwrap();

  // 钩子运行使用钩子自己的配置集
  // A hook run uses the hook's own config set
  assert_eq!(input.configs["hook_some_config"], "val");
  assert!(!input.configs.contains_key("some.config"));
  assert_eq!(input.secrets["hook_secret"], "a.secret.val");
  assert!(!input.secrets.contains_key("secret.config"));
}

#[tokio::test]
async fn test_compile_fails_when_hook_absent() {
  let input_compiler = compiler_with(Arc::new(StaticTenantService {
    details: tenant_details(),
  }));

  let err = input_compiler
    .compile(
      &details_of(sample_job()),
      &run_config(Executor::hook("predator")),
      executed_at(),
    )
    .await
    .unwrap_err();

  assert!(err.is_not_found());
  assert!(err.to_string().contains("hook:predator"));
}

#[tokio::test]
async fn test_compile_surfaces_template_failure_with_key() {
  let mut job = sample_job();
  job.task.config = HashMap::from([(
    "broken.config".to_string(),
    "{{ unterminated".to_string(),
  )]);

  let input_compiler = compiler_with(Arc::new(StaticTenantService {
    details: tenant_details(),
  }));

  let err = input_compiler
    .compile(&details_of(job), &run_config(Executor::task("bq2bq")), executed_at())
    .await
    .unwrap_err();

  assert!(matches!(err, Error::TemplateCompileFailed { .. }));
  assert!(err.to_string().contains("broken.config"));
}

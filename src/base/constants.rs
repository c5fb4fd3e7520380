use std::time::Duration;

/// 窗口起点配置键
pub const CONFIG_KEY_DSTART: &str = "DSTART";
/// 窗口终点配置键
pub const CONFIG_KEY_DEND: &str = "DEND";
/// 实际执行时间配置键
pub const CONFIG_KEY_EXECUTION_TIME: &str = "EXECUTION_TIME";
/// 目标资源配置键
pub const CONFIG_KEY_DESTINATION: &str = "JOB_DESTINATION";
/// 作业标签配置键
pub const CONFIG_KEY_JOB_LABELS: &str = "JOB_LABELS";

/// 项目配置平铺到模板上下文时的键前缀
/// Key prefix for project configs flattened into the template context
pub const PROJECT_CONFIG_PREFIX: &str = "GLOBAL__";

/// 模板上下文中的项目配置子对象名
pub const CONTEXT_PROJECT: &str = "proj";
/// 模板上下文中的密钥子对象名
pub const CONTEXT_SECRET: &str = "secret";
/// 模板上下文中的系统变量子对象名
pub const CONTEXT_SYSTEM_DEFINED: &str = "system";

/// 回放工作器发起的运行的 ID 前缀
/// Run id prefix for worker-initiated runs
pub const PREFIX_REPLAYED: &str = "replayed";

/// 实例数据条目的类型标记
pub const TYPE_ENV: &str = "env";

/// 单个回放请求的默认处理时限
/// Default processing bound for a single replay request
pub const DEFAULT_REPLAY_TIMEOUT: Duration = Duration::from_secs(3 * 60 * 60); // 3 小时

/// 版本信息
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! 错误处理模块
//! Error handling module
//!
//! 定义了 Replayq 库中使用的各种错误类型
//! Defines various error types used in the Replayq library

use thiserror::Error;

/// Replayq 库的结果类型
/// Result type for the Replayq library
pub type Result<T> = std::result::Result<T, Error>;

/// Replayq 错误类型
/// Replayq error type
#[derive(Error, Debug, Clone)]
pub enum Error {
  /// 实体或调度器运行不存在
  /// Entity or scheduler run is absent
  #[error("{entity} not found: {message}")]
  NotFound { entity: String, message: String },

  /// 非法输入
  /// Invalid input
  #[error("invalid input: {message}")]
  InvalidInput { message: String },

  /// 时间窗口配置非法
  /// Window configuration is invalid
  ///
  /// 错误消息中总是包含出错的字段名
  /// The message always names the offending field
  #[error("{0}")]
  InvalidWindow(String),

  /// 上游不可用：调度器 RPC 或仓储写入失败
  /// Upstream unavailable: scheduler RPC or repository write failed
  #[error("{message}")]
  UpstreamUnavailable { message: String },

  /// 模板编译失败
  /// Template compilation failed
  #[error("failed to compile template \"{key}\": {message}")]
  TemplateCompileFailed { key: String, message: String },

  /// 插件缺少依赖模块能力
  /// Plugin is missing its dependency mod capability
  #[error("upstream mod not found for plugin")]
  UpstreamModNotFound,

  /// 插件缺少 YAML 模块能力
  /// Plugin is missing its yaml mod capability
  #[error("yaml mod not found for plugin")]
  YamlModNotExist,

  /// 超时错误
  /// Timeout error
  #[error("operation timeout")]
  Timeout,

  /// 取消错误
  /// Cancellation error
  #[error("operation cancelled")]
  Cancelled,

  /// 多个错误的聚合
  /// Aggregation of multiple errors
  #[error("{context}: [{}]", .messages.join("; "))]
  Multi {
    context: String,
    messages: Vec<String>,
  },
}

impl Error {
  /// 创建未找到错误
  /// Create a not found error
  pub fn not_found<E: Into<String>, S: Into<String>>(entity: E, message: S) -> Self {
    Self::NotFound {
      entity: entity.into(),
      message: message.into(),
    }
  }

  /// 创建非法输入错误
  /// Create an invalid input error
  pub fn invalid_input<S: Into<String>>(message: S) -> Self {
    Self::InvalidInput {
      message: message.into(),
    }
  }

  /// 创建上游不可用错误
  /// Create an upstream unavailable error
  pub fn upstream<S: Into<String>>(message: S) -> Self {
    Self::UpstreamUnavailable {
      message: message.into(),
    }
  }

  /// 创建模板编译错误
  /// Create a template compilation error
  pub fn template<K: Into<String>, S: Into<String>>(key: K, message: S) -> Self {
    Self::TemplateCompileFailed {
      key: key.into(),
      message: message.into(),
    }
  }

  /// 将一组错误聚合为单个错误；空集合返回 None
  /// Aggregate a set of errors into one; an empty set yields None
  ///
  /// 对应按批创建运行时的部分失败累积
  /// Used to accumulate partial failures when creating runs in bulk
  pub fn multi<S: Into<String>>(context: S, errors: Vec<Error>) -> Option<Self> {
    if errors.is_empty() {
      return None;
    }
    Some(Self::Multi {
      context: context.into(),
      messages: errors.iter().map(|e| e.to_string()).collect(),
    })
  }

  /// 检查是否为未找到错误
  /// Check whether the error is a not found error
  pub fn is_not_found(&self) -> bool {
    matches!(self, Error::NotFound { .. })
  }

  /// 检查是否为取消错误
  /// Check whether the error is a cancellation error
  pub fn is_cancelled(&self) -> bool {
    matches!(self, Error::Cancelled)
  }
}

//! 插件模块
//! Plugin module
//!
//! 定义了插件描述符及其可选能力槽
//! Defines the plugin descriptor and its optional capability slots
//!
//! 插件携带两个可选能力：依赖模块（生成目标资源与上游依赖，可接管资产
//! 编译）和 YAML 模块（静态元信息）。能力缺失是一等公民错误。
//! A plugin carries two optional capabilities: the dependency mod (generates
//! the destination and upstream dependencies, may take over asset
//! compilation) and the yaml mod (static metadata). A missing capability is a
//! first-class error.

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// 插件静态元信息
/// Static plugin metadata
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PluginInfo {
  pub name: String,
  pub description: String,
  pub plugin_type: String,
  pub plugin_version: String,
  pub image: String,
}

/// 插件调用选项
/// Plugin invocation options
#[derive(Debug, Clone, Copy, Default)]
pub struct PluginOptions {
  pub dry_run: bool,
}

/// 实例数据条目：传递给插件的展平系统变量
/// An instance data entry: a flattened system variable handed to the plugin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRunSpecData {
  pub name: String,
  pub value: String,
  #[serde(rename = "type")]
  pub data_type: String,
}

/// 资产编译请求
/// Asset compilation request
#[derive(Debug, Clone)]
pub struct CompileAssetsRequest {
  pub start_time: DateTime<Utc>,
  pub end_time: DateTime<Utc>,
  pub config: HashMap<String, String>,
  pub assets: HashMap<String, String>,
  pub instance_data: Vec<JobRunSpecData>,
}

/// 资产编译响应
/// Asset compilation response
#[derive(Debug, Clone, Default)]
pub struct CompileAssetsResponse {
  pub assets: HashMap<String, String>,
}

/// 目标资源生成请求
/// Destination generation request
#[derive(Debug, Clone, Default)]
pub struct GenerateDestinationRequest {
  pub config: HashMap<String, String>,
  pub assets: HashMap<String, String>,
  pub options: PluginOptions,
}

/// 目标资源生成响应
/// Destination generation response
#[derive(Debug, Clone, Default)]
pub struct GenerateDestinationResponse {
  pub destination: String,
  pub resource_type: String,
}

impl GenerateDestinationResponse {
  /// 目标资源的 URN 形式
  /// The destination as a resource URN
  pub fn urn(&self) -> String {
    format!("{}://{}", self.resource_type, self.destination)
  }
}

/// 上游依赖生成请求
/// Upstream dependency generation request
#[derive(Debug, Clone, Default)]
pub struct GenerateDependenciesRequest {
  pub config: HashMap<String, String>,
  pub assets: HashMap<String, String>,
  pub options: PluginOptions,
}

/// 上游依赖生成响应
/// Upstream dependency generation response
#[derive(Debug, Clone, Default)]
pub struct GenerateDependenciesResponse {
  pub dependencies: Vec<String>,
}

/// 依赖模块能力：生成目标、生成上游依赖、接管资产编译
/// Dependency mod capability: destination, upstream dependencies and asset
/// compilation takeover
#[async_trait]
pub trait DependencyMod: Send + Sync {
  async fn generate_destination(
    &self,
    request: GenerateDestinationRequest,
  ) -> Result<GenerateDestinationResponse>;

  async fn generate_dependencies(
    &self,
    request: GenerateDependenciesRequest,
  ) -> Result<GenerateDependenciesResponse>;

  async fn compile_assets(&self, request: CompileAssetsRequest) -> Result<CompileAssetsResponse>;
}

/// YAML 模块能力：静态元信息
/// Yaml mod capability: static metadata
pub trait YamlMod: Send + Sync {
  fn plugin_info(&self) -> &PluginInfo;
}

/// 插件描述符，两个能力槽都可以为空
/// Plugin descriptor, either capability slot may be absent
#[derive(Clone, Default)]
pub struct Plugin {
  pub dependency_mod: Option<Arc<dyn DependencyMod>>,
  pub yaml_mod: Option<Arc<dyn YamlMod>>,
}

impl Plugin {
  pub fn new(
    dependency_mod: Option<Arc<dyn DependencyMod>>,
    yaml_mod: Option<Arc<dyn YamlMod>>,
  ) -> Self {
    Self {
      dependency_mod,
      yaml_mod,
    }
  }
}

impl std::fmt::Debug for Plugin {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Plugin")
      .field("dependency_mod", &self.dependency_mod.is_some())
      .field("yaml_mod", &self.yaml_mod.is_some())
      .finish()
  }
}

/// 插件注册表特性，按名称查找插件
/// Plugin registry trait, looks up plugins by name
pub trait PluginRepo: Send + Sync {
  /// 按名称获取插件描述符；不存在时返回未找到错误
  /// Fetch a plugin descriptor by name; absence yields a not found error
  fn get_by_name(&self, name: &str) -> Result<Arc<Plugin>>;
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_destination_urn() {
    let response = GenerateDestinationResponse {
      destination: "project:dataset.table".to_string(),
      resource_type: "bigquery".to_string(),
    };
    assert_eq!(response.urn(), "bigquery://project:dataset.table");
  }

  #[test]
  fn test_plugin_debug_shows_capability_presence() {
    let plugin = Plugin::default();
    let rendered = format!("{plugin:?}");
    assert!(rendered.contains("dependency_mod: false"));
    assert!(rendered.contains("yaml_mod: false"));
  }
}

//! 租户模块
//! Tenant module
//!
//! 定义了项目、命名空间、密钥以及租户详情的数据结构
//! Defines data structures for projects, namespaces, secrets and tenant details
//!
//! 租户由 (project, namespace) 二元组标识，在任何操作的生命周期内不可变。
//! A tenant is identified by the (project, namespace) pair and is immutable
//! for the lifetime of any operation it appears in.

use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// 项目名称
/// Project name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectName(String);

impl ProjectName {
  /// 创建项目名称，不允许为空
  /// Create a project name, must not be empty
  pub fn new<S: Into<String>>(name: S) -> Result<Self> {
    let name = name.into();
    if name.trim().is_empty() {
      return Err(Error::invalid_input("project name is empty"));
    }
    Ok(Self(name))
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for ProjectName {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// 命名空间名称
/// Namespace name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NamespaceName(String);

impl NamespaceName {
  /// 创建命名空间名称，不允许为空
  /// Create a namespace name, must not be empty
  pub fn new<S: Into<String>>(name: S) -> Result<Self> {
    let name = name.into();
    if name.trim().is_empty() {
      return Err(Error::invalid_input("namespace name is empty"));
    }
    Ok(Self(name))
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for NamespaceName {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// 租户，由项目和命名空间标识
/// Tenant, identified by project and namespace
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tenant {
  project_name: ProjectName,
  namespace_name: NamespaceName,
}

impl Tenant {
  /// 创建新的租户
  /// Create a new tenant
  pub fn new<P: Into<String>, N: Into<String>>(project: P, namespace: N) -> Result<Self> {
    Ok(Self {
      project_name: ProjectName::new(project)?,
      namespace_name: NamespaceName::new(namespace)?,
    })
  }

  pub fn project_name(&self) -> &ProjectName {
    &self.project_name
  }

  pub fn namespace_name(&self) -> &NamespaceName {
    &self.namespace_name
  }
}

/// 明文密钥
/// Plaintext secret
///
/// 密钥值只在进程内流转，不参与序列化
/// Secret values only travel in-process and never serialize
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlainTextSecret {
  name: String,
  value: String,
}

impl PlainTextSecret {
  /// 创建明文密钥，名称和值都不允许为空
  /// Create a plaintext secret, neither name nor value may be empty
  pub fn new<N: Into<String>, V: Into<String>>(name: N, value: V) -> Result<Self> {
    let name = name.into();
    let value = value.into();
    if name.trim().is_empty() {
      return Err(Error::invalid_input("secret name is empty"));
    }
    if value.trim().is_empty() {
      return Err(Error::invalid_input("secret value is empty"));
    }
    Ok(Self { name, value })
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn value(&self) -> &str {
    &self.value
  }
}

/// 项目及其配置
/// Project with its configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
  name: ProjectName,
  config: HashMap<String, String>,
}

impl Project {
  pub fn new<S: Into<String>>(name: S, config: HashMap<String, String>) -> Result<Self> {
    Ok(Self {
      name: ProjectName::new(name)?,
      config,
    })
  }

  pub fn name(&self) -> &ProjectName {
    &self.name
  }

  pub fn config(&self) -> &HashMap<String, String> {
    &self.config
  }
}

/// 命名空间及其配置
/// Namespace with its configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
  name: NamespaceName,
  config: HashMap<String, String>,
}

impl Namespace {
  pub fn new<S: Into<String>>(name: S, config: HashMap<String, String>) -> Result<Self> {
    Ok(Self {
      name: NamespaceName::new(name)?,
      config,
    })
  }

  pub fn name(&self) -> &NamespaceName {
    &self.name
  }

  pub fn config(&self) -> &HashMap<String, String> {
    &self.config
  }
}

/// 租户详情：项目配置、命名空间配置和密钥集合
/// Tenant details: project configs, namespace configs and the secret set
#[derive(Debug, Clone)]
pub struct TenantDetails {
  project: Project,
  namespace: Namespace,
  secrets: Vec<PlainTextSecret>,
}

impl TenantDetails {
  pub fn new(project: Project, namespace: Namespace, secrets: Vec<PlainTextSecret>) -> Self {
    Self {
      project,
      namespace,
      secrets,
    }
  }

  pub fn project(&self) -> &Project {
    &self.project
  }

  pub fn namespace(&self) -> &Namespace {
    &self.namespace
  }

  /// 对应的租户标识
  /// The identifying tenant pair
  pub fn to_tenant(&self) -> Tenant {
    Tenant {
      project_name: self.project.name.clone(),
      namespace_name: self.namespace.name.clone(),
    }
  }

  /// 合并后的配置：命名空间配置覆盖同名的项目配置
  /// Merged configuration: namespace configs override project configs of the same key
  pub fn get_configs(&self) -> HashMap<String, String> {
    let mut configs = self.project.config.clone();
    configs.extend(self.namespace.config.clone());
    configs
  }

  /// 密钥名到密钥值的映射
  /// Mapping from secret name to secret value
  pub fn secrets_map(&self) -> HashMap<String, String> {
    self
      .secrets
      .iter()
      .map(|s| (s.name.clone(), s.value.clone()))
      .collect()
  }
}

/// 租户服务特性，定义了获取租户详情的接口
/// Tenant service trait, defines the interface for fetching tenant details
#[async_trait]
pub trait TenantService: Send + Sync {
  /// 获取租户详情（配置与密钥）
  /// Fetch tenant details (configs and secrets)
  async fn get_details(&self, tenant: &Tenant) -> Result<TenantDetails>;
}

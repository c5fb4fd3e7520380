//! 模板上下文构建模块
//! Template context assembly module
//!
//! 把多个字符串映射组装成一个嵌套的求值上下文。
//! Assembles several string maps into one nested evaluation context.
//!
//! 每个来源可以：挂在命名子对象下（`with_name`）、以升格加前缀的键平铺到
//! 顶层（`with_key_prefix`）、或原样平铺到顶层（`add_to_context`）。
//! Each source can be nested under a named sub-object (`with_name`), be
//! flattened to the top level with upcased prefixed keys (`with_key_prefix`),
//! or be flattened verbatim (`add_to_context`).

use super::Context;
use serde_json::Value;
use std::collections::HashMap;

/// 单个上下文来源及其装配方式
/// One context source and how it is assembled
#[derive(Debug, Clone)]
pub struct ContextBuilder {
  map: HashMap<String, String>,
  name: Option<String>,
  key_prefix: Option<String>,
  add_to_context: bool,
}

/// 从字符串映射创建上下文来源
/// Create a context source from a string map
pub fn from(map: HashMap<String, String>) -> ContextBuilder {
  ContextBuilder {
    map,
    name: None,
    key_prefix: None,
    add_to_context: false,
  }
}

impl ContextBuilder {
  /// 挂在指定名称的子对象下，供嵌套查找使用
  /// Nest under the given name for nested lookups
  pub fn with_name<S: Into<String>>(mut self, name: S) -> Self {
    self.name = Some(name.into());
    self
  }

  /// 额外以升格加前缀的键平铺到顶层
  /// Additionally flatten to the top level with upcased, prefixed keys
  pub fn with_key_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
    self.key_prefix = Some(prefix.into());
    self
  }

  /// 额外把键原样平铺到顶层
  /// Additionally flatten keys verbatim to the top level
  pub fn add_to_context(mut self) -> Self {
    self.add_to_context = true;
    self
  }
}

/// 装配完整的求值上下文
/// Assemble the full evaluation context
pub fn prepare_context<I>(sources: I) -> Context
where
  I: IntoIterator<Item = ContextBuilder>,
{
  let mut context = Context::new();
  for source in sources {
    if let Some(name) = &source.name {
      let nested: serde_json::Map<String, Value> = source
        .map
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();
      context.insert(name.clone(), Value::Object(nested));
    }
    if let Some(prefix) = &source.key_prefix {
      for (key, value) in &source.map {
        context.insert(
          format!("{}{}", prefix, key.to_uppercase()),
          Value::String(value.clone()),
        );
      }
    }
    if source.add_to_context {
      for (key, value) in &source.map {
        context.insert(key.clone(), Value::String(value.clone()));
      }
    }
  }
  context
}

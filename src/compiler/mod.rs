//! 模板编译模块
//! Template compilation module
//!
//! 在 minijinja 之上实现确定性的模板求值：
//! Implements deterministic template evaluation on top of minijinja:
//! 单个模板字符串求值，以及对字符串映射的整体求值。
//! evaluation of a single template string, and of a whole string map.
//!
//! 映射形式必须对每个条目求值；任何条目失败都会中止调用并带键名上抛。
//! The map form must evaluate every entry; any entry failure aborts the call
//! and surfaces with the key name attached.

use crate::error::{Error, Result};
use minijinja::Environment;
use serde_json::{Map, Value};
use std::collections::HashMap;

pub mod context;

pub use context::{from, prepare_context, ContextBuilder};

/// 模板求值上下文：嵌套的 JSON 对象
/// Template evaluation context: a nested JSON object
///
/// 模板通过 `proj.KEY`、`secret.NAME` 这样的嵌套查找访问上下文。
/// Templates access the context through nested lookups such as `proj.KEY`
/// and `secret.NAME`.
pub type Context = Map<String, Value>;

/// 模板引擎
/// Template engine
///
/// 无状态且纯：相同模板与上下文永远产生相同输出。
/// Stateless and pure: the same template and context always yield the same
/// output.
pub struct Engine {
  env: Environment<'static>,
}

impl Engine {
  /// 创建新的模板引擎
  /// Create a new template engine
  pub fn new() -> Self {
    Self {
      env: Environment::new(),
    }
  }

  /// 求值单个模板字符串
  /// Evaluate a single template string
  pub fn compile_string(&self, input: &str, context: &Context) -> Result<String> {
    self
      .env
      .render_str(input, Value::Object(context.clone()))
      .map_err(|e| Error::template("<string>", e.to_string()))
  }

  /// 求值整个模板映射
  /// Evaluate a whole template map
  ///
  /// 按键名排序遍历，保证哪个条目先失败是确定的。
  /// Entries are visited in sorted key order so the first failing entry is
  /// deterministic.
  pub fn compile(
    &self,
    template_map: &HashMap<String, String>,
    context: &Context,
  ) -> Result<HashMap<String, String>> {
    let mut keys: Vec<&String> = template_map.keys().collect();
    keys.sort();

    let ctx = Value::Object(context.clone());
    let mut compiled = HashMap::with_capacity(template_map.len());
    for key in keys {
      let rendered = self
        .env
        .render_str(&template_map[key], ctx.clone())
        .map_err(|e| Error::template(key.clone(), e.to_string()))?;
      compiled.insert(key.clone(), rendered);
    }
    Ok(compiled)
  }
}

impl Default for Engine {
  fn default() -> Self {
    Self::new()
  }
}

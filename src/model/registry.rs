// 该文件是 Yinxing （隐形） 项目的一部分。
// src/model/registry.rs - 模型注册表
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use thiserror::Error;
use tracing::debug;

use super::{
  Detector, Factory, Inpainter, LazyModel, ModelError, OpenVocabDetector, Segmentor, TextDetector,
};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
  #[error("注册表 '{registry}' 中不存在模型 '{name}'")]
  NotFound { registry: String, name: String },
  #[error("模型 '{name}' 已在注册表 '{registry}' 中注册")]
  Conflict { registry: String, name: String },
  #[error("注册表 '{registry}' 已冻结，无法注册 '{name}'")]
  Frozen { registry: String, name: String },
}

/// 名称到模型工厂的映射。
///
/// 注册只能发生在启动阶段：同名重复注册返回 [`RegistryError::Conflict`]，
/// 调用 [`Registry::freeze`] 之后的任何注册返回 [`RegistryError::Frozen`]。
/// 查找是纯读取，不做任何模糊匹配或默认回退。
pub struct Registry<A: ?Sized> {
  name: &'static str,
  entries: RwLock<BTreeMap<String, Factory<A>>>,
  frozen: AtomicBool,
}

impl<A: ?Sized> Registry<A> {
  pub const fn new(name: &'static str) -> Self {
    Self {
      name,
      entries: RwLock::new(BTreeMap::new()),
      frozen: AtomicBool::new(false),
    }
  }

  pub fn name(&self) -> &'static str {
    self.name
  }

  pub fn register<F>(&self, name: impl Into<String>, factory: F) -> Result<(), RegistryError>
  where
    F: Fn() -> Result<Box<A>, ModelError> + Send + Sync + 'static,
  {
    let name = name.into();
    let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);

    if self.frozen.load(Ordering::Acquire) {
      return Err(RegistryError::Frozen {
        registry: self.name.to_string(),
        name,
      });
    }
    if entries.contains_key(&name) {
      return Err(RegistryError::Conflict {
        registry: self.name.to_string(),
        name,
      });
    }

    debug!("注册模型 '{}' 到 '{}'", name, self.name);
    entries.insert(name, Arc::new(factory));
    Ok(())
  }

  pub fn get(&self, name: &str) -> Result<Factory<A>, RegistryError> {
    self
      .entries
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .get(name)
      .cloned()
      .ok_or_else(|| RegistryError::NotFound {
        registry: self.name.to_string(),
        name: name.to_string(),
      })
  }

  /// 解析名称并返回尚未加载的模型，名称未注册时立即报错
  pub fn lazy(&self, name: &str) -> Result<LazyModel<A>, RegistryError> {
    Ok(LazyModel::new(name, self.get(name)?))
  }

  pub fn has(&self, name: &str) -> bool {
    self
      .entries
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .contains_key(name)
  }

  /// 按名称排序的模型列表
  pub fn list_models(&self) -> Vec<String> {
    self
      .entries
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .keys()
      .cloned()
      .collect()
  }

  pub fn len(&self) -> usize {
    self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// 结束注册阶段
  pub fn freeze(&self) {
    let _entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
    self.frozen.store(true, Ordering::Release);
  }

  pub fn is_frozen(&self) -> bool {
    self.frozen.load(Ordering::Acquire)
  }

  pub fn summary(&self) -> String {
    let models = self.list_models();
    if models.is_empty() {
      return format!("[{}] (空)", self.name);
    }
    let mut lines = vec![format!("[{}] {} 个模型:", self.name, models.len())];
    lines.extend(models.iter().map(|name| format!("  - {}", name)));
    lines.join("\n")
  }
}

impl<A: ?Sized> std::fmt::Debug for Registry<A> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Registry")
      .field("name", &self.name)
      .field("models", &self.list_models())
      .field("frozen", &self.is_frozen())
      .finish()
  }
}

/// 按能力划分的全部注册表
#[derive(Debug)]
pub struct ModelRegistries {
  pub detectors: Registry<dyn Detector>,
  pub ovd_detectors: Registry<dyn OpenVocabDetector>,
  pub segmentors: Registry<dyn Segmentor>,
  pub inpainters: Registry<dyn Inpainter>,
  pub text_detectors: Registry<dyn TextDetector>,
}

impl ModelRegistries {
  pub const fn new() -> Self {
    Self {
      detectors: Registry::new("detectors"),
      ovd_detectors: Registry::new("ovd_detectors"),
      segmentors: Registry::new("segmentors"),
      inpainters: Registry::new("inpainters"),
      text_detectors: Registry::new("text_detectors"),
    }
  }

  pub fn freeze(&self) {
    self.detectors.freeze();
    self.ovd_detectors.freeze();
    self.segmentors.freeze();
    self.inpainters.freeze();
    self.text_detectors.freeze();
  }

  pub fn summary(&self) -> String {
    [
      self.detectors.summary(),
      self.ovd_detectors.summary(),
      self.segmentors.summary(),
      self.inpainters.summary(),
      self.text_detectors.summary(),
    ]
    .join("\n")
  }
}

impl Default for ModelRegistries {
  fn default() -> Self {
    Self::new()
  }
}

static REGISTRIES: ModelRegistries = ModelRegistries::new();

/// 进程级注册表，启动时注册，随后冻结
pub fn registries() -> &'static ModelRegistries {
  &REGISTRIES
}

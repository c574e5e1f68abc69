// 该文件是 Yinxing （隐形） 项目的一部分。
// src/model.rs - 模型能力接口
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

use std::sync::Arc;

use image::RgbImage;
use ndarray::ArrayView2;
use thiserror::Error;
use tracing::info;

use crate::{detection::Detection, mask::MaskStack};

#[derive(Error, Debug)]
pub enum ModelError {
  #[error("模型加载错误: {0}")]
  Load(String),
  #[error("推理错误: {0}")]
  Inference(String),
  #[error("模型输出无效: {0}")]
  InvalidOutput(String),
  #[error("I/O 错误: {0}")]
  Io(#[from] std::io::Error),
}

// 适配器不要求线程安全，所有入口都取 `&mut self`，
// 同一个实例同一时刻只服务一张图像。

/// 闭集检测器
pub trait Detector {
  /// 模型可输出的全部类别名称
  fn class_names(&self) -> Vec<String>;

  fn run(&mut self, image: &RgbImage, conf: f32) -> Result<Vec<Detection>, ModelError>;
}

/// 开放词汇检测器，返回的 `class_name` 必须取自 `texts`
pub trait OpenVocabDetector {
  fn run(
    &mut self,
    image: &RgbImage,
    texts: &[String],
    conf: f32,
  ) -> Result<Vec<Detection>, ModelError>;
}

/// 分割器，输出 [N, H, W]，第 i 张掩码对应第 i 个检测
pub trait Segmentor {
  fn run(&mut self, image: &RgbImage, detections: &[Detection]) -> Result<MaskStack, ModelError>;
}

/// 修复模型，一次调用只处理一张掩码
pub trait Inpainter {
  fn run(&mut self, image: &RgbImage, mask: ArrayView2<'_, u8>) -> Result<RgbImage, ModelError>;
}

/// 文字检测器（OCR），检测结果带 `text`
pub trait TextDetector {
  fn run(&mut self, image: &RgbImage, conf: f32) -> Result<Vec<Detection>, ModelError>;
}

/// 模型工厂
pub type Factory<A> = Arc<dyn Fn() -> Result<Box<A>, ModelError> + Send + Sync>;

/// 延迟加载的模型：构造时只持有工厂，首次使用时才真正加载，之后复用。
pub struct LazyModel<A: ?Sized> {
  name: String,
  factory: Factory<A>,
  instance: Option<Box<A>>,
}

impl<A: ?Sized> LazyModel<A> {
  pub fn new(name: impl Into<String>, factory: Factory<A>) -> Self {
    Self {
      name: name.into(),
      factory,
      instance: None,
    }
  }

  /// 直接使用已构造好的实例
  pub fn from_instance(name: impl Into<String>, instance: Box<A>) -> Self
  where
    A: 'static,
  {
    let factory: Factory<A> = Arc::new(|| -> Result<Box<A>, ModelError> {
      Err(ModelError::Load("预加载模型不支持重新构造".to_string()))
    });
    Self {
      name: name.into(),
      factory,
      instance: Some(instance),
    }
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn is_loaded(&self) -> bool {
    self.instance.is_some()
  }

  pub fn get(&mut self) -> Result<&mut A, ModelError> {
    let instance = match self.instance.take() {
      Some(instance) => instance,
      None => {
        info!("加载模型: {}", self.name);
        let now = std::time::Instant::now();
        let instance = (self.factory)()?;
        info!("模型 {} 加载完成，耗时: {:.2?}", self.name, now.elapsed());
        instance
      }
    };
    Ok(&mut **self.instance.insert(instance))
  }
}

impl<A: ?Sized> std::fmt::Debug for LazyModel<A> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("LazyModel")
      .field("name", &self.name)
      .field("loaded", &self.is_loaded())
      .finish()
  }
}

mod builtin;
mod registry;
pub use self::builtin::{BBoxSegmentor, ClassicInpainter, register_builtins};
pub use self::registry::{ModelRegistries, Registry, RegistryError, registries};

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicUsize, Ordering};

  struct Counting;

  impl TextDetector for Counting {
    fn run(&mut self, _image: &RgbImage, _conf: f32) -> Result<Vec<Detection>, ModelError> {
      Ok(vec![])
    }
  }

  #[test]
  fn lazy_model_loads_once_on_first_use() {
    let loads = Arc::new(AtomicUsize::new(0));
    let counter = loads.clone();
    let factory: Factory<dyn TextDetector> =
      Arc::new(move || -> Result<Box<dyn TextDetector>, ModelError> {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(Counting))
      });

    let mut model = LazyModel::new("counting", factory);
    assert!(!model.is_loaded());
    assert_eq!(loads.load(Ordering::SeqCst), 0);

    let image = RgbImage::new(2, 2);
    model.get().unwrap().run(&image, 0.5).unwrap();
    model.get().unwrap().run(&image, 0.5).unwrap();
    assert!(model.is_loaded());
    assert_eq!(loads.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn lazy_model_reports_load_failure() {
    let factory: Factory<dyn TextDetector> =
      Arc::new(|| -> Result<Box<dyn TextDetector>, ModelError> {
        Err(ModelError::Load("权重不存在".to_string()))
      });
    let mut model = LazyModel::new("broken", factory);
    assert!(matches!(model.get(), Err(ModelError::Load(_))));
    assert!(!model.is_loaded());
  }
}

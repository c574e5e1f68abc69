// 该文件是 Yinxing （隐形） 项目的一部分。
// tests/common/mod.rs - 集成测试公共工具
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

#![allow(dead_code)]

use std::path::Path;

use image::{Rgb, RgbImage};
use yinxing::{
  detection::Detection,
  model::{
    Detector, ModelError, ModelRegistries, OpenVocabDetector, TextDetector, register_builtins,
  },
};

pub const WIDTH: u32 = 16;
pub const HEIGHT: u32 = 12;

/// 总是在固定位置报告一个 person
pub struct FixedDetector;

impl Detector for FixedDetector {
  fn class_names(&self) -> Vec<String> {
    vec!["person".to_string()]
  }

  fn run(&mut self, image: &RgbImage, _conf: f32) -> Result<Vec<Detection>, ModelError> {
    let (w, h) = image.dimensions();
    let bbox = [w as f32 / 4.0, h as f32 / 4.0, w as f32 * 0.75, h as f32 * 0.75];
    Ok(vec![Detection::new(bbox, 0.9).with_class(Some(0), "person")])
  }
}

/// 什么都检测不到
pub struct BlindDetector;

impl Detector for BlindDetector {
  fn class_names(&self) -> Vec<String> {
    vec!["person".to_string()]
  }

  fn run(&mut self, _image: &RgbImage, _conf: f32) -> Result<Vec<Detection>, ModelError> {
    Ok(vec![])
  }
}

/// 对每个提示词报告同一个框
pub struct PromptEcho;

impl OpenVocabDetector for PromptEcho {
  fn run(
    &mut self,
    image: &RgbImage,
    texts: &[String],
    _conf: f32,
  ) -> Result<Vec<Detection>, ModelError> {
    let (w, h) = image.dimensions();
    let bbox = [1.0, 1.0, w as f32 / 2.0, h as f32 / 2.0];
    Ok(
      texts
        .iter()
        .map(|t| Detection::new(bbox, 0.8).with_class(None, t.clone()))
        .collect(),
    )
  }
}

pub struct SignReader;

impl TextDetector for SignReader {
  fn run(&mut self, _image: &RgbImage, _conf: f32) -> Result<Vec<Detection>, ModelError> {
    Ok(vec![
      Detection::new([2.0, 2.0, 10.0, 6.0], 0.95).with_text("EXIT"),
    ])
  }
}

/// 内置模型加上测试用的桩模型，注册完成后冻结
pub fn test_registries() -> ModelRegistries {
  let registries = ModelRegistries::new();
  register_builtins(&registries).unwrap();
  registries
    .detectors
    .register("fixed", || Ok(Box::new(FixedDetector) as Box<dyn Detector>))
    .unwrap();
  registries
    .detectors
    .register("blind", || Ok(Box::new(BlindDetector) as Box<dyn Detector>))
    .unwrap();
  registries
    .ovd_detectors
    .register("echo", || {
      Ok(Box::new(PromptEcho) as Box<dyn OpenVocabDetector>)
    })
    .unwrap();
  registries
    .text_detectors
    .register("sign", || Ok(Box::new(SignReader) as Box<dyn TextDetector>))
    .unwrap();
  registries.freeze();
  registries
}

/// 写入一张渐变 PNG
pub fn write_png(path: &Path) {
  if let Some(parent) = path.parent() {
    std::fs::create_dir_all(parent).unwrap();
  }
  let image = RgbImage::from_fn(WIDTH, HEIGHT, |x, y| {
    Rgb([(x * 15) as u8, (y * 20) as u8, 90])
  });
  image.save(path).unwrap();
}

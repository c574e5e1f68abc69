// 该文件是 Yinxing （隐形） 项目的一部分。
// src/ocr.rs - 文字检测
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

use image::RgbImage;
use tracing::{debug, info};

use crate::{
  detection::Detection,
  model::{LazyModel, ModelError, ModelRegistries, RegistryError, TextDetector},
};

/// 按顺序运行多个文字检测器并合并结果
#[derive(Debug, Default)]
pub struct OcrProcessor {
  detectors: Vec<LazyModel<dyn TextDetector>>,
}

impl OcrProcessor {
  pub fn new(detectors: Vec<LazyModel<dyn TextDetector>>) -> Self {
    Self { detectors }
  }

  pub fn from_registries<S: AsRef<str>>(
    registries: &ModelRegistries,
    names: &[S],
  ) -> Result<Self, RegistryError> {
    let detectors = names
      .iter()
      .map(|name| registries.text_detectors.lazy(name.as_ref()))
      .collect::<Result<Vec<_>, _>>()?;
    info!(
      "文字检测器: {:?}",
      detectors.iter().map(|d| d.name()).collect::<Vec<_>>()
    );
    Ok(Self::new(detectors))
  }

  /// 结果不做去重，裁剪到图像范围后按 (scale_y, scale_x) 缩放。
  ///
  /// 非有限值或退化的文本框被丢弃。
  pub fn process(
    &mut self,
    image: &RgbImage,
    conf: f32,
    scale: (f32, f32),
  ) -> Result<Vec<Detection>, ModelError> {
    let (width, height) = image.dimensions();
    let mut all = Vec::new();
    for lazy in self.detectors.iter_mut() {
      let raw = lazy.get()?.run(image, conf)?;
      let total = raw.len();
      let accepted: Vec<Detection> = raw
        .into_iter()
        .filter_map(|det| det.clip_to(width, height))
        .collect();
      debug!("文字检测器 {}: {} 个文本框，保留 {} 个", lazy.name(), total, accepted.len());
      all.extend(accepted);
    }

    for det in all.iter_mut() {
      det.scale(scale);
    }
    Ok(all)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  struct Sign(&'static str);

  impl TextDetector for Sign {
    fn run(&mut self, _image: &RgbImage, _conf: f32) -> Result<Vec<Detection>, ModelError> {
      Ok(vec![
        Detection::new([1.0, 2.0, 3.0, 4.0], 0.8).with_text(self.0),
      ])
    }
  }

  fn sign(text: &'static str) -> LazyModel<dyn TextDetector> {
    LazyModel::from_instance(text, Box::new(Sign(text)) as Box<dyn TextDetector>)
  }

  #[test]
  fn detectors_run_in_order_and_are_scaled() {
    let mut ocr = OcrProcessor::new(vec![sign("EXIT"), sign("STOP")]);
    let image = RgbImage::new(4, 4);
    let out = ocr.process(&image, 0.5, (2.0, 3.0)).unwrap();
    let texts: Vec<&str> = out.iter().filter_map(|d| d.text.as_deref()).collect();
    assert_eq!(texts, vec!["EXIT", "STOP"]);
    assert_eq!(out[0].bbox, [3.0, 4.0, 9.0, 8.0]);
  }

  struct Noisy;

  impl TextDetector for Noisy {
    fn run(&mut self, _image: &RgbImage, _conf: f32) -> Result<Vec<Detection>, ModelError> {
      Ok(vec![
        Detection::new([5.0, 5.0, 5.0, 9.0], 1.7).with_text("flat"),
        Detection::new([f32::NAN, 0.0, 3.0, 3.0], 0.9).with_text("nan"),
        Detection::new([-10.0, -10.0, 500.0, 500.0], 1.7).with_text("huge"),
      ])
    }
  }

  #[test]
  fn invalid_text_boxes_are_clipped_or_dropped() {
    let mut ocr = OcrProcessor::new(vec![LazyModel::from_instance(
      "noisy",
      Box::new(Noisy) as Box<dyn TextDetector>,
    )]);
    let image = RgbImage::new(20, 10);
    let out = ocr.process(&image, 0.5, (1.0, 1.0)).unwrap();

    assert_eq!(out.len(), 1);
    assert_eq!(out[0].text.as_deref(), Some("huge"));
    assert_eq!(out[0].bbox, [0.0, 0.0, 20.0, 10.0]);
    assert_eq!(out[0].score, 1.0);

    let json = out[0].to_json().unwrap();
    assert_eq!(Detection::from_json(&json).unwrap(), out[0]);
  }

  #[test]
  fn unknown_text_detector_fails_at_setup() {
    let registries = ModelRegistries::new();
    assert!(OcrProcessor::from_registries(&registries, &["tesseract"]).is_err());
  }
}

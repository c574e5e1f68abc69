// 该文件是 Yinxing （隐形） 项目的一部分。
// src/detection.rs - 统一检测结果定义
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

use serde::{Deserialize, Serialize};

use crate::mask::Rle;

/// 检测结果
///
/// 所有检测器、开放词汇检测器、分割器与文字检测器都产出这一结构。
/// `bbox` 为检测器实际看到的图像上的像素坐标 `[x0, y0, x1, y1]`。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
  /// 边界框 [x_min, y_min, x_max, y_max]
  pub bbox: [f32; 4],
  /// 置信度，范围 [0, 1]
  pub score: f32,
  /// 检测器内部类别索引，不同检测器之间没有可比性
  pub class_id: Option<u32>,
  /// 类别名称，用作白名单匹配与提示词回显
  pub class_name: Option<String>,
  /// 分割结果的 RLE 编码，仅在分割之后存在
  pub segmentation: Option<Rle>,
  /// 识别出的文字，仅 OCR 路径使用
  pub text: Option<String>,
}

impl Detection {
  pub fn new(bbox: [f32; 4], score: f32) -> Self {
    Self {
      bbox,
      score,
      class_id: None,
      class_name: None,
      segmentation: None,
      text: None,
    }
  }

  pub fn with_class(mut self, class_id: Option<u32>, class_name: impl Into<String>) -> Self {
    self.class_id = class_id;
    self.class_name = Some(class_name.into());
    self
  }

  pub fn with_text(mut self, text: impl Into<String>) -> Self {
    self.text = Some(text.into());
    self
  }

  pub fn width(&self) -> f32 {
    (self.bbox[2] - self.bbox[0]).max(0.0)
  }

  pub fn height(&self) -> f32 {
    (self.bbox[3] - self.bbox[1]).max(0.0)
  }

  pub fn area(&self) -> f32 {
    self.width() * self.height()
  }

  /// [x, y, w, h] 形式
  pub fn xywh(&self) -> [f32; 4] {
    [self.bbox[0], self.bbox[1], self.width(), self.height()]
  }

  /// 向下/向上取整后的整数坐标，绘制时使用
  pub fn bbox_i32(&self) -> [i32; 4] {
    [
      self.bbox[0].floor() as i32,
      self.bbox[1].floor() as i32,
      self.bbox[2].ceil() as i32,
      self.bbox[3].ceil() as i32,
    ]
  }

  /// 计算两个边界框的 IoU
  pub fn iou(&self, other: &Detection) -> f32 {
    let x1 = self.bbox[0].max(other.bbox[0]);
    let y1 = self.bbox[1].max(other.bbox[1]);
    let x2 = self.bbox[2].min(other.bbox[2]);
    let y2 = self.bbox[3].min(other.bbox[3]);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let union = self.area() + other.area() - intersection;

    if union > 0.0 {
      intersection / union
    } else {
      0.0
    }
  }

  /// 按 (scale_y, scale_x) 缩放边界框
  pub fn scale(&mut self, (scale_y, scale_x): (f32, f32)) {
    self.bbox[0] *= scale_x;
    self.bbox[1] *= scale_y;
    self.bbox[2] *= scale_x;
    self.bbox[3] *= scale_y;
  }

  /// 将检测结果裁剪到图像范围内。
  ///
  /// 坐标或置信度不是有限值、或裁剪后退化为空框时返回 `None`；
  /// 置信度被限制在 [0, 1]。
  pub fn clip_to(mut self, width: u32, height: u32) -> Option<Self> {
    if !self.bbox.iter().all(|v| v.is_finite()) || !self.score.is_finite() {
      return None;
    }

    let (w, h) = (width as f32, height as f32);
    self.bbox[0] = self.bbox[0].clamp(0.0, w);
    self.bbox[1] = self.bbox[1].clamp(0.0, h);
    self.bbox[2] = self.bbox[2].clamp(0.0, w);
    self.bbox[3] = self.bbox[3].clamp(0.0, h);

    if self.bbox[0] >= self.bbox[2] || self.bbox[1] >= self.bbox[3] {
      return None;
    }

    self.score = self.score.clamp(0.0, 1.0);
    Some(self)
  }

  pub fn label(&self) -> &str {
    self.class_name.as_deref().unwrap_or("")
  }

  pub fn to_json(&self) -> serde_json::Result<String> {
    serde_json::to_string(self)
  }

  pub fn from_json(text: &str) -> serde_json::Result<Self> {
    serde_json::from_str(text)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn iou_of_identical_boxes_is_one() {
    let a = Detection::new([0.0, 0.0, 10.0, 10.0], 0.9);
    assert!((a.iou(&a.clone()) - 1.0).abs() < 1e-6);
  }

  #[test]
  fn iou_of_disjoint_boxes_is_zero() {
    let a = Detection::new([0.0, 0.0, 1.0, 1.0], 0.9);
    let b = Detection::new([2.0, 2.0, 3.0, 3.0], 0.9);
    assert_eq!(a.iou(&b), 0.0);
  }

  #[test]
  fn iou_half_overlap() {
    let a = Detection::new([0.0, 0.0, 2.0, 1.0], 0.9);
    let b = Detection::new([1.0, 0.0, 3.0, 1.0], 0.9);
    // 交集 1, 并集 3
    assert!((a.iou(&b) - 1.0 / 3.0).abs() < 1e-6);
  }

  #[test]
  fn clip_drops_degenerate_and_non_finite() {
    assert!(Detection::new([5.0, 5.0, 5.0, 8.0], 0.5).clip_to(10, 10).is_none());
    assert!(Detection::new([20.0, 0.0, 30.0, 5.0], 0.5).clip_to(10, 10).is_none());
    assert!(Detection::new([0.0, 0.0, f32::NAN, 5.0], 0.5).clip_to(10, 10).is_none());
    assert!(Detection::new([0.0, 0.0, 5.0, 5.0], f32::NAN).clip_to(10, 10).is_none());
  }

  #[test]
  fn clip_clamps_box_and_score() {
    let det = Detection::new([-3.0, 2.0, 14.0, 8.0], 1.4)
      .clip_to(10, 10)
      .unwrap();
    assert_eq!(det.bbox, [0.0, 2.0, 10.0, 8.0]);
    assert_eq!(det.score, 1.0);
  }

  #[test]
  fn scale_is_component_wise() {
    let mut det = Detection::new([1.0, 2.0, 3.0, 4.0], 0.5);
    det.scale((2.0, 0.5));
    assert_eq!(det.bbox, [0.5, 4.0, 1.5, 8.0]);
  }

  #[test]
  fn json_uses_null_for_missing_fields() {
    let det = Detection::new([1.0, 2.0, 3.0, 4.0], 0.5).with_class(Some(0), "person");
    let value: serde_json::Value = serde_json::from_str(&det.to_json().unwrap()).unwrap();
    assert_eq!(value["class_name"], "person");
    assert!(value["segmentation"].is_null());
    assert!(value["text"].is_null());
    assert_eq!(Detection::from_json(&det.to_json().unwrap()).unwrap(), det);
  }
}

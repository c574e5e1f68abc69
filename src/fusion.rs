// 该文件是 Yinxing （隐形） 项目的一部分。
// src/fusion.rs - 多检测器结果融合
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

use std::collections::BTreeSet;

use image::RgbImage;
use tracing::{debug, warn};

use crate::{
  detection::Detection,
  model::{Detector, LazyModel, ModelError, OpenVocabDetector},
};

/// NMS 的作用范围
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NmsMode {
  /// 不区分类别，任意两个重叠框都会互相抑制
  #[default]
  ClassAgnostic,
  /// 只在 `class_name` 相同的框之间抑制
  ClassAware,
}

/// 非极大值抑制。
///
/// 按置信度降序（稳定排序，同分时先出现者优先）依次保留，
/// 与已保留框 IoU ≥ `iou_threshold` 的框被丢弃。
pub fn non_maximum_suppression(
  mut detections: Vec<Detection>,
  iou_threshold: f32,
  mode: NmsMode,
) -> Vec<Detection> {
  if detections.is_empty() {
    return detections;
  }

  detections.sort_by(|a, b| b.score.total_cmp(&a.score));

  let mut kept: Vec<Detection> = Vec::with_capacity(detections.len());
  for det in detections {
    let suppressed = kept.iter().any(|best| {
      let comparable = match mode {
        NmsMode::ClassAgnostic => true,
        NmsMode::ClassAware => best.class_name == det.class_name,
      };
      comparable && best.iou(&det) >= iou_threshold
    });
    if !suppressed {
      kept.push(det);
    }
  }
  kept
}

/// 融合参数
#[derive(Debug, Clone, Default)]
pub struct FusionOptions<'a> {
  pub conf: f32,
  pub nms_iou: f32,
  pub nms_mode: NmsMode,
  /// 类别白名单，`None` 表示不限制
  pub allowed_classes: Option<&'a BTreeSet<String>>,
}

/// 闭集与开放词汇检测器的组合
#[derive(Debug, Default)]
pub struct DetectorFusion {
  detectors: Vec<LazyModel<dyn Detector>>,
  ovd_detectors: Vec<LazyModel<dyn OpenVocabDetector>>,
}

impl DetectorFusion {
  pub fn new(
    detectors: Vec<LazyModel<dyn Detector>>,
    ovd_detectors: Vec<LazyModel<dyn OpenVocabDetector>>,
  ) -> Self {
    Self {
      detectors,
      ovd_detectors,
    }
  }

  pub fn detector_names(&self) -> Vec<&str> {
    self
      .detectors
      .iter()
      .map(|d| d.name())
      .chain(self.ovd_detectors.iter().map(|d| d.name()))
      .collect()
  }

  pub fn is_empty(&self) -> bool {
    self.detectors.is_empty() && self.ovd_detectors.is_empty()
  }

  /// 在同一张图像上运行全部检测器，汇总后统一做 NMS
  pub fn run(
    &mut self,
    image: &RgbImage,
    options: &FusionOptions<'_>,
  ) -> Result<Vec<Detection>, ModelError> {
    let (width, height) = image.dimensions();
    let mut pooled = Vec::new();
    let mut vocabulary = BTreeSet::new();

    for lazy in self.detectors.iter_mut() {
      let detector = lazy.get()?;
      vocabulary.extend(detector.class_names());

      let raw = detector.run(image, options.conf)?;
      let total = raw.len();
      let accepted: Vec<Detection> = raw
        .into_iter()
        .filter_map(|det| det.clip_to(width, height))
        .filter(|det| match options.allowed_classes {
          Some(allowed) => det.class_name.as_ref().is_some_and(|n| allowed.contains(n)),
          None => true,
        })
        .collect();
      debug!("检测器 {}: {} 个结果，保留 {} 个", lazy.name(), total, accepted.len());
      pooled.extend(accepted);
    }

    if !self.ovd_detectors.is_empty() {
      let prompts: Vec<String> = match options.allowed_classes {
        Some(allowed) => allowed.iter().cloned().collect(),
        None => vocabulary.into_iter().collect(),
      };

      if prompts.is_empty() {
        warn!("没有可用的提示词，跳过开放词汇检测器");
      } else {
        for lazy in self.ovd_detectors.iter_mut() {
          let raw = lazy.get()?.run(image, &prompts, options.conf)?;
          let total = raw.len();
          let accepted: Vec<Detection> = raw
            .into_iter()
            .filter_map(|det| det.clip_to(width, height))
            .filter(|det| det.class_name.as_ref().is_some_and(|n| prompts.contains(n)))
            .collect();
          if accepted.len() < total {
            debug!(
              "开放词汇检测器 {}: 丢弃 {} 个无效或不在提示词内的结果",
              lazy.name(),
              total - accepted.len()
            );
          }
          pooled.extend(accepted);
        }
      }
    }

    if pooled.is_empty() {
      return Ok(pooled);
    }

    let before = pooled.len();
    let fused = non_maximum_suppression(pooled, options.nms_iou, options.nms_mode);
    debug!("NMS: {} -> {}", before, fused.len());
    Ok(fused)
  }
}

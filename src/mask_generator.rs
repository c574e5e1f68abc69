// 该文件是 Yinxing （隐形） 项目的一部分。
// src/mask_generator.rs - 检测、分割与掩码生成
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
use ndarray::Axis;
use thiserror::Error;
use tracing::{debug, info};

use crate::{
  detection::Detection,
  fusion::{DetectorFusion, FusionOptions, NmsMode},
  mask::{self, MASK_ON, MaskError, MaskStack, Rle},
  model::{LazyModel, ModelError, ModelRegistries, RegistryError, Segmentor},
};

#[derive(Error, Debug)]
pub enum MaskGeneratorError {
  #[error("注册表错误: {0}")]
  Registry(#[from] RegistryError),
  #[error("模型错误: {0}")]
  Model(#[from] ModelError),
  #[error("检测数量 {detections} 与掩码数量 {masks} 不一致")]
  CountMismatch { detections: usize, masks: usize },
  #[error("分割掩码尺寸 {actual:?} 与图像尺寸 {expected:?} 不一致")]
  ShapeMismatch {
    expected: (usize, usize),
    actual: (usize, usize),
  },
  #[error("掩码错误: {0}")]
  Mask(#[from] MaskError),
}

/// 生成参数
#[derive(Debug, Clone)]
pub struct GenerateOptions {
  /// 检测置信度阈值
  pub conf: f32,
  /// NMS IoU 阈值
  pub nms_iou: f32,
  pub nms_mode: NmsMode,
  /// 类别白名单，为空时不做限制
  pub allowed_classes: Option<Vec<String>>,
  /// 结果缩放系数 (scale_y, scale_x)
  pub scale: (f32, f32),
}

impl Default for GenerateOptions {
  fn default() -> Self {
    Self {
      conf: 0.4,
      nms_iou: 0.5,
      nms_mode: NmsMode::default(),
      allowed_classes: None,
      scale: (1.0, 1.0),
    }
  }
}

/// 一张图像的生成结果，`detections[i]` 与 `masks[i]` 一一对应
#[derive(Debug, Clone)]
pub struct MaskOutput {
  pub detections: Vec<Detection>,
  /// [N, H, W]，取值 {0, 1}
  pub masks: MaskStack,
  /// 结果中出现过的类别名称，排序去重
  pub prompts: Vec<String>,
}

impl MaskOutput {
  pub fn empty(height: usize, width: usize) -> Self {
    Self {
      detections: Vec::new(),
      masks: mask::empty_stack(height, width),
      prompts: Vec::new(),
    }
  }

  pub fn is_empty(&self) -> bool {
    self.detections.is_empty()
  }

  pub fn len(&self) -> usize {
    self.detections.len()
  }
}

pub struct MaskGenerator {
  fusion: DetectorFusion,
  segmentor: LazyModel<dyn Segmentor>,
}

impl MaskGenerator {
  pub fn new(fusion: DetectorFusion, segmentor: LazyModel<dyn Segmentor>) -> Self {
    Self { fusion, segmentor }
  }

  /// 从注册表解析全部模型名称，任何一个名称未注册都会立即失败
  pub fn from_registries<S: AsRef<str>>(
    registries: &ModelRegistries,
    detectors: &[S],
    ovd_detectors: &[S],
    segmentor: &str,
  ) -> Result<Self, MaskGeneratorError> {
    let detectors = detectors
      .iter()
      .map(|name| registries.detectors.lazy(name.as_ref()))
      .collect::<Result<Vec<_>, _>>()?;
    let ovd_detectors = ovd_detectors
      .iter()
      .map(|name| registries.ovd_detectors.lazy(name.as_ref()))
      .collect::<Result<Vec<_>, _>>()?;
    let segmentor = registries.segmentors.lazy(segmentor)?;

    let fusion = DetectorFusion::new(detectors, ovd_detectors);
    info!(
      "掩码生成器: 检测器 {:?}, 分割器 {}",
      fusion.detector_names(),
      segmentor.name()
    );
    Ok(Self::new(fusion, segmentor))
  }

  pub fn generate(
    &mut self,
    image: &RgbImage,
    options: &GenerateOptions,
  ) -> Result<MaskOutput, MaskGeneratorError> {
    let (width, height) = image.dimensions();
    let (height, width) = (height as usize, width as usize);

    let allowed: Option<BTreeSet<String>> = options
      .allowed_classes
      .as_ref()
      .filter(|classes| !classes.is_empty())
      .map(|classes| classes.iter().cloned().collect());

    let now = std::time::Instant::now();
    let mut detections = self.fusion.run(
      image,
      &FusionOptions {
        conf: options.conf,
        nms_iou: options.nms_iou,
        nms_mode: options.nms_mode,
        allowed_classes: allowed.as_ref(),
      },
    )?;
    debug!("检测融合完成: {} 个目标，耗时: {:.2?}", detections.len(), now.elapsed());

    if detections.is_empty() {
      let (h, w) = mask::scaled_dims((height, width), options.scale);
      return Ok(MaskOutput::empty(h, w));
    }

    let now = std::time::Instant::now();
    let masks = self.segmentor.get()?.run(image, &detections)?;
    debug!("分割完成，耗时: {:.2?}", now.elapsed());

    let (count, mask_h, mask_w) = masks.dim();
    if count != detections.len() {
      return Err(MaskGeneratorError::CountMismatch {
        detections: detections.len(),
        masks: count,
      });
    }
    if (mask_h, mask_w) != (height, width) {
      return Err(MaskGeneratorError::ShapeMismatch {
        expected: (height, width),
        actual: (mask_h, mask_w),
      });
    }

    let masks = masks.mapv(|v| if v > 0 { MASK_ON } else { 0 });
    let masks = mask::rescale_stack(&masks, options.scale);

    for (det, mask) in detections.iter_mut().zip(masks.axis_iter(Axis(0))) {
      det.scale(options.scale);
      det.segmentation = Some(Rle::encode(mask));
    }

    let prompts = detections
      .iter()
      .filter_map(|det| det.class_name.clone())
      .collect::<BTreeSet<_>>()
      .into_iter()
      .collect();

    Ok(MaskOutput {
      detections,
      masks,
      prompts,
    })
  }
}

// 该文件是 Yinxing （隐形） 项目的一部分。
// src/model/builtin.rs - 内置模型
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
use ndarray::{ArrayView2, s};
use tracing::debug;

use super::{Inpainter, ModelError, ModelRegistries, RegistryError, Segmentor};
use crate::{
  camouflage::inpaint::{InpaintAlgorithm, inpaint},
  detection::Detection,
  mask::{MASK_ON, MaskStack},
};

const DEFAULT_INPAINT_RADIUS: u32 = 3;

/// 将边界框本身作为掩码的分割器，不依赖任何模型权重
#[derive(Debug, Default)]
pub struct BBoxSegmentor;

impl Segmentor for BBoxSegmentor {
  fn run(&mut self, image: &RgbImage, detections: &[Detection]) -> Result<MaskStack, ModelError> {
    let (width, height) = image.dimensions();
    let mut masks = MaskStack::zeros((detections.len(), height as usize, width as usize));

    for (i, det) in detections.iter().enumerate() {
      let [x0, y0, x1, y1] = det.bbox_i32();
      let x0 = x0.clamp(0, width as i32) as usize;
      let y0 = y0.clamp(0, height as i32) as usize;
      let x1 = x1.clamp(0, width as i32) as usize;
      let y1 = y1.clamp(0, height as i32) as usize;
      if x0 < x1 && y0 < y1 {
        masks.slice_mut(s![i, y0..y1, x0..x1]).fill(MASK_ON);
      }
    }

    debug!("边界框分割完成: {} 个掩码", detections.len());
    Ok(masks)
  }
}

/// 经典图像修复（Telea / Navier-Stokes）包装成修复模型
#[derive(Debug)]
pub struct ClassicInpainter {
  algorithm: InpaintAlgorithm,
  radius: u32,
}

impl ClassicInpainter {
  pub fn new(algorithm: InpaintAlgorithm, radius: u32) -> Self {
    Self { algorithm, radius }
  }
}

impl Inpainter for ClassicInpainter {
  fn run(&mut self, image: &RgbImage, mask: ArrayView2<'_, u8>) -> Result<RgbImage, ModelError> {
    let (width, height) = image.dimensions();
    if mask.dim() != (height as usize, width as usize) {
      return Err(ModelError::Inference(format!(
        "掩码尺寸 {:?} 与图像尺寸 {}x{} 不一致",
        mask.dim(),
        height,
        width
      )));
    }
    Ok(inpaint(image, mask, self.algorithm, self.radius))
  }
}

/// 注册内置模型
pub fn register_builtins(registries: &ModelRegistries) -> Result<(), RegistryError> {
  registries.segmentors.register("bbox", || {
    Ok(Box::new(BBoxSegmentor) as Box<dyn Segmentor>)
  })?;
  registries.inpainters.register("telea", || {
    Ok(Box::new(ClassicInpainter::new(
      InpaintAlgorithm::Telea,
      DEFAULT_INPAINT_RADIUS,
    )) as Box<dyn Inpainter>)
  })?;
  registries.inpainters.register("ns", || {
    Ok(Box::new(ClassicInpainter::new(
      InpaintAlgorithm::NavierStokes,
      DEFAULT_INPAINT_RADIUS,
    )) as Box<dyn Inpainter>)
  })?;
  Ok(())
}

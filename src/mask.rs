// 该文件是 Yinxing （隐形） 项目的一部分。
// src/mask.rs - 掩码定义与处理
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

use image::{GrayImage, RgbImage};
use ndarray::{Array2, Array3, ArrayView2, ArrayView3, Axis};
use thiserror::Error;

mod rle;
pub use self::rle::Rle;

/// 单张掩码，形状 [H, W]，取值 {0, 1}
pub type Mask = Array2<u8>;
/// 掩码堆叠，形状 [N, H, W]
pub type MaskStack = Array3<u8>;

/// 二值掩码前景值
pub const MASK_ON: u8 = 1;
/// 8 bit 归一化后的前景值
pub const MASK_FOREGROUND: u8 = 255;

#[derive(Error, Debug)]
pub enum MaskError {
  #[error("没有提供任何掩码")]
  EmptyMasks,
  #[error("掩码尺寸不匹配: 期望 {expected:?}, 实际 {actual:?}")]
  ShapeMismatch {
    expected: (usize, usize),
    actual: (usize, usize),
  },
  #[error("掩码维度错误: 期望 {expected} 维, 实际 {actual} 维")]
  InvalidRank { expected: usize, actual: usize },
  #[error("非法的 RLE: {0}")]
  InvalidRle(String),
}

/// 空的掩码堆叠 [0, H, W]
pub fn empty_stack(height: usize, width: usize) -> MaskStack {
  MaskStack::zeros((0, height, width))
}

/// 掩码输入。
///
/// 接受单张二维掩码、三维堆叠、二维掩码列表，或以图像形式给出的掩码
/// （灰度或三通道），统一归一化为二维掩码列表后再参与后续处理。
#[derive(Debug, Clone)]
pub enum MaskInput<'a> {
  Single(ArrayView2<'a, u8>),
  Stack(ArrayView3<'a, u8>),
  List(Vec<ArrayView2<'a, u8>>),
  Gray(Vec<&'a GrayImage>),
  Color(Vec<&'a RgbImage>),
}

impl<'a> From<&'a Mask> for MaskInput<'a> {
  fn from(mask: &'a Mask) -> Self {
    MaskInput::Single(mask.view())
  }
}

impl<'a> From<ArrayView2<'a, u8>> for MaskInput<'a> {
  fn from(mask: ArrayView2<'a, u8>) -> Self {
    MaskInput::Single(mask)
  }
}

impl<'a> From<&'a MaskStack> for MaskInput<'a> {
  fn from(stack: &'a MaskStack) -> Self {
    MaskInput::Stack(stack.view())
  }
}

impl<'a> From<&'a [Mask]> for MaskInput<'a> {
  fn from(masks: &'a [Mask]) -> Self {
    MaskInput::List(masks.iter().map(|m| m.view()).collect())
  }
}

impl<'a> From<&'a Vec<Mask>> for MaskInput<'a> {
  fn from(masks: &'a Vec<Mask>) -> Self {
    MaskInput::from(masks.as_slice())
  }
}

impl<'a> From<&'a GrayImage> for MaskInput<'a> {
  fn from(image: &'a GrayImage) -> Self {
    MaskInput::Gray(vec![image])
  }
}

impl<'a> From<&'a RgbImage> for MaskInput<'a> {
  fn from(image: &'a RgbImage) -> Self {
    MaskInput::Color(vec![image])
  }
}

impl MaskInput<'_> {
  /// 归一化为 0/255 的二维掩码列表。
  ///
  /// 大于 0 的值视为前景；三通道掩码在任一通道非零处为前景。
  /// 列表为空时返回 [`MaskError::EmptyMasks`]，列表内尺寸不一致时返回
  /// [`MaskError::ShapeMismatch`]。
  pub fn normalize(&self) -> Result<Vec<Mask>, MaskError> {
    let masks: Vec<Mask> = match self {
      MaskInput::Single(mask) => vec![binarize(*mask)],
      MaskInput::Stack(stack) => stack.axis_iter(Axis(0)).map(binarize).collect(),
      MaskInput::List(list) => list.iter().map(|m| binarize(*m)).collect(),
      MaskInput::Gray(images) => images.iter().map(|image| gray_to_mask(image)).collect(),
      MaskInput::Color(images) => images.iter().map(|image| color_to_mask(image)).collect(),
    };

    let first = masks.first().ok_or(MaskError::EmptyMasks)?.dim();
    if let Some(bad) = masks.iter().find(|m| m.dim() != first) {
      return Err(MaskError::ShapeMismatch {
        expected: first,
        actual: bad.dim(),
      });
    }

    Ok(masks)
  }
}

fn binarize(mask: ArrayView2<'_, u8>) -> Mask {
  mask.mapv(|v| if v > 0 { MASK_FOREGROUND } else { 0 })
}

fn gray_to_mask(image: &GrayImage) -> Mask {
  let (width, height) = image.dimensions();
  Array2::from_shape_fn((height as usize, width as usize), |(y, x)| {
    if image.get_pixel(x as u32, y as u32)[0] > 0 {
      MASK_FOREGROUND
    } else {
      0
    }
  })
}

fn color_to_mask(image: &RgbImage) -> Mask {
  let (width, height) = image.dimensions();
  Array2::from_shape_fn((height as usize, width as usize), |(y, x)| {
    if image.get_pixel(x as u32, y as u32).0.iter().any(|&c| c > 0) {
      MASK_FOREGROUND
    } else {
      0
    }
  })
}

/// 按位或合并所有掩码
pub fn union(masks: &[Mask]) -> Result<Mask, MaskError> {
  let first = masks.first().ok_or(MaskError::EmptyMasks)?;
  let mut merged = first.clone();
  for mask in &masks[1..] {
    if mask.dim() != merged.dim() {
      return Err(MaskError::ShapeMismatch {
        expected: merged.dim(),
        actual: mask.dim(),
      });
    }
    merged.zip_mut_with(mask, |a, &b| *a |= b);
  }
  Ok(merged)
}

/// 堆叠中的掩码按位或合并，空堆叠返回全零掩码
pub fn union_stack(stack: &MaskStack) -> Mask {
  let (_, height, width) = stack.dim();
  let mut merged = Mask::zeros((height, width));
  for mask in stack.axis_iter(Axis(0)) {
    merged.zip_mut_with(&mask, |a, &b| *a |= b);
  }
  merged
}

/// 前景像素数量
pub fn area(mask: ArrayView2<'_, u8>) -> usize {
  mask.iter().filter(|&&v| v > 0).count()
}

/// 最近邻缩放到指定尺寸，保持二值
pub fn resize_nearest(mask: ArrayView2<'_, u8>, height: usize, width: usize) -> Mask {
  let (src_h, src_w) = mask.dim();
  if (src_h, src_w) == (height, width) {
    return mask.to_owned();
  }
  if src_h == 0 || src_w == 0 {
    return Mask::zeros((height, width));
  }

  let fy = src_h as f64 / height.max(1) as f64;
  let fx = src_w as f64 / width.max(1) as f64;
  Array2::from_shape_fn((height, width), |(y, x)| {
    let sy = ((y as f64 * fy) as usize).min(src_h - 1);
    let sx = ((x as f64 * fx) as usize).min(src_w - 1);
    mask[[sy, sx]]
  })
}

/// 按 (scale_y, scale_x) 计算缩放后的尺寸
pub fn scaled_dims((height, width): (usize, usize), (scale_y, scale_x): (f32, f32)) -> (usize, usize) {
  let h = (height as f64 * scale_y as f64).round().max(1.0) as usize;
  let w = (width as f64 * scale_x as f64).round().max(1.0) as usize;
  (h, w)
}

/// 对整个堆叠做最近邻缩放
pub fn rescale_stack(stack: &MaskStack, scale: (f32, f32)) -> MaskStack {
  let (n, height, width) = stack.dim();
  if scale == (1.0, 1.0) {
    return stack.clone();
  }

  let (out_h, out_w) = scaled_dims((height, width), scale);
  let mut out = MaskStack::zeros((n, out_h, out_w));
  for (i, mask) in stack.axis_iter(Axis(0)).enumerate() {
    out
      .index_axis_mut(Axis(0), i)
      .assign(&resize_nearest(mask, out_h, out_w));
  }
  out
}

/// 转换为 0/255 灰度图像
pub fn to_gray_image(mask: ArrayView2<'_, u8>) -> GrayImage {
  let (height, width) = mask.dim();
  GrayImage::from_fn(width as u32, height as u32, |x, y| {
    image::Luma([if mask[[y as usize, x as usize]] > 0 {
      MASK_FOREGROUND
    } else {
      0
    }])
  })
}

/// 静态场景掩码：所有前景取并集后反转，未被处理的背景为 255
pub fn static_scene_mask(masks: &[Mask], height: usize, width: usize) -> GrayImage {
  let mut foreground = Mask::zeros((height, width));
  for mask in masks.iter().filter(|m| m.dim() == (height, width)) {
    foreground.zip_mut_with(mask, |a, &b| *a |= b);
  }
  let inverted = foreground.mapv(|v| if v > 0 { 0 } else { MASK_FOREGROUND });
  to_gray_image(inverted.view())
}

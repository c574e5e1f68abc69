// 该文件是 Yinxing （隐形） 项目的一部分。
// src/camouflage.rs - 掩码区域伪装
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

use std::fmt;
use std::str::FromStr;

use image::{Rgb, RgbImage, imageops::FilterType};
use ndarray::ArrayView2;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::mask::{self, MaskError, MaskInput};

pub mod inpaint;

use self::inpaint::{InpaintAlgorithm, inpaint};

#[derive(Error, Debug)]
pub enum CamouflageError {
  #[error("未知的伪装方法: {0}")]
  UnknownMethod(String),
  #[error("参数无效: {0}")]
  InvalidParameter(String),
  #[error("掩码错误: {0}")]
  Mask(#[from] MaskError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CamouflageMethod {
  Telea,
  Ns,
  Median,
  Blur,
  Mosaic,
  Solid,
  Noise,
}

impl CamouflageMethod {
  pub const ALL: [CamouflageMethod; 7] = [
    CamouflageMethod::Telea,
    CamouflageMethod::Ns,
    CamouflageMethod::Median,
    CamouflageMethod::Blur,
    CamouflageMethod::Mosaic,
    CamouflageMethod::Solid,
    CamouflageMethod::Noise,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      CamouflageMethod::Telea => "telea",
      CamouflageMethod::Ns => "ns",
      CamouflageMethod::Median => "median",
      CamouflageMethod::Blur => "blur",
      CamouflageMethod::Mosaic => "mosaic",
      CamouflageMethod::Solid => "solid",
      CamouflageMethod::Noise => "noise",
    }
  }
}

impl fmt::Display for CamouflageMethod {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for CamouflageMethod {
  type Err = CamouflageError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    CamouflageMethod::ALL
      .into_iter()
      .find(|m| m.as_str() == s)
      .ok_or_else(|| CamouflageError::UnknownMethod(s.to_string()))
  }
}

/// 各伪装方法的参数，未给出的字段取默认值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CamouflageConfig {
  /// telea 修复邻域半径
  pub telea_radius: u32,
  /// ns 修复邻域半径
  pub ns_radius: u32,
  /// 中值滤波核大小（奇数）
  pub median_kernel: u32,
  /// 高斯模糊核大小（奇数）
  pub blur_ksize: u32,
  /// 马赛克块大小
  pub mosaic_block: u32,
  /// 纯色填充值
  pub solid_value: [u8; 3],
}

impl Default for CamouflageConfig {
  fn default() -> Self {
    Self {
      telea_radius: 3,
      ns_radius: 3,
      median_kernel: 21,
      blur_ksize: 21,
      mosaic_block: 16,
      solid_value: [127, 127, 127],
    }
  }
}

fn check_odd(name: &str, value: u32) -> Result<u32, CamouflageError> {
  if value == 0 || value % 2 == 0 {
    Err(CamouflageError::InvalidParameter(format!(
      "{} 必须为正奇数，实际为 {}",
      name, value
    )))
  } else {
    Ok(value)
  }
}

fn check_positive(name: &str, value: u32) -> Result<u32, CamouflageError> {
  if value == 0 {
    Err(CamouflageError::InvalidParameter(format!("{} 必须大于 0", name)))
  } else {
    Ok(value)
  }
}

/// 伪装器：构造时确定方法与参数，之后可对任意图像反复调用
#[derive(Debug, Clone)]
pub struct Camouflage {
  method: CamouflageMethod,
  config: CamouflageConfig,
}

impl Camouflage {
  /// 按名称构造，名称未知或参数无效时立即失败
  pub fn new(method: &str, config: CamouflageConfig) -> Result<Self, CamouflageError> {
    Self::with_method(method.parse()?, config)
  }

  pub fn with_method(
    method: CamouflageMethod,
    config: CamouflageConfig,
  ) -> Result<Self, CamouflageError> {
    match method {
      CamouflageMethod::Telea => {
        check_positive("telea_radius", config.telea_radius)?;
      }
      CamouflageMethod::Ns => {
        check_positive("ns_radius", config.ns_radius)?;
      }
      CamouflageMethod::Median => {
        check_odd("median_kernel", config.median_kernel)?;
      }
      CamouflageMethod::Blur => {
        check_odd("blur_ksize", config.blur_ksize)?;
      }
      CamouflageMethod::Mosaic => {
        check_positive("mosaic_block", config.mosaic_block)?;
      }
      CamouflageMethod::Solid | CamouflageMethod::Noise => {}
    }
    Ok(Self { method, config })
  }

  pub fn method(&self) -> CamouflageMethod {
    self.method
  }

  pub fn config(&self) -> &CamouflageConfig {
    &self.config
  }

  /// 隐藏掩码覆盖的像素，背景像素逐字节保持不变。
  ///
  /// 掩码列表为空时返回错误，而不是原样返回图像。
  pub fn hide<'a>(
    &self,
    image: &RgbImage,
    masks: impl Into<MaskInput<'a>>,
  ) -> Result<RgbImage, CamouflageError> {
    self.hide_with_rng(image, masks, &mut rand::thread_rng())
  }

  /// 同 [`Camouflage::hide`]，`noise` 方法使用给定的随机源
  pub fn hide_with_rng<'a, R: Rng + ?Sized>(
    &self,
    image: &RgbImage,
    masks: impl Into<MaskInput<'a>>,
    rng: &mut R,
  ) -> Result<RgbImage, CamouflageError> {
    let masks = masks.into().normalize()?;
    let merged = mask::union(&masks)?;

    let (width, height) = image.dimensions();
    let expected = (height as usize, width as usize);
    if merged.dim() != expected {
      return Err(MaskError::ShapeMismatch {
        expected,
        actual: merged.dim(),
      }
      .into());
    }

    let now = std::time::Instant::now();
    let out = match self.method {
      CamouflageMethod::Telea => inpaint(
        image,
        merged.view(),
        InpaintAlgorithm::Telea,
        self.config.telea_radius,
      ),
      CamouflageMethod::Ns => inpaint(
        image,
        merged.view(),
        InpaintAlgorithm::NavierStokes,
        self.config.ns_radius,
      ),
      CamouflageMethod::Median => {
        let radius = self.config.median_kernel / 2;
        let filtered = imageproc::filter::median_filter(image, radius, radius);
        copy_foreground(image, &filtered, merged.view())
      }
      CamouflageMethod::Blur => {
        let filtered = image::imageops::blur(image, gaussian_sigma(self.config.blur_ksize));
        copy_foreground(image, &filtered, merged.view())
      }
      CamouflageMethod::Mosaic => {
        let blocky = pixelate(image, self.config.mosaic_block);
        copy_foreground(image, &blocky, merged.view())
      }
      CamouflageMethod::Solid => {
        let value = Rgb(self.config.solid_value);
        paint_foreground(image, merged.view(), |_| value)
      }
      CamouflageMethod::Noise => paint_foreground(image, merged.view(), |_| {
        Rgb([
          rng.gen_range(0..=255u8),
          rng.gen_range(0..=255u8),
          rng.gen_range(0..=255u8),
        ])
      }),
    };

    debug!(
      "伪装完成: 方法 {}, 前景像素 {}, 耗时: {:.2?}",
      self.method,
      mask::area(merged.view()),
      now.elapsed()
    );
    Ok(out)
  }
}

/// 与核大小对应的高斯 sigma
fn gaussian_sigma(ksize: u32) -> f32 {
  0.3 * ((ksize as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

fn pixelate(image: &RgbImage, block: u32) -> RgbImage {
  let (width, height) = image.dimensions();
  let small_w = (width / block).max(1);
  let small_h = (height / block).max(1);
  let small = image::imageops::resize(image, small_w, small_h, FilterType::Triangle);
  image::imageops::resize(&small, width, height, FilterType::Nearest)
}

fn copy_foreground(image: &RgbImage, source: &RgbImage, mask: ArrayView2<'_, u8>) -> RgbImage {
  paint_foreground(image, mask, |(x, y)| *source.get_pixel(x, y))
}

fn paint_foreground<F>(image: &RgbImage, mask: ArrayView2<'_, u8>, mut paint: F) -> RgbImage
where
  F: FnMut((u32, u32)) -> Rgb<u8>,
{
  let mut out = image.clone();
  for ((y, x), &v) in mask.indexed_iter() {
    if v > 0 {
      out.put_pixel(x as u32, y as u32, paint((x as u32, y as u32)));
    }
  }
  out
}

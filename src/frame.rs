// 该文件是 Yinxing （隐形） 项目的一部分。
// src/frame.rs - 图像帧读取与预处理
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

use std::path::Path;

use image::{RgbImage, imageops::FilterType};
use tracing::debug;

/// 交换 R 与 B 通道（RGB <-> BGR）
pub fn reverse_channels(image: &RgbImage) -> RgbImage {
  let mut out = image.clone();
  for pixel in out.pixels_mut() {
    pixel.0.reverse();
  }
  out
}

/// 读取图像文件并转换为 RGB
pub fn load_rgb(path: &Path) -> Result<RgbImage, image::ImageError> {
  let image = image::open(path)?.to_rgb8();
  debug!("读取图像 {}: {}x{}", path.display(), image.width(), image.height());
  Ok(image)
}

/// 一张待处理的图像。
///
/// `source` 为原始分辨率，`inference` 为送入模型的图像，
/// `scale` 为 (scale_y, scale_x)，把 `inference` 上的坐标映射回 `source`。
#[derive(Debug, Clone)]
pub struct Frame {
  pub source: RgbImage,
  pub inference: RgbImage,
  pub scale: (f32, f32),
}

impl Frame {
  /// `resize` 为 (宽, 高)，`None` 时不缩放
  pub fn prepare(source: RgbImage, resize: Option<(u32, u32)>) -> Self {
    let (orig_w, orig_h) = source.dimensions();
    match resize {
      Some((width, height)) if (width, height) != (orig_w, orig_h) && width > 0 && height > 0 => {
        let inference = image::imageops::resize(&source, width, height, FilterType::Triangle);
        let scale = (
          orig_h as f32 / height as f32,
          orig_w as f32 / width as f32,
        );
        Self {
          source,
          inference,
          scale,
        }
      }
      _ => Self {
        inference: source.clone(),
        source,
        scale: (1.0, 1.0),
      },
    }
  }

  pub fn width(&self) -> u32 {
    self.source.width()
  }

  pub fn height(&self) -> u32 {
    self.source.height()
  }
}

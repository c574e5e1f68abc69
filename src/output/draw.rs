// 该文件是 Yinxing （隐形） 项目的一部分。
// src/output/draw.rs - 检测与分割结果可视化
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

use image::{Rgb, RgbImage};
use imageproc::{drawing::draw_hollow_rect_mut, rect::Rect};
use rand::{Rng, SeedableRng, rngs::StdRng};
use tracing::warn;

use crate::detection::Detection;

const BOX_THICKNESS: i32 = 2;
/// 掩码覆盖色的不透明度
pub const DEFAULT_ALPHA: f32 = 0.5;

/// 第 `index` 个检测使用的颜色，同一下标总是得到同一颜色
pub fn detection_color(index: usize) -> [u8; 3] {
  let mut rng = StdRng::seed_from_u64(index as u64);
  [
    rng.gen_range(50..=255u8),
    rng.gen_range(50..=255u8),
    rng.gen_range(50..=255u8),
  ]
}

// 在图像上绘制 2 像素宽的矩形边框，坐标为像素坐标
fn draw_bbox(image: &mut RgbImage, bbox: [i32; 4], color: [u8; 3]) {
  let (w, h) = (image.width() as i32, image.height() as i32);
  let x_min = bbox[0].clamp(0, w - 1);
  let y_min = bbox[1].clamp(0, h - 1);
  let x_max = bbox[2].clamp(0, w - 1);
  let y_max = bbox[3].clamp(0, h - 1);

  if x_min >= x_max || y_min >= y_max {
    return;
  }

  for t in 0..BOX_THICKNESS {
    let width = x_max - x_min - 2 * t + 1;
    let height = y_max - y_min - 2 * t + 1;
    if width <= 0 || height <= 0 {
      break;
    }
    let rect = Rect::at(x_min + t, y_min + t).of_size(width as u32, height as u32);
    draw_hollow_rect_mut(image, rect, Rgb(color));
  }
}

/// 以 `alpha` 把每个检测的分割区域染色，并绘制边框。
///
/// 分割尺寸与图像不一致的检测只画边框。
pub fn blend_detections(image: &RgbImage, detections: &[Detection], alpha: f32) -> RgbImage {
  let alpha = alpha.clamp(0.0, 1.0);
  let mut overlay = image.clone();
  let (width, height) = image.dimensions();

  for (i, det) in detections.iter().enumerate() {
    let color = detection_color(i);

    if let Some(rle) = &det.segmentation {
      match rle.decode() {
        Ok(mask) if mask.dim() == (height as usize, width as usize) => {
          for ((y, x), &v) in mask.indexed_iter() {
            if v == 0 {
              continue;
            }
            let pixel = overlay.get_pixel_mut(x as u32, y as u32);
            for c in 0..3 {
              pixel[c] = (pixel[c] as f32 * (1.0 - alpha) + color[c] as f32 * alpha).round() as u8;
            }
          }
        }
        Ok(mask) => warn!(
          "分割尺寸 {:?} 与图像尺寸 {}x{} 不一致，跳过染色",
          mask.dim(),
          height,
          width
        ),
        Err(e) => warn!("分割解码失败: {}", e),
      }
    }

    draw_bbox(&mut overlay, det.bbox_i32(), color);
  }

  overlay
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::mask::{Mask, Rle};

  #[test]
  fn colors_are_deterministic() {
    assert_eq!(detection_color(3), detection_color(3));
    assert!(detection_color(0).iter().all(|&c| c >= 50));
  }

  #[test]
  fn box_outline_is_two_pixels_wide() {
    let image = RgbImage::new(20, 20);
    let det = Detection::new([4.0, 4.0, 15.0, 15.0], 0.9);
    let out = blend_detections(&image, &[det], DEFAULT_ALPHA);
    let color = Rgb(detection_color(0));
    assert_eq!(*out.get_pixel(4, 10), color);
    assert_eq!(*out.get_pixel(5, 10), color);
    assert_eq!(*out.get_pixel(6, 10), Rgb([0, 0, 0]));
    assert_eq!(*out.get_pixel(0, 0), Rgb([0, 0, 0]));
  }

  #[test]
  fn segmentation_is_tinted() {
    let image = RgbImage::new(10, 10);
    let mut mask = Mask::zeros((10, 10));
    mask[[5, 5]] = 1;
    let mut det = Detection::new([0.0, 0.0, 9.0, 9.0], 0.9);
    det.segmentation = Some(Rle::encode(mask.view()));

    let out = blend_detections(&image, &[det], 1.0);
    assert_eq!(*out.get_pixel(5, 5), Rgb(detection_color(0)));
    assert_eq!(*out.get_pixel(4, 4), Rgb([0, 0, 0]));
  }
}

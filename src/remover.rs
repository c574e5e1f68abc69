// 该文件是 Yinxing （隐形） 项目的一部分。
// src/remover.rs - 逐掩码目标移除
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
use ndarray::{ArrayView2, ArrayViewD, Axis, Ix2, Ix3};
use thiserror::Error;
use tracing::{debug, info};

use crate::{
  frame::reverse_channels,
  mask::{self, MaskStack},
  model::{Inpainter, LazyModel, ModelError, ModelRegistries, RegistryError},
};

#[derive(Error, Debug)]
pub enum RemoverError {
  #[error("掩码维度错误: 需要 [H, W] 或 [N, H, W]，实际为 {0} 维")]
  InvalidRank(usize),
  #[error("没有提供任何掩码")]
  EmptyMasks,
  #[error("掩码尺寸 {actual:?} 与图像尺寸 {expected:?} 不一致")]
  ShapeMismatch {
    expected: (usize, usize),
    actual: (usize, usize),
  },
  #[error("修复模型错误: {0}")]
  Model(#[from] ModelError),
}

/// 多张掩码的处理顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RemovalOrder {
  /// 按传入顺序
  #[default]
  AsGiven,
  /// 面积大的先处理，同面积保持传入顺序
  LargestFirst,
  /// 面积小的先处理，同面积保持传入顺序
  SmallestFirst,
}

impl RemovalOrder {
  /// 返回处理顺序对应的掩码下标
  pub fn arrange(&self, masks: &[ArrayView2<'_, u8>]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..masks.len()).collect();
    match self {
      RemovalOrder::AsGiven => {}
      RemovalOrder::LargestFirst => {
        order.sort_by_key(|&i| std::cmp::Reverse(mask::area(masks[i])));
      }
      RemovalOrder::SmallestFirst => {
        order.sort_by_key(|&i| mask::area(masks[i]));
      }
    }
    order
  }
}

/// 依次调用修复模型移除掩码区域。
///
/// 每次调用的输出作为下一次调用的输入，因此逐张处理与合并成一张
/// 掩码后处理的结果可能不同。输出图像的通道顺序与输入相反。
#[derive(Debug)]
pub struct Remover {
  inpainter: LazyModel<dyn Inpainter>,
  order: RemovalOrder,
}

impl Remover {
  pub fn new(inpainter: LazyModel<dyn Inpainter>, order: RemovalOrder) -> Self {
    Self { inpainter, order }
  }

  pub fn from_registries(
    registries: &ModelRegistries,
    inpainter: &str,
    order: RemovalOrder,
  ) -> Result<Self, RegistryError> {
    let inpainter = registries.inpainters.lazy(inpainter)?;
    info!("移除器: 修复模型 {}, 顺序 {:?}", inpainter.name(), order);
    Ok(Self::new(inpainter, order))
  }

  pub fn order(&self) -> RemovalOrder {
    self.order
  }

  /// `masks` 为 [H, W] 或 [N, H, W]
  pub fn remove(
    &mut self,
    image: &RgbImage,
    masks: ArrayViewD<'_, u8>,
  ) -> Result<RgbImage, RemoverError> {
    let masks: Vec<ArrayView2<'_, u8>> = match masks.ndim() {
      2 => vec![
        masks
          .into_dimensionality::<Ix2>()
          .map_err(|_| RemoverError::InvalidRank(2))?,
      ],
      3 => {
        let stack = masks
          .into_dimensionality::<Ix3>()
          .map_err(|_| RemoverError::InvalidRank(3))?;
        (0..stack.len_of(Axis(0)))
          .map(|i| stack.clone().index_axis_move(Axis(0), i))
          .collect()
      }
      rank => return Err(RemoverError::InvalidRank(rank)),
    };

    if masks.is_empty() {
      return Err(RemoverError::EmptyMasks);
    }

    let (width, height) = image.dimensions();
    let expected = (height as usize, width as usize);
    if let Some(bad) = masks.iter().find(|m| m.dim() != expected) {
      return Err(RemoverError::ShapeMismatch {
        expected,
        actual: bad.dim(),
      });
    }

    let inpainter = self.inpainter.get()?;
    let mut current = image.clone();
    for index in self.order.arrange(&masks) {
      let now = std::time::Instant::now();
      current = inpainter.run(&current, masks[index])?;
      debug!("掩码 {} 修复完成，耗时: {:.2?}", index, now.elapsed());
    }

    Ok(reverse_channels(&current))
  }

  pub fn remove_stack(
    &mut self,
    image: &RgbImage,
    masks: &MaskStack,
  ) -> Result<RgbImage, RemoverError> {
    self.remove(image, masks.view().into_dyn())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::mask::Mask;
  use image::Rgb;
  use ndarray::{Array, IxDyn};
  use std::ops::Range;
  use std::sync::{Arc, Mutex};

  /// 把掩码内像素的每个通道加 10，并记录每次调用的掩码面积
  struct Brighten {
    calls: Arc<Mutex<Vec<usize>>>,
  }

  impl Inpainter for Brighten {
    fn run(&mut self, image: &RgbImage, mask: ArrayView2<'_, u8>) -> Result<RgbImage, ModelError> {
      self.calls.lock().unwrap().push(mask::area(mask));
      let mut out = image.clone();
      for ((y, x), &v) in mask.indexed_iter() {
        if v > 0 {
          let p = out.get_pixel_mut(x as u32, y as u32);
          for c in p.0.iter_mut() {
            *c = c.saturating_add(10);
          }
        }
      }
      Ok(out)
    }
  }

  fn brighten_remover(order: RemovalOrder) -> (Remover, Arc<Mutex<Vec<usize>>>) {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let inpainter: LazyModel<dyn Inpainter> = LazyModel::from_instance(
      "brighten",
      Box::new(Brighten {
        calls: calls.clone(),
      }) as Box<dyn Inpainter>,
    );
    (Remover::new(inpainter, order), calls)
  }

  fn rect(height: usize, width: usize, rows: Range<usize>, cols: Range<usize>) -> Mask {
    let mut mask = Mask::zeros((height, width));
    for y in rows {
      for x in cols.clone() {
        mask[[y, x]] = 1;
      }
    }
    mask
  }

  #[test]
  fn masks_are_composited_sequentially() {
    let image = RgbImage::from_pixel(6, 6, Rgb([0, 0, 0]));
    let mut stack = MaskStack::zeros((2, 6, 6));
    stack.index_axis_mut(Axis(0), 0).assign(&rect(6, 6, 0..3, 0..3));
    stack.index_axis_mut(Axis(0), 1).assign(&rect(6, 6, 2..5, 2..5));

    let (mut remover, calls) = brighten_remover(RemovalOrder::AsGiven);
    let sequential = remover.remove_stack(&image, &stack).unwrap();
    assert_eq!(*calls.lock().unwrap(), vec![9, 9]);
    // 重叠像素被处理了两次
    assert_eq!(*sequential.get_pixel(2, 2), Rgb([20, 20, 20]));
    assert_eq!(*sequential.get_pixel(0, 0), Rgb([10, 10, 10]));

    let merged = mask::union_stack(&stack);
    let (mut remover, _) = brighten_remover(RemovalOrder::AsGiven);
    let once = remover.remove(&image, merged.view().into_dyn()).unwrap();
    assert_eq!(*once.get_pixel(2, 2), Rgb([10, 10, 10]));
    assert_ne!(sequential, once);
  }

  #[test]
  fn output_channels_are_reversed() {
    let image = RgbImage::from_pixel(4, 4, Rgb([1, 2, 3]));
    let mask = rect(4, 4, 0..1, 0..1);
    let (mut remover, _) = brighten_remover(RemovalOrder::AsGiven);
    let out = remover.remove(&image, mask.view().into_dyn()).unwrap();
    assert_eq!(*out.get_pixel(3, 3), Rgb([3, 2, 1]));
    assert_eq!(*out.get_pixel(0, 0), Rgb([13, 12, 11]));
  }

  #[test]
  fn order_is_an_explicit_parameter() {
    let image = RgbImage::new(8, 8);
    let mut stack = MaskStack::zeros((3, 8, 8));
    stack.index_axis_mut(Axis(0), 0).assign(&rect(8, 8, 0..2, 0..2));
    stack.index_axis_mut(Axis(0), 1).assign(&rect(8, 8, 0..4, 0..4));
    stack.index_axis_mut(Axis(0), 2).assign(&rect(8, 8, 0..1, 0..1));

    let (mut largest, calls) = brighten_remover(RemovalOrder::LargestFirst);
    largest.remove_stack(&image, &stack).unwrap();
    assert_eq!(*calls.lock().unwrap(), vec![16, 4, 1]);

    let (mut smallest, calls) = brighten_remover(RemovalOrder::SmallestFirst);
    smallest.remove_stack(&image, &stack).unwrap();
    assert_eq!(*calls.lock().unwrap(), vec![1, 4, 16]);
  }

  #[test]
  fn wrong_rank_is_rejected() {
    let image = RgbImage::new(4, 4);
    let (mut remover, _) = brighten_remover(RemovalOrder::AsGiven);
    let flat = Array::<u8, _>::zeros(IxDyn(&[16]));
    assert!(matches!(
      remover.remove(&image, flat.view()),
      Err(RemoverError::InvalidRank(1))
    ));
    let deep = Array::<u8, _>::zeros(IxDyn(&[1, 1, 4, 4]));
    assert!(matches!(
      remover.remove(&image, deep.view()),
      Err(RemoverError::InvalidRank(4))
    ));
  }

  #[test]
  fn empty_stack_and_wrong_size_are_rejected() {
    let image = RgbImage::new(4, 4);
    let (mut remover, calls) = brighten_remover(RemovalOrder::AsGiven);
    assert!(matches!(
      remover.remove_stack(&image, &MaskStack::zeros((0, 4, 4))),
      Err(RemoverError::EmptyMasks)
    ));
    assert!(matches!(
      remover.remove_stack(&image, &MaskStack::zeros((1, 3, 4))),
      Err(RemoverError::ShapeMismatch { .. })
    ));
    assert!(calls.lock().unwrap().is_empty());
  }
}

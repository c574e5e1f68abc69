// 该文件是 Yinxing （隐形） 项目的一部分。
// src/mask/rle.rs - 掩码游程编码
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

use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use super::{MASK_ON, Mask, MaskError};

/// COCO 兼容的压缩 RLE。
///
/// 像素按列优先顺序展开，游程从背景开始交替计数；`counts` 使用 COCO 的
/// 6 bit 可打印字符压缩格式，`size` 为 `[高, 宽]`，可脱离原图独立解码。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rle {
  pub size: [u32; 2],
  pub counts: String,
}

impl Rle {
  pub fn encode(mask: ArrayView2<'_, u8>) -> Self {
    let (height, width) = mask.dim();
    let runs = column_major_runs(mask);
    Self {
      size: [height as u32, width as u32],
      counts: runs_to_string(&runs),
    }
  }

  pub fn height(&self) -> usize {
    self.size[0] as usize
  }

  pub fn width(&self) -> usize {
    self.size[1] as usize
  }

  pub fn runs(&self) -> Result<Vec<u64>, MaskError> {
    string_to_runs(&self.counts)
  }

  /// 前景像素数量
  pub fn area(&self) -> Result<u64, MaskError> {
    Ok(self.runs()?.iter().skip(1).step_by(2).sum())
  }

  /// 解码为 0/1 稠密掩码
  pub fn decode(&self) -> Result<Mask, MaskError> {
    let (height, width) = (self.height(), self.width());
    let runs = self.runs()?;
    let total: u64 = runs.iter().sum();
    if total != (height * width) as u64 {
      return Err(MaskError::InvalidRle(format!(
        "游程总长 {} 与尺寸 {}x{} 不一致",
        total, height, width
      )));
    }

    let mut mask = Array2::<u8>::zeros((height, width));
    let mut index = 0usize;
    for (i, &run) in runs.iter().enumerate() {
      let run = run as usize;
      if i % 2 == 1 {
        for k in index..index + run {
          mask[[k % height, k / height]] = MASK_ON;
        }
      }
      index += run;
    }
    Ok(mask)
  }
}

fn column_major_runs(mask: ArrayView2<'_, u8>) -> Vec<u64> {
  let (height, width) = mask.dim();
  let mut runs = Vec::new();
  let mut current = false;
  let mut length = 0u64;

  for x in 0..width {
    for y in 0..height {
      let value = mask[[y, x]] > 0;
      if value != current {
        runs.push(length);
        length = 0;
        current = value;
      }
      length += 1;
    }
  }
  runs.push(length);
  runs
}

fn runs_to_string(runs: &[u64]) -> String {
  let mut out = String::with_capacity(runs.len() * 2);
  for i in 0..runs.len() {
    let mut x = runs[i] as i64;
    if i > 2 {
      x -= runs[i - 2] as i64;
    }
    let mut more = true;
    while more {
      let mut c = x & 0x1f;
      x >>= 5;
      more = if c & 0x10 != 0 { x != -1 } else { x != 0 };
      if more {
        c |= 0x20;
      }
      out.push((c as u8 + 48) as char);
    }
  }
  out
}

fn string_to_runs(counts: &str) -> Result<Vec<u64>, MaskError> {
  let bytes = counts.as_bytes();
  let mut runs: Vec<u64> = Vec::new();
  let mut p = 0usize;

  while p < bytes.len() {
    let mut x = 0i64;
    let mut k = 0u32;
    let mut more = true;
    while more {
      let byte = *bytes
        .get(p)
        .ok_or_else(|| MaskError::InvalidRle("counts 字符串意外结束".to_string()))?;
      if !(48..48 + 64).contains(&byte) || k > 11 {
        return Err(MaskError::InvalidRle(format!("非法的 counts 字符: {:?}", byte as char)));
      }
      let c = (byte - 48) as i64;
      x |= (c & 0x1f) << (5 * k);
      more = c & 0x20 != 0;
      p += 1;
      k += 1;
      if !more && c & 0x10 != 0 {
        x |= -1i64 << (5 * k);
      }
    }
    let m = runs.len();
    if m > 2 {
      x += runs[m - 2] as i64;
    }
    if x < 0 {
      return Err(MaskError::InvalidRle(format!("负的游程长度: {}", x)));
    }
    runs.push(x as u64);
  }
  Ok(runs)
}

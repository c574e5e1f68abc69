// 该文件是 Yinxing （隐形） 项目的一部分。
// src/camouflage/inpaint.rs - 经典图像修复算法
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

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use image::{Rgb, RgbImage};
use ndarray::ArrayView2;

/// 修复算法
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InpaintAlgorithm {
  /// Telea 快速行进法
  Telea,
  /// 基于扩散的 Navier-Stokes 近似
  NavierStokes,
}

const KNOWN: u8 = 0;
const BAND: u8 = 1;
const INSIDE: u8 = 2;
const INF: f32 = 1.0e6;
// 每单位半径的扩散迭代次数
const NS_ITERATIONS_PER_RADIUS: u32 = 16;

#[derive(Debug, Clone, Copy)]
struct Node {
  t: f32,
  index: usize,
}

impl PartialEq for Node {
  fn eq(&self, other: &Self) -> bool {
    self.cmp(other) == Ordering::Equal
  }
}

impl Eq for Node {}

impl PartialOrd for Node {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

impl Ord for Node {
  // BinaryHeap 是大顶堆，这里反转得到最小 T 优先
  fn cmp(&self, other: &Self) -> Ordering {
    other
      .t
      .total_cmp(&self.t)
      .then_with(|| other.index.cmp(&self.index))
  }
}

/// 修复掩码内（值 > 0）的像素，掩码外的像素保持不变。
///
/// 掩码尺寸必须与图像一致，由调用方保证。
pub fn inpaint(
  image: &RgbImage,
  mask: ArrayView2<'_, u8>,
  algorithm: InpaintAlgorithm,
  radius: u32,
) -> RgbImage {
  let mut fmm = FastMarching::new(image, mask, radius.max(1));
  fmm.march();
  if algorithm == InpaintAlgorithm::NavierStokes {
    fmm.diffuse(radius.max(1) * NS_ITERATIONS_PER_RADIUS);
  }
  fmm.into_image(image)
}

struct FastMarching {
  width: usize,
  height: usize,
  radius: i64,
  flags: Vec<u8>,
  t: Vec<f32>,
  pixels: Vec<[f32; 3]>,
  masked: Vec<bool>,
  heap: BinaryHeap<Node>,
}

impl FastMarching {
  fn new(image: &RgbImage, mask: ArrayView2<'_, u8>, radius: u32) -> Self {
    let (width, height) = (image.width() as usize, image.height() as usize);
    let size = width * height;

    let pixels = image
      .pixels()
      .map(|p| [p[0] as f32, p[1] as f32, p[2] as f32])
      .collect::<Vec<_>>();
    let masked = (0..size)
      .map(|i| mask[[i / width, i % width]] > 0)
      .collect::<Vec<_>>();

    let mut flags = vec![KNOWN; size];
    let mut t = vec![0.0f32; size];
    for i in 0..size {
      if masked[i] {
        flags[i] = INSIDE;
        t[i] = INF;
      }
    }

    // 与待修复区域相邻的已知像素构成初始窄带
    let mut heap = BinaryHeap::new();
    for index in 0..size {
      if flags[index] != KNOWN {
        continue;
      }
      let (x, y) = (index % width, index / width);
      let touches_inside = neighbours(x, y, width, height).any(|n| flags[n] == INSIDE);
      if touches_inside {
        flags[index] = BAND;
        heap.push(Node { t: 0.0, index });
      }
    }

    Self {
      width,
      height,
      radius: radius as i64,
      flags,
      t,
      pixels,
      masked,
      heap,
    }
  }

  fn march(&mut self) {
    while let Some(Node { index, .. }) = self.heap.pop() {
      if self.flags[index] == KNOWN {
        continue;
      }
      self.flags[index] = KNOWN;

      let (x, y) = (index % self.width, index / self.width);
      let candidates: Vec<usize> = neighbours(x, y, self.width, self.height)
        .filter(|&n| self.flags[n] == INSIDE)
        .collect();

      for n in candidates {
        let (nx, ny) = (n % self.width, n / self.width);
        self.t[n] = self.arrival_time(nx, ny);
        self.pixels[n] = self.estimate(nx, ny);
        self.flags[n] = BAND;
        self.heap.push(Node { t: self.t[n], index: n });
      }
    }
  }

  fn at(&self, x: i64, y: i64) -> Option<usize> {
    if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
      None
    } else {
      Some(y as usize * self.width + x as usize)
    }
  }

  fn solve(&self, a: Option<usize>, b: Option<usize>) -> f32 {
    let (ta, fa) = a.map_or((INF, INSIDE), |i| (self.t[i], self.flags[i]));
    let (tb, fb) = b.map_or((INF, INSIDE), |i| (self.t[i], self.flags[i]));

    match (fa != INSIDE, fb != INSIDE) {
      (true, true) => {
        let d = ta - tb;
        if d.abs() >= 1.0 {
          1.0 + ta.min(tb)
        } else {
          (ta + tb + (2.0 - d * d).sqrt()) * 0.5
        }
      }
      (true, false) => 1.0 + ta,
      (false, true) => 1.0 + tb,
      (false, false) => 1.0 + ta.min(tb),
    }
  }

  fn arrival_time(&self, x: usize, y: usize) -> f32 {
    let (x, y) = (x as i64, y as i64);
    let up = self.at(x, y - 1);
    let down = self.at(x, y + 1);
    let left = self.at(x - 1, y);
    let right = self.at(x + 1, y);
    self
      .solve(up, left)
      .min(self.solve(down, left))
      .min(self.solve(up, right))
      .min(self.solve(down, right))
  }

  fn gradient_t(&self, x: i64, y: i64) -> (f32, f32) {
    let center = self.t[y as usize * self.width + x as usize];
    let known = |i: Option<usize>| i.filter(|&i| self.flags[i] != INSIDE).map(|i| self.t[i]);
    let axis = |prev: Option<f32>, next: Option<f32>| match (prev, next) {
      (Some(p), Some(n)) => (n - p) * 0.5,
      (None, Some(n)) => n - center,
      (Some(p), None) => center - p,
      (None, None) => 0.0,
    };
    (
      axis(known(self.at(x - 1, y)), known(self.at(x + 1, y))),
      axis(known(self.at(x, y - 1)), known(self.at(x, y + 1))),
    )
  }

  /// 以方向、距离、水平集三项权重对半径内已知像素加权平均
  fn estimate(&self, x: usize, y: usize) -> [f32; 3] {
    let (x, y) = (x as i64, y as i64);
    let t_p = self.t[y as usize * self.width + x as usize];
    let (gx, gy) = self.gradient_t(x, y);
    let r2 = self.radius * self.radius;

    let mut sum = [0.0f32; 3];
    let mut total = 0.0f32;
    for dy in -self.radius..=self.radius {
      for dx in -self.radius..=self.radius {
        if dx * dx + dy * dy > r2 {
          continue;
        }
        let Some(q) = self.at(x + dx, y + dy) else {
          continue;
        };
        if self.flags[q] == INSIDE || (dx == 0 && dy == 0) {
          continue;
        }

        let (rx, ry) = (-dx as f32, -dy as f32);
        let len2 = rx * rx + ry * ry;
        let len = len2.sqrt();
        let dir = ((rx * gx + ry * gy) / len).abs().max(1.0e-6);
        let dst = 1.0 / len2;
        let lev = 1.0 / (1.0 + (self.t[q] - t_p).abs());
        let w = dir * dst * lev;

        for c in 0..3 {
          sum[c] += w * self.pixels[q][c];
        }
        total += w;
      }
    }

    if total > 0.0 {
      [sum[0] / total, sum[1] / total, sum[2] / total]
    } else {
      self.pixels[y as usize * self.width + x as usize]
    }
  }

  /// 在掩码内做各向同性扩散，边界取掩码外的已知像素
  fn diffuse(&mut self, iterations: u32) {
    let inside: Vec<usize> = (0..self.pixels.len()).filter(|&i| self.masked[i]).collect();
    for _ in 0..iterations {
      let snapshot = self.pixels.clone();
      for &index in &inside {
        let (x, y) = (index % self.width, index / self.width);
        let mut sum = [0.0f32; 3];
        let mut count = 0.0f32;
        for n in neighbours(x, y, self.width, self.height) {
          for c in 0..3 {
            sum[c] += snapshot[n][c];
          }
          count += 1.0;
        }
        if count > 0.0 {
          self.pixels[index] = [sum[0] / count, sum[1] / count, sum[2] / count];
        }
      }
    }
  }

  fn into_image(self, source: &RgbImage) -> RgbImage {
    let mut out = source.clone();
    for (index, pixel) in self.pixels.iter().enumerate() {
      if !self.masked[index] {
        continue;
      }
      let (x, y) = ((index % self.width) as u32, (index / self.width) as u32);
      out.put_pixel(
        x,
        y,
        Rgb([
          pixel[0].round().clamp(0.0, 255.0) as u8,
          pixel[1].round().clamp(0.0, 255.0) as u8,
          pixel[2].round().clamp(0.0, 255.0) as u8,
        ]),
      );
    }
    out
  }
}

fn neighbours(x: usize, y: usize, width: usize, height: usize) -> impl Iterator<Item = usize> {
  let offsets: [(i64, i64); 4] = [(0, -1), (-1, 0), (1, 0), (0, 1)];
  offsets.into_iter().filter_map(move |(dx, dy)| {
    let nx = x as i64 + dx;
    let ny = y as i64 + dy;
    if nx < 0 || ny < 0 || nx >= width as i64 || ny >= height as i64 {
      None
    } else {
      Some(ny as usize * width + nx as usize)
    }
  })
}

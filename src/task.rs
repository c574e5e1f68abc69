// 该文件是 Yinxing （隐形） 项目的一部分。
// src/task.rs - 批处理任务
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

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use ndarray::Axis;
use thiserror::Error;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::{
  camouflage::{Camouflage, CamouflageError},
  detection::Detection,
  frame::{Frame, load_rgb, reverse_channels},
  mask::{self, Mask, MaskStack},
  mask_generator::{GenerateOptions, MaskGenerator, MaskGeneratorError},
  model::ModelError,
  ocr::OcrProcessor,
  output::{
    OutputBundle, OutputError, RunStatistics, RunSummary, SummaryKind,
    draw::{DEFAULT_ALPHA, blend_detections},
    output_bases, with_suffix,
  },
  remover::{Remover, RemoverError},
};

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];
pub const SUMMARY_FILE: &str = "summary.json";

#[derive(Error, Debug)]
pub enum PipelineError {
  #[error("图像读取错误: {0}")]
  Image(#[from] image::ImageError),
  #[error("掩码生成错误: {0}")]
  MaskGenerator(#[from] MaskGeneratorError),
  #[error("伪装错误: {0}")]
  Camouflage(#[from] CamouflageError),
  #[error("移除错误: {0}")]
  Remover(#[from] RemoverError),
  #[error("模型错误: {0}")]
  Model(#[from] ModelError),
  #[error("输出错误: {0}")]
  Output(#[from] OutputError),
}

/// 递归查找目录下的图像文件，按路径排序
pub fn collect_images(dir: &Path) -> Vec<PathBuf> {
  let mut images: Vec<PathBuf> = WalkDir::new(dir)
    .into_iter()
    .filter_map(|entry| match entry {
      Ok(entry) => Some(entry),
      Err(e) => {
        warn!("遍历目录出错: {}", e);
        None
      }
    })
    .filter(|entry| entry.file_type().is_file())
    .map(|entry| entry.into_path())
    .filter(|path| {
      path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
    })
    .collect();
  images.sort();
  info!("在 {} 中找到 {} 张图像", dir.display(), images.len());
  images
}

/// 处理模式
pub enum Mode {
  /// 检测、分割后对目标做伪装
  Redact {
    generator: MaskGenerator,
    camouflage: Camouflage,
    options: GenerateOptions,
  },
  /// 检测、分割后用修复模型移除目标
  Remove {
    generator: MaskGenerator,
    remover: Remover,
    options: GenerateOptions,
  },
  /// 文字检测
  Ocr { processor: OcrProcessor, conf: f32 },
}

impl Mode {
  fn summary_kind(&self) -> SummaryKind {
    match self {
      Mode::Ocr { .. } => SummaryKind::TextBoxes,
      _ => SummaryKind::Detections,
    }
  }

  fn name(&self) -> &'static str {
    match self {
      Mode::Redact { .. } => "redact",
      Mode::Remove { .. } => "remove",
      Mode::Ocr { .. } => "ocr",
    }
  }
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
  pub input_dir: PathBuf,
  pub output_dir: PathBuf,
  /// 推理前缩放到 (宽, 高)
  pub resize: Option<(u32, u32)>,
}

pub struct Pipeline {
  options: PipelineOptions,
  mode: Mode,
  stop: Arc<AtomicBool>,
}

impl Pipeline {
  pub fn new(options: PipelineOptions, mode: Mode) -> Self {
    Self {
      options,
      mode,
      stop: Arc::new(AtomicBool::new(false)),
    }
  }

  /// 外部置位后，当前图像处理完即停止
  pub fn stop_flag(&self) -> Arc<AtomicBool> {
    self.stop.clone()
  }

  /// 处理整个目录并写出 `summary.json`。
  ///
  /// 单张图像失败只记为跳过，不会中断批处理。
  pub fn run_task(mut self) -> Result<RunSummary, PipelineError> {
    info!(
      "开始任务: 模式 {}, 输入 {}, 输出 {}, 缩放 {:?}",
      self.mode.name(),
      self.options.input_dir.display(),
      self.options.output_dir.display(),
      self.options.resize
    );
    std::fs::create_dir_all(&self.options.output_dir).map_err(OutputError::from)?;

    let images = collect_images(&self.options.input_dir);
    if images.is_empty() {
      warn!("没有找到任何图像");
    }

    let bases = output_bases(&self.options.input_dir, &self.options.output_dir, &images);
    let mut stats = RunStatistics::new(images.len());
    for (index, (path, base)) in images.iter().zip(&bases).enumerate() {
      if self.stop.load(Ordering::SeqCst) {
        warn!("中断信号接收，剩余 {} 张图像未处理", images.len() - index);
        break;
      }

      info!("处理第 {}/{} 张图像: {}", index + 1, images.len(), path.display());
      let now = std::time::Instant::now();
      match self.process_image(path, base) {
        Ok(detections) => {
          let elapsed = now.elapsed();
          info!("完成 {}: {} 个目标，耗时: {:.2?}", path.display(), detections.len(), elapsed);
          stats.record_processed(&detections, elapsed);
        }
        Err(e) => {
          warn!("跳过 {}: {}", path.display(), e);
          stats.record_skipped();
        }
      }
    }

    let summary = stats.summary(self.mode.summary_kind());
    summary.save(&self.options.output_dir.join(SUMMARY_FILE))?;
    info!(
      "任务完成: 共 {} 张，处理 {} 张，跳过 {} 张，平均耗时 {:.3} 秒",
      summary.total_images,
      summary.processed_images,
      summary.skipped_images,
      summary.avg_time_per_image_sec
    );
    Ok(summary)
  }

  fn process_image(&mut self, path: &Path, base: &Path) -> Result<Vec<Detection>, PipelineError> {
    let frame = Frame::prepare(load_rgb(path)?, self.options.resize);
    let mut bundle = OutputBundle::new();

    let detections = match &mut self.mode {
      Mode::Redact {
        generator,
        camouflage,
        options,
      } => {
        let options = GenerateOptions {
          scale: frame.scale,
          ..options.clone()
        };
        let out = generator.generate(&frame.inference, &options)?;
        bundle.add_json(with_suffix(base, ".json"), &out.detections)?;

        if !out.is_empty() {
          let masks = fit_masks(&out.masks, &frame);
          let camouflaged = camouflage.hide(&frame.source, &masks)?;
          let blended = blend_detections(&frame.source, &out.detections, DEFAULT_ALPHA);
          let static_mask =
            mask::static_scene_mask(&masks, frame.height() as usize, frame.width() as usize);

          bundle.add_rgb(with_suffix(base, ".camouflaged.png"), &camouflaged)?;
          bundle.add_rgb(with_suffix(base, ".blended.png"), &blended)?;
          bundle.add_gray(with_suffix(base, ".mask.png"), &static_mask)?;
        }
        out.detections
      }
      Mode::Remove {
        generator,
        remover,
        options,
      } => {
        let options = GenerateOptions {
          scale: frame.scale,
          ..options.clone()
        };
        let out = generator.generate(&frame.inference, &options)?;
        bundle.add_json(with_suffix(base, ".json"), &out.detections)?;

        if !out.is_empty() {
          let masks = stack_masks(&fit_masks(&out.masks, &frame), &frame);
          // 修复结果的通道顺序与输入相反，输入 BGR 得到 RGB
          let inpainted = remover.remove_stack(&reverse_channels(&frame.source), &masks)?;
          bundle.add_rgb(with_suffix(base, ".inpainted.png"), &inpainted)?;
        }
        out.detections
      }
      Mode::Ocr { processor, conf } => {
        let detections = processor.process(&frame.inference, *conf, frame.scale)?;
        bundle.add_json(with_suffix(base, ".json"), &detections)?;

        if !detections.is_empty() {
          let detected = blend_detections(&frame.source, &detections, DEFAULT_ALPHA);
          bundle.add_rgb(with_suffix(base, ".detected.png"), &detected)?;
        }
        detections
      }
    };

    bundle.write()?;
    Ok(detections)
  }
}

/// 把掩码对齐到原始分辨率
fn fit_masks(stack: &MaskStack, frame: &Frame) -> Vec<Mask> {
  let (height, width) = (frame.height() as usize, frame.width() as usize);
  stack
    .axis_iter(Axis(0))
    .map(|m| mask::resize_nearest(m, height, width))
    .collect()
}

fn stack_masks(masks: &[Mask], frame: &Frame) -> MaskStack {
  let (height, width) = (frame.height() as usize, frame.width() as usize);
  let mut stack = MaskStack::zeros((masks.len(), height, width));
  for (i, m) in masks.iter().enumerate() {
    stack.index_axis_mut(Axis(0), i).assign(m);
  }
  stack
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn images_are_found_recursively_and_sorted() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("sub")).unwrap();
    for name in ["b.PNG", "a.jpg", "sub/c.jpeg", "notes.txt", "d.gif"] {
      std::fs::write(dir.path().join(name), b"").unwrap();
    }
    let images = collect_images(dir.path());
    let names: Vec<_> = images
      .iter()
      .map(|p| p.strip_prefix(dir.path()).unwrap().to_path_buf())
      .collect();
    assert_eq!(
      names,
      vec![
        PathBuf::from("a.jpg"),
        PathBuf::from("b.PNG"),
        PathBuf::from("sub/c.jpeg"),
      ]
    );
  }

  #[test]
  fn masks_are_fitted_to_source() {
    let frame = Frame::prepare(image::RgbImage::new(8, 6), None);
    let mut stack = MaskStack::zeros((2, 6, 8));
    stack[[1, 2, 3]] = 1;
    let masks = fit_masks(&stack, &frame);
    assert_eq!(masks.len(), 2);
    assert_eq!(stack_masks(&masks, &frame), stack);
  }
}

// 该文件是 Yinxing （隐形） 项目的一部分。
// src/args.rs - 项目参数配置
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

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use yinxing::{
  camouflage::CamouflageConfig, fusion::NmsMode, mask_generator::GenerateOptions,
  remover::RemovalOrder,
};

/// Yinxing 图像目标隐藏工具
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 收到中断信号后，等待当前图像完成的最长秒数，超时强制退出（0 表示一直等待）
  #[arg(long, global = true, default_value = "30", value_name = "SECS")]
  pub force_exit_after: u64,

  #[command(subcommand)]
  pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
  /// 检测、分割并伪装目标
  Redact(RedactArgs),
  /// 检测、分割并用修复模型移除目标
  Remove(RemoveArgs),
  /// 检测图像中的文字
  Ocr(OcrArgs),
  /// 列出已注册的模型
  Models,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum NmsModeArg {
  Agnostic,
  Aware,
}

impl From<NmsModeArg> for NmsMode {
  fn from(value: NmsModeArg) -> Self {
    match value {
      NmsModeArg::Agnostic => NmsMode::ClassAgnostic,
      NmsModeArg::Aware => NmsMode::ClassAware,
    }
  }
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum OrderArg {
  AsGiven,
  LargestFirst,
  SmallestFirst,
}

impl From<OrderArg> for RemovalOrder {
  fn from(value: OrderArg) -> Self {
    match value {
      OrderArg::AsGiven => RemovalOrder::AsGiven,
      OrderArg::LargestFirst => RemovalOrder::LargestFirst,
      OrderArg::SmallestFirst => RemovalOrder::SmallestFirst,
    }
  }
}

#[derive(clap::Args, Debug)]
pub struct RedactArgs {
  /// 输入图像目录
  #[arg(long, value_name = "DIR")]
  pub input_dir: PathBuf,

  /// 输出目录
  #[arg(long, value_name = "DIR")]
  pub output_dir: PathBuf,

  /// 闭集检测器名称，逗号分隔
  #[arg(long, value_delimiter = ',', value_name = "NAMES")]
  pub detectors: Vec<String>,

  /// 开放词汇检测器名称，逗号分隔
  #[arg(long, value_delimiter = ',', value_name = "NAMES")]
  pub ovd_detectors: Vec<String>,

  /// 分割器名称
  #[arg(long, default_value = "bbox", value_name = "NAME")]
  pub segmentor: String,

  /// NMS IOU 阈值 (0.0 - 1.0)
  #[arg(long, default_value = "0.5", value_name = "THRESHOLD")]
  pub nms_iou: f32,

  /// NMS 作用范围
  #[arg(long, value_enum, default_value = "agnostic")]
  pub nms_mode: NmsModeArg,

  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value = "0.4", value_name = "THRESHOLD")]
  pub det_thd: f32,

  /// 类别白名单，逗号分隔
  #[arg(long, value_delimiter = ',', value_name = "CLASSES")]
  pub allowed_classes: Vec<String>,

  /// 伪装方法: telea, ns, median, blur, mosaic, solid, noise
  #[arg(long, default_value = "solid", value_name = "METHOD")]
  pub camouflage_method: String,

  /// 伪装参数 JSON 文件，命令行参数优先
  #[arg(long, value_name = "FILE")]
  pub camouflage_config: Option<PathBuf>,

  /// telea / ns 修复半径
  #[arg(long)]
  pub radius: Option<u32>,

  /// 中值滤波核大小
  #[arg(long)]
  pub kernel: Option<u32>,

  /// 高斯模糊核大小
  #[arg(long)]
  pub ksize: Option<u32>,

  /// 马赛克块大小
  #[arg(long)]
  pub block: Option<u32>,

  /// 纯色填充值 R,G,B
  #[arg(long, value_parser = parse_rgb, value_name = "R,G,B")]
  pub fill: Option<[u8; 3]>,

  /// 推理前缩放到指定尺寸
  #[arg(long, num_args = 2, value_names = ["W", "H"])]
  pub resize: Option<Vec<u32>>,
}

impl RedactArgs {
  pub fn camouflage_config(&self) -> Result<CamouflageConfig> {
    let mut config = match &self.camouflage_config {
      Some(path) => {
        let text = std::fs::read_to_string(path)
          .with_context(|| format!("无法读取伪装参数文件 {}", path.display()))?;
        serde_json::from_str(&text)
          .with_context(|| format!("伪装参数文件格式错误 {}", path.display()))?
      }
      None => CamouflageConfig::default(),
    };

    if let Some(radius) = self.radius {
      config.telea_radius = radius;
      config.ns_radius = radius;
    }
    if let Some(kernel) = self.kernel {
      config.median_kernel = kernel;
    }
    if let Some(ksize) = self.ksize {
      config.blur_ksize = ksize;
    }
    if let Some(block) = self.block {
      config.mosaic_block = block;
    }
    if let Some(fill) = self.fill {
      config.solid_value = fill;
    }
    Ok(config)
  }

  pub fn generate_options(&self) -> GenerateOptions {
    GenerateOptions {
      conf: self.det_thd,
      nms_iou: self.nms_iou,
      nms_mode: self.nms_mode.into(),
      allowed_classes: non_empty(&self.allowed_classes),
      ..Default::default()
    }
  }
}

#[derive(clap::Args, Debug)]
pub struct RemoveArgs {
  /// 输入图像目录
  #[arg(long, value_name = "DIR")]
  pub input_dir: PathBuf,

  /// 输出目录
  #[arg(long, value_name = "DIR")]
  pub output_dir: PathBuf,

  /// 开放词汇检测器名称
  #[arg(long, value_name = "NAME")]
  pub ovd_detector: String,

  /// 分割器名称
  #[arg(long, default_value = "bbox", value_name = "NAME")]
  pub segmentor: String,

  /// 修复模型名称
  #[arg(long, default_value = "telea", value_name = "NAME")]
  pub inpainter: String,

  /// 要移除的类别，逗号分隔
  #[arg(long, required = true, value_delimiter = ',', value_name = "CLASSES")]
  pub prompt: Vec<String>,

  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value = "0.25", value_name = "THRESHOLD")]
  pub det_thd: f32,

  /// NMS IOU 阈值 (0.0 - 1.0)
  #[arg(long, default_value = "0.5", value_name = "THRESHOLD")]
  pub nms_iou: f32,

  /// 推理前缩放到指定尺寸
  #[arg(long, num_args = 2, value_names = ["W", "H"])]
  pub resize: Option<Vec<u32>>,

  /// 多个掩码的修复顺序
  #[arg(long, value_enum, default_value = "as-given")]
  pub order: OrderArg,
}

impl RemoveArgs {
  pub fn generate_options(&self) -> GenerateOptions {
    GenerateOptions {
      conf: self.det_thd,
      nms_iou: self.nms_iou,
      allowed_classes: non_empty(&self.prompt),
      ..Default::default()
    }
  }
}

#[derive(clap::Args, Debug)]
pub struct OcrArgs {
  /// 输入图像目录
  #[arg(long, value_name = "DIR")]
  pub input_dir: PathBuf,

  /// 输出目录
  #[arg(long, value_name = "DIR")]
  pub output_dir: PathBuf,

  /// 文字检测器名称，逗号分隔
  #[arg(long, required = true, value_delimiter = ',', value_name = "NAMES")]
  pub text_detectors: Vec<String>,

  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value = "0.5", value_name = "THRESHOLD")]
  pub det_thd: f32,

  /// 推理前缩放到指定尺寸
  #[arg(long, num_args = 2, value_names = ["W", "H"])]
  pub resize: Option<Vec<u32>>,
}

/// `--resize W H` 转换为 (宽, 高)
pub fn resize_pair(resize: &Option<Vec<u32>>) -> Option<(u32, u32)> {
  match resize.as_deref() {
    Some([w, h]) => Some((*w, *h)),
    _ => None,
  }
}

fn non_empty(values: &[String]) -> Option<Vec<String>> {
  let values: Vec<String> = values
    .iter()
    .map(|v| v.trim().to_string())
    .filter(|v| !v.is_empty())
    .collect();
  if values.is_empty() { None } else { Some(values) }
}

fn parse_rgb(text: &str) -> Result<[u8; 3], String> {
  let parts: Vec<&str> = text.split(',').map(str::trim).collect();
  if parts.len() != 3 {
    return Err(format!("需要 R,G,B 三个分量，实际为 '{}'", text));
  }
  let mut rgb = [0u8; 3];
  for (slot, part) in rgb.iter_mut().zip(parts) {
    *slot = part
      .parse()
      .map_err(|e| format!("颜色分量 '{}' 无效: {}", part, e))?;
  }
  Ok(rgb)
}

// 该文件是 Yinxing （隐形） 项目的一部分。
// src/output/record.rs - 运行统计记录
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

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use super::OutputError;
use crate::detection::Detection;

/// 汇总中计数字段的含义
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryKind {
  /// 被隐藏或移除的目标数
  Detections,
  /// 检测到的文本框数
  TextBoxes,
}

/// 整个运行期间的统计，只由驱动线程写入
#[derive(Debug, Clone, Default)]
pub struct RunStatistics {
  pub total_images: usize,
  pub processed_images: usize,
  pub skipped_images: usize,
  pub per_class_counts: BTreeMap<String, usize>,
  pub elapsed: Duration,
}

impl RunStatistics {
  pub fn new(total_images: usize) -> Self {
    Self {
      total_images,
      ..Default::default()
    }
  }

  pub fn record_processed(&mut self, detections: &[Detection], elapsed: Duration) {
    self.processed_images += 1;
    self.elapsed += elapsed;
    for det in detections {
      let key = det.class_name.as_deref().unwrap_or("unknown");
      *self.per_class_counts.entry(key.to_string()).or_default() += 1;
    }
  }

  pub fn record_skipped(&mut self) {
    self.skipped_images += 1;
  }

  pub fn total_detections(&self) -> usize {
    self.per_class_counts.values().sum()
  }

  /// 平均每张图像耗时（秒），保留 3 位小数
  pub fn avg_time_per_image_sec(&self) -> f64 {
    let avg = self.elapsed.as_secs_f64() / self.processed_images.max(1) as f64;
    (avg * 1000.0).round() / 1000.0
  }

  pub fn summary(&self, kind: SummaryKind) -> RunSummary {
    let total = self.total_detections();
    let (removed, text_boxes) = match kind {
      SummaryKind::Detections => (Some(total), None),
      SummaryKind::TextBoxes => (None, Some(total)),
    };
    RunSummary {
      total_images: self.total_images,
      processed_images: self.processed_images,
      skipped_images: self.skipped_images,
      total_detections_removed: removed,
      total_text_boxes: text_boxes,
      per_class_counts: self.per_class_counts.clone(),
      avg_time_per_image_sec: self.avg_time_per_image_sec(),
      finished_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
    }
  }
}

/// `summary.json` 的内容
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
  pub total_images: usize,
  pub processed_images: usize,
  pub skipped_images: usize,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub total_detections_removed: Option<usize>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub total_text_boxes: Option<usize>,
  pub per_class_counts: BTreeMap<String, usize>,
  pub avg_time_per_image_sec: f64,
  pub finished_at: String,
}

impl RunSummary {
  pub fn save(&self, path: &Path) -> Result<(), OutputError> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_vec_pretty(self)?)?;
    Ok(())
  }

  pub fn load(path: &Path) -> Result<Self, OutputError> {
    Ok(serde_json::from_slice(&std::fs::read(path)?)?)
  }
}

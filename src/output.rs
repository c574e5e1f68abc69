// 该文件是 Yinxing （隐形） 项目的一部分。
// src/output.rs - 输出定义
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

use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::{GrayImage, ImageFormat, RgbImage};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

pub mod draw;
mod record;

pub use self::record::{RunStatistics, RunSummary, SummaryKind};

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("I/O 错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  Image(#[from] image::ImageError),
  #[error("JSON 错误: {0}")]
  Json(#[from] serde_json::Error),
}

/// 输入图像在输出目录下对应的路径前缀（不含扩展名）。
///
/// 保持输入目录的层级结构，`in/a/b.jpg` 映射为 `out/a/b`。
pub fn output_base(input_dir: &Path, output_dir: &Path, image_path: &Path) -> PathBuf {
  let relative = image_path.strip_prefix(input_dir).unwrap_or(image_path);
  let relative = match relative.file_name() {
    Some(_) => relative.to_path_buf(),
    None => PathBuf::from("image"),
  };
  output_dir.join(relative.with_extension(""))
}

/// 为一批输入图像分配互不相同的输出前缀。
///
/// 一般与 [`output_base`] 相同；同一目录下主名相同的图像（如 `x.png` 与
/// `x.jpg`）保留扩展名，分别映射为 `out/x.png` 与 `out/x.jpg`，
/// 仍然冲突时再追加序号。
pub fn output_bases(input_dir: &Path, output_dir: &Path, images: &[PathBuf]) -> Vec<PathBuf> {
  let stripped: Vec<PathBuf> = images
    .iter()
    .map(|path| output_base(input_dir, output_dir, path))
    .collect();
  let mut counts: HashMap<&Path, usize> = HashMap::new();
  for base in &stripped {
    *counts.entry(base.as_path()).or_default() += 1;
  }

  let mut used: HashSet<PathBuf> = HashSet::with_capacity(images.len());
  let mut bases = Vec::with_capacity(images.len());
  for (image, base) in images.iter().zip(&stripped) {
    let mut candidate = match image.extension() {
      Some(ext) if counts[base.as_path()] > 1 => {
        with_suffix(base, &format!(".{}", ext.to_string_lossy()))
      }
      _ => base.clone(),
    };
    let mut n = 1;
    while used.contains(&candidate) {
      candidate = with_suffix(base, &format!("_{}", n));
      n += 1;
    }
    if candidate != *base {
      warn!("{} 的输出前缀与其他图像冲突，改用 {}", image.display(), candidate.display());
    }
    used.insert(candidate.clone());
    bases.push(candidate);
  }
  bases
}

/// 在前缀后追加后缀，例如 `.mask.png`
pub fn with_suffix(base: &Path, suffix: &str) -> PathBuf {
  let mut name = base.as_os_str().to_owned();
  name.push(suffix);
  PathBuf::from(name)
}

/// 一张图像的全部输出。
///
/// 先在内存中完成编码，再统一写盘；任何一个文件写入失败时，
/// 已写入的文件会被删除，不留下不完整的结果。
#[derive(Debug, Default)]
pub struct OutputBundle {
  files: Vec<(PathBuf, Vec<u8>)>,
}

impl OutputBundle {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn add_json<T: Serialize + ?Sized>(
    &mut self,
    path: PathBuf,
    value: &T,
  ) -> Result<(), OutputError> {
    let bytes = serde_json::to_vec_pretty(value)?;
    self.files.push((path, bytes));
    Ok(())
  }

  pub fn add_rgb(&mut self, path: PathBuf, image: &RgbImage) -> Result<(), OutputError> {
    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    self.files.push((path, bytes));
    Ok(())
  }

  pub fn add_gray(&mut self, path: PathBuf, image: &GrayImage) -> Result<(), OutputError> {
    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    self.files.push((path, bytes));
    Ok(())
  }

  pub fn paths(&self) -> impl Iterator<Item = &Path> {
    self.files.iter().map(|(path, _)| path.as_path())
  }

  pub fn len(&self) -> usize {
    self.files.len()
  }

  pub fn is_empty(&self) -> bool {
    self.files.is_empty()
  }

  /// 写入全部文件，返回写入的路径
  pub fn write(self) -> Result<Vec<PathBuf>, OutputError> {
    let mut written: Vec<PathBuf> = Vec::with_capacity(self.files.len());
    for (path, bytes) in self.files {
      let result = path
        .parent()
        .map_or(Ok(()), |dir| std::fs::create_dir_all(dir))
        .and_then(|_| std::fs::write(&path, &bytes));

      if let Err(e) = result {
        warn!("写入 {} 失败，回滚已写入的 {} 个文件", path.display(), written.len());
        for done in &written {
          if let Err(e) = std::fs::remove_file(done) {
            warn!("删除 {} 失败: {}", done.display(), e);
          }
        }
        return Err(e.into());
      }
      debug!("已保存: {}", path.display());
      written.push(path);
    }
    Ok(written)
  }
}

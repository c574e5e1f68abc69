// 该文件是 Yinxing （隐形） 项目的一部分。
// src/main.rs - 项目主程序
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

mod args;

use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};

use args::{Args, Command, resize_pair};
use yinxing::{
  camouflage::Camouflage,
  mask_generator::MaskGenerator,
  model::{ModelRegistries, register_builtins, registries},
  ocr::OcrProcessor,
  remover::Remover,
  task::{Mode, Pipeline, PipelineOptions},
};

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  let registries = registries();
  register_builtins(registries)?;
  registries.freeze();

  let (options, mode) = match args.command {
    Command::Models => {
      println!("{}", registries.summary());
      return Ok(());
    }
    Command::Redact(args) => redact_mode(registries, args)?,
    Command::Remove(args) => remove_mode(registries, args)?,
    Command::Ocr(args) => ocr_mode(registries, args)?,
  };

  let pipeline = Pipeline::new(options, mode);
  let stop = pipeline.stop_flag();
  let force_exit_after = args.force_exit_after;
  ctrlc::set_handler(move || {
    info!("收到中断信号，处理完当前图像后退出...");
    stop.store(true, Ordering::SeqCst);
    // 超时强制退出时不会写出 summary.json
    if force_exit_after > 0 {
      thread::spawn(move || {
        thread::sleep(Duration::from_secs(force_exit_after));
        warn!("等待 {} 秒后仍未退出，强制退出程序", force_exit_after);
        std::process::exit(1);
      });
    }
  })?;

  let summary = pipeline.run_task()?;
  info!(
    "处理 {} 张，跳过 {} 张",
    summary.processed_images, summary.skipped_images
  );
  Ok(())
}

fn redact_mode(
  registries: &ModelRegistries,
  args: args::RedactArgs,
) -> Result<(PipelineOptions, Mode)> {
  info!("检测器: {:?}", args.detectors);
  info!("开放词汇检测器: {:?}", args.ovd_detectors);
  info!("伪装方法: {}", args.camouflage_method);

  let generator = MaskGenerator::from_registries(
    registries,
    &args.detectors,
    &args.ovd_detectors,
    &args.segmentor,
  )?;
  let camouflage = Camouflage::new(&args.camouflage_method, args.camouflage_config()?)?;
  let options = args.generate_options();

  Ok((
    PipelineOptions {
      input_dir: args.input_dir,
      output_dir: args.output_dir,
      resize: resize_pair(&args.resize),
    },
    Mode::Redact {
      generator,
      camouflage,
      options,
    },
  ))
}

fn remove_mode(
  registries: &ModelRegistries,
  args: args::RemoveArgs,
) -> Result<(PipelineOptions, Mode)> {
  info!("移除类别: {:?}", args.prompt);

  let generator = MaskGenerator::from_registries(
    registries,
    &[] as &[String],
    std::slice::from_ref(&args.ovd_detector),
    &args.segmentor,
  )?;
  let remover = Remover::from_registries(registries, &args.inpainter, args.order.into())?;
  let options = args.generate_options();

  Ok((
    PipelineOptions {
      input_dir: args.input_dir,
      output_dir: args.output_dir,
      resize: resize_pair(&args.resize),
    },
    Mode::Remove {
      generator,
      remover,
      options,
    },
  ))
}

fn ocr_mode(registries: &ModelRegistries, args: args::OcrArgs) -> Result<(PipelineOptions, Mode)> {
  let processor = OcrProcessor::from_registries(registries, &args.text_detectors)?;

  Ok((
    PipelineOptions {
      input_dir: args.input_dir,
      output_dir: args.output_dir,
      resize: resize_pair(&args.resize),
    },
    Mode::Ocr {
      processor,
      conf: args.det_thd,
    },
  ))
}
